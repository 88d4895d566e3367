use super::types::{
    GriffonConfig, InvokeConfig, RawGriffonConfig, RawHostSection, RawInvokeSection,
};
use anyhow::{Context, Result};
use griffon_core::HostConfig;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<GriffonConfig> {
        Self::load_from(&Self::user_config_path(), &Self::project_config_path())
    }

    /// Layer `project` over `user`; missing files are skipped
    pub fn load_from(user: &Path, project: &Path) -> Result<GriffonConfig> {
        let mut raw = RawGriffonConfig::default();

        // Layer 1: User config
        if user.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(user)?);
        }

        // Layer 2: Project config
        if project.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(project)?);
        }

        Ok(Self::finalize(raw))
    }

    /// User config path: `<config_dir>/config.toml`
    pub fn user_config_path() -> PathBuf {
        griffon_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with GRIFFON_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("GRIFFON_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(griffon_paths::PROJECT_DIR_NAME).join("config.toml")
        }
    }

    /// Parse one file. Relative plugin directories and runner paths are taken
    /// relative to it; a bare runner name is left for PATH lookup.
    fn read_raw(path: &Path) -> Result<RawGriffonConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut raw: RawGriffonConfig = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        if let (Some(dirs), Some(base)) = (raw.host.plugin_dirs.as_mut(), path.parent()) {
            for dir in dirs.iter_mut().filter(|d| d.is_relative()) {
                *dir = base.join(&*dir);
            }
        }
        if let (Some(runner), Some(base)) = (raw.host.runner.as_mut(), path.parent())
            && runner.is_relative()
            && runner.components().count() > 1
        {
            *runner = base.join(&*runner);
        }
        Ok(raw)
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawGriffonConfig, overlay: RawGriffonConfig) -> RawGriffonConfig {
        RawGriffonConfig {
            host: RawHostSection {
                plugin_dirs: overlay.host.plugin_dirs.or(base.host.plugin_dirs),
                handshake_timeout_ms: overlay
                    .host
                    .handshake_timeout_ms
                    .or(base.host.handshake_timeout_ms),
                stop_timeout_ms: overlay.host.stop_timeout_ms.or(base.host.stop_timeout_ms),
                history_capacity: overlay.host.history_capacity.or(base.host.history_capacity),
                subscriber_queue: overlay.host.subscriber_queue.or(base.host.subscriber_queue),
                runner: overlay.host.runner.or(base.host.runner),
            },
            invoke: RawInvokeSection {
                wait_ms: overlay.invoke.wait_ms.or(base.invoke.wait_ms),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawGriffonConfig) -> GriffonConfig {
        let defaults = HostConfig::default();
        GriffonConfig {
            host: HostConfig {
                plugin_dirs: raw.host.plugin_dirs.unwrap_or(defaults.plugin_dirs),
                handshake_timeout_ms: raw
                    .host
                    .handshake_timeout_ms
                    .unwrap_or(defaults.handshake_timeout_ms),
                stop_timeout_ms: raw.host.stop_timeout_ms.unwrap_or(defaults.stop_timeout_ms),
                history_capacity: raw.host.history_capacity.unwrap_or(defaults.history_capacity),
                subscriber_queue: raw.host.subscriber_queue.unwrap_or(defaults.subscriber_queue),
                runner: raw.host.runner.or(defaults.runner),
            },
            invoke: InvokeConfig {
                wait_ms: raw
                    .invoke
                    .wait_ms
                    .unwrap_or(InvokeConfig::default().wait_ms),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_missing_files_give_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_from(
            &temp_dir.path().join("user.toml"),
            &temp_dir.path().join("project.toml"),
        )
        .unwrap();

        assert_eq!(config.host, HostConfig::default());
        assert_eq!(config.invoke.wait_ms, InvokeConfig::default().wait_ms);
    }

    #[test]
    fn test_project_overrides_user_field_by_field() {
        let temp_dir = TempDir::new().unwrap();
        let user = write(
            temp_dir.path(),
            "user.toml",
            "[host]\nstop_timeout_ms = 100\nhistory_capacity = 10\n",
        );
        let project = write(
            temp_dir.path(),
            "project.toml",
            "[host]\nhistory_capacity = 20\n[invoke]\nwait_ms = 500\n",
        );

        let config = ConfigLoader::load_from(&user, &project).unwrap();

        assert_eq!(config.host.stop_timeout_ms, 100);
        assert_eq!(config.host.history_capacity, 20);
        assert_eq!(config.invoke.wait_ms, 500);
        assert_eq!(
            config.host.handshake_timeout_ms,
            HostConfig::default().handshake_timeout_ms
        );
    }

    #[test]
    fn test_relative_plugin_dirs_resolve_against_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let project = write(
            temp_dir.path(),
            "config.toml",
            "[host]\nplugin_dirs = [\"plugins\", \"/opt/griffon\"]\n",
        );

        let config = ConfigLoader::load_from(&temp_dir.path().join("none.toml"), &project).unwrap();

        assert_eq!(
            config.host.plugin_dirs,
            vec![temp_dir.path().join("plugins"), PathBuf::from("/opt/griffon")]
        );
    }

    #[test]
    fn test_runner_path_resolves_but_bare_name_does_not() {
        let temp_dir = TempDir::new().unwrap();
        let user = write(
            temp_dir.path(),
            "user.toml",
            "[host]\nrunner = \"griffon-runner\"\n",
        );
        let config = ConfigLoader::load_from(&user, &temp_dir.path().join("none.toml")).unwrap();
        assert_eq!(config.host.runner, Some(PathBuf::from("griffon-runner")));

        let project = write(
            temp_dir.path(),
            "project.toml",
            "[host]\nrunner = \"bin/griffon-runner\"\n",
        );
        let config = ConfigLoader::load_from(&user, &project).unwrap();
        assert_eq!(
            config.host.runner,
            Some(temp_dir.path().join("bin/griffon-runner"))
        );
    }

    #[test]
    fn test_invalid_toml_names_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let user = write(temp_dir.path(), "user.toml", "[host\n");

        let err = ConfigLoader::load_from(&user, &temp_dir.path().join("none.toml")).unwrap_err();
        assert!(err.to_string().contains("user.toml"));
    }

    #[test]
    #[serial]
    fn test_project_config_dir_env_override() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: serialized with every other test touching this variable
        unsafe { std::env::set_var("GRIFFON_PROJECT_CONFIG_DIR", temp_dir.path()) };
        let path = ConfigLoader::project_config_path();
        unsafe { std::env::remove_var("GRIFFON_PROJECT_CONFIG_DIR") };

        assert_eq!(path, temp_dir.path().join("config.toml"));
    }

    #[test]
    #[serial]
    fn test_project_config_defaults_to_dot_griffon() {
        unsafe { std::env::remove_var("GRIFFON_PROJECT_CONFIG_DIR") };
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from(".griffon/config.toml")
        );
    }
}

//! XDG Base Directory paths for griffon.
//!
//! The host and CLI resolve every on-disk location (config files, the user
//! plugin directory) through these helpers so that tests can redirect them
//! with `XDG_CONFIG_HOME`.

use std::path::PathBuf;

/// Directory name of a project-local griffon folder (`.griffon/`).
pub const PROJECT_DIR_NAME: &str = ".griffon";

/// Get the griffon config directory.
///
/// Returns `$XDG_CONFIG_HOME/griffon` if set, otherwise `~/.config/griffon`.
/// This is where `config.toml` and the user plugin directory live.
///
/// # Examples
///
/// ```
/// use griffon_paths::config_dir;
///
/// let config = config_dir();
/// let plugin_dir = config.join("plugins");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("griffon")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/griffon")
    } else {
        PathBuf::from(".config/griffon")
    }
}

/// User plugin directory: `<config_dir>/plugins`.
pub fn user_plugin_dir() -> PathBuf {
    config_dir().join("plugins")
}

/// Project plugin directory relative to the working directory: `.griffon/plugins`.
pub fn project_plugin_dir() -> PathBuf {
    PathBuf::from(PROJECT_DIR_NAME).join("plugins")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_griffon() {
        let path = config_dir();
        assert!(
            path.ends_with("griffon"),
            "config_dir should end with 'griffon'"
        );
    }

    #[test]
    fn test_user_plugin_dir_is_under_config_dir() {
        assert!(user_plugin_dir().starts_with(config_dir()));
        assert!(user_plugin_dir().ends_with("plugins"));
    }

    #[test]
    fn test_project_plugin_dir_is_relative() {
        let path = project_plugin_dir();
        assert!(path.is_relative());
        assert_eq!(path, PathBuf::from(".griffon/plugins"));
    }
}

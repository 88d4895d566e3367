//! Plugin identity and manifests

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// File name looked up in every plugin directory
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Process-scoped plugin identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(u32);

impl PluginId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PluginId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// How to start a plugin's executable
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Immutable metadata for one discovered plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    id: PluginId,
    name: String,
    functions: Vec<String>,
    #[serde(skip)]
    launch: LaunchSpec,
}

impl PluginDescriptor {
    /// Build a descriptor; repeated function names keep their first position.
    pub fn new(id: PluginId, name: impl Into<String>, functions: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(functions.len());
        for function in functions {
            if !unique.contains(&function) {
                unique.push(function);
            }
        }
        Self {
            id,
            name: name.into(),
            functions: unique,
            launch: LaunchSpec::default(),
        }
    }

    pub fn with_launch(mut self, launch: LaunchSpec) -> Self {
        self.launch = launch;
        self
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    pub fn has_function(&self, function: &str) -> bool {
        self.functions.iter().any(|f| f == function)
    }

    pub fn launch(&self) -> &LaunchSpec {
        &self.launch
    }
}

/// Executable that hosts library plugins
pub const RUNNER_BINARY: &str = "griffon-runner";

/// Runner next to the current executable, falling back to a PATH lookup
pub fn default_runner() -> PathBuf {
    let file_name = format!("{RUNNER_BINARY}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .filter(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(file_name))
}

/// On-disk `plugin.toml`
///
/// ```toml
/// name = "scanner"
/// executable = "griffon-scanner"
/// args = ["--quiet"]
/// functions = ["scan", "update_rules"]
/// ```
///
/// A plugin built as a shared library names it with `library` instead of
/// `executable`; it is then run inside [`RUNNER_BINARY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<PathBuf>,
    /// Extra arguments for `executable`
    #[serde(default)]
    pub args: Vec<String>,
    pub functions: Vec<String>,
    /// Absolute directory the manifest was read from
    #[serde(skip)]
    pub dir: Option<PathBuf>,
}

impl PluginManifest {
    pub fn new(
        name: impl Into<String>,
        executable: impl Into<PathBuf>,
        functions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            executable: Some(executable.into()),
            library: None,
            args: Vec::new(),
            functions: functions.into_iter().map(Into::into).collect(),
            dir: None,
        }
    }

    pub fn library(
        name: impl Into<String>,
        library: impl Into<PathBuf>,
        functions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            executable: None,
            library: Some(library.into()),
            ..Self::new(name, PathBuf::new(), functions)
        }
    }

    /// Parse a manifest file.
    ///
    /// The plugin directory is made absolute so the launch spec stays valid
    /// once the child runs with that directory as its working directory.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        let mut manifest: Self = toml::from_str(&content)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        manifest.dir = Some(std::path::absolute(dir)?);
        Ok(manifest)
    }

    /// Check the fields `serde` cannot: non-empty names, one launch target,
    /// unique functions
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::EmptyName);
        }
        match (&self.executable, &self.library) {
            (Some(target), None) | (None, Some(target)) if !target.as_os_str().is_empty() => {}
            _ => return Err(ManifestError::Target),
        }
        for (i, function) in self.functions.iter().enumerate() {
            if function.is_empty() {
                return Err(ManifestError::EmptyFunction);
            }
            if self.functions[..i].contains(function) {
                return Err(ManifestError::DuplicateFunction(function.clone()));
            }
        }
        Ok(())
    }

    /// Resolve the launch spec.
    ///
    /// A relative executable that exists inside the plugin directory is taken
    /// from there; anything else is handed to the OS as-is (PATH lookup).
    /// Libraries always resolve against the plugin directory and are started
    /// through `runner`.
    pub fn launch_spec(&self, runner: &Path) -> LaunchSpec {
        if let Some(library) = &self.library {
            let library = self.in_plugin_dir(library);
            return LaunchSpec {
                executable: runner.to_path_buf(),
                args: vec![library.to_string_lossy().into_owned()],
                working_dir: self.dir.clone(),
            };
        }

        let executable = self.executable.clone().unwrap_or_default();
        let executable = match &self.dir {
            Some(dir) if executable.is_relative() && dir.join(&executable).exists() => {
                dir.join(&executable)
            }
            _ => executable,
        };
        LaunchSpec {
            executable,
            args: self.args.clone(),
            working_dir: self.dir.clone(),
        }
    }

    fn in_plugin_dir(&self, path: &Path) -> PathBuf {
        match &self.dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn into_descriptor(self, id: PluginId, runner: &Path) -> PluginDescriptor {
        let launch = self.launch_spec(runner);
        PluginDescriptor::new(id, self.name, self.functions).with_launch(launch)
    }
}

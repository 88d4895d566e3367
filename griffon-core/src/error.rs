//! Error types for griffon-core
//!
//! Each component reports its own error enum. The [`PluginHost`] facade
//! translates all of them into [`HostError`], the only error type consumers
//! ever see.
//!
//! [`PluginHost`]: crate::PluginHost

use std::path::PathBuf;
use std::time::Duration;

use griffon_plugin_api::ProtocolError;
use serde::Serialize;
use thiserror::Error;

use crate::plugins::PluginId;

/// Structured failure returned by every host operation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HostError {
    /// The plugin could not be started or did not complete its handshake
    #[error("Plugin {plugin} failed to launch: {reason}")]
    LaunchError { plugin: PluginId, reason: String },

    /// The function is not part of the plugin's descriptor
    #[error("Plugin {plugin} has no function '{function}'")]
    UnknownFunction { plugin: PluginId, function: String },

    /// The plugin crashed or was stopped
    #[error("Plugin {plugin} is terminated")]
    InstanceTerminated { plugin: PluginId },

    /// No plugin with this identifier (or name) exists
    #[error("Plugin '{plugin}' not found")]
    NotFound { plugin: String },

    /// The discovery source could not be read
    #[error("Plugin discovery failed: {0}")]
    Discovery(String),
}

impl HostError {
    pub fn not_found(plugin: impl ToString) -> Self {
        Self::NotFound {
            plugin: plugin.to_string(),
        }
    }
}

/// Errors while enumerating plugin manifests
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Cannot read plugin directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid plugin manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },
}

/// Problems with a single `plugin.toml`
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("cannot read manifest: {0}")]
    Read(#[from] std::io::Error),

    #[error("cannot parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("name is empty")]
    EmptyName,

    #[error("exactly one of `executable` or `library` must be set")]
    Target,

    #[error("empty function name")]
    EmptyFunction,

    #[error("duplicate function '{0}'")]
    DuplicateFunction(String),
}

/// Reasons a launch attempt fails
#[derive(Error, Debug)]
pub enum LaunchFailure {
    #[error("Failed to spawn {executable}: {source}")]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Plugin process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Plugin does not provide declared functions: {}", .0.join(", "))]
    MissingFunctions(Vec<String>),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors from the process manager
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Plugin {0} not found")]
    NotFound(PluginId),

    #[error("Plugin {0} is already running")]
    AlreadyRunning(PluginId),

    #[error("Plugin {plugin} failed to launch: {source}")]
    Launch {
        plugin: PluginId,
        #[source]
        source: LaunchFailure,
    },
}

/// Errors from the command dispatcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Plugin {0} not found")]
    NotFound(PluginId),

    #[error("Plugin {plugin} has no function '{function}'")]
    UnknownFunction { plugin: PluginId, function: String },

    #[error("Plugin {0} is terminated")]
    InstanceTerminated(PluginId),
}

impl From<ManagerError> for HostError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::NotFound(id) => HostError::not_found(id),
            ManagerError::AlreadyRunning(id) => HostError::LaunchError {
                plugin: id,
                reason: "already running".to_string(),
            },
            ManagerError::Launch { plugin, source } => HostError::LaunchError {
                plugin,
                reason: source.to_string(),
            },
        }
    }
}

impl From<DispatchError> for HostError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NotFound(id) => HostError::not_found(id),
            DispatchError::UnknownFunction { plugin, function } => {
                HostError::UnknownFunction { plugin, function }
            }
            DispatchError::InstanceTerminated(plugin) => HostError::InstanceTerminated { plugin },
        }
    }
}

impl From<DiscoveryError> for HostError {
    fn from(err: DiscoveryError) -> Self {
        HostError::Discovery(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_launch_displays_reason() {
        let error = HostError::LaunchError {
            plugin: PluginId::new(3),
            reason: "no such file".to_string(),
        };
        assert!(error.to_string().contains("failed to launch"));
        assert!(error.to_string().contains("no such file"));
    }

    #[test]
    fn host_error_serializes_with_kind_tag() {
        let error = HostError::UnknownFunction {
            plugin: PluginId::new(1),
            function: "nonexistent".to_string(),
        };
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["kind"], "unknown_function");
        assert_eq!(json["plugin"], 1);
        assert_eq!(json["function"], "nonexistent");
    }

    #[test]
    fn launch_failure_missing_functions_lists_names() {
        let error = LaunchFailure::MissingFunctions(vec!["scan".into(), "update".into()]);
        assert!(error.to_string().contains("scan, update"));
    }

    #[test]
    fn manager_already_running_maps_to_launch_error() {
        let error: HostError = ManagerError::AlreadyRunning(PluginId::new(2)).into();
        assert!(matches!(error, HostError::LaunchError { .. }));
    }

    #[test]
    fn manager_launch_keeps_failure_reason() {
        let error: HostError = ManagerError::Launch {
            plugin: PluginId::new(4),
            source: LaunchFailure::HandshakeTimeout(Duration::from_millis(50)),
        }
        .into();
        match error {
            HostError::LaunchError { plugin, reason } => {
                assert_eq!(plugin, PluginId::new(4));
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dispatch_errors_map_to_taxonomy() {
        let id = PluginId::new(1);
        assert_eq!(
            HostError::from(DispatchError::NotFound(id)),
            HostError::not_found(id)
        );
        assert_eq!(
            HostError::from(DispatchError::InstanceTerminated(id)),
            HostError::InstanceTerminated { plugin: id }
        );
    }

    #[test]
    fn discovery_error_maps_to_discovery() {
        let error: HostError = DiscoveryError::Manifest {
            path: PathBuf::from("/plugins/x/plugin.toml"),
            source: ManifestError::EmptyName,
        }
        .into();
        assert!(matches!(error, HostError::Discovery(msg) if msg.contains("name is empty")));
    }
}

//! Plugin host configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::DEFAULT_HISTORY_CAPACITY;

/// Default per-subscriber queue length before events are dropped
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 256;

/// Configuration for [`PluginHost`](crate::PluginHost)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Plugin directories, searched in order (earlier entries shadow later ones)
    pub plugin_dirs: Vec<PathBuf>,
    /// How long a plugin has to answer `Hello`
    pub handshake_timeout_ms: u64,
    /// How long a stopping plugin may take to exit before it is killed
    pub stop_timeout_ms: u64,
    /// Log events retained per plugin for `history()`
    pub history_capacity: usize,
    /// Undelivered events a subscriber may lag behind before it drops some
    pub subscriber_queue: usize,
    /// Executable hosting library plugins (default: `griffon-runner` next to
    /// the current executable, else on PATH)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner: Option<PathBuf>,
}

impl HostConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            // Project plugins take precedence over user plugins
            plugin_dirs: vec![
                griffon_paths::project_plugin_dir(),
                griffon_paths::user_plugin_dir(),
            ],
            handshake_timeout_ms: 5_000,
            stop_timeout_ms: 2_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            subscriber_queue: DEFAULT_SUBSCRIBER_QUEUE,
            runner: None,
        }
    }
}

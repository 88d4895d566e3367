use griffon_core::HostConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How long `griffon invoke` waits for a reply by default
pub const DEFAULT_WAIT_MS: u64 = 30_000;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawGriffonConfig {
    #[serde(default)]
    pub host: RawHostSection,

    #[serde(default)]
    pub invoke: RawInvokeSection,
}

/// Host settings as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawHostSection {
    /// Plugin directories, earlier entries shadow later ones
    pub plugin_dirs: Option<Vec<PathBuf>>,
    pub handshake_timeout_ms: Option<u64>,
    pub stop_timeout_ms: Option<u64>,
    pub history_capacity: Option<usize>,
    pub subscriber_queue: Option<usize>,
    /// Executable hosting library plugins
    pub runner: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawInvokeSection {
    pub wait_ms: Option<u64>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GriffonConfig {
    #[serde(default)]
    pub host: HostConfig,

    #[serde(default)]
    pub invoke: InvokeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeConfig {
    /// Reply timeout for `griffon invoke` without `--wait-ms`
    pub wait_ms: u64,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            wait_ms: DEFAULT_WAIT_MS,
        }
    }
}

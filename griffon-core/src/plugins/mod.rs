//! Plugin discovery, lifecycle and command routing
//!
//! Plugins are separate executables speaking the `griffon-plugin-api` frame
//! protocol over stdin/stdout. Shared-library plugins run inside the
//! `griffon-runner` executable, which speaks the protocol on their behalf. This module finds them ([`DescriptorStore`]),
//! runs them ([`ProcessManager`], [`PluginInstance`]) and routes commands to
//! them ([`Dispatcher`]).

mod descriptor;
mod dispatch;
mod instance;
mod launcher;
mod manager;
pub mod mock;
mod store;

pub use descriptor::{
    LaunchSpec, MANIFEST_FILE, PluginDescriptor, PluginId, PluginManifest, RUNNER_BINARY,
    default_runner,
};
pub use dispatch::{CommandTicket, Dispatcher, InvokeReceipt};
pub use instance::{Aborted, InstanceState, PluginInstance};
pub use launcher::{PluginChannel, PluginLauncher, ProcessLauncher};
pub use manager::ProcessManager;
pub use mock::{MockLauncher, ScriptedPlugin};
pub use store::{DescriptorStore, DirectorySource, ManifestSource};

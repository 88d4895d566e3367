//! griffon-core: plugin host for the griffon analysis suite
//!
//! This crate tracks analysis plugins, runs them as child processes,
//! dispatches commands to them by identifier and relays their output to any
//! number of consumers:
//!
//! - **Discovery** - [`DescriptorStore`] reads `plugin.toml` manifests and
//!   swaps the known plugin set atomically
//! - **Lifecycle** - [`ProcessManager`] starts, stops and watches
//!   [`PluginInstance`]s (`Loading → Ready ⇄ Busy → Terminated`)
//! - **Dispatch** - [`Dispatcher`] validates commands and queues them per
//!   instance in FIFO order
//! - **Log fan-out** - [`LogBroadcaster`] sequences plugin output, keeps a
//!   bounded history and feeds independent subscribers
//! - **Facade** - [`PluginHost`] ties it together behind [`HostError`]
//!
//! # Quick Start
//!
//! ```no_run
//! use griffon_core::{HostConfig, PluginHost};
//! use serde_json::json;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = PluginHost::new(HostConfig::default());
//!     host.discover()?;
//!
//!     let id = host.resolve("scanner")?;
//!     host.start(id).await?;
//!
//!     let mut events = host.subscribe(id)?;
//!     let ticket = host.invoke(id, "scan", json!({"path": "/tmp/x"})).await?;
//!     println!("accepted as request {}", ticket.request_id());
//!
//!     while let Some(event) = events.recv().await {
//!         println!("[{}] {}", event.seq, event.text());
//!         if event.reply().is_some() {
//!             break;
//!         }
//!     }
//!     host.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! consumer ──► PluginHost ──► Dispatcher ──► ProcessManager ──► PluginInstance
//!                  │                                               │  ▲
//!                  │                                     Call frames  │ Log/Result frames
//!                  │                                               ▼  │
//!                  └──── subscribe/history ◄── LogBroadcaster ◄── plugin process
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod plugins;

pub use config::HostConfig;
pub use error::{
    DiscoveryError, DispatchError, HostError, LaunchFailure, ManagerError, ManifestError,
};
pub use events::{
    CommandReply, EventSeq, Lifecycle, LogBroadcaster, LogEvent, LogPayload, LogSubscription,
};
pub use host::PluginHost;
pub use plugins::{
    CommandTicket, DescriptorStore, Dispatcher, InstanceState, InvokeReceipt, PluginDescriptor,
    PluginId, PluginInstance, ProcessManager,
};

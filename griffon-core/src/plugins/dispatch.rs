//! Command dispatch
//!
//! Dispatching validates a command against the target instance and hands it
//! to the instance's queue. It never waits for the plugin: the returned
//! [`CommandTicket`] only proves the hand-off, and can optionally be awaited
//! for the reply.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::descriptor::PluginId;
use super::instance::ReplyReceiver;
use super::manager::ProcessManager;
use crate::error::{DispatchError, HostError};
use crate::events::CommandReply;

/// What `invoke` reports back to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvokeReceipt {
    pub accepted: bool,
    pub request_id: u32,
}

/// Proof that a command was accepted
#[derive(Debug)]
pub struct CommandTicket {
    plugin: PluginId,
    request_id: u32,
    reply: ReplyReceiver,
}

impl CommandTicket {
    pub fn plugin(&self) -> PluginId {
        self.plugin
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn receipt(&self) -> InvokeReceipt {
        InvokeReceipt {
            accepted: true,
            request_id: self.request_id,
        }
    }

    /// Wait for the plugin's reply.
    ///
    /// Resolves to `InstanceTerminated` if the plugin stops or crashes first.
    pub async fn wait(self) -> Result<CommandReply, HostError> {
        match self.reply.await {
            Ok(Ok(reply)) => Ok(reply),
            _ => Err(HostError::InstanceTerminated {
                plugin: self.plugin,
            }),
        }
    }
}

/// Routes commands to running instances
pub struct Dispatcher {
    manager: Arc<ProcessManager>,
}

impl Dispatcher {
    pub fn new(manager: Arc<ProcessManager>) -> Self {
        Self { manager }
    }

    /// Queue `function` on plugin `id`.
    ///
    /// Checks, in order: an instance exists, it exposes `function`, it is not
    /// terminated. A rejected command never reaches the plugin.
    pub async fn dispatch(
        &self,
        id: PluginId,
        function: &str,
        payload: Value,
    ) -> Result<CommandTicket, DispatchError> {
        self.manager
            .with_instance(id, |instance| {
                if !instance.descriptor().has_function(function) {
                    return Err(DispatchError::UnknownFunction {
                        plugin: id,
                        function: function.to_string(),
                    });
                }
                let (request_id, reply) = instance
                    .enqueue(function, payload)
                    .map_err(|_| DispatchError::InstanceTerminated(id))?;
                debug!(plugin = %id, request_id, function, "Command accepted");
                Ok(CommandTicket {
                    plugin: id,
                    request_id,
                    reply,
                })
            })
            .await
            .unwrap_or(Err(DispatchError::NotFound(id)))
    }
}

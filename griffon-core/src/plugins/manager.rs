//! ProcessManager owns every running plugin instance
//!
//! Each plugin id gets a slot. Structural operations on a slot (start, stop,
//! restart) hold the slot's async lock for their whole duration, so they run
//! one at a time per plugin while different plugins proceed independently.
//! Readers (state queries, dispatch) only take a short read lock on the
//! slot's current instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{info, warn};

use super::descriptor::{PluginDescriptor, PluginId};
use super::instance::{InstanceState, PluginInstance};
use super::launcher::PluginLauncher;
use crate::error::{LaunchFailure, ManagerError};
use crate::events::LogBroadcaster;

#[derive(Default)]
struct Slot {
    ops: tokio::sync::Mutex<()>,
    current: RwLock<Option<Arc<PluginInstance>>>,
    loading: AtomicBool,
}

impl Slot {
    fn current(&self) -> Option<Arc<PluginInstance>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace(&self, instance: PluginInstance) {
        let old = self
            .current
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .replace(Arc::new(instance));
        // The previous instance is terminated; dropping it reaps leftovers
        drop(old);
    }
}

/// Starts, stops and tracks plugin instances
pub struct ProcessManager {
    slots: tokio::sync::RwLock<HashMap<PluginId, Arc<Slot>>>,
    launcher: Arc<dyn PluginLauncher>,
    broadcaster: LogBroadcaster,
    handshake_timeout: Duration,
    stop_timeout: Duration,
}

impl ProcessManager {
    pub fn new(
        launcher: Arc<dyn PluginLauncher>,
        broadcaster: LogBroadcaster,
        handshake_timeout: Duration,
        stop_timeout: Duration,
    ) -> Self {
        Self {
            slots: tokio::sync::RwLock::new(HashMap::new()),
            launcher,
            broadcaster,
            handshake_timeout,
            stop_timeout,
        }
    }

    async fn slot(&self, id: PluginId) -> Option<Arc<Slot>> {
        self.slots.read().await.get(&id).cloned()
    }

    async fn slot_or_insert(&self, id: PluginId) -> Arc<Slot> {
        self.slots.write().await.entry(id).or_default().clone()
    }

    /// Launch `descriptor` and wait for its handshake.
    ///
    /// Fails with `AlreadyRunning` if a live instance exists; a terminated
    /// one is replaced.
    pub async fn start(&self, descriptor: PluginDescriptor) -> Result<(), ManagerError> {
        let id = descriptor.id();
        let slot = self.slot_or_insert(id).await;
        let _ops = slot.ops.lock().await;

        if slot.current().is_some_and(|instance| !instance.is_terminated()) {
            return Err(ManagerError::AlreadyRunning(id));
        }
        self.launch_into(&slot, descriptor).await
    }

    /// Stop the instance for `id`. Stopping a terminated instance is a no-op.
    pub async fn stop(&self, id: PluginId) -> Result<(), ManagerError> {
        let slot = self.slot(id).await.ok_or(ManagerError::NotFound(id))?;
        let _ops = slot.ops.lock().await;
        if let Some(instance) = slot.current() {
            instance.stop(self.stop_timeout).await;
        }
        Ok(())
    }

    /// Stop whatever runs under the descriptor's id, then start it afresh
    pub async fn restart(&self, descriptor: PluginDescriptor) -> Result<(), ManagerError> {
        let slot = self.slot_or_insert(descriptor.id()).await;
        let _ops = slot.ops.lock().await;
        if let Some(instance) = slot.current() {
            instance.stop(self.stop_timeout).await;
        }
        self.launch_into(&slot, descriptor).await
    }

    /// Stop every instance concurrently
    pub async fn stop_all(&self) {
        let slots: Vec<Arc<Slot>> = self.slots.read().await.values().cloned().collect();
        let mut stopping = JoinSet::new();
        for slot in slots {
            let timeout = self.stop_timeout;
            stopping.spawn(async move {
                let _ops = slot.ops.lock().await;
                if let Some(instance) = slot.current() {
                    instance.stop(timeout).await;
                }
            });
        }
        while stopping.join_next().await.is_some() {}
    }

    /// Current state, or `None` if `id` was never started successfully
    pub async fn state(&self, id: PluginId) -> Option<InstanceState> {
        let slot = self.slot(id).await?;
        if slot.loading.load(Ordering::SeqCst) {
            return Some(InstanceState::Loading);
        }
        slot.current().map(|instance| instance.state())
    }

    /// Ids of all `Ready` or `Busy` instances, ascending
    pub async fn live_ids(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self
            .slots
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.current().is_some_and(|i| i.state().is_live()))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Run `f` against the current instance for `id`
    pub async fn with_instance<R>(
        &self,
        id: PluginId,
        f: impl FnOnce(&PluginInstance) -> R,
    ) -> Option<R> {
        let instance = self.slot(id).await?.current()?;
        Some(f(&instance))
    }

    async fn launch_into(&self, slot: &Slot, descriptor: PluginDescriptor) -> Result<(), ManagerError> {
        let id = descriptor.id();
        let name = descriptor.name().to_string();

        slot.loading.store(true, Ordering::SeqCst);
        let result = self.launch(descriptor).await;
        slot.loading.store(false, Ordering::SeqCst);

        match result {
            Ok(instance) => {
                info!(plugin = %id, name = %name, "Plugin started");
                slot.replace(instance);
                Ok(())
            }
            Err(source) => {
                warn!(plugin = %id, name = %name, error = %source, "Plugin failed to start");
                Err(ManagerError::Launch { plugin: id, source })
            }
        }
    }

    async fn launch(&self, descriptor: PluginDescriptor) -> Result<PluginInstance, LaunchFailure> {
        let channel = self.launcher.launch(&descriptor).await?;
        PluginInstance::start(
            descriptor,
            channel,
            self.broadcaster.clone(),
            self.handshake_timeout,
        )
        .await
    }
}

//! PluginHost - single entry point for consumers

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::error::{HostError, ManagerError};
use crate::events::{LogBroadcaster, LogEvent, LogSubscription};
use crate::plugins::{
    CommandTicket, DescriptorStore, DirectorySource, Dispatcher, InstanceState, ManifestSource,
    PluginDescriptor, PluginId, PluginLauncher, ProcessLauncher, ProcessManager,
};

/// Facade over discovery, lifecycle, dispatch and log fan-out.
///
/// Every method reports failures as [`HostError`].
pub struct PluginHost {
    store: DescriptorStore,
    manager: Arc<ProcessManager>,
    dispatcher: Dispatcher,
    broadcaster: LogBroadcaster,
}

impl PluginHost {
    /// Host that discovers plugins in `config.plugin_dirs` and runs them as
    /// child processes
    pub fn new(config: HostConfig) -> Self {
        Self::with_parts(
            DirectorySource::new(config.plugin_dirs.clone()),
            Arc::new(ProcessLauncher),
            &config,
        )
    }

    /// Host with a custom manifest source and launcher
    pub fn with_parts(
        source: impl ManifestSource + 'static,
        launcher: Arc<dyn PluginLauncher>,
        config: &HostConfig,
    ) -> Self {
        let broadcaster = LogBroadcaster::new(config.history_capacity, config.subscriber_queue);
        let manager = Arc::new(ProcessManager::new(
            launcher,
            broadcaster.clone(),
            config.handshake_timeout(),
            config.stop_timeout(),
        ));
        let mut store = DescriptorStore::new(source);
        if let Some(runner) = &config.runner {
            store = store.with_runner(runner.clone());
        }
        Self {
            store,
            dispatcher: Dispatcher::new(manager.clone()),
            manager,
            broadcaster,
        }
    }

    /// Re-read the plugin source, replacing the descriptor set atomically
    pub fn discover(&self) -> Result<Vec<PluginDescriptor>, HostError> {
        Ok(self.store.discover()?.as_ref().clone())
    }

    /// Re-discover and stop running plugins that are no longer available
    pub async fn rescan(&self) -> Result<Vec<PluginDescriptor>, HostError> {
        let descriptors = self.discover()?;
        for id in self.manager.live_ids().await {
            if !descriptors.iter().any(|d| d.id() == id) {
                info!(plugin = %id, "Plugin removed, stopping it");
                self.manager.stop(id).await?;
            }
        }
        Ok(descriptors)
    }

    /// Descriptors of the last completed discovery
    pub fn list_plugins(&self) -> Vec<PluginDescriptor> {
        self.store.snapshot().as_ref().clone()
    }

    /// Find a plugin by numeric id or by name
    pub fn resolve(&self, name_or_id: &str) -> Result<PluginId, HostError> {
        if let Ok(id) = name_or_id.parse::<PluginId>() {
            if self.store.get(id).is_some() {
                return Ok(id);
            }
        }
        self.store
            .find_by_name(name_or_id)
            .map(|d| d.id())
            .ok_or_else(|| HostError::not_found(name_or_id))
    }

    pub async fn start(&self, id: PluginId) -> Result<(), HostError> {
        let descriptor = self.descriptor(id)?;
        Ok(self.manager.start(descriptor).await?)
    }

    /// Start every discovered plugin that is not running yet.
    ///
    /// Returns the plugins that failed to start.
    pub async fn start_all(&self) -> Vec<(PluginId, HostError)> {
        let mut failures = Vec::new();
        for descriptor in self.store.snapshot().iter() {
            let id = descriptor.id();
            match self.manager.start(descriptor.clone()).await {
                Ok(()) | Err(ManagerError::AlreadyRunning(_)) => {}
                Err(e) => failures.push((id, e.into())),
            }
        }
        failures
    }

    /// Stop a plugin. Stopping one that is not running does nothing.
    pub async fn stop(&self, id: PluginId) -> Result<(), HostError> {
        self.ensure_known(id)?;
        match self.manager.stop(id).await {
            Ok(()) | Err(ManagerError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop the plugin and start it again from its current descriptor
    pub async fn restart(&self, id: PluginId) -> Result<(), HostError> {
        let descriptor = self.descriptor(id)?;
        Ok(self.manager.restart(descriptor).await?)
    }

    /// Instance state, `None` if the plugin was never started
    pub async fn state(&self, id: PluginId) -> Result<Option<InstanceState>, HostError> {
        self.ensure_known(id)?;
        Ok(self.manager.state(id).await)
    }

    /// Hand `function` to a running plugin without waiting for it to run
    pub async fn invoke(
        &self,
        id: PluginId,
        function: &str,
        payload: Value,
    ) -> Result<CommandTicket, HostError> {
        Ok(self.dispatcher.dispatch(id, function, payload).await?)
    }

    /// Live events of plugin `id`, from now on
    pub fn subscribe(&self, id: PluginId) -> Result<LogSubscription, HostError> {
        self.ensure_known(id)?;
        Ok(self.broadcaster.subscribe(id))
    }

    /// Buffered events of plugin `id`, oldest first
    pub fn history(&self, id: PluginId) -> Result<Vec<LogEvent>, HostError> {
        self.ensure_known(id)?;
        Ok(self.broadcaster.history(id))
    }

    /// Stop every running plugin
    pub async fn shutdown(&self) {
        let live = self.manager.live_ids().await;
        if !live.is_empty() {
            info!(count = live.len(), "Stopping plugins");
        }
        self.manager.stop_all().await;
    }

    fn descriptor(&self, id: PluginId) -> Result<PluginDescriptor, HostError> {
        self.store.get(id).ok_or_else(|| {
            warn!(plugin = %id, "Unknown plugin");
            HostError::not_found(id)
        })
    }

    fn ensure_known(&self, id: PluginId) -> Result<(), HostError> {
        if self.store.knows(id) {
            Ok(())
        } else {
            Err(HostError::not_found(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{MockLauncher, PluginManifest, ScriptedPlugin};
    use serde_json::json;

    fn host(manifests: Vec<PluginManifest>, launcher: MockLauncher) -> PluginHost {
        let config = HostConfig {
            handshake_timeout_ms: 500,
            stop_timeout_ms: 500,
            ..Default::default()
        };
        PluginHost::with_parts(manifests, Arc::new(launcher), &config)
    }

    fn scanner_host() -> PluginHost {
        host(
            vec![PluginManifest::new("scanner", "scanner", ["scan"])],
            MockLauncher::new().with_plugin("scanner", || ScriptedPlugin::new(["scan"])),
        )
    }

    #[test]
    fn list_is_empty_until_discovery() {
        let host = scanner_host();
        assert!(host.list_plugins().is_empty());
        assert_eq!(host.discover().unwrap().len(), 1);
        assert_eq!(host.list_plugins()[0].name(), "scanner");
    }

    #[test]
    fn resolve_accepts_name_or_id() {
        let host = scanner_host();
        host.discover().unwrap();

        assert_eq!(host.resolve("scanner").unwrap(), PluginId::new(1));
        assert_eq!(host.resolve("1").unwrap(), PluginId::new(1));
        assert!(matches!(host.resolve("2"), Err(HostError::NotFound { .. })));
        assert!(matches!(host.resolve("ghost"), Err(HostError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let host = scanner_host();
        host.discover().unwrap();
        let ghost = PluginId::new(99);

        assert!(matches!(host.start(ghost).await, Err(HostError::NotFound { .. })));
        assert!(matches!(host.stop(ghost).await, Err(HostError::NotFound { .. })));
        assert!(matches!(host.state(ghost).await, Err(HostError::NotFound { .. })));
        assert!(matches!(host.subscribe(ghost), Err(HostError::NotFound { .. })));
        assert!(matches!(host.history(ghost), Err(HostError::NotFound { .. })));
        assert!(matches!(
            host.invoke(ghost, "scan", Value::Null).await,
            Err(HostError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let host = scanner_host();
        host.discover().unwrap();
        host.stop(PluginId::new(1)).await.unwrap();
        assert_eq!(host.state(PluginId::new(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn launch_failure_is_launch_error() {
        let host = host(
            vec![PluginManifest::new("broken", "broken", ["scan"])],
            MockLauncher::new().failing("broken"),
        );
        host.discover().unwrap();

        let result = host.start(PluginId::new(1)).await;
        assert!(matches!(result, Err(HostError::LaunchError { .. })));
    }

    #[tokio::test]
    async fn start_all_reports_failures_only() {
        let host = host(
            vec![
                PluginManifest::new("scanner", "scanner", ["scan"]),
                PluginManifest::new("broken", "broken", ["scan"]),
            ],
            MockLauncher::new()
                .with_plugin("scanner", || ScriptedPlugin::new(["scan"]))
                .failing("broken"),
        );
        host.discover().unwrap();
        host.start(PluginId::new(1)).await.unwrap();

        let failures = host.start_all().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, PluginId::new(2));
    }

    #[tokio::test]
    async fn invoke_and_wait_for_reply() {
        let host = scanner_host();
        host.discover().unwrap();
        host.start(PluginId::new(1)).await.unwrap();

        let ticket = host
            .invoke(PluginId::new(1), "scan", json!({"path": "/tmp/x"}))
            .await
            .unwrap();
        assert!(ticket.receipt().accepted);
        let reply = ticket.wait().await.unwrap();
        assert!(reply.ok);

        let history = host.history(PluginId::new(1)).unwrap();
        assert!(history.iter().any(|e| e.reply().is_some()));
    }

    #[tokio::test]
    async fn rescan_stops_removed_plugins() {
        use std::sync::Mutex;

        struct Shared(Arc<Mutex<Vec<PluginManifest>>>);
        impl ManifestSource for Shared {
            fn manifests(&self) -> Result<Vec<PluginManifest>, crate::error::DiscoveryError> {
                Ok(self.0.lock().unwrap().clone())
            }
        }

        let manifests = Arc::new(Mutex::new(vec![PluginManifest::new(
            "scanner",
            "scanner",
            ["scan"],
        )]));
        let host = PluginHost::with_parts(
            Shared(manifests.clone()),
            Arc::new(MockLauncher::new().with_plugin("scanner", || ScriptedPlugin::new(["scan"]))),
            &HostConfig::default(),
        );
        host.discover().unwrap();
        host.start(PluginId::new(1)).await.unwrap();

        manifests.lock().unwrap().clear();
        let remaining = host.rescan().await.unwrap();

        assert!(remaining.is_empty());
        assert_eq!(
            host.state(PluginId::new(1)).await.unwrap(),
            Some(InstanceState::Terminated)
        );
        // Gone from the list, but its history is still readable
        assert!(host.history(PluginId::new(1)).unwrap().iter().any(|e| e.is_terminal()));
    }

    #[tokio::test]
    async fn shutdown_stops_everything() {
        let host = scanner_host();
        host.discover().unwrap();
        host.start(PluginId::new(1)).await.unwrap();

        host.shutdown().await;
        assert_eq!(
            host.state(PluginId::new(1)).await.unwrap(),
            Some(InstanceState::Terminated)
        );
    }
}

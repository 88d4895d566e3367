//! In-memory launcher for testing
//!
//! MockLauncher serves in-process [`Plugin`] implementations over a duplex
//! pipe using the same protocol runtime a real plugin executable uses, so
//! tests exercise the full handshake and framing without spawning processes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use griffon_plugin_api::{LogSink, Plugin, PluginError};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::debug;

use super::descriptor::PluginDescriptor;
use super::launcher::{PluginChannel, PluginLauncher};
use crate::error::LaunchFailure;

const PIPE_CAPACITY: usize = 64 * 1024;

type Factory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

enum Behavior {
    Serve(Factory),
    /// Launch fails as if the executable were missing
    Fail,
    /// Channel opens but the plugin never answers
    Silent,
}

/// Launcher whose plugins live in the test process
#[derive(Default)]
pub struct MockLauncher {
    behaviors: HashMap<String, Behavior>,
    running: Mutex<HashMap<String, Vec<JoinHandle<()>>>>,
    launches: Mutex<HashMap<String, usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a fresh plugin from `factory` each time `name` is launched
    pub fn with_plugin<P, F>(mut self, name: &str, factory: F) -> Self
    where
        P: Plugin + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || Box::new(factory()) as Box<dyn Plugin>);
        self.behaviors
            .insert(name.to_string(), Behavior::Serve(factory));
        self
    }

    /// Make every launch of `name` fail
    pub fn failing(mut self, name: &str) -> Self {
        self.behaviors.insert(name.to_string(), Behavior::Fail);
        self
    }

    /// Launch `name` but never complete its handshake
    pub fn silent(mut self, name: &str) -> Self {
        self.behaviors.insert(name.to_string(), Behavior::Silent);
        self
    }

    /// Simulate a crash: drop every running copy of `name` mid-flight
    pub fn kill(&self, name: &str) {
        if let Some(tasks) = lock(&self.running).remove(name) {
            debug!(plugin = %name, count = tasks.len(), "Killing mock plugin");
            for task in tasks {
                task.abort();
            }
        }
    }

    /// How many times `name` was launched
    pub fn launch_count(&self, name: &str) -> usize {
        lock(&self.launches).get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PluginLauncher for MockLauncher {
    async fn launch(&self, descriptor: &PluginDescriptor) -> Result<PluginChannel, LaunchFailure> {
        let name = descriptor.name();
        *lock(&self.launches).entry(name.to_string()).or_default() += 1;

        let behavior = match self.behaviors.get(name) {
            Some(Behavior::Serve(factory)) => Behavior::Serve(factory.clone()),
            Some(Behavior::Silent) => Behavior::Silent,
            Some(Behavior::Fail) | None => {
                return Err(LaunchFailure::Spawn {
                    executable: descriptor.launch().executable.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("no mock plugin named '{name}'"),
                    ),
                });
            }
        };

        let (host_side, plugin_side) = tokio::io::duplex(PIPE_CAPACITY);
        let (host_reader, host_writer) = tokio::io::split(host_side);
        let (mut plugin_reader, plugin_writer) = tokio::io::split(plugin_side);

        let task = if let Behavior::Serve(factory) = behavior {
            let plugin = factory();
            tokio::spawn(async move {
                if let Err(e) = griffon_plugin_api::serve(plugin, plugin_reader, plugin_writer).await {
                    debug!(error = %e, "Mock plugin stopped serving");
                }
            })
        } else {
            tokio::spawn(async move {
                let _keep_open = plugin_writer;
                let _ = tokio::io::copy(&mut plugin_reader, &mut tokio::io::sink()).await;
            })
        };
        lock(&self.running)
            .entry(name.to_string())
            .or_default()
            .push(task);

        Ok(PluginChannel::new(host_reader, host_writer))
    }
}

/// Plugin that records its calls and answers them predictably.
///
/// Every call logs one line, then sleeps for the configured delay. A
/// function named `fail` returns an error; anything else echoes its input.
/// Clones share the call log.
#[derive(Clone)]
pub struct ScriptedPlugin {
    name: String,
    functions: Vec<String>,
    delay: Duration,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl ScriptedPlugin {
    pub fn new(functions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: "scripted".to_string(),
            functions: functions.into_iter().map(Into::into).collect(),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls received so far, in arrival order
    pub fn calls(&self) -> Vec<(String, Value)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Plugin for ScriptedPlugin {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn functions(&self) -> Vec<String> {
        self.functions.clone()
    }

    async fn call(
        &mut self,
        function: &str,
        payload: Value,
        log: &LogSink,
    ) -> Result<Value, PluginError> {
        lock(&self.calls).push((function.to_string(), payload.clone()));
        log.info(format!("{function} started"));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match function {
            "fail" => Err(PluginError::custom(format!("{function} failed"))),
            _ => Ok(json!({"function": function, "payload": payload})),
        }
    }
}

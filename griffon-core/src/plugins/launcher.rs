//! Launching plugin executables

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

use super::descriptor::PluginDescriptor;
use crate::error::LaunchFailure;

/// Byte streams to a freshly launched plugin, before the handshake
pub struct PluginChannel {
    /// Plugin → host frames
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Host → plugin frames
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Free-form diagnostics, read line by line
    pub stderr: Option<Box<dyn AsyncRead + Send + Unpin>>,
    /// OS process backing the channel, if any
    pub process: Option<Child>,
}

impl PluginChannel {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            stderr: None,
            process: None,
        }
    }
}

/// Starts plugin executables
#[async_trait]
pub trait PluginLauncher: Send + Sync {
    async fn launch(&self, descriptor: &PluginDescriptor) -> Result<PluginChannel, LaunchFailure>;
}

/// Runs each plugin as a child process speaking frames over stdin/stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl PluginLauncher for ProcessLauncher {
    async fn launch(&self, descriptor: &PluginDescriptor) -> Result<PluginChannel, LaunchFailure> {
        let spec = descriptor.launch();
        let mut command = Command::new(&spec.executable);
        command
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| LaunchFailure::Spawn {
            executable: spec.executable.clone(),
            source,
        })?;
        debug!(
            plugin = %descriptor.id(),
            executable = %spec.executable.display(),
            pid = ?child.id(),
            "Spawned plugin process"
        );

        let stdin = child.stdin.take().ok_or(LaunchFailure::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(LaunchFailure::MissingPipe("stdout"))?;
        let stderr = child.stderr.take();

        Ok(PluginChannel {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            stderr: stderr.map(|s| Box::new(s) as Box<dyn AsyncRead + Send + Unpin>),
            process: Some(child),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{LaunchSpec, PluginId};
    use std::path::PathBuf;

    #[tokio::test]
    async fn missing_executable_is_a_spawn_failure() {
        let descriptor = PluginDescriptor::new(PluginId::new(1), "ghost", vec![]).with_launch(
            LaunchSpec {
                executable: PathBuf::from("/nonexistent/griffon-plugin"),
                ..Default::default()
            },
        );

        let result = ProcessLauncher.launch(&descriptor).await;
        match result {
            Err(LaunchFailure::Spawn { executable, .. }) => {
                assert_eq!(executable, PathBuf::from("/nonexistent/griffon-plugin"));
            }
            Err(other) => panic!("unexpected failure {other}"),
            Ok(_) => panic!("launch should fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_pipes_all_streams() {
        let descriptor = PluginDescriptor::new(PluginId::new(1), "cat", vec![]).with_launch(
            LaunchSpec {
                executable: PathBuf::from("cat"),
                ..Default::default()
            },
        );

        let channel = ProcessLauncher.launch(&descriptor).await.unwrap();
        assert!(channel.stderr.is_some());
        let mut child = channel.process.unwrap();
        assert!(child.id().is_some());
        child.kill().await.unwrap();
    }
}

//! A running plugin and its channel
//!
//! Each instance runs up to three tasks:
//!
//! - the reader drains plugin frames into the broadcaster and completes
//!   in-flight commands,
//! - the driver writes queued commands to the plugin one at a time, in the
//!   order they were accepted,
//! - the stderr reader (process plugins only) turns stderr lines into events.
//!
//! State, queue and the in-flight command live under one lock so that a
//! command is either accepted before termination (and then aborted by it) or
//! rejected outright.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use griffon_plugin_api::message::{ERROR_INVALID_INPUT, HelloOk};
use griffon_plugin_api::{Call, FrameReader, FrameWriter, Message, ProtocolError};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::descriptor::{PluginDescriptor, PluginId};
use super::launcher::PluginChannel;
use crate::error::LaunchFailure;
use crate::events::{CommandReply, Lifecycle, LogBroadcaster, LogPayload};

/// How long a dead plugin gets to report its exit status and flush stderr
const REAP_TIMEOUT: Duration = Duration::from_millis(200);

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle state of a plugin instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    /// Launched, handshake not finished
    Loading,
    /// Idle and accepting commands
    Ready,
    /// A command is in flight
    Busy,
    /// Crashed or stopped; accepts nothing
    Terminated,
}

impl InstanceState {
    pub fn is_live(self) -> bool {
        matches!(self, Self::Ready | Self::Busy)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// The instance terminated before the command completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

pub(crate) type ReplyReceiver = oneshot::Receiver<Result<CommandReply, Aborted>>;
type ReplySender = oneshot::Sender<Result<CommandReply, Aborted>>;

struct QueuedCommand {
    request_id: u32,
    call: Call,
    reply: ReplySender,
}

struct InFlight {
    request_id: u32,
    reply: ReplySender,
}

struct Core {
    state: InstanceState,
    queue: VecDeque<QueuedCommand>,
    in_flight: Option<InFlight>,
    next_request_id: u32,
}

enum Next {
    Send { request_id: u32, call: Call },
    Wait,
    Exit,
}

#[derive(Default)]
struct Tasks {
    reader: Option<JoinHandle<()>>,
    driver: Option<JoinHandle<()>>,
    stderr: Option<JoinHandle<()>>,
}

struct InstanceShared {
    descriptor: PluginDescriptor,
    pid: Option<u32>,
    core: Mutex<Core>,
    wake: Notify,
    // `None` once stop closed the channel
    writer: tokio::sync::Mutex<Option<FrameWriter<BoxWriter>>>,
    process: tokio::sync::Mutex<Option<Child>>,
    tasks: Mutex<Tasks>,
    cancel: CancellationToken,
    broadcaster: LogBroadcaster,
}

/// Live handle to one running plugin.
///
/// Dropping the last handle kills the process and aborts its tasks.
pub struct PluginInstance {
    shared: Arc<InstanceShared>,
}

impl PluginInstance {
    /// Complete the handshake on `channel` and start serving commands.
    ///
    /// The plugin must answer `Hello` within `handshake_timeout` and list
    /// every function `descriptor` declares.
    pub async fn start(
        descriptor: PluginDescriptor,
        channel: PluginChannel,
        broadcaster: LogBroadcaster,
        handshake_timeout: Duration,
    ) -> Result<Self, LaunchFailure> {
        let PluginChannel {
            reader,
            writer,
            stderr,
            process,
        } = channel;
        let pid = process.as_ref().and_then(Child::id);
        let mut reader = FrameReader::new(reader);
        let mut writer = FrameWriter::new(writer);

        // On any failure below `process` is dropped, which kills the child
        let hello = tokio::time::timeout(handshake_timeout, handshake(&mut reader, &mut writer))
            .await
            .map_err(|_| LaunchFailure::HandshakeTimeout(handshake_timeout))??;

        let missing: Vec<String> = descriptor
            .functions()
            .iter()
            .filter(|f| !hello.functions.contains(*f))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(LaunchFailure::MissingFunctions(missing));
        }
        if hello.name != descriptor.name() {
            debug!(
                plugin = %descriptor.id(),
                manifest_name = %descriptor.name(),
                reported_name = %hello.name,
                "Plugin reports a different name than its manifest"
            );
        }

        let shared = Arc::new(InstanceShared {
            descriptor,
            pid,
            core: Mutex::new(Core {
                state: InstanceState::Ready,
                queue: VecDeque::new(),
                in_flight: None,
                next_request_id: 1,
            }),
            wake: Notify::new(),
            writer: tokio::sync::Mutex::new(Some(writer)),
            process: tokio::sync::Mutex::new(process),
            tasks: Mutex::new(Tasks::default()),
            cancel: CancellationToken::new(),
            broadcaster,
        });

        info!(plugin = %shared.id(), name = %shared.descriptor.name(), pid = ?pid, "Plugin ready");
        shared.publish(LogPayload::Lifecycle(Lifecycle::Started {
            name: shared.descriptor.name().to_string(),
            pid,
        }));

        let tasks = Tasks {
            reader: Some(tokio::spawn(read_loop(shared.clone(), reader))),
            driver: Some(tokio::spawn(drive_loop(shared.clone()))),
            stderr: stderr.map(|stderr| tokio::spawn(stderr_loop(shared.clone(), stderr))),
        };
        *shared.lock_tasks() = tasks;

        Ok(Self { shared })
    }

    pub fn id(&self) -> PluginId {
        self.shared.id()
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.shared.descriptor
    }

    pub fn pid(&self) -> Option<u32> {
        self.shared.pid
    }

    pub fn state(&self) -> InstanceState {
        self.shared.lock_core().state
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == InstanceState::Terminated
    }

    /// Commands accepted but not yet written to the plugin
    pub fn queued(&self) -> usize {
        self.shared.lock_core().queue.len()
    }

    /// Accept a command for in-order delivery.
    ///
    /// Fails only if the instance is already terminated.
    pub(crate) fn enqueue(
        &self,
        function: &str,
        payload: Value,
    ) -> Result<(u32, ReplyReceiver), Aborted> {
        let (tx, rx) = oneshot::channel();
        let request_id = {
            let mut core = self.shared.lock_core();
            if core.state == InstanceState::Terminated {
                return Err(Aborted);
            }
            let request_id = core.next_request_id;
            // Request id 0 marks unsolicited plugin output
            core.next_request_id = core.next_request_id.checked_add(1).unwrap_or(1);
            core.queue.push_back(QueuedCommand {
                request_id,
                call: Call {
                    function: function.to_string(),
                    payload,
                },
                reply: tx,
            });
            if core.state == InstanceState::Ready {
                core.state = InstanceState::Busy;
            }
            request_id
        };
        self.shared.wake.notify_one();
        Ok((request_id, rx))
    }

    /// Shut the plugin down.
    ///
    /// Queued and in-flight commands are aborted, the plugin is asked to
    /// exit and gets `timeout` to close its channel before it is killed.
    /// Stopping a terminated instance does nothing.
    pub async fn stop(&self, timeout: Duration) {
        let shared = &self.shared;
        let Some(aborted) = shared.mark_terminated() else {
            return;
        };
        info!(plugin = %shared.id(), aborted = aborted.len(), "Stopping plugin");

        let goodbye = tokio::time::timeout(timeout, async {
            if let Some(mut writer) = shared.writer.lock().await.take() {
                if let Ok(frame) = Message::Shutdown.into_frame() {
                    let _ = writer.write_frame(&frame).await;
                }
                let _ = writer.shutdown().await;
            }
        });
        if goodbye.await.is_err() {
            debug!(plugin = %shared.id(), "Plugin not reading its input, skipping shutdown frame");
        }

        let reader = shared.lock_tasks().reader.take();
        if let Some(mut reader) = reader {
            if tokio::time::timeout(timeout, &mut reader).await.is_err() {
                warn!(plugin = %shared.id(), ?timeout, "Plugin did not exit in time, killing it");
                reader.abort();
            }
        }

        if let Some(child) = shared.process.lock().await.as_mut() {
            if !matches!(child.try_wait(), Ok(Some(_))) {
                let _ = child.start_kill();
                let _ = tokio::time::timeout(REAP_TIMEOUT, child.wait()).await;
            }
        }
        shared.drain_stderr().await;
        shared.abort_tasks();

        shared.publish(LogPayload::Lifecycle(Lifecycle::Stopped { aborted }));
    }
}

impl Drop for PluginInstance {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
        if let Ok(mut process) = self.shared.process.try_lock() {
            if let Some(child) = process.as_mut() {
                let _ = child.start_kill();
            }
        }
        self.shared.abort_tasks();
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.id())
            .field("name", &self.descriptor().name())
            .field("state", &self.state())
            .finish()
    }
}

impl InstanceShared {
    fn id(&self) -> PluginId {
        self.descriptor.id()
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, payload: LogPayload) {
        self.broadcaster.publish(self.id(), payload);
    }

    /// Move to `Terminated` and abort every pending command.
    ///
    /// Returns the aborted request ids in dispatch order, or `None` if the
    /// instance was already terminated.
    fn mark_terminated(&self) -> Option<Vec<u32>> {
        let (in_flight, queued) = {
            let mut core = self.lock_core();
            if core.state == InstanceState::Terminated {
                return None;
            }
            core.state = InstanceState::Terminated;
            (core.in_flight.take(), std::mem::take(&mut core.queue))
        };

        let mut aborted = Vec::with_capacity(queued.len() + 1);
        if let Some(in_flight) = in_flight {
            aborted.push(in_flight.request_id);
            let _ = in_flight.reply.send(Err(Aborted));
        }
        for command in queued {
            aborted.push(command.request_id);
            let _ = command.reply.send(Err(Aborted));
        }

        self.cancel.cancel();
        self.wake.notify_one();
        Some(aborted)
    }

    /// Pick the next command to write, if the plugin is free for one
    fn next_command(&self) -> Next {
        let mut core = self.lock_core();
        if core.state == InstanceState::Terminated {
            return Next::Exit;
        }
        if core.in_flight.is_some() {
            return Next::Wait;
        }
        match core.queue.pop_front() {
            Some(command) => {
                core.state = InstanceState::Busy;
                core.in_flight = Some(InFlight {
                    request_id: command.request_id,
                    reply: command.reply,
                });
                Next::Send {
                    request_id: command.request_id,
                    call: command.call,
                }
            }
            None => Next::Wait,
        }
    }

    /// Resolve the in-flight command and free the plugin for the next one
    fn complete(&self, request_id: u32, ok: bool, output: Value) {
        let in_flight = {
            let mut core = self.lock_core();
            match &core.in_flight {
                Some(f) if f.request_id == request_id => {}
                _ => {
                    debug!(plugin = %self.id(), request_id, "Reply for a command that is not in flight");
                    return;
                }
            }
            let in_flight = core.in_flight.take();
            if core.state == InstanceState::Busy && core.queue.is_empty() {
                core.state = InstanceState::Ready;
            }
            in_flight
        };

        let reply = CommandReply {
            request_id,
            ok,
            output,
        };
        self.publish(LogPayload::Reply(reply.clone()));
        if let Some(in_flight) = in_flight {
            let _ = in_flight.reply.send(Ok(reply));
        }
        self.wake.notify_one();
    }

    fn handle_frame(&self, message: Message) -> Result<(), ProtocolError> {
        match message {
            Message::Log { request_id, record } => {
                let request_id = (request_id != 0).then_some(request_id);
                let payload = match record.data {
                    Some(data) => LogPayload::Data {
                        text: record.text,
                        data,
                        request_id,
                    },
                    None => LogPayload::Text {
                        level: record.level,
                        text: record.text,
                        request_id,
                    },
                };
                self.publish(payload);
            }
            Message::Result { request_id, result } => {
                self.complete(request_id, result.ok, result.output);
            }
            Message::Error { request_id, error } => {
                self.complete(
                    request_id,
                    false,
                    json!({"code": error.code, "message": error.message}),
                );
            }
            Message::Heartbeat => trace!(plugin = %self.id(), "Heartbeat"),
            other => return Err(ProtocolError::Unexpected(other.msg_type().name())),
        }
        Ok(())
    }

    /// The channel closed without a stop request
    async fn crashed(&self, reason: String) {
        let Some(aborted) = self.mark_terminated() else {
            return;
        };

        let exit_code = match self.process.lock().await.as_mut() {
            Some(child) => match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => status.code(),
                _ => {
                    let _ = child.start_kill();
                    None
                }
            },
            None => None,
        };
        self.drain_stderr().await;

        warn!(
            plugin = %self.id(),
            reason = %reason,
            exit_code = ?exit_code,
            aborted = aborted.len(),
            "Plugin crashed"
        );
        self.publish(LogPayload::Lifecycle(Lifecycle::Crashed {
            reason,
            exit_code,
            aborted,
        }));
    }

    /// Let the stderr reader publish what the plugin printed before it died
    async fn drain_stderr(&self) {
        let stderr = self.lock_tasks().stderr.take();
        if let Some(mut stderr) = stderr {
            if tokio::time::timeout(REAP_TIMEOUT, &mut stderr).await.is_err() {
                stderr.abort();
            }
        }
    }

    fn abort_tasks(&self) {
        let mut tasks = self.lock_tasks();
        for handle in [tasks.reader.take(), tasks.driver.take(), tasks.stderr.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

async fn handshake(
    reader: &mut FrameReader<BoxReader>,
    writer: &mut FrameWriter<BoxWriter>,
) -> Result<HelloOk, LaunchFailure> {
    writer.write_frame(&Message::Hello.into_frame()?).await?;
    loop {
        let Some(frame) = reader.read_frame().await? else {
            return Err(LaunchFailure::Handshake(
                "channel closed before handshake".to_string(),
            ));
        };
        match Message::from_frame(frame)? {
            Message::HelloOk(hello) => return Ok(hello),
            // Plugins may log while initializing
            Message::Log { .. } | Message::Heartbeat => continue,
            other => {
                return Err(LaunchFailure::Handshake(format!(
                    "expected HelloOk, got {}",
                    other.msg_type().name()
                )));
            }
        }
    }
}

async fn read_loop(shared: Arc<InstanceShared>, mut reader: FrameReader<BoxReader>) {
    let reason = loop {
        let message = match reader.read_frame().await {
            Ok(Some(frame)) => Message::from_frame(frame),
            Ok(None) => break "channel closed".to_string(),
            Err(e) => Err(e),
        };
        if let Err(e) = message.and_then(|m| shared.handle_frame(m)) {
            break format!("protocol error: {e}");
        }
    };
    shared.crashed(reason).await;
}

async fn drive_loop(shared: Arc<InstanceShared>) {
    loop {
        match shared.next_command() {
            Next::Exit => break,
            Next::Wait => {
                tokio::select! {
                    _ = shared.wake.notified() => {}
                    _ = shared.cancel.cancelled() => break,
                }
            }
            Next::Send { request_id, call } => {
                trace!(plugin = %shared.id(), request_id, function = %call.function, "Sending call");
                let written = match (Message::Call { request_id, call }).into_frame() {
                    Ok(frame) => match shared.writer.lock().await.as_mut() {
                        Some(writer) => writer.write_frame(&frame).await,
                        None => break,
                    },
                    Err(e) => Err(e),
                };
                match written {
                    Ok(()) => {}
                    Err(ProtocolError::Io(e)) => {
                        shared.crashed(format!("write failed: {e}")).await;
                        break;
                    }
                    // Nothing reached the plugin; fail just this command
                    Err(e) => shared.complete(
                        request_id,
                        false,
                        json!({"code": ERROR_INVALID_INPUT, "message": e.to_string()}),
                    ),
                }
            }
        }
    }
}

async fn stderr_loop(shared: Arc<InstanceShared>, stderr: BoxReader) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        shared.publish(LogPayload::Stderr { line });
    }
}

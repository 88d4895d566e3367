//! Plugin-side runtime
//!
//! A plugin executable implements [`Plugin`] and hands it to [`serve_stdio`].
//! The runtime answers the handshake, runs calls one at a time and streams
//! log lines back while a call is in progress.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::error::{PluginError, ProtocolError};
use crate::frame::{FrameReader, FrameWriter};
use crate::message::{CallResult, ErrorReply, HelloOk, LogLevel, LogRecord, Message};

/// An analysis unit exposing a fixed list of invocable functions
#[async_trait]
pub trait Plugin: Send {
    /// Display name reported in the handshake
    fn name(&self) -> String;

    /// Functions this plugin accepts calls for
    fn functions(&self) -> Vec<String>;

    /// Run one function. Progress goes through `log`; the returned value is
    /// sent back as the call's `Result` output.
    async fn call(
        &mut self,
        function: &str,
        payload: Value,
        log: &LogSink,
    ) -> Result<Value, PluginError>;
}

#[async_trait]
impl<P: Plugin + ?Sized> Plugin for Box<P> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn functions(&self) -> Vec<String> {
        (**self).functions()
    }

    async fn call(
        &mut self,
        function: &str,
        payload: Value,
        log: &LogSink,
    ) -> Result<Value, PluginError> {
        (**self).call(function, payload, log).await
    }
}

/// Handle a plugin uses to stream log lines for the call it is serving
#[derive(Clone)]
pub struct LogSink {
    request_id: u32,
    tx: mpsc::UnboundedSender<Message>,
}

impl LogSink {
    fn new(request_id: u32, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { request_id, tx }
    }

    /// Request id of the call this sink belongs to (0 when unsolicited)
    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        self.send(LogRecord {
            level,
            text: text.into(),
            data: None,
        });
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.log(LogLevel::Debug, text);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.log(LogLevel::Info, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.log(LogLevel::Warn, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.log(LogLevel::Error, text);
    }

    /// Emit structured output alongside a summary line
    pub fn data(&self, text: impl Into<String>, data: Value) {
        self.send(LogRecord {
            level: LogLevel::Info,
            text: text.into(),
            data: Some(data),
        });
    }

    fn send(&self, record: LogRecord) {
        // The writer is gone only once the host hung up; nothing left to tell.
        let _ = self.tx.send(Message::Log {
            request_id: self.request_id,
            record,
        });
    }
}

/// Serve a plugin over the process' stdin/stdout until the host hangs up
pub async fn serve_stdio<P: Plugin>(plugin: P) -> Result<(), ProtocolError> {
    serve(plugin, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve a plugin over an arbitrary byte stream pair.
///
/// Returns when the host sends `Shutdown` or closes its side of the stream.
pub async fn serve<P, R, W>(mut plugin: P, reader: R, writer: W) -> Result<(), ProtocolError>
where
    P: Plugin,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer_task = tokio::spawn(async move {
        let mut writer = FrameWriter::new(writer);
        while let Some(msg) = rx.recv().await {
            let frame = msg.into_frame()?;
            writer.write_frame(&frame).await?;
        }
        Ok::<(), ProtocolError>(())
    });

    let functions = plugin.functions();
    let mut reader = FrameReader::new(reader);
    let outcome = serve_loop(&mut plugin, &functions, &mut reader, &tx).await;

    drop(tx);
    let written = writer_task
        .await
        .map_err(|e| ProtocolError::Io(std::io::Error::other(e)))?;
    outcome.and(written)
}

async fn serve_loop<P, R>(
    plugin: &mut P,
    functions: &[String],
    reader: &mut FrameReader<R>,
    tx: &mpsc::UnboundedSender<Message>,
) -> Result<(), ProtocolError>
where
    P: Plugin,
    R: AsyncRead + Unpin,
{
    while let Some(frame) = reader.read_frame().await? {
        let reply = match Message::from_frame(frame)? {
            Message::Hello => Message::HelloOk(HelloOk {
                name: plugin.name(),
                functions: functions.to_vec(),
            }),
            Message::Heartbeat => Message::Heartbeat,
            Message::Shutdown => {
                tracing::debug!("Shutdown requested by host");
                return Ok(());
            }
            Message::Call { request_id, call } => {
                let sink = LogSink::new(request_id, tx.clone());
                let result = if functions.iter().any(|f| f == &call.function) {
                    plugin.call(&call.function, call.payload, &sink).await
                } else {
                    Err(PluginError::UnknownFunction(call.function))
                };
                match result {
                    Ok(output) => Message::Result {
                        request_id,
                        result: CallResult { ok: true, output },
                    },
                    Err(e) => Message::Error {
                        request_id,
                        error: ErrorReply {
                            code: e.code(),
                            message: e.to_string(),
                        },
                    },
                }
            }
            other => return Err(ProtocolError::Unexpected(other.msg_type().name())),
        };

        if tx.send(reply).is_err() {
            break;
        }
    }
    Ok(())
}

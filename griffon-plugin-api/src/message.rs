//! Typed protocol messages and their JSON payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::frame::{Frame, MsgType};

/// `Error` frame code: the call named a function the plugin does not expose
pub const ERROR_UNKNOWN_FUNCTION: u32 = 1;
/// `Error` frame code: the payload was rejected
pub const ERROR_INVALID_INPUT: u32 = 2;
/// `Error` frame code: the function ran and failed
pub const ERROR_CALL_FAILED: u32 = 3;

/// Handshake answer: who the plugin is and what it can do
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloOk {
    pub name: String,
    pub functions: Vec<String>,
}

/// A function invocation sent by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub function: String,
    #[serde(default)]
    pub payload: Value,
}

/// Successful (or soft-failed) completion of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    pub ok: bool,
    #[serde(default)]
    pub output: Value,
}

/// Hard failure of a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: u32,
    pub message: String,
}

/// Severity of a plugin log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A log line emitted by a plugin, optionally with structured data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Every message either side can send
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello,
    HelloOk(HelloOk),
    Call { request_id: u32, call: Call },
    Result { request_id: u32, result: CallResult },
    /// `request_id` is the call being served, or 0 for unsolicited output
    Log { request_id: u32, record: LogRecord },
    Heartbeat,
    Error { request_id: u32, error: ErrorReply },
    Shutdown,
}

impl Message {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Self::Hello => MsgType::Hello,
            Self::HelloOk(_) => MsgType::HelloOk,
            Self::Call { .. } => MsgType::Call,
            Self::Result { .. } => MsgType::Result,
            Self::Log { .. } => MsgType::Log,
            Self::Heartbeat => MsgType::Heartbeat,
            Self::Error { .. } => MsgType::Error,
            Self::Shutdown => MsgType::Shutdown,
        }
    }

    pub fn into_frame(self) -> Result<Frame, ProtocolError> {
        let msg_type = self.msg_type();
        let frame = match self {
            Self::Hello | Self::Heartbeat | Self::Shutdown => Frame::empty(msg_type),
            Self::HelloOk(p) => Frame::new(msg_type, 0, serde_json::to_vec(&p)?),
            Self::Call { request_id, call } => {
                Frame::new(msg_type, request_id, serde_json::to_vec(&call)?)
            }
            Self::Result { request_id, result } => {
                Frame::new(msg_type, request_id, serde_json::to_vec(&result)?)
            }
            Self::Log { request_id, record } => {
                Frame::new(msg_type, request_id, serde_json::to_vec(&record)?)
            }
            Self::Error { request_id, error } => {
                Frame::new(msg_type, request_id, serde_json::to_vec(&error)?)
            }
        };
        Ok(frame)
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let request_id = frame.request_id;
        let bytes = frame.payload.as_slice();
        Ok(match frame.msg_type {
            MsgType::Hello => Self::Hello,
            MsgType::Heartbeat => Self::Heartbeat,
            MsgType::Shutdown => Self::Shutdown,
            MsgType::HelloOk => Self::HelloOk(serde_json::from_slice(bytes)?),
            MsgType::Call => Self::Call {
                request_id,
                call: serde_json::from_slice(bytes)?,
            },
            MsgType::Result => Self::Result {
                request_id,
                result: serde_json::from_slice(bytes)?,
            },
            MsgType::Log => Self::Log {
                request_id,
                record: serde_json::from_slice(bytes)?,
            },
            MsgType::Error => Self::Error {
                request_id,
                error: serde_json::from_slice(bytes)?,
            },
        })
    }
}

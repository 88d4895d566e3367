//! Log event types relayed from plugins to consumers

use chrono::{DateTime, Utc};
use griffon_plugin_api::LogLevel;
use serde::Serialize;
use serde_json::Value;

use crate::plugins::PluginId;

/// Per-plugin sequence number (starts at 1, strictly increasing)
pub type EventSeq = u64;

/// One unit of plugin output, tagged with its source plugin
///
/// Serializes as `{id, seq, timestamp, text, payload}` so text-only
/// transports can ignore the structured payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "EventRecord")]
pub struct LogEvent {
    pub plugin: PluginId,
    pub seq: EventSeq,
    pub timestamp: DateTime<Utc>,
    pub payload: LogPayload,
}

#[derive(Serialize)]
struct EventRecord {
    id: PluginId,
    seq: EventSeq,
    timestamp: DateTime<Utc>,
    text: String,
    payload: LogPayload,
}

impl From<LogEvent> for EventRecord {
    fn from(event: LogEvent) -> Self {
        Self {
            text: event.payload.text(),
            id: event.plugin,
            seq: event.seq,
            timestamp: event.timestamp,
            payload: event.payload,
        }
    }
}

impl LogEvent {
    /// Single-line rendering for text-only consumers
    pub fn text(&self) -> String {
        self.payload.text()
    }

    /// Whether this event ends the instance's lifetime
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            LogPayload::Lifecycle(Lifecycle::Stopped { .. } | Lifecycle::Crashed { .. })
        )
    }

    /// Completion carried by this event, if it is one
    pub fn reply(&self) -> Option<&CommandReply> {
        match &self.payload {
            LogPayload::Reply(reply) => Some(reply),
            _ => None,
        }
    }
}

/// What a plugin said
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogPayload {
    /// A log line sent over the plugin channel
    Text {
        level: LogLevel,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u32>,
    },
    /// Structured output sent over the plugin channel
    Data {
        text: String,
        data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<u32>,
    },
    /// A command finished
    Reply(CommandReply),
    /// A line the plugin process wrote to stderr
    Stderr { line: String },
    /// Instance lifecycle change
    Lifecycle(Lifecycle),
}

impl LogPayload {
    pub fn text(&self) -> String {
        match self {
            Self::Text { level, text, .. } => format!("[{level}] {text}"),
            Self::Data { text, data, .. } => format!("{text} {data}"),
            Self::Reply(reply) => {
                let status = if reply.ok { "ok" } else { "failed" };
                format!("request {} {status}: {}", reply.request_id, reply.output)
            }
            Self::Stderr { line } => format!("[stderr] {line}"),
            Self::Lifecycle(lifecycle) => lifecycle.to_string(),
        }
    }
}

/// Completion of one dispatched command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReply {
    pub request_id: u32,
    pub ok: bool,
    pub output: Value,
}

/// Lifecycle transitions worth telling consumers about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Lifecycle {
    /// Handshake completed; the instance is ready
    Started {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
    /// Stopped on request
    Stopped { aborted: Vec<u32> },
    /// The channel closed without a stop request
    Crashed {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        aborted: Vec<u32>,
    },
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started { name, pid: Some(pid) } => write!(f, "{name} started (pid {pid})"),
            Self::Started { name, pid: None } => write!(f, "{name} started"),
            Self::Stopped { aborted } if aborted.is_empty() => write!(f, "stopped"),
            Self::Stopped { aborted } => write!(f, "stopped, {} command(s) aborted", aborted.len()),
            Self::Crashed {
                reason, exit_code, ..
            } => match exit_code {
                Some(code) => write!(f, "crashed: {reason} (exit code {code})"),
                None => write!(f, "crashed: {reason}"),
            },
        }
    }
}

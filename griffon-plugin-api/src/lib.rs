//! griffon-plugin-api - the contract between the griffon host and its plugins
//!
//! Plugins are standalone executables. The host talks to each one over the
//! plugin's stdin/stdout using length-prefixed frames (see [`frame`]) that
//! carry JSON messages (see [`message`]). A plugin may instead be built as a
//! shared library with [`export_plugin!`] and run inside `griffon-runner`
//! (see [`library`]).
//!
//! Plugin authors implement [`Plugin`] and call [`serve_stdio`]:
//!
//! ```no_run
//! use griffon_plugin_api::{async_trait, LogSink, Plugin, PluginError};
//! use serde_json::{json, Value};
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Plugin for Hello {
//!     fn name(&self) -> String {
//!         "hello".to_string()
//!     }
//!
//!     fn functions(&self) -> Vec<String> {
//!         vec!["greet".to_string()]
//!     }
//!
//!     async fn call(
//!         &mut self,
//!         _function: &str,
//!         payload: Value,
//!         log: &LogSink,
//!     ) -> Result<Value, PluginError> {
//!         log.info("greeting");
//!         Ok(json!({ "hello": payload }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     griffon_plugin_api::serve_stdio(Hello).await.ok();
//! }
//! ```

pub mod error;
pub mod frame;
pub mod library;
pub mod message;
pub mod plugin;

pub use async_trait::async_trait;
pub use error::{PluginError, ProtocolError};
pub use frame::{Frame, FrameReader, FrameWriter, MsgType, PROTOCOL_VERSION};
pub use library::API_VERSION;
pub use message::{Call, CallResult, ErrorReply, HelloOk, LogLevel, LogRecord, Message};
pub use plugin::{LogSink, Plugin, serve, serve_stdio};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_is_set() {
        assert_eq!(PROTOCOL_VERSION, 1);
    }

    #[test]
    fn test_plugin_trait_is_object_safe() {
        fn _takes_boxed_plugin(_: Box<dyn Plugin>) {}
    }
}

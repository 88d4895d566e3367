//! `griffon invoke` - one-shot command against a plugin
//!
//! Starts the plugin, streams its events to stderr until the reply arrives,
//! prints the reply's output to stdout and stops the plugin again.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use griffon_core::{CommandReply, LogSubscription, PluginHost, PluginId};
use serde_json::Value;

use crate::config::ConfigLoader;
use crate::output;

#[derive(Args)]
pub struct InvokeArgs {
    /// Plugin name or id
    pub plugin: String,
    /// Function to run
    pub function: String,
    /// JSON payload (defaults to null)
    pub payload: Option<String>,
    /// Give up waiting for the reply after this many milliseconds
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

pub async fn run(args: InvokeArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let payload = parse_payload(args.payload.as_deref())?;
    let wait = Duration::from_millis(args.wait_ms.unwrap_or(config.invoke.wait_ms));

    let host = PluginHost::new(config.host);
    host.discover()?;
    let id = host.resolve(&args.plugin)?;

    let mut events = host.subscribe(id)?;
    host.start(id).await?;
    let outcome = follow(&host, id, &mut events, &args.function, payload, wait).await;
    host.shutdown().await;

    let reply = outcome?;
    println!("{}", serde_json::to_string_pretty(&reply.output)?);
    if !reply.ok {
        bail!("{} failed", args.function);
    }
    Ok(())
}

/// Parse the payload argument as JSON
pub fn parse_payload(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw)
            .with_context(|| format!("Payload is not valid JSON: {raw}")),
    }
}

async fn follow(
    host: &PluginHost,
    id: PluginId,
    events: &mut LogSubscription,
    function: &str,
    payload: Value,
    wait: Duration,
) -> Result<CommandReply> {
    let ticket = host.invoke(id, function, payload).await?;
    let request_id = ticket.request_id();
    let name = plugin_name(host, id);
    tracing::debug!(plugin = %id, request_id, function, "Waiting for reply");

    let stream = async {
        while let Some(event) = events.recv().await {
            if let Some(reply) = event.reply()
                && reply.request_id == request_id
            {
                return Ok(reply.clone());
            }
            eprintln!("{}", output::format_event(&name, &event));
            if event.is_terminal() {
                bail!("Plugin terminated before replying: {}", event.text());
            }
        }
        bail!("Event stream closed")
    };

    tokio::time::timeout(wait, stream)
        .await
        .map_err(|_| anyhow!("No reply from {function} within {wait:?}"))?
}

fn plugin_name(host: &PluginHost, id: PluginId) -> String {
    host.list_plugins()
        .into_iter()
        .find(|d| d.id() == id)
        .map(|d| d.name().to_string())
        .unwrap_or_else(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_payload_is_null() {
        assert_eq!(parse_payload(None).unwrap(), Value::Null);
    }

    #[test]
    fn payload_is_parsed_as_json() {
        assert_eq!(
            parse_payload(Some(r#"{"path": "/tmp/x"}"#)).unwrap(),
            json!({"path": "/tmp/x"})
        );
    }

    #[test]
    fn invalid_payload_is_an_error() {
        let err = parse_payload(Some("/tmp/x")).unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }
}

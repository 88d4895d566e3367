//! griffon-demo - example analysis plugin
//!
//! Speaks the griffon frame protocol on stdin/stdout. Diagnostics go to
//! stderr, which the host relays as `stderr` events.

use griffon_demo::DemoPlugin;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_env("GRIFFON_DEMO_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(pid = std::process::id(), "griffon-demo ready");
    if let Err(e) = griffon_plugin_api::serve_stdio(DemoPlugin::default()).await {
        tracing::error!(error = %e, "Protocol failure");
        std::process::exit(1);
    }
}

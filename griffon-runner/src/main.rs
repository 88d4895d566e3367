//! griffon-runner - hosts a shared-library plugin as a plugin process
//!
//! The host starts `griffon-runner <library>` like any other plugin
//! executable. The runner checks the library's entry points and hands its
//! stdin/stdout to the library, which speaks the frame protocol from there.
//! Diagnostics go to stderr only; stdout carries frames.

mod library;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use library::PluginLibrary;

/// Exit code when the library cannot be loaded
const LOAD_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "griffon-runner", version, about = "Run a griffon plugin library")]
struct Cli {
    /// Shared library built with `griffon_plugin_api::export_plugin!`
    library: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_env("GRIFFON_RUNNER_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let outcome = PluginLibrary::open(&cli.library).and_then(|library| {
        tracing::debug!(library = %library.path().display(), "Serving plugin library");
        library.run()
    });

    match outcome {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            tracing::error!(error = %e, "Cannot run plugin library");
            ExitCode::from(LOAD_FAILURE)
        }
    }
}

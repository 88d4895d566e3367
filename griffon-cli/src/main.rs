use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod input;
mod output;

#[derive(Parser)]
#[command(name = "griffon", about = "Run analysis plugins and follow their logs")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered plugins
    List(commands::list::ListArgs),
    /// Run one function of a plugin and print its output
    Invoke(commands::invoke::InvokeArgs),
    /// Interactive session with several plugins
    Shell,
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::List(args) => commands::list::run(args),
        Commands::Invoke(args) => commands::invoke::run(args).await,
        Commands::Shell => commands::shell::run().await,
        Commands::Config(args) => commands::config::run(args),
    }
}

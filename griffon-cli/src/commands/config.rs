//! `griffon config` - inspect the merged configuration

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use griffon_core::plugins::{DirectorySource, ManifestSource, default_runner};

use crate::config::{ConfigLoader, GriffonConfig};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the merged configuration and where plugins are looked up
    Show,
    /// Show configuration file paths
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(),
        ConfigCommands::Path => show_paths(),
    }
}

fn show_config() -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", toml::to_string_pretty(&config)?);
    // Comments keep the output valid TOML
    for line in resolved_lines(&config) {
        println!("# {line}");
    }
    Ok(())
}

/// What the host will actually use: absolute plugin directories with the
/// plugins found in each, and the runner for library plugins
fn resolved_lines(config: &GriffonConfig) -> Vec<String> {
    let mut lines = vec!["Plugin directories (earlier entries shadow later ones):".to_string()];
    for dir in &config.host.plugin_dirs {
        lines.push(format!("  {} {}", absolute(dir), dir_status(dir)));
    }
    let runner = config.host.runner.clone().unwrap_or_else(default_runner);
    lines.push(format!("Library runner: {}", runner.display()));
    lines
}

fn dir_status(dir: &Path) -> String {
    if !dir.is_dir() {
        return "(missing)".to_string();
    }
    match DirectorySource::new(vec![dir.to_path_buf()]).manifests() {
        Ok(manifests) if manifests.is_empty() => "(no plugins)".to_string(),
        Ok(manifests) => {
            let names: Vec<&str> = manifests.iter().map(|m| m.name.as_str()).collect();
            format!("({})", names.join(", "))
        }
        Err(e) => format!("(unreadable: {e})"),
    }
}

fn absolute(path: &Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn show_paths() -> Result<()> {
    println!("User config:    {}", ConfigLoader::user_config_path().display());
    println!("Project config: {}", ConfigLoader::project_config_path().display());
    Ok(())
}

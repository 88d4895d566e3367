//! `griffon list`

use anyhow::Result;
use clap::Args;
use griffon_core::{PluginHost, plugins::MANIFEST_FILE};

use crate::config::ConfigLoader;
use crate::output;

#[derive(Args)]
pub struct ListArgs {
    /// Print the descriptors as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ListArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let dirs = config.host.plugin_dirs.clone();
    let host = PluginHost::new(config.host);
    let plugins = host.discover()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plugins)?);
        return Ok(());
    }

    if plugins.is_empty() {
        println!("No plugins found");
        println!();
        println!("Plugin directories:");
        for dir in &dirs {
            println!("  {}", dir.display());
        }
        println!();
        println!("To install a plugin, create <plugin dir>/<name>/{MANIFEST_FILE}:");
        println!("  name = \"scanner\"");
        println!("  executable = \"griffon-scanner\"");
        println!("  functions = [\"scan\"]");
        return Ok(());
    }

    println!(
        "{}",
        output::plugin_table(plugins.iter().map(|d| (d, None)), false)
    );
    Ok(())
}

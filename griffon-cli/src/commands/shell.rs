//! `griffon shell` - interactive session
//!
//! Reads one command per line, with history and line editing on a terminal.
//! Plugins started from the shell are followed: their events are printed as
//! they arrive, across restarts, until the shell exits.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use griffon_core::{PluginHost, PluginId};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::invoke::parse_payload;
use crate::config::ConfigLoader;
use crate::input::{Readline, ReadlineResult};
use crate::output;

const PROMPT: &str = "griffon> ";

const HELP: &str = "\
Commands:
  list                               Show plugins and their state
  start <plugin>                     Start a plugin and follow its events
  stop <plugin>                      Stop a plugin
  restart <plugin>                   Restart a plugin
  invoke <plugin> <function> [json]  Queue a command
  history <plugin>                   Print buffered events
  rescan                             Re-read plugin directories
  help                               Show this help
  quit                               Stop all plugins and exit";

/// One parsed input line
#[derive(Debug, PartialEq)]
enum ShellCommand {
    List,
    Start(String),
    Stop(String),
    Restart(String),
    Invoke {
        plugin: String,
        function: String,
        payload: Value,
    },
    History(String),
    Rescan,
    Help,
    Quit,
}

impl ShellCommand {
    /// Parse a line; blank lines yield `None`
    fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "" => return Ok(None),
            "list" | "ls" => Self::List,
            "start" => Self::Start(one_arg(word, rest)?),
            "stop" => Self::Stop(one_arg(word, rest)?),
            "restart" => Self::Restart(one_arg(word, rest)?),
            "history" => Self::History(one_arg(word, rest)?),
            "invoke" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                let (Some(plugin), Some(function)) = (parts.next(), parts.next()) else {
                    bail!("usage: invoke <plugin> <function> [json]");
                };
                if plugin.is_empty() || function.is_empty() {
                    bail!("usage: invoke <plugin> <function> [json]");
                }
                let payload = parts.next().map(str::trim).filter(|p| !p.is_empty());
                Self::Invoke {
                    plugin: plugin.to_string(),
                    function: function.to_string(),
                    payload: parse_payload(payload)?,
                }
            }
            "rescan" => Self::Rescan,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{other}' (try 'help')"),
        };
        Ok(Some(command))
    }
}

fn one_arg(word: &str, rest: &str) -> Result<String> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        bail!("usage: {word} <plugin>");
    }
    Ok(rest.to_string())
}

struct Shell {
    host: Arc<PluginHost>,
    followers: HashMap<PluginId, JoinHandle<()>>,
}

impl Shell {
    fn new(host: Arc<PluginHost>) -> Self {
        Self {
            host,
            followers: HashMap::new(),
        }
    }

    async fn execute(&mut self, command: ShellCommand) -> Result<()> {
        match command {
            ShellCommand::List => self.list().await,
            ShellCommand::Start(plugin) => {
                let id = self.host.resolve(&plugin)?;
                self.follow(id)?;
                self.host.start(id).await?;
            }
            ShellCommand::Stop(plugin) => {
                let id = self.host.resolve(&plugin)?;
                self.host.stop(id).await?;
            }
            ShellCommand::Restart(plugin) => {
                let id = self.host.resolve(&plugin)?;
                self.follow(id)?;
                self.host.restart(id).await?;
            }
            ShellCommand::Invoke {
                plugin,
                function,
                payload,
            } => {
                let id = self.host.resolve(&plugin)?;
                let ticket = self.host.invoke(id, &function, payload).await?;
                println!("request {} accepted", ticket.request_id());
            }
            ShellCommand::History(plugin) => {
                let id = self.host.resolve(&plugin)?;
                for event in self.host.history(id)? {
                    println!("{}", output::format_event(&plugin, &event));
                }
            }
            ShellCommand::Rescan => {
                let plugins = self.host.rescan().await?;
                println!("{} plugin(s) available", plugins.len());
            }
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::Quit => {}
        }
        Ok(())
    }

    async fn list(&self) {
        let plugins = self.host.list_plugins();
        if plugins.is_empty() {
            println!("No plugins found");
            return;
        }
        let mut rows = Vec::with_capacity(plugins.len());
        for descriptor in &plugins {
            let state = self.host.state(descriptor.id()).await.ok().flatten();
            rows.push((descriptor, state));
        }
        println!("{}", output::plugin_table(rows, true));
    }

    /// Print events of `id` from now on, once per plugin
    fn follow(&mut self, id: PluginId) -> Result<()> {
        if self.followers.contains_key(&id) {
            return Ok(());
        }
        let name = self
            .host
            .list_plugins()
            .into_iter()
            .find(|d| d.id() == id)
            .map(|d| d.name().to_string())
            .unwrap_or_else(|| id.to_string());
        let mut events = self.host.subscribe(id)?;
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                // Explicit carriage return: the prompt may hold the terminal in raw mode
                print!("\r{}\r\n", output::format_event(&name, &event));
            }
        });
        self.followers.insert(id, task);
        Ok(())
    }

    fn close(&mut self) {
        for (_, task) in self.followers.drain() {
            task.abort();
        }
    }
}

pub async fn run() -> Result<()> {
    let config = ConfigLoader::load()?;
    let host = Arc::new(PluginHost::new(config.host));
    let plugins = host.discover()?;
    println!(
        "{} plugin(s) discovered. Type 'help' for commands.",
        plugins.len()
    );

    let mut shell = Shell::new(host.clone());
    let mut readline = Readline::new(PROMPT);
    loop {
        // Key reads block; keep them off the runtime so followers keep printing
        let (returned, result) = tokio::task::spawn_blocking(move || {
            let result = readline.readline();
            (readline, result)
        })
        .await?;
        readline = returned;

        let line = match result? {
            ReadlineResult::Line(line) => line,
            ReadlineResult::Interrupted => continue,
            ReadlineResult::Eof => break,
        };
        match ShellCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(ShellCommand::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = shell.execute(command).await {
                    eprintln!("error: {e}");
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    host.shutdown().await;
    shell.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(ShellCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn lifecycle_commands_take_one_plugin() {
        assert_eq!(
            ShellCommand::parse("start scanner").unwrap(),
            Some(ShellCommand::Start("scanner".into()))
        );
        assert_eq!(
            ShellCommand::parse("  restart 2 ").unwrap(),
            Some(ShellCommand::Restart("2".into()))
        );
        assert!(ShellCommand::parse("stop").is_err());
        assert!(ShellCommand::parse("stop a b").is_err());
    }

    #[test]
    fn invoke_payload_may_contain_spaces() {
        assert_eq!(
            ShellCommand::parse(r#"invoke scanner scan {"path": "/tmp/x"}"#).unwrap(),
            Some(ShellCommand::Invoke {
                plugin: "scanner".into(),
                function: "scan".into(),
                payload: json!({"path": "/tmp/x"}),
            })
        );
    }

    #[test]
    fn invoke_without_payload_sends_null() {
        assert_eq!(
            ShellCommand::parse("invoke scanner scan").unwrap(),
            Some(ShellCommand::Invoke {
                plugin: "scanner".into(),
                function: "scan".into(),
                payload: Value::Null,
            })
        );
        assert!(ShellCommand::parse("invoke scanner").is_err());
    }

    #[test]
    fn aliases_and_unknown_words() {
        assert_eq!(ShellCommand::parse("ls").unwrap(), Some(ShellCommand::List));
        assert_eq!(ShellCommand::parse("exit").unwrap(), Some(ShellCommand::Quit));
        let err = ShellCommand::parse("frobnicate").unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }
}

//! The demo plugin's functions

use std::path::{Path, PathBuf};
use std::time::Duration;

use griffon_plugin_api::{LogSink, Plugin, PluginError, async_trait};
use serde_json::{Value, json};

/// Exit code used by the `crash` function
pub const CRASH_EXIT_CODE: i32 = 3;

const DEFAULT_SLEEP_MS: u64 = 1_000;

#[derive(Default)]
pub struct DemoPlugin {
    calls: u64,
}

#[async_trait]
impl Plugin for DemoPlugin {
    fn name(&self) -> String {
        "griffon-demo".to_string()
    }

    fn functions(&self) -> Vec<String> {
        ["ping", "echo", "scan", "sleep", "crash"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    async fn call(
        &mut self,
        function: &str,
        payload: Value,
        log: &LogSink,
    ) -> Result<Value, PluginError> {
        self.calls += 1;
        tracing::debug!(function, calls = self.calls, "Call");

        match function {
            "ping" => Ok(json!("pong")),
            "echo" => Ok(payload),
            "scan" => scan(&payload, log).await,
            "sleep" => {
                let ms = payload
                    .get("ms")
                    .and_then(Value::as_u64)
                    .unwrap_or(DEFAULT_SLEEP_MS);
                log.info(format!("sleeping {ms}ms"));
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(json!({"slept_ms": ms}))
            }
            "crash" => {
                eprintln!("crash requested, exiting with {CRASH_EXIT_CODE}");
                std::process::exit(CRASH_EXIT_CODE);
            }
            other => Err(PluginError::UnknownFunction(other.to_string())),
        }
    }
}

/// Summary of one scan
#[derive(Debug, Default, PartialEq, Eq)]
struct ScanTotals {
    files: u64,
    bytes: u64,
}

async fn scan(payload: &Value, log: &LogSink) -> Result<Value, PluginError> {
    let root = payload
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| PluginError::invalid_input("scan needs a string 'path'"))?;
    let root = PathBuf::from(root);
    if !tokio::fs::try_exists(&root).await? {
        return Err(PluginError::invalid_input(format!(
            "{} does not exist",
            root.display()
        )));
    }

    log.info(format!("scanning {}", root.display()));
    let totals = walk(&root, |path, bytes| {
        log.data(path.display().to_string(), json!({"bytes": bytes}));
    })
    .await?;
    log.info(format!("{} file(s), {} byte(s)", totals.files, totals.bytes));

    Ok(json!({
        "path": root.display().to_string(),
        "files": totals.files,
        "bytes": totals.bytes,
    }))
}

/// Visit every regular file under `root` in name order
async fn walk(
    root: &Path,
    mut on_file: impl FnMut(&Path, u64),
) -> Result<ScanTotals, PluginError> {
    let mut totals = ScanTotals::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(path) = pending.pop() {
        let meta = tokio::fs::symlink_metadata(&path).await?;
        if meta.is_file() {
            totals.files += 1;
            totals.bytes += meta.len();
            on_file(&path, meta.len());
        } else if meta.is_dir() {
            let mut entries = tokio::fs::read_dir(&path).await?;
            let mut children = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                children.push(entry.path());
            }
            // Reverse so the stack pops them in ascending order
            children.sort_unstable_by(|a, b| b.cmp(a));
            pending.extend(children);
        }
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn walk_counts_files_in_order() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/two.txt"), "22").unwrap();
        std::fs::write(dir.path().join("a.txt"), "1").unwrap();
        std::fs::write(dir.path().join("c.txt"), "333").unwrap();

        let mut seen = Vec::new();
        let totals = walk(dir.path(), |path, _| {
            seen.push(path.strip_prefix(dir.path()).unwrap().to_path_buf());
        })
        .await
        .unwrap();

        assert_eq!(totals, ScanTotals { files: 3, bytes: 6 });
        assert_eq!(
            seen,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b/two.txt"),
                PathBuf::from("c.txt")
            ]
        );
    }

    #[tokio::test]
    async fn walk_of_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("only.bin");
        std::fs::write(&file, [0u8; 16]).unwrap();

        let totals = walk(&file, |_, _| {}).await.unwrap();
        assert_eq!(totals, ScanTotals { files: 1, bytes: 16 });
    }

    #[test]
    fn advertises_all_functions() {
        let functions = DemoPlugin::default().functions();
        assert_eq!(functions, ["ping", "echo", "scan", "sleep", "crash"]);
    }
}

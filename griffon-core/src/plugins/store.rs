//! Descriptor store
//!
//! Holds the descriptors of the last completed discovery. A re-discovery
//! builds a fresh list and swaps it in with one pointer store, so readers
//! see either the old list or the new one, never a mix.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use super::descriptor::{
    MANIFEST_FILE, PluginDescriptor, PluginId, PluginManifest, default_runner,
};
use crate::error::DiscoveryError;

/// Where plugin manifests come from
pub trait ManifestSource: Send + Sync {
    /// Enumerate candidate manifests, highest precedence first
    fn manifests(&self) -> Result<Vec<PluginManifest>, DiscoveryError>;
}

/// Fixed manifest list, mostly for tests and embedding
impl ManifestSource for Vec<PluginManifest> {
    fn manifests(&self) -> Result<Vec<PluginManifest>, DiscoveryError> {
        Ok(self.clone())
    }
}

/// Scans plugin directories for `<dir>/<plugin>/plugin.toml`
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dirs: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl ManifestSource for DirectorySource {
    fn manifests(&self) -> Result<Vec<PluginManifest>, DiscoveryError> {
        let mut manifests = Vec::new();

        for dir in &self.dirs {
            if !dir.is_dir() {
                debug!(dir = %dir.display(), "Plugin directory does not exist, skipping");
                continue;
            }

            let entries = std::fs::read_dir(dir).map_err(|source| DiscoveryError::Io {
                path: dir.clone(),
                source,
            })?;

            // Directory order is unspecified; sort for stable id allocation
            let mut plugin_dirs: Vec<PathBuf> = entries
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect();
            plugin_dirs.sort();

            for plugin_dir in plugin_dirs {
                let manifest_path = plugin_dir.join(MANIFEST_FILE);
                if !manifest_path.is_file() {
                    continue;
                }
                match PluginManifest::load(&manifest_path) {
                    Ok(manifest) => manifests.push(manifest),
                    Err(source) => {
                        let error = DiscoveryError::Manifest {
                            path: manifest_path,
                            source,
                        };
                        warn!(error = %error, "Skipping plugin");
                    }
                }
            }
        }

        Ok(manifests)
    }
}

struct IdTable {
    by_name: HashMap<String, PluginId>,
    next: u32,
}

impl IdTable {
    fn id_for(&mut self, name: &str) -> PluginId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = PluginId::new(self.next);
        self.next += 1;
        self.by_name.insert(name.to_string(), id);
        id
    }
}

/// Current set of known plugins
pub struct DescriptorStore {
    source: Box<dyn ManifestSource>,
    current: ArcSwap<Vec<PluginDescriptor>>,
    ids: Mutex<IdTable>,
    // Serializes discoveries so swaps land in completion order
    discovering: Mutex<()>,
    runner: PathBuf,
}

impl DescriptorStore {
    pub fn new(source: impl ManifestSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            current: ArcSwap::from_pointee(Vec::new()),
            ids: Mutex::new(IdTable {
                by_name: HashMap::new(),
                next: 1,
            }),
            discovering: Mutex::new(()),
            runner: default_runner(),
        }
    }

    /// Use `runner` to host library plugins instead of the default lookup
    pub fn with_runner(mut self, runner: impl Into<PathBuf>) -> Self {
        self.runner = runner.into();
        self
    }

    /// Re-read the source and replace the whole descriptor set.
    ///
    /// A plugin keeps its identifier across discoveries as long as its name
    /// does not change. On error the previous set stays in place.
    pub fn discover(&self) -> Result<Arc<Vec<PluginDescriptor>>, DiscoveryError> {
        let _discovering = self.discovering.lock().unwrap_or_else(|e| e.into_inner());

        // Reading manifests touches the filesystem; `ids` is only taken below
        let manifests = self.source.manifests()?;
        let mut seen = HashSet::new();
        let mut accepted = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            if let Err(reason) = manifest.validate() {
                warn!(plugin = %manifest.name, reason = %reason, "Skipping malformed plugin manifest");
                continue;
            }
            if !seen.insert(manifest.name.clone()) {
                debug!(plugin = %manifest.name, "Plugin shadowed by an earlier directory");
                continue;
            }
            accepted.push(manifest);
        }

        let mut descriptors: Vec<PluginDescriptor> = {
            let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
            accepted
                .into_iter()
                .map(|manifest| {
                    let id = ids.id_for(&manifest.name);
                    manifest.into_descriptor(id, &self.runner)
                })
                .collect()
        };
        descriptors.sort_by_key(PluginDescriptor::id);

        let descriptors = Arc::new(descriptors);
        self.current.store(descriptors.clone());
        info!(count = descriptors.len(), "Discovered plugins");
        Ok(descriptors)
    }

    /// Descriptors of the last completed discovery
    pub fn snapshot(&self) -> Arc<Vec<PluginDescriptor>> {
        self.current.load_full()
    }

    pub fn get(&self, id: PluginId) -> Option<PluginDescriptor> {
        self.current.load().iter().find(|d| d.id() == id).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<PluginDescriptor> {
        self.current.load().iter().find(|d| d.name() == name).cloned()
    }

    /// Whether `id` was ever handed out, even if the plugin is gone now
    pub fn knows(&self, id: PluginId) -> bool {
        let ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        id.get() >= 1 && id.get() < ids.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(root: &std::path::Path, dir: &str, body: &str) {
        let plugin_dir = root.join(dir);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join(MANIFEST_FILE), body).unwrap();
    }

    fn manifest(name: &str, functions: &[&str]) -> PluginManifest {
        PluginManifest::new(name, format!("{name}-bin"), functions.iter().copied())
    }

    #[test]
    fn empty_before_first_discover() {
        let store = DescriptorStore::new(vec![manifest("a", &["scan"])]);
        assert!(store.snapshot().is_empty());
        assert!(store.get(PluginId::new(1)).is_none());
    }

    #[test]
    fn discover_assigns_ids_from_one() {
        let store = DescriptorStore::new(vec![manifest("a", &["scan"]), manifest("b", &["ping"])]);
        let found = store.discover().unwrap();

        let ids: Vec<u32> = found.iter().map(|d| d.id().get()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.get(PluginId::new(2)).unwrap().name(), "b");
        assert_eq!(store.find_by_name("a").unwrap().id(), PluginId::new(1));
    }

    #[test]
    fn ids_are_stable_across_discoveries() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "b", "name = \"b\"\nexecutable = \"b\"\nfunctions = []\n");
        let store = DescriptorStore::new(DirectorySource::new(vec![dir.path().to_path_buf()]));
        store.discover().unwrap();
        let b = store.find_by_name("b").unwrap().id();

        write_manifest(dir.path(), "a", "name = \"a\"\nexecutable = \"a\"\nfunctions = []\n");
        store.discover().unwrap();

        assert_eq!(store.find_by_name("b").unwrap().id(), b);
        assert_eq!(store.find_by_name("a").unwrap().id(), PluginId::new(2));
        let ids: Vec<u32> = store.snapshot().iter().map(|d| d.id().get()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn removed_plugin_disappears_but_stays_known() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "a", "name = \"a\"\nexecutable = \"a\"\nfunctions = []\n");
        let store = DescriptorStore::new(DirectorySource::new(vec![dir.path().to_path_buf()]));
        store.discover().unwrap();

        std::fs::remove_dir_all(dir.path().join("a")).unwrap();
        store.discover().unwrap();

        assert!(store.get(PluginId::new(1)).is_none());
        assert!(store.knows(PluginId::new(1)));
        assert!(!store.knows(PluginId::new(2)));
    }

    #[test]
    fn malformed_manifests_are_skipped() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "bad", "this is not toml ===");
        write_manifest(
            dir.path(),
            "dup",
            "name = \"dup\"\nexecutable = \"d\"\nfunctions = [\"x\", \"x\"]\n",
        );
        write_manifest(
            dir.path(),
            "good",
            "name = \"good\"\nexecutable = \"g\"\nfunctions = [\"scan\"]\n",
        );
        std::fs::create_dir_all(dir.path().join("no-manifest")).unwrap();

        let store = DescriptorStore::new(DirectorySource::new(vec![dir.path().to_path_buf()]));
        let found = store.discover().unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "good");
    }

    #[test]
    fn earlier_directory_shadows_later() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write_manifest(
            project.path(),
            "scanner",
            "name = \"scanner\"\nexecutable = \"project-bin\"\nfunctions = [\"scan\"]\n",
        );
        write_manifest(
            user.path(),
            "scanner",
            "name = \"scanner\"\nexecutable = \"user-bin\"\nfunctions = [\"scan\", \"update\"]\n",
        );

        let store = DescriptorStore::new(DirectorySource::new(vec![
            project.path().to_path_buf(),
            user.path().to_path_buf(),
        ]));
        let found = store.discover().unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].functions(), ["scan"]);
        assert_eq!(
            found[0].launch().working_dir.as_deref(),
            Some(project.path().join("scanner").as_path())
        );
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let store = DescriptorStore::new(DirectorySource::new(vec![PathBuf::from(
            "/nonexistent/griffon/plugins",
        )]));
        assert!(store.discover().unwrap().is_empty());
    }

    #[test]
    fn failed_discovery_keeps_previous_set() {
        struct Flaky(std::sync::atomic::AtomicBool);
        impl ManifestSource for Flaky {
            fn manifests(&self) -> Result<Vec<PluginManifest>, DiscoveryError> {
                if self.0.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    return Err(DiscoveryError::Io {
                        path: PathBuf::from("/plugins"),
                        source: std::io::Error::other("gone"),
                    });
                }
                Ok(vec![PluginManifest::new("a", "a", ["scan"])])
            }
        }

        let store = DescriptorStore::new(Flaky(Default::default()));
        store.discover().unwrap();
        assert!(store.discover().is_err());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn concurrent_discovery_never_tears() {
        let store = Arc::new(DescriptorStore::new(
            (0..50)
                .map(|i| manifest(&format!("p{i}"), &["scan"]))
                .collect::<Vec<_>>(),
        ));
        store.discover().unwrap();

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        store.discover().unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let snapshot = store.snapshot();
            assert_eq!(snapshot.len(), 50);
            assert!(snapshot.windows(2).all(|w| w[0].id() < w[1].id()));
        }

        for writer in writers {
            writer.join().unwrap();
        }
    }

    #[test]
    fn id_lookups_do_not_wait_for_a_slow_discovery() {
        use std::sync::mpsc;
        use std::time::{Duration, Instant};

        struct Gated {
            entered: Mutex<mpsc::Sender<()>>,
            release: Mutex<mpsc::Receiver<()>>,
        }
        impl ManifestSource for Gated {
            fn manifests(&self) -> Result<Vec<PluginManifest>, DiscoveryError> {
                self.entered.lock().unwrap().send(()).ok();
                self.release
                    .lock()
                    .unwrap()
                    .recv_timeout(Duration::from_secs(5))
                    .ok();
                Ok(vec![PluginManifest::new("a", "a", ["scan"])])
            }
        }

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(DescriptorStore::new(Gated {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        }));

        let discovering = {
            let store = store.clone();
            std::thread::spawn(move || store.discover().map(|found| found.len()))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let started = Instant::now();
        assert!(!store.knows(PluginId::new(1)));
        assert!(started.elapsed() < Duration::from_secs(1));

        release_tx.send(()).unwrap();
        assert_eq!(discovering.join().unwrap().unwrap(), 1);
        assert!(store.knows(PluginId::new(1)));
    }

    #[test]
    fn relative_plugin_directory_yields_absolute_launch_paths() {
        let root = tempfile::Builder::new()
            .prefix(".griffon-store")
            .tempdir_in(".")
            .unwrap();
        write_manifest(
            root.path(),
            "p",
            "name = \"p\"\nexecutable = \"run.sh\"\nfunctions = [\"scan\"]\n",
        );
        std::fs::write(root.path().join("p/run.sh"), "#!/bin/sh\n").unwrap();
        assert!(root.path().is_relative());

        let store = DescriptorStore::new(DirectorySource::new(vec![root.path().to_path_buf()]));
        let found = store.discover().unwrap();
        let launch = found[0].launch();
        assert!(launch.executable.is_absolute());
        assert!(launch.executable.is_file());
        assert!(launch.working_dir.as_ref().is_some_and(|dir| dir.is_absolute()));
    }

    #[test]
    fn library_plugins_use_configured_runner() {
        let store = DescriptorStore::new(vec![PluginManifest::library(
            "lib",
            "/plugins/lib/liblib.so",
            ["scan"],
        )])
        .with_runner("/opt/griffon/griffon-runner");
        let found = store.discover().unwrap();

        let launch = found[0].launch();
        assert_eq!(launch.executable, PathBuf::from("/opt/griffon/griffon-runner"));
        assert_eq!(launch.args, vec!["/plugins/lib/liblib.so".to_string()]);
    }
}

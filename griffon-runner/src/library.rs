//! Loading plugin libraries

use std::path::{Path, PathBuf};

use griffon_plugin_api::library::{API_VERSION, API_VERSION_SYMBOL, MAIN_SYMBOL};
use libloading::{Library, Symbol};
use thiserror::Error;

type VersionFn = extern "C" fn() -> u32;
type MainFn = extern "C" fn() -> i32;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("{path} does not export {symbol}: {source}")]
    MissingSymbol {
        path: PathBuf,
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("Plugin API version mismatch: expected {expected}, found {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },
}

/// An opened plugin library whose entry points have been checked
pub struct PluginLibrary {
    library: Library,
    path: PathBuf,
}

impl PluginLibrary {
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        // SAFETY: the library was installed as a griffon plugin; running its
        // initializers is trusted the same way running a plugin executable is.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let plugin = Self {
            library,
            path: path.to_path_buf(),
        };

        let found = {
            let version: Symbol<VersionFn> = plugin.symbol(API_VERSION_SYMBOL)?;
            version()
        };
        if found != API_VERSION {
            return Err(LoadError::ApiVersionMismatch {
                expected: API_VERSION,
                found,
            });
        }
        plugin.symbol::<MainFn>(MAIN_SYMBOL)?;

        Ok(plugin)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serve the plugin on stdin/stdout until the host hangs up.
    ///
    /// Returns the plugin's exit code.
    pub fn run(&self) -> Result<i32, LoadError> {
        let main: Symbol<MainFn> = self.symbol(MAIN_SYMBOL)?;
        Ok(main())
    }

    fn symbol<T>(&self, name: &'static [u8]) -> Result<Symbol<'_, T>, LoadError> {
        // SAFETY: `T` is the signature `export_plugin!` generates for `name`.
        unsafe { self.library.get(name) }.map_err(|source| LoadError::MissingSymbol {
            path: self.path.clone(),
            symbol: String::from_utf8_lossy(name).into_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_fails_to_open() {
        let err = PluginLibrary::open(Path::new("/nonexistent/libghost.so"))
            .err()
            .unwrap();
        match err {
            LoadError::Open { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/libghost.so"));
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[test]
    fn non_library_file_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("libfake.so");
        std::fs::write(&path, "not a shared object").unwrap();

        assert!(matches!(
            PluginLibrary::open(&path),
            Err(LoadError::Open { .. })
        ));
    }

    #[test]
    fn version_mismatch_names_both_versions() {
        let err = LoadError::ApiVersionMismatch {
            expected: API_VERSION,
            found: API_VERSION + 1,
        };
        let message = err.to_string();
        assert!(message.contains(&API_VERSION.to_string()));
        assert!(message.contains(&(API_VERSION + 1).to_string()));
    }
}

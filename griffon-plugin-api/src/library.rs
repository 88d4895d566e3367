//! Plugins built as shared libraries
//!
//! `griffon-runner` loads the library, checks [`API_VERSION`] and calls the
//! exported main entry point, which serves the plugin over the runner's
//! stdin/stdout. Everything async runs on a runtime owned by the library, so
//! the runner and the plugin never share Rust types across the boundary.

use crate::plugin::{Plugin, serve_stdio};

/// Version of the exported entry points
pub const API_VERSION: u32 = 1;

/// `extern "C" fn() -> u32` returning [`API_VERSION`]
pub const API_VERSION_SYMBOL: &[u8] = b"_griffon_plugin_api_version";

/// `extern "C" fn() -> i32` serving the plugin, returning an exit code
pub const MAIN_SYMBOL: &[u8] = b"_griffon_plugin_main";

/// Serve `plugin` on stdin/stdout from a fresh runtime.
///
/// Returns 0 once the host hangs up, 1 on a protocol failure.
pub fn run_library<P: Plugin>(plugin: P) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("cannot start plugin runtime: {e}");
            return 1;
        }
    };

    match runtime.block_on(serve_stdio(plugin)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("plugin protocol failure: {e}");
            1
        }
    }
}

/// Export a plugin type for `griffon-runner`.
///
/// The type must implement [`Plugin`] and `Default`.
///
/// ```ignore
/// griffon_plugin_api::export_plugin!(MyPlugin);
/// ```
///
/// Generates `_griffon_plugin_api_version()` and `_griffon_plugin_main()`.
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _griffon_plugin_api_version() -> u32 {
            $crate::library::API_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _griffon_plugin_main() -> i32 {
            $crate::library::run_library(<$plugin_type>::default())
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogSink, PluginError, async_trait};
    use serde_json::Value;

    #[derive(Default)]
    struct Nop;

    #[async_trait]
    impl Plugin for Nop {
        fn name(&self) -> String {
            "nop".to_string()
        }

        fn functions(&self) -> Vec<String> {
            Vec::new()
        }

        async fn call(&mut self, _: &str, payload: Value, _: &LogSink) -> Result<Value, PluginError> {
            Ok(payload)
        }
    }

    crate::export_plugin!(Nop);

    #[test]
    fn exported_version_matches() {
        assert_eq!(_griffon_plugin_api_version(), API_VERSION);
    }

    #[test]
    fn symbol_names_match_macro() {
        assert_eq!(API_VERSION_SYMBOL, b"_griffon_plugin_api_version");
        assert_eq!(MAIN_SYMBOL, b"_griffon_plugin_main");
    }
}

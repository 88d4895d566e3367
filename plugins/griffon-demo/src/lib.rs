//! griffon-demo - example analysis plugin
//!
//! Built twice: as the `griffon-demo` executable and as a shared library
//! that `griffon-runner` can host.

mod demo;

pub use demo::{CRASH_EXIT_CODE, DemoPlugin};

griffon_plugin_api::export_plugin!(DemoPlugin);

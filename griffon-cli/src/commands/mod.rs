pub mod config;
pub mod invoke;
pub mod list;
pub mod shell;

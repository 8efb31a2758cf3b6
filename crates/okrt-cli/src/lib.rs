//! okrt-cli - NDJSON front end for the streaming engine

pub mod app;
pub mod cli;

pub use app::App;
pub use cli::Cli;

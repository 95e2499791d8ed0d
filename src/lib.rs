// Library exports for the binary and integration tests
pub mod api;
pub mod commands;
pub mod config;
pub mod crawl;
pub mod error;
pub mod logging;
pub mod renderer;
pub mod sink;
pub mod stats;
pub mod stats_builder;
pub mod timefmt;
pub mod window;

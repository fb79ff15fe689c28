pub mod app;
pub mod common;
pub mod config;
pub mod infra;
pub mod logging;
pub mod metrics;
pub mod trigger;
pub mod types;

pub use common::error::{Result, ScraperError};

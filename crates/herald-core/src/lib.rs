//! `herald-core` — shared types, configuration, and the cron evaluator.
//!
//! Everything in this crate is free of I/O apart from config loading, so the
//! store, executor, and worker crates can all depend on it.

pub mod clock;
pub mod config;
pub mod cron;
pub mod error;
pub mod types;
pub mod validate;

pub use error::{HeraldError, Result};

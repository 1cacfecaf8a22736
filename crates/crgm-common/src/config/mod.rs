//! Configuration loading from environment variables

mod database;

pub use database::{ConfigError, DatabaseConfig};

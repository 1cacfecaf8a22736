//! # crgm-db
//!
//! Database layer for the CRGM ERP backend: PostgreSQL connection pooling
//! and scoped transactional sessions via SQLx.
//!
//! ## Overview
//!
//! This crate handles:
//!
//! - Connection pool construction from environment-driven configuration
//! - A per-request session provider with guaranteed cleanup
//! - The model base trait entity modules implement
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crgm_common::DatabaseConfig;
//! use crgm_db::{with_session, Database};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let db = Database::connect(&config)?;
//!
//!     with_session(db.sessions(), |session| {
//!         Box::pin(async move {
//!             // run queries against session.connection()?, then
//!             // session.commit().await? to persist
//!             Ok(())
//!         })
//!     })
//!     .await?;
//!
//!     db.close().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod models;
pub mod pool;
pub mod session;

// Re-export commonly used types
pub use error::{DbError, DbResult};
pub use models::Model;
pub use pool::{create_pool, pool_options, Database, PgPool};
pub use session::{with_session, Session, SessionFactory, SessionHandle, SessionProvider};

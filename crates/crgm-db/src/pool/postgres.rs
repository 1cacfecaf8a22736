//! PostgreSQL connection pool management

use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use tracing::info;

use crgm_common::DatabaseConfig;

use crate::error::{DbError, DbResult};
use crate::session::SessionProvider;

/// Build pool options from configuration
///
/// The pool keeps `pool_size` connections open and allows checkouts up to
/// `pool_size + max_overflow` under load. With pre-ping enabled, a pooled
/// connection is validated before being handed to a caller, so stale
/// connections are discarded and replaced transparently. Acquire blocking
/// and timeout semantics are the driver defaults, not customized here.
#[must_use]
pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(config.pool_size)
        .max_connections(config.max_capacity())
        .test_before_acquire(config.pre_ping)
}

/// Create a new PostgreSQL connection pool
///
/// The pool connects lazily: a bad host or bad credentials surface as an
/// error on first use, not here. SQL statement logging is off unless
/// `echo_sql` is set.
pub fn create_pool(config: &DatabaseConfig) -> DbResult<PgPool> {
    let mut options =
        PgConnectOptions::from_str(&config.connection_url()).map_err(DbError::InvalidUrl)?;
    if !config.echo_sql {
        options = options.disable_statement_logging();
    }

    let pool = pool_options(config).connect_lazy_with(options);
    info!(
        url = %config.redacted_url(),
        pool_size = config.pool_size,
        max_overflow = config.max_overflow,
        "database pool initialized"
    );
    Ok(pool)
}

/// Process-wide database handle
///
/// Constructed once at startup and passed through the application context;
/// call [`Database::close`] on shutdown to drain the pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    sessions: SessionProvider,
}

impl Database {
    /// Build the pool and session provider from configuration
    ///
    /// Connections are established lazily, so this does not dial the server.
    pub fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        let pool = create_pool(config)?;
        let sessions = SessionProvider::new(pool.clone());
        Ok(Self { pool, sessions })
    }

    /// The underlying connection pool
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Session provider for request handlers
    #[must_use]
    pub fn sessions(&self) -> &SessionProvider {
        &self.sessions
    }

    /// Health check: round-trip a trivial query
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::Connect)?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }
}

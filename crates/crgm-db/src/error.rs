//! Database layer error types

/// Result alias for database layer operations
pub type DbResult<T> = Result<T, DbError>;

/// Errors raised by pool construction and session handling
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The assembled connection URL was rejected by the driver
    #[error("invalid database URL: {0}")]
    InvalidUrl(#[source] sqlx::Error),

    /// The database could not be reached
    #[error("database connection error: {0}")]
    Connect(#[source] sqlx::Error),

    /// A session operation failed
    #[error("session error: {0}")]
    Session(#[source] sqlx::Error),

    /// The session was already committed or closed
    #[error("session already closed")]
    SessionClosed,
}

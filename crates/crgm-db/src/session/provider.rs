//! Session provider and scoped acquisition

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// A released session must be returned to the pool exactly once; `close`
/// is idempotent so the provider can call it on every exit path.
#[async_trait]
pub trait SessionHandle: Send {
    /// Release the session, rolling back any uncommitted work
    async fn close(&mut self) -> DbResult<()>;
}

/// Produces a new session per call, exclusive to the calling scope
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: SessionHandle;

    /// Open a new session
    async fn session(&self) -> DbResult<Self::Session>;
}

/// One transactional unit of work
///
/// Wraps a database transaction. Nothing is committed or flushed
/// automatically: the caller must call [`Session::commit`] to persist.
/// [`Session::close`] rolls back anything uncommitted. Dropping an unclosed
/// session also rolls back, so a session cannot outlive its scope either way.
pub struct Session {
    tx: Option<Transaction<'static, Postgres>>,
}

impl Session {
    fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Connection for running queries within this session's transaction
    ///
    /// # Errors
    /// Returns [`DbError::SessionClosed`] if the session was already
    /// committed or closed.
    pub fn connection(&mut self) -> DbResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(DbError::SessionClosed)
    }

    /// Commit the transaction, persisting all work done in this session
    pub async fn commit(&mut self) -> DbResult<()> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(DbError::Session),
            None => Err(DbError::SessionClosed),
        }
    }

    /// Roll back the transaction explicitly
    pub async fn rollback(&mut self) -> DbResult<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(DbError::Session),
            None => Err(DbError::SessionClosed),
        }
    }

    /// Whether the session still holds its transaction
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}

#[async_trait]
impl SessionHandle for Session {
    async fn close(&mut self) -> DbResult<()> {
        if let Some(tx) = self.tx.take() {
            debug!("closing session, rolling back uncommitted work");
            tx.rollback().await.map_err(DbError::Session)?;
        }
        Ok(())
    }
}

/// Session factory backed by the PostgreSQL pool
///
/// Each [`SessionProvider::session`] call begins a fresh transaction on a
/// pooled connection. Callers beyond the pool's capacity block until a
/// connection is returned.
#[derive(Clone)]
pub struct SessionProvider {
    pool: PgPool,
}

impl SessionProvider {
    /// Create a provider over an existing pool
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionFactory for SessionProvider {
    type Session = Session;

    async fn session(&self) -> DbResult<Session> {
        let tx = self.pool.begin().await.map_err(DbError::Session)?;
        Ok(Session::new(tx))
    }
}

/// Run `f` with a session scoped to the call
///
/// Opens a session, gives `f` exclusive access, and closes the session on
/// every exit path. If `f` fails, the session is closed first and the
/// error then propagates to the caller.
pub async fn with_session<P, T, F>(factory: &P, f: F) -> DbResult<T>
where
    P: SessionFactory,
    T: Send,
    F: for<'s> FnOnce(&'s mut P::Session) -> BoxFuture<'s, DbResult<T>> + Send,
{
    let mut session = factory.session().await?;
    let result = f(&mut session).await;
    let closed = session.close().await;

    // Caller's error takes precedence over a close failure.
    let value = result?;
    closed?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Session double that counts how many times it was released
    struct MockSession {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SessionHandle for MockSession {
        async fn close(&mut self) -> DbResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockFactory {
        closed: Arc<AtomicUsize>,
    }

    impl MockFactory {
        fn new() -> Self {
            Self {
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl SessionFactory for MockFactory {
        type Session = MockSession;

        async fn session(&self) -> DbResult<MockSession> {
            Ok(MockSession {
                closed: Arc::clone(&self.closed),
            })
        }
    }

    #[tokio::test]
    async fn test_session_closed_once_on_success() {
        let factory = MockFactory::new();
        let result = with_session(&factory, |_session| Box::pin(async { Ok(42) })).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_closed_once_on_caller_error() {
        let factory = MockFactory::new();
        let result: DbResult<()> = with_session(&factory, |_session| {
            Box::pin(async { Err(DbError::Session(sqlx::Error::RowNotFound)) })
        })
        .await;
        assert!(matches!(result, Err(DbError::Session(_))));
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_caller_error_takes_precedence_over_close_failure() {
        /// Double whose close always fails
        struct FailingCloseSession;

        #[async_trait]
        impl SessionHandle for FailingCloseSession {
            async fn close(&mut self) -> DbResult<()> {
                Err(DbError::Session(sqlx::Error::PoolClosed))
            }
        }

        struct FailingCloseFactory;

        #[async_trait]
        impl SessionFactory for FailingCloseFactory {
            type Session = FailingCloseSession;

            async fn session(&self) -> DbResult<FailingCloseSession> {
                Ok(FailingCloseSession)
            }
        }

        let result: DbResult<()> = with_session(&FailingCloseFactory, |_session| {
            Box::pin(async { Err(DbError::SessionClosed) })
        })
        .await;
        assert!(matches!(result, Err(DbError::SessionClosed)));
    }

    /// Connection double for the pre-ping behavior
    #[derive(Clone, Copy, Debug, PartialEq)]
    struct FakeConn {
        id: u32,
        alive: bool,
    }

    /// Pool double: hands out idle connections, pre-pinging each one and
    /// replacing dead connections with fresh ones, like the real pool does
    /// with `test_before_acquire`.
    struct FakePool {
        idle: Mutex<Vec<FakeConn>>,
        next_id: AtomicU32,
        pre_ping: bool,
    }

    impl FakePool {
        fn new(pre_ping: bool) -> Self {
            Self {
                idle: Mutex::new(Vec::new()),
                next_id: AtomicU32::new(100),
                pre_ping,
            }
        }

        fn put(&self, conn: FakeConn) {
            self.idle.lock().unwrap().push(conn);
        }

        fn fresh(&self) -> FakeConn {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            FakeConn { id, alive: true }
        }
    }

    struct FakePoolSession {
        conn: FakeConn,
    }

    #[async_trait]
    impl SessionHandle for FakePoolSession {
        async fn close(&mut self) -> DbResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl SessionFactory for FakePool {
        type Session = FakePoolSession;

        async fn session(&self) -> DbResult<FakePoolSession> {
            loop {
                let candidate = self.idle.lock().unwrap().pop();
                match candidate {
                    Some(conn) if self.pre_ping && !conn.alive => {
                        // dead connection discarded, try the next one
                    }
                    Some(conn) => return Ok(FakePoolSession { conn }),
                    None => return Ok(FakePoolSession { conn: self.fresh() }),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_pre_ping_replaces_invalidated_connection() {
        let pool = FakePool::new(true);
        pool.put(FakeConn {
            id: 1,
            alive: false,
        });

        let session = pool.session().await.unwrap();
        assert!(session.conn.alive);
        assert_ne!(session.conn.id, 1);
    }

    #[tokio::test]
    async fn test_without_pre_ping_dead_connection_is_handed_out() {
        let pool = FakePool::new(false);
        pool.put(FakeConn {
            id: 1,
            alive: false,
        });

        let session = pool.session().await.unwrap();
        assert!(!session.conn.alive);
        assert_eq!(session.conn.id, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_exclusive() {
        let factory = Arc::new(MockFactory::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let factory = Arc::clone(&factory);
            handles.push(tokio::spawn(async move {
                with_session(factory.as_ref(), move |_session| {
                    Box::pin(async move { Ok(i) })
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        // one close per session, none shared or leaked
        assert_eq!(factory.closed.load(Ordering::SeqCst), 8);
    }
}

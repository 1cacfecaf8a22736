//! Scoped transactional sessions
//!
//! A session is one transactional unit of work bound to a single request
//! scope. Nothing is persisted until the caller commits; closing rolls back
//! whatever is left and returns the connection to the pool.

mod provider;

pub use provider::{with_session, Session, SessionFactory, SessionHandle, SessionProvider};

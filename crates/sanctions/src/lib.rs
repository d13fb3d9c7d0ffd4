//! Timed moderation sanctions.
//!
//! A mute or hardmute persists a [`types::PendingAction`] describing the role
//! changes to revert and when. The [`service::TimedActionScheduler`] reverts
//! each one exactly once: an in-memory min-heap wakes it at the earliest
//! expiry, and a periodic sweep over the store backs it up across restarts.

pub mod error;
pub mod moderation;
pub mod parse;
pub mod service;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use error::{Error, Result};

/// Run database migrations for the sanctions crate.
///
/// Creates the `pending_actions` and `mod_log` tables. Call at startup when
/// using [`store_sqlite::SqliteSanctionStore`] on a shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

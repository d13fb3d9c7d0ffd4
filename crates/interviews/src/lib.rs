//! Interview gatekeeping.
//!
//! New members get a gatekeeper role and a private channel. Reacting to the
//! welcome message walks them through the configured questions; a moderator
//! approves or denies, and the channel is then archived: a five minute
//! countdown, an optional kick, a transcript relayed to the log channel, and
//! deletion. Archival runs on a single worker so only one sequence touches
//! the gateway at a time.

pub mod archive;
pub mod error;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;
pub mod workflow;

pub use {
    archive::{ArchivalPipeline, ArchivalQueue, ArchivalTicket, ArchiveConfig},
    error::{Error, Result},
    types::{AdvanceOutcome, ArchivalReport, ArchivalTask, Decision, InterviewRecord, JoinOutcome},
    workflow::{InterviewWorkflow, WorkflowConfig},
};

/// Run database migrations for the interviews crate.
///
/// Creates the `interviews` table. Call at startup when using
/// [`store_sqlite::SqliteInterviewStore`] on a shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

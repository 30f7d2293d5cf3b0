//! Visit admin-id back-fill.
//!
//! The run is:
//! - **Single pass**: every visit is fetched once and decided in order
//! - **Idempotent**: visits that already carry an `adminId` are never written,
//!   so re-running after an interruption resumes where the last run stopped
//! - **Error-isolated**: a visit whose employee cannot be resolved is counted
//!   and skipped; only a failed fetch of the visit collection or a failed
//!   batch commit aborts the run
//! - **Batched**: updates are flushed every `batch_size` enqueued writes, then
//!   once more for the remainder

mod outcome;
mod report;

pub use outcome::{classify_visit, VisitError, VisitOutcome, ADMIN_ID_FIELD, EMPLOYEE_ID_FIELD};
pub use report::{ConsoleReporter, Progress, Reporter};

use crate::config::{MigrationConfig, MAX_BATCH_SIZE};
use crate::error::AppError;
use crate::store::{DocumentStore, WriteBatch};

/// Where to read and how much to write at once.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub visits_collection: String,
    pub users_collection: String,
    pub batch_size: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            visits_collection: "visits".to_string(),
            users_collection: "users".to_string(),
            batch_size: MAX_BATCH_SIZE,
        }
    }
}

impl From<&MigrationConfig> for MigrationOptions {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            visits_collection: config.visits_collection.clone(),
            users_collection: config.users_collection.clone(),
            batch_size: config.batch_size,
        }
    }
}

/// Tally of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Visits in the collection.
    pub total: usize,
    /// Visits whose admin id was written.
    pub updated: usize,
    /// Visits that could not be migrated.
    pub errors: usize,
    /// Visits skipped because they already had an admin id.
    pub already_migrated: usize,
    /// Number of batch commits issued.
    pub batches_committed: usize,
}

/// Run the migration over the whole visits collection.
///
/// Returns an error only if the visits could not be fetched or a batch
/// commit failed; per-visit problems are counted in the summary.
pub async fn run_migration<S>(
    store: &S,
    options: &MigrationOptions,
    reporter: &dyn Reporter,
) -> Result<MigrationSummary, AppError>
where
    S: DocumentStore,
{
    if options.batch_size == 0 {
        return Err(AppError::InvalidConfig(
            "batch size must be positive".to_string(),
        ));
    }

    let visits = store.fetch_all(&options.visits_collection).await?;
    let total = visits.len();
    tracing::info!(
        "Fetched {} documents from '{}'",
        total,
        options.visits_collection
    );
    reporter.started(total);

    let mut summary = MigrationSummary {
        total,
        ..Default::default()
    };
    if total == 0 {
        return Ok(summary);
    }

    let mut batch = store.batch();
    let mut committed = 0usize;

    for (index, visit) in visits.iter().enumerate() {
        let outcome = classify_visit(store, &options.users_collection, visit).await;

        match &outcome {
            VisitOutcome::AlreadyMigrated { .. } => summary.already_migrated += 1,
            VisitOutcome::Update { admin_id } => {
                batch.update_field(
                    &options.visits_collection,
                    &visit.id,
                    ADMIN_ID_FIELD,
                    admin_id.clone(),
                );
                summary.updated += 1;
            }
            VisitOutcome::Failed(err) => {
                tracing::debug!("Visit {} not migrated: {:?}", visit.id, err);
                summary.errors += 1;
            }
        }

        let progress = Progress {
            processed: index + 1,
            total,
        };
        reporter.visit(progress, &visit.id, &outcome);

        if batch.len() >= options.batch_size {
            let full = std::mem::replace(&mut batch, store.batch());
            let written = commit(full, committed).await?;
            committed += written;
            summary.batches_committed += 1;
            reporter.batch_committed(written, false);
        }
    }

    if !batch.is_empty() {
        let size = commit(batch, committed).await?;
        summary.batches_committed += 1;
        reporter.batch_committed(size, true);
    }

    reporter.finished(&summary);
    Ok(summary)
}

async fn commit<B: WriteBatch>(batch: B, committed_so_far: usize) -> Result<usize, AppError> {
    let size = batch.len();
    match batch.commit().await {
        Ok(written) => {
            tracing::debug!("Committed batch of {} updates", written);
            Ok(written)
        }
        Err(e) => {
            tracing::error!(
                "Commit of {} updates failed after {} committed; re-run to resume: {}",
                size,
                committed_so_far,
                e
            );
            Err(e)
        }
    }
}

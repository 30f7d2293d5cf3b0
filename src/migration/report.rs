//! Progress reporting.
//!
//! The runner calls a [`Reporter`] as each visit is decided so feedback
//! streams while the run is in progress. [`ConsoleReporter`] writes
//! successes to stdout and failures to stderr.

use super::outcome::VisitOutcome;
use super::MigrationSummary;

/// Position of a visit in the run, rendered as `[processed/total]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}]", self.processed, self.total)
    }
}

/// Receives run events.
pub trait Reporter: Send + Sync {
    /// The visit collection has been fetched.
    fn started(&self, total: usize);

    /// One visit has been classified (and, for updates, enqueued).
    fn visit(&self, progress: Progress, visit_id: &str, outcome: &VisitOutcome);

    /// A batch was flushed. `last` is true for the trailing partial batch.
    fn batch_committed(&self, size: usize, last: bool);

    /// Every visit has been processed and all batches committed.
    fn finished(&self, summary: &MigrationSummary);
}

/// Human-readable output on the standard streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    /// One line per visit, without the trailing newline.
    pub fn format_visit(progress: Progress, visit_id: &str, outcome: &VisitOutcome) -> String {
        match outcome {
            VisitOutcome::AlreadyMigrated { admin_id } => format!(
                "✓ {} Visit {} already has adminId: {}",
                progress,
                visit_id,
                display_value(admin_id)
            ),
            VisitOutcome::Update { admin_id } => format!(
                "✓ {} Visit {} → adminId: {}",
                progress,
                visit_id,
                display_value(admin_id)
            ),
            VisitOutcome::Failed(err) => format!("✗ {} {}", progress, err),
        }
    }

    /// The closing tally.
    pub fn format_summary(summary: &MigrationSummary) -> String {
        let rule = "=".repeat(60);
        format!(
            "{rule}\nMigration Summary:\n  Total visits:   {}\n  Updated:        {}\n  Errors:         {}\n  Already had ID: {}\n{rule}",
            summary.total,
            summary.updated,
            summary.errors,
            summary.total - summary.updated - summary.errors,
        )
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Reporter for ConsoleReporter {
    fn started(&self, total: usize) {
        println!("Found {} visits to process\n", total);
        if total == 0 {
            println!("✓ No visits found. Migration complete.");
        }
    }

    fn visit(&self, progress: Progress, visit_id: &str, outcome: &VisitOutcome) {
        let line = Self::format_visit(progress, visit_id, outcome);
        if outcome.is_success() {
            println!("{}", line);
        } else {
            eprintln!("{}", line);
        }
    }

    fn batch_committed(&self, size: usize, last: bool) {
        if last {
            println!("\n✔ Committed final batch of {} updates", size);
        } else {
            println!("\n  ✔ Committed batch of {} updates\n", size);
        }
    }

    fn finished(&self, summary: &MigrationSummary) {
        println!("\n{}\n", Self::format_summary(summary));
    }
}

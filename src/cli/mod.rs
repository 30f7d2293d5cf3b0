//! CLI module for visit-backfill.
//!
//! The binary takes no required arguments: it loads configuration, resolves
//! credentials, and runs the migration once.

mod migrate;

use clap::Parser;

use crate::config::Transport;

/// Back-fill `adminId` onto Firestore visits from their employee record
#[derive(Parser)]
#[command(name = "visit-backfill")]
#[command(about = "Back-fill adminId onto every visit from its employee's admin")]
#[command(version)]
pub struct App {
    /// Run in verbose mode
    #[arg(short, long)]
    pub verbose: bool,

    /// Write transport, overriding `migration.transport`
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,
}

impl App {
    /// Run the CLI application.
    pub async fn run(self) -> color_eyre::Result<()> {
        self.run_migrate().await
    }

    /// Log filter for this invocation; `RUST_LOG` takes precedence.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

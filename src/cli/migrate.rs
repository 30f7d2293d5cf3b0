//! Migrate command handler.

use std::sync::Arc;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::{Result, Section};

use crate::config::{Config, Transport};
use crate::credentials::{resolve_credentials, CredentialSearch};
use crate::error::AppError;
use crate::firestore::auth::{Authenticator, StaticToken};
use crate::firestore::{http_client, FirestoreClient};
use crate::migration::{run_migration, ConsoleReporter, MigrationOptions};
use crate::store::backends::{CommitStore, PatchStore};

use super::App;

impl App {
    /// Load configuration, connect, and run the migration.
    pub async fn run_migrate(&self) -> Result<()> {
        let mut config = Config::load()?;
        if let Some(transport) = self.transport {
            config.migration.transport = transport;
        }

        let http = http_client(config.firestore.timeout_secs)?;
        let auth = authenticate(&config, http.clone())
            .await
            .map_err(|e| match e {
                AppError::CredentialsNotFound => eyre!(e)
                    .suggestion("Download a service account key and set GOOGLE_APPLICATION_CREDENTIALS to its path")
                    .suggestion("Or run: gcloud auth application-default login"),
                other => eyre!(other),
            })?;

        let project_id = config
            .firestore
            .project_id
            .clone()
            .filter(|p| !p.is_empty())
            .or(auth.project_id)
            .ok_or_else(|| eyre!("No Firestore project id configured"))?;
        tracing::info!(
            "Connecting to Firestore project {} (database {}, transport {})",
            project_id,
            config.firestore.database,
            config.migration.transport
        );
        let client = FirestoreClient::from_config(http, &config.firestore, &project_id, auth.provider)?;

        let options = MigrationOptions::from(&config.migration);
        let reporter = ConsoleReporter;

        println!("Starting migration: Adding adminId to visits...\n");
        let summary = match config.migration.transport {
            Transport::Commit => run_migration(&CommitStore::new(client), &options, &reporter).await,
            Transport::Patch => run_migration(&PatchStore::new(client), &options, &reporter).await,
        }
        .wrap_err("Migration failed")?;

        tracing::info!(
            "Run finished: {} updated, {} errors, {} already migrated, {} batches",
            summary.updated,
            summary.errors,
            summary.already_migrated,
            summary.batches_committed
        );
        if summary.total > 0 {
            println!("✓ Migration complete!");
        }
        Ok(())
    }
}

/// Pick a token provider: a configured static token, else discovered credentials.
async fn authenticate(config: &Config, http: reqwest::Client) -> Result<Authenticator, AppError> {
    if let Some(token) = config
        .credentials
        .access_token
        .as_deref()
        .filter(|t| !t.is_empty())
    {
        tracing::info!("Using access token from configuration");
        return Ok(Authenticator {
            provider: Arc::new(StaticToken::new(token)),
            project_id: None,
        });
    }

    let source = resolve_credentials(&CredentialSearch::from_environment(config));
    tracing::debug!("Resolved credential source: {:?}", source);
    Authenticator::from_source(&source, http).await
}

//! Credential source discovery.
//!
//! Candidates are tried in order:
//! 1. `GOOGLE_APPLICATION_CREDENTIALS`, then `FIREBASE_SERVICE_ACCOUNT`
//! 2. `credentials.path` from configuration
//! 3. Well-known locations written by `gcloud`, the Firebase CLI, or by hand
//!
//! The first candidate that exists on disk wins. When none does, a configured
//! project id falls back to application default credentials via `gcloud`.

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Environment variables naming a credentials file, highest priority first.
pub const CREDENTIAL_ENV_VARS: &[&str] = &["GOOGLE_APPLICATION_CREDENTIALS", "FIREBASE_SERVICE_ACCOUNT"];

/// Key files looked for in the working directory, after the home locations.
pub const LOCAL_KEY_FILES: &[&str] = &["firebase-key.json", ".env.firebasekey", ".env.firebase"];

/// Where the migration gets its identity from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// A service-account key or authorized-user file.
    File(PathBuf),
    /// No file found; use `gcloud` application default credentials for the project.
    ApplicationDefault { project_id: String },
    /// Nothing usable.
    NotFound,
}

/// Inputs to [`resolve_credentials`], gathered up front so resolution itself
/// only touches the filesystem to test for existence.
#[derive(Debug, Clone, Default)]
pub struct CredentialSearch {
    /// Paths named explicitly (environment, then configuration).
    pub explicit: Vec<PathBuf>,
    /// Conventional locations, probed silently.
    pub well_known: Vec<PathBuf>,
    pub project_id: Option<String>,
}

impl CredentialSearch {
    /// Build the search from the process environment and configuration.
    pub fn from_environment(config: &Config) -> Self {
        let mut explicit: Vec<PathBuf> = CREDENTIAL_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var_os(var))
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .collect();
        explicit.extend(config.credentials.path.clone());

        let project_id = config.firestore.project_id.clone();
        let well_known = dirs::home_dir()
            .map(|home| well_known_paths(&home, project_id.as_deref()))
            .unwrap_or_else(|| LOCAL_KEY_FILES.iter().map(PathBuf::from).collect());

        Self {
            explicit,
            well_known,
            project_id,
        }
    }
}

/// Conventional credential file locations under `home`.
pub fn well_known_paths(home: &Path, project_id: Option<&str>) -> Vec<PathBuf> {
    let mut paths = vec![
        home.join(".config/gcloud/application_default_credentials.json"),
        home.join(".cache/firebase/credentials.json"),
    ];
    if let Some(project) = project_id {
        paths.push(home.join(format!(".config/firebase/{}-key.json", project)));
        paths.push(home.join(format!(".firebase/{}-key.json", project)));
    }
    paths.extend(LOCAL_KEY_FILES.iter().map(PathBuf::from));
    paths
}

/// Pick the credential source for this run.
pub fn resolve_credentials(search: &CredentialSearch) -> CredentialSource {
    for path in &search.explicit {
        if path.is_file() {
            return CredentialSource::File(path.clone());
        }
        tracing::warn!("Credentials file {} does not exist, ignoring", path.display());
    }

    if let Some(path) = search.well_known.iter().find(|p| p.is_file()) {
        return CredentialSource::File(path.clone());
    }

    match &search.project_id {
        Some(project_id) if !project_id.is_empty() => CredentialSource::ApplicationDefault {
            project_id: project_id.clone(),
        },
        _ => CredentialSource::NotFound,
    }
}

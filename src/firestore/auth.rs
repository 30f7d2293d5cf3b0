//! Bearer tokens for the Firestore REST API.
//!
//! Supports:
//! - Service-account keys (signed JWT exchanged for an access token)
//! - `authorized_user` files written by `gcloud auth application-default login`
//! - The `gcloud` CLI, when only a project id is known
//! - A fixed token supplied through configuration
//!
//! Minted tokens are cached until shortly before they expire.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::credentials::CredentialSource;
use crate::error::AppError;

/// OAuth scope granting read/write access to Firestore.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens are refreshed this long before their reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// How long a `gcloud`-printed token is trusted (it does not report expiry).
const GCLOUD_TOKEN_TTL_SECS: i64 = 45 * 60;

/// Supplies a bearer token for each request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, AppError>;
}

/// A token that never changes.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, AppError> {
        Ok(self.0.clone())
    }
}

// ----------------------------------------------------------------------------
// Credential files
// ----------------------------------------------------------------------------

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Contents of a Google credentials JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

/// A service-account key as downloaded from the Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// User credentials with a long-lived refresh token.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub quota_project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl CredentialFile {
    /// Read and parse a credentials file.
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AppError::CredentialFile {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&contents).map_err(|e| AppError::InvalidCredentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Project id carried by the file, if any.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            CredentialFile::ServiceAccount(key) => key.project_id.as_deref(),
            CredentialFile::AuthorizedUser(user) => user.quota_project_id.as_deref(),
        }
    }
}

// ----------------------------------------------------------------------------
// Token cache
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

async fn exchange(
    http: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<CachedToken, AppError> {
    let response = http.post(token_uri).form(form).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<TokenErrorResponse>(&body)
            .map(|e| match e.error_description {
                Some(desc) => format!("{}: {}", e.error, desc),
                None => e.error,
            })
            .unwrap_or(body);
        return Err(AppError::Token(format!("{} ({})", message, status.as_u16())));
    }

    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| AppError::Token(format!("unexpected token response: {}", e)))?;
    Ok(CachedToken {
        token: parsed.access_token,
        expires_at: Utc::now() + Duration::seconds(parsed.expires_in.unwrap_or(3600)),
    })
}

// ----------------------------------------------------------------------------
// Service account
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Mints tokens by signing a JWT with a service-account private key.
pub struct ServiceAccountToken {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    http: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl ServiceAccountToken {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self, AppError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| AppError::Token(format!("invalid service-account private key: {}", e)))?;
        Ok(Self {
            key,
            signing_key,
            http,
            cache: Mutex::new(None),
        })
    }

    fn assertion(&self) -> Result<String, AppError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: DATASTORE_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|e| AppError::Token(format!("failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountToken {
    async fn access_token(&self) -> Result<String, AppError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.token.clone());
        }

        tracing::debug!("Requesting access token for {}", self.key.client_email);
        let assertion = self.assertion()?;
        let fresh = exchange(
            &self.http,
            &self.key.token_uri,
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ],
        )
        .await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

// ----------------------------------------------------------------------------
// Authorized user
// ----------------------------------------------------------------------------

/// Mints tokens with a refresh-token grant.
pub struct AuthorizedUserToken {
    user: AuthorizedUser,
    http: reqwest::Client,
    cache: Mutex<Option<CachedToken>>,
}

impl AuthorizedUserToken {
    pub fn new(user: AuthorizedUser, http: reqwest::Client) -> Self {
        Self {
            user,
            http,
            cache: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for AuthorizedUserToken {
    async fn access_token(&self) -> Result<String, AppError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.token.clone());
        }

        tracing::debug!("Refreshing user access token");
        let fresh = exchange(
            &self.http,
            &self.user.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", self.user.client_id.as_str()),
                ("client_secret", self.user.client_secret.as_str()),
                ("refresh_token", self.user.refresh_token.as_str()),
            ],
        )
        .await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

// ----------------------------------------------------------------------------
// gcloud CLI
// ----------------------------------------------------------------------------

/// Asks `gcloud` for an application-default access token.
#[derive(Default)]
pub struct GcloudToken {
    cache: Mutex<Option<CachedToken>>,
}

impl GcloudToken {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenProvider for GcloudToken {
    async fn access_token(&self) -> Result<String, AppError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.token.clone());
        }

        tracing::debug!("Running gcloud auth application-default print-access-token");
        let output = tokio::process::Command::new("gcloud")
            .args(["auth", "application-default", "print-access-token"])
            .output()
            .await
            .map_err(|e| AppError::Token(format!("failed to run gcloud: {}", e)))?;

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || token.is_empty() {
            return Err(AppError::Token(format!(
                "could not get a token from gcloud ({}). Try: gcloud auth application-default login",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        *cache = Some(CachedToken {
            token: token.clone(),
            expires_at: Utc::now() + Duration::seconds(GCLOUD_TOKEN_TTL_SECS),
        });
        Ok(token)
    }
}

// ----------------------------------------------------------------------------
// Construction from a credential source
// ----------------------------------------------------------------------------

/// A token provider plus the project id its credentials imply.
pub struct Authenticator {
    pub provider: Arc<dyn TokenProvider>,
    pub project_id: Option<String>,
}

impl Authenticator {
    /// Build the provider matching a resolved credential source.
    pub async fn from_source(
        source: &CredentialSource,
        http: reqwest::Client,
    ) -> Result<Self, AppError> {
        match source {
            CredentialSource::File(path) => {
                let file = CredentialFile::load(path).await?;
                let project_id = file.project_id().map(str::to_string);
                let provider: Arc<dyn TokenProvider> = match file {
                    CredentialFile::ServiceAccount(key) => {
                        tracing::info!("Using service account {}", key.client_email);
                        Arc::new(ServiceAccountToken::new(key, http)?)
                    }
                    CredentialFile::AuthorizedUser(user) => {
                        tracing::info!("Using authorized user credentials from {}", path.display());
                        Arc::new(AuthorizedUserToken::new(user, http))
                    }
                };
                Ok(Self {
                    provider,
                    project_id,
                })
            }
            CredentialSource::ApplicationDefault { project_id } => {
                tracing::info!("Using application default credentials via gcloud");
                Ok(Self {
                    provider: Arc::new(GcloudToken::new()),
                    project_id: Some(project_id.clone()),
                })
            }
            CredentialSource::NotFound => Err(AppError::CredentialsNotFound),
        }
    }
}

//! Credential store: loads a cached OAuth token from disk, or walks the
//! operator through a one-time authorization-code exchange and persists the
//! result. Runs once at startup, before the rotation loop exists.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail, ensure};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::photos::{ApiClient, PHOTOS_READONLY_SCOPE};

/// Margin before the recorded expiry at which the access token is treated
/// as stale and refreshed.
const EXPIRY_SKEW_SECS: u64 = 60;

/// OAuth client configuration, as issued by the identity provider. The
/// credentials file wraps this in an `installed` (desktop app) or `web`
/// object.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading client credentials file {}", path.display()))?;
        let parsed: CredentialsFile = serde_json::from_str(&raw)
            .with_context(|| format!("parsing client credentials file {}", path.display()))?;
        let secrets = parsed
            .installed
            .or(parsed.web)
            .context("credentials file has neither an \"installed\" nor a \"web\" section")?;
        ensure!(
            !secrets.redirect_uris.is_empty(),
            "credentials file lists no redirect URIs"
        );
        Ok(secrets)
    }

    fn redirect_uri(&self) -> &str {
        &self.redirect_uris[0]
    }
}

/// Persisted OAuth token. Mutated only by the authorization exchange or a
/// refresh; every API call reads the access token as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) past which the access token is invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl StoredToken {
    pub fn is_stale(&self, now: SystemTime) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        unix_secs(now) + EXPIRY_SKEW_SECS >= expires_at
    }
}

/// Token-endpoint response for both the code exchange and refresh grants.
/// Refresh responses typically omit `refresh_token`.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, now: SystemTime, prior_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(prior_refresh),
            expires_at: self.expires_in.map(|secs| unix_secs(now) + secs),
            token_type: self.token_type,
        }
    }
}

fn unix_secs(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn default_cache_path() -> Result<PathBuf> {
    let dir = dirs_next::cache_dir().context("no cache directory available on this platform")?;
    Ok(dir.join("cloudframe").join("token.json"))
}

pub fn load_token(path: &Path) -> Result<StoredToken> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading token cache {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing token cache {}", path.display()))
}

/// Writes the token cache, restricted to the owning user. Overwrites any
/// existing cache file.
pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating token cache directory {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(token).context("serializing token cache")?;
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating token cache {}", path.display()))?;
    file.write_all(&json)
        .with_context(|| format!("writing token cache {}", path.display()))?;
    Ok(())
}

fn authorize_url(secrets: &ClientSecrets) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", secrets.redirect_uri()),
            ("scope", PHOTOS_READONLY_SCOPE),
            ("access_type", "offline"),
            ("state", "state-token"),
        ],
    )
    .context("building authorization URL")
}

async fn read_auth_code() -> Result<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("reading authorization code from stdin")?;
        let code = line.trim().to_string();
        ensure!(!code.is_empty(), "empty authorization code");
        Ok(code)
    })
    .await
    .context("stdin reader task failed")?
}

async fn exchange_code(
    http: &reqwest::Client,
    secrets: &ClientSecrets,
    code: &str,
) -> Result<StoredToken> {
    let response = http
        .post(&secrets.token_uri)
        .form(&[
            ("code", code),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", secrets.redirect_uri()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .context("authorization code exchange request failed")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("token endpoint returned {status}: {body}");
    }
    let token: TokenResponse = response
        .json()
        .await
        .context("decoding token endpoint response")?;
    Ok(token.into_stored(SystemTime::now(), None))
}

/// Trades a refresh token for a fresh access token. The prior refresh token
/// is carried over when the endpoint does not issue a new one.
pub(crate) async fn refresh_token(
    http: &reqwest::Client,
    secrets: &ClientSecrets,
    refresh: &str,
) -> Result<StoredToken> {
    let response = http
        .post(&secrets.token_uri)
        .form(&[
            ("refresh_token", refresh),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .context("token refresh request failed")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("token endpoint returned {status}: {body}");
    }
    let token: TokenResponse = response
        .json()
        .await
        .context("decoding token endpoint response")?;
    Ok(token.into_stored(SystemTime::now(), Some(refresh.to_string())))
}

/// Produces an authorized API client, prompting the operator for an
/// authorization code when no usable token cache exists. Any failure is
/// fatal to startup; there is no retry.
pub async fn obtain_client(
    http: reqwest::Client,
    secrets: ClientSecrets,
    cache_path: PathBuf,
) -> Result<ApiClient> {
    let token = match load_token(&cache_path) {
        Ok(token) => {
            debug!(path = %cache_path.display(), "using cached token");
            token
        }
        Err(err) => {
            info!("no usable token cache ({err:#}); starting interactive authorization");
            let url = authorize_url(&secrets)?;
            println!(
                "Go to the following link in your browser, authorize the application, \
                 then paste the authorization code here:\n{url}"
            );
            let code = read_auth_code().await?;
            let token = exchange_code(&http, &secrets, &code)
                .await
                .context("authorization code exchange failed")?;
            save_token(&cache_path, &token)
                .with_context(|| format!("saving token cache to {}", cache_path.display()))?;
            info!(path = %cache_path.display(), "token cache written");
            token
        }
    };
    Ok(ApiClient::new(http, secrets, token, cache_path))
}

use crate::config::Endpoints;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Read messages, modify their labels, and create labels.
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Tokens this close to expiry are refreshed up front.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// Persisted credential. Written to the token file as JSON.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokenBundle {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at <= now + Duration::seconds(EXPIRY_SKEW_SECONDS),
            None => false,
        }
    }

    pub fn covers_scopes(&self, required: &[&str]) -> bool {
        let granted: HashSet<&str> = self.scopes.iter().map(String::as_str).collect();
        required.iter().all(|s| granted.contains(s))
    }

    fn from_response(res: &BasicTokenResponse, previous_refresh: Option<String>) -> Self {
        let scopes = res
            .scopes()
            .map(|s| s.iter().map(|scope| (**scope).clone()).collect())
            .unwrap_or_else(|| SCOPES.iter().map(|s| s.to_string()).collect());
        Self {
            access_token: res.access_token().secret().to_string(),
            refresh_token: res
                .refresh_token()
                .map(|r| r.secret().to_string())
                .or(previous_refresh),
            expires_at: res
                .expires_in()
                .map(|d| Utc::now() + Duration::from_std(d).unwrap_or_else(|_| Duration::seconds(0))),
            scopes,
        }
    }
}

/// Client id/secret from the Google Cloud Console download.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

pub fn load_client_secrets(path: &Path) -> AppResult<ClientSecrets> {
    if !path.exists() {
        return Err(AppError::Config(format!(
            "client secrets file not found: {}. Create OAuth credentials in Google Cloud Console and download them as credentials.json",
            path.display()
        )));
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("reading {}: {e}", path.display())))?;
    let parsed: ClientSecretsFile = serde_json::from_str(&raw)
        .map_err(|e| AppError::Config(format!("malformed client secrets {}: {e}", path.display())))?;
    parsed.installed.or(parsed.web).ok_or_else(|| {
        AppError::Config(format!(
            "{} has neither an \"installed\" nor a \"web\" section",
            path.display()
        ))
    })
}

/// Produce a non-expired access token, refreshing or running browser consent
/// as needed. Rewrites the token file whenever the credential changes.
pub async fn load_credentials(
    credentials_path: &Path,
    token_path: &Path,
    endpoints: &Endpoints,
) -> AppResult<TokenBundle> {
    let secrets = load_client_secrets(credentials_path)?;
    let store = TokenStore::new(token_path);

    if let Some(token) = store.load()? {
        if !token.is_expired(Utc::now()) {
            debug!(path = %token_path.display(), "Using stored token");
            return Ok(token);
        }
        if let Some(refresh) = token.refresh_token.clone() {
            let client = build_client(&secrets, endpoints, None)?;
            let refreshed = try_refresh(&client, refresh).await?;
            store.save(&refreshed)?;
            info!(path = %token_path.display(), "Refreshed access token");
            return Ok(refreshed);
        }
        warn!(path = %token_path.display(), "Stored token expired without a refresh token; re-authenticating");
    }

    let token = authorize_interactive(&secrets, endpoints).await?;
    store.save(&token)?;
    println!("Saved credentials to {}", token_path.display());
    Ok(token)
}

async fn authorize_interactive(
    secrets: &ClientSecrets,
    endpoints: &Endpoints,
) -> AppResult<TokenBundle> {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| AppError::Unexpected(format!("failed to bind loopback port: {e}")))?;
    let local_port = listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| AppError::Unexpected(format!("failed to read local addr: {e}")))?;

    let redirect = format!("http://127.0.0.1:{local_port}/");
    let client = build_client(secrets, endpoints, Some(&redirect))?;
    let scopes: Vec<Scope> = SCOPES.iter().map(|s| Scope::new(s.to_string())).collect();
    let (auth_url, verifier, csrf) = build_auth_url(&client, &scopes);

    println!("Starting local OAuth flow to obtain credentials with required scopes:");
    for s in SCOPES {
        println!("  - {s}");
    }
    info!(redirect = %redirect, "Opening browser for Google OAuth consent");
    open_in_browser(&auth_url);

    let code = listen_for_code(listener)
        .await?
        .verified_code(csrf.secret())?;

    let token_res = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(verifier)
        .request_async(async_http_client)
        .await
        .map_err(|e| AppError::Auth(format!("token exchange failed: {e}")))?;

    Ok(TokenBundle::from_response(&token_res, None))
}

fn build_client(
    secrets: &ClientSecrets,
    endpoints: &Endpoints,
    redirect: Option<&str>,
) -> AppResult<BasicClient> {
    let auth_url = AuthUrl::new(endpoints.auth_url.clone())
        .map_err(|e| AppError::Config(format!("invalid auth url {}: {e}", endpoints.auth_url)))?;
    let token_url = TokenUrl::new(endpoints.token_url.clone())
        .map_err(|e| AppError::Config(format!("invalid token url {}: {e}", endpoints.token_url)))?;

    let mut client = BasicClient::new(
        ClientId::new(secrets.client_id.clone()),
        Some(ClientSecret::new(secrets.client_secret.clone())),
        auth_url,
        Some(token_url),
    )
    .set_auth_type(oauth2::AuthType::RequestBody);

    if let Some(redirect) = redirect {
        client = client.set_redirect_uri(
            RedirectUrl::new(redirect.to_string())
                .map_err(|e| AppError::Config(format!("invalid redirect uri {redirect}: {e}")))?,
        );
    }
    Ok(client)
}

fn build_auth_url(client: &BasicClient, scopes: &[Scope]) -> (String, PkceCodeVerifier, CsrfToken) {
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let mut req = client
        .authorize_url(CsrfToken::new_random)
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(challenge);
    for scope in scopes {
        req = req.add_scope(scope.clone());
    }
    let (url, csrf) = req.url();
    (url.to_string(), verifier, csrf)
}

async fn try_refresh(client: &BasicClient, refresh_token: String) -> AppResult<TokenBundle> {
    let refresh = RefreshToken::new(refresh_token.clone());
    let token_res = client
        .exchange_refresh_token(&refresh)
        .request_async(async_http_client)
        .await
        .map_err(|e| {
            AppError::Auth(format!(
                "refreshing the stored token failed ({e}); delete the token file to run consent again"
            ))
        })?;
    Ok(TokenBundle::from_response(&token_res, Some(refresh_token)))
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct CodeResponse {
    pub code: String,
    pub state: String,
}

impl CodeResponse {
    /// The authorization code, provided the redirect echoed our CSRF state.
    pub(crate) fn verified_code(self, expected_state: &str) -> AppResult<String> {
        if self.state != expected_state {
            return Err(AppError::Auth("OAuth state mismatch in redirect".into()));
        }
        Ok(self.code)
    }
}

/// Block until the browser hits the redirect URI carrying `code` or `error`.
/// Stray requests (favicon and the like) get a 404 and the wait continues.
pub(crate) async fn listen_for_code(listener: TcpListener) -> AppResult<CodeResponse> {
    loop {
        let (mut stream, _) = listener
            .accept()
            .await
            .map_err(|e| AppError::Unexpected(format!("redirect accept failed: {e}")))?;

        let mut buf = [0u8; 4096];
        let n = stream
            .read(&mut buf)
            .await
            .map_err(|e| AppError::Unexpected(format!("reading auth callback failed: {e}")))?;
        let req = String::from_utf8_lossy(&buf[..n]);
        let first_line = req.lines().next().unwrap_or("");
        let Some(path) = first_line.split_whitespace().nth(1) else {
            let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            continue;
        };
        let parsed = url::Url::parse(&format!("http://localhost{path}"))
            .map_err(|e| AppError::Unexpected(format!("failed to parse callback url: {e}")))?;

        let param = |name: &str| {
            parsed
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.to_string())
        };

        if let Some(error) = param("error") {
            let _ = stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nAuthorization was not granted. You can close this tab.",
                )
                .await;
            return Err(AppError::Auth(format!("consent denied: {error}")));
        }

        match param("code") {
            Some(code) => {
                let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\nAuth complete. You can close this tab.";
                let _ = stream.write_all(response.as_bytes()).await;
                return Ok(CodeResponse {
                    code,
                    state: param("state").unwrap_or_default(),
                });
            }
            None => {
                debug!(path = %path, "Ignoring non-callback request on redirect listener");
                let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\n\r\n").await;
            }
        }
    }
}

fn open_in_browser(url: &str) {
    let attempt = if cfg!(target_os = "macos") {
        std::process::Command::new("open").arg(url).status()
    } else if cfg!(target_os = "windows") {
        std::process::Command::new("rundll32.exe")
            .args(["url.dll,FileProtocolHandler", url])
            .status()
    } else {
        std::process::Command::new("xdg-open").arg(url).status()
    };
    if let Err(e) = attempt {
        warn!("Could not auto-open browser: {e}. Open this URL manually:\n{url}");
    } else {
        println!("If your browser did not open, navigate to:\n{url}");
    }
}

/// JSON token file on disk.
#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Unreadable files and tokens lacking a required scope are discarded so
    /// consent runs again.
    pub fn load(&self) -> AppResult<Option<TokenBundle>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let token: TokenBundle = match serde_json::from_str(&raw) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Token file unreadable; re-authenticating");
                return Ok(None);
            }
        };
        if !token.covers_scopes(&SCOPES) {
            warn!(path = %self.path.display(), "Stored token lacks required scopes; removing to force re-auth");
            self.delete()?;
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub fn save(&self, token: &TokenBundle) -> AppResult<()> {
        let serialized = serde_json::to_string_pretty(token)
            .map_err(|e| AppError::Unexpected(format!("{e}")))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| AppError::Io(format!("opening token file {}: {e}", self.path.display())))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
        }

        file.write_all(serialized.as_bytes())
            .map_err(|e| AppError::Io(format!("writing token file: {e}")))?;
        file.sync_all()
            .map_err(|e| AppError::Io(format!("syncing token file: {e}")))?;
        Ok(())
    }

    pub fn delete(&self) -> AppResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

use crate::error::AuthError;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};
use url::Url;

/// Read-only access to search-analytics data.
pub const SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens expiring within this margin are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Supplies bearer tokens for API calls.
#[allow(async_fn_in_trait)]
pub trait CredentialProvider {
    /// A token that is valid now, refreshing or authorizing if needed.
    async fn access_token(&mut self) -> Result<String, AuthError>;

    /// Drops the current credentials and obtains new ones from scratch.
    async fn reauthorize(&mut self) -> Result<String, AuthError>;
}

/// A fixed bearer token, e.g. from `GSC_ACCESS_TOKEN`.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl CredentialProvider for StaticToken {
    async fn access_token(&mut self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }

    async fn reauthorize(&mut self) -> Result<String, AuthError> {
        Err(AuthError::Revoked)
    }
}

/// Authorized-user credentials as persisted in the token file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Tokens without an expiry are trusted until the API rejects them.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - TimeDelta::seconds(EXPIRY_MARGIN_SECS) > now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        if !path.exists() {
            return Err(AuthError::MissingClientSecret(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        let file: ClientSecretFile =
            serde_json::from_str(&content).map_err(|e| AuthError::InvalidClientSecret {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        file.installed
            .or(file.web)
            .ok_or_else(|| AuthError::InvalidClientSecret {
                path: path.to_path_buf(),
                reason: "expected an `installed` or `web` section".to_string(),
            })
    }
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth credentials for an installed application, persisted on disk.
///
/// The token file is read once when the store is opened and rewritten after
/// every refresh or new grant.
#[derive(Debug)]
pub struct TokenStore {
    client: reqwest::Client,
    token_path: PathBuf,
    client_secret_path: PathBuf,
    token: Option<StoredToken>,
}

impl TokenStore {
    pub fn open(client: reqwest::Client, token_path: PathBuf, client_secret_path: PathBuf) -> Self {
        let token = match fs::read_to_string(&token_path) {
            Ok(content) => match serde_json::from_str::<StoredToken>(&content) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(
                        path = %token_path.display(),
                        error = %e,
                        "Could not load stored credentials; will re-authenticate"
                    );
                    None
                }
            },
            Err(_) => None,
        };
        TokenStore {
            client,
            token_path,
            client_secret_path,
            token,
        }
    }

    pub fn token(&self) -> Option<&StoredToken> {
        self.token.as_ref()
    }

    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, AuthError> {
        let refresh_token = token.refresh_token.as_deref().ok_or(AuthError::Revoked)?;
        info!("Credentials have expired; refreshing");
        let response = self
            .client
            .post(&token.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
            ])
            .send()
            .await?;
        let granted = parse_token_response(response).await?;
        Ok(StoredToken {
            token: granted.access_token,
            refresh_token: granted
                .refresh_token
                .or_else(|| token.refresh_token.clone()),
            expiry: expiry_from(granted.expires_in),
            ..token.clone()
        })
    }

    async fn authorize(&mut self) -> Result<String, AuthError> {
        let secret = ClientSecret::load(&self.client_secret_path)?;
        let token = run_local_server_flow(&self.client, &secret).await?;
        self.persist(&token)?;
        info!(path = %self.token_path.display(), "Authentication successful. Credentials saved");
        let access = token.token.clone();
        self.token = Some(token);
        Ok(access)
    }

    fn persist(&self, token: &StoredToken) -> Result<(), AuthError> {
        if let Some(parent) = self.token_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.token_path, serde_json::to_string_pretty(token)?)?;
        Ok(())
    }

    fn discard(&mut self) -> Result<(), AuthError> {
        self.token = None;
        if self.token_path.exists() {
            fs::remove_file(&self.token_path)?;
        }
        Ok(())
    }
}

impl CredentialProvider for TokenStore {
    async fn access_token(&mut self) -> Result<String, AuthError> {
        if let Some(token) = self.token.clone() {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.token);
            }
            if token.refresh_token.is_some() {
                match self.refresh(&token).await {
                    Ok(fresh) => {
                        self.persist(&fresh)?;
                        let access = fresh.token.clone();
                        self.token = Some(fresh);
                        return Ok(access);
                    }
                    Err(AuthError::Rejected { status, body }) => {
                        warn!(
                            %status,
                            body = %body,
                            "The refresh token is expired or revoked; deleting it and re-authenticating"
                        );
                        self.discard()?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        self.authorize().await
    }

    async fn reauthorize(&mut self) -> Result<String, AuthError> {
        warn!("Stored credentials were rejected; deleting them and re-authenticating");
        self.discard()?;
        self.authorize().await
    }
}

/// Credential source selected at startup.
#[derive(Debug)]
pub enum Credentials {
    Static(StaticToken),
    Stored(TokenStore),
}

impl CredentialProvider for Credentials {
    async fn access_token(&mut self) -> Result<String, AuthError> {
        match self {
            Credentials::Static(provider) => provider.access_token().await,
            Credentials::Stored(provider) => provider.access_token().await,
        }
    }

    async fn reauthorize(&mut self) -> Result<String, AuthError> {
        match self {
            Credentials::Static(provider) => provider.reauthorize().await,
            Credentials::Stored(provider) => provider.reauthorize().await,
        }
    }
}

fn expiry_from(expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(TimeDelta::try_seconds)
        .map(|delta| Utc::now() + delta)
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected { status, body });
    }
    Ok(response.json::<TokenResponse>().await?)
}

fn random_string(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// S256 PKCE challenge for `verifier`.
pub fn pkce_challenge(verifier: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Installed-application flow with a loopback redirect.
async fn run_local_server_flow(
    client: &reqwest::Client,
    secret: &ClientSecret,
) -> Result<StoredToken, AuthError> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());
    let verifier = random_string(64);
    let state = random_string(32);

    let mut auth_url =
        Url::parse(&secret.auth_uri).map_err(|e| AuthError::Flow(format!("auth_uri: {e}")))?;
    auth_url
        .query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &secret.client_id)
        .append_pair("redirect_uri", &redirect_uri)
        .append_pair("scope", SCOPE)
        .append_pair("state", &state)
        .append_pair("code_challenge", &pkce_challenge(&verifier))
        .append_pair("code_challenge_method", "S256")
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");

    println!(
        "\n🔑 Please visit this URL in a browser to authorize access:\n\n{}\n",
        auth_url
    );

    let code = wait_for_redirect(&listener, &state).await?;
    let response = client
        .post(&secret.token_uri)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", secret.client_id.as_str()),
            ("client_secret", secret.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("code_verifier", verifier.as_str()),
        ])
        .send()
        .await?;
    let granted = parse_token_response(response).await?;

    Ok(StoredToken {
        token: granted.access_token,
        refresh_token: granted.refresh_token,
        token_uri: secret.token_uri.clone(),
        client_id: secret.client_id.clone(),
        client_secret: secret.client_secret.clone(),
        scopes: vec![SCOPE.to_string()],
        expiry: expiry_from(granted.expires_in),
    })
}

/// Accepts loopback requests until one carries an authorization result.
pub async fn wait_for_redirect(
    listener: &TcpListener,
    expected_state: &str,
) -> Result<String, AuthError> {
    loop {
        let (stream, _) = listener.accept().await?;
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
        let params: HashMap<String, String> = Url::parse("http://127.0.0.1/")
            .and_then(|base| base.join(target))
            .map(|url| url.query_pairs().into_owned().collect())
            .unwrap_or_default();

        let finished = params.contains_key("code") || params.contains_key("error");
        let body = if finished {
            "The authentication flow has completed. You may close this window."
        } else {
            "Waiting for authorization."
        };
        let mut stream = reader.into_inner();
        stream
            .write_all(
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                )
                .as_bytes(),
            )
            .await?;
        let _ = stream.shutdown().await;

        if !finished {
            continue;
        }
        if let Some(error) = params.get("error") {
            return Err(AuthError::Flow(format!("authorization denied: {error}")));
        }
        if params.get("state").map(String::as_str) != Some(expected_state) {
            return Err(AuthError::Flow("state mismatch in redirect".to_string()));
        }
        return params
            .get("code")
            .cloned()
            .ok_or_else(|| AuthError::Flow("redirect carried no code".to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    fn token(expiry: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            token: "ya29.token".into(),
            refresh_token: Some("1//refresh".into()),
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scopes: vec![SCOPE.into()],
            expiry,
        }
    }

    #[test]
    fn token_validity_respects_margin() {
        let now = Utc::now();
        assert!(token(None).is_valid_at(now));
        assert!(token(Some(now + TimeDelta::seconds(600))).is_valid_at(now));
        assert!(!token(Some(now + TimeDelta::seconds(30))).is_valid_at(now));
        assert!(!token(Some(now - TimeDelta::seconds(1))).is_valid_at(now));
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_example() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[tokio::test]
    async fn redirect_yields_code_after_ignoring_unrelated_requests() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let browser = tokio::spawn(async move {
            for target in ["/favicon.ico", "/?state=abc&code=4%2Fcode"] {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream
                    .write_all(format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
                    .await
                    .unwrap();
                let mut response = String::new();
                stream.read_to_string(&mut response).await.unwrap();
                assert!(response.starts_with("HTTP/1.1 200 OK"));
            }
        });

        let code = wait_for_redirect(&listener, "abc").await.unwrap();
        browser.await.unwrap();
        assert_eq!(code, "4/code");
    }

    #[tokio::test]
    async fn redirect_with_wrong_state_is_rejected() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /?state=other&code=x HTTP/1.1\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            let _ = stream.read_to_end(&mut response).await;
        });

        let err = wait_for_redirect(&listener, "abc").await.unwrap_err();
        assert!(matches!(err, AuthError::Flow(_)));
    }
}

//! Google OAuth 2.0 installed-app flow with a loopback redirect.
//!
//! Flow:
//! 1. Reuse cached credentials from `creds.json` when still valid
//! 2. Refresh the access token if it expired and a refresh token is cached
//! 3. Otherwise open the consent page in the browser and wait for Google to
//!    redirect back to a local listener with an authorization code
//! 4. Exchange the code (with its PKCE verifier) for tokens and cache them

use super::google_drive::{DriveClient, GoogleDrive};
use crate::config::Config;
use crate::utils::{browser::open_browser, spinner};
use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse, BasicTokenType};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Google OAuth endpoints
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Loopback ports tried in order for the redirect listener
const REDIRECT_PORTS: [u16; 2] = [8080, 8090];

/// Tokens this close to expiry are treated as expired
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Connections that send nothing (browser preconnects) are dropped after this
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<html><body><h3>Authentication complete.</h3>\
<p>You may close this window and return to the terminal.</p></body></html>";

/// Google client with the consent and token endpoints configured.
type GoogleOAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Credentials cached between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Unix timestamp (seconds)
    pub expires_at: Option<i64>,
}

impl DriveCredentials {
    /// Whether the access token can still be used at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.expires_at
            .map_or(true, |expires_at| expires_at - EXPIRY_MARGIN_SECS > now)
    }

    /// Google omits the refresh token on refresh grants, so the previous one
    /// is carried over when the response has none.
    fn from_token_response(
        response: &BasicTokenResponse,
        now: i64,
        previous_refresh_token: Option<String>,
    ) -> Self {
        let token_type = match response.token_type() {
            BasicTokenType::Bearer => "Bearer".to_string(),
            other => other.as_ref().to_string(),
        };

        Self {
            access_token: response.access_token().secret().clone(),
            refresh_token: response
                .refresh_token()
                .map(|token| token.secret().clone())
                .or(previous_refresh_token),
            token_type,
            expires_at: response
                .expires_in()
                .map(|lifetime| now + lifetime.as_secs() as i64),
        }
    }
}

pub fn save_credentials_to_file(credentials: &DriveCredentials, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(credentials)?;
    std::fs::write(path, json)
        .with_context(|| format!("Cannot write credentials file: {}", path.display()))?;
    Ok(())
}

pub fn load_credentials_from_file(path: &Path) -> Result<DriveCredentials> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read credentials file: {}", path.display()))?;
    let credentials: DriveCredentials = serde_json::from_str(&json)
        .with_context(|| format!("Cannot parse credentials file: {}", path.display()))?;
    Ok(credentials)
}

/// Cached credentials, or `None` when the cache is absent or unusable.
///
/// Caches in another format (e.g. written by an older tool) are ignored so
/// the browser flow can replace them.
fn read_cached_credentials(path: &Path) -> Option<DriveCredentials> {
    if !path.exists() {
        return None;
    }
    match load_credentials_from_file(path) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            warn!("Ignoring credential cache: {:#}", e);
            None
        }
    }
}

/// Produces an authenticated Drive client from the configuration.
pub trait Authenticator {
    fn authenticate(
        &self,
        config: &Config,
        credentials_path: &Path,
    ) -> Result<Box<dyn DriveClient>>;
}

/// Browser-based authentication with a local redirect listener.
pub struct LocalWebserverAuth {
    /// Drive API client handed to [`GoogleDrive`]
    client: reqwest::blocking::Client,
    /// Token endpoint client; redirects are not followed
    oauth_http: reqwest::blocking::Client,
}

impl Authenticator for LocalWebserverAuth {
    fn authenticate(
        &self,
        config: &Config,
        credentials_path: &Path,
    ) -> Result<Box<dyn DriveClient>> {
        let credentials = self.obtain_credentials(config, credentials_path)?;
        Ok(Box::new(GoogleDrive::new(
            self.client.clone(),
            credentials.access_token,
        )))
    }
}

impl LocalWebserverAuth {
    pub fn new() -> Result<Self> {
        let oauth_http = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Cannot build OAuth HTTP client")?;

        Ok(Self {
            client: reqwest::blocking::Client::new(),
            oauth_http,
        })
    }

    /// Returns usable credentials, from cache when possible.
    pub fn obtain_credentials(
        &self,
        config: &Config,
        credentials_path: &Path,
    ) -> Result<DriveCredentials> {
        if config.client_config_backend != "settings" {
            bail!(
                "Unsupported client_config_backend '{}', only 'settings' is supported",
                config.client_config_backend
            );
        }

        let caching = config.caches_credentials_in_file();
        let now = chrono::Utc::now().timestamp();

        if let Some(cached) = caching
            .then(|| read_cached_credentials(credentials_path))
            .flatten()
        {
            if cached.is_valid_at(now) {
                info!("Using cached Google Drive credentials");
                return Ok(cached);
            }

            if let Some(refresh_token) = cached.refresh_token.clone() {
                info!("Refreshing Google Drive access token");
                let refreshed = self.refresh(config, refresh_token, now)?;
                save_credentials_to_file(&refreshed, credentials_path)?;
                return Ok(refreshed);
            }

            warn!("Cached credentials expired and have no refresh token");
        }

        let credentials = self.browser_flow(config)?;
        if caching {
            save_credentials_to_file(&credentials, credentials_path)?;
            info!("Saved credentials to {}", credentials_path.display());
        }
        Ok(credentials)
    }

    fn browser_flow(&self, config: &Config) -> Result<DriveCredentials> {
        let (listener, port) = bind_loopback()?;
        let client = oauth_client(config)?
            .set_redirect_uri(RedirectUrl::new(format!("http://localhost:{}/", port))?);
        let (auth_url, state, verifier) = authorization_url(&client, &config.oauth_scope);

        println!("\n{}", "Google Drive Authentication".cyan().bold());
        println!("Open this URL in your browser to authorize access:");
        println!("  {}", auth_url.as_str().blue().underline());
        if !open_browser(auth_url.as_str()) {
            warn!("Cannot open browser automatically");
        }

        let progress = spinner("Waiting for authorization in browser...")?;
        let redirect = wait_for_redirect(&listener);
        progress.finish_and_clear();
        let code = validate_redirect(redirect?, state.secret())?;

        let response = client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(verifier)
            .request(&self.oauth_http)
            .map_err(token_error)?;

        println!("  {} Authentication successful!", "✓".green());
        Ok(DriveCredentials::from_token_response(
            &response,
            chrono::Utc::now().timestamp(),
            None,
        ))
    }

    fn refresh(
        &self,
        config: &Config,
        refresh_token: String,
        now: i64,
    ) -> Result<DriveCredentials> {
        let response = oauth_client(config)?
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request(&self.oauth_http)
            .map_err(token_error)?;

        Ok(DriveCredentials::from_token_response(
            &response,
            now,
            Some(refresh_token),
        ))
    }
}

fn oauth_client(config: &Config) -> Result<GoogleOAuthClient> {
    let client = BasicClient::new(ClientId::new(config.client_config.client_id.clone()))
        .set_client_secret(ClientSecret::new(
            config.client_config.client_secret.clone(),
        ))
        .set_auth_uri(AuthUrl::new(AUTH_URL.to_string())?)
        .set_token_uri(TokenUrl::new(TOKEN_URL.to_string())?);
    Ok(client)
}

/// Consent URL with a fresh `state` and PKCE `S256` challenge.
fn authorization_url(
    client: &GoogleOAuthClient,
    scopes: &[String],
) -> (Url, CsrfToken, PkceCodeVerifier) {
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
    let (url, state) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(scopes.iter().cloned().map(Scope::new))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(challenge)
        .url();
    (url, state, verifier)
}

fn token_error<E>(err: RequestTokenError<E, BasicErrorResponse>) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let desc = response
                .error_description()
                .map(String::as_str)
                .unwrap_or("Unknown error");
            anyhow!("OAuth error: {} - {}", response.error(), desc)
        }
        other => anyhow::Error::new(other).context("Google token request failed"),
    }
}

/// Query parameters Google appends to the redirect URI
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RedirectParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Extracts the OAuth redirect from an HTTP request line.
///
/// Returns `None` for requests that carry neither `code` nor `error`
/// (favicon fetches, probes).
pub fn parse_redirect(request_line: &str) -> Option<RedirectParams> {
    let target = request_line.split_whitespace().nth(1)?;
    let url = Url::parse("http://localhost/").ok()?.join(target).ok()?;

    let mut params = RedirectParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            _ => {}
        }
    }

    if params.code.is_none() && params.error.is_none() {
        return None;
    }
    Some(params)
}

/// Returns the authorization code once the redirect is known to answer our
/// own consent request.
pub fn validate_redirect(params: RedirectParams, expected_state: &str) -> Result<String> {
    if let Some(error) = params.error {
        bail!("Authorization denied: {}", error);
    }
    if params.state.as_deref() != Some(expected_state) {
        bail!("OAuth state mismatch in redirect");
    }
    params
        .code
        .ok_or_else(|| anyhow!("Redirect has no authorization code"))
}

fn bind_loopback() -> Result<(TcpListener, u16)> {
    for port in REDIRECT_PORTS {
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => debug!("Port {} unavailable: {}", port, e),
        }
    }
    bail!(
        "Cannot start local auth server, ports {:?} are in use",
        REDIRECT_PORTS
    )
}

/// Serves connections until one carries the OAuth redirect.
///
/// Broken or unrelated connections are answered when possible and skipped.
fn wait_for_redirect(listener: &TcpListener) -> Result<RedirectParams> {
    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Local auth server accept failed: {}", e);
                continue;
            }
        };

        let request_line = match read_request_head(&stream) {
            Ok(line) => line,
            Err(e) => {
                debug!("Dropping unreadable connection: {}", e);
                continue;
            }
        };

        match parse_redirect(&request_line) {
            Some(params) => {
                if let Err(e) = respond(&mut stream, "200 OK", SUCCESS_PAGE) {
                    debug!("Cannot answer the redirect request: {}", e);
                }
                return Ok(params);
            }
            None => {
                debug!("Ignoring request: {}", request_line.trim_end());
                if let Err(e) = respond(&mut stream, "404 Not Found", "Not found") {
                    debug!("Cannot answer ignored request: {}", e);
                }
            }
        }
    }
    bail!("Local auth server stopped before authorization completed")
}

/// Reads the request line and drains the headers up to the blank line.
fn read_request_head(stream: &TcpStream) -> std::io::Result<String> {
    stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
    let mut reader = BufReader::new(stream);

    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    let request_line = String::from_utf8_lossy(&line).into_owned();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line)?;
        if read == 0 || line == b"\r\n" || line == b"\n" {
            break;
        }
    }
    Ok(request_line)
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) -> std::io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, GithubConfig};
    use oauth2::basic::BasicTokenType;
    use oauth2::{AccessToken, EmptyExtraTokenFields};
    use std::io::Read;
    use tempfile::TempDir;

    fn sample_config() -> Config {
        Config::new(
            ClientConfig {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
            },
            GithubConfig {
                username: "alice".to_string(),
                repo: "proj".to_string(),
                access_token: "tok".to_string(),
            },
        )
    }

    fn redirect(code: Option<&str>, state: Option<&str>, error: Option<&str>) -> RedirectParams {
        RedirectParams {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_redirect_with_code() {
        let params = parse_redirect("GET /?state=xyz&code=4%2F0Ab&scope=drive HTTP/1.1\r\n")
            .expect("redirect should parse");
        assert_eq!(params.code.as_deref(), Some("4/0Ab"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert_eq!(params.error, None);
    }

    #[test]
    fn test_parse_redirect_with_error() {
        let params = parse_redirect("GET /?error=access_denied&state=xyz HTTP/1.1\r\n")
            .expect("redirect should parse");
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.code, None);
    }

    #[test]
    fn test_parse_redirect_ignores_other_requests() {
        assert_eq!(parse_redirect("GET /favicon.ico HTTP/1.1\r\n"), None);
        assert_eq!(parse_redirect(""), None);
    }

    #[test]
    fn test_validate_redirect_returns_code() -> Result<()> {
        let code = validate_redirect(redirect(Some("abc"), Some("xyz"), None), "xyz")?;
        assert_eq!(code, "abc");
        Ok(())
    }

    #[test]
    fn test_validate_redirect_rejects_denied_consent() {
        let err = validate_redirect(redirect(None, Some("xyz"), Some("access_denied")), "xyz")
            .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn test_validate_redirect_rejects_state_mismatch() {
        let err =
            validate_redirect(redirect(Some("abc"), Some("other"), None), "xyz").unwrap_err();
        assert!(err.to_string().contains("state mismatch"));

        let err = validate_redirect(redirect(Some("abc"), None, None), "xyz").unwrap_err();
        assert!(err.to_string().contains("state mismatch"));
    }

    #[test]
    fn test_validate_redirect_requires_code() {
        let err = validate_redirect(redirect(None, Some("xyz"), None), "xyz").unwrap_err();
        assert!(err.to_string().contains("no authorization code"));
    }

    #[test]
    fn test_wait_for_redirect_skips_unrelated_connections() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;

        let browser = std::thread::spawn(move || {
            let send = |request: &[u8]| -> std::io::Result<String> {
                let mut stream = TcpStream::connect(addr)?;
                stream.write_all(request)?;
                let mut response = String::new();
                stream.read_to_string(&mut response)?;
                Ok(response)
            };

            // Preconnect closed without a request, then a non-HTTP payload
            drop(TcpStream::connect(addr));
            let _ = send(b"\x16\x03\x01\xff\xfe garbage\r\n\r\n");

            let favicon = send(b"GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n");
            let redirect =
                send(b"GET /?code=abc&state=xyz HTTP/1.1\r\nHost: localhost:8080\r\n\r\n");
            (favicon, redirect)
        });

        let params = wait_for_redirect(&listener)?;
        let (favicon, redirect) = browser.join().unwrap();

        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(favicon?.starts_with("HTTP/1.1 404"));
        assert!(redirect?.starts_with("HTTP/1.1 200"));
        Ok(())
    }

    #[test]
    fn test_authorization_url() -> Result<()> {
        let config = sample_config();
        let client = oauth_client(&config)?
            .set_redirect_uri(RedirectUrl::new("http://localhost:8080/".to_string())?);
        let (url, state, verifier) = authorization_url(&client, &config.oauth_scope);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let has = |key: &str, value: &str| pairs.contains(&(key.to_string(), value.to_string()));

        assert!(url.as_str().starts_with(AUTH_URL));
        assert!(has("client_id", "client"));
        assert!(has("redirect_uri", "http://localhost:8080/"));
        assert!(has("response_type", "code"));
        assert!(has("scope", "https://www.googleapis.com/auth/drive"));
        assert!(has("access_type", "offline"));
        assert!(has("prompt", "consent"));
        assert!(has("state", state.secret()));
        assert!(has("code_challenge_method", "S256"));
        assert!(has(
            "code_challenge",
            PkceCodeChallenge::from_code_verifier_sha256(&verifier).as_str()
        ));
        Ok(())
    }

    #[test]
    fn test_credentials_expiry() {
        let mut creds = DriveCredentials {
            access_token: "a".to_string(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_at: None,
        };
        assert!(creds.is_valid_at(1_000));

        creds.expires_at = Some(1_000);
        assert!(creds.is_valid_at(900));
        assert!(!creds.is_valid_at(950));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let mut response = BasicTokenResponse::new(
            AccessToken::new("new".to_string()),
            BasicTokenType::Bearer,
            EmptyExtraTokenFields {},
        );
        response.set_expires_in(Some(&Duration::from_secs(3600)));

        let creds =
            DriveCredentials::from_token_response(&response, 100, Some("refresh".to_string()));
        assert_eq!(creds.access_token, "new");
        assert_eq!(creds.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(creds.token_type, "Bearer");
        assert_eq!(creds.expires_at, Some(3700));
    }

    #[test]
    fn test_valid_cache_skips_browser() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("creds.json");
        let cached = DriveCredentials {
            access_token: "cached".to_string(),
            refresh_token: Some("refresh".to_string()),
            token_type: "Bearer".to_string(),
            expires_at: Some(chrono::Utc::now().timestamp() + 3600),
        };
        save_credentials_to_file(&cached, &path)?;

        let creds = LocalWebserverAuth::new()?.obtain_credentials(&sample_config(), &path)?;
        assert_eq!(creds, cached);
        Ok(())
    }

    #[test]
    fn test_foreign_credential_cache_is_ignored() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("creds.json");
        std::fs::write(
            &path,
            r#"{"access_token": "ya29.a0", "client_id": "client", "refresh_token": "1//0g",
               "token_expiry": "2021-03-01T10:00:00Z", "_module": "oauth2client.client"}"#,
        )?;

        assert_eq!(read_cached_credentials(&path), None);
        assert_eq!(read_cached_credentials(&temp_dir.path().join("absent.json")), None);
        Ok(())
    }

    #[test]
    fn test_unsupported_client_backend() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let mut config = sample_config();
        config.client_config_backend = "file".to_string();

        let err = LocalWebserverAuth::new()?
            .obtain_credentials(&config, &temp_dir.path().join("creds.json"))
            .unwrap_err();
        assert!(err.to_string().contains("client_config_backend"));
        Ok(())
    }
}

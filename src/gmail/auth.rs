//! Google OAuth credentials for the Gmail API
//!
//! The token file uses Google's `authorized_user` JSON layout, so a token
//! produced by other Google tooling can be reused as-is.

use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use url::Url;

use crate::error::{DigestError, Result};

/// Scopes needed to read newsletters and send the notification
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
];

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Tokens are refreshed this long before they actually expire
const EXPIRY_SKEW_SECS: i64 = 60;

/// Stored user credentials (`token.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    /// Current access token
    #[serde(default)]
    pub token: Option<String>,
    /// Long-lived refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Granted scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Access token expiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Fields written by other tools, preserved on save
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Installed-app client secrets (`credentials.json`)
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    /// Desktop app client
    pub installed: Option<ClientInfo>,
    /// Web app client
    pub web: Option<ClientInfo>,
}

/// OAuth client registration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client ID
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Consent page
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Token endpoint error body
#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl AuthorizedUser {
    /// Read a token file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DigestError::file_not_found(path));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the token file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Whether the access token can be used at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.token, self.expiry) {
            (Some(_), Some(expiry)) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Whether the credentials carry a refresh token
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Exchange the refresh token for a new access token
    pub async fn refresh(&mut self, client: &Client) -> Result<()> {
        let refresh_token = self
            .refresh_token
            .clone()
            .ok_or_else(|| DigestError::oauth("No refresh token available"))?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let token = request_token(client, &self.token_uri, &params).await?;
        self.apply(token, Utc::now());
        Ok(())
    }

    fn apply(&mut self, token: TokenResponse, now: DateTime<Utc>) {
        self.token = Some(token.access_token);
        self.expiry = token.expires_in.map(|secs| now + Duration::seconds(secs));
        if let Some(refresh) = token.refresh_token {
            self.refresh_token = Some(refresh);
        }
        if let Some(scope) = token.scope {
            self.scopes = scope.split_whitespace().map(String::from).collect();
        }
    }

    /// Bearer token for API requests
    pub fn access_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| DigestError::oauth("Credentials hold no access token"))
    }
}

impl ClientSecrets {
    /// Read a client secrets file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DigestError::file_not_found(path));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The registered client, desktop first
    pub fn client(&self) -> Result<&ClientInfo> {
        self.installed
            .as_ref()
            .or(self.web.as_ref())
            .ok_or_else(|| DigestError::oauth("Client secrets contain neither 'installed' nor 'web'"))
    }
}

async fn request_token(client: &Client, token_uri: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
    let resp = client.post(token_uri).form(params).send().await?;
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        let detail = serde_json::from_str::<TokenError>(&body)
            .map(|e| match e.error_description {
                Some(desc) => format!("{}: {}", e.error, desc),
                None => e.error,
            })
            .unwrap_or(body);
        return Err(DigestError::oauth(format!("Token endpoint returned {}: {}", status, detail)));
    }

    Ok(serde_json::from_str(&body)?)
}

/// Refresh `creds` when the access token is missing or about to expire.
///
/// The refreshed token is written to `token_path` when one is given.
pub async fn refresh_if_expired(
    creds: &mut AuthorizedUser,
    client: &Client,
    token_path: Option<&Path>,
) -> Result<()> {
    if creds.is_valid_at(Utc::now()) {
        return Ok(());
    }

    if !creds.can_refresh() {
        return Err(DigestError::oauth(
            "Gmail credentials are not valid and cannot be refreshed automatically. Run `digestcast auth`.",
        ));
    }

    info!("Refreshing expired Gmail credentials");
    creds.refresh(client).await.map_err(|e| {
        error!("Failed to refresh Gmail token: {}", e);
        DigestError::oauth(format!("Failed to refresh Gmail credentials: {}", e))
    })?;

    if let Some(path) = token_path {
        creds.save(path)?;
        info!("Refreshed token saved to {}", path.display());
    }
    Ok(())
}

/// Load stored credentials, refreshing and re-saving them when expired.
///
/// Fails when the token is missing or cannot be refreshed; interactive login
/// is left to `digestcast auth`.
pub async fn load_credentials(client: &Client, token_path: &Path) -> Result<AuthorizedUser> {
    let mut creds = match AuthorizedUser::from_file(token_path) {
        Ok(creds) => creds,
        Err(e) => {
            error!("Failed to load token file from {}: {}", token_path.display(), e);
            return Err(DigestError::oauth(format!(
                "Gmail credentials missing or unreadable at '{}'. Run `digestcast auth` to create them.",
                token_path.display()
            )));
        }
    };

    refresh_if_expired(&mut creds, client, Some(token_path)).await?;
    Ok(creds)
}

/// Consent page URL for the installed-app flow
pub fn authorization_url(client: &ClientInfo, redirect_uri: &str) -> Result<Url> {
    let scope = SCOPES.join(" ");
    Url::parse_with_params(
        &client.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| DigestError::oauth(format!("Invalid auth URI '{}': {}", client.auth_uri, e)))
}

/// Query string Google appends to the redirect URI
#[derive(Debug, Default, Deserialize)]
pub struct RedirectParams {
    /// Authorization code
    pub code: Option<String>,
    /// Error code when the user declined
    pub error: Option<String>,
}

impl RedirectParams {
    /// The authorization code, or `None` when the request carried neither a
    /// code nor an error
    pub fn outcome(&self) -> Option<Result<String>> {
        if let Some(error) = &self.error {
            return Some(Err(DigestError::oauth(format!("Authorization denied: {}", error))));
        }
        self.code.clone().map(Ok)
    }
}

const REDIRECT_DONE: &str =
    "<html><body><p>The authentication flow has completed. You may close this window.</p></body></html>";

const REDIRECT_INCOMPLETE: &str =
    "<html><body><p>No authorization code was received. Restart the flow from the terminal.</p></body></html>";

/// Hands the first redirect outcome back to the waiting flow
#[derive(Clone)]
struct RedirectState {
    sender: Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>,
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<RedirectParams>,
) -> (StatusCode, Html<&'static str>) {
    let Some(outcome) = params.outcome() else {
        debug!("Ignoring redirect without code or error");
        return (StatusCode::BAD_REQUEST, Html(REDIRECT_INCOMPLETE));
    };

    let sender = state.sender.lock().ok().and_then(|mut s| s.take());
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
    (StatusCode::OK, Html(REDIRECT_DONE))
}

/// Run the installed-app flow: serve the redirect on a loopback port, let the
/// user grant access in a browser, then exchange the code for tokens.
///
/// `on_url` receives the consent URL to show the user.
pub async fn run_installed_flow(
    http: &Client,
    secrets: &ClientSecrets,
    port: u16,
    on_url: impl FnOnce(&Url),
) -> Result<AuthorizedUser> {
    let client = secrets.client()?;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://localhost:{}/", port);

    let (code_tx, code_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let app = Router::new()
        .route("/", get(handle_redirect))
        .with_state(RedirectState { sender: Arc::new(Mutex::new(Some(code_tx))) });

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                stop_rx.await.ok();
            })
            .await
    });
    debug!("Redirect listener on {}", redirect_uri);

    on_url(&authorization_url(client, &redirect_uri)?);

    let outcome = code_rx.await;
    let _ = stop_tx.send(());
    match tokio::time::timeout(std::time::Duration::from_secs(5), server).await {
        Ok(Ok(Err(e))) => debug!("Redirect listener stopped with error: {}", e),
        Err(_) => debug!("Redirect listener still draining connections; leaving it behind"),
        _ => {}
    }
    let code = outcome
        .map_err(|_| DigestError::oauth("Redirect listener stopped before authorization completed"))??;

    let params = [
        ("code", code.as_str()),
        ("client_id", client.client_id.as_str()),
        ("client_secret", client.client_secret.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("grant_type", "authorization_code"),
    ];
    let token = request_token(http, &client.token_uri, &params).await?;

    let mut creds = AuthorizedUser {
        token: None,
        refresh_token: None,
        token_uri: client.token_uri.clone(),
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        expiry: None,
        extra: serde_json::Map::new(),
    };
    creds.apply(token, Utc::now());
    Ok(creds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(token: Option<&str>, expiry: Option<DateTime<Utc>>, refresh: Option<&str>) -> AuthorizedUser {
        AuthorizedUser {
            token: token.map(String::from),
            refresh_token: refresh.map(String::from),
            token_uri: DEFAULT_TOKEN_URI.into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scopes: Vec::new(),
            expiry,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_validity() {
        let now = Utc::now();
        assert!(creds(Some("t"), Some(now + Duration::minutes(10)), None).is_valid_at(now));
        assert!(!creds(Some("t"), Some(now + Duration::seconds(30)), None).is_valid_at(now));
        assert!(!creds(Some("t"), Some(now - Duration::minutes(1)), None).is_valid_at(now));
        assert!(creds(Some("t"), None, None).is_valid_at(now));
        assert!(!creds(None, None, Some("r")).is_valid_at(now));

        assert!(creds(None, None, Some("r")).can_refresh());
        assert!(!creds(None, None, Some("")).can_refresh());
    }

    #[test]
    fn test_reads_google_token_file() {
        let json = r#"{
            "token": "ya29.a0",
            "refresh_token": "1//0g",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "scopes": ["https://www.googleapis.com/auth/gmail.readonly"],
            "universe_domain": "googleapis.com",
            "account": "",
            "expiry": "2024-05-01T12:00:00.123456Z"
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, json).unwrap();

        let user = AuthorizedUser::from_file(&path).unwrap();
        assert_eq!(user.access_token().unwrap(), "ya29.a0");
        assert!(user.expiry.is_some());
        assert_eq!(user.extra.get("universe_domain").and_then(|v| v.as_str()), Some("googleapis.com"));

        user.save(&path).unwrap();
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("universe_domain"));
    }

    #[test]
    fn test_apply_token_response() {
        let mut user = creds(Some("old"), None, Some("keep"));
        let now = Utc::now();
        user.apply(
            TokenResponse {
                access_token: "new".into(),
                expires_in: Some(3599),
                refresh_token: None,
                scope: Some("a b".into()),
            },
            now,
        );
        assert_eq!(user.token.as_deref(), Some("new"));
        assert_eq!(user.refresh_token.as_deref(), Some("keep"));
        assert_eq!(user.expiry, Some(now + Duration::seconds(3599)));
        assert_eq!(user.scopes, vec!["a", "b"]);
    }

    #[test]
    fn test_client_secrets() {
        let secrets: ClientSecrets = serde_json::from_str(
            r#"{"installed": {"client_id": "cid", "client_secret": "cs", "redirect_uris": ["http://localhost"]}}"#,
        )
        .unwrap();
        let client = secrets.client().unwrap();
        assert_eq!(client.auth_uri, DEFAULT_AUTH_URI);

        let url = authorization_url(client, "http://localhost:8080/").unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "cid");
        assert_eq!(query["access_type"], "offline");
        assert_eq!(query["scope"], SCOPES.join(" "));

        let empty: ClientSecrets = serde_json::from_str("{}").unwrap();
        assert!(empty.client().is_err());
    }

    #[test]
    fn test_redirect_outcome() {
        let ok = RedirectParams { code: Some("4/0Ad".into()), error: None };
        assert_eq!(ok.outcome().unwrap().unwrap(), "4/0Ad");

        let denied = RedirectParams { code: None, error: Some("access_denied".into()) };
        assert!(matches!(denied.outcome(), Some(Err(DigestError::OAuth(_)))));

        assert!(RedirectParams::default().outcome().is_none());
    }

    #[tokio::test]
    async fn test_installed_flow_exchanges_code() {
        use axum::routing::post;
        use axum::{Form, Json};
        use std::collections::HashMap;

        let token_endpoint = crate::test_support::serve(Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["grant_type"], "authorization_code");
                assert_eq!(form["code"], "4/0Ad");
                Json(serde_json::json!({
                    "access_token": "ya29.new",
                    "expires_in": 3599,
                    "refresh_token": "1//refresh"
                }))
            }),
        ))
        .await;

        let secrets: ClientSecrets = serde_json::from_value(serde_json::json!({
            "installed": {
                "client_id": "cid",
                "client_secret": "cs",
                "token_uri": format!("{}/token", token_endpoint)
            }
        }))
        .unwrap();

        let http = Client::new();
        let browser = http.clone();
        let creds = run_installed_flow(&http, &secrets, 0, |url| {
            let redirect = url
                .query_pairs()
                .find(|(k, _)| k == "redirect_uri")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            tokio::spawn(async move {
                let favicon = browser.get(format!("{}favicon.ico", redirect)).send().await.unwrap();
                assert_eq!(favicon.status(), reqwest::StatusCode::NOT_FOUND);
                browser.get(format!("{}?code=4%2F0Ad&scope=gmail", redirect)).send().await.unwrap();
            });
        })
        .await
        .unwrap();

        assert_eq!(creds.access_token().unwrap(), "ya29.new");
        assert_eq!(creds.refresh_token.as_deref(), Some("1//refresh"));
        assert_eq!(creds.client_id, "cid");
    }

    #[tokio::test]
    async fn test_refresh_if_expired_saves_token() {
        use axum::routing::post;
        use axum::Json;

        let endpoint = crate::test_support::serve(Router::new().route(
            "/token",
            post(|| async { Json(serde_json::json!({"access_token": "renewed", "expires_in": 3600})) }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let mut user = creds(Some("stale"), Some(Utc::now() - Duration::minutes(5)), Some("r"));
        user.token_uri = format!("{}/token", endpoint);

        refresh_if_expired(&mut user, &Client::new(), Some(&path)).await.unwrap();
        assert_eq!(user.access_token().unwrap(), "renewed");
        assert_eq!(AuthorizedUser::from_file(&path).unwrap().token.as_deref(), Some("renewed"));

        let mut stuck = creds(Some("stale"), Some(Utc::now() - Duration::minutes(5)), None);
        assert!(matches!(
            refresh_if_expired(&mut stuck, &Client::new(), None).await,
            Err(DigestError::OAuth(_))
        ));
    }

    #[tokio::test]
    async fn test_load_credentials_without_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_credentials(&Client::new(), &dir.path().join("token.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::OAuth(_)));
    }

    #[tokio::test]
    async fn test_load_credentials_valid_token_skips_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        creds(Some("fresh"), Some(Utc::now() + Duration::hours(1)), None)
            .save(&path)
            .unwrap();

        let loaded = load_credentials(&Client::new(), &path).await.unwrap();
        assert_eq!(loaded.access_token().unwrap(), "fresh");
    }
}

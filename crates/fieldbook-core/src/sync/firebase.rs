//! Firebase Realtime Database transport over REST.
//!
//! Connecting signs in anonymously with the project's API key. The shared
//! document lives at `{databaseURL}/ppw-data/{syncKey}.json`. Change
//! notification is done by polling and forwarding documents whose
//! `updatedAt` moved.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};

use crate::config::SyncConfig;
use crate::models::lenient;
use crate::util::{compact_text, now_millis};

use super::remote::{
    RemoteChannel, RemoteConnector, RemoteDocument, RemoteError, RemoteResult, Subscription,
    SyncErrorKind,
};

const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
const DOCUMENT_ROOT: &str = "ppw-data";
const HTTP_TIMEOUT_SECS: u64 = 20;
const TOKEN_REFRESH_MARGIN_MS: i64 = 60_000;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
const SUBSCRIPTION_BUFFER: usize = 4;

/// Default polling period for change notification.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone, PartialEq, Eq)]
struct IdToken {
    token: String,
    refresh_token: String,
    /// Epoch milliseconds
    expires_at: i64,
}

impl std::fmt::Debug for IdToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("IdToken")
            .field("token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl IdToken {
    fn needs_refresh(&self, now: i64) -> bool {
        self.expires_at - TOKEN_REFRESH_MARGIN_MS <= now
    }
}

/// Response of `accounts:signUp`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    expires_in: String,
}

/// Response of the secure token refresh endpoint.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    expires_in: String,
}

fn build_token(
    token: Option<String>,
    refresh_token: Option<String>,
    expires_in: &str,
    now: i64,
) -> RemoteResult<IdToken> {
    let token = token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| RemoteError::auth("sign-in response did not include an id token"))?;
    let lifetime = expires_in
        .trim()
        .parse::<i64>()
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

    Ok(IdToken {
        token,
        refresh_token: refresh_token.unwrap_or_default(),
        expires_at: now.saturating_add(lifetime.saturating_mul(1000)),
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorBody {
    /// Identity toolkit: `{"error": {"message": "..."}}`
    Nested { error: NestedError },
    /// Realtime Database: `{"error": "..."}`
    Flat { error: String },
}

#[derive(Debug, Deserialize)]
struct NestedError {
    message: String,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        let message = match payload {
            ApiErrorBody::Nested { error } => error.message,
            ApiErrorBody::Flat { error } => error,
        };
        return format!("{} ({})", message.trim(), status.as_u16());
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn error_kind_for(status: StatusCode) -> SyncErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncErrorKind::AuthError,
        _ => SyncErrorKind::TransportError,
    }
}

fn document_url(config: &SyncConfig) -> String {
    format!(
        "{}/{}/{}.json",
        config.database_url.trim().trim_end_matches('/'),
        DOCUMENT_ROOT,
        urlencoding::encode(config.sync_key.trim())
    )
}

fn parse_document(body: &str) -> RemoteResult<Option<RemoteDocument>> {
    serde_json::from_str::<Option<RemoteDocument>>(body)
        .map_err(|error| RemoteError::parse(format!("invalid remote document: {error}")))
}

fn transport_error(error: &reqwest::Error) -> RemoteError {
    RemoteError::transport(format!("request failed: {error}"))
}

/// Connector for a Firebase project.
#[derive(Clone)]
pub struct FirebaseConnector {
    client: reqwest::Client,
    poll_interval: Duration,
}

impl FirebaseConnector {
    pub fn new() -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|error| {
                RemoteError::new(
                    SyncErrorKind::SdkMissing,
                    format!("failed to build HTTP client: {error}"),
                )
            })?;
        Ok(Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn sign_in_anonymously(&self, api_key: &str) -> RemoteResult<IdToken> {
        let response = self
            .client
            .post(SIGN_UP_URL)
            .query(&[("key", api_key)])
            .json(&json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|error| transport_error(&error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::auth(parse_api_error(status, &body)));
        }

        let payload = response
            .json::<SignUpResponse>()
            .await
            .map_err(|error| RemoteError::parse(format!("invalid sign-in response: {error}")))?;
        build_token(
            payload.id_token,
            payload.refresh_token,
            &payload.expires_in,
            now_millis(),
        )
    }
}

#[async_trait]
impl RemoteConnector for FirebaseConnector {
    async fn connect(&self, config: &SyncConfig) -> RemoteResult<Arc<dyn RemoteChannel>> {
        config
            .validate()
            .map_err(|message| RemoteError::new(SyncErrorKind::ConfigMissing, message))?;

        let token = self.sign_in_anonymously(config.api_key.trim()).await?;
        tracing::info!(
            "Signed in to {} for sync key \"{}\"",
            config.resolved_auth_domain(),
            config.sync_key
        );

        Ok(Arc::new(FirebaseChannel {
            state: Arc::new(ChannelState {
                client: self.client.clone(),
                document_url: document_url(config),
                api_key: config.api_key.trim().to_string(),
                token: Mutex::new(token),
                poll_interval: self.poll_interval,
            }),
        }))
    }
}

struct ChannelState {
    client: reqwest::Client,
    document_url: String,
    api_key: String,
    token: Mutex<IdToken>,
    poll_interval: Duration,
}

/// Authenticated handle to one shared document.
#[derive(Clone)]
pub struct FirebaseChannel {
    state: Arc<ChannelState>,
}

impl FirebaseChannel {
    /// Current id token, refreshed when close to expiry.
    async fn id_token(&self) -> RemoteResult<String> {
        let mut token = self.state.token.lock().await;
        if token.needs_refresh(now_millis()) {
            let refreshed = self.refresh(&token.refresh_token).await?;
            *token = refreshed;
            tracing::debug!("Refreshed sync id token");
        }
        Ok(token.token.clone())
    }

    async fn refresh(&self, refresh_token: &str) -> RemoteResult<IdToken> {
        if refresh_token.is_empty() {
            return Err(RemoteError::auth("id token expired and no refresh token is available"));
        }

        let response = self
            .state
            .client
            .post(TOKEN_URL)
            .query(&[("key", self.state.api_key.as_str())])
            .json(&json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await
            .map_err(|error| transport_error(&error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::auth(parse_api_error(status, &body)));
        }

        let payload = response
            .json::<RefreshResponse>()
            .await
            .map_err(|error| RemoteError::parse(format!("invalid token response: {error}")))?;
        build_token(
            payload.id_token,
            payload.refresh_token,
            &payload.expires_in,
            now_millis(),
        )
    }

    async fn check(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(
            error_kind_for(status),
            parse_api_error(status, &body),
        ))
    }
}

#[async_trait]
impl RemoteChannel for FirebaseChannel {
    async fn get(&self) -> RemoteResult<Option<RemoteDocument>> {
        let token = self.id_token().await?;
        let response = self
            .state
            .client
            .get(&self.state.document_url)
            .query(&[("auth", token.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| transport_error(&error))?;

        let body = Self::check(response)
            .await?
            .text()
            .await
            .map_err(|error| transport_error(&error))?;
        parse_document(&body)
    }

    async fn set(&self, document: &RemoteDocument) -> RemoteResult<()> {
        let token = self.id_token().await?;
        let response = self
            .state
            .client
            .put(&self.state.document_url)
            .query(&[("auth", token.as_str()), ("print", "silent")])
            .json(document)
            .send()
            .await
            .map_err(|error| transport_error(&error))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn subscribe(&self) -> RemoteResult<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let channel = self.clone();
        let period = self.state.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_seen: Option<Option<i64>> = None;

            loop {
                ticker.tick().await;
                let document = match channel.get().await {
                    Ok(Some(document)) => document,
                    Ok(None) => continue,
                    Err(error) => {
                        tracing::warn!("Polling remote document failed: {}", error);
                        continue;
                    }
                };

                let changed = last_seen.is_some_and(|seen| seen != document.updated_at);
                last_seen = Some(document.updated_at);
                if changed && tx.send(document).await.is_err() {
                    break;
                }
            }
        });

        Ok(Subscription::new(rx, task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(sync_key: &str) -> SyncConfig {
        SyncConfig {
            sync_key: sync_key.to_string(),
            api_key: "key".to_string(),
            project_id: "demo".to_string(),
            database_url: "https://demo.firebaseio.com/".to_string(),
            auth_domain: None,
        }
    }

    #[test]
    fn document_url_encodes_sync_key() {
        assert_eq!(
            document_url(&config("crew-1")),
            "https://demo.firebaseio.com/ppw-data/crew-1.json"
        );
        assert_eq!(
            document_url(&config("a b/c")),
            "https://demo.firebaseio.com/ppw-data/a%20b%2Fc.json"
        );
    }

    #[test]
    fn parse_api_error_handles_both_shapes() {
        assert_eq!(
            parse_api_error(
                StatusCode::BAD_REQUEST,
                r#"{"error":{"code":400,"message":"ADMIN_ONLY_OPERATION"}}"#
            ),
            "ADMIN_ONLY_OPERATION (400)"
        );
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, r#"{"error":"Permission denied"}"#),
            "Permission denied (401)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert_eq!(
            error_kind_for(StatusCode::FORBIDDEN),
            SyncErrorKind::AuthError
        );
        assert_eq!(
            error_kind_for(StatusCode::INTERNAL_SERVER_ERROR),
            SyncErrorKind::TransportError
        );
    }

    #[test]
    fn parse_document_accepts_null_and_rejects_garbage() {
        assert_eq!(parse_document("null").unwrap(), None);
        let document = parse_document(r#"{"version":2,"updatedAt":5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(document.updated_at, Some(5));
        assert_eq!(
            parse_document("<html>").unwrap_err().kind,
            SyncErrorKind::ParseError
        );
    }

    #[test]
    fn parse_document_keeps_readable_records() {
        let body = r#"{
            "version": 2,
            "updatedAt": 1700000000000.0,
            "customers": [
                {"id": "a", "name": "Ann", "lastUpdated": 1700000000000.0},
                {"id": "b", "name": ["not", "a", "name"]}
            ],
            "deletedJobs": [{"id": "j1", "deletedAt": "2024-01-01"}, null]
        }"#;

        let document = parse_document(body).unwrap().unwrap();

        assert_eq!(document.updated_at, Some(1_700_000_000_000));
        assert_eq!(document.customers.len(), 1);
        assert_eq!(document.customers[0].id, "a");
        assert_eq!(document.deleted_jobs.len(), 1);
        assert_eq!(document.deleted_jobs[0].deleted_at, 1_704_067_200_000);
    }

    #[test]
    fn build_token_computes_expiry_and_requires_token() {
        let token = build_token(Some("abc".to_string()), None, "3600", 1_000).unwrap();
        assert_eq!(token.expires_at, 1_000 + 3_600_000);
        assert!(!token.needs_refresh(1_000));
        assert!(token.needs_refresh(token.expires_at - 30_000));

        let error = build_token(Some("  ".to_string()), None, "3600", 0).unwrap_err();
        assert_eq!(error.kind, SyncErrorKind::AuthError);
    }

    #[test]
    fn sign_up_response_accepts_string_expiry() {
        let payload: SignUpResponse = serde_json::from_str(
            r#"{"idToken":"t","refreshToken":"r","expiresIn":"3600","localId":"u"}"#,
        )
        .unwrap();
        assert_eq!(payload.expires_in, "3600");
        assert_eq!(payload.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn id_token_debug_redacts_secrets() {
        let token = IdToken {
            token: "secret".to_string(),
            refresh_token: "also-secret".to_string(),
            expires_at: 1,
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn connector_poll_interval_is_configurable() {
        let connector = FirebaseConnector::new().unwrap();
        assert_eq!(connector.poll_interval, DEFAULT_POLL_INTERVAL);

        let connector = connector.with_poll_interval(Duration::from_secs(2));
        assert_eq!(connector.poll_interval, Duration::from_secs(2));
    }
}

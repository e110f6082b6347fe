//! Hosted Supabase backend.
//!
//! - Auth: `/auth/v1` (password grant, refresh grant, sign-up, logout, user)
//! - Tables: `/rest/v1/{table}` (`PostgREST` filters, embeds, upserts)
//! - Storage: `/storage/v1/object/{bucket}/{path}`
//! - Change feed: Phoenix channels over `/realtime/v1/websocket`
//!
//! Every request carries the project's anon key as `apikey`, and the signed-in
//! user's access token (or the anon key when signed out) as the bearer token.
//! The access token is refreshed shortly before it expires, both on a timer
//! and before any request that would otherwise send a stale token.

mod auth;
mod realtime;
mod rest;
mod storage;

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::error;

use super::{AuthChangeEvent, AuthSession, BackendError};
use crate::config::SupabaseConfig;

use realtime::RealtimeClient;

/// Client for a hosted Supabase project.
///
/// Cheap to clone; clones share the HTTP client, the session and the
/// realtime socket.
#[derive(Clone)]
pub struct SupabaseBackend {
    inner: Arc<SupabaseInner>,
}

struct SupabaseInner {
    http: reqwest::Client,
    api_url: String,
    anon_key: SecretString,
    session: RwLock<Option<AuthSession>>,
    /// Held while a refresh grant is in flight; refresh tokens are single use.
    refresh_lock: tokio::sync::Mutex<()>,
    /// Timer task that refreshes the stored session before it expires.
    refresher: Mutex<Option<JoinHandle<()>>>,
    auth_events: broadcast::Sender<AuthChangeEvent>,
    realtime: RealtimeClient,
}

impl Drop for SupabaseInner {
    fn drop(&mut self) {
        if let Some(refresher) = self
            .refresher
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            refresher.abort();
        }
    }
}

impl SupabaseBackend {
    /// Create a client for the project described by `config`.
    #[must_use]
    pub fn new(config: &SupabaseConfig) -> Self {
        let api_url = config.url.as_str().trim_end_matches('/').to_owned();
        let (auth_events, _) = broadcast::channel(64);
        let realtime = RealtimeClient::new(&api_url, &config.anon_key);

        Self {
            inner: Arc::new(SupabaseInner {
                http: reqwest::Client::new(),
                api_url,
                anon_key: config.anon_key.clone(),
                session: RwLock::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
                refresher: Mutex::new(None),
                auth_events,
                realtime,
            }),
        }
    }

    /// Build a URL under the project API.
    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.inner.api_url)
    }

    /// Current session, if any.
    fn stored_session(&self) -> Option<AuthSession> {
        self.inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the stored session and reschedule the refresh timer for it.
    fn store_session(&self, session: Option<AuthSession>) {
        let delay = session
            .as_ref()
            .and_then(|session| auth::refresh_delay(session, chrono::Utc::now().timestamp()));
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session;
        self.schedule_refresh(delay);
    }

    fn publish(&self, event: AuthChangeEvent) {
        // No subscribers is fine.
        let _ = self.inner.auth_events.send(event);
    }

    /// Bearer token for data requests: the user's token, else the anon key.
    ///
    /// A session close to expiry is refreshed first.
    async fn bearer(&self) -> Result<String, BackendError> {
        Ok(self.current_session().await?.map_or_else(
            || self.inner.anon_key.expose_secret().to_owned(),
            |session| session.access_token.expose_secret().to_owned(),
        ))
    }

    /// Start a request with the project headers and a fresh bearer token.
    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, BackendError> {
        let bearer = self.bearer().await?;
        Ok(self.request_as(method, url, &bearer))
    }

    fn request_as(&self, method: Method, url: &str, bearer: &str) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(bearer)
    }
}

/// Turn a non-success response into [`BackendError::Api`].
///
/// The message is taken from the first of `message`, `msg`,
/// `error_description` or `error` present in a JSON body, else the raw body.
async fn check_response(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    error!(
        status = %status,
        body = %body.chars().take(500).collect::<String>(),
        "Supabase returned non-success status"
    );
    Err(BackendError::api(status.as_u16(), message))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| json.get(*key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend() -> SupabaseBackend {
        SupabaseBackend::new(&SupabaseConfig {
            url: "https://abc.supabase.co/".parse().unwrap(),
            anon_key: SecretString::from("anon-key"),
        })
    }

    #[test]
    fn test_url_has_no_double_slash() {
        assert_eq!(
            backend().url("rest/v1/products"),
            "https://abc.supabase.co/rest/v1/products"
        );
    }

    #[tokio::test]
    async fn test_bearer_falls_back_to_anon_key() {
        assert_eq!(backend().bearer().await.unwrap(), "anon-key");
    }

    #[test]
    fn test_error_message_prefers_json_fields() {
        assert_eq!(
            error_message(r#"{"code":"42501","message":"permission denied for table products"}"#),
            "permission denied for table products"
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}

//! `/auth/v1` endpoints.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};
use vitrine_core::Email;

use super::{SupabaseBackend, check_response};
use crate::backend::{
    AuthBackend, AuthChangeEvent, AuthEventKind, AuthSession, AuthSubscription, AuthUser,
    BackendError,
};

/// Seconds before expiry at which a stored session is refreshed.
const REFRESH_LEEWAY_SECS: i64 = 60;

/// What to do with the stored session before using it at `now`.
#[derive(Debug)]
enum TokenPlan {
    Anonymous,
    Use(AuthSession),
    Refresh(SecretString),
    /// Expiring with no refresh token: the session is over.
    Expired,
}

fn plan(session: Option<AuthSession>, now: i64) -> TokenPlan {
    let Some(session) = session else {
        return TokenPlan::Anonymous;
    };
    if !session.is_expired(now, REFRESH_LEEWAY_SECS) {
        return TokenPlan::Use(session);
    }
    session
        .refresh_token
        .map_or(TokenPlan::Expired, TokenPlan::Refresh)
}

/// Time from `now` until `session` should be refreshed; `None` when it
/// never expires.
pub(super) fn refresh_delay(session: &AuthSession, now: i64) -> Option<Duration> {
    let due = session.expires_at? - REFRESH_LEEWAY_SECS;
    Some(Duration::from_secs(u64::try_from(due - now).unwrap_or(0)))
}

/// Token grant response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> AuthSession {
        AuthSession {
            access_token: SecretString::from(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::from),
            expires_at: self
                .expires_at
                .or_else(|| self.expires_in.map(|secs| now + secs)),
            user: self.user,
        }
    }
}

/// Whether an auth error body means "wrong email or password".
fn is_credential_rejection(status: StatusCode, body: &JsonValue) -> bool {
    if status != StatusCode::BAD_REQUEST {
        return false;
    }
    let code = body
        .get("error_code")
        .or_else(|| body.get("error"))
        .and_then(JsonValue::as_str);
    matches!(code, Some("invalid_credentials" | "invalid_grant"))
}

impl SupabaseBackend {
    async fn token_grant(
        &self,
        grant_type: &str,
        body: JsonValue,
    ) -> Result<AuthSession, BackendError> {
        let url = self.url(&format!("auth/v1/token?grant_type={grant_type}"));
        let response = self
            .inner
            .http
            .post(&url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let text = response.text().await?;
            let json: JsonValue = serde_json::from_str(&text).unwrap_or(JsonValue::Null);
            if is_credential_rejection(status, &json) {
                return Err(BackendError::InvalidCredentials);
            }
            return Err(BackendError::api(status.as_u16(), super::error_message(&text)));
        }

        let response = check_response(response).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.into_session(chrono::Utc::now().timestamp()))
    }

    /// Exchange the stored refresh token for a new session.
    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthSession, BackendError> {
        let body = serde_json::json!({ "refresh_token": refresh_token.expose_secret() });
        let session = self.token_grant("refresh_token", body).await?;
        self.store_session(Some(session.clone()));
        self.publish(AuthChangeEvent::new(
            AuthEventKind::TokenRefreshed,
            Some(session.clone()),
        ));
        debug!(user_id = %session.user.id, "Session refreshed");
        Ok(session)
    }

    /// Adopt a session persisted by an earlier run.
    pub fn restore_session(&self, session: AuthSession) {
        self.store_session(Some(session));
    }

    /// The stored session, refreshed first when it is about to expire.
    ///
    /// A rejected refresh ends the session and publishes `SignedOut`; a
    /// transient failure is returned and the session kept for another try.
    pub(super) async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let _refreshing = self.inner.refresh_lock.lock().await;
        match plan(self.stored_session(), chrono::Utc::now().timestamp()) {
            TokenPlan::Anonymous => Ok(None),
            TokenPlan::Use(session) => Ok(Some(session)),
            TokenPlan::Expired => {
                warn!("Session expired without a refresh token");
                self.end_session();
                Ok(None)
            }
            TokenPlan::Refresh(refresh_token) => match self.refresh(&refresh_token).await {
                Ok(session) => Ok(Some(session)),
                Err(e) if e.is_transient() => Err(e),
                Err(e) => {
                    warn!(error = %e, "Refresh rejected, dropping stored session");
                    self.end_session();
                    Ok(None)
                }
            },
        }
    }

    fn end_session(&self) {
        self.store_session(None);
        self.publish(AuthChangeEvent::signed_out());
    }

    /// Replace the refresh timer. `None` only cancels it.
    pub(super) fn schedule_refresh(&self, delay: Option<Duration>) {
        let task = delay.and_then(|delay| {
            // Outside a runtime the next request still refreshes on demand.
            let runtime = tokio::runtime::Handle::try_current().ok()?;
            let inner = Arc::downgrade(&self.inner);
            Some(runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                // Detach first so the refresh can schedule the next timer.
                inner
                    .refresher
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                let backend = Self { inner };
                if let Err(e) = backend.current_session().await {
                    warn!(error = %e, "Background token refresh failed");
                }
            }))
        });

        let previous = std::mem::replace(
            &mut *self
                .inner
                .refresher
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            task,
        );
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

#[async_trait]
impl AuthBackend for SupabaseBackend {
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        self.current_session().await
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        AuthSubscription::new(self.inner.auth_events.subscribe())
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
        });
        let session = self.token_grant("password", body).await?;
        self.store_session(Some(session.clone()));
        self.publish(AuthChangeEvent::new(
            AuthEventKind::SignedIn,
            Some(session.clone()),
        ));
        Ok(session)
    }

    #[instrument(skip(self, password, metadata), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
        metadata: JsonValue,
    ) -> Result<AuthUser, BackendError> {
        let body = serde_json::json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
            "data": metadata,
        });
        let response = self
            .inner
            .http
            .post(self.url("auth/v1/signup"))
            .header("apikey", self.inner.anon_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json: JsonValue = check_response(response).await?.json().await?;

        // With auto-confirm the user comes wrapped in a session.
        let user = match json.get("user") {
            Some(user) if user.is_object() => user.clone(),
            _ => json,
        };
        Ok(serde_json::from_value(user)?)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.stored_session() {
            let response = self
                .request_as(
                    Method::POST,
                    &self.url("auth/v1/logout"),
                    session.access_token.expose_secret(),
                )
                .send()
                .await?;
            // An already-invalid token still counts as signed out.
            if !matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
            ) {
                check_response(response).await?;
            }
        }
        self.store_session(None);
        self.publish(AuthChangeEvent::signed_out());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_rejection_codes() {
        let legacy = serde_json::json!({"error": "invalid_grant", "error_description": "Invalid login credentials"});
        let current = serde_json::json!({"code": 400, "error_code": "invalid_credentials", "msg": "Invalid login credentials"});
        let other = serde_json::json!({"error_code": "email_not_confirmed"});

        assert!(is_credential_rejection(StatusCode::BAD_REQUEST, &legacy));
        assert!(is_credential_rejection(StatusCode::BAD_REQUEST, &current));
        assert!(!is_credential_rejection(StatusCode::BAD_REQUEST, &other));
        assert!(!is_credential_rejection(StatusCode::UNAUTHORIZED, &current));
    }

    #[test]
    fn test_token_response_computes_expiry() {
        let token: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "jwt",
            "refresh_token": "r1",
            "expires_in": 3600,
            "user": {"id": "6f1c1c7e-3a53-4b53-9c8e-2f8a1f0d9a11", "email": "a@b.com"}
        }))
        .unwrap();
        let session = token.into_session(1_000);
        assert_eq!(session.expires_at, Some(4_600));
        assert_eq!(session.user.email.as_deref(), Some("a@b.com"));
    }

    fn session(expires_at: Option<i64>, refresh_token: Option<&str>) -> AuthSession {
        AuthSession {
            access_token: SecretString::from("jwt"),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at,
            user: serde_json::from_value(serde_json::json!({
                "id": "6f1c1c7e-3a53-4b53-9c8e-2f8a1f0d9a11"
            }))
            .unwrap(),
        }
    }

    #[test]
    fn test_plan_refreshes_inside_leeway() {
        let now = 10_000;
        assert!(matches!(plan(None, now), TokenPlan::Anonymous));
        assert!(matches!(
            plan(Some(session(None, None)), now),
            TokenPlan::Use(_)
        ));
        assert!(matches!(
            plan(Some(session(Some(now + 3_600), Some("r1"))), now),
            TokenPlan::Use(_)
        ));
        match plan(Some(session(Some(now + 30), Some("r1"))), now) {
            TokenPlan::Refresh(token) => assert_eq!(token.expose_secret(), "r1"),
            other => panic!("expected refresh, got {other:?}"),
        }
        assert!(matches!(
            plan(Some(session(Some(now - 5), None)), now),
            TokenPlan::Expired
        ));
    }

    #[test]
    fn test_refresh_delay_before_expiry() {
        let now = 10_000;
        assert_eq!(
            refresh_delay(&session(Some(now + 3_600), Some("r1")), now),
            Some(Duration::from_secs(3_540))
        );
        assert_eq!(
            refresh_delay(&session(Some(now + 10), Some("r1")), now),
            Some(Duration::ZERO)
        );
        assert_eq!(refresh_delay(&session(None, Some("r1")), now), None);
    }

    #[tokio::test]
    async fn test_expired_session_without_refresh_token_signs_out() {
        let backend = SupabaseBackend::new(&crate::config::SupabaseConfig {
            url: "https://abc.supabase.co".parse().unwrap(),
            anon_key: SecretString::from("anon-key"),
        });
        let mut events = backend.on_auth_state_change();
        backend.restore_session(session(Some(1_000), None));

        assert!(backend.get_session().await.unwrap().is_none());
        assert_eq!(events.recv().await.unwrap().kind, AuthEventKind::SignedOut);
        assert_eq!(backend.bearer().await.unwrap(), "anon-key");
    }
}

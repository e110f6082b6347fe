//! Auth sessions and auth-state events.

use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tracing::warn;
use vitrine_core::UserId;

/// A user as known to the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    /// Metadata supplied at sign-up (`full_name`, `role`).
    #[serde(default)]
    pub user_metadata: JsonValue,
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Unix timestamp (seconds) when the access token expires.
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    /// True when the access token expires within `leeway_secs` of `now`.
    #[must_use]
    pub fn is_expired(&self, now: i64, leeway_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - leeway_secs <= now)
    }
}

/// Kind of auth-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Auth-state transition as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct AuthChangeEvent {
    pub kind: AuthEventKind,
    pub session: Option<AuthSession>,
}

impl AuthChangeEvent {
    #[must_use]
    pub const fn new(kind: AuthEventKind, session: Option<AuthSession>) -> Self {
        Self { kind, session }
    }

    #[must_use]
    pub const fn signed_out() -> Self {
        Self::new(AuthEventKind::SignedOut, None)
    }
}

/// Registration for auth-state events.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthChangeEvent>,
}

impl AuthSubscription {
    #[must_use]
    pub const fn new(receiver: broadcast::Receiver<AuthChangeEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event; `None` once the backend is gone.
    ///
    /// Events missed because the subscriber fell behind are skipped with a
    /// warning; the next delivered event still carries the full session.
    pub async fn recv(&mut self) -> Option<AuthChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Auth subscriber lagged, skipping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(expires_at: Option<i64>) -> AuthSession {
        AuthSession {
            access_token: SecretString::from("token"),
            refresh_token: None,
            expires_at,
            user: AuthUser {
                id: UserId::new(),
                email: Some("cliente@loja.com".to_owned()),
                user_metadata: JsonValue::Null,
            },
        }
    }

    #[test]
    fn test_expiry_with_leeway() {
        assert!(!session(None).is_expired(1_000, 60));
        assert!(!session(Some(2_000)).is_expired(1_000, 60));
        assert!(session(Some(1_050)).is_expired(1_000, 60));
    }

    #[tokio::test]
    async fn test_subscription_ends_when_sender_dropped() {
        let (tx, rx) = broadcast::channel(4);
        let mut subscription = AuthSubscription::new(rx);
        tx.send(AuthChangeEvent::signed_out()).unwrap();
        drop(tx);

        let event = subscription.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(subscription.recv().await.is_none());
    }
}

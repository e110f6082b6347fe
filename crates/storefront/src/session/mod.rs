//! Session manager: who is signed in and whether they are an admin.
//!
//! The manager asks the backend for an existing session when it starts, then
//! follows the backend's auth-state events on a single listener task. The
//! current value is published through a `watch` channel so any part of the
//! application can read it or wait for it to change.
//!
//! # Role resolution
//!
//! Roles live in `profiles`, not in the auth session. An explicit
//! [`SessionManager::sign_in`] always looks the role up; when it cannot, the
//! sign-in fails and the backend session is discarded. Restored sessions and
//! sessions delivered by auth events look it up too when
//! [`SessionOptions::resolve_role_on_restore`] is set; a failed lookup there
//! leaves the role unknown (not admin) and logs a warning. Events for
//! the user already signed in (token refresh, the sign-in echo) keep the role
//! already known.

mod state;

use std::sync::{Arc, Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use vitrine_core::{Email, EmailError, ProfileRole, Role, UserId};

use crate::backend::{
    AuthChangeEvent, AuthEventKind, AuthSession, AuthSubscription, Backend, BackendError, Query,
    decode_row, tables,
};
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::navigation::{Navigator, Route};

pub use state::{SessionState, SessionUser};

/// Minimum password length accepted at registration.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Errors surfaced by the session manager.
///
/// `Display` is the user-facing Portuguese message, except for
/// [`SessionError::Backend`], which carries the backend's own text.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Email ou senha incorretos")]
    InvalidCredentials,

    /// Sign-out failed; the cause is only logged.
    #[error("Erro ao fazer logout. Por favor, tente novamente.")]
    SignOutFailed,

    #[error("Usuário não autenticado")]
    NotAuthenticated,

    #[error("Acesso não autorizado")]
    Forbidden,

    #[error("Por favor, preencha todos os campos")]
    MissingFields,

    #[error("A senha deve ter no mínimo 6 caracteres")]
    WeakPassword,

    #[error("Email inválido")]
    InvalidEmail(#[source] EmailError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SessionError {
    /// Message for the inline error banner.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(_) => "Erro de autenticação. Por favor, tente novamente.".to_owned(),
            other => other.to_string(),
        }
    }
}

/// Session manager behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Look up the role for sessions that were not created by
    /// [`SessionManager::sign_in`].
    pub resolve_role_on_restore: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            resolve_role_on_restore: true,
        }
    }
}

/// Single source of truth for the current user.
///
/// Cheap to clone. The auth listener stops on [`SessionManager::shutdown`] or
/// when the last clone is dropped.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// State reachable from the listener task.
struct Shared {
    backend: Arc<dyn Backend>,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<SessionState>,
    options: SessionOptions,
    /// User whose backend session a failed sign-in discarded; its events are
    /// ignored until the next sign-out.
    discarded: Mutex<Option<UserId>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
    }
}

impl SessionManager {
    /// Resolve any existing session, then start following auth events.
    ///
    /// Never fails: a backend error while restoring is logged and treated as
    /// "no session". The returned manager is no longer loading.
    #[instrument(skip_all)]
    pub async fn start(
        backend: Arc<dyn Backend>,
        navigator: Arc<dyn Navigator>,
        options: SessionOptions,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let shared = Arc::new(Shared {
            backend,
            navigator,
            state,
            options,
            discarded: Mutex::new(None),
        });

        // Subscribe before reading so no transition is missed in between.
        let subscription = shared.backend.on_auth_state_change();

        let user = match shared.backend.get_session().await {
            Ok(Some(session)) => {
                let role = if options.resolve_role_on_restore {
                    shared.lookup_role(session.user.id).await
                } else {
                    None
                };
                let user = SessionUser::from_session(&session, role);
                set_sentry_user(&user.id, user.email.as_deref());
                info!(user_id = %user.id, role = ?user.role, "Session restored");
                Some(user)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Could not read existing session");
                None
            }
        };
        shared.state.send_replace(SessionState {
            user,
            loading: false,
        });

        let listener = tokio::spawn(listen(Arc::clone(&shared), subscription));

        Self {
            inner: Arc::new(Inner {
                shared,
                listener: Mutex::new(Some(listener)),
            }),
        }
    }

    /// Stop following auth events.
    pub fn shutdown(&self) {
        if let Some(listener) = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
            debug!("Auth listener stopped");
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Password sign-in.
    ///
    /// On success the session carries the role from `profiles` and the
    /// application navigates home.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidCredentials`] when the backend rejects the pair
    /// - [`SessionError::Backend`] for any other backend failure, including a
    ///   failed profile lookup after the backend accepted the credentials; the
    ///   backend session is then signed out and never published
    #[instrument(skip(self, email, password))]
    pub async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<SessionUser, SessionError> {
        let shared = &self.inner.shared;
        // A malformed address cannot match an account.
        let email = Email::parse(email).map_err(|_| SessionError::InvalidCredentials)?;

        let session = match shared.backend.sign_in_with_password(&email, password).await {
            Ok(session) => session,
            Err(BackendError::InvalidCredentials) => {
                warn!("Sign-in rejected");
                return Err(SessionError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        let role = match fetch_role(shared.backend.as_ref(), session.user.id).await {
            Ok(role) => role,
            Err(e) => {
                error!(
                    user_id = %session.user.id,
                    error = %e,
                    "Profile unreadable, discarding session"
                );
                shared.discard_session(session.user.id).await;
                return Err(e.into());
            }
        };
        let user = SessionUser::from_session(&session, Some(role));
        shared.set_discarded(None);
        shared.state.send_replace(SessionState::signed_in(user.clone()));

        set_sentry_user(&user.id, user.email.as_deref());
        add_breadcrumb("auth", "Signed in", None);
        info!(user_id = %user.id, role = %role, "Signed in");

        shared.navigator.navigate(Route::Home);
        Ok(user)
    }

    /// Sign out, clear the session and navigate to login.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SignOutFailed`]; the backend's reason is logged,
    /// not returned.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let shared = &self.inner.shared;
        if let Err(e) = shared.backend.sign_out().await {
            error!(error = %e, "Error signing out");
            return Err(SessionError::SignOutFailed);
        }

        shared.state.send_replace(SessionState::anonymous());
        clear_sentry_user();
        add_breadcrumb("auth", "Signed out", None);
        shared.navigator.navigate(Route::Login);
        Ok(())
    }

    /// Create a customer account, then send the visitor to login.
    ///
    /// # Errors
    ///
    /// - [`SessionError::MissingFields`] when any field is blank
    /// - [`SessionError::WeakPassword`] below [`MIN_PASSWORD_LENGTH`] characters
    /// - [`SessionError::InvalidEmail`] for a malformed address
    /// - [`SessionError::Backend`] when the backend refuses the account
    #[instrument(skip(self, email, password, full_name))]
    pub async fn register(
        &self,
        email: &str,
        password: &SecretString,
        full_name: &str,
    ) -> Result<UserId, SessionError> {
        let full_name = full_name.trim();
        if email.trim().is_empty() || password.expose_secret().is_empty() || full_name.is_empty() {
            return Err(SessionError::MissingFields);
        }
        if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
            return Err(SessionError::WeakPassword);
        }
        let email = Email::parse(email).map_err(SessionError::InvalidEmail)?;

        let metadata = serde_json::json!({
            "full_name": full_name,
            "role": Role::Customer.as_str(),
        });
        let user = self
            .inner
            .shared
            .backend
            .sign_up(&email, password, metadata)
            .await?;

        info!(user_id = %user.id, "Account created");
        self.inner.shared.navigator.navigate(Route::Login);
        Ok(user.id)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current value.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.shared.state.borrow().clone()
    }

    /// Current user, if signed in.
    #[must_use]
    pub fn user(&self) -> Option<SessionUser> {
        self.inner.shared.state.borrow().user.clone()
    }

    /// True iff the current user's role is admin. False when signed out.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.inner.shared.state.borrow().is_admin()
    }

    /// Receiver that observes every published session value.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.inner.shared.state.subscribe()
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] when signed out.
    pub fn require_user(&self) -> Result<SessionUser, SessionError> {
        self.user().ok_or(SessionError::NotAuthenticated)
    }

    /// The signed-in user, who must be an admin.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] when signed out and
    /// [`SessionError::Forbidden`] for non-admins.
    pub fn require_admin(&self) -> Result<SessionUser, SessionError> {
        let user = self.require_user()?;
        if user.is_admin() {
            Ok(user)
        } else {
            Err(SessionError::Forbidden)
        }
    }
}

// =============================================================================
// Auth event handling
// =============================================================================

async fn listen(shared: Arc<Shared>, mut subscription: AuthSubscription) {
    while let Some(event) = subscription.recv().await {
        shared.apply(event).await;
    }
    debug!("Auth event stream closed");
}

impl Shared {
    async fn apply(&self, event: AuthChangeEvent) {
        debug!(kind = ?event.kind, "Auth state changed");
        let Some(session) = event.session else {
            self.set_discarded(None);
            self.state.send_replace(SessionState::anonymous());
            clear_sentry_user();
            self.navigator.navigate(Route::Login);
            return;
        };

        if self.is_discarded(session.user.id) {
            debug!(user_id = %session.user.id, "Ignoring event for discarded session");
            return;
        }

        let role = self.role_for(event.kind, &session).await;
        let user = SessionUser::from_session(&session, role);
        self.state.send_replace(SessionState::signed_in(user));
    }

    async fn role_for(&self, kind: AuthEventKind, session: &AuthSession) -> Option<Role> {
        let known = self
            .state
            .borrow()
            .user
            .as_ref()
            .filter(|user| user.id == session.user.id)
            .and_then(|user| user.role);
        if known.is_some() {
            return known;
        }
        if !self.options.resolve_role_on_restore {
            return None;
        }
        debug!(kind = ?kind, "Resolving role for new session user");
        self.lookup_role(session.user.id).await
    }

    /// Drop a backend session that must not count as signed in.
    ///
    /// The backend's `SignedOut` event then resets the published state; if
    /// the backend cannot sign out, the state is reset here.
    async fn discard_session(&self, user_id: UserId) {
        self.set_discarded(Some(user_id));
        if let Err(e) = self.backend.sign_out().await {
            warn!(error = %e, "Could not discard backend session");
            self.state.send_replace(SessionState::anonymous());
            clear_sentry_user();
        }
    }

    fn set_discarded(&self, user_id: Option<UserId>) {
        *self.discarded.lock().unwrap_or_else(PoisonError::into_inner) = user_id;
    }

    fn is_discarded(&self, user_id: UserId) -> bool {
        *self.discarded.lock().unwrap_or_else(PoisonError::into_inner) == Some(user_id)
    }

    /// Role lookup that degrades to "unknown" on failure.
    async fn lookup_role(&self, user_id: UserId) -> Option<Role> {
        match fetch_role(self.backend.as_ref(), user_id).await {
            Ok(role) => Some(role),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Could not resolve role from profile");
                None
            }
        }
    }
}

async fn fetch_role(backend: &dyn Backend, user_id: UserId) -> Result<Role, BackendError> {
    let row = backend
        .select_single(
            &Query::table(tables::PROFILES)
                .columns(["role"])
                .eq("id", user_id.to_string()),
        )
        .await?;
    Ok(decode_row::<ProfileRole>(row)?.role)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{AuthBackend, MemoryBackend};
    use crate::backend::memory::Fault;
    use crate::navigation::History;

    const PASSWORD: &str = "s3nh4-forte";

    async fn start(
        backend: &MemoryBackend,
        options: SessionOptions,
    ) -> (SessionManager, Arc<History>) {
        let history = Arc::new(History::default());
        let manager =
            SessionManager::start(Arc::new(backend.clone()), history.clone(), options).await;
        (manager, history)
    }

    fn password() -> SecretString {
        SecretString::from(PASSWORD)
    }

    #[tokio::test]
    async fn test_start_without_session() {
        let backend = MemoryBackend::new();
        let (manager, _) = start(&backend, SessionOptions::default()).await;

        let state = manager.state();
        assert!(!state.loading);
        assert!(state.user.is_none());
        assert!(!manager.is_admin());
    }

    #[tokio::test]
    async fn test_restored_session_resolves_role() {
        let backend = MemoryBackend::new();
        backend.add_user("admin@loja.com", PASSWORD, Role::Admin);
        backend.restore_session("admin@loja.com").unwrap();

        let (manager, _) = start(&backend, SessionOptions::default()).await;
        assert!(manager.is_admin());
    }

    #[tokio::test]
    async fn test_restored_session_without_role_lookup() {
        let backend = MemoryBackend::new();
        backend.add_user("admin@loja.com", PASSWORD, Role::Admin);
        backend.restore_session("admin@loja.com").unwrap();

        let (manager, _) = start(
            &backend,
            SessionOptions {
                resolve_role_on_restore: false,
            },
        )
        .await;
        assert_eq!(manager.user().unwrap().role, None);
        assert!(!manager.is_admin());
    }

    #[tokio::test]
    async fn test_sign_in_sets_role_and_goes_home() {
        let backend = MemoryBackend::new();
        let id = backend.add_user("admin@loja.com", PASSWORD, Role::Admin);
        let (manager, history) = start(&backend, SessionOptions::default()).await;

        let user = manager.sign_in(" admin@loja.com ", &password()).await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Some(Role::Admin));
        assert!(manager.is_admin());
        assert_eq!(history.current(), Route::Home);
    }

    #[tokio::test]
    async fn test_wrong_password_has_fixed_message() {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        let (manager, history) = start(&backend, SessionOptions::default()).await;

        let err = manager
            .sign_in("cliente@loja.com", &SecretString::from("errada"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidCredentials));
        assert_eq!(err.to_string(), "Email ou senha incorretos");
        assert_eq!(history.entries(), vec![Route::Login]);
    }

    #[tokio::test]
    async fn test_other_sign_in_errors_propagate() {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        backend.fail(Fault::SignIn, 1);
        let (manager, _) = start(&backend, SessionOptions::default()).await;

        let err = manager.sign_in("cliente@loja.com", &password()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Backend(BackendError::Api { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreadable_profile_fails_sign_in() {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        let (manager, history) = start(&backend, SessionOptions::default()).await;
        let mut watch = manager.watch();
        backend.fail(Fault::Select(tables::PROFILES.to_owned()), 1);

        let err = manager.sign_in("cliente@loja.com", &password()).await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));

        // The discarded session's sign-out sends the app back to login.
        while history.entries().len() < 2 {
            watch.changed().await.unwrap();
        }
        assert_eq!(history.entries(), vec![Route::Login, Route::Login]);
        assert!(manager.user().is_none());
        assert!(!manager.is_admin());
        assert!(backend.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_profile_with_failing_sign_out_stays_anonymous() {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        let (manager, _) = start(
            &backend,
            SessionOptions {
                resolve_role_on_restore: false,
            },
        )
        .await;
        backend.fail(Fault::Select(tables::PROFILES.to_owned()), 1);
        backend.fail(Fault::SignOut, 1);

        manager.sign_in("cliente@loja.com", &password()).await.unwrap_err();
        // Let the listener see the backend's sign-in event.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(manager.user().is_none());
        assert!(matches!(manager.require_user(), Err(SessionError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        let (manager, history) = start(&backend, SessionOptions::default()).await;
        manager.sign_in("cliente@loja.com", &password()).await.unwrap();

        manager.sign_out().await.unwrap();
        assert!(manager.user().is_none());
        assert_eq!(history.current(), Route::Login);
    }

    #[tokio::test]
    async fn test_sign_out_failure_hides_cause() {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        let (manager, _) = start(&backend, SessionOptions::default()).await;
        manager.sign_in("cliente@loja.com", &password()).await.unwrap();
        backend.fail(Fault::SignOut, 1);

        let err = manager.sign_out().await.unwrap_err();
        assert_eq!(err.to_string(), "Erro ao fazer logout. Por favor, tente novamente.");
        assert!(manager.user().is_some());
    }

    #[tokio::test]
    async fn test_events_drive_admin_flag() {
        let backend = MemoryBackend::new();
        backend.add_user("admin@loja.com", PASSWORD, Role::Admin);
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        let (manager, history) = start(&backend, SessionOptions::default()).await;
        let mut watch = manager.watch();

        let admin = backend.restore_session("admin@loja.com").unwrap();
        backend.emit_auth(AuthChangeEvent::new(AuthEventKind::SignedIn, Some(admin)));
        watch.wait_for(SessionState::is_admin).await.unwrap();

        let customer = backend.restore_session("cliente@loja.com").unwrap();
        let customer_id = customer.user.id;
        backend.emit_auth(AuthChangeEvent::new(AuthEventKind::SignedIn, Some(customer)));
        watch
            .wait_for(|state| state.user.as_ref().is_some_and(|u| u.id == customer_id))
            .await
            .unwrap();
        assert!(!manager.is_admin());

        backend.emit_auth(AuthChangeEvent::signed_out());
        watch.wait_for(|state| state.user.is_none()).await.unwrap();
        assert!(!manager.is_admin());
        assert_eq!(history.current(), Route::Login);
    }

    #[tokio::test]
    async fn test_token_refresh_keeps_known_role() {
        let backend = MemoryBackend::new();
        backend.add_user("admin@loja.com", PASSWORD, Role::Admin);
        let (manager, _) = start(&backend, SessionOptions::default()).await;
        let mut watch = manager.watch();

        let session = backend.restore_session("admin@loja.com").unwrap();
        backend.emit_auth(AuthChangeEvent::new(
            AuthEventKind::SignedIn,
            Some(session.clone()),
        ));
        watch.wait_for(SessionState::is_admin).await.unwrap();
        let calls = backend.select_calls(tables::PROFILES);

        backend.emit_auth(AuthChangeEvent::new(
            AuthEventKind::TokenRefreshed,
            Some(session),
        ));
        watch.changed().await.unwrap();

        assert!(manager.is_admin());
        assert_eq!(backend.select_calls(tables::PROFILES), calls);
    }

    #[tokio::test]
    async fn test_shutdown_stops_following_auth_events() {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        let (manager, history) = start(&backend, SessionOptions::default()).await;
        manager.sign_in("cliente@loja.com", &password()).await.unwrap();
        let before = manager.state();

        manager.shutdown();
        backend.emit_auth(AuthChangeEvent::signed_out());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(manager.state(), before);
        assert_eq!(history.entries(), vec![Route::Login, Route::Home]);
    }

    #[tokio::test]
    async fn test_register_creates_customer_and_goes_to_login() {
        let backend = MemoryBackend::new();
        let (manager, history) = start(&backend, SessionOptions::default()).await;

        let id = manager
            .register("nova@loja.com", &password(), "  Nova Cliente ")
            .await
            .unwrap();

        let profile = backend
            .rows(tables::PROFILES)
            .into_iter()
            .find(|row| row["id"] == serde_json::json!(id))
            .unwrap();
        assert_eq!(profile["role"], "customer");
        assert_eq!(profile["full_name"], "Nova Cliente");
        assert_eq!(history.current(), Route::Login);
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let backend = MemoryBackend::new();
        let (manager, _) = start(&backend, SessionOptions::default()).await;

        let short = SecretString::from("12345");
        assert!(matches!(
            manager.register("a@b.com", &short, "Ana").await,
            Err(SessionError::WeakPassword)
        ));
        assert!(matches!(
            manager.register("a@b.com", &password(), " ").await,
            Err(SessionError::MissingFields)
        ));
        assert!(matches!(
            manager.register("sem-arroba", &password(), "Ana").await,
            Err(SessionError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_require_admin() {
        let backend = MemoryBackend::new();
        backend.add_user("cliente@loja.com", PASSWORD, Role::Customer);
        let (manager, _) = start(&backend, SessionOptions::default()).await;

        assert!(matches!(manager.require_user(), Err(SessionError::NotAuthenticated)));
        manager.sign_in("cliente@loja.com", &password()).await.unwrap();
        let err = manager.require_admin().unwrap_err();
        assert_eq!(err.to_string(), "Acesso não autorizado");
    }
}

//! Published session value.

use vitrine_core::{Role, UserId};

use crate::backend::AuthSession;

/// The signed-in user as the application sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub email: Option<String>,
    /// Role from `profiles`; `None` when it has not been (or could not be)
    /// looked up.
    pub role: Option<Role>,
}

impl SessionUser {
    pub(crate) fn from_session(session: &AuthSession, role: Option<Role>) -> Self {
        Self {
            id: session.user.id,
            email: session.user.email.clone(),
            role,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }
}

/// Current user plus whether the initial lookup is still outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<SessionUser>,
    pub loading: bool,
}

impl SessionState {
    /// Known to be signed out.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user: None,
            loading: false,
        }
    }

    #[must_use]
    pub const fn signed_in(user: SessionUser) -> Self {
        Self {
            user: Some(user),
            loading: false,
        }
    }

    /// True iff the current user's role is admin. False when signed out.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(SessionUser::is_admin)
    }
}

impl Default for SessionState {
    /// Nothing known yet.
    fn default() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

//! Routes, route guards and the navigator the session manager drives.

use std::sync::{Mutex, PoisonError};

use vitrine_core::{CategoryId, ProductId};

use crate::session::SessionState;

/// Back-office pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRoute {
    Dashboard,
    Users,
    Products,
    Categories,
    Settings,
}

impl AdminRoute {
    const fn path(self) -> &'static str {
        match self {
            Self::Dashboard => "/admin",
            Self::Users => "/admin/users",
            Self::Products => "/admin/products",
            Self::Categories => "/admin/categories",
            Self::Settings => "/admin/settings",
        }
    }
}

/// Application locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Home,
    Products {
        category: Option<CategoryId>,
        search: Option<String>,
    },
    Product(ProductId),
    Categories,
    Cart,
    Admin(AdminRoute),
}

impl Route {
    /// All products, unfiltered.
    #[must_use]
    pub const fn products() -> Self {
        Self::Products {
            category: None,
            search: None,
        }
    }

    /// Login and registration are only for anonymous visitors.
    #[must_use]
    pub const fn is_public(&self) -> bool {
        matches!(self, Self::Login | Self::Register)
    }

    #[must_use]
    pub const fn requires_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    /// Path with query string, e.g. `/products?category=<id>&search=caneca`.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Login => "/login".to_owned(),
            Self::Register => "/register".to_owned(),
            Self::Home => "/".to_owned(),
            Self::Products { category, search } => {
                let mut query = url::form_urlencoded::Serializer::new(String::new());
                if let Some(category) = category {
                    query.append_pair("category", &category.to_string());
                }
                if let Some(search) = search {
                    query.append_pair("search", search);
                }
                let query = query.finish();
                if query.is_empty() {
                    "/products".to_owned()
                } else {
                    format!("/products?{query}")
                }
            }
            Self::Product(id) => format!("/products/{id}"),
            Self::Categories => "/categories".to_owned(),
            Self::Cart => "/cart".to_owned(),
            Self::Admin(page) => page.path().to_owned(),
        }
    }

    /// Resolve a path. Unknown paths resolve to [`Route::Login`].
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let (path, query) = path.split_once('?').unwrap_or((path, ""));
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };

        match path {
            "/" => Self::Home,
            "/login" => Self::Login,
            "/register" => Self::Register,
            "/categories" => Self::Categories,
            "/cart" => Self::Cart,
            "/admin" => Self::Admin(AdminRoute::Dashboard),
            "/admin/users" => Self::Admin(AdminRoute::Users),
            "/admin/products" => Self::Admin(AdminRoute::Products),
            "/admin/categories" => Self::Admin(AdminRoute::Categories),
            "/admin/settings" => Self::Admin(AdminRoute::Settings),
            "/products" => {
                let mut category = None;
                let mut search = None;
                for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                    match key.as_ref() {
                        "category" => category = value.parse().ok(),
                        "search" if !value.is_empty() => search = Some(value.into_owned()),
                        _ => {}
                    }
                }
                Self::Products { category, search }
            }
            other => other
                .strip_prefix("/products/")
                .and_then(|id| id.parse().ok())
                .map_or(Self::Login, Self::Product),
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Outcome of checking a route against the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    /// The session is still being resolved; show a spinner.
    Pending,
    Redirect(Route),
}

/// Decide whether the session may see `route`.
///
/// Anonymous visitors are sent to login, non-admins are sent home from
/// back-office pages, and signed-in users are sent home from login.
#[must_use]
pub fn guard(route: &Route, session: &SessionState) -> Access {
    if session.loading {
        return Access::Pending;
    }

    match (&session.user, route.is_public()) {
        (Some(_), true) => Access::Redirect(Route::Home),
        (None, true) => Access::Allow,
        (None, false) => Access::Redirect(Route::Login),
        (Some(_), false) if route.requires_admin() && !session.is_admin() => {
            Access::Redirect(Route::Home)
        }
        (Some(_), false) => Access::Allow,
    }
}

/// Moves the application to another route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that records every location it is sent to.
#[derive(Debug)]
pub struct History {
    entries: Mutex<Vec<Route>>,
}

impl History {
    /// History positioned at `start`.
    #[must_use]
    pub fn new(start: Route) -> Self {
        Self {
            entries: Mutex::new(vec![start]),
        }
    }

    /// Current location.
    #[must_use]
    pub fn current(&self) -> Route {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or(Route::Login)
    }

    /// Every location visited, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<Route> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(Route::Login)
    }
}

impl Navigator for History {
    fn navigate(&self, route: Route) {
        tracing::debug!(route = %route, "Navigate");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vitrine_core::{Role, UserId};

    use super::*;
    use crate::session::SessionUser;

    fn signed_in(role: Option<Role>) -> SessionState {
        SessionState {
            user: Some(SessionUser {
                id: UserId::new(),
                email: Some("cliente@loja.com".to_owned()),
                role,
            }),
            loading: false,
        }
    }

    #[test]
    fn test_guard_pending_while_loading() {
        assert_eq!(guard(&Route::Cart, &SessionState::default()), Access::Pending);
    }

    #[test]
    fn test_guard_anonymous() {
        let anonymous = SessionState::anonymous();
        assert_eq!(guard(&Route::Cart, &anonymous), Access::Redirect(Route::Login));
        assert_eq!(guard(&Route::Login, &anonymous), Access::Allow);
        assert_eq!(guard(&Route::Register, &anonymous), Access::Allow);
    }

    #[test]
    fn test_guard_customer_kept_out_of_admin() {
        let customer = signed_in(Some(Role::Customer));
        assert_eq!(
            guard(&Route::Admin(AdminRoute::Users), &customer),
            Access::Redirect(Route::Home)
        );
        assert_eq!(guard(&Route::products(), &customer), Access::Allow);
        assert_eq!(guard(&Route::Login, &customer), Access::Redirect(Route::Home));
    }

    #[test]
    fn test_guard_unknown_role_is_not_admin() {
        assert_eq!(
            guard(&Route::Admin(AdminRoute::Dashboard), &signed_in(None)),
            Access::Redirect(Route::Home)
        );
        assert_eq!(
            guard(&Route::Admin(AdminRoute::Dashboard), &signed_in(Some(Role::Admin))),
            Access::Allow
        );
    }

    #[test]
    fn test_path_and_parse() {
        let category = CategoryId::new();
        let route = Route::Products {
            category: Some(category),
            search: Some("caneca azul".to_owned()),
        };
        let path = route.path();
        assert!(path.starts_with("/products?category="));
        assert!(path.ends_with("search=caneca+azul"));
        assert_eq!(Route::parse(&path), route);

        let product = ProductId::new();
        assert_eq!(Route::parse(&format!("/products/{product}")), Route::Product(product));
        assert_eq!(Route::parse("/admin/settings/"), Route::Admin(AdminRoute::Settings));
        assert_eq!(Route::parse("/products"), Route::products());
        assert_eq!(Route::parse("/nowhere"), Route::Login);
    }

    #[test]
    fn test_history_records_navigation() {
        let history = History::default();
        history.navigate(Route::Home);
        assert_eq!(history.current(), Route::Home);
        assert_eq!(history.entries(), vec![Route::Login, Route::Home]);
    }
}

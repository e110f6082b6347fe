//! Sign-in, sign-out and registration as the navigation sees them.

#![allow(clippy::unwrap_used)]

use vitrine_admin::AdminContext;
use vitrine_core::Role;
use vitrine_integration_tests::{ADMIN_EMAIL, CUSTOMER_EMAIL, TestApp, password};
use vitrine_storefront::navigation::{Access, AdminRoute, Route, guard};
use vitrine_storefront::session::SessionError;

#[tokio::test]
async fn test_anonymous_visitor_is_sent_to_login() {
    let t = TestApp::seeded().await;
    let state = t.app.session().state();

    assert!(!state.loading);
    assert!(state.user.is_none());
    assert_eq!(guard(&Route::Cart, &state), Access::Redirect(Route::Login));
    assert_eq!(guard(&Route::products(), &state), Access::Redirect(Route::Login));
    assert_eq!(guard(&Route::Login, &state), Access::Allow);
}

#[tokio::test]
async fn test_customer_sign_in_lands_home_without_back_office() {
    let t = TestApp::seeded().await;

    let user = t.sign_in(CUSTOMER_EMAIL).await;
    assert_eq!(user.role, Some(Role::Customer));
    assert_eq!(t.history.current(), Route::Home);

    let state = t.app.session().state();
    assert_eq!(guard(&Route::Cart, &state), Access::Allow);
    assert_eq!(guard(&Route::Login, &state), Access::Redirect(Route::Home));
    assert_eq!(
        guard(&Route::Admin(AdminRoute::Products), &state),
        Access::Redirect(Route::Home)
    );

    let Err(err) = AdminContext::new(&t.app) else {
        panic!("customer opened the back office");
    };
    assert_eq!(err.user_message(), "Acesso não autorizado");
}

#[tokio::test]
async fn test_admin_sign_in_opens_back_office() {
    let t = TestApp::seeded().await;

    let user = t.sign_in(ADMIN_EMAIL).await;
    assert!(user.is_admin());
    let state = t.app.session().state();
    assert_eq!(guard(&Route::Admin(AdminRoute::Dashboard), &state), Access::Allow);

    let admin = AdminContext::new(&t.app).unwrap();
    assert_eq!(admin.admin().id, user.id);
}

#[tokio::test]
async fn test_wrong_password_keeps_visitor_on_login() {
    let t = TestApp::seeded().await;

    let err = t
        .app
        .session()
        .sign_in(CUSTOMER_EMAIL, &secrecy::SecretString::from("errada"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidCredentials));
    assert_eq!(err.user_message(), "Email ou senha incorretos");
    assert_eq!(t.history.current(), Route::Login);
    assert!(t.app.session().user().is_none());
}

#[tokio::test]
async fn test_sign_out_returns_to_login() {
    let t = TestApp::seeded().await;
    t.sign_in(CUSTOMER_EMAIL).await;

    t.app.session().sign_out().await.unwrap();
    assert_eq!(t.history.current(), Route::Login);
    assert!(t.app.session().user().is_none());

    let err = t.app.cart().items().await.unwrap_err();
    assert_eq!(err.user_message(), "Usuário não autenticado");
}

#[tokio::test]
async fn test_registered_customer_can_sign_in() {
    let t = TestApp::seeded().await;

    t.app
        .session()
        .register("bia@exemplo.com", &password(), "Bia Souza")
        .await
        .unwrap();
    assert_eq!(t.history.current(), Route::Login);

    let user = t.sign_in("bia@exemplo.com").await;
    assert_eq!(user.role, Some(Role::Customer));
    assert_eq!(t.history.current(), Route::Home);
}

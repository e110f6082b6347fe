//! Back-office edits as the storefront sees them.

#![allow(clippy::unwrap_used)]

use vitrine_admin::products::filter;
use vitrine_admin::{AdminContext, CategoryDraft, DashboardStats};
use vitrine_core::{CategoryId, Price, ProductDraft, ProductId};
use vitrine_integration_tests::{ADMIN_EMAIL, TestApp, ids};
use vitrine_storefront::services::{ProductFilter, search_suggestions};

async fn office() -> (TestApp, AdminContext) {
    let t = TestApp::seeded().await;
    t.sign_in(ADMIN_EMAIL).await;
    let admin = AdminContext::new(&t.app).unwrap();
    (t, admin)
}

async fn featured_names(t: &TestApp) -> Vec<String> {
    t.app
        .catalog()
        .featured_products()
        .await
        .unwrap()
        .into_iter()
        .map(|product| product.name)
        .collect()
}

#[tokio::test]
async fn test_toggling_featured_twice_restores_the_flag() {
    let (t, admin) = office().await;
    let suco: ProductId = ids::SUCO.parse().unwrap();
    assert_eq!(featured_names(&t).await, vec!["Cafe Torrado"]);

    let featured = admin.products().toggle_featured(suco, false).await.unwrap();
    assert!(featured);
    assert_eq!(featured_names(&t).await, vec!["Cafe Torrado", "Suco de Uva"]);

    let current = t.app.catalog().product(suco).await.unwrap().featured;
    let featured = admin.products().toggle_featured(suco, current).await.unwrap();
    assert!(!featured);
    assert_eq!(featured_names(&t).await, vec!["Cafe Torrado"]);
}

#[tokio::test]
async fn test_back_office_sees_inactive_products() {
    let (t, admin) = office().await;

    let all = admin.products().list().await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(filter(&all, "pad").len(), 2);
    assert_eq!(filter(&all, "7891000")[0].name, "Cafe Torrado");

    let listing = t.app.catalog().products(&ProductFilter::default()).await.unwrap();
    assert_eq!(listing.products.len(), 3);
    assert!(listing.products.iter().all(|product| product.active));
}

#[tokio::test]
async fn test_new_product_is_searchable() {
    let (t, admin) = office().await;
    let draft = ProductDraft {
        code: "BEB-3".to_owned(),
        name: "Cha Mate".to_owned(),
        description: "Gelado".to_owned(),
        barcode: "7892000".to_owned(),
        price: Price::from_cents(650),
        image_url: None,
        category_id: Some(ids::BEBIDAS.parse().unwrap()),
        featured: false,
    };
    admin.products().save(None, &draft).await.unwrap();

    let found = search_suggestions(t.app.backend().as_ref(), "Mate").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].code, "BEB-3");
}

#[tokio::test]
async fn test_category_rename_shows_in_product_listing() {
    let (t, admin) = office().await;
    let padaria: CategoryId = ids::PADARIA.parse().unwrap();
    let by_category = ProductFilter {
        category: Some(padaria),
        search: None,
    };

    let before = t.app.catalog().products(&by_category).await.unwrap();
    assert_eq!(before.category_name.as_deref(), Some("Padaria"));
    assert_eq!(before.products.len(), 1);

    let draft = CategoryDraft {
        name: "Confeitaria".to_owned(),
        ..CategoryDraft::default()
    };
    admin.categories().save(Some(padaria), &draft).await.unwrap();

    let after = t.app.catalog().products(&by_category).await.unwrap();
    assert_eq!(after.category_name.as_deref(), Some("Confeitaria"));
}

#[tokio::test]
async fn test_dashboard_counts_seeded_shop() {
    let (t, admin) = office().await;
    t.app.cart().add(ids::PAO.parse().unwrap(), 1).await.unwrap();
    t.app.cart().checkout().await.unwrap();

    assert_eq!(
        admin.dashboard().await.unwrap(),
        DashboardStats {
            users: 2,
            products: 4,
            categories: 2,
            orders: 1,
        }
    );
}

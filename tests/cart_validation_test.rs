//! Integration tests for cart resolution and validation: the fetch-cart
//! endpoint, catalog reads, and the cart validator's grouping rules.

mod common;

use axum::http::{Method, StatusCode};
use boutique_api::services::cart::RawCartLine;
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn cart_endpoint_resolves_ids_in_request_order() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Maison Noire").await;
    let first = app
        .seed_product("Oud Royale", Some(brand.id), dec!(0))
        .await;
    app.seed_variant(first.id, "50", dec!(19.99), 5).await;
    app.seed_variant(first.id, "100", dec!(34.99), 2).await;
    let second = app.seed_product("Ambre Nuit", None, dec!(0)).await;
    app.seed_variant(second.id, "50", dec!(24.99), 7).await;

    let body = json!({
        "ids": [
            second.id.to_string(),
            first.id.to_string(),
            // Unknown ids are dropped, not errors.
            Uuid::new_v4().to_string(),
            // Duplicates collapse.
            second.id.to_string(),
        ]
    });
    let response = app.request(Method::POST, "/api/v1/cart", Some(body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["X-RateLimit-Limit"], "100");

    let body = response_json(response).await;
    let products = body["data"].as_array().expect("product array");
    assert_eq!(products.len(), 2);
    assert_eq!(products[0]["title"], "Ambre Nuit");
    assert_eq!(products[1]["title"], "Oud Royale");
    assert_eq!(products[1]["brand"], "Maison Noire");
    assert_eq!(products[1]["variants"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn cart_endpoint_rejects_non_array_ids() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::POST, "/api/v1/cart", Some(json!({ "ids": "abc" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(Method::POST, "/api/v1/cart", Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cart_endpoint_rejects_malformed_ids() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "ids": ["{$ne: null}"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cart_endpoint_is_rate_limited() {
    let app = TestApp::with_config(|cfg| {
        cfg.cart_rate_limit_requests = 1;
    })
    .await;

    let body = json!({ "ids": [] });
    let response = app
        .request(Method::POST, "/api/v1/cart", Some(body.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request(Method::POST, "/api/v1/cart", Some(body)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn product_detail_endpoint_returns_404_for_unknown_product() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn product_listing_supports_featured_filter() {
    let app = TestApp::new().await;
    let product = app.seed_product("Oud Royale", None, dec!(0)).await;
    app.seed_product("Ambre Nuit", None, dec!(0)).await;

    // Flip one product to featured.
    use boutique_api::entities::product;
    use sea_orm::{ActiveModelTrait, Set};
    product::ActiveModel {
        id: Set(product.id),
        featured: Set(true),
        ..Default::default()
    }
    .update(&*app.state.db)
    .await
    .expect("update ok");

    let response = app
        .request(Method::GET, "/api/v1/products?featured=true", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let products = body["data"].as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["title"], "Oud Royale");
}

// ==================== validator grouping rules ====================

fn structured(product_id: Uuid, variant_id: Uuid) -> RawCartLine {
    serde_json::from_value(json!({
        "productId": product_id.to_string(),
        "variantId": variant_id.to_string(),
        "size": "50",
    }))
    .unwrap()
}

#[tokio::test]
async fn validator_groups_lines_in_insertion_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("Oud Royale", None, dec!(0)).await;
    let small = app.seed_variant(product.id, "50", dec!(19.99), 10).await;
    let large = app.seed_variant(product.id, "100", dec!(34.99), 10).await;

    let lines = vec![
        structured(product.id, large.id),
        structured(product.id, small.id),
        structured(product.id, large.id),
    ];
    let validated = app
        .state
        .services
        .cart
        .validate(&lines)
        .await
        .expect("cart validates");

    assert_eq!(validated.lines.len(), 2);
    // First-seen order is preserved for display.
    assert_eq!(validated.lines[0].variant_id, Some(large.id));
    assert_eq!(validated.lines[0].quantity, 2);
    assert_eq!(validated.lines[0].unit_price, dec!(34.99));
    assert_eq!(validated.lines[1].variant_id, Some(small.id));
    assert_eq!(validated.lines[1].quantity, 1);
}

#[tokio::test]
async fn validator_resolves_price_and_size_from_catalog() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Maison Noire").await;
    let product = app
        .seed_product("Oud Royale", Some(brand.id), dec!(0))
        .await;
    let variant = app.seed_variant(product.id, "75", dec!(29.50), 4).await;

    // The client lies about the size label; the server re-derives it.
    let line: RawCartLine = serde_json::from_value(json!({
        "productId": product.id.to_string(),
        "variantId": variant.id.to_string(),
        "size": "999",
    }))
    .unwrap();
    let validated = app
        .state
        .services
        .cart
        .validate(&[line])
        .await
        .expect("cart validates");

    assert_eq!(validated.lines[0].size.as_deref(), Some("75"));
    assert_eq!(validated.lines[0].unit_price, dec!(29.50));
    assert_eq!(validated.lines[0].brand_name.as_deref(), Some("Maison Noire"));
    assert_eq!(validated.lines[0].product_title, "Oud Royale");
}

#[tokio::test]
async fn validator_mixes_legacy_and_structured_lines() {
    let app = TestApp::new().await;
    let with_variants = app.seed_product("Oud Royale", None, dec!(0)).await;
    let variant = app
        .seed_variant(with_variants.id, "50", dec!(19.99), 10)
        .await;
    let flat = app.seed_product("Discovery Set", None, dec!(65.00)).await;

    let lines = vec![
        structured(with_variants.id, variant.id),
        RawCartLine::Legacy(flat.id.to_string()),
    ];
    let validated = app
        .state
        .services
        .cart
        .validate(&lines)
        .await
        .expect("cart validates");

    assert_eq!(validated.lines.len(), 2);
    assert_eq!(validated.lines[0].variant_id, Some(variant.id));
    assert_eq!(validated.lines[1].variant_id, None);
    assert_eq!(validated.lines[1].unit_price, dec!(65.00));
}

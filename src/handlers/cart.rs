use crate::{
    errors::ServiceError,
    handlers::common::parse_body,
    rate_limiter::client_ip,
    services::{cart::parse_id, catalog::CatalogProduct},
    ApiResponse, AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CartProductsRequest {
    pub ids: Vec<String>,
}

/// Resolve the client-persisted cart's product ids into catalog entries.
///
/// The ids arrive from local storage and are fully untrusted: each one must
/// be a well-formed identifier before it reaches a query.
#[utoipa::path(
    post,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Catalog entries for the requested ids"),
        (status = 400, description = "Malformed payload or ids", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse)
    ),
    tag = "Cart"
)]
pub async fn cart_products(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ServiceError> {
    let decision = state.cart_limiter.check(&client_ip(&headers));
    if !decision.allowed {
        return Err(ServiceError::RateLimited {
            limit: decision.limit,
            reset_secs: decision.reset.as_secs(),
        });
    }

    let request: CartProductsRequest = parse_body(body)?;

    // Dedupe while keeping the request order for the response.
    let mut ids: Vec<Uuid> = Vec::with_capacity(request.ids.len());
    for raw in &request.ids {
        let id = parse_id(raw, "product id")?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    let mut records = state.services.catalog.load_products(&ids).await?;
    let products: Vec<CatalogProduct> = ids
        .iter()
        .filter_map(|id| records.remove(id))
        .map(Into::into)
        .collect();

    let mut response = Json(ApiResponse::success(products)).into_response();
    decision.apply_headers(response.headers_mut());
    Ok(response)
}

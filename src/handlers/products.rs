use crate::{
    errors::ServiceError,
    services::catalog::CatalogProduct,
    ApiResponse, ApiResult, AppState,
};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub featured: Option<bool>,
    pub brand: Option<Uuid>,
}

/// List catalog products, optionally filtered to featured items or a brand.
#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses(
        (status = 200, description = "Catalog listing")
    ),
    tag = "Catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> ApiResult<Vec<CatalogProduct>> {
    let records = state
        .services
        .catalog
        .list_products(query.featured, query.brand)
        .await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(Into::into).collect(),
    )))
}

/// Fetch a single product with brand and variants.
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    responses(
        (status = 200, description = "Product detail"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Catalog"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<CatalogProduct> {
    let record = state
        .services
        .catalog
        .find_product(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;
    Ok(Json(ApiResponse::success(record.into())))
}

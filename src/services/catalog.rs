use crate::{
    entities::{brand, product, product_variant, Brand, Product, ProductVariant},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Read-side catalog access plus the single stock-mutation primitive.
///
/// The catalog is administered externally; from this service's perspective it
/// is read-only except for `decrement_stock`.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

/// A product joined with its brand and variants, as loaded for validation.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub product: product::Model,
    pub brand_name: Option<String>,
    pub variants: Vec<product_variant::Model>,
}

/// Denormalized catalog entry served to the storefront client.
#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogProduct {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub brand: Option<String>,
    /// Legacy flat price; authoritative only when `variants` is empty
    pub price: Decimal,
    pub featured: bool,
    pub variants: Vec<CatalogVariant>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogVariant {
    pub id: Uuid,
    pub size: String,
    pub price: Decimal,
    pub stock: i32,
}

impl From<ProductRecord> for CatalogProduct {
    fn from(record: ProductRecord) -> Self {
        Self {
            id: record.product.id,
            title: record.product.title,
            description: record.product.description,
            brand: record.brand_name,
            price: record.product.price,
            featured: record.product.featured,
            variants: record
                .variants
                .into_iter()
                .map(|v| CatalogVariant {
                    id: v.id,
                    size: v.size,
                    price: v.price,
                    stock: v.stock,
                })
                .collect(),
        }
    }
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Loads the given products with brand and variants, keyed by product id.
    /// Missing ids are simply absent from the map.
    #[instrument(skip(self))]
    pub async fn load_products(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ProductRecord>, ServiceError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let products = Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .find_also_related(Brand)
            .all(&*self.db)
            .await?;

        let mut variants_by_product: HashMap<Uuid, Vec<product_variant::Model>> = HashMap::new();
        let variants = ProductVariant::find()
            .filter(product_variant::Column::ProductId.is_in(ids.iter().copied()))
            .order_by_asc(product_variant::Column::Size)
            .all(&*self.db)
            .await?;
        for variant in variants {
            variants_by_product
                .entry(variant.product_id)
                .or_default()
                .push(variant);
        }

        Ok(products
            .into_iter()
            .map(|(product, brand)| {
                let variants = variants_by_product.remove(&product.id).unwrap_or_default();
                (
                    product.id,
                    ProductRecord {
                        brand_name: brand.map(|b: brand::Model| b.name),
                        variants,
                        product,
                    },
                )
            })
            .collect())
    }

    /// Loads a single product with brand and variants.
    #[instrument(skip(self))]
    pub async fn find_product(&self, id: Uuid) -> Result<Option<ProductRecord>, ServiceError> {
        let mut records = self.load_products(&[id]).await?;
        Ok(records.remove(&id))
    }

    /// Lists the catalog, optionally filtered to featured products or a brand.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        featured: Option<bool>,
        brand_id: Option<Uuid>,
    ) -> Result<Vec<ProductRecord>, ServiceError> {
        let mut query = Product::find().order_by_asc(product::Column::Title);
        if let Some(featured) = featured {
            query = query.filter(product::Column::Featured.eq(featured));
        }
        if let Some(brand_id) = brand_id {
            query = query.filter(product::Column::BrandId.eq(brand_id));
        }
        let ids: Vec<Uuid> = query
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        let mut records = self.load_products(&ids).await?;
        // load_products returns a map; restore the listing order.
        Ok(ids.into_iter().filter_map(|id| records.remove(&id)).collect())
    }

    /// Atomically decrements a variant's stock by `quantity`, but only if at
    /// least that much stock remains. Returns whether the decrement applied.
    ///
    /// This is a single conditional read-modify-write so that concurrent
    /// decrements against the same variant can never drive stock negative.
    /// Takes any connection so the reconciler can run it inside its
    /// transaction.
    pub async fn decrement_stock<C: ConnectionTrait>(
        conn: &C,
        variant_id: Uuid,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        let result = ProductVariant::update_many()
            .col_expr(
                product_variant::Column::Stock,
                Expr::col(product_variant::Column::Stock).sub(quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant_id))
            .filter(product_variant::Column::Stock.gte(quantity))
            .exec(conn)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

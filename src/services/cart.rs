use crate::{
    errors::{ServiceError, StockShortage},
    services::catalog::CatalogService,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// A client cart line as it crosses the trust boundary.
///
/// Two shapes coexist: the current structured form and the legacy bare
/// product id the old cart widget wrote to local storage. Both are
/// normalized immediately after parsing; nothing downstream branches on the
/// shape again. Any client-claimed price is ignored by the deserializer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCartLine {
    Structured {
        #[serde(rename = "productId")]
        product_id: String,
        #[serde(rename = "variantId")]
        variant_id: String,
        size: String,
    },
    Legacy(String),
}

/// One quantity-grouped, server-priced cart line. Every field except the ids
/// comes from the catalog, never from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLine {
    pub product_id: Uuid,
    /// None only on the legacy flat-price path (product without variants)
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub size: Option<String>,
    pub brand_name: Option<String>,
    pub product_title: String,
}

/// The server-trusted representation of a client cart.
#[derive(Debug, Clone, Default)]
pub struct ValidatedCart {
    pub lines: Vec<ValidatedLine>,
}

/// Validates untrusted cart payloads against the catalog.
#[derive(Clone)]
pub struct CartService {
    catalog: Arc<CatalogService>,
}

/// Normalized key prior to catalog resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineKey {
    product_id: Uuid,
    variant_id: Option<Uuid>,
}

impl CartService {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }

    /// Validates a cart: shape, id syntax, referential integrity, variant
    /// matching, and an advisory stock check. Returns the grouped,
    /// server-priced cart. The stock check here can go stale before payment;
    /// the conditional decrement at reconciliation time is authoritative.
    #[instrument(skip_all, fields(lines = lines.len()))]
    pub async fn validate(&self, lines: &[RawCartLine]) -> Result<ValidatedCart, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        // Normalize and group by (product, variant), one unit per entry.
        // Insertion order of the groups is kept for display purposes.
        let mut groups: Vec<(LineKey, i32)> = Vec::new();
        for line in lines {
            let key = normalize_line(line)?;
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, quantity)) => *quantity += 1,
                None => groups.push((key, 1)),
            }
        }

        let product_ids: Vec<Uuid> = {
            let mut ids: Vec<Uuid> = groups.iter().map(|(key, _)| key.product_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };
        let records = self.catalog.load_products(&product_ids).await?;

        let mut validated = Vec::with_capacity(groups.len());
        for (key, quantity) in groups {
            let record = records.get(&key.product_id).ok_or_else(|| {
                ServiceError::ValidationError("Product not found".to_string())
            })?;

            let line = match key.variant_id {
                Some(variant_id) => {
                    let variant = record
                        .variants
                        .iter()
                        .find(|v| v.id == variant_id)
                        .ok_or_else(|| {
                            ServiceError::ValidationError("Variant not found".to_string())
                        })?;

                    if quantity > variant.stock {
                        return Err(ServiceError::InsufficientStock(StockShortage {
                            available_stock: variant.stock,
                            requested_quantity: quantity,
                            product_title: record.product.title.clone(),
                            variant_size: Some(variant.size.clone()),
                        }));
                    }

                    ValidatedLine {
                        product_id: key.product_id,
                        variant_id: Some(variant.id),
                        quantity,
                        unit_price: variant.price,
                        size: Some(variant.size.clone()),
                        brand_name: record.brand_name.clone(),
                        product_title: record.product.title.clone(),
                    }
                }
                None => {
                    // Legacy bare-id lines are only honored for products that
                    // never grew variants; everything else must pick one.
                    if !record.variants.is_empty() {
                        return Err(ServiceError::ValidationError(format!(
                            "A size must be selected for {}",
                            record.product.title
                        )));
                    }
                    ValidatedLine {
                        product_id: key.product_id,
                        variant_id: None,
                        quantity,
                        unit_price: record.product.price,
                        size: None,
                        brand_name: record.brand_name.clone(),
                        product_title: record.product.title.clone(),
                    }
                }
            };
            validated.push(line);
        }

        Ok(ValidatedCart { lines: validated })
    }
}

fn normalize_line(line: &RawCartLine) -> Result<LineKey, ServiceError> {
    match line {
        RawCartLine::Structured {
            product_id,
            variant_id,
            // The client's size label is display state; the server re-derives
            // it from the resolved variant.
            size: _,
        } => Ok(LineKey {
            product_id: parse_id(product_id, "productId")?,
            variant_id: Some(parse_id(variant_id, "variantId")?),
        }),
        RawCartLine::Legacy(product_id) => Ok(LineKey {
            product_id: parse_id(product_id, "productId")?,
            variant_id: None,
        }),
    }
}

/// Ids must be well-formed before they are allowed anywhere near a query.
pub fn parse_id(raw: &str, field: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::BadRequest(format!("Invalid {} format", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_lines_parse_both_shapes() {
        let json = r#"[
            "8f7a3c1e-5b2d-4e6f-9a0b-1c2d3e4f5a6b",
            {"productId": "8f7a3c1e-5b2d-4e6f-9a0b-1c2d3e4f5a6b",
             "variantId": "0f1e2d3c-4b5a-6978-8a9b-0c1d2e3f4a5b",
             "size": "50", "price": 99.99}
        ]"#;
        let lines: Vec<RawCartLine> = serde_json::from_str(json).expect("parses");
        assert!(matches!(lines[0], RawCartLine::Legacy(_)));
        assert!(matches!(lines[1], RawCartLine::Structured { .. }));
    }

    #[test]
    fn malformed_ids_are_rejected_before_lookup() {
        let line = RawCartLine::Legacy("1; DROP TABLE products".to_string());
        let err = normalize_line(&line).unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }
}

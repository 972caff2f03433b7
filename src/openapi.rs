use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::cart::cart_products,
        crate::handlers::checkout::create_checkout,
        crate::handlers::webhooks::stripe_webhook,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::errors::StockShortage,
        crate::services::catalog::CatalogProduct,
        crate::services::catalog::CatalogVariant,
        crate::services::checkout::CheckoutRedirect,
    )),
    tags(
        (name = "Catalog", description = "Product catalog reads"),
        (name = "Cart", description = "Client cart resolution"),
        (name = "Checkout", description = "Checkout session creation"),
        (name = "Webhooks", description = "Payment provider callbacks")
    ),
    info(
        title = "boutique-api",
        description = "Storefront backend: catalog, cart pricing, checkout, webhook reconciliation"
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the generated document.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

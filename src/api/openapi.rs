//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, items, loans};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Circulation API",
        version = "1.0.0",
        description = "Library circulation REST API: loans, returns and copy availability",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Items
        items::register_item,
        items::get_availability,
        // Loans
        loans::list_loans,
        loans::get_loan,
        loans::create_loan,
        loans::request_return,
        loans::approve_return,
        loans::direct_return,
        loans::recompute_overdue,
        loans::get_loan_stats,
    ),
    components(
        schemas(
            // Items
            crate::models::item::CatalogItem,
            crate::models::item::CreateItem,
            crate::models::item::ItemAvailability,
            // Loans
            loans::CreateLoanRequest,
            loans::RecomputeResponse,
            crate::models::loan::Loan,
            crate::models::loan::LoanQuery,
            crate::models::loan::LoanStats,
            crate::models::enums::LoanStatus,
            crate::models::enums::Role,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "items", description = "Catalog availability"),
        (name = "loans", description = "Loan lifecycle")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

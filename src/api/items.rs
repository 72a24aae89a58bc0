//! Catalog endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::item::{CatalogItem, CreateItem, ItemAvailability},
};

use super::AuthenticatedUser;

/// Register a catalog item and its copy count
#[utoipa::path(
    post,
    path = "/items",
    tag = "items",
    security(("bearer_auth" = [])),
    request_body = CreateItem,
    responses(
        (status = 201, description = "Item registered", body = CatalogItem),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Staff only")
    )
)]
pub async fn register_item(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateItem>,
) -> AppResult<(StatusCode, Json<CatalogItem>)> {
    let item = state
        .services
        .catalog
        .register_item(&claims.actor(), request)
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// Copies available for an item
#[utoipa::path(
    get,
    path = "/items/{id}/availability",
    tag = "items",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Copy counts", body = ItemAvailability),
        (status = 404, description = "Item not found")
    )
)]
pub async fn get_availability(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(item_id): Path<i32>,
) -> AppResult<Json<ItemAvailability>> {
    let availability = state.services.catalog.availability(item_id).await?;
    Ok(Json(availability))
}

//! Purchase HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::purchase::{
    CreatePurchaseInput, Purchase, PurchaseService, UpdatePurchaseInput,
};
use crate::AppState;

/// List purchases
pub async fn list_purchases(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Purchase>>>> {
    let service = PurchaseService::new(&state);
    let (purchases, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(purchases, &criteria, total)))
}

/// Create a purchase
pub async fn create_purchase(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreatePurchaseInput>,
) -> AppResult<Json<ApiResponse<Purchase>>> {
    let service = PurchaseService::new(&state);
    let purchase = service.create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(purchase)))
}

/// View a purchase
pub async fn get_purchase(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Purchase>>> {
    let store_id = criteria.require_store()?;
    let service = PurchaseService::new(&state);
    let purchase = service.load(store_id, purchase_id).await?;
    Ok(Json(ApiResponse::ok(purchase)))
}

/// Update a purchase
pub async fn update_purchase(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
    Json(input): Json<UpdatePurchaseInput>,
) -> AppResult<Json<ApiResponse<Purchase>>> {
    let service = PurchaseService::new(&state);
    let purchase = service.update(user.0.user_id, purchase_id, input).await?;
    Ok(Json(ApiResponse::ok(purchase)))
}

/// Soft-delete a purchase
pub async fn delete_purchase(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = PurchaseService::new(&state);
    service.delete(user.0.user_id, store_id, purchase_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

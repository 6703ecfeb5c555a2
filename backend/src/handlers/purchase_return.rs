//! Purchase return HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::purchase_return::{
    CreatePurchaseReturnInput, PurchaseReturn, PurchaseReturnService, UpdatePurchaseReturnInput,
};
use crate::AppState;

/// List purchase returns
pub async fn list_purchase_returns(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<PurchaseReturn>>>> {
    let service = PurchaseReturnService::new(&state);
    let (returns, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(returns, &criteria, total)))
}

/// Create a purchase return
pub async fn create_purchase_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreatePurchaseReturnInput>,
) -> AppResult<Json<ApiResponse<PurchaseReturn>>> {
    let service = PurchaseReturnService::new(&state);
    let purchase_return = service.create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(purchase_return)))
}

/// View a purchase return
pub async fn get_purchase_return(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<PurchaseReturn>>> {
    let store_id = criteria.require_store()?;
    let service = PurchaseReturnService::new(&state);
    let purchase_return = service.load(store_id, return_id).await?;
    Ok(Json(ApiResponse::ok(purchase_return)))
}

/// Update a purchase return
pub async fn update_purchase_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Json(input): Json<UpdatePurchaseReturnInput>,
) -> AppResult<Json<ApiResponse<PurchaseReturn>>> {
    let service = PurchaseReturnService::new(&state);
    let purchase_return = service.update(user.0.user_id, return_id, input).await?;
    Ok(Json(ApiResponse::ok(purchase_return)))
}

/// Soft-delete a purchase return
pub async fn delete_purchase_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = PurchaseReturnService::new(&state);
    service.delete(user.0.user_id, store_id, return_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

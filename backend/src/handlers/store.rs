//! Store management HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::store::{CreateStoreInput, Store, StoreService, UpdateStoreInput};
use crate::AppState;

/// List stores
pub async fn list_stores(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Store>>>> {
    let service = StoreService::new(state.db.clone());
    let (stores, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(stores, &criteria, total)))
}

/// Create a store
pub async fn create_store(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateStoreInput>,
) -> AppResult<Json<ApiResponse<Store>>> {
    let service = StoreService::new(state.db.clone());
    let store = service.create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(store)))
}

/// View a store
pub async fn get_store(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(store_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Store>>> {
    let service = StoreService::new(state.db.clone());
    let store = service.load(store_id).await?;
    Ok(Json(ApiResponse::ok(store)))
}

/// Update a store
pub async fn update_store(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(store_id): Path<Uuid>,
    Json(input): Json<UpdateStoreInput>,
) -> AppResult<Json<ApiResponse<Store>>> {
    let service = StoreService::new(state.db.clone());
    let store = service.update(user.0.user_id, store_id, input).await?;
    Ok(Json(ApiResponse::ok(store)))
}

/// Soft-delete a store
pub async fn delete_store(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(store_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    let service = StoreService::new(state.db.clone());
    service.delete(user.0.user_id, store_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

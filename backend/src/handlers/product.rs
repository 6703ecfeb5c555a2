//! Product management HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::product::{
    CreateProductInput, Product, ProductService, UpdateProductInput,
};
use crate::AppState;

/// List products
pub async fn list_products(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Product>>>> {
    let service = ProductService::new(state.db.clone());
    let (products, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(products, &criteria, total)))
}

/// Create a product
pub async fn create_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let service = ProductService::new(state.db.clone());
    let product = service.create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(product)))
}

/// View a product
pub async fn get_product(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let store_id = criteria.require_store()?;
    let service = ProductService::new(state.db.clone());
    let product = service.load(store_id, product_id).await?;
    Ok(Json(ApiResponse::ok(product)))
}

/// Update a product
pub async fn update_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let service = ProductService::new(state.db.clone());
    let product = service.update(user.0.user_id, product_id, input).await?;
    Ok(Json(ApiResponse::ok(product)))
}

/// Soft-delete a product
pub async fn delete_product(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = ProductService::new(state.db.clone());
    service.delete(user.0.user_id, store_id, product_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

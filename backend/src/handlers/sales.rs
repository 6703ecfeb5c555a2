//! Sales HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::sales::{CreateSalesInput, Sales, SalesService, UpdateSalesInput};
use crate::AppState;

/// List sales
pub async fn list_sales(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Sales>>>> {
    let service = SalesService::new(&state);
    let (sales, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(sales, &criteria, total)))
}

/// Create a sale; derives and posts its journal
pub async fn create_sales(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateSalesInput>,
) -> AppResult<Json<ApiResponse<Sales>>> {
    let service = SalesService::new(&state);
    let sale = service.create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(sale)))
}

/// View a sale
pub async fn get_sales(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(sales_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Sales>>> {
    let store_id = criteria.require_store()?;
    let service = SalesService::new(&state);
    let sale = service.load(store_id, sales_id).await?;
    Ok(Json(ApiResponse::ok(sale)))
}

/// Update a sale; reposts its journal
pub async fn update_sales(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(sales_id): Path<Uuid>,
    Json(input): Json<UpdateSalesInput>,
) -> AppResult<Json<ApiResponse<Sales>>> {
    let service = SalesService::new(&state);
    let sale = service.update(user.0.user_id, sales_id, input).await?;
    Ok(Json(ApiResponse::ok(sale)))
}

/// Soft-delete a sale; undoes postings and restores stock
pub async fn delete_sales(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(sales_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = SalesService::new(&state);
    service.delete(user.0.user_id, store_id, sales_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

/// Body for the reporting retry endpoint
#[derive(Debug, Deserialize)]
pub struct RetryReportInput {
    pub store_id: Uuid,
}

/// Retry tax-authority reporting for a document whose submission failed
pub async fn retry_sales_report(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(sales_id): Path<Uuid>,
    Json(input): Json<RetryReportInput>,
) -> AppResult<Json<ApiResponse<Sales>>> {
    let service = SalesService::new(&state);
    let sale = service.retry_report(input.store_id, sales_id).await?;
    Ok(Json(ApiResponse::ok(sale)))
}

//! Sales return HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::sales_return::{
    CreateSalesReturnInput, SalesReturn, SalesReturnService, UpdateSalesReturnInput,
};
use crate::AppState;

/// List sales returns
pub async fn list_sales_returns(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<SalesReturn>>>> {
    let service = SalesReturnService::new(&state);
    let (returns, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(returns, &criteria, total)))
}

/// Create a sales return
pub async fn create_sales_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateSalesReturnInput>,
) -> AppResult<Json<ApiResponse<SalesReturn>>> {
    let service = SalesReturnService::new(&state);
    let sales_return = service.create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(sales_return)))
}

/// View a sales return
pub async fn get_sales_return(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<SalesReturn>>> {
    let store_id = criteria.require_store()?;
    let service = SalesReturnService::new(&state);
    let sales_return = service.load(store_id, return_id).await?;
    Ok(Json(ApiResponse::ok(sales_return)))
}

/// Update a sales return
pub async fn update_sales_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Json(input): Json<UpdateSalesReturnInput>,
) -> AppResult<Json<ApiResponse<SalesReturn>>> {
    let service = SalesReturnService::new(&state);
    let sales_return = service.update(user.0.user_id, return_id, input).await?;
    Ok(Json(ApiResponse::ok(sales_return)))
}

/// Soft-delete a sales return
pub async fn delete_sales_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = SalesReturnService::new(&state);
    service.delete(user.0.user_id, store_id, return_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

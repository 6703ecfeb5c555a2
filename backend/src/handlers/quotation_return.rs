//! Quotation sales return HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::quotation_return::{
    CreateQuotationReturnInput, QuotationReturn, QuotationReturnService,
};
use crate::AppState;

/// List quotation sales returns
pub async fn list_quotation_returns(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<QuotationReturn>>>> {
    let service = QuotationReturnService::new(&state);
    let (returns, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(returns, &criteria, total)))
}

/// Create a quotation sales return
pub async fn create_quotation_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateQuotationReturnInput>,
) -> AppResult<Json<ApiResponse<QuotationReturn>>> {
    let service = QuotationReturnService::new(&state);
    let quotation_return = service.create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(quotation_return)))
}

/// View a quotation sales return
pub async fn get_quotation_return(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<QuotationReturn>>> {
    let store_id = criteria.require_store()?;
    let service = QuotationReturnService::new(&state);
    let quotation_return = service.load(store_id, return_id).await?;
    Ok(Json(ApiResponse::ok(quotation_return)))
}

/// Soft-delete a quotation sales return
pub async fn delete_quotation_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = QuotationReturnService::new(&state);
    service.delete(user.0.user_id, store_id, return_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

//! Quotation HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::quotation::{
    CreateQuotationInput, Quotation, QuotationService, UpdateQuotationInput,
};
use crate::AppState;

/// List quotations
pub async fn list_quotations(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Quotation>>>> {
    let service = QuotationService::new(&state);
    let (quotations, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(quotations, &criteria, total)))
}

/// Create a quotation
pub async fn create_quotation(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateQuotationInput>,
) -> AppResult<Json<ApiResponse<Quotation>>> {
    let service = QuotationService::new(&state);
    let quotation = service.create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(quotation)))
}

/// View a quotation
pub async fn get_quotation(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(quotation_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Quotation>>> {
    let store_id = criteria.require_store()?;
    let service = QuotationService::new(&state);
    let quotation = service.load(store_id, quotation_id).await?;
    Ok(Json(ApiResponse::ok(quotation)))
}

/// Update a quotation
pub async fn update_quotation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(quotation_id): Path<Uuid>,
    Json(input): Json<UpdateQuotationInput>,
) -> AppResult<Json<ApiResponse<Quotation>>> {
    let service = QuotationService::new(&state);
    let quotation = service.update(user.0.user_id, quotation_id, input).await?;
    Ok(Json(ApiResponse::ok(quotation)))
}

/// Soft-delete a quotation
pub async fn delete_quotation(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(quotation_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = QuotationService::new(&state);
    service.delete(user.0.user_id, store_id, quotation_id).await?;
    Ok(Json(ApiResponse::ok(())))
}

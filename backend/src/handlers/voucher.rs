//! Voucher HTTP handlers
//!
//! One handler set serves all amount-driven kinds; the route layer injects
//! the kind as an extension.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use shared::models::VoucherKind;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::voucher::{
    CreateVoucherInput, UpdateVoucherInput, Voucher, VoucherService,
};
use crate::AppState;

/// List vouchers of the routed kind
pub async fn list_vouchers(
    State(state): State<AppState>,
    Extension(kind): Extension<VoucherKind>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Voucher>>>> {
    let service = VoucherService::new(&state);
    let (vouchers, total) = service.list(kind, &criteria).await?;
    Ok(Json(ApiResponse::page(vouchers, &criteria, total)))
}

/// Create a voucher
pub async fn create_voucher(
    State(state): State<AppState>,
    Extension(kind): Extension<VoucherKind>,
    user: CurrentUser,
    Json(input): Json<CreateVoucherInput>,
) -> AppResult<Json<ApiResponse<Voucher>>> {
    let service = VoucherService::new(&state);
    let voucher = service.create(kind, user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(voucher)))
}

/// View a voucher
pub async fn get_voucher(
    State(state): State<AppState>,
    Extension(kind): Extension<VoucherKind>,
    _user: CurrentUser,
    Path(voucher_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Voucher>>> {
    let store_id = criteria.require_store()?;
    let service = VoucherService::new(&state);
    let voucher = service.load(kind, store_id, voucher_id).await?;
    Ok(Json(ApiResponse::ok(voucher)))
}

/// Update a voucher
pub async fn update_voucher(
    State(state): State<AppState>,
    Extension(kind): Extension<VoucherKind>,
    user: CurrentUser,
    Path(voucher_id): Path<Uuid>,
    Json(input): Json<UpdateVoucherInput>,
) -> AppResult<Json<ApiResponse<Voucher>>> {
    let service = VoucherService::new(&state);
    let voucher = service
        .update(kind, user.0.user_id, voucher_id, input)
        .await?;
    Ok(Json(ApiResponse::ok(voucher)))
}

/// Soft-delete a voucher
pub async fn delete_voucher(
    State(state): State<AppState>,
    Extension(kind): Extension<VoucherKind>,
    user: CurrentUser,
    Path(voucher_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = VoucherService::new(&state);
    service
        .delete(kind, user.0.user_id, store_id, voucher_id)
        .await?;
    Ok(Json(ApiResponse::ok(())))
}

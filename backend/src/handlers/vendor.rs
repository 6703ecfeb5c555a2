//! Vendor management HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::accounting::AccountingService;
use crate::services::vendor::{CreateVendorInput, UpdateVendorInput, Vendor, VendorService};
use crate::AppState;

fn service(state: &AppState) -> VendorService {
    let accounting = AccountingService::new(state.db.clone(), &state.config.accounting);
    VendorService::new(state.db.clone(), accounting)
}

/// List vendors
pub async fn list_vendors(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Vendor>>>> {
    let (vendors, total) = service(&state).list(&criteria).await?;
    Ok(Json(ApiResponse::page(vendors, &criteria, total)))
}

/// Create a vendor
pub async fn create_vendor(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateVendorInput>,
) -> AppResult<Json<ApiResponse<Vendor>>> {
    let vendor = service(&state).create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(vendor)))
}

/// View a vendor
pub async fn get_vendor(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(vendor_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vendor>>> {
    let store_id = criteria.require_store()?;
    let vendor = service(&state).load(store_id, vendor_id).await?;
    Ok(Json(ApiResponse::ok(vendor)))
}

/// Update a vendor
pub async fn update_vendor(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(vendor_id): Path<Uuid>,
    Json(input): Json<UpdateVendorInput>,
) -> AppResult<Json<ApiResponse<Vendor>>> {
    let vendor = service(&state)
        .update(user.0.user_id, vendor_id, input)
        .await?;
    Ok(Json(ApiResponse::ok(vendor)))
}

/// Soft-delete a vendor
pub async fn delete_vendor(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(vendor_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    service(&state)
        .delete(user.0.user_id, store_id, vendor_id)
        .await?;
    Ok(Json(ApiResponse::ok(())))
}

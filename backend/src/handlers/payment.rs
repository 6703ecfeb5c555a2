//! Payment HTTP handlers
//!
//! The same handlers serve both payment kinds; the route layer injects the
//! kind as an extension.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::payment::{
    CreatePaymentInput, Payment, PaymentKind, PaymentService, UpdatePaymentInput,
};
use crate::AppState;

/// List payments of the routed kind
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(kind): Extension<PaymentKind>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Payment>>>> {
    let service = PaymentService::new(&state);
    let (payments, total) = service.list(kind, &criteria).await?;
    Ok(Json(ApiResponse::page(payments, &criteria, total)))
}

/// Record a payment
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(kind): Extension<PaymentKind>,
    user: CurrentUser,
    Json(input): Json<CreatePaymentInput>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let service = PaymentService::new(&state);
    let payment = service.create(kind, user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(payment)))
}

/// View a payment
pub async fn get_payment(
    State(state): State<AppState>,
    Extension(kind): Extension<PaymentKind>,
    _user: CurrentUser,
    Path(payment_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let store_id = criteria.require_store()?;
    let service = PaymentService::new(&state);
    let payment = service.load(kind, store_id, payment_id).await?;
    Ok(Json(ApiResponse::ok(payment)))
}

/// Update a payment
pub async fn update_payment(
    State(state): State<AppState>,
    Extension(kind): Extension<PaymentKind>,
    user: CurrentUser,
    Path(payment_id): Path<Uuid>,
    Json(input): Json<UpdatePaymentInput>,
) -> AppResult<Json<ApiResponse<Payment>>> {
    let service = PaymentService::new(&state);
    let payment = service
        .update(kind, user.0.user_id, payment_id, input)
        .await?;
    Ok(Json(ApiResponse::ok(payment)))
}

/// Soft-delete a payment
pub async fn delete_payment(
    State(state): State<AppState>,
    Extension(kind): Extension<PaymentKind>,
    user: CurrentUser,
    Path(payment_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    let service = PaymentService::new(&state);
    service
        .delete(kind, user.0.user_id, store_id, payment_id)
        .await?;
    Ok(Json(ApiResponse::ok(())))
}

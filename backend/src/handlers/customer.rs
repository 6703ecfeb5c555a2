//! Customer management HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::accounting::AccountingService;
use crate::services::customer::{
    CreateCustomerInput, Customer, CustomerService, UpdateCustomerInput,
};
use crate::AppState;

fn service(state: &AppState) -> CustomerService {
    let accounting = AccountingService::new(state.db.clone(), &state.config.accounting);
    CustomerService::new(state.db.clone(), accounting)
}

/// List customers
pub async fn list_customers(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Customer>>>> {
    let (customers, total) = service(&state).list(&criteria).await?;
    Ok(Json(ApiResponse::page(customers, &criteria, total)))
}

/// Create a customer
pub async fn create_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(input): Json<CreateCustomerInput>,
) -> AppResult<Json<ApiResponse<Customer>>> {
    let customer = service(&state).create(user.0.user_id, input).await?;
    Ok(Json(ApiResponse::ok(customer)))
}

/// View a customer
pub async fn get_customer(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(customer_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Customer>>> {
    let store_id = criteria.require_store()?;
    let customer = service(&state).load(store_id, customer_id).await?;
    Ok(Json(ApiResponse::ok(customer)))
}

/// Update a customer
pub async fn update_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(customer_id): Path<Uuid>,
    Json(input): Json<UpdateCustomerInput>,
) -> AppResult<Json<ApiResponse<Customer>>> {
    let customer = service(&state)
        .update(user.0.user_id, customer_id, input)
        .await?;
    Ok(Json(ApiResponse::ok(customer)))
}

/// Soft-delete a customer
pub async fn delete_customer(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(customer_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<()>>> {
    let store_id = criteria.require_store()?;
    service(&state)
        .delete(user.0.user_id, store_id, customer_id)
        .await?;
    Ok(Json(ApiResponse::ok(())))
}

//! Account, posting and ledger HTTP handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::models::{ApiResponse, ListCriteria};
use crate::services::account::{AccountService, AccountView, LedgerRow, Posting};
use crate::AppState;

/// List accounts with the projected kind
pub async fn list_accounts(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<AccountView>>>> {
    let service = AccountService::new(state.db.clone());
    let (accounts, total) = service.list(&criteria).await?;
    Ok(Json(ApiResponse::page(accounts, &criteria, total)))
}

/// View an account
pub async fn get_account(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(account_id): Path<Uuid>,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<AccountView>>> {
    let store_id = criteria.require_store()?;
    let service = AccountService::new(state.db.clone());
    let account = service.get(store_id, account_id).await?;
    Ok(Json(ApiResponse::ok(account)))
}

/// List postings, filterable by account and date range
pub async fn list_postings(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<Posting>>>> {
    let service = AccountService::new(state.db.clone());
    let (postings, total) = service.postings(&criteria).await?;
    Ok(Json(ApiResponse::page(postings, &criteria, total)))
}

/// Ledger view: postings grouped per source document
pub async fn list_ledger(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(criteria): Query<ListCriteria>,
) -> AppResult<Json<ApiResponse<Vec<LedgerRow>>>> {
    let service = AccountService::new(state.db.clone());
    let (rows, total) = service.ledger(&criteria).await?;
    Ok(Json(ApiResponse::page(rows, &criteria, total)))
}

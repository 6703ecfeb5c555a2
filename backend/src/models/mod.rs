//! API envelope and list criteria
//!
//! Domain models live in the shared crate; persistence rows are defined next
//! to the service that owns them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::types::{Pagination, PaginationMeta, SortOrder};
use shared::validation::FieldErrors;

use crate::error::{AppError, AppResult};

/// Standard response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    pub errors: FieldErrors,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criterias: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<T> ApiResponse<T> {
    /// Successful single-result response
    pub fn ok(result: T) -> Self {
        Self {
            status: true,
            result: Some(result),
            errors: FieldErrors::new(),
            criterias: None,
            meta: None,
            total_count: None,
        }
    }

    /// Successful list response with echoed criteria and pagination meta
    pub fn page(result: T, criteria: &ListCriteria, total_count: u64) -> Self {
        Self {
            status: true,
            result: Some(result),
            errors: FieldErrors::new(),
            criterias: serde_json::to_value(criteria).ok(),
            meta: Some(PaginationMeta::new(&criteria.pagination(), total_count)),
            total_count: Some(total_count),
        }
    }

    /// Failure response carrying the field → message map
    pub fn errors(errors: FieldErrors) -> Self {
        Self {
            status: false,
            result: None,
            errors,
            criterias: None,
            meta: None,
            total_count: None,
        }
    }
}

/// Query criteria accepted by every list endpoint.
///
/// Tenant-scoped lists require `search[store_id]`; the remaining search keys
/// are applied where the kind supports them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCriteria {
    #[serde(rename = "search[store_id]", skip_serializing_if = "Option::is_none")]
    pub store_id: Option<Uuid>,
    #[serde(rename = "search[q]", skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(rename = "search[from_date]", skip_serializing_if = "Option::is_none")]
    pub from_date: Option<NaiveDate>,
    #[serde(rename = "search[to_date]", skip_serializing_if = "Option::is_none")]
    pub to_date: Option<NaiveDate>,
    #[serde(rename = "search[customer_id]", skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Uuid>,
    #[serde(rename = "search[vendor_id]", skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<Uuid>,
    #[serde(rename = "search[account_id]", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
    #[serde(
        rename = "search[payment_status]",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
}

/// Flatten `validator` derive output into the envelope's field → message map.
pub fn collect_validator_errors(errors: validator::ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    for (field, field_errors) in errors.field_errors() {
        if let Some(error) = field_errors.first() {
            let message = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{} is invalid", field));
            out.insert(field.to_string(), message);
        }
    }
    out
}

impl ListCriteria {
    /// Tenant scope is mandatory on every list
    pub fn require_store(&self) -> AppResult<Uuid> {
        self.store_id
            .ok_or_else(|| AppError::validation("search[store_id]", "store_id is required"))
    }

    pub fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            page: self.page.unwrap_or(defaults.page).max(1),
            per_page: self.per_page.unwrap_or(defaults.per_page).clamp(1, 200),
        }
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order.unwrap_or_default()
    }
}

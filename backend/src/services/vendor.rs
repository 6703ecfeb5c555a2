//! Vendor management service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{collect_validator_errors, ListCriteria};
use crate::services::accounting::AccountingService;

/// Vendor service
#[derive(Clone)]
pub struct VendorService {
    db: PgPool,
    accounting: AccountingService,
}

/// Vendor record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vendor {
    pub id: Uuid,
    pub store_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub total_invoiced: Decimal,
    pub total_paid: Decimal,
    pub open_balance: Decimal,
    pub stats_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

/// Input for creating a vendor
#[derive(Debug, Deserialize, Validate)]
pub struct CreateVendorInput {
    pub store_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Input for updating a vendor
#[derive(Debug, Deserialize)]
pub struct UpdateVendorInput {
    pub store_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

const VENDOR_COLUMNS: &str = "id, store_id, name, email, phone, address, total_invoiced, \
     total_paid, open_balance, stats_stale, created_at, updated_at, created_by, updated_by, \
     deleted_at, deleted_by";

impl VendorService {
    pub fn new(db: PgPool, accounting: AccountingService) -> Self {
        Self { db, accounting }
    }

    /// Create a vendor
    pub async fn create(&self, user_id: Uuid, input: CreateVendorInput) -> AppResult<Vendor> {
        input
            .validate()
            .map_err(|e| AppError::Validation(collect_validator_errors(e)))?;

        let vendor = sqlx::query_as::<_, Vendor>(&format!(
            r#"
            INSERT INTO vendors (store_id, name, email, phone, address, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {VENDOR_COLUMNS}
            "#,
        ))
        .bind(input.store_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(vendor)
    }

    /// Load a live vendor within the store
    pub async fn load(&self, store_id: Uuid, vendor_id: Uuid) -> AppResult<Vendor> {
        sqlx::query_as::<_, Vendor>(&format!(
            "SELECT {VENDOR_COLUMNS} FROM vendors WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(vendor_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Vendor".to_string()))
    }

    /// List vendors for a store
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<Vendor>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let q = criteria
            .q
            .as_ref()
            .map(|q| format!("%{}%", q))
            .unwrap_or_else(|| "%".to_string());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM vendors
            WHERE store_id = $1 AND deleted_at IS NULL
              AND (name ILIKE $2 OR email ILIKE $2 OR phone ILIKE $2)
            "#,
        )
        .bind(store_id)
        .bind(&q)
        .fetch_one(&self.db)
        .await?;

        let vendors = sqlx::query_as::<_, Vendor>(&format!(
            r#"
            SELECT {VENDOR_COLUMNS} FROM vendors
            WHERE store_id = $1 AND deleted_at IS NULL
              AND (name ILIKE $2 OR email ILIKE $2 OR phone ILIKE $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        ))
        .bind(store_id)
        .bind(&q)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((vendors, total as u64))
    }

    /// Update a vendor; a rename is propagated to the payable account
    pub async fn update(
        &self,
        user_id: Uuid,
        vendor_id: Uuid,
        input: UpdateVendorInput,
    ) -> AppResult<Vendor> {
        let existing = self.load(input.store_id, vendor_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "vendor was modified by another request".to_string(),
                ));
            }
        }

        let renamed = input
            .name
            .as_ref()
            .map(|name| name != &existing.name)
            .unwrap_or(false);

        let vendor = sqlx::query_as::<_, Vendor>(&format!(
            r#"
            UPDATE vendors
            SET name = $1, email = $2, phone = $3, address = $4, updated_by = $5, updated_at = NOW()
            WHERE id = $6 AND store_id = $7 AND deleted_at IS NULL
            RETURNING {VENDOR_COLUMNS}
            "#,
        ))
        .bind(input.name.unwrap_or(existing.name))
        .bind(input.email.or(existing.email))
        .bind(input.phone.or(existing.phone))
        .bind(input.address.or(existing.address))
        .bind(user_id)
        .bind(vendor_id)
        .bind(input.store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Vendor".to_string()))?;

        if renamed {
            self.accounting
                .rename_reference_accounts(vendor.store_id, "vendors", vendor.id, &vendor.name)
                .await?;
        }

        Ok(vendor)
    }

    /// Soft-delete a vendor. Vendors with unpaid purchases stay.
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, vendor_id: Uuid) -> AppResult<()> {
        let open_documents = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM purchases
            WHERE store_id = $1 AND vendor_id = $2 AND deleted_at IS NULL
              AND payment_status <> 'paid'
            "#,
        )
        .bind(store_id)
        .bind(vendor_id)
        .fetch_one(&self.db)
        .await?;

        if open_documents > 0 {
            return Err(AppError::business_rule(
                "vendor_id",
                "vendor has unpaid documents",
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE vendors SET deleted_at = NOW(), deleted_by = $1
            WHERE id = $2 AND store_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(vendor_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Vendor".to_string()));
        }
        Ok(())
    }
}

//! Store management service
//!
//! Stores are the tenants: every other document is scoped to one. A store
//! carries the VAT settings, the stock policy and the per-kind serial
//! number templates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use shared::models::{DocumentKind, SerialTemplate};

use crate::error::{AppError, AppResult};
use crate::models::{collect_validator_errors, ListCriteria};

/// Store service
#[derive(Clone)]
pub struct StoreService {
    db: PgPool,
}

/// Store record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub currency: String,
    pub vat_percent: Decimal,
    pub vat_registered: bool,
    pub allow_negative_stock: bool,
    pub reporting_enabled: bool,
    pub serial_templates: Json<HashMap<String, SerialTemplate>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Store {
    /// Serial template for a document kind, falling back to the built-in
    /// default when the store has not configured one.
    pub fn template_for(&self, kind: DocumentKind) -> SerialTemplate {
        self.serial_templates
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| SerialTemplate::default_for(kind))
    }
}

/// Input for creating a store
#[derive(Debug, Deserialize, Validate)]
pub struct CreateStoreInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,
    pub vat_percent: Option<Decimal>,
    pub vat_registered: Option<bool>,
    pub allow_negative_stock: Option<bool>,
    pub reporting_enabled: Option<bool>,
    pub serial_templates: Option<HashMap<String, SerialTemplate>>,
}

/// Input for updating a store
#[derive(Debug, Deserialize)]
pub struct UpdateStoreInput {
    pub name: Option<String>,
    pub currency: Option<String>,
    pub vat_percent: Option<Decimal>,
    pub vat_registered: Option<bool>,
    pub allow_negative_stock: Option<bool>,
    pub reporting_enabled: Option<bool>,
    pub serial_templates: Option<HashMap<String, SerialTemplate>>,
    /// Optimistic-concurrency precondition
    pub updated_at: Option<DateTime<Utc>>,
}

const STORE_COLUMNS: &str = "id, name, currency, vat_percent, vat_registered, allow_negative_stock, \
     reporting_enabled, serial_templates, created_at, updated_at, created_by, updated_by, \
     deleted_at, deleted_by";

impl StoreService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a store
    pub async fn create(&self, user_id: Uuid, input: CreateStoreInput) -> AppResult<Store> {
        input
            .validate()
            .map_err(|e| AppError::Validation(collect_validator_errors(e)))?;

        if let Some(vat) = input.vat_percent {
            if vat < Decimal::ZERO {
                return Err(AppError::validation(
                    "vat_percent",
                    "VAT percent cannot be negative",
                ));
            }
        }
        if let Some(templates) = &input.serial_templates {
            for kind in templates.keys() {
                if DocumentKind::parse(kind).is_none() {
                    return Err(AppError::validation(
                        "serial_templates",
                        format!("unknown document kind {}", kind),
                    ));
                }
            }
        }

        let store = sqlx::query_as::<_, Store>(&format!(
            r#"
            INSERT INTO stores (name, currency, vat_percent, vat_registered, allow_negative_stock,
                                reporting_enabled, serial_templates, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {STORE_COLUMNS}
            "#,
        ))
        .bind(&input.name)
        .bind(input.currency.unwrap_or_else(|| "USD".to_string()))
        .bind(input.vat_percent.unwrap_or(Decimal::ZERO))
        .bind(input.vat_registered.unwrap_or(false))
        .bind(input.allow_negative_stock.unwrap_or(false))
        .bind(input.reporting_enabled.unwrap_or(false))
        .bind(Json(input.serial_templates.unwrap_or_default()))
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(store = %store.id, "store created");
        Ok(store)
    }

    /// Load a live store; every tenant-scoped service goes through this.
    pub async fn load(&self, store_id: Uuid) -> AppResult<Store> {
        sqlx::query_as::<_, Store>(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE id = $1 AND deleted_at IS NULL",
        ))
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Store".to_string()))
    }

    /// List stores
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<Store>, u64)> {
        let pagination = criteria.pagination();
        let q = criteria
            .q
            .as_ref()
            .map(|q| format!("%{}%", q))
            .unwrap_or_else(|| "%".to_string());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stores WHERE deleted_at IS NULL AND name ILIKE $1",
        )
        .bind(&q)
        .fetch_one(&self.db)
        .await?;

        let stores = sqlx::query_as::<_, Store>(&format!(
            r#"
            SELECT {STORE_COLUMNS} FROM stores
            WHERE deleted_at IS NULL AND name ILIKE $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        ))
        .bind(&q)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((stores, total as u64))
    }

    /// Update a store
    pub async fn update(
        &self,
        user_id: Uuid,
        store_id: Uuid,
        input: UpdateStoreInput,
    ) -> AppResult<Store> {
        let existing = self.load(store_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "store was modified by another request".to_string(),
                ));
            }
        }

        if let Some(vat) = input.vat_percent {
            if vat < Decimal::ZERO {
                return Err(AppError::validation(
                    "vat_percent",
                    "VAT percent cannot be negative",
                ));
            }
        }

        let templates = match input.serial_templates {
            Some(templates) => {
                for kind in templates.keys() {
                    if DocumentKind::parse(kind).is_none() {
                        return Err(AppError::validation(
                            "serial_templates",
                            format!("unknown document kind {}", kind),
                        ));
                    }
                }
                Json(templates)
            }
            None => existing.serial_templates.clone(),
        };

        let store = sqlx::query_as::<_, Store>(&format!(
            r#"
            UPDATE stores
            SET name = $1, currency = $2, vat_percent = $3, vat_registered = $4,
                allow_negative_stock = $5, reporting_enabled = $6, serial_templates = $7,
                updated_by = $8, updated_at = NOW()
            WHERE id = $9 AND deleted_at IS NULL
            RETURNING {STORE_COLUMNS}
            "#,
        ))
        .bind(input.name.unwrap_or(existing.name))
        .bind(input.currency.unwrap_or(existing.currency))
        .bind(input.vat_percent.unwrap_or(existing.vat_percent))
        .bind(input.vat_registered.unwrap_or(existing.vat_registered))
        .bind(
            input
                .allow_negative_stock
                .unwrap_or(existing.allow_negative_stock),
        )
        .bind(input.reporting_enabled.unwrap_or(existing.reporting_enabled))
        .bind(templates)
        .bind(user_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Store".to_string()))?;

        Ok(store)
    }

    /// Soft-delete a store
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE stores SET deleted_at = NOW(), deleted_by = $1 WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Store".to_string()));
        }
        Ok(())
    }
}

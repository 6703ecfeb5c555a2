//! Quotation service
//!
//! Quotations price goods without moving stock or posting to the ledger.
//! A quotation issued as an invoice can later be converted into a sale,
//! which back-links here through `sales_id`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use shared::models::{DocumentKind, LineItem, QuotationType};
use shared::money::totals_of;
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::external::Notifier;
use crate::models::ListCriteria;
use crate::services::serials::SerialAllocator;
use crate::services::serializer::StoreSerializer;
use crate::services::store::StoreService;
use crate::AppState;

/// Quotation service
#[derive(Clone)]
pub struct QuotationService {
    db: PgPool,
    stores: StoreService,
    serializer: StoreSerializer,
    serials: SerialAllocator,
    notifier: Notifier,
}

/// Quotation document
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Quotation {
    pub id: Uuid,
    pub store_id: Uuid,
    pub serial: String,
    pub serial_number: i64,
    pub quotation_type: String,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub items: Json<Vec<LineItem>>,
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
    pub returned_total: Decimal,
    pub sales_id: Option<Uuid>,
    pub entry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

/// Input for creating a quotation
#[derive(Debug, Deserialize)]
pub struct CreateQuotationInput {
    pub store_id: Uuid,
    pub quotation_type: Option<QuotationType>,
    pub customer_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub entry_date: Option<NaiveDate>,
}

/// Input for updating a quotation
#[derive(Debug, Deserialize)]
pub struct UpdateQuotationInput {
    pub store_id: Uuid,
    pub quotation_type: Option<QuotationType>,
    pub customer_id: Option<Uuid>,
    pub items: Option<Vec<LineItem>>,
    pub entry_date: Option<NaiveDate>,
    pub updated_at: Option<DateTime<Utc>>,
}

const QUOTATION_COLUMNS: &str = "id, store_id, serial, serial_number, quotation_type, customer_id, \
     customer_name, items, net_total, vat_total, total, returned_total, sales_id, entry_date, \
     created_at, updated_at, created_by, updated_by, deleted_at, deleted_by";

impl QuotationService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            stores: StoreService::new(state.db.clone()),
            serializer: state.serializer.clone(),
            serials: state.serials.clone(),
            notifier: state.notifier.clone(),
        }
    }

    /// Create a quotation
    pub async fn create(&self, user_id: Uuid, input: CreateQuotationInput) -> AppResult<Quotation> {
        let errors = validation::validate_line_items(&input.items);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let store = self.stores.load(input.store_id).await?;

        let customer_name = match input.customer_id {
            Some(customer_id) => Some(
                sqlx::query_scalar::<_, String>(
                    "SELECT name FROM customers WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
                )
                .bind(customer_id)
                .bind(store.id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| AppError::validation("customer_id", "customer not found"))?,
            ),
            None => None,
        };

        let _token = self
            .serializer
            .enter(store.id, DocumentKind::Quotation)
            .await;

        let template = store.template_for(DocumentKind::Quotation);
        let receipt = self
            .serials
            .reserve(store.id, DocumentKind::Quotation, &template, Utc::now())
            .await?;

        let totals = totals_of(&input.items);
        let quotation_type = input.quotation_type.unwrap_or(QuotationType::Quotation);

        let insert_result = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            INSERT INTO quotations (
                store_id, serial, serial_number, quotation_type, customer_id, customer_name,
                items, net_total, vat_total, total, entry_date, created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING {QUOTATION_COLUMNS}
            "#,
        ))
        .bind(store.id)
        .bind(&receipt.serial)
        .bind(receipt.issued)
        .bind(quotation_type.as_str())
        .bind(input.customer_id)
        .bind(&customer_name)
        .bind(Json(input.items.clone()))
        .bind(totals.net)
        .bind(totals.vat)
        .bind(totals.gross)
        .bind(input.entry_date.unwrap_or_else(|| Utc::now().date_naive()))
        .bind(user_id)
        .fetch_one(&self.db)
        .await;

        let quotation = match insert_result {
            Ok(quotation) => quotation,
            Err(err) => {
                let _ = self.serials.release(&receipt).await;
                return Err(err.into());
            }
        };

        self.notifier.emit(
            store.id,
            "quotation.created",
            serde_json::json!({ "id": quotation.id, "serial": quotation.serial }),
        );
        Ok(quotation)
    }

    /// Load a live quotation
    pub async fn load(&self, store_id: Uuid, quotation_id: Uuid) -> AppResult<Quotation> {
        sqlx::query_as::<_, Quotation>(&format!(
            "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(quotation_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Quotation".to_string()))
    }

    /// List quotations with criteria
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<Quotation>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let q = criteria
            .q
            .as_ref()
            .map(|q| format!("%{}%", q))
            .unwrap_or_else(|| "%".to_string());
        let from = criteria
            .from_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        let to = criteria
            .to_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());

        let filter = r#"
            store_id = $1 AND deleted_at IS NULL
              AND (serial ILIKE $2 OR customer_name ILIKE $2)
              AND entry_date BETWEEN $3 AND $4
              AND ($5::uuid IS NULL OR customer_id = $5)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM quotations WHERE {filter}"
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.customer_id)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let quotations = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            SELECT {QUOTATION_COLUMNS} FROM quotations WHERE {filter}
            ORDER BY serial_number {order}, created_at {order}, id {order}
            LIMIT $6 OFFSET $7
            "#,
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.customer_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((quotations, total as u64))
    }

    /// Update a quotation
    pub async fn update(
        &self,
        user_id: Uuid,
        quotation_id: Uuid,
        input: UpdateQuotationInput,
    ) -> AppResult<Quotation> {
        let existing = self.load(input.store_id, quotation_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "quotation was modified by another request".to_string(),
                ));
            }
        }
        if existing.sales_id.is_some() && input.items.is_some() {
            return Err(AppError::business_rule(
                "items",
                "quotation was converted to a sale; edit the sale instead",
            ));
        }

        let items = input.items.unwrap_or_else(|| existing.items.0.clone());
        let errors = validation::validate_line_items(&items);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        let totals = totals_of(&items);

        let customer_id = input.customer_id.or(existing.customer_id);
        let quotation_type = input
            .quotation_type
            .map(|t| t.as_str().to_string())
            .unwrap_or(existing.quotation_type);

        let quotation = sqlx::query_as::<_, Quotation>(&format!(
            r#"
            UPDATE quotations
            SET quotation_type = $1, customer_id = $2, items = $3, net_total = $4,
                vat_total = $5, total = $6, entry_date = $7, updated_by = $8, updated_at = NOW()
            WHERE id = $9 AND store_id = $10 AND deleted_at IS NULL
            RETURNING {QUOTATION_COLUMNS}
            "#,
        ))
        .bind(&quotation_type)
        .bind(customer_id)
        .bind(Json(items))
        .bind(totals.net)
        .bind(totals.vat)
        .bind(totals.gross)
        .bind(input.entry_date.unwrap_or(existing.entry_date))
        .bind(user_id)
        .bind(quotation_id)
        .bind(input.store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Quotation".to_string()))?;

        Ok(quotation)
    }

    /// Soft-delete a quotation
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, quotation_id: Uuid) -> AppResult<()> {
        let existing = self.load(store_id, quotation_id).await?;

        if existing.sales_id.is_some() {
            return Err(AppError::business_rule(
                "id",
                "quotation was converted to a sale; delete the sale first",
            ));
        }
        let returns = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM quotation_sales_returns
            WHERE store_id = $1 AND quotation_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(store_id)
        .bind(quotation_id)
        .fetch_one(&self.db)
        .await?;
        if returns > 0 {
            return Err(AppError::business_rule(
                "id",
                "quotation has returns; delete those first",
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE quotations SET deleted_at = NOW(), deleted_by = $1
            WHERE id = $2 AND store_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(quotation_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Quotation".to_string()));
        }
        Ok(())
    }
}

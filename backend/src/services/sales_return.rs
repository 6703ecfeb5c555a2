//! Sales return service
//!
//! Returns against a sale: per-line quantities are capped by what the sale
//! shipped minus what earlier returns already took back, prices always come
//! from the parent document, and goods go back into stock.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use shared::journal::{self, Leg};
use shared::models::{
    build_return_items, DocumentKind, LineItem, PaymentMethod, ReturnLine,
};
use shared::money::{totals_of, Totals};
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::external::Notifier;
use crate::models::ListCriteria;
use crate::services::accounting::{AccountingService, DocumentRef, Postable};
use crate::services::sales::SalesService;
use crate::services::serials::SerialAllocator;
use crate::services::serializer::StoreSerializer;
use crate::services::stats::{spawn_recompute, StatsJob};
use crate::services::store::StoreService;
use crate::AppState;

/// Sales return service
#[derive(Clone)]
pub struct SalesReturnService {
    db: PgPool,
    stores: StoreService,
    sales: SalesService,
    serializer: StoreSerializer,
    serials: SerialAllocator,
    accounting: AccountingService,
    notifier: Notifier,
}

/// Sales return document
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SalesReturn {
    pub id: Uuid,
    pub store_id: Uuid,
    pub serial: String,
    pub serial_number: i64,
    pub sales_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub items: Json<Vec<LineItem>>,
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub entry_date: NaiveDate,
    pub stats_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Postable for SalesReturn {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            kind: DocumentKind::SalesReturn,
            id: self.id,
            serial: self.serial.clone(),
        }
    }

    fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    fn legs(&self) -> Result<Vec<Leg>, shared::JournalError> {
        let method = PaymentMethod::parse(&self.payment_method)
            .ok_or(shared::JournalError::InvalidMethod("unknown"))?;
        let totals = Totals {
            net: self.net_total,
            vat: self.vat_total,
            gross: self.total,
        };
        journal::sales_return_legs(&totals, method, self.customer_id)
    }
}

/// Input for creating a sales return
#[derive(Debug, Deserialize)]
pub struct CreateSalesReturnInput {
    pub store_id: Uuid,
    pub sales_id: Uuid,
    pub items: Vec<ReturnLine>,
    pub payment_method: PaymentMethod,
    pub entry_date: Option<NaiveDate>,
}

/// Input for updating a sales return
#[derive(Debug, Deserialize)]
pub struct UpdateSalesReturnInput {
    pub store_id: Uuid,
    pub payment_method: Option<PaymentMethod>,
    pub entry_date: Option<NaiveDate>,
    pub updated_at: Option<DateTime<Utc>>,
}

const RETURN_COLUMNS: &str = "id, store_id, serial, serial_number, sales_id, customer_id, items, \
     net_total, vat_total, total, payment_method, entry_date, stats_stale, created_at, \
     updated_at, created_by, updated_by, deleted_at, deleted_by";

impl SalesReturnService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            stores: StoreService::new(state.db.clone()),
            sales: SalesService::new(state),
            serializer: state.serializer.clone(),
            serials: state.serials.clone(),
            accounting: AccountingService::new(state.db.clone(), &state.config.accounting),
            notifier: state.notifier.clone(),
        }
    }

    /// Create a sales return
    pub async fn create(
        &self,
        user_id: Uuid,
        input: CreateSalesReturnInput,
    ) -> AppResult<SalesReturn> {
        if input.items.is_empty() {
            return Err(AppError::validation("items", "at least one line is required"));
        }
        let store = self.stores.load(input.store_id).await?;
        let sale = self.sales.load(store.id, input.sales_id).await?;

        if input.payment_method == PaymentMethod::VendorAccount {
            return Err(AppError::validation(
                "payment_method",
                "not valid for sales returns",
            ));
        }
        if input.payment_method == PaymentMethod::CustomerAccount && sale.customer_id.is_none() {
            return Err(AppError::validation(
                "payment_method",
                "the sale has no customer account to credit",
            ));
        }

        let items = build_return_items(&sale.items.0, &input.items)
            .map_err(|product_id| {
                AppError::validation("items", format!("product {} is not on the sale", product_id))
            })?;

        let _token = self
            .serializer
            .enter(store.id, DocumentKind::SalesReturn)
            .await;

        // Cap per line by what is still returnable
        let already_returned = self.sales.returned_quantities(store.id, sale.id).await?;
        let errors = validation::validate_return_items(&sale.items.0, &already_returned, &items);
        if let Some((field, message)) = errors.into_iter().next() {
            return Err(AppError::BusinessRule { field, message });
        }

        let template = store.template_for(DocumentKind::SalesReturn);
        let receipt = self
            .serials
            .reserve(store.id, DocumentKind::SalesReturn, &template, Utc::now())
            .await?;

        let totals = totals_of(&items);
        let insert_result: AppResult<SalesReturn> = async {
            let mut tx = self.db.begin().await?;

            // Goods come back in
            for item in &items {
                sqlx::query(
                    "UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
                )
                .bind(item.quantity)
                .bind(item.product_id)
                .bind(store.id)
                .execute(&mut *tx)
                .await?;
            }

            let row = sqlx::query_as::<_, SalesReturn>(&format!(
                r#"
                INSERT INTO sales_returns (
                    store_id, serial, serial_number, sales_id, customer_id, items,
                    net_total, vat_total, total, payment_method, entry_date, created_by, updated_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
                RETURNING {RETURN_COLUMNS}
                "#,
            ))
            .bind(store.id)
            .bind(&receipt.serial)
            .bind(receipt.issued)
            .bind(sale.id)
            .bind(sale.customer_id)
            .bind(Json(items.clone()))
            .bind(totals.net)
            .bind(totals.vat)
            .bind(totals.gross)
            .bind(input.payment_method.as_str())
            .bind(input.entry_date.unwrap_or_else(|| Utc::now().date_naive()))
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE sales SET returned_total = returned_total + $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(totals.gross)
            .bind(sale.id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(row)
        }
        .await;

        let sales_return = match insert_result {
            Ok(row) => row,
            Err(err) => {
                let _ = self.serials.release(&receipt).await;
                return Err(err);
            }
        };

        if let Err(err) = self.accounting.post(&sales_return).await {
            if let Err(cleanup) = self.remove_unposted(&sales_return).await {
                tracing::error!(serial = %sales_return.serial, "cleanup after failed posting failed: {}", cleanup);
            }
            let _ = self.serials.release(&receipt).await;
            return Err(err);
        }

        self.notifier.emit(
            store.id,
            "sales_return.created",
            serde_json::json!({ "id": sales_return.id, "serial": sales_return.serial }),
        );
        spawn_recompute(self.db.clone(), store.id, self.stats_jobs(&sales_return));

        Ok(sales_return)
    }

    async fn remove_unposted(&self, row: &SalesReturn) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        for item in row.items.iter() {
            sqlx::query(
                "UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
            )
            .bind(item.quantity)
            .bind(item.product_id)
            .bind(row.store_id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "UPDATE sales SET returned_total = returned_total - $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(row.total)
        .bind(row.sales_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM sales_returns WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Load a live return
    pub async fn load(&self, store_id: Uuid, return_id: Uuid) -> AppResult<SalesReturn> {
        sqlx::query_as::<_, SalesReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM sales_returns WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(return_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Sales return".to_string()))
    }

    /// List returns with criteria
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<SalesReturn>, u64)> {
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
            store_id = $1 AND deleted_at IS NULL AND serial ILIKE $2
              AND entry_date BETWEEN $3 AND $4
              AND ($5::uuid IS NULL OR customer_id = $5)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM sales_returns WHERE {filter}"
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.customer_id)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let rows = sqlx::query_as::<_, SalesReturn>(&format!(
            r#"
            SELECT {RETURN_COLUMNS} FROM sales_returns WHERE {filter}
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

        Ok((rows, total as u64))
    }

    /// Update the settlement method or date of a return. Quantities are
    /// fixed after creation; take back the return and issue a new one to
    /// change them.
    pub async fn update(
        &self,
        user_id: Uuid,
        return_id: Uuid,
        input: UpdateSalesReturnInput,
    ) -> AppResult<SalesReturn> {
        let existing = self.load(input.store_id, return_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "sales return was modified by another request".to_string(),
                ));
            }
        }

        let method = input.payment_method.unwrap_or(
            PaymentMethod::parse(&existing.payment_method)
                .ok_or_else(|| AppError::validation("payment_method", "unknown method"))?,
        );
        if method == PaymentMethod::VendorAccount {
            return Err(AppError::validation(
                "payment_method",
                "not valid for sales returns",
            ));
        }
        if method == PaymentMethod::CustomerAccount && existing.customer_id.is_none() {
            return Err(AppError::validation(
                "payment_method",
                "the sale has no customer account to credit",
            ));
        }

        let updated = sqlx::query_as::<_, SalesReturn>(&format!(
            r#"
            UPDATE sales_returns
            SET payment_method = $1, entry_date = $2, updated_by = $3, updated_at = NOW()
            WHERE id = $4 AND store_id = $5 AND deleted_at IS NULL
            RETURNING {RETURN_COLUMNS}
            "#,
        ))
        .bind(method.as_str())
        .bind(input.entry_date.unwrap_or(existing.entry_date))
        .bind(user_id)
        .bind(return_id)
        .bind(input.store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Sales return".to_string()))?;

        self.accounting
            .repost(&existing.document_ref(), &updated)
            .await?;

        Ok(updated)
    }

    /// Soft-delete a return: goods leave again, the parent gets its
    /// returned total back, postings are undone.
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, return_id: Uuid) -> AppResult<()> {
        let existing = self.load(store_id, return_id).await?;

        let mut tx = self.db.begin().await?;
        for item in existing.items.iter() {
            sqlx::query(
                "UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
            )
            .bind(item.quantity)
            .bind(item.product_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "UPDATE sales SET returned_total = returned_total - $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(existing.total)
        .bind(existing.sales_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE sales_returns SET deleted_at = NOW(), deleted_by = $1 WHERE id = $2 AND store_id = $3",
        )
        .bind(user_id)
        .bind(return_id)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Err(err) = self
            .accounting
            .unpost(store_id, DocumentKind::SalesReturn, return_id)
            .await
        {
            let mut tx = self.db.begin().await?;
            for item in existing.items.iter() {
                sqlx::query(
                    "UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
                )
                .bind(item.quantity)
                .bind(item.product_id)
                .bind(store_id)
                .execute(&mut *tx)
                .await?;
            }
            sqlx::query(
                "UPDATE sales SET returned_total = returned_total + $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(existing.total)
            .bind(existing.sales_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "UPDATE sales_returns SET deleted_at = NULL, deleted_by = NULL WHERE id = $1 AND store_id = $2",
            )
            .bind(return_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Err(err);
        }

        spawn_recompute(self.db.clone(), store_id, self.stats_jobs(&existing));
        Ok(())
    }

    fn stats_jobs(&self, row: &SalesReturn) -> Vec<StatsJob> {
        let mut jobs: Vec<StatsJob> = row
            .items
            .iter()
            .map(|item| StatsJob::Product(item.product_id))
            .collect();
        if let Some(customer_id) = row.customer_id {
            jobs.push(StatsJob::Customer(customer_id));
        }
        jobs
    }
}

//! Purchase return service
//!
//! Goods going back to a vendor: capped by what the purchase brought in
//! minus earlier returns, priced from the parent, stock goes down.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use shared::journal::{self, Leg};
use shared::models::{build_return_items, DocumentKind, LineItem, PaymentMethod, ReturnLine};
use shared::money::{totals_of, Totals};
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::external::Notifier;
use crate::models::ListCriteria;
use crate::services::accounting::{AccountingService, DocumentRef, Postable};
use crate::services::purchase::PurchaseService;
use crate::services::serials::SerialAllocator;
use crate::services::serializer::StoreSerializer;
use crate::services::stats::{spawn_recompute, StatsJob};
use crate::services::store::StoreService;
use crate::AppState;

/// Purchase return service
#[derive(Clone)]
pub struct PurchaseReturnService {
    db: PgPool,
    stores: StoreService,
    purchases: PurchaseService,
    serializer: StoreSerializer,
    serials: SerialAllocator,
    accounting: AccountingService,
    notifier: Notifier,
}

/// Purchase return document
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseReturn {
    pub id: Uuid,
    pub store_id: Uuid,
    pub serial: String,
    pub serial_number: i64,
    pub purchase_id: Uuid,
    pub vendor_id: Option<Uuid>,
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

impl Postable for PurchaseReturn {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            kind: DocumentKind::PurchaseReturn,
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
        journal::purchase_return_legs(&totals, method, self.vendor_id)
    }
}

/// Input for creating a purchase return
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseReturnInput {
    pub store_id: Uuid,
    pub purchase_id: Uuid,
    pub items: Vec<ReturnLine>,
    pub payment_method: PaymentMethod,
    pub entry_date: Option<NaiveDate>,
}

/// Input for updating a purchase return
#[derive(Debug, Deserialize)]
pub struct UpdatePurchaseReturnInput {
    pub store_id: Uuid,
    pub payment_method: Option<PaymentMethod>,
    pub entry_date: Option<NaiveDate>,
    pub updated_at: Option<DateTime<Utc>>,
}

const RETURN_COLUMNS: &str = "id, store_id, serial, serial_number, purchase_id, vendor_id, items, \
     net_total, vat_total, total, payment_method, entry_date, stats_stale, created_at, \
     updated_at, created_by, updated_by, deleted_at, deleted_by";

impl PurchaseReturnService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            stores: StoreService::new(state.db.clone()),
            purchases: PurchaseService::new(state),
            serializer: state.serializer.clone(),
            serials: state.serials.clone(),
            accounting: AccountingService::new(state.db.clone(), &state.config.accounting),
            notifier: state.notifier.clone(),
        }
    }

    /// Create a purchase return
    pub async fn create(
        &self,
        user_id: Uuid,
        input: CreatePurchaseReturnInput,
    ) -> AppResult<PurchaseReturn> {
        if input.items.is_empty() {
            return Err(AppError::validation("items", "at least one line is required"));
        }
        if input.payment_method == PaymentMethod::CustomerAccount {
            return Err(AppError::validation(
                "payment_method",
                "not valid for purchase returns",
            ));
        }

        let store = self.stores.load(input.store_id).await?;
        let purchase = self.purchases.load(store.id, input.purchase_id).await?;

        let items = build_return_items(&purchase.items.0, &input.items).map_err(|product_id| {
            AppError::validation(
                "items",
                format!("product {} is not on the purchase", product_id),
            )
        })?;

        let _token = self
            .serializer
            .enter(store.id, DocumentKind::PurchaseReturn)
            .await;

        let already_returned = self
            .purchases
            .returned_quantities(store.id, purchase.id)
            .await?;
        let errors =
            validation::validate_return_items(&purchase.items.0, &already_returned, &items);
        if let Some((field, message)) = errors.into_iter().next() {
            return Err(AppError::BusinessRule { field, message });
        }

        let template = store.template_for(DocumentKind::PurchaseReturn);
        let receipt = self
            .serials
            .reserve(store.id, DocumentKind::PurchaseReturn, &template, Utc::now())
            .await?;

        let totals = totals_of(&items);
        let insert_result: AppResult<PurchaseReturn> = async {
            let mut tx = self.db.begin().await?;

            // Goods go back out
            for item in &items {
                let stock = sqlx::query_scalar::<_, Decimal>(
                    r#"
                    UPDATE products SET stock = stock - $1, updated_at = NOW()
                    WHERE id = $2 AND store_id = $3
                    RETURNING stock
                    "#,
                )
                .bind(item.quantity)
                .bind(item.product_id)
                .bind(store.id)
                .fetch_one(&mut *tx)
                .await?;

                if stock < Decimal::ZERO && !store.allow_negative_stock {
                    return Err(AppError::business_rule(
                        "items",
                        "stock already consumed; cannot return to vendor",
                    ));
                }
            }

            let row = sqlx::query_as::<_, PurchaseReturn>(&format!(
                r#"
                INSERT INTO purchase_returns (
                    store_id, serial, serial_number, purchase_id, vendor_id, items,
                    net_total, vat_total, total, payment_method, entry_date, created_by, updated_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
                RETURNING {RETURN_COLUMNS}
                "#,
            ))
            .bind(store.id)
            .bind(&receipt.serial)
            .bind(receipt.issued)
            .bind(purchase.id)
            .bind(purchase.vendor_id)
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
                "UPDATE purchases SET returned_total = returned_total + $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(totals.gross)
            .bind(purchase.id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(row)
        }
        .await;

        let purchase_return = match insert_result {
            Ok(row) => row,
            Err(err) => {
                let _ = self.serials.release(&receipt).await;
                return Err(err);
            }
        };

        if let Err(err) = self.accounting.post(&purchase_return).await {
            if let Err(cleanup) = self.remove_unposted(&purchase_return).await {
                tracing::error!(serial = %purchase_return.serial, "cleanup after failed posting failed: {}", cleanup);
            }
            let _ = self.serials.release(&receipt).await;
            return Err(err);
        }

        self.notifier.emit(
            store.id,
            "purchase_return.created",
            serde_json::json!({ "id": purchase_return.id, "serial": purchase_return.serial }),
        );
        spawn_recompute(self.db.clone(), store.id, self.stats_jobs(&purchase_return));

        Ok(purchase_return)
    }

    async fn remove_unposted(&self, row: &PurchaseReturn) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        for item in row.items.iter() {
            sqlx::query(
                "UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
            )
            .bind(item.quantity)
            .bind(item.product_id)
            .bind(row.store_id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "UPDATE purchases SET returned_total = returned_total - $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(row.total)
        .bind(row.purchase_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM purchase_returns WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Load a live return
    pub async fn load(&self, store_id: Uuid, return_id: Uuid) -> AppResult<PurchaseReturn> {
        sqlx::query_as::<_, PurchaseReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM purchase_returns WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(return_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase return".to_string()))
    }

    /// List returns with criteria
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<PurchaseReturn>, u64)> {
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
              AND ($5::uuid IS NULL OR vendor_id = $5)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM purchase_returns WHERE {filter}"
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.vendor_id)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let rows = sqlx::query_as::<_, PurchaseReturn>(&format!(
            r#"
            SELECT {RETURN_COLUMNS} FROM purchase_returns WHERE {filter}
            ORDER BY serial_number {order}, created_at {order}, id {order}
            LIMIT $6 OFFSET $7
            "#,
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.vendor_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((rows, total as u64))
    }

    /// Update the settlement method or date; quantities are fixed
    pub async fn update(
        &self,
        user_id: Uuid,
        return_id: Uuid,
        input: UpdatePurchaseReturnInput,
    ) -> AppResult<PurchaseReturn> {
        let existing = self.load(input.store_id, return_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "purchase return was modified by another request".to_string(),
                ));
            }
        }

        let method = input.payment_method.unwrap_or(
            PaymentMethod::parse(&existing.payment_method)
                .ok_or_else(|| AppError::validation("payment_method", "unknown method"))?,
        );
        if method == PaymentMethod::CustomerAccount {
            return Err(AppError::validation(
                "payment_method",
                "not valid for purchase returns",
            ));
        }

        let updated = sqlx::query_as::<_, PurchaseReturn>(&format!(
            r#"
            UPDATE purchase_returns
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
        .ok_or_else(|| AppError::NotFound("Purchase return".to_string()))?;

        self.accounting
            .repost(&existing.document_ref(), &updated)
            .await?;

        Ok(updated)
    }

    /// Soft-delete a return: goods come back, parent total restored,
    /// postings undone.
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, return_id: Uuid) -> AppResult<()> {
        let existing = self.load(store_id, return_id).await?;

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
            "UPDATE purchases SET returned_total = returned_total - $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(existing.total)
        .bind(existing.purchase_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE purchase_returns SET deleted_at = NOW(), deleted_by = $1 WHERE id = $2 AND store_id = $3",
        )
        .bind(user_id)
        .bind(return_id)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Err(err) = self
            .accounting
            .unpost(store_id, DocumentKind::PurchaseReturn, return_id)
            .await
        {
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
                "UPDATE purchases SET returned_total = returned_total + $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(existing.total)
            .bind(existing.purchase_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "UPDATE purchase_returns SET deleted_at = NULL, deleted_by = NULL WHERE id = $1 AND store_id = $2",
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

    fn stats_jobs(&self, row: &PurchaseReturn) -> Vec<StatsJob> {
        let mut jobs: Vec<StatsJob> = row
            .items
            .iter()
            .map(|item| StatsJob::Product(item.product_id))
            .collect();
        if let Some(vendor_id) = row.vendor_id {
            jobs.push(StatsJob::Vendor(vendor_id));
        }
        jobs
    }
}

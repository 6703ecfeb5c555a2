//! Purchase service
//!
//! Goods bought from vendors: stock goes up at creation, inventory and VAT
//! receivable are debited, the vendor payable (or cash/bank) is credited.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use shared::journal::{self, Leg};
use shared::models::{DocumentKind, LineItem, PaymentMethod, PaymentStatus};
use shared::money::{round, totals_of, Totals};
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::external::Notifier;
use crate::models::ListCriteria;
use crate::services::accounting::{AccountingService, DocumentRef, Postable};
use crate::services::serials::SerialAllocator;
use crate::services::serializer::StoreSerializer;
use crate::services::stats::{spawn_recompute, StatsJob};
use crate::services::store::StoreService;
use crate::services::vendor::VendorService;
use crate::AppState;

/// Purchase service
#[derive(Clone)]
pub struct PurchaseService {
    db: PgPool,
    stores: StoreService,
    vendors: VendorService,
    serializer: StoreSerializer,
    serials: SerialAllocator,
    accounting: AccountingService,
    notifier: Notifier,
}

/// Purchase document
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub store_id: Uuid,
    pub serial: String,
    pub serial_number: i64,
    pub vendor_id: Uuid,
    pub vendor_name: Option<String>,
    pub items: Json<Vec<LineItem>>,
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub payment_status: String,
    pub total_paid: Decimal,
    pub returned_total: Decimal,
    pub entry_date: NaiveDate,
    pub stats_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Purchase {
    fn method(&self) -> Result<PaymentMethod, shared::JournalError> {
        PaymentMethod::parse(&self.payment_method)
            .ok_or(shared::JournalError::InvalidMethod("unknown"))
    }

    /// Cash and bank purchases settle at creation.
    pub fn settled_at_creation(&self) -> bool {
        !matches!(self.method(), Ok(PaymentMethod::VendorAccount))
    }
}

impl Postable for Purchase {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            kind: DocumentKind::Purchase,
            id: self.id,
            serial: self.serial.clone(),
        }
    }

    fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    fn legs(&self) -> Result<Vec<Leg>, shared::JournalError> {
        let totals = Totals {
            net: self.net_total,
            vat: self.vat_total,
            gross: self.total,
        };
        journal::purchase_legs(&totals, self.method()?, Some(self.vendor_id))
    }
}

/// Input for creating a purchase
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseInput {
    pub store_id: Uuid,
    pub vendor_id: Uuid,
    pub items: Vec<LineItem>,
    pub payment_method: PaymentMethod,
    pub entry_date: Option<NaiveDate>,
}

/// Input for updating a purchase
#[derive(Debug, Deserialize)]
pub struct UpdatePurchaseInput {
    pub store_id: Uuid,
    pub items: Option<Vec<LineItem>>,
    pub payment_method: Option<PaymentMethod>,
    pub entry_date: Option<NaiveDate>,
    pub updated_at: Option<DateTime<Utc>>,
}

const PURCHASE_COLUMNS: &str = "id, store_id, serial, serial_number, vendor_id, vendor_name, \
     items, net_total, vat_total, total, payment_method, payment_status, total_paid, \
     returned_total, entry_date, stats_stale, created_at, updated_at, created_by, updated_by, \
     deleted_at, deleted_by";

impl PurchaseService {
    pub fn new(state: &AppState) -> Self {
        let accounting = AccountingService::new(state.db.clone(), &state.config.accounting);
        Self {
            db: state.db.clone(),
            stores: StoreService::new(state.db.clone()),
            vendors: VendorService::new(state.db.clone(), accounting.clone()),
            serializer: state.serializer.clone(),
            serials: state.serials.clone(),
            accounting,
            notifier: state.notifier.clone(),
        }
    }

    /// Create a purchase
    pub async fn create(&self, user_id: Uuid, input: CreatePurchaseInput) -> AppResult<Purchase> {
        let errors = validation::validate_line_items(&input.items);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        if input.payment_method == PaymentMethod::CustomerAccount {
            return Err(AppError::validation(
                "payment_method",
                "not valid for purchases",
            ));
        }

        let store = self.stores.load(input.store_id).await?;
        let vendor = self.vendors.load(store.id, input.vendor_id).await?;

        let _token = self.serializer.enter(store.id, DocumentKind::Purchase).await;

        let template = store.template_for(DocumentKind::Purchase);
        let receipt = self
            .serials
            .reserve(store.id, DocumentKind::Purchase, &template, Utc::now())
            .await?;

        let insert_result: AppResult<Purchase> = async {
            let mut items = input.items.clone();
            let mut tx = self.db.begin().await?;

            for (index, item) in items.iter_mut().enumerate() {
                let row = sqlx::query_as::<_, (Decimal, String)>(
                    r#"
                    UPDATE products SET stock = stock + $1, updated_at = NOW()
                    WHERE id = $2 AND store_id = $3 AND deleted_at IS NULL
                    RETURNING stock, name
                    "#,
                )
                .bind(item.quantity)
                .bind(item.product_id)
                .bind(store.id)
                .fetch_optional(&mut *tx)
                .await?;

                let (_, name) = row.ok_or_else(|| {
                    AppError::validation(
                        &format!("items[{}].product_id", index),
                        "product not found",
                    )
                })?;
                item.name = name;
            }

            let totals = totals_of(&items);
            let settled = input.payment_method != PaymentMethod::VendorAccount;
            let payment_status = if settled {
                PaymentStatus::Paid
            } else {
                PaymentStatus::NotPaid
            };
            let total_paid = if settled { totals.gross } else { Decimal::ZERO };

            let purchase = sqlx::query_as::<_, Purchase>(&format!(
                r#"
                INSERT INTO purchases (
                    store_id, serial, serial_number, vendor_id, vendor_name, items,
                    net_total, vat_total, total, payment_method, payment_status, total_paid,
                    entry_date, created_by, updated_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
                RETURNING {PURCHASE_COLUMNS}
                "#,
            ))
            .bind(store.id)
            .bind(&receipt.serial)
            .bind(receipt.issued)
            .bind(vendor.id)
            .bind(&vendor.name)
            .bind(Json(items))
            .bind(totals.net)
            .bind(totals.vat)
            .bind(totals.gross)
            .bind(input.payment_method.as_str())
            .bind(payment_status.as_str())
            .bind(total_paid)
            .bind(input.entry_date.unwrap_or_else(|| Utc::now().date_naive()))
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(purchase)
        }
        .await;

        let purchase = match insert_result {
            Ok(purchase) => purchase,
            Err(err) => {
                let _ = self.serials.release(&receipt).await;
                return Err(err);
            }
        };

        if let Err(err) = self.accounting.post(&purchase).await {
            if let Err(cleanup) = self.remove_unposted(&purchase).await {
                tracing::error!(serial = %purchase.serial, "cleanup after failed posting failed: {}", cleanup);
            }
            let _ = self.serials.release(&receipt).await;
            return Err(err);
        }

        self.notifier.emit(
            store.id,
            "purchase.created",
            serde_json::json!({ "id": purchase.id, "serial": purchase.serial }),
        );
        spawn_recompute(self.db.clone(), store.id, self.stats_jobs(&purchase));

        Ok(purchase)
    }

    async fn remove_unposted(&self, purchase: &Purchase) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        for item in purchase.items.iter() {
            sqlx::query(
                "UPDATE products SET stock = stock - $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
            )
            .bind(item.quantity)
            .bind(item.product_id)
            .bind(purchase.store_id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("DELETE FROM purchases WHERE id = $1")
            .bind(purchase.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Load a live purchase
    pub async fn load(&self, store_id: Uuid, purchase_id: Uuid) -> AppResult<Purchase> {
        sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(purchase_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))
    }

    /// List purchases with criteria
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<Purchase>, u64)> {
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
              AND (serial ILIKE $2 OR vendor_name ILIKE $2)
              AND entry_date BETWEEN $3 AND $4
              AND ($5::uuid IS NULL OR vendor_id = $5)
              AND ($6::text IS NULL OR payment_status = $6)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM purchases WHERE {filter}"
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.vendor_id)
        .bind(&criteria.payment_status)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let purchases = sqlx::query_as::<_, Purchase>(&format!(
            r#"
            SELECT {PURCHASE_COLUMNS} FROM purchases WHERE {filter}
            ORDER BY serial_number {order}, created_at {order}, id {order}
            LIMIT $7 OFFSET $8
            "#,
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.vendor_id)
        .bind(&criteria.payment_status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((purchases, total as u64))
    }

    /// Update a purchase: stock delta, totals, then a full repost
    pub async fn update(
        &self,
        user_id: Uuid,
        purchase_id: Uuid,
        input: UpdatePurchaseInput,
    ) -> AppResult<Purchase> {
        let existing = self.load(input.store_id, purchase_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "purchase was modified by another request".to_string(),
                ));
            }
        }

        let items = input.items.clone().unwrap_or_else(|| existing.items.0.clone());
        let errors = validation::validate_line_items(&items);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let method = input
            .payment_method
            .unwrap_or(existing.method().map_err(AppError::from)?);
        if method == PaymentMethod::CustomerAccount {
            return Err(AppError::validation(
                "payment_method",
                "not valid for purchases",
            ));
        }

        // An edit may not shrink a line below what returns already took back
        let already_returned = self.returned_quantities(existing.store_id, existing.id).await?;
        let new_quantities = shared::models::quantities_by_product(&items);
        for (product_id, taken) in &already_returned {
            let remaining = new_quantities
                .get(product_id)
                .copied()
                .unwrap_or(Decimal::ZERO);
            if *taken > remaining {
                return Err(AppError::business_rule(
                    "items",
                    format!("product {} has {} already returned", product_id, taken),
                ));
            }
        }

        let totals = totals_of(&items);
        let old_quantities = shared::models::quantities_by_product(&existing.items.0);

        let mut tx = self.db.begin().await?;

        let mut products: Vec<Uuid> = new_quantities.keys().copied().collect();
        for product_id in old_quantities.keys() {
            if !products.contains(product_id) {
                products.push(*product_id);
            }
        }
        for product_id in &products {
            let old_quantity = old_quantities.get(product_id).copied().unwrap_or(Decimal::ZERO);
            let new_quantity = new_quantities.get(product_id).copied().unwrap_or(Decimal::ZERO);
            let delta = new_quantity - old_quantity;
            if delta == Decimal::ZERO {
                continue;
            }
            // Purchases add stock, so a bigger line adds the difference
            sqlx::query(
                r#"
                UPDATE products SET stock = stock + $1, updated_at = NOW()
                WHERE id = $2 AND store_id = $3 AND deleted_at IS NULL
                "#,
            )
            .bind(delta)
            .bind(product_id)
            .bind(existing.store_id)
            .execute(&mut *tx)
            .await?;
        }

        let settled = method != PaymentMethod::VendorAccount;
        let payments = self.payments_sum(existing.store_id, existing.id).await?;
        let total_paid = if settled { totals.gross } else { payments };
        let payment_status = PaymentStatus::derive(round(totals.gross), total_paid);

        let updated = sqlx::query_as::<_, Purchase>(&format!(
            r#"
            UPDATE purchases
            SET items = $1, net_total = $2, vat_total = $3, total = $4, payment_method = $5,
                payment_status = $6, total_paid = $7, entry_date = $8, updated_by = $9,
                updated_at = NOW()
            WHERE id = $10 AND store_id = $11 AND deleted_at IS NULL
            RETURNING {PURCHASE_COLUMNS}
            "#,
        ))
        .bind(Json(items))
        .bind(totals.net)
        .bind(totals.vat)
        .bind(totals.gross)
        .bind(method.as_str())
        .bind(payment_status.as_str())
        .bind(total_paid)
        .bind(input.entry_date.unwrap_or(existing.entry_date))
        .bind(user_id)
        .bind(purchase_id)
        .bind(existing.store_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Purchase".to_string()))?;

        tx.commit().await?;

        self.accounting
            .repost(&existing.document_ref(), &updated)
            .await?;

        spawn_recompute(self.db.clone(), updated.store_id, self.stats_jobs(&updated));
        Ok(updated)
    }

    /// Soft-delete a purchase, undoing its postings and stock
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, purchase_id: Uuid) -> AppResult<()> {
        let existing = self.load(store_id, purchase_id).await?;

        let dependents = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT (SELECT COUNT(*) FROM purchase_returns
                    WHERE store_id = $1 AND purchase_id = $2 AND deleted_at IS NULL)
                 + (SELECT COUNT(*) FROM purchase_payments
                    WHERE store_id = $1 AND purchase_id = $2 AND deleted_at IS NULL)
            "#,
        )
        .bind(store_id)
        .bind(purchase_id)
        .fetch_one(&self.db)
        .await?;

        if dependents > 0 {
            return Err(AppError::business_rule(
                "id",
                "purchase has returns or payments; delete those first",
            ));
        }

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
            "UPDATE purchases SET deleted_at = NOW(), deleted_by = $1 WHERE id = $2 AND store_id = $3",
        )
        .bind(user_id)
        .bind(purchase_id)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Err(err) = self
            .accounting
            .unpost(store_id, DocumentKind::Purchase, purchase_id)
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
                "UPDATE purchases SET deleted_at = NULL, deleted_by = NULL WHERE id = $1 AND store_id = $2",
            )
            .bind(purchase_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Err(err);
        }

        spawn_recompute(self.db.clone(), store_id, self.stats_jobs(&existing));
        Ok(())
    }

    /// Sum of live payments against a purchase
    pub async fn payments_sum(&self, store_id: Uuid, purchase_id: Uuid) -> AppResult<Decimal> {
        let sum = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM purchase_payments
            WHERE store_id = $1 AND purchase_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(store_id)
        .bind(purchase_id)
        .fetch_one(&self.db)
        .await?;
        Ok(sum)
    }

    /// Refresh total_paid and payment_status from the live payments
    pub async fn recompute_payment_status(
        &self,
        store_id: Uuid,
        purchase_id: Uuid,
    ) -> AppResult<()> {
        let purchase = self.load(store_id, purchase_id).await?;
        let payments = self.payments_sum(store_id, purchase_id).await?;
        let total_paid = if purchase.settled_at_creation() {
            purchase.total
        } else {
            payments
        };
        let status = PaymentStatus::derive(purchase.total, total_paid);

        sqlx::query(
            r#"
            UPDATE purchases SET total_paid = $1, payment_status = $2, updated_at = NOW()
            WHERE id = $3 AND store_id = $4
            "#,
        )
        .bind(total_paid)
        .bind(status.as_str())
        .bind(purchase_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Quantities already sent back by live returns, per product
    pub async fn returned_quantities(
        &self,
        store_id: Uuid,
        purchase_id: Uuid,
    ) -> AppResult<HashMap<Uuid, Decimal>> {
        let rows = sqlx::query_scalar::<_, Json<Vec<LineItem>>>(
            "SELECT items FROM purchase_returns WHERE store_id = $1 AND purchase_id = $2 AND deleted_at IS NULL",
        )
        .bind(store_id)
        .bind(purchase_id)
        .fetch_all(&self.db)
        .await?;

        let mut taken: HashMap<Uuid, Decimal> = HashMap::new();
        for items in rows {
            for item in items.iter() {
                *taken.entry(item.product_id).or_insert(Decimal::ZERO) += item.quantity;
            }
        }
        Ok(taken)
    }

    fn stats_jobs(&self, purchase: &Purchase) -> Vec<StatsJob> {
        let mut jobs: Vec<StatsJob> = purchase
            .items
            .iter()
            .map(|item| StatsJob::Product(item.product_id))
            .collect();
        jobs.push(StatsJob::Vendor(purchase.vendor_id));
        jobs
    }
}

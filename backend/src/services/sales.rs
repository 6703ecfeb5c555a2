//! Sales (order) service
//!
//! The busiest document pipeline: creation runs inside the per-store
//! admission queue, takes a serial from the allocator, moves stock, posts
//! the journal and, when enabled, reports the invoice to the tax authority.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use shared::journal::{self, Leg};
use shared::models::{
    series_open, DocumentKind, LineItem, PaymentMethod, PaymentStatus, ReportingStatus,
};
use shared::money::{round, totals_of, Totals};
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::external::reporting::ReportSubmission;
use crate::external::{Notifier, ReportingClient};
use crate::models::ListCriteria;
use crate::services::accounting::{AccountingService, DocumentRef, Postable};
use crate::services::serials::SerialAllocator;
use crate::services::serializer::StoreSerializer;
use crate::services::stats::{spawn_recompute, StatsJob};
use crate::services::store::StoreService;
use crate::AppState;

/// Sales service
#[derive(Clone)]
pub struct SalesService {
    db: PgPool,
    stores: StoreService,
    serializer: StoreSerializer,
    serials: SerialAllocator,
    accounting: AccountingService,
    reporter: ReportingClient,
    notifier: Notifier,
}

/// Sales document
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Sales {
    pub id: Uuid,
    pub store_id: Uuid,
    pub serial: String,
    pub serial_number: i64,
    pub customer_id: Option<Uuid>,
    pub customer_name: Option<String>,
    pub items: Json<Vec<LineItem>>,
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub payment_status: String,
    pub total_paid: Decimal,
    pub returned_total: Decimal,
    pub quotation_id: Option<Uuid>,
    pub entry_date: NaiveDate,
    pub reporting_status: String,
    pub reporting_error: Option<String>,
    pub stats_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Sales {
    fn totals(&self) -> Totals {
        Totals {
            net: self.net_total,
            vat: self.vat_total,
            gross: self.total,
        }
    }

    fn method(&self) -> Result<PaymentMethod, shared::JournalError> {
        PaymentMethod::parse(&self.payment_method)
            .ok_or(shared::JournalError::InvalidMethod("unknown"))
    }

    /// Cash and bank sales settle at creation; credit sales start unpaid.
    pub fn settled_at_creation(&self) -> bool {
        !matches!(self.method(), Ok(PaymentMethod::CustomerAccount))
    }
}

impl Postable for Sales {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            kind: DocumentKind::Sales,
            id: self.id,
            serial: self.serial.clone(),
        }
    }

    fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    fn legs(&self) -> Result<Vec<Leg>, shared::JournalError> {
        journal::sales_legs(&self.totals(), self.method()?, self.customer_id)
    }
}

/// Input for creating a sale
#[derive(Debug, Deserialize)]
pub struct CreateSalesInput {
    pub store_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub items: Vec<LineItem>,
    pub payment_method: PaymentMethod,
    pub entry_date: Option<NaiveDate>,
    pub quotation_id: Option<Uuid>,
}

/// Input for updating a sale
#[derive(Debug, Deserialize)]
pub struct UpdateSalesInput {
    pub store_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub items: Option<Vec<LineItem>>,
    pub payment_method: Option<PaymentMethod>,
    pub entry_date: Option<NaiveDate>,
    pub updated_at: Option<DateTime<Utc>>,
}

const SALES_COLUMNS: &str = "id, store_id, serial, serial_number, customer_id, customer_name, \
     items, net_total, vat_total, total, payment_method, payment_status, total_paid, \
     returned_total, quotation_id, entry_date, reporting_status, reporting_error, stats_stale, \
     created_at, updated_at, created_by, updated_by, deleted_at, deleted_by";

impl SalesService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            stores: StoreService::new(state.db.clone()),
            serializer: state.serializer.clone(),
            serials: state.serials.clone(),
            accounting: AccountingService::new(state.db.clone(), &state.config.accounting),
            reporter: state.reporter.clone(),
            notifier: state.notifier.clone(),
        }
    }

    /// Create a sale
    pub async fn create(&self, user_id: Uuid, input: CreateSalesInput) -> AppResult<Sales> {
        let errors = validation::validate_line_items(&input.items);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }
        if input.payment_method == PaymentMethod::VendorAccount {
            return Err(AppError::validation("payment_method", "not valid for sales"));
        }
        if input.payment_method == PaymentMethod::CustomerAccount && input.customer_id.is_none() {
            return Err(AppError::validation(
                "customer_id",
                "credit sales need a customer",
            ));
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

        // Everything from the series gate to the insert happens with the
        // (store, kind) queue held
        let _token = self.serializer.enter(store.id, DocumentKind::Sales).await;

        let reporting_active = self.reporter.enabled() && store.reporting_enabled;
        if reporting_active {
            let previous = sqlx::query_scalar::<_, String>(
                r#"
                SELECT reporting_status FROM sales
                WHERE store_id = $1 AND deleted_at IS NULL
                ORDER BY serial_number DESC, created_at DESC
                LIMIT 1
                "#,
            )
            .bind(store.id)
            .fetch_optional(&self.db)
            .await?;
            let previous = previous.as_deref().and_then(ReportingStatus::parse);
            if !series_open(previous) {
                return Err(AppError::business_rule(
                    "reporting",
                    "previous document not reported",
                ));
            }
        }

        let template = store.template_for(DocumentKind::Sales);

        // Re-seed the counter from the highest persisted serial after a
        // cache flush. Only meaningful for never-resetting series, where
        // stored numbers all belong to the one window.
        if template.reset == shared::models::ResetPolicy::Never {
            let highest = sqlx::query_scalar::<_, Option<i64>>(
                "SELECT MAX(serial_number) FROM sales WHERE store_id = $1",
            )
            .bind(store.id)
            .fetch_one(&self.db)
            .await?;
            if let Some(floor) = highest {
                let key = template.counter_key(store.id, DocumentKind::Sales, Utc::now());
                self.serials.raise_to(&key, floor).await?;
            }
        }

        let receipt = self
            .serials
            .reserve(store.id, DocumentKind::Sales, &template, Utc::now())
            .await?;

        let insert_result = self
            .insert_with_stock(&store.id, &store, user_id, &input, &receipt, reporting_active, &customer_name)
            .await;

        let sale = match insert_result {
            Ok(sale) => sale,
            Err(err) => {
                // Failed insert gives the number back
                let _ = self.serials.release(&receipt).await;
                return Err(err);
            }
        };

        if let Err(err) = self.accounting.post(&sale).await {
            // The document must not exist unposted; compensate and release
            if let Err(cleanup) = self.remove_unposted(&sale).await {
                tracing::error!(serial = %sale.serial, "cleanup after failed posting failed: {}", cleanup);
            }
            let _ = self.serials.release(&receipt).await;
            return Err(err);
        }

        let sale = if reporting_active {
            self.submit_report(sale).await?
        } else {
            sale
        };

        self.notifier.emit(
            store.id,
            "sales.created",
            serde_json::json!({ "id": sale.id, "serial": sale.serial }),
        );
        spawn_recompute(self.db.clone(), store.id, self.stats_jobs(&sale));

        Ok(sale)
    }

    async fn insert_with_stock(
        &self,
        store_id: &Uuid,
        store: &crate::services::store::Store,
        user_id: Uuid,
        input: &CreateSalesInput,
        receipt: &crate::services::serials::SerialReceipt,
        reporting_active: bool,
        customer_name: &Option<String>,
    ) -> AppResult<Sales> {
        let mut items = input.items.clone();
        let mut tx = self.db.begin().await?;

        for (index, item) in items.iter_mut().enumerate() {
            let row = sqlx::query_as::<_, (Decimal, String)>(
                r#"
                UPDATE products SET stock = stock - $1, updated_at = NOW()
                WHERE id = $2 AND store_id = $3 AND deleted_at IS NULL
                RETURNING stock, name
                "#,
            )
            .bind(item.quantity)
            .bind(item.product_id)
            .bind(store_id)
            .fetch_optional(&mut *tx)
            .await?;

            let (stock, name) = row.ok_or_else(|| {
                AppError::validation(&format!("items[{}].product_id", index), "product not found")
            })?;

            if stock < Decimal::ZERO && !store.allow_negative_stock {
                return Err(AppError::business_rule(
                    &format!("items[{}].quantity", index),
                    "insufficient stock",
                ));
            }
            item.name = name;
        }

        let totals = totals_of(&items);
        let settled = input.payment_method != PaymentMethod::CustomerAccount;
        let payment_status = if settled {
            PaymentStatus::Paid
        } else {
            PaymentStatus::NotPaid
        };
        let total_paid = if settled { totals.gross } else { Decimal::ZERO };
        let reporting_status = if reporting_active {
            ReportingStatus::Pending
        } else {
            ReportingStatus::Passed
        };

        let sale = sqlx::query_as::<_, Sales>(&format!(
            r#"
            INSERT INTO sales (
                store_id, serial, serial_number, customer_id, customer_name, items,
                net_total, vat_total, total, payment_method, payment_status, total_paid,
                quotation_id, entry_date, reporting_status, created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            RETURNING {SALES_COLUMNS}
            "#,
        ))
        .bind(store_id)
        .bind(&receipt.serial)
        .bind(receipt.issued)
        .bind(input.customer_id)
        .bind(customer_name)
        .bind(Json(items))
        .bind(totals.net)
        .bind(totals.vat)
        .bind(totals.gross)
        .bind(input.payment_method.as_str())
        .bind(payment_status.as_str())
        .bind(total_paid)
        .bind(input.quotation_id)
        .bind(input.entry_date.unwrap_or_else(|| Utc::now().date_naive()))
        .bind(reporting_status.as_str())
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        // Back-link the quotation this sale was converted from
        if let Some(quotation_id) = input.quotation_id {
            sqlx::query(
                "UPDATE quotations SET sales_id = $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
            )
            .bind(sale.id)
            .bind(quotation_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(sale)
    }

    /// Compensation for a failed posting: take the inserted document and its
    /// stock movement back out as if the creation never happened.
    async fn remove_unposted(&self, sale: &Sales) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        for item in sale.items.iter() {
            sqlx::query(
                "UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
            )
            .bind(item.quantity)
            .bind(item.product_id)
            .bind(sale.store_id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(sale.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn submit_report(&self, sale: Sales) -> AppResult<Sales> {
        let outcome = self
            .reporter
            .report(&ReportSubmission {
                store_id: sale.store_id,
                document_id: sale.id,
                serial: sale.serial.clone(),
                entry_date: sale.entry_date,
                net_total: sale.net_total,
                vat_total: sale.vat_total,
                total: sale.total,
            })
            .await;

        let status = if outcome.passed {
            ReportingStatus::Passed
        } else {
            ReportingStatus::Failed
        };
        if let Some(error) = &outcome.error {
            tracing::warn!(serial = %sale.serial, "tax reporting failed: {}", error);
        }

        let sale = sqlx::query_as::<_, Sales>(&format!(
            r#"
            UPDATE sales SET reporting_status = $1, reporting_error = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {SALES_COLUMNS}
            "#,
        ))
        .bind(status.as_str())
        .bind(&outcome.error)
        .bind(sale.id)
        .fetch_one(&self.db)
        .await?;

        Ok(sale)
    }

    /// Retry tax-authority reporting for a failed document
    pub async fn retry_report(&self, store_id: Uuid, sales_id: Uuid) -> AppResult<Sales> {
        let sale = self.load(store_id, sales_id).await?;
        if sale.reporting_status == ReportingStatus::Passed.as_str() {
            return Ok(sale);
        }
        let sale = self.submit_report(sale).await?;
        if sale.reporting_status != ReportingStatus::Passed.as_str() {
            return Err(AppError::ExternalReporting(
                sale.reporting_error
                    .clone()
                    .unwrap_or_else(|| "reporting failed".to_string()),
            ));
        }
        Ok(sale)
    }

    /// Load a live sale
    pub async fn load(&self, store_id: Uuid, sales_id: Uuid) -> AppResult<Sales> {
        sqlx::query_as::<_, Sales>(&format!(
            "SELECT {SALES_COLUMNS} FROM sales WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(sales_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Sales".to_string()))
    }

    /// List sales with criteria
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<Sales>, u64)> {
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
              AND ($6::text IS NULL OR payment_status = $6)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM sales WHERE {filter}"
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.customer_id)
        .bind(&criteria.payment_status)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let sales = sqlx::query_as::<_, Sales>(&format!(
            r#"
            SELECT {SALES_COLUMNS} FROM sales WHERE {filter}
            ORDER BY serial_number {order}, created_at {order}, id {order}
            LIMIT $7 OFFSET $8
            "#,
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.customer_id)
        .bind(&criteria.payment_status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((sales, total as u64))
    }

    /// Update a sale: stock delta, totals, then a full repost
    pub async fn update(
        &self,
        user_id: Uuid,
        sales_id: Uuid,
        input: UpdateSalesInput,
    ) -> AppResult<Sales> {
        let existing = self.load(input.store_id, sales_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "sale was modified by another request".to_string(),
                ));
            }
        }

        let store = self.stores.load(input.store_id).await?;
        let items = input.items.clone().unwrap_or_else(|| existing.items.0.clone());
        let errors = validation::validate_line_items(&items);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        let method = input
            .payment_method
            .unwrap_or(existing.method().map_err(AppError::from)?);
        if method == PaymentMethod::VendorAccount {
            return Err(AppError::validation("payment_method", "not valid for sales"));
        }
        let customer_id = input.customer_id.or(existing.customer_id);
        if method == PaymentMethod::CustomerAccount && customer_id.is_none() {
            return Err(AppError::validation(
                "customer_id",
                "credit sales need a customer",
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

        // Stock moves by the per-product delta
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
            let stock = sqlx::query_scalar::<_, Decimal>(
                r#"
                UPDATE products SET stock = stock - $1, updated_at = NOW()
                WHERE id = $2 AND store_id = $3 AND deleted_at IS NULL
                RETURNING stock
                "#,
            )
            .bind(delta)
            .bind(product_id)
            .bind(existing.store_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::validation("items", "product not found"))?;

            if stock < Decimal::ZERO && !store.allow_negative_stock {
                return Err(AppError::business_rule("items", "insufficient stock"));
            }
        }

        let settled = method != PaymentMethod::CustomerAccount;
        let payments = self.payments_sum(existing.store_id, existing.id).await?;
        let total_paid = if settled { totals.gross } else { payments };
        let payment_status = PaymentStatus::derive(round(totals.gross), total_paid);

        let updated = sqlx::query_as::<_, Sales>(&format!(
            r#"
            UPDATE sales
            SET customer_id = $1, items = $2, net_total = $3, vat_total = $4, total = $5,
                payment_method = $6, payment_status = $7, total_paid = $8, entry_date = $9,
                updated_by = $10, updated_at = NOW()
            WHERE id = $11 AND store_id = $12 AND deleted_at IS NULL
            RETURNING {SALES_COLUMNS}
            "#,
        ))
        .bind(customer_id)
        .bind(Json(items))
        .bind(totals.net)
        .bind(totals.vat)
        .bind(totals.gross)
        .bind(method.as_str())
        .bind(payment_status.as_str())
        .bind(total_paid)
        .bind(input.entry_date.unwrap_or(existing.entry_date))
        .bind(user_id)
        .bind(sales_id)
        .bind(existing.store_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Sales".to_string()))?;

        tx.commit().await?;

        // Re-derive the journal from the new state. If that fails, write the
        // pre-edit snapshot back so the document never sits edited-but-not-
        // reposted.
        if let Err(err) = self
            .accounting
            .repost(&existing.document_ref(), &updated)
            .await
        {
            if let Err(cleanup) = self.restore_snapshot(&existing, &new_quantities).await {
                tracing::error!(serial = %existing.serial, "rollback after failed repost failed: {}", cleanup);
            }
            return Err(err);
        }

        spawn_recompute(self.db.clone(), updated.store_id, self.stats_jobs(&updated));
        Ok(updated)
    }

    /// Write a pre-edit snapshot back and reverse the edit's stock delta.
    async fn restore_snapshot(
        &self,
        snapshot: &Sales,
        edited_quantities: &HashMap<Uuid, Decimal>,
    ) -> AppResult<()> {
        let original_quantities = shared::models::quantities_by_product(&snapshot.items.0);
        let mut tx = self.db.begin().await?;

        let mut products: Vec<Uuid> = original_quantities.keys().copied().collect();
        for product_id in edited_quantities.keys() {
            if !products.contains(product_id) {
                products.push(*product_id);
            }
        }
        for product_id in &products {
            let original = original_quantities
                .get(product_id)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let edited = edited_quantities
                .get(product_id)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let delta = edited - original;
            if delta == Decimal::ZERO {
                continue;
            }
            sqlx::query(
                "UPDATE products SET stock = stock + $1, updated_at = NOW() WHERE id = $2 AND store_id = $3",
            )
            .bind(delta)
            .bind(product_id)
            .bind(snapshot.store_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE sales
            SET customer_id = $1, items = $2, net_total = $3, vat_total = $4, total = $5,
                payment_method = $6, payment_status = $7, total_paid = $8, entry_date = $9,
                updated_at = $10
            WHERE id = $11 AND store_id = $12
            "#,
        )
        .bind(snapshot.customer_id)
        .bind(Json(snapshot.items.0.clone()))
        .bind(snapshot.net_total)
        .bind(snapshot.vat_total)
        .bind(snapshot.total)
        .bind(&snapshot.payment_method)
        .bind(&snapshot.payment_status)
        .bind(snapshot.total_paid)
        .bind(snapshot.entry_date)
        .bind(snapshot.updated_at)
        .bind(snapshot.id)
        .bind(snapshot.store_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Soft-delete a sale, undoing its postings and restoring stock
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, sales_id: Uuid) -> AppResult<()> {
        let existing = self.load(store_id, sales_id).await?;

        let dependents = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT (SELECT COUNT(*) FROM sales_returns
                    WHERE store_id = $1 AND sales_id = $2 AND deleted_at IS NULL)
                 + (SELECT COUNT(*) FROM sales_payments
                    WHERE store_id = $1 AND sales_id = $2 AND deleted_at IS NULL)
            "#,
        )
        .bind(store_id)
        .bind(sales_id)
        .fetch_one(&self.db)
        .await?;

        if dependents > 0 {
            return Err(AppError::business_rule(
                "id",
                "sale has returns or payments; delete those first",
            ));
        }

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
            "UPDATE sales SET deleted_at = NOW(), deleted_by = $1 WHERE id = $2 AND store_id = $3",
        )
        .bind(user_id)
        .bind(sales_id)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Err(err) = self
            .accounting
            .unpost(store_id, DocumentKind::Sales, sales_id)
            .await
        {
            // Revive the document so it never sits deleted-but-posted
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
                "UPDATE sales SET deleted_at = NULL, deleted_by = NULL WHERE id = $1 AND store_id = $2",
            )
            .bind(sales_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Err(err);
        }

        spawn_recompute(self.db.clone(), store_id, self.stats_jobs(&existing));
        self.notifier.emit(
            store_id,
            "sales.deleted",
            serde_json::json!({ "id": sales_id }),
        );
        Ok(())
    }

    /// Sum of live payments against a sale
    pub async fn payments_sum(&self, store_id: Uuid, sales_id: Uuid) -> AppResult<Decimal> {
        let sum = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM sales_payments
            WHERE store_id = $1 AND sales_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(store_id)
        .bind(sales_id)
        .fetch_one(&self.db)
        .await?;
        Ok(sum)
    }

    /// Refresh total_paid and payment_status from the live payments
    pub async fn recompute_payment_status(&self, store_id: Uuid, sales_id: Uuid) -> AppResult<()> {
        let sale = self.load(store_id, sales_id).await?;
        let payments = self.payments_sum(store_id, sales_id).await?;
        let total_paid = if sale.settled_at_creation() {
            sale.total
        } else {
            payments
        };
        let status = PaymentStatus::derive(sale.total, total_paid);

        sqlx::query(
            r#"
            UPDATE sales SET total_paid = $1, payment_status = $2, updated_at = NOW()
            WHERE id = $3 AND store_id = $4
            "#,
        )
        .bind(total_paid)
        .bind(status.as_str())
        .bind(sales_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Quantities already taken back by live returns, per product
    pub async fn returned_quantities(
        &self,
        store_id: Uuid,
        sales_id: Uuid,
    ) -> AppResult<HashMap<Uuid, Decimal>> {
        let rows = sqlx::query_scalar::<_, Json<Vec<LineItem>>>(
            "SELECT items FROM sales_returns WHERE store_id = $1 AND sales_id = $2 AND deleted_at IS NULL",
        )
        .bind(store_id)
        .bind(sales_id)
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

    fn stats_jobs(&self, sale: &Sales) -> Vec<StatsJob> {
        let mut jobs: Vec<StatsJob> = sale
            .items
            .iter()
            .map(|item| StatsJob::Product(item.product_id))
            .collect();
        if let Some(customer_id) = sale.customer_id {
            jobs.push(StatsJob::Customer(customer_id));
        }
        jobs
    }
}

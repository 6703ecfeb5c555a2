//! Payment service
//!
//! Payments settle credit documents: a sales payment moves cash/bank against
//! the customer receivable, a purchase payment clears the vendor payable.
//! Live payments against a document may never exceed its total.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::journal::{self, Leg};
use shared::models::{DocumentKind, PaymentMethod};
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::external::Notifier;
use crate::models::ListCriteria;
use crate::services::accounting::{AccountingService, DocumentRef, Postable};
use crate::services::purchase::PurchaseService;
use crate::services::sales::SalesService;
use crate::services::stats::{spawn_recompute, StatsJob};
use crate::AppState;

/// Which side of the books a payment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentKind {
    SalesPayment,
    PurchasePayment,
}

impl PaymentKind {
    pub fn document_kind(&self) -> DocumentKind {
        match self {
            PaymentKind::SalesPayment => DocumentKind::SalesPayment,
            PaymentKind::PurchasePayment => DocumentKind::PurchasePayment,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            PaymentKind::SalesPayment => "sales_payments",
            PaymentKind::PurchasePayment => "purchase_payments",
        }
    }

    fn parent_column(&self) -> &'static str {
        match self {
            PaymentKind::SalesPayment => "sales_id",
            PaymentKind::PurchasePayment => "purchase_id",
        }
    }

    fn counterparty_column(&self) -> &'static str {
        match self {
            PaymentKind::SalesPayment => "customer_id",
            PaymentKind::PurchasePayment => "vendor_id",
        }
    }
}

/// Payment service for both kinds
#[derive(Clone)]
pub struct PaymentService {
    db: PgPool,
    sales: SalesService,
    purchases: PurchaseService,
    accounting: AccountingService,
    notifier: Notifier,
}

/// Payment record. `parent_id` and `counterparty_id` are aliases over the
/// kind-specific columns.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub store_id: Uuid,
    pub kind: String,
    pub parent_id: Uuid,
    pub counterparty_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_method: String,
    pub entry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Payment {
    fn kind(&self) -> Result<PaymentKind, shared::JournalError> {
        match DocumentKind::parse(&self.kind) {
            Some(DocumentKind::SalesPayment) => Ok(PaymentKind::SalesPayment),
            Some(DocumentKind::PurchasePayment) => Ok(PaymentKind::PurchasePayment),
            _ => Err(shared::JournalError::InvalidMethod("unknown")),
        }
    }
}

impl Postable for Payment {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            kind: self
                .kind()
                .map(|k| k.document_kind())
                .unwrap_or(DocumentKind::SalesPayment),
            id: self.id,
            serial: format!("{}/{}", self.kind, self.id),
        }
    }

    fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    fn legs(&self) -> Result<Vec<Leg>, shared::JournalError> {
        let method = PaymentMethod::parse(&self.payment_method)
            .ok_or(shared::JournalError::InvalidMethod("unknown"))?;
        let counterparty = self
            .counterparty_id
            .ok_or(shared::JournalError::MissingCounterparty {
                method: "payment",
                expected: "counterparty",
            })?;
        match self.kind()? {
            PaymentKind::SalesPayment => {
                journal::sales_payment_legs(self.amount, method, counterparty)
            }
            PaymentKind::PurchasePayment => {
                journal::purchase_payment_legs(self.amount, method, counterparty)
            }
        }
    }
}

/// Input for recording a payment
#[derive(Debug, Deserialize)]
pub struct CreatePaymentInput {
    pub store_id: Uuid,
    pub parent_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub entry_date: Option<NaiveDate>,
}

/// Input for updating a payment
#[derive(Debug, Deserialize)]
pub struct UpdatePaymentInput {
    pub store_id: Uuid,
    pub amount: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub entry_date: Option<NaiveDate>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn payment_columns(kind: PaymentKind) -> String {
    format!(
        "id, store_id, '{kind}'::text AS kind, {parent} AS parent_id, {counterparty} AS counterparty_id, \
         amount, payment_method, entry_date, created_at, updated_at, created_by, updated_by, \
         deleted_at, deleted_by",
        kind = kind.document_kind().as_str(),
        parent = kind.parent_column(),
        counterparty = kind.counterparty_column(),
    )
}

impl PaymentService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            sales: SalesService::new(state),
            purchases: PurchaseService::new(state),
            accounting: AccountingService::new(state.db.clone(), &state.config.accounting),
            notifier: state.notifier.clone(),
        }
    }

    /// Record a payment against a credit document
    pub async fn create(
        &self,
        kind: PaymentKind,
        user_id: Uuid,
        input: CreatePaymentInput,
    ) -> AppResult<Payment> {
        if input.payment_method.is_on_account() {
            return Err(AppError::validation(
                "payment_method",
                "payments settle in cash or bank",
            ));
        }

        // The parent fixes the counterparty and the open balance
        let (parent_total, counterparty_id, settled_at_creation) = match kind {
            PaymentKind::SalesPayment => {
                let sale = self.sales.load(input.store_id, input.parent_id).await?;
                (sale.total, sale.customer_id, sale.settled_at_creation())
            }
            PaymentKind::PurchasePayment => {
                let purchase = self.purchases.load(input.store_id, input.parent_id).await?;
                (
                    purchase.total,
                    Some(purchase.vendor_id),
                    purchase.settled_at_creation(),
                )
            }
        };

        if settled_at_creation {
            return Err(AppError::business_rule(
                "parent_id",
                "document was settled at creation; nothing to pay",
            ));
        }
        let counterparty_id = counterparty_id.ok_or_else(|| {
            AppError::business_rule("parent_id", "document has no counterparty account")
        })?;

        let already_paid = self.payments_sum(kind, input.store_id, input.parent_id).await?;
        let errors = validation::validate_payment_amount(parent_total, already_paid, input.amount);
        if let Some((field, message)) = errors.into_iter().next() {
            return Err(AppError::BusinessRule { field, message });
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO {table} (store_id, {parent}, {counterparty}, amount, payment_method,
                                 entry_date, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {columns}
            "#,
            table = kind.table(),
            parent = kind.parent_column(),
            counterparty = kind.counterparty_column(),
            columns = payment_columns(kind),
        ))
        .bind(input.store_id)
        .bind(input.parent_id)
        .bind(counterparty_id)
        .bind(input.amount)
        .bind(input.payment_method.as_str())
        .bind(input.entry_date.unwrap_or_else(|| Utc::now().date_naive()))
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        if let Err(err) = self.accounting.post(&payment).await {
            let _ = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", kind.table()))
                .bind(payment.id)
                .execute(&self.db)
                .await;
            return Err(err);
        }

        self.recompute_parent(kind, input.store_id, input.parent_id)
            .await?;

        self.notifier.emit(
            input.store_id,
            "payment.created",
            serde_json::json!({ "id": payment.id, "kind": payment.kind, "amount": payment.amount }),
        );
        let job = match kind {
            PaymentKind::SalesPayment => StatsJob::Customer(counterparty_id),
            PaymentKind::PurchasePayment => StatsJob::Vendor(counterparty_id),
        };
        spawn_recompute(self.db.clone(), input.store_id, vec![job]);

        Ok(payment)
    }

    /// Load a live payment
    pub async fn load(
        &self,
        kind: PaymentKind,
        store_id: Uuid,
        payment_id: Uuid,
    ) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {columns} FROM {table} WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
            columns = payment_columns(kind),
            table = kind.table(),
        ))
        .bind(payment_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))
    }

    /// List payments with criteria
    pub async fn list(
        &self,
        kind: PaymentKind,
        criteria: &ListCriteria,
    ) -> AppResult<(Vec<Payment>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let from = criteria
            .from_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        let to = criteria
            .to_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());
        let counterparty = match kind {
            PaymentKind::SalesPayment => criteria.customer_id,
            PaymentKind::PurchasePayment => criteria.vendor_id,
        };

        let filter = format!(
            r#"
            store_id = $1 AND deleted_at IS NULL
              AND entry_date BETWEEN $2 AND $3
              AND ($4::uuid IS NULL OR {counterparty} = $4)
            "#,
            counterparty = kind.counterparty_column(),
        );

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM {table} WHERE {filter}",
            table = kind.table(),
        ))
        .bind(store_id)
        .bind(from)
        .bind(to)
        .bind(counterparty)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {columns} FROM {table} WHERE {filter}
            ORDER BY entry_date {order}, created_at {order}, id {order}
            LIMIT $5 OFFSET $6
            "#,
            columns = payment_columns(kind),
            table = kind.table(),
        ))
        .bind(store_id)
        .bind(from)
        .bind(to)
        .bind(counterparty)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((payments, total as u64))
    }

    /// Update a payment and repost it
    pub async fn update(
        &self,
        kind: PaymentKind,
        user_id: Uuid,
        payment_id: Uuid,
        input: UpdatePaymentInput,
    ) -> AppResult<Payment> {
        let existing = self.load(kind, input.store_id, payment_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "payment was modified by another request".to_string(),
                ));
            }
        }

        let method = input.payment_method.unwrap_or(
            PaymentMethod::parse(&existing.payment_method)
                .ok_or_else(|| AppError::validation("payment_method", "unknown method"))?,
        );
        if method.is_on_account() {
            return Err(AppError::validation(
                "payment_method",
                "payments settle in cash or bank",
            ));
        }

        let amount = input.amount.unwrap_or(existing.amount);
        let parent_total = match kind {
            PaymentKind::SalesPayment => {
                self.sales.load(input.store_id, existing.parent_id).await?.total
            }
            PaymentKind::PurchasePayment => {
                self.purchases
                    .load(input.store_id, existing.parent_id)
                    .await?
                    .total
            }
        };
        let other_payments = self
            .payments_sum(kind, input.store_id, existing.parent_id)
            .await?
            - existing.amount;
        let errors = validation::validate_payment_amount(parent_total, other_payments, amount);
        if let Some((field, message)) = errors.into_iter().next() {
            return Err(AppError::BusinessRule { field, message });
        }

        let updated = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE {table}
            SET amount = $1, payment_method = $2, entry_date = $3, updated_by = $4, updated_at = NOW()
            WHERE id = $5 AND store_id = $6 AND deleted_at IS NULL
            RETURNING {columns}
            "#,
            table = kind.table(),
            columns = payment_columns(kind),
        ))
        .bind(amount)
        .bind(method.as_str())
        .bind(input.entry_date.unwrap_or(existing.entry_date))
        .bind(user_id)
        .bind(payment_id)
        .bind(input.store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment".to_string()))?;

        self.accounting
            .repost(&existing.document_ref(), &updated)
            .await?;
        self.recompute_parent(kind, input.store_id, existing.parent_id)
            .await?;

        Ok(updated)
    }

    /// Soft-delete a payment, undoing its postings
    pub async fn delete(
        &self,
        kind: PaymentKind,
        user_id: Uuid,
        store_id: Uuid,
        payment_id: Uuid,
    ) -> AppResult<()> {
        let existing = self.load(kind, store_id, payment_id).await?;

        sqlx::query(&format!(
            "UPDATE {} SET deleted_at = NOW(), deleted_by = $1 WHERE id = $2 AND store_id = $3",
            kind.table(),
        ))
        .bind(user_id)
        .bind(payment_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;

        if let Err(err) = self
            .accounting
            .unpost(store_id, kind.document_kind(), payment_id)
            .await
        {
            let _ = sqlx::query(&format!(
                "UPDATE {} SET deleted_at = NULL, deleted_by = NULL WHERE id = $1",
                kind.table(),
            ))
            .bind(payment_id)
            .execute(&self.db)
            .await;
            return Err(err);
        }

        self.recompute_parent(kind, store_id, existing.parent_id)
            .await?;
        Ok(())
    }

    async fn payments_sum(
        &self,
        kind: PaymentKind,
        store_id: Uuid,
        parent_id: Uuid,
    ) -> AppResult<Decimal> {
        let sum = sqlx::query_scalar::<_, Decimal>(&format!(
            "SELECT COALESCE(SUM(amount), 0) FROM {table} WHERE store_id = $1 AND {parent} = $2 AND deleted_at IS NULL",
            table = kind.table(),
            parent = kind.parent_column(),
        ))
        .bind(store_id)
        .bind(parent_id)
        .fetch_one(&self.db)
        .await?;
        Ok(sum)
    }

    async fn recompute_parent(
        &self,
        kind: PaymentKind,
        store_id: Uuid,
        parent_id: Uuid,
    ) -> AppResult<()> {
        match kind {
            PaymentKind::SalesPayment => {
                self.sales.recompute_payment_status(store_id, parent_id).await
            }
            PaymentKind::PurchasePayment => {
                self.purchases
                    .recompute_payment_status(store_id, parent_id)
                    .await
            }
        }
    }
}

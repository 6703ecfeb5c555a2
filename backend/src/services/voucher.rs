//! Voucher service
//!
//! The amount-driven documents: capital in and out, dividends, expenses and
//! customer account movements. They share one creation pipeline; only the
//! journal derivation differs per kind.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::journal::{self, Leg};
use shared::models::{DocumentKind, PaymentMethod, VoucherKind};
use shared::money::{round, Totals};
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::external::Notifier;
use crate::models::ListCriteria;
use crate::services::accounting::{AccountingService, DocumentRef, Postable};
use crate::services::serials::SerialAllocator;
use crate::services::serializer::StoreSerializer;
use crate::services::stats::{spawn_recompute, StatsJob};
use crate::services::store::StoreService;
use crate::AppState;

/// Voucher service for all amount-driven kinds
#[derive(Clone)]
pub struct VoucherService {
    db: PgPool,
    stores: StoreService,
    serializer: StoreSerializer,
    serials: SerialAllocator,
    accounting: AccountingService,
    notifier: Notifier,
}

/// Voucher document
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Voucher {
    pub id: Uuid,
    pub store_id: Uuid,
    pub kind: String,
    pub serial: String,
    pub serial_number: i64,
    pub amount: Decimal,
    pub vat_total: Decimal,
    pub category: Option<String>,
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub payment_method: String,
    pub entry_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Voucher {
    fn voucher_kind(&self) -> Result<VoucherKind, shared::JournalError> {
        VoucherKind::parse(&self.kind).ok_or(shared::JournalError::InvalidMethod("unknown"))
    }
}

impl Postable for Voucher {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            kind: self
                .voucher_kind()
                .map(|k| k.document_kind())
                .unwrap_or(DocumentKind::Capital),
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
        let missing = |expected: &'static str| shared::JournalError::MissingCounterparty {
            method: "voucher",
            expected,
        };

        match self.voucher_kind()? {
            VoucherKind::Capital => journal::capital_legs(self.amount, method),
            VoucherKind::CapitalWithdrawal => {
                journal::capital_withdrawal_legs(self.amount, method)
            }
            VoucherKind::Dividend => journal::dividend_legs(self.amount, method),
            VoucherKind::Expense => {
                let category = self.category.as_deref().unwrap_or("general");
                let totals = Totals {
                    net: self.amount - self.vat_total,
                    vat: self.vat_total,
                    gross: self.amount,
                };
                journal::expense_legs(&totals, category, method, self.vendor_id)
            }
            VoucherKind::CustomerDeposit => {
                let customer = self.customer_id.ok_or_else(|| missing("customer"))?;
                journal::customer_deposit_legs(self.amount, method, customer)
            }
            VoucherKind::CustomerWithdrawal => {
                let customer = self.customer_id.ok_or_else(|| missing("customer"))?;
                journal::customer_withdrawal_legs(self.amount, method, customer)
            }
        }
    }
}

/// Input for creating a voucher
#[derive(Debug, Deserialize)]
pub struct CreateVoucherInput {
    pub store_id: Uuid,
    pub amount: Decimal,
    pub vat_total: Option<Decimal>,
    pub category: Option<String>,
    pub customer_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub entry_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Input for updating a voucher
#[derive(Debug, Deserialize)]
pub struct UpdateVoucherInput {
    pub store_id: Uuid,
    pub amount: Option<Decimal>,
    pub vat_total: Option<Decimal>,
    pub category: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub entry_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

const VOUCHER_COLUMNS: &str = "id, store_id, kind, serial, serial_number, amount, vat_total, \
     category, customer_id, vendor_id, payment_method, entry_date, notes, created_at, \
     updated_at, created_by, updated_by, deleted_at, deleted_by";

impl VoucherService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            stores: StoreService::new(state.db.clone()),
            serializer: state.serializer.clone(),
            serials: state.serials.clone(),
            accounting: AccountingService::new(state.db.clone(), &state.config.accounting),
            notifier: state.notifier.clone(),
        }
    }

    /// Create a voucher of the given kind
    pub async fn create(
        &self,
        kind: VoucherKind,
        user_id: Uuid,
        input: CreateVoucherInput,
    ) -> AppResult<Voucher> {
        self.validate_input(kind, &input)?;

        let store = self.stores.load(input.store_id).await?;

        // Entity references must exist in the tenant
        if let Some(customer_id) = input.customer_id {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM customers WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL)",
            )
            .bind(customer_id)
            .bind(store.id)
            .fetch_one(&self.db)
            .await?;
            if !exists {
                return Err(AppError::validation("customer_id", "customer not found"));
            }
        }
        if let Some(vendor_id) = input.vendor_id {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM vendors WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL)",
            )
            .bind(vendor_id)
            .bind(store.id)
            .fetch_one(&self.db)
            .await?;
            if !exists {
                return Err(AppError::validation("vendor_id", "vendor not found"));
            }
        }

        let document_kind = kind.document_kind();
        let _token = self.serializer.enter(store.id, document_kind).await;

        let template = store.template_for(document_kind);
        let receipt = self
            .serials
            .reserve(store.id, document_kind, &template, Utc::now())
            .await?;

        let insert_result = sqlx::query_as::<_, Voucher>(&format!(
            r#"
            INSERT INTO vouchers (
                store_id, kind, serial, serial_number, amount, vat_total, category,
                customer_id, vendor_id, payment_method, entry_date, notes, created_by, updated_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING {VOUCHER_COLUMNS}
            "#,
        ))
        .bind(store.id)
        .bind(document_kind.as_str())
        .bind(&receipt.serial)
        .bind(receipt.issued)
        .bind(round(input.amount))
        .bind(round(input.vat_total.unwrap_or(Decimal::ZERO)))
        .bind(&input.category)
        .bind(input.customer_id)
        .bind(input.vendor_id)
        .bind(input.payment_method.as_str())
        .bind(input.entry_date.unwrap_or_else(|| Utc::now().date_naive()))
        .bind(&input.notes)
        .bind(user_id)
        .fetch_one(&self.db)
        .await;

        let voucher = match insert_result {
            Ok(voucher) => voucher,
            Err(err) => {
                let _ = self.serials.release(&receipt).await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.accounting.post(&voucher).await {
            let _ = sqlx::query("DELETE FROM vouchers WHERE id = $1")
                .bind(voucher.id)
                .execute(&self.db)
                .await;
            let _ = self.serials.release(&receipt).await;
            return Err(err);
        }

        self.notifier.emit(
            store.id,
            &format!("{}.created", document_kind.as_str()),
            serde_json::json!({ "id": voucher.id, "serial": voucher.serial }),
        );
        if let Some(customer_id) = voucher.customer_id {
            spawn_recompute(self.db.clone(), store.id, vec![StatsJob::Customer(customer_id)]);
        }
        if let Some(vendor_id) = voucher.vendor_id {
            spawn_recompute(self.db.clone(), store.id, vec![StatsJob::Vendor(vendor_id)]);
        }

        Ok(voucher)
    }

    fn validate_input(&self, kind: VoucherKind, input: &CreateVoucherInput) -> AppResult<()> {
        // Expenses may settle on the vendor account; everything else moves
        // real money
        let errors = match kind {
            VoucherKind::Expense => {
                let mut errors = shared::validation::FieldErrors::new();
                if input.amount <= Decimal::ZERO {
                    validation::add_error(&mut errors, "amount", "amount must be positive");
                }
                if input.payment_method == PaymentMethod::CustomerAccount {
                    validation::add_error(&mut errors, "method", "method must be cash, bank or vendor account");
                }
                if input.payment_method == PaymentMethod::VendorAccount
                    && input.vendor_id.is_none()
                {
                    validation::add_error(&mut errors, "vendor_id", "vendor is required");
                }
                if input
                    .vat_total
                    .map(|vat| vat < Decimal::ZERO || vat > input.amount)
                    .unwrap_or(false)
                {
                    validation::add_error(&mut errors, "vat_total", "VAT must be within the amount");
                }
                errors
            }
            _ => validation::validate_voucher(input.amount, input.payment_method),
        };
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        match kind {
            VoucherKind::CustomerDeposit | VoucherKind::CustomerWithdrawal
                if input.customer_id.is_none() =>
            {
                Err(AppError::validation("customer_id", "customer is required"))
            }
            _ => Ok(()),
        }
    }

    /// Load a live voucher
    pub async fn load(
        &self,
        kind: VoucherKind,
        store_id: Uuid,
        voucher_id: Uuid,
    ) -> AppResult<Voucher> {
        sqlx::query_as::<_, Voucher>(&format!(
            "SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE id = $1 AND store_id = $2 AND kind = $3 AND deleted_at IS NULL",
        ))
        .bind(voucher_id)
        .bind(store_id)
        .bind(kind.as_str())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Voucher".to_string()))
    }

    /// List vouchers of a kind with criteria
    pub async fn list(
        &self,
        kind: VoucherKind,
        criteria: &ListCriteria,
    ) -> AppResult<(Vec<Voucher>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let from = criteria
            .from_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        let to = criteria
            .to_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());

        let filter = r#"
            store_id = $1 AND kind = $2 AND deleted_at IS NULL
              AND entry_date BETWEEN $3 AND $4
              AND ($5::uuid IS NULL OR customer_id = $5)
              AND ($6::uuid IS NULL OR vendor_id = $6)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM vouchers WHERE {filter}"
        ))
        .bind(store_id)
        .bind(kind.as_str())
        .bind(from)
        .bind(to)
        .bind(criteria.customer_id)
        .bind(criteria.vendor_id)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let vouchers = sqlx::query_as::<_, Voucher>(&format!(
            r#"
            SELECT {VOUCHER_COLUMNS} FROM vouchers WHERE {filter}
            ORDER BY serial_number {order}, created_at {order}, id {order}
            LIMIT $7 OFFSET $8
            "#,
        ))
        .bind(store_id)
        .bind(kind.as_str())
        .bind(from)
        .bind(to)
        .bind(criteria.customer_id)
        .bind(criteria.vendor_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((vouchers, total as u64))
    }

    /// Update a voucher and repost it
    pub async fn update(
        &self,
        kind: VoucherKind,
        user_id: Uuid,
        voucher_id: Uuid,
        input: UpdateVoucherInput,
    ) -> AppResult<Voucher> {
        let existing = self.load(kind, input.store_id, voucher_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "voucher was modified by another request".to_string(),
                ));
            }
        }

        let create_shape = CreateVoucherInput {
            store_id: input.store_id,
            amount: input.amount.unwrap_or(existing.amount),
            vat_total: input.vat_total.or(Some(existing.vat_total)),
            category: input.category.clone().or_else(|| existing.category.clone()),
            customer_id: existing.customer_id,
            vendor_id: existing.vendor_id,
            payment_method: input.payment_method.unwrap_or(
                PaymentMethod::parse(&existing.payment_method)
                    .ok_or_else(|| AppError::validation("payment_method", "unknown method"))?,
            ),
            entry_date: None,
            notes: None,
        };
        self.validate_input(kind, &create_shape)?;

        let updated = sqlx::query_as::<_, Voucher>(&format!(
            r#"
            UPDATE vouchers
            SET amount = $1, vat_total = $2, category = $3, payment_method = $4,
                entry_date = $5, notes = $6, updated_by = $7, updated_at = NOW()
            WHERE id = $8 AND store_id = $9 AND deleted_at IS NULL
            RETURNING {VOUCHER_COLUMNS}
            "#,
        ))
        .bind(round(create_shape.amount))
        .bind(round(create_shape.vat_total.unwrap_or(Decimal::ZERO)))
        .bind(&create_shape.category)
        .bind(create_shape.payment_method.as_str())
        .bind(input.entry_date.unwrap_or(existing.entry_date))
        .bind(input.notes.or_else(|| existing.notes.clone()))
        .bind(user_id)
        .bind(voucher_id)
        .bind(input.store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Voucher".to_string()))?;

        self.accounting
            .repost(&existing.document_ref(), &updated)
            .await?;

        Ok(updated)
    }

    /// Soft-delete a voucher, undoing its postings
    pub async fn delete(
        &self,
        kind: VoucherKind,
        user_id: Uuid,
        store_id: Uuid,
        voucher_id: Uuid,
    ) -> AppResult<()> {
        let existing = self.load(kind, store_id, voucher_id).await?;

        sqlx::query(
            "UPDATE vouchers SET deleted_at = NOW(), deleted_by = $1 WHERE id = $2 AND store_id = $3",
        )
        .bind(user_id)
        .bind(voucher_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;

        if let Err(err) = self
            .accounting
            .unpost(store_id, kind.document_kind(), voucher_id)
            .await
        {
            let _ = sqlx::query(
                "UPDATE vouchers SET deleted_at = NULL, deleted_by = NULL WHERE id = $1",
            )
            .bind(voucher_id)
            .execute(&self.db)
            .await;
            return Err(err);
        }

        if let Some(customer_id) = existing.customer_id {
            spawn_recompute(self.db.clone(), store_id, vec![StatsJob::Customer(customer_id)]);
        }
        Ok(())
    }
}

//! Quotation sales return service
//!
//! Returns against an invoice-type quotation. Posted like a sales return
//! against the quotation's customer; quotations never moved stock, so these
//! returns leave it alone too.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use shared::journal::{self, Leg};
use shared::models::{
    build_return_items, DocumentKind, LineItem, PaymentMethod, QuotationType, ReturnLine,
};
use shared::money::{totals_of, Totals};
use shared::validation;

use crate::error::{AppError, AppResult};
use crate::external::Notifier;
use crate::models::ListCriteria;
use crate::services::accounting::{AccountingService, DocumentRef, Postable};
use crate::services::quotation::QuotationService;
use crate::services::serials::SerialAllocator;
use crate::services::serializer::StoreSerializer;
use crate::services::store::StoreService;
use crate::AppState;

/// Quotation sales return service
#[derive(Clone)]
pub struct QuotationReturnService {
    db: PgPool,
    stores: StoreService,
    quotations: QuotationService,
    serializer: StoreSerializer,
    serials: SerialAllocator,
    accounting: AccountingService,
    notifier: Notifier,
}

/// Quotation sales return document
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QuotationReturn {
    pub id: Uuid,
    pub store_id: Uuid,
    pub serial: String,
    pub serial_number: i64,
    pub quotation_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub items: Json<Vec<LineItem>>,
    pub net_total: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
    pub payment_method: String,
    pub entry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl Postable for QuotationReturn {
    fn store_id(&self) -> Uuid {
        self.store_id
    }

    fn document_ref(&self) -> DocumentRef {
        DocumentRef {
            kind: DocumentKind::QuotationSalesReturn,
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

/// Input for creating a quotation sales return
#[derive(Debug, Deserialize)]
pub struct CreateQuotationReturnInput {
    pub store_id: Uuid,
    pub quotation_id: Uuid,
    pub items: Vec<ReturnLine>,
    pub payment_method: PaymentMethod,
    pub entry_date: Option<NaiveDate>,
}

const RETURN_COLUMNS: &str = "id, store_id, serial, serial_number, quotation_id, customer_id, \
     items, net_total, vat_total, total, payment_method, entry_date, created_at, updated_at, \
     created_by, updated_by, deleted_at, deleted_by";

impl QuotationReturnService {
    pub fn new(state: &AppState) -> Self {
        Self {
            db: state.db.clone(),
            stores: StoreService::new(state.db.clone()),
            quotations: QuotationService::new(state),
            serializer: state.serializer.clone(),
            serials: state.serials.clone(),
            accounting: AccountingService::new(state.db.clone(), &state.config.accounting),
            notifier: state.notifier.clone(),
        }
    }

    /// Create a quotation sales return
    pub async fn create(
        &self,
        user_id: Uuid,
        input: CreateQuotationReturnInput,
    ) -> AppResult<QuotationReturn> {
        if input.items.is_empty() {
            return Err(AppError::validation("items", "at least one line is required"));
        }
        if input.payment_method == PaymentMethod::VendorAccount {
            return Err(AppError::validation(
                "payment_method",
                "not valid for quotation returns",
            ));
        }

        let store = self.stores.load(input.store_id).await?;
        let quotation = self.quotations.load(store.id, input.quotation_id).await?;

        if quotation.quotation_type != QuotationType::Invoice.as_str() {
            return Err(AppError::business_rule(
                "quotation_id",
                "only invoice-type quotations can take returns",
            ));
        }
        if input.payment_method == PaymentMethod::CustomerAccount
            && quotation.customer_id.is_none()
        {
            return Err(AppError::validation(
                "payment_method",
                "the quotation has no customer account to credit",
            ));
        }

        let items = build_return_items(&quotation.items.0, &input.items).map_err(|product_id| {
            AppError::validation(
                "items",
                format!("product {} is not on the quotation", product_id),
            )
        })?;

        let _token = self
            .serializer
            .enter(store.id, DocumentKind::QuotationSalesReturn)
            .await;

        let already_returned = self.returned_quantities(store.id, quotation.id).await?;
        let errors =
            validation::validate_return_items(&quotation.items.0, &already_returned, &items);
        if let Some((field, message)) = errors.into_iter().next() {
            return Err(AppError::BusinessRule { field, message });
        }

        let template = store.template_for(DocumentKind::QuotationSalesReturn);
        let receipt = self
            .serials
            .reserve(
                store.id,
                DocumentKind::QuotationSalesReturn,
                &template,
                Utc::now(),
            )
            .await?;

        let totals = totals_of(&items);
        let insert_result: AppResult<QuotationReturn> = async {
            let mut tx = self.db.begin().await?;

            let row = sqlx::query_as::<_, QuotationReturn>(&format!(
                r#"
                INSERT INTO quotation_sales_returns (
                    store_id, serial, serial_number, quotation_id, customer_id, items,
                    net_total, vat_total, total, payment_method, entry_date, created_by, updated_by
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
                RETURNING {RETURN_COLUMNS}
                "#,
            ))
            .bind(store.id)
            .bind(&receipt.serial)
            .bind(receipt.issued)
            .bind(quotation.id)
            .bind(quotation.customer_id)
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
                "UPDATE quotations SET returned_total = returned_total + $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(totals.gross)
            .bind(quotation.id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(row)
        }
        .await;

        let quotation_return = match insert_result {
            Ok(row) => row,
            Err(err) => {
                let _ = self.serials.release(&receipt).await;
                return Err(err);
            }
        };

        if let Err(err) = self.accounting.post(&quotation_return).await {
            if let Err(cleanup) = self.remove_unposted(&quotation_return).await {
                tracing::error!(serial = %quotation_return.serial, "cleanup after failed posting failed: {}", cleanup);
            }
            let _ = self.serials.release(&receipt).await;
            return Err(err);
        }

        self.notifier.emit(
            store.id,
            "quotation_sales_return.created",
            serde_json::json!({ "id": quotation_return.id, "serial": quotation_return.serial }),
        );
        Ok(quotation_return)
    }

    async fn remove_unposted(&self, row: &QuotationReturn) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query(
            "UPDATE quotations SET returned_total = returned_total - $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(row.total)
        .bind(row.quotation_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM quotation_sales_returns WHERE id = $1")
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Load a live return
    pub async fn load(&self, store_id: Uuid, return_id: Uuid) -> AppResult<QuotationReturn> {
        sqlx::query_as::<_, QuotationReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM quotation_sales_returns WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(return_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Quotation return".to_string()))
    }

    /// List returns with criteria
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<QuotationReturn>, u64)> {
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
            "SELECT COUNT(*) FROM quotation_sales_returns WHERE {filter}"
        ))
        .bind(store_id)
        .bind(&q)
        .bind(from)
        .bind(to)
        .bind(criteria.customer_id)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let rows = sqlx::query_as::<_, QuotationReturn>(&format!(
            r#"
            SELECT {RETURN_COLUMNS} FROM quotation_sales_returns WHERE {filter}
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

    /// Soft-delete a return, undoing its postings
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, return_id: Uuid) -> AppResult<()> {
        let existing = self.load(store_id, return_id).await?;

        let mut tx = self.db.begin().await?;
        sqlx::query(
            "UPDATE quotations SET returned_total = returned_total - $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(existing.total)
        .bind(existing.quotation_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE quotation_sales_returns SET deleted_at = NOW(), deleted_by = $1 WHERE id = $2 AND store_id = $3",
        )
        .bind(user_id)
        .bind(return_id)
        .bind(store_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if let Err(err) = self
            .accounting
            .unpost(store_id, DocumentKind::QuotationSalesReturn, return_id)
            .await
        {
            let mut tx = self.db.begin().await?;
            sqlx::query(
                "UPDATE quotations SET returned_total = returned_total + $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(existing.total)
            .bind(existing.quotation_id)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "UPDATE quotation_sales_returns SET deleted_at = NULL, deleted_by = NULL WHERE id = $1 AND store_id = $2",
            )
            .bind(return_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Err(err);
        }

        Ok(())
    }

    /// Quantities already returned against a quotation, per product
    async fn returned_quantities(
        &self,
        store_id: Uuid,
        quotation_id: Uuid,
    ) -> AppResult<HashMap<Uuid, Decimal>> {
        let rows = sqlx::query_scalar::<_, Json<Vec<LineItem>>>(
            "SELECT items FROM quotation_sales_returns WHERE store_id = $1 AND quotation_id = $2 AND deleted_at IS NULL",
        )
        .bind(store_id)
        .bind(quotation_id)
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
}

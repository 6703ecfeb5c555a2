//! Customer management service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{collect_validator_errors, ListCriteria};
use crate::services::accounting::AccountingService;

/// Customer service
#[derive(Clone)]
pub struct CustomerService {
    db: PgPool,
    accounting: AccountingService,
}

/// Customer record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
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

/// Input for creating a customer
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerInput {
    pub store_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Input for updating a customer
#[derive(Debug, Deserialize)]
pub struct UpdateCustomerInput {
    pub store_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

const CUSTOMER_COLUMNS: &str = "id, store_id, name, email, phone, address, total_invoiced, \
     total_paid, open_balance, stats_stale, created_at, updated_at, created_by, updated_by, \
     deleted_at, deleted_by";

impl CustomerService {
    pub fn new(db: PgPool, accounting: AccountingService) -> Self {
        Self { db, accounting }
    }

    /// Create a customer
    pub async fn create(&self, user_id: Uuid, input: CreateCustomerInput) -> AppResult<Customer> {
        input
            .validate()
            .map_err(|e| AppError::Validation(collect_validator_errors(e)))?;

        let customer = sqlx::query_as::<_, Customer>(&format!(
            r#"
            INSERT INTO customers (store_id, name, email, phone, address, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {CUSTOMER_COLUMNS}
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

        Ok(customer)
    }

    /// Load a live customer within the store
    pub async fn load(&self, store_id: Uuid, customer_id: Uuid) -> AppResult<Customer> {
        sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(customer_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer".to_string()))
    }

    /// List customers for a store
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<Customer>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let q = criteria
            .q
            .as_ref()
            .map(|q| format!("%{}%", q))
            .unwrap_or_else(|| "%".to_string());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM customers
            WHERE store_id = $1 AND deleted_at IS NULL
              AND (name ILIKE $2 OR email ILIKE $2 OR phone ILIKE $2)
            "#,
        )
        .bind(store_id)
        .bind(&q)
        .fetch_one(&self.db)
        .await?;

        let customers = sqlx::query_as::<_, Customer>(&format!(
            r#"
            SELECT {CUSTOMER_COLUMNS} FROM customers
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

        Ok((customers, total as u64))
    }

    /// Update a customer; a rename is propagated to the receivable account
    pub async fn update(
        &self,
        user_id: Uuid,
        customer_id: Uuid,
        input: UpdateCustomerInput,
    ) -> AppResult<Customer> {
        let existing = self.load(input.store_id, customer_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "customer was modified by another request".to_string(),
                ));
            }
        }

        let renamed = input
            .name
            .as_ref()
            .map(|name| name != &existing.name)
            .unwrap_or(false);

        let customer = sqlx::query_as::<_, Customer>(&format!(
            r#"
            UPDATE customers
            SET name = $1, email = $2, phone = $3, address = $4, updated_by = $5, updated_at = NOW()
            WHERE id = $6 AND store_id = $7 AND deleted_at IS NULL
            RETURNING {CUSTOMER_COLUMNS}
            "#,
        ))
        .bind(input.name.unwrap_or(existing.name))
        .bind(input.email.or(existing.email))
        .bind(input.phone.or(existing.phone))
        .bind(input.address.or(existing.address))
        .bind(user_id)
        .bind(customer_id)
        .bind(input.store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer".to_string()))?;

        if renamed {
            self.accounting
                .rename_reference_accounts(
                    customer.store_id,
                    "customers",
                    customer.id,
                    &customer.name,
                )
                .await?;
        }

        Ok(customer)
    }

    /// Soft-delete a customer. Customers with open documents stay.
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, customer_id: Uuid) -> AppResult<()> {
        let open_documents = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM sales
            WHERE store_id = $1 AND customer_id = $2 AND deleted_at IS NULL
              AND payment_status <> 'paid'
            "#,
        )
        .bind(store_id)
        .bind(customer_id)
        .fetch_one(&self.db)
        .await?;

        if open_documents > 0 {
            return Err(AppError::business_rule(
                "customer_id",
                "customer has unpaid documents",
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE customers SET deleted_at = NOW(), deleted_by = $1
            WHERE id = $2 AND store_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Customer".to_string()));
        }
        Ok(())
    }
}

//! Product management service
//!
//! Products carry per-store prices and the running stock that sales,
//! purchases and their returns move.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{collect_validator_errors, ListCriteria};

/// Product service
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Product record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub store_id: Uuid,
    pub name: String,
    pub part_number: Option<String>,
    pub bar_code: Option<String>,
    pub retail_price: Decimal,
    pub wholesale_price: Decimal,
    pub purchase_price: Decimal,
    pub stock: Decimal,
    pub total_sold: Decimal,
    pub total_purchased: Decimal,
    pub stats_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    pub store_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 100))]
    pub part_number: Option<String>,
    #[validate(length(max = 100))]
    pub bar_code: Option<String>,
    pub retail_price: Option<Decimal>,
    pub wholesale_price: Option<Decimal>,
    pub purchase_price: Option<Decimal>,
    pub stock: Option<Decimal>,
}

/// Input for updating a product
#[derive(Debug, Deserialize)]
pub struct UpdateProductInput {
    pub store_id: Uuid,
    pub name: Option<String>,
    pub part_number: Option<String>,
    pub bar_code: Option<String>,
    pub retail_price: Option<Decimal>,
    pub wholesale_price: Option<Decimal>,
    pub purchase_price: Option<Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

const PRODUCT_COLUMNS: &str = "id, store_id, name, part_number, bar_code, retail_price, \
     wholesale_price, purchase_price, stock, total_sold, total_purchased, stats_stale, \
     created_at, updated_at, created_by, updated_by, deleted_at, deleted_by";

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a product
    pub async fn create(&self, user_id: Uuid, input: CreateProductInput) -> AppResult<Product> {
        input
            .validate()
            .map_err(|e| AppError::Validation(collect_validator_errors(e)))?;

        for (field, price) in [
            ("retail_price", input.retail_price),
            ("wholesale_price", input.wholesale_price),
            ("purchase_price", input.purchase_price),
        ] {
            if let Some(price) = price {
                if price < Decimal::ZERO {
                    return Err(AppError::validation(field, "price cannot be negative"));
                }
            }
        }

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (store_id, name, part_number, bar_code, retail_price,
                                  wholesale_price, purchase_price, stock, created_by, updated_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {PRODUCT_COLUMNS}
            "#,
        ))
        .bind(input.store_id)
        .bind(&input.name)
        .bind(&input.part_number)
        .bind(&input.bar_code)
        .bind(input.retail_price.unwrap_or(Decimal::ZERO))
        .bind(input.wholesale_price.unwrap_or(Decimal::ZERO))
        .bind(input.purchase_price.unwrap_or(Decimal::ZERO))
        .bind(input.stock.unwrap_or(Decimal::ZERO))
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        Ok(product)
    }

    /// Load a live product within the store
    pub async fn load(&self, store_id: Uuid, product_id: Uuid) -> AppResult<Product> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND store_id = $2 AND deleted_at IS NULL",
        ))
        .bind(product_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// List products for a store
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<Product>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let q = criteria
            .q
            .as_ref()
            .map(|q| format!("%{}%", q))
            .unwrap_or_else(|| "%".to_string());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM products
            WHERE store_id = $1 AND deleted_at IS NULL
              AND (name ILIKE $2 OR part_number ILIKE $2 OR bar_code ILIKE $2)
            "#,
        )
        .bind(store_id)
        .bind(&q)
        .fetch_one(&self.db)
        .await?;

        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE store_id = $1 AND deleted_at IS NULL
              AND (name ILIKE $2 OR part_number ILIKE $2 OR bar_code ILIKE $2)
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

        Ok((products, total as u64))
    }

    /// Update a product
    pub async fn update(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        let existing = self.load(input.store_id, product_id).await?;

        if let Some(expected) = input.updated_at {
            if expected != existing.updated_at {
                return Err(AppError::Conflict(
                    "product was modified by another request".to_string(),
                ));
            }
        }

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = $1, part_number = $2, bar_code = $3, retail_price = $4,
                wholesale_price = $5, purchase_price = $6, updated_by = $7, updated_at = NOW()
            WHERE id = $8 AND store_id = $9 AND deleted_at IS NULL
            RETURNING {PRODUCT_COLUMNS}
            "#,
        ))
        .bind(input.name.unwrap_or(existing.name))
        .bind(input.part_number.or(existing.part_number))
        .bind(input.bar_code.or(existing.bar_code))
        .bind(input.retail_price.unwrap_or(existing.retail_price))
        .bind(input.wholesale_price.unwrap_or(existing.wholesale_price))
        .bind(input.purchase_price.unwrap_or(existing.purchase_price))
        .bind(user_id)
        .bind(product_id)
        .bind(input.store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        Ok(product)
    }

    /// Soft-delete a product
    pub async fn delete(&self, user_id: Uuid, store_id: Uuid, product_id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products SET deleted_at = NOW(), deleted_by = $1
            WHERE id = $2 AND store_id = $3 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(store_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Product".to_string()));
        }
        Ok(())
    }
}

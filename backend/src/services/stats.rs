//! Background statistics recomputation
//!
//! After a successful write the handler fires one of these jobs and answers
//! the client without waiting. Each job recomputes denormalized totals from
//! the source of truth, so re-running it is always safe. A failed job flags
//! the entity for a later reconciliation pass instead of surfacing anywhere.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use shared::models::PaymentMethod;

/// What to recompute
#[derive(Debug, Clone)]
pub enum StatsJob {
    Customer(Uuid),
    Vendor(Uuid),
    Product(Uuid),
}

/// Fire-and-forget recomputation after the response is written.
pub fn spawn_recompute(db: PgPool, store_id: Uuid, jobs: Vec<StatsJob>) {
    tokio::spawn(async move {
        for job in jobs {
            if let Err(e) = run(&db, store_id, &job).await {
                tracing::warn!(store = %store_id, ?job, "stats recompute failed: {}", e);
                if let Err(e) = flag_stale(&db, store_id, &job).await {
                    tracing::error!(store = %store_id, ?job, "could not flag stale stats: {}", e);
                }
            }
        }
    });
}

async fn run(db: &PgPool, store_id: Uuid, job: &StatsJob) -> Result<(), sqlx::Error> {
    match job {
        StatsJob::Customer(customer_id) => recompute_customer(db, store_id, *customer_id).await,
        StatsJob::Vendor(vendor_id) => recompute_vendor(db, store_id, *vendor_id).await,
        StatsJob::Product(product_id) => recompute_product(db, store_id, *product_id).await,
    }
}

async fn flag_stale(db: &PgPool, store_id: Uuid, job: &StatsJob) -> Result<(), sqlx::Error> {
    let (table, id) = match job {
        StatsJob::Customer(id) => ("customers", *id),
        StatsJob::Vendor(id) => ("vendors", *id),
        StatsJob::Product(id) => ("products", *id),
    };
    sqlx::query(&format!(
        "UPDATE {} SET stats_stale = TRUE WHERE id = $1 AND store_id = $2",
        table
    ))
    .bind(id)
    .bind(store_id)
    .execute(db)
    .await?;
    Ok(())
}

/// Invoiced, paid and open totals for one customer across live sales and
/// payments. Cash and bank sales count as settled at creation.
async fn recompute_customer(
    db: &PgPool,
    store_id: Uuid,
    customer_id: Uuid,
) -> Result<(), sqlx::Error> {
    let (invoiced, settled_at_sale) = sqlx::query_as::<_, (Decimal, Decimal)>(
        r#"
        SELECT COALESCE(SUM(total - returned_total), 0),
               COALESCE(SUM(CASE WHEN payment_method <> $3 THEN total - returned_total ELSE 0 END), 0)
        FROM sales
        WHERE store_id = $1 AND customer_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(store_id)
    .bind(customer_id)
    .bind(PaymentMethod::CustomerAccount.as_str())
    .fetch_one(db)
    .await?;

    let payments = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0) FROM sales_payments
        WHERE store_id = $1 AND customer_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(store_id)
    .bind(customer_id)
    .fetch_one(db)
    .await?;

    let paid = settled_at_sale + payments;

    sqlx::query(
        r#"
        UPDATE customers
        SET total_invoiced = $1, total_paid = $2, open_balance = $3,
            stats_stale = FALSE, updated_at = NOW()
        WHERE id = $4 AND store_id = $5
        "#,
    )
    .bind(invoiced)
    .bind(paid)
    .bind(invoiced - paid)
    .bind(customer_id)
    .bind(store_id)
    .execute(db)
    .await?;
    Ok(())
}

async fn recompute_vendor(db: &PgPool, store_id: Uuid, vendor_id: Uuid) -> Result<(), sqlx::Error> {
    let (invoiced, settled_at_purchase) = sqlx::query_as::<_, (Decimal, Decimal)>(
        r#"
        SELECT COALESCE(SUM(total - returned_total), 0),
               COALESCE(SUM(CASE WHEN payment_method <> $3 THEN total - returned_total ELSE 0 END), 0)
        FROM purchases
        WHERE store_id = $1 AND vendor_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(store_id)
    .bind(vendor_id)
    .bind(PaymentMethod::VendorAccount.as_str())
    .fetch_one(db)
    .await?;

    let payments = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(amount), 0) FROM purchase_payments
        WHERE store_id = $1 AND vendor_id = $2 AND deleted_at IS NULL
        "#,
    )
    .bind(store_id)
    .bind(vendor_id)
    .fetch_one(db)
    .await?;

    let paid = settled_at_purchase + payments;

    sqlx::query(
        r#"
        UPDATE vendors
        SET total_invoiced = $1, total_paid = $2, open_balance = $3,
            stats_stale = FALSE, updated_at = NOW()
        WHERE id = $4 AND store_id = $5
        "#,
    )
    .bind(invoiced)
    .bind(paid)
    .bind(invoiced - paid)
    .bind(vendor_id)
    .bind(store_id)
    .execute(db)
    .await?;
    Ok(())
}

/// Lifetime movement totals for a product from live documents.
async fn recompute_product(
    db: &PgPool,
    store_id: Uuid,
    product_id: Uuid,
) -> Result<(), sqlx::Error> {
    let sold = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM((item->>'quantity')::numeric), 0)
        FROM sales, jsonb_array_elements(items) AS item
        WHERE store_id = $1 AND deleted_at IS NULL AND item->>'product_id' = $2::text
        "#,
    )
    .bind(store_id)
    .bind(product_id)
    .fetch_one(db)
    .await?;

    let purchased = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM((item->>'quantity')::numeric), 0)
        FROM purchases, jsonb_array_elements(items) AS item
        WHERE store_id = $1 AND deleted_at IS NULL AND item->>'product_id' = $2::text
        "#,
    )
    .bind(store_id)
    .bind(product_id)
    .fetch_one(db)
    .await?;

    sqlx::query(
        r#"
        UPDATE products
        SET total_sold = $1, total_purchased = $2, stats_stale = FALSE, updated_at = NOW()
        WHERE id = $3 AND store_id = $4
        "#,
    )
    .bind(sold)
    .bind(purchased)
    .bind(product_id)
    .bind(store_id)
    .execute(db)
    .await?;
    Ok(())
}

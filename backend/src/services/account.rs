//! Account and ledger queries
//!
//! Read side of the accounting engine: account listings with the read-time
//! kind projection, raw posting queries and the per-document ledger view.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::models::{effective_kind, AccountKind};

use crate::error::{AppError, AppResult};
use crate::models::ListCriteria;

/// Account service for balances and ledgers
#[derive(Clone)]
pub struct AccountService {
    db: PgPool,
}

/// Stored account row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub store_id: Uuid,
    /// Role key, unique per store (`cash`, `customer_receivable:{id}`, ...)
    pub code: String,
    pub name: String,
    pub kind: String,
    pub reference_model: Option<String>,
    pub reference_id: Option<Uuid>,
    pub debit_total: Decimal,
    pub credit_total: Decimal,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn kind_parsed(&self) -> AccountKind {
        AccountKind::parse(&self.kind).unwrap_or(AccountKind::Asset)
    }

    /// Kind after the customer debtor/creditor projection.
    pub fn effective_kind(&self) -> AccountKind {
        effective_kind(
            self.kind_parsed(),
            self.reference_model.as_deref(),
            self.debit_total,
            self.credit_total,
        )
    }
}

/// Account as reported to clients, with the projected kind alongside the
/// stored one.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    #[serde(flatten)]
    pub account: Account,
    pub effective_kind: &'static str,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        let effective_kind = account.effective_kind().as_str();
        Self {
            account,
            effective_kind,
        }
    }
}

/// Stored posting row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Posting {
    pub id: Uuid,
    pub store_id: Uuid,
    pub account_id: Uuid,
    pub reference_kind: String,
    pub reference_id: Uuid,
    pub reference_serial: String,
    pub debit: Decimal,
    pub credit: Decimal,
    pub entry_date: NaiveDate,
    /// Account balance right after this posting was applied
    pub post_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Ledger view: postings of one source document
#[derive(Debug, Clone, Serialize)]
pub struct LedgerRow {
    pub reference_kind: String,
    pub reference_id: Uuid,
    pub reference_serial: String,
    pub entry_date: NaiveDate,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub postings: Vec<Posting>,
}

#[derive(Debug, FromRow)]
struct LedgerGroupRow {
    reference_kind: String,
    reference_id: Uuid,
    reference_serial: String,
    entry_date: NaiveDate,
    total_debit: Decimal,
    total_credit: Decimal,
}

impl AccountService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// List accounts for a store
    pub async fn list(&self, criteria: &ListCriteria) -> AppResult<(Vec<AccountView>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let q = criteria
            .q
            .as_ref()
            .map(|q| format!("%{}%", q))
            .unwrap_or_else(|| "%".to_string());

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM accounts WHERE store_id = $1 AND (name ILIKE $2 OR code ILIKE $2)",
        )
        .bind(store_id)
        .bind(&q)
        .fetch_one(&self.db)
        .await?;

        let accounts = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, store_id, code, name, kind, reference_model, reference_id,
                   debit_total, credit_total, balance, created_at, updated_at
            FROM accounts
            WHERE store_id = $1 AND (name ILIKE $2 OR code ILIKE $2)
            ORDER BY code ASC, created_at ASC, id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(store_id)
        .bind(&q)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((
            accounts.into_iter().map(AccountView::from).collect(),
            total as u64,
        ))
    }

    /// Get one account
    pub async fn get(&self, store_id: Uuid, account_id: Uuid) -> AppResult<AccountView> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT id, store_id, code, name, kind, reference_model, reference_id,
                   debit_total, credit_total, balance, created_at, updated_at
            FROM accounts
            WHERE id = $1 AND store_id = $2
            "#,
        )
        .bind(account_id)
        .bind(store_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

        Ok(account.into())
    }

    /// List postings, filterable by account and date range
    pub async fn postings(&self, criteria: &ListCriteria) -> AppResult<(Vec<Posting>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let from = criteria
            .from_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        let to = criteria
            .to_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM postings
            WHERE store_id = $1
              AND ($2::uuid IS NULL OR account_id = $2)
              AND entry_date BETWEEN $3 AND $4
            "#,
        )
        .bind(store_id)
        .bind(criteria.account_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.db)
        .await?;

        let order = criteria.sort_order().as_sql();
        let postings = sqlx::query_as::<_, Posting>(&format!(
            r#"
            SELECT id, store_id, account_id, reference_kind, reference_id, reference_serial,
                   debit, credit, entry_date, post_balance, created_at
            FROM postings
            WHERE store_id = $1
              AND ($2::uuid IS NULL OR account_id = $2)
              AND entry_date BETWEEN $3 AND $4
            ORDER BY entry_date {order}, created_at {order}, id {order}
            LIMIT $5 OFFSET $6
            "#,
            order = order
        ))
        .bind(store_id)
        .bind(criteria.account_id)
        .bind(from)
        .bind(to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok((postings, total as u64))
    }

    /// Ledger view: postings grouped per source document, newest first
    pub async fn ledger(&self, criteria: &ListCriteria) -> AppResult<(Vec<LedgerRow>, u64)> {
        let store_id = criteria.require_store()?;
        let pagination = criteria.pagination();
        let from = criteria
            .from_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        let to = criteria
            .to_date
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT (reference_kind, reference_id)) FROM postings
            WHERE store_id = $1 AND entry_date BETWEEN $2 AND $3
            "#,
        )
        .bind(store_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.db)
        .await?;

        let groups = sqlx::query_as::<_, LedgerGroupRow>(
            r#"
            SELECT reference_kind, reference_id, reference_serial,
                   MIN(entry_date) AS entry_date,
                   COALESCE(SUM(debit), 0) AS total_debit,
                   COALESCE(SUM(credit), 0) AS total_credit
            FROM postings
            WHERE store_id = $1 AND entry_date BETWEEN $2 AND $3
            GROUP BY reference_kind, reference_id, reference_serial
            ORDER BY MIN(created_at) DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(store_id)
        .bind(from)
        .bind(to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let ids: Vec<Uuid> = groups.iter().map(|g| g.reference_id).collect();
        let postings = sqlx::query_as::<_, Posting>(
            r#"
            SELECT id, store_id, account_id, reference_kind, reference_id, reference_serial,
                   debit, credit, entry_date, post_balance, created_at
            FROM postings
            WHERE store_id = $1 AND reference_id = ANY($2)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(store_id)
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        let rows = groups
            .into_iter()
            .map(|group| {
                let detail: Vec<Posting> = postings
                    .iter()
                    .filter(|p| {
                        p.reference_id == group.reference_id
                            && p.reference_kind == group.reference_kind
                    })
                    .cloned()
                    .collect();
                LedgerRow {
                    reference_kind: group.reference_kind,
                    reference_id: group.reference_id,
                    reference_serial: group.reference_serial,
                    entry_date: group.entry_date,
                    total_debit: group.total_debit,
                    total_credit: group.total_credit,
                    postings: detail,
                }
            })
            .collect();

        Ok((rows, total as u64))
    }
}

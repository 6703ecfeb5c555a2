//! Accounting engine
//!
//! Translates business documents into postings and maintains account running
//! totals. Posting and unposting run inside one database transaction each,
//! so account totals never drift from the postings that drive them.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use shared::journal::{self, AccountRole, Leg, Side};
use shared::models::{signed_balance, AccountKind, DocumentKind};

use crate::config::AccountingConfig;
use crate::error::{AppError, AppResult};

/// Reference of a document inside the ledger.
#[derive(Debug, Clone)]
pub struct DocumentRef {
    pub kind: DocumentKind,
    pub id: Uuid,
    pub serial: String,
}

/// A document the engine can derive postings from.
pub trait Postable: Send + Sync {
    fn store_id(&self) -> Uuid;
    fn document_ref(&self) -> DocumentRef;
    fn entry_date(&self) -> NaiveDate;
    fn legs(&self) -> Result<Vec<Leg>, shared::JournalError>;
}

#[derive(Debug, sqlx::FromRow)]
struct AccountTotalsRow {
    id: Uuid,
    kind: String,
    debit_total: Decimal,
    credit_total: Decimal,
}

/// The engine. Cheap to clone; shares the pool.
#[derive(Clone)]
pub struct AccountingService {
    db: PgPool,
    retry_attempts: u32,
    retry_backoff_ms: u64,
}

impl AccountingService {
    pub fn new(db: PgPool, config: &AccountingConfig) -> Self {
        Self {
            db,
            retry_attempts: config.retry_attempts,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Derive and persist the postings of a document, updating account
    /// totals in the same transaction.
    pub async fn post<D: Postable>(&self, doc: &D) -> AppResult<()> {
        let legs = doc.legs()?;
        journal::check_balanced(&legs)
            .map_err(|e| AppError::AccountingInvariant(e.to_string()))?;
        if legs.is_empty() {
            return Ok(());
        }

        let document_ref = doc.document_ref();
        self.with_retries(|| self.post_once(doc, &document_ref, &legs))
            .await
    }

    /// Remove the postings of a document and roll its totals back out of the
    /// accounts. A document that was never posted is a no-op.
    pub async fn unpost(&self, store_id: Uuid, kind: DocumentKind, doc_id: Uuid) -> AppResult<()> {
        self.with_retries(|| self.unpost_once(store_id, kind, doc_id))
            .await
    }

    /// Re-derive after an edit: undo what the old snapshot posted, post the
    /// new state.
    pub async fn repost<D: Postable>(&self, old_ref: &DocumentRef, doc: &D) -> AppResult<()> {
        self.unpost(doc.store_id(), old_ref.kind, old_ref.id).await?;
        self.post(doc).await
    }

    /// Keep reference-account names in sync when a customer or vendor is
    /// renamed.
    pub async fn rename_reference_accounts(
        &self,
        store_id: Uuid,
        reference_model: &str,
        reference_id: Uuid,
        name: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE accounts SET name = $1, updated_at = NOW()
            WHERE store_id = $2 AND reference_model = $3 AND reference_id = $4
            "#,
        )
        .bind(name)
        .bind(store_id)
        .bind(reference_model)
        .bind(reference_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn post_once(
        &self,
        doc: &dyn Postable,
        document_ref: &DocumentRef,
        legs: &[Leg],
    ) -> AppResult<()> {
        let store_id = doc.store_id();
        let entry_date = doc.entry_date();
        let mut tx = self.db.begin().await?;

        // Accounts are locked in key order so concurrent documents touching
        // the same accounts cannot deadlock
        let mut legs: Vec<&Leg> = legs.iter().collect();
        legs.sort_by_key(|leg| leg.role.key());

        let mut debits = Decimal::ZERO;
        let mut credits = Decimal::ZERO;

        for leg in legs {
            let account = self.resolve_account(&mut tx, store_id, &leg.role).await?;
            let kind = AccountKind::parse(&account.kind).unwrap_or(AccountKind::Asset);

            let (debit, credit) = match leg.side {
                Side::Debit => (leg.amount, Decimal::ZERO),
                Side::Credit => (Decimal::ZERO, leg.amount),
            };
            debits += debit;
            credits += credit;

            let new_debit_total = account.debit_total + debit;
            let new_credit_total = account.credit_total + credit;
            let new_balance = signed_balance(kind, new_debit_total, new_credit_total);

            sqlx::query(
                r#"
                UPDATE accounts
                SET debit_total = $1, credit_total = $2, balance = $3, updated_at = NOW()
                WHERE id = $4
                "#,
            )
            .bind(new_debit_total)
            .bind(new_credit_total)
            .bind(new_balance)
            .bind(account.id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO postings (
                    store_id, account_id, reference_kind, reference_id, reference_serial,
                    debit, credit, entry_date, post_balance
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(store_id)
            .bind(account.id)
            .bind(document_ref.kind.as_str())
            .bind(document_ref.id)
            .bind(&document_ref.serial)
            .bind(debit)
            .bind(credit)
            .bind(entry_date)
            .bind(new_balance)
            .execute(&mut *tx)
            .await?;
        }

        // The derivation already checked, but never commit an unbalanced
        // document
        if debits != credits {
            return Err(AppError::AccountingInvariant(format!(
                "document {} posted {} debit vs {} credit",
                document_ref.serial, debits, credits
            )));
        }

        tx.commit().await?;
        tracing::debug!(
            store = %store_id,
            document = %document_ref.serial,
            amount = %debits,
            "posted document"
        );
        Ok(())
    }

    async fn unpost_once(
        &self,
        store_id: Uuid,
        kind: DocumentKind,
        doc_id: Uuid,
    ) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let sums = sqlx::query_as::<_, (Uuid, Decimal, Decimal)>(
            r#"
            SELECT account_id, COALESCE(SUM(debit), 0), COALESCE(SUM(credit), 0)
            FROM postings
            WHERE store_id = $1 AND reference_kind = $2 AND reference_id = $3
            GROUP BY account_id
            "#,
        )
        .bind(store_id)
        .bind(kind.as_str())
        .bind(doc_id)
        .fetch_all(&mut *tx)
        .await?;

        // Undo of a never-posted document is a no-op
        if sums.is_empty() {
            return Ok(());
        }

        for (account_id, debit_sum, credit_sum) in &sums {
            let account = sqlx::query_as::<_, AccountTotalsRow>(
                "SELECT id, kind, debit_total, credit_total FROM accounts WHERE id = $1 FOR UPDATE",
            )
            .bind(account_id)
            .fetch_one(&mut *tx)
            .await?;
            let kind = AccountKind::parse(&account.kind).unwrap_or(AccountKind::Asset);

            let new_debit_total = account.debit_total - debit_sum;
            let new_credit_total = account.credit_total - credit_sum;
            let new_balance = signed_balance(kind, new_debit_total, new_credit_total);

            sqlx::query(
                r#"
                UPDATE accounts
                SET debit_total = $1, credit_total = $2, balance = $3, updated_at = NOW()
                WHERE id = $4
                "#,
            )
            .bind(new_debit_total)
            .bind(new_credit_total)
            .bind(new_balance)
            .bind(account.id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "DELETE FROM postings WHERE store_id = $1 AND reference_kind = $2 AND reference_id = $3",
        )
        .bind(store_id)
        .bind(kind.as_str())
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Find the account backing a role, creating it on first use. The row is
    /// locked for the rest of the transaction so concurrent postings to the
    /// same account serialize at the database.
    async fn resolve_account(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        store_id: Uuid,
        role: &AccountRole,
    ) -> AppResult<AccountTotalsRow> {
        let code = role.key();

        if let Some(account) = sqlx::query_as::<_, AccountTotalsRow>(
            "SELECT id, kind, debit_total, credit_total FROM accounts WHERE store_id = $1 AND code = $2 FOR UPDATE",
        )
        .bind(store_id)
        .bind(&code)
        .fetch_optional(&mut **tx)
        .await?
        {
            return Ok(account);
        }

        // Name reference accounts after the entity they track
        let name = match role.reference() {
            Some((model, reference_id)) => {
                let table = match model {
                    "customers" => "customers",
                    _ => "vendors",
                };
                sqlx::query_scalar::<_, String>(&format!(
                    "SELECT name FROM {} WHERE id = $1 AND store_id = $2",
                    table
                ))
                .bind(reference_id)
                .bind(store_id)
                .fetch_optional(&mut **tx)
                .await?
                .unwrap_or_else(|| role.default_name())
            }
            None => role.default_name(),
        };

        let (reference_model, reference_id) = match role.reference() {
            Some((model, id)) => (Some(model), Some(id)),
            None => (None, None),
        };

        let account = sqlx::query_as::<_, AccountTotalsRow>(
            r#"
            INSERT INTO accounts (store_id, code, name, kind, reference_model, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (store_id, code) DO UPDATE SET updated_at = NOW()
            RETURNING id, kind, debit_total, credit_total
            "#,
        )
        .bind(store_id)
        .bind(&code)
        .bind(&name)
        .bind(role.kind().as_str())
        .bind(reference_model)
        .bind(reference_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(account)
    }

    /// Run a posting transaction, retrying transient database failures with
    /// exponential backoff. Each attempt is a fresh transaction; a rolled
    /// back attempt leaves totals unchanged.
    async fn with_retries<F, Fut>(&self, operation: F) -> AppResult<()>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = AppResult<()>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.retry_attempts && is_transient(&err) => {
                    attempt += 1;
                    let backoff =
                        Duration::from_millis(self.retry_backoff_ms << (attempt - 1).min(8));
                    tracing::warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient failure while posting, retrying: {}",
                        err
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Failures worth retrying: connection-level problems, not constraint or
/// business errors.
fn is_transient(err: &AppError) -> bool {
    match err {
        AppError::Database(sqlx::Error::Io(_))
        | AppError::Database(sqlx::Error::PoolTimedOut)
        | AppError::Database(sqlx::Error::PoolClosed) => true,
        _ => false,
    }
}

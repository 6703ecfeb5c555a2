//! Account classification rules

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Double-entry account classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
    Dividend,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
            AccountKind::Equity => "equity",
            AccountKind::Revenue => "revenue",
            AccountKind::Expense => "expense",
            AccountKind::Dividend => "dividend",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asset" => Some(AccountKind::Asset),
            "liability" => Some(AccountKind::Liability),
            "equity" => Some(AccountKind::Equity),
            "revenue" => Some(AccountKind::Revenue),
            "expense" => Some(AccountKind::Expense),
            "dividend" => Some(AccountKind::Dividend),
            _ => None,
        }
    }

    /// Debit-normal accounts grow with debits, the rest with credits.
    pub fn is_debit_normal(&self) -> bool {
        matches!(
            self,
            AccountKind::Asset | AccountKind::Expense | AccountKind::Dividend
        )
    }
}

/// Balance of an account with the sign convention of its kind.
pub fn signed_balance(kind: AccountKind, debit_total: Decimal, credit_total: Decimal) -> Decimal {
    if kind.is_debit_normal() {
        debit_total - credit_total
    } else {
        credit_total - debit_total
    }
}

/// Read-time reclassification of customer accounts.
///
/// A customer account whose running balance is credit-dominant is reported
/// as a liability (the customer is a creditor); otherwise it stays an asset.
/// This is a projection over the totals, never a stored mutation.
pub fn effective_kind(
    kind: AccountKind,
    reference_model: Option<&str>,
    debit_total: Decimal,
    credit_total: Decimal,
) -> AccountKind {
    if reference_model == Some("customers") {
        if credit_total > debit_total {
            AccountKind::Liability
        } else {
            AccountKind::Asset
        }
    } else {
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn signed_balance_per_kind() {
        assert_eq!(
            signed_balance(AccountKind::Asset, dec("100"), dec("30")),
            dec("70")
        );
        assert_eq!(
            signed_balance(AccountKind::Liability, dec("30"), dec("100")),
            dec("70")
        );
        assert_eq!(
            signed_balance(AccountKind::Revenue, dec("0"), dec("200")),
            dec("200")
        );
    }

    #[test]
    fn customer_account_reclassifies_on_credit_balance() {
        // Debtor customer stays an asset
        assert_eq!(
            effective_kind(AccountKind::Asset, Some("customers"), dec("500"), dec("200")),
            AccountKind::Asset
        );
        // Customer in credit (deposits exceed invoices) becomes a liability
        assert_eq!(
            effective_kind(AccountKind::Asset, Some("customers"), dec("200"), dec("500")),
            AccountKind::Liability
        );
        // Non-customer accounts keep their stored kind
        assert_eq!(
            effective_kind(AccountKind::Liability, Some("vendors"), dec("900"), dec("100")),
            AccountKind::Liability
        );
        assert_eq!(
            effective_kind(AccountKind::Revenue, None, dec("900"), dec("100")),
            AccountKind::Revenue
        );
    }
}

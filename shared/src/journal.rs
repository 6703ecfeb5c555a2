//! Double-entry journal derivation
//!
//! Translates business documents into balanced sets of debit/credit legs.
//! Each leg names a logical account role; resolving roles to stored accounts
//! and persisting postings is the back-end's job. Keeping the derivation
//! pure lets the balance invariants be property-tested without a database.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AccountKind, PaymentMethod};
use crate::money::Totals;

/// Derivation failures.
#[derive(Debug, Error, PartialEq)]
pub enum JournalError {
    #[error("journal is unbalanced: debits {debits} != credits {credits}")]
    Unbalanced { debits: Decimal, credits: Decimal },

    #[error("settlement method {method} needs a {expected} on the document")]
    MissingCounterparty {
        method: &'static str,
        expected: &'static str,
    },

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("settlement method {0} is not valid for this document")]
    InvalidMethod(&'static str),
}

/// Debit or credit side of a leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Debit,
    Credit,
}

/// Logical account a leg attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "role", content = "reference")]
pub enum AccountRole {
    Cash,
    Bank,
    VatPayable,
    VatReceivable,
    SalesRevenue,
    SalesReturns,
    Inventory,
    CostOfGoodsSold,
    CustomerReceivable(Uuid),
    VendorPayable(Uuid),
    Capital,
    Dividend,
    Expense(String),
}

impl AccountRole {
    /// Stable lookup key, unique per store.
    pub fn key(&self) -> String {
        match self {
            AccountRole::Cash => "cash".to_string(),
            AccountRole::Bank => "bank".to_string(),
            AccountRole::VatPayable => "vat_payable".to_string(),
            AccountRole::VatReceivable => "vat_receivable".to_string(),
            AccountRole::SalesRevenue => "sales_revenue".to_string(),
            AccountRole::SalesReturns => "sales_returns".to_string(),
            AccountRole::Inventory => "inventory".to_string(),
            AccountRole::CostOfGoodsSold => "cost_of_goods_sold".to_string(),
            AccountRole::CustomerReceivable(id) => format!("customer_receivable:{}", id),
            AccountRole::VendorPayable(id) => format!("vendor_payable:{}", id),
            AccountRole::Capital => "capital".to_string(),
            AccountRole::Dividend => "dividend".to_string(),
            AccountRole::Expense(category) => format!("expense:{}", category),
        }
    }

    /// Account class created for the role when it does not exist yet.
    pub fn kind(&self) -> AccountKind {
        match self {
            AccountRole::Cash
            | AccountRole::Bank
            | AccountRole::VatReceivable
            | AccountRole::Inventory
            | AccountRole::CustomerReceivable(_) => AccountKind::Asset,
            AccountRole::VatPayable | AccountRole::VendorPayable(_) => AccountKind::Liability,
            AccountRole::SalesRevenue | AccountRole::SalesReturns => AccountKind::Revenue,
            AccountRole::CostOfGoodsSold | AccountRole::Expense(_) => AccountKind::Expense,
            AccountRole::Capital => AccountKind::Equity,
            AccountRole::Dividend => AccountKind::Dividend,
        }
    }

    /// Referenced legal entity, if the role is tied to one.
    pub fn reference(&self) -> Option<(&'static str, Uuid)> {
        match self {
            AccountRole::CustomerReceivable(id) => Some(("customers", *id)),
            AccountRole::VendorPayable(id) => Some(("vendors", *id)),
            _ => None,
        }
    }

    /// Display name used when the account is auto-created. Accounts tied to
    /// a customer or vendor are named after the entity by the caller.
    pub fn default_name(&self) -> String {
        match self {
            AccountRole::Cash => "Cash".to_string(),
            AccountRole::Bank => "Bank".to_string(),
            AccountRole::VatPayable => "VAT Payable".to_string(),
            AccountRole::VatReceivable => "VAT Receivable".to_string(),
            AccountRole::SalesRevenue => "Sales Revenue".to_string(),
            AccountRole::SalesReturns => "Sales Returns".to_string(),
            AccountRole::Inventory => "Inventory".to_string(),
            AccountRole::CostOfGoodsSold => "Cost of Goods Sold".to_string(),
            AccountRole::CustomerReceivable(_) => "Customer".to_string(),
            AccountRole::VendorPayable(_) => "Vendor".to_string(),
            AccountRole::Capital => "Capital".to_string(),
            AccountRole::Dividend => "Dividend".to_string(),
            AccountRole::Expense(category) => format!("Expense: {}", category),
        }
    }
}

/// One debit-or-credit line of a derived journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub role: AccountRole,
    pub side: Side,
    pub amount: Decimal,
}

impl Leg {
    pub fn debit(role: AccountRole, amount: Decimal) -> Self {
        Self {
            role,
            side: Side::Debit,
            amount,
        }
    }

    pub fn credit(role: AccountRole, amount: Decimal) -> Self {
        Self {
            role,
            side: Side::Credit,
            amount,
        }
    }
}

/// Total debits and credits across a set of legs.
pub fn totals(legs: &[Leg]) -> (Decimal, Decimal) {
    legs.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(debits, credits), leg| match leg.side {
            Side::Debit => (debits + leg.amount, credits),
            Side::Credit => (debits, credits + leg.amount),
        },
    )
}

/// Assert the fundamental invariant: total debits equal total credits.
pub fn check_balanced(legs: &[Leg]) -> Result<(), JournalError> {
    let (debits, credits) = totals(legs);
    if debits == credits {
        Ok(())
    } else {
        Err(JournalError::Unbalanced { debits, credits })
    }
}

/// Drop zero-amount legs. A posting carries exactly one positive side, so a
/// zero VAT line simply produces no posting.
fn keep_nonzero(legs: Vec<Leg>) -> Vec<Leg> {
    legs.into_iter()
        .filter(|leg| leg.amount != Decimal::ZERO)
        .collect()
}

/// Resolve where the money side of a customer-facing document settles.
fn customer_settlement(
    method: PaymentMethod,
    customer_id: Option<Uuid>,
) -> Result<AccountRole, JournalError> {
    match method {
        PaymentMethod::Cash => Ok(AccountRole::Cash),
        PaymentMethod::Bank => Ok(AccountRole::Bank),
        PaymentMethod::CustomerAccount => customer_id
            .map(AccountRole::CustomerReceivable)
            .ok_or(JournalError::MissingCounterparty {
                method: "customer_account",
                expected: "customer",
            }),
        PaymentMethod::VendorAccount => Err(JournalError::MissingCounterparty {
            method: "vendor_account",
            expected: "customer",
        }),
    }
}

/// Resolve where the money side of a vendor-facing document settles.
fn vendor_settlement(
    method: PaymentMethod,
    vendor_id: Option<Uuid>,
) -> Result<AccountRole, JournalError> {
    match method {
        PaymentMethod::Cash => Ok(AccountRole::Cash),
        PaymentMethod::Bank => Ok(AccountRole::Bank),
        PaymentMethod::VendorAccount => {
            vendor_id
                .map(AccountRole::VendorPayable)
                .ok_or(JournalError::MissingCounterparty {
                    method: "vendor_account",
                    expected: "vendor",
                })
        }
        PaymentMethod::CustomerAccount => Err(JournalError::MissingCounterparty {
            method: "customer_account",
            expected: "vendor",
        }),
    }
}

fn positive(amount: Decimal) -> Result<Decimal, JournalError> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(JournalError::NonPositiveAmount(amount))
    }
}

/// Sales invoice: receivable or cash/bank takes the gross; revenue the net;
/// VAT payable the tax.
pub fn sales_legs(
    totals: &Totals,
    method: PaymentMethod,
    customer_id: Option<Uuid>,
) -> Result<Vec<Leg>, JournalError> {
    let settlement = customer_settlement(method, customer_id)?;
    let legs = vec![
        Leg::debit(settlement, totals.gross),
        Leg::credit(AccountRole::SalesRevenue, totals.net),
        Leg::credit(AccountRole::VatPayable, totals.vat),
    ];
    let legs = keep_nonzero(legs);
    check_balanced(&legs)?;
    Ok(legs)
}

/// Sales return: contra-revenue takes the net back, VAT payable is reduced
/// (debited), the settlement side refunds the gross.
pub fn sales_return_legs(
    totals: &Totals,
    method: PaymentMethod,
    customer_id: Option<Uuid>,
) -> Result<Vec<Leg>, JournalError> {
    let settlement = customer_settlement(method, customer_id)?;
    let legs = vec![
        Leg::debit(AccountRole::SalesReturns, totals.net),
        Leg::debit(AccountRole::VatPayable, totals.vat),
        Leg::credit(settlement, totals.gross),
    ];
    let legs = keep_nonzero(legs);
    check_balanced(&legs)?;
    Ok(legs)
}

/// Purchase: inventory at net, VAT receivable, payable or cash/bank gross.
pub fn purchase_legs(
    totals: &Totals,
    method: PaymentMethod,
    vendor_id: Option<Uuid>,
) -> Result<Vec<Leg>, JournalError> {
    let settlement = vendor_settlement(method, vendor_id)?;
    let legs = vec![
        Leg::debit(AccountRole::Inventory, totals.net),
        Leg::debit(AccountRole::VatReceivable, totals.vat),
        Leg::credit(settlement, totals.gross),
    ];
    let legs = keep_nonzero(legs);
    check_balanced(&legs)?;
    Ok(legs)
}

/// Purchase return: mirror of a purchase.
pub fn purchase_return_legs(
    totals: &Totals,
    method: PaymentMethod,
    vendor_id: Option<Uuid>,
) -> Result<Vec<Leg>, JournalError> {
    let settlement = vendor_settlement(method, vendor_id)?;
    let legs = vec![
        Leg::debit(settlement, totals.gross),
        Leg::credit(AccountRole::Inventory, totals.net),
        Leg::credit(AccountRole::VatReceivable, totals.vat),
    ];
    let legs = keep_nonzero(legs);
    check_balanced(&legs)?;
    Ok(legs)
}

/// Cash or bank; payments and vouchers move real money.
fn money_role(method: PaymentMethod) -> Result<AccountRole, JournalError> {
    match method {
        PaymentMethod::Cash => Ok(AccountRole::Cash),
        PaymentMethod::Bank => Ok(AccountRole::Bank),
        PaymentMethod::CustomerAccount => Err(JournalError::InvalidMethod("customer_account")),
        PaymentMethod::VendorAccount => Err(JournalError::InvalidMethod("vendor_account")),
    }
}

/// Payment received against a sales document.
pub fn sales_payment_legs(
    amount: Decimal,
    method: PaymentMethod,
    customer_id: Uuid,
) -> Result<Vec<Leg>, JournalError> {
    let amount = positive(amount)?;
    let legs = vec![
        Leg::debit(money_role(method)?, amount),
        Leg::credit(AccountRole::CustomerReceivable(customer_id), amount),
    ];
    check_balanced(&legs)?;
    Ok(legs)
}

/// Payment issued against a purchase document.
pub fn purchase_payment_legs(
    amount: Decimal,
    method: PaymentMethod,
    vendor_id: Uuid,
) -> Result<Vec<Leg>, JournalError> {
    let amount = positive(amount)?;
    let legs = vec![
        Leg::debit(AccountRole::VendorPayable(vendor_id), amount),
        Leg::credit(money_role(method)?, amount),
    ];
    check_balanced(&legs)?;
    Ok(legs)
}

/// Owner puts money in.
pub fn capital_legs(amount: Decimal, method: PaymentMethod) -> Result<Vec<Leg>, JournalError> {
    let amount = positive(amount)?;
    let legs = vec![
        Leg::debit(money_role(method)?, amount),
        Leg::credit(AccountRole::Capital, amount),
    ];
    check_balanced(&legs)?;
    Ok(legs)
}

/// Owner takes money out.
pub fn capital_withdrawal_legs(
    amount: Decimal,
    method: PaymentMethod,
) -> Result<Vec<Leg>, JournalError> {
    let amount = positive(amount)?;
    let legs = vec![
        Leg::debit(AccountRole::Capital, amount),
        Leg::credit(money_role(method)?, amount),
    ];
    check_balanced(&legs)?;
    Ok(legs)
}

/// Dividend paid out.
pub fn dividend_legs(amount: Decimal, method: PaymentMethod) -> Result<Vec<Leg>, JournalError> {
    let amount = positive(amount)?;
    let legs = vec![
        Leg::debit(AccountRole::Dividend, amount),
        Leg::credit(money_role(method)?, amount),
    ];
    check_balanced(&legs)?;
    Ok(legs)
}

/// Expense voucher: category expense at net, VAT receivable when a vendor
/// invoice backs it, settled in cash/bank or on the vendor account.
pub fn expense_legs(
    totals: &Totals,
    category: &str,
    method: PaymentMethod,
    vendor_id: Option<Uuid>,
) -> Result<Vec<Leg>, JournalError> {
    let settlement = vendor_settlement(method, vendor_id)?;
    let vat = if vendor_id.is_some() {
        totals.vat
    } else {
        Decimal::ZERO
    };
    let legs = vec![
        Leg::debit(AccountRole::Expense(category.to_string()), totals.gross - vat),
        Leg::debit(AccountRole::VatReceivable, vat),
        Leg::credit(settlement, totals.gross),
    ];
    let legs = keep_nonzero(legs);
    check_balanced(&legs)?;
    Ok(legs)
}

/// Customer pays money in ahead of invoices; a negative receivable is a
/// credit balance.
pub fn customer_deposit_legs(
    amount: Decimal,
    method: PaymentMethod,
    customer_id: Uuid,
) -> Result<Vec<Leg>, JournalError> {
    let amount = positive(amount)?;
    let legs = vec![
        Leg::debit(money_role(method)?, amount),
        Leg::credit(AccountRole::CustomerReceivable(customer_id), amount),
    ];
    check_balanced(&legs)?;
    Ok(legs)
}

/// Customer takes money back out. Posted uniformly regardless of whether
/// the customer currently holds a credit balance.
pub fn customer_withdrawal_legs(
    amount: Decimal,
    method: PaymentMethod,
    customer_id: Uuid,
) -> Result<Vec<Leg>, JournalError> {
    let amount = positive(amount)?;
    let legs = vec![
        Leg::debit(AccountRole::CustomerReceivable(customer_id), amount),
        Leg::credit(money_role(method)?, amount),
    ];
    check_balanced(&legs)?;
    Ok(legs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn totals(net: &str, vat: &str) -> Totals {
        Totals::new(dec(net), dec(vat))
    }

    #[test]
    fn cash_sale_balances_and_splits_vat() {
        let legs = sales_legs(&totals("200.00", "30.00"), PaymentMethod::Cash, None).unwrap();
        assert_eq!(legs.len(), 3);
        assert_eq!(legs[0], Leg::debit(AccountRole::Cash, dec("230.00")));
        assert_eq!(legs[1], Leg::credit(AccountRole::SalesRevenue, dec("200.00")));
        assert_eq!(legs[2], Leg::credit(AccountRole::VatPayable, dec("30.00")));
        assert!(check_balanced(&legs).is_ok());
    }

    #[test]
    fn credit_sale_debits_the_customer() {
        let customer = Uuid::new_v4();
        let legs = sales_legs(
            &totals("400.00", "60.00"),
            PaymentMethod::CustomerAccount,
            Some(customer),
        )
        .unwrap();
        assert_eq!(
            legs[0],
            Leg::debit(AccountRole::CustomerReceivable(customer), dec("460.00"))
        );
    }

    #[test]
    fn credit_sale_without_customer_is_rejected() {
        let err = sales_legs(&totals("100.00", "0"), PaymentMethod::CustomerAccount, None)
            .unwrap_err();
        assert!(matches!(err, JournalError::MissingCounterparty { .. }));
    }

    #[test]
    fn zero_vat_produces_no_vat_leg() {
        let legs = sales_legs(&totals("100.00", "0"), PaymentMethod::Cash, None).unwrap();
        assert_eq!(legs.len(), 2);
        assert!(legs
            .iter()
            .all(|leg| leg.role != AccountRole::VatPayable));
    }

    #[test]
    fn sales_return_debits_vat_payable() {
        let legs =
            sales_return_legs(&totals("200.00", "30.00"), PaymentMethod::Cash, None).unwrap();
        assert_eq!(legs[1], Leg::debit(AccountRole::VatPayable, dec("30.00")));
        assert_eq!(legs[2], Leg::credit(AccountRole::Cash, dec("230.00")));
        assert!(check_balanced(&legs).is_ok());
    }

    #[test]
    fn purchase_and_return_mirror_each_other() {
        let vendor = Uuid::new_v4();
        let t = totals("500.00", "75.00");
        let buy = purchase_legs(&t, PaymentMethod::VendorAccount, Some(vendor)).unwrap();
        let back = purchase_return_legs(&t, PaymentMethod::VendorAccount, Some(vendor)).unwrap();
        let (buy_dr, buy_cr) = super::totals(&buy);
        let (back_dr, back_cr) = super::totals(&back);
        assert_eq!(buy_dr, back_cr);
        assert_eq!(buy_cr, back_dr);
    }

    #[test]
    fn expense_without_vendor_carries_no_vat_receivable() {
        let legs = expense_legs(&totals("80.00", "12.00"), "rent", PaymentMethod::Cash, None)
            .unwrap();
        assert_eq!(legs.len(), 2);
        assert_eq!(
            legs[0],
            Leg::debit(AccountRole::Expense("rent".to_string()), dec("92.00"))
        );
        assert!(check_balanced(&legs).is_ok());
    }

    #[test]
    fn non_positive_voucher_amounts_are_rejected() {
        assert!(capital_legs(Decimal::ZERO, PaymentMethod::Cash).is_err());
        assert!(dividend_legs(dec("-5"), PaymentMethod::Cash).is_err());
    }
}

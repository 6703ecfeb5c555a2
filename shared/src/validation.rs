//! Input validation for documents
//!
//! Validation never panics and never throws: every check accumulates into a
//! field → message map, and callers short-circuit on a non-empty result.

use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{quantities_by_product, LineItem, PaymentMethod};

/// Field name → human-readable message.
pub type FieldErrors = HashMap<String, String>;

/// Record a failed check.
pub fn add_error(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors.entry(field.to_string()).or_insert_with(|| message.into());
}

/// Line items of a goods document: non-empty, positive quantities, prices
/// and VAT rates that are not negative, discounts within the line amount.
pub fn validate_line_items(items: &[LineItem]) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if items.is_empty() {
        add_error(&mut errors, "items", "at least one line item is required");
        return errors;
    }

    for (index, item) in items.iter().enumerate() {
        if item.quantity <= Decimal::ZERO {
            add_error(
                &mut errors,
                &format!("items[{}].quantity", index),
                "quantity must be positive",
            );
        }
        if item.unit_price < Decimal::ZERO {
            add_error(
                &mut errors,
                &format!("items[{}].unit_price", index),
                "unit price cannot be negative",
            );
        }
        if item.vat_percent < Decimal::ZERO {
            add_error(
                &mut errors,
                &format!("items[{}].vat_percent", index),
                "VAT percent cannot be negative",
            );
        }
        if item.discount < Decimal::ZERO {
            add_error(
                &mut errors,
                &format!("items[{}].discount", index),
                "discount cannot be negative",
            );
        } else if item.discount > item.quantity * item.unit_price {
            add_error(
                &mut errors,
                &format!("items[{}].discount", index),
                "discount exceeds the line amount",
            );
        }
    }

    errors
}

/// A return may not take back more than what was sold minus what earlier
/// returns already took back, per line.
pub fn validate_return_items(
    original_items: &[LineItem],
    already_returned: &HashMap<Uuid, Decimal>,
    return_items: &[LineItem],
) -> FieldErrors {
    let mut errors = validate_line_items(return_items);
    if !errors.is_empty() {
        return errors;
    }

    let sold = quantities_by_product(original_items);
    let returning = quantities_by_product(return_items);

    for (product_id, quantity) in &returning {
        let sold_quantity = sold.get(product_id).copied().unwrap_or(Decimal::ZERO);
        let taken = already_returned
            .get(product_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let remaining = sold_quantity - taken;
        if *quantity > remaining {
            add_error(
                &mut errors,
                "items",
                format!(
                    "return quantity {} for product {} exceeds the remaining {}",
                    quantity, product_id, remaining
                ),
            );
        }
    }

    errors
}

/// Payments against a document may not exceed its net total.
pub fn validate_payment_amount(
    document_total: Decimal,
    already_paid: Decimal,
    amount: Decimal,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if amount <= Decimal::ZERO {
        add_error(&mut errors, "amount", "amount must be positive");
        return errors;
    }
    if already_paid + amount > document_total {
        add_error(
            &mut errors,
            "amount",
            format!(
                "amount {} exceeds the open balance {}",
                amount,
                document_total - already_paid
            ),
        );
    }
    errors
}

/// Amount-driven vouchers: a strictly positive amount and a cash-or-bank
/// settlement method.
pub fn validate_voucher(amount: Decimal, method: PaymentMethod) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if amount <= Decimal::ZERO {
        add_error(&mut errors, "amount", "amount must be positive");
    }
    if method.is_on_account() {
        add_error(&mut errors, "method", "method must be cash or bank");
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(product_id: Uuid, qty: &str) -> LineItem {
        LineItem {
            product_id,
            name: "widget".to_string(),
            quantity: dec(qty),
            unit_price: dec("100.00"),
            discount: Decimal::ZERO,
            vat_percent: dec("15"),
        }
    }

    #[test]
    fn empty_items_are_rejected() {
        let errors = validate_line_items(&[]);
        assert!(errors.contains_key("items"));
    }

    #[test]
    fn over_return_is_rejected_per_line() {
        let product = Uuid::new_v4();
        let sold = vec![item(product, "2")];
        // Nothing returned yet, trying to return 3 of 2
        let errors = validate_return_items(&sold, &HashMap::new(), &[item(product, "3")]);
        assert!(errors.contains_key("items"));

        // 1 already returned, 1 more is fine, 2 more is not
        let mut taken = HashMap::new();
        taken.insert(product, dec("1"));
        assert!(validate_return_items(&sold, &taken, &[item(product, "1")]).is_empty());
        assert!(!validate_return_items(&sold, &taken, &[item(product, "2")]).is_empty());
    }

    #[test]
    fn payment_cannot_exceed_open_balance() {
        assert!(validate_payment_amount(dec("460.00"), dec("0"), dec("200.00")).is_empty());
        assert!(validate_payment_amount(dec("460.00"), dec("400.00"), dec("60.00")).is_empty());
        let errors = validate_payment_amount(dec("460.00"), dec("400.00"), dec("61.00"));
        assert!(errors.contains_key("amount"));
    }

    #[test]
    fn vouchers_need_positive_amount_and_money_method() {
        assert!(validate_voucher(dec("10.00"), PaymentMethod::Cash).is_empty());
        assert!(!validate_voucher(Decimal::ZERO, PaymentMethod::Cash).is_empty());
        assert!(!validate_voucher(dec("10.00"), PaymentMethod::CustomerAccount).is_empty());
    }
}

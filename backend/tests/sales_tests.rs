//! Sales pipeline rules
//!
//! Validation-level tests for the sales document family: over-returns,
//! payment caps, payment status derivation, stock restoration arithmetic
//! and the tax-authority series gate.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use shared::models::{
    build_return_items, quantities_by_product, series_open, LineItem, PaymentStatus,
    ReportingStatus, ReturnLine,
};
use shared::money::totals_of;
use shared::validation;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn line(product_id: Uuid, qty: &str, price: &str) -> LineItem {
    LineItem {
        product_id,
        name: "widget".to_string(),
        quantity: dec(qty),
        unit_price: dec(price),
        discount: Decimal::ZERO,
        vat_percent: dec("15"),
    }
}

#[cfg(test)]
mod return_tests {
    use super::*;

    /// S4: returning 3 of a 2-quantity line is rejected
    #[test]
    fn over_return_is_rejected() {
        let product = Uuid::new_v4();
        let sold = vec![line(product, "2", "100.00")];
        let attempted = vec![line(product, "3", "100.00")];

        let errors = validation::validate_return_items(&sold, &HashMap::new(), &attempted);
        assert!(!errors.is_empty());
    }

    /// Earlier returns shrink what is still returnable
    #[test]
    fn remaining_quantity_accounts_for_earlier_returns() {
        let product = Uuid::new_v4();
        let sold = vec![line(product, "5", "100.00")];
        let mut taken = HashMap::new();
        taken.insert(product, dec("3"));

        assert!(
            validation::validate_return_items(&sold, &taken, &[line(product, "2", "100.00")])
                .is_empty()
        );
        assert!(
            !validation::validate_return_items(&sold, &taken, &[line(product, "3", "100.00")])
                .is_empty()
        );
    }

    /// Return lines are always priced from the parent document
    #[test]
    fn return_items_inherit_parent_prices() {
        let product = Uuid::new_v4();
        let mut sold = line(product, "4", "250.00");
        sold.discount = dec("100.00");

        let items = build_return_items(
            &[sold],
            &[ReturnLine {
                product_id: product,
                quantity: dec("2"),
            }],
        )
        .unwrap();

        assert_eq!(items[0].unit_price, dec("250.00"));
        // Half the quantity carries half the discount
        assert_eq!(items[0].discount, dec("50.00"));
        assert_eq!(items[0].net(), dec("450.00"));
    }

    /// A product that was never on the parent cannot be returned
    #[test]
    fn unknown_product_is_rejected() {
        let product = Uuid::new_v4();
        let other = Uuid::new_v4();
        let result = build_return_items(
            &[line(product, "2", "10.00")],
            &[ReturnLine {
                product_id: other,
                quantity: dec("1"),
            }],
        );
        assert_eq!(result.unwrap_err(), other);
    }
}

#[cfg(test)]
mod payment_tests {
    use super::*;

    /// S2: payments derive the parent's status
    #[test]
    fn payment_status_follows_the_paid_share() {
        let total = dec("460.00");
        assert_eq!(PaymentStatus::derive(total, Decimal::ZERO), PaymentStatus::NotPaid);
        assert_eq!(PaymentStatus::derive(total, dec("200.00")), PaymentStatus::Partial);
        assert_eq!(PaymentStatus::derive(total, dec("460.00")), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::derive(total, dec("470.00")), PaymentStatus::Paid);
    }

    /// Payments may never exceed the open balance
    #[test]
    fn payments_are_capped_by_the_open_balance() {
        assert!(validation::validate_payment_amount(dec("460.00"), dec("200.00"), dec("260.00"))
            .is_empty());
        assert!(!validation::validate_payment_amount(dec("460.00"), dec("200.00"), dec("261.00"))
            .is_empty());
        assert!(!validation::validate_payment_amount(dec("460.00"), dec("0"), dec("0")).is_empty());
    }
}

#[cfg(test)]
mod stock_tests {
    use super::*;

    /// Invariant 7: deleting a sale restores stock to the exact pre-sale
    /// value (modeled over the per-product quantity map)
    #[test]
    fn delete_restores_stock_exactly() {
        let product_a = Uuid::new_v4();
        let product_b = Uuid::new_v4();
        let items = vec![
            line(product_a, "2", "100.00"),
            line(product_b, "7", "15.50"),
            line(product_a, "1", "100.00"),
        ];

        let mut stock: HashMap<Uuid, Decimal> = HashMap::new();
        stock.insert(product_a, dec("10"));
        stock.insert(product_b, dec("20"));
        let before = stock.clone();

        // Sale decrements per aggregated quantity
        for (product, quantity) in quantities_by_product(&items) {
            *stock.get_mut(&product).unwrap() -= quantity;
        }
        assert_eq!(stock[&product_a], dec("7"));
        assert_eq!(stock[&product_b], dec("13"));

        // Soft delete increments the same quantities back
        for (product, quantity) in quantities_by_product(&items) {
            *stock.get_mut(&product).unwrap() += quantity;
        }
        assert_eq!(stock, before);
    }
}

#[cfg(test)]
mod reporting_tests {
    use super::*;

    /// S5: the series stays closed until the previous document reported
    /// successfully
    #[test]
    fn series_blocks_on_unreported_predecessor() {
        // Empty series is open
        assert!(series_open(None));
        // Previous passed: open
        assert!(series_open(Some(ReportingStatus::Passed)));
        // Previous failed or still pending: closed
        assert!(!series_open(Some(ReportingStatus::Failed)));
        assert!(!series_open(Some(ReportingStatus::Pending)));
    }

    /// S5 continued: after a successful retry the next creation is allowed
    #[test]
    fn series_reopens_after_successful_retry() {
        let mut status = ReportingStatus::Failed;
        assert!(!series_open(Some(status)));

        // Retry succeeds
        status = ReportingStatus::Passed;
        assert!(series_open(Some(status)));
    }
}

proptest! {
    /// A full return of everything sold is always accepted; one unit more
    /// on any line never is.
    #[test]
    fn full_return_accepted_over_return_rejected(
        quantities in proptest::collection::vec(1i64..50, 1..5)
    ) {
        let items: Vec<LineItem> = quantities
            .iter()
            .map(|qty| line(Uuid::new_v4(), &qty.to_string(), "10.00"))
            .collect();

        let full = validation::validate_return_items(&items, &HashMap::new(), &items);
        prop_assert!(full.is_empty());

        let mut over = items.clone();
        over[0].quantity += Decimal::ONE;
        let rejected = validation::validate_return_items(&items, &HashMap::new(), &over);
        prop_assert!(!rejected.is_empty());
    }

    /// Returned totals never exceed the original document total when the
    /// return is built from parent prices and passes validation.
    #[test]
    fn validated_returns_never_exceed_the_original_amount(
        qty in 1i64..50,
        returned in 1i64..50,
        price_cents in 1i64..100_000,
    ) {
        let product = Uuid::new_v4();
        let sold = vec![LineItem {
            product_id: product,
            name: "p".to_string(),
            quantity: Decimal::from(qty),
            unit_price: Decimal::new(price_cents, 2),
            discount: Decimal::ZERO,
            vat_percent: dec("15"),
        }];

        let request = [ReturnLine { product_id: product, quantity: Decimal::from(returned) }];
        let items = build_return_items(&sold, &request).unwrap();
        let errors = validation::validate_return_items(&sold, &HashMap::new(), &items);

        if returned <= qty {
            prop_assert!(errors.is_empty());
            prop_assert!(totals_of(&items).gross <= totals_of(&sold).gross);
        } else {
            prop_assert!(!errors.is_empty());
        }
    }
}

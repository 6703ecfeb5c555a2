//! Monetary rounding and document totals
//!
//! Every multiplication or division of money goes through [`round`] so that
//! totals computed along different paths agree to the cent.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::models::LineItem;

/// Round to two decimals, half away from zero.
pub fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Net amount of a quantity at a unit price, minus a line discount.
pub fn line_net(quantity: Decimal, unit_price: Decimal, discount: Decimal) -> Decimal {
    round(quantity * unit_price - discount)
}

/// VAT amount for a net amount at a percentage rate.
pub fn vat_of(net: Decimal, vat_percent: Decimal) -> Decimal {
    round(net * vat_percent / Decimal::ONE_HUNDRED)
}

/// Net / VAT / gross totals of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
}

impl Totals {
    pub const ZERO: Totals = Totals {
        net: Decimal::ZERO,
        vat: Decimal::ZERO,
        gross: Decimal::ZERO,
    };

    pub fn new(net: Decimal, vat: Decimal) -> Self {
        Self {
            net,
            vat,
            gross: net + vat,
        }
    }
}

/// Sum line items into document totals. Each line is rounded on its own, so
/// the document total equals the sum of the printed line amounts.
pub fn totals_of(items: &[LineItem]) -> Totals {
    let mut net = Decimal::ZERO;
    let mut vat = Decimal::ZERO;
    for item in items {
        let line = item.net();
        net += line;
        vat += vat_of(line, item.vat_percent);
    }
    Totals::new(round(net), round(vat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item(qty: &str, price: &str, vat: &str) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            name: "item".to_string(),
            quantity: dec(qty),
            unit_price: dec(price),
            discount: Decimal::ZERO,
            vat_percent: dec(vat),
        }
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round(dec("1.005")), dec("1.01"));
        assert_eq!(round(dec("-1.005")), dec("-1.01"));
        assert_eq!(round(dec("2.344")), dec("2.34"));
    }

    #[test]
    fn totals_for_single_cash_sale_line() {
        // qty 2 at 100.00, VAT 15%
        let t = totals_of(&[item("2", "100.00", "15")]);
        assert_eq!(t.net, dec("200.00"));
        assert_eq!(t.vat, dec("30.00"));
        assert_eq!(t.gross, dec("230.00"));
    }

    #[test]
    fn discount_reduces_net_before_vat() {
        let mut i = item("1", "100.00", "15");
        i.discount = dec("20.00");
        let t = totals_of(&[i]);
        assert_eq!(t.net, dec("80.00"));
        assert_eq!(t.vat, dec("12.00"));
        assert_eq!(t.gross, dec("92.00"));
    }
}

//! Line items shared by quotations, sales, purchases and their returns

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money;

/// One line of a goods document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    /// Product display name captured at document time
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub vat_percent: Decimal,
}

impl LineItem {
    /// Net amount after discount.
    pub fn net(&self) -> Decimal {
        money::line_net(self.quantity, self.unit_price, self.discount)
    }

    /// VAT amount on the net.
    pub fn vat(&self) -> Decimal {
        money::vat_of(self.net(), self.vat_percent)
    }

    /// Net plus VAT.
    pub fn gross(&self) -> Decimal {
        self.net() + self.vat()
    }
}

/// Sum quantities per product across a set of line items.
///
/// Used when checking a return against what was originally sold and what
/// earlier returns already took back.
pub fn quantities_by_product(items: &[LineItem]) -> std::collections::HashMap<Uuid, Decimal> {
    let mut out = std::collections::HashMap::new();
    for item in items {
        *out.entry(item.product_id).or_insert(Decimal::ZERO) += item.quantity;
    }
    out
}

/// One line of a return request: which product and how much of it.
/// Prices always come from the parent document, never from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub product_id: Uuid,
    pub quantity: Decimal,
}

/// Build return line items priced from the parent document. The discount is
/// prorated by the returned share of the line. Unknown products are
/// rejected by returning the offending id.
pub fn build_return_items(
    parent_items: &[LineItem],
    lines: &[ReturnLine],
) -> Result<Vec<LineItem>, Uuid> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let parent = parent_items
            .iter()
            .find(|item| item.product_id == line.product_id)
            .ok_or(line.product_id)?;
        let discount = if parent.quantity > Decimal::ZERO {
            crate::money::round(parent.discount * line.quantity / parent.quantity)
        } else {
            Decimal::ZERO
        };
        out.push(LineItem {
            product_id: parent.product_id,
            name: parent.name.clone(),
            quantity: line.quantity,
            unit_price: parent.unit_price,
            discount,
            vat_percent: parent.vat_percent,
        });
    }
    Ok(out)
}

//! Invoice line item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for adding a line item to a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateLineItem {
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Fractional tax rate, e.g. 0.20 for 20%.
    pub tax_rate: Decimal,
    pub sort_order: i32,
}

/// Input for updating a line item on a draft invoice.
#[derive(Debug, Clone, Default)]
pub struct UpdateLineItem {
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub sort_order: Option<i32>,
}

impl CreateLineItem {
    /// Compute (subtotal, tax_amount, total) for this item.
    pub fn amounts(&self) -> (Decimal, Decimal, Decimal) {
        let subtotal = self.quantity * self.unit_price;
        let tax_amount = subtotal * self.tax_rate;
        (subtotal, tax_amount, subtotal + tax_amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_amounts_with_tax() {
        let item = CreateLineItem {
            tenant_id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            description: "Consulting".to_string(),
            quantity: dec("3"),
            unit_price: dec("100.00"),
            tax_rate: dec("0.20"),
            sort_order: 0,
        };
        let (subtotal, tax, total) = item.amounts();
        assert_eq!(subtotal, dec("300.00"));
        assert_eq!(tax, dec("60.00"));
        assert_eq!(total, dec("360.00"));
    }

    #[test]
    fn test_amounts_without_tax() {
        let item = CreateLineItem {
            tenant_id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            description: "Hosting".to_string(),
            quantity: dec("1"),
            unit_price: dec("49.99"),
            tax_rate: dec("0"),
            sort_order: 0,
        };
        let (subtotal, tax, total) = item.amounts();
        assert_eq!(subtotal, dec("49.99"));
        assert_eq!(tax, dec("0"));
        assert_eq!(total, dec("49.99"));
    }
}

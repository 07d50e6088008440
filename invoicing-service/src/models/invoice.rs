//! Invoice model for invoicing-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Viewed,
    Overdue,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Viewed => "viewed",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => InvoiceStatus::Sent,
            "viewed" => InvoiceStatus::Viewed,
            "overdue" => InvoiceStatus::Overdue,
            "paid" => InvoiceStatus::Paid,
            _ => InvoiceStatus::Draft,
        }
    }
}

/// Payment state, tracked separately from lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partial" => PaymentStatus::Partial,
            "paid" => PaymentStatus::Paid,
            _ => PaymentStatus::Unpaid,
        }
    }
}

/// Recurrence frequency for recurring invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringFrequency {
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl RecurringFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringFrequency::Weekly => "weekly",
            RecurringFrequency::Monthly => "monthly",
            RecurringFrequency::Quarterly => "quarterly",
            RecurringFrequency::Yearly => "yearly",
        }
    }

    /// Strict parse; an unknown frequency on a recurring invoice is a data
    /// error the generator must surface, not silently default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(RecurringFrequency::Weekly),
            "monthly" => Some(RecurringFrequency::Monthly),
            "quarterly" => Some(RecurringFrequency::Quarterly),
            "yearly" => Some(RecurringFrequency::Yearly),
            _ => None,
        }
    }
}

/// Outcome of applying a payment to an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentDecision {
    Applied {
        new_amount_paid: Decimal,
        payment_status: PaymentStatus,
    },
    NonPositiveAmount,
    /// Invoice is not in a payable lifecycle status.
    NotPayable,
    Overpayment {
        amount_due: Decimal,
    },
}

/// Decide how a payment lands on an invoice. Pure; the database layer
/// executes the resulting update.
pub fn apply_payment(
    status: &str,
    total: Decimal,
    amount_paid: Decimal,
    amount_due: Decimal,
    amount: Decimal,
) -> PaymentDecision {
    if amount <= Decimal::ZERO {
        return PaymentDecision::NonPositiveAmount;
    }
    if !matches!(status, "sent" | "viewed" | "overdue") {
        return PaymentDecision::NotPayable;
    }
    if amount > amount_due {
        return PaymentDecision::Overpayment { amount_due };
    }

    let new_amount_paid = amount_paid + amount;
    let payment_status = if new_amount_paid >= total {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Partial
    };

    PaymentDecision::Applied {
        new_amount_paid,
        payment_status,
    }
}

/// Invoice row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub invoice_number: String,
    pub status: String,
    pub payment_status: String,
    pub currency: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub notes: Option<String>,
    pub is_recurring: bool,
    pub recurring_frequency: Option<String>,
    pub recurring_end_date: Option<NaiveDate>,
    pub source_invoice_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub sent_utc: Option<DateTime<Utc>>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a draft invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub tenant_id: Uuid,
    pub client_id: Uuid,
    pub currency: String,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
    pub is_recurring: bool,
    pub recurring_frequency: Option<RecurringFrequency>,
    pub recurring_end_date: Option<NaiveDate>,
    pub metadata: Option<serde_json::Value>,
}

/// Input for updating a draft invoice.
#[derive(Debug, Clone, Default)]
pub struct UpdateInvoice {
    pub client_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub is_recurring: Option<bool>,
    pub recurring_frequency: Option<RecurringFrequency>,
    pub recurring_end_date: Option<NaiveDate>,
    pub metadata: Option<serde_json::Value>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in ["draft", "sent", "viewed", "overdue", "paid"] {
            assert_eq!(InvoiceStatus::from_string(s).as_str(), s);
        }
        assert_eq!(InvoiceStatus::from_string("bogus"), InvoiceStatus::Draft);
    }

    #[test]
    fn test_frequency_parse_is_strict() {
        assert_eq!(
            RecurringFrequency::parse("monthly"),
            Some(RecurringFrequency::Monthly)
        );
        assert_eq!(RecurringFrequency::parse("fortnightly"), None);
        assert_eq!(RecurringFrequency::parse(""), None);
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_payment_moves_unpaid_to_partial() {
        let decision = apply_payment("sent", dec("100"), dec("0"), dec("100"), dec("40"));
        assert_eq!(
            decision,
            PaymentDecision::Applied {
                new_amount_paid: dec("40"),
                payment_status: PaymentStatus::Partial,
            }
        );
    }

    #[test]
    fn test_final_payment_moves_partial_to_paid() {
        let decision = apply_payment("viewed", dec("100"), dec("40"), dec("60"), dec("60"));
        assert_eq!(
            decision,
            PaymentDecision::Applied {
                new_amount_paid: dec("100"),
                payment_status: PaymentStatus::Paid,
            }
        );
    }

    #[test]
    fn test_overpayment_is_rejected() {
        let decision = apply_payment("overdue", dec("100"), dec("40"), dec("60"), dec("60.01"));
        assert_eq!(
            decision,
            PaymentDecision::Overpayment {
                amount_due: dec("60")
            }
        );
    }

    #[test]
    fn test_non_positive_amounts_are_rejected() {
        for amount in ["0", "-5"] {
            let decision = apply_payment("sent", dec("100"), dec("0"), dec("100"), dec(amount));
            assert_eq!(decision, PaymentDecision::NonPositiveAmount);
        }
    }

    #[test]
    fn test_payments_require_an_issued_invoice() {
        for status in ["draft", "paid"] {
            let decision = apply_payment(status, dec("100"), dec("0"), dec("100"), dec("50"));
            assert_eq!(decision, PaymentDecision::NotPayable);
        }
    }
}

//! Debt collection case model.
//!
//! A case tracks the recovery workflow for one overdue invoice. Status and
//! priority are plain strings with no automatic transitions; progress is
//! recorded through free-text activity entries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Case priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl CasePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            CasePriority::Low => "low",
            CasePriority::Medium => "medium",
            CasePriority::High => "high",
            CasePriority::Urgent => "urgent",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "low" => CasePriority::Low,
            "high" => CasePriority::High,
            "urgent" => CasePriority::Urgent,
            _ => CasePriority::Medium,
        }
    }
}

/// Case status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    InProgress,
    Escalated,
    Resolved,
    WrittenOff,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::InProgress => "in_progress",
            CaseStatus::Escalated => "escalated",
            CaseStatus::Resolved => "resolved",
            CaseStatus::WrittenOff => "written_off",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "in_progress" => CaseStatus::InProgress,
            "escalated" => CaseStatus::Escalated,
            "resolved" => CaseStatus::Resolved,
            "written_off" => CaseStatus::WrittenOff,
            _ => CaseStatus::Pending,
        }
    }
}

/// Debt collection case row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DebtCase {
    pub case_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub priority: String,
    pub status: String,
    pub amount_collected: Decimal,
    pub next_action_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Activity entry on a case, append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DebtCaseActivity {
    pub activity_id: Uuid,
    pub case_id: Uuid,
    pub tenant_id: Uuid,
    pub activity_type: String,
    pub note: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for opening a case.
#[derive(Debug, Clone)]
pub struct CreateDebtCase {
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub priority: CasePriority,
    pub next_action_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Input for updating a case.
#[derive(Debug, Clone, Default)]
pub struct UpdateDebtCase {
    pub priority: Option<CasePriority>,
    pub status: Option<CaseStatus>,
    pub amount_collected: Option<Decimal>,
    pub next_action_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Filter parameters for listing cases.
#[derive(Debug, Clone, Default)]
pub struct ListDebtCasesFilter {
    pub status: Option<CaseStatus>,
    pub priority: Option<CasePriority>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

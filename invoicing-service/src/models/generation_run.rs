//! Recurring generation run bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// What started a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTrigger {
    Scheduled,
    Manual,
}

impl GenerationTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationTrigger::Scheduled => "scheduled",
            GenerationTrigger::Manual => "manual",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "manual" => GenerationTrigger::Manual,
            _ => GenerationTrigger::Scheduled,
        }
    }
}

/// Generation run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationRunStatus {
    Running,
    Completed,
    Failed,
}

impl GenerationRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationRunStatus::Running => "running",
            GenerationRunStatus::Completed => "completed",
            GenerationRunStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "completed" => GenerationRunStatus::Completed,
            "failed" => GenerationRunStatus::Failed,
            _ => GenerationRunStatus::Running,
        }
    }
}

/// Outcome for one source invoice within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// A new invoice was cloned.
    Created(Uuid),
    /// Recurrence end date reached; flag cleared, nothing cloned.
    Stopped,
    /// Processing failed; the batch continues.
    Failed(String),
}

impl GenerationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationOutcome::Created(_) => "created",
            GenerationOutcome::Stopped => "stopped",
            GenerationOutcome::Failed(_) => "failed",
        }
    }
}

/// Generation run row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationRun {
    pub run_id: Uuid,
    pub run_type: String,
    pub status: String,
    pub started_utc: DateTime<Utc>,
    pub completed_utc: Option<DateTime<Utc>>,
    pub invoices_processed: i32,
    pub invoices_succeeded: i32,
    pub invoices_failed: i32,
    pub error_message: Option<String>,
}

/// Per-invoice result row within a run.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationRunResult {
    pub result_id: Uuid,
    pub run_id: Uuid,
    pub source_invoice_id: Uuid,
    pub new_invoice_id: Option<Uuid>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_utc: DateTime<Utc>,
}

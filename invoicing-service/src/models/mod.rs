//! Domain models for invoicing-service.

mod client;
mod debt_collection;
mod generation_run;
mod invoice;
mod line_item;

pub use client::{Client, CreateClient, ListClientsFilter, UpdateClient};
pub use debt_collection::{
    CasePriority, CaseStatus, CreateDebtCase, DebtCase, DebtCaseActivity, ListDebtCasesFilter,
    UpdateDebtCase,
};
pub use generation_run::{
    GenerationOutcome, GenerationRun, GenerationRunResult, GenerationRunStatus, GenerationTrigger,
};
pub use invoice::{
    apply_payment, CreateInvoice, Invoice, InvoiceStatus, ListInvoicesFilter, PaymentDecision,
    PaymentStatus, RecurringFrequency, UpdateInvoice,
};
pub use line_item::{CreateLineItem, LineItem, UpdateLineItem};

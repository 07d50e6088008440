//! Recurring invoice generation.
//!
//! Scans for recurring invoices whose due date has arrived, clones each as a
//! fresh draft for the next billing period, and advances the source's due
//! date. Each invoice is processed in isolation: a failure is recorded on the
//! run and the batch continues.

use crate::config::WorkerConfig;
use crate::models::{
    GenerationOutcome, GenerationRun, GenerationRunStatus, GenerationTrigger, Invoice,
    RecurringFrequency,
};
use crate::services::metrics::{GENERATION_RESULTS_TOTAL, GENERATION_RUN_DURATION};
use crate::services::Database;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{Days, Months, NaiveDate, Utc};
use service_core::error::AppError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Advance a due date by one billing period.
///
/// Month-based periods clamp to the last day of the target month, so an
/// end-of-month invoice stays end-of-month (Jan 31 -> Feb 29 in a leap year).
pub fn advance_due_date(due_date: NaiveDate, frequency: RecurringFrequency) -> NaiveDate {
    match frequency {
        RecurringFrequency::Weekly => due_date + Days::new(7),
        RecurringFrequency::Monthly => due_date + Months::new(1),
        RecurringFrequency::Quarterly => due_date + Months::new(3),
        RecurringFrequency::Yearly => due_date + Months::new(12),
    }
}

/// What the generator should do with one due recurring invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrencePlan {
    /// The next period would pass the end date; clear the flag, clone nothing.
    Exhausted,
    /// Clone for `next_due`. When `final_period` is set the flag is cleared
    /// in the same update, since no further period fits before the end date.
    Continue {
        next_due: NaiveDate,
        final_period: bool,
    },
}

pub fn plan_recurrence(
    due_date: NaiveDate,
    frequency: RecurringFrequency,
    end_date: Option<NaiveDate>,
) -> RecurrencePlan {
    let next_due = advance_due_date(due_date, frequency);

    match end_date {
        Some(end) if next_due > end => RecurrencePlan::Exhausted,
        Some(end) => RecurrencePlan::Continue {
            next_due,
            final_period: advance_due_date(next_due, frequency) > end,
        },
        None => RecurrencePlan::Continue {
            next_due,
            final_period: false,
        },
    }
}

/// Clones due recurring invoices and keeps run bookkeeping.
#[derive(Clone)]
pub struct RecurringGenerator {
    db: Database,
}

impl RecurringGenerator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Execute one generation pass over all due recurring invoices.
    #[instrument(skip(self), fields(trigger = trigger.as_str()))]
    pub async fn run(&self, trigger: GenerationTrigger) -> Result<GenerationRun, AppError> {
        let timer = GENERATION_RUN_DURATION
            .with_label_values(&[trigger.as_str()])
            .start_timer();

        let today = Utc::now().date_naive();
        let run = self.db.create_generation_run(trigger).await?;

        // Transient DB errors on the batch fetch are retried; a persistent
        // failure closes the run as failed.
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let due = retry(backoff, || async {
            self.db
                .find_due_recurring_invoices(today)
                .await
                .map_err(backoff::Error::transient)
        })
        .await;

        let due = match due {
            Ok(due) => due,
            Err(e) => {
                error!(run_id = %run.run_id, error = %e, "Failed to fetch due recurring invoices");
                let closed = self
                    .db
                    .complete_generation_run(
                        run.run_id,
                        GenerationRunStatus::Failed,
                        0,
                        0,
                        0,
                        Some(&e.to_string()),
                    )
                    .await?;
                timer.observe_duration();
                return closed.ok_or_else(|| {
                    AppError::InternalError(anyhow::anyhow!("Generation run disappeared"))
                });
            }
        };

        info!(run_id = %run.run_id, due_count = due.len(), "Generation run started");

        let mut processed = 0i32;
        let mut succeeded = 0i32;
        let mut failed = 0i32;

        for invoice in &due {
            processed += 1;

            let outcome = match self.process_invoice(invoice, today).await {
                Ok(outcome) => outcome,
                Err(e) => GenerationOutcome::Failed(e.to_string()),
            };

            GENERATION_RESULTS_TOTAL
                .with_label_values(&[outcome.as_str()])
                .inc();

            match &outcome {
                GenerationOutcome::Created(new_id) => {
                    succeeded += 1;
                    info!(
                        source_invoice_id = %invoice.invoice_id,
                        new_invoice_id = %new_id,
                        "Generated next-period invoice"
                    );
                }
                GenerationOutcome::Stopped => {
                    succeeded += 1;
                    info!(
                        source_invoice_id = %invoice.invoice_id,
                        "Recurrence window exhausted, flag cleared"
                    );
                }
                GenerationOutcome::Failed(msg) => {
                    failed += 1;
                    warn!(
                        source_invoice_id = %invoice.invoice_id,
                        error = %msg,
                        "Generation failed for invoice, continuing batch"
                    );
                }
            }

            if let Err(e) = self
                .db
                .create_generation_run_result(run.run_id, invoice.invoice_id, &outcome)
                .await
            {
                error!(run_id = %run.run_id, error = %e, "Failed to record run result");
            }
        }

        let status = if failed > 0 && succeeded == 0 && processed > 0 {
            GenerationRunStatus::Failed
        } else {
            GenerationRunStatus::Completed
        };

        let closed = self
            .db
            .complete_generation_run(run.run_id, status, processed, succeeded, failed, None)
            .await?;

        timer.observe_duration();

        info!(
            run_id = %run.run_id,
            processed = processed,
            succeeded = succeeded,
            failed = failed,
            "Generation run finished"
        );

        closed.ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Generation run disappeared")))
    }

    /// Handle one due recurring invoice: clone, copy items, advance recurrence.
    async fn process_invoice(
        &self,
        invoice: &Invoice,
        today: NaiveDate,
    ) -> Result<GenerationOutcome, AppError> {
        let frequency = invoice
            .recurring_frequency
            .as_deref()
            .and_then(RecurringFrequency::parse)
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Recurring invoice {} has invalid frequency {:?}",
                    invoice.invoice_id,
                    invoice.recurring_frequency
                ))
            })?;

        match plan_recurrence(invoice.due_date, frequency, invoice.recurring_end_date) {
            RecurrencePlan::Exhausted => {
                self.db.stop_recurrence(invoice.invoice_id).await?;
                Ok(GenerationOutcome::Stopped)
            }
            RecurrencePlan::Continue {
                next_due,
                final_period,
            } => {
                let clone = self.db.clone_invoice(invoice, today, next_due).await?;

                // Compensate on item-copy failure so no empty clone survives.
                if let Err(e) = self
                    .db
                    .copy_line_items(invoice.tenant_id, invoice.invoice_id, clone.invoice_id)
                    .await
                {
                    if let Err(cleanup_err) =
                        self.db.delete_invoice_unchecked(clone.invoice_id).await
                    {
                        error!(
                            invoice_id = %clone.invoice_id,
                            error = %cleanup_err,
                            "Failed to delete partially created invoice"
                        );
                    }
                    return Err(e);
                }

                self.db
                    .advance_recurrence(invoice.invoice_id, next_due, final_period)
                    .await?;

                Ok(GenerationOutcome::Created(clone.invoice_id))
            }
        }
    }
}

/// Periodic generation loop. Runs until the shutdown token fires.
pub async fn start_generation_worker(
    db: Database,
    config: WorkerConfig,
    shutdown: CancellationToken,
) {
    if !config.enabled {
        info!("Recurring generation worker disabled by configuration");
        return;
    }

    let generator = RecurringGenerator::new(db);
    let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        interval_secs = config.interval_secs,
        "Recurring generation worker started"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Recurring generation worker shutting down");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = generator.run(GenerationTrigger::Scheduled).await {
                    error!(error = %e, "Scheduled generation run failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekly_advances_seven_days() {
        assert_eq!(
            advance_due_date(date(2026, 3, 25), RecurringFrequency::Weekly),
            date(2026, 4, 1)
        );
    }

    #[test]
    fn test_monthly_mid_month() {
        assert_eq!(
            advance_due_date(date(2026, 3, 15), RecurringFrequency::Monthly),
            date(2026, 4, 15)
        );
    }

    #[test]
    fn test_monthly_clamps_to_leap_february() {
        assert_eq!(
            advance_due_date(date(2024, 1, 31), RecurringFrequency::Monthly),
            date(2024, 2, 29)
        );
    }

    #[test]
    fn test_monthly_clamps_to_common_february() {
        assert_eq!(
            advance_due_date(date(2023, 1, 31), RecurringFrequency::Monthly),
            date(2023, 2, 28)
        );
    }

    #[test]
    fn test_quarterly_clamps_across_quarter() {
        assert_eq!(
            advance_due_date(date(2024, 11, 30), RecurringFrequency::Quarterly),
            date(2025, 2, 28)
        );
    }

    #[test]
    fn test_yearly_from_leap_day() {
        assert_eq!(
            advance_due_date(date(2024, 2, 29), RecurringFrequency::Yearly),
            date(2025, 2, 28)
        );
    }

    #[test]
    fn test_plan_exhausted_when_next_due_passes_end() {
        let plan = plan_recurrence(
            date(2026, 3, 31),
            RecurringFrequency::Monthly,
            Some(date(2026, 4, 15)),
        );
        assert_eq!(plan, RecurrencePlan::Exhausted);
    }

    #[test]
    fn test_plan_continues_without_end_date() {
        let plan = plan_recurrence(date(2026, 3, 31), RecurringFrequency::Monthly, None);
        assert_eq!(
            plan,
            RecurrencePlan::Continue {
                next_due: date(2026, 4, 30),
                final_period: false,
            }
        );
    }

    #[test]
    fn test_plan_marks_final_period() {
        // Next due fits, but the one after passes the end date.
        let plan = plan_recurrence(
            date(2026, 3, 31),
            RecurringFrequency::Monthly,
            Some(date(2026, 5, 15)),
        );
        assert_eq!(
            plan,
            RecurrencePlan::Continue {
                next_due: date(2026, 4, 30),
                final_period: true,
            }
        );
    }

    #[test]
    fn test_plan_allows_next_due_on_end_date() {
        let plan = plan_recurrence(
            date(2026, 3, 30),
            RecurringFrequency::Monthly,
            Some(date(2026, 4, 30)),
        );
        assert_eq!(
            plan,
            RecurrencePlan::Continue {
                next_due: date(2026, 4, 30),
                final_period: true,
            }
        );
    }
}

//! Reminder/overdue scanner
//!
//! Two daily sweeps over the installment ledger: one reminds borrowers of
//! upcoming due dates, the other flips grace-expired installments to
//! overdue, accrues fines, and sends overdue notices. Both run from a cron
//! schedule and from admin endpoints through the same code path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::Config;
use crate::installment::{Installment, InstallmentService};
use crate::notification::{NotificationSender, OverdueDetails, ReminderDetails};
use crate::payment::PaymentService;

/// Outcome counters for one sweep run
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Sweep service for reminder and overdue processing
#[derive(Clone)]
pub struct SweepService {
    installment_service: InstallmentService,
    payment_service: PaymentService,
    notifier: Arc<dyn NotificationSender>,
    reminder_days_before_due: i64,
    max_reminders: i32,
    min_hours_between_reminders: i64,
    item_delay: Duration,
    portal_base_url: String,
}

impl SweepService {
    /// Create a new sweep service instance
    pub fn new(
        installment_service: InstallmentService,
        payment_service: PaymentService,
        notifier: Arc<dyn NotificationSender>,
        config: &Config,
    ) -> Self {
        Self {
            installment_service,
            payment_service,
            notifier,
            reminder_days_before_due: config.reminder_days_before_due,
            max_reminders: config.max_reminders,
            min_hours_between_reminders: config.min_hours_between_reminders,
            item_delay: Duration::from_millis(config.sweep_item_delay_ms),
            portal_base_url: config.portal_base_url.clone(),
        }
    }

    /// Remind borrowers whose pending installments fall due within the
    /// reminder window. One bad installment never aborts the sweep.
    pub async fn run_reminder_sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let candidates = self
            .installment_service
            .find_reminder_candidates(
                now,
                self.reminder_days_before_due,
                self.max_reminders,
                self.min_hours_between_reminders,
            )
            .await?;

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        tracing::info!(candidates = candidates.len(), "Reminder sweep started");

        for installment in &candidates {
            match self.send_reminder(installment).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        installment_id = %installment.id,
                        error = %e,
                        "Reminder failed for installment"
                    );
                }
            }
            // Rate-limit outbound email/gateway calls
            tokio::time::sleep(self.item_delay).await;
        }

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            "Reminder sweep finished"
        );

        Ok(report)
    }

    /// Flip grace-expired installments to overdue, accrue fines, and send
    /// overdue notices, up to twice the reminder cap per installment.
    pub async fn run_overdue_sweep(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let candidates = self
            .installment_service
            .find_overdue_candidates(now, self.max_reminders)
            .await?;

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        tracing::info!(candidates = candidates.len(), "Overdue sweep started");

        for installment in &candidates {
            match self.process_overdue(installment).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        installment_id = %installment.id,
                        error = %e,
                        "Overdue processing failed for installment"
                    );
                }
            }
            tokio::time::sleep(self.item_delay).await;
        }

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            "Overdue sweep finished"
        );

        Ok(report)
    }

    async fn send_reminder(&self, installment: &Installment) -> Result<()> {
        let payment_url = self.payment_link(installment).await;
        let now = Utc::now();
        let days_until_due = (installment.due_date - now).num_days();

        let result = self
            .notifier
            .send_installment_reminder(
                installment.borrower_id,
                ReminderDetails {
                    installment_number: installment.installment_number,
                    amount: installment.amount,
                    due_date: installment.due_date,
                    days_until_due,
                    payment_url,
                },
            )
            .await;

        if let Err(e) = result {
            tracing::warn!(
                installment_id = %installment.id,
                error = %e,
                "Reminder notification could not be delivered"
            );
        }

        self.installment_service
            .record_reminder_sent(&installment.id, now)
            .await?;

        Ok(())
    }

    async fn process_overdue(&self, installment: &Installment) -> Result<()> {
        let now = Utc::now();
        let change = self.installment_service.accrue_fine(&installment.id, now).await?;
        let current = change.current;

        let payment_url = self.payment_link(&current).await;

        let result = self
            .notifier
            .send_overdue_notice(
                current.borrower_id,
                OverdueDetails {
                    installment_number: current.installment_number,
                    amount: current.amount,
                    fine_amount: current.fine_amount,
                    total_due: current.total_due,
                    days_overdue: current.days_overdue as i64,
                    payment_url,
                },
            )
            .await;

        if let Err(e) = result {
            tracing::warn!(
                installment_id = %current.id,
                error = %e,
                "Overdue notice could not be delivered"
            );
        }

        self.installment_service
            .record_reminder_sent(&current.id, now)
            .await?;

        Ok(())
    }

    /// Best-effort payment link: failure to create a session never blocks
    /// sending the notice for that installment.
    async fn payment_link(&self, installment: &Installment) -> Option<String> {
        let success_url = format!("{}/payments/success", self.portal_base_url);
        let cancel_url = format!("{}/payments/cancel", self.portal_base_url);

        match self
            .payment_service
            .create_session_for_sweep(installment, &success_url, &cancel_url)
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(
                    installment_id = %installment.id,
                    error = %e,
                    "Could not create payment session for sweep notice"
                );
                None
            }
        }
    }
}

/// Wire both sweeps onto the cron scheduler. The returned scheduler must
/// be kept alive for the jobs to fire.
pub async fn start_scheduler(config: &Config, sweeps: Arc<SweepService>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let reminder_sweeps = sweeps.clone();
    scheduler
        .add(Job::new_async(
            config.reminder_sweep_cron.as_str(),
            move |_id, _lock| {
                let sweeps = reminder_sweeps.clone();
                Box::pin(async move {
                    if let Err(e) = sweeps.run_reminder_sweep().await {
                        tracing::error!(error = %e, "Scheduled reminder sweep failed");
                    }
                })
            },
        )?)
        .await?;

    let overdue_sweeps = sweeps.clone();
    scheduler
        .add(Job::new_async(
            config.overdue_sweep_cron.as_str(),
            move |_id, _lock| {
                let sweeps = overdue_sweeps.clone();
                Box::pin(async move {
                    if let Err(e) = sweeps.run_overdue_sweep().await {
                        tracing::error!(error = %e, "Scheduled overdue sweep failed");
                    }
                })
            },
        )?)
        .await?;

    scheduler.start().await?;

    tracing::info!(
        reminder_cron = %config.reminder_sweep_cron,
        overdue_cron = %config.overdue_sweep_cron,
        "Sweep scheduler started"
    );

    Ok(scheduler)
}

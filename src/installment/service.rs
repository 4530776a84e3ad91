//! Installment ledger service - owns installment records and transitions

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::amortization::AmortizationSchedule;
use crate::error::{ApiError, ApiResult};
use crate::installment::{compute_fine, Installment, InstallmentStatus};

/// Previous and new state of an installment after a ledger mutation, so
/// callers (loan aggregate, notifications) can react to the transition.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub previous: Installment,
    pub current: Installment,
}

/// Ledger service for installment records
#[derive(Clone)]
pub struct InstallmentService {
    db_pool: PgPool,
}

impl InstallmentService {
    /// Create a new installment service instance
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Bulk-insert the full schedule for a loan, each installment starting
    /// at PENDING with no fine. Runs on the caller's transaction so a
    /// colliding ordinal aborts the whole batch - the unique index on
    /// (loan_id, installment_number) is the atomicity guarantee.
    pub async fn create_schedule(
        &self,
        conn: &mut PgConnection,
        loan_id: Uuid,
        borrower_id: Uuid,
        schedule: &AmortizationSchedule,
    ) -> ApiResult<Vec<Installment>> {
        let mut installments = Vec::with_capacity(schedule.entries.len());

        for entry in &schedule.entries {
            let installment = sqlx::query_as::<_, Installment>(
                r#"
                INSERT INTO installments (
                    id, loan_id, borrower_id, installment_number, amount,
                    fine_amount, total_due, due_date, grace_period_end,
                    status, reminders_sent, days_overdue, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, 0, $5, $6, $7, $8, 0, 0, $9, $9)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(loan_id)
            .bind(borrower_id)
            .bind(entry.installment_number)
            .bind(schedule.monthly_installment)
            .bind(entry.due_date)
            .bind(entry.grace_period_end)
            .bind(InstallmentStatus::Pending)
            .bind(Utc::now())
            .fetch_one(&mut *conn)
            .await?;

            installments.push(installment);
        }

        Ok(installments)
    }

    /// Get an installment by ID
    pub async fn get_installment(&self, id: &Uuid) -> ApiResult<Installment> {
        let installment =
            sqlx::query_as::<_, Installment>("SELECT * FROM installments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;

        installment.ok_or_else(|| ApiError::NotFound(format!("Installment {} not found", id)))
    }

    /// List all installments for a loan in schedule order
    pub async fn list_for_loan(&self, loan_id: &Uuid) -> ApiResult<Vec<Installment>> {
        let installments = sqlx::query_as::<_, Installment>(
            "SELECT * FROM installments WHERE loan_id = $1 ORDER BY installment_number",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(installments)
    }

    /// Accrue the overdue fine on an installment as of `as_of`.
    ///
    /// The fine only ever grows (GREATEST guards against a re-run with a
    /// skewed clock shrinking an assessed fine), and the status check is
    /// part of the UPDATE itself so a concurrent payment settling the
    /// installment cannot be overwritten.
    pub async fn accrue_fine(&self, id: &Uuid, as_of: DateTime<Utc>) -> ApiResult<StatusChange> {
        let previous = self.get_installment(id).await?;

        if previous.status.is_settled() {
            return Ok(StatusChange {
                current: previous.clone(),
                previous,
            });
        }

        if as_of <= previous.grace_period_end {
            return Ok(StatusChange {
                current: previous.clone(),
                previous,
            });
        }

        let assessment = compute_fine(previous.amount, previous.grace_period_end, as_of);

        let updated = sqlx::query_as::<_, Installment>(
            r#"
            UPDATE installments
            SET fine_amount = GREATEST(fine_amount, $2),
                total_due = amount + GREATEST(fine_amount, $2),
                days_overdue = GREATEST(days_overdue, $3),
                status = CASE
                    WHEN status = 'pending' THEN 'overdue'::installment_status
                    ELSE status
                END,
                updated_at = $4
            WHERE id = $1 AND status NOT IN ('paid', 'waived')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(assessment.fine_amount)
        .bind(assessment.days_overdue as i32)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        match updated {
            Some(current) => {
                if previous.status == InstallmentStatus::Pending {
                    tracing::info!(
                        installment_id = %id,
                        days_overdue = assessment.days_overdue,
                        fine = assessment.fine_amount,
                        "Installment moved to overdue"
                    );
                }
                Ok(StatusChange { previous, current })
            }
            // Settled by a concurrent payment between the read and the
            // update; the conditional guard made this a no-op.
            None => {
                let current = self.get_installment(id).await?;
                Ok(StatusChange { previous, current })
            }
        }
    }

    /// Mark an installment as paid. The status check runs inside the UPDATE
    /// (compare-and-swap) so two concurrent deliveries of the same gateway
    /// event cannot both settle it. Fails with `InvalidTransition` when the
    /// installment is already settled.
    pub async fn mark_paid(
        &self,
        conn: &mut PgConnection,
        id: &Uuid,
        paid_at: DateTime<Utc>,
        payment_intent_id: Option<&str>,
    ) -> ApiResult<Installment> {
        let updated = sqlx::query_as::<_, Installment>(
            r#"
            UPDATE installments
            SET status = 'paid',
                paid_at = $2,
                gateway_payment_intent_id = $3,
                gateway_session_id = NULL,
                updated_at = $4
            WHERE id = $1 AND status NOT IN ('paid', 'waived')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(paid_at)
        .bind(payment_intent_id)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?;

        match updated {
            Some(installment) => Ok(installment),
            None => {
                let existing =
                    sqlx::query_as::<_, Installment>("SELECT * FROM installments WHERE id = $1")
                        .bind(id)
                        .fetch_optional(&mut *conn)
                        .await?;

                match existing {
                    Some(installment) => Err(ApiError::InvalidTransition(format!(
                        "Installment {} is already {:?}",
                        id, installment.status
                    ))),
                    None => Err(ApiError::NotFound(format!("Installment {} not found", id))),
                }
            }
        }
    }

    /// Waive the fine on an installment (admin action, reason required).
    ///
    /// Allowed from any state except PAID. Clears the fine and resets
    /// total_due to the base amount. A pre-due (still PENDING) installment
    /// moves to WAIVED; an already-overdue one stays OVERDUE but becomes
    /// fine-free and remains collectible.
    pub async fn waive_fine(&self, id: &Uuid, reason: &str) -> ApiResult<StatusChange> {
        let previous = self.get_installment(id).await?;

        if previous.status == InstallmentStatus::Paid {
            return Err(ApiError::InvalidTransition(format!(
                "Installment {} is already paid; nothing to waive",
                id
            )));
        }

        let current = sqlx::query_as::<_, Installment>(
            r#"
            UPDATE installments
            SET fine_amount = 0,
                total_due = amount,
                status = CASE
                    WHEN status = 'pending' THEN 'waived'::installment_status
                    ELSE status
                END,
                notes = CONCAT_WS(E'\n', notes, $2),
                updated_at = $3
            WHERE id = $1 AND status <> 'paid'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(format!("Fine waived: {}", reason))
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::InvalidTransition(format!("Installment {} was paid concurrently", id))
        })?;

        tracing::info!(
            installment_id = %id,
            waived_fine = previous.fine_amount,
            reason = %reason,
            "Fine waived"
        );

        Ok(StatusChange { previous, current })
    }

    /// Persist the gateway session id on an installment, replacing any
    /// prior session. Only the most recent session is considered live.
    pub async fn attach_session(&self, id: &Uuid, session_id: &str) -> ApiResult<()> {
        sqlx::query(
            "UPDATE installments SET gateway_session_id = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(session_id)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    /// Record that a reminder or overdue notice went out
    pub async fn record_reminder_sent(&self, id: &Uuid, now: DateTime<Utc>) -> ApiResult<()> {
        sqlx::query(
            r#"
            UPDATE installments
            SET reminders_sent = reminders_sent + 1,
                last_reminder_at = $2,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    /// Pending installments whose due date falls within the reminder window
    /// and which are under the reminder cap and past the cool-down.
    pub async fn find_reminder_candidates(
        &self,
        now: DateTime<Utc>,
        days_before_due: i64,
        max_reminders: i32,
        min_hours_between: i64,
    ) -> ApiResult<Vec<Installment>> {
        let window_end = now + Duration::days(days_before_due);
        let cooldown_cutoff = now - Duration::hours(min_hours_between);

        let installments = sqlx::query_as::<_, Installment>(
            r#"
            SELECT * FROM installments
            WHERE status = 'pending'
              AND due_date <= $1
              AND reminders_sent < $2
              AND (last_reminder_at IS NULL OR last_reminder_at <= $3)
            ORDER BY due_date
            "#,
        )
        .bind(window_end)
        .bind(max_reminders)
        .bind(cooldown_cutoff)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(installments)
    }

    /// Unsettled installments whose grace period expired and which are
    /// still under the overdue notice cap (twice the reminder cap).
    pub async fn find_overdue_candidates(
        &self,
        now: DateTime<Utc>,
        max_reminders: i32,
    ) -> ApiResult<Vec<Installment>> {
        let installments = sqlx::query_as::<_, Installment>(
            r#"
            SELECT * FROM installments
            WHERE status IN ('pending', 'overdue')
              AND grace_period_end < $1
              AND reminders_sent < $2
            ORDER BY grace_period_end
            "#,
        )
        .bind(now)
        .bind(max_reminders * 2)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(installments)
    }
}

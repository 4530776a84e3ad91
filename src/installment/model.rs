//! Installment models and fine accrual math

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Daily fine rate in percent of the installment amount
pub const DAILY_FINE_PERCENT: i64 = 1;

/// Fine cap in percent of the installment amount
pub const MAX_FINE_PERCENT: i64 = 10;

/// Installment status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "installment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstallmentStatus {
    Pending,
    Overdue,
    Paid,
    Defaulted,
    Waived,
}

impl InstallmentStatus {
    /// A settled installment is immutable: no payment, fine, or session
    /// may be applied to it.
    pub fn is_settled(&self) -> bool {
        matches!(self, InstallmentStatus::Paid | InstallmentStatus::Waived)
    }
}

/// Installment model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Installment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub borrower_id: Uuid,
    pub installment_number: i32,
    pub amount: i64,
    pub fine_amount: i64,
    pub total_due: i64,
    pub due_date: DateTime<Utc>,
    pub grace_period_end: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status: InstallmentStatus,
    pub gateway_session_id: Option<String>,
    pub gateway_payment_intent_id: Option<String>,
    pub reminders_sent: i32,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub days_overdue: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a fine computation for one installment at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineAssessment {
    pub days_overdue: i64,
    pub fine_amount: i64,
}

/// Compute the fine owed on an installment amount at `as_of`.
///
/// Zero until the grace period has fully elapsed; afterwards 1% of the
/// installment amount per whole day overdue, capped at 10%. Partial days
/// do not count.
pub fn compute_fine(
    amount: i64,
    grace_period_end: DateTime<Utc>,
    as_of: DateTime<Utc>,
) -> FineAssessment {
    if as_of <= grace_period_end {
        return FineAssessment {
            days_overdue: 0,
            fine_amount: 0,
        };
    }

    let days_overdue = (as_of - grace_period_end).num_days();
    let capped_percent = (days_overdue * DAILY_FINE_PERCENT).min(MAX_FINE_PERCENT);

    FineAssessment {
        days_overdue,
        fine_amount: amount * capped_percent / 100,
    }
}

impl Installment {
    /// Whether the grace period has expired at `now`
    pub fn grace_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.grace_period_end
    }

    /// Reminder sweep eligibility: pending, due within the reminder window,
    /// under the reminder cap, and past the cool-down since the last one.
    pub fn reminder_eligible(
        &self,
        now: DateTime<Utc>,
        days_before_due: i64,
        max_reminders: i32,
        min_hours_between: i64,
    ) -> bool {
        if self.status != InstallmentStatus::Pending {
            return false;
        }
        if self.due_date > now + Duration::days(days_before_due) {
            return false;
        }
        if self.reminders_sent >= max_reminders {
            return false;
        }
        match self.last_reminder_at {
            Some(last) => now - last >= Duration::hours(min_hours_between),
            None => true,
        }
    }

    /// Overdue sweep eligibility: unsettled, grace expired, and under the
    /// overdue notice cap (twice the reminder cap).
    pub fn overdue_eligible(&self, now: DateTime<Utc>, max_reminders: i32) -> bool {
        matches!(
            self.status,
            InstallmentStatus::Pending | InstallmentStatus::Overdue
        ) && self.grace_expired(now)
            && self.reminders_sent < max_reminders * 2
    }
}

/// Request to waive the fine on an installment (admin action)
#[derive(Debug, Deserialize)]
pub struct WaiveFineRequest {
    pub reason: String,
}

impl WaiveFineRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("A reason is required to waive a fine".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grace_end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 7, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_no_fine_at_grace_boundary() {
        let assessment = compute_fine(9025, grace_end(), grace_end());
        assert_eq!(assessment.days_overdue, 0);
        assert_eq!(assessment.fine_amount, 0);
    }

    #[test]
    fn test_fine_one_day_past_grace() {
        let assessment = compute_fine(9025, grace_end(), grace_end() + Duration::days(1));
        assert_eq!(assessment.days_overdue, 1);
        assert_eq!(assessment.fine_amount, 90); // 1% of 9025, truncated
    }

    #[test]
    fn test_fine_three_days_past_grace() {
        let assessment = compute_fine(9025, grace_end(), grace_end() + Duration::days(3));
        assert_eq!(assessment.days_overdue, 3);
        assert_eq!(assessment.fine_amount, 270); // 3% of 9025, truncated
    }

    #[test]
    fn test_fine_caps_at_ten_percent() {
        let at_cap = compute_fine(9025, grace_end(), grace_end() + Duration::days(10));
        let past_cap = compute_fine(9025, grace_end(), grace_end() + Duration::days(45));
        assert_eq!(at_cap.fine_amount, 902);
        assert_eq!(past_cap.fine_amount, 902);
        assert_eq!(past_cap.days_overdue, 45);
    }

    #[test]
    fn test_partial_day_does_not_count() {
        let assessment = compute_fine(9025, grace_end(), grace_end() + Duration::hours(20));
        assert_eq!(assessment.days_overdue, 0);
        assert_eq!(assessment.fine_amount, 0);
    }

    #[test]
    fn test_fine_is_monotonic_in_as_of() {
        let mut previous = 0;
        for day in 0..30 {
            let assessment = compute_fine(9025, grace_end(), grace_end() + Duration::days(day));
            assert!(assessment.fine_amount >= previous);
            previous = assessment.fine_amount;
        }
    }

    fn installment(status: InstallmentStatus) -> Installment {
        let due = Utc.with_ymd_and_hms(2025, 1, 28, 0, 0, 0).unwrap();
        Installment {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            borrower_id: Uuid::new_v4(),
            installment_number: 1,
            amount: 9025,
            fine_amount: 0,
            total_due: 9025,
            due_date: due,
            grace_period_end: due + Duration::days(10),
            paid_at: None,
            status,
            gateway_session_id: None,
            gateway_payment_intent_id: None,
            reminders_sent: 0,
            last_reminder_at: None,
            days_overdue: 0,
            notes: None,
            created_at: due - Duration::days(31),
            updated_at: due - Duration::days(31),
        }
    }

    #[test]
    fn test_settled_statuses() {
        assert!(InstallmentStatus::Paid.is_settled());
        assert!(InstallmentStatus::Waived.is_settled());
        assert!(!InstallmentStatus::Pending.is_settled());
        assert!(!InstallmentStatus::Overdue.is_settled());
        assert!(!InstallmentStatus::Defaulted.is_settled());
    }

    #[test]
    fn test_reminder_eligibility_window() {
        let inst = installment(InstallmentStatus::Pending);
        let due = inst.due_date;

        // Within three days of due: eligible
        assert!(inst.reminder_eligible(due - Duration::days(2), 3, 3, 24));
        // Too far out: not yet
        assert!(!inst.reminder_eligible(due - Duration::days(7), 3, 3, 24));
    }

    #[test]
    fn test_reminder_cap_and_cooldown() {
        let mut inst = installment(InstallmentStatus::Pending);
        let now = inst.due_date - Duration::days(1);

        inst.reminders_sent = 3;
        assert!(!inst.reminder_eligible(now, 3, 3, 24));

        inst.reminders_sent = 1;
        inst.last_reminder_at = Some(now - Duration::hours(6));
        assert!(!inst.reminder_eligible(now, 3, 3, 24));

        inst.last_reminder_at = Some(now - Duration::hours(25));
        assert!(inst.reminder_eligible(now, 3, 3, 24));
    }

    #[test]
    fn test_reminder_requires_pending_status() {
        let inst = installment(InstallmentStatus::Overdue);
        assert!(!inst.reminder_eligible(inst.due_date, 3, 3, 24));
    }

    #[test]
    fn test_overdue_eligibility() {
        let mut inst = installment(InstallmentStatus::Pending);
        let past_grace = inst.grace_period_end + Duration::days(1);

        assert!(inst.overdue_eligible(past_grace, 3));
        assert!(!inst.overdue_eligible(inst.grace_period_end, 3));

        inst.status = InstallmentStatus::Overdue;
        inst.reminders_sent = 5;
        assert!(inst.overdue_eligible(past_grace, 3));

        inst.reminders_sent = 6; // at 2x cap
        assert!(!inst.overdue_eligible(past_grace, 3));

        inst.status = InstallmentStatus::Paid;
        inst.reminders_sent = 0;
        assert!(!inst.overdue_eligible(past_grace, 3));
    }

    #[test]
    fn test_waive_request_requires_reason() {
        assert!(WaiveFineRequest {
            reason: "  ".to_string()
        }
        .validate()
        .is_err());
        assert!(WaiveFineRequest {
            reason: "hardship case".to_string()
        }
        .validate()
        .is_ok());
    }
}

//! Loan models and aggregate balance math

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::installment::Installment;

/// Loan status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Completed,
    Defaulted,
    Cancelled,
}

impl LoanStatus {
    /// Completed, defaulted, and cancelled loans never change status again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LoanStatus::Active)
    }
}

/// Loan model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Loan {
    pub id: Uuid,
    pub borrower_id: Uuid,
    pub created_by: Uuid,
    pub principal_amount: i64,
    pub interest_rate_bps: i32,
    pub tenure_months: i32,
    pub monthly_installment: i64,
    pub total_payable: i64,
    pub outstanding_balance: i64,
    pub total_repaid: i64,
    pub total_fines: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: LoanStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub defaulted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate balances after applying one settled installment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentApplication {
    pub total_repaid: i64,
    pub outstanding_balance: i64,
    pub total_fines: i64,
    pub completed: bool,
}

impl Loan {
    /// Compute aggregate balances after a successful installment payment.
    ///
    /// The EMI portion counts toward `total_repaid`; fines are tracked
    /// separately. The outstanding balance drops by the full `total_due`
    /// (EMI plus fine) and floors at zero, which also signals completion.
    /// Not idempotent - the caller owns the settled-once guarantee.
    pub fn apply_installment_payment(&self, installment: &Installment) -> PaymentApplication {
        let outstanding_balance = (self.outstanding_balance - installment.total_due).max(0);

        PaymentApplication {
            total_repaid: self.total_repaid + installment.amount,
            outstanding_balance,
            total_fines: self.total_fines + installment.fine_amount,
            completed: outstanding_balance <= 0,
        }
    }
}

/// Request to create a new loan
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    pub borrower_id: Uuid,
    #[validate(range(min = 5000, max = 500_000, message = "principal must be 5,000 - 500,000"))]
    pub principal_amount: i64,
    #[validate(range(min = 1, max = 3000, message = "rate must be 1 - 3000 basis points"))]
    pub interest_rate_bps: i32,
    #[validate(range(min = 3, max = 60, message = "tenure must be 3 - 60 months"))]
    pub tenure_months: i32,
    pub start_date: DateTime<Utc>,
}

/// Response DTO for loan creation, including the generated schedule
#[derive(Debug, Serialize)]
pub struct CreateLoanResponse {
    pub loan: Loan,
    pub installments: Vec<Installment>,
}

/// A loan together with its installment ledger
#[derive(Debug, Serialize)]
pub struct LoanDetail {
    pub loan: Loan,
    pub installments: Vec<Installment>,
}

/// Query parameters for listing loans
#[derive(Debug, Deserialize)]
pub struct ListLoansQuery {
    pub borrower_id: Option<Uuid>,
    pub status: Option<LoanStatus>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installment::InstallmentStatus;
    use chrono::{Duration, TimeZone};
    use validator::Validate;

    fn loan() -> Loan {
        let start = Utc.with_ymd_and_hms(2024, 12, 28, 0, 0, 0).unwrap();
        Loan {
            id: Uuid::new_v4(),
            borrower_id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            principal_amount: 100_000,
            interest_rate_bps: 1500,
            tenure_months: 12,
            monthly_installment: 9025,
            total_payable: 108_300,
            outstanding_balance: 108_300,
            total_repaid: 0,
            total_fines: 0,
            start_date: start,
            end_date: start + Duration::days(365),
            status: LoanStatus::Active,
            completed_at: None,
            defaulted_at: None,
            notes: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn installment(amount: i64, fine: i64) -> Installment {
        let due = Utc.with_ymd_and_hms(2025, 1, 28, 0, 0, 0).unwrap();
        Installment {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            borrower_id: Uuid::new_v4(),
            installment_number: 1,
            amount,
            fine_amount: fine,
            total_due: amount + fine,
            due_date: due,
            grace_period_end: due + Duration::days(10),
            paid_at: None,
            status: InstallmentStatus::Pending,
            gateway_session_id: None,
            gateway_payment_intent_id: None,
            reminders_sent: 0,
            last_reminder_at: None,
            days_overdue: 0,
            notes: None,
            created_at: due,
            updated_at: due,
        }
    }

    #[test]
    fn test_apply_payment_without_fine() {
        let loan = loan();
        let result = loan.apply_installment_payment(&installment(9025, 0));

        assert_eq!(result.total_repaid, 9025);
        assert_eq!(result.outstanding_balance, 108_300 - 9025);
        assert_eq!(result.total_fines, 0);
        assert!(!result.completed);
    }

    #[test]
    fn test_apply_payment_with_fine_tracks_separately() {
        let loan = loan();
        let result = loan.apply_installment_payment(&installment(9025, 270));

        // EMI portion only counts toward repaid; fine goes to total_fines
        assert_eq!(result.total_repaid, 9025);
        assert_eq!(result.total_fines, 270);
        assert_eq!(result.outstanding_balance, 108_300 - 9295);
    }

    #[test]
    fn test_final_payment_completes_loan() {
        let mut loan = loan();
        loan.outstanding_balance = 9025;
        loan.total_repaid = 108_300 - 9025;

        let result = loan.apply_installment_payment(&installment(9025, 0));
        assert_eq!(result.outstanding_balance, 0);
        assert!(result.completed);
    }

    #[test]
    fn test_outstanding_balance_floors_at_zero() {
        let mut loan = loan();
        loan.outstanding_balance = 5000;

        let result = loan.apply_installment_payment(&installment(9025, 270));
        assert_eq!(result.outstanding_balance, 0);
        assert!(result.completed);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!LoanStatus::Active.is_terminal());
        assert!(LoanStatus::Completed.is_terminal());
        assert!(LoanStatus::Defaulted.is_terminal());
        assert!(LoanStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_create_loan_request_bounds() {
        let valid = CreateLoanRequest {
            borrower_id: Uuid::new_v4(),
            principal_amount: 100_000,
            interest_rate_bps: 1500,
            tenure_months: 12,
            start_date: Utc::now(),
        };
        assert!(valid.validate().is_ok());

        let too_small = CreateLoanRequest {
            principal_amount: 4999,
            ..valid_copy(&valid)
        };
        assert!(too_small.validate().is_err());

        let rate_too_high = CreateLoanRequest {
            interest_rate_bps: 3001,
            ..valid_copy(&valid)
        };
        assert!(rate_too_high.validate().is_err());

        let tenure_too_short = CreateLoanRequest {
            tenure_months: 2,
            ..valid_copy(&valid)
        };
        assert!(tenure_too_short.validate().is_err());
    }

    fn valid_copy(req: &CreateLoanRequest) -> CreateLoanRequest {
        CreateLoanRequest {
            borrower_id: req.borrower_id,
            principal_amount: req.principal_amount,
            interest_rate_bps: req.interest_rate_bps,
            tenure_months: req.tenure_months,
            start_date: req.start_date,
        }
    }
}

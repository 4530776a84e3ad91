//! Installment Lifecycle Tests
//!
//! These tests walk a loan through schedule generation, fine accrual,
//! and balance application without touching the database, exercising the
//! pure domain logic end to end.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use lendcore_server::amortization::{end_date, generate_schedule};
use lendcore_server::installment::{compute_fine, Installment, InstallmentStatus};
use lendcore_server::loan::{Loan, LoanStatus};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 12, 28, 0, 0, 0).unwrap()
}

fn loan_fixture(outstanding: i64, repaid: i64) -> Loan {
    let now = start();
    Loan {
        id: Uuid::new_v4(),
        borrower_id: Uuid::new_v4(),
        created_by: Uuid::new_v4(),
        principal_amount: 100_000,
        interest_rate_bps: 1500,
        tenure_months: 12,
        monthly_installment: 9025,
        total_payable: 108_300,
        outstanding_balance: outstanding,
        total_repaid: repaid,
        total_fines: 0,
        start_date: now,
        end_date: end_date(now, 12),
        status: LoanStatus::Active,
        completed_at: None,
        defaulted_at: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

fn installment_fixture(loan: &Loan, number: i32, fine: i64) -> Installment {
    let due_date = loan.start_date + chrono::Months::new(number as u32);
    Installment {
        id: Uuid::new_v4(),
        loan_id: loan.id,
        borrower_id: loan.borrower_id,
        installment_number: number,
        amount: loan.monthly_installment,
        fine_amount: fine,
        total_due: loan.monthly_installment + fine,
        due_date,
        grace_period_end: due_date + Duration::days(10),
        paid_at: None,
        status: InstallmentStatus::Pending,
        gateway_session_id: None,
        gateway_payment_intent_id: None,
        reminders_sent: 0,
        last_reminder_at: None,
        days_overdue: 0,
        notes: None,
        created_at: loan.created_at,
        updated_at: loan.created_at,
    }
}

// ============================================================================
// Schedule Generation
// ============================================================================

#[test]
fn test_schedule_matches_loan_terms() {
    let schedule = generate_schedule(100_000, 1500, 12, start(), 10);

    assert_eq!(schedule.monthly_installment, 9025);
    assert_eq!(schedule.total_payable, 108_300);
    assert_eq!(schedule.entries.len(), 12);

    // Due dates follow calendar months, grace runs 10 days past due
    assert_eq!(
        schedule.entries[0].due_date,
        Utc.with_ymd_and_hms(2025, 1, 28, 0, 0, 0).unwrap()
    );
    assert_eq!(
        schedule.entries[0].grace_period_end,
        Utc.with_ymd_and_hms(2025, 2, 7, 0, 0, 0).unwrap()
    );
}

#[test]
fn test_schedule_spans_the_loan_end_date() {
    let schedule = generate_schedule(60_000, 1200, 6, start(), 10);
    let last = schedule.entries.last().unwrap();
    assert_eq!(last.due_date, end_date(start(), 6));
}

// ============================================================================
// Fine Accrual
// ============================================================================

#[test]
fn test_no_fine_within_grace() {
    let grace_end = Utc.with_ymd_and_hms(2025, 2, 7, 0, 0, 0).unwrap();

    let assessment = compute_fine(9025, grace_end, grace_end);
    assert_eq!(assessment.fine_amount, 0);
    assert_eq!(assessment.days_overdue, 0);
}

#[test]
fn test_fine_accrues_one_percent_per_day() {
    let grace_end = Utc.with_ymd_and_hms(2025, 2, 7, 0, 0, 0).unwrap();

    let day_three = compute_fine(9025, grace_end, grace_end + Duration::days(3));
    assert_eq!(day_three.days_overdue, 3);
    assert_eq!(day_three.fine_amount, 9025 * 3 / 100);
}

#[test]
fn test_fine_caps_at_ten_percent() {
    let grace_end = Utc.with_ymd_and_hms(2025, 2, 7, 0, 0, 0).unwrap();

    let day_ten = compute_fine(9025, grace_end, grace_end + Duration::days(10));
    let day_ninety = compute_fine(9025, grace_end, grace_end + Duration::days(90));
    assert_eq!(day_ten.fine_amount, 902);
    assert_eq!(day_ninety.fine_amount, 902);
    assert_eq!(day_ninety.days_overdue, 90);
}

#[test]
fn test_fine_never_decreases_over_time() {
    let grace_end = Utc.with_ymd_and_hms(2025, 2, 7, 0, 0, 0).unwrap();

    let mut previous = 0;
    for day in 0..30 {
        let assessment = compute_fine(9025, grace_end, grace_end + Duration::days(day));
        assert!(assessment.fine_amount >= previous, "day {}", day);
        previous = assessment.fine_amount;
    }
}

// ============================================================================
// Balance Application
// ============================================================================

#[test]
fn test_payment_moves_balances() {
    let loan = loan_fixture(108_300, 0);
    let installment = installment_fixture(&loan, 1, 0);

    let applied = loan.apply_installment_payment(&installment);

    assert_eq!(applied.total_repaid, 9025);
    assert_eq!(applied.outstanding_balance, 108_300 - 9025);
    assert_eq!(applied.total_fines, 0);
    assert!(!applied.completed);
}

#[test]
fn test_fine_counts_toward_balance_but_not_repaid() {
    let loan = loan_fixture(108_300, 0);
    let installment = installment_fixture(&loan, 1, 270);

    let applied = loan.apply_installment_payment(&installment);

    assert_eq!(applied.total_repaid, 9025);
    assert_eq!(applied.outstanding_balance, 108_300 - 9025 - 270);
    assert_eq!(applied.total_fines, 270);
}

#[test]
fn test_final_payment_completes_the_loan() {
    let loan = loan_fixture(9025, 108_300 - 9025);
    let installment = installment_fixture(&loan, 12, 0);

    let applied = loan.apply_installment_payment(&installment);

    assert_eq!(applied.outstanding_balance, 0);
    assert!(applied.completed);
}

#[test]
fn test_balance_floors_at_zero() {
    // A fine on the last installment pushes total_due past the balance
    let loan = loan_fixture(9025, 108_300 - 9025);
    let installment = installment_fixture(&loan, 12, 902);

    let applied = loan.apply_installment_payment(&installment);

    assert_eq!(applied.outstanding_balance, 0);
    assert!(applied.completed);
}

#[test]
fn test_full_payoff_walkthrough() {
    let mut loan = loan_fixture(108_300, 0);

    for number in 1..=12 {
        let installment = installment_fixture(&loan, number, 0);
        let applied = loan.apply_installment_payment(&installment);
        loan.total_repaid = applied.total_repaid;
        loan.outstanding_balance = applied.outstanding_balance;
        loan.total_fines = applied.total_fines;

        if number < 12 {
            assert!(!applied.completed, "installment {}", number);
        } else {
            assert!(applied.completed);
        }
    }

    assert_eq!(loan.total_repaid, 108_300);
    assert_eq!(loan.outstanding_balance, 0);
}

// ============================================================================
// Sweep Eligibility
// ============================================================================

#[test]
fn test_reminder_window_and_cap() {
    let loan = loan_fixture(108_300, 0);
    let mut installment = installment_fixture(&loan, 1, 0);

    // Three days before due: inside the window
    let now = installment.due_date - Duration::days(3);
    assert!(installment.reminder_eligible(now, 3, 3, 24));

    // Four days before due: outside the window
    let early = installment.due_date - Duration::days(4);
    assert!(!installment.reminder_eligible(early, 3, 3, 24));

    // At the reminder cap
    installment.reminders_sent = 3;
    assert!(!installment.reminder_eligible(now, 3, 3, 24));
}

#[test]
fn test_reminder_cooldown() {
    let loan = loan_fixture(108_300, 0);
    let mut installment = installment_fixture(&loan, 1, 0);
    let now = installment.due_date - Duration::days(1);

    installment.reminders_sent = 1;
    installment.last_reminder_at = Some(now - Duration::hours(2));
    assert!(!installment.reminder_eligible(now, 3, 3, 24));

    installment.last_reminder_at = Some(now - Duration::hours(25));
    assert!(installment.reminder_eligible(now, 3, 3, 24));
}

#[test]
fn test_overdue_eligibility_requires_expired_grace() {
    let loan = loan_fixture(108_300, 0);
    let mut installment = installment_fixture(&loan, 1, 0);

    assert!(!installment.overdue_eligible(installment.grace_period_end, 3));
    assert!(installment.overdue_eligible(installment.grace_period_end + Duration::days(1), 3));

    // Settled installments are never swept
    installment.status = InstallmentStatus::Paid;
    assert!(!installment.overdue_eligible(installment.grace_period_end + Duration::days(1), 3));
}

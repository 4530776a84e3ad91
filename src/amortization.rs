//! Fixed-schedule amortization calculator
//!
//! Pure schedule math for equated monthly installments (EMI). Runs once at
//! loan creation to seed the installment ledger; the schedule is never
//! recomputed from partial payments afterwards.

use chrono::{DateTime, Duration, Months, Utc};

/// One scheduled period in an amortization schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub installment_number: i32,
    pub due_date: DateTime<Utc>,
    pub grace_period_end: DateTime<Utc>,
}

/// Computed amortization schedule for a loan
#[derive(Debug, Clone)]
pub struct AmortizationSchedule {
    pub monthly_installment: i64,
    pub total_payable: i64,
    pub entries: Vec<ScheduleEntry>,
}

/// Generate a fixed EMI schedule.
///
/// `interest_rate_bps` is the annual rate in basis points (1500 = 15%).
/// The EMI formula is `P * i * (1+i)^n / ((1+i)^n - 1)` with monthly rate
/// `i = rate / 12`, truncated to whole currency units. The truncation drift
/// across periods is a documented limitation of the fixed schedule and is
/// not corrected here. A zero rate degenerates to `P / n`.
pub fn generate_schedule(
    principal: i64,
    interest_rate_bps: i32,
    tenure_months: i32,
    start_date: DateTime<Utc>,
    grace_period_days: i64,
) -> AmortizationSchedule {
    let n = tenure_months as u32;
    let monthly_rate = interest_rate_bps as f64 / 12.0 / 10000.0;

    let monthly_installment = if monthly_rate == 0.0 {
        principal / tenure_months as i64
    } else {
        let growth = (1.0 + monthly_rate).powi(tenure_months);
        let numerator = principal as f64 * monthly_rate * growth;
        let denominator = growth - 1.0;
        (numerator / denominator) as i64
    };

    let total_payable = monthly_installment * tenure_months as i64;

    let entries = (1..=n)
        .map(|k| {
            let due_date = start_date + Months::new(k);
            ScheduleEntry {
                installment_number: k as i32,
                due_date,
                grace_period_end: due_date + Duration::days(grace_period_days),
            }
        })
        .collect();

    AmortizationSchedule {
        monthly_installment,
        total_payable,
        entries,
    }
}

/// Loan end date: start plus the full tenure
pub fn end_date(start_date: DateTime<Utc>, tenure_months: i32) -> DateTime<Utc> {
    start_date + Months::new(tenure_months as u32)
}

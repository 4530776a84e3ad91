//! Loan service layer - loan lifecycle and aggregate balances

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::amortization;
use crate::error::{ApiError, ApiResult};
use crate::installment::{Installment, InstallmentService};
use crate::loan::{CreateLoanRequest, CreateLoanResponse, ListLoansQuery, Loan, LoanStatus};

/// Loan service for managing loan lifecycle
#[derive(Clone)]
pub struct LoanService {
    db_pool: PgPool,
    installment_service: InstallmentService,
    grace_period_days: i64,
}

impl LoanService {
    /// Create a new loan service instance
    pub fn new(
        db_pool: PgPool,
        installment_service: InstallmentService,
        grace_period_days: i64,
    ) -> Self {
        Self {
            db_pool,
            installment_service,
            grace_period_days,
        }
    }

    /// Create a loan and its full installment schedule atomically.
    ///
    /// The amortization calculator runs once here; the schedule is fixed
    /// for the life of the loan and never recast from partial payments.
    pub async fn create_loan(
        &self,
        request: CreateLoanRequest,
        created_by: Uuid,
    ) -> ApiResult<CreateLoanResponse> {
        request.validate()?;

        let schedule = amortization::generate_schedule(
            request.principal_amount,
            request.interest_rate_bps,
            request.tenure_months,
            request.start_date,
            self.grace_period_days,
        );

        let end_date = amortization::end_date(request.start_date, request.tenure_months);

        let mut tx = self.db_pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                id, borrower_id, created_by, principal_amount, interest_rate_bps,
                tenure_months, monthly_installment, total_payable,
                outstanding_balance, total_repaid, total_fines,
                start_date, end_date, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8, 0, 0, $9, $10, $11, $12, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.borrower_id)
        .bind(created_by)
        .bind(request.principal_amount)
        .bind(request.interest_rate_bps)
        .bind(request.tenure_months)
        .bind(schedule.monthly_installment)
        .bind(schedule.total_payable)
        .bind(request.start_date)
        .bind(end_date)
        .bind(LoanStatus::Active)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let installments = self
            .installment_service
            .create_schedule(&mut *tx, loan.id, loan.borrower_id, &schedule)
            .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %loan.id,
            borrower_id = %loan.borrower_id,
            principal = loan.principal_amount,
            installment = loan.monthly_installment,
            tenure = loan.tenure_months,
            "Loan created with full schedule"
        );

        Ok(CreateLoanResponse { loan, installments })
    }

    /// Apply one settled installment to the loan aggregate.
    ///
    /// Runs on the caller's (reconciliation) transaction; the loan row is
    /// locked so concurrent settlements serialize. Not idempotent - the
    /// installment-level compare-and-swap upstream guarantees this runs at
    /// most once per installment.
    pub async fn apply_successful_payment(
        &self,
        conn: &mut PgConnection,
        loan_id: &Uuid,
        installment: &Installment,
    ) -> ApiResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Loan {} not found", loan_id)))?;

        let applied = loan.apply_installment_payment(installment);

        let now = Utc::now();
        let (new_status, completed_at) = if applied.completed && loan.status == LoanStatus::Active {
            (LoanStatus::Completed, Some(now))
        } else {
            (loan.status, loan.completed_at)
        };

        let updated = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET total_repaid = $2,
                outstanding_balance = $3,
                total_fines = $4,
                status = $5,
                completed_at = $6,
                updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(applied.total_repaid)
        .bind(applied.outstanding_balance)
        .bind(applied.total_fines)
        .bind(new_status)
        .bind(completed_at)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        if new_status == LoanStatus::Completed && loan.status == LoanStatus::Active {
            tracing::info!(loan_id = %loan_id, "Loan fully repaid, marked completed");
        }

        Ok(updated)
    }

    /// Admin/system terminal transition to COMPLETED. Re-entering the same
    /// terminal state is a no-op.
    pub async fn mark_completed(&self, loan_id: &Uuid) -> ApiResult<Loan> {
        self.terminal_transition(loan_id, LoanStatus::Completed).await
    }

    /// Admin/system terminal transition to DEFAULTED. Re-entering the same
    /// terminal state is a no-op.
    pub async fn mark_defaulted(&self, loan_id: &Uuid) -> ApiResult<Loan> {
        self.terminal_transition(loan_id, LoanStatus::Defaulted).await
    }

    /// Admin terminal transition to CANCELLED. Re-entering the same
    /// terminal state is a no-op.
    pub async fn mark_cancelled(&self, loan_id: &Uuid) -> ApiResult<Loan> {
        self.terminal_transition(loan_id, LoanStatus::Cancelled).await
    }

    async fn terminal_transition(&self, loan_id: &Uuid, target: LoanStatus) -> ApiResult<Loan> {
        let loan = self.get_loan(loan_id).await?;

        if loan.status == target {
            return Ok(loan);
        }

        if loan.status.is_terminal() {
            return Err(ApiError::InvalidTransition(format!(
                "Loan {} is already {:?}",
                loan_id, loan.status
            )));
        }

        let now = Utc::now();
        let updated = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = $2,
                completed_at = CASE WHEN $2 = 'completed'::loan_status THEN $3 ELSE completed_at END,
                defaulted_at = CASE WHEN $2 = 'defaulted'::loan_status THEN $3 ELSE defaulted_at END,
                updated_at = $3
            WHERE id = $1 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(loan_id)
        .bind(target)
        .bind(now)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| {
            ApiError::InvalidTransition(format!("Loan {} left ACTIVE concurrently", loan_id))
        })?;

        tracing::warn!(loan_id = %loan_id, status = ?target, "Loan moved to terminal status");

        Ok(updated)
    }

    /// Get loan by ID
    pub async fn get_loan(&self, id: &Uuid) -> ApiResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        loan.ok_or_else(|| ApiError::NotFound(format!("Loan {} not found", id)))
    }

    /// List loans with filters and pagination
    pub async fn list_loans(&self, query: ListLoansQuery) -> ApiResult<Vec<Loan>> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * limit;

        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> =
            sqlx::QueryBuilder::new("SELECT * FROM loans WHERE 1=1");

        if let Some(borrower_id) = query.borrower_id {
            query_builder.push(" AND borrower_id = ");
            query_builder.push_bind(borrower_id);
        }
        if let Some(status) = query.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status);
        }

        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(limit as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset as i64);

        let loans = query_builder
            .build_query_as::<Loan>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(loans)
    }
}

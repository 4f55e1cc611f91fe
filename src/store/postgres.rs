//! PostgreSQL-backed ledger store

use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use sqlx::types::chrono::Utc;
use uuid::Uuid;

use crate::bank::model::{Bank, CreateBankRequest};
use crate::collateral::model::{Collateral, CollateralAssignment, CreateCollateralRequest};
use crate::error::{LedgerError, LedgerResult};
use crate::facility::model::{
    CreateCreditLineRequest, CreateFacilityRequest, CreditLine, Facility,
};
use crate::ledger::model::{AuditEvent, NewAuditEvent, NewTransaction, Transaction, TransactionFilter};
use crate::loan::model::{Loan, LoanStatus};
use crate::models::RecordStatus;

use super::{
    CommitOutcome, LedgerStore, LoanCommit, LoanFilter, LoanUpdate, NewAssignment, NewLoan,
    PortfolioSnapshot,
};

/// Ledger store backed by PostgreSQL. One pool, injected at startup.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append the WHERE clause shared by `list_transactions` and
    /// `count_transactions` so both always honor identical filter semantics.
    fn push_transaction_filters(
        builder: &mut QueryBuilder<'_, Postgres>,
        org_id: Uuid,
        filter: &TransactionFilter,
    ) {
        builder.push(" WHERE organization_id = ");
        builder.push_bind(org_id);

        if let Some(loan_id) = filter.loan_id {
            builder.push(" AND loan_id = ");
            builder.push_bind(loan_id);
        }
        if let Some(facility_id) = filter.facility_id {
            builder.push(" AND facility_id = ");
            builder.push_bind(facility_id);
        }
        if let Some(bank_id) = filter.bank_id {
            builder.push(" AND bank_id = ");
            builder.push_bind(bank_id);
        }
        if let Some(tx_type) = filter.tx_type {
            builder.push(" AND tx_type = ");
            builder.push_bind(tx_type);
        }
        if let Some(date_from) = filter.date_from {
            builder.push(" AND date >= ");
            builder.push_bind(date_from);
        }
        if let Some(date_to) = filter.date_to {
            builder.push(" AND date <= ");
            builder.push_bind(date_to);
        }
    }

    async fn insert_transaction_row(
        executor: &mut sqlx::PgConnection,
        org_id: Uuid,
        tx: &NewTransaction,
    ) -> LedgerResult<Transaction> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions (
                id, organization_id, user_id, loan_id, facility_id, bank_id,
                tx_type, amount, date, memo, reference, allocation,
                idempotency_key, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(tx.user_id)
        .bind(tx.loan_id)
        .bind(tx.facility_id)
        .bind(tx.bank_id)
        .bind(tx.tx_type)
        .bind(tx.amount)
        .bind(tx.date)
        .bind(&tx.memo)
        .bind(&tx.reference)
        .bind(&tx.allocation)
        .bind(&tx.idempotency_key)
        .bind(Utc::now())
        .fetch_one(executor)
        .await?;

        Ok(row)
    }

    async fn insert_loan_row(
        executor: &mut sqlx::PgConnection,
        org_id: Uuid,
        loan: &NewLoan,
    ) -> LedgerResult<Loan> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                id, organization_id, facility_id, credit_line_id, amount,
                sibor_rate, margin, bank_rate, start_date, due_date,
                charges_due_date, status, parent_loan_id, cycle_number,
                last_accrual_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(loan.facility_id)
        .bind(loan.credit_line_id)
        .bind(loan.amount)
        .bind(loan.sibor_rate)
        .bind(loan.margin)
        .bind(loan.bank_rate)
        .bind(loan.start_date)
        .bind(loan.due_date)
        .bind(loan.charges_due_date)
        .bind(loan.status)
        .bind(loan.parent_loan_id)
        .bind(loan.cycle_number)
        .bind(loan.last_accrual_date)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await?;

        Ok(row)
    }
}

#[async_trait::async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_bank(&self, req: CreateBankRequest) -> LedgerResult<Bank> {
        let now = Utc::now();
        let bank = sqlx::query_as::<_, Bank>(
            r#"
            INSERT INTO banks (id, organization_id, code, name, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(req.organization_id)
        .bind(&req.code)
        .bind(&req.name)
        .bind(RecordStatus::Active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(bank)
    }

    async fn get_bank(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Bank>> {
        let bank = sqlx::query_as::<_, Bank>(
            "SELECT * FROM banks WHERE id = $1 AND (organization_id = $2 OR organization_id IS NULL)",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bank)
    }

    async fn find_bank_by_code(&self, org_id: Uuid, code: &str) -> LedgerResult<Option<Bank>> {
        let bank = sqlx::query_as::<_, Bank>(
            "SELECT * FROM banks WHERE code = $1 AND (organization_id = $2 OR organization_id IS NULL)",
        )
        .bind(code)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bank)
    }

    async fn list_banks(&self, org_id: Uuid) -> LedgerResult<Vec<Bank>> {
        let banks = sqlx::query_as::<_, Bank>(
            "SELECT * FROM banks WHERE organization_id = $1 OR organization_id IS NULL ORDER BY code",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(banks)
    }

    async fn set_bank_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Bank>> {
        let bank = sqlx::query_as::<_, Bank>(
            "UPDATE banks SET status = $1, updated_at = $2 WHERE id = $3 AND organization_id = $4 RETURNING *",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bank)
    }

    async fn insert_facility(
        &self,
        org_id: Uuid,
        req: CreateFacilityRequest,
    ) -> LedgerResult<Facility> {
        let now = Utc::now();
        let facility = sqlx::query_as::<_, Facility>(
            r#"
            INSERT INTO facilities (
                id, organization_id, bank_id, name, credit_limit,
                cost_of_funding, facility_type, revolving_tenor_months,
                status, start_date, expiry_date, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(req.bank_id)
        .bind(&req.name)
        .bind(req.credit_limit)
        .bind(req.cost_of_funding)
        .bind(req.facility_type)
        .bind(req.revolving_tenor_months)
        .bind(RecordStatus::Active)
        .bind(req.start_date)
        .bind(req.expiry_date)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(facility)
    }

    async fn get_facility(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Facility>> {
        let facility = sqlx::query_as::<_, Facility>(
            "SELECT * FROM facilities WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(facility)
    }

    async fn list_facilities(&self, org_id: Uuid) -> LedgerResult<Vec<Facility>> {
        let facilities = sqlx::query_as::<_, Facility>(
            "SELECT * FROM facilities WHERE organization_id = $1 ORDER BY created_at DESC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(facilities)
    }

    async fn set_facility_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Facility>> {
        let facility = sqlx::query_as::<_, Facility>(
            "UPDATE facilities SET status = $1, updated_at = $2 WHERE id = $3 AND organization_id = $4 RETURNING *",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(facility)
    }

    async fn insert_credit_line(
        &self,
        org_id: Uuid,
        req: CreateCreditLineRequest,
    ) -> LedgerResult<CreditLine> {
        let now = Utc::now();
        let line = sqlx::query_as::<_, CreditLine>(
            r#"
            INSERT INTO credit_lines (
                id, organization_id, facility_id, name, allocated_limit,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(req.facility_id)
        .bind(&req.name)
        .bind(req.allocated_limit)
        .bind(RecordStatus::Active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(line)
    }

    async fn get_credit_line(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<CreditLine>> {
        let line = sqlx::query_as::<_, CreditLine>(
            "SELECT * FROM credit_lines WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(line)
    }

    async fn list_credit_lines(
        &self,
        org_id: Uuid,
        facility_id: Option<Uuid>,
    ) -> LedgerResult<Vec<CreditLine>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM credit_lines WHERE organization_id = ");
        builder.push_bind(org_id);
        if let Some(facility_id) = facility_id {
            builder.push(" AND facility_id = ");
            builder.push_bind(facility_id);
        }
        builder.push(" ORDER BY created_at DESC");

        let lines = builder
            .build_query_as::<CreditLine>()
            .fetch_all(&self.pool)
            .await?;

        Ok(lines)
    }

    async fn insert_collateral(
        &self,
        org_id: Uuid,
        req: CreateCollateralRequest,
    ) -> LedgerResult<Collateral> {
        let now = Utc::now();
        let collateral = sqlx::query_as::<_, Collateral>(
            r#"
            INSERT INTO collateral (
                id, organization_id, description, current_value, status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(&req.description)
        .bind(req.current_value)
        .bind(RecordStatus::Active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(collateral)
    }

    async fn get_collateral(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Collateral>> {
        let collateral = sqlx::query_as::<_, Collateral>(
            "SELECT * FROM collateral WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(collateral)
    }

    async fn list_collateral(&self, org_id: Uuid) -> LedgerResult<Vec<Collateral>> {
        let rows = sqlx::query_as::<_, Collateral>(
            "SELECT * FROM collateral WHERE organization_id = $1 ORDER BY created_at DESC",
        )
        .bind(org_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn set_collateral_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Collateral>> {
        let collateral = sqlx::query_as::<_, Collateral>(
            "UPDATE collateral SET status = $1, updated_at = $2 WHERE id = $3 AND organization_id = $4 RETURNING *",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(collateral)
    }

    async fn insert_assignment(
        &self,
        org_id: Uuid,
        assignment: NewAssignment,
    ) -> LedgerResult<CollateralAssignment> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, CollateralAssignment>(
            r#"
            INSERT INTO collateral_assignments (
                id, organization_id, collateral_id, bank_id, facility_id,
                credit_line_id, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(assignment.collateral_id)
        .bind(assignment.bank_id)
        .bind(assignment.facility_id)
        .bind(assignment.credit_line_id)
        .bind(RecordStatus::Active)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_assignments(
        &self,
        org_id: Uuid,
        active_only: bool,
    ) -> LedgerResult<Vec<CollateralAssignment>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM collateral_assignments WHERE organization_id = ");
        builder.push_bind(org_id);
        if active_only {
            builder.push(" AND status = ");
            builder.push_bind(RecordStatus::Active);
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<CollateralAssignment>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn set_assignment_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<CollateralAssignment>> {
        let row = sqlx::query_as::<_, CollateralAssignment>(
            "UPDATE collateral_assignments SET status = $1, updated_at = $2 WHERE id = $3 AND organization_id = $4 RETURNING *",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert_loan(&self, org_id: Uuid, loan: NewLoan) -> LedgerResult<Loan> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_loan_row(&mut *conn, org_id, &loan).await
    }

    async fn get_loan(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE id = $1 AND organization_id = $2",
        )
        .bind(id)
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(loan)
    }

    async fn list_loans(&self, org_id: Uuid, filter: &LoanFilter) -> LedgerResult<Vec<Loan>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM loans WHERE organization_id = ");
        builder.push_bind(org_id);

        if let Some(facility_id) = filter.facility_id {
            builder.push(" AND facility_id = ");
            builder.push_bind(facility_id);
        }
        if let Some(credit_line_id) = filter.credit_line_id {
            builder.push(" AND credit_line_id = ");
            builder.push_bind(credit_line_id);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if filter.open_only {
            builder.push(" AND status IN ('active', 'overdue')");
        }
        builder.push(" ORDER BY created_at DESC");

        let loans = builder
            .build_query_as::<Loan>()
            .fetch_all(&self.pool)
            .await?;

        Ok(loans)
    }

    async fn delete_cancelled_loan(&self, org_id: Uuid, id: Uuid) -> LedgerResult<bool> {
        let result = sqlx::query(
            "DELETE FROM loans WHERE id = $1 AND organization_id = $2 AND status = 'cancelled'",
        )
        .bind(id)
        .bind(org_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_overdue_loans(&self, org_id: Uuid, as_of: NaiveDate) -> LedgerResult<Vec<Uuid>> {
        let flagged = sqlx::query_as::<_, (Uuid,)>(
            r#"
            UPDATE loans
            SET status = 'overdue', updated_at = $1
            WHERE organization_id = $2 AND status = 'active' AND due_date < $3
            RETURNING id
            "#,
        )
        .bind(Utc::now())
        .bind(org_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;

        Ok(flagged.into_iter().map(|(id,)| id).collect())
    }

    async fn find_transaction_by_key(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        key: &str,
    ) -> LedgerResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE organization_id = $1 AND loan_id = $2 AND idempotency_key = $3",
        )
        .bind(org_id)
        .bind(loan_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_transactions(
        &self,
        org_id: Uuid,
        filter: &TransactionFilter,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM transactions");
        Self::push_transaction_filters(&mut builder, org_id, filter);
        builder.push(" ORDER BY date DESC, created_at DESC");

        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            builder.push(" OFFSET ");
            builder.push_bind(offset);
        }

        let rows = builder
            .build_query_as::<Transaction>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn count_transactions(
        &self,
        org_id: Uuid,
        filter: &TransactionFilter,
    ) -> LedgerResult<i64> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM transactions");
        Self::push_transaction_filters(&mut builder, org_id, filter);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;

        Ok(count)
    }

    async fn commit_loan_change(
        &self,
        org_id: Uuid,
        commit: LoanCommit,
    ) -> LedgerResult<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent writers on the same loan
        let loan = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE id = $1 AND organization_id = $2 FOR UPDATE",
        )
        .bind(commit.loan_id)
        .bind(org_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| LedgerError::not_found("Loan"))?;

        // Idempotency replay check inside the same transaction. A repeated
        // key suppresses only the inserts; when the guard still passes (a
        // reversal reopened the loan) the state update below applies anyway,
        // so a replayed settle never leaves the loan un-settled.
        let mut replayed: Option<Transaction> = None;
        if let Some(new_tx) = &commit.transaction {
            if let Some(key) = &new_tx.idempotency_key {
                replayed = sqlx::query_as::<_, Transaction>(
                    "SELECT * FROM transactions WHERE organization_id = $1 AND loan_id = $2 AND idempotency_key = $3",
                )
                .bind(org_id)
                .bind(commit.loan_id)
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?;
            }
        }
        let deduplicated = replayed.is_some();

        if !commit.guard.is_empty() && !commit.guard.contains(&loan.status) {
            if let Some(existing) = replayed {
                // replayed command whose transition already happened, e.g. a
                // retried settle on a settled loan
                tx.rollback().await?;
                return Ok(CommitOutcome {
                    loan,
                    transaction: Some(existing),
                    successor: None,
                    deduplicated: true,
                });
            }
            tx.rollback().await?;
            return Err(LedgerError::InvalidStateTransition {
                operation: commit.operation,
                current: loan.status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let updated_loan = match &commit.update {
            LoanUpdate::None => loan.clone(),
            LoanUpdate::Settle {
                settled_date,
                settled_amount,
            } => {
                sqlx::query_as::<_, Loan>(
                    r#"
                    UPDATE loans
                    SET status = $1, settled_date = $2, settled_amount = $3, updated_at = $4
                    WHERE id = $5 AND organization_id = $6
                    RETURNING *
                    "#,
                )
                .bind(LoanStatus::Settled)
                .bind(settled_date)
                .bind(settled_amount)
                .bind(now)
                .bind(commit.loan_id)
                .bind(org_id)
                .fetch_one(&mut *tx)
                .await?
            }
            LoanUpdate::ReverseSettlement {
                reversed_at,
                reason,
                reversed_by,
            } => {
                sqlx::query_as::<_, Loan>(
                    r#"
                    UPDATE loans
                    SET status = $1, settled_date = NULL, settled_amount = NULL,
                        reversed_at = $2, reversal_reason = $3, reversed_by = $4,
                        updated_at = $5
                    WHERE id = $6 AND organization_id = $7
                    RETURNING *
                    "#,
                )
                .bind(LoanStatus::Active)
                .bind(reversed_at)
                .bind(reason)
                .bind(reversed_by)
                .bind(now)
                .bind(commit.loan_id)
                .bind(org_id)
                .fetch_one(&mut *tx)
                .await?
            }
            LoanUpdate::Cancel => {
                sqlx::query_as::<_, Loan>(
                    r#"
                    UPDATE loans
                    SET status = $1, updated_at = $2
                    WHERE id = $3 AND organization_id = $4
                    RETURNING *
                    "#,
                )
                .bind(LoanStatus::Cancelled)
                .bind(now)
                .bind(commit.loan_id)
                .bind(org_id)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        // A replayed key already posted its rows; only the state update above
        // is re-applied
        let transaction = match (&commit.transaction, replayed) {
            (_, Some(existing)) => Some(existing),
            (Some(new_tx), None) => {
                Some(Self::insert_transaction_row(&mut *tx, org_id, new_tx).await?)
            }
            (None, None) => None,
        };

        let successor = match &commit.successor {
            Some(new_loan) if !deduplicated => {
                Some(Self::insert_loan_row(&mut *tx, org_id, new_loan).await?)
            }
            _ => None,
        };

        if let (Some(audit), false) = (&commit.audit, deduplicated) {
            sqlx::query(
                r#"
                INSERT INTO audit_events (
                    id, organization_id, actor_id, action, entity, entity_id,
                    before, after, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(org_id)
            .bind(audit.actor_id)
            .bind(&audit.action)
            .bind(&audit.entity)
            .bind(audit.entity_id)
            .bind(&audit.before)
            .bind(&audit.after)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(CommitOutcome {
            loan: updated_loan,
            transaction,
            successor,
            deduplicated,
        })
    }

    async fn load_portfolio_snapshot(&self, org_id: Uuid) -> LedgerResult<PortfolioSnapshot> {
        // Single repeatable-read transaction so outstanding and limits come
        // from one consistent view
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let banks = sqlx::query_as::<_, Bank>(
            "SELECT * FROM banks WHERE organization_id = $1 OR organization_id IS NULL",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        let facilities = sqlx::query_as::<_, Facility>(
            "SELECT * FROM facilities WHERE organization_id = $1 AND status = 'active'",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        let credit_lines = sqlx::query_as::<_, CreditLine>(
            "SELECT * FROM credit_lines WHERE organization_id = $1",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE organization_id = $1 AND status IN ('active', 'overdue')",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        let collateral = sqlx::query_as::<_, Collateral>(
            "SELECT * FROM collateral WHERE organization_id = $1 AND status = 'active'",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        let assignments = sqlx::query_as::<_, CollateralAssignment>(
            "SELECT * FROM collateral_assignments WHERE organization_id = $1 AND status = 'active'",
        )
        .bind(org_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PortfolioSnapshot {
            banks,
            facilities,
            credit_lines,
            loans,
            collateral,
            assignments,
        })
    }

    async fn insert_audit_event(
        &self,
        org_id: Uuid,
        event: NewAuditEvent,
    ) -> LedgerResult<AuditEvent> {
        let row = sqlx::query_as::<_, AuditEvent>(
            r#"
            INSERT INTO audit_events (
                id, organization_id, actor_id, action, entity, entity_id,
                before, after, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(org_id)
        .bind(event.actor_id)
        .bind(&event.action)
        .bind(&event.entity)
        .bind(event.entity_id)
        .bind(&event.before)
        .bind(&event.after)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_audit_events(
        &self,
        org_id: Uuid,
        entity_id: Option<Uuid>,
    ) -> LedgerResult<Vec<AuditEvent>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM audit_events WHERE organization_id = ");
        builder.push_bind(org_id);
        if let Some(entity_id) = entity_id {
            builder.push(" AND entity_id = ");
            builder.push_bind(entity_id);
        }
        builder.push(" ORDER BY created_at DESC");

        let rows = builder
            .build_query_as::<AuditEvent>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}

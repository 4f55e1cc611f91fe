//! Storage abstraction for the loan ledger
//!
//! One capability trait, two implementations: `PgLedgerStore` (PostgreSQL via
//! sqlx) and `MemoryLedgerStore` (in-memory fallback for development and
//! tests). All invariant logic (state machine, balance calculation,
//! aggregation) lives outside both implementations so behavior cannot drift
//! between them; the store only applies prepared changes atomically.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::bank::model::{Bank, CreateBankRequest};
use crate::collateral::model::{Collateral, CollateralAssignment, CreateCollateralRequest};
use crate::error::LedgerResult;
use crate::facility::model::{
    CreateCreditLineRequest, CreateFacilityRequest, CreditLine, Facility,
};
use crate::ledger::model::{AuditEvent, NewAuditEvent, NewTransaction, Transaction, TransactionFilter};
use crate::loan::model::{Loan, LoanStatus};
use crate::models::RecordStatus;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Insertable loan row. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub facility_id: Option<Uuid>,
    pub credit_line_id: Option<Uuid>,
    pub amount: Decimal,
    pub sibor_rate: Decimal,
    pub margin: Decimal,
    pub bank_rate: Decimal,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub charges_due_date: Option<NaiveDate>,
    pub status: LoanStatus,
    pub parent_loan_id: Option<Uuid>,
    pub cycle_number: i32,
    pub last_accrual_date: Option<NaiveDate>,
}

/// Insertable collateral assignment with exactly one target set
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub collateral_id: Uuid,
    pub bank_id: Option<Uuid>,
    pub facility_id: Option<Uuid>,
    pub credit_line_id: Option<Uuid>,
}

/// Filters for listing loans
#[derive(Debug, Default, Clone)]
pub struct LoanFilter {
    pub facility_id: Option<Uuid>,
    pub credit_line_id: Option<Uuid>,
    pub status: Option<LoanStatus>,
    /// Restrict to active/overdue loans
    pub open_only: bool,
}

/// Narrow per-operation loan state update. Invalid field combinations are
/// unrepresentable; there is no generic partial-record merge.
#[derive(Debug, Clone)]
pub enum LoanUpdate {
    /// Ledger-only commit, loan row untouched
    None,
    Settle {
        settled_date: NaiveDate,
        settled_amount: Decimal,
    },
    ReverseSettlement {
        reversed_at: DateTime<Utc>,
        reason: String,
        reversed_by: Option<Uuid>,
    },
    Cancel,
}

/// One atomic unit of work against a loan: the state update plus any ledger,
/// successor and audit rows it creates. Either everything commits or nothing
/// does.
#[derive(Debug, Clone)]
pub struct LoanCommit {
    pub loan_id: Uuid,
    /// Operation label used in state-transition errors
    pub operation: &'static str,
    /// Statuses the loan must currently hold for the commit to apply. The
    /// transition table itself lives in the lifecycle service; the store only
    /// enforces the guard under its write lock so concurrent writers cannot
    /// both pass.
    pub guard: Vec<LoanStatus>,
    pub update: LoanUpdate,
    pub transaction: Option<NewTransaction>,
    /// New cycle created by a revolve
    pub successor: Option<NewLoan>,
    pub audit: Option<NewAuditEvent>,
}

/// Result of an applied (or deduplicated) loan commit
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub loan: Loan,
    pub transaction: Option<Transaction>,
    pub successor: Option<Loan>,
    /// The idempotency key was already present: `transaction` holds the
    /// prior row and no new rows were inserted. The state update is still
    /// applied when the guard passes, so a replayed transition command
    /// converges on the target state instead of silently no-opping.
    pub deduplicated: bool,
}

/// Consistent read set for portfolio aggregation, taken from a single store
/// snapshot so outstanding and credit limit are never torn.
#[derive(Debug, Clone)]
pub struct PortfolioSnapshot {
    pub banks: Vec<Bank>,
    pub facilities: Vec<Facility>,
    pub credit_lines: Vec<CreditLine>,
    /// Open (active/overdue) loans only
    pub loans: Vec<Loan>,
    /// Active collateral only
    pub collateral: Vec<Collateral>,
    /// Active assignments only
    pub assignments: Vec<CollateralAssignment>,
}

/// Persistence contract for the ledger core.
///
/// Every method is scoped by organization id; ownership misses return `None`
/// (surfaced as NotFound by services) rather than a permission error. Bank
/// reads additionally include global banks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ----- banks -----
    async fn insert_bank(&self, req: CreateBankRequest) -> LedgerResult<Bank>;
    async fn get_bank(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Bank>>;
    async fn find_bank_by_code(&self, org_id: Uuid, code: &str) -> LedgerResult<Option<Bank>>;
    async fn list_banks(&self, org_id: Uuid) -> LedgerResult<Vec<Bank>>;
    async fn set_bank_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Bank>>;

    // ----- facilities -----
    async fn insert_facility(
        &self,
        org_id: Uuid,
        req: CreateFacilityRequest,
    ) -> LedgerResult<Facility>;
    async fn get_facility(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Facility>>;
    async fn list_facilities(&self, org_id: Uuid) -> LedgerResult<Vec<Facility>>;
    async fn set_facility_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Facility>>;

    // ----- credit lines -----
    async fn insert_credit_line(
        &self,
        org_id: Uuid,
        req: CreateCreditLineRequest,
    ) -> LedgerResult<CreditLine>;
    async fn get_credit_line(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<CreditLine>>;
    async fn list_credit_lines(
        &self,
        org_id: Uuid,
        facility_id: Option<Uuid>,
    ) -> LedgerResult<Vec<CreditLine>>;

    // ----- collateral -----
    async fn insert_collateral(
        &self,
        org_id: Uuid,
        req: CreateCollateralRequest,
    ) -> LedgerResult<Collateral>;
    async fn get_collateral(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Collateral>>;
    async fn list_collateral(&self, org_id: Uuid) -> LedgerResult<Vec<Collateral>>;
    async fn set_collateral_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Collateral>>;
    async fn insert_assignment(
        &self,
        org_id: Uuid,
        assignment: NewAssignment,
    ) -> LedgerResult<CollateralAssignment>;
    async fn list_assignments(
        &self,
        org_id: Uuid,
        active_only: bool,
    ) -> LedgerResult<Vec<CollateralAssignment>>;
    async fn set_assignment_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<CollateralAssignment>>;

    // ----- loans -----
    async fn insert_loan(&self, org_id: Uuid, loan: NewLoan) -> LedgerResult<Loan>;
    async fn get_loan(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Loan>>;
    async fn list_loans(&self, org_id: Uuid, filter: &LoanFilter) -> LedgerResult<Vec<Loan>>;
    /// Hard delete, applied only when the loan is already cancelled. Returns
    /// false when no cancelled row matched.
    async fn delete_cancelled_loan(&self, org_id: Uuid, id: Uuid) -> LedgerResult<bool>;
    /// Time-based sweep: active loans past due become overdue
    async fn mark_overdue_loans(&self, org_id: Uuid, as_of: NaiveDate) -> LedgerResult<Vec<Uuid>>;

    // ----- transaction ledger -----
    async fn find_transaction_by_key(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        key: &str,
    ) -> LedgerResult<Option<Transaction>>;
    async fn list_transactions(
        &self,
        org_id: Uuid,
        filter: &TransactionFilter,
    ) -> LedgerResult<Vec<Transaction>>;
    async fn count_transactions(
        &self,
        org_id: Uuid,
        filter: &TransactionFilter,
    ) -> LedgerResult<i64>;

    // ----- atomic loan mutation -----
    async fn commit_loan_change(
        &self,
        org_id: Uuid,
        commit: LoanCommit,
    ) -> LedgerResult<CommitOutcome>;

    // ----- aggregation snapshot -----
    async fn load_portfolio_snapshot(&self, org_id: Uuid) -> LedgerResult<PortfolioSnapshot>;

    // ----- audit -----
    /// Standalone audit record for mutations that bypass `commit_loan_change`
    /// (permanent deletion in particular).
    async fn insert_audit_event(
        &self,
        org_id: Uuid,
        event: NewAuditEvent,
    ) -> LedgerResult<AuditEvent>;
    async fn list_audit_events(
        &self,
        org_id: Uuid,
        entity_id: Option<Uuid>,
    ) -> LedgerResult<Vec<AuditEvent>>;
}

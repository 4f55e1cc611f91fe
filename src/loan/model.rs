//! Loan models and the lifecycle transition table
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Loan lifecycle status.
///
/// The transition table is the single source of truth for legal moves;
/// operations reject anything not listed with `InvalidStateTransition`.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Settled,
    Cancelled,
}

impl LoanStatus {
    /// Explicit lifecycle transition table
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Active, Overdue)
                | (Active, Settled)
                | (Active, Cancelled)
                | (Overdue, Settled)
                | (Overdue, Cancelled)
                // time-based flag clears when a reversal re-opens the loan
                | (Overdue, Active)
                | (Settled, Active)
        )
    }

    /// Settlement is allowed regardless of overdue status; only cancelled or
    /// already-settled loans reject a new settlement attempt.
    pub fn is_open(self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Settled => "settled",
            LoanStatus::Cancelled => "cancelled",
        }
    }
}

/// A single drawdown against a facility (or, in the legacy path, against a
/// credit line), with its own due date and rate terms.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Loan {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub facility_id: Option<Uuid>,
    /// Legacy attachment path; resolves to a facility
    pub credit_line_id: Option<Uuid>,
    pub amount: Decimal,
    pub sibor_rate: Decimal,
    pub margin: Decimal,
    /// sibor_rate + margin
    pub bank_rate: Decimal,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub charges_due_date: Option<NaiveDate>,
    pub status: LoanStatus,
    pub settled_date: Option<NaiveDate>,
    pub settled_amount: Option<Decimal>,
    pub reversed_at: Option<DateTime<Utc>>,
    pub reversal_reason: Option<String>,
    pub reversed_by: Option<Uuid>,
    /// Revolve lineage: predecessor cycle, if any
    pub parent_loan_id: Option<Uuid>,
    pub cycle_number: i32,
    pub last_accrual_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Draw command: creates a loan against a facility or credit line
#[derive(Debug, Deserialize, Clone)]
pub struct CreateLoanRequest {
    pub facility_id: Option<Uuid>,
    pub credit_line_id: Option<Uuid>,
    pub amount: Decimal,
    pub sibor_rate: Decimal,
    pub margin: Decimal,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub charges_due_date: Option<NaiveDate>,
}

/// Payment command: posts a repayment without touching loan status
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentCommand {
    pub amount: Decimal,
    pub date: NaiveDate,
    pub memo: Option<String>,
    pub reference: Option<String>,
    pub idempotency_key: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Settle command: closes the loan's active life
#[derive(Debug, Deserialize, Clone)]
pub struct SettleCommand {
    pub amount: Decimal,
    pub date: NaiveDate,
    pub memo: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Revolve command: closes the current cycle and opens a successor
#[derive(Debug, Deserialize, Clone)]
pub struct RevolveCommand {
    /// Principal for the new cycle; defaults to the old loan's amount
    pub amount: Option<Decimal>,
    pub sibor_rate: Decimal,
    pub margin: Decimal,
    pub start_date: NaiveDate,
    pub due_date: NaiveDate,
    pub user_id: Option<Uuid>,
}

/// Derived loan balance. Never stored; always recomputed from the ledger.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct LoanBalance {
    pub principal: Decimal,
    pub interest: Decimal,
    pub fees: Decimal,
    pub total: Decimal,
}

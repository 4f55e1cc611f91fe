//! Transaction ledger and audit log models
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Money movement kind. Amounts are always positive; the sign is implied by
/// the type (repayments reduce principal, interest/fees accrue on top).
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "transaction_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Repayment,
    Interest,
    Fee,
}

/// Append-only ledger row tied to a loan/facility/bank triple. Never updated
/// or deleted; corrections are made by appending offsetting entries or by the
/// audited settlement-reversal operation.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Transaction {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Option<Uuid>,
    pub loan_id: Uuid,
    pub facility_id: Uuid,
    pub bank_id: Uuid,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub memo: Option<String>,
    pub reference: Option<String>,
    /// Structured breakdown, e.g. {"settlement": "400000.00"}
    pub allocation: Option<serde_json::Value>,
    /// Unique per loan; a retried command with the same key must not
    /// double-post
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to append a ledger transaction
#[derive(Debug, Deserialize, Clone)]
pub struct NewTransaction {
    pub user_id: Option<Uuid>,
    pub loan_id: Uuid,
    pub facility_id: Uuid,
    pub bank_id: Uuid,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub memo: Option<String>,
    pub reference: Option<String>,
    pub allocation: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
}

/// Caller-facing request to record a ledger transaction against a loan. The
/// facility and bank attribution is derived from the loan, never supplied.
#[derive(Debug, Deserialize, Clone)]
pub struct RecordTransactionRequest {
    pub loan_id: Uuid,
    pub tx_type: TransactionType,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub memo: Option<String>,
    pub reference: Option<String>,
    pub allocation: Option<serde_json::Value>,
    pub idempotency_key: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Filters for listing and counting transactions. `list` and `count` honor
/// exactly the same filter set; `limit`/`offset` apply only to `list`.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TransactionFilter {
    pub loan_id: Option<Uuid>,
    pub facility_id: Option<Uuid>,
    pub bank_id: Option<Uuid>,
    pub tx_type: Option<TransactionType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Append-only audit record for state-changing actions, required for any
/// operation that mutates a previously final state.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct AuditEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity: String,
    pub entity_id: Uuid,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Audit event payload prior to persistence
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity: String,
    pub entity_id: Uuid,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

//! Loan lifecycle operations
//!
//! Draws, payments, settlement, reversal, revolve and cancellation. Every
//! status change goes through the store's atomic loan commit with a status
//! guard, so a concurrent retry can never apply a transition twice.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::types::chrono::Utc;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::model::{NewAuditEvent, NewTransaction, TransactionFilter, TransactionType};
use crate::ledger::service::resolve_attachment;
use crate::loan::balance;
use crate::loan::model::{
    CreateLoanRequest, Loan, LoanBalance, LoanStatus, PaymentCommand, RevolveCommand,
    SettleCommand,
};
use crate::money;
use crate::store::{
    CommitOutcome, LedgerStore, LoanCommit, LoanFilter, LoanUpdate, NewLoan,
};

/// Settlement idempotency key: one settlement per loan per date can post
fn settlement_key(loan_id: Uuid, date: NaiveDate) -> String {
    format!("SETTLE:{}:{}", loan_id, date)
}

/// Human-readable settlement reference derived from the loan id
fn settlement_reference(loan_id: Uuid) -> String {
    format!("SETTLE-{}", &loan_id.to_string()[..8])
}

#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn LedgerStore>,
}

impl LoanService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Draw a loan against a facility (or, legacy path, a credit line).
    /// Overdrawing the facility limit is allowed; availability is a separate
    /// advisory check.
    pub async fn create_loan(
        &self,
        org_id: Uuid,
        request: CreateLoanRequest,
    ) -> LedgerResult<Loan> {
        money::require_positive(request.amount, "loan amount")?;
        if request.sibor_rate < Decimal::ZERO || request.margin < Decimal::ZERO {
            return Err(LedgerError::Validation(
                "Rates must not be negative".to_string(),
            ));
        }
        if request.due_date <= request.start_date {
            return Err(LedgerError::Validation(
                "Due date must fall after the start date".to_string(),
            ));
        }

        // Attachment must resolve to an owned, active facility before the
        // row is written
        let facility_id = match (request.facility_id, request.credit_line_id) {
            (Some(facility_id), _) => facility_id,
            (None, Some(credit_line_id)) => {
                self.store
                    .get_credit_line(org_id, credit_line_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Credit line"))?
                    .facility_id
            }
            (None, None) => {
                return Err(LedgerError::Validation(
                    "A facility or credit line is required".to_string(),
                ))
            }
        };
        let facility = self
            .store
            .get_facility(org_id, facility_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Facility"))?;
        if !facility.status.is_active() {
            return Err(LedgerError::Validation(
                "Cannot draw against an inactive facility".to_string(),
            ));
        }

        let loan = self
            .store
            .insert_loan(
                org_id,
                NewLoan {
                    facility_id: request.facility_id,
                    credit_line_id: request.credit_line_id,
                    amount: money::round(request.amount),
                    sibor_rate: request.sibor_rate,
                    margin: request.margin,
                    bank_rate: request.sibor_rate + request.margin,
                    start_date: request.start_date,
                    due_date: request.due_date,
                    charges_due_date: request.charges_due_date,
                    status: LoanStatus::Active,
                    parent_loan_id: None,
                    cycle_number: 1,
                    last_accrual_date: None,
                },
            )
            .await?;

        tracing::info!(
            loan_id = %loan.id,
            facility_id = %facility.id,
            amount = %loan.amount,
            "loan drawn"
        );
        Ok(loan)
    }

    pub async fn get_loan(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Loan> {
        self.store
            .get_loan(org_id, id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Loan"))
    }

    pub async fn list_loans(&self, org_id: Uuid, filter: LoanFilter) -> LedgerResult<Vec<Loan>> {
        self.store.list_loans(org_id, &filter).await
    }

    /// Post a repayment to the loan's ledger. The loan's status is untouched;
    /// a fully repaid loan still requires an explicit settlement.
    pub async fn process_payment(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        command: PaymentCommand,
    ) -> LedgerResult<CommitOutcome> {
        money::require_positive(command.amount, "payment amount")?;

        let loan = self.get_loan(org_id, loan_id).await?;
        let (facility_id, bank_id) = resolve_attachment(self.store.as_ref(), org_id, &loan).await?;

        let outcome = self
            .store
            .commit_loan_change(
                org_id,
                LoanCommit {
                    loan_id,
                    operation: "pay",
                    guard: Vec::new(),
                    update: LoanUpdate::None,
                    transaction: Some(NewTransaction {
                        user_id: command.user_id,
                        loan_id,
                        facility_id,
                        bank_id,
                        tx_type: TransactionType::Repayment,
                        amount: money::round(command.amount),
                        date: command.date,
                        memo: command.memo,
                        reference: command.reference,
                        allocation: None,
                        idempotency_key: command.idempotency_key,
                    }),
                    successor: None,
                    audit: None,
                },
            )
            .await?;

        if outcome.deduplicated {
            tracing::info!(loan_id = %loan_id, "duplicate payment key, returning prior transaction");
        } else {
            tracing::info!(loan_id = %loan_id, amount = %command.amount, "payment recorded");
        }
        Ok(outcome)
    }

    /// Settle a loan: mark it settled and post the settlement repayment in
    /// one atomic commit. Retrying the same loan and date returns the
    /// original settlement instead of failing on the state guard.
    pub async fn settle_loan(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        command: SettleCommand,
    ) -> LedgerResult<CommitOutcome> {
        money::require_positive(command.amount, "settlement amount")?;

        let loan = self.get_loan(org_id, loan_id).await?;
        let (facility_id, bank_id) = resolve_attachment(self.store.as_ref(), org_id, &loan).await?;

        let amount = money::round(command.amount);
        let outcome = self
            .store
            .commit_loan_change(
                org_id,
                LoanCommit {
                    loan_id,
                    operation: "settle",
                    guard: vec![LoanStatus::Active, LoanStatus::Overdue],
                    update: LoanUpdate::Settle {
                        settled_date: command.date,
                        settled_amount: amount,
                    },
                    transaction: Some(NewTransaction {
                        user_id: command.user_id,
                        loan_id,
                        facility_id,
                        bank_id,
                        tx_type: TransactionType::Repayment,
                        amount,
                        date: command.date,
                        memo: command.memo,
                        reference: Some(settlement_reference(loan_id)),
                        allocation: Some(json!({ "settlement": amount })),
                        idempotency_key: Some(settlement_key(loan_id, command.date)),
                    }),
                    successor: None,
                    audit: None,
                },
            )
            .await?;

        if outcome.deduplicated {
            tracing::info!(loan_id = %loan_id, "settlement replay, returning prior result");
        } else {
            tracing::info!(loan_id = %loan_id, amount = %amount, "loan settled");
        }
        Ok(outcome)
    }

    /// Reverse a settlement: reopen the loan as active and record an audit
    /// event with before/after snapshots. The settlement transaction stays in
    /// the ledger untouched; the reversal is visible through the loan fields
    /// and the audit trail.
    pub async fn reverse_settlement(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        reason: String,
        actor_id: Option<Uuid>,
    ) -> LedgerResult<Loan> {
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation(
                "A reversal reason is required".to_string(),
            ));
        }

        let before = self.get_loan(org_id, loan_id).await?;
        let reversed_at = Utc::now();

        let outcome = self
            .store
            .commit_loan_change(
                org_id,
                LoanCommit {
                    loan_id,
                    operation: "reverse settlement of",
                    guard: vec![LoanStatus::Settled],
                    update: LoanUpdate::ReverseSettlement {
                        reversed_at,
                        reason: reason.clone(),
                        reversed_by: actor_id,
                    },
                    transaction: None,
                    successor: None,
                    audit: Some(NewAuditEvent {
                        actor_id,
                        action: "loan.settlement_reversed".to_string(),
                        entity: "loan".to_string(),
                        entity_id: loan_id,
                        before: json!({
                            "status": before.status.as_str(),
                            "settled_date": before.settled_date,
                            "settled_amount": before.settled_amount,
                        }),
                        after: json!({
                            "status": LoanStatus::Active.as_str(),
                            "reversal_reason": reason,
                            "reversed_at": reversed_at,
                        }),
                    }),
                },
            )
            .await?;

        tracing::warn!(loan_id = %loan_id, "settlement reversed");
        Ok(outcome.loan)
    }

    /// Revolve a loan on a revolving facility: the current cycle is closed
    /// as settled and a successor cycle opens with the lineage recorded.
    pub async fn revolve_loan(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        command: RevolveCommand,
    ) -> LedgerResult<CommitOutcome> {
        if command.due_date <= command.start_date {
            return Err(LedgerError::Validation(
                "Due date must fall after the start date".to_string(),
            ));
        }
        if command.sibor_rate < Decimal::ZERO || command.margin < Decimal::ZERO {
            return Err(LedgerError::Validation(
                "Rates must not be negative".to_string(),
            ));
        }

        let loan = self.get_loan(org_id, loan_id).await?;
        let (facility_id, _) = resolve_attachment(self.store.as_ref(), org_id, &loan).await?;
        let facility = self
            .store
            .get_facility(org_id, facility_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Facility"))?;
        if !facility.facility_type.is_revolving() {
            return Err(LedgerError::Validation(
                "Only loans on revolving facilities can revolve".to_string(),
            ));
        }

        let amount = money::round(command.amount.unwrap_or(loan.amount));
        money::require_positive(amount, "revolve amount")?;

        let outcome = self
            .store
            .commit_loan_change(
                org_id,
                LoanCommit {
                    loan_id,
                    operation: "revolve",
                    guard: vec![LoanStatus::Active, LoanStatus::Overdue],
                    update: LoanUpdate::Settle {
                        settled_date: command.start_date,
                        settled_amount: loan.amount,
                    },
                    transaction: None,
                    successor: Some(NewLoan {
                        facility_id: loan.facility_id,
                        credit_line_id: loan.credit_line_id,
                        amount,
                        sibor_rate: command.sibor_rate,
                        margin: command.margin,
                        bank_rate: command.sibor_rate + command.margin,
                        start_date: command.start_date,
                        due_date: command.due_date,
                        charges_due_date: None,
                        status: LoanStatus::Active,
                        parent_loan_id: Some(loan.id),
                        cycle_number: loan.cycle_number + 1,
                        last_accrual_date: Some(command.start_date),
                    }),
                    audit: Some(NewAuditEvent {
                        actor_id: command.user_id,
                        action: "loan.revolved".to_string(),
                        entity: "loan".to_string(),
                        entity_id: loan_id,
                        before: json!({
                            "status": loan.status.as_str(),
                            "cycle_number": loan.cycle_number,
                            "amount": loan.amount,
                        }),
                        after: json!({
                            "status": LoanStatus::Settled.as_str(),
                            "successor_amount": amount,
                            "successor_cycle": loan.cycle_number + 1,
                        }),
                    }),
                },
            )
            .await?;

        if let Some(successor) = &outcome.successor {
            tracing::info!(
                loan_id = %loan_id,
                successor_id = %successor.id,
                cycle = successor.cycle_number,
                "loan revolved"
            );
        }
        Ok(outcome)
    }

    /// Cancel an open loan. The ledger keeps whatever was already posted.
    pub async fn cancel_loan(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> LedgerResult<Loan> {
        let before = self.get_loan(org_id, loan_id).await?;

        let outcome = self
            .store
            .commit_loan_change(
                org_id,
                LoanCommit {
                    loan_id,
                    operation: "cancel",
                    guard: vec![LoanStatus::Active, LoanStatus::Overdue],
                    update: LoanUpdate::Cancel,
                    transaction: None,
                    successor: None,
                    audit: Some(NewAuditEvent {
                        actor_id,
                        action: "loan.cancelled".to_string(),
                        entity: "loan".to_string(),
                        entity_id: loan_id,
                        before: json!({ "status": before.status.as_str() }),
                        after: json!({ "status": LoanStatus::Cancelled.as_str() }),
                    }),
                },
            )
            .await?;

        tracing::info!(loan_id = %loan_id, "loan cancelled");
        Ok(outcome.loan)
    }

    /// Hard delete of a cancelled loan. Ledger transactions referencing the
    /// loan are deliberately left in place; the ledger never loses history.
    pub async fn permanently_delete_loan(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> LedgerResult<()> {
        let loan = self.get_loan(org_id, loan_id).await?;
        if loan.status != LoanStatus::Cancelled {
            return Err(LedgerError::InvalidStateTransition {
                operation: "permanently delete",
                current: loan.status.as_str().to_string(),
            });
        }

        if !self.store.delete_cancelled_loan(org_id, loan_id).await? {
            return Err(LedgerError::not_found("Loan"));
        }

        self.store
            .insert_audit_event(
                org_id,
                NewAuditEvent {
                    actor_id,
                    action: "loan.permanently_deleted".to_string(),
                    entity: "loan".to_string(),
                    entity_id: loan_id,
                    before: json!({
                        "status": loan.status.as_str(),
                        "amount": loan.amount,
                        "facility_id": loan.facility_id,
                    }),
                    after: serde_json::Value::Null,
                },
            )
            .await?;

        tracing::warn!(loan_id = %loan_id, "loan permanently deleted");
        Ok(())
    }

    /// Sweep active loans past their due date into overdue
    pub async fn mark_overdue(&self, org_id: Uuid, as_of: NaiveDate) -> LedgerResult<Vec<Uuid>> {
        let flagged = self.store.mark_overdue_loans(org_id, as_of).await?;
        if !flagged.is_empty() {
            tracing::info!(count = flagged.len(), "loans marked overdue");
        }
        Ok(flagged)
    }

    /// Derive the loan's current balance from its ledger
    pub async fn calculate_balance(&self, org_id: Uuid, loan_id: Uuid) -> LedgerResult<LoanBalance> {
        let loan = self.get_loan(org_id, loan_id).await?;
        let entries = self
            .store
            .list_transactions(
                org_id,
                &TransactionFilter {
                    loan_id: Some(loan_id),
                    ..Default::default()
                },
            )
            .await?;
        Ok(balance::calculate(loan.amount, &entries))
    }
}

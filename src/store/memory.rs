//! In-memory ledger store
//!
//! Backs development and the integration test suite. A single `RwLock`
//! guards the whole state, so every write (including `commit_loan_change`)
//! is naturally atomic and serialized, mirroring the row lock the
//! PostgreSQL store takes.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
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

#[derive(Default)]
struct MemoryState {
    banks: HashMap<Uuid, Bank>,
    facilities: HashMap<Uuid, Facility>,
    credit_lines: HashMap<Uuid, CreditLine>,
    collateral: HashMap<Uuid, Collateral>,
    assignments: HashMap<Uuid, CollateralAssignment>,
    loans: HashMap<Uuid, Loan>,
    transactions: Vec<Transaction>,
    audit_events: Vec<AuditEvent>,
}

/// Ledger store holding everything in process memory
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: RwLock<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transaction_matches(tx: &Transaction, org_id: Uuid, filter: &TransactionFilter) -> bool {
        if tx.organization_id != org_id {
            return false;
        }
        if let Some(loan_id) = filter.loan_id {
            if tx.loan_id != loan_id {
                return false;
            }
        }
        if let Some(facility_id) = filter.facility_id {
            if tx.facility_id != facility_id {
                return false;
            }
        }
        if let Some(bank_id) = filter.bank_id {
            if tx.bank_id != bank_id {
                return false;
            }
        }
        if let Some(tx_type) = filter.tx_type {
            if tx.tx_type != tx_type {
                return false;
            }
        }
        if let Some(date_from) = filter.date_from {
            if tx.date < date_from {
                return false;
            }
        }
        if let Some(date_to) = filter.date_to {
            if tx.date > date_to {
                return false;
            }
        }
        true
    }

    fn build_transaction(org_id: Uuid, new_tx: &NewTransaction) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            organization_id: org_id,
            user_id: new_tx.user_id,
            loan_id: new_tx.loan_id,
            facility_id: new_tx.facility_id,
            bank_id: new_tx.bank_id,
            tx_type: new_tx.tx_type,
            amount: new_tx.amount,
            date: new_tx.date,
            memo: new_tx.memo.clone(),
            reference: new_tx.reference.clone(),
            allocation: new_tx.allocation.clone(),
            idempotency_key: new_tx.idempotency_key.clone(),
            created_at: Utc::now(),
        }
    }

    fn build_loan(org_id: Uuid, new_loan: &NewLoan) -> Loan {
        let now = Utc::now();
        Loan {
            id: Uuid::new_v4(),
            organization_id: org_id,
            facility_id: new_loan.facility_id,
            credit_line_id: new_loan.credit_line_id,
            amount: new_loan.amount,
            sibor_rate: new_loan.sibor_rate,
            margin: new_loan.margin,
            bank_rate: new_loan.bank_rate,
            start_date: new_loan.start_date,
            due_date: new_loan.due_date,
            charges_due_date: new_loan.charges_due_date,
            status: new_loan.status,
            settled_date: None,
            settled_amount: None,
            reversed_at: None,
            reversal_reason: None,
            reversed_by: None,
            parent_loan_id: new_loan.parent_loan_id,
            cycle_number: new_loan.cycle_number,
            last_accrual_date: new_loan.last_accrual_date,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait::async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn insert_bank(&self, req: CreateBankRequest) -> LedgerResult<Bank> {
        let now = Utc::now();
        let bank = Bank {
            id: Uuid::new_v4(),
            organization_id: req.organization_id,
            code: req.code,
            name: req.name,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().unwrap();
        state.banks.insert(bank.id, bank.clone());
        Ok(bank)
    }

    async fn get_bank(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Bank>> {
        let state = self.state.read().unwrap();
        Ok(state
            .banks
            .get(&id)
            .filter(|b| b.organization_id.is_none() || b.organization_id == Some(org_id))
            .cloned())
    }

    async fn find_bank_by_code(&self, org_id: Uuid, code: &str) -> LedgerResult<Option<Bank>> {
        let state = self.state.read().unwrap();
        Ok(state
            .banks
            .values()
            .find(|b| {
                b.code == code
                    && (b.organization_id.is_none() || b.organization_id == Some(org_id))
            })
            .cloned())
    }

    async fn list_banks(&self, org_id: Uuid) -> LedgerResult<Vec<Bank>> {
        let state = self.state.read().unwrap();
        let mut banks: Vec<Bank> = state
            .banks
            .values()
            .filter(|b| b.organization_id.is_none() || b.organization_id == Some(org_id))
            .cloned()
            .collect();
        banks.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(banks)
    }

    async fn set_bank_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Bank>> {
        let mut state = self.state.write().unwrap();
        match state.banks.get_mut(&id) {
            Some(bank) if bank.organization_id == Some(org_id) => {
                bank.status = status;
                bank.updated_at = Utc::now();
                Ok(Some(bank.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_facility(
        &self,
        org_id: Uuid,
        req: CreateFacilityRequest,
    ) -> LedgerResult<Facility> {
        let now = Utc::now();
        let facility = Facility {
            id: Uuid::new_v4(),
            organization_id: org_id,
            bank_id: req.bank_id,
            name: req.name,
            credit_limit: req.credit_limit,
            cost_of_funding: req.cost_of_funding,
            facility_type: req.facility_type,
            revolving_tenor_months: req.revolving_tenor_months,
            status: RecordStatus::Active,
            start_date: req.start_date,
            expiry_date: req.expiry_date,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().unwrap();
        state.facilities.insert(facility.id, facility.clone());
        Ok(facility)
    }

    async fn get_facility(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Facility>> {
        let state = self.state.read().unwrap();
        Ok(state
            .facilities
            .get(&id)
            .filter(|f| f.organization_id == org_id)
            .cloned())
    }

    async fn list_facilities(&self, org_id: Uuid) -> LedgerResult<Vec<Facility>> {
        let state = self.state.read().unwrap();
        let mut facilities: Vec<Facility> = state
            .facilities
            .values()
            .filter(|f| f.organization_id == org_id)
            .cloned()
            .collect();
        facilities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(facilities)
    }

    async fn set_facility_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Facility>> {
        let mut state = self.state.write().unwrap();
        match state.facilities.get_mut(&id) {
            Some(facility) if facility.organization_id == org_id => {
                facility.status = status;
                facility.updated_at = Utc::now();
                Ok(Some(facility.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_credit_line(
        &self,
        org_id: Uuid,
        req: CreateCreditLineRequest,
    ) -> LedgerResult<CreditLine> {
        let now = Utc::now();
        let line = CreditLine {
            id: Uuid::new_v4(),
            organization_id: org_id,
            facility_id: req.facility_id,
            name: req.name,
            allocated_limit: req.allocated_limit,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().unwrap();
        state.credit_lines.insert(line.id, line.clone());
        Ok(line)
    }

    async fn get_credit_line(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<CreditLine>> {
        let state = self.state.read().unwrap();
        Ok(state
            .credit_lines
            .get(&id)
            .filter(|l| l.organization_id == org_id)
            .cloned())
    }

    async fn list_credit_lines(
        &self,
        org_id: Uuid,
        facility_id: Option<Uuid>,
    ) -> LedgerResult<Vec<CreditLine>> {
        let state = self.state.read().unwrap();
        let mut lines: Vec<CreditLine> = state
            .credit_lines
            .values()
            .filter(|l| {
                l.organization_id == org_id
                    && facility_id.map_or(true, |fid| l.facility_id == fid)
            })
            .cloned()
            .collect();
        lines.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lines)
    }

    async fn insert_collateral(
        &self,
        org_id: Uuid,
        req: CreateCollateralRequest,
    ) -> LedgerResult<Collateral> {
        let now = Utc::now();
        let collateral = Collateral {
            id: Uuid::new_v4(),
            organization_id: org_id,
            description: req.description,
            current_value: req.current_value,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().unwrap();
        state.collateral.insert(collateral.id, collateral.clone());
        Ok(collateral)
    }

    async fn get_collateral(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Collateral>> {
        let state = self.state.read().unwrap();
        Ok(state
            .collateral
            .get(&id)
            .filter(|c| c.organization_id == org_id)
            .cloned())
    }

    async fn list_collateral(&self, org_id: Uuid) -> LedgerResult<Vec<Collateral>> {
        let state = self.state.read().unwrap();
        let mut rows: Vec<Collateral> = state
            .collateral
            .values()
            .filter(|c| c.organization_id == org_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn set_collateral_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<Collateral>> {
        let mut state = self.state.write().unwrap();
        match state.collateral.get_mut(&id) {
            Some(collateral) if collateral.organization_id == org_id => {
                collateral.status = status;
                collateral.updated_at = Utc::now();
                Ok(Some(collateral.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_assignment(
        &self,
        org_id: Uuid,
        assignment: NewAssignment,
    ) -> LedgerResult<CollateralAssignment> {
        let now = Utc::now();
        let row = CollateralAssignment {
            id: Uuid::new_v4(),
            organization_id: org_id,
            collateral_id: assignment.collateral_id,
            bank_id: assignment.bank_id,
            facility_id: assignment.facility_id,
            credit_line_id: assignment.credit_line_id,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.write().unwrap();
        state.assignments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_assignments(
        &self,
        org_id: Uuid,
        active_only: bool,
    ) -> LedgerResult<Vec<CollateralAssignment>> {
        let state = self.state.read().unwrap();
        let mut rows: Vec<CollateralAssignment> = state
            .assignments
            .values()
            .filter(|a| {
                a.organization_id == org_id && (!active_only || a.status.is_active())
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn set_assignment_status(
        &self,
        org_id: Uuid,
        id: Uuid,
        status: RecordStatus,
    ) -> LedgerResult<Option<CollateralAssignment>> {
        let mut state = self.state.write().unwrap();
        match state.assignments.get_mut(&id) {
            Some(assignment) if assignment.organization_id == org_id => {
                assignment.status = status;
                assignment.updated_at = Utc::now();
                Ok(Some(assignment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn insert_loan(&self, org_id: Uuid, loan: NewLoan) -> LedgerResult<Loan> {
        let loan = Self::build_loan(org_id, &loan);
        let mut state = self.state.write().unwrap();
        state.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn get_loan(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Option<Loan>> {
        let state = self.state.read().unwrap();
        Ok(state
            .loans
            .get(&id)
            .filter(|l| l.organization_id == org_id)
            .cloned())
    }

    async fn list_loans(&self, org_id: Uuid, filter: &LoanFilter) -> LedgerResult<Vec<Loan>> {
        let state = self.state.read().unwrap();
        let mut loans: Vec<Loan> = state
            .loans
            .values()
            .filter(|l| {
                l.organization_id == org_id
                    && filter.facility_id.map_or(true, |fid| l.facility_id == Some(fid))
                    && filter
                        .credit_line_id
                        .map_or(true, |cid| l.credit_line_id == Some(cid))
                    && filter.status.map_or(true, |s| l.status == s)
                    && (!filter.open_only || l.status.is_open())
            })
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(loans)
    }

    async fn delete_cancelled_loan(&self, org_id: Uuid, id: Uuid) -> LedgerResult<bool> {
        let mut state = self.state.write().unwrap();
        let removable = state
            .loans
            .get(&id)
            .map(|l| l.organization_id == org_id && l.status == LoanStatus::Cancelled)
            .unwrap_or(false);
        if removable {
            state.loans.remove(&id);
        }
        Ok(removable)
    }

    async fn mark_overdue_loans(&self, org_id: Uuid, as_of: NaiveDate) -> LedgerResult<Vec<Uuid>> {
        let mut state = self.state.write().unwrap();
        let now = Utc::now();
        let mut flagged = Vec::new();
        for loan in state.loans.values_mut() {
            if loan.organization_id == org_id
                && loan.status == LoanStatus::Active
                && loan.due_date < as_of
            {
                loan.status = LoanStatus::Overdue;
                loan.updated_at = now;
                flagged.push(loan.id);
            }
        }
        Ok(flagged)
    }

    async fn find_transaction_by_key(
        &self,
        org_id: Uuid,
        loan_id: Uuid,
        key: &str,
    ) -> LedgerResult<Option<Transaction>> {
        let state = self.state.read().unwrap();
        Ok(state
            .transactions
            .iter()
            .find(|tx| {
                tx.organization_id == org_id
                    && tx.loan_id == loan_id
                    && tx.idempotency_key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn list_transactions(
        &self,
        org_id: Uuid,
        filter: &TransactionFilter,
    ) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.read().unwrap();
        let mut rows: Vec<Transaction> = state
            .transactions
            .iter()
            .filter(|tx| Self::transaction_matches(tx, org_id, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let rows: Vec<Transaction> = match filter.limit {
            Some(limit) => rows
                .into_iter()
                .skip(offset)
                .take(limit.max(0) as usize)
                .collect(),
            None => rows.into_iter().skip(offset).collect(),
        };
        Ok(rows)
    }

    async fn count_transactions(
        &self,
        org_id: Uuid,
        filter: &TransactionFilter,
    ) -> LedgerResult<i64> {
        let state = self.state.read().unwrap();
        let count = state
            .transactions
            .iter()
            .filter(|tx| Self::transaction_matches(tx, org_id, filter))
            .count();
        Ok(count as i64)
    }

    async fn commit_loan_change(
        &self,
        org_id: Uuid,
        commit: LoanCommit,
    ) -> LedgerResult<CommitOutcome> {
        let mut state = self.state.write().unwrap();

        let loan = state
            .loans
            .get(&commit.loan_id)
            .filter(|l| l.organization_id == org_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("Loan"))?;

        // Replay check under the same write lock the mutation uses. A
        // repeated key suppresses only the inserts; the state update still
        // applies when the guard passes, so a replayed settle on a loan a
        // reversal reopened transitions it again instead of no-opping.
        let mut replayed: Option<Transaction> = None;
        if let Some(new_tx) = &commit.transaction {
            if let Some(key) = &new_tx.idempotency_key {
                replayed = state
                    .transactions
                    .iter()
                    .find(|tx| {
                        tx.organization_id == org_id
                            && tx.loan_id == commit.loan_id
                            && tx.idempotency_key.as_ref() == Some(key)
                    })
                    .cloned();
            }
        }
        let deduplicated = replayed.is_some();

        if !commit.guard.is_empty() && !commit.guard.contains(&loan.status) {
            if let Some(existing) = replayed {
                // replayed command whose transition already happened
                return Ok(CommitOutcome {
                    loan,
                    transaction: Some(existing),
                    successor: None,
                    deduplicated: true,
                });
            }
            return Err(LedgerError::InvalidStateTransition {
                operation: commit.operation,
                current: loan.status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let updated_loan = {
            let loan = state
                .loans
                .get_mut(&commit.loan_id)
                .ok_or_else(|| LedgerError::not_found("Loan"))?;
            match &commit.update {
                LoanUpdate::None => {}
                LoanUpdate::Settle {
                    settled_date,
                    settled_amount,
                } => {
                    loan.status = LoanStatus::Settled;
                    loan.settled_date = Some(*settled_date);
                    loan.settled_amount = Some(*settled_amount);
                    loan.updated_at = now;
                }
                LoanUpdate::ReverseSettlement {
                    reversed_at,
                    reason,
                    reversed_by,
                } => {
                    loan.status = LoanStatus::Active;
                    loan.settled_date = None;
                    loan.settled_amount = None;
                    loan.reversed_at = Some(*reversed_at);
                    loan.reversal_reason = Some(reason.clone());
                    loan.reversed_by = *reversed_by;
                    loan.updated_at = now;
                }
                LoanUpdate::Cancel => {
                    loan.status = LoanStatus::Cancelled;
                    loan.updated_at = now;
                }
            }
            loan.clone()
        };

        // A replayed key already posted its rows; only the state update above
        // is re-applied
        let transaction = match (&commit.transaction, replayed) {
            (_, Some(existing)) => Some(existing),
            (Some(new_tx), None) => {
                let tx = Self::build_transaction(org_id, new_tx);
                state.transactions.push(tx.clone());
                Some(tx)
            }
            (None, None) => None,
        };

        let successor = match &commit.successor {
            Some(new_loan) if !deduplicated => {
                let loan = Self::build_loan(org_id, new_loan);
                state.loans.insert(loan.id, loan.clone());
                Some(loan)
            }
            _ => None,
        };

        if let (Some(audit), false) = (&commit.audit, deduplicated) {
            state.audit_events.push(AuditEvent {
                id: Uuid::new_v4(),
                organization_id: org_id,
                actor_id: audit.actor_id,
                action: audit.action.clone(),
                entity: audit.entity.clone(),
                entity_id: audit.entity_id,
                before: audit.before.clone(),
                after: audit.after.clone(),
                created_at: now,
            });
        }

        Ok(CommitOutcome {
            loan: updated_loan,
            transaction,
            successor,
            deduplicated,
        })
    }

    async fn load_portfolio_snapshot(&self, org_id: Uuid) -> LedgerResult<PortfolioSnapshot> {
        let state = self.state.read().unwrap();
        Ok(PortfolioSnapshot {
            banks: state
                .banks
                .values()
                .filter(|b| b.organization_id.is_none() || b.organization_id == Some(org_id))
                .cloned()
                .collect(),
            facilities: state
                .facilities
                .values()
                .filter(|f| f.organization_id == org_id && f.status.is_active())
                .cloned()
                .collect(),
            credit_lines: state
                .credit_lines
                .values()
                .filter(|l| l.organization_id == org_id)
                .cloned()
                .collect(),
            loans: state
                .loans
                .values()
                .filter(|l| l.organization_id == org_id && l.status.is_open())
                .cloned()
                .collect(),
            collateral: state
                .collateral
                .values()
                .filter(|c| c.organization_id == org_id && c.status.is_active())
                .cloned()
                .collect(),
            assignments: state
                .assignments
                .values()
                .filter(|a| a.organization_id == org_id && a.status.is_active())
                .cloned()
                .collect(),
        })
    }

    async fn insert_audit_event(
        &self,
        org_id: Uuid,
        event: NewAuditEvent,
    ) -> LedgerResult<AuditEvent> {
        let row = AuditEvent {
            id: Uuid::new_v4(),
            organization_id: org_id,
            actor_id: event.actor_id,
            action: event.action,
            entity: event.entity,
            entity_id: event.entity_id,
            before: event.before,
            after: event.after,
            created_at: Utc::now(),
        };
        let mut state = self.state.write().unwrap();
        state.audit_events.push(row.clone());
        Ok(row)
    }

    async fn list_audit_events(
        &self,
        org_id: Uuid,
        entity_id: Option<Uuid>,
    ) -> LedgerResult<Vec<AuditEvent>> {
        let state = self.state.read().unwrap();
        let mut rows: Vec<AuditEvent> = state
            .audit_events
            .iter()
            .filter(|e| {
                e.organization_id == org_id
                    && entity_id.map_or(true, |id| e.entity_id == id)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }
}

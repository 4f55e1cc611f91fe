//! Transaction ledger operations
//!
//! The ledger is append-only. Posting goes through the store's atomic loan
//! commit so the idempotency replay check and the insert share one write
//! lock; a retried key can never double-post.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::model::{
    AuditEvent, NewTransaction, RecordTransactionRequest, Transaction, TransactionFilter,
};
use crate::loan::model::Loan;
use crate::models::PaginatedResponse;
use crate::money;
use crate::store::{LedgerStore, LoanCommit, LoanUpdate};

/// Resolve the facility and bank a loan draws against. Legacy loans attach
/// via a credit line and resolve through it.
pub(crate) async fn resolve_attachment(
    store: &dyn LedgerStore,
    org_id: Uuid,
    loan: &Loan,
) -> LedgerResult<(Uuid, Uuid)> {
    let facility_id = match (loan.facility_id, loan.credit_line_id) {
        (Some(facility_id), _) => facility_id,
        (None, Some(credit_line_id)) => {
            store
                .get_credit_line(org_id, credit_line_id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Credit line"))?
                .facility_id
        }
        (None, None) => {
            return Err(LedgerError::Validation(
                "Loan is not attached to a facility or credit line".to_string(),
            ))
        }
    };
    let facility = store
        .get_facility(org_id, facility_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Facility"))?;
    Ok((facility.id, facility.bank_id))
}

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Append a transaction to a loan's ledger. A repeated idempotency key
    /// returns the originally recorded row without writing anything.
    pub async fn record_transaction(
        &self,
        org_id: Uuid,
        request: RecordTransactionRequest,
    ) -> LedgerResult<Transaction> {
        money::require_positive(request.amount, "transaction amount")?;

        let loan = self
            .store
            .get_loan(org_id, request.loan_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Loan"))?;
        let (facility_id, bank_id) = resolve_attachment(self.store.as_ref(), org_id, &loan).await?;

        let outcome = self
            .store
            .commit_loan_change(
                org_id,
                LoanCommit {
                    loan_id: loan.id,
                    operation: "post to",
                    guard: Vec::new(),
                    update: LoanUpdate::None,
                    transaction: Some(NewTransaction {
                        user_id: request.user_id,
                        loan_id: loan.id,
                        facility_id,
                        bank_id,
                        tx_type: request.tx_type,
                        amount: money::round(request.amount),
                        date: request.date,
                        memo: request.memo,
                        reference: request.reference,
                        allocation: request.allocation,
                        idempotency_key: request.idempotency_key,
                    }),
                    successor: None,
                    audit: None,
                },
            )
            .await?;

        // commit always carries a transaction here
        let transaction = outcome
            .transaction
            .ok_or_else(|| LedgerError::Database("commit returned no transaction".to_string()))?;

        if outcome.deduplicated {
            tracing::info!(
                loan_id = %loan.id,
                transaction_id = %transaction.id,
                "duplicate idempotency key, returning prior transaction"
            );
        } else {
            tracing::info!(
                loan_id = %loan.id,
                transaction_id = %transaction.id,
                tx_type = ?transaction.tx_type,
                amount = %transaction.amount,
                "transaction recorded"
            );
        }
        Ok(transaction)
    }

    /// Full ledger for one loan, newest first
    pub async fn loan_ledger(&self, org_id: Uuid, loan_id: Uuid) -> LedgerResult<Vec<Transaction>> {
        self.store
            .get_loan(org_id, loan_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Loan"))?;
        self.store
            .list_transactions(
                org_id,
                &TransactionFilter {
                    loan_id: Some(loan_id),
                    ..Default::default()
                },
            )
            .await
    }

    /// Filtered transaction listing with a total count over the same filters
    pub async fn list_transactions(
        &self,
        org_id: Uuid,
        filter: TransactionFilter,
    ) -> LedgerResult<PaginatedResponse<Transaction>> {
        let limit = filter.limit.unwrap_or(50);
        let offset = filter.offset.unwrap_or(0);
        let filter = TransactionFilter {
            limit: Some(limit),
            offset: Some(offset),
            ..filter
        };

        let total = self.store.count_transactions(org_id, &filter).await?;
        let data = self.store.list_transactions(org_id, &filter).await?;

        Ok(PaginatedResponse {
            data,
            total,
            limit,
            offset,
        })
    }

    pub async fn audit_trail(
        &self,
        org_id: Uuid,
        entity_id: Option<Uuid>,
    ) -> LedgerResult<Vec<AuditEvent>> {
        self.store.list_audit_events(org_id, entity_id).await
    }
}

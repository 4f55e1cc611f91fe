//! Bank registry operations

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::bank::model::{Bank, CreateBankRequest};
use crate::error::{LedgerError, LedgerResult};
use crate::models::RecordStatus;
use crate::store::LedgerStore;

#[derive(Clone)]
pub struct BankService {
    store: Arc<dyn LedgerStore>,
}

impl BankService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Register a bank. `organization_id = None` makes it globally visible.
    /// The code must be unique within the caller's visible scope.
    pub async fn create_bank(
        &self,
        org_id: Uuid,
        request: CreateBankRequest,
    ) -> LedgerResult<Bank> {
        request.validate()?;

        if let Some(owner) = request.organization_id {
            if owner != org_id {
                return Err(LedgerError::Validation(
                    "Bank owner must match the calling organization".to_string(),
                ));
            }
        }

        if self
            .store
            .find_bank_by_code(org_id, &request.code)
            .await?
            .is_some()
        {
            return Err(LedgerError::Validation(format!(
                "Bank code '{}' already exists",
                request.code
            )));
        }

        let bank = self.store.insert_bank(request).await?;
        tracing::info!(bank_id = %bank.id, code = %bank.code, "bank created");
        Ok(bank)
    }

    pub async fn get_bank(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Bank> {
        self.store
            .get_bank(org_id, id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bank"))
    }

    /// Banks visible to the organization: its own plus global ones
    pub async fn list_banks(&self, org_id: Uuid) -> LedgerResult<Vec<Bank>> {
        self.store.list_banks(org_id).await
    }

    /// Soft delete. Global banks are not deletable by tenants.
    pub async fn deactivate_bank(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Bank> {
        let bank = self
            .store
            .set_bank_status(org_id, id, RecordStatus::Inactive)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bank"))?;
        tracing::info!(bank_id = %bank.id, "bank deactivated");
        Ok(bank)
    }

    pub async fn reactivate_bank(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Bank> {
        self.store
            .set_bank_status(org_id, id, RecordStatus::Active)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bank"))
    }
}

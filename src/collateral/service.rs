//! Collateral registration and assignment

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::collateral::model::{
    AssignCollateralRequest, AssignmentTarget, Collateral, CollateralAssignment,
    CreateCollateralRequest,
};
use crate::error::{LedgerError, LedgerResult};
use crate::models::RecordStatus;
use crate::store::{LedgerStore, NewAssignment};

#[derive(Clone)]
pub struct CollateralService {
    store: Arc<dyn LedgerStore>,
}

impl CollateralService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn create_collateral(
        &self,
        org_id: Uuid,
        request: CreateCollateralRequest,
    ) -> LedgerResult<Collateral> {
        request.validate()?;
        let collateral = self.store.insert_collateral(org_id, request).await?;
        tracing::info!(
            collateral_id = %collateral.id,
            value = %collateral.current_value,
            "collateral registered"
        );
        Ok(collateral)
    }

    pub async fn get_collateral(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Collateral> {
        self.store
            .get_collateral(org_id, id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Collateral"))
    }

    pub async fn list_collateral(&self, org_id: Uuid) -> LedgerResult<Vec<Collateral>> {
        self.store.list_collateral(org_id).await
    }

    pub async fn deactivate_collateral(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Collateral> {
        self.store
            .set_collateral_status(org_id, id, RecordStatus::Inactive)
            .await?
            .ok_or_else(|| LedgerError::not_found("Collateral"))
    }

    /// Assign collateral to exactly one target. The same collateral may be
    /// assigned to several targets; each assignment toggles independently.
    pub async fn assign_collateral(
        &self,
        org_id: Uuid,
        request: AssignCollateralRequest,
    ) -> LedgerResult<CollateralAssignment> {
        let collateral = self
            .store
            .get_collateral(org_id, request.collateral_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Collateral"))?;
        if !collateral.status.is_active() {
            return Err(LedgerError::Validation(
                "Cannot assign inactive collateral".to_string(),
            ));
        }

        let mut assignment = NewAssignment {
            collateral_id: collateral.id,
            bank_id: None,
            facility_id: None,
            credit_line_id: None,
        };
        match request.target {
            AssignmentTarget::Bank(id) => {
                self.store
                    .get_bank(org_id, id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Bank"))?;
                assignment.bank_id = Some(id);
            }
            AssignmentTarget::Facility(id) => {
                self.store
                    .get_facility(org_id, id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Facility"))?;
                assignment.facility_id = Some(id);
            }
            AssignmentTarget::CreditLine(id) => {
                self.store
                    .get_credit_line(org_id, id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found("Credit line"))?;
                assignment.credit_line_id = Some(id);
            }
        }

        let row = self.store.insert_assignment(org_id, assignment).await?;
        tracing::info!(
            assignment_id = %row.id,
            collateral_id = %row.collateral_id,
            "collateral assigned"
        );
        Ok(row)
    }

    pub async fn list_assignments(
        &self,
        org_id: Uuid,
        active_only: bool,
    ) -> LedgerResult<Vec<CollateralAssignment>> {
        self.store.list_assignments(org_id, active_only).await
    }

    /// Release an assignment without touching the collateral record
    pub async fn release_assignment(
        &self,
        org_id: Uuid,
        id: Uuid,
    ) -> LedgerResult<CollateralAssignment> {
        self.store
            .set_assignment_status(org_id, id, RecordStatus::Inactive)
            .await?
            .ok_or_else(|| LedgerError::not_found("Collateral assignment"))
    }
}

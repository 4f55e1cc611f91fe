//! Facility and credit line operations

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::error::{LedgerError, LedgerResult};
use crate::facility::model::{
    CreateCreditLineRequest, CreateFacilityRequest, CreditLine, Facility, FacilityAvailability,
};
use crate::models::RecordStatus;
use crate::store::{LedgerStore, LoanFilter};

#[derive(Clone)]
pub struct FacilityService {
    store: Arc<dyn LedgerStore>,
}

impl FacilityService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn create_facility(
        &self,
        org_id: Uuid,
        request: CreateFacilityRequest,
    ) -> LedgerResult<Facility> {
        request.validate()?;

        let bank = self
            .store
            .get_bank(org_id, request.bank_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Bank"))?;
        if !bank.status.is_active() {
            return Err(LedgerError::Validation(
                "Cannot create a facility under an inactive bank".to_string(),
            ));
        }

        if request.facility_type.is_revolving() && request.revolving_tenor_months.is_none() {
            return Err(LedgerError::Validation(
                "Revolving facilities require a tenor".to_string(),
            ));
        }
        if let Some(expiry) = request.expiry_date {
            if expiry <= request.start_date {
                return Err(LedgerError::Validation(
                    "Expiry date must fall after the start date".to_string(),
                ));
            }
        }

        let facility = self.store.insert_facility(org_id, request).await?;
        tracing::info!(
            facility_id = %facility.id,
            bank_id = %facility.bank_id,
            credit_limit = %facility.credit_limit,
            "facility created"
        );
        Ok(facility)
    }

    pub async fn get_facility(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Facility> {
        self.store
            .get_facility(org_id, id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Facility"))
    }

    pub async fn list_facilities(&self, org_id: Uuid) -> LedgerResult<Vec<Facility>> {
        self.store.list_facilities(org_id).await
    }

    pub async fn deactivate_facility(&self, org_id: Uuid, id: Uuid) -> LedgerResult<Facility> {
        let facility = self
            .store
            .set_facility_status(org_id, id, RecordStatus::Inactive)
            .await?
            .ok_or_else(|| LedgerError::not_found("Facility"))?;
        tracing::info!(facility_id = %facility.id, "facility deactivated");
        Ok(facility)
    }

    pub async fn create_credit_line(
        &self,
        org_id: Uuid,
        request: CreateCreditLineRequest,
    ) -> LedgerResult<CreditLine> {
        request.validate()?;

        self.store
            .get_facility(org_id, request.facility_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Facility"))?;

        let line = self.store.insert_credit_line(org_id, request).await?;
        tracing::info!(credit_line_id = %line.id, facility_id = %line.facility_id, "credit line created");
        Ok(line)
    }

    pub async fn get_credit_line(&self, org_id: Uuid, id: Uuid) -> LedgerResult<CreditLine> {
        self.store
            .get_credit_line(org_id, id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Credit line"))
    }

    pub async fn list_credit_lines(
        &self,
        org_id: Uuid,
        facility_id: Option<Uuid>,
    ) -> LedgerResult<Vec<CreditLine>> {
        self.store.list_credit_lines(org_id, facility_id).await
    }

    /// Headroom check against a facility. Outstanding is the sum of open
    /// loan amounts, including legacy loans attached through the facility's
    /// credit lines; `over_limit` flags the overdraw without blocking it.
    pub async fn check_availability(
        &self,
        org_id: Uuid,
        facility_id: Uuid,
        requested: Decimal,
        as_of: NaiveDate,
    ) -> LedgerResult<FacilityAvailability> {
        let facility = self
            .store
            .get_facility(org_id, facility_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Facility"))?;

        let line_ids: HashSet<Uuid> = self
            .store
            .list_credit_lines(org_id, Some(facility_id))
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();
        let open_loans = self
            .store
            .list_loans(
                org_id,
                &LoanFilter {
                    open_only: true,
                    ..Default::default()
                },
            )
            .await?;
        let outstanding: Decimal = open_loans
            .iter()
            .filter(|l| {
                l.facility_id == Some(facility_id)
                    || l.credit_line_id.map_or(false, |id| line_ids.contains(&id))
            })
            .map(|l| l.amount)
            .sum();
        let available = (facility.credit_limit - outstanding).max(Decimal::ZERO);

        Ok(FacilityAvailability {
            facility_id,
            credit_limit: facility.credit_limit,
            outstanding,
            available,
            over_limit: outstanding + requested > facility.credit_limit,
            expired: facility.expiry_date.map_or(false, |d| d < as_of),
        })
    }
}

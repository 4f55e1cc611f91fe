//! Facility and credit line models
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::RecordStatus;

/// Facility type enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "facility_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    Revolving,
    Term,
    Bullet,
    Bridge,
    WorkingCapital,
    NonCashGuarantee,
}

impl FacilityType {
    pub fn is_revolving(self) -> bool {
        matches!(self, FacilityType::Revolving)
    }
}

/// A standing credit line a bank grants an organization, with a limit and a
/// funding margin. The sum of outstanding loans may exceed `credit_limit`;
/// overdraw is surfaced as a warning, never a hard block.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Facility {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub bank_id: Uuid,
    pub name: String,
    pub credit_limit: Decimal,
    /// Funding margin in percent
    pub cost_of_funding: Decimal,
    pub facility_type: FacilityType,
    /// Maximum cycle tenor for revolving facilities, in months
    pub revolving_tenor_months: Option<i32>,
    pub status: RecordStatus,
    pub start_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Legacy sub-allocation within a facility. Newer loans attach directly to
/// the facility.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct CreditLine {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub facility_id: Uuid,
    pub name: String,
    pub allocated_limit: Decimal,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a new facility
#[derive(Debug, Deserialize, Validate)]
pub struct CreateFacilityRequest {
    pub bank_id: Uuid,
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    #[validate(custom = "validate_positive_decimal")]
    pub credit_limit: Decimal,
    #[validate(custom = "validate_non_negative_decimal")]
    pub cost_of_funding: Decimal,
    pub facility_type: FacilityType,
    pub revolving_tenor_months: Option<i32>,
    pub start_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

/// Request to create a credit line under a facility
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCreditLineRequest {
    pub facility_id: Uuid,
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    #[validate(custom = "validate_positive_decimal")]
    pub allocated_limit: Decimal,
}

/// Headroom report for a facility, used by callers before drawing
#[derive(Debug, Serialize, Clone)]
pub struct FacilityAvailability {
    pub facility_id: Uuid,
    pub credit_limit: Decimal,
    pub outstanding: Decimal,
    pub available: Decimal,
    /// The requested draw would push outstanding past the limit. A warning
    /// for the caller to acknowledge, not a rejection.
    pub over_limit: bool,
    /// The facility is past its expiry date
    pub expired: bool,
}

pub(crate) fn validate_positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

pub(crate) fn validate_non_negative_decimal(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_be_non_negative"));
    }
    Ok(())
}

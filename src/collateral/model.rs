//! Collateral and assignment models
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::facility::model::validate_positive_decimal;
use crate::models::RecordStatus;

/// An asset pledged against credit exposure
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Collateral {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub description: String,
    pub current_value: Decimal,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Links a collateral record to a bank, facility, or credit line. Exactly one
/// target is set. Each assignment is independently activatable.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct CollateralAssignment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub collateral_id: Uuid,
    pub bank_id: Option<Uuid>,
    pub facility_id: Option<Uuid>,
    pub credit_line_id: Option<Uuid>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to register a collateral asset
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCollateralRequest {
    #[validate(length(min = 2, max = 256))]
    pub description: String,
    #[validate(custom = "validate_positive_decimal")]
    pub current_value: Decimal,
}

/// Target of a collateral assignment
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentTarget {
    Bank(Uuid),
    Facility(Uuid),
    CreditLine(Uuid),
}

/// Request to assign a collateral asset to a target
#[derive(Debug, Deserialize)]
pub struct AssignCollateralRequest {
    pub collateral_id: Uuid,
    pub target: AssignmentTarget,
}

//! Bank models
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::models::RecordStatus;

/// A lending bank. Global banks carry no owning organization and are visible
/// to every tenant; organization banks are visible only to their owner.
/// Immutable after creation apart from the status toggle.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Bank {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub code: String,
    pub name: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a new bank
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBankRequest {
    #[validate(length(min = 2, max = 16))]
    pub code: String,
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    /// None creates a global bank
    pub organization_id: Option<Uuid>,
}

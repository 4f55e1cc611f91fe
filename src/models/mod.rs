//! Shared model vocabulary used across domain modules

use serde::{Deserialize, Serialize};

/// Lifecycle status for soft-deletable records (banks, facilities,
/// collateral, collateral assignments).
///
/// Soft delete sets `Inactive`; rows are never physically removed. The only
/// legal transitions are the activate/deactivate toggle.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "record_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Active,
    Inactive,
}

impl RecordStatus {
    pub fn is_active(self) -> bool {
        matches!(self, RecordStatus::Active)
    }
}

/// Paginated response wrapper for list endpoints
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

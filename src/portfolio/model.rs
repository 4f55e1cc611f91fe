//! Portfolio exposure models
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Per-bank exposure bucket. A bank with active facilities but zero loans
/// still appears here with its limit and zero outstanding.
#[derive(Debug, Serialize, Clone)]
pub struct BankExposure {
    pub bank_id: Uuid,
    pub bank_code: String,
    pub bank_name: String,
    pub credit_limit: Decimal,
    pub outstanding: Decimal,
    pub available_credit: Decimal,
    /// outstanding / credit_limit, percent
    pub utilization: Decimal,
    pub collateral_value: Decimal,
    /// collateral_value / credit_limit, percent
    pub facility_ltv: Decimal,
    /// collateral_value / outstanding, percent
    pub outstanding_ltv: Decimal,
    pub active_loans_count: i64,
}

/// Organization-wide exposure summary
#[derive(Debug, Serialize, Clone)]
pub struct PortfolioSummary {
    pub organization_id: Uuid,
    pub total_outstanding: Decimal,
    pub total_credit_limit: Decimal,
    /// max(0, limit - outstanding)
    pub available_credit: Decimal,
    pub total_collateral_value: Decimal,
    pub utilization: Decimal,
    pub facility_ltv: Decimal,
    pub outstanding_ltv: Decimal,
    pub active_loans_count: i64,
    pub bank_exposures: Vec<BankExposure>,
}

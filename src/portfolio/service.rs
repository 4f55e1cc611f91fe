//! Portfolio exposure aggregation
//!
//! All figures derive from one consistent store snapshot, grouped per bank
//! and totalled for the organization. Ratios are percentages with a zero
//! denominator collapsing to zero.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::LedgerResult;
use crate::money;
use crate::portfolio::model::{BankExposure, PortfolioSummary};
use crate::store::{LedgerStore, PortfolioSnapshot};

#[derive(Clone)]
pub struct PortfolioService {
    store: Arc<dyn LedgerStore>,
}

impl PortfolioService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn portfolio_summary(&self, org_id: Uuid) -> LedgerResult<PortfolioSummary> {
        let snapshot = self.store.load_portfolio_snapshot(org_id).await?;
        Ok(summarize(org_id, &snapshot))
    }
}

/// Pure aggregation over a snapshot. A bank appears once it has at least one
/// active facility, even with zero loans outstanding.
pub fn summarize(org_id: Uuid, snapshot: &PortfolioSnapshot) -> PortfolioSummary {
    // loan -> facility attachment, resolving legacy credit-line loans
    let line_to_facility: HashMap<Uuid, Uuid> = snapshot
        .credit_lines
        .iter()
        .map(|l| (l.id, l.facility_id))
        .collect();
    let facility_to_bank: HashMap<Uuid, Uuid> = snapshot
        .facilities
        .iter()
        .map(|f| (f.id, f.bank_id))
        .collect();
    let collateral_values: HashMap<Uuid, Decimal> = snapshot
        .collateral
        .iter()
        .map(|c| (c.id, c.current_value))
        .collect();

    let mut per_bank: HashMap<Uuid, BankBucket> = HashMap::new();

    for facility in &snapshot.facilities {
        let bucket = per_bank.entry(facility.bank_id).or_default();
        bucket.credit_limit += facility.credit_limit;
    }

    for loan in &snapshot.loans {
        let facility_id = loan
            .facility_id
            .or_else(|| loan.credit_line_id.and_then(|id| line_to_facility.get(&id).copied()));
        let bank_id = facility_id.and_then(|id| facility_to_bank.get(&id).copied());
        if let Some(bank_id) = bank_id {
            let bucket = per_bank.entry(bank_id).or_default();
            bucket.outstanding += loan.amount;
            bucket.loan_count += 1;
        }
    }

    // Each pledged asset counts once per bank, however many of that bank's
    // targets it is assigned to
    for assignment in &snapshot.assignments {
        let bank_id = assignment
            .bank_id
            .or_else(|| {
                assignment
                    .facility_id
                    .and_then(|id| facility_to_bank.get(&id).copied())
            })
            .or_else(|| {
                assignment
                    .credit_line_id
                    .and_then(|id| line_to_facility.get(&id).copied())
                    .and_then(|fid| facility_to_bank.get(&fid).copied())
            });
        if let Some(bank_id) = bank_id {
            let bucket = per_bank.entry(bank_id).or_default();
            if bucket.counted_collateral.insert(assignment.collateral_id) {
                if let Some(value) = collateral_values.get(&assignment.collateral_id) {
                    bucket.collateral_value += *value;
                }
            }
        }
    }

    let mut bank_exposures: Vec<BankExposure> = snapshot
        .banks
        .iter()
        .filter_map(|bank| {
            let bucket = per_bank.get(&bank.id)?;
            Some(BankExposure {
                bank_id: bank.id,
                bank_code: bank.code.clone(),
                bank_name: bank.name.clone(),
                credit_limit: bucket.credit_limit,
                outstanding: bucket.outstanding,
                available_credit: (bucket.credit_limit - bucket.outstanding).max(Decimal::ZERO),
                utilization: money::ratio_pct(bucket.outstanding, bucket.credit_limit),
                collateral_value: bucket.collateral_value,
                facility_ltv: money::ratio_pct(bucket.collateral_value, bucket.credit_limit),
                outstanding_ltv: money::ratio_pct(bucket.collateral_value, bucket.outstanding),
                active_loans_count: bucket.loan_count,
            })
        })
        .collect();
    bank_exposures.sort_by(|a, b| a.bank_code.cmp(&b.bank_code));

    let total_outstanding: Decimal = bank_exposures.iter().map(|e| e.outstanding).sum();
    let total_credit_limit: Decimal = bank_exposures.iter().map(|e| e.credit_limit).sum();
    let total_collateral_value: Decimal =
        bank_exposures.iter().map(|e| e.collateral_value).sum();
    let active_loans_count: i64 = bank_exposures.iter().map(|e| e.active_loans_count).sum();

    PortfolioSummary {
        organization_id: org_id,
        total_outstanding,
        total_credit_limit,
        available_credit: (total_credit_limit - total_outstanding).max(Decimal::ZERO),
        total_collateral_value,
        utilization: money::ratio_pct(total_outstanding, total_credit_limit),
        facility_ltv: money::ratio_pct(total_collateral_value, total_credit_limit),
        outstanding_ltv: money::ratio_pct(total_collateral_value, total_outstanding),
        active_loans_count,
        bank_exposures,
    }
}

#[derive(Default)]
struct BankBucket {
    credit_limit: Decimal,
    outstanding: Decimal,
    collateral_value: Decimal,
    loan_count: i64,
    counted_collateral: HashSet<Uuid>,
}

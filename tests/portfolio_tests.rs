//! Portfolio aggregation and entity scoping tests

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use loanbook::bank::CreateBankRequest;
use loanbook::collateral::{AssignCollateralRequest, AssignmentTarget, CreateCollateralRequest};
use loanbook::facility::{CreateCreditLineRequest, CreateFacilityRequest, FacilityType};
use loanbook::ledger::{RecordTransactionRequest, TransactionFilter, TransactionType};
use loanbook::loan::{CreateLoanRequest, SettleCommand};
use loanbook::{AppServices, LedgerError};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn create_bank(services: &AppServices, org_id: Uuid, code: &str) -> Uuid {
    services
        .banks
        .create_bank(
            org_id,
            CreateBankRequest {
                code: code.to_string(),
                name: format!("{} Bank", code),
                organization_id: Some(org_id),
            },
        )
        .await
        .unwrap()
        .id
}

async fn create_facility(
    services: &AppServices,
    org_id: Uuid,
    bank_id: Uuid,
    limit: &str,
) -> Uuid {
    services
        .facilities
        .create_facility(
            org_id,
            CreateFacilityRequest {
                bank_id,
                name: "Facility".to_string(),
                credit_limit: dec(limit),
                cost_of_funding: dec("1.00"),
                facility_type: FacilityType::Term,
                revolving_tenor_months: None,
                start_date: date(2026, 1, 1),
                expiry_date: None,
            },
        )
        .await
        .unwrap()
        .id
}

async fn draw(services: &AppServices, org_id: Uuid, facility_id: Uuid, amount: &str) -> Uuid {
    services
        .loans
        .create_loan(
            org_id,
            CreateLoanRequest {
                facility_id: Some(facility_id),
                credit_line_id: None,
                amount: dec(amount),
                sibor_rate: dec("5.00"),
                margin: dec("1.00"),
                start_date: date(2026, 2, 1),
                due_date: date(2026, 8, 1),
                charges_due_date: None,
            },
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_utilization_and_availability() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();
    let bank_id = create_bank(&services, org_id, "SNB").await;
    let facility_id = create_facility(&services, org_id, bank_id, "1000000.00").await;
    draw(&services, org_id, facility_id, "400000.00").await;

    let summary = services.portfolio.portfolio_summary(org_id).await.unwrap();
    assert_eq!(summary.total_credit_limit, dec("1000000.00"));
    assert_eq!(summary.total_outstanding, dec("400000.00"));
    assert_eq!(summary.available_credit, dec("600000.00"));
    assert_eq!(summary.utilization, dec("40.00"));
    assert_eq!(summary.active_loans_count, 1);

    let exposure = &summary.bank_exposures[0];
    assert_eq!(exposure.bank_id, bank_id);
    assert_eq!(exposure.utilization, dec("40.00"));
    assert_eq!(exposure.available_credit, dec("600000.00"));
}

#[tokio::test]
async fn test_bank_with_no_loans_still_appears() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();

    let busy = create_bank(&services, org_id, "ANB").await;
    let busy_facility = create_facility(&services, org_id, busy, "500000.00").await;
    draw(&services, org_id, busy_facility, "200000.00").await;

    let idle = create_bank(&services, org_id, "RIB").await;
    create_facility(&services, org_id, idle, "300000.00").await;

    let summary = services.portfolio.portfolio_summary(org_id).await.unwrap();
    assert_eq!(summary.bank_exposures.len(), 2);

    let idle_exposure = summary
        .bank_exposures
        .iter()
        .find(|e| e.bank_id == idle)
        .unwrap();
    assert_eq!(idle_exposure.credit_limit, dec("300000.00"));
    assert_eq!(idle_exposure.outstanding, Decimal::ZERO);
    assert_eq!(idle_exposure.utilization, Decimal::ZERO);
    assert_eq!(idle_exposure.active_loans_count, 0);
}

#[tokio::test]
async fn test_settled_loans_leave_outstanding() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();
    let bank_id = create_bank(&services, org_id, "SNB").await;
    let facility_id = create_facility(&services, org_id, bank_id, "1000000.00").await;
    let keep = draw(&services, org_id, facility_id, "300000.00").await;
    let settle = draw(&services, org_id, facility_id, "200000.00").await;

    services
        .loans
        .settle_loan(
            org_id,
            settle,
            SettleCommand {
                amount: dec("200000.00"),
                date: date(2026, 6, 1),
                memo: None,
                user_id: None,
            },
        )
        .await
        .unwrap();

    let summary = services.portfolio.portfolio_summary(org_id).await.unwrap();
    assert_eq!(summary.total_outstanding, dec("300000.00"));
    assert_eq!(summary.active_loans_count, 1);

    let _ = keep;
}

#[tokio::test]
async fn test_collateral_counts_once_per_bank() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();
    let bank_id = create_bank(&services, org_id, "SNB").await;
    let facility_id = create_facility(&services, org_id, bank_id, "1000000.00").await;
    draw(&services, org_id, facility_id, "500000.00").await;

    let collateral = services
        .collateral
        .create_collateral(
            org_id,
            CreateCollateralRequest {
                description: "Jeddah warehouse deed".to_string(),
                current_value: dec("750000.00"),
            },
        )
        .await
        .unwrap();

    // same asset pledged at both the bank and facility level
    services
        .collateral
        .assign_collateral(
            org_id,
            AssignCollateralRequest {
                collateral_id: collateral.id,
                target: AssignmentTarget::Bank(bank_id),
            },
        )
        .await
        .unwrap();
    services
        .collateral
        .assign_collateral(
            org_id,
            AssignCollateralRequest {
                collateral_id: collateral.id,
                target: AssignmentTarget::Facility(facility_id),
            },
        )
        .await
        .unwrap();

    let summary = services.portfolio.portfolio_summary(org_id).await.unwrap();
    let exposure = &summary.bank_exposures[0];
    assert_eq!(exposure.collateral_value, dec("750000.00"));
    assert_eq!(exposure.facility_ltv, dec("75.00"));
    assert_eq!(exposure.outstanding_ltv, dec("150.00"));
}

#[tokio::test]
async fn test_zero_denominators_yield_zero_ratios() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();

    let summary = services.portfolio.portfolio_summary(org_id).await.unwrap();
    assert!(summary.bank_exposures.is_empty());
    assert_eq!(summary.utilization, Decimal::ZERO);
    assert_eq!(summary.facility_ltv, Decimal::ZERO);
    assert_eq!(summary.outstanding_ltv, Decimal::ZERO);
}

#[tokio::test]
async fn test_portfolio_is_org_scoped() {
    let services = AppServices::in_memory();
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();

    let bank_a = create_bank(&services, org_a, "SNB").await;
    let facility_a = create_facility(&services, org_a, bank_a, "1000000.00").await;
    draw(&services, org_a, facility_a, "400000.00").await;

    let summary_b = services.portfolio.portfolio_summary(org_b).await.unwrap();
    assert!(summary_b.bank_exposures.is_empty());
    assert_eq!(summary_b.total_outstanding, Decimal::ZERO);
}

#[tokio::test]
async fn test_bank_code_unique_within_scope() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();
    create_bank(&services, org_id, "SNB").await;

    let err = services
        .banks
        .create_bank(
            org_id,
            CreateBankRequest {
                code: "SNB".to_string(),
                name: "Duplicate".to_string(),
                organization_id: Some(org_id),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    // a different organization can reuse the code
    let other = Uuid::new_v4();
    create_bank(&services, other, "SNB").await;
}

#[tokio::test]
async fn test_facility_availability_warns_without_blocking() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();
    let bank_id = create_bank(&services, org_id, "SNB").await;
    let facility_id = create_facility(&services, org_id, bank_id, "500000.00").await;
    draw(&services, org_id, facility_id, "400000.00").await;

    let availability = services
        .facilities
        .check_availability(org_id, facility_id, dec("200000.00"), date(2026, 3, 1))
        .await
        .unwrap();
    assert_eq!(availability.outstanding, dec("400000.00"));
    assert_eq!(availability.available, dec("100000.00"));
    assert!(availability.over_limit);
    assert!(!availability.expired);

    // the over-limit draw still succeeds
    draw(&services, org_id, facility_id, "200000.00").await;
}

#[tokio::test]
async fn test_availability_counts_credit_line_loans() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();
    let bank_id = create_bank(&services, org_id, "SNB").await;
    let facility_id = create_facility(&services, org_id, bank_id, "1000000.00").await;

    let line = services
        .facilities
        .create_credit_line(
            org_id,
            CreateCreditLineRequest {
                facility_id,
                name: "Line 1".to_string(),
                allocated_limit: dec("400000.00"),
            },
        )
        .await
        .unwrap();

    // legacy attachment: the loan references only the credit line
    services
        .loans
        .create_loan(
            org_id,
            CreateLoanRequest {
                facility_id: None,
                credit_line_id: Some(line.id),
                amount: dec("300000.00"),
                sibor_rate: dec("5.00"),
                margin: dec("1.00"),
                start_date: date(2026, 2, 1),
                due_date: date(2026, 8, 1),
                charges_due_date: None,
            },
        )
        .await
        .unwrap();
    draw(&services, org_id, facility_id, "100000.00").await;

    let availability = services
        .facilities
        .check_availability(org_id, facility_id, dec("50000.00"), date(2026, 3, 1))
        .await
        .unwrap();
    assert_eq!(availability.outstanding, dec("400000.00"));
    assert_eq!(availability.available, dec("600000.00"));
    assert!(!availability.over_limit);
}

#[tokio::test]
async fn test_transaction_listing_filters_and_count_agree() {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();
    let bank_id = create_bank(&services, org_id, "SNB").await;
    let facility_id = create_facility(&services, org_id, bank_id, "1000000.00").await;
    let loan_id = draw(&services, org_id, facility_id, "500000.00").await;

    for (tx_type, amount, day) in [
        (TransactionType::Repayment, "50000.00", 1),
        (TransactionType::Interest, "1200.00", 2),
        (TransactionType::Fee, "300.00", 3),
        (TransactionType::Repayment, "25000.00", 4),
    ] {
        services
            .ledger
            .record_transaction(
                org_id,
                RecordTransactionRequest {
                    loan_id,
                    tx_type,
                    amount: dec(amount),
                    date: date(2026, 3, day),
                    memo: None,
                    reference: None,
                    allocation: None,
                    idempotency_key: None,
                    user_id: None,
                },
            )
            .await
            .unwrap();
    }

    let page = services
        .ledger
        .list_transactions(
            org_id,
            TransactionFilter {
                tx_type: Some(TransactionType::Repayment),
                limit: Some(1),
                offset: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.data.len(), 1);
    // newest first
    assert_eq!(page.data[0].amount, dec("25000.00"));

    let dated = services
        .ledger
        .list_transactions(
            org_id,
            TransactionFilter {
                date_from: Some(date(2026, 3, 2)),
                date_to: Some(date(2026, 3, 3)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(dated.total, 2);
    assert!(dated
        .data
        .iter()
        .all(|t| t.tx_type != TransactionType::Repayment));
}

#[tokio::test]
async fn test_global_bank_visible_to_all_orgs() {
    let services = AppServices::in_memory();
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();

    let global = services
        .banks
        .create_bank(
            org_a,
            CreateBankRequest {
                code: "SAMA".to_string(),
                name: "Central Bank".to_string(),
                organization_id: None,
            },
        )
        .await
        .unwrap();

    let seen_by_b = services.banks.get_bank(org_b, global.id).await.unwrap();
    assert_eq!(seen_by_b.code, "SAMA");
}

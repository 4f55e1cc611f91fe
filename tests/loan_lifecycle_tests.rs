//! Loan lifecycle integration tests over the in-memory store

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use loanbook::bank::CreateBankRequest;
use loanbook::facility::{CreateFacilityRequest, FacilityType};
use loanbook::ledger::TransactionType;
use loanbook::loan::{
    CreateLoanRequest, LoanStatus, PaymentCommand, RevolveCommand, SettleCommand,
};
use loanbook::store::LoanFilter;
use loanbook::{AppServices, LedgerError};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Fixture {
    services: AppServices,
    org_id: Uuid,
    facility_id: Uuid,
}

/// Org with one bank and one revolving facility (1,000,000 limit)
async fn fixture() -> Fixture {
    let services = AppServices::in_memory();
    let org_id = Uuid::new_v4();

    let bank = services
        .banks
        .create_bank(
            org_id,
            CreateBankRequest {
                code: "SNB".to_string(),
                name: "Saudi National Bank".to_string(),
                organization_id: Some(org_id),
            },
        )
        .await
        .unwrap();

    let facility = services
        .facilities
        .create_facility(
            org_id,
            CreateFacilityRequest {
                bank_id: bank.id,
                name: "Revolving A".to_string(),
                credit_limit: dec("1000000.00"),
                cost_of_funding: dec("1.25"),
                facility_type: FacilityType::Revolving,
                revolving_tenor_months: Some(6),
                start_date: date(2026, 1, 1),
                expiry_date: Some(date(2027, 1, 1)),
            },
        )
        .await
        .unwrap();

    Fixture {
        services,
        org_id,
        facility_id: facility.id,
    }
}

async fn draw_loan(fx: &Fixture, amount: &str) -> Uuid {
    fx.services
        .loans
        .create_loan(
            fx.org_id,
            CreateLoanRequest {
                facility_id: Some(fx.facility_id),
                credit_line_id: None,
                amount: dec(amount),
                sibor_rate: dec("5.50"),
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
async fn test_draw_sets_bank_rate_and_cycle() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "500000.00").await;
    let loan = fx.services.loans.get_loan(fx.org_id, loan_id).await.unwrap();

    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.bank_rate, dec("6.50"));
    assert_eq!(loan.cycle_number, 1);
    assert!(loan.parent_loan_id.is_none());
}

#[tokio::test]
async fn test_payment_reduces_balance_but_not_status() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "500000.00").await;

    fx.services
        .loans
        .process_payment(
            fx.org_id,
            loan_id,
            PaymentCommand {
                amount: dec("100000.00"),
                date: date(2026, 3, 1),
                memo: None,
                reference: None,
                idempotency_key: None,
                user_id: None,
            },
        )
        .await
        .unwrap();

    let balance = fx
        .services
        .loans
        .calculate_balance(fx.org_id, loan_id)
        .await
        .unwrap();
    assert_eq!(balance.principal, dec("400000.00"));
    assert_eq!(balance.total, dec("400000.00"));

    // fully repaying still leaves the loan active until explicit settlement
    let loan = fx.services.loans.get_loan(fx.org_id, loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Active);
}

#[tokio::test]
async fn test_payment_idempotency_key_does_not_double_post() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "500000.00").await;

    let command = PaymentCommand {
        amount: dec("50000.00"),
        date: date(2026, 3, 1),
        memo: None,
        reference: None,
        idempotency_key: Some("PAY-2026-03-001".to_string()),
        user_id: None,
    };

    let first = fx
        .services
        .loans
        .process_payment(fx.org_id, loan_id, command.clone())
        .await
        .unwrap();
    let retry = fx
        .services
        .loans
        .process_payment(fx.org_id, loan_id, command)
        .await
        .unwrap();

    assert!(!first.deduplicated);
    assert!(retry.deduplicated);
    assert_eq!(
        first.transaction.unwrap().id,
        retry.transaction.unwrap().id
    );

    let balance = fx
        .services
        .loans
        .calculate_balance(fx.org_id, loan_id)
        .await
        .unwrap();
    assert_eq!(balance.principal, dec("450000.00"));
}

#[tokio::test]
async fn test_settlement_is_idempotent_per_date() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "500000.00").await;

    let command = SettleCommand {
        amount: dec("500000.00"),
        date: date(2026, 7, 1),
        memo: None,
        user_id: None,
    };

    let first = fx
        .services
        .loans
        .settle_loan(fx.org_id, loan_id, command.clone())
        .await
        .unwrap();
    assert!(!first.deduplicated);
    assert_eq!(first.loan.status, LoanStatus::Settled);

    // the retry hits the idempotency key before the state guard, so it
    // returns the original settlement rather than a transition error
    let retry = fx
        .services
        .loans
        .settle_loan(fx.org_id, loan_id, command)
        .await
        .unwrap();
    assert!(retry.deduplicated);
    assert_eq!(
        first.transaction.as_ref().unwrap().id,
        retry.transaction.as_ref().unwrap().id
    );

    let ledger = fx
        .services
        .ledger
        .loan_ledger(fx.org_id, loan_id)
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].tx_type, TransactionType::Repayment);
    assert_eq!(
        ledger[0].reference.as_deref(),
        Some(&format!("SETTLE-{}", &loan_id.to_string()[..8])[..])
    );
}

#[tokio::test]
async fn test_settle_after_reversal_reapplies_transition() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "500000.00").await;

    let command = SettleCommand {
        amount: dec("500000.00"),
        date: date(2026, 7, 1),
        memo: None,
        user_id: None,
    };

    fx.services
        .loans
        .settle_loan(fx.org_id, loan_id, command.clone())
        .await
        .unwrap();
    fx.services
        .loans
        .reverse_settlement(fx.org_id, loan_id, "settled in error".to_string(), None)
        .await
        .unwrap();

    // the reversal reopened the loan, so a settle for the same date must
    // transition it again even though the idempotency key already exists
    let again = fx
        .services
        .loans
        .settle_loan(fx.org_id, loan_id, command)
        .await
        .unwrap();
    assert!(again.deduplicated);
    assert_eq!(again.loan.status, LoanStatus::Settled);

    let stored = fx.services.loans.get_loan(fx.org_id, loan_id).await.unwrap();
    assert_eq!(stored.status, LoanStatus::Settled);
    assert_eq!(stored.settled_date, Some(date(2026, 7, 1)));

    // the original settlement row was not re-posted
    let ledger = fx
        .services
        .ledger
        .loan_ledger(fx.org_id, loan_id)
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn test_settle_cancelled_loan_rejected() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "100000.00").await;

    fx.services
        .loans
        .cancel_loan(fx.org_id, loan_id, None)
        .await
        .unwrap();

    let err = fx
        .services
        .loans
        .settle_loan(
            fx.org_id,
            loan_id,
            SettleCommand {
                amount: dec("100000.00"),
                date: date(2026, 7, 1),
                memo: None,
                user_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_reversal_reopens_loan_and_audits() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "500000.00").await;
    let actor = Uuid::new_v4();

    fx.services
        .loans
        .settle_loan(
            fx.org_id,
            loan_id,
            SettleCommand {
                amount: dec("500000.00"),
                date: date(2026, 7, 1),
                memo: None,
                user_id: None,
            },
        )
        .await
        .unwrap();

    let loan = fx
        .services
        .loans
        .reverse_settlement(fx.org_id, loan_id, "posted to wrong loan".to_string(), Some(actor))
        .await
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Active);
    assert!(loan.settled_date.is_none());
    assert!(loan.settled_amount.is_none());
    assert_eq!(loan.reversal_reason.as_deref(), Some("posted to wrong loan"));
    assert_eq!(loan.reversed_by, Some(actor));

    // the settlement transaction is left in the ledger
    let ledger = fx
        .services
        .ledger
        .loan_ledger(fx.org_id, loan_id)
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);

    let audit = fx
        .services
        .ledger
        .audit_trail(fx.org_id, Some(loan_id))
        .await
        .unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "loan.settlement_reversed");
    assert_eq!(audit[0].before["status"], "settled");
    assert_eq!(audit[0].after["status"], "active");
}

#[tokio::test]
async fn test_reversal_requires_settled_state_and_reason() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "500000.00").await;

    let err = fx
        .services
        .loans
        .reverse_settlement(fx.org_id, loan_id, "oops".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));

    fx.services
        .loans
        .settle_loan(
            fx.org_id,
            loan_id,
            SettleCommand {
                amount: dec("500000.00"),
                date: date(2026, 7, 1),
                memo: None,
                user_id: None,
            },
        )
        .await
        .unwrap();

    let err = fx
        .services
        .loans
        .reverse_settlement(fx.org_id, loan_id, "   ".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn test_revolve_creates_successor_cycle() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "500000.00").await;

    let outcome = fx
        .services
        .loans
        .revolve_loan(
            fx.org_id,
            loan_id,
            RevolveCommand {
                amount: None,
                sibor_rate: dec("5.75"),
                margin: dec("1.00"),
                start_date: date(2026, 8, 1),
                due_date: date(2027, 2, 1),
                user_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.loan.status, LoanStatus::Settled);

    let successor = outcome.successor.unwrap();
    assert_eq!(successor.parent_loan_id, Some(loan_id));
    assert_eq!(successor.cycle_number, 2);
    assert_eq!(successor.amount, dec("500000.00"));
    assert_eq!(successor.bank_rate, dec("6.75"));
    assert_eq!(successor.status, LoanStatus::Active);

    // a second revolve of the closed cycle is rejected by the guard
    let err = fx
        .services
        .loans
        .revolve_loan(
            fx.org_id,
            loan_id,
            RevolveCommand {
                amount: None,
                sibor_rate: dec("5.75"),
                margin: dec("1.00"),
                start_date: date(2026, 8, 1),
                due_date: date(2027, 2, 1),
                user_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_revolve_rejected_on_term_facility() {
    let fx = fixture().await;
    let bank = fx.services.banks.list_banks(fx.org_id).await.unwrap()[0].clone();
    let term = fx
        .services
        .facilities
        .create_facility(
            fx.org_id,
            CreateFacilityRequest {
                bank_id: bank.id,
                name: "Term B".to_string(),
                credit_limit: dec("200000.00"),
                cost_of_funding: dec("1.00"),
                facility_type: FacilityType::Term,
                revolving_tenor_months: None,
                start_date: date(2026, 1, 1),
                expiry_date: None,
            },
        )
        .await
        .unwrap();

    let loan = fx
        .services
        .loans
        .create_loan(
            fx.org_id,
            CreateLoanRequest {
                facility_id: Some(term.id),
                credit_line_id: None,
                amount: dec("100000.00"),
                sibor_rate: dec("5.00"),
                margin: dec("1.00"),
                start_date: date(2026, 2, 1),
                due_date: date(2026, 8, 1),
                charges_due_date: None,
            },
        )
        .await
        .unwrap();

    let err = fx
        .services
        .loans
        .revolve_loan(
            fx.org_id,
            loan.id,
            RevolveCommand {
                amount: None,
                sibor_rate: dec("5.00"),
                margin: dec("1.00"),
                start_date: date(2026, 8, 1),
                due_date: date(2027, 2, 1),
                user_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn test_mark_overdue_then_settle() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "300000.00").await; // due 2026-08-01

    let flagged = fx
        .services
        .loans
        .mark_overdue(fx.org_id, date(2026, 9, 1))
        .await
        .unwrap();
    assert_eq!(flagged, vec![loan_id]);

    let loan = fx.services.loans.get_loan(fx.org_id, loan_id).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Overdue);

    // overdue loans settle normally
    let outcome = fx
        .services
        .loans
        .settle_loan(
            fx.org_id,
            loan_id,
            SettleCommand {
                amount: dec("300000.00"),
                date: date(2026, 9, 15),
                memo: None,
                user_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.loan.status, LoanStatus::Settled);
}

#[tokio::test]
async fn test_mark_overdue_skips_loans_not_yet_due() {
    let fx = fixture().await;
    draw_loan(&fx, "300000.00").await; // due 2026-08-01

    let flagged = fx
        .services
        .loans
        .mark_overdue(fx.org_id, date(2026, 8, 1))
        .await
        .unwrap();
    assert!(flagged.is_empty());
}

#[tokio::test]
async fn test_permanent_delete_requires_cancelled_and_keeps_ledger() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "100000.00").await;

    fx.services
        .loans
        .process_payment(
            fx.org_id,
            loan_id,
            PaymentCommand {
                amount: dec("20000.00"),
                date: date(2026, 3, 1),
                memo: None,
                reference: None,
                idempotency_key: None,
                user_id: None,
            },
        )
        .await
        .unwrap();

    // active loans are not hard-deletable
    let err = fx
        .services
        .loans
        .permanently_delete_loan(fx.org_id, loan_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidStateTransition { .. }));

    fx.services
        .loans
        .cancel_loan(fx.org_id, loan_id, None)
        .await
        .unwrap();
    fx.services
        .loans
        .permanently_delete_loan(fx.org_id, loan_id, None)
        .await
        .unwrap();

    let err = fx.services.loans.get_loan(fx.org_id, loan_id).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    // the ledger keeps the orphaned transaction
    let page = fx
        .services
        .ledger
        .list_transactions(
            fx.org_id,
            loanbook::ledger::TransactionFilter {
                loan_id: Some(loan_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    // deletion is audited
    let audit = fx
        .services
        .ledger
        .audit_trail(fx.org_id, Some(loan_id))
        .await
        .unwrap();
    assert!(audit.iter().any(|e| e.action == "loan.permanently_deleted"));
}

#[tokio::test]
async fn test_cancelled_loans_excluded_from_open_listing() {
    let fx = fixture().await;
    let open = draw_loan(&fx, "100000.00").await;
    let cancelled = draw_loan(&fx, "200000.00").await;

    fx.services
        .loans
        .cancel_loan(fx.org_id, cancelled, None)
        .await
        .unwrap();

    let loans = fx
        .services
        .loans
        .list_loans(
            fx.org_id,
            LoanFilter {
                open_only: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(loans.len(), 1);
    assert_eq!(loans[0].id, open);
}

#[tokio::test]
async fn test_org_scoping_hides_foreign_loans() {
    let fx = fixture().await;
    let loan_id = draw_loan(&fx, "100000.00").await;

    let other_org = Uuid::new_v4();
    let err = fx
        .services
        .loans
        .get_loan(other_org, loan_id)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

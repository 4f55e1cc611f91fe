//! Derived loan balance calculation
//!
//! Balances are computed from the stated loan amount plus its ledger rows on
//! every call, never cached, so they cannot drift from the ledger.

use rust_decimal::Decimal;

use crate::ledger::model::{Transaction, TransactionType};
use crate::loan::model::LoanBalance;

/// Derive a loan's balance from its amount and ledger transactions.
///
/// Principal starts at the stated amount and is reduced by repayments,
/// clamped at zero. Interest and fee entries accrue separately as
/// unpaid charges. `total = max(0, principal) + interest + fees`.
pub fn calculate(loan_amount: Decimal, entries: &[Transaction]) -> LoanBalance {
    let mut principal = loan_amount;
    let mut interest = Decimal::ZERO;
    let mut fees = Decimal::ZERO;

    for entry in entries {
        match entry.tx_type {
            TransactionType::Repayment => principal -= entry.amount,
            TransactionType::Interest => interest += entry.amount,
            TransactionType::Fee => fees += entry.amount,
        }
    }

    let principal = principal.max(Decimal::ZERO);
    let total = principal + interest + fees;

    LoanBalance {
        principal,
        interest,
        fees,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn entry(tx_type: TransactionType, amount: &str) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            user_id: None,
            loan_id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            bank_id: Uuid::new_v4(),
            tx_type,
            amount: dec(amount),
            date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            memo: None,
            reference: None,
            allocation: None,
            idempotency_key: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_transactions_balance_is_amount() {
        let balance = calculate(dec("500000.00"), &[]);
        assert_eq!(balance.principal, dec("500000.00"));
        assert_eq!(balance.interest, Decimal::ZERO);
        assert_eq!(balance.fees, Decimal::ZERO);
        assert_eq!(balance.total, dec("500000.00"));
    }

    #[test]
    fn test_repayments_reduce_principal() {
        let entries = vec![
            entry(TransactionType::Repayment, "100000.00"),
            entry(TransactionType::Repayment, "50000.00"),
        ];
        let balance = calculate(dec("500000.00"), &entries);
        assert_eq!(balance.principal, dec("350000.00"));
        assert_eq!(balance.total, dec("350000.00"));
    }

    #[test]
    fn test_interest_and_fees_accrue_separately() {
        let entries = vec![
            entry(TransactionType::Repayment, "200000.00"),
            entry(TransactionType::Interest, "1250.50"),
            entry(TransactionType::Fee, "300.00"),
        ];
        let balance = calculate(dec("500000.00"), &entries);
        assert_eq!(balance.principal, dec("300000.00"));
        assert_eq!(balance.interest, dec("1250.50"));
        assert_eq!(balance.fees, dec("300.00"));
        assert_eq!(balance.total, dec("301550.50"));
    }

    #[test]
    fn test_principal_clamped_at_zero_on_overpayment() {
        let entries = vec![entry(TransactionType::Repayment, "600000.00")];
        let balance = calculate(dec("500000.00"), &entries);
        assert_eq!(balance.principal, Decimal::ZERO);
        assert_eq!(balance.total, Decimal::ZERO);
    }

    #[test]
    fn test_total_never_negative() {
        let entries = vec![
            entry(TransactionType::Repayment, "999999.99"),
            entry(TransactionType::Interest, "10.00"),
        ];
        let balance = calculate(dec("100.00"), &entries);
        assert_eq!(balance.principal, Decimal::ZERO);
        assert!(balance.total >= Decimal::ZERO);
        assert_eq!(balance.total, dec("10.00"));
    }
}

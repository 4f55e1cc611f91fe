pub mod balance;
pub mod model;
pub mod service;

pub use model::{
    CreateLoanRequest, Loan, LoanBalance, LoanStatus, PaymentCommand, RevolveCommand,
    SettleCommand,
};
pub use service::LoanService;

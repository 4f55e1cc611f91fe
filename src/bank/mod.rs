pub mod model;
pub mod service;

pub use model::{Bank, CreateBankRequest};
pub use service::BankService;

pub mod model;
pub mod service;

pub use model::{
    AuditEvent, NewTransaction, RecordTransactionRequest, Transaction, TransactionFilter,
    TransactionType,
};
pub use service::LedgerService;

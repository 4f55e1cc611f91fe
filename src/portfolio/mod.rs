pub mod model;
pub mod service;

pub use model::{BankExposure, PortfolioSummary};
pub use service::PortfolioService;

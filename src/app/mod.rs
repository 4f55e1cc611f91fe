//! Service wiring
//!
//! `AppServices` is the composition root: one shared store, one instance of
//! each domain service. Embedders pick the store implementation (PostgreSQL
//! in deployments, in-memory for tests and local runs).

use std::sync::Arc;

use sqlx::PgPool;

use crate::bank::BankService;
use crate::collateral::CollateralService;
use crate::config::Config;
use crate::facility::FacilityService;
use crate::ledger::LedgerService;
use crate::loan::LoanService;
use crate::portfolio::PortfolioService;
use crate::store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};

#[derive(Clone)]
pub struct AppServices {
    pub banks: BankService,
    pub facilities: FacilityService,
    pub collateral: CollateralService,
    pub loans: LoanService,
    pub ledger: LedgerService,
    pub portfolio: PortfolioService,
}

impl AppServices {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            banks: BankService::new(store.clone()),
            facilities: FacilityService::new(store.clone()),
            collateral: CollateralService::new(store.clone()),
            loans: LoanService::new(store.clone()),
            ledger: LedgerService::new(store.clone()),
            portfolio: PortfolioService::new(store),
        }
    }

    pub fn with_postgres(pool: PgPool) -> Self {
        Self::new(Arc::new(PgLedgerStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedgerStore::new()))
    }
}

/// Initialize structured logging from the configured level. RUST_LOG takes
/// precedence when set.
pub fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .init();
}

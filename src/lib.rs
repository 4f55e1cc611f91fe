//! Loan ledger and portfolio exposure engine
//!
//! Tracks bank credit facilities, individual loan drawdowns and their
//! lifecycle (draw, payment, settlement, reversal, revolve, cancellation),
//! an append-only transaction ledger with idempotent posting, pledged
//! collateral, and per-bank portfolio exposure aggregation. Amounts are
//! SAR decimals; every read and write is scoped to an organization.

pub mod app;
pub mod bank;
pub mod collateral;
pub mod config;
pub mod db;
pub mod error;
pub mod facility;
pub mod ledger;
pub mod loan;
pub mod models;
pub mod money;
pub mod portfolio;
pub mod store;

pub use app::AppServices;
pub use error::{LedgerError, LedgerResult};

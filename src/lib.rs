//! balance-service Library
//!
//! Re-exports modules for the binary and integration testing.

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod server;
pub mod service;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{Money, MoneyError};
pub use service::{BalanceService, ServiceSettings};
pub use store::{BalanceStore, DynBalanceStore, MemoryBalanceStore, PgBalanceStore, StoreError};

//! balance-service - user balance and revenue ledger API
//!
//! Reserves money for orders, recognizes it as revenue or refunds it, and
//! reports monthly revenue per service.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    balance_service::cli::run().await
}

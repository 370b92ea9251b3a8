//! Balance service
//!
//! Validates requests, fills in defaults and delegates to the store.

mod export;

use std::path::PathBuf;
use std::sync::Arc;

use validator::Validate;

use crate::domain::{
    CancelTransactionDto, GetBalanceDto, GetHistoryDto, GetMonthlyReportDto, HistoryRow, Money,
    MonthlyReportRow, RecognizeRevenueDto, ReplenishBalanceDto, ReserveMoneyDto,
};
use crate::error::AppError;
use crate::store::DynBalanceStore;

pub use export::{write_report, ExportError};

/// Default number of history rows per page
pub const DEFAULT_HISTORY_PAGE_SIZE: i64 = 100;

/// Description stored for a replenishment without one
pub const DEFAULT_REPLENISH_DESCRIPTION: &str = "Balance replenishment";

/// Tunables of the service layer
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Used when a history request has `limit == 0`; larger limits are clamped to it
    pub history_page_size: i64,
    /// Directory exported CSV reports are written to
    pub report_directory: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            report_directory: PathBuf::from("static"),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

/// Entry point for every ledger operation
#[derive(Clone)]
pub struct BalanceService {
    store: DynBalanceStore,
    settings: Arc<ServiceSettings>,
}

impl BalanceService {
    pub fn new(store: DynBalanceStore, settings: ServiceSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub async fn get_balance(&self, dto: GetBalanceDto) -> Result<Money, AppError> {
        dto.validate()?;
        Ok(self.store.get_balance(&dto).await?)
    }

    pub async fn replenish_balance(&self, mut dto: ReplenishBalanceDto) -> Result<(), AppError> {
        dto.validate()?;
        if is_blank(dto.description.as_deref()) {
            dto.description = Some(DEFAULT_REPLENISH_DESCRIPTION.to_string());
        }
        Ok(self.store.replenish_balance(&dto).await?)
    }

    pub async fn reserve_money(&self, mut dto: ReserveMoneyDto) -> Result<(), AppError> {
        dto.validate()?;
        if is_blank(dto.description.as_deref()) {
            dto.description = Some(format!(
                "Payment for order {} of service {}",
                dto.order_id, dto.service_id
            ));
        }
        Ok(self.store.reserve_money(&dto).await?)
    }

    pub async fn recognize_revenue(&self, dto: RecognizeRevenueDto) -> Result<(), AppError> {
        dto.validate()?;
        Ok(self.store.recognize_revenue(&dto).await?)
    }

    pub async fn cancel_transaction(&self, dto: CancelTransactionDto) -> Result<(), AppError> {
        dto.validate()?;
        Ok(self.store.cancel_transaction(&dto).await?)
    }

    pub async fn get_history(&self, mut dto: GetHistoryDto) -> Result<Vec<HistoryRow>, AppError> {
        dto.validate()?;
        let page_size = self.settings.history_page_size;
        if dto.limit == 0 || dto.limit > page_size {
            dto.limit = page_size;
        }
        Ok(self.store.get_history(&dto).await?)
    }

    pub async fn get_monthly_report(
        &self,
        dto: GetMonthlyReportDto,
    ) -> Result<Vec<MonthlyReportRow>, AppError> {
        dto.validate()?;
        Ok(self.store.get_monthly_report(&dto).await?)
    }

    /// Write the monthly report to `<report_directory>/<year>-<month>.csv`
    pub async fn export_monthly_report(
        &self,
        dto: GetMonthlyReportDto,
    ) -> Result<PathBuf, AppError> {
        let rows = self.get_monthly_report(dto.clone()).await?;
        let directory = self.settings.report_directory.clone();
        let file_name = dto.file_name();

        let path = tokio::task::spawn_blocking(move || {
            export::write_report(&directory, &file_name, &rows)
        })
        .await
        .map_err(|e| AppError::Internal(format!("report export task failed: {e}")))??;

        tracing::info!(path = %path.display(), "Monthly report exported");
        Ok(path)
    }
}

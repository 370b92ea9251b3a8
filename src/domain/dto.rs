//! Request DTOs
//!
//! One validated input shape per ledger operation. Every DTO is checked
//! with [`validator::Validate`] before the store sees it; a failure reports
//! all offending fields at once.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{HistorySortKey, Money};

/// Amounts may be zero but never negative, and must fit a ledger column
fn validate_amount(amount: &Money) -> Result<(), ValidationError> {
    if amount.is_negative() {
        let mut error = ValidationError::new("non_negative");
        error.message = Some(Cow::from("amount must not be negative"));
        return Err(error);
    }
    if *amount > Money::MAX {
        let mut error = ValidationError::new("max_amount");
        error.message = Some(Cow::from(format!("amount must not exceed {}", Money::MAX)));
        return Err(error);
    }
    Ok(())
}

// =========================================================================
// Balance
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GetBalanceDto {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
}

impl GetBalanceDto {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReplenishBalanceDto {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Money,
    /// Blank descriptions are replaced by the service layer
    pub description: Option<String>,
}

impl ReplenishBalanceDto {
    pub fn new(user_id: i64, amount: Money) -> Self {
        Self {
            user_id,
            amount,
            description: None,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }
}

// =========================================================================
// Reservations
// =========================================================================

/// Hold `amount` of the user's balance for an order of a service.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReserveMoneyDto {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Money,
    #[validate(range(min = 1, message = "service_id must be positive"))]
    pub service_id: i64,
    #[validate(range(min = 1, message = "order_id must be positive"))]
    pub order_id: i64,
    pub description: Option<String>,
    /// Registers a display name for `service_id` in the same transaction
    pub service_name: Option<String>,
}

impl ReserveMoneyDto {
    pub fn new(user_id: i64, amount: Money, service_id: i64, order_id: i64) -> Self {
        Self {
            user_id,
            amount,
            service_id,
            order_id,
            description: None,
            service_name: None,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = Some(description);
        self
    }

    pub fn with_service_name(mut self, service_name: String) -> Self {
        self.service_name = Some(service_name);
        self
    }

    /// The service name to upsert, if one was given and is not blank
    pub fn service_name(&self) -> Option<&str> {
        self.service_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Turn a pending reservation into realized revenue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecognizeRevenueDto {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
    #[validate(custom(function = "validate_amount"))]
    pub amount: Money,
    #[validate(range(min = 1, message = "service_id must be positive"))]
    pub service_id: i64,
    #[validate(range(min = 1, message = "order_id must be positive"))]
    pub order_id: i64,
}

impl RecognizeRevenueDto {
    pub fn new(user_id: i64, amount: Money, service_id: i64, order_id: i64) -> Self {
        Self {
            user_id,
            amount,
            service_id,
            order_id,
        }
    }
}

/// Release a pending reservation back to the user's balance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CancelTransactionDto {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
    #[validate(range(min = 1, message = "service_id must be positive"))]
    pub service_id: i64,
    #[validate(range(min = 1, message = "order_id must be positive"))]
    pub order_id: i64,
}

impl CancelTransactionDto {
    pub fn new(user_id: i64, service_id: i64, order_id: i64) -> Self {
        Self {
            user_id,
            service_id,
            order_id,
        }
    }
}

// =========================================================================
// Reads
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GetHistoryDto {
    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
    #[validate(range(min = 0, message = "offset must not be negative"))]
    pub offset: i64,
    /// Zero means "use the default page size"
    #[validate(range(min = 0, message = "limit must not be negative"))]
    pub limit: i64,
    pub sort_by: HistorySortKey,
    pub reverse: bool,
}

impl GetHistoryDto {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            offset: 0,
            limit: 0,
            sort_by: HistorySortKey::Timestamp,
            reverse: false,
        }
    }

    pub fn with_page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn sorted_by(mut self, sort_by: HistorySortKey, reverse: bool) -> Self {
        self.sort_by = sort_by;
        self.reverse = reverse;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GetMonthlyReportDto {
    #[validate(range(min = 1900, max = 2199, message = "year must be between 1900 and 2199"))]
    pub year: i32,
    #[validate(range(min = 1, max = 12, message = "month must be between 1 and 12"))]
    pub month: i32,
}

impl GetMonthlyReportDto {
    pub fn new(year: i32, month: i32) -> Self {
        Self { year, month }
    }

    /// File name used when the report is exported
    pub fn file_name(&self) -> String {
        format!("{}-{}.csv", self.year, self.month)
    }
}

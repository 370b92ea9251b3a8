//! Store Errors
//!
//! The closed set of failures a ledger store may report.

/// Errors that can occur in a balance store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The user has no account
    #[error("unknown user")]
    UnknownUser {
        #[source]
        cause: Option<sqlx::Error>,
    },

    /// Balance is lower than the requested reservation
    #[error("not enough money")]
    InsufficientFunds {
        #[source]
        cause: Option<sqlx::Error>,
    },

    /// A reservation with the same (user, service, order) already exists
    #[error("transaction already exists")]
    DuplicateTransaction {
        #[source]
        cause: Option<sqlx::Error>,
    },

    /// No pending reservation matches (user, service, order)
    #[error("unknown transaction")]
    UnknownTransaction {
        #[source]
        cause: Option<sqlx::Error>,
    },

    /// The credit would push the balance past what the ledger can hold
    #[error("balance limit exceeded")]
    BalanceLimitExceeded {
        #[source]
        cause: Option<sqlx::Error>,
    },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure inside a non-database backend
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn unknown_user() -> Self {
        Self::UnknownUser { cause: None }
    }

    pub fn insufficient_funds() -> Self {
        Self::InsufficientFunds { cause: None }
    }

    pub fn duplicate_transaction() -> Self {
        Self::DuplicateTransaction { cause: None }
    }

    pub fn unknown_transaction() -> Self {
        Self::UnknownTransaction { cause: None }
    }

    pub fn balance_limit_exceeded() -> Self {
        Self::BalanceLimitExceeded { cause: None }
    }

    /// Check if this error is a business rule rejection rather than a failure
    pub fn is_domain_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownUser { .. }
                | Self::InsufficientFunds { .. }
                | Self::DuplicateTransaction { .. }
                | Self::UnknownTransaction { .. }
                | Self::BalanceLimitExceeded { .. }
        )
    }
}

//! Error types for the pharmacy ledger core.

/// All errors that can occur when using the ledger core.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend failed.
    #[error("storage error: {0}")]
    Storage(Box<dyn core::error::Error + Send + Sync>),

    /// HTTP transport error from the REST storage backend.
    #[cfg(feature = "storage-rest")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The REST backend returned a non-success status code.
    #[cfg(feature = "storage-rest")]
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// No API key was configured for the REST storage backend.
    #[error("REST storage requires an API key")]
    MissingApiKey,

    /// Debit and credit totals of an entry differ.
    #[error("entry is unbalanced: debit {total_debit:.2} != credit {total_credit:.2}")]
    Unbalanced {
        /// Sum of the debit column.
        total_debit: f64,
        /// Sum of the credit column.
        total_credit: f64,
    },

    /// An entry has fewer lines than a double-entry posting needs.
    #[error("entry needs at least two lines, got {0}")]
    TooFewLines(usize),

    /// A referenced record does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A locked entry cannot be modified or deleted.
    #[error("entry '{0}' is locked")]
    EntryLocked(String),

    /// The requested state change is not allowed from the current state.
    #[error("cannot {action} {entity} '{id}' while it is {state}")]
    InvalidTransition {
        /// Kind of record.
        entity: &'static str,
        /// Record identifier.
        id: String,
        /// Current state of the record.
        state: String,
        /// Attempted action.
        action: &'static str,
    },

    /// Statement and ledger balances still differ.
    #[error("reconciliation variance of {variance:.2} must be cleared before validation")]
    VarianceNotZero {
        /// Remaining statement minus ledger difference.
        variance: f64,
    },

    /// A payment amount is zero or negative.
    #[error("invalid amount {0:.2}: must be positive")]
    InvalidAmount(f64),

    /// A payment exceeds what is left to pay on an invoice.
    #[error("payment of {amount:.2} exceeds remaining amount {remaining:.2}")]
    Overpayment {
        /// Attempted payment.
        amount: f64,
        /// Amount still due.
        remaining: f64,
    },

    /// An invoice selection is empty or mixes incompatible sources.
    #[error("invalid invoice selection: {0}")]
    InvalidSelection(String),

    /// Some transactions of an auto-reconcile batch failed.
    #[error("batch finished with {failed} failure(s) and {succeeded} success(es)")]
    BatchPartialFailure {
        /// Number of transactions reconciled.
        succeeded: usize,
        /// Number of transactions that failed.
        failed: usize,
    },

    /// Writing an export file failed.
    #[cfg(feature = "fec")]
    #[error("export error: {0}")]
    Export(#[from] csv::Error),
}

impl LedgerError {
    /// Shorthand for a [`LedgerError::NotFound`] on the given entity.
    #[inline]
    pub(crate) fn not_found<T: core::fmt::Display>(entity: &'static str, id: T) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` for errors the user can fix by correcting input, as
    /// opposed to infrastructure failures.
    #[inline]
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            *self,
            Self::Unbalanced { .. }
                | Self::TooFewLines(_)
                | Self::EntryLocked(_)
                | Self::InvalidTransition { .. }
                | Self::VarianceNotZero { .. }
                | Self::InvalidAmount(_)
                | Self::Overpayment { .. }
                | Self::InvalidSelection(_)
        )
    }
}

/// A specialized `Result` type for ledger operations.
pub type Result<T> = core::result::Result<T, LedgerError>;

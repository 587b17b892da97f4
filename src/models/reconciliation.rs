//! Statement reconciliation model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{BankAccountId, ReconciliationId, ReconciliationState};

/// An inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    /// First day (inclusive).
    pub start: NaiveDate,
    /// Last day (inclusive).
    pub end: NaiveDate,
}

impl Period {
    /// Creates a period from its bounds.
    #[inline]
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Returns `true` if `date` falls within the period.
    #[inline]
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Reconciliation of a bank statement against the books for one account
/// and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// Unique identifier.
    pub id: ReconciliationId,
    /// Reconciled bank account.
    pub account_id: BankAccountId,
    /// Statement period.
    pub period: Period,
    /// Closing balance printed on the bank statement.
    pub statement_balance: f64,
    /// Balance according to the books.
    pub ledger_balance: f64,
    /// `statement_balance - ledger_balance`.
    pub variance: f64,
    /// Progress state.
    pub status: ReconciliationState,
}

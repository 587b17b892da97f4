//! Bank account and bank statement transaction models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    BankAccountId, BankTransactionId, Direction, EntryId, JournalId, ReconciliationStatus,
    TransactionCategory,
};

/// A bank account held by the pharmacy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    /// Unique identifier.
    pub id: BankAccountId,
    /// Display name.
    pub name: String,
    /// Name of the bank.
    pub bank_name: String,
    /// Account number / RIB.
    pub account_number: String,
    /// Class-5 ledger account the bank account is booked against (e.g. `5211`).
    pub ledger_account: String,
    /// Bank journal receiving the generated entries.
    pub journal_id: JournalId,
    /// Balance at the start of the books.
    pub opening_balance: f64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
}

/// Default currency of the OHADA zone (CFA franc, BEAC).
fn default_currency() -> String {
    "XAF".to_owned()
}

/// A movement read from a bank statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransaction {
    /// Unique identifier.
    pub id: BankTransactionId,
    /// Owning bank account.
    pub account_id: BankAccountId,
    /// Value date.
    pub date: NaiveDate,
    /// Statement label.
    pub label: String,
    /// Absolute amount (>= 0).
    pub amount: f64,
    /// Money in or out.
    pub direction: Direction,
    /// Matching state.
    #[serde(default)]
    pub reconciliation_status: ReconciliationStatus,
    /// Business category, when known.
    #[serde(default)]
    pub category: Option<TransactionCategory>,
    /// Centime additionnel included in the amount, when any.
    #[serde(default)]
    pub additional_centime_amount: Option<f64>,
    /// Statement reference.
    #[serde(default)]
    pub reference: Option<String>,
    /// Accounting entry generated when the transaction was reconciled.
    #[serde(default)]
    pub entry_id: Option<EntryId>,
}

impl BankTransaction {
    /// Amount signed from the account holder's point of view
    /// (credit positive, debit negative).
    #[inline]
    #[must_use]
    pub fn signed_amount(&self) -> f64 {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }

    /// Returns `true` once the transaction has been matched.
    #[inline]
    #[must_use]
    pub fn is_reconciled(&self) -> bool {
        self.reconciliation_status == ReconciliationStatus::Reconciled
    }
}

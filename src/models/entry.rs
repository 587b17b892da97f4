//! Ledger entry and entry line models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{EntryId, EntryStatus, JournalId, LineId};

/// One debit or credit line of a ledger entry.
///
/// By convention exactly one of `debit` / `credit` is non-zero; this is
/// not enforced structurally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryLine {
    /// Unique identifier.
    pub id: LineId,
    /// Chart-of-accounts code (e.g. `5211`).
    pub account_code: String,
    /// Account label.
    pub account_label: String,
    /// Line label.
    pub label: String,
    /// Debit amount (>= 0).
    pub debit: f64,
    /// Credit amount (>= 0).
    pub credit: f64,
    /// Lettrage mark clearing this line against others of the same account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconciliation_mark: Option<String>,
    /// Analytic (cost centre) code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytic_code: Option<String>,
}

impl EntryLine {
    /// Creates a debit line with a fresh identifier.
    #[inline]
    #[must_use]
    pub fn debit<C, A, L>(account_code: C, account_label: A, label: L, amount: f64) -> Self
    where
        C: Into<String>,
        A: Into<String>,
        L: Into<String>,
    {
        Self {
            id: LineId::generate(),
            account_code: account_code.into(),
            account_label: account_label.into(),
            label: label.into(),
            debit: amount,
            credit: 0.0,
            reconciliation_mark: None,
            analytic_code: None,
        }
    }

    /// Creates a credit line with a fresh identifier.
    #[inline]
    #[must_use]
    pub fn credit<C, A, L>(account_code: C, account_label: A, label: L, amount: f64) -> Self
    where
        C: Into<String>,
        A: Into<String>,
        L: Into<String>,
    {
        Self {
            credit: amount,
            debit: 0.0,
            ..Self::debit(account_code, account_label, label, 0.0)
        }
    }

    /// Signed amount of the line (debit positive, credit negative).
    #[inline]
    #[must_use]
    pub fn signed_amount(&self) -> f64 {
        self.debit - self.credit
    }
}

/// A journal entry made of balanced debit/credit lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Unique identifier.
    pub id: EntryId,
    /// Journal the entry belongs to.
    pub journal_id: JournalId,
    /// Piece number allocated from the journal's counter.
    pub piece_number: String,
    /// Accounting date.
    pub date: NaiveDate,
    /// Entry label.
    pub label: String,
    /// External reference (cheque number, invoice number, ...).
    #[serde(default)]
    pub reference: Option<String>,
    /// Total debit of the lines.
    pub total_amount: f64,
    /// Lifecycle state.
    pub status: EntryStatus,
    /// Debit and credit lines.
    pub lines: Vec<EntryLine>,
    /// Operator who created the entry.
    pub created_by: String,
    /// Operator who validated the entry.
    #[serde(default)]
    pub validated_by: Option<String>,
    /// Date of validation.
    #[serde(default)]
    pub validation_date: Option<NaiveDate>,
}

impl LedgerEntry {
    /// Returns `true` once the entry is locked and therefore immutable.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.status == EntryStatus::Locked
    }

    /// Returns `true` for validated or locked entries, i.e. those that
    /// count in the books.
    #[inline]
    #[must_use]
    pub fn is_posted(&self) -> bool {
        matches!(self.status, EntryStatus::Validated | EntryStatus::Locked)
    }
}

/// Input for creating a new ledger entry.
///
/// The piece number, status and audit fields are filled in when the
/// draft is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDraft {
    /// Target journal.
    pub journal_id: JournalId,
    /// Accounting date.
    pub date: NaiveDate,
    /// Entry label.
    pub label: String,
    /// External reference.
    #[serde(default)]
    pub reference: Option<String>,
    /// Debit and credit lines.
    pub lines: Vec<EntryLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_constructors_fill_one_side() {
        let debit = EntryLine::debit("5211", "Banque", "Dépôt", 15_000.0);
        assert!((debit.debit - 15_000.0).abs() < f64::EPSILON);
        assert!(debit.credit.abs() < f64::EPSILON);

        let credit = EntryLine::credit("701", "Ventes", "Dépôt", 15_000.0);
        assert!(credit.debit.abs() < f64::EPSILON);
        assert!((credit.credit - 15_000.0).abs() < f64::EPSILON);
        assert_ne!(debit.id, credit.id);
        assert!((credit.signed_amount() + 15_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialize_entry_with_optional_fields_missing() {
        let json = r#"{
            "id": "e-1",
            "journalId": "j-vt",
            "pieceNumber": "VT000001",
            "date": "2024-03-01",
            "label": "Ventes du jour",
            "totalAmount": 15000,
            "status": "validated",
            "lines": [
                {"id": "l-1", "accountCode": "571", "accountLabel": "Caisse",
                 "label": "Encaissement", "debit": 15000, "credit": 0},
                {"id": "l-2", "accountCode": "701", "accountLabel": "Ventes",
                 "label": "Ventes", "debit": 0, "credit": 15000, "analyticCode": "OFF1"}
            ],
            "createdBy": "caissier"
        }"#;
        let entry: LedgerEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.status, EntryStatus::Validated);
        assert!(entry.is_posted());
        assert!(!entry.is_locked());
        assert_eq!(entry.lines.len(), 2);
        assert_eq!(entry.lines.get(1).unwrap().analytic_code.as_deref(), Some("OFF1"));
        assert!(entry.reference.is_none());
        assert!(entry.validated_by.is_none());
    }
}

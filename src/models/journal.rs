//! Accounting journal model.

use serde::{Deserialize, Serialize};

use super::{JournalId, JournalKind};

/// Width of the zero-padded counter in piece numbers.
const PIECE_NUMBER_WIDTH: usize = 6;

/// An accounting journal (sales, purchases, bank, ...).
///
/// The journal's piece counter is owned by the storage backend, which
/// increments it atomically; only the prefix lives here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journal {
    /// Unique identifier.
    pub id: JournalId,
    /// Short code shown in reports and exports (e.g. `BQ1`).
    pub code: String,
    /// Display name.
    pub label: String,
    /// Prefix of the piece numbers issued by this journal.
    pub prefix: String,
    /// Kind of journal.
    pub kind: JournalKind,
}

impl Journal {
    /// Name of the storage counter backing this journal's piece numbers.
    #[inline]
    #[must_use]
    pub fn counter_name(&self) -> String {
        format!("journal:{}", self.id)
    }

    /// Formats the piece number for the given counter value.
    #[inline]
    #[must_use]
    pub fn piece_number(&self, counter: u64) -> String {
        format!("{}{counter:0width$}", self.prefix, width = PIECE_NUMBER_WIDTH)
    }
}

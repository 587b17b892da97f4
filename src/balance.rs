//! Double-entry balance check and lettrage.
//!
//! Every ledger entry must have equal debit and credit totals before it is
//! saved or validated. The same check clears lines of one account against
//! each other (lettrage).

use alloc::collections::BTreeSet;

use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::models::EntryLine;

/// Tolerance used for every monetary comparison.
pub const BALANCE_EPSILON: f64 = 0.01;

/// Smallest number of lines a posted entry may carry.
pub const MIN_ENTRY_LINES: usize = 2;

/// Debit and credit totals of a set of entry lines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineTotals {
    /// Sum of the debit column.
    pub total_debit: f64,
    /// Sum of the credit column.
    pub total_credit: f64,
    /// `|total_debit - total_credit| < 0.01`.
    pub is_balanced: bool,
}

impl LineTotals {
    /// Debit minus credit.
    #[inline]
    #[must_use]
    pub fn difference(&self) -> f64 {
        self.total_debit - self.total_credit
    }
}

/// Sums the debit and credit columns of `lines`.
#[inline]
#[must_use]
pub fn balance<'line, I>(lines: I) -> LineTotals
where
    I: IntoIterator<Item = &'line EntryLine>,
{
    let (total_debit, total_credit) = lines
        .into_iter()
        .fold((0.0_f64, 0.0_f64), |(debit, credit), line| {
            (debit + line.debit, credit + line.credit)
        });
    LineTotals {
        total_debit,
        total_credit,
        is_balanced: (total_debit - total_credit).abs() < BALANCE_EPSILON,
    }
}

/// Like [`balance`], but fails when the lines do not balance.
///
/// # Errors
///
/// Returns [`LedgerError::Unbalanced`] carrying both totals.
#[inline]
pub fn ensure_balanced<'line, I>(lines: I) -> Result<LineTotals>
where
    I: IntoIterator<Item = &'line EntryLine>,
{
    let totals = balance(lines);
    if totals.is_balanced {
        Ok(totals)
    } else {
        Err(LedgerError::Unbalanced {
            total_debit: totals.total_debit,
            total_credit: totals.total_credit,
        })
    }
}

/// Checks that `lines` form a postable entry: at least
/// [`MIN_ENTRY_LINES`] lines whose columns balance.
///
/// # Errors
///
/// Returns [`LedgerError::TooFewLines`] for an empty or single-line entry
/// and [`LedgerError::Unbalanced`] when the columns differ.
#[inline]
pub fn ensure_postable(lines: &[EntryLine]) -> Result<LineTotals> {
    if lines.len() < MIN_ENTRY_LINES {
        return Err(LedgerError::TooFewLines(lines.len()));
    }
    ensure_balanced(lines)
}

/// Checks that `lines` can be lettered together on `account_code`.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidSelection`] when fewer than two lines are
/// given, a line is given twice, belongs to another account or is already
/// lettered, and [`LedgerError::Unbalanced`] when the lines do not clear
/// each other.
#[inline]
pub fn ensure_letterable(account_code: &str, lines: &[&EntryLine]) -> Result<LineTotals> {
    if lines.len() < 2 {
        return Err(LedgerError::InvalidSelection(
            "lettrage needs at least two lines".to_owned(),
        ));
    }
    let mut seen = BTreeSet::new();
    for line in lines {
        if !seen.insert(&line.id) {
            return Err(LedgerError::InvalidSelection(format!(
                "line '{}' is selected more than once",
                line.id
            )));
        }
        if line.account_code != account_code {
            return Err(LedgerError::InvalidSelection(format!(
                "line '{}' is booked on account {}, not {account_code}",
                line.id, line.account_code
            )));
        }
        if let Some(mark) = line.reconciliation_mark.as_deref() {
            return Err(LedgerError::InvalidSelection(format!(
                "line '{}' is already lettered with mark {mark}",
                line.id
            )));
        }
    }
    ensure_balanced(lines.iter().copied())
}

/// Name of the storage counter backing the lettrage marks of an account.
#[inline]
#[must_use]
pub fn lettrage_counter(account_code: &str) -> String {
    format!("lettrage:{account_code}")
}

/// Converts a lettrage counter value to its mark: 1 → `A`, 26 → `Z`,
/// 27 → `AA`, 28 → `AB`, ...
#[inline]
#[must_use]
pub fn lettrage_mark(counter: u64) -> String {
    let mut remaining = counter.max(1);
    let mut letters = Vec::new();
    while remaining > 0 {
        remaining -= 1;
        let offset = u8::try_from(remaining.rem_euclid(26)).unwrap_or(0);
        letters.push(char::from(b'A' + offset));
        remaining = remaining.div_euclid(26);
    }
    letters.iter().rev().collect()
}

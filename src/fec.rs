//! FEC (*Fichier des Écritures Comptables*) export.
//!
//! One row per line of every validated or locked entry of the period,
//! ordered by date then piece number, in the 18 standard tab-separated
//! columns.

use std::collections::HashMap;
use std::io;

use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Journal, JournalId, LedgerEntry, Period};

/// Date format of the FEC columns.
const FEC_DATE_FORMAT: &str = "%Y%m%d";

/// The 18 standard FEC columns, in order.
pub const FEC_COLUMNS: [&str; 18] = [
    "JournalCode",
    "JournalLib",
    "EcritureNum",
    "EcritureDate",
    "CompteNum",
    "CompteLib",
    "CompAuxNum",
    "CompAuxLib",
    "PieceRef",
    "PieceDate",
    "EcritureLib",
    "Debit",
    "Credit",
    "EcritureLet",
    "DateLet",
    "ValidDate",
    "Montantdevise",
    "Idevise",
];

/// One FEC row. Field order is the column order of [`FEC_COLUMNS`].
#[derive(Debug, Serialize)]
struct FecRow<'entry> {
    /// Journal code.
    journal_code: &'entry str,
    /// Journal label.
    journal_lib: &'entry str,
    /// Piece number.
    ecriture_num: &'entry str,
    /// Entry date.
    ecriture_date: String,
    /// Account code.
    compte_num: &'entry str,
    /// Account label.
    compte_lib: &'entry str,
    /// Auxiliary account code.
    comp_aux_num: &'entry str,
    /// Auxiliary account label.
    comp_aux_lib: &'entry str,
    /// Supporting document reference.
    piece_ref: &'entry str,
    /// Supporting document date.
    piece_date: String,
    /// Line label.
    ecriture_lib: &'entry str,
    /// Debit amount.
    debit: String,
    /// Credit amount.
    credit: String,
    /// Lettrage mark.
    ecriture_let: &'entry str,
    /// Lettrage date.
    date_let: &'entry str,
    /// Validation date.
    valid_date: String,
    /// Amount in foreign currency.
    montantdevise: &'entry str,
    /// Foreign currency code.
    idevise: &'entry str,
}

/// Formats a date as `YYYYMMDD`.
fn fec_date(date: NaiveDate) -> String {
    date.format(FEC_DATE_FORMAT).to_string()
}

/// Formats an amount with two decimals and a comma separator.
fn fec_amount(amount: f64) -> String {
    format!("{amount:.2}").replace('.', ",")
}

/// Writes the FEC of `period` to `writer` and returns the number of rows.
///
/// # Errors
///
/// Returns [`crate::LedgerError::Export`] if a row cannot be written.
pub fn write_fec<W>(
    writer: W,
    journals: &[Journal],
    entries: &[LedgerEntry],
    period: Period,
) -> Result<usize>
where
    W: io::Write,
{
    let journals: HashMap<&JournalId, &Journal> =
        journals.iter().map(|journal| (&journal.id, journal)).collect();

    let mut posted: Vec<&LedgerEntry> = entries
        .iter()
        .filter(|entry| entry.is_posted() && period.contains(entry.date))
        .collect();
    posted.sort_by(|left, right| {
        left.date
            .cmp(&right.date)
            .then_with(|| left.piece_number.cmp(&right.piece_number))
    });

    let mut fec = WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(writer);
    fec.write_record(FEC_COLUMNS)?;
    let mut rows = 0_usize;
    for entry in posted {
        let journal = journals.get(&entry.journal_id);
        let journal_code = journal.map_or(entry.journal_id.as_inner(), |found| found.code.as_str());
        let journal_lib = journal.map_or("", |found| found.label.as_str());
        let piece_ref = entry.reference.as_deref().unwrap_or(&entry.piece_number);
        let valid_date = entry.validation_date.map(fec_date).unwrap_or_default();

        for line in &entry.lines {
            fec.serialize(FecRow {
                journal_code,
                journal_lib,
                ecriture_num: &entry.piece_number,
                ecriture_date: fec_date(entry.date),
                compte_num: &line.account_code,
                compte_lib: &line.account_label,
                comp_aux_num: "",
                comp_aux_lib: "",
                piece_ref,
                piece_date: fec_date(entry.date),
                ecriture_lib: &line.label,
                debit: fec_amount(line.debit),
                credit: fec_amount(line.credit),
                ecriture_let: line.reconciliation_mark.as_deref().unwrap_or_default(),
                date_let: "",
                valid_date: valid_date.clone(),
                montantdevise: "",
                idevise: "",
            })?;
            rows += 1;
        }
    }
    fec.flush().map_err(csv::Error::from)?;
    tracing::debug!(rows, "FEC written");
    Ok(rows)
}

/// Renders the FEC of `period` as a string.
///
/// # Errors
///
/// Returns [`crate::LedgerError::Export`] if a row cannot be written.
#[inline]
pub fn fec_string(journals: &[Journal], entries: &[LedgerEntry], period: Period) -> Result<String> {
    let mut buffer = Vec::new();
    let _rows = write_fec(&mut buffer, journals, entries, period)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

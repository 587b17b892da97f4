//! Bookkeeping core for pharmacy back offices under the OHADA chart of
//! accounts.
//!
//! The crate provides:
//!
//! - typed records for journals, ledger entries, bank statements, sales,
//!   receptions and invoices ([`models`]);
//! - the pure accounting rules: line balancing and lettrage ([`balance`]),
//!   VAT and centime additionnel ([`tax`]), bank reconciliation
//!   ([`reconcile`]) and invoice aggregation ([`invoicing`]);
//! - pluggable persistence with an atomic numbering counter ([`storage`]);
//! - the [`books`] facade tying rules and storage together, in async and
//!   blocking flavours;
//! - the French FEC audit export (`fec` feature).
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "blocking")]
//! # fn main() -> pharma_ledger::Result<()> {
//! use pharma_ledger::books::BooksBlocking;
//! use pharma_ledger::models::{EntryDraft, EntryLine, Journal, JournalId, JournalKind, NaiveDate};
//! use pharma_ledger::storage::InMemoryStorage;
//!
//! let books = BooksBlocking::builder()
//!     .storage(InMemoryStorage::new())
//!     .operator("comptable")
//!     .build()?;
//! books.save_journals(vec![Journal {
//!     id: JournalId::from("j-vt"),
//!     code: "VT".to_owned(),
//!     label: "Ventes".to_owned(),
//!     prefix: "VT".to_owned(),
//!     kind: JournalKind::Sales,
//! }])?;
//!
//! let entry = books.create_entry(EntryDraft {
//!     journal_id: JournalId::from("j-vt"),
//!     date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap_or_default(),
//!     label: "Ventes comptoir".to_owned(),
//!     reference: None,
//!     lines: vec![
//!         EntryLine::debit("571", "Caisse", "Encaissement", 15_000.0),
//!         EntryLine::credit("701", "Ventes", "Ventes", 15_000.0),
//!     ],
//! })?;
//! assert_eq!(entry.piece_number, "VT000001");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "blocking"))]
//! # fn main() {}
//! ```

extern crate alloc;

pub mod balance;
pub mod books;
pub mod error;
#[cfg(feature = "fec")]
pub mod fec;
pub mod invoicing;
pub mod models;
pub mod notice;
pub mod reconcile;
pub mod storage;
pub mod tax;

pub use error::{LedgerError, Result};

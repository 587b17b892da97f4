//! Data models for the bookkeeping entities.
//!
//! This module contains strongly-typed representations of journals,
//! ledger entries, bank movements, tax rates, invoices and their source
//! records, newtype ID wrappers, and enumeration types for constrained
//! values.

mod bank;
mod entry;
mod enums;
mod ids;
mod invoice;
mod journal;
mod reconciliation;
mod tax_rate;
mod trade;

pub use bank::{BankAccount, BankTransaction};
pub use chrono::NaiveDate;
pub use entry::{EntryDraft, EntryLine, LedgerEntry};
pub use enums::{
    Direction, EntryStatus, InvoiceKind, InvoiceStatus, JournalKind, PaymentStatus,
    ReconciliationState, ReconciliationStatus, SourceKind, TaxKind, TransactionCategory,
};
pub use ids::{
    BankAccountId, BankTransactionId, EntryId, InvoiceId, InvoiceLineId, JournalId, LineId,
    ReceptionId, ReconciliationId, SaleId, TaxRateId,
};
pub use invoice::{Invoice, InvoiceLine, InvoiceSource};
pub use journal::Journal;
pub use reconciliation::{Period, Reconciliation};
pub use tax_rate::TaxRate;
pub use trade::{Reception, Sale};

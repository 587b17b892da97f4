//! Pluggable storage backends for the bookkeeping records.
//!
//! This module defines the [`Storage`] (async) and [`BlockingStorage`]
//! (blocking) traits via a shared macro, so both flavours expose the same
//! typed collections plus an atomic sequence counter.

use core::fmt::Display;
use core::hash::Hash;
use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::models::{
    BankAccount, BankTransaction, Invoice, Journal, LedgerEntry, Reception, Reconciliation, Sale,
    TaxRate,
};

/// Forwards every storage trait method to the backend's generic helpers
/// (`allocate`, `read_all`, `upsert_all`, `remove_all`, `clear_all`).
///
/// `async_ready` wraps synchronous helpers in a ready future;
/// `async_native` expects helpers that already return futures.
macro_rules! forward_storage {
    // ── Entry points ────────────────────────────────────────────────
    (blocking: $backend:ty) => {
        impl $crate::storage::BlockingStorage for $backend {
            forward_storage!(@methods blocking);
        }
    };
    (async_ready: $backend:ty) => {
        impl $crate::storage::Storage for $backend {
            forward_storage!(@methods async_ready);
        }
    };
    (async_native: $backend:ty) => {
        impl $crate::storage::Storage for $backend {
            forward_storage!(@methods async_native);
        }
    };

    // ── Method list ─────────────────────────────────────────────────
    (@methods $mode:ident) => {
        forward_storage!(@method $mode, next_sequence(counter: &str) -> u64 => allocate);

        forward_storage!(@method $mode,
            journals() -> Vec<$crate::models::Journal>
            => read_all::<$crate::models::Journal>);
        forward_storage!(@method $mode,
            upsert_journals(items: Vec<$crate::models::Journal>) -> ()
            => upsert_all::<$crate::models::Journal>);
        forward_storage!(@method $mode,
            remove_journals(ids: &[$crate::models::JournalId]) -> ()
            => remove_all::<$crate::models::Journal>);

        forward_storage!(@method $mode,
            ledger_entries() -> Vec<$crate::models::LedgerEntry>
            => read_all::<$crate::models::LedgerEntry>);
        forward_storage!(@method $mode,
            upsert_ledger_entries(items: Vec<$crate::models::LedgerEntry>) -> ()
            => upsert_all::<$crate::models::LedgerEntry>);
        forward_storage!(@method $mode,
            remove_ledger_entries(ids: &[$crate::models::EntryId]) -> ()
            => remove_all::<$crate::models::LedgerEntry>);

        forward_storage!(@method $mode,
            bank_accounts() -> Vec<$crate::models::BankAccount>
            => read_all::<$crate::models::BankAccount>);
        forward_storage!(@method $mode,
            upsert_bank_accounts(items: Vec<$crate::models::BankAccount>) -> ()
            => upsert_all::<$crate::models::BankAccount>);
        forward_storage!(@method $mode,
            remove_bank_accounts(ids: &[$crate::models::BankAccountId]) -> ()
            => remove_all::<$crate::models::BankAccount>);

        forward_storage!(@method $mode,
            bank_transactions() -> Vec<$crate::models::BankTransaction>
            => read_all::<$crate::models::BankTransaction>);
        forward_storage!(@method $mode,
            upsert_bank_transactions(items: Vec<$crate::models::BankTransaction>) -> ()
            => upsert_all::<$crate::models::BankTransaction>);
        forward_storage!(@method $mode,
            remove_bank_transactions(ids: &[$crate::models::BankTransactionId]) -> ()
            => remove_all::<$crate::models::BankTransaction>);

        forward_storage!(@method $mode,
            reconciliations() -> Vec<$crate::models::Reconciliation>
            => read_all::<$crate::models::Reconciliation>);
        forward_storage!(@method $mode,
            upsert_reconciliations(items: Vec<$crate::models::Reconciliation>) -> ()
            => upsert_all::<$crate::models::Reconciliation>);
        forward_storage!(@method $mode,
            remove_reconciliations(ids: &[$crate::models::ReconciliationId]) -> ()
            => remove_all::<$crate::models::Reconciliation>);

        forward_storage!(@method $mode,
            tax_rates() -> Vec<$crate::models::TaxRate>
            => read_all::<$crate::models::TaxRate>);
        forward_storage!(@method $mode,
            upsert_tax_rates(items: Vec<$crate::models::TaxRate>) -> ()
            => upsert_all::<$crate::models::TaxRate>);
        forward_storage!(@method $mode,
            remove_tax_rates(ids: &[$crate::models::TaxRateId]) -> ()
            => remove_all::<$crate::models::TaxRate>);

        forward_storage!(@method $mode,
            invoices() -> Vec<$crate::models::Invoice>
            => read_all::<$crate::models::Invoice>);
        forward_storage!(@method $mode,
            upsert_invoices(items: Vec<$crate::models::Invoice>) -> ()
            => upsert_all::<$crate::models::Invoice>);
        forward_storage!(@method $mode,
            remove_invoices(ids: &[$crate::models::InvoiceId]) -> ()
            => remove_all::<$crate::models::Invoice>);

        forward_storage!(@method $mode,
            sales() -> Vec<$crate::models::Sale>
            => read_all::<$crate::models::Sale>);
        forward_storage!(@method $mode,
            upsert_sales(items: Vec<$crate::models::Sale>) -> ()
            => upsert_all::<$crate::models::Sale>);
        forward_storage!(@method $mode,
            remove_sales(ids: &[$crate::models::SaleId]) -> ()
            => remove_all::<$crate::models::Sale>);

        forward_storage!(@method $mode,
            receptions() -> Vec<$crate::models::Reception>
            => read_all::<$crate::models::Reception>);
        forward_storage!(@method $mode,
            upsert_receptions(items: Vec<$crate::models::Reception>) -> ()
            => upsert_all::<$crate::models::Reception>);
        forward_storage!(@method $mode,
            remove_receptions(ids: &[$crate::models::ReceptionId]) -> ()
            => remove_all::<$crate::models::Reception>);

        forward_storage!(@method $mode, clear() -> () => clear_all);
    };

    // ── Renderers ───────────────────────────────────────────────────
    (@method blocking,
     $name:ident($($param:ident: $param_ty:ty),*) -> $ret:ty
     => $target:ident $(::<$record:ty>)?) => {
        #[inline]
        fn $name(&self $(, $param: $param_ty)*) -> $crate::error::Result<$ret> {
            self.$target $(::<$record>)? ($($param),*)
        }
    };
    (@method async_ready,
     $name:ident($($param:ident: $param_ty:ty),*) -> $ret:ty
     => $target:ident $(::<$record:ty>)?) => {
        #[inline]
        fn $name(&self $(, $param: $param_ty)*)
            -> impl core::future::Future<Output = $crate::error::Result<$ret>> + Send {
            core::future::ready(self.$target $(::<$record>)? ($($param),*))
        }
    };
    (@method async_native,
     $name:ident($($param:ident: $param_ty:ty),*) -> $ret:ty
     => $target:ident $(::<$record:ty>)?) => {
        #[inline]
        fn $name(&self $(, $param: $param_ty)*)
            -> impl core::future::Future<Output = $crate::error::Result<$ret>> + Send {
            self.$target $(::<$record>)? ($($param),*)
        }
    };
}

#[cfg(all(test, feature = "blocking"))]
pub(crate) use forward_storage;

#[cfg(feature = "storage-file")]
mod file;
mod memory;
#[cfg(feature = "storage-rest")]
mod rest;

#[cfg(feature = "storage-file")]
pub use file::FileStorage;
pub use memory::InMemoryStorage;
#[cfg(all(feature = "storage-rest", feature = "blocking"))]
pub use rest::{BlockingRestStorage, BlockingRestStorageBuilder};
#[cfg(all(feature = "storage-rest", feature = "async"))]
pub use rest::{RestStorage, RestStorageBuilder};

/// A stored record type, keyed by its identifier.
pub(crate) trait Record:
    Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Identifier type.
    type Key: Clone + Eq + Hash + Display + Send + Sync;

    /// Collection (file or table) name.
    const COLLECTION: &'static str;

    /// Returns the record's identifier.
    fn key(&self) -> Self::Key;
}

/// Implements [`Record`] for models keyed by their `id` field.
macro_rules! impl_record {
    ($($record:ty => $key:ty, $collection:literal;)+) => {
        $(
            impl Record for $record {
                type Key = $key;
                const COLLECTION: &'static str = $collection;

                #[inline]
                fn key(&self) -> $key {
                    self.id.clone()
                }
            }
        )+
    };
}

impl_record! {
    Journal => crate::models::JournalId, "journals";
    LedgerEntry => crate::models::EntryId, "ledger_entries";
    BankAccount => crate::models::BankAccountId, "bank_accounts";
    BankTransaction => crate::models::BankTransactionId, "bank_transactions";
    Reconciliation => crate::models::ReconciliationId, "reconciliations";
    TaxRate => crate::models::TaxRateId, "tax_rates";
    Invoice => crate::models::InvoiceId, "invoices";
    Sale => crate::models::SaleId, "sales";
    Reception => crate::models::ReceptionId, "receptions";
}

/// Every collection name, used to wipe a backend.
pub(crate) const COLLECTIONS: [&str; 9] = [
    Journal::COLLECTION,
    LedgerEntry::COLLECTION,
    BankAccount::COLLECTION,
    BankTransaction::COLLECTION,
    Reconciliation::COLLECTION,
    TaxRate::COLLECTION,
    Invoice::COLLECTION,
    Sale::COLLECTION,
    Reception::COLLECTION,
];

/// Merges `new_items` into `existing` by key. Matching items are replaced
/// in place, new ones appended in order.
pub(crate) fn upsert_by_key<T: Record>(existing: &mut Vec<T>, new_items: Vec<T>) {
    let mut positions: HashMap<T::Key, usize> = existing
        .iter()
        .enumerate()
        .map(|(index, item)| (item.key(), index))
        .collect();
    for item in new_items {
        let key = item.key();
        if let Some(slot) = positions
            .get(&key)
            .copied()
            .and_then(|index| existing.get_mut(index))
        {
            *slot = item;
        } else {
            let _previous = positions.insert(key, existing.len());
            existing.push(item);
        }
    }
}

/// Removes items whose key is in `ids`.
pub(crate) fn remove_by_key<T: Record>(existing: &mut Vec<T>, ids: &[T::Key]) {
    let id_set: HashSet<&T::Key> = ids.iter().collect();
    existing.retain(|item| !id_set.contains(&item.key()));
}

/// Generates a storage trait (async or blocking) with all collection
/// methods.
///
/// Uses `@methods` to define the method list once, and `@method` to render
/// each method in async (`impl Future + Send`) or blocking (`fn`) style.
macro_rules! define_storage {
    // ── Entry points ────────────────────────────────────────────────
    (
        trait_name: $trait_name:ident,
        trait_doc: $trait_doc:expr,
        mode: async_mode,
    ) => {
        #[doc = $trait_doc]
        pub trait $trait_name: core::fmt::Debug + Send + Sync {
            define_storage!(@methods async_mode);
        }
    };
    (
        trait_name: $trait_name:ident,
        trait_doc: $trait_doc:expr,
        mode: blocking,
    ) => {
        #[doc = $trait_doc]
        pub trait $trait_name: core::fmt::Debug + Send + Sync {
            define_storage!(@methods blocking);
        }
    };

    // ── Single method list (shared between both variants) ───────────
    (@methods $mode:ident) => {
        // Sequences
        define_storage!(@method $mode, next_sequence,
            "Atomically increments the named counter and returns its new value.\n\nCounters start at 1. Two concurrent callers never receive the same value.\n\n# Errors\n\nReturns an error if the storage backend fails to update the counter.",
            counter: &str, -> Result<u64>);

        // Read
        define_storage!(@method $mode, journals,
            "Returns all stored journals.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<Journal>>);
        define_storage!(@method $mode, ledger_entries,
            "Returns all stored ledger entries.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<LedgerEntry>>);
        define_storage!(@method $mode, bank_accounts,
            "Returns all stored bank accounts.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<BankAccount>>);
        define_storage!(@method $mode, bank_transactions,
            "Returns all stored bank transactions.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<BankTransaction>>);
        define_storage!(@method $mode, reconciliations,
            "Returns all stored statement reconciliations.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<Reconciliation>>);
        define_storage!(@method $mode, tax_rates,
            "Returns all configured tax rates.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<TaxRate>>);
        define_storage!(@method $mode, invoices,
            "Returns all stored invoices.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<Invoice>>);
        define_storage!(@method $mode, sales,
            "Returns all stored sales.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<Sale>>);
        define_storage!(@method $mode, receptions,
            "Returns all stored receptions.\n\n# Errors\n\nReturns an error if the storage backend fails to read.",
            -> Result<Vec<Reception>>);

        // Upsert
        define_storage!(@method $mode, upsert_journals,
            "Inserts or updates journals (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<Journal>, -> Result<()>);
        define_storage!(@method $mode, upsert_ledger_entries,
            "Inserts or updates ledger entries (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<LedgerEntry>, -> Result<()>);
        define_storage!(@method $mode, upsert_bank_accounts,
            "Inserts or updates bank accounts (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<BankAccount>, -> Result<()>);
        define_storage!(@method $mode, upsert_bank_transactions,
            "Inserts or updates bank transactions (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<BankTransaction>, -> Result<()>);
        define_storage!(@method $mode, upsert_reconciliations,
            "Inserts or updates statement reconciliations (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<Reconciliation>, -> Result<()>);
        define_storage!(@method $mode, upsert_tax_rates,
            "Inserts or updates tax rates (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<TaxRate>, -> Result<()>);
        define_storage!(@method $mode, upsert_invoices,
            "Inserts or updates invoices (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<Invoice>, -> Result<()>);
        define_storage!(@method $mode, upsert_sales,
            "Inserts or updates sales (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<Sale>, -> Result<()>);
        define_storage!(@method $mode, upsert_receptions,
            "Inserts or updates receptions (matched by ID).\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            items: Vec<Reception>, -> Result<()>);

        // Remove
        define_storage!(@method $mode, remove_journals,
            "Removes journals by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[JournalId], -> Result<()>);
        define_storage!(@method $mode, remove_ledger_entries,
            "Removes ledger entries by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[EntryId], -> Result<()>);
        define_storage!(@method $mode, remove_bank_accounts,
            "Removes bank accounts by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[BankAccountId], -> Result<()>);
        define_storage!(@method $mode, remove_bank_transactions,
            "Removes bank transactions by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[BankTransactionId], -> Result<()>);
        define_storage!(@method $mode, remove_reconciliations,
            "Removes statement reconciliations by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[ReconciliationId], -> Result<()>);
        define_storage!(@method $mode, remove_tax_rates,
            "Removes tax rates by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[TaxRateId], -> Result<()>);
        define_storage!(@method $mode, remove_invoices,
            "Removes invoices by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[InvoiceId], -> Result<()>);
        define_storage!(@method $mode, remove_sales,
            "Removes sales by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[SaleId], -> Result<()>);
        define_storage!(@method $mode, remove_receptions,
            "Removes receptions by their IDs.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            ids: &[ReceptionId], -> Result<()>);

        // Clear
        define_storage!(@method $mode, clear,
            "Removes all stored records and resets every counter.\n\n# Errors\n\nReturns an error if the storage backend fails to write.",
            -> Result<()>);
    };

    // ── Blocking method renderer ────────────────────────────────────
    (@method blocking, $name:ident, $doc:expr,
     $($param:ident: $param_ty:ty,)* -> $ret:ty) => {
        #[doc = $doc]
        fn $name(&self $(, $param: $param_ty)*) -> $ret;
    };

    // ── Async method renderer (returns impl Future + Send) ──────────
    (@method async_mode, $name:ident, $doc:expr,
     $($param:ident: $param_ty:ty,)* -> $ret:ty) => {
        #[doc = $doc]
        fn $name(&self $(, $param: $param_ty)*)
            -> impl core::future::Future<Output = $ret> + Send;
    };
}

#[cfg(feature = "async")]
mod async_storage {
    //! Async storage trait definition.

    use crate::error::Result;
    use crate::models::{
        BankAccount, BankAccountId, BankTransaction, BankTransactionId, EntryId, Invoice,
        InvoiceId, Journal, JournalId, LedgerEntry, Reception, ReceptionId, Reconciliation,
        ReconciliationId, Sale, SaleId, TaxRate, TaxRateId,
    };

    define_storage! {
        trait_name: Storage,
        trait_doc: "Async storage backend for the bookkeeping records.\n\nAll methods take `&self`; implementations use interior mutability\n(e.g. `Mutex`) for thread-safe mutation.",
        mode: async_mode,
    }
}

#[cfg(feature = "blocking")]
mod blocking_storage {
    //! Blocking storage trait definition.

    use crate::error::Result;
    use crate::models::{
        BankAccount, BankAccountId, BankTransaction, BankTransactionId, EntryId, Invoice,
        InvoiceId, Journal, JournalId, LedgerEntry, Reception, ReceptionId, Reconciliation,
        ReconciliationId, Sale, SaleId, TaxRate, TaxRateId,
    };

    define_storage! {
        trait_name: BlockingStorage,
        trait_doc: "Blocking storage backend for the bookkeeping records.\n\nAll methods take `&self`; implementations use interior mutability\n(e.g. `Mutex`) for thread-safe mutation.",
        mode: blocking,
    }
}

#[cfg(feature = "async")]
pub use async_storage::Storage;
#[cfg(feature = "blocking")]
pub use blocking_storage::BlockingStorage;

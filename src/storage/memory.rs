//! In-memory storage backend for testing.
//!
//! Provides [`InMemoryStorage`], a thread-safe in-memory implementation of
//! the storage traits. Ideal for unit and integration tests where file I/O
//! is undesirable.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{COLLECTIONS, Record, remove_by_key, upsert_by_key};
use crate::error::{LedgerError, Result};
use crate::models::{
    BankAccount, BankTransaction, Invoice, Journal, LedgerEntry, Reception, Reconciliation, Sale,
    TaxRate,
};

/// Thread-safe in-memory storage for testing.
///
/// This type implements both [`super::Storage`] (async) and
/// [`super::BlockingStorage`] (blocking) traits, providing a zero-setup
/// storage backend for tests.
///
/// # Upsert semantics
///
/// Like [`super::FileStorage`], upserts merge by key: existing items with
/// matching IDs are replaced in place, new items are appended.
///
/// # Example
///
/// ```rust
/// use pharma_ledger::storage::InMemoryStorage;
///
/// let storage = InMemoryStorage::new();
/// // Use with Books or BooksBlocking builders:
/// // BooksBlocking::builder().storage(storage).operator("...").build()
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// All state behind a single mutex for thread-safe interior mutability.
    inner: Mutex<Inner>,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Named counters.
    sequences: HashMap<String, u64>,
    /// Stored journals.
    journals: Vec<Journal>,
    /// Stored ledger entries.
    ledger_entries: Vec<LedgerEntry>,
    /// Stored bank accounts.
    bank_accounts: Vec<BankAccount>,
    /// Stored bank transactions.
    bank_transactions: Vec<BankTransaction>,
    /// Stored statement reconciliations.
    reconciliations: Vec<Reconciliation>,
    /// Stored tax rates.
    tax_rates: Vec<TaxRate>,
    /// Stored invoices.
    invoices: Vec<Invoice>,
    /// Stored sales.
    sales: Vec<Sale>,
    /// Stored receptions.
    receptions: Vec<Reception>,
}

/// Typed access to the vector holding one collection.
trait Slot<T> {
    /// Returns the collection's backing vector.
    fn slot(&mut self) -> &mut Vec<T>;
}

/// Implements [`Slot`] for each collection field of [`Inner`].
macro_rules! impl_slots {
    ($($record:ty => $field:ident;)+) => {
        $(
            impl Slot<$record> for Inner {
                fn slot(&mut self) -> &mut Vec<$record> {
                    &mut self.$field
                }
            }
        )+
    };
}

impl_slots! {
    Journal => journals;
    LedgerEntry => ledger_entries;
    BankAccount => bank_accounts;
    BankTransaction => bank_transactions;
    Reconciliation => reconciliations;
    TaxRate => tax_rates;
    Invoice => invoices;
    Sale => sales;
    Reception => receptions;
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F: FnOnce(&mut Inner) -> R>(&self, op: F) -> Result<R> {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(op(&mut inner))
    }

    /// Returns a copy of one collection.
    fn read_all<T: Record>(&self) -> Result<Vec<T>>
    where
        Inner: Slot<T>,
    {
        self.with_lock(|inner| <Inner as Slot<T>>::slot(inner).clone())
    }

    /// Merges items into one collection by key.
    fn upsert_all<T: Record>(&self, items: Vec<T>) -> Result<()>
    where
        Inner: Slot<T>,
    {
        self.with_lock(|inner| upsert_by_key(<Inner as Slot<T>>::slot(inner), items))
    }

    /// Removes items from one collection by key.
    fn remove_all<T: Record>(&self, ids: &[T::Key]) -> Result<()>
    where
        Inner: Slot<T>,
    {
        self.with_lock(|inner| remove_by_key(<Inner as Slot<T>>::slot(inner), ids))
    }

    /// Increments and returns the named counter.
    fn allocate(&self, counter: &str) -> Result<u64> {
        self.with_lock(|inner| {
            let value = inner.sequences.entry(counter.to_owned()).or_insert(0);
            *value = value.saturating_add(1);
            *value
        })
    }

    /// Drops every record and counter.
    fn clear_all(&self) -> Result<()> {
        self.with_lock(|inner| {
            *inner = Inner::default();
            tracing::debug!(collections = COLLECTIONS.len(), "in-memory storage cleared");
        })
    }
}

/// Wraps a mutex poison error.
fn lock_error<T>(err: &std::sync::PoisonError<T>) -> LedgerError {
    LedgerError::Storage(err.to_string().into())
}

#[cfg(feature = "blocking")]
forward_storage!(blocking: InMemoryStorage);

#[cfg(feature = "async")]
forward_storage!(async_ready: InMemoryStorage);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BankAccountId, BankTransactionId, Direction, JournalId, JournalKind, NaiveDate,
        ReconciliationStatus,
    };

    // ── Test helpers ───────────────────────────────────────────────────

    fn test_journal(id: &str) -> Journal {
        Journal {
            id: JournalId::from(id),
            code: "BQ1".to_owned(),
            label: format!("Journal {id}"),
            prefix: "BQ".to_owned(),
            kind: JournalKind::Bank,
        }
    }

    fn test_transaction(id: &str, amount: f64) -> BankTransaction {
        BankTransaction {
            id: BankTransactionId::from(id),
            account_id: BankAccountId::from("ba-1"),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            label: "Virement client".to_owned(),
            amount,
            direction: Direction::Credit,
            reconciliation_status: ReconciliationStatus::Unreconciled,
            category: None,
            additional_centime_amount: None,
            reference: None,
            entry_id: None,
        }
    }

    #[cfg(feature = "blocking")]
    mod blocking {
        use super::*;
        use crate::storage::BlockingStorage;

        #[test]
        fn empty_storage_has_no_records() {
            let storage = InMemoryStorage::new();
            assert!(storage.journals().unwrap().is_empty());
            assert!(storage.ledger_entries().unwrap().is_empty());
            assert!(storage.invoices().unwrap().is_empty());
        }

        #[test]
        fn upsert_replaces_existing_by_id() {
            let storage = InMemoryStorage::new();
            storage
                .upsert_bank_transactions(vec![
                    test_transaction("tx-1", 100.0),
                    test_transaction("tx-2", 200.0),
                ])
                .unwrap();
            storage
                .upsert_bank_transactions(vec![test_transaction("tx-1", 150.0)])
                .unwrap();

            let stored = storage.bank_transactions().unwrap();
            assert_eq!(stored.len(), 2);
            let amounts: Vec<f64> = stored.iter().map(|tx| tx.amount).collect();
            assert_eq!(amounts, [150.0, 200.0]);
        }

        #[test]
        fn remove_deletes_matching_ids() {
            let storage = InMemoryStorage::new();
            storage
                .upsert_journals(vec![test_journal("j-1"), test_journal("j-2")])
                .unwrap();
            storage.remove_journals(&[JournalId::from("j-1")]).unwrap();
            let remaining = storage.journals().unwrap();
            assert_eq!(remaining.len(), 1);
            assert_eq!(remaining.first().unwrap().id, JournalId::from("j-2"));
        }

        #[test]
        fn sequences_are_per_counter() {
            let storage = InMemoryStorage::new();
            assert_eq!(storage.next_sequence("journal:j-1").unwrap(), 1);
            assert_eq!(storage.next_sequence("journal:j-1").unwrap(), 2);
            assert_eq!(storage.next_sequence("invoice:client").unwrap(), 1);
            assert_eq!(storage.next_sequence("journal:j-1").unwrap(), 3);
        }

        #[test]
        fn clear_resets_records_and_counters() {
            let storage = InMemoryStorage::new();
            storage.upsert_journals(vec![test_journal("j-1")]).unwrap();
            let _first = storage.next_sequence("journal:j-1").unwrap();
            storage.clear().unwrap();
            assert!(storage.journals().unwrap().is_empty());
            assert_eq!(storage.next_sequence("journal:j-1").unwrap(), 1);
        }

        #[test]
        fn concurrent_sequences_never_repeat() {
            use std::collections::HashSet;
            use std::sync::Arc;
            use std::thread;

            let shared = Arc::new(InMemoryStorage::new());
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let storage = Arc::clone(&shared);
                    thread::spawn(move || {
                        (0..25)
                            .map(|_| storage.next_sequence("journal:j-1").unwrap())
                            .collect::<Vec<u64>>()
                    })
                })
                .collect();

            let mut seen = HashSet::new();
            for handle in handles {
                for value in handle.join().unwrap() {
                    assert!(seen.insert(value), "duplicate sequence {value}");
                }
            }
            assert_eq!(seen.len(), 200);
        }
    }

    #[cfg(feature = "async")]
    mod async_tests {
        use super::*;
        use crate::storage::Storage;

        #[tokio::test]
        async fn async_upsert_and_read() {
            let storage = InMemoryStorage::new();
            storage
                .upsert_bank_transactions(vec![test_transaction("tx-1", 100.0)])
                .await
                .unwrap();
            let stored = storage.bank_transactions().await.unwrap();
            assert_eq!(stored.len(), 1);
            assert_eq!(storage.next_sequence("c").await.unwrap(), 1);
        }
    }
}

//! High-level bookkeeping facade over a storage backend.
//!
//! Combines a [`Storage`] / [`BlockingStorage`] backend with the pure
//! balancing, tax, reconciliation and invoicing rules. Every
//! user-triggered mutation is reported to the configured
//! [`Notifier`](crate::notice::Notifier) and logged on the
//! `pharma_ledger::audit` tracing target.
//!
//! [`Storage`]: crate::storage::Storage
//! [`BlockingStorage`]: crate::storage::BlockingStorage

use crate::error::{LedgerError, Result};
use crate::models::{
    BankAccountId, BankTransaction, Direction, EntryDraft, EntryStatus, InvoiceId, Journal,
    JournalId, LedgerEntry, NaiveDate, Period, ReconciliationStatus,
};
use crate::storage::Record;

/// Tracing target of audit events.
const AUDIT_TARGET: &str = "pharma_ledger::audit";

/// Operator recorded when none is configured.
const DEFAULT_OPERATOR: &str = "system";

/// Composable filter for querying ledger entries.
///
/// All set criteria must match.
///
/// # Examples
///
/// ```
/// use pharma_ledger::books::EntryFilter;
/// use pharma_ledger::models::{EntryStatus, JournalId};
///
/// let filter = EntryFilter::new()
///     .journal(JournalId::from("j-vt"))
///     .status(EntryStatus::Validated);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EntryFilter {
    /// Journal the entry belongs to.
    pub journal: Option<JournalId>,
    /// Lifecycle status.
    pub status: Option<EntryStatus>,
    /// Start date (inclusive).
    pub date_from: Option<NaiveDate>,
    /// End date (inclusive).
    pub date_to: Option<NaiveDate>,
}

impl EntryFilter {
    /// Creates an empty filter that matches every entry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to entries of the given journal.
    #[inline]
    #[must_use]
    pub fn journal(mut self, id: JournalId) -> Self {
        self.journal = Some(id);
        self
    }

    /// Restricts to entries in the given status.
    #[inline]
    #[must_use]
    pub const fn status(mut self, status: EntryStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to entries dated within `period`.
    #[inline]
    #[must_use]
    pub const fn period(mut self, period: Period) -> Self {
        self.date_from = Some(period.start);
        self.date_to = Some(period.end);
        self
    }

    /// Returns `true` if the entry satisfies all set criteria.
    pub(crate) fn matches(&self, entry: &LedgerEntry) -> bool {
        self.journal.as_ref().is_none_or(|id| entry.journal_id == *id)
            && self.status.is_none_or(|status| entry.status == status)
            && self.date_from.is_none_or(|from| entry.date >= from)
            && self.date_to.is_none_or(|to| entry.date <= to)
    }
}

/// Composable filter for querying bank transactions.
///
/// All set criteria must match.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Bank account.
    pub account: Option<BankAccountId>,
    /// Reconciliation status.
    pub status: Option<ReconciliationStatus>,
    /// Money in or out.
    pub direction: Option<Direction>,
    /// Start date (inclusive).
    pub date_from: Option<NaiveDate>,
    /// End date (inclusive).
    pub date_to: Option<NaiveDate>,
}

impl TransactionFilter {
    /// Creates an empty filter that matches every transaction.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to transactions of the given bank account.
    #[inline]
    #[must_use]
    pub fn account(mut self, id: BankAccountId) -> Self {
        self.account = Some(id);
        self
    }

    /// Restricts to transactions in the given status.
    #[inline]
    #[must_use]
    pub const fn status(mut self, status: ReconciliationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to money in or money out.
    #[inline]
    #[must_use]
    pub const fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Restricts to transactions dated within `period`.
    #[inline]
    #[must_use]
    pub const fn period(mut self, period: Period) -> Self {
        self.date_from = Some(period.start);
        self.date_to = Some(period.end);
        self
    }

    /// Returns `true` if the transaction satisfies all set criteria.
    pub(crate) fn matches(&self, transaction: &BankTransaction) -> bool {
        self.account
            .as_ref()
            .is_none_or(|id| transaction.account_id == *id)
            && self
                .status
                .is_none_or(|status| transaction.reconciliation_status == status)
            && self
                .direction
                .is_none_or(|direction| transaction.direction == direction)
            && self.date_from.is_none_or(|from| transaction.date >= from)
            && self.date_to.is_none_or(|to| transaction.date <= to)
    }
}

// ── Free-standing helpers ───────────────────────────────────────────────

/// Takes the record with `id` out of `items`.
fn find_record<T: Record>(items: Vec<T>, id: &T::Key, entity: &'static str) -> Result<T> {
    items
        .into_iter()
        .find(|item| item.key() == *id)
        .ok_or_else(|| LedgerError::not_found(entity, id))
}

/// Error for an entry lifecycle step its status does not allow.
fn entry_transition(entry: &LedgerEntry, action: &'static str) -> LedgerError {
    LedgerError::InvalidTransition {
        entity: "entry",
        id: entry.piece_number.clone(),
        state: entry.status.to_string(),
        action,
    }
}

/// Fails if the entry is locked.
fn ensure_unlocked(entry: &LedgerEntry) -> Result<()> {
    if entry.is_locked() {
        Err(LedgerError::EntryLocked(entry.piece_number.clone()))
    } else {
        Ok(())
    }
}

/// Fails if a sale or reception is already billed.
fn ensure_unbilled(entity: &str, number: &str, invoice_id: Option<&InvoiceId>) -> Result<()> {
    invoice_id.map_or(Ok(()), |invoice| {
        Err(LedgerError::InvalidSelection(format!(
            "{entity} {number} is already billed on invoice '{invoice}'"
        )))
    })
}

/// Builds a draft entry numbered from `counter`.
fn numbered_entry(
    journal: &Journal,
    draft: EntryDraft,
    counter: u64,
    total_amount: f64,
    operator: &str,
) -> LedgerEntry {
    LedgerEntry {
        id: crate::models::EntryId::generate(),
        journal_id: draft.journal_id,
        piece_number: journal.piece_number(counter),
        date: draft.date,
        label: draft.label,
        reference: draft.reference,
        total_amount,
        status: EntryStatus::Draft,
        lines: draft.lines,
        created_by: operator.to_owned(),
        validated_by: None,
        validation_date: None,
    }
}

/// Today's date in local time.
fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Logs the outcome of undoing the first half of a failed two-step write.
fn log_cleanup(entity: &'static str, number: &str, result: Result<()>) {
    result.map_or_else(
        |err| tracing::error!(entity, number, error = %err, "rollback failed, record left behind"),
        |()| tracing::debug!(entity, number, "partial write rolled back"),
    );
}

/// Generates a bookkeeping facade (async or blocking) with builder and
/// methods.
macro_rules! define_books {
    (
        books_name: $books:ident,
        builder_name: $builder:ident,
        storage_trait: $storage_trait:ident,
        books_doc: $books_doc:expr,
        builder_doc: $builder_doc:expr,
        $(async_kw: $async_kw:tt,)?
        $(await_kw: $await_ext:tt,)?
    ) => {
        #[doc = $builder_doc]
        #[derive(Debug)]
        pub struct $builder<S: $storage_trait> {
            /// Storage backend.
            storage: Option<S>,
            /// Name recorded on created and validated entries.
            operator: Option<String>,
            /// Which rate taxes a transaction.
            rate_policy: RatePolicy,
            /// Account receiving the centime additionnel.
            centime_account: Option<String>,
            /// Receiver of operation notices.
            notifier: Option<Arc<dyn Notifier>>,
        }

        impl<S: $storage_trait> $builder<S> {
            /// Sets the storage backend.
            #[inline]
            #[must_use]
            pub fn storage(mut self, storage: S) -> Self {
                self.storage = Some(storage);
                self
            }

            /// Sets the operator recorded on entries (default `system`).
            #[inline]
            #[must_use]
            pub fn operator<T: Into<String>>(mut self, operator: T) -> Self {
                self.operator = Some(operator.into());
                self
            }

            /// Sets the rate policy (default [`RatePolicy::Live`]).
            #[inline]
            #[must_use]
            pub const fn rate_policy(mut self, policy: RatePolicy) -> Self {
                self.rate_policy = policy;
                self
            }

            /// Overrides the centime additionnel account (default `4478`).
            #[inline]
            #[must_use]
            pub fn centime_account<T: Into<String>>(mut self, account: T) -> Self {
                self.centime_account = Some(account.into());
                self
            }

            /// Sets the notice receiver (default [`TracingNotifier`]).
            #[inline]
            #[must_use]
            pub fn notifier<N: Notifier + 'static>(mut self, notifier: N) -> Self {
                self.notifier = Some(Arc::new(notifier));
                self
            }

            /// Builds the facade.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::Storage`] if no storage was provided.
            #[inline]
            pub fn build(self) -> Result<$books<S>> {
                let storage = self.storage.ok_or_else(|| {
                    LedgerError::Storage("storage backend is required".into())
                })?;
                let operator = self
                    .operator
                    .unwrap_or_else(|| DEFAULT_OPERATOR.to_owned());
                tracing::debug!(operator = %operator, policy = ?self.rate_policy, "building books");

                Ok($books {
                    storage,
                    operator,
                    rate_policy: self.rate_policy,
                    centime_account: self
                        .centime_account
                        .unwrap_or_else(|| DEFAULT_CENTIME_ACCOUNT.to_owned()),
                    notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
                })
            }
        }

        #[doc = $books_doc]
        #[derive(Debug)]
        pub struct $books<S: $storage_trait> {
            /// Storage backend.
            storage: S,
            /// Name recorded on created and validated entries.
            operator: String,
            /// Which rate taxes a transaction.
            rate_policy: RatePolicy,
            /// Account receiving the centime additionnel.
            centime_account: String,
            /// Receiver of operation notices.
            notifier: Arc<dyn Notifier>,
        }

        impl<S: $storage_trait> $books<S> {
            /// Creates a new builder for configuring the facade.
            #[inline]
            #[must_use]
            pub const fn builder() -> $builder<S> {
                $builder {
                    storage: None,
                    operator: None,
                    rate_policy: RatePolicy::Live,
                    centime_account: None,
                    notifier: None,
                }
            }

            /// Returns the underlying storage backend.
            #[inline]
            #[must_use]
            pub const fn storage(&self) -> &S {
                &self.storage
            }

            // ── Journals & configuration ────────────────────────────

            /// Returns all journals.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn journals(&self) -> Result<Vec<Journal>> {
                self.storage.journals() $( .$await_ext )?
            }

            /// Creates or updates journals.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to write.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn save_journals(&self, journals: Vec<Journal>) -> Result<usize> {
                let count = journals.len();
                let result = self.storage.upsert_journals(journals) $( .$await_ext )?;
                self.report("Save journals", result.map(|()| count), |saved| {
                    format!("{saved} journal(s) saved")
                })
            }

            /// Returns all bank accounts.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn bank_accounts(&self) -> Result<Vec<BankAccount>> {
                self.storage.bank_accounts() $( .$await_ext )?
            }

            /// Creates or updates bank accounts.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to write.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn save_bank_accounts(&self, accounts: Vec<BankAccount>) -> Result<usize> {
                let count = accounts.len();
                let result = self.storage.upsert_bank_accounts(accounts) $( .$await_ext )?;
                self.report("Save bank accounts", result.map(|()| count), |saved| {
                    format!("{saved} bank account(s) saved")
                })
            }

            /// Imports bank statement lines.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to write.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn import_bank_transactions(
                &self,
                transactions: Vec<BankTransaction>,
            ) -> Result<usize> {
                let count = transactions.len();
                let result = self.storage.upsert_bank_transactions(transactions) $( .$await_ext )?;
                self.report("Import bank transactions", result.map(|()| count), |saved| {
                    format!("{saved} bank transaction(s) imported")
                })
            }

            /// Imports till sales.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to write.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn import_sales(&self, sales: Vec<Sale>) -> Result<usize> {
                let count = sales.len();
                let result = self.storage.upsert_sales(sales) $( .$await_ext )?;
                self.report("Import sales", result.map(|()| count), |saved| {
                    format!("{saved} sale(s) imported")
                })
            }

            /// Imports supplier receptions.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to write.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn import_receptions(&self, receptions: Vec<Reception>) -> Result<usize> {
                let count = receptions.len();
                let result = self.storage.upsert_receptions(receptions) $( .$await_ext )?;
                self.report("Import receptions", result.map(|()| count), |saved| {
                    format!("{saved} reception(s) imported")
                })
            }

            // ── Ledger entries ──────────────────────────────────────

            /// Returns the entries matching `filter`, by date then piece
            /// number.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn entries(&self, filter: &EntryFilter) -> Result<Vec<LedgerEntry>> {
                let mut entries: Vec<LedgerEntry> = self
                    .storage
                    .ledger_entries()
                    $( .$await_ext )?
                    ?
                    .into_iter()
                    .filter(|entry| filter.matches(entry))
                    .collect();
                entries.sort_by(|left, right| {
                    left.date
                        .cmp(&right.date)
                        .then_with(|| left.piece_number.cmp(&right.piece_number))
                });
                Ok(entries)
            }

            /// Returns one entry.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::NotFound`] if no entry has this ID.
            #[inline]
            pub $($async_kw)? fn entry(&self, id: &EntryId) -> Result<LedgerEntry> {
                let entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                find_record(entries, id, "entry")
            }

            /// Creates a draft entry, numbering it from its journal's
            /// counter once the lines are known to balance.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::TooFewLines`] for fewer than two lines,
            /// [`LedgerError::Unbalanced`] if debits and credits differ,
            /// [`LedgerError::NotFound`] if the journal does not exist, or a
            /// storage error.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn create_entry(&self, draft: EntryDraft) -> Result<LedgerEntry> {
                let result = self.post_entry(draft) $( .$await_ext )?;
                self.report("Create entry", result, |entry| {
                    format!("Entry {} created ({:.2})", entry.piece_number, entry.total_amount)
                })
            }

            /// Replaces the content of an unlocked entry. The piece number
            /// and status are kept.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::EntryLocked`] for locked entries,
            /// [`LedgerError::TooFewLines`] or [`LedgerError::Unbalanced`] if
            /// the new lines cannot be posted,
            /// [`LedgerError::InvalidTransition`] when moving it to another
            /// journal, [`LedgerError::NotFound`] or a storage error.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn update_entry(&self, id: &EntryId, draft: EntryDraft) -> Result<LedgerEntry> {
                let result = self.update_entry_inner(id, draft) $( .$await_ext )?;
                self.report("Update entry", result, |entry| {
                    format!("Entry {} updated", entry.piece_number)
                })
            }

            /// Validates a draft entry.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::InvalidTransition`] unless the entry is
            /// a draft, [`LedgerError::TooFewLines`] or
            /// [`LedgerError::Unbalanced`] if its lines cannot be posted,
            /// [`LedgerError::NotFound`] or a storage error.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn validate_entry(&self, id: &EntryId) -> Result<LedgerEntry> {
                let result = self.validate_entry_inner(id) $( .$await_ext )?;
                self.report("Validate entry", result, |entry| {
                    format!("Entry {} validated", entry.piece_number)
                })
            }

            /// Locks a validated entry, making it immutable.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::InvalidTransition`] unless the entry is
            /// validated, [`LedgerError::NotFound`] or a storage error.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn lock_entry(&self, id: &EntryId) -> Result<LedgerEntry> {
                let result = self.lock_entry_inner(id) $( .$await_ext )?;
                self.report("Lock entry", result, |entry| {
                    format!("Entry {} locked", entry.piece_number)
                })
            }

            /// Deletes an unlocked entry and unlinks the bank transaction
            /// it booked, if any.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::EntryLocked`] for locked entries,
            /// [`LedgerError::NotFound`] or a storage error.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn delete_entry(&self, id: &EntryId) -> Result<LedgerEntry> {
                let result = self.delete_entry_inner(id) $( .$await_ext )?;
                self.report("Delete entry", result, |entry| {
                    format!("Entry {} deleted", entry.piece_number)
                })
            }

            /// Letters lines of `account_code` against each other and
            /// returns the mark given to them.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::NotFound`] for unknown lines,
            /// [`LedgerError::InvalidSelection`] for lines of another account
            /// or already lettered, [`LedgerError::Unbalanced`] when they do
            /// not clear each other, or a storage error.
            #[tracing::instrument(skip_all, fields(account = %account_code))]
            pub $($async_kw)? fn letter_lines(&self, account_code: &str, line_ids: &[LineId]) -> Result<String> {
                let result = self.letter_lines_inner(account_code, line_ids) $( .$await_ext )?;
                self.report("Letter lines", result, |mark| {
                    format!("{} line(s) of {account_code} lettered {mark}", line_ids.len())
                })
            }

            /// Clears a lettrage mark on `account_code` and returns the
            /// number of lines released.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::NotFound`] if no line carries the mark,
            /// or a storage error.
            #[tracing::instrument(skip_all, fields(account = %account_code))]
            pub $($async_kw)? fn unletter(&self, account_code: &str, mark: &str) -> Result<usize> {
                let result = self.unletter_inner(account_code, mark) $( .$await_ext )?;
                self.report("Unletter lines", result, |count| {
                    format!("Mark {mark} cleared on {count} line(s) of {account_code}")
                })
            }

            // ── Bank reconciliation ─────────────────────────────────

            /// Returns the bank transactions matching `filter`, by date.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn bank_transactions(
                &self,
                filter: &TransactionFilter,
            ) -> Result<Vec<BankTransaction>> {
                let mut transactions: Vec<BankTransaction> = self
                    .storage
                    .bank_transactions()
                    $( .$await_ext )?
                    ?
                    .into_iter()
                    .filter(|transaction| filter.matches(transaction))
                    .collect();
                transactions.sort_by_key(|transaction| transaction.date);
                Ok(transactions)
            }

            /// Reconciles one bank transaction, optionally booking it.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::NotFound`] if the transaction (or, when
            /// generating the entry, its account or journal) does not exist,
            /// [`LedgerError::InvalidTransition`] if it is already
            /// reconciled, or a storage error.
            #[tracing::instrument(skip_all, fields(transaction = %id))]
            pub $($async_kw)? fn reconcile(
                &self,
                id: &BankTransactionId,
                options: ReconcileOptions,
            ) -> Result<ReconcileOutcome> {
                let result = self.reconcile_inner(id, options) $( .$await_ext )?;
                self.report("Reconcile", result, |outcome| {
                    format!(
                        "Transaction {} reconciled, rate {:.1}%",
                        outcome.transaction.id, outcome.rate
                    )
                })
            }

            /// Returns a reconciled transaction to `unreconciled` and
            /// deletes the entry generated for it.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::EntryLocked`] if the linked entry is
            /// locked, [`LedgerError::InvalidTransition`] if the transaction
            /// is not reconciled, [`LedgerError::NotFound`] or a storage
            /// error.
            #[tracing::instrument(skip_all, fields(transaction = %id))]
            pub $($async_kw)? fn unreconcile(&self, id: &BankTransactionId) -> Result<BankTransaction> {
                let result = self.unreconcile_inner(id) $( .$await_ext )?;
                self.report("Unreconcile", result, |transaction| {
                    format!("Transaction {} unreconciled", transaction.id)
                })
            }

            /// Reconciles every unreconciled transaction matching `filter`.
            ///
            /// See [`Self::auto_reconcile_with_progress`].
            ///
            /// # Errors
            ///
            /// Returns an error only if the transactions cannot be loaded.
            #[inline]
            pub $($async_kw)? fn auto_reconcile(
                &self,
                filter: &TransactionFilter,
                generate_accounting: bool,
            ) -> Result<BatchReport> {
                self.auto_reconcile_with_progress(filter, generate_accounting, |_, _| {})
                    $( .$await_ext )?
            }

            /// Reconciles every unreconciled transaction matching `filter`,
            /// one after the other, calling `on_progress(done, total)` after
            /// each.
            ///
            /// A failing transaction is logged and recorded in the report;
            /// the batch continues with the next one.
            ///
            /// # Errors
            ///
            /// Returns an error only if the transactions cannot be loaded.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn auto_reconcile_with_progress<F>(
                &self,
                filter: &TransactionFilter,
                generate_accounting: bool,
                mut on_progress: F,
            ) -> Result<BatchReport>
            where
                F: FnMut(usize, usize),
            {
                let candidates: Vec<BankTransactionId> = self
                    .storage
                    .bank_transactions()
                    $( .$await_ext )?
                    ?
                    .into_iter()
                    .filter(|transaction| !transaction.is_reconciled() && filter.matches(transaction))
                    .map(|transaction| transaction.id)
                    .collect();
                let total = candidates.len();
                tracing::info!(total, generate_accounting, "auto-reconcile started");

                let options = ReconcileOptions::default().generate_accounting(generate_accounting);
                let mut report = BatchReport::default();
                for (index, id) in candidates.into_iter().enumerate() {
                    match self.reconcile_inner(&id, options) $( .$await_ext )? {
                        Ok(_outcome) => report.record_success(),
                        Err(err) => {
                            tracing::warn!(transaction = %id, error = %err, "auto-reconcile item failed");
                            report.record_failure(id, &err);
                        }
                    }
                    on_progress(index.saturating_add(1), total);
                }

                tracing::info!(
                    target: AUDIT_TARGET,
                    operator = %self.operator,
                    succeeded = report.success_count,
                    failed = report.error_count,
                    "auto-reconcile finished"
                );
                let description = format!(
                    "{} reconciled, {} failed",
                    report.success_count, report.error_count
                );
                let notice = if report.is_complete() {
                    Notice::success("Auto-reconcile", description)
                } else {
                    Notice::failure("Auto-reconcile", &LedgerError::BatchPartialFailure {
                        succeeded: report.success_count,
                        failed: report.error_count,
                    })
                };
                self.notifier.notify(&notice);
                Ok(report)
            }

            /// Returns the reconciliation counts of one bank account.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn reconciliation_stats(
                &self,
                account_id: &BankAccountId,
            ) -> Result<ReconciliationStats> {
                let transactions = self.storage.bank_transactions() $( .$await_ext )? ?;
                Ok(ReconciliationStats::from_transactions(
                    transactions
                        .iter()
                        .filter(|transaction| transaction.account_id == *account_id),
                ))
            }

            /// Returns the reconciliation rate of one bank account, in
            /// percent.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn reconciliation_rate(&self, account_id: &BankAccountId) -> Result<f64> {
                Ok(self.reconciliation_stats(account_id) $( .$await_ext )? ?.rate)
            }

            /// Returns all statement reconciliations.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn reconciliations(&self) -> Result<Vec<Reconciliation>> {
                self.storage.reconciliations() $( .$await_ext )?
            }

            /// Opens a statement reconciliation for an account and period.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::NotFound`] if the account does not
            /// exist, or a storage error.
            #[tracing::instrument(skip_all, fields(account = %account_id))]
            pub $($async_kw)? fn open_reconciliation(
                &self,
                account_id: &BankAccountId,
                period: Period,
                statement_balance: f64,
            ) -> Result<Reconciliation> {
                let result = self
                    .open_reconciliation_inner(account_id, period, statement_balance)
                    $( .$await_ext )?;
                self.report("Open reconciliation", result, |reconciliation| {
                    format!("Variance {:.2}", reconciliation.variance)
                })
            }

            /// Recomputes the ledger balance and variance of an open
            /// statement reconciliation.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::InvalidTransition`] once validated,
            /// [`LedgerError::NotFound`] or a storage error.
            #[tracing::instrument(skip_all, fields(reconciliation = %id))]
            pub $($async_kw)? fn refresh_reconciliation(&self, id: &ReconciliationId) -> Result<Reconciliation> {
                let result = self.refresh_reconciliation_inner(id) $( .$await_ext )?;
                self.report("Refresh reconciliation", result, |reconciliation| {
                    format!("Variance {:.2}", reconciliation.variance)
                })
            }

            /// Validates a statement reconciliation whose variance is
            /// cleared.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::VarianceNotZero`] while the variance is
            /// not zero, [`LedgerError::InvalidTransition`] if already
            /// validated, [`LedgerError::NotFound`] or a storage error.
            #[tracing::instrument(skip_all, fields(reconciliation = %id))]
            pub $($async_kw)? fn validate_reconciliation(&self, id: &ReconciliationId) -> Result<Reconciliation> {
                let result = self.validate_reconciliation_inner(id) $( .$await_ext )?;
                self.report("Validate reconciliation", result, |reconciliation| {
                    format!("Reconciliation {} validated", reconciliation.id)
                })
            }

            // ── Taxes ───────────────────────────────────────────────

            /// Returns the configured tax rates.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn tax_rates(&self) -> Result<Vec<TaxRate>> {
                self.storage.tax_rates() $( .$await_ext )?
            }

            /// Creates or updates a tax rate.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to write.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn save_tax_rate(&self, rate: TaxRate) -> Result<TaxRate> {
                let result = self
                    .storage
                    .upsert_tax_rates(vec![rate.clone()])
                    $( .$await_ext )?
                    .map(|()| rate);
                self.report("Save tax rate", result, |saved| {
                    format!("{} set to {:.2}%", saved.name, saved.percentage)
                })
            }

            /// Deletes a tax rate.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::NotFound`] if the rate does not exist,
            /// or a storage error.
            #[tracing::instrument(skip_all, fields(rate = %id))]
            pub $($async_kw)? fn delete_tax_rate(&self, id: &TaxRateId) -> Result<TaxRate> {
                let result = self.delete_tax_rate_inner(id) $( .$await_ext )?;
                self.report("Delete tax rate", result, |rate| {
                    format!("{} deleted", rate.name)
                })
            }

            /// Resolves the VAT and centime rates in force.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn tax_settings(&self) -> Result<TaxSettings> {
                let rates = self.storage.tax_rates() $( .$await_ext )? ?;
                Ok(TaxSettings::from_rates(&rates))
            }

            /// Computes the VAT position of `period`: sales collect, supplier
            /// receptions deduct.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[tracing::instrument(skip_all, fields(start = %period.start, end = %period.end))]
            pub $($async_kw)? fn vat_summary(&self, period: Period) -> Result<VatSummary> {
                let settings = self.tax_settings() $( .$await_ext )? ?;
                let sales: Vec<TaxableAmount> = self
                    .storage
                    .sales()
                    $( .$await_ext )?
                    ?
                    .iter()
                    .filter(|sale| period.contains(sale.date))
                    .map(TaxableAmount::from)
                    .collect();
                let purchases: Vec<TaxableAmount> = self
                    .storage
                    .receptions()
                    $( .$await_ext )?
                    ?
                    .iter()
                    .filter(|reception| period.contains(reception.date))
                    .map(TaxableAmount::from)
                    .collect();
                let summary = tax::summarize(&sales, &purchases, &settings, self.rate_policy);
                tracing::debug!(total_due = summary.total_due, "VAT summary computed");
                Ok(summary)
            }

            // ── Invoicing ───────────────────────────────────────────

            /// Returns all invoices.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn invoices(&self) -> Result<Vec<Invoice>> {
                self.storage.invoices() $( .$await_ext )?
            }

            /// Returns the sales not yet billed.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn unbilled_sales(&self) -> Result<Vec<Sale>> {
                let sales = self.storage.sales() $( .$await_ext )? ?;
                Ok(sales.into_iter().filter(Sale::is_unbilled).collect())
            }

            /// Returns the receptions not yet billed.
            ///
            /// # Errors
            ///
            /// Returns an error if the storage backend fails to read.
            #[inline]
            pub $($async_kw)? fn unbilled_receptions(&self) -> Result<Vec<Reception>> {
                let receptions = self.storage.receptions() $( .$await_ext )? ?;
                Ok(receptions.into_iter().filter(Reception::is_unbilled).collect())
            }

            /// Issues an invoice for the selected sales or receptions and
            /// marks them as billed.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::InvalidSelection`] for an empty
            /// selection or already billed sources, [`LedgerError::NotFound`]
            /// for unknown sources, or a storage error.
            #[tracing::instrument(skip_all)]
            pub $($async_kw)? fn create_invoice(
                &self,
                request: &InvoiceRequest,
                selection: &InvoiceSelection,
            ) -> Result<Invoice> {
                let result = self.create_invoice_inner(request, selection) $( .$await_ext )?;
                self.report("Create invoice", result, |invoice| {
                    format!("Invoice {} issued ({:.2} TTC)", invoice.number, invoice.amount_ttc)
                })
            }

            /// Records a payment on an invoice.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::InvalidAmount`],
            /// [`LedgerError::Overpayment`] or
            /// [`LedgerError::InvalidTransition`] as described on
            /// [`Invoice::record_payment`], [`LedgerError::NotFound`] or a
            /// storage error.
            #[tracing::instrument(skip_all, fields(invoice = %id))]
            pub $($async_kw)? fn record_payment(&self, id: &InvoiceId, amount: f64) -> Result<Invoice> {
                let result = self.record_payment_inner(id, amount) $( .$await_ext )?;
                self.report("Record payment", result, |invoice| {
                    format!(
                        "Invoice {} {}, {:.2} remaining",
                        invoice.number, invoice.payment_status, invoice.remaining_amount
                    )
                })
            }

            /// Cancels an unpaid invoice and releases its sources.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::InvalidTransition`] if the invoice is
            /// already cancelled or has received payments,
            /// [`LedgerError::NotFound`] or a storage error.
            #[tracing::instrument(skip_all, fields(invoice = %id))]
            pub $($async_kw)? fn cancel_invoice(&self, id: &InvoiceId) -> Result<Invoice> {
                let result = self.cancel_invoice_inner(id) $( .$await_ext )?;
                self.report("Cancel invoice", result, |invoice| {
                    format!("Invoice {} cancelled", invoice.number)
                })
            }

            // ── Export ──────────────────────────────────────────────

            /// Writes the FEC of `period` and returns the number of rows.
            ///
            /// # Errors
            ///
            /// Returns [`LedgerError::Export`] if writing fails, or a storage
            /// error.
            #[cfg(feature = "fec")]
            #[tracing::instrument(skip_all, fields(start = %period.start, end = %period.end))]
            pub $($async_kw)? fn export_fec<W: std::io::Write>(&self, writer: W, period: Period) -> Result<usize> {
                let result = self.export_fec_inner(writer, period) $( .$await_ext )?;
                self.report("FEC export", result, |rows| format!("{rows} row(s) exported"))
            }

            // ── Private helpers ─────────────────────────────────────

            /// Logs the outcome of a user-triggered operation on the audit
            /// target and forwards it to the notifier.
            fn report<T, F>(&self, operation: &'static str, result: Result<T>, describe: F) -> Result<T>
            where
                F: FnOnce(&T) -> String,
            {
                match result {
                    Ok(value) => {
                        let description = describe(&value);
                        tracing::info!(
                            target: AUDIT_TARGET,
                            operator = %self.operator,
                            operation,
                            "{description}"
                        );
                        self.notifier.notify(&Notice::success(operation, description));
                        Ok(value)
                    }
                    Err(err) => {
                        tracing::warn!(
                            target: AUDIT_TARGET,
                            operator = %self.operator,
                            operation,
                            error = %err,
                            "operation failed"
                        );
                        self.notifier.notify(&Notice::failure(operation, &err));
                        Err(err)
                    }
                }
            }

            /// Checks the lines, consumes the next piece number of the
            /// journal and stores the new draft.
            $($async_kw)? fn post_entry(&self, draft: EntryDraft) -> Result<LedgerEntry> {
                let journals = self.storage.journals() $( .$await_ext )? ?;
                let journal = find_record(journals, &draft.journal_id, "journal")?;
                let totals = balance::ensure_postable(&draft.lines)?;
                let counter = self
                    .storage
                    .next_sequence(&journal.counter_name())
                    $( .$await_ext )?
                    ?;
                let entry = numbered_entry(&journal, draft, counter, totals.total_debit, &self.operator);
                tracing::debug!(piece = %entry.piece_number, "entry numbered");
                self.storage
                    .upsert_ledger_entries(vec![entry.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(entry)
            }

            /// Update logic behind [`Self::update_entry`].
            $($async_kw)? fn update_entry_inner(&self, id: &EntryId, draft: EntryDraft) -> Result<LedgerEntry> {
                let entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                let mut entry = find_record(entries, id, "entry")?;
                ensure_unlocked(&entry)?;
                if draft.journal_id != entry.journal_id {
                    return Err(entry_transition(&entry, "move"));
                }
                let totals = balance::ensure_postable(&draft.lines)?;
                entry.date = draft.date;
                entry.label = draft.label;
                entry.reference = draft.reference;
                entry.lines = draft.lines;
                entry.total_amount = totals.total_debit;
                self.storage
                    .upsert_ledger_entries(vec![entry.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(entry)
            }

            /// Validation logic behind [`Self::validate_entry`].
            $($async_kw)? fn validate_entry_inner(&self, id: &EntryId) -> Result<LedgerEntry> {
                let entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                let mut entry = find_record(entries, id, "entry")?;
                if entry.status != EntryStatus::Draft {
                    return Err(entry_transition(&entry, "validate"));
                }
                let _totals = balance::ensure_postable(&entry.lines)?;
                entry.status = EntryStatus::Validated;
                entry.validated_by = Some(self.operator.clone());
                entry.validation_date = Some(today());
                self.storage
                    .upsert_ledger_entries(vec![entry.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(entry)
            }

            /// Locking logic behind [`Self::lock_entry`].
            $($async_kw)? fn lock_entry_inner(&self, id: &EntryId) -> Result<LedgerEntry> {
                let entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                let mut entry = find_record(entries, id, "entry")?;
                if entry.status != EntryStatus::Validated {
                    return Err(entry_transition(&entry, "lock"));
                }
                entry.status = EntryStatus::Locked;
                self.storage
                    .upsert_ledger_entries(vec![entry.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(entry)
            }

            /// Deletion logic behind [`Self::delete_entry`].
            $($async_kw)? fn delete_entry_inner(&self, id: &EntryId) -> Result<LedgerEntry> {
                let entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                let entry = find_record(entries, id, "entry")?;
                ensure_unlocked(&entry)?;
                self.storage
                    .remove_ledger_entries(core::slice::from_ref(id))
                    $( .$await_ext )?
                    ?;

                let unlinked: Vec<BankTransaction> = self
                    .storage
                    .bank_transactions()
                    $( .$await_ext )?
                    ?
                    .into_iter()
                    .filter(|transaction| transaction.entry_id.as_ref() == Some(id))
                    .map(|mut transaction| {
                        transaction.entry_id = None;
                        transaction
                    })
                    .collect();
                self.storage
                    .upsert_bank_transactions(unlinked)
                    $( .$await_ext )?
                    ?;
                Ok(entry)
            }

            /// Lettrage logic behind [`Self::letter_lines`].
            $($async_kw)? fn letter_lines_inner(&self, account_code: &str, line_ids: &[LineId]) -> Result<String> {
                let mut entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                {
                    let mut selected = Vec::with_capacity(line_ids.len());
                    for line_id in line_ids {
                        let line = entries
                            .iter()
                            .flat_map(|entry| entry.lines.iter())
                            .find(|line| line.id == *line_id)
                            .ok_or_else(|| LedgerError::not_found("entry line", line_id))?;
                        selected.push(line);
                    }
                    let _totals = balance::ensure_letterable(account_code, &selected)?;
                }

                let counter = self
                    .storage
                    .next_sequence(&balance::lettrage_counter(account_code))
                    $( .$await_ext )?
                    ?;
                let mark = balance::lettrage_mark(counter);
                let mut changed = Vec::new();
                for entry in &mut entries {
                    let mut touched = false;
                    for line in &mut entry.lines {
                        if line_ids.contains(&line.id) {
                            line.reconciliation_mark = Some(mark.clone());
                            touched = true;
                        }
                    }
                    if touched {
                        changed.push(entry.clone());
                    }
                }
                self.storage
                    .upsert_ledger_entries(changed)
                    $( .$await_ext )?
                    ?;
                Ok(mark)
            }

            /// Logic behind [`Self::unletter`].
            $($async_kw)? fn unletter_inner(&self, account_code: &str, mark: &str) -> Result<usize> {
                let mut entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                let mut released = 0_usize;
                let mut changed = Vec::new();
                for entry in &mut entries {
                    let mut touched = false;
                    for line in &mut entry.lines {
                        if line.account_code == account_code
                            && line.reconciliation_mark.as_deref() == Some(mark)
                        {
                            line.reconciliation_mark = None;
                            released = released.saturating_add(1);
                            touched = true;
                        }
                    }
                    if touched {
                        changed.push(entry.clone());
                    }
                }
                if released == 0 {
                    return Err(LedgerError::not_found("lettrage mark", mark));
                }
                self.storage
                    .upsert_ledger_entries(changed)
                    $( .$await_ext )?
                    ?;
                Ok(released)
            }

            /// Reconciliation logic behind [`Self::reconcile`], also used by
            /// the batch.
            $($async_kw)? fn reconcile_inner(
                &self,
                id: &BankTransactionId,
                options: ReconcileOptions,
            ) -> Result<ReconcileOutcome> {
                let transactions = self.storage.bank_transactions() $( .$await_ext )? ?;
                let mut transaction = transactions
                    .iter()
                    .find(|candidate| candidate.id == *id)
                    .cloned()
                    .ok_or_else(|| LedgerError::not_found("bank transaction", id))?;
                reconcile::mark_reconciled(&mut transaction, options.category)?;

                let entry = if options.generate_accounting {
                    let accounts = self.storage.bank_accounts() $( .$await_ext )? ?;
                    let account = find_record(accounts, &transaction.account_id, "bank account")?;
                    let category = transaction.category.unwrap_or(TransactionCategory::Other);
                    let draft = EntryDraft {
                        journal_id: account.journal_id.clone(),
                        date: transaction.date,
                        label: transaction.label.clone(),
                        reference: transaction.reference.clone(),
                        lines: reconcile::accounting_lines(
                            &transaction,
                            &account,
                            category,
                            &self.centime_account,
                        ),
                    };
                    let posted = self.post_entry(draft) $( .$await_ext )? ?;
                    transaction.entry_id = Some(posted.id.clone());
                    Some(posted)
                } else {
                    None
                };

                if let Err(err) = self
                    .storage
                    .upsert_bank_transactions(vec![transaction.clone()])
                    $( .$await_ext )?
                {
                    if let Some(posted) = entry.as_ref() {
                        let cleanup = self
                            .storage
                            .remove_ledger_entries(core::slice::from_ref(&posted.id))
                            $( .$await_ext )?;
                        log_cleanup("entry", &posted.piece_number, cleanup);
                    }
                    return Err(err);
                }
                let rate = reconcile::reconciliation_rate(
                    transactions
                        .iter()
                        .filter(|candidate| candidate.account_id == transaction.account_id)
                        .map(|candidate| {
                            if candidate.id == transaction.id {
                                &transaction
                            } else {
                                candidate
                            }
                        }),
                );
                Ok(ReconcileOutcome {
                    transaction,
                    entry,
                    rate,
                })
            }

            /// Logic behind [`Self::unreconcile`].
            $($async_kw)? fn unreconcile_inner(&self, id: &BankTransactionId) -> Result<BankTransaction> {
                let transactions = self.storage.bank_transactions() $( .$await_ext )? ?;
                let mut transaction = find_record(transactions, id, "bank transaction")?;
                if let Some(entry_id) = transaction.entry_id.as_ref() {
                    let entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                    if let Some(entry) = entries.iter().find(|entry| entry.id == *entry_id) {
                        ensure_unlocked(entry)?;
                    }
                }
                if let Some(entry_id) = reconcile::mark_unreconciled(&mut transaction)? {
                    self.storage
                        .remove_ledger_entries(&[entry_id])
                        $( .$await_ext )?
                        ?;
                }
                self.storage
                    .upsert_bank_transactions(vec![transaction.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(transaction)
            }

            /// Loads an account and its ledger balance at the end of
            /// `period`.
            $($async_kw)? fn account_balance(
                &self,
                account_id: &BankAccountId,
                period: Period,
            ) -> Result<(BankAccount, f64)> {
                let accounts = self.storage.bank_accounts() $( .$await_ext )? ?;
                let account = find_record(accounts, account_id, "bank account")?;
                let transactions = self.storage.bank_transactions() $( .$await_ext )? ?;
                let balance = reconcile::ledger_balance(&account, &transactions, period);
                Ok((account, balance))
            }

            /// Logic behind [`Self::open_reconciliation`].
            $($async_kw)? fn open_reconciliation_inner(
                &self,
                account_id: &BankAccountId,
                period: Period,
                statement_balance: f64,
            ) -> Result<Reconciliation> {
                let (account, ledger) = self.account_balance(account_id, period) $( .$await_ext )? ?;
                let reconciliation =
                    reconcile::open_reconciliation(account.id, period, statement_balance, ledger);
                self.storage
                    .upsert_reconciliations(vec![reconciliation.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(reconciliation)
            }

            /// Logic behind [`Self::refresh_reconciliation`].
            $($async_kw)? fn refresh_reconciliation_inner(&self, id: &ReconciliationId) -> Result<Reconciliation> {
                let reconciliations = self.storage.reconciliations() $( .$await_ext )? ?;
                let mut reconciliation = find_record(reconciliations, id, "reconciliation")?;
                let (_account, ledger) = self
                    .account_balance(&reconciliation.account_id, reconciliation.period)
                    $( .$await_ext )?
                    ?;
                reconcile::refresh_reconciliation(&mut reconciliation, ledger)?;
                self.storage
                    .upsert_reconciliations(vec![reconciliation.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(reconciliation)
            }

            /// Logic behind [`Self::validate_reconciliation`].
            $($async_kw)? fn validate_reconciliation_inner(&self, id: &ReconciliationId) -> Result<Reconciliation> {
                let reconciliations = self.storage.reconciliations() $( .$await_ext )? ?;
                let mut reconciliation = find_record(reconciliations, id, "reconciliation")?;
                reconcile::validate_reconciliation(&mut reconciliation)?;
                self.storage
                    .upsert_reconciliations(vec![reconciliation.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(reconciliation)
            }

            /// Logic behind [`Self::delete_tax_rate`].
            $($async_kw)? fn delete_tax_rate_inner(&self, id: &TaxRateId) -> Result<TaxRate> {
                let rates = self.storage.tax_rates() $( .$await_ext )? ?;
                let rate = find_record(rates, id, "tax rate")?;
                self.storage
                    .remove_tax_rates(core::slice::from_ref(id))
                    $( .$await_ext )?
                    ?;
                Ok(rate)
            }

            /// Logic behind [`Self::create_invoice`].
            $($async_kw)? fn create_invoice_inner(
                &self,
                request: &InvoiceRequest,
                selection: &InvoiceSelection,
            ) -> Result<Invoice> {
                if selection.is_empty() {
                    return Err(LedgerError::InvalidSelection(
                        "an invoice needs at least one line".to_owned(),
                    ));
                }

                let mut billed_sales = Vec::new();
                let mut billed_receptions = Vec::new();
                match selection.kind() {
                    InvoiceKind::Client => {
                        let sales = self.storage.sales() $( .$await_ext )? ?;
                        for source in selection.sources() {
                            let sale = sales
                                .iter()
                                .find(|sale| sale.id.as_inner() == source.id)
                                .ok_or_else(|| LedgerError::not_found("sale", &source.id))?;
                            ensure_unbilled("sale", &sale.number, sale.invoice_id.as_ref())?;
                            billed_sales.push(sale.clone());
                        }
                    }
                    InvoiceKind::Supplier => {
                        let receptions = self.storage.receptions() $( .$await_ext )? ?;
                        for source in selection.sources() {
                            let reception = receptions
                                .iter()
                                .find(|reception| reception.id.as_inner() == source.id)
                                .ok_or_else(|| LedgerError::not_found("reception", &source.id))?;
                            ensure_unbilled(
                                "reception",
                                &reception.number,
                                reception.invoice_id.as_ref(),
                            )?;
                            billed_receptions.push(reception.clone());
                        }
                    }
                }

                let counter = self
                    .storage
                    .next_sequence(&invoicing::counter_name(selection.kind()))
                    $( .$await_ext )?
                    ?;
                let number = invoicing::invoice_number(selection.kind(), counter);
                let invoice = selection.to_invoice(number, request);
                self.storage
                    .upsert_invoices(vec![invoice.clone()])
                    $( .$await_ext )?
                    ?;

                let marked = match selection.kind() {
                    InvoiceKind::Client => {
                        for sale in &mut billed_sales {
                            sale.invoice_id = Some(invoice.id.clone());
                        }
                        self.storage.upsert_sales(billed_sales) $( .$await_ext )?
                    }
                    InvoiceKind::Supplier => {
                        for reception in &mut billed_receptions {
                            reception.invoice_id = Some(invoice.id.clone());
                        }
                        self.storage
                            .upsert_receptions(billed_receptions)
                            $( .$await_ext )?
                    }
                };
                if let Err(err) = marked {
                    let cleanup = self
                        .storage
                        .remove_invoices(core::slice::from_ref(&invoice.id))
                        $( .$await_ext )?;
                    log_cleanup("invoice", &invoice.number, cleanup);
                    return Err(err);
                }
                Ok(invoice)
            }

            /// Logic behind [`Self::record_payment`].
            $($async_kw)? fn record_payment_inner(&self, id: &InvoiceId, amount: f64) -> Result<Invoice> {
                let invoices = self.storage.invoices() $( .$await_ext )? ?;
                let mut invoice = find_record(invoices, id, "invoice")?;
                invoice.record_payment(amount)?;
                self.storage
                    .upsert_invoices(vec![invoice.clone()])
                    $( .$await_ext )?
                    ?;
                Ok(invoice)
            }

            /// Logic behind [`Self::cancel_invoice`].
            $($async_kw)? fn cancel_invoice_inner(&self, id: &InvoiceId) -> Result<Invoice> {
                let invoices = self.storage.invoices() $( .$await_ext )? ?;
                let mut invoice = find_record(invoices, id, "invoice")?;
                if invoice.status == InvoiceStatus::Cancelled {
                    return Err(LedgerError::InvalidTransition {
                        entity: "invoice",
                        id: invoice.number,
                        state: invoice.status.to_string(),
                        action: "cancel",
                    });
                }
                if invoice.paid_amount >= BALANCE_EPSILON {
                    return Err(LedgerError::InvalidTransition {
                        entity: "invoice",
                        id: invoice.number,
                        state: invoice.payment_status.to_string(),
                        action: "cancel",
                    });
                }
                invoice.status = InvoiceStatus::Cancelled;
                self.storage
                    .upsert_invoices(vec![invoice.clone()])
                    $( .$await_ext )?
                    ?;

                let released_sales: Vec<Sale> = self
                    .storage
                    .sales()
                    $( .$await_ext )?
                    ?
                    .into_iter()
                    .filter(|sale| sale.invoice_id.as_ref() == Some(id))
                    .map(|mut sale| {
                        sale.invoice_id = None;
                        sale
                    })
                    .collect();
                self.storage.upsert_sales(released_sales) $( .$await_ext )? ?;
                let released_receptions: Vec<Reception> = self
                    .storage
                    .receptions()
                    $( .$await_ext )?
                    ?
                    .into_iter()
                    .filter(|reception| reception.invoice_id.as_ref() == Some(id))
                    .map(|mut reception| {
                        reception.invoice_id = None;
                        reception
                    })
                    .collect();
                self.storage
                    .upsert_receptions(released_receptions)
                    $( .$await_ext )?
                    ?;
                Ok(invoice)
            }

            /// Logic behind [`Self::export_fec`].
            #[cfg(feature = "fec")]
            $($async_kw)? fn export_fec_inner<W: std::io::Write>(&self, writer: W, period: Period) -> Result<usize> {
                let journals = self.storage.journals() $( .$await_ext )? ?;
                let entries = self.storage.ledger_entries() $( .$await_ext )? ?;
                crate::fec::write_fec(writer, &journals, &entries, period)
            }
        }
    };
}

#[cfg(feature = "async")]
mod async_books {
    //! Async bookkeeping facade.

    use alloc::sync::Arc;

    use crate::balance::{self, BALANCE_EPSILON};
    use crate::error::{LedgerError, Result};
    use crate::invoicing::{self, InvoiceRequest, InvoiceSelection};
    use crate::models::{
        BankAccount, BankAccountId, BankTransaction, BankTransactionId, EntryDraft, EntryId,
        EntryStatus, Invoice, InvoiceId, InvoiceKind, InvoiceStatus, Journal, LedgerEntry, LineId,
        Period, Reception, Reconciliation, ReconciliationId, Sale, TaxRate, TaxRateId,
        TransactionCategory,
    };
    use crate::notice::{Notice, Notifier, TracingNotifier};
    use crate::reconcile::{
        self, BatchReport, DEFAULT_CENTIME_ACCOUNT, ReconcileOptions, ReconcileOutcome,
        ReconciliationStats,
    };
    use crate::storage::Storage;
    use crate::tax::{self, RatePolicy, TaxSettings, TaxableAmount, VatSummary};

    use super::{
        AUDIT_TARGET, DEFAULT_OPERATOR, EntryFilter, TransactionFilter, ensure_unbilled,
        ensure_unlocked, entry_transition, find_record, log_cleanup, numbered_entry, today,
    };

    define_books! {
        books_name: Books,
        builder_name: BooksBuilder,
        storage_trait: Storage,
        books_doc: "Async bookkeeping facade over a [`Storage`] backend.\n\nUse [`Books::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`Books`] facade.",
        async_kw: async,
        await_kw: await,
    }
}

#[cfg(feature = "blocking")]
mod blocking_books {
    //! Blocking (synchronous) bookkeeping facade.

    use alloc::sync::Arc;

    use crate::balance::{self, BALANCE_EPSILON};
    use crate::error::{LedgerError, Result};
    use crate::invoicing::{self, InvoiceRequest, InvoiceSelection};
    use crate::models::{
        BankAccount, BankAccountId, BankTransaction, BankTransactionId, EntryDraft, EntryId,
        EntryStatus, Invoice, InvoiceId, InvoiceKind, InvoiceStatus, Journal, LedgerEntry, LineId,
        Period, Reception, Reconciliation, ReconciliationId, Sale, TaxRate, TaxRateId,
        TransactionCategory,
    };
    use crate::notice::{Notice, Notifier, TracingNotifier};
    use crate::reconcile::{
        self, BatchReport, DEFAULT_CENTIME_ACCOUNT, ReconcileOptions, ReconcileOutcome,
        ReconciliationStats,
    };
    use crate::storage::BlockingStorage;
    use crate::tax::{self, RatePolicy, TaxSettings, TaxableAmount, VatSummary};

    use super::{
        AUDIT_TARGET, DEFAULT_OPERATOR, EntryFilter, TransactionFilter, ensure_unbilled,
        ensure_unlocked, entry_transition, find_record, log_cleanup, numbered_entry, today,
    };

    define_books! {
        books_name: BooksBlocking,
        builder_name: BooksBlockingBuilder,
        storage_trait: BlockingStorage,
        books_doc: "Blocking bookkeeping facade over a [`BlockingStorage`] backend.\n\nUse [`BooksBlocking::builder()`] to construct an instance.",
        builder_doc: "Builder for constructing a [`BooksBlocking`] facade.",
    }
}

#[cfg(feature = "async")]
pub use async_books::{Books, BooksBuilder};
#[cfg(feature = "blocking")]
pub use blocking_books::{BooksBlocking, BooksBlockingBuilder};

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::models::{
        BankAccount, EntryLine, InvoiceKind, JournalKind, PaymentStatus, Reception, ReceptionId,
        Sale, SaleId, TaxKind, TaxRate, TaxRateId, TransactionCategory,
    };
    use crate::notice::{Notice, Notifier};

    /// Notifier collecting every notice.
    #[derive(Debug, Clone, Default)]
    struct RecordingNotifier {
        /// Notices received so far.
        notices: Arc<Mutex<Vec<Notice>>>,
    }

    impl RecordingNotifier {
        fn titles(&self) -> Vec<String> {
            self.notices
                .lock()
                .unwrap()
                .iter()
                .map(|notice| notice.title.clone())
                .collect()
        }

        fn failures(&self) -> Vec<Notice> {
            self.notices
                .lock()
                .unwrap()
                .iter()
                .filter(|notice| notice.is_failure())
                .cloned()
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notice: &Notice) {
            self.notices.lock().unwrap().push(notice.clone());
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn march() -> Period {
        Period::new(date(1), date(31))
    }

    fn sales_journal() -> Journal {
        Journal {
            id: JournalId::from("j-vt"),
            code: "VT".to_owned(),
            label: "Ventes".to_owned(),
            prefix: "VT".to_owned(),
            kind: JournalKind::Sales,
        }
    }

    fn bank_journal() -> Journal {
        Journal {
            id: JournalId::from("j-bq"),
            code: "BQ1".to_owned(),
            label: "Banque Atlantique".to_owned(),
            prefix: "BQ".to_owned(),
            kind: JournalKind::Bank,
        }
    }

    fn bank_account() -> BankAccount {
        BankAccount {
            id: BankAccountId::from("ba-1"),
            name: "Banque Atlantique".to_owned(),
            bank_name: "Banque Atlantique Cameroun".to_owned(),
            account_number: "CM21 0001".to_owned(),
            ledger_account: "5211".to_owned(),
            journal_id: JournalId::from("j-bq"),
            opening_balance: 1_000.0,
            currency: "XAF".to_owned(),
        }
    }

    fn transaction(id: &str, account: &str, amount: f64, direction: Direction) -> BankTransaction {
        BankTransaction {
            id: crate::models::BankTransactionId::from(id),
            account_id: BankAccountId::from(account),
            date: date(10),
            label: format!("Opération {id}"),
            amount,
            direction,
            reconciliation_status: ReconciliationStatus::Unreconciled,
            category: Some(TransactionCategory::CustomerReceipt),
            additional_centime_amount: None,
            reference: None,
            entry_id: None,
        }
    }

    fn sales_draft(debit: f64, credit: f64) -> EntryDraft {
        EntryDraft {
            journal_id: JournalId::from("j-vt"),
            date: date(5),
            label: "Ventes comptoir".to_owned(),
            reference: None,
            lines: vec![
                EntryLine::debit("571", "Caisse", "Encaissement", debit),
                EntryLine::credit("701", "Ventes", "Ventes", credit),
            ],
        }
    }

    fn sale(id: &str, amount_ht: f64) -> Sale {
        Sale {
            id: SaleId::from(id),
            number: format!("V-{id}"),
            date: date(12),
            customer: Some("Clinique du Lac".to_owned()),
            amount_ht,
            amount_vat: amount_ht * 0.1925,
            amount_ttc: amount_ht * 1.1925,
            centime_amount: 0.0,
            vat_rate: Some(19.25),
            centime_rate: None,
            invoice_id: None,
        }
    }

    fn reception(id: &str, amount_ht: f64) -> Reception {
        Reception {
            id: ReceptionId::from(id),
            number: format!("R-{id}"),
            date: date(15),
            supplier: "Laborex".to_owned(),
            amount_ht,
            amount_vat: amount_ht * 0.1925,
            vat_rate: Some(19.25),
            centime_rate: None,
            invoice_id: None,
        }
    }

    #[test]
    fn entry_filter_combines_criteria() {
        let entry = LedgerEntry {
            id: crate::models::EntryId::from("e-1"),
            journal_id: JournalId::from("j-vt"),
            piece_number: "VT000001".to_owned(),
            date: date(5),
            label: "Ventes".to_owned(),
            reference: None,
            total_amount: 10.0,
            status: EntryStatus::Validated,
            lines: Vec::new(),
            created_by: "caissier".to_owned(),
            validated_by: None,
            validation_date: None,
        };
        assert!(EntryFilter::new().matches(&entry));
        assert!(
            EntryFilter::new()
                .journal(JournalId::from("j-vt"))
                .status(EntryStatus::Validated)
                .period(march())
                .matches(&entry)
        );
        assert!(!EntryFilter::new().status(EntryStatus::Draft).matches(&entry));
        assert!(
            !EntryFilter::new()
                .period(Period::new(date(6), date(31)))
                .matches(&entry)
        );
    }

    #[test]
    fn transaction_filter_combines_criteria() {
        let tx = transaction("tx-1", "ba-1", 100.0, Direction::Credit);
        assert!(
            TransactionFilter::new()
                .account(BankAccountId::from("ba-1"))
                .status(ReconciliationStatus::Unreconciled)
                .direction(Direction::Credit)
                .period(march())
                .matches(&tx)
        );
        assert!(
            !TransactionFilter::new()
                .direction(Direction::Debit)
                .matches(&tx)
        );
        assert!(
            !TransactionFilter::new()
                .account(BankAccountId::from("ba-2"))
                .matches(&tx)
        );
    }

    #[cfg(feature = "blocking")]
    mod blocking {
        use std::collections::HashMap;

        use super::*;
        use crate::invoicing::{InvoiceRequest, InvoiceSelection};
        use crate::reconcile::ReconcileOptions;
        use crate::storage::{
            BlockingStorage, InMemoryStorage, forward_storage, remove_by_key, upsert_by_key,
        };
        use crate::tax::{RatePolicy, RateSource};

        fn books(notifier: &RecordingNotifier) -> BooksBlocking<InMemoryStorage> {
            let books = BooksBlocking::builder()
                .storage(InMemoryStorage::new())
                .operator("comptable")
                .notifier(notifier.clone())
                .build()
                .unwrap();
            let _saved = books
                .save_journals(vec![sales_journal(), bank_journal()])
                .unwrap();
            let _saved = books.save_bank_accounts(vec![bank_account()]).unwrap();
            books
        }

        #[test]
        fn builder_requires_storage() {
            let result = BooksBlocking::<InMemoryStorage>::builder().build();
            assert!(matches!(result, Err(LedgerError::Storage(_))));
        }

        #[test]
        fn balanced_entry_gets_sequential_piece_numbers() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let first = books.create_entry(sales_draft(15_000.0, 15_000.0)).unwrap();
            let second = books.create_entry(sales_draft(2_500.0, 2_500.0)).unwrap();

            assert_eq!(first.piece_number, "VT000001");
            assert_eq!(second.piece_number, "VT000002");
            assert_eq!(first.status, EntryStatus::Draft);
            assert_eq!(first.created_by, "comptable");
            assert!((first.total_amount - 15_000.0).abs() < f64::EPSILON);
        }

        #[test]
        fn unbalanced_entry_is_rejected_without_consuming_a_number() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let err = books
                .create_entry(sales_draft(15_000.0, 14_000.0))
                .unwrap_err();
            assert!(matches!(err, LedgerError::Unbalanced { .. }));
            assert!(books.entries(&EntryFilter::new()).unwrap().is_empty());

            let entry = books.create_entry(sales_draft(15_000.0, 15_000.0)).unwrap();
            assert_eq!(entry.piece_number, "VT000001");

            let failures = notifier.failures();
            assert_eq!(failures.len(), 1);
            assert!(failures.first().unwrap().description.starts_with("Create entry failed"));
        }

        #[test]
        fn unknown_journal_is_not_found() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let mut draft = sales_draft(100.0, 100.0);
            draft.journal_id = JournalId::from("j-missing");
            let err = books.create_entry(draft).unwrap_err();
            assert!(matches!(err, LedgerError::NotFound { entity: "journal", .. }));
        }

        #[test]
        fn entry_lifecycle_and_locking() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let entry = books.create_entry(sales_draft(500.0, 500.0)).unwrap();

            let validated = books.validate_entry(&entry.id).unwrap();
            assert_eq!(validated.status, EntryStatus::Validated);
            assert_eq!(validated.validated_by.as_deref(), Some("comptable"));
            assert!(validated.validation_date.is_some());
            assert!(matches!(
                books.validate_entry(&entry.id),
                Err(LedgerError::InvalidTransition { action: "validate", .. })
            ));

            let locked = books.lock_entry(&entry.id).unwrap();
            assert!(locked.is_locked());

            assert!(matches!(
                books.update_entry(&entry.id, sales_draft(600.0, 600.0)),
                Err(LedgerError::EntryLocked(_))
            ));
            assert!(matches!(
                books.delete_entry(&entry.id),
                Err(LedgerError::EntryLocked(_))
            ));
            assert!((books.entry(&entry.id).unwrap().total_amount - 500.0).abs() < f64::EPSILON);
        }

        #[test]
        fn update_rebalances_and_keeps_number() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let entry = books.create_entry(sales_draft(500.0, 500.0)).unwrap();

            assert!(matches!(
                books.update_entry(&entry.id, sales_draft(600.0, 500.0)),
                Err(LedgerError::Unbalanced { .. })
            ));
            let updated = books
                .update_entry(&entry.id, sales_draft(600.0, 600.0))
                .unwrap();
            assert_eq!(updated.piece_number, entry.piece_number);
            assert!((updated.total_amount - 600.0).abs() < f64::EPSILON);

            let deleted = books.delete_entry(&entry.id).unwrap();
            assert_eq!(deleted.id, entry.id);
            assert!(matches!(
                books.entry(&entry.id),
                Err(LedgerError::NotFound { .. })
            ));
        }

        #[test]
        fn lettrage_marks_and_clears_lines() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let invoice_entry = books
                .create_entry(EntryDraft {
                    journal_id: JournalId::from("j-vt"),
                    date: date(3),
                    label: "Facture client".to_owned(),
                    reference: None,
                    lines: vec![
                        EntryLine::debit("411", "Clients", "Facture FC000001", 1_192.5),
                        EntryLine::credit("701", "Ventes", "Facture FC000001", 1_192.5),
                    ],
                })
                .unwrap();
            let payment_entry = books
                .create_entry(EntryDraft {
                    journal_id: JournalId::from("j-vt"),
                    date: date(20),
                    label: "Règlement client".to_owned(),
                    reference: None,
                    lines: vec![
                        EntryLine::debit("571", "Caisse", "Règlement", 1_192.5),
                        EntryLine::credit("411", "Clients", "Règlement", 1_192.5),
                    ],
                })
                .unwrap();
            let receivable = invoice_entry.lines.first().unwrap().id.clone();
            let settlement = payment_entry.lines.get(1).unwrap().id.clone();

            let mark = books
                .letter_lines("411", &[receivable.clone(), settlement.clone()])
                .unwrap();
            assert_eq!(mark, "A");
            assert!(matches!(
                books.letter_lines("411", &[receivable, settlement]),
                Err(LedgerError::InvalidSelection(_))
            ));

            let lettered = books.entry(&invoice_entry.id).unwrap();
            assert_eq!(
                lettered.lines.first().unwrap().reconciliation_mark.as_deref(),
                Some("A")
            );

            assert_eq!(books.unletter("411", "A").unwrap(), 2);
            assert!(matches!(
                books.unletter("411", "A"),
                Err(LedgerError::NotFound { .. })
            ));
        }

        #[test]
        fn reconcile_generates_balanced_entry_and_rate() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let mut with_centime = transaction("tx-1", "ba-1", 10_000.0, Direction::Credit);
            with_centime.additional_centime_amount = Some(50.0);
            let _imported = books
                .import_bank_transactions(vec![
                    with_centime,
                    transaction("tx-2", "ba-1", 2_000.0, Direction::Debit),
                ])
                .unwrap();

            let outcome = books
                .reconcile(
                    &crate::models::BankTransactionId::from("tx-1"),
                    ReconcileOptions::default().generate_accounting(true),
                )
                .unwrap();

            assert!(outcome.transaction.is_reconciled());
            assert!((outcome.rate - 50.0).abs() < f64::EPSILON);
            let entry = outcome.entry.unwrap();
            assert_eq!(entry.piece_number, "BQ000001");
            assert_eq!(entry.lines.len(), 3);
            assert!(crate::balance::balance(&entry.lines).is_balanced);
            assert_eq!(outcome.transaction.entry_id, Some(entry.id.clone()));
            assert!(
                entry
                    .lines
                    .iter()
                    .any(|line| line.account_code == "4478" && (line.credit - 50.0).abs() < 0.01)
            );

            assert!(matches!(
                books.reconcile(
                    &crate::models::BankTransactionId::from("tx-1"),
                    ReconcileOptions::default()
                ),
                Err(LedgerError::InvalidTransition { .. })
            ));
            assert!(matches!(
                books.reconcile(
                    &crate::models::BankTransactionId::from("tx-404"),
                    ReconcileOptions::default()
                ),
                Err(LedgerError::NotFound { .. })
            ));
        }

        #[test]
        fn unreconcile_removes_entry_unless_locked() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let _imported = books
                .import_bank_transactions(vec![
                    transaction("tx-1", "ba-1", 500.0, Direction::Credit),
                    transaction("tx-2", "ba-1", 700.0, Direction::Credit),
                ])
                .unwrap();
            let options = ReconcileOptions::default().generate_accounting(true);
            let first = books
                .reconcile(&crate::models::BankTransactionId::from("tx-1"), options)
                .unwrap();
            let second = books
                .reconcile(&crate::models::BankTransactionId::from("tx-2"), options)
                .unwrap();

            let restored = books.unreconcile(&first.transaction.id).unwrap();
            assert!(!restored.is_reconciled());
            assert!(restored.entry_id.is_none());
            assert!(matches!(
                books.entry(&first.entry.unwrap().id),
                Err(LedgerError::NotFound { .. })
            ));

            let locked_entry = second.entry.unwrap();
            let _validated = books.validate_entry(&locked_entry.id).unwrap();
            let _locked = books.lock_entry(&locked_entry.id).unwrap();
            assert!(matches!(
                books.unreconcile(&second.transaction.id),
                Err(LedgerError::EntryLocked(_))
            ));
            let still = books
                .bank_transactions(&TransactionFilter::new())
                .unwrap()
                .into_iter()
                .find(|tx| tx.id == second.transaction.id)
                .unwrap();
            assert!(still.is_reconciled());
        }

        #[test]
        fn rate_is_zero_then_rises_to_hundred() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let account = BankAccountId::from("ba-1");
            assert!(books.reconciliation_rate(&account).unwrap().abs() < f64::EPSILON);
            let _imported = books
                .import_bank_transactions(vec![
                    transaction("tx-1", "ba-1", 100.0, Direction::Credit),
                    transaction("tx-2", "ba-1", 200.0, Direction::Credit),
                    transaction("tx-3", "ba-1", 300.0, Direction::Debit),
                ])
                .unwrap();
            assert!(books.reconciliation_rate(&account).unwrap().abs() < f64::EPSILON);

            let mut previous = 0.0;
            for id in ["tx-1", "tx-2", "tx-3"] {
                let outcome = books
                    .reconcile(
                        &crate::models::BankTransactionId::from(id),
                        ReconcileOptions::default(),
                    )
                    .unwrap();
                assert!(outcome.rate >= previous);
                previous = outcome.rate;
            }
            assert!((books.reconciliation_rate(&account).unwrap() - 100.0).abs() < f64::EPSILON);
        }

        #[test]
        fn auto_reconcile_counts_forced_failures() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let _imported = books
                .import_bank_transactions(vec![
                    transaction("tx-1", "ba-1", 100.0, Direction::Credit),
                    transaction("tx-2", "ba-missing", 200.0, Direction::Credit),
                    transaction("tx-3", "ba-1", 300.0, Direction::Debit),
                    transaction("tx-4", "ba-missing", 400.0, Direction::Debit),
                    transaction("tx-5", "ba-1", 500.0, Direction::Credit),
                ])
                .unwrap();

            let mut progress = Vec::new();
            let report = books
                .auto_reconcile_with_progress(&TransactionFilter::new(), true, |done, total| {
                    progress.push((done, total));
                })
                .unwrap();

            assert_eq!(report.total(), 5);
            assert_eq!(report.success_count, 3);
            assert_eq!(report.error_count, 2);
            let failed: Vec<&str> = report
                .failures
                .iter()
                .map(|failure| failure.transaction_id.as_inner())
                .collect();
            assert_eq!(failed, ["tx-2", "tx-4"]);
            assert_eq!(progress.last().copied(), Some((5, 5)));
            assert!(matches!(
                report.clone().into_result(),
                Err(LedgerError::BatchPartialFailure { succeeded: 3, failed: 2 })
            ));

            let entries = books.entries(&EntryFilter::new()).unwrap();
            assert_eq!(entries.len(), 3);
            assert!(notifier.titles().contains(&"Error".to_owned()));

            let rerun = books.auto_reconcile(&TransactionFilter::new(), true).unwrap();
            assert_eq!(rerun.total(), 2);
            assert_eq!(rerun.error_count, 2);
        }

        #[test]
        fn statement_reconciliation_requires_zero_variance() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let _imported = books
                .import_bank_transactions(vec![
                    transaction("tx-1", "ba-1", 500.0, Direction::Credit),
                    transaction("tx-2", "ba-1", 200.0, Direction::Debit),
                ])
                .unwrap();
            let account = BankAccountId::from("ba-1");
            let opened = books.open_reconciliation(&account, march(), 1_300.0).unwrap();
            assert!((opened.ledger_balance - 1_000.0).abs() < f64::EPSILON);
            assert!(matches!(
                books.validate_reconciliation(&opened.id),
                Err(LedgerError::VarianceNotZero { .. })
            ));

            for id in ["tx-1", "tx-2"] {
                let _outcome = books
                    .reconcile(
                        &crate::models::BankTransactionId::from(id),
                        ReconcileOptions::default(),
                    )
                    .unwrap();
            }
            let refreshed = books.refresh_reconciliation(&opened.id).unwrap();
            assert!(refreshed.variance.abs() < 0.01);
            let validated = books.validate_reconciliation(&opened.id).unwrap();
            assert_eq!(
                validated.status,
                crate::models::ReconciliationState::Validated
            );
            assert!(matches!(
                books.refresh_reconciliation(&opened.id),
                Err(LedgerError::InvalidTransition { .. })
            ));
        }

        #[test]
        fn vat_summary_uses_configured_rates() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let _imported = books.import_sales(vec![sale("s-1", 100_000.0)]).unwrap();
            let fallback = books.vat_summary(march()).unwrap();
            assert_eq!(fallback.rate_source, RateSource::Fallback);
            assert!((fallback.vat_collected - 19_250.0).abs() < 0.01);
            assert!(fallback.centime_due.abs() < 0.01);

            let _vat = books
                .save_tax_rate(TaxRate {
                    id: TaxRateId::from("tva"),
                    name: "TVA".to_owned(),
                    percentage: 19.25,
                    kind: TaxKind::Vat,
                })
                .unwrap();
            let _centime = books
                .save_tax_rate(TaxRate {
                    id: TaxRateId::from("cac"),
                    name: "Centimes additionnels".to_owned(),
                    percentage: 5.0,
                    kind: TaxKind::AdditionalCentime,
                })
                .unwrap();
            let summary = books.vat_summary(march()).unwrap();
            assert_eq!(summary.rate_source, RateSource::Configured);
            assert!((summary.vat_due - 19_250.0).abs() < 0.01);
            assert!((summary.centime_due - 962.5).abs() < 0.01);
            assert!((summary.total_due - 20_212.5).abs() < 0.01);

            let removed = books.delete_tax_rate(&TaxRateId::from("cac")).unwrap();
            assert_eq!(removed.name, "Centimes additionnels");
            assert_eq!(
                books.tax_settings().unwrap().centime_source,
                RateSource::Fallback
            );
        }

        #[test]
        fn snapshot_policy_uses_recorded_rates() {
            let storage = InMemoryStorage::new();
            storage
                .upsert_tax_rates(vec![TaxRate {
                    id: TaxRateId::from("tva"),
                    name: "TVA".to_owned(),
                    percentage: 20.0,
                    kind: TaxKind::Vat,
                }])
                .unwrap();
            storage.upsert_sales(vec![sale("s-1", 1_000.0)]).unwrap();

            let snapshot = BooksBlocking::builder()
                .storage(storage)
                .rate_policy(RatePolicy::Snapshot)
                .build()
                .unwrap();
            let summary = snapshot.vat_summary(march()).unwrap();
            assert!((summary.vat_collected - 192.5).abs() < 0.01);
        }

        #[test]
        fn invoice_bills_sources_and_refuses_rebilling() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let _imported = books
                .import_sales(vec![sale("s-1", 1_000.0), sale("s-2", 2_000.0)])
                .unwrap();
            let unbilled = books.unbilled_sales().unwrap();
            let selection = InvoiceSelection::from_sales(&unbilled);
            let request = InvoiceRequest {
                counterparty: "Clinique du Lac".to_owned(),
                date: date(31),
                due_date: None,
            };

            let invoice = books.create_invoice(&request, &selection).unwrap();
            assert_eq!(invoice.number, "FC000001");
            assert_eq!(invoice.kind, InvoiceKind::Client);
            assert_eq!(invoice.lines.len(), 2);
            assert!((invoice.amount_ht - 3_000.0).abs() < 0.01);
            assert!(books.unbilled_sales().unwrap().is_empty());

            assert!(matches!(
                books.create_invoice(&request, &selection),
                Err(LedgerError::InvalidSelection(_))
            ));
            assert!(matches!(
                books.create_invoice(&request, &InvoiceSelection::client()),
                Err(LedgerError::InvalidSelection(_))
            ));
        }

        #[test]
        fn supplier_invoice_payments_and_cancellation() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let _imported = books
                .import_receptions(vec![reception("r-1", 10_000.0)])
                .unwrap();
            let selection =
                InvoiceSelection::from_receptions(&books.unbilled_receptions().unwrap(), 5.0);
            let request = InvoiceRequest {
                counterparty: "Laborex".to_owned(),
                date: date(20),
                due_date: Some(date(31)),
            };
            let invoice = books.create_invoice(&request, &selection).unwrap();
            assert_eq!(invoice.number, "FF000001");
            assert!((invoice.amount_vat - 2_021.25).abs() < 0.01);

            let partial = books.record_payment(&invoice.id, 5_000.0).unwrap();
            assert_eq!(partial.payment_status, PaymentStatus::Partial);
            assert!(matches!(
                books.record_payment(&invoice.id, 1_000_000.0),
                Err(LedgerError::Overpayment { .. })
            ));
            assert!(matches!(
                books.cancel_invoice(&invoice.id),
                Err(LedgerError::InvalidTransition { action: "cancel", .. })
            ));

            let second = books
                .create_invoice(
                    &request,
                    &InvoiceSelection::from_receptions(&[reception("r-2", 500.0)], 5.0),
                )
                .unwrap_err();
            assert!(matches!(second, LedgerError::NotFound { entity: "reception", .. }));

            let _: usize = books
                .import_receptions(vec![reception("r-2", 500.0)])
                .unwrap();
            let unpaid = books
                .create_invoice(
                    &request,
                    &InvoiceSelection::from_receptions(&[reception("r-2", 500.0)], 5.0),
                )
                .unwrap();
            assert_eq!(unpaid.number, "FF000002");
            let cancelled = books.cancel_invoice(&unpaid.id).unwrap();
            assert_eq!(cancelled.status, crate::models::InvoiceStatus::Cancelled);
            let released: Vec<String> = books
                .unbilled_receptions()
                .unwrap()
                .into_iter()
                .map(|item| item.number)
                .collect();
            assert_eq!(released, ["R-r-2"]);
        }

        #[cfg(feature = "fec")]
        #[test]
        fn fec_export_contains_posted_entries_only() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let draft = books.create_entry(sales_draft(100.0, 100.0)).unwrap();
            let posted = books.create_entry(sales_draft(250.0, 250.0)).unwrap();
            let _validated = books.validate_entry(&posted.id).unwrap();

            let mut buffer = Vec::new();
            let rows = books.export_fec(&mut buffer, march()).unwrap();
            assert_eq!(rows, 2);
            let output = String::from_utf8(buffer).unwrap();
            assert!(output.contains(&posted.piece_number));
            assert!(!output.contains(&draft.piece_number));
        }

        #[test]
        fn every_mutation_is_notified() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let entry = books.create_entry(sales_draft(100.0, 100.0)).unwrap();
            let _validated = books.validate_entry(&entry.id).unwrap();
            assert_eq!(
                notifier.titles(),
                [
                    "Save journals",
                    "Save bank accounts",
                    "Create entry",
                    "Validate entry"
                ]
            );
        }

        #[test]
        fn entries_need_two_lines() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let mut empty = sales_draft(0.0, 0.0);
            empty.lines.clear();
            assert!(matches!(
                books.create_entry(empty),
                Err(LedgerError::TooFewLines(0))
            ));
            assert!(books.entries(&EntryFilter::new()).unwrap().is_empty());

            let entry = books.create_entry(sales_draft(300.0, 300.0)).unwrap();
            assert_eq!(entry.piece_number, "VT000001");

            let mut single = sales_draft(0.0, 0.0);
            single.lines.truncate(1);
            assert!(matches!(
                books.update_entry(&entry.id, single),
                Err(LedgerError::TooFewLines(1))
            ));
            assert_eq!(books.entry(&entry.id).unwrap().lines.len(), 2);
        }

        #[test]
        fn lettrage_rejects_a_line_given_twice() {
            let notifier = RecordingNotifier::default();
            let books = books(&notifier);
            let invoice_entry = books
                .create_entry(EntryDraft {
                    journal_id: JournalId::from("j-vt"),
                    date: date(3),
                    label: "Facture client".to_owned(),
                    reference: None,
                    lines: vec![
                        EntryLine::debit("411", "Clients", "Facture", 1_000.0),
                        EntryLine::credit("701", "Ventes", "Facture", 1_000.0),
                    ],
                })
                .unwrap();
            let payment_entry = books
                .create_entry(EntryDraft {
                    journal_id: JournalId::from("j-vt"),
                    date: date(20),
                    label: "Acompte client".to_owned(),
                    reference: None,
                    lines: vec![
                        EntryLine::debit("571", "Caisse", "Acompte", 500.0),
                        EntryLine::credit("411", "Clients", "Acompte", 500.0),
                    ],
                })
                .unwrap();
            let receivable = invoice_entry.lines.first().unwrap().id.clone();
            let deposit = payment_entry.lines.get(1).unwrap().id.clone();

            assert!(matches!(
                books.letter_lines("411", &[receivable, deposit.clone(), deposit]),
                Err(LedgerError::InvalidSelection(_))
            ));
            let untouched = books.entry(&invoice_entry.id).unwrap();
            assert!(untouched.lines.iter().all(|line| line.reconciliation_mark.is_none()));
        }

        /// JSON-backed storage whose upserts fail for one collection.
        #[derive(Debug, Default)]
        struct FlakyStorage {
            /// Collections as JSON arrays.
            collections: Mutex<HashMap<&'static str, serde_json::Value>>,
            /// Named counters.
            sequences: Mutex<HashMap<String, u64>>,
            /// Collection refusing writes.
            broken: Mutex<Option<&'static str>>,
        }

        impl FlakyStorage {
            fn break_upserts(&self, collection: &'static str) {
                *self.broken.lock().unwrap() = Some(collection);
            }

            fn read_all<T: Record>(&self) -> Result<Vec<T>> {
                let collections = self.collections.lock().unwrap();
                let Some(value) = collections.get(T::COLLECTION) else {
                    return Ok(Vec::new());
                };
                Ok(serde_json::from_value(value.clone())?)
            }

            fn write_all<T: Record>(&self, items: &[T]) -> Result<()> {
                let value = serde_json::to_value(items)?;
                let _previous = self.collections.lock().unwrap().insert(T::COLLECTION, value);
                Ok(())
            }

            fn upsert_all<T: Record>(&self, items: Vec<T>) -> Result<()> {
                if *self.broken.lock().unwrap() == Some(T::COLLECTION) {
                    return Err(LedgerError::Storage(
                        format!("{} is read-only", T::COLLECTION).into(),
                    ));
                }
                let mut existing = self.read_all::<T>()?;
                upsert_by_key(&mut existing, items);
                self.write_all(&existing)
            }

            fn remove_all<T: Record>(&self, ids: &[T::Key]) -> Result<()> {
                let mut existing = self.read_all::<T>()?;
                remove_by_key(&mut existing, ids);
                self.write_all(&existing)
            }

            fn allocate(&self, counter: &str) -> Result<u64> {
                let mut sequences = self.sequences.lock().unwrap();
                let value = sequences.entry(counter.to_owned()).or_insert(0);
                *value = value.saturating_add(1);
                Ok(*value)
            }

            fn clear_all(&self) -> Result<()> {
                self.collections.lock().unwrap().clear();
                self.sequences.lock().unwrap().clear();
                Ok(())
            }
        }

        forward_storage!(blocking: FlakyStorage);

        fn flaky_books() -> BooksBlocking<FlakyStorage> {
            let books = BooksBlocking::builder()
                .storage(FlakyStorage::default())
                .build()
                .unwrap();
            let _saved = books
                .save_journals(vec![sales_journal(), bank_journal()])
                .unwrap();
            let _saved = books.save_bank_accounts(vec![bank_account()]).unwrap();
            books
        }

        #[test]
        fn failed_reconcile_leaves_no_generated_entry() {
            let books = flaky_books();
            let _imported = books
                .import_bank_transactions(vec![transaction("tx-1", "ba-1", 4_000.0, Direction::Credit)])
                .unwrap();
            books.storage().break_upserts("bank_transactions");

            let result = books.reconcile(
                &crate::models::BankTransactionId::from("tx-1"),
                ReconcileOptions::default().generate_accounting(true),
            );
            assert!(matches!(result, Err(LedgerError::Storage(_))));
            assert!(books.entries(&EntryFilter::new()).unwrap().is_empty());
            let transactions = books.bank_transactions(&TransactionFilter::new()).unwrap();
            assert!(transactions.iter().all(|tx| !tx.is_reconciled() && tx.entry_id.is_none()));
        }

        #[test]
        fn failed_billing_leaves_no_invoice() {
            let books = flaky_books();
            let _imported = books.import_sales(vec![sale("s-1", 1_000.0)]).unwrap();
            let selection = InvoiceSelection::from_sales(&books.unbilled_sales().unwrap());
            books.storage().break_upserts("sales");

            let request = InvoiceRequest {
                counterparty: "Clinique du Lac".to_owned(),
                date: date(31),
                due_date: None,
            };
            assert!(matches!(
                books.create_invoice(&request, &selection),
                Err(LedgerError::Storage(_))
            ));
            assert!(books.invoices().unwrap().is_empty());
            assert_eq!(books.unbilled_sales().unwrap().len(), 1);
        }
    }

    #[cfg(feature = "async")]
    mod async_tests {
        use super::*;
        use crate::reconcile::ReconcileOptions;
        use crate::storage::InMemoryStorage;

        async fn books() -> Books<InMemoryStorage> {
            let books = Books::builder()
                .storage(InMemoryStorage::new())
                .operator("comptable")
                .build()
                .unwrap();
            let _saved = books
                .save_journals(vec![sales_journal(), bank_journal()])
                .await
                .unwrap();
            let _saved = books.save_bank_accounts(vec![bank_account()]).await.unwrap();
            books
        }

        #[tokio::test]
        async fn create_and_validate_entry() {
            let books = books().await;
            let entry = books
                .create_entry(sales_draft(15_000.0, 15_000.0))
                .await
                .unwrap();
            assert_eq!(entry.piece_number, "VT000001");
            let validated = books.validate_entry(&entry.id).await.unwrap();
            assert_eq!(validated.status, EntryStatus::Validated);
        }

        #[tokio::test]
        async fn auto_reconcile_processes_each_candidate() {
            let books = books().await;
            let _imported = books
                .import_bank_transactions(vec![
                    transaction("tx-1", "ba-1", 100.0, Direction::Credit),
                    transaction("tx-2", "ba-missing", 200.0, Direction::Credit),
                ])
                .await
                .unwrap();
            let report = books
                .auto_reconcile(&TransactionFilter::new(), true)
                .await
                .unwrap();
            assert_eq!(report.success_count, 1);
            assert_eq!(report.error_count, 1);

            let stats = books
                .reconciliation_stats(&BankAccountId::from("ba-1"))
                .await
                .unwrap();
            assert_eq!(stats.reconciled, 1);
            assert!(matches!(
                books
                    .reconcile(
                        &crate::models::BankTransactionId::from("tx-1"),
                        ReconcileOptions::default()
                    )
                    .await,
                Err(LedgerError::InvalidTransition { .. })
            ));
        }
    }
}

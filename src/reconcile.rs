//! Bank reconciliation state machine.
//!
//! A bank transaction moves one way, from `unreconciled` to `reconciled`,
//! optionally generating the accounting entry that books it. Statement
//! reconciliations compare the bank's closing balance with the books for
//! one account and period.

use serde::{Deserialize, Serialize};

use crate::balance::BALANCE_EPSILON;
use crate::error::{LedgerError, Result};
use crate::models::{
    BankAccount, BankAccountId, BankTransaction, BankTransactionId, Direction, EntryId, EntryLine,
    LedgerEntry, Period, Reconciliation, ReconciliationId, ReconciliationState,
    ReconciliationStatus, TransactionCategory,
};

/// Default ledger account receiving the centime additionnel.
pub const DEFAULT_CENTIME_ACCOUNT: &str = "4478";

/// Label of the centime additionnel account.
const CENTIME_ACCOUNT_LABEL: &str = "Centimes additionnels";

/// Options of a single reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOptions {
    /// Category to record; the transaction's own category when `None`.
    pub category: Option<TransactionCategory>,
    /// Whether to generate the accounting entry.
    pub generate_accounting: bool,
}

impl ReconcileOptions {
    /// Sets the category to record.
    #[inline]
    #[must_use]
    pub const fn category(mut self, category: TransactionCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Enables or disables entry generation.
    #[inline]
    #[must_use]
    pub const fn generate_accounting(mut self, generate: bool) -> Self {
        self.generate_accounting = generate;
        self
    }
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// The transaction after the transition.
    pub transaction: BankTransaction,
    /// Generated accounting entry, if requested.
    pub entry: Option<LedgerEntry>,
    /// Reconciliation rate of the account after the transition.
    pub rate: f64,
}

/// Moves `transaction` to `reconciled`, recording `category` when given.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidTransition`] if the transaction is already
/// reconciled.
#[inline]
pub fn mark_reconciled(
    transaction: &mut BankTransaction,
    category: Option<TransactionCategory>,
) -> Result<()> {
    if transaction.is_reconciled() {
        return Err(transition_error(transaction, "reconcile"));
    }
    transaction.reconciliation_status = ReconciliationStatus::Reconciled;
    if category.is_some() {
        transaction.category = category;
    }
    Ok(())
}

/// Moves `transaction` back to `unreconciled` and unlinks its entry.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidTransition`] if the transaction is not
/// reconciled.
#[inline]
pub fn mark_unreconciled(transaction: &mut BankTransaction) -> Result<Option<EntryId>> {
    if !transaction.is_reconciled() {
        return Err(transition_error(transaction, "unreconcile"));
    }
    transaction.reconciliation_status = ReconciliationStatus::Unreconciled;
    Ok(transaction.entry_id.take())
}

/// Error for a transition the transaction's state does not allow.
fn transition_error(transaction: &BankTransaction, action: &'static str) -> LedgerError {
    LedgerError::InvalidTransition {
        entity: "bank transaction",
        id: transaction.id.to_string(),
        state: transaction.reconciliation_status.to_string(),
        action,
    }
}

/// Converts a count to `f64` for percentages.
fn count_as_f64(count: usize) -> f64 {
    u32::try_from(count).map_or(f64::from(u32::MAX), f64::from)
}

/// Transaction counts of one account.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStats {
    /// Number of transactions.
    pub total: usize,
    /// Number of reconciled transactions.
    pub reconciled: usize,
    /// Number of unreconciled transactions.
    pub unreconciled: usize,
    /// `reconciled / total * 100`, 0 without transactions.
    pub rate: f64,
}

impl ReconciliationStats {
    /// Counts `transactions`.
    #[inline]
    #[must_use]
    pub fn from_transactions<'tx, I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = &'tx BankTransaction>,
    {
        let (total, reconciled) = transactions
            .into_iter()
            .fold((0_usize, 0_usize), |(total, reconciled), transaction| {
                (total + 1, reconciled + usize::from(transaction.is_reconciled()))
            });
        let rate = if total == 0 {
            0.0
        } else {
            count_as_f64(reconciled) / count_as_f64(total) * 100.0
        };
        Self {
            total,
            reconciled,
            unreconciled: total - reconciled,
            rate,
        }
    }
}

/// Share of reconciled transactions in percent, 0 without transactions.
#[inline]
#[must_use]
pub fn reconciliation_rate<'tx, I>(transactions: I) -> f64
where
    I: IntoIterator<Item = &'tx BankTransaction>,
{
    ReconciliationStats::from_transactions(transactions).rate
}

/// Builds the lines booking `transaction` on `account`.
///
/// Money in debits the bank account and credits the category's counterpart;
/// money out does the reverse. A centime additionnel included in the amount
/// is booked on `centime_account` and taken out of the counterpart line.
#[inline]
#[must_use]
pub fn accounting_lines(
    transaction: &BankTransaction,
    account: &BankAccount,
    category: TransactionCategory,
    centime_account: &str,
) -> Vec<EntryLine> {
    let centime = transaction
        .additional_centime_amount
        .filter(|amount| *amount >= BALANCE_EPSILON)
        .unwrap_or(0.0);
    let counterpart_amount = transaction.amount - centime;
    let label = transaction.label.as_str();

    let mut lines = Vec::with_capacity(3);
    match transaction.direction {
        Direction::Credit => {
            lines.push(EntryLine::debit(
                account.ledger_account.as_str(),
                account.name.as_str(),
                label,
                transaction.amount,
            ));
            lines.push(EntryLine::credit(
                category.account_code(),
                category.account_label(),
                label,
                counterpart_amount,
            ));
            if centime > 0.0 {
                lines.push(EntryLine::credit(
                    centime_account,
                    CENTIME_ACCOUNT_LABEL,
                    label,
                    centime,
                ));
            }
        }
        Direction::Debit => {
            lines.push(EntryLine::debit(
                category.account_code(),
                category.account_label(),
                label,
                counterpart_amount,
            ));
            if centime > 0.0 {
                lines.push(EntryLine::debit(
                    centime_account,
                    CENTIME_ACCOUNT_LABEL,
                    label,
                    centime,
                ));
            }
            lines.push(EntryLine::credit(
                account.ledger_account.as_str(),
                account.name.as_str(),
                label,
                transaction.amount,
            ));
        }
    }
    lines
}

/// A transaction the batch could not reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    /// The transaction.
    pub transaction_id: BankTransactionId,
    /// Root cause.
    pub error: String,
}

/// Outcome of an auto-reconcile batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Transactions reconciled.
    pub success_count: usize,
    /// Transactions that failed.
    pub error_count: usize,
    /// Details of each failure, in processing order.
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    /// Number of transactions processed.
    #[inline]
    #[must_use]
    pub const fn total(&self) -> usize {
        self.success_count + self.error_count
    }

    /// Returns `true` when nothing failed.
    #[inline]
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.error_count == 0
    }

    /// Counts a success.
    pub(crate) const fn record_success(&mut self) {
        self.success_count += 1;
    }

    /// Counts a failure.
    pub(crate) fn record_failure(&mut self, transaction_id: BankTransactionId, error: &LedgerError) {
        self.error_count += 1;
        self.failures.push(BatchFailure {
            transaction_id,
            error: error.to_string(),
        });
    }

    /// Turns a report with failures into an aggregate error.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::BatchPartialFailure`] when any transaction
    /// failed.
    #[inline]
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(LedgerError::BatchPartialFailure {
                succeeded: self.success_count,
                failed: self.error_count,
            })
        }
    }
}

/// Balance of the books for an account at the end of `period`: opening
/// balance plus every reconciled transaction dated on or before the end.
#[inline]
#[must_use]
pub fn ledger_balance<'tx, I>(account: &BankAccount, transactions: I, period: Period) -> f64
where
    I: IntoIterator<Item = &'tx BankTransaction>,
{
    transactions
        .into_iter()
        .filter(|transaction| {
            transaction.account_id == account.id
                && transaction.is_reconciled()
                && transaction.date <= period.end
        })
        .fold(account.opening_balance, |balance, transaction| {
            balance + transaction.signed_amount()
        })
}

/// Opens a statement reconciliation.
#[inline]
#[must_use]
pub fn open_reconciliation(
    account_id: BankAccountId,
    period: Period,
    statement_balance: f64,
    ledger_balance: f64,
) -> Reconciliation {
    Reconciliation {
        id: ReconciliationId::generate(),
        account_id,
        period,
        statement_balance,
        ledger_balance,
        variance: statement_balance - ledger_balance,
        status: ReconciliationState::InProgress,
    }
}

/// Updates the ledger balance and variance of an open reconciliation.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidTransition`] once the reconciliation is
/// validated.
#[inline]
pub fn refresh_reconciliation(reconciliation: &mut Reconciliation, ledger_balance: f64) -> Result<()> {
    ensure_in_progress(reconciliation, "refresh")?;
    reconciliation.ledger_balance = ledger_balance;
    reconciliation.variance = reconciliation.statement_balance - ledger_balance;
    Ok(())
}

/// Validates a reconciliation whose variance is cleared.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidTransition`] if already validated and
/// [`LedgerError::VarianceNotZero`] while the variance is not zero.
#[inline]
pub fn validate_reconciliation(reconciliation: &mut Reconciliation) -> Result<()> {
    ensure_in_progress(reconciliation, "validate")?;
    if reconciliation.variance.abs() >= BALANCE_EPSILON {
        return Err(LedgerError::VarianceNotZero {
            variance: reconciliation.variance,
        });
    }
    reconciliation.status = ReconciliationState::Validated;
    Ok(())
}

/// Fails unless the reconciliation is still in progress.
fn ensure_in_progress(reconciliation: &Reconciliation, action: &'static str) -> Result<()> {
    if reconciliation.status == ReconciliationState::InProgress {
        Ok(())
    } else {
        Err(LedgerError::InvalidTransition {
            entity: "reconciliation",
            id: reconciliation.id.to_string(),
            state: reconciliation.status.to_string(),
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance;
    use crate::models::{JournalId, NaiveDate};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn account() -> BankAccount {
        BankAccount {
            id: BankAccountId::from("ba-1"),
            name: "Compte courant".to_owned(),
            bank_name: "Afriland First Bank".to_owned(),
            account_number: "01234567890".to_owned(),
            ledger_account: "5211".to_owned(),
            journal_id: JournalId::from("j-bq"),
            opening_balance: 1_000_000.0,
            currency: "XAF".to_owned(),
        }
    }

    fn transaction(id: &str, day: u32, amount: f64, direction: Direction) -> BankTransaction {
        BankTransaction {
            id: BankTransactionId::from(id),
            account_id: BankAccountId::from("ba-1"),
            date: date(day),
            label: format!("Mouvement {id}"),
            amount,
            direction,
            reconciliation_status: ReconciliationStatus::Unreconciled,
            category: None,
            additional_centime_amount: None,
            reference: None,
            entry_id: None,
        }
    }

    #[test]
    fn reconcile_is_one_way() {
        let mut tx = transaction("tx-1", 5, 50_000.0, Direction::Credit);
        mark_reconciled(&mut tx, Some(TransactionCategory::CustomerReceipt)).unwrap();
        assert!(tx.is_reconciled());
        assert_eq!(tx.category, Some(TransactionCategory::CustomerReceipt));

        let err = mark_reconciled(&mut tx, None).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition { action: "reconcile", .. }
        ));
    }

    #[test]
    fn reconcile_keeps_own_category_without_override() {
        let mut tx = transaction("tx-1", 5, 50_000.0, Direction::Debit);
        tx.category = Some(TransactionCategory::BankFees);
        mark_reconciled(&mut tx, None).unwrap();
        assert_eq!(tx.category, Some(TransactionCategory::BankFees));
    }

    #[test]
    fn unreconcile_unlinks_entry() {
        let mut tx = transaction("tx-1", 5, 50_000.0, Direction::Credit);
        assert!(mark_unreconciled(&mut tx).is_err());

        mark_reconciled(&mut tx, None).unwrap();
        tx.entry_id = Some(EntryId::from("e-1"));
        let unlinked = mark_unreconciled(&mut tx).unwrap();
        assert_eq!(unlinked, Some(EntryId::from("e-1")));
        assert!(!tx.is_reconciled());
        assert!(tx.entry_id.is_none());
    }

    #[test]
    fn rate_is_zero_without_transactions() {
        let none: [BankTransaction; 0] = [];
        assert!(reconciliation_rate(&none).abs() < f64::EPSILON);

        let unreconciled = [transaction("tx-1", 1, 10.0, Direction::Credit)];
        assert!(reconciliation_rate(&unreconciled).abs() < f64::EPSILON);
    }

    #[test]
    fn rate_is_monotonic_as_transactions_are_reconciled() {
        let mut transactions: Vec<BankTransaction> = (1..=7)
            .map(|day| transaction(&format!("tx-{day}"), day, 1_000.0, Direction::Credit))
            .collect();
        let mut previous = reconciliation_rate(&transactions);
        for index in 0..transactions.len() {
            if let Some(tx) = transactions.get_mut(index) {
                mark_reconciled(tx, None).unwrap();
            }
            let rate = reconciliation_rate(&transactions);
            assert!(rate >= previous);
            previous = rate;
        }
        assert!((previous - 100.0).abs() < f64::EPSILON);

        let stats = ReconciliationStats::from_transactions(&transactions);
        assert_eq!(stats.total, 7);
        assert_eq!(stats.unreconciled, 0);
    }

    #[test]
    fn money_in_debits_the_bank() {
        let mut tx = transaction("tx-1", 5, 80_000.0, Direction::Credit);
        tx.category = Some(TransactionCategory::CustomerReceipt);
        let lines = accounting_lines(
            &tx,
            &account(),
            TransactionCategory::CustomerReceipt,
            DEFAULT_CENTIME_ACCOUNT,
        );
        assert_eq!(lines.len(), 2);
        let bank = lines.iter().find(|line| line.account_code == "5211").unwrap();
        assert!((bank.debit - 80_000.0).abs() < f64::EPSILON);
        let customer = lines.iter().find(|line| line.account_code == "411").unwrap();
        assert!((customer.credit - 80_000.0).abs() < f64::EPSILON);
        assert!(balance::balance(&lines).is_balanced);
    }

    #[test]
    fn centime_gets_its_own_line() {
        let mut tx = transaction("tx-1", 5, 20_212.5, Direction::Debit);
        tx.additional_centime_amount = Some(962.5);
        let lines = accounting_lines(
            &tx,
            &account(),
            TransactionCategory::TaxPayment,
            DEFAULT_CENTIME_ACCOUNT,
        );
        assert_eq!(lines.len(), 3);
        let centime = lines.iter().find(|line| line.account_code == "4478").unwrap();
        assert!((centime.debit - 962.5).abs() < f64::EPSILON);
        let vat = lines.iter().find(|line| line.account_code == "4441").unwrap();
        assert!((vat.debit - 19_250.0).abs() < f64::EPSILON);
        let bank = lines.iter().find(|line| line.account_code == "5211").unwrap();
        assert!((bank.credit - 20_212.5).abs() < f64::EPSILON);
        assert!(balance::balance(&lines).is_balanced);
    }

    #[test]
    fn batch_report_counts_and_aggregates() {
        let mut report = BatchReport::default();
        report.record_success();
        report.record_success();
        report.record_failure(
            BankTransactionId::from("tx-3"),
            &LedgerError::not_found("bank account", "ba-x"),
        );
        assert_eq!(report.total(), 3);
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);

        let err = report.into_result().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::BatchPartialFailure { succeeded: 2, failed: 1 }
        ));
        assert!(BatchReport::default().into_result().is_ok());
    }

    #[test]
    fn ledger_balance_counts_reconciled_up_to_period_end() {
        let mut inside = transaction("tx-1", 10, 200_000.0, Direction::Credit);
        inside.reconciliation_status = ReconciliationStatus::Reconciled;
        let mut outgoing = transaction("tx-2", 12, 50_000.0, Direction::Debit);
        outgoing.reconciliation_status = ReconciliationStatus::Reconciled;
        let pending = transaction("tx-3", 15, 70_000.0, Direction::Credit);
        let mut after = transaction("tx-4", 31, 10_000.0, Direction::Credit);
        after.reconciliation_status = ReconciliationStatus::Reconciled;
        after.date = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();

        let period = Period::new(date(1), date(31));
        let balance = ledger_balance(&account(), &[inside, outgoing, pending, after], period);
        assert!((balance - 1_150_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reconciliation_validates_only_without_variance() {
        let period = Period::new(date(1), date(31));
        let mut reconciliation =
            open_reconciliation(BankAccountId::from("ba-1"), period, 1_200_000.0, 1_150_000.0);
        assert!((reconciliation.variance - 50_000.0).abs() < f64::EPSILON);
        assert!(matches!(
            validate_reconciliation(&mut reconciliation),
            Err(LedgerError::VarianceNotZero { .. })
        ));

        refresh_reconciliation(&mut reconciliation, 1_200_000.0).unwrap();
        validate_reconciliation(&mut reconciliation).unwrap();
        assert_eq!(reconciliation.status, ReconciliationState::Validated);

        assert!(refresh_reconciliation(&mut reconciliation, 0.0).is_err());
        assert!(validate_reconciliation(&mut reconciliation).is_err());
    }
}

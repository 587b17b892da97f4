//! CLI binary for day-to-day bookkeeping over a local or remote ledger.

use std::fs::File;
use std::io::{self, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, Table};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use pharma_ledger::LedgerError;
use pharma_ledger::books::{BooksBlocking, EntryFilter, TransactionFilter};
use pharma_ledger::invoicing::{InvoiceRequest, InvoiceSelection};
use pharma_ledger::models::{
    BankAccountId, BankTransaction, BankTransactionId, Direction, EntryDraft, EntryId,
    EntryStatus, Invoice, InvoiceKind, Journal, LedgerEntry, NaiveDate, Period, ReceptionId,
    ReconciliationStatus, SaleId, TaxRate, TransactionCategory,
};
use pharma_ledger::reconcile::{BatchReport, ReconcileOptions};
use pharma_ledger::storage::{BlockingStorage, FileStorage};
use pharma_ledger::tax::{RatePolicy, RateSource, VatSummary};

/// Placeholder shown for empty cells.
const EMPTY_CELL: &str = "\u{2014}";

/// Pharmacy ledger CLI: entries, bank reconciliation, VAT and invoicing.
#[derive(Debug, Parser)]
#[command(name = "pharma-ledger", version, about)]
struct Cli {
    /// Override the storage directory (default: XDG data dir).
    #[arg(long, global = true, value_name = "DIR", env = "PHARMA_LEDGER_DATA_DIR")]
    data_dir: Option<PathBuf>,
    /// Name recorded on created and validated entries.
    #[arg(long, global = true, env = "PHARMA_LEDGER_OPERATOR")]
    operator: Option<String>,
    /// Tax recorded transactions at the rate they carry instead of the
    /// configured one.
    #[arg(long, global = true)]
    snapshot_rates: bool,
    /// Remote storage settings (file storage is used when absent).
    #[cfg(feature = "storage-rest")]
    #[command(flatten)]
    rest: RestArgs,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Remote storage connection.
#[cfg(feature = "storage-rest")]
#[derive(Debug, Args)]
struct RestArgs {
    /// Base URL of the REST backend.
    #[arg(long, global = true, env = "PHARMA_LEDGER_REST_URL")]
    rest_url: Option<String>,
    /// API key of the REST backend.
    #[arg(long, global = true, env = "PHARMA_LEDGER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// List journals.
    Journals,
    /// List ledger entries.
    Entries(EntryArgs),
    /// Create, validate, lock or delete an entry.
    #[command(subcommand)]
    Entry(EntryCommand),
    /// List bank transactions.
    Transactions(TransactionArgs),
    /// Reconcile one bank transaction.
    Reconcile {
        /// Transaction ID.
        id: String,
        /// Category to record (e.g. customerReceipt, bankFees).
        #[arg(long, value_parser = parse_category)]
        category: Option<TransactionCategory>,
        /// Book the matching entry in the bank journal.
        #[arg(long)]
        generate: bool,
    },
    /// Return a reconciled transaction to unreconciled.
    Unreconcile {
        /// Transaction ID.
        id: String,
    },
    /// Reconcile every unreconciled transaction.
    AutoReconcile {
        /// Restrict to one bank account.
        #[arg(long)]
        account: Option<String>,
        /// Book an entry for each transaction.
        #[arg(long)]
        generate: bool,
    },
    /// Show the reconciliation rate of a bank account.
    Rate {
        /// Bank account ID.
        account: String,
    },
    /// Show the VAT position of a period.
    Vat(PeriodArgs),
    /// List configured tax rates.
    TaxRates,
    /// Issue an invoice for unbilled sales or receptions.
    Invoice(InvoiceArgs),
    /// List invoices.
    Invoices,
    /// Export the FEC of a period.
    Fec {
        /// Period to export.
        #[command(flatten)]
        period: PeriodArgs,
        /// Output file (default: stdout).
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Import records from a JSON array file.
    Import {
        /// Collection to import into.
        collection: Collection,
        /// JSON file holding an array of records.
        file: PathBuf,
    },
}

/// Entry lifecycle subcommands.
#[derive(Debug, Subcommand)]
enum EntryCommand {
    /// Create a draft entry from a JSON file.
    Create {
        /// JSON file holding the entry draft.
        file: PathBuf,
    },
    /// Validate a draft entry.
    Validate {
        /// Entry ID.
        id: String,
    },
    /// Lock a validated entry.
    Lock {
        /// Entry ID.
        id: String,
    },
    /// Delete an unlocked entry.
    Delete {
        /// Entry ID.
        id: String,
    },
}

/// Importable collections.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Collection {
    /// Journals.
    Journals,
    /// Bank accounts.
    BankAccounts,
    /// Bank statement lines.
    BankTransactions,
    /// Till sales.
    Sales,
    /// Supplier receptions.
    Receptions,
    /// Tax rates.
    TaxRates,
}

/// Inclusive date range.
#[derive(Debug, Args)]
struct PeriodArgs {
    /// Start date (inclusive, YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    from: NaiveDate,
    /// End date (inclusive, YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    to: NaiveDate,
}

/// Arguments for the `entries` subcommand.
#[derive(Debug, Args)]
struct EntryArgs {
    /// Journal code (e.g. VT, BQ1).
    #[arg(long)]
    journal: Option<String>,
    /// Only drafts.
    #[arg(long, conflicts_with = "posted")]
    drafts: bool,
    /// Only validated entries.
    #[arg(long)]
    posted: bool,
    /// Start date (inclusive, YYYY-MM-DD). Requires --to.
    #[arg(long, requires = "to", value_parser = parse_date)]
    from: Option<NaiveDate>,
    /// End date (inclusive, YYYY-MM-DD). Requires --from.
    #[arg(long, requires = "from", value_parser = parse_date)]
    to: Option<NaiveDate>,
}

/// Arguments for the `transactions` subcommand.
#[derive(Debug, Args)]
struct TransactionArgs {
    /// Bank account ID.
    #[arg(long)]
    account: Option<String>,
    /// Only unreconciled transactions.
    #[arg(long)]
    unreconciled: bool,
    /// Start date (inclusive, YYYY-MM-DD). Requires --to.
    #[arg(long, requires = "to", value_parser = parse_date)]
    from: Option<NaiveDate>,
    /// End date (inclusive, YYYY-MM-DD). Requires --from.
    #[arg(long, requires = "from", value_parser = parse_date)]
    to: Option<NaiveDate>,
}

/// Arguments for the `invoice` subcommand.
#[derive(Debug, Args)]
struct InvoiceArgs {
    /// Invoice kind: sales (client) or receptions (supplier).
    #[arg(long, value_enum)]
    kind: InvoiceKindArg,
    /// Customer or supplier name.
    #[arg(long)]
    counterparty: String,
    /// Invoice date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    date: NaiveDate,
    /// Due date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    due: Option<NaiveDate>,
    /// Sale or reception IDs to bill (default: every unbilled one).
    #[arg(long = "source", value_name = "ID")]
    sources: Vec<String>,
}

/// Invoice kind as typed on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum InvoiceKindArg {
    /// Client invoice over till sales.
    Client,
    /// Supplier invoice over receptions.
    Supplier,
}

/// Parses a date string in `YYYY-MM-DD` format for clap.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|err| format!("{err}"))
}

/// Parses a transaction category by its wire spelling.
fn parse_category(s: &str) -> Result<TransactionCategory, String> {
    serde_json::from_value(serde_json::Value::String(s.to_owned()))
        .map_err(|err| format!("unknown category '{s}': {err}"))
}

/// Prints an error line and returns a failure exit code.
fn fail<E: core::fmt::Display>(context: &str, err: E) -> io::Result<ExitCode> {
    writeln!(
        io::stderr().lock(),
        "{} {context}: {err}",
        "error:".red().bold()
    )?;
    Ok(ExitCode::FAILURE)
}

/// Runs the CLI, returning an appropriate exit code.
fn run() -> io::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let _dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    #[cfg(feature = "storage-rest")]
    if let Some(url) = cli.rest.rest_url.clone() {
        let mut builder = pharma_ledger::storage::BlockingRestStorage::builder().base_url(url);
        if let Some(key) = cli.rest.api_key.clone() {
            builder = builder.api_key(key);
        }
        return match builder.build() {
            Ok(storage) => open_books(storage, cli),
            Err(err) => fail("failed to initialize REST storage", err),
        };
    }

    match create_storage(cli.data_dir.clone()) {
        Ok(storage) => open_books(storage, cli),
        Err(err) => fail("failed to initialize storage", err),
    }
}

/// Creates the file storage backend, using `data_dir` if provided or the
/// default XDG data directory otherwise.
fn create_storage(data_dir: Option<PathBuf>) -> pharma_ledger::Result<FileStorage> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => FileStorage::default_dir()?,
    };
    FileStorage::new(dir)
}

/// Builds the facade over `storage` and runs the command.
fn open_books<S: BlockingStorage>(storage: S, cli: Cli) -> io::Result<ExitCode> {
    let policy = if cli.snapshot_rates {
        RatePolicy::Snapshot
    } else {
        RatePolicy::Live
    };
    let mut builder = BooksBlocking::builder().storage(storage).rate_policy(policy);
    if let Some(operator) = cli.operator {
        builder = builder.operator(operator);
    }
    match builder.build() {
        Ok(books) => dispatch(&books, cli.command),
        Err(err) => fail("failed to open the books", err),
    }
}

/// Dispatches to the appropriate subcommand handler.
fn dispatch<S: BlockingStorage>(books: &BooksBlocking<S>, command: Command) -> io::Result<ExitCode> {
    match command {
        Command::Journals => match books.journals() {
            Ok(journals) => print_journals_table(&journals).map(|()| ExitCode::SUCCESS),
            Err(err) => fail("failed to read journals", err),
        },
        Command::Entries(args) => cmd_entries(books, &args),
        Command::Entry(entry) => cmd_entry(books, entry),
        Command::Transactions(args) => cmd_transactions(books, &args),
        Command::Reconcile {
            id,
            category,
            generate,
        } => cmd_reconcile(books, BankTransactionId::from(id), category, generate),
        Command::Unreconcile { id } => match books.unreconcile(&BankTransactionId::from(id)) {
            Ok(transaction) => {
                writeln!(
                    io::stdout().lock(),
                    "{} transaction {} is unreconciled",
                    "ok:".green().bold(),
                    transaction.id
                )?;
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => fail("unreconcile failed", err),
        },
        Command::AutoReconcile { account, generate } => {
            cmd_auto_reconcile(books, account.map(BankAccountId::from), generate)
        }
        Command::Rate { account } => cmd_rate(books, &BankAccountId::from(account)),
        Command::Vat(period) => match books.vat_summary(Period::new(period.from, period.to)) {
            Ok(summary) => print_vat_summary(&summary),
            Err(err) => fail("failed to compute VAT", err),
        },
        Command::TaxRates => match books.tax_rates() {
            Ok(rates) => print_tax_rates_table(&rates).map(|()| ExitCode::SUCCESS),
            Err(err) => fail("failed to read tax rates", err),
        },
        Command::Invoice(args) => cmd_invoice(books, args),
        Command::Invoices => match books.invoices() {
            Ok(invoices) => print_invoices_table(&invoices).map(|()| ExitCode::SUCCESS),
            Err(err) => fail("failed to read invoices", err),
        },
        Command::Fec { period, output } => {
            cmd_fec(books, Period::new(period.from, period.to), output.as_deref())
        }
        Command::Import { collection, file } => cmd_import(books, collection, &file),
    }
}

/// Executes the `entries` subcommand.
fn cmd_entries<S: BlockingStorage>(books: &BooksBlocking<S>, args: &EntryArgs) -> io::Result<ExitCode> {
    let journals = match books.journals() {
        Ok(journals) => journals,
        Err(err) => return fail("failed to read journals", err),
    };
    let mut filter = EntryFilter::new();
    if let Some(code) = args.journal.as_deref() {
        let Some(journal) = journals
            .iter()
            .find(|journal| journal.code.eq_ignore_ascii_case(code))
        else {
            return fail("journal not found", code);
        };
        filter = filter.journal(journal.id.clone());
    }
    if args.drafts {
        filter = filter.status(EntryStatus::Draft);
    } else if args.posted {
        filter = filter.status(EntryStatus::Validated);
    }
    if let Some((from, to)) = args.from.zip(args.to) {
        filter = filter.period(Period::new(from, to));
    }

    match books.entries(&filter) {
        Ok(entries) => print_entries_table(&entries, &journals).map(|()| ExitCode::SUCCESS),
        Err(err) => fail("failed to read entries", err),
    }
}

/// Executes the `entry` subcommands.
fn cmd_entry<S: BlockingStorage>(books: &BooksBlocking<S>, command: EntryCommand) -> io::Result<ExitCode> {
    let (verb, result) = match command {
        EntryCommand::Create { file } => {
            let draft: EntryDraft = match read_json(&file) {
                Ok(draft) => draft,
                Err(err) => return fail("failed to read entry draft", err),
            };
            ("created", books.create_entry(draft))
        }
        EntryCommand::Validate { id } => ("validated", books.validate_entry(&EntryId::from(id))),
        EntryCommand::Lock { id } => ("locked", books.lock_entry(&EntryId::from(id))),
        EntryCommand::Delete { id } => ("deleted", books.delete_entry(&EntryId::from(id))),
    };
    match result {
        Ok(entry) => {
            writeln!(
                io::stdout().lock(),
                "{} entry {} {verb} {}",
                "ok:".green().bold(),
                entry.piece_number.bold(),
                format_args!("({:.2}, {})", entry.total_amount, entry.id).dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => fail("entry operation failed", err),
    }
}

/// Executes the `transactions` subcommand.
fn cmd_transactions<S: BlockingStorage>(
    books: &BooksBlocking<S>,
    args: &TransactionArgs,
) -> io::Result<ExitCode> {
    let mut filter = TransactionFilter::new();
    if let Some(account) = args.account.as_deref() {
        filter = filter.account(BankAccountId::from(account));
    }
    if args.unreconciled {
        filter = filter.status(ReconciliationStatus::Unreconciled);
    }
    if let Some((from, to)) = args.from.zip(args.to) {
        filter = filter.period(Period::new(from, to));
    }
    match books.bank_transactions(&filter) {
        Ok(transactions) => print_transactions_table(&transactions).map(|()| ExitCode::SUCCESS),
        Err(err) => fail("failed to read bank transactions", err),
    }
}

/// Executes the `reconcile` subcommand.
fn cmd_reconcile<S: BlockingStorage>(
    books: &BooksBlocking<S>,
    id: BankTransactionId,
    category: Option<TransactionCategory>,
    generate: bool,
) -> io::Result<ExitCode> {
    let mut options = ReconcileOptions::default().generate_accounting(generate);
    if let Some(chosen) = category {
        options = options.category(chosen);
    }
    match books.reconcile(&id, options) {
        Ok(outcome) => {
            let mut out = io::stdout().lock();
            writeln!(
                out,
                "{} transaction {} reconciled",
                "ok:".green().bold(),
                outcome.transaction.id
            )?;
            if let Some(entry) = outcome.entry.as_ref() {
                writeln!(out, "  {} {}", "Entry:".bold(), entry.piece_number)?;
            }
            writeln!(out, "  {} {:.1}%", "Rate:".bold(), outcome.rate)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => fail("reconcile failed", err),
    }
}

/// Executes the `auto-reconcile` subcommand with a progress bar.
fn cmd_auto_reconcile<S: BlockingStorage>(
    books: &BooksBlocking<S>,
    account: Option<BankAccountId>,
    generate: bool,
) -> io::Result<ExitCode> {
    let mut filter = TransactionFilter::new();
    if let Some(id) = account {
        filter = filter.account(id);
    }

    let bar = make_progress_bar();
    let result = books.auto_reconcile_with_progress(&filter, generate, |done, total| {
        bar.set_length(u64::try_from(total).unwrap_or(u64::MAX));
        bar.set_position(u64::try_from(done).unwrap_or(u64::MAX));
    });
    bar.finish_and_clear();

    match result {
        Ok(report) => {
            print_batch_report(&report)?;
            Ok(if report.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(err) => fail("auto-reconcile failed", err),
    }
}

/// Executes the `rate` subcommand.
fn cmd_rate<S: BlockingStorage>(books: &BooksBlocking<S>, account: &BankAccountId) -> io::Result<ExitCode> {
    match books.reconciliation_stats(account) {
        Ok(stats) => {
            writeln!(
                io::stdout().lock(),
                "{} {:.1}% {}",
                "Reconciliation rate:".green().bold(),
                stats.rate,
                format_args!("({} of {} transactions)", stats.reconciled, stats.total).dimmed()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => fail("failed to compute the rate", err),
    }
}

/// Executes the `invoice` subcommand.
fn cmd_invoice<S: BlockingStorage>(books: &BooksBlocking<S>, args: InvoiceArgs) -> io::Result<ExitCode> {
    let selection = match build_selection(books, args.kind, &args.sources) {
        Ok(selection) => selection,
        Err(err) => return fail("failed to select invoice lines", err),
    };
    let request = InvoiceRequest {
        counterparty: args.counterparty,
        date: args.date,
        due_date: args.due,
    };
    match books.create_invoice(&request, &selection) {
        Ok(invoice) => print_invoices_table(core::slice::from_ref(&invoice)).map(|()| ExitCode::SUCCESS),
        Err(err) => fail("invoice creation failed", err),
    }
}

/// Selects the unbilled sales or receptions to invoice, all of them when
/// `sources` is empty.
fn build_selection<S: BlockingStorage>(
    books: &BooksBlocking<S>,
    kind: InvoiceKindArg,
    sources: &[String],
) -> pharma_ledger::Result<InvoiceSelection> {
    match kind {
        InvoiceKindArg::Client => {
            let sales: Vec<_> = books
                .unbilled_sales()?
                .into_iter()
                .filter(|sale| sources.is_empty() || sources.iter().any(|id| SaleId::from(id.as_str()) == sale.id))
                .collect();
            Ok(InvoiceSelection::from_sales(&sales))
        }
        InvoiceKindArg::Supplier => {
            let centime_rate = books.tax_settings()?.centime_rate;
            let receptions: Vec<_> = books
                .unbilled_receptions()?
                .into_iter()
                .filter(|reception| {
                    sources.is_empty()
                        || sources
                            .iter()
                            .any(|id| ReceptionId::from(id.as_str()) == reception.id)
                })
                .collect();
            Ok(InvoiceSelection::from_receptions(&receptions, centime_rate))
        }
    }
}

/// Executes the `fec` subcommand.
fn cmd_fec<S: BlockingStorage>(
    books: &BooksBlocking<S>,
    period: Period,
    output: Option<&Path>,
) -> io::Result<ExitCode> {
    let result = match output {
        Some(path) => match File::create(path) {
            Ok(file) => books.export_fec(BufWriter::new(file), period),
            Err(err) => return fail("failed to create the output file", err),
        },
        None => books.export_fec(io::stdout().lock(), period),
    };
    match result {
        Ok(rows) => {
            writeln!(
                io::stderr().lock(),
                "{} {rows} FEC row(s) exported",
                "ok:".green().bold()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => fail("FEC export failed", err),
    }
}

/// Executes the `import` subcommand.
fn cmd_import<S: BlockingStorage>(
    books: &BooksBlocking<S>,
    collection: Collection,
    file: &Path,
) -> io::Result<ExitCode> {
    let result = match collection {
        Collection::Journals => read_json(file).and_then(|items| books.save_journals(items)),
        Collection::BankAccounts => read_json(file).and_then(|items| books.save_bank_accounts(items)),
        Collection::BankTransactions => {
            read_json(file).and_then(|items| books.import_bank_transactions(items))
        }
        Collection::Sales => read_json(file).and_then(|items| books.import_sales(items)),
        Collection::Receptions => read_json(file).and_then(|items| books.import_receptions(items)),
        Collection::TaxRates => read_json::<Vec<TaxRate>>(file).and_then(|rates| {
            let count = rates.len();
            for rate in rates {
                let _saved = books.save_tax_rate(rate)?;
            }
            Ok(count)
        }),
    };
    match result {
        Ok(count) => {
            writeln!(
                io::stdout().lock(),
                "{} {count} record(s) imported",
                "ok:".green().bold()
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => fail("import failed", err),
    }
}

/// Reads a JSON document from `path`.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> pharma_ledger::Result<T> {
    let file = File::open(path).map_err(|err| LedgerError::Storage(Box::new(err)))?;
    Ok(serde_json::from_reader(io::BufReader::new(file))?)
}

// ── Output formatting ────────────────────────────────────────────────

/// Prints journals in a table.
fn print_journals_table(journals: &[Journal]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if journals.is_empty() {
        writeln!(out, "{}", "No journals found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Code").fg(Color::Cyan),
        Cell::new("Label").fg(Color::Cyan),
        Cell::new("Kind").fg(Color::Cyan),
        Cell::new("Prefix").fg(Color::Cyan),
    ]);
    for journal in journals {
        _ = table.add_row(vec![
            Cell::new(&journal.code),
            Cell::new(&journal.label),
            Cell::new(journal.kind),
            Cell::new(&journal.prefix),
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Journals".green().bold(),
        format_args!("({})", journals.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints entries in a table.
fn print_entries_table(entries: &[LedgerEntry], journals: &[Journal]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if entries.is_empty() {
        writeln!(out, "{}", "No entries found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Date").fg(Color::Cyan),
        Cell::new("Journal").fg(Color::Cyan),
        Cell::new("Piece").fg(Color::Cyan),
        Cell::new("Label").fg(Color::Cyan),
        Cell::new("Amount").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
    ]);
    for entry in entries {
        let journal = journals
            .iter()
            .find(|journal| journal.id == entry.journal_id)
            .map_or(EMPTY_CELL, |journal| journal.code.as_str());
        let status_color = match entry.status {
            EntryStatus::Draft => Color::Yellow,
            EntryStatus::Validated => Color::Green,
            EntryStatus::Locked => Color::DarkGrey,
        };
        _ = table.add_row(vec![
            Cell::new(entry.date),
            Cell::new(journal),
            Cell::new(&entry.piece_number),
            Cell::new(&entry.label),
            Cell::new(format!("{:.2}", entry.total_amount)),
            Cell::new(entry.status).fg(status_color),
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Entries".green().bold(),
        format_args!("({})", entries.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints bank transactions in a table.
fn print_transactions_table(transactions: &[BankTransaction]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if transactions.is_empty() {
        writeln!(out, "{}", "No transactions found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Date").fg(Color::Cyan),
        Cell::new("ID").fg(Color::Cyan),
        Cell::new("Label").fg(Color::Cyan),
        Cell::new("Out").fg(Color::Cyan),
        Cell::new("In").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
    ]);
    for transaction in transactions {
        let amount = Cell::new(format!("{:.2}", transaction.amount));
        let blank = Cell::new(EMPTY_CELL).fg(Color::DarkGrey);
        let (out_cell, in_cell) = match transaction.direction {
            Direction::Debit => (amount.fg(Color::Red), blank),
            Direction::Credit => (blank, amount.fg(Color::Green)),
        };
        let status = if transaction.is_reconciled() {
            Cell::new(transaction.reconciliation_status).fg(Color::Green)
        } else {
            Cell::new(transaction.reconciliation_status).fg(Color::Yellow)
        };
        _ = table.add_row(vec![
            Cell::new(transaction.date),
            Cell::new(&transaction.id),
            Cell::new(&transaction.label),
            out_cell,
            in_cell,
            status,
        ]);
    }

    writeln!(
        out,
        "{} {}",
        "Bank transactions".green().bold(),
        format_args!("({})", transactions.len()).dimmed()
    )?;
    writeln!(out)?;
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints configured tax rates in a table.
fn print_tax_rates_table(rates: &[TaxRate]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if rates.is_empty() {
        writeln!(
            out,
            "{}",
            "No tax rates configured, default rates apply.".dimmed()
        )?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Name").fg(Color::Cyan),
        Cell::new("Kind").fg(Color::Cyan),
        Cell::new("Rate").fg(Color::Cyan),
    ]);
    for rate in rates {
        _ = table.add_row(vec![
            Cell::new(&rate.name),
            Cell::new(rate.kind),
            Cell::new(format!("{:.2}%", rate.percentage)),
        ]);
    }
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints invoices in a table.
fn print_invoices_table(invoices: &[Invoice]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    if invoices.is_empty() {
        writeln!(out, "{}", "No invoices found.".dimmed())?;
        return Ok(());
    }

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("Number").fg(Color::Cyan),
        Cell::new("Date").fg(Color::Cyan),
        Cell::new("Counterparty").fg(Color::Cyan),
        Cell::new("HT").fg(Color::Cyan),
        Cell::new("TVA").fg(Color::Cyan),
        Cell::new("TTC").fg(Color::Cyan),
        Cell::new("Remaining").fg(Color::Cyan),
        Cell::new("Payment").fg(Color::Cyan),
    ]);
    for invoice in invoices {
        let number = match invoice.kind {
            InvoiceKind::Client => Cell::new(&invoice.number).fg(Color::Green),
            InvoiceKind::Supplier => Cell::new(&invoice.number).fg(Color::Magenta),
        };
        _ = table.add_row(vec![
            number,
            Cell::new(invoice.date),
            Cell::new(&invoice.counterparty),
            Cell::new(format!("{:.2}", invoice.amount_ht)),
            Cell::new(format!("{:.2}", invoice.amount_vat)),
            Cell::new(format!("{:.2}", invoice.amount_ttc)),
            Cell::new(format!("{:.2}", invoice.remaining_amount)),
            Cell::new(invoice.payment_status),
        ]);
    }
    writeln!(out, "{table}")?;
    Ok(())
}

/// Prints a VAT summary.
fn print_vat_summary(summary: &VatSummary) -> io::Result<ExitCode> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", "VAT position".green().bold())?;
    if summary.rate_source == RateSource::Fallback {
        writeln!(
            out,
            "{} default rates used, configure them with `import tax-rates`",
            "warning:".yellow().bold()
        )?;
    }
    writeln!(out)?;

    let mut table = Table::new();
    _ = table.load_preset(UTF8_FULL);
    _ = table.set_header(vec![
        Cell::new("").fg(Color::Cyan),
        Cell::new("Base HT").fg(Color::Cyan),
        Cell::new(format!("TVA {:.2}%", summary.vat_rate)).fg(Color::Cyan),
        Cell::new(format!("Centimes {:.2}%", summary.centime_rate)).fg(Color::Cyan),
    ]);
    _ = table.add_row(vec![
        Cell::new("Collected"),
        Cell::new(format!("{:.2}", summary.sales_ht)),
        Cell::new(format!("{:.2}", summary.vat_collected)),
        Cell::new(format!("{:.2}", summary.centime_collected)),
    ]);
    _ = table.add_row(vec![
        Cell::new("Deductible"),
        Cell::new(format!("{:.2}", summary.purchases_ht)),
        Cell::new(format!("{:.2}", summary.vat_deductible)),
        Cell::new(format!("{:.2}", summary.centime_deductible)),
    ]);
    _ = table.add_row(vec![
        Cell::new("Due").fg(Color::Yellow),
        Cell::new(EMPTY_CELL),
        Cell::new(format!("{:.2}", summary.vat_due)),
        Cell::new(format!("{:.2}", summary.centime_due)),
    ]);
    writeln!(out, "{table}")?;

    if summary.is_credit() {
        writeln!(
            out,
            "{} {:.2}",
            "Credit carried forward:".cyan().bold(),
            summary.credit_carried()
        )?;
    } else {
        writeln!(out, "{} {:.2}", "Total due:".bold(), summary.total_due)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the outcome of an auto-reconcile batch.
fn print_batch_report(report: &BatchReport) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{} {} reconciled, {} failed",
        "Auto-reconcile:".green().bold(),
        report.success_count,
        report.error_count
    )?;
    for failure in &report.failures {
        writeln!(
            out,
            "  {} {} {}",
            "failed:".red(),
            failure.transaction_id,
            failure.error.dimmed()
        )?;
    }
    Ok(())
}

/// Creates a progress bar for batch operations.
fn make_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_message("reconciling");
    bar
}

/// Entry point.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            let _ignored = writeln!(io::stderr(), "fatal I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}

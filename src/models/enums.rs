//! Enumeration types for constrained values.

use serde::{Deserialize, Serialize};

/// Implements `as_str` and `Display` for a unit-only enum, using the
/// same spelling as its serde representation.
macro_rules! impl_as_str {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Returns the wire spelling of this value.
            #[inline]
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl core::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Kind of accounting journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JournalKind {
    /// Sales journal (VT).
    Sales,
    /// Purchases journal (AC).
    Purchases,
    /// Bank journal (BQ).
    Bank,
    /// Cash journal (CA).
    Cash,
    /// Miscellaneous operations (OD).
    General,
}

impl_as_str!(JournalKind {
    Sales => "sales",
    Purchases => "purchases",
    Bank => "bank",
    Cash => "cash",
    General => "general",
});

/// Lifecycle state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryStatus {
    /// Editable, not yet validated.
    #[default]
    Draft,
    /// Balanced and validated by an operator.
    Validated,
    /// Closed for good; immutable.
    Locked,
}

impl_as_str!(EntryStatus {
    Draft => "draft",
    Validated => "validated",
    Locked => "locked",
});

/// Direction of a bank statement movement, seen from the bank statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Money in.
    Credit,
    /// Money out.
    Debit,
}

impl_as_str!(Direction {
    Credit => "credit",
    Debit => "debit",
});

/// Matching state of a bank transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconciliationStatus {
    /// Not yet matched with the books.
    #[default]
    Unreconciled,
    /// Matched with the books.
    Reconciled,
}

impl_as_str!(ReconciliationStatus {
    Unreconciled => "unreconciled",
    Reconciled => "reconciled",
});

/// State of a statement reconciliation for one account and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconciliationState {
    /// Matching still in progress.
    #[default]
    InProgress,
    /// Variance cleared and validated.
    Validated,
}

impl_as_str!(ReconciliationState {
    InProgress => "inProgress",
    Validated => "validated",
});

/// Kind of configured tax rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaxKind {
    /// Value-added tax (TVA).
    Vat,
    /// Centime additionnel, levied on the VAT amount.
    AdditionalCentime,
    /// Any other rate, ignored by the VAT computation.
    Other,
}

impl_as_str!(TaxKind {
    Vat => "vat",
    AdditionalCentime => "additionalCentime",
    Other => "other",
});

/// Side of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvoiceKind {
    /// Issued to a customer, built from sales.
    Client,
    /// Received from a supplier, built from receptions.
    Supplier,
}

impl_as_str!(InvoiceKind {
    Client => "client",
    Supplier => "supplier",
});

/// Kind of record an invoice line is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// A till sale.
    Sale,
    /// A supplier reception.
    Reception,
}

impl_as_str!(SourceKind {
    Sale => "sale",
    Reception => "reception",
});

impl SourceKind {
    /// Invoice side this kind of record is billed on.
    #[inline]
    #[must_use]
    pub const fn invoice_kind(self) -> InvoiceKind {
        match self {
            Self::Sale => InvoiceKind::Client,
            Self::Reception => InvoiceKind::Supplier,
        }
    }
}

/// Lifecycle state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvoiceStatus {
    /// Issued and binding.
    #[default]
    Issued,
    /// Cancelled; its sources are billable again.
    Cancelled,
}

impl_as_str!(InvoiceStatus {
    Issued => "issued",
    Cancelled => "cancelled",
});

/// Settlement state of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentStatus {
    /// Nothing paid yet.
    #[default]
    Unpaid,
    /// Partially paid.
    Partial,
    /// Fully paid.
    Paid,
}

impl_as_str!(PaymentStatus {
    Unpaid => "unpaid",
    Partial => "partial",
    Paid => "paid",
});

/// Business category of a bank transaction.
///
/// Each category maps to the SYSCOHADA account used as counterpart when
/// the transaction is booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionCategory {
    /// Payment received from a customer.
    CustomerReceipt,
    /// Payment made to a supplier.
    SupplierPayment,
    /// Cash sales deposited at the bank.
    CashSales,
    /// Goods purchased directly.
    Purchases,
    /// Bank charges and commissions.
    BankFees,
    /// Salary payments.
    Salaries,
    /// Payment of VAT to the tax administration.
    TaxPayment,
    /// Transfer between own accounts.
    InternalTransfer,
    /// Anything else; booked on the suspense account.
    Other,
}

impl_as_str!(TransactionCategory {
    CustomerReceipt => "customerReceipt",
    SupplierPayment => "supplierPayment",
    CashSales => "cashSales",
    Purchases => "purchases",
    BankFees => "bankFees",
    Salaries => "salaries",
    TaxPayment => "taxPayment",
    InternalTransfer => "internalTransfer",
    Other => "other",
});

impl TransactionCategory {
    /// All categories, in display order.
    pub const ALL: [Self; 9] = [
        Self::CustomerReceipt,
        Self::SupplierPayment,
        Self::CashSales,
        Self::Purchases,
        Self::BankFees,
        Self::Salaries,
        Self::TaxPayment,
        Self::InternalTransfer,
        Self::Other,
    ];

    /// SYSCOHADA counterpart account code.
    #[inline]
    #[must_use]
    pub const fn account_code(self) -> &'static str {
        match self {
            Self::CustomerReceipt => "411",
            Self::SupplierPayment => "401",
            Self::CashSales => "701",
            Self::Purchases => "601",
            Self::BankFees => "631",
            Self::Salaries => "422",
            Self::TaxPayment => "4441",
            Self::InternalTransfer => "585",
            Self::Other => "471",
        }
    }

    /// Label of the counterpart account.
    #[inline]
    #[must_use]
    pub const fn account_label(self) -> &'static str {
        match self {
            Self::CustomerReceipt => "Clients",
            Self::SupplierPayment => "Fournisseurs",
            Self::CashSales => "Ventes de marchandises",
            Self::Purchases => "Achats de marchandises",
            Self::BankFees => "Frais bancaires",
            Self::Salaries => "Personnel, rémunérations dues",
            Self::TaxPayment => "État, TVA due",
            Self::InternalTransfer => "Virements de fonds",
            Self::Other => "Compte d'attente",
        }
    }
}

//! Aggregation of sales and supplier receptions into invoices.
//!
//! An [`InvoiceSelection`] holds one line per source record, keyed by the
//! source so that adding a record twice is a no-op and totals do not
//! depend on the order records were picked in.

use alloc::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::models::{
    Invoice, InvoiceId, InvoiceKind, InvoiceLine, InvoiceSource, InvoiceStatus, PaymentStatus,
    Reception, Sale,
};
use crate::tax;

/// Width of the zero-padded counter in invoice numbers.
const INVOICE_NUMBER_WIDTH: usize = 6;

/// Name of the storage counter numbering invoices of `kind`.
#[inline]
#[must_use]
pub fn counter_name(kind: InvoiceKind) -> String {
    format!("invoice:{kind}")
}

/// Formats an invoice number: `FC` for client, `FF` for supplier invoices.
#[inline]
#[must_use]
pub fn invoice_number(kind: InvoiceKind, counter: u64) -> String {
    let prefix = match kind {
        InvoiceKind::Client => "FC",
        InvoiceKind::Supplier => "FF",
    };
    format!("{prefix}{counter:0width$}", width = INVOICE_NUMBER_WIDTH)
}

/// Invoice line for a till sale; amounts are copied as recorded.
#[inline]
#[must_use]
pub fn sale_line(sale: &Sale) -> InvoiceLine {
    let source = InvoiceSource::sale(&sale.id);
    InvoiceLine {
        id: source.line_id(),
        source: Some(source),
        description: format!("Vente {}", sale.number),
        amount_ht: sale.amount_ht,
        amount_vat: sale.amount_vat,
        amount_ttc: sale.amount_ttc,
    }
}

/// Invoice line for a supplier reception.
///
/// The centime additionnel is folded into the VAT column and the gross
/// amount is rebuilt from it.
#[inline]
#[must_use]
pub fn reception_line(reception: &Reception, centime_rate: f64) -> InvoiceLine {
    let source = InvoiceSource::reception(&reception.id);
    let amount_vat =
        reception.amount_vat + tax::centime_amount(reception.amount_vat, centime_rate);
    InvoiceLine {
        id: source.line_id(),
        source: Some(source),
        description: format!("Réception {} ({})", reception.number, reception.supplier),
        amount_ht: reception.amount_ht,
        amount_vat,
        amount_ttc: reception.amount_ht + amount_vat,
    }
}

/// Net, VAT and gross totals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceTotals {
    /// Net amount (HT).
    pub amount_ht: f64,
    /// VAT amount.
    pub amount_vat: f64,
    /// Gross amount (TTC).
    pub amount_ttc: f64,
}

/// Header data of an invoice to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    /// Customer or supplier name.
    pub counterparty: String,
    /// Invoice date.
    pub date: NaiveDate,
    /// Payment due date.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Source records picked for one invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSelection {
    /// Invoice side; fixes which records may be added.
    kind: InvoiceKind,
    /// Centime rate folded into reception lines.
    centime_rate: f64,
    /// One line per source record.
    lines: BTreeMap<InvoiceSource, InvoiceLine>,
}

impl InvoiceSelection {
    /// Empty selection for a client invoice.
    #[inline]
    #[must_use]
    pub const fn client() -> Self {
        Self {
            kind: InvoiceKind::Client,
            centime_rate: 0.0,
            lines: BTreeMap::new(),
        }
    }

    /// Empty selection for a supplier invoice, folding `centime_rate` into
    /// the VAT of each reception.
    #[inline]
    #[must_use]
    pub const fn supplier(centime_rate: f64) -> Self {
        Self {
            kind: InvoiceKind::Supplier,
            centime_rate,
            lines: BTreeMap::new(),
        }
    }

    /// Client selection holding `sales`.
    #[inline]
    #[must_use]
    pub fn from_sales(sales: &[Sale]) -> Self {
        let mut selection = Self::client();
        for sale in sales {
            let _added = selection.insert(sale_line(sale));
        }
        selection
    }

    /// Supplier selection holding `receptions`.
    #[inline]
    #[must_use]
    pub fn from_receptions(receptions: &[Reception], centime_rate: f64) -> Self {
        let mut selection = Self::supplier(centime_rate);
        for reception in receptions {
            let _added = selection.insert(reception_line(reception, centime_rate));
        }
        selection
    }

    /// Adds a sale. Returns `false` if it was already selected.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSelection`] on a supplier selection.
    #[inline]
    pub fn add_sale(&mut self, sale: &Sale) -> Result<bool> {
        self.ensure_kind(InvoiceKind::Client)?;
        Ok(self.insert(sale_line(sale)))
    }

    /// Adds a reception at the selection's centime rate. Returns `false` if
    /// it was already selected.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSelection`] on a client selection.
    #[inline]
    pub fn add_reception(&mut self, reception: &Reception) -> Result<bool> {
        self.add_reception_at(reception, self.centime_rate)
    }

    /// Adds a reception at an explicit centime rate.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSelection`] on a client selection.
    #[inline]
    pub fn add_reception_at(&mut self, reception: &Reception, centime_rate: f64) -> Result<bool> {
        self.ensure_kind(InvoiceKind::Supplier)?;
        Ok(self.insert(reception_line(reception, centime_rate)))
    }

    /// Drops the line built from `source`.
    #[inline]
    pub fn remove(&mut self, source: &InvoiceSource) -> Option<InvoiceLine> {
        self.lines.remove(source)
    }

    /// Returns `true` if `source` is selected.
    #[inline]
    #[must_use]
    pub fn contains(&self, source: &InvoiceSource) -> bool {
        self.lines.contains_key(source)
    }

    /// Invoice side of the selection.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> InvoiceKind {
        self.kind
    }

    /// Number of selected records.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns `true` if nothing is selected.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Selected sources, in source order.
    #[inline]
    pub fn sources(&self) -> impl Iterator<Item = &InvoiceSource> {
        self.lines.keys()
    }

    /// Lines, in source order.
    #[inline]
    pub fn lines(&self) -> impl Iterator<Item = &InvoiceLine> {
        self.lines.values()
    }

    /// Sums the lines in source order.
    #[inline]
    #[must_use]
    pub fn totals(&self) -> InvoiceTotals {
        self.lines
            .values()
            .fold(InvoiceTotals::default(), |totals, line| InvoiceTotals {
                amount_ht: totals.amount_ht + line.amount_ht,
                amount_vat: totals.amount_vat + line.amount_vat,
                amount_ttc: totals.amount_ttc + line.amount_ttc,
            })
    }

    /// Builds an unpaid invoice from the selection.
    #[must_use]
    pub fn to_invoice(&self, number: String, request: &InvoiceRequest) -> Invoice {
        let mut invoice = Invoice {
            id: InvoiceId::generate(),
            number,
            kind: self.kind,
            counterparty: request.counterparty.clone(),
            date: request.date,
            due_date: request.due_date,
            lines: self.lines.values().cloned().collect(),
            amount_ht: 0.0,
            amount_vat: 0.0,
            amount_ttc: 0.0,
            paid_amount: 0.0,
            remaining_amount: 0.0,
            status: InvoiceStatus::Issued,
            payment_status: PaymentStatus::Unpaid,
        };
        invoice.recompute();
        invoice
    }

    /// Inserts a line unless its source is already selected.
    fn insert(&mut self, line: InvoiceLine) -> bool {
        let Some(source) = line.source.clone() else {
            return false;
        };
        if self.lines.contains_key(&source) {
            return false;
        }
        let _previous = self.lines.insert(source, line);
        true
    }

    /// Fails unless the selection is for `kind` invoices.
    fn ensure_kind(&self, kind: InvoiceKind) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(LedgerError::InvalidSelection(format!(
                "cannot add a {kind} record to a {} invoice",
                self.kind
            )))
        }
    }
}

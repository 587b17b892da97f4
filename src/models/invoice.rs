//! Invoice and invoice line models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    InvoiceId, InvoiceKind, InvoiceLineId, InvoiceStatus, PaymentStatus, ReceptionId, SaleId,
    SourceKind,
};
use crate::balance::BALANCE_EPSILON;
use crate::error::{LedgerError, Result};

/// Source record an invoice line was built from.
///
/// Ordered by kind then identifier, which is the order invoice totals are
/// summed in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvoiceSource {
    /// Kind of the source record.
    pub kind: SourceKind,
    /// Identifier of the source record.
    pub id: String,
}

impl InvoiceSource {
    /// Source pointing at a till sale.
    #[inline]
    #[must_use]
    pub fn sale(id: &SaleId) -> Self {
        Self {
            kind: SourceKind::Sale,
            id: id.as_inner().to_owned(),
        }
    }

    /// Source pointing at a supplier reception.
    #[inline]
    #[must_use]
    pub fn reception(id: &ReceptionId) -> Self {
        Self {
            kind: SourceKind::Reception,
            id: id.as_inner().to_owned(),
        }
    }

    /// Identifier of the sale, if this source is one.
    #[inline]
    #[must_use]
    pub fn sale_id(&self) -> Option<SaleId> {
        (self.kind == SourceKind::Sale).then(|| SaleId::from(self.id.as_str()))
    }

    /// Identifier of the reception, if this source is one.
    #[inline]
    #[must_use]
    pub fn reception_id(&self) -> Option<ReceptionId> {
        (self.kind == SourceKind::Reception).then(|| ReceptionId::from(self.id.as_str()))
    }

    /// Deterministic line identifier for this source.
    #[inline]
    #[must_use]
    pub fn line_id(&self) -> InvoiceLineId {
        InvoiceLineId::new(self.to_string())
    }
}

impl core::fmt::Display for InvoiceSource {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// One line of an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    /// Unique identifier (derived from the source when there is one).
    pub id: InvoiceLineId,
    /// Record the line was built from.
    #[serde(default)]
    pub source: Option<InvoiceSource>,
    /// Line description.
    pub description: String,
    /// Net amount (HT).
    pub amount_ht: f64,
    /// VAT amount (including folded centime for supplier lines).
    pub amount_vat: f64,
    /// Gross amount (TTC).
    pub amount_ttc: f64,
}

/// A client or supplier invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Unique identifier.
    pub id: InvoiceId,
    /// Invoice number.
    pub number: String,
    /// Client or supplier side.
    #[serde(rename = "type")]
    pub kind: InvoiceKind,
    /// Customer or supplier name.
    pub counterparty: String,
    /// Invoice date.
    pub date: NaiveDate,
    /// Payment due date.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Invoice lines.
    pub lines: Vec<InvoiceLine>,
    /// Total net amount.
    pub amount_ht: f64,
    /// Total VAT.
    pub amount_vat: f64,
    /// Total gross amount.
    pub amount_ttc: f64,
    /// Amount paid so far.
    pub paid_amount: f64,
    /// `amount_ttc - paid_amount`.
    pub remaining_amount: f64,
    /// Lifecycle state.
    pub status: InvoiceStatus,
    /// Settlement state.
    pub payment_status: PaymentStatus,
}

impl Invoice {
    /// Recomputes header totals, remaining amount and payment status from
    /// the lines and the paid amount.
    pub fn recompute(&mut self) {
        let (ht, vat, ttc) = self.lines.iter().fold(
            (0.0_f64, 0.0_f64, 0.0_f64),
            |(ht, vat, ttc), line| (ht + line.amount_ht, vat + line.amount_vat, ttc + line.amount_ttc),
        );
        self.amount_ht = ht;
        self.amount_vat = vat;
        self.amount_ttc = ttc;
        self.remaining_amount = self.amount_ttc - self.paid_amount;
        self.payment_status = if self.paid_amount < BALANCE_EPSILON {
            PaymentStatus::Unpaid
        } else if self.remaining_amount < BALANCE_EPSILON {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };
    }

    /// Records a payment and recomputes the remaining amount.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] on a cancelled invoice,
    /// [`LedgerError::InvalidAmount`] for a non-positive amount, and
    /// [`LedgerError::Overpayment`] when the amount exceeds what is left
    /// to pay.
    pub fn record_payment(&mut self, amount: f64) -> Result<()> {
        if self.status == InvoiceStatus::Cancelled {
            return Err(LedgerError::InvalidTransition {
                entity: "invoice",
                id: self.id.to_string(),
                state: self.status.to_string(),
                action: "pay",
            });
        }
        if amount.is_nan() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if amount > self.remaining_amount + BALANCE_EPSILON {
            return Err(LedgerError::Overpayment {
                amount,
                remaining: self.remaining_amount,
            });
        }
        self.paid_amount += amount;
        self.recompute();
        Ok(())
    }
}

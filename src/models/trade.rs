//! Till sales and supplier receptions, the billable source records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{InvoiceId, ReceptionId, SaleId};

/// A sale recorded at the pharmacy till.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    /// Unique identifier.
    pub id: SaleId,
    /// Ticket number.
    pub number: String,
    /// Sale date.
    pub date: NaiveDate,
    /// Customer name, for account customers.
    #[serde(default)]
    pub customer: Option<String>,
    /// Net amount (HT).
    pub amount_ht: f64,
    /// VAT amount.
    pub amount_vat: f64,
    /// Gross amount (TTC).
    pub amount_ttc: f64,
    /// Centime additionnel, kept apart from the VAT.
    #[serde(default)]
    pub centime_amount: f64,
    /// VAT rate in force when the sale was recorded.
    #[serde(default)]
    pub vat_rate: Option<f64>,
    /// Centime rate in force when the sale was recorded.
    #[serde(default)]
    pub centime_rate: Option<f64>,
    /// Invoice the sale was billed on, if any.
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
}

impl Sale {
    /// Returns `true` if the sale has not been billed yet.
    #[inline]
    #[must_use]
    pub const fn is_unbilled(&self) -> bool {
        self.invoice_id.is_none()
    }
}

/// A delivery received from a wholesaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reception {
    /// Unique identifier.
    pub id: ReceptionId,
    /// Delivery note number.
    pub number: String,
    /// Reception date.
    pub date: NaiveDate,
    /// Supplier (wholesaler) name.
    pub supplier: String,
    /// Net amount (HT).
    pub amount_ht: f64,
    /// VAT amount.
    pub amount_vat: f64,
    /// VAT rate in force when the goods were received.
    #[serde(default)]
    pub vat_rate: Option<f64>,
    /// Centime rate in force when the goods were received.
    #[serde(default)]
    pub centime_rate: Option<f64>,
    /// Supplier invoice the reception was billed on, if any.
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
}

impl Reception {
    /// Returns `true` if the reception has not been billed yet.
    #[inline]
    #[must_use]
    pub const fn is_unbilled(&self) -> bool {
        self.invoice_id.is_none()
    }
}

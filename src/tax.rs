//! VAT and centime additionnel computation.
//!
//! The VAT is levied on the net amount; the centime additionnel is levied on
//! the VAT amount, not on the base. Collected amounts (sales) and deductible
//! amounts (purchases) are summed independently, then netted:
//!
//! ```text
//! vat     = base * vat_rate / 100
//! centime = vat * centime_rate / 100
//! due     = collected - deductible    (negative: credit carried forward)
//! ```

use serde::{Deserialize, Serialize};

use crate::models::{Reception, Sale, TaxKind, TaxRate};

/// VAT rate applied when no `vat` rate is configured.
pub const DEFAULT_VAT_RATE: f64 = 19.25;

/// Centime rate applied when no `additionalCentime` rate is configured.
pub const DEFAULT_CENTIME_RATE: f64 = 0.0;

/// Where a rate used in a computation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RateSource {
    /// Read from the configured tax rates.
    Configured,
    /// Not configured; the built-in default was used.
    Fallback,
}

/// Which rate a transaction is taxed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RatePolicy {
    /// Every transaction is taxed at the currently configured rate.
    #[default]
    Live,
    /// Transactions that recorded their own rate are taxed at that rate.
    Snapshot,
}

impl RatePolicy {
    /// Picks the rate to apply given the live rate and the rate recorded on
    /// the transaction.
    #[inline]
    #[must_use]
    pub fn resolve(self, live: f64, recorded: Option<f64>) -> f64 {
        match self {
            Self::Live => live,
            Self::Snapshot => recorded.unwrap_or(live),
        }
    }
}

/// Resolved VAT and centime rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxSettings {
    /// VAT rate in percent.
    pub vat_rate: f64,
    /// Centime additionnel rate in percent of the VAT.
    pub centime_rate: f64,
    /// Origin of `vat_rate`.
    pub vat_source: RateSource,
    /// Origin of `centime_rate`.
    pub centime_source: RateSource,
}

impl TaxSettings {
    /// Settings with explicitly configured rates.
    #[inline]
    #[must_use]
    pub const fn new(vat_rate: f64, centime_rate: f64) -> Self {
        Self {
            vat_rate,
            centime_rate,
            vat_source: RateSource::Configured,
            centime_source: RateSource::Configured,
        }
    }

    /// Settings made of the built-in defaults only.
    #[inline]
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            vat_rate: DEFAULT_VAT_RATE,
            centime_rate: DEFAULT_CENTIME_RATE,
            vat_source: RateSource::Fallback,
            centime_source: RateSource::Fallback,
        }
    }

    /// Resolves the settings from configured tax rates.
    ///
    /// The first rate of each kind wins. A missing kind falls back to its
    /// default and is flagged as [`RateSource::Fallback`].
    #[inline]
    #[must_use]
    pub fn from_rates(rates: &[TaxRate]) -> Self {
        let first = |kind: TaxKind| {
            rates
                .iter()
                .find(|rate| rate.kind == kind)
                .map(|rate| rate.percentage)
        };
        let mut settings = Self::fallback();
        if let Some(vat_rate) = first(TaxKind::Vat) {
            settings.vat_rate = vat_rate;
            settings.vat_source = RateSource::Configured;
        } else {
            tracing::warn!(
                rate = DEFAULT_VAT_RATE,
                "no VAT rate configured, using the default rate"
            );
        }
        if let Some(centime_rate) = first(TaxKind::AdditionalCentime) {
            settings.centime_rate = centime_rate;
            settings.centime_source = RateSource::Configured;
        } else {
            tracing::warn!(
                rate = DEFAULT_CENTIME_RATE,
                "no centime additionnel rate configured, using the default rate"
            );
        }
        settings
    }

    /// Overall source: [`RateSource::Fallback`] if either rate fell back.
    #[inline]
    #[must_use]
    pub fn rate_source(&self) -> RateSource {
        if self.vat_source == RateSource::Fallback || self.centime_source == RateSource::Fallback {
            RateSource::Fallback
        } else {
            RateSource::Configured
        }
    }
}

impl Default for TaxSettings {
    #[inline]
    fn default() -> Self {
        Self::fallback()
    }
}

/// VAT on `base` at `rate` percent.
#[inline]
#[must_use]
pub fn vat_amount(base: f64, rate: f64) -> f64 {
    base * rate / 100.0
}

/// Centime additionnel on a VAT amount at `rate` percent.
#[inline]
#[must_use]
pub fn centime_amount(vat: f64, rate: f64) -> f64 {
    vat * rate / 100.0
}

/// A net amount to tax, with the rates recorded on the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxableAmount {
    /// Net amount (HT).
    pub base: f64,
    /// VAT rate recorded with the transaction.
    pub vat_rate: Option<f64>,
    /// Centime rate recorded with the transaction.
    pub centime_rate: Option<f64>,
}

impl TaxableAmount {
    /// An amount without recorded rates.
    #[inline]
    #[must_use]
    pub const fn new(base: f64) -> Self {
        Self {
            base,
            vat_rate: None,
            centime_rate: None,
        }
    }

    /// An amount with the rates in force when it was recorded.
    #[inline]
    #[must_use]
    pub const fn with_rates(base: f64, vat_rate: f64, centime_rate: f64) -> Self {
        Self {
            base,
            vat_rate: Some(vat_rate),
            centime_rate: Some(centime_rate),
        }
    }

    /// VAT and centime of this amount under `settings` and `policy`.
    #[inline]
    #[must_use]
    pub fn taxes(&self, settings: &TaxSettings, policy: RatePolicy) -> (f64, f64) {
        let vat = vat_amount(self.base, policy.resolve(settings.vat_rate, self.vat_rate));
        let centime = centime_amount(
            vat,
            policy.resolve(settings.centime_rate, self.centime_rate),
        );
        (vat, centime)
    }
}

impl From<&Sale> for TaxableAmount {
    #[inline]
    fn from(sale: &Sale) -> Self {
        Self {
            base: sale.amount_ht,
            vat_rate: sale.vat_rate,
            centime_rate: sale.centime_rate,
        }
    }
}

impl From<&Reception> for TaxableAmount {
    #[inline]
    fn from(reception: &Reception) -> Self {
        Self {
            base: reception.amount_ht,
            vat_rate: reception.vat_rate,
            centime_rate: reception.centime_rate,
        }
    }
}

/// VAT position over a set of sales and purchases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VatSummary {
    /// Net sales.
    pub sales_ht: f64,
    /// VAT collected on sales.
    pub vat_collected: f64,
    /// Net purchases.
    pub purchases_ht: f64,
    /// VAT deductible on purchases.
    pub vat_deductible: f64,
    /// `vat_collected - vat_deductible`.
    pub vat_due: f64,
    /// Live centime rate.
    pub centime_rate: f64,
    /// Centime collected on sales.
    pub centime_collected: f64,
    /// Centime deductible on purchases.
    pub centime_deductible: f64,
    /// `centime_collected - centime_deductible`.
    pub centime_due: f64,
    /// `vat_due + centime_due`.
    pub total_due: f64,
    /// Effective VAT rate on sales, 0 without sales.
    pub average_rate: f64,
    /// Live VAT rate.
    pub vat_rate: f64,
    /// Whether a live rate fell back to its default.
    pub rate_source: RateSource,
}

impl VatSummary {
    /// Returns `true` when the position is a credit to carry forward.
    #[inline]
    #[must_use]
    pub fn is_credit(&self) -> bool {
        self.total_due < 0.0
    }

    /// Credit carried forward, 0 when an amount is due.
    #[inline]
    #[must_use]
    pub fn credit_carried(&self) -> f64 {
        if self.is_credit() {
            -self.total_due
        } else {
            0.0
        }
    }
}

/// Computes the VAT position of `sales` (collected) against `purchases`
/// (deductible).
#[inline]
#[must_use]
pub fn summarize(
    sales: &[TaxableAmount],
    purchases: &[TaxableAmount],
    settings: &TaxSettings,
    policy: RatePolicy,
) -> VatSummary {
    let sum = |amounts: &[TaxableAmount]| {
        amounts
            .iter()
            .fold((0.0_f64, 0.0_f64, 0.0_f64), |(base, vat, centime), amount| {
                let (line_vat, line_centime) = amount.taxes(settings, policy);
                (base + amount.base, vat + line_vat, centime + line_centime)
            })
    };
    let (sales_ht, vat_collected, centime_collected) = sum(sales);
    let (purchases_ht, vat_deductible, centime_deductible) = sum(purchases);

    let vat_due = vat_collected - vat_deductible;
    let centime_due = centime_collected - centime_deductible;
    let average_rate = if sales_ht > 0.0 {
        vat_collected / sales_ht * 100.0
    } else {
        0.0
    };

    VatSummary {
        sales_ht,
        vat_collected,
        purchases_ht,
        vat_deductible,
        vat_due,
        centime_rate: settings.centime_rate,
        centime_collected,
        centime_deductible,
        centime_due,
        total_due: vat_due + centime_due,
        average_rate,
        vat_rate: settings.vat_rate,
        rate_source: settings.rate_source(),
    }
}

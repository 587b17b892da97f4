//! Configured tax rate model.

use serde::{Deserialize, Serialize};

use super::{TaxKind, TaxRateId};

/// A tax rate from the fiscal configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRate {
    /// Unique identifier.
    pub id: TaxRateId,
    /// Display name (e.g. "TVA normale").
    pub name: String,
    /// Rate in percent (19.25 means 19.25 %).
    pub percentage: f64,
    /// What the rate applies to.
    #[serde(rename = "type")]
    pub kind: TaxKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_uses_type_field() {
        let json = r#"{
            "id": "tr-1",
            "name": "Centimes additionnels communaux",
            "percentage": 10,
            "type": "additionalCentime"
        }"#;
        let rate: TaxRate = serde_json::from_str(json).unwrap();
        assert_eq!(rate.kind, TaxKind::AdditionalCentime);
        assert!((rate.percentage - 10.0).abs() < f64::EPSILON);
    }
}

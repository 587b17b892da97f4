//! Newtype wrappers for entity identifiers.
//!
//! These prevent accidentally mixing up IDs of different entity types
//! at compile time.

use serde::{Deserialize, Serialize};

/// Macro to define a newtype ID wrapping a `String` inner type.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from the given string.
            #[inline]
            #[must_use]
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Generates a fresh random (UUID v4) identifier.
            #[inline]
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Returns a reference to the inner string.
            #[inline]
            #[must_use]
            pub fn as_inner(&self) -> &str {
                &self.0
            }

            /// Consumes the wrapper and returns the inner string.
            #[inline]
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

define_string_id! {
    /// Unique identifier for an accounting journal.
    JournalId
}

define_string_id! {
    /// Unique identifier for a ledger entry (UUID string).
    EntryId
}

define_string_id! {
    /// Unique identifier for a line inside a ledger entry.
    LineId
}

define_string_id! {
    /// Unique identifier for a bank account.
    BankAccountId
}

define_string_id! {
    /// Unique identifier for a bank statement transaction.
    BankTransactionId
}

define_string_id! {
    /// Unique identifier for a statement reconciliation.
    ReconciliationId
}

define_string_id! {
    /// Unique identifier for a configured tax rate.
    TaxRateId
}

define_string_id! {
    /// Unique identifier for a client or supplier invoice.
    InvoiceId
}

define_string_id! {
    /// Unique identifier for an invoice line.
    ///
    /// Lines built from a sale or reception carry a deterministic id
    /// derived from the source record.
    InvoiceLineId
}

define_string_id! {
    /// Unique identifier for a till sale.
    SaleId
}

define_string_id! {
    /// Unique identifier for a supplier goods reception.
    ReceptionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_serde_roundtrip() {
        let id = EntryId::new("550e8400-e29b-41d4-a716-446655440000".to_owned());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""550e8400-e29b-41d4-a716-446655440000""#);
        let deserialized: EntryId = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, id);
    }

    #[test]
    fn string_id_display() {
        let id = JournalId::new("BQ1".to_owned());
        assert_eq!(id.to_string(), "BQ1");
    }

    #[test]
    fn id_from_str_and_string() {
        let id: SaleId = "s-1".into();
        assert_eq!(id.as_inner(), "s-1");

        let id: ReceptionId = "r-1".to_owned().into();
        assert_eq!(id.into_inner(), "r-1");
    }

    #[test]
    fn generated_ids_are_unique() {
        let first = BankTransactionId::generate();
        let second = BankTransactionId::generate();
        assert_ne!(first, second);
        assert_eq!(first.as_inner().len(), 36);
    }

    #[test]
    fn ids_order_lexicographically() {
        let mut ids = vec![SaleId::from("s-3"), SaleId::from("s-1"), SaleId::from("s-2")];
        ids.sort();
        assert_eq!(ids, vec![SaleId::from("s-1"), SaleId::from("s-2"), SaleId::from("s-3")]);
    }
}

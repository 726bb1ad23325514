//! Processor Identifiers
//!
//! Opaque string identifiers assigned by the processor. They are only checked
//! for presence; the processor decides whether they refer to anything.

use serde::{Deserialize, Serialize};

use crate::error::MissingIdentifier;

macro_rules! processor_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse caller input, rejecting blank identifiers
            pub fn parse(s: impl Into<String>) -> Result<Self, MissingIdentifier> {
                let s = s.into();
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(MissingIdentifier($label));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Wrap an identifier the processor handed back
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = MissingIdentifier;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

processor_id!(
    /// Customer reference (`cus_...`)
    CustomerId,
    "customer"
);
processor_id!(
    /// Subscription identifier (`sub_...`)
    SubscriptionId,
    "subscription"
);
processor_id!(
    /// Subscription item identifier (`si_...`)
    SubscriptionItemId,
    "subscription item"
);
processor_id!(
    /// Invoice identifier (`in_...`)
    InvoiceId,
    "invoice"
);
processor_id!(
    /// Invoice item identifier (`ii_...`)
    InvoiceItemId,
    "invoice item"
);
processor_id!(
    /// Price identifier (`price_...`)
    PriceId,
    "price"
);

/// Idempotency token attached to creation calls
///
/// The processor replays the original response for a repeated key instead
/// of creating a second entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Fresh random key
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Key for one step of a multi-step operation.
    ///
    /// Each step needs its own key: the processor rejects a key reused
    /// against a different endpoint.
    pub fn for_step(&self, step: &str) -> Self {
        Self(format!("{}:{}", self.0, step))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_rejects_blank() {
        assert_eq!(CustomerId::parse(" cus_1 ").unwrap().as_str(), "cus_1");
        let err = InvoiceId::parse("   ").unwrap_err();
        assert_eq!(err, MissingIdentifier("invoice"));
        assert_eq!(err.to_string(), "Missing invoice identifier");
    }

    #[test]
    fn test_deserialize_rejects_blank() {
        let ok: SubscriptionId = serde_json::from_str("\"sub_9\"").unwrap();
        assert_eq!(ok.as_str(), "sub_9");
        assert!(serde_json::from_str::<SubscriptionId>("\"\"").is_err());
    }

    #[test]
    fn test_step_keys_are_distinct() {
        let key = IdempotencyKey::from_string("req-42");
        let a = key.for_step("invoice_item");
        let b = key.for_step("invoice");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "req-42:invoice_item");
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(IdempotencyKey::generate(), IdempotencyKey::generate());
    }
}

//! Inbound Requests
//!
//! Field names match the JSON bodies callers already send. Fields are kept
//! as plain strings so a missing or blank value surfaces as
//! `BillingError::InvalidRequest` rather than a decoding failure.

use std::collections::HashMap;

use billing_processor::{
    CustomerId, IdempotencyKey, InvoiceId, InvoiceItemId, Period, PriceId, SubscriptionId,
    UpcomingInvoiceQuery,
};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Customer (and optionally subscription) whose next invoice to preview
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpcomingInvoiceRequest {
    pub customer: String,
    pub subscription: Option<String>,
}

impl UpcomingInvoiceRequest {
    pub fn new(customer: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            customer: customer.into(),
            subscription: Some(subscription.into()),
        }
    }

    pub fn query(&self) -> Result<UpcomingInvoiceQuery> {
        Ok(UpcomingInvoiceQuery {
            customer: CustomerId::parse(&self.customer)?,
            subscription: blank_to_none(self.subscription.as_deref())
                .map(SubscriptionId::parse)
                .transpose()?,
        })
    }
}

/// Request naming one invoice (pay, finalize)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceRequest {
    pub invoice: String,
}

impl InvoiceRequest {
    pub fn new(invoice: impl Into<String>) -> Self {
        Self {
            invoice: invoice.into(),
        }
    }

    pub fn invoice_id(&self) -> Result<InvoiceId> {
        Ok(InvoiceId::parse(&self.invoice)?)
    }
}

/// Request naming one subscription
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionRequest {
    pub subscription: String,
}

impl SubscriptionRequest {
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
        }
    }

    pub fn subscription_id(&self) -> Result<SubscriptionId> {
        Ok(SubscriptionId::parse(&self.subscription)?)
    }
}

/// Request carrying a bare `id` (invoice item lookups, invoice line listing)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdRequest {
    pub id: String,
}

impl IdRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn invoice_item_id(&self) -> Result<InvoiceItemId> {
        Ok(InvoiceItemId::parse(&self.id)?)
    }

    pub fn invoice_id(&self) -> Result<InvoiceId> {
        Ok(InvoiceId::parse(&self.id)?)
    }
}

/// New quantity and/or price for a subscription's first item
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateSubscriptionRequest {
    pub subscription: String,
    pub quantity: Option<u64>,
    pub price: Option<String>,
}

impl UpdateSubscriptionRequest {
    pub fn subscription_id(&self) -> Result<SubscriptionId> {
        Ok(SubscriptionId::parse(&self.subscription)?)
    }

    pub fn price_id(&self) -> Result<Option<PriceId>> {
        Ok(blank_to_none(self.price.as_deref())
            .map(PriceId::parse)
            .transpose()?)
    }

    /// At least one of quantity or price must be present
    pub fn validate(&self) -> Result<()> {
        if self.quantity.is_none() && blank_to_none(self.price.as_deref()).is_none() {
            return Err(BillingError::InvalidRequest(
                "quantity or price is required".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateInvoiceItemRequest {
    pub id: String,
    pub quantity: Option<u64>,
}

impl UpdateInvoiceItemRequest {
    pub fn invoice_item_id(&self) -> Result<InvoiceItemId> {
        Ok(InvoiceItemId::parse(&self.id)?)
    }

    pub fn quantity(&self) -> Result<u64> {
        self.quantity
            .ok_or_else(|| BillingError::InvalidRequest("quantity is required".into()))
    }
}

/// One-off charge to invoice immediately for manual payment
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualInvoiceRequest {
    pub customer: String,

    /// Minor currency units
    pub amount: Option<i64>,

    pub currency: String,
    pub description: Option<String>,
    pub period: Option<Period>,
    pub metadata: Option<HashMap<String, String>>,

    /// Caller key making retries safe; generated when absent
    pub idempotency_key: Option<String>,
}

impl ManualInvoiceRequest {
    pub fn new(
        customer: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            customer: customer.into(),
            amount: Some(amount),
            currency: currency.into(),
            description: Some(description.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn customer_id(&self) -> Result<CustomerId> {
        Ok(CustomerId::parse(&self.customer)?)
    }

    pub fn amount(&self) -> Result<i64> {
        self.amount
            .ok_or_else(|| BillingError::InvalidRequest("amount is required".into()))
    }

    pub fn currency(&self) -> Result<String> {
        let currency = self.currency.trim();
        if currency.is_empty() {
            return Err(BillingError::InvalidRequest("currency is required".into()));
        }
        Ok(currency.to_lowercase())
    }

    pub fn period(&self) -> Result<Option<Period>> {
        match self.period {
            Some(period) if !period.is_valid() => Err(BillingError::InvalidRequest(
                "period start must not be after period end".into(),
            )),
            period => Ok(period),
        }
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        blank_to_none(self.idempotency_key.as_deref())
            .map_or_else(IdempotencyKey::generate, |key| {
                IdempotencyKey::from_string(key.trim())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_missing_fields_become_invalid_request() {
        let req: InvoiceRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.invoice_id().unwrap_err().kind(), ErrorKind::InvalidRequest);

        let req: UpcomingInvoiceRequest =
            serde_json::from_str(r#"{"customer": "cus_1", "subscription": ""}"#).unwrap();
        let query = req.query().unwrap();
        assert!(query.subscription.is_none());
    }

    #[test]
    fn test_update_subscription_needs_quantity_or_price() {
        let req: UpdateSubscriptionRequest =
            serde_json::from_str(r#"{"subscription": "sub_1"}"#).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateSubscriptionRequest =
            serde_json::from_str(r#"{"subscription": "sub_1", "price": "price_pro"}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.price_id().unwrap().unwrap().as_str(), "price_pro");
    }

    #[test]
    fn test_manual_invoice_body() {
        let req: ManualInvoiceRequest = serde_json::from_str(
            r#"{
                "customer": "cus_1",
                "amount": 500,
                "currency": "USD",
                "description": "fee",
                "period": {"start": 1700000000, "end": 1700086400},
                "metadata": {"order": "42"}
            }"#,
        )
        .unwrap();

        assert_eq!(req.amount().unwrap(), 500);
        assert_eq!(req.currency().unwrap(), "usd");
        assert!(req.period().unwrap().is_some());
    }

    #[test]
    fn test_inverted_period_rejected() {
        let mut req = ManualInvoiceRequest::new("cus_1", 500, "usd", "fee");
        req.period = Some(Period {
            start: 20,
            end: 10,
        });
        assert!(req.period().is_err());
    }

    #[test]
    fn test_caller_key_is_kept() {
        let req = ManualInvoiceRequest::new("cus_1", 500, "usd", "fee").with_idempotency_key("k1");
        assert_eq!(req.idempotency_key().as_str(), "k1");

        let req = ManualInvoiceRequest::new("cus_1", 500, "usd", "fee");
        assert_ne!(req.idempotency_key(), req.idempotency_key());
    }
}

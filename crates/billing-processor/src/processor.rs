//! Processor Client Adapter
//!
//! One method per remote billing operation. Implementations make exactly one
//! remote call per method and never retry; whatever retry or timeout policy
//! exists lives in the transport underneath.

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{IdempotencyKey, InvoiceId, InvoiceItemId, SubscriptionId};
use crate::model::{
    CreateInvoiceItemParams, CreateInvoiceParams, Invoice, InvoiceItem, InvoiceLineItem, Page,
    Subscription, UpcomingInvoiceQuery, UpdateSubscriptionParams,
};

/// Billing processor client (Strategy pattern)
///
/// `StripeProcessor` talks to Stripe; `MockProcessor` simulates it in memory.
#[async_trait]
pub trait BillingProcessor: Send + Sync {
    /// Compute, without persisting, the next invoice for a subscription
    async fn retrieve_upcoming_invoice(&self, query: &UpcomingInvoiceQuery) -> Result<Invoice>;

    /// Same preview, itemized
    async fn list_upcoming_invoice_lines(
        &self,
        query: &UpcomingInvoiceQuery,
    ) -> Result<Page<InvoiceLineItem>>;

    /// Mark an invoice paid without moving funds
    async fn pay_invoice_out_of_band(&self, invoice: &InvoiceId) -> Result<Invoice>;

    async fn retrieve_subscription(
        &self,
        subscription: &SubscriptionId,
        expand_latest_invoice: bool,
    ) -> Result<Subscription>;

    /// Open invoices of a subscription with their payment intents expanded
    async fn list_open_invoices(&self, subscription: &SubscriptionId) -> Result<Page<Invoice>>;

    async fn retrieve_invoice_item(&self, item: &InvoiceItemId) -> Result<InvoiceItem>;

    async fn update_invoice_item(&self, item: &InvoiceItemId, quantity: u64)
        -> Result<InvoiceItem>;

    async fn list_invoice_lines(&self, invoice: &InvoiceId) -> Result<Page<InvoiceLineItem>>;

    async fn update_subscription(
        &self,
        subscription: &SubscriptionId,
        params: &UpdateSubscriptionParams,
    ) -> Result<Subscription>;

    /// Transition a draft invoice to open, locking its lines
    async fn finalize_invoice(&self, invoice: &InvoiceId) -> Result<Invoice>;

    async fn create_invoice_item(
        &self,
        params: &CreateInvoiceItemParams,
        idempotency_key: &IdempotencyKey,
    ) -> Result<InvoiceItem>;

    async fn create_invoice(
        &self,
        params: &CreateInvoiceParams,
        idempotency_key: &IdempotencyKey,
    ) -> Result<Invoice>;

    /// Processor name for logs and health output
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_processor_is_object_safe() {
        fn _accepts_dyn(_processor: &dyn BillingProcessor) {}
    }
}

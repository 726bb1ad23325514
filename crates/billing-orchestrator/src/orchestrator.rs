//! Billing Orchestrator
//!
//! Turns each inbound request into one or more processor calls. Most
//! operations are direct read-throughs; two are composites:
//!
//! - **Update subscription**: retrieve → pick the first item → update with
//!   proration disabled.
//! - **Create manual invoice**: create a pending invoice item → create a
//!   `send_invoice` invoice that sweeps it in.
//!
//! No step is retried and nothing is rolled back. A composite that fails
//! after a remote side effect reports what was left behind.

use std::sync::Arc;

use billing_processor::{
    BillingProcessor, CollectionMethod, CreateInvoiceItemParams, CreateInvoiceParams, Invoice,
    InvoiceItem, InvoiceLineItem, Operation, Page, PendingInvoiceItemsBehavior, ProrationBehavior,
    Subscription, SubscriptionItemUpdate, UpdateSubscriptionParams,
};

use crate::error::{BillingError, CompletedStep, Result};
use crate::locks::SubscriptionLocks;
use crate::request::{
    IdRequest, InvoiceRequest, ManualInvoiceRequest, SubscriptionRequest,
    UpcomingInvoiceRequest, UpdateInvoiceItemRequest, UpdateSubscriptionRequest,
};

/// Due-date offset for manually created invoices
pub const MANUAL_INVOICE_DAYS_UNTIL_DUE: u32 = 1;

fn log_failure(operation: &'static str) -> impl Fn(&BillingError) {
    move |err| {
        tracing::warn!(
            operation,
            kind = err.kind().as_str(),
            code = err.processor_code().unwrap_or("-"),
            error = %err,
            "Billing operation failed"
        );
    }
}

/// Orchestrates billing operations over an injected processor
pub struct BillingOrchestrator {
    processor: Arc<dyn BillingProcessor>,
    locks: Option<SubscriptionLocks>,
}

impl BillingOrchestrator {
    pub fn new(processor: Arc<dyn BillingProcessor>) -> Self {
        Self {
            processor,
            locks: None,
        }
    }

    /// Serialize subscription updates per subscription within this process
    #[must_use]
    pub fn with_subscription_locking(mut self) -> Self {
        self.locks = Some(SubscriptionLocks::new());
        self
    }

    pub fn serializes_subscription_updates(&self) -> bool {
        self.locks.is_some()
    }

    pub fn processor_name(&self) -> &str {
        self.processor.name()
    }

    // ════════════════════════════════════════════════════════════════════════
    // Read-throughs
    // ════════════════════════════════════════════════════════════════════════

    /// Next invoice as the processor would compute it right now
    pub async fn preview_upcoming_invoice(
        &self,
        request: &UpcomingInvoiceRequest,
    ) -> Result<Invoice> {
        let query = request.query()?;
        self.processor
            .retrieve_upcoming_invoice(&query)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("preview_upcoming_invoice"))
    }

    pub async fn preview_upcoming_invoice_lines(
        &self,
        request: &UpcomingInvoiceRequest,
    ) -> Result<Page<InvoiceLineItem>> {
        let query = request.query()?;
        self.processor
            .list_upcoming_invoice_lines(&query)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("preview_upcoming_invoice_lines"))
    }

    /// Subscription with its latest invoice expanded
    pub async fn inspect_subscription(&self, request: &SubscriptionRequest) -> Result<Subscription> {
        let subscription = request.subscription_id()?;
        self.processor
            .retrieve_subscription(&subscription, true)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("inspect_subscription"))
    }

    /// Open invoices of a subscription, payment intents expanded
    pub async fn list_open_invoices(&self, request: &SubscriptionRequest) -> Result<Page<Invoice>> {
        let subscription = request.subscription_id()?;
        self.processor
            .list_open_invoices(&subscription)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("list_open_invoices"))
    }

    pub async fn inspect_invoice_item(&self, request: &IdRequest) -> Result<InvoiceItem> {
        let item = request.invoice_item_id()?;
        self.processor
            .retrieve_invoice_item(&item)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("inspect_invoice_item"))
    }

    pub async fn list_invoice_lines(&self, request: &IdRequest) -> Result<Page<InvoiceLineItem>> {
        let invoice = request.invoice_id()?;
        self.processor
            .list_invoice_lines(&invoice)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("list_invoice_lines"))
    }

    // ════════════════════════════════════════════════════════════════════════
    // Single-call mutations
    // ════════════════════════════════════════════════════════════════════════

    /// Mark an invoice paid for funds collected outside the processor.
    ///
    /// Performs no verification: the caller asserts payment happened. The
    /// invoice's current status is not checked; the processor decides.
    pub async fn mark_invoice_paid(&self, request: &InvoiceRequest) -> Result<Invoice> {
        let invoice_id = request.invoice_id()?;
        let invoice = self
            .processor
            .pay_invoice_out_of_band(&invoice_id)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("mark_invoice_paid"))?;

        tracing::info!(
            invoice = %invoice_id,
            customer = %invoice.customer,
            amount_paid = invoice.amount_paid,
            "Invoice marked paid out of band"
        );
        Ok(invoice)
    }

    pub async fn update_invoice_item(&self, request: &UpdateInvoiceItemRequest) -> Result<InvoiceItem> {
        let item_id = request.invoice_item_id()?;
        let quantity = request.quantity()?;

        let item = self
            .processor
            .update_invoice_item(&item_id, quantity)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("update_invoice_item"))?;

        tracing::info!(invoice_item = %item_id, quantity, "Invoice item updated");
        Ok(item)
    }

    /// Draft → open. The draft precondition is the processor's to enforce.
    pub async fn finalize_invoice(&self, request: &InvoiceRequest) -> Result<Invoice> {
        let invoice_id = request.invoice_id()?;
        let invoice = self
            .processor
            .finalize_invoice(&invoice_id)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure("finalize_invoice"))?;

        tracing::info!(invoice = %invoice_id, customer = %invoice.customer, "Invoice finalized");
        Ok(invoice)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Composites
    // ════════════════════════════════════════════════════════════════════════

    /// Change quantity and/or price of the subscription's first item.
    ///
    /// Only the first item by position is touched, so this is meaningful for
    /// single-item subscriptions only. Proration is always disabled.
    pub async fn update_subscription(
        &self,
        request: &UpdateSubscriptionRequest,
    ) -> Result<Subscription> {
        const OPERATION: &str = "update_subscription";

        let subscription_id = request.subscription_id()?;
        request.validate()?;
        let price = request.price_id()?;

        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(&subscription_id).await),
            None => None,
        };

        let current = self
            .processor
            .retrieve_subscription(&subscription_id, false)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure(OPERATION))?;

        let Some(first) = current.first_item() else {
            let err = BillingError::EmptySubscription(subscription_id);
            log_failure(OPERATION)(&err);
            return Err(err);
        };

        let params = UpdateSubscriptionParams {
            items: vec![SubscriptionItemUpdate {
                id: first.id.clone(),
                price,
                quantity: request.quantity,
            }],
            proration_behavior: ProrationBehavior::None,
        };

        let updated = self
            .processor
            .update_subscription(&current.id, &params)
            .await
            .map_err(BillingError::from)
            .inspect_err(log_failure(OPERATION))?;

        tracing::info!(
            subscription = %updated.id,
            subscription_item = %first.id,
            quantity = ?request.quantity,
            price = ?request.price,
            "Subscription updated"
        );
        Ok(updated)
    }

    /// Invoice a one-off charge for manual payment, due in one day.
    ///
    /// Creates the invoice item first, then an invoice that picks it up as a
    /// pending item. If the invoice cannot be created the item stays behind
    /// unattached and is named in the returned error.
    pub async fn create_manual_invoice(&self, request: &ManualInvoiceRequest) -> Result<Invoice> {
        const OPERATION: &str = "create_manual_invoice";

        let customer = request.customer_id()?;
        let item_params = CreateInvoiceItemParams {
            customer: customer.clone(),
            amount: request.amount()?,
            currency: request.currency()?,
            description: request.description.clone(),
            period: request.period()?,
            metadata: request.metadata.clone(),
        };
        let key = request.idempotency_key();

        let item = self
            .processor
            .create_invoice_item(&item_params, &key.for_step("invoice_item"))
            .await
            .inspect_err(|err| {
                if err.outcome_unknown() {
                    tracing::error!(
                        customer = %customer,
                        idempotency_key = %key,
                        error = %err,
                        "Invoice item may have been created; replay with the same idempotency key"
                    );
                }
            })
            .map_err(BillingError::from)
            .inspect_err(log_failure(OPERATION))?;

        tracing::debug!(
            customer = %customer,
            invoice_item = %item.id,
            amount = item.amount,
            "Pending invoice item created"
        );

        let invoice_params = CreateInvoiceParams {
            customer: customer.clone(),
            collection_method: CollectionMethod::SendInvoice,
            days_until_due: Some(MANUAL_INVOICE_DAYS_UNTIL_DUE),
            pending_invoice_items_behavior: Some(PendingInvoiceItemsBehavior::Include),
        };

        let invoice = match self
            .processor
            .create_invoice(&invoice_params, &key.for_step("invoice"))
            .await
        {
            Ok(invoice) => invoice,
            Err(source) => {
                tracing::error!(
                    customer = %customer,
                    orphaned_invoice_item = %item.id,
                    error = %source,
                    "Invoice creation failed after invoice item was created"
                );
                return Err(BillingError::CompositeOperation {
                    operation: OPERATION,
                    failed_step: Operation::CreateInvoice,
                    completed_steps: vec![CompletedStep {
                        operation: Operation::CreateInvoiceItem,
                        resource_id: item.id.to_string(),
                    }],
                    source,
                });
            }
        };

        tracing::info!(
            customer = %customer,
            invoice = invoice.id.as_ref().map_or("-", |id| id.as_str()),
            invoice_item = %item.id,
            amount_due = invoice.amount_due,
            "Manual invoice created"
        );
        Ok(invoice)
    }
}

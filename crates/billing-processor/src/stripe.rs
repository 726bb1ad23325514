//! Stripe Processor
//!
//! `BillingProcessor` over async-stripe's client. The client owns the
//! credential, the pinned API version and the HTTP connection; this module
//! only picks endpoints, encodes parameters and classifies failures.

use async_trait::async_trait;
use serde::Serialize;
use stripe::{Client, RequestStrategy, StripeError};

use crate::config::{Environment, ProcessorConfig};
use crate::error::{ProcessorError, Result};
use crate::ids::{IdempotencyKey, InvoiceId, InvoiceItemId, SubscriptionId};
use crate::model::{
    CreateInvoiceItemParams, CreateInvoiceParams, Invoice, InvoiceItem, InvoiceLineItem, Page,
    Subscription, UpcomingInvoiceQuery, UpdateSubscriptionParams,
};
use crate::operation::Operation;
use crate::processor::BillingProcessor;

#[derive(Serialize)]
struct Expand {
    expand: Vec<&'static str>,
}

#[derive(Serialize)]
struct PayInvoice {
    paid_out_of_band: bool,
}

#[derive(Serialize)]
struct ListInvoices<'a> {
    subscription: &'a SubscriptionId,
    status: &'static str,
    expand: Vec<&'static str>,
}

#[derive(Serialize)]
struct UpdateInvoiceItem {
    quantity: u64,
}

/// Stripe client wrapper
pub struct StripeProcessor {
    client: Client,
    environment: Environment,
}

impl StripeProcessor {
    /// Build the single processor connection for this process
    pub fn new(config: &ProcessorConfig) -> Self {
        let client = match config.api_base.as_deref() {
            Some(base) => Client::from_url(base, config.api_key()),
            None => Client::new(config.api_key()),
        };

        tracing::debug!(
            environment = %config.environment,
            custom_base = config.api_base.is_some(),
            "Stripe client initialized"
        );

        Self {
            client,
            environment: config.environment,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Client that sends `key` as the request's idempotency key
    fn idempotent(&self, key: &IdempotencyKey) -> Client {
        self.client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(key.to_string()))
    }

    /// Get the underlying Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Await one Stripe call and classify its failure
async fn call<T, F>(operation: Operation, request: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<T, StripeError>>,
{
    request.await.map_err(|e| {
        let err = map_stripe_error(e, operation);
        tracing::warn!(
            operation = %operation,
            mutation = operation.is_mutation(),
            code = err.code().unwrap_or("-"),
            error = %err,
            "Stripe call failed"
        );
        err
    })
}

fn map_stripe_error(error: StripeError, operation: Operation) -> ProcessorError {
    match error {
        StripeError::Stripe(request_error) => {
            let code = request_error
                .code
                .as_ref()
                .map(|c| snake_case(&format!("{c:?}")))
                .unwrap_or_else(|| snake_case(&format!("{:?}", request_error.error_type)));
            let message = request_error
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());

            ProcessorError::Api {
                operation,
                code,
                message,
                http_status: request_error.http_status,
            }
        }
        StripeError::ClientError(msg) => ProcessorError::transport(operation, msg),
        StripeError::Timeout => ProcessorError::transport(operation, "Request timed out"),
        // Request bodies are form-encoded, so JSON errors come from the response
        StripeError::JSONSerialize(e) => ProcessorError::Decode {
            operation,
            message: e.to_string(),
        },
        other => ProcessorError::Encoding {
            operation,
            message: other.to_string(),
        },
    }
}

/// `ResourceMissing` -> `resource_missing`, matching the wire codes
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[async_trait]
impl BillingProcessor for StripeProcessor {
    async fn retrieve_upcoming_invoice(&self, query: &UpcomingInvoiceQuery) -> Result<Invoice> {
        call(
            Operation::RetrieveUpcomingInvoice,
            self.client.get_query("/invoices/upcoming", query),
        )
        .await
    }

    async fn list_upcoming_invoice_lines(
        &self,
        query: &UpcomingInvoiceQuery,
    ) -> Result<Page<InvoiceLineItem>> {
        call(
            Operation::ListUpcomingInvoiceLines,
            self.client.get_query("/invoices/upcoming/lines", query),
        )
        .await
    }

    async fn pay_invoice_out_of_band(&self, invoice: &InvoiceId) -> Result<Invoice> {
        call(
            Operation::PayInvoice,
            self.client.post_form(
                &format!("/invoices/{invoice}/pay"),
                PayInvoice {
                    paid_out_of_band: true,
                },
            ),
        )
        .await
    }

    async fn retrieve_subscription(
        &self,
        subscription: &SubscriptionId,
        expand_latest_invoice: bool,
    ) -> Result<Subscription> {
        let expand = if expand_latest_invoice {
            vec!["latest_invoice"]
        } else {
            Vec::new()
        };

        call(
            Operation::RetrieveSubscription,
            self.client
                .get_query(&format!("/subscriptions/{subscription}"), Expand { expand }),
        )
        .await
    }

    async fn list_open_invoices(&self, subscription: &SubscriptionId) -> Result<Page<Invoice>> {
        call(
            Operation::ListOpenInvoices,
            self.client.get_query(
                "/invoices",
                ListInvoices {
                    subscription,
                    status: "open",
                    expand: vec!["data.payment_intent"],
                },
            ),
        )
        .await
    }

    async fn retrieve_invoice_item(&self, item: &InvoiceItemId) -> Result<InvoiceItem> {
        call(
            Operation::RetrieveInvoiceItem,
            self.client.get(&format!("/invoiceitems/{item}")),
        )
        .await
    }

    async fn update_invoice_item(
        &self,
        item: &InvoiceItemId,
        quantity: u64,
    ) -> Result<InvoiceItem> {
        call(
            Operation::UpdateInvoiceItem,
            self.client
                .post_form(&format!("/invoiceitems/{item}"), UpdateInvoiceItem { quantity }),
        )
        .await
    }

    async fn list_invoice_lines(&self, invoice: &InvoiceId) -> Result<Page<InvoiceLineItem>> {
        call(
            Operation::ListInvoiceLines,
            self.client.get(&format!("/invoices/{invoice}/lines")),
        )
        .await
    }

    async fn update_subscription(
        &self,
        subscription: &SubscriptionId,
        params: &UpdateSubscriptionParams,
    ) -> Result<Subscription> {
        call(
            Operation::UpdateSubscription,
            self.client
                .post_form(&format!("/subscriptions/{subscription}"), params),
        )
        .await
    }

    async fn finalize_invoice(&self, invoice: &InvoiceId) -> Result<Invoice> {
        call(
            Operation::FinalizeInvoice,
            self.client.post(&format!("/invoices/{invoice}/finalize")),
        )
        .await
    }

    async fn create_invoice_item(
        &self,
        params: &CreateInvoiceItemParams,
        idempotency_key: &IdempotencyKey,
    ) -> Result<InvoiceItem> {
        call(
            Operation::CreateInvoiceItem,
            self.idempotent(idempotency_key)
                .post_form("/invoiceitems", params),
        )
        .await
    }

    async fn create_invoice(
        &self,
        params: &CreateInvoiceParams,
        idempotency_key: &IdempotencyKey,
    ) -> Result<Invoice> {
        call(
            Operation::CreateInvoice,
            self.idempotent(idempotency_key).post_form("/invoices", params),
        )
        .await
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

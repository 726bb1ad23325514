//! # billing-processor
//!
//! Typed client adapter over the remote billing processor.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   BillingProcessor (Strategy)                 │
//! │  ┌──────────────────────┐      ┌──────────────────────────┐  │
//! │  │   StripeProcessor    │      │      MockProcessor       │  │
//! │  │  async-stripe Client │      │  in-memory simulator     │  │
//! │  └──────────────────────┘      └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every trait method is exactly one remote call. Failures come back as
//! `ProcessorError` tagged with the `Operation` that produced them; nothing
//! here retries.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use billing_processor::{BillingProcessor, ProcessorConfig, StripeProcessor};
//!
//! let config = ProcessorConfig::from_env()?;
//! let processor = StripeProcessor::new(&config);
//!
//! let invoice = processor.finalize_invoice(&invoice_id).await?;
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod mock;
pub mod model;
pub mod operation;
pub mod processor;
pub mod stripe;

pub use config::{Environment, ProcessorConfig};
pub use error::{ConfigError, MissingIdentifier, ProcessorError, Result};
pub use ids::{
    CustomerId, IdempotencyKey, InvoiceId, InvoiceItemId, PriceId, SubscriptionId,
    SubscriptionItemId,
};
pub use mock::MockProcessor;
pub use model::{
    CollectionMethod, CreateInvoiceItemParams, CreateInvoiceParams, Expandable, Extra, Invoice,
    InvoiceItem, InvoiceLineItem, InvoiceStatus, LineItemKind, Page, PaymentIntent,
    PendingInvoiceItemsBehavior, Period, Price, ProrationBehavior, Subscription,
    SubscriptionItem, SubscriptionItemUpdate, UpcomingInvoiceQuery, UpdateSubscriptionParams,
};
pub use operation::Operation;
pub use processor::BillingProcessor;
pub use stripe::StripeProcessor;

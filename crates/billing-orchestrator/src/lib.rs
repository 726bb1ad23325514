//! # billing-orchestrator
//!
//! Invoice and subscription lifecycle orchestration over an injected
//! `BillingProcessor`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    BillingOrchestrator                       │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────┐  │
//! │  │  Requests    │──│  Composites   │──│ BillingProcessor │  │
//! │  │ (validation) │  │ (multi-step)  │  │   (Strategy)     │  │
//! │  └──────────────┘  └───────────────┘  └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The processor is the system of record; nothing is persisted here.

pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod request;

pub use error::{BillingError, CompletedStep, ErrorKind, Result};
pub use locks::{SubscriptionGuard, SubscriptionLocks};
pub use orchestrator::{BillingOrchestrator, MANUAL_INVOICE_DAYS_UNTIL_DUE};
pub use request::{
    IdRequest, InvoiceRequest, ManualInvoiceRequest, SubscriptionRequest,
    UpcomingInvoiceRequest, UpdateInvoiceItemRequest, UpdateSubscriptionRequest,
};

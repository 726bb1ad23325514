//! Billing Domain Model
//!
//! Request-scoped projections of processor-owned entities. Field names follow
//! the processor's wire format so responses deserialize directly. Fields this
//! layer does not read land in `extra` and serialize back out unchanged.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{
    CustomerId, InvoiceId, InvoiceItemId, PriceId, SubscriptionId, SubscriptionItemId,
};

/// Processor fields carried through without interpretation
pub type Extra = Map<String, Value>;

/// List envelope returned by every list endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,

    #[serde(default)]
    pub has_more: bool,

    #[serde(default)]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            has_more: false,
            url: None,
            extra: Extra::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Either a bare identifier or the embedded object when expansion was asked for
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Object(Box<T>),
    Id(String),
}

impl<T> Expandable<T> {
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Expandable::Object(obj) => Some(obj),
            Expandable::Id(_) => None,
        }
    }

    pub fn is_expanded(&self) -> bool {
        matches!(self, Expandable::Object(_))
    }
}

/// Billing period in Unix seconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: i64,
    pub end: i64,
}

impl Period {
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    ChargeAutomatically,
    /// Send for manual/out-of-band payment
    SendInvoice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Uncollectible,
    Void,
    #[serde(other)]
    Unknown,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Uncollectible => "uncollectible",
            InvoiceStatus::Void => "void",
            InvoiceStatus::Unknown => "unknown",
        }
    }
}

/// How the processor treats partial-period changes on a subscription update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProrationBehavior {
    AlwaysInvoice,
    CreateProrations,
    /// No partial-period charge or credit
    None,
}

/// Whether a new invoice sweeps in the customer's unattached invoice items
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingInvoiceItemsBehavior {
    Include,
    Exclude,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: PriceId,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionItem {
    pub id: SubscriptionItemId,
    pub price: Price,

    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub customer: CustomerId,

    #[serde(default)]
    pub status: Option<String>,

    /// Ordered as the processor returns them; position matters to updates
    pub items: Page<SubscriptionItem>,

    #[serde(default)]
    pub latest_invoice: Option<Expandable<Invoice>>,

    #[serde(default)]
    pub collection_method: Option<CollectionMethod>,

    #[serde(default)]
    pub current_period_start: Option<i64>,

    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Subscription {
    /// First item by position
    pub fn first_item(&self) -> Option<&SubscriptionItem> {
        self.items.data.first()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub amount: i64,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Absent on upcoming-invoice previews, which are never persisted
    #[serde(default)]
    pub id: Option<InvoiceId>,

    pub customer: CustomerId,

    #[serde(default)]
    pub subscription: Option<SubscriptionId>,

    #[serde(default)]
    pub status: Option<InvoiceStatus>,

    #[serde(default)]
    pub collection_method: Option<CollectionMethod>,

    #[serde(default)]
    pub created: Option<i64>,

    #[serde(default)]
    pub due_date: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub amount_due: i64,

    #[serde(default)]
    pub amount_paid: i64,

    #[serde(default)]
    pub paid: bool,

    #[serde(default)]
    pub paid_out_of_band: bool,

    #[serde(default)]
    pub lines: Option<Page<InvoiceLineItem>>,

    #[serde(default)]
    pub payment_intent: Option<Expandable<PaymentIntent>>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Invoice {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_date.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }

    /// Whole days between creation and due date
    pub fn due_offset_days(&self) -> Option<i64> {
        Some((self.due_at()? - self.created_at()?).num_days())
    }

    pub fn is_status(&self, status: InvoiceStatus) -> bool {
        self.status == Some(status)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub customer: CustomerId,
    pub amount: i64,
    pub currency: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_quantity")]
    pub quantity: u64,

    #[serde(default)]
    pub unit_amount: Option<i64>,

    #[serde(default)]
    pub period: Option<Period>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Created by the processor for a mid-period subscription change
    #[serde(default)]
    pub proration: bool,

    /// Set once the processor attaches the item to an invoice
    #[serde(default)]
    pub invoice: Option<InvoiceId>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_quantity() -> u64 {
    1
}

impl InvoiceItem {
    /// Not yet swept into any invoice
    pub fn is_pending(&self) -> bool {
        self.invoice.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    #[serde(rename = "invoiceitem")]
    InvoiceItem,
    Subscription,
    #[serde(other)]
    Unknown,
}

/// Read-only projection of a charge inside one invoice
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: LineItemKind,

    pub amount: i64,
    pub currency: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub quantity: Option<u64>,

    #[serde(default)]
    pub period: Option<Period>,

    #[serde(default)]
    pub invoice_item: Option<InvoiceItemId>,

    #[serde(default)]
    pub subscription: Option<SubscriptionId>,

    #[serde(default)]
    pub proration: bool,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ============================================================================
// Request parameters
// ============================================================================

/// Customer/subscription pair identifying an upcoming-invoice preview
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpcomingInvoiceQuery {
    pub customer: CustomerId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateInvoiceItemParams {
    pub customer: CustomerId,
    pub amount: i64,
    pub currency: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateInvoiceParams {
    pub customer: CustomerId,
    pub collection_method: CollectionMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_until_due: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_invoice_items_behavior: Option<PendingInvoiceItemsBehavior>,
}

/// One entry of a subscription's replacement item list
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionItemUpdate {
    pub id: SubscriptionItemId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateSubscriptionParams {
    pub items: Vec<SubscriptionItemUpdate>,
    pub proration_behavior: ProrationBehavior,
}

//! Mock Processor
//!
//! In-memory processor simulator for tests and local demos. Models the
//! behavior the orchestrator leans on:
//! - draft → open → paid invoice transitions, rejecting illegal ones
//! - the pending-item sweep when an invoice is created with pending items
//!   included
//! - proration items for subscription changes unless proration is `none`
//! - idempotency-key replay on creation calls, rejecting a reused key whose
//!   parameters differ
//! - one-shot failure injection per operation and a call log

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{ProcessorError, Result};
use crate::ids::{
    CustomerId, IdempotencyKey, InvoiceId, InvoiceItemId, PriceId, SubscriptionId,
    SubscriptionItemId,
};
use crate::model::{
    CollectionMethod, CreateInvoiceItemParams, CreateInvoiceParams, Expandable, Extra, Invoice,
    InvoiceItem, InvoiceLineItem, InvoiceStatus, LineItemKind, Page, PaymentIntent,
    PendingInvoiceItemsBehavior, Price, ProrationBehavior, Subscription, SubscriptionItem,
    UpcomingInvoiceQuery, UpdateSubscriptionParams,
};
use crate::operation::Operation;
use crate::processor::BillingProcessor;

const SECONDS_PER_DAY: i64 = 86_400;

/// Mock billing processor with in-memory state
#[derive(Default)]
pub struct MockProcessor {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    sequence: u64,
    customers: Vec<CustomerId>,
    prices: HashMap<PriceId, Price>,
    subscriptions: BTreeMap<SubscriptionId, SubscriptionRecord>,
    invoices: Vec<InvoiceRecord>,
    items: Vec<InvoiceItem>,
    payment_intents: HashMap<String, PaymentIntent>,
    replays: HashMap<String, Replay>,
    failures: HashMap<Operation, VecDeque<ProcessorError>>,
    calls: Vec<Operation>,
    idempotency_keys: Vec<IdempotencyKey>,
}

struct SubscriptionRecord {
    id: SubscriptionId,
    customer: CustomerId,
    items: Vec<SubscriptionItem>,
    latest_invoice: Option<InvoiceId>,
}

struct InvoiceRecord {
    id: InvoiceId,
    customer: CustomerId,
    subscription: Option<SubscriptionId>,
    status: InvoiceStatus,
    collection_method: CollectionMethod,
    created: i64,
    due_date: Option<i64>,
    amount_paid: i64,
    paid_out_of_band: bool,
    payment_intent: Option<String>,
}

/// First result stored under an idempotency key, with the params that produced it
#[derive(Clone)]
enum Replay {
    InvoiceItem {
        params: CreateInvoiceItemParams,
        item: InvoiceItem,
    },
    Invoice {
        params: CreateInvoiceParams,
        id: InvoiceId,
    },
}

/// Fields a real invoice carries that the typed model does not read
fn invoice_extra(total: i64) -> Extra {
    let mut extra = Extra::new();
    extra.insert("object".into(), "invoice".into());
    extra.insert("total".into(), total.into());
    extra
}

fn not_found(operation: Operation, kind: &str, id: &str) -> ProcessorError {
    ProcessorError::api(
        operation,
        404,
        "resource_missing",
        format!("No such {kind}: '{id}'"),
    )
}

fn invalid(operation: Operation, code: &str, message: impl Into<String>) -> ProcessorError {
    ProcessorError::api(operation, 400, code, message)
}

fn idempotency_mismatch(operation: Operation, key: &IdempotencyKey) -> ProcessorError {
    ProcessorError::api(
        operation,
        400,
        "idempotency_error",
        format!(
            "Keys for idempotent requests can only be used with the same parameters they were \
             first used with. Key '{key}' was reused with different parameters."
        ),
    )
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Seeding
    // ════════════════════════════════════════════════════════════════════════

    /// Register a customer the processor will accept
    pub fn add_customer(&self, id: &str) -> CustomerId {
        let id = CustomerId::from_string(id);
        let mut state = self.state();
        if !state.customers.contains(&id) {
            state.customers.push(id.clone());
        }
        id
    }

    pub fn add_price(&self, id: &str, unit_amount: i64, currency: &str) -> PriceId {
        let price = Price {
            id: PriceId::from_string(id),
            currency: Some(currency.to_string()),
            unit_amount: Some(unit_amount),
            extra: Extra::new(),
        };
        let id = price.id.clone();
        self.state().prices.insert(id.clone(), price);
        id
    }

    /// Create a subscription with `(price, quantity)` items in order.
    /// Unknown customers and prices are registered on the fly.
    pub fn seed_subscription(
        &self,
        customer: &CustomerId,
        items: &[(&PriceId, u64)],
    ) -> Subscription {
        let mut state = self.state();
        if !state.customers.contains(customer) {
            state.customers.push(customer.clone());
        }

        let items = items
            .iter()
            .map(|(price, quantity)| {
                let price = state.prices.get(*price).cloned().unwrap_or(Price {
                    id: (*price).clone(),
                    currency: Some("usd".into()),
                    unit_amount: Some(0),
                    extra: Extra::new(),
                });
                SubscriptionItem {
                    id: SubscriptionItemId::from_string(state.next_id("si")),
                    price,
                    quantity: Some(*quantity),
                    extra: Extra::new(),
                }
            })
            .collect();

        let record = SubscriptionRecord {
            id: SubscriptionId::from_string(state.next_id("sub")),
            customer: customer.clone(),
            items,
            latest_invoice: None,
        };
        let view = state.subscription_view(&record, false);
        state.subscriptions.insert(record.id.clone(), record);
        view
    }

    /// Create a draft invoice holding a single item, optionally tied to a
    /// subscription (it becomes that subscription's latest invoice)
    pub fn seed_invoice(
        &self,
        customer: &CustomerId,
        subscription: Option<&SubscriptionId>,
        amount: i64,
        description: &str,
    ) -> Invoice {
        let mut state = self.state();
        if !state.customers.contains(customer) {
            state.customers.push(customer.clone());
        }

        let invoice_id = InvoiceId::from_string(state.next_id("in"));
        let item_id = InvoiceItemId::from_string(state.next_id("ii"));
        state.items.push(InvoiceItem {
            id: item_id,
            customer: customer.clone(),
            amount,
            currency: "usd".into(),
            description: Some(description.to_string()),
            quantity: 1,
            unit_amount: Some(amount),
            period: None,
            metadata: HashMap::new(),
            proration: false,
            invoice: Some(invoice_id.clone()),
            extra: Extra::new(),
        });

        let record = InvoiceRecord {
            id: invoice_id.clone(),
            customer: customer.clone(),
            subscription: subscription.cloned(),
            status: InvoiceStatus::Draft,
            collection_method: CollectionMethod::ChargeAutomatically,
            created: Utc::now().timestamp(),
            due_date: None,
            amount_paid: 0,
            paid_out_of_band: false,
            payment_intent: None,
        };
        let view = state.invoice_view(&record, false);
        state.invoices.push(record);

        if let Some(sub) = subscription.and_then(|id| state.subscriptions.get_mut(id)) {
            sub.latest_invoice = Some(invoice_id);
        }
        view
    }

    // ════════════════════════════════════════════════════════════════════════
    // Failure injection & inspection
    // ════════════════════════════════════════════════════════════════════════

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: Operation, error: ProcessorError) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Every operation invoked so far, in order
    pub fn calls(&self) -> Vec<Operation> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.state().calls.iter().filter(|op| **op == operation).count()
    }

    /// Idempotency keys received on creation calls, in order
    pub fn idempotency_keys(&self) -> Vec<IdempotencyKey> {
        self.state().idempotency_keys.clone()
    }

    pub fn invoice(&self, id: &InvoiceId) -> Option<Invoice> {
        self.state().render_invoice(id, false)
    }

    pub fn invoices_for(&self, customer: &CustomerId) -> Vec<Invoice> {
        let state = self.state();
        state
            .invoices
            .iter()
            .filter(|inv| &inv.customer == customer)
            .map(|inv| state.invoice_view(inv, false))
            .collect()
    }

    pub fn invoice_item(&self, id: &InvoiceItemId) -> Option<InvoiceItem> {
        self.state().items.iter().find(|item| &item.id == id).cloned()
    }

    pub fn invoice_items_for(&self, customer: &CustomerId) -> Vec<InvoiceItem> {
        self.state()
            .items
            .iter()
            .filter(|item| &item.customer == customer)
            .cloned()
            .collect()
    }

    pub fn subscription(&self, id: &SubscriptionId) -> Option<Subscription> {
        let state = self.state();
        state
            .subscriptions
            .get(id)
            .map(|record| state.subscription_view(record, false))
    }
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}_mock{}", self.sequence)
    }

    /// Log the call and surface any injected failure
    fn begin(&mut self, operation: Operation) -> Result<()> {
        self.calls.push(operation);
        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn require_customer(&self, operation: Operation, customer: &CustomerId) -> Result<()> {
        if self.customers.contains(customer) {
            Ok(())
        } else {
            Err(invalid(
                operation,
                "resource_missing",
                format!("No such customer: '{customer}'"),
            ))
        }
    }

    fn find_invoice(&self, id: &InvoiceId) -> Option<&InvoiceRecord> {
        self.invoices.iter().find(|inv| &inv.id == id)
    }

    fn find_invoice_mut(&mut self, id: &InvoiceId) -> Option<&mut InvoiceRecord> {
        self.invoices.iter_mut().find(|inv| &inv.id == id)
    }

    fn line_for_item(item: &InvoiceItem) -> InvoiceLineItem {
        InvoiceLineItem {
            id: format!("il_{}", item.id),
            kind: LineItemKind::InvoiceItem,
            amount: item.amount,
            currency: item.currency.clone(),
            description: item.description.clone(),
            quantity: Some(item.quantity),
            period: item.period,
            invoice_item: Some(item.id.clone()),
            subscription: None,
            proration: item.proration,
            metadata: item.metadata.clone(),
            extra: Extra::new(),
        }
    }

    fn lines_for(&self, invoice: &InvoiceId) -> Vec<InvoiceLineItem> {
        self.items
            .iter()
            .filter(|item| item.invoice.as_ref() == Some(invoice))
            .map(Self::line_for_item)
            .collect()
    }

    fn render_invoice(&self, id: &InvoiceId, expand_payment_intent: bool) -> Option<Invoice> {
        self.find_invoice(id)
            .map(|record| self.invoice_view(record, expand_payment_intent))
    }

    fn invoice_view(&self, record: &InvoiceRecord, expand_payment_intent: bool) -> Invoice {
        let lines = self.lines_for(&record.id);
        let amount_due: i64 = lines.iter().map(|line| line.amount).sum();
        let currency = lines.first().map(|line| line.currency.clone());

        let payment_intent = record.payment_intent.as_ref().map(|pi| {
            match self.payment_intents.get(pi) {
                Some(intent) if expand_payment_intent => {
                    Expandable::Object(Box::new(intent.clone()))
                }
                _ => Expandable::Id(pi.clone()),
            }
        });

        Invoice {
            id: Some(record.id.clone()),
            customer: record.customer.clone(),
            subscription: record.subscription.clone(),
            status: Some(record.status),
            collection_method: Some(record.collection_method),
            created: Some(record.created),
            due_date: record.due_date,
            currency,
            amount_due,
            amount_paid: record.amount_paid,
            paid: record.status == InvoiceStatus::Paid,
            paid_out_of_band: record.paid_out_of_band,
            lines: Some(Page::new(lines)),
            payment_intent,
            extra: invoice_extra(amount_due),
        }
    }

    fn subscription_view(
        &self,
        record: &SubscriptionRecord,
        expand_latest_invoice: bool,
    ) -> Subscription {
        let latest_invoice = record.latest_invoice.as_ref().map(|inv| {
            match self.render_invoice(inv, false) {
                Some(invoice) if expand_latest_invoice => Expandable::Object(Box::new(invoice)),
                _ => Expandable::Id(inv.to_string()),
            }
        });

        Subscription {
            id: record.id.clone(),
            customer: record.customer.clone(),
            status: Some("active".into()),
            items: Page::new(record.items.clone()),
            latest_invoice,
            collection_method: Some(CollectionMethod::ChargeAutomatically),
            current_period_start: None,
            current_period_end: None,
            extra: Extra::new(),
        }
    }

    fn subscription_total(items: &[SubscriptionItem]) -> i64 {
        items
            .iter()
            .map(|item| {
                let quantity = i64::try_from(item.quantity.unwrap_or(1)).unwrap_or(i64::MAX);
                item.price.unit_amount.unwrap_or(0).saturating_mul(quantity)
            })
            .sum()
    }

    fn upcoming_lines(
        &self,
        operation: Operation,
        query: &UpcomingInvoiceQuery,
    ) -> Result<Vec<InvoiceLineItem>> {
        let mut lines = Vec::new();

        if let Some(sub_id) = &query.subscription {
            let sub = self
                .subscriptions
                .get(sub_id)
                .ok_or_else(|| not_found(operation, "subscription", sub_id.as_str()))?;
            if sub.customer != query.customer {
                return Err(invalid(
                    operation,
                    "invalid_request",
                    format!("Subscription '{sub_id}' does not belong to '{}'", query.customer),
                ));
            }

            lines.extend(sub.items.iter().map(|item| {
                let quantity = item.quantity.unwrap_or(1);
                InvoiceLineItem {
                    id: format!("il_tmp_{}", item.id),
                    kind: LineItemKind::Subscription,
                    amount: item
                        .price
                        .unit_amount
                        .unwrap_or(0)
                        .saturating_mul(i64::try_from(quantity).unwrap_or(i64::MAX)),
                    currency: item.price.currency.clone().unwrap_or_else(|| "usd".into()),
                    description: Some(format!("{quantity} × {}", item.price.id)),
                    quantity: Some(quantity),
                    period: None,
                    invoice_item: None,
                    subscription: Some(sub_id.clone()),
                    proration: false,
                    metadata: HashMap::new(),
                    extra: Extra::new(),
                }
            }));
        }

        lines.extend(
            self.items
                .iter()
                .filter(|item| item.is_pending() && item.customer == query.customer)
                .map(Self::line_for_item),
        );

        if lines.is_empty() {
            return Err(ProcessorError::api(
                operation,
                404,
                "invoice_upcoming_none",
                format!("No upcoming invoices for customer: '{}'", query.customer),
            ));
        }
        Ok(lines)
    }

    fn finalize(&mut self, operation: Operation, id: &InvoiceId) -> Result<()> {
        let amount_due: i64 = self.lines_for(id).iter().map(|line| line.amount).sum();
        let intent_id = (amount_due > 0).then(|| self.next_id("pi"));

        let record = self
            .find_invoice_mut(id)
            .ok_or_else(|| not_found(operation, "invoice", id.as_str()))?;
        if record.status != InvoiceStatus::Draft {
            return Err(invalid(
                operation,
                "invoice_not_editable",
                format!(
                    "This invoice is already finalized; status is {}",
                    record.status.as_str()
                ),
            ));
        }
        record.status = InvoiceStatus::Open;
        record.payment_intent = intent_id.clone();

        if let Some(intent_id) = intent_id {
            self.payment_intents.insert(
                intent_id.clone(),
                PaymentIntent {
                    id: intent_id,
                    status: Some("requires_payment_method".into()),
                    amount: amount_due,
                    extra: Extra::new(),
                },
            );
        }
        Ok(())
    }

    fn insert_invoice(
        &mut self,
        customer: &CustomerId,
        subscription: Option<SubscriptionId>,
        collection_method: CollectionMethod,
        days_until_due: Option<u32>,
        sweep_pending: bool,
    ) -> InvoiceId {
        let id = InvoiceId::from_string(self.next_id("in"));
        let created = Utc::now().timestamp();

        if sweep_pending {
            for item in self
                .items
                .iter_mut()
                .filter(|item| item.is_pending() && &item.customer == customer)
            {
                item.invoice = Some(id.clone());
            }
        }

        self.invoices.push(InvoiceRecord {
            id: id.clone(),
            customer: customer.clone(),
            subscription,
            status: InvoiceStatus::Draft,
            collection_method,
            created,
            due_date: days_until_due.map(|days| created + i64::from(days) * SECONDS_PER_DAY),
            amount_paid: 0,
            paid_out_of_band: false,
            payment_intent: None,
        });
        id
    }
}

#[async_trait]
impl BillingProcessor for MockProcessor {
    async fn retrieve_upcoming_invoice(&self, query: &UpcomingInvoiceQuery) -> Result<Invoice> {
        let operation = Operation::RetrieveUpcomingInvoice;
        let mut state = self.state();
        state.begin(operation)?;

        let lines = state.upcoming_lines(operation, query)?;
        let amount_due = lines.iter().map(|line| line.amount).sum();
        let currency = lines.first().map(|line| line.currency.clone());

        Ok(Invoice {
            id: None,
            customer: query.customer.clone(),
            subscription: query.subscription.clone(),
            status: Some(InvoiceStatus::Draft),
            collection_method: Some(CollectionMethod::ChargeAutomatically),
            created: Some(Utc::now().timestamp()),
            due_date: None,
            currency,
            amount_due,
            amount_paid: 0,
            paid: false,
            paid_out_of_band: false,
            lines: Some(Page::new(lines)),
            payment_intent: None,
            extra: invoice_extra(amount_due),
        })
    }

    async fn list_upcoming_invoice_lines(
        &self,
        query: &UpcomingInvoiceQuery,
    ) -> Result<Page<InvoiceLineItem>> {
        let operation = Operation::ListUpcomingInvoiceLines;
        let mut state = self.state();
        state.begin(operation)?;
        state.upcoming_lines(operation, query).map(Page::new)
    }

    async fn pay_invoice_out_of_band(&self, invoice: &InvoiceId) -> Result<Invoice> {
        let operation = Operation::PayInvoice;
        let mut state = self.state();
        state.begin(operation)?;

        let status = state
            .find_invoice(invoice)
            .map(|record| record.status)
            .ok_or_else(|| not_found(operation, "invoice", invoice.as_str()))?;

        match status {
            InvoiceStatus::Draft => state.finalize(operation, invoice)?,
            InvoiceStatus::Open | InvoiceStatus::Uncollectible => {}
            InvoiceStatus::Paid => {
                return Err(invalid(operation, "invoice_already_paid", "Invoice is already paid"));
            }
            InvoiceStatus::Void | InvoiceStatus::Unknown => {
                return Err(invalid(
                    operation,
                    "invoice_not_payable",
                    format!("Invoice with status {} cannot be paid", status.as_str()),
                ));
            }
        }

        let amount_due: i64 = state.lines_for(invoice).iter().map(|line| line.amount).sum();
        if let Some(record) = state.find_invoice_mut(invoice) {
            record.status = InvoiceStatus::Paid;
            record.paid_out_of_band = true;
            record.amount_paid = amount_due;
        }
        state
            .render_invoice(invoice, false)
            .ok_or_else(|| not_found(operation, "invoice", invoice.as_str()))
    }

    async fn retrieve_subscription(
        &self,
        subscription: &SubscriptionId,
        expand_latest_invoice: bool,
    ) -> Result<Subscription> {
        let operation = Operation::RetrieveSubscription;
        let mut state = self.state();
        state.begin(operation)?;

        state
            .subscriptions
            .get(subscription)
            .map(|record| state.subscription_view(record, expand_latest_invoice))
            .ok_or_else(|| not_found(operation, "subscription", subscription.as_str()))
    }

    async fn list_open_invoices(&self, subscription: &SubscriptionId) -> Result<Page<Invoice>> {
        let mut state = self.state();
        state.begin(Operation::ListOpenInvoices)?;

        let open: Vec<Invoice> = state
            .invoices
            .iter()
            .filter(|inv| {
                inv.status == InvoiceStatus::Open && inv.subscription.as_ref() == Some(subscription)
            })
            .map(|inv| state.invoice_view(inv, true))
            .collect();
        Ok(Page::new(open))
    }

    async fn retrieve_invoice_item(&self, item: &InvoiceItemId) -> Result<InvoiceItem> {
        let operation = Operation::RetrieveInvoiceItem;
        let mut state = self.state();
        state.begin(operation)?;

        state
            .items
            .iter()
            .find(|candidate| &candidate.id == item)
            .cloned()
            .ok_or_else(|| not_found(operation, "invoiceitem", item.as_str()))
    }

    async fn update_invoice_item(
        &self,
        item: &InvoiceItemId,
        quantity: u64,
    ) -> Result<InvoiceItem> {
        let operation = Operation::UpdateInvoiceItem;
        let mut state = self.state();
        state.begin(operation)?;

        let attached_to = state
            .items
            .iter()
            .find(|candidate| &candidate.id == item)
            .ok_or_else(|| not_found(operation, "invoiceitem", item.as_str()))?
            .invoice
            .clone();

        if let Some(invoice) = attached_to {
            let status = state.find_invoice(&invoice).map(|record| record.status);
            if status != Some(InvoiceStatus::Draft) {
                return Err(invalid(
                    operation,
                    "invoice_not_editable",
                    format!("Invoice item '{item}' belongs to finalized invoice '{invoice}'"),
                ));
            }
        }

        let Some(stored) = state.items.iter_mut().find(|candidate| &candidate.id == item) else {
            return Err(not_found(operation, "invoiceitem", item.as_str()));
        };
        let unit_amount = stored.unit_amount.unwrap_or(stored.amount);
        stored.quantity = quantity;
        stored.amount = unit_amount.saturating_mul(i64::try_from(quantity).unwrap_or(i64::MAX));
        Ok(stored.clone())
    }

    async fn list_invoice_lines(&self, invoice: &InvoiceId) -> Result<Page<InvoiceLineItem>> {
        let operation = Operation::ListInvoiceLines;
        let mut state = self.state();
        state.begin(operation)?;

        if state.find_invoice(invoice).is_none() {
            return Err(not_found(operation, "invoice", invoice.as_str()));
        }
        Ok(Page::new(state.lines_for(invoice)))
    }

    async fn update_subscription(
        &self,
        subscription: &SubscriptionId,
        params: &UpdateSubscriptionParams,
    ) -> Result<Subscription> {
        let operation = Operation::UpdateSubscription;
        let mut state = self.state();
        state.begin(operation)?;

        let (customer, mut items) = match state.subscriptions.get(subscription) {
            Some(record) => (record.customer.clone(), record.items.clone()),
            None => return Err(not_found(operation, "subscription", subscription.as_str())),
        };
        let before = MockState::subscription_total(&items);

        for update in &params.items {
            let Some(position) = items.iter().position(|item| item.id == update.id) else {
                return Err(invalid(
                    operation,
                    "resource_missing",
                    format!("No such subscription item: '{}'", update.id),
                ));
            };
            if let Some(price_id) = &update.price {
                let price = state.prices.get(price_id).cloned().ok_or_else(|| {
                    invalid(
                        operation,
                        "resource_missing",
                        format!("No such price: '{price_id}'"),
                    )
                })?;
                items[position].price = price;
            }
            if let Some(quantity) = update.quantity {
                items[position].quantity = Some(quantity);
            }
        }

        let delta = MockState::subscription_total(&items) - before;
        if params.proration_behavior != ProrationBehavior::None && delta != 0 {
            let id = InvoiceItemId::from_string(state.next_id("ii"));
            state.items.push(InvoiceItem {
                id,
                customer: customer.clone(),
                amount: delta,
                currency: "usd".into(),
                description: Some("Proration adjustment".into()),
                quantity: 1,
                unit_amount: Some(delta),
                period: None,
                metadata: HashMap::new(),
                proration: true,
                invoice: None,
                extra: Extra::new(),
            });

            if params.proration_behavior == ProrationBehavior::AlwaysInvoice {
                let invoice = state.insert_invoice(
                    &customer,
                    Some(subscription.clone()),
                    CollectionMethod::ChargeAutomatically,
                    None,
                    true,
                );
                state.finalize(operation, &invoice)?;
                if let Some(record) = state.subscriptions.get_mut(subscription) {
                    record.latest_invoice = Some(invoice);
                }
            }
        }

        let Some(record) = state.subscriptions.get_mut(subscription) else {
            return Err(not_found(operation, "subscription", subscription.as_str()));
        };
        record.items = items;
        state
            .subscriptions
            .get(subscription)
            .map(|record| state.subscription_view(record, false))
            .ok_or_else(|| not_found(operation, "subscription", subscription.as_str()))
    }

    async fn finalize_invoice(&self, invoice: &InvoiceId) -> Result<Invoice> {
        let operation = Operation::FinalizeInvoice;
        let mut state = self.state();
        state.begin(operation)?;

        state.finalize(operation, invoice)?;
        state
            .render_invoice(invoice, false)
            .ok_or_else(|| not_found(operation, "invoice", invoice.as_str()))
    }

    async fn create_invoice_item(
        &self,
        params: &CreateInvoiceItemParams,
        idempotency_key: &IdempotencyKey,
    ) -> Result<InvoiceItem> {
        let operation = Operation::CreateInvoiceItem;
        let mut state = self.state();
        state.begin(operation)?;
        state.idempotency_keys.push(idempotency_key.clone());

        match state.replays.get(idempotency_key.as_str()) {
            Some(Replay::InvoiceItem { params: first, item }) if first == params => {
                return Ok(item.clone());
            }
            Some(_) => return Err(idempotency_mismatch(operation, idempotency_key)),
            None => {}
        }

        state.require_customer(operation, &params.customer)?;
        if params.currency.trim().is_empty() {
            return Err(invalid(operation, "parameter_missing", "Missing required param: currency."));
        }

        let item = InvoiceItem {
            id: InvoiceItemId::from_string(state.next_id("ii")),
            customer: params.customer.clone(),
            amount: params.amount,
            currency: params.currency.to_lowercase(),
            description: params.description.clone(),
            quantity: 1,
            unit_amount: Some(params.amount),
            period: params.period,
            metadata: params.metadata.clone().unwrap_or_default(),
            proration: false,
            invoice: None,
            extra: Extra::new(),
        };
        state.items.push(item.clone());
        state.replays.insert(
            idempotency_key.to_string(),
            Replay::InvoiceItem {
                params: params.clone(),
                item: item.clone(),
            },
        );
        Ok(item)
    }

    async fn create_invoice(
        &self,
        params: &CreateInvoiceParams,
        idempotency_key: &IdempotencyKey,
    ) -> Result<Invoice> {
        let operation = Operation::CreateInvoice;
        let mut state = self.state();
        state.begin(operation)?;
        state.idempotency_keys.push(idempotency_key.clone());

        match state.replays.get(idempotency_key.as_str()).cloned() {
            Some(Replay::Invoice { params: first, id }) if &first == params => {
                return state
                    .render_invoice(&id, false)
                    .ok_or_else(|| not_found(operation, "invoice", id.as_str()));
            }
            Some(_) => return Err(idempotency_mismatch(operation, idempotency_key)),
            None => {}
        }

        state.require_customer(operation, &params.customer)?;
        if params.collection_method == CollectionMethod::SendInvoice
            && params.days_until_due.is_none()
        {
            return Err(invalid(
                operation,
                "parameter_missing",
                "Missing required param: days_until_due.",
            ));
        }

        let sweep = params.pending_invoice_items_behavior
            == Some(PendingInvoiceItemsBehavior::Include);
        if sweep
            && !state
                .items
                .iter()
                .any(|item| item.is_pending() && item.customer == params.customer)
        {
            return Err(invalid(
                operation,
                "invoice_no_customer_line_items",
                format!("Nothing to invoice for customer: '{}'", params.customer),
            ));
        }

        let id = state.insert_invoice(
            &params.customer,
            None,
            params.collection_method,
            params.days_until_due,
            sweep,
        );
        state.replays.insert(
            idempotency_key.to_string(),
            Replay::Invoice {
                params: params.clone(),
                id: id.clone(),
            },
        );
        state
            .render_invoice(&id, false)
            .ok_or_else(|| not_found(operation, "invoice", id.as_str()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_params(customer: &CustomerId, amount: i64) -> CreateInvoiceItemParams {
        CreateInvoiceItemParams {
            customer: customer.clone(),
            amount,
            currency: "usd".into(),
            description: Some("fee".into()),
            period: None,
            metadata: None,
        }
    }

    fn send_invoice(customer: &CustomerId) -> CreateInvoiceParams {
        CreateInvoiceParams {
            customer: customer.clone(),
            collection_method: CollectionMethod::SendInvoice,
            days_until_due: Some(1),
            pending_invoice_items_behavior: Some(PendingInvoiceItemsBehavior::Include),
        }
    }

    #[tokio::test]
    async fn test_pending_items_swept_into_new_invoice() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");

        let item = mock
            .create_invoice_item(&item_params(&customer, 500), &IdempotencyKey::generate())
            .await
            .unwrap();
        assert!(item.is_pending());

        let invoice = mock
            .create_invoice(&send_invoice(&customer), &IdempotencyKey::generate())
            .await
            .unwrap();
        let invoice_id = invoice.id.clone().unwrap();

        assert_eq!(invoice.amount_due, 500);
        assert_eq!(mock.invoice_item(&item.id).unwrap().invoice, Some(invoice_id));
    }

    #[tokio::test]
    async fn test_excluded_pending_items_stay_pending() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        let item = mock
            .create_invoice_item(&item_params(&customer, 500), &IdempotencyKey::generate())
            .await
            .unwrap();

        let mut params = send_invoice(&customer);
        params.pending_invoice_items_behavior = Some(PendingInvoiceItemsBehavior::Exclude);
        let invoice = mock
            .create_invoice(&params, &IdempotencyKey::generate())
            .await
            .unwrap();

        assert_eq!(invoice.amount_due, 0);
        assert!(mock.invoice_item(&item.id).unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_idempotent_replay_does_not_duplicate() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        let key = IdempotencyKey::from_string("retry-me");

        let first = mock
            .create_invoice_item(&item_params(&customer, 500), &key)
            .await
            .unwrap();
        let second = mock
            .create_invoice_item(&item_params(&customer, 500), &key)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(mock.invoice_items_for(&customer).len(), 1);
    }

    #[tokio::test]
    async fn test_reused_key_with_different_params_rejected() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        let key = IdempotencyKey::from_string("order-42");

        mock.create_invoice_item(&item_params(&customer, 500), &key)
            .await
            .unwrap();
        let err = mock
            .create_invoice_item(&item_params(&customer, 900), &key)
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("idempotency_error"));
        assert_eq!(err.http_status(), Some(400));
        assert_eq!(mock.invoice_items_for(&customer).len(), 1);
        assert_eq!(mock.invoice_items_for(&customer)[0].amount, 500);
    }

    #[tokio::test]
    async fn test_key_reused_across_endpoints_rejected() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        let key = IdempotencyKey::from_string("shared");

        mock.create_invoice_item(&item_params(&customer, 500), &key)
            .await
            .unwrap();
        let err = mock
            .create_invoice(&send_invoice(&customer), &key)
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("idempotency_error"));
        assert!(mock.invoices_for(&customer).is_empty());
    }

    #[tokio::test]
    async fn test_invoice_replay_requires_same_params() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        mock.create_invoice_item(&item_params(&customer, 500), &IdempotencyKey::generate())
            .await
            .unwrap();

        let key = IdempotencyKey::from_string("invoice-once");
        let first = mock.create_invoice(&send_invoice(&customer), &key).await.unwrap();
        let replayed = mock.create_invoice(&send_invoice(&customer), &key).await.unwrap();
        assert_eq!(first.id, replayed.id);

        let mut changed = send_invoice(&customer);
        changed.days_until_due = Some(30);
        let err = mock.create_invoice(&changed, &key).await.unwrap_err();
        assert_eq!(err.code(), Some("idempotency_error"));
        assert_eq!(mock.invoices_for(&customer).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_customer_rejected() {
        let mock = MockProcessor::new();
        let err = mock
            .create_invoice_item(
                &item_params(&CustomerId::from_string("cus_ghost"), 100),
                &IdempotencyKey::generate(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("resource_missing"));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        let sub = mock.seed_subscription(&customer, &[]);

        mock.fail_next(
            Operation::RetrieveSubscription,
            ProcessorError::transport(Operation::RetrieveSubscription, "connection reset"),
        );

        assert!(mock.retrieve_subscription(&sub.id, false).await.unwrap_err().is_transport());
        assert!(mock.retrieve_subscription(&sub.id, false).await.is_ok());
        assert_eq!(mock.call_count(Operation::RetrieveSubscription), 2);
    }

    #[tokio::test]
    async fn test_invoice_lifecycle() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        let invoice = mock.seed_invoice(&customer, None, 700, "setup");
        let id = invoice.id.unwrap();

        let open = mock.finalize_invoice(&id).await.unwrap();
        assert!(open.is_status(InvoiceStatus::Open));
        assert!(open.payment_intent.is_some());

        let err = mock.finalize_invoice(&id).await.unwrap_err();
        assert_eq!(err.code(), Some("invoice_not_editable"));

        let paid = mock.pay_invoice_out_of_band(&id).await.unwrap();
        assert!(paid.paid && paid.paid_out_of_band);
        assert_eq!(paid.amount_paid, 700);

        let err = mock.pay_invoice_out_of_band(&id).await.unwrap_err();
        assert_eq!(err.code(), Some("invoice_already_paid"));
    }

    #[tokio::test]
    async fn test_proration_creates_pending_item() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        let price = mock.add_price("price_seat", 1000, "usd");
        let sub = mock.seed_subscription(&customer, &[(&price, 1)]);

        let params = UpdateSubscriptionParams {
            items: vec![crate::model::SubscriptionItemUpdate {
                id: sub.first_item().unwrap().id.clone(),
                price: None,
                quantity: Some(2),
            }],
            proration_behavior: ProrationBehavior::CreateProrations,
        };
        mock.update_subscription(&sub.id, &params).await.unwrap();

        let pending: Vec<_> = mock
            .invoice_items_for(&customer)
            .into_iter()
            .filter(|item| item.proration)
            .collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].amount, 1000);
    }

    #[tokio::test]
    async fn test_open_invoices_expand_payment_intent() {
        let mock = MockProcessor::new();
        let customer = mock.add_customer("cus_1");
        let sub = mock.seed_subscription(&customer, &[]);
        let invoice = mock.seed_invoice(&customer, Some(&sub.id), 1500, "monthly");
        mock.finalize_invoice(invoice.id.as_ref().unwrap()).await.unwrap();

        let open = mock.list_open_invoices(&sub.id).await.unwrap();
        assert_eq!(open.len(), 1);
        assert!(open.data[0].payment_intent.as_ref().unwrap().is_expanded());
    }
}

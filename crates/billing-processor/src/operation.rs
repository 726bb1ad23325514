//! Processor operation names, used for error context, logging and
//! failure injection in the simulator.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RetrieveUpcomingInvoice,
    ListUpcomingInvoiceLines,
    PayInvoice,
    RetrieveSubscription,
    ListOpenInvoices,
    RetrieveInvoiceItem,
    UpdateInvoiceItem,
    ListInvoiceLines,
    UpdateSubscription,
    FinalizeInvoice,
    CreateInvoiceItem,
    CreateInvoice,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::RetrieveUpcomingInvoice => "retrieve_upcoming_invoice",
            Operation::ListUpcomingInvoiceLines => "list_upcoming_invoice_lines",
            Operation::PayInvoice => "pay_invoice",
            Operation::RetrieveSubscription => "retrieve_subscription",
            Operation::ListOpenInvoices => "list_open_invoices",
            Operation::RetrieveInvoiceItem => "retrieve_invoice_item",
            Operation::UpdateInvoiceItem => "update_invoice_item",
            Operation::ListInvoiceLines => "list_invoice_lines",
            Operation::UpdateSubscription => "update_subscription",
            Operation::FinalizeInvoice => "finalize_invoice",
            Operation::CreateInvoiceItem => "create_invoice_item",
            Operation::CreateInvoice => "create_invoice",
        }
    }

    /// Whether the call changes processor state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::PayInvoice
                | Operation::UpdateInvoiceItem
                | Operation::UpdateSubscription
                | Operation::FinalizeInvoice
                | Operation::CreateInvoiceItem
                | Operation::CreateInvoice
        )
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

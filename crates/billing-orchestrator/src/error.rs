//! Error Types

use billing_processor::{MissingIdentifier, Operation, ProcessorError, SubscriptionId};
use serde::Serialize;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, BillingError>;

/// A remote side effect that already happened when a later step failed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletedStep {
    pub operation: Operation,
    pub resource_id: String,
}

impl std::fmt::Display for CompletedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.operation, self.resource_id)
    }
}

fn describe_steps(steps: &[CompletedStep]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Caller-facing error classification
#[derive(Error, Debug)]
pub enum BillingError {
    /// A single processor call failed; surfaced as the processor reported it
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    /// A later step failed after an earlier one changed remote state
    #[error(
        "{operation} failed at {failed_step} after completing [{}]: {source}",
        describe_steps(.completed_steps)
    )]
    CompositeOperation {
        operation: &'static str,
        failed_step: Operation,
        completed_steps: Vec<CompletedStep>,
        #[source]
        source: ProcessorError,
    },

    /// Missing or empty required parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Subscription update found no item to act on
    #[error("Subscription {0} has no items")]
    EmptySubscription(SubscriptionId),
}

/// Coarse error category, stable across processor codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Processor,
    Transport,
    Encoding,
    Decode,
    CompositeOperation,
    InvalidRequest,
    EmptySubscription,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Processor => "processor",
            ErrorKind::Transport => "transport",
            ErrorKind::Encoding => "encoding",
            ErrorKind::Decode => "decode",
            ErrorKind::CompositeOperation => "composite_operation",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::EmptySubscription => "empty_subscription",
        }
    }
}

impl BillingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BillingError::Processor(ProcessorError::Api { .. }) => ErrorKind::Processor,
            BillingError::Processor(ProcessorError::Transport { .. }) => ErrorKind::Transport,
            BillingError::Processor(ProcessorError::Encoding { .. }) => ErrorKind::Encoding,
            BillingError::Processor(ProcessorError::Decode { .. }) => ErrorKind::Decode,
            BillingError::CompositeOperation { .. } => ErrorKind::CompositeOperation,
            BillingError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            BillingError::EmptySubscription(_) => ErrorKind::EmptySubscription,
        }
    }

    /// Processor-assigned code, when the processor answered
    pub fn processor_code(&self) -> Option<&str> {
        match self {
            BillingError::Processor(err) | BillingError::CompositeOperation { source: err, .. } => {
                err.code()
            }
            _ => None,
        }
    }

    /// Underlying processor failure, if any
    pub fn processor_error(&self) -> Option<&ProcessorError> {
        match self {
            BillingError::Processor(err) | BillingError::CompositeOperation { source: err, .. } => {
                Some(err)
            }
            _ => None,
        }
    }

    /// Side effects left in place by a failed composite operation
    pub fn completed_steps(&self) -> &[CompletedStep] {
        match self {
            BillingError::CompositeOperation {
                completed_steps, ..
            } => completed_steps,
            _ => &[],
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            BillingError::Processor(ProcessorError::Api { message, .. }) => {
                format!("The billing processor rejected the request: {message}")
            }
            BillingError::Processor(ProcessorError::Transport { .. }) => {
                "The billing processor is unreachable. Please try again.".into()
            }
            BillingError::Processor(ProcessorError::Encoding { .. }) => {
                "The request could not be sent to the billing processor.".into()
            }
            BillingError::Processor(ProcessorError::Decode { .. }) => {
                "The billing processor's answer could not be read. The change may have been \
                 applied; check before retrying."
                    .into()
            }
            BillingError::CompositeOperation {
                completed_steps, ..
            } => format!(
                "The operation only partially completed. Already created: {}",
                describe_steps(completed_steps)
            ),
            BillingError::InvalidRequest(msg) => format!("Invalid request: {msg}"),
            BillingError::EmptySubscription(id) => {
                format!("Subscription '{id}' has no items to update.")
            }
        }
    }
}

impl From<MissingIdentifier> for BillingError {
    fn from(err: MissingIdentifier) -> Self {
        BillingError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_processor_variant() {
        let api: BillingError =
            ProcessorError::api(Operation::PayInvoice, 400, "invoice_already_paid", "paid").into();
        assert_eq!(api.kind(), ErrorKind::Processor);
        assert_eq!(api.processor_code(), Some("invoice_already_paid"));

        let transport: BillingError =
            ProcessorError::transport(Operation::PayInvoice, "timeout").into();
        assert_eq!(transport.kind(), ErrorKind::Transport);
        assert_eq!(transport.processor_code(), None);
    }

    #[test]
    fn test_unreadable_answer_is_not_an_encoding_failure() {
        let err: BillingError = ProcessorError::Decode {
            operation: Operation::CreateInvoiceItem,
            message: "customer: invalid type: null".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.user_message().contains("may have been applied"));
        assert_eq!(err.processor_code(), None);
    }

    #[test]
    fn test_composite_names_orphan() {
        let err = BillingError::CompositeOperation {
            operation: "create_manual_invoice",
            failed_step: Operation::CreateInvoice,
            completed_steps: vec![CompletedStep {
                operation: Operation::CreateInvoiceItem,
                resource_id: "ii_123".into(),
            }],
            source: ProcessorError::api(Operation::CreateInvoice, 500, "api_error", "boom"),
        };

        assert_eq!(err.kind(), ErrorKind::CompositeOperation);
        assert_eq!(err.processor_code(), Some("api_error"));
        assert!(err.to_string().contains("ii_123"));
        assert!(err.user_message().contains("ii_123"));
    }

    #[test]
    fn test_missing_identifier_is_invalid_request() {
        let err: BillingError = MissingIdentifier("invoice").into();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.to_string(), "Invalid request: Missing invoice identifier");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(ErrorKind::CompositeOperation.as_str(), "composite_operation");
    }
}

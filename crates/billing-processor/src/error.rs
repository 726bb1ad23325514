//! Processor Error Types

use thiserror::Error;

use crate::operation::Operation;

/// Result type alias
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Failures of a single processor call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    /// The processor answered and rejected the call
    #[error("Processor error [{code}] during {operation}: {message}")]
    Api {
        operation: Operation,
        code: String,
        message: String,
        http_status: u16,
    },

    /// The call never completed (network, timeout, connection reset)
    #[error("Transport error during {operation}: {message}")]
    Transport { operation: Operation, message: String },

    /// The request could not be encoded, so it was never sent
    #[error("Encoding error during {operation}: {message}")]
    Encoding { operation: Operation, message: String },

    /// The processor answered but the response was unreadable; the call
    /// may have taken effect
    #[error("Unreadable processor response during {operation}: {message}")]
    Decode { operation: Operation, message: String },
}

impl ProcessorError {
    /// Shorthand for a processor rejection
    pub fn api(
        operation: Operation,
        http_status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ProcessorError::Api {
            operation,
            code: code.into(),
            message: message.into(),
            http_status,
        }
    }

    pub fn transport(operation: Operation, message: impl Into<String>) -> Self {
        ProcessorError::Transport {
            operation,
            message: message.into(),
        }
    }

    /// Operation that failed
    pub fn operation(&self) -> Operation {
        match self {
            ProcessorError::Api { operation, .. }
            | ProcessorError::Transport { operation, .. }
            | ProcessorError::Encoding { operation, .. }
            | ProcessorError::Decode { operation, .. } => *operation,
        }
    }

    /// Processor-assigned error code, if the processor answered
    pub fn code(&self) -> Option<&str> {
        match self {
            ProcessorError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// HTTP status the processor answered with
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProcessorError::Api { http_status, .. } => Some(*http_status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ProcessorError::Transport { .. })
    }

    /// Whether the processor may have applied the call despite the error
    pub fn outcome_unknown(&self) -> bool {
        matches!(
            self,
            ProcessorError::Transport { .. } | ProcessorError::Decode { .. }
        )
    }
}

/// A required identifier was blank or absent
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Missing {0} identifier")]
pub struct MissingIdentifier(pub &'static str);

/// Processor configuration could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Unknown billing environment: {0}")]
    UnknownEnvironment(String),

    #[error("API key does not belong to the {0} environment")]
    KeyEnvironmentMismatch(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_accessors() {
        let err = ProcessorError::api(
            Operation::FinalizeInvoice,
            400,
            "invoice_not_editable",
            "This invoice is not a draft",
        );
        assert_eq!(err.code(), Some("invoice_not_editable"));
        assert_eq!(err.http_status(), Some(400));
        assert_eq!(err.operation(), Operation::FinalizeInvoice);
        assert!(!err.is_transport());
        assert!(err.to_string().contains("finalize_invoice"));
    }

    #[test]
    fn test_transport_has_no_code() {
        let err = ProcessorError::transport(Operation::CreateInvoice, "connection reset");
        assert!(err.is_transport());
        assert_eq!(err.code(), None);
    }

    #[test]
    fn test_decode_outcome_is_unknown() {
        let err = ProcessorError::Decode {
            operation: Operation::CreateInvoiceItem,
            message: "missing field `customer`".into(),
        };
        assert!(err.outcome_unknown());
        assert!(!err.is_transport());
        assert_eq!(err.code(), None);
        assert_eq!(err.operation(), Operation::CreateInvoiceItem);

        let encoding = ProcessorError::Encoding {
            operation: Operation::CreateInvoiceItem,
            message: "unsupported value".into(),
        };
        assert!(!encoding.outcome_unknown());
        assert!(!ProcessorError::api(Operation::PayInvoice, 400, "x", "y").outcome_unknown());
    }
}

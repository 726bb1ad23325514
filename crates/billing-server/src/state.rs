//! Application State

use std::sync::Arc;

use billing_orchestrator::BillingOrchestrator;
use billing_processor::Environment;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator over the process-wide processor connection
    pub billing: Arc<BillingOrchestrator>,

    /// Billing environment the processor credential belongs to
    pub environment: Environment,
}

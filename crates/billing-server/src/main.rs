//! billing-server
//!
//! Axum request translator in front of the billing orchestrator. Every
//! route is a JSON POST that maps onto exactly one orchestrator operation.

mod config;
mod extract;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use billing_orchestrator::BillingOrchestrator;
use billing_processor::{BillingProcessor, MockProcessor, ProcessorConfig, StripeProcessor};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ProcessorKind, ServerConfig};
use crate::routes::{BILLING_ROUTES, router};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // One processor connection for the whole process
    let processor: Arc<dyn BillingProcessor> = match config.processor {
        ProcessorKind::Stripe => {
            let processor_config = ProcessorConfig::from_env()?;
            tracing::info!(environment = %processor_config.environment, "✓ Stripe configured");
            Arc::new(StripeProcessor::new(&processor_config))
        }
        ProcessorKind::Mock => {
            tracing::warn!("⚠ Using in-memory mock processor - nothing reaches Stripe");
            Arc::new(MockProcessor::new())
        }
    };

    let mut billing = BillingOrchestrator::new(processor);
    if config.serialize_subscription_updates {
        billing = billing.with_subscription_locking();
        tracing::info!("Subscription updates serialized per subscription");
    }

    let state = AppState {
        billing: Arc::new(billing),
        environment: config.environment,
    };

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("billing-server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health");
    for route in BILLING_ROUTES {
        tracing::info!("  POST {}", route);
    }

    axum::serve(listener, app).await?;

    Ok(())
}

//! HTTP Handlers
//!
//! Each route extracts its JSON body through `ApiJson`, calls one
//! orchestrator operation and serializes the result. Failures are classified
//! into a status code and an `ErrorResponse`; no billing logic lives here.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use billing_orchestrator::{
    BillingError, CompletedStep, ErrorKind, IdRequest, InvoiceRequest, ManualInvoiceRequest,
    SubscriptionRequest, UpcomingInvoiceRequest, UpdateInvoiceItemRequest,
    UpdateSubscriptionRequest,
};
use billing_processor::{Invoice, InvoiceItem, InvoiceLineItem, Page, ProcessorError, Subscription};
use serde::Serialize;

use crate::extract::ApiJson;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub processor: String,
    pub environment: &'static str,
    pub serialize_subscription_updates: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub kind: ErrorKind,

    /// Processor error code, when the processor answered
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_steps: Option<Vec<CompletedStep>>,
}

type HandlerResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Error Mapping
// ============================================================================

/// HTTP status for a classified billing error
pub fn status_for(err: &BillingError) -> StatusCode {
    match err {
        BillingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        BillingError::EmptySubscription(_) => StatusCode::CONFLICT,
        BillingError::CompositeOperation { .. } => StatusCode::BAD_GATEWAY,
        BillingError::Processor(ProcessorError::Transport { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        BillingError::Processor(ProcessorError::Encoding { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        BillingError::Processor(ProcessorError::Decode { .. }) => StatusCode::BAD_GATEWAY,
        BillingError::Processor(ProcessorError::Api { http_status, .. }) => match *http_status {
            402 | 404 | 409 | 429 => {
                StatusCode::from_u16(*http_status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            400..=499 => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_GATEWAY,
        },
    }
}

pub(crate) fn error_response(
    operation: &'static str,
    err: &BillingError,
) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(operation, status = status.as_u16(), error = %err, "Request failed");
    } else {
        tracing::debug!(operation, status = status.as_u16(), error = %err, "Request rejected");
    }

    let completed_steps = match err.completed_steps() {
        [] => None,
        steps => Some(steps.to_vec()),
    };

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.kind().as_str().to_uppercase(),
            kind: err.kind(),
            detail: err.processor_code().map(str::to_string),
            completed_steps,
        }),
    )
}

fn respond<T>(operation: &'static str, result: billing_orchestrator::Result<T>) -> HandlerResult<T> {
    result
        .map(Json)
        .map_err(|err| error_response(operation, &err))
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
pub struct Hello {
    pub hello: &'static str,
}

pub async fn root() -> Json<Hello> {
    Json(Hello { hello: "world" })
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        processor: state.billing.processor_name().to_string(),
        environment: state.environment.as_str(),
        serialize_subscription_updates: state.billing.serializes_subscription_updates(),
    })
}

pub async fn get_upcoming_invoice(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpcomingInvoiceRequest>,
) -> HandlerResult<Invoice> {
    respond(
        "get_upcoming_invoice",
        state.billing.preview_upcoming_invoice(&payload).await,
    )
}

pub async fn get_upcoming_invoice_lines(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpcomingInvoiceRequest>,
) -> HandlerResult<Page<InvoiceLineItem>> {
    respond(
        "get_upcoming_invoice_lines",
        state.billing.preview_upcoming_invoice_lines(&payload).await,
    )
}

pub async fn pay_invoice(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<InvoiceRequest>,
) -> HandlerResult<Invoice> {
    respond("pay_invoice", state.billing.mark_invoice_paid(&payload).await)
}

pub async fn get_subscription(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SubscriptionRequest>,
) -> HandlerResult<Subscription> {
    respond(
        "get_subscription",
        state.billing.inspect_subscription(&payload).await,
    )
}

pub async fn get_invoices(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SubscriptionRequest>,
) -> HandlerResult<Page<Invoice>> {
    respond("get_invoices", state.billing.list_open_invoices(&payload).await)
}

pub async fn get_invoice_item(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<IdRequest>,
) -> HandlerResult<InvoiceItem> {
    respond(
        "get_invoice_item",
        state.billing.inspect_invoice_item(&payload).await,
    )
}

pub async fn get_invoice_line_items(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<IdRequest>,
) -> HandlerResult<Page<InvoiceLineItem>> {
    respond(
        "get_invoice_line_items",
        state.billing.list_invoice_lines(&payload).await,
    )
}

pub async fn update_subscription(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateSubscriptionRequest>,
) -> HandlerResult<Subscription> {
    respond(
        "update_subscription",
        state.billing.update_subscription(&payload).await,
    )
}

pub async fn update_invoice_item(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateInvoiceItemRequest>,
) -> HandlerResult<InvoiceItem> {
    respond(
        "update_invoice_item",
        state.billing.update_invoice_item(&payload).await,
    )
}

pub async fn finalize_invoice(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<InvoiceRequest>,
) -> HandlerResult<Invoice> {
    respond("finalize_invoice", state.billing.finalize_invoice(&payload).await)
}

pub async fn make_invoice(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ManualInvoiceRequest>,
) -> HandlerResult<Invoice> {
    respond("make_invoice", state.billing.create_manual_invoice(&payload).await)
}

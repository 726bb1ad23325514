//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    finalize_invoice, get_invoice_item, get_invoice_line_items, get_invoices, get_subscription,
    get_upcoming_invoice, get_upcoming_invoice_lines, health_check, make_invoice, pay_invoice,
    root, update_invoice_item, update_subscription,
};
use crate::state::AppState;

/// Route paths, for startup logging
pub const BILLING_ROUTES: [&str; 11] = [
    "/get_upcoming_invoice",
    "/get_upcoming_invoice_lines",
    "/pay_invoice",
    "/get_subscription",
    "/get_invoices",
    "/get_invoice_item",
    "/get_invoice_line_items",
    "/update_subscription",
    "/update_invoice_item",
    "/finalize_invoice",
    "/make_invoice",
];

pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/", get(root))
        .route("/health", get(health_check))
        // Previews
        .route("/get_upcoming_invoice", post(get_upcoming_invoice))
        .route("/get_upcoming_invoice_lines", post(get_upcoming_invoice_lines))
        // Read-throughs
        .route("/get_subscription", post(get_subscription))
        .route("/get_invoices", post(get_invoices))
        .route("/get_invoice_item", post(get_invoice_item))
        .route("/get_invoice_line_items", post(get_invoice_line_items))
        // Mutations
        .route("/pay_invoice", post(pay_invoice))
        .route("/update_subscription", post(update_subscription))
        .route("/update_invoice_item", post(update_invoice_item))
        .route("/finalize_invoice", post(finalize_invoice))
        .route("/make_invoice", post(make_invoice))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use billing_orchestrator::BillingOrchestrator;
    use billing_processor::{BillingProcessor, Environment, MockProcessor, Operation, ProcessorError};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn app() -> (Router, Arc<MockProcessor>) {
        let mock = Arc::new(MockProcessor::new());
        let billing = BillingOrchestrator::new(Arc::clone(&mock) as Arc<dyn BillingProcessor>);
        let state = AppState {
            billing: Arc::new(billing),
            environment: Environment::Test,
        };
        (router(state), mock)
    }

    async fn post_json(app: Router, path: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn post_raw(app: Router, path: &str, body: &'static str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root_says_hello() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"hello": "world"}));
    }

    #[tokio::test]
    async fn test_health_reports_processor() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["processor"], "mock");
        assert_eq!(body["environment"], "test");
    }

    #[tokio::test]
    async fn test_make_invoice_round_trip() {
        let (app, mock) = app();
        mock.add_customer("cus_1");

        let (status, body) = post_json(
            app,
            "/make_invoice",
            &json!({"customer": "cus_1", "amount": 500, "currency": "usd", "description": "fee"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["collection_method"], "send_invoice");
        assert_eq!(body["lines"]["data"][0]["amount"], 500);
        assert_eq!(body["total"], 500);
    }

    #[tokio::test]
    async fn test_missing_identifier_is_bad_request() {
        let (app, mock) = app();
        let (status, body) = post_json(app, "/pay_invoice", &json!({})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_request() {
        let (app, mock) = app();
        let (status, body) = post_raw(app, "/pay_invoice", r#"{"invoice": "in_1""#).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_request");
        assert_eq!(body["code"], "INVALID_REQUEST");
        assert_eq!(body["detail"], Value::Null);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mistyped_quantity_is_invalid_request() {
        for payload in [
            r#"{"subscription": "sub_1", "quantity": "3"}"#,
            r#"{"subscription": "sub_1", "quantity": -1}"#,
        ] {
            let (app, mock) = app();
            let (status, body) = post_raw(app, "/update_subscription", payload).await;

            assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
            assert_eq!(body["kind"], "invalid_request");
            assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
            assert!(mock.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_content_type_is_invalid_request() {
        let (app, _) = app();
        let request = Request::builder()
            .method("POST")
            .uri("/make_invoice")
            .body(Body::from(r#"{"customer": "cus_1"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unreadable_processor_answer_is_bad_gateway() {
        let (app, mock) = app();
        mock.fail_next(
            Operation::FinalizeInvoice,
            ProcessorError::Decode {
                operation: Operation::FinalizeInvoice,
                message: "status: unknown variant".into(),
            },
        );

        let (status, body) =
            post_json(app, "/finalize_invoice", &json!({"invoice": "in_1"})).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "decode");
        assert_eq!(body["code"], "DECODE");
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_not_found() {
        let (app, _) = app();
        let (status, body) =
            post_json(app, "/finalize_invoice", &json!({"invoice": "in_missing"})).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "resource_missing");
    }

    #[tokio::test]
    async fn test_empty_subscription_is_conflict() {
        let (app, mock) = app();
        let customer = mock.add_customer("cus_1");
        let sub = mock.seed_subscription(&customer, &[]);

        let (status, body) = post_json(
            app,
            "/update_subscription",
            &json!({"subscription": sub.id.as_str(), "quantity": 2}),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "empty_subscription");
    }

    #[tokio::test]
    async fn test_partial_failure_lists_orphan() {
        let (app, mock) = app();
        mock.add_customer("cus_1");
        mock.fail_next(
            Operation::CreateInvoice,
            ProcessorError::api(Operation::CreateInvoice, 500, "api_error", "boom"),
        );

        let (status, body) = post_json(
            app,
            "/make_invoice",
            &json!({"customer": "cus_1", "amount": 500, "currency": "usd", "description": "fee"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "composite_operation");
        assert_eq!(body["detail"], "api_error");
        assert_eq!(body["completed_steps"][0]["operation"], "create_invoice_item");
    }

    #[tokio::test]
    async fn test_transport_failure_is_unavailable() {
        let (app, mock) = app();
        mock.fail_next(
            Operation::ListOpenInvoices,
            ProcessorError::transport(Operation::ListOpenInvoices, "connection reset"),
        );

        let (status, body) =
            post_json(app, "/get_invoices", &json!({"subscription": "sub_1"})).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["kind"], "transport");
        assert_eq!(body["detail"], Value::Null);
    }
}

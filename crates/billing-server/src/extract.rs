//! Request body extractor
//!
//! `axum::Json` answers a bad body with a plain-text rejection. `ApiJson`
//! wraps it so malformed or mistyped bodies come back as an `ErrorResponse`
//! like every other invalid request.

use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
};
use billing_orchestrator::BillingError;
use serde::de::DeserializeOwned;

use crate::handlers::{ErrorResponse, error_response};

/// JSON body whose rejection is an `invalid_request` error
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(error_response(
                "request_body",
                &BillingError::InvalidRequest(rejection.body_text()),
            )),
        }
    }
}

//! HTTP routes over [`PaymentService`]

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use errandbit_core::{Caller, ErrorKind, JobId, PaymentError, PaymentRecord, Role};
use errandbit_monitor::MonitoringReport;

use crate::service::{
    CleanupResponse, ConfirmRequest, ConfirmResponse, DisputeRequest, InvoiceRequest,
    InvoiceValidation, IssuedInvoice, PaymentInstruction, PaymentService, ValidateInvoiceRequest,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

type AppState = Arc<PaymentService>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payments/instruction", get(instruction))
        .route("/payments/validate-invoice", post(validate_invoice))
        .route("/payments/invoice", post(request_invoice))
        .route("/payments/confirm", post(confirm))
        .route("/payments/dispute", post(dispute))
        .route("/monitoring/payments", get(monitoring_report))
        .route("/monitoring/cleanup/expired-invoices", post(cleanup_expired))
        .with_state(service)
}

// ==================== Errors ====================

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: ErrorKind,
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

impl From<&PaymentError> for ErrorDetail {
    fn from(err: &PaymentError) -> Self {
        Self {
            kind: err.kind(),
            code: err.code(),
            message: err.public_message(),
            retry_after_secs: err.retry_after_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct RejectedInvoice {
    is_valid: bool,
    error: ErrorDetail,
}

/// A [`PaymentError`] rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(PaymentError::InvalidRequest(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(PaymentError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        if !err.kind().is_client_error() {
            error!("Request failed: {}", err);
        }
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: ErrorDetail::from(&err),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = err.retry_after_secs() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ==================== Auth ====================

/// Caller identity taken from the gateway headers
#[derive(Debug, Clone, Copy)]
pub struct AuthCaller(pub Caller);

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

impl<S> FromRequestParts<S> for AuthCaller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_str(parts, USER_ID_HEADER)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .ok_or(PaymentError::Unauthorized)?;
        let role: Role = header_str(parts, USER_ROLE_HEADER)
            .ok_or(PaymentError::Unauthorized)?
            .trim()
            .parse()?;
        Ok(AuthCaller(Caller::new(user_id, role)))
    }
}

// ==================== Handlers ====================

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct InstructionQuery {
    job_id: JobId,
}

async fn instruction(
    State(service): State<AppState>,
    AuthCaller(caller): AuthCaller,
    query: Result<Query<InstructionQuery>, QueryRejection>,
) -> ApiResult<PaymentInstruction> {
    let Query(query) = query?;
    Ok(Json(service.instruction(&caller, query.job_id).await?))
}

async fn validate_invoice(
    State(service): State<AppState>,
    AuthCaller(caller): AuthCaller,
    payload: Result<Json<ValidateInvoiceRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    match service.validate_invoice(&caller, &request).await {
        Ok(validation) => Ok(Json::<InvoiceValidation>(validation).into_response()),
        Err(err) if err.kind() == ErrorKind::Validation => {
            let body = RejectedInvoice {
                is_valid: false,
                error: ErrorDetail::from(&err),
            };
            Ok((StatusCode::BAD_REQUEST, Json(body)).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

async fn request_invoice(
    State(service): State<AppState>,
    AuthCaller(caller): AuthCaller,
    payload: Result<Json<InvoiceRequest>, JsonRejection>,
) -> ApiResult<IssuedInvoice> {
    let Json(request) = payload?;
    Ok(Json(service.request_invoice(&caller, request.job_id).await?))
}

async fn confirm(
    State(service): State<AppState>,
    AuthCaller(caller): AuthCaller,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> ApiResult<ConfirmResponse> {
    let Json(request) = payload?;
    Ok(Json(service.confirm(&caller, &request).await?))
}

async fn dispute(
    State(service): State<AppState>,
    AuthCaller(caller): AuthCaller,
    payload: Result<Json<DisputeRequest>, JsonRejection>,
) -> ApiResult<PaymentRecord> {
    let Json(request) = payload?;
    Ok(Json(service.dispute(&caller, &request)?))
}

async fn monitoring_report(
    State(service): State<AppState>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<MonitoringReport> {
    Ok(Json(service.monitoring_report(&caller).await?))
}

async fn cleanup_expired(
    State(service): State<AppState>,
    AuthCaller(caller): AuthCaller,
) -> ApiResult<CleanupResponse> {
    Ok(Json(service.cleanup_expired(&caller)?))
}

//! ErrandBit Payment Daemon
//!
//! HTTP adapter and background jobs around the payment core.
//!
//! ## Components
//!
//! - **PaymentService**: rate limits, screens and orchestrates every payment
//!   operation against the ledger and the Lightning provider
//! - **HttpServer**: axum router over the service, one route per operation
//! - **BackgroundTasks**: monitor cycle, expiry sweep and guard purge
//!
//! ## Routes
//!
//! - `GET  /health`
//! - `GET  /payments/instruction?job_id=`
//! - `POST /payments/validate-invoice`
//! - `POST /payments/invoice`
//! - `POST /payments/confirm`
//! - `POST /payments/dispute`
//! - `GET  /monitoring/payments`
//! - `POST /monitoring/cleanup/expired-invoices`
//!
//! Callers are identified by the `x-user-id` and `x-user-role` headers set
//! by the upstream auth gateway.

mod api;
mod server;
mod service;

pub use api::{router, ApiError, AuthCaller, USER_ID_HEADER, USER_ROLE_HEADER};
pub use server::{BackgroundTasks, HttpConfig, HttpServer};
pub use service::{
    provider_config, CleanupResponse, ConfirmRequest, ConfirmResponse, DisputeRequest,
    InvoiceRequest, InvoiceValidation, IssuedInvoice, PaymentInstruction, PaymentPolicy,
    PaymentService, RunnerInfo, ServiceConfig, ValidateInvoiceRequest,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Settings error: {0}")]
    Settings(#[from] errandbit_settings::SettingsError),

    #[error("Payment error: {0}")]
    Payment(#[from] errandbit_core::PaymentError),

    #[error("Lightning error: {0}")]
    Lightning(#[from] errandbit_lightning::LightningError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

//! LNbits REST provider

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use errandbit_core::{PaymentHash, Preimage};

use crate::provider::{
    CreatedInvoice, InvoiceLookup, InvoiceStatus, LightningProvider, NodeStatus, ProviderConfig,
    ProviderType,
};
use crate::{LightningError, Result};

#[derive(Serialize)]
struct CreateInvoiceBody<'a> {
    out: bool,
    amount: u64,
    memo: &'a str,
    expiry: u64,
}

#[derive(Deserialize)]
struct CreateInvoiceResponse {
    payment_hash: String,
    #[serde(alias = "bolt11")]
    payment_request: String,
}

#[derive(Deserialize)]
struct PaymentDetails {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
}

#[derive(Deserialize)]
struct LookupResponse {
    paid: bool,
    #[serde(default)]
    preimage: Option<String>,
    #[serde(default)]
    details: Option<PaymentDetails>,
}

#[derive(Deserialize)]
struct WalletResponse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    balance: Option<i64>,
}

/// Provider backed by an LNbits wallet
pub struct LnbitsProvider {
    config: ProviderConfig,
    client: Client,
}

impl LnbitsProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LightningError::Config("LNbits API key not configured".to_string()));
        }
        if config.api_url.is_empty() {
            return Err(LightningError::Config("LNbits API URL not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| LightningError::Config(format!("HTTP client: {}", e)))?;

        info!("LNbits provider configured for {}", config.api_url);
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(LightningError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn parse_lookup(payment_hash: PaymentHash, body: LookupResponse) -> Result<InvoiceLookup> {
    let details_status = body
        .details
        .as_ref()
        .and_then(|d| d.status.as_deref())
        .unwrap_or("pending");
    let status = if body.paid {
        InvoiceStatus::Paid
    } else if matches!(details_status, "failed" | "cancelled" | "expired") {
        InvoiceStatus::Failed
    } else {
        InvoiceStatus::Pending
    };

    // LNbits reports a zeroed preimage for unpaid invoices
    let preimage = match body.preimage.as_deref() {
        Some(p) if body.paid && p.chars().any(|c| c != '0') => Some(
            p.parse::<Preimage>()
                .map_err(|e| LightningError::InvalidResponse(e.to_string()))?,
        ),
        _ => None,
    };

    let amount_sats = body
        .details
        .and_then(|d| d.amount)
        .map(|msats| msats.unsigned_abs() / 1000);

    Ok(InvoiceLookup {
        payment_hash,
        status,
        preimage,
        amount_sats,
    })
}

#[async_trait]
impl LightningProvider for LnbitsProvider {
    async fn create_invoice(
        &self,
        amount_sats: u64,
        description: &str,
        expiry_secs: u64,
    ) -> Result<CreatedInvoice> {
        let response = self
            .client
            .post(self.url("/api/v1/payments"))
            .header("X-Api-Key", &self.config.api_key)
            .json(&CreateInvoiceBody {
                out: false,
                amount: amount_sats,
                memo: description,
                expiry: expiry_secs,
            })
            .send()
            .await?;
        let body: CreateInvoiceResponse = Self::check_status(response).await?.json().await?;

        let payment_hash = body
            .payment_hash
            .parse::<PaymentHash>()
            .map_err(|e| LightningError::InvalidResponse(e.to_string()))?;
        debug!("LNbits issued invoice {} for {} sats", payment_hash, amount_sats);

        Ok(CreatedInvoice {
            payment_hash,
            bolt11: body.payment_request,
        })
    }

    async fn lookup_invoice(&self, payment_hash: &PaymentHash) -> Result<InvoiceLookup> {
        let response = self
            .client
            .get(self.url(&format!("/api/v1/payments/{}", payment_hash)))
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(InvoiceLookup::not_found(*payment_hash));
        }
        let body: LookupResponse = Self::check_status(response).await?.json().await?;
        parse_lookup(*payment_hash, body)
    }

    async fn health_check(&self) -> Result<NodeStatus> {
        let response = self
            .client
            .get(self.url("/api/v1/wallet"))
            .header("X-Api-Key", &self.config.api_key)
            .send()
            .await?;
        let wallet: WalletResponse = Self::check_status(response).await?.json().await?;

        Ok(NodeStatus {
            provider: ProviderType::Lnbits,
            detail: format!(
                "wallet {} balance {} msat",
                wallet.name.unwrap_or_else(|| "unnamed".to_string()),
                wallet.balance.unwrap_or_default()
            ),
        })
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Lnbits
    }
}

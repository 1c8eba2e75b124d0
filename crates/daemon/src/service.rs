//! Payment service
//!
//! Orchestrates one request at a time: rate limit, screen, load the job,
//! derive the amount, then call into the validator, verifier and ledger.
//! Every public method takes the authenticated [`Caller`].
//!
//! The invoice amount is locked in a [`JobQuote`] when it is first derived
//! and reused until the quote expires, so the client pays exactly what the
//! instruction told them.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use errandbit_core::{
    Caller, Clock, JobId, JobRecord, PaymentError, PaymentHash, PaymentRecord, PaymentStatus,
    Preimage, Result, SystemClock, Timestamp,
};
use errandbit_crypto::verify_preimage;
use errandbit_guard::{
    screen_hex_field, screen_invoice_payload, screen_job_id, AbuseGuard, GuardAction,
    GuardPolicies, RatePolicy,
};
use errandbit_ledger::{ConfirmPayment, JobQuote, NewPayment, PaymentLedger};
use errandbit_lightning::{
    create_provider, validate_invoice, FixedRateOracle, LightningProvider, ProviderConfig,
    ProviderType, RateOracle,
};
use errandbit_monitor::{AlertSink, LogAlertSink, MonitorConfig, MonitoringReport, PaymentMonitor};
use errandbit_settings::{LightningMode, LightningSettings, Settings};

/// Payment policy knobs
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    pub invoice_expiry_secs: u64,
    pub max_invoice_len: usize,
    pub min_price_cents: i64,
    pub max_price_cents: i64,
    pub provider_timeout_secs: u64,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            invoice_expiry_secs: 3600,
            max_invoice_len: 2048,
            min_price_cents: 100,
            max_price_cents: 1_000_000,
            provider_timeout_secs: 10,
        }
    }
}

/// Everything the service needs besides its collaborators
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub payments: PaymentPolicy,
    pub guard: GuardPolicies,
    pub monitor: MonitorConfig,
}

impl ServiceConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let limit = |l: errandbit_settings::RateLimit| RatePolicy::new(l.max_requests, l.window_secs);
        Self {
            payments: PaymentPolicy {
                invoice_expiry_secs: settings.payments.invoice_expiry_secs,
                max_invoice_len: settings.payments.max_invoice_len,
                min_price_cents: settings.payments.min_price_cents,
                max_price_cents: settings.payments.max_price_cents,
                provider_timeout_secs: settings.lightning.request_timeout_secs,
            },
            guard: GuardPolicies {
                payment: limit(settings.guard.payment),
                confirm: limit(settings.guard.confirm),
                monitoring: limit(settings.guard.monitoring),
            },
            monitor: MonitorConfig {
                stuck_threshold_secs: settings.monitoring.stuck_threshold_secs,
                page_size: settings.monitoring.page_size,
                success_threshold_pct: settings.monitoring.success_threshold_pct,
                min_sample: settings.monitoring.min_sample,
                health_timeout_secs: settings.monitoring.health_timeout_secs,
                expiry_window_secs: settings.payments.invoice_expiry_secs,
            },
        }
    }
}

/// Provider configuration for the configured Lightning mode
pub fn provider_config(settings: &LightningSettings) -> ProviderConfig {
    let provider = match settings.mode {
        LightningMode::Mock => ProviderType::Mock,
        LightningMode::Lnbits => ProviderType::Lnbits,
    };
    ProviderConfig {
        provider,
        api_url: settings.api_url.clone(),
        api_key: settings.api_key.clone(),
        request_timeout_secs: settings.request_timeout_secs,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunnerInfo {
    pub lightning_address: String,
}

/// What the client must pay, and to whom
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInstruction {
    pub job_id: JobId,
    pub amount_sats: u64,
    pub amount_cents: i64,
    pub sats_per_usd: u64,
    pub quote_expires_at: Timestamp,
    pub runner: RunnerInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateInvoiceRequest {
    pub job_id: JobId,
    pub bolt11: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceValidation {
    pub is_valid: bool,
    pub amount_sats: u64,
    pub payment_hash: PaymentHash,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceRequest {
    pub job_id: JobId,
}

/// Invoice issued by the node for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedInvoice {
    pub job_id: JobId,
    pub bolt11: String,
    pub payment_hash: PaymentHash,
    pub amount_sats: u64,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmRequest {
    pub job_id: JobId,
    pub preimage: String,
    pub payment_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub status: String,
    pub payment_id: String,
    pub amount_sats: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisputeRequest {
    pub payment_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CleanupResponse {
    pub expired: usize,
}

/// The payment core behind the HTTP adapter and the CLI
pub struct PaymentService {
    ledger: PaymentLedger,
    provider: Arc<dyn LightningProvider>,
    rates: Arc<dyn RateOracle>,
    guard: Arc<AbuseGuard>,
    monitor: Arc<PaymentMonitor>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl PaymentService {
    pub fn new(
        ledger: PaymentLedger,
        provider: Arc<dyn LightningProvider>,
        rates: Arc<dyn RateOracle>,
        config: ServiceConfig,
    ) -> Self {
        Self::with_parts(ledger, provider, rates, config, Arc::new(SystemClock), Arc::new(LogAlertSink))
    }

    /// Open the ledger and connect the provider named in `settings`
    pub fn from_settings(settings: &Settings) -> crate::Result<Self> {
        if let Some(parent) = settings.database.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let ledger = PaymentLedger::open(&settings.database.path)?;
        let provider = create_provider(&provider_config(&settings.lightning))?;
        let rates = Arc::new(FixedRateOracle::new(settings.rates.sats_per_usd));
        info!(
            "Payment service using {:?} provider, ledger at {:?}",
            provider.provider_type(),
            settings.database.path
        );
        Ok(Self::new(
            ledger,
            provider,
            rates,
            ServiceConfig::from_settings(settings),
        ))
    }

    /// Construct with an explicit clock and alert sink
    pub fn with_parts(
        ledger: PaymentLedger,
        provider: Arc<dyn LightningProvider>,
        rates: Arc<dyn RateOracle>,
        config: ServiceConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let guard = Arc::new(AbuseGuard::with_clock(config.guard, clock.clone()));
        let monitor = Arc::new(
            PaymentMonitor::new(ledger.clone(), provider.clone(), config.monitor.clone())
                .with_sink(sink)
                .with_clock(clock.clone()),
        );
        Self {
            ledger,
            provider,
            rates,
            guard,
            monitor,
            clock,
            config,
        }
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    pub fn guard(&self) -> Arc<AbuseGuard> {
        self.guard.clone()
    }

    pub fn monitor(&self) -> Arc<PaymentMonitor> {
        self.monitor.clone()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Mirror a job row from the job service
    pub fn sync_job(&self, job: &JobRecord) -> Result<()> {
        screen_job_id(job.id)?;
        self.ledger.upsert_job(job)
    }

    // ==================== Payment path ====================

    /// Amount and destination for a job awaiting payment
    pub async fn instruction(&self, caller: &Caller, job_id: JobId) -> Result<PaymentInstruction> {
        self.guard.check(GuardAction::Payment, &identity(caller))?;
        screen_job_id(job_id)?;

        let job = self.payable_job(caller, job_id)?;
        let lightning_address = job
            .runner_lightning_address
            .clone()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| {
                PaymentError::InvalidRequest("runner has no lightning address".to_string())
            })?;
        let quote = self.locked_quote(&job).await?;

        debug!("Instruction for job {}: {} sats", job_id, quote.amount_sats);
        Ok(PaymentInstruction {
            job_id,
            amount_sats: quote.amount_sats,
            amount_cents: job.price_cents,
            sats_per_usd: quote.sats_per_usd,
            quote_expires_at: quote.expires_at,
            runner: RunnerInfo { lightning_address },
        })
    }

    /// Check a client-supplied invoice and register it as the job's pending payment.
    ///
    /// Re-submitting the same invoice while it is pending is accepted.
    pub async fn validate_invoice(
        &self,
        caller: &Caller,
        request: &ValidateInvoiceRequest,
    ) -> Result<InvoiceValidation> {
        self.guard.check(GuardAction::Payment, &identity(caller))?;
        screen_job_id(request.job_id)?;
        screen_invoice_payload(&request.bolt11, self.config.payments.max_invoice_len)?;

        let job = self.payable_job(caller, request.job_id)?;
        let expected_sats = self.locked_quote(&job).await?.amount_sats;
        let now = self.clock.now();

        let decoded = validate_invoice(request.bolt11.trim(), expected_sats, now).map_err(|e| {
            warn!("Invoice rejected for job {}: {}", job.id, e);
            e
        })?;

        self.register_pending(
            job.id,
            decoded.payment_hash,
            expected_sats,
            request.bolt11.trim(),
            now,
        )?;

        Ok(InvoiceValidation {
            is_valid: true,
            amount_sats: expected_sats,
            payment_hash: decoded.payment_hash,
            expires_at: decoded.expires_at,
        })
    }

    /// Ask the node for an invoice for the job and register it
    pub async fn request_invoice(&self, caller: &Caller, job_id: JobId) -> Result<IssuedInvoice> {
        self.guard.check(GuardAction::Payment, &identity(caller))?;
        screen_job_id(job_id)?;

        let job = self.payable_job(caller, job_id)?;
        let amount_sats = self.locked_quote(&job).await?.amount_sats;
        let expiry = self.config.payments.invoice_expiry_secs;
        let description = format!("ErrandBit job #{}", job_id);

        let timeout = Duration::from_secs(self.config.payments.provider_timeout_secs);
        let created = tokio::time::timeout(
            timeout,
            self.provider.create_invoice(amount_sats, &description, expiry),
        )
        .await
        .map_err(|_| PaymentError::Provider("invoice creation timed out".to_string()))??;

        let now = self.clock.now();
        self.register_pending(job_id, created.payment_hash, amount_sats, &created.bolt11, now)?;

        info!("Issued invoice {} for job {}", created.payment_hash, job_id);
        Ok(IssuedInvoice {
            job_id,
            bolt11: created.bolt11,
            payment_hash: created.payment_hash,
            amount_sats,
            expires_at: now.saturating_add(expiry),
        })
    }

    /// Verify the proof of payment and confirm the job, atomically.
    ///
    /// Only invoices registered by [`Self::validate_invoice`] or
    /// [`Self::request_invoice`] can be confirmed.
    pub async fn confirm(&self, caller: &Caller, request: &ConfirmRequest) -> Result<ConfirmResponse> {
        self.guard.check(GuardAction::Confirm, &identity(caller))?;
        screen_job_id(request.job_id)?;
        screen_hex_field("preimage", &request.preimage)?;
        screen_hex_field("payment_hash", &request.payment_hash)?;

        let job = self
            .ledger
            .get_job(request.job_id)?
            .ok_or(PaymentError::JobNotFound(request.job_id))?;
        if job.client_id != caller.user_id {
            warn!(
                "User {} tried to confirm payment for job {}",
                caller.user_id, job.id
            );
            return Err(PaymentError::Forbidden(
                "only the job's client may confirm payment".to_string(),
            ));
        }

        if !verify_preimage(&request.preimage, &request.payment_hash)? {
            warn!(
                "Preimage mismatch from user {} for job {}",
                caller.user_id, request.job_id
            );
            return Err(PaymentError::PreimageMismatch);
        }
        let preimage: Preimage = request.preimage.parse()?;
        let payment_hash: PaymentHash = request.payment_hash.to_lowercase().parse()?;

        let record = self.ledger.confirm(&ConfirmPayment {
            job_id: request.job_id,
            caller_id: caller.user_id,
            payment_hash,
            preimage,
            paid_at: self.clock.now(),
        })?;

        Ok(ConfirmResponse {
            success: true,
            status: "payment_confirmed".to_string(),
            payment_id: record.id,
            amount_sats: record.amount_sats,
        })
    }

    /// Administrative dispute flag on a payment
    pub fn dispute(&self, caller: &Caller, request: &DisputeRequest) -> Result<PaymentRecord> {
        self.guard.check(GuardAction::Payment, &identity(caller))?;
        screen_hex_field("payment_hash", &request.payment_hash)?;
        let payment_hash: PaymentHash = request.payment_hash.parse()?;
        self.ledger.mark_disputed(&payment_hash, caller)
    }

    // ==================== Monitoring ====================

    pub async fn monitoring_report(&self, caller: &Caller) -> Result<MonitoringReport> {
        self.guard.check(GuardAction::Monitoring, &identity(caller))?;
        self.monitor.report().await
    }

    pub fn cleanup_expired(&self, caller: &Caller) -> Result<CleanupResponse> {
        self.guard.check(GuardAction::Monitoring, &identity(caller))?;
        let expired = self.monitor.sweep_expired()?;
        info!("User {} swept {} expired invoice(s)", caller.user_id, expired);
        Ok(CleanupResponse { expired })
    }

    // ==================== Internals ====================

    /// Load a job the caller may pay for right now
    fn payable_job(&self, caller: &Caller, job_id: JobId) -> Result<JobRecord> {
        let job = self
            .ledger
            .get_job(job_id)?
            .ok_or(PaymentError::JobNotFound(job_id))?;
        if job.client_id != caller.user_id {
            return Err(PaymentError::Forbidden(
                "only the job's client may pay for it".to_string(),
            ));
        }
        if !job.status.accepts_payment() {
            return Err(PaymentError::InvalidJobState {
                job_id,
                status: job.status.to_string(),
            });
        }
        Ok(job)
    }

    /// Live quote for the job, capturing a fresh rate only when none is live
    async fn locked_quote(&self, job: &JobRecord) -> Result<JobQuote> {
        let policy = &self.config.payments;
        if job.price_cents < policy.min_price_cents || job.price_cents > policy.max_price_cents {
            return Err(PaymentError::InvalidRequest(format!(
                "job price {} cents outside {}..={}",
                job.price_cents, policy.min_price_cents, policy.max_price_cents
            )));
        }

        let now = self.clock.now();
        if let Some(quote) = self.ledger.live_quote(job.id, now)? {
            if quote.price_cents == job.price_cents {
                return Ok(quote);
            }
            debug!("Price of job {} changed, requoting", job.id);
        }

        let rate = self.rates.quote().await?;
        let quote = JobQuote {
            job_id: job.id,
            price_cents: job.price_cents,
            sats_per_usd: rate.sats_per_usd,
            amount_sats: rate.sats_for_cents(job.price_cents)?,
            captured_at: rate.captured_at,
            expires_at: now.saturating_add(policy.invoice_expiry_secs),
        };
        self.ledger.save_quote(&quote)?;
        Ok(quote)
    }

    fn register_pending(
        &self,
        job_id: JobId,
        payment_hash: PaymentHash,
        amount_sats: u64,
        bolt11: &str,
        now: Timestamp,
    ) -> Result<PaymentRecord> {
        if let Some(existing) = self.ledger.find_by_hash(&payment_hash)? {
            if existing.job_id == job_id && existing.status == PaymentStatus::Pending {
                debug!("Invoice {} already pending for job {}", payment_hash, job_id);
                return Ok(existing);
            }
            return Err(PaymentError::DuplicatePayment(payment_hash.to_hex()));
        }
        self.ledger.create(
            NewPayment::job_payment(job_id, payment_hash, amount_sats)
                .with_bolt11(bolt11)
                .at(now),
        )
    }
}

fn identity(caller: &Caller) -> String {
    format!("user:{}", caller.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use errandbit_core::{JobStatus, ManualClock, Role};
    use errandbit_crypto::generate_preimage;
    use errandbit_lightning::{sign_invoice, FixedRateOracle, InvoiceParams, MockProvider};

    const NOW: u64 = 1_750_000_000;
    const CLIENT: i64 = 10;
    const RUNNER: i64 = 20;

    struct Fixture {
        service: PaymentService,
        provider: Arc<MockProvider>,
        rates: Arc<FixedRateOracle>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let provider = Arc::new(MockProvider::with_clock(clock.clone()));
        let rates = Arc::new(FixedRateOracle::with_clock(1500, clock.clone()));
        let service = PaymentService::with_parts(
            PaymentLedger::open_in_memory().unwrap(),
            provider.clone(),
            rates.clone(),
            ServiceConfig::default(),
            clock.clone(),
            Arc::new(LogAlertSink),
        );
        service
            .sync_job(&JobRecord {
                id: 1,
                price_cents: 5000,
                status: JobStatus::AwaitingPayment,
                client_id: CLIENT,
                runner_id: Some(RUNNER),
                runner_lightning_address: Some("runner@ln.example".to_string()),
            })
            .unwrap();
        Fixture {
            service,
            provider,
            rates,
            clock,
        }
    }

    fn client() -> Caller {
        Caller::new(CLIENT, Role::Client)
    }

    fn invoice(hash: PaymentHash, amount_sats: u64) -> String {
        sign_invoice(&InvoiceParams {
            payment_hash: hash,
            amount_msats: Some(amount_sats * 1000),
            description: "job 1".to_string(),
            created_at: NOW,
            expiry_secs: 3600,
        })
        .unwrap()
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.guard.confirm.max_requests = 3;
        settings.payments.invoice_expiry_secs = 900;
        let config = ServiceConfig::from_settings(&settings);
        assert_eq!(config.guard.confirm, RatePolicy::new(3, 60));
        assert_eq!(config.monitor.expiry_window_secs, 900);
        assert_eq!(config.payments.invoice_expiry_secs, 900);
        assert_eq!(provider_config(&settings.lightning).provider, ProviderType::Mock);
    }

    #[tokio::test]
    async fn test_instruction_amount() {
        let f = fixture();
        let instruction = f.service.instruction(&client(), 1).await.unwrap();
        assert_eq!(instruction.amount_sats, 75_000);
        assert_eq!(instruction.amount_cents, 5000);
        assert_eq!(instruction.runner.lightning_address, "runner@ln.example");
    }

    #[tokio::test]
    async fn test_validate_then_confirm() {
        let f = fixture();
        let (preimage, hash) = generate_preimage();
        let request = ValidateInvoiceRequest {
            job_id: 1,
            bolt11: invoice(hash, 75_000),
        };

        let validation = f.service.validate_invoice(&client(), &request).await.unwrap();
        assert!(validation.is_valid);
        assert_eq!(validation.payment_hash, hash);
        assert_eq!(validation.expires_at, NOW + 3600);

        // Same invoice again is idempotent
        assert!(f.service.validate_invoice(&client(), &request).await.is_ok());
        assert_eq!(f.service.ledger().find_by_job(1).unwrap().len(), 1);

        let confirmed = f
            .service
            .confirm(
                &client(),
                &ConfirmRequest {
                    job_id: 1,
                    preimage: preimage.to_hex(),
                    payment_hash: hash.to_hex(),
                },
            )
            .await
            .unwrap();
        assert!(confirmed.success);
        assert_eq!(confirmed.status, "payment_confirmed");
        assert_eq!(confirmed.amount_sats, 75_000);

        let job = f.service.ledger().get_job(1).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::PaymentConfirmed);
    }

    #[tokio::test]
    async fn test_request_invoice_and_settle() {
        let f = fixture();
        let issued = f.service.request_invoice(&client(), 1).await.unwrap();
        assert_eq!(issued.amount_sats, 75_000);

        let preimage = f.provider.settle(&issued.payment_hash).unwrap();
        let confirmed = f
            .service
            .confirm(
                &client(),
                &ConfirmRequest {
                    job_id: 1,
                    preimage: preimage.to_hex(),
                    payment_hash: issued.payment_hash.to_hex(),
                },
            )
            .await
            .unwrap();
        assert_eq!(confirmed.amount_sats, 75_000);
    }

    #[tokio::test]
    async fn test_rate_change_after_instruction() {
        let f = fixture();
        let instruction = f.service.instruction(&client(), 1).await.unwrap();
        assert_eq!(instruction.amount_sats, 75_000);
        assert_eq!(instruction.quote_expires_at, NOW + 3600);

        f.rates.set_rate(1600);
        let (_, hash) = generate_preimage();
        let validation = f
            .service
            .validate_invoice(
                &client(),
                &ValidateInvoiceRequest {
                    job_id: 1,
                    bolt11: invoice(hash, instruction.amount_sats),
                },
            )
            .await
            .unwrap();
        assert_eq!(validation.amount_sats, 75_000);

        // Once the quote lapses the next instruction uses the new rate
        f.clock.advance(3600);
        let requoted = f.service.instruction(&client(), 1).await.unwrap();
        assert_eq!(requoted.amount_sats, 80_000);
        assert_eq!(requoted.sats_per_usd, 1600);
    }

    #[tokio::test]
    async fn test_cleanup_expires_old_pending() {
        let f = fixture();
        let (_, hash) = generate_preimage();
        f.service
            .validate_invoice(
                &client(),
                &ValidateInvoiceRequest {
                    job_id: 1,
                    bolt11: invoice(hash, 75_000),
                },
            )
            .await
            .unwrap();

        f.clock.advance(3600);
        let admin = Caller::new(1, Role::Admin);
        assert_eq!(f.service.cleanup_expired(&admin).unwrap().expired, 1);
        assert_eq!(f.service.cleanup_expired(&admin).unwrap().expired, 0);
    }

    // ==================== NEGATIVE TESTS ====================

    #[tokio::test]
    async fn test_amount_off_by_one_sat() {
        let f = fixture();
        let (_, hash) = generate_preimage();
        let err = f
            .service
            .validate_invoice(
                &client(),
                &ValidateInvoiceRequest {
                    job_id: 1,
                    bolt11: invoice(hash, 74_999),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PaymentError::AmountMismatch {
                expected: 75_000,
                actual: 74_999
            }
        );
        assert!(f.service.ledger().find_by_job(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runner_cannot_pay() {
        let f = fixture();
        let runner = Caller::new(RUNNER, Role::Runner);
        assert!(matches!(
            f.service.instruction(&runner, 1).await,
            Err(PaymentError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_job() {
        let f = fixture();
        assert_eq!(
            f.service.instruction(&client(), 99).await.unwrap_err(),
            PaymentError::JobNotFound(99)
        );
    }

    #[tokio::test]
    async fn test_runner_without_address() {
        let f = fixture();
        f.service
            .sync_job(&JobRecord {
                id: 2,
                price_cents: 5000,
                status: JobStatus::AwaitingPayment,
                client_id: CLIENT,
                runner_id: Some(RUNNER),
                runner_lightning_address: None,
            })
            .unwrap();
        assert!(matches!(
            f.service.instruction(&client(), 2).await,
            Err(PaymentError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_preimage_rejected_before_ledger() {
        let f = fixture();
        let (_, hash) = generate_preimage();
        let (other, _) = generate_preimage();
        let err = f
            .service
            .confirm(
                &client(),
                &ConfirmRequest {
                    job_id: 1,
                    preimage: other.to_hex(),
                    payment_hash: hash.to_hex(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::PreimageMismatch);

        let err = f
            .service
            .confirm(
                &client(),
                &ConfirmRequest {
                    job_id: 1,
                    preimage: "abc".to_string(),
                    payment_hash: hash.to_hex(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidFormat { field: "preimage", .. }));
    }

    #[tokio::test]
    async fn test_self_made_preimage_cannot_confirm() {
        let f = fixture();
        let (preimage, hash) = generate_preimage();
        let err = f
            .service
            .confirm(
                &client(),
                &ConfirmRequest {
                    job_id: 1,
                    preimage: preimage.to_hex(),
                    payment_hash: hash.to_hex(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::PaymentNotFound(hash.to_hex()));
        assert!(f.service.ledger().find_by_job(1).unwrap().is_empty());
        assert_eq!(
            f.service.ledger().get_job(1).unwrap().unwrap().status,
            JobStatus::AwaitingPayment
        );
    }

    #[tokio::test]
    async fn test_non_client_confirm_forbidden_before_preimage() {
        let f = fixture();
        let (_, hash) = generate_preimage();
        let (wrong, _) = generate_preimage();
        let runner = Caller::new(RUNNER, Role::Runner);
        let err = f
            .service
            .confirm(
                &runner,
                &ConfirmRequest {
                    job_id: 1,
                    preimage: wrong.to_hex(),
                    payment_hash: hash.to_hex(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Forbidden(_)));
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn test_confirm_rate_limited() {
        let f = fixture();
        let request = ConfirmRequest {
            job_id: 1,
            preimage: "00".repeat(32),
            payment_hash: "11".repeat(32),
        };
        for _ in 0..5 {
            assert_eq!(
                f.service.confirm(&client(), &request).await.unwrap_err(),
                PaymentError::PreimageMismatch
            );
        }
        assert!(matches!(
            f.service.confirm(&client(), &request).await,
            Err(PaymentError::RateLimited { .. })
        ));
    }

    #[tokio::test]
    async fn test_second_invoice_while_pending() {
        let f = fixture();
        let (_, first) = generate_preimage();
        let (_, second) = generate_preimage();
        f.service
            .validate_invoice(&client(), &ValidateInvoiceRequest { job_id: 1, bolt11: invoice(first, 75_000) })
            .await
            .unwrap();
        let err = f
            .service
            .validate_invoice(&client(), &ValidateInvoiceRequest { job_id: 1, bolt11: invoice(second, 75_000) })
            .await
            .unwrap_err();
        assert_eq!(err, PaymentError::PaymentPending(1));
    }

    #[tokio::test]
    async fn test_dispute_requires_admin() {
        let f = fixture();
        let issued = f.service.request_invoice(&client(), 1).await.unwrap();
        let request = DisputeRequest {
            payment_hash: issued.payment_hash.to_hex(),
        };
        assert!(matches!(
            f.service.dispute(&client(), &request),
            Err(PaymentError::Forbidden(_))
        ));
        let admin = Caller::new(1, Role::Admin);
        assert_eq!(
            f.service.dispute(&admin, &request).unwrap().status,
            PaymentStatus::Disputed
        );
    }
}

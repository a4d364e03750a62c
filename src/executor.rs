//! Batch Executor and its policy wrappers (§4.2, §4.3, §4.4, §9).
//!
//! `BatchExecutor` translates a batch of requests into provider results (or a
//! single batch-wide error) and never touches the response router itself —
//! resolving/rejecting the originating handles is the job of whichever
//! caller owns the fully composed stack (see
//! [`crate::gateway::dispatch_batch`]). That split is what lets
//! `RetryExecutor` re-invoke its inner executor on a transient failure
//! without anything having already rejected the batch's handles out from
//! under it.

use async_trait::async_trait;
use fastrand::Rng;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::logging::GatewayLogger;
use crate::provider::{ProviderAdaptor, ProviderMessage, ProviderRequest, ProviderResult};
use crate::rate_limit::{delay_duration, limits_for, RateLimiterRegistry, TokenCounter};
use crate::retry::{should_retry, RetryPolicy};
use crate::types::{ModelConfig, Request};

/// Composable unit of batch execution policy. Implementations: [`BaseExecutor`]
/// (innermost, talks to the provider), [`RetryExecutor`] (middle), and
/// [`RateLimitExecutor`] (outermost) — composed in that fixed order per §9.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    /// Executes `batch`, returning one [`ProviderResult`] per request **in
    /// the same order as `batch`** on success, or a single error representing
    /// a batch-wide failure.
    async fn execute(&self, batch: &[Request]) -> Result<Vec<ProviderResult>, Error>;
}

fn to_provider_request(request: &Request) -> ProviderRequest {
    ProviderRequest {
        messages: request.messages.iter().map(ProviderMessage::from).collect(),
        tools: request.tools.clone().unwrap_or_default(),
    }
}

/// Innermost executor: owns the provider adaptor bound to one model.
pub struct BaseExecutor {
    adaptor: Box<dyn ProviderAdaptor>,
}

impl BaseExecutor {
    #[must_use]
    pub fn new(adaptor: Box<dyn ProviderAdaptor>) -> Self {
        Self { adaptor }
    }
}

#[async_trait]
impl BatchExecutor for BaseExecutor {
    async fn execute(&self, batch: &[Request]) -> Result<Vec<ProviderResult>, Error> {
        let provider_batch: Vec<ProviderRequest> = batch.iter().map(to_provider_request).collect();
        self.adaptor.invoke(&provider_batch).await
    }
}

/// Decorates an inner executor with exponential-backoff retry (§4.3).
pub struct RetryExecutor<E> {
    inner: E,
    policy: RetryPolicy,
    model: String,
    logger: std::sync::Arc<GatewayLogger>,
    cancel: CancellationToken,
    rng: Mutex<Rng>,
}

impl<E: BatchExecutor> RetryExecutor<E> {
    #[must_use]
    pub fn new(inner: E, policy: RetryPolicy, model: impl Into<String>, logger: std::sync::Arc<GatewayLogger>, cancel: CancellationToken) -> Self {
        Self {
            inner,
            policy,
            model: model.into(),
            logger,
            cancel,
            rng: Mutex::new(Rng::new()),
        }
    }
}

#[async_trait]
impl<E: BatchExecutor> BatchExecutor for RetryExecutor<E> {
    async fn execute(&self, batch: &[Request]) -> Result<Vec<ProviderResult>, Error> {
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            match self.inner.execute(batch).await {
                Ok(results) => return Ok(results),
                Err(error) => {
                    if error.is_cancelled() || !should_retry(&error, attempt, &self.policy) {
                        return Err(error);
                    }

                    let delay = {
                        let mut rng = self.rng.lock().await;
                        self.policy.delay_for(attempt, &mut rng)
                    };
                    let request_ids: Vec<String> = batch.iter().map(|r| r.request_id.clone()).collect();
                    #[allow(clippy::cast_possible_truncation)]
                    self.logger
                        .log_retry(&self.model, attempt, &request_ids, &error, delay.as_millis() as u64)
                        .await;

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.cancel.cancelled() => return Err(Error::Cancelled),
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Decorates an inner executor with sliding-window RPM/TPM admission
/// control (§4.4). Outermost in the fixed composition order, so a
/// rate-limit rejection never gets retried.
pub struct RateLimitExecutor<E> {
    inner: E,
    registry: std::sync::Arc<RateLimiterRegistry>,
    model: String,
    max_rpm: u32,
    max_tpm: u32,
    logger: std::sync::Arc<GatewayLogger>,
}

impl<E: BatchExecutor> RateLimitExecutor<E> {
    #[must_use]
    pub fn new(inner: E, registry: std::sync::Arc<RateLimiterRegistry>, model_id: impl Into<String>, config: &ModelConfig, logger: std::sync::Arc<GatewayLogger>) -> Self {
        let (max_rpm, max_tpm) = limits_for(config);
        Self {
            inner,
            registry,
            model: model_id.into(),
            max_rpm,
            max_tpm,
            logger,
        }
    }
}

#[async_trait]
impl<E: BatchExecutor> BatchExecutor for RateLimitExecutor<E> {
    async fn execute(&self, batch: &[Request]) -> Result<Vec<ProviderResult>, Error> {
        let tracker = self.registry.tracker_for(&self.model).await;

        // One admission check per request in the batch (not one for the whole
        // batch at once), matching §4.4's "consults the tracker for each
        // request in the batch".
        for request in batch {
            loop {
                let admission = tracker.admit(self.max_rpm, self.max_tpm).await;
                if admission.ok {
                    break;
                }
                let delay_s = tracker.delay_until_admit(self.max_rpm, self.max_tpm).await;
                if delay_s <= 0.0 {
                    return Err(Error::rate_limited(&self.model, admission.reason));
                }
                self.logger
                    .log_rate_limit(&self.model, &request.request_id, request.agent_id.as_deref(), &admission.reason, delay_s)
                    .await;
                self.registry.note_delay();
                tokio::time::sleep(delay_duration(delay_s)).await;
            }
        }

        let results = self.inner.execute(batch).await?;

        for (request, result) in batch.iter().zip(results.iter()) {
            let (input_tokens, output_tokens) = result
                .usage
                .map(|u| (u.input_tokens, u.output_tokens))
                .unwrap_or_else(|| (TokenCounter::count_request(request), crate::rate_limit::DEFAULT_OUTPUT_TOKEN_ESTIMATE));
            let total_tokens = input_tokens + output_tokens;
            tracker.record(total_tokens).await;
            self.logger
                .log_rate_limit_admitted(&self.model, &request.request_id, request.agent_id.as_deref(), input_tokens, output_tokens, total_tokens)
                .await;
        }

        Ok(results)
    }
}

//! Gateway Facade (§4.6): the crate's public surface. Owns one queue, one
//! composed executor stack, and one worker task per configured model.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::GatewayConfig;
use crate::error::Error;
use crate::executor::{BaseExecutor, BatchExecutor, RateLimitExecutor, RetryExecutor};
use crate::logging::GatewayLogger;
use crate::provider::HttpProviderAdaptor;
use crate::queue::RequestQueue;
use crate::rate_limit::RateLimiterRegistry;
use crate::retry::RetryPolicy;
use crate::router::{ResponseRouter, SharedRouter};
use crate::types::{ModelConfig, Request, Response};

type ComposedExecutor = RateLimitExecutor<RetryExecutor<BaseExecutor>>;

struct ModelRuntime {
    config: ModelConfig,
    queue: Arc<RequestQueue>,
    executor: Arc<ComposedExecutor>,
}

struct GatewayInner {
    models: HashMap<String, ModelRuntime>,
    router: SharedRouter,
    logger: Arc<GatewayLogger>,
    cancel: CancellationToken,
}

/// The gateway: construct once per process (or per test), `start()` it,
/// submit work through `request`/`batch`, and `stop()` it for a clean
/// cooperative shutdown.
pub struct Gateway {
    inner: Arc<GatewayInner>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Gateway {
    /// Builds a gateway from `config`, eagerly constructing one queue,
    /// provider adaptor, and composed executor per configured model (§3
    /// lifecycle: "Queues and executors are created eagerly per model at
    /// construction").
    ///
    /// # Errors
    /// Returns [`Error::Config`] if any model's provider adaptor fails to
    /// construct (e.g. the HTTP client cannot initialize).
    pub fn new(config: GatewayConfig) -> Result<Self, Error> {
        let logger = Arc::new(
            config
                .log_dir
                .clone()
                .map_or_else(GatewayLogger::disabled, GatewayLogger::new),
        );
        let router = Arc::new(ResponseRouter::new());
        let cancel = CancellationToken::new();
        let rate_limiter_registry = Arc::new(RateLimiterRegistry::new());

        let mut models = HashMap::with_capacity(config.models.len());
        for (model_id, model_config) in config.models {
            let adaptor = HttpProviderAdaptor::new(&model_config)?;
            let base = BaseExecutor::new(Box::new(adaptor));
            let retry = RetryExecutor::new(base, config.retry_policy, model_id.clone(), logger.clone(), cancel.clone());
            let rate_limited = RateLimitExecutor::new(retry, rate_limiter_registry.clone(), model_id.clone(), &model_config, logger.clone());

            models.insert(
                model_id,
                ModelRuntime {
                    config: model_config,
                    queue: Arc::new(RequestQueue::new()),
                    executor: Arc::new(rate_limited),
                },
            );
        }

        Ok(Self {
            inner: Arc::new(GatewayInner {
                models,
                router,
                logger,
                cancel,
            }),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// The policy a [`GatewayConfig`] carries unless overridden with
    /// [`GatewayConfig::with_retry_policy`].
    #[must_use]
    pub fn default_retry_policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    /// Spawns one worker task per configured model. Idempotent to call once;
    /// calling it twice spawns a second set of workers racing the first —
    /// callers are expected to call it exactly once per gateway lifetime.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        for (model_id, runtime) in &self.inner.models {
            let model_id = model_id.clone();
            let queue = runtime.queue.clone();
            let executor = runtime.executor.clone();
            let router = self.inner.router.clone();
            let logger = self.inner.logger.clone();
            let cancel = self.inner.cancel.clone();
            let batch_size = runtime.config.batch_size;
            let batch_timeout_ms = runtime.config.batch_timeout_ms;

            let handle = tokio::spawn(async move {
                worker_loop(model_id, queue, executor, router, logger, cancel, batch_size, batch_timeout_ms).await;
            });
            workers.push(handle);
        }
    }

    /// Signals cancellation to every worker, waits for them to exit, then
    /// rejects anything left in each queue that never made it into a batch.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        let handles: Vec<_> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }

        for runtime in self.inner.models.values() {
            let leftover = runtime.queue.drain_all().await;
            for request in leftover {
                self.inner
                    .router
                    .reject(&request.request_id, Error::Cancelled, &self.inner.logger)
                    .await;
            }
        }
    }

    /// Submits one request and awaits its completion.
    ///
    /// # Errors
    /// [`Error::UnknownModel`] if `request.model` has no configured entry;
    /// [`Error::Validation`] if `request.messages` is empty; otherwise
    /// whatever terminal error the executor stack produced.
    pub async fn request(&self, request: Request) -> Result<Response, Error> {
        dispatch_request(&self.inner, request).await
    }

    /// Submits many requests concurrently and returns their responses in the
    /// same order as `requests`, regardless of how many distinct models they
    /// target or how long any individual model's queue takes to drain. A
    /// per-model-group concatenation (what a naive implementation groups
    /// requests by model and appends each group's results) can reorder
    /// results whenever more than one model is present; indexing each
    /// result back to its original position, as done here, cannot.
    pub async fn batch(&self, requests: Vec<Request>) -> Vec<Result<Response, Error>> {
        let mut set = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let inner = self.inner.clone();
            set.spawn(async move { (index, dispatch_request(&inner, request).await) });
        }

        let mut results: Vec<Option<Result<Response, Error>>> = Vec::new();
        while let Some(joined) = set.join_next().await {
            if let Ok((index, result)) = joined {
                if results.len() <= index {
                    results.resize_with(index + 1, || None);
                }
                results[index] = Some(result);
            }
        }

        results.into_iter().map(|r| r.unwrap_or(Err(Error::Cancelled))).collect()
    }
}

async fn dispatch_request(inner: &GatewayInner, request: Request) -> Result<Response, Error> {
    let Some(runtime) = inner.models.get(&request.model) else {
        return Err(Error::unknown_model(request.model.clone()));
    };
    if request.messages.is_empty() {
        return Err(Error::validation("request.messages must not be empty"));
    }

    inner.logger.log_enqueued(&request).await;
    let handle = inner.router.register(&request).await;
    runtime.queue.submit(request).await;

    match handle.await {
        Ok(result) => result,
        Err(_recv_error) => Err(Error::Cancelled),
    }
}

async fn worker_loop(
    model_id: String,
    queue: Arc<RequestQueue>,
    executor: Arc<ComposedExecutor>,
    router: SharedRouter,
    logger: Arc<GatewayLogger>,
    cancel: CancellationToken,
    batch_size: usize,
    batch_timeout_ms: u64,
) {
    loop {
        let batch = queue.collect_batch(batch_size, batch_timeout_ms, &cancel).await;
        if batch.is_empty() {
            if cancel.is_cancelled() {
                break;
            }
            continue;
        }

        debug!(model = %model_id, batch_size = batch.len(), "dispatching batch");
        dispatch_batch(&model_id, &batch, executor.as_ref(), &router, &logger).await;

        if cancel.is_cancelled() {
            break;
        }
    }
}

/// Executes `batch` against the fully composed executor stack and finalizes
/// every handle in it — either resolving with a per-request [`Response`] on
/// success, or rejecting the whole batch with the same terminal error on
/// failure. This is the single place handle resolution happens, matching
/// §4.6's "worker swallows non-cancellation errors from execute (handle
/// resolution already covered them)".
async fn dispatch_batch(model_id: &str, batch: &[Request], executor: &dyn BatchExecutor, router: &ResponseRouter, logger: &GatewayLogger) {
    let started = Instant::now();
    let request_ids: Vec<String> = batch.iter().map(|r| r.request_id.clone()).collect();
    match executor.execute(batch).await {
        Ok(results) => {
            let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            for (request, result) in batch.iter().zip(results.into_iter()) {
                let response = Response {
                    request_id: request.request_id.clone(),
                    content: result.content,
                    tool_calls: result.tool_calls,
                    usage: result.usage,
                    latency_ms,
                };
                router.resolve(response, logger).await;
            }
            logger.log_batch(model_id, &request_ids, latency_ms).await;
        }
        Err(error) => {
            logger.log_batch_error(model_id, &request_ids, &error).await;
            for request in batch {
                router.reject(&request.request_id, error.clone(), logger).await;
            }
            if !error.is_cancelled() {
                info!(model = model_id, batch_size = batch.len(), kind = error.kind(), "batch failed");
            }
        }
    }
}

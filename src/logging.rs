//! Audit logging: one append-only JSONL file per event category under a
//! `gateway/` subdirectory of the configured log directory (`<log_dir>/
//! gateway/batches.jsonl`, etc., per §6), each entry paired with a live
//! `tracing` event.
//!
//! JSONL lines are appended with a plain `O_APPEND` write rather than a
//! temp-file-plus-rename whole-file replace — an audit log is never read
//! back mid-write by another process the way a cache file might be, and
//! POSIX guarantees an `O_APPEND` write below the filesystem's atomic-write
//! threshold (a JSON line comfortably is) never interleaves with a
//! concurrent one.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::types::{Request, Response};

/// Names of the JSONL files this logger maintains, relative to the
/// `gateway/` subdirectory of its log directory.
mod files {
    /// Subdirectory every JSONL file in this module lives under, per §6's
    /// `gateway/batches.jsonl` etc. paths.
    pub const SUBDIR: &str = "gateway";
    pub const BATCHES: &str = "batches.jsonl";
    /// Batch-wide terminal failures, shaped exactly per §6's `errors.jsonl`
    /// schema (`{timestamp, model, request_ids[], error, status}`) — never
    /// mixed with the per-request shape [`REQUEST_ERRORS`] writes.
    pub const ERRORS: &str = "errors.jsonl";
    pub const RETRIES: &str = "retries.jsonl";
    pub const RATE_LIMITS: &str = "rate_limits.jsonl";
    pub const RESPONSES: &str = "responses.jsonl";
    /// Per-request terminal-error records (§6 names no such file; kept
    /// separate from `errors.jsonl` so that file's schema stays exactly as
    /// documented rather than mixing two incompatible record shapes).
    pub const REQUEST_ERRORS: &str = "request_errors.jsonl";
}

/// Initializes a process-wide `tracing-subscriber` the same way this
/// codebase's other binaries do: level from `LLM_GATEWAY_LOG` (falling back
/// to `error`), format (`text` or `json`) from `LLM_GATEWAY_LOG_FORMAT`. A
/// caller embedding this crate alongside other tooling that already called
/// `tracing_subscriber::registry().init()` should skip this and just rely on
/// the ambient subscriber — `tracing` events fire regardless of whether a
/// subscriber is installed.
pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let log_level = std::env::var("LLM_GATEWAY_LOG").unwrap_or_else(|_| "error".to_string());
    let env_filter = EnvFilter::try_new(&log_level)
        .or_else(|_| EnvFilter::try_new("error"))
        .unwrap_or_else(|_| EnvFilter::new("error"));

    let json_format = std::env::var("LLM_GATEWAY_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json_format {
        let layer = tracing_subscriber::fmt::layer().json().with_target(true).with_line_number(true);
        let _ = tracing_subscriber::registry().with(env_filter).with(layer).try_init();
    } else {
        let layer = tracing_subscriber::fmt::layer().with_target(false);
        let _ = tracing_subscriber::registry().with(env_filter).with(layer).try_init();
    }
}

/// Appends structured audit records to `<log_dir>/{batches,errors,retries,
/// rate_limits,responses}.jsonl` and mirrors each one as a `tracing` event.
///
/// Constructed once per [`crate::gateway::Gateway`] and shared across its
/// workers; each log file gets its own lazily-opened handle behind a mutex so
/// concurrent writers serialize per-file rather than globally.
pub struct GatewayLogger {
    log_dir: Option<PathBuf>,
    handles: Mutex<HashMap<&'static str, File>>,
}

impl GatewayLogger {
    /// Logs to `log_dir`, creating it if necessary the first time a file is
    /// opened.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: Some(log_dir.into()),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// A logger that only emits `tracing` events and writes no files —
    /// used by unit tests and by configurations that opt out of the JSONL
    /// audit trail.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            log_dir: None,
            handles: Mutex::new(HashMap::new()),
        }
    }

    async fn append(&self, file_name: &'static str, line: &str) {
        let Some(log_dir) = &self.log_dir else {
            return;
        };

        let mut handles = self.handles.lock().await;
        if !handles.contains_key(file_name) {
            let subdir = log_dir.join(files::SUBDIR);
            if let Err(err) = tokio::fs::create_dir_all(&subdir).await {
                error!(file = file_name, %err, "failed to create gateway log directory");
                return;
            }
            let path = subdir.join(file_name);
            match OpenOptions::new().create(true).append(true).open(&path).await {
                Ok(file) => {
                    handles.insert(file_name, file);
                }
                Err(err) => {
                    error!(file = %path.display(), %err, "failed to open gateway log file");
                    return;
                }
            }
        }

        if let Some(file) = handles.get_mut(file_name) {
            let mut bytes = line.as_bytes().to_vec();
            bytes.push(b'\n');
            if let Err(err) = file.write_all(&bytes).await {
                error!(file = file_name, %err, "failed to append to gateway log file");
            }
        }
    }

    async fn append_json(&self, file_name: &'static str, record: &impl Serialize) {
        match serde_json::to_string(record) {
            Ok(line) => self.append(file_name, &line).await,
            Err(err) => error!(file = file_name, %err, "failed to serialize gateway log record"),
        }
    }

    /// Records that `model` dispatched a batch naming `request_ids`,
    /// successfully, after `latency_ms` spent on the provider call (§4.2/§6).
    pub async fn log_batch(&self, model: &str, request_ids: &[String], latency_ms: u64) {
        info!(model, batch_size = request_ids.len(), latency_ms, "batch dispatched");
        self.append_json(
            files::BATCHES,
            &BatchRecord {
                timestamp: now_rfc3339(),
                model,
                batch_size: request_ids.len(),
                request_ids,
                latency_ms,
                status: "success",
            },
        )
        .await;
    }

    /// Records a batch-wide terminal failure (§4.2/§6): every request named
    /// in `request_ids` was rejected with `error`.
    pub async fn log_batch_error(&self, model: &str, request_ids: &[String], error: &Error) {
        error!(model, batch_size = request_ids.len(), kind = error.kind(), %error, "batch failed");
        self.append_json(
            files::ERRORS,
            &BatchErrorRecord {
                timestamp: now_rfc3339(),
                model,
                request_ids,
                error: &error.to_string(),
                status: "error",
            },
        )
        .await;
    }

    /// Records a terminal failure delivered to one caller's handle (§4.5).
    /// `agent_id` is the originating request's, logged here rather than
    /// looked up after the fact since by the time this is called the router
    /// has already unregistered the request.
    ///
    /// Written to `request_errors.jsonl`, not `errors.jsonl`: §6 defines
    /// `errors.jsonl` as the batch-wide record [`Self::log_batch_error`]
    /// writes (`{timestamp, model, request_ids[], error, status}`); a
    /// per-request record has a different shape and would otherwise mix two
    /// incompatible schemas into one documented file.
    pub async fn log_error(&self, request_id: &str, agent_id: Option<&str>, error: &Error) {
        error!(request_id, agent_id, kind = error.kind(), %error, "request failed");
        self.append_json(
            files::REQUEST_ERRORS,
            &ErrorRecord {
                timestamp: now_rfc3339(),
                request_id,
                agent_id,
                kind: error.kind(),
                message: &error.to_string(),
                status: "error",
            },
        )
        .await;
    }

    /// Records one retry attempt for a batch against `model` (§4.3/§6).
    pub async fn log_retry(&self, model: &str, attempt: u32, request_ids: &[String], error: &Error, delay_ms: u64) {
        warn!(model, attempt, kind = error.kind(), delay_ms, %error, "retrying batch");
        self.append_json(
            files::RETRIES,
            &RetryRecord {
                timestamp: now_rfc3339(),
                model,
                attempt,
                request_ids,
                error: &error.to_string(),
                delay_ms,
                status: "retry",
            },
        )
        .await;
    }

    /// Records a rate-limit admission delay for one request against `model`
    /// (§4.4/§6).
    pub async fn log_rate_limit(&self, model: &str, request_id: &str, agent_id: Option<&str>, reason: &str, delay_s: f64) {
        warn!(model, request_id, reason, delay_s, "rate limit delayed admission");
        self.append_json(
            files::RATE_LIMITS,
            &RateLimitRecord {
                timestamp: now_rfc3339(),
                model,
                request_id,
                agent_id,
                reason,
                wait_seconds: delay_s,
                status: "rate_limited",
            },
        )
        .await;
    }

    /// Records that a request's usage was admitted into the rate-limit
    /// window after a successful provider call (§4.4/§6's "success" variant
    /// of `rate_limits.jsonl`).
    pub async fn log_rate_limit_admitted(&self, model: &str, request_id: &str, agent_id: Option<&str>, input_tokens: u64, output_tokens: u64, total_tokens: u64) {
        self.append_json(
            files::RATE_LIMITS,
            &RateLimitAdmittedRecord {
                timestamp: now_rfc3339(),
                model,
                request_id,
                agent_id,
                input_tokens,
                output_tokens,
                total_tokens,
                status: "success",
            },
        )
        .await;
    }

    /// Records a successful completion delivered to a caller (§4.5/§6).
    /// Carries one field beyond §6's documented `responses.jsonl` shape
    /// (`total_tokens`, omitted when the provider reported no usage) as a
    /// harmless enrichment for consumers that want per-request token spend
    /// without cross-referencing `rate_limits.jsonl`.
    pub async fn log_response(&self, response: &Response, agent_id: Option<&str>) {
        info!(
            request_id = %response.request_id,
            agent_id,
            latency_ms = response.latency_ms,
            "request completed"
        );
        self.append_json(
            files::RESPONSES,
            &ResponseRecord {
                timestamp: now_rfc3339(),
                request_id: &response.request_id,
                agent_id,
                latency_ms: response.latency_ms,
                total_tokens: response.usage.map(|u| u.total()),
                status: "success",
            },
        )
        .await;
    }

    /// Records that a request was accepted into the queue (used by the
    /// facade before the batch it lands in is known).
    pub async fn log_enqueued(&self, request: &Request) {
        info!(
            request_id = %request.request_id,
            model = %request.model,
            agent_id = request.agent_id.as_deref(),
            "request enqueued"
        );
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Serialize)]
struct BatchRecord<'a> {
    timestamp: String,
    model: &'a str,
    batch_size: usize,
    request_ids: &'a [String],
    latency_ms: u64,
    status: &'static str,
}

#[derive(Serialize)]
struct BatchErrorRecord<'a> {
    timestamp: String,
    model: &'a str,
    request_ids: &'a [String],
    error: &'a str,
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorRecord<'a> {
    timestamp: String,
    request_id: &'a str,
    agent_id: Option<&'a str>,
    kind: &'a str,
    message: &'a str,
    status: &'static str,
}

#[derive(Serialize)]
struct RetryRecord<'a> {
    timestamp: String,
    model: &'a str,
    attempt: u32,
    request_ids: &'a [String],
    error: &'a str,
    delay_ms: u64,
    status: &'static str,
}

#[derive(Serialize)]
struct RateLimitRecord<'a> {
    timestamp: String,
    model: &'a str,
    request_id: &'a str,
    agent_id: Option<&'a str>,
    reason: &'a str,
    wait_seconds: f64,
    status: &'static str,
}

#[derive(Serialize)]
struct RateLimitAdmittedRecord<'a> {
    timestamp: String,
    model: &'a str,
    request_id: &'a str,
    agent_id: Option<&'a str>,
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
    status: &'static str,
}

#[derive(Serialize)]
struct ResponseRecord<'a> {
    timestamp: String,
    request_id: &'a str,
    agent_id: Option<&'a str>,
    latency_ms: u64,
    total_tokens: Option<u64>,
    status: &'static str,
}

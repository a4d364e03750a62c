//! Response Router (§4.5): registers pending request↔handle pairs and
//! resolves them with results or errors, exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::warn;

use crate::error::Error;
use crate::logging::GatewayLogger;
use crate::types::{Request, Response};

/// The gateway's side of a one-shot completion. Dropped automatically once
/// `resolve`/`reject` has been called (or never, if the caller cancelled by
/// dropping its [`ResponseHandle`] first — `send` on a closed channel is a
/// silent no-op, matching §4.5's idempotence requirement).
pub type CompletionSender = oneshot::Sender<Result<Response, Error>>;

/// The caller's side of a one-shot completion, awaited to get the final
/// [`Response`] or [`Error`].
pub type ResponseHandle = oneshot::Receiver<Result<Response, Error>>;

struct PendingEntry {
    agent_id: Option<String>,
    sender: Option<CompletionSender>,
}

/// Tracks in-flight `request_id → (request metadata, completion sender)`
/// pairs for one gateway instance. Touched from the facade's `request` path
/// (on register) and from the executor/worker side (on resolve/reject);
/// guarded by a single async mutex since both sides only ever do brief,
/// non-blocking map operations under it.
#[derive(Default)]
pub struct ResponseRouter {
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl ResponseRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending request, returning the handle the caller awaits.
    ///
    /// # Panics
    /// Debug-asserts that `request_id` is not already pending; in release
    /// builds a duplicate registration silently replaces the earlier one's
    /// sender, which would leave the first caller's handle dangling forever
    /// — callers are expected to guarantee `request_id` uniqueness per §3.
    pub async fn register(&self, request: &Request) -> ResponseHandle {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().await;
        debug_assert!(
            !pending.contains_key(&request.request_id),
            "duplicate request_id registered: {}",
            request.request_id
        );
        pending.insert(
            request.request_id.clone(),
            PendingEntry {
                agent_id: request.agent_id.clone(),
                sender: Some(tx),
            },
        );
        rx
    }

    /// Resolves `response.request_id` with `response`. A second resolution
    /// for the same id, or resolution of an id the caller already cancelled
    /// out from under us, is a silent no-op per §4.5.
    pub async fn resolve(&self, response: Response, logger: &GatewayLogger) {
        let agent_id = self.take_and_unregister(&response.request_id, |sender| {
            let _ = sender.send(Ok(response.clone()));
        }).await;

        match agent_id {
            Some(agent_id) => logger.log_response(&response, agent_id.as_deref()).await,
            None => warn!(request_id = %response.request_id, "resolve: no pending handle for request_id"),
        }
    }

    /// Rejects `request_id` with `error`. Symmetric with [`Self::resolve`].
    pub async fn reject(&self, request_id: &str, error: Error, logger: &GatewayLogger) {
        let error_for_send = error.clone();
        let agent_id = self
            .take_and_unregister(request_id, move |sender| {
                let _ = sender.send(Err(error_for_send));
            })
            .await;

        match agent_id {
            Some(agent_id) => logger.log_error(request_id, agent_id.as_deref(), &error).await,
            None => warn!(request_id, "reject: no pending handle for request_id"),
        }
    }

    /// Looks the entry up, invokes `complete` on its sender (if present and
    /// not already consumed), and unregisters it — returning the request's
    /// `agent_id` *before* discarding the entry, so the caller can still log
    /// it. Returns `None` if nothing was pending for this id.
    async fn take_and_unregister(
        &self,
        request_id: &str,
        complete: impl FnOnce(CompletionSender),
    ) -> Option<Option<String>> {
        let mut pending = self.pending.lock().await;
        let entry = pending.remove(request_id)?;
        if let Some(sender) = entry.sender {
            complete(sender);
        }
        Some(entry.agent_id)
    }

    /// Number of requests currently awaiting resolution. Used by tests and
    /// by `stop()` to size its rejection sweep.
    pub async fn pending_ids(&self) -> Vec<String> {
        self.pending.lock().await.keys().cloned().collect()
    }
}

/// Shared, cloneable handle to one gateway's router, passed to workers.
pub type SharedRouter = Arc<ResponseRouter>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::GatewayLogger;
    use crate::types::Message;

    fn sample_request(id: &str) -> Request {
        Request {
            request_id: id.to_string(),
            model: "test-model".to_string(),
            messages: vec![Message::user("hi")],
            tools: None,
            temperature: 0.0,
            agent_id: Some("agent-1".to_string()),
            trace_id: None,
        }
    }

    #[tokio::test]
    async fn resolve_delivers_response_to_handle() {
        let router = ResponseRouter::new();
        let logger = GatewayLogger::disabled();
        let request = sample_request("r1");
        let handle = router.register(&request).await;

        router
            .resolve(
                Response {
                    request_id: "r1".to_string(),
                    content: "ok".to_string(),
                    tool_calls: None,
                    usage: None,
                    latency_ms: 5,
                },
                &logger,
            )
            .await;

        let result = handle.await.unwrap();
        assert_eq!(result.unwrap().request_id, "r1");
    }

    #[tokio::test]
    async fn double_resolve_is_a_silent_no_op() {
        let router = ResponseRouter::new();
        let logger = GatewayLogger::disabled();
        let request = sample_request("r2");
        let handle = router.register(&request).await;

        router
            .resolve(
                Response {
                    request_id: "r2".to_string(),
                    content: "first".to_string(),
                    tool_calls: None,
                    usage: None,
                    latency_ms: 1,
                },
                &logger,
            )
            .await;

        // Second resolve for an id that's already unregistered: no panic, no effect.
        router
            .resolve(
                Response {
                    request_id: "r2".to_string(),
                    content: "second".to_string(),
                    tool_calls: None,
                    usage: None,
                    latency_ms: 1,
                },
                &logger,
            )
            .await;

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.content, "first");
    }

    #[tokio::test]
    async fn reject_delivers_error() {
        let router = ResponseRouter::new();
        let logger = GatewayLogger::disabled();
        let request = sample_request("r3");
        let handle = router.register(&request).await;

        router.reject("r3", Error::Cancelled, &logger).await;

        let result = handle.await.unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn caller_dropping_handle_does_not_panic_resolver() {
        let router = ResponseRouter::new();
        let logger = GatewayLogger::disabled();
        let request = sample_request("r4");
        let handle = router.register(&request).await;
        drop(handle);

        router
            .resolve(
                Response {
                    request_id: "r4".to_string(),
                    content: "too late".to_string(),
                    tool_calls: None,
                    usage: None,
                    latency_ms: 1,
                },
                &logger,
            )
            .await;
    }
}

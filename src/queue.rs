//! Per-model request queue with deadline-driven batch formation (§4.1).

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::types::Request;

/// FIFO queue for one model. The completion handle for a request lives in
/// the [`crate::router::ResponseRouter`], keyed by `request_id`, rather than
/// travelling alongside the request here — one registry of one-shot senders
/// is simpler than keeping the queue's copy and the router's copy in sync,
/// and the router is already the thing both the worker (resolving) and the
/// facade (registering) share.
///
/// `submit` never blocks; `collect_batch` is the sole consumer-side
/// operation and is meant to be called from exactly one worker task per
/// model (§5's "single-consumer-per-model" discipline) — concurrent callers
/// of `collect_batch` on the same queue would race for entries, which this
/// type does not guard against since the facade only ever spawns one worker
/// per model.
#[derive(Default)]
pub struct RequestQueue {
    pending: Mutex<Vec<Request>>,
}

impl RequestQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn submit(&self, request: Request) {
        self.pending.lock().await.push(request);
    }

    /// Blocks until at least one entry is pending, then accumulates further
    /// entries up to `batch_size` or until `batch_timeout_ms` has elapsed
    /// since the *first* entry arrived, whichever comes first. Returns
    /// entries in submission order.
    ///
    /// Cancellation-aware: if `cancel` fires while waiting for the first
    /// entry, returns an empty vec so the worker can exit its loop.
    pub async fn collect_batch(
        &self,
        batch_size: usize,
        batch_timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> Vec<Request> {
        self.wait_for_first_entry(cancel).await;
        if cancel.is_cancelled() {
            return Vec::new();
        }

        let deadline = Instant::now() + Duration::from_millis(batch_timeout_ms);
        loop {
            {
                let mut pending = self.pending.lock().await;
                if pending.len() >= batch_size || batch_size == 0 {
                    return drain_up_to(&mut pending, batch_size);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let mut pending = self.pending.lock().await;
                return drain_up_to(&mut pending, batch_size);
            }

            tokio::select! {
                () = sleep(deadline - now) => {
                    let mut pending = self.pending.lock().await;
                    return drain_up_to(&mut pending, batch_size);
                }
                () = cancel.cancelled() => {
                    let mut pending = self.pending.lock().await;
                    return drain_up_to(&mut pending, batch_size);
                }
                () = poll_nonempty(&self.pending) => {}
            }
        }
    }

    async fn wait_for_first_entry(&self, cancel: &CancellationToken) {
        loop {
            if !self.pending.lock().await.is_empty() || cancel.is_cancelled() {
                return;
            }
            tokio::select! {
                () = sleep(Duration::from_millis(5)) => {}
                () = cancel.cancelled() => return,
            }
        }
    }

    /// Drains and returns everything still pending — used by `stop()` to
    /// reject whatever never made it into a batch.
    pub async fn drain_all(&self) -> Vec<Request> {
        let mut pending = self.pending.lock().await;
        pending.drain(..).collect()
    }
}

fn drain_up_to(pending: &mut Vec<Request>, batch_size: usize) -> Vec<Request> {
    let take = if batch_size == 0 {
        pending.len()
    } else {
        pending.len().min(batch_size)
    };
    pending.drain(..take).collect()
}

/// Resolves once `pending` is non-empty, re-checked on a short poll interval.
/// `collect_batch`'s select loop uses this instead of a condvar since the
/// queue has no async-notify primitive wired to `submit` — a 5ms poll is
/// cheap and keeps the implementation free of a second synchronization
/// primitive alongside the mutex.
async fn poll_nonempty(pending: &Mutex<Vec<Request>>) {
    loop {
        if !pending.lock().await.is_empty() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn sample_request(id: &str) -> Request {
        Request {
            request_id: id.to_string(),
            model: "m".to_string(),
            messages: vec![Message::user("hi")],
            tools: None,
            temperature: 0.0,
            agent_id: None,
            trace_id: None,
        }
    }

    #[tokio::test]
    async fn collect_batch_returns_immediately_once_size_reached() {
        let queue = RequestQueue::new();
        let cancel = CancellationToken::new();

        for i in 0..3 {
            queue.submit(sample_request(&format!("r{i}"))).await;
        }

        let batch = queue.collect_batch(3, 10_000, &cancel).await;
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].request_id, "r0");
        assert_eq!(batch[2].request_id, "r2");
    }

    #[tokio::test]
    async fn collect_batch_returns_on_deadline_with_fewer_entries() {
        let queue = RequestQueue::new();
        let cancel = CancellationToken::new();

        queue.submit(sample_request("only")).await;

        let start = Instant::now();
        let batch = queue.collect_batch(10, 50, &cancel).await;
        assert_eq!(batch.len(), 1);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn collect_batch_preserves_fifo_order() {
        let queue = RequestQueue::new();
        let cancel = CancellationToken::new();

        for i in 0..5 {
            queue.submit(sample_request(&format!("r{i}"))).await;
        }

        let batch = queue.collect_batch(0, 10, &cancel).await;
        let ids: Vec<_> = batch.iter().map(|e| e.request_id.clone()).collect();
        assert_eq!(ids, vec!["r0", "r1", "r2", "r3", "r4"]);
    }

    #[tokio::test]
    async fn cancellation_unblocks_collect_batch() {
        let queue = RequestQueue::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let batch = queue.collect_batch(10, 10_000, &cancel).await;
        assert!(batch.is_empty());
    }
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fastrand::Rng;
use proptest::prelude::*;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use llm_gateway::error::Error;
use llm_gateway::executor::{BaseExecutor, BatchExecutor, RetryExecutor};
use llm_gateway::logging::GatewayLogger;
use llm_gateway::provider::{ProviderAdaptor, ProviderRequest, ProviderResult};
use llm_gateway::retry::RetryPolicy;
use llm_gateway::types::{Message, Request};

struct AlwaysTransient {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ProviderAdaptor for AlwaysTransient {
    async fn invoke(&self, _batch: &[ProviderRequest]) -> Result<Vec<ProviderResult>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::transient("503"))
    }
}

fn sample_request() -> Request {
    Request {
        request_id: "r".to_string(),
        model: "m".to_string(),
        messages: vec![Message::user("hi")],
        tools: None,
        temperature: 0.0,
        agent_id: None,
        trace_id: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Property 7 — retry budget: a batch that always fails transiently is
    /// invoked at most `max_retries + 1` times.
    #[test]
    fn retry_budget_is_never_exceeded(max_retries in 0u32..6) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let calls = Arc::new(AtomicU32::new(0));
            let base = BaseExecutor::new(Box::new(AlwaysTransient { calls: calls.clone() }));
            let policy = RetryPolicy::new(max_retries, 1, 1.0, 0);
            let retry = RetryExecutor::new(base, policy, "m", Arc::new(GatewayLogger::disabled()), CancellationToken::new());

            let batch = vec![sample_request()];
            let err = retry.execute(&batch).await.unwrap_err();
            prop_assert!(err.is_transient());
            prop_assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
            Ok(())
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property 8 — backoff monotonicity: the jitter-free base delay grows
    /// monotonically with attempt number, and the jittered delay always
    /// lies within `[max(0, base - jitter), base + jitter]`.
    #[test]
    fn backoff_grows_monotonically_and_jitter_stays_bounded(
        initial_delay_ms in 1u64..2_000,
        multiplier in 1.0f64..3.0,
        jitter_ms in 0u64..1_000,
        attempt in 0u32..8,
    ) {
        let policy = RetryPolicy::new(10, initial_delay_ms, multiplier, jitter_ms);
        let mut rng = Rng::new();

        let base_now = (initial_delay_ms as f64 * multiplier.powi(attempt as i32)).round() as i64;
        let base_next = (initial_delay_ms as f64 * multiplier.powi(attempt as i32 + 1)).round() as i64;
        prop_assert!(base_next >= base_now);

        for _ in 0..10 {
            let delay = policy.delay_for(attempt, &mut rng).as_millis() as i64;
            prop_assert!(delay >= (base_now - jitter_ms as i64).max(0));
            prop_assert!(delay <= base_now + jitter_ms as i64);
        }
    }
}

use std::sync::Arc;

use proptest::prelude::*;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use llm_gateway::queue::RequestQueue;
use llm_gateway::types::{Message, Request};

fn sample_request(id: usize) -> Request {
    Request {
        request_id: format!("r{id}"),
        model: "m".to_string(),
        messages: vec![Message::user("hi")],
        tools: None,
        temperature: 0.0,
        agent_id: None,
        trace_id: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property 3 — batch bound: no returned batch ever exceeds `batch_size`,
    /// regardless of how many requests were submitted ahead of it.
    #[test]
    fn collect_batch_never_exceeds_configured_size(
        submitted in 1usize..20,
        batch_size in 1usize..10,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let queue = Arc::new(RequestQueue::new());
            for i in 0..submitted {
                queue.submit(sample_request(i)).await;
            }

            let cancel = CancellationToken::new();
            let batch = queue.collect_batch(batch_size, 5_000, &cancel).await;
            prop_assert!(batch.len() <= batch_size);
            Ok(())
        })?;
    }

    /// Property 5 — FIFO within a model: requests come back out of the
    /// queue in the order they were submitted.
    #[test]
    fn collect_batch_preserves_submission_order(submitted in 1usize..20) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let queue = Arc::new(RequestQueue::new());
            for i in 0..submitted {
                queue.submit(sample_request(i)).await;
            }

            let cancel = CancellationToken::new();
            let batch = queue.collect_batch(0, 5_000, &cancel).await;
            let ids: Vec<String> = batch.iter().map(|r| r.request_id.clone()).collect();
            let expected: Vec<String> = (0..submitted).map(|i| format!("r{i}")).collect();
            prop_assert_eq!(ids, expected);
            Ok(())
        })?;
    }
}

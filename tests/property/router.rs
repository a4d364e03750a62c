use proptest::prelude::*;
use tokio::runtime::Runtime;

use llm_gateway::logging::GatewayLogger;
use llm_gateway::router::ResponseRouter;
use llm_gateway::types::{Message, Request, Response};

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

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Property 9 — idempotent resolution: resolving a request_id a second
    /// time, with any different content, never changes what the caller
    /// already observed.
    #[test]
    fn second_resolve_never_overwrites_the_first(first_content in ".{0,20}", second_content in ".{0,20}") {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let router = ResponseRouter::new();
            let logger = GatewayLogger::disabled();
            let request = sample_request("r1");
            let handle = router.register(&request).await;

            router
                .resolve(
                    Response {
                        request_id: "r1".to_string(),
                        content: first_content.clone(),
                        tool_calls: None,
                        usage: None,
                        latency_ms: 1,
                    },
                    &logger,
                )
                .await;
            router
                .resolve(
                    Response {
                        request_id: "r1".to_string(),
                        content: second_content,
                        tool_calls: None,
                        usage: None,
                        latency_ms: 2,
                    },
                    &logger,
                )
                .await;

            let result = handle.await.unwrap().unwrap();
            prop_assert_eq!(result.content, first_content);
            Ok(())
        })?;
    }
}

use proptest::prelude::*;
use tokio::runtime::Runtime;

use llm_gateway::rate_limit::RateLimitTracker;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property 6 — rate-limit safety: once `max_rpm` samples occupy the
    /// window, `admit` refuses further requests until one rolls off, and the
    /// window's request count never exceeds `max_rpm`.
    #[test]
    fn admit_never_exceeds_configured_rpm(max_rpm in 1u32..10, attempts in 1u32..20) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let tracker = RateLimitTracker::new();
            let mut admitted = 0u32;

            for _ in 0..attempts {
                let admission = tracker.admit(max_rpm, 0).await;
                if admission.ok {
                    tracker.record(1).await;
                    admitted += 1;
                }
            }

            prop_assert!(admitted <= max_rpm);
            let (count, _tokens) = tracker.usage().await;
            prop_assert!(count as u32 <= max_rpm);
            Ok(())
        })?;
    }

    /// Property 6 (token half) — once the recorded token sum would reach
    /// `max_tpm`, further admission is refused.
    #[test]
    fn admit_never_exceeds_configured_tpm(max_tpm in 100u32..10_000, sample_tokens in 1u32..500) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let tracker = RateLimitTracker::new();
            let mut total_recorded: u64 = 0;

            for _ in 0..50 {
                let admission = tracker.admit(0, max_tpm).await;
                if !admission.ok {
                    break;
                }
                tracker.record(u64::from(sample_tokens)).await;
                total_recorded += u64::from(sample_tokens);
            }

            let (_count, tokens) = tracker.usage().await;
            prop_assert_eq!(tokens, total_recorded);
            prop_assert!(tokens < u64::from(max_tpm) + u64::from(sample_tokens));
            Ok(())
        })?;
    }
}

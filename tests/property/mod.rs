//! Property-based tests for the gateway's core invariants (§8).

pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod router;

//! A process-internal dispatcher for LLM completion requests: per-model
//! micro-batching, retry with exponential backoff and jitter, and sliding-
//! window RPM/TPM rate limiting, behind a three-call surface
//! (`request`/`batch`/`start`/`stop`).
//!
//! ```no_run
//! use llm_gateway::config::GatewayConfig;
//! use llm_gateway::gateway::Gateway;
//! use llm_gateway::types::{Message, Request};
//!
//! # async fn run() -> Result<(), llm_gateway::error::Error> {
//! let config = GatewayConfig::from_toml(r#"
//!     [models.gpt-mini]
//!     provider = "openai_compatible"
//!     endpoint = "https://api.example.com/v1/chat/completions"
//!     api_key = "secret"
//!     model_name = "gpt-4o-mini"
//! "#)?;
//! let gateway = Gateway::new(config)?;
//! gateway.start().await;
//!
//! let response = gateway
//!     .request(Request {
//!         request_id: "r-1".to_string(),
//!         model: "gpt-mini".to_string(),
//!         messages: vec![Message::user("hello")],
//!         tools: None,
//!         temperature: 0.0,
//!         agent_id: None,
//!         trace_id: None,
//!     })
//!     .await?;
//! println!("{}", response.content);
//!
//! gateway.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod logging;
pub mod provider;
pub mod queue;
pub mod rate_limit;
pub mod retry;
pub mod router;
pub mod types;

pub use error::Error;
pub use gateway::Gateway;
pub use types::{Message, Request, Response};

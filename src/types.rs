//! Wire-level data model shared by every layer of the gateway: the request/response
//! shapes callers submit and receive, the chat-message and tool-call records those
//! carry, and the per-model [`ModelConfig`] that drives queueing, batching, and
//! rate limiting.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chat role of a [`Message`] within a [`Request`]'s conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A provider-assigned reference binding an assistant's tool invocation to the
/// `tool`-role message that answers it.
///
/// # Invariant
/// A `tool_call.id` on an assistant message must appear in exactly one matching
/// `tool`-role message immediately following it in the same request's `messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRef {
    /// Provider-assigned id, echoed back on the matching `tool` reply.
    pub id: String,
    /// Name of the tool/function this call targets.
    pub name: String,
}

/// One turn in a [`Request`]'s conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set on `tool`-role messages; the name of the tool that produced `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Links this message to the tool call it answers (on `tool`-role messages)
    /// or the call it issues (on `assistant`-role messages).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRef>,
}

impl Message {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
            tool_call: None,
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
            tool_call: None,
        }
    }
}

/// A tool/function description offered to the model, `JSON-Schema`-shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    /// Parameter schema, `JSON-Schema`-shaped.
    pub parameters: serde_json::Value,
}

/// A request for a completion, as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-unique id; required for tracing and response routing.
    pub request_id: String,
    /// Model identifier; must resolve to a known [`ModelConfig`].
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Token accounting reported by a provider for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A tool call emitted by the model in a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Serialized (`JSON`-encoded) call arguments, as returned by the provider.
    pub arguments: String,
}

/// The result of a completion, echoed back to the caller that submitted the
/// matching [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Equal to the originating [`Request::request_id`].
    pub request_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub latency_ms: u64,
}

/// Named LLM provider families a [`ModelConfig`] may bind to.
///
/// Closed enumeration mirroring this crate's built-in adaptors; a custom
/// [`crate::provider::ProviderAdaptor`] may still be wired in for `Custom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenaiCompatible,
    Custom,
}

/// Immutable, closed configuration record for one model.
///
/// Deserializes from a TOML table (or any `serde` format) with exactly these
/// keys; unrecognized keys are a configuration error rather than being
/// silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub provider: Provider,
    pub endpoint: String,
    pub api_key: String,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests_per_minute: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_minute: Option<u32>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

const fn default_batch_size() -> usize {
    10
}

const fn default_batch_timeout_ms() -> u64 {
    100
}

impl ModelConfig {
    #[must_use]
    pub fn new(provider: Provider, endpoint: impl Into<String>, api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            provider,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model_name: model_name.into(),
            max_requests_per_minute: None,
            max_tokens_per_minute: None,
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }

    #[must_use]
    pub const fn with_rate_limits(mut self, max_rpm: Option<u32>, max_tpm: Option<u32>) -> Self {
        self.max_requests_per_minute = max_rpm;
        self.max_tokens_per_minute = max_tpm;
        self
    }

    #[must_use]
    pub const fn with_batching(mut self, batch_size: usize, batch_timeout_ms: u64) -> Self {
        self.batch_size = batch_size;
        self.batch_timeout_ms = batch_timeout_ms;
        self
    }
}

/// The operator-supplied mapping from model id to its configuration.
pub type ModelConfigs = HashMap<String, ModelConfig>;

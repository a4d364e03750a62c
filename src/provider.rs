//! Provider adaptor contract (§6) and the one shipped implementation: a
//! generic OpenAI-chat-completions-shaped HTTP adaptor built on `reqwest`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::types::{Message, ModelConfig, Role, Tool, ToolCall, Usage};

/// One message as handed to a provider adaptor: role, text content, and the
/// tool-call linkage needed to stitch assistant↔tool turns, stripped of
/// everything the gateway's own routing doesn't need the provider to see.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
    pub name: Option<String>,
    pub tool_call_id: Option<String>,
}

impl From<&Message> for ProviderMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            name: message.name.clone(),
            tool_call_id: message.tool_call.as_ref().map(|t| t.id.clone()),
        }
    }
}

/// One request's worth of adaptor input: its messages plus the tools offered
/// alongside them.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub messages: Vec<ProviderMessage>,
    pub tools: Vec<Tool>,
}

/// Result of one provider invocation, before the executor turns it into a
/// [`crate::types::Response`].
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub content: String,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub usage: Option<Usage>,
}

/// Pluggable per-provider backend a [`crate::executor::BaseExecutor`]
/// invokes with a batch of requests already translated into
/// [`ProviderRequest`] shape.
///
/// Sequential per-request invocation (looping and awaiting each call) is an
/// acceptable degradation when the backing service has no true batch API —
/// see [`HttpProviderAdaptor`].
#[async_trait]
pub trait ProviderAdaptor: Send + Sync {
    /// Invokes the provider once per entry in `batch`, returning one result
    /// per input **in order**. An error here is treated as a batch-wide
    /// failure by the executor.
    async fn invoke(&self, batch: &[ProviderRequest]) -> Result<Vec<ProviderResult>, Error>;
}

/// Generic adaptor for any OpenAI-compatible `/chat/completions` endpoint
/// (including self-hosted/local runners that mimic the wire format).
/// Invokes sequentially — this API shape has no multi-conversation batch
/// call — awaiting each request's response before starting the next.
pub struct HttpProviderAdaptor {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model_name: String,
}

impl HttpProviderAdaptor {
    /// Builds an adaptor bound to `config`'s endpoint, credential, and wire
    /// model name.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the underlying `reqwest::Client` cannot
    /// be constructed (e.g. TLS backend initialization failure).
    pub fn new(config: &ModelConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| Error::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model_name: config.model_name.clone(),
        })
    }

    async fn invoke_one(&self, request: &ProviderRequest) -> Result<ProviderResult, Error> {
        let body = ChatCompletionRequest {
            model: &self.model_name,
            messages: request.messages.iter().map(OutgoingMessage::from).collect(),
            tools: to_tool_specs(&request.tools),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| Error::permanent_provider(format!("malformed provider response: {err}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::permanent_provider("provider returned no choices"))?;

        let tool_calls = choice.message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect()
        });

        Ok(ProviderResult {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: parsed.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[async_trait]
impl ProviderAdaptor for HttpProviderAdaptor {
    async fn invoke(&self, batch: &[ProviderRequest]) -> Result<Vec<ProviderResult>, Error> {
        let mut results = Vec::with_capacity(batch.len());
        for request in batch {
            results.push(self.invoke_one(request).await?);
        }
        Ok(results)
    }
}

fn to_tool_specs(tools: &[Tool]) -> Option<Vec<ToolSpec<'_>>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|tool| ToolSpec {
                r#type: "function",
                function: FunctionSpec {
                    name: &tool.name,
                    description: &tool.description,
                    parameters: &tool.parameters,
                },
            })
            .collect(),
    )
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OutgoingMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec<'a>>>,
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "tool_call_id")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a ProviderMessage> for OutgoingMessage<'a> {
    fn from(message: &'a ProviderMessage) -> Self {
        Self {
            role: match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            },
            content: &message.content,
            name: message.name.as_deref(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct ToolSpec<'a> {
    r#type: &'static str,
    function: FunctionSpec<'a>,
}

#[derive(Serialize)]
struct FunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ProviderUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: IncomingMessage,
}

#[derive(Deserialize)]
struct IncomingMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<IncomingToolCall>>,
}

#[derive(Deserialize)]
struct IncomingToolCall {
    id: String,
    function: IncomingFunctionCall,
}

#[derive(Deserialize)]
struct IncomingFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ProviderUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

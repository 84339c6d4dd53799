//! OpenAI-compatible chat completions transport over `reqwest`.
//!
//! Works with any endpoint speaking the `/v1/chat/completions` dialect,
//! streaming through server-sent events.

use crate::config::{Configuration, EnvironmentLoader, ProviderConfig};
use crate::provider::error::{ProviderError, ProviderResult};
use crate::provider::retry::RetryPolicy;
use crate::provider::traits::{ChatStream, ChatTransport};
use crate::provider::types::{
    ChatRequest, ChatResponse, Message, StreamChunk, ToolCall, ToolChoice, Usage,
};
use anyhow::Context;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Connection details of one configured provider.
#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl Endpoint {
    fn from_config(provider: &ProviderConfig, env: &EnvironmentLoader) -> Self {
        Self {
            url: provider.endpoint.clone(),
            api_key: env.resolve(&provider.api_key),
            model: provider.model.clone(),
            max_tokens: provider.max_tokens,
            temperature: provider.temperature,
            timeout: Duration::from_secs(provider.timeout),
        }
    }
}

/// HTTP transport for every configured provider.
pub struct OpenAiTransport {
    client: Client,
    endpoints: HashMap<String, Endpoint>,
    retry: RetryPolicy,
}

impl OpenAiTransport {
    /// Build a transport for all providers in `config`, resolving `${VAR}` API keys.
    pub fn from_config(config: &Configuration, env: &EnvironmentLoader) -> anyhow::Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        let endpoints = config
            .providers
            .iter()
            .map(|p| (p.id.clone(), Endpoint::from_config(p, env)))
            .collect();

        let retry = RetryPolicy::new(
            config.execution.max_retries,
            Duration::from_millis(config.execution.retry_base_delay_ms),
        );

        Ok(Self {
            client,
            endpoints,
            retry,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, provider: &str) -> ProviderResult<&Endpoint> {
        self.endpoints
            .get(provider)
            .ok_or_else(|| ProviderError::UnknownProvider {
                provider: provider.to_string(),
            })
    }

    async fn post(
        &self,
        endpoint: &Endpoint,
        body: &serde_json::Value,
    ) -> ProviderResult<reqwest::Response> {
        let mut req = self
            .client
            .post(&endpoint.url)
            .timeout(endpoint.timeout)
            .header("Content-Type", "application/json");

        if !endpoint.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", endpoint.api_key));
        }

        let response = req.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    seconds: endpoint.timeout.as_secs(),
                }
            } else {
                ProviderError::http(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), &message));
        }

        Ok(response)
    }
}

/// JSON body of a chat completion request.
fn build_body(request: &ChatRequest, endpoint: &Endpoint, stream: bool) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": request.model.clone().unwrap_or_else(|| endpoint.model.clone()),
        "messages": request.messages,
        "max_tokens": request.max_tokens.unwrap_or(endpoint.max_tokens),
        "temperature": request.temperature.unwrap_or(endpoint.temperature),
        "stream": stream,
    });

    if !request.tools.is_empty() && request.tool_choice != ToolChoice::None {
        body["tools"] = request
            .tools
            .iter()
            .map(|t| t.to_openai())
            .collect::<Vec<_>>()
            .into();
        body["tool_choice"] = request.tool_choice.to_openai();
    }

    if stream {
        body["stream_options"] = serde_json::json!({ "include_usage": true });
    }

    body
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

fn parse_response(body: &str) -> ProviderResult<ChatResponse> {
    let wire: WireResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::decode(e.to_string()))?;

    let choice = wire
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::decode("response has no choices"))?;

    let message = Message::assistant_with_tools(
        choice.message.content,
        choice.message.tool_calls.unwrap_or_default(),
    );

    Ok(ChatResponse {
        message,
        usage: wire.usage,
    })
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Incremental decoder turning SSE bytes into [`StreamChunk`]s.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    usage: Option<Usage>,
    done: bool,
}

impl SseDecoder {
    /// Feed raw bytes and collect every chunk completed by them.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<ProviderResult<StreamChunk>> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.decode_line(line.trim_end_matches(['\r', '\n']), &mut out);
        }

        out
    }

    /// Flush at end of input. A stream that closes before `[DONE]` is
    /// truncated and ends with a decode error instead of `Done`.
    pub(crate) fn finish(&mut self) -> Vec<ProviderResult<StreamChunk>> {
        let mut out = Vec::new();
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&line).into_owned();
            self.decode_line(line.trim_end_matches('\r'), &mut out);
        }
        if !self.done {
            self.done = true;
            out.push(Err(ProviderError::decode("stream ended without [DONE]")));
        }
        out
    }

    fn decode_line(&mut self, line: &str, out: &mut Vec<ProviderResult<StreamChunk>>) {
        if self.done {
            return;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data.is_empty() {
            return;
        }

        if data == "[DONE]" {
            self.done = true;
            out.push(Ok(StreamChunk::Done {
                usage: self.usage.take(),
            }));
            return;
        }

        let chunk: WireStreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                out.push(Err(ProviderError::decode(e.to_string())));
                return;
            }
        };

        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                out.push(Ok(StreamChunk::Content(content)));
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = match call.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                out.push(Ok(StreamChunk::ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name,
                    arguments,
                }));
            }
        }
    }
}

#[async_trait::async_trait]
impl ChatTransport for OpenAiTransport {
    async fn chat_completion(&self, request: ChatRequest) -> ProviderResult<ChatResponse> {
        request
            .validate()
            .map_err(|e| ProviderError::InvalidRequest {
                message: e.to_string(),
            })?;
        let endpoint = self.endpoint(&request.provider)?;
        let body = build_body(&request, endpoint, false);
        let body = &body;
        let label = format!("chat completion ({})", request.provider);

        self.retry
            .run(&label, move || async move {
                let response = self.post(endpoint, body).await?;
                let text = response
                    .text()
                    .await
                    .map_err(|e| ProviderError::http(e.to_string()))?;
                parse_response(&text)
            })
            .await
    }

    async fn chat_completion_stream(&self, request: ChatRequest) -> ProviderResult<ChatStream> {
        request
            .validate()
            .map_err(|e| ProviderError::InvalidRequest {
                message: e.to_string(),
            })?;
        let endpoint = self.endpoint(&request.provider)?;
        let body = build_body(&request, endpoint, true);
        let body = &body;
        let label = format!("streaming chat completion ({})", request.provider);

        // Only connection setup is retried; once bytes flow, errors surface in the stream.
        let response = self
            .retry
            .run(&label, move || self.post(endpoint, body))
            .await?;

        let mut bytes = Box::pin(response.bytes_stream());
        let (tx, rx) = mpsc::channel::<ProviderResult<StreamChunk>>(64);

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            while let Some(item) = bytes.next().await {
                let chunks = match item {
                    Ok(data) => decoder.feed(&data),
                    Err(e) => vec![Err(ProviderError::http(e.to_string()))],
                };
                for chunk in chunks {
                    let failed = chunk.is_err();
                    if tx.send(chunk).await.is_err() || failed {
                        return;
                    }
                }
            }
            for chunk in decoder.finish() {
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
        });

        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Box::pin(stream))
    }
}

//! Model invocation: chat-completion client with streaming and cancellation

use super::memory::SharedMemory;
use super::prompts::render_sidekick_prompt;
use crate::error::{Result, SidekickError};
use crate::tiers::ProviderMode;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

const GATEWAY_REFERER: &str = "http://localhost";
const GATEWAY_TITLE: &str = "sidekick";

/// Parameters an invoker is built with
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    /// Tokens reserved for the response
    pub response_tokens: usize,
    pub temperature: f32,
    pub streaming: bool,
}

/// One turn handed to the model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnRequest {
    pub task: String,
    pub context: String,
    /// Comma-separated language names of the active files
    pub languages: String,
}

/// Receives response text as it arrives. A fresh sink is used per turn.
pub trait ResponseSink: Send {
    fn on_token(&mut self, token: &str);

    fn on_complete(&mut self) {}
}

/// Sink that buffers everything it receives
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    pub text: String,
    pub completed: bool,
}

impl ResponseSink for BufferSink {
    fn on_token(&mut self, token: &str) {
        self.text.push_str(token);
    }

    fn on_complete(&mut self) {
        self.completed = true;
    }
}

/// Handle bound to one model. Owns no memory of its own; the shared
/// memory outlives any single invoker.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    fn model_name(&self) -> &str;

    /// Run one turn, streaming into `sink`. The exchange is committed to
    /// memory only when the response completes; a cancelled run returns
    /// [`SidekickError::Interrupted`] and leaves memory untouched.
    async fn run(
        &self,
        request: &TurnRequest,
        sink: &mut dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Builds invokers for a model, sharing the given memory
pub trait ModelFactory: Send + Sync {
    fn build(&self, spec: ModelSpec, memory: SharedMemory) -> Result<Arc<dyn ModelInvoker>>;
}

/// Factory for [`ChatCompletionClient`]s against one provider
pub struct ChatCompletionFactory {
    client: Client,
    base_url: String,
    credential: SecretString,
    mode: ProviderMode,
}

impl ChatCompletionFactory {
    pub fn new(
        base_url: impl Into<String>,
        credential: SecretString,
        mode: ProviderMode,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SidekickError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            mode,
        })
    }
}

impl ModelFactory for ChatCompletionFactory {
    fn build(&self, spec: ModelSpec, memory: SharedMemory) -> Result<Arc<dyn ModelInvoker>> {
        if spec.name.trim().is_empty() {
            return Err(SidekickError::Configuration("model name is empty".into()));
        }
        info!("Building invoker for {} (streaming: {})", spec.name, spec.streaming);

        Ok(Arc::new(ChatCompletionClient {
            client: self.client.clone(),
            endpoint: format!("{}/chat/completions", self.base_url),
            credential: self.credential.clone(),
            mode: self.mode,
            spec,
            memory,
        }))
    }
}

/// OpenAI-compatible `POST /chat/completions` invoker
pub struct ChatCompletionClient {
    client: Client,
    endpoint: String,
    credential: SecretString,
    mode: ProviderMode,
    spec: ModelSpec,
    memory: SharedMemory,
}

impl ChatCompletionClient {
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn request_body(&self, prompt: String) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.spec.name.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: Some(self.spec.response_tokens),
            temperature: Some(self.spec.temperature),
            stream: self.spec.streaming,
        }
    }

    async fn read_stream(
        &self,
        response: reqwest::Response,
        sink: &mut dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut stream = Box::pin(response.bytes_stream().eventsource());
        let mut text = String::new();
        let mut finished = false;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Stream cancelled after {} chars", text.len());
                    return Err(SidekickError::Interrupted);
                }
                event = stream.next() => event,
            };

            let event = match event {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    error!("SSE stream error: {}", e);
                    return Err(SidekickError::Upstream(format!("SSE stream error: {}", e)));
                }
                None if finished => break,
                None => {
                    warn!("SSE stream closed after {} chars without [DONE]", text.len());
                    return Err(SidekickError::Upstream(
                        "response stream ended before completion".to_string(),
                    ));
                }
            };

            trace!("SSE data: {:?}", event.data);
            if event.data == "[DONE]" {
                break;
            }

            let chunk: ChatCompletionChunk = match serde_json::from_str(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("Skipping unparseable SSE event: {}", e);
                    continue;
                }
            };

            if let Some(err) = chunk.error {
                return Err(SidekickError::Upstream(err.message));
            }

            for choice in chunk.choices {
                finished |= choice.finish_reason.is_some();
                if let Some(token) = choice.delta.content {
                    sink.on_token(&token);
                    text.push_str(&token);
                }
            }
        }

        Ok(text)
    }

    async fn read_json(
        &self,
        response: reqwest::Response,
        sink: &mut dyn ResponseSink,
    ) -> Result<String> {
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| SidekickError::Upstream(format!("Failed to parse response: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SidekickError::Upstream("No choices in response".to_string()))?;

        sink.on_token(&text);
        Ok(text)
    }
}

#[async_trait]
impl ModelInvoker for ChatCompletionClient {
    fn model_name(&self) -> &str {
        &self.spec.name
    }

    async fn run(
        &self,
        request: &TurnRequest,
        sink: &mut dyn ResponseSink,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(SidekickError::Interrupted);
        }

        let history = self.memory.lock().await.render();
        let prompt = render_sidekick_prompt(&request.languages, &request.context, &history, &request.task);
        debug!("Sending {} chars to {}", prompt.len(), self.spec.name);

        let mut req = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.credential.expose_secret())
            .json(&self.request_body(prompt));

        if self.mode == ProviderMode::Gateway {
            req = req
                .header("HTTP-Referer", GATEWAY_REFERER)
                .header("X-Title", GATEWAY_TITLE);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(SidekickError::Interrupted),
            response = req.send() => response
                .map_err(|e| SidekickError::Upstream(format!("request failed: {}", e)))?,
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Chat completion failed with HTTP {}", status);
            return Err(SidekickError::Upstream(format!("HTTP {}: {}", status, body)));
        }

        let text = if self.spec.streaming {
            self.read_stream(response, sink, cancel).await?
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SidekickError::Interrupted),
                text = self.read_json(response, sink) => text?,
            }
        };

        self.memory.lock().await.record(request.task.clone(), text.clone());
        sink.on_complete();

        Ok(text)
    }
}

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WordBasedEstimator;
    use crate::llm::memory::ConversationMemory;

    fn memory() -> SharedMemory {
        ConversationMemory::shared(2048, Arc::new(WordBasedEstimator::default()))
    }

    fn spec(streaming: bool) -> ModelSpec {
        ModelSpec {
            name: "gpt-4".to_string(),
            response_tokens: 256,
            temperature: 0.05,
            streaming,
        }
    }

    fn factory(url: String, mode: ProviderMode) -> ChatCompletionFactory {
        ChatCompletionFactory::new(
            url,
            SecretString::new("sk-test".to_string()),
            mode,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn request() -> TurnRequest {
        TurnRequest {
            task: "explain main".to_string(),
            context: "fn main() {}".to_string(),
            languages: "Rust".to_string(),
        }
    }

    const SSE_BODY: &str = "data: {\"object\":\"chat.completion.chunk\",\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
data: {\"object\":\"chat.completion.chunk\",\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n\
data: {\"object\":\"chat.completion.chunk\",\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n\
data: [DONE]\n\n";

    #[tokio::test]
    async fn test_streaming_response_recorded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(SSE_BODY)
            .create_async()
            .await;

        let memory = memory();
        let invoker = factory(server.url(), ProviderMode::Direct)
            .build(spec(true), memory.clone())
            .unwrap();
        let mut sink = BufferSink::default();

        let text = invoker
            .run(&request(), &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(text, "Hello world");
        assert_eq!(sink.text, "Hello world");
        assert!(sink.completed);

        let memory = memory.lock().await;
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.exchanges().next().unwrap().human, "explain main");
    }

    #[tokio::test]
    async fn test_json_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"model":"gpt-4","stream":false}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"Done."}}]}"#)
            .create_async()
            .await;

        let invoker = factory(server.url(), ProviderMode::Direct)
            .build(spec(false), memory())
            .unwrap();
        let mut sink = BufferSink::default();

        let text = invoker
            .run(&request(), &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(text, "Done.");
        assert_eq!(sink.text, "Done.");
    }

    #[tokio::test]
    async fn test_gateway_sends_attribution_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("HTTP-Referer", GATEWAY_REFERER)
            .match_header("X-Title", GATEWAY_TITLE)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"ok"}}]}"#)
            .create_async()
            .await;

        let invoker = factory(server.url(), ProviderMode::Gateway)
            .build(spec(false), memory())
            .unwrap();
        invoker
            .run(&request(), &mut BufferSink::default(), &CancellationToken::new())
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancelled_turn_leaves_memory_unchanged() {
        let server = mockito::Server::new_async().await;
        let memory = memory();
        let invoker = factory(server.url(), ProviderMode::Direct)
            .build(spec(true), memory.clone())
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = invoker.run(&request(), &mut BufferSink::default(), &cancel).await;

        assert!(matches!(result, Err(SidekickError::Interrupted)));
        assert!(memory.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_stream_not_recorded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(SSE_BODY.trim_end_matches("data: [DONE]\n\n"))
            .create_async()
            .await;

        let memory = memory();
        let invoker = factory(server.url(), ProviderMode::Direct)
            .build(spec(true), memory.clone())
            .unwrap();
        let mut sink = BufferSink::default();
        let result = invoker
            .run(&request(), &mut sink, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(SidekickError::Upstream(_))));
        assert!(!sink.completed);
        assert!(memory.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_stream_finished_without_done_marker() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            )
            .create_async()
            .await;

        let memory = memory();
        let invoker = factory(server.url(), ProviderMode::Direct)
            .build(spec(true), memory.clone())
            .unwrap();
        let text = invoker
            .run(&request(), &mut BufferSink::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "Hi");
        assert_eq!(memory.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_http_error_not_recorded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let memory = memory();
        let invoker = factory(server.url(), ProviderMode::Direct)
            .build(spec(true), memory.clone())
            .unwrap();
        let result = invoker
            .run(&request(), &mut BufferSink::default(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(SidekickError::Upstream(_))));
        assert!(memory.lock().await.is_empty());
    }

    #[test]
    fn test_prompt_sent_as_single_user_message() {
        let client = ChatCompletionClient {
            client: Client::new(),
            endpoint: "http://localhost/chat/completions".to_string(),
            credential: SecretString::new("sk-test".to_string()),
            mode: ProviderMode::Direct,
            spec: spec(false),
            memory: memory(),
        };

        let body = client.request_body("the prompt".to_string());
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert_eq!(body.messages[0].content, "the prompt");
        assert!(!body.stream);
    }

    #[test]
    fn test_empty_model_name_rejected() {
        let result = factory("http://localhost".into(), ProviderMode::Direct).build(
            ModelSpec {
                name: " ".into(),
                ..spec(true)
            },
            memory(),
        );
        assert!(result.is_err());
    }
}

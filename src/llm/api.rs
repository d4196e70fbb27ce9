//! `ApiCompletion` — streamed chat completions over any OpenAI-compatible
//! `/v1/chat/completions` endpoint (Groq, OpenAI, Ollama, LM Studio …),
//! built on `async-openai`.
//!
//! All connection details come from [`LlmConfig`]; nothing is hardcoded.
//! `timeout_secs` bounds the connect phase and every gap between streamed
//! fragments, never the reply as a whole, so a long answer is not cut off.

use std::pin::Pin;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    CreateChatCompletionStreamResponse,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::{Stream, StreamExt};

use crate::config::LlmConfig;
use crate::llm::completion::{
    CompletionParams, CompletionService, CompletionStream, StreamError, StreamEvent,
};
use crate::llm::prompt::{ChatMessage, ChatRole};
use crate::provider::{ProviderError, ProviderErrorKind};

type ChunkResult = Result<CreateChatCompletionStreamResponse, OpenAIError>;

pub struct ApiCompletion {
    client: Client<OpenAIConfig>,
    idle_timeout: Duration,
}

impl ApiCompletion {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ProviderError> {
        let idle_timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder()
            .connect_timeout(idle_timeout)
            .build()
            .map_err(|e| ProviderError::new(ProviderErrorKind::Config, e.to_string()))?;

        let mut openai = OpenAIConfig::new().with_api_base(api_base(&config.base_url));
        if let Some(key) = config.resolved_api_key() {
            openai = openai.with_api_key(key);
        }

        Ok(Self {
            client: Client::with_config(openai).with_http_client(http),
            idle_timeout,
        })
    }
}

fn api_base(base_url: &str) -> String {
    format!("{}/v1", base_url.trim_end_matches('/'))
}

#[async_trait]
impl CompletionService for ApiCompletion {
    /// Open the stream and wait for its first item.  Connect, auth and HTTP
    /// status failures are returned here so the caller can retry; later
    /// failures arrive as items of the stream.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        params: &CompletionParams,
    ) -> Result<CompletionStream, ProviderError> {
        let request = build_request(messages, params)?;
        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(provider_error)?;

        let first = match tokio::time::timeout(self.idle_timeout, stream.next()).await {
            Ok(Some(Err(e))) => return Err(provider_error(e)),
            Ok(first) => first,
            Err(_) => return Err(idle_error(self.idle_timeout)),
        };
        log::debug!("llm: stream opened ({})", params.model);

        Ok(completion_events(
            futures::stream::iter(first).chain(stream),
            self.idle_timeout,
        ))
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

fn build_request(
    messages: &[ChatMessage],
    params: &CompletionParams,
) -> Result<CreateChatCompletionRequest, ProviderError> {
    let bad_input = |e: OpenAIError| ProviderError::new(ProviderErrorKind::BadInput, e.to_string());

    let messages = messages
        .iter()
        .map(to_openai)
        .collect::<Result<Vec<_>, _>>()
        .map_err(bad_input)?;

    CreateChatCompletionRequestArgs::default()
        .model(params.model.as_str())
        .messages(messages)
        .temperature(params.temperature)
        .max_completion_tokens(params.max_tokens)
        .build()
        .map_err(bad_input)
}

fn to_openai(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = message.content.clone();
    Ok(match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

// ---------------------------------------------------------------------------
// Response stream
// ---------------------------------------------------------------------------

struct EventState<S> {
    chunks: Pin<Box<S>>,
    idle: Duration,
    finished: bool,
}

/// Adapt `async-openai` chunks into completion events.  Empty deltas are
/// skipped; the stream ends with `Done`, or after the first error or an idle
/// gap longer than `idle`.
fn completion_events<S>(chunks: S, idle: Duration) -> CompletionStream
where
    S: Stream<Item = ChunkResult> + Send + 'static,
{
    let state = EventState {
        chunks: Box::pin(chunks),
        idle,
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            let next = match tokio::time::timeout(st.idle, st.chunks.next()).await {
                Ok(next) => next,
                Err(_) => {
                    st.finished = true;
                    return Some((Err(StreamError::Provider(idle_error(st.idle))), st));
                }
            };
            match next {
                Some(Ok(chunk)) => {
                    if let Some(text) = delta_text(&chunk) {
                        return Some((Ok(StreamEvent::Delta(text)), st));
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(stream_error(e)), st));
                }
                None => {
                    st.finished = true;
                    return Some((Ok(StreamEvent::Done), st));
                }
            }
        }
    })
    .boxed()
}

fn delta_text(chunk: &CreateChatCompletionStreamResponse) -> Option<String> {
    chunk
        .choices
        .first()
        .and_then(|choice| choice.delta.content.clone())
        .filter(|text| !text.is_empty())
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn idle_error(idle: Duration) -> ProviderError {
    ProviderError::new(
        ProviderErrorKind::Timeout,
        format!("no data from the model for {}s", idle.as_secs()),
    )
}

fn stream_error(e: OpenAIError) -> StreamError {
    match e {
        e @ OpenAIError::JSONDeserialize(..) => StreamError::Decode(e.to_string()),
        other => StreamError::Provider(provider_error(other)),
    }
}

fn provider_error(e: OpenAIError) -> ProviderError {
    match e {
        OpenAIError::Reqwest(e) => e.into(),
        OpenAIError::ApiError(api) => {
            ProviderError::new(api_error_kind(api.r#type.as_deref()), api.message)
        }
        OpenAIError::StreamError(message) => {
            let kind = status_in(&message)
                .map(ProviderErrorKind::from_status)
                .unwrap_or(ProviderErrorKind::Network);
            ProviderError::new(kind, message)
        }
        OpenAIError::InvalidArgument(message) => {
            ProviderError::new(ProviderErrorKind::BadInput, message)
        }
        other => ProviderError::server(other.to_string()),
    }
}

fn api_error_kind(error_type: Option<&str>) -> ProviderErrorKind {
    match error_type.unwrap_or_default() {
        t if t.contains("auth") || t.contains("api_key") || t.contains("permission") => {
            ProviderErrorKind::Auth
        }
        t if t.contains("rate_limit") || t.contains("quota") => ProviderErrorKind::RateLimit,
        "invalid_request_error" => ProviderErrorKind::BadInput,
        _ => ProviderErrorKind::Server,
    }
}

/// HTTP status in an event-source message such as
/// `Invalid status code: 401 Unauthorized`.
fn status_in(message: &str) -> Option<u16> {
    let rest = &message[message.find("status code:")? + "status code:".len()..];
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use common::config::UpstreamConfig;
use common::error::AppError;

use crate::event::StreamEvent;
use crate::sse::SseParser;

const CHAT_MESSAGES_PATH: &str = "/chat-messages";
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize)]
pub struct ChatInputs {
    pub user_id: String,
    pub department_code: String,
}

/// One chat turn to send upstream. The response mode is chosen by the call
/// (`send_blocking` vs `stream_chat`), not by the caller.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub inputs: ChatInputs,
    pub query: String,
    /// Empty string starts a new conversation.
    pub conversation_id: String,
    pub user: String,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    inputs: &'a ChatInputs,
    query: &'a str,
    response_mode: &'a str,
    conversation_id: &'a str,
    user: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub conversation_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Error body the upstream returns for non-2xx responses.
#[derive(Debug, Deserialize)]
struct WireError {
    code: String,
    message: String,
    #[serde(default)]
    status: Option<u16>,
}

enum AttemptError {
    /// Transport failure or 5xx; eligible for another attempt.
    Retryable(String),
    Fatal(AppError),
}

/// Client for the upstream chat-completion API.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, config: UpstreamConfig) -> Self {
        Self { http, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            CHAT_MESSAGES_PATH
        )
    }

    /// Blocking-mode call with retry.
    ///
    /// 5xx and transport/timeout failures are retried up to the configured
    /// maximum with linearly increasing backoff; 4xx fails immediately.
    pub async fn send_blocking(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let attempts = self.config.max_retries + 1;
        let mut last_cause = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(RETRY_BASE_DELAY * (attempt - 1)).await;
            }
            match self.attempt_blocking(request).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retryable(cause)) => {
                    log::warn!(
                        "blocking chat attempt {}/{} failed: {}",
                        attempt,
                        attempts,
                        cause
                    );
                    last_cause = cause;
                }
            }
        }

        Err(AppError::ConnectionFailed {
            attempts,
            message: last_cause,
        })
    }

    async fn attempt_blocking(&self, request: &ChatRequest) -> Result<ChatResponse, AttemptError> {
        let wire = WireRequest {
            inputs: &request.inputs,
            query: &request.query,
            response_mode: "blocking",
            conversation_id: &request.conversation_id,
            user: &request.user,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&wire)
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Retryable(format!(
                "upstream returned status {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(AttemptError::Fatal(api_error(status.as_u16(), &body)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Retryable(format!("failed to read response body: {}", e)))?;
        serde_json::from_slice::<ChatResponse>(&body).map_err(|e| {
            AttemptError::Fatal(AppError::InvalidResponse(format!(
                "unexpected blocking response shape: {}",
                e
            )))
        })
    }

    /// Streaming-mode call. Returns a finite, non-restartable event sequence;
    /// no timeout is applied to the stream itself.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        let wire = WireRequest {
            inputs: &request.inputs,
            query: &request.query,
            response_mode: "streaming",
            conversation_id: &request.conversation_id,
            user: &request.user,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed {
                attempts: 1,
                message: format!("request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        Ok(ChatStream {
            bytes: response.bytes_stream().boxed(),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            done: false,
        })
    }
}

fn api_error(status: u16, body: &[u8]) -> AppError {
    match serde_json::from_slice::<WireError>(body) {
        Ok(e) => AppError::UpstreamApi {
            status: e.status.unwrap_or(status),
            code: e.code,
            message: e.message,
        },
        Err(_) => AppError::UpstreamApi {
            status,
            code: "upstream_error".to_string(),
            message: format!("upstream returned status {}", status),
        },
    }
}

/// Lazily decoded upstream event sequence for one turn.
pub struct ChatStream {
    bytes: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: SseParser,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("pending", &self.pending)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl ChatStream {
    /// Await the next event; `None` once the turn is over. The sequence ends
    /// after a terminal event or stream close, and a decode failure is fatal:
    /// malformed JSON means protocol drift and must not be swallowed.
    pub async fn next(&mut self) -> Result<Option<StreamEvent>, AppError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    self.done = true;
                    self.pending.clear();
                }
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => {
                    let text = String::from_utf8_lossy(&chunk).into_owned();
                    for payload in self.parser.feed(&text) {
                        match decode_payload(&payload) {
                            Ok(Some(event)) => self.pending.push_back(event),
                            Ok(None) => {}
                            Err(err) => {
                                self.done = true;
                                self.pending.clear();
                                return Err(err);
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Err(AppError::ConnectionFailed {
                        attempts: 1,
                        message: format!("stream read failed: {}", e),
                    });
                }
                None => {
                    self.done = true;
                    if let Some(payload) = self.parser.flush() {
                        if let Some(event) = decode_payload(&payload)? {
                            return Ok(Some(event));
                        }
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// Empty payloads and the `[DONE]` sentinel are skipped, not emitted.
fn decode_payload(payload: &str) -> Result<Option<StreamEvent>, AppError> {
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }
    serde_json::from_str(payload).map(Some).map_err(|e| {
        AppError::InvalidResponse(format!("failed to parse stream event: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str, max_retries: u32) -> UpstreamClient {
        UpstreamClient::new(
            reqwest::Client::new(),
            UpstreamConfig {
                base_url: base.to_string(),
                api_key: "app-test-key".to_string(),
                timeout_secs: 5,
                max_retries,
            },
        )
    }

    fn request() -> ChatRequest {
        ChatRequest {
            inputs: ChatInputs {
                user_id: "user@example.com".to_string(),
                department_code: "001".to_string(),
            },
            query: "hello".to_string(),
            conversation_id: String::new(),
            user: "user@example.com".to_string(),
        }
    }

    fn sse_body(frames: &[&str]) -> String {
        frames.iter().map(|f| format!("data: {}\n\n", f)).collect()
    }

    #[tokio::test]
    async fn send_blocking_parses_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .and(header("authorization", "Bearer app-test-key"))
            .and(body_string_contains("\"response_mode\":\"blocking\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "event": "message",
                "answer": "hi there",
                "conversation_id": "c1",
                "message_id": "m1",
                "metadata": {"usage": {"total_tokens": 2}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server.uri(), 3).send_blocking(&request()).await.unwrap();
        assert_eq!(response.answer, "hi there");
        assert_eq!(response.conversation_id, "c1");
    }

    #[tokio::test]
    async fn send_blocking_retries_5xx_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": "recovered",
                "conversation_id": "c1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(&server.uri(), 3).send_blocking(&request()).await.unwrap();
        assert_eq!(response.answer, "recovered");
    }

    #[tokio::test]
    async fn send_blocking_does_not_retry_4xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "invalid_param",
                "message": "bad query",
                "status": 400
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server.uri(), 3).send_blocking(&request()).await.unwrap_err();
        match err {
            AppError::UpstreamApi { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "invalid_param");
                assert_eq!(message, "bad query");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_blocking_exhausts_retries_into_connection_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server.uri(), 1).send_blocking(&request()).await.unwrap_err();
        match err {
            AppError::ConnectionFailed { attempts, message } => {
                assert_eq!(attempts, 2);
                assert!(message.contains("503"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_blocking_rejects_unexpected_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})),
            )
            .mount(&server)
            .await;

        let err = client(&server.uri(), 0).send_blocking(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn stream_chat_yields_events_in_order() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"event":"message","answer":"hi","conversation_id":"c1"}"#,
            r#"{"event":"message","answer":" there","conversation_id":"c1"}"#,
            r#"{"event":"message_end","conversation_id":"c1"}"#,
        ]);
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .and(body_string_contains("\"response_mode\":\"streaming\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let mut stream = client(&server.uri(), 0).stream_chat(&request()).await.unwrap();
        let mut answers = Vec::new();
        while let Some(event) = stream.next().await.unwrap() {
            if let StreamEvent::Message { answer, .. } = &event {
                answers.push(answer.clone());
            } else {
                assert!(event.is_terminal());
            }
        }
        assert_eq!(answers, vec!["hi", " there"]);
    }

    #[tokio::test]
    async fn stream_chat_skips_done_sentinel_comments_and_empty_payloads() {
        let server = MockServer::start().await;
        let body = format!(
            ": keep-alive\n\ndata:\n\ndata: [DONE]\n\n{}",
            sse_body(&[r#"{"event":"message_end","conversation_id":"c1"}"#])
        );
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let mut stream = client(&server.uri(), 0).stream_chat(&request()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.conversation_id(), Some("c1"));
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stream_chat_treats_malformed_json_as_fatal() {
        let server = MockServer::start().await;
        let body = "data: {not json}\n\ndata: {\"event\":\"message\",\"answer\":\"x\"}\n\n";
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let mut stream = client(&server.uri(), 0).stream_chat(&request()).await.unwrap();
        let err = stream.next().await.unwrap_err();
        assert!(matches!(err, AppError::InvalidResponse(_)));
        // The sequence is halted; no partial event follows.
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stream_chat_stops_after_terminal_event() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"event":"message_end","conversation_id":"c1"}"#,
            r#"{"event":"message","answer":"late","conversation_id":"c1"}"#,
        ]);
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let mut stream = client(&server.uri(), 0).stream_chat(&request()).await.unwrap();
        assert!(stream.next().await.unwrap().unwrap().is_terminal());
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stream_chat_surfaces_upstream_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "code": "unauthorized",
                "message": "invalid api key",
                "status": 401
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri(), 0).stream_chat(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamApi { status: 401, .. }));
    }
}

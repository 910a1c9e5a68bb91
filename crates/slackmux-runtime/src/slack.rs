//! Slack Web API client and Socket Mode listener.
//!
//! Outbound posts go through `chat.postMessage` with the bot token. Inbound
//! thread replies arrive over a Socket Mode websocket opened with the app
//! token; every envelope is acknowledged before it is forwarded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use slackmux_bridge::{ChatClient, ChatError, InboundMessage};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

pub const SLACK_API_URL: &str = "https://slack.com/api";
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ─── Web API ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl ApiResponse {
    fn into_result(self) -> Result<Self, ChatError> {
        if self.ok {
            Ok(self)
        } else {
            Err(ChatError::Api(
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
    app_token: String,
}

impl SlackClient {
    pub fn new(
        bot_token: impl Into<String>,
        app_token: impl Into<String>,
    ) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("slackmux/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: SLACK_API_URL.to_string(),
            bot_token: bot_token.into(),
            app_token: app_token.into(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call(
        &self,
        method: &str,
        token: &str,
        body: &Value,
    ) -> Result<ApiResponse, ChatError> {
        let response = self
            .http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("{method}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Transport(format!("{method}: HTTP {status}")));
        }
        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| ChatError::Transport(format!("{method}: bad response body: {e}")))?
            .into_result()
    }

    /// Fetch a one-shot Socket Mode websocket URL.
    pub async fn open_socket_url(&self) -> Result<String, ChatError> {
        self.call("apps.connections.open", &self.app_token, &json!({}))
            .await?
            .url
            .ok_or_else(|| ChatError::Api("apps.connections.open returned no url".into()))
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<String, ChatError> {
        self.call(
            "chat.postMessage",
            &self.bot_token,
            &json!({ "channel": channel, "text": text }),
        )
        .await?
        .ts
        .ok_or_else(|| ChatError::Api("chat.postMessage returned no ts".into()))
    }

    async fn post_threaded_message(
        &self,
        channel: &str,
        thread_ref: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        self.call(
            "chat.postMessage",
            &self.bot_token,
            &json!({ "channel": channel, "thread_ts": thread_ref, "text": text }),
        )
        .await?;
        Ok(())
    }
}

// ─── Socket Mode frames ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    payload: Option<EventsApiPayload>,
}

#[derive(Debug, Deserialize)]
struct EventsApiPayload {
    #[serde(default)]
    event: Option<MessageEvent>,
}

#[derive(Debug, Deserialize)]
struct MessageEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
}

impl From<MessageEvent> for InboundMessage {
    fn from(event: MessageEvent) -> Self {
        Self {
            thread_ref: event.thread_ts,
            channel: event.channel,
            text: event.text,
            is_bot: event.bot_id.is_some(),
            subtype: event.subtype,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    /// Slack is about to drop the connection and wants a reconnect.
    Disconnect { reason: String },
    Event {
        envelope_id: String,
        message: Option<InboundMessage>,
    },
    /// Anything else. Envelopes with an id still need an ack.
    Other { envelope_id: Option<String> },
}

pub fn parse_frame(text: &str) -> Result<SocketFrame, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    Ok(match (envelope.kind.as_str(), envelope.envelope_id) {
        ("hello", _) => SocketFrame::Hello,
        ("disconnect", _) => SocketFrame::Disconnect {
            reason: envelope.reason.unwrap_or_default(),
        },
        ("events_api", Some(envelope_id)) => SocketFrame::Event {
            envelope_id,
            message: envelope
                .payload
                .and_then(|p| p.event)
                .filter(|e| e.kind == "message")
                .map(InboundMessage::from),
        },
        (_, envelope_id) => SocketFrame::Other { envelope_id },
    })
}

fn ack(envelope_id: &str) -> Message {
    Message::text(json!({ "envelope_id": envelope_id }).to_string())
}

// ─── Listener ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}

enum SessionEnd {
    Cancelled,
    Closed { greeted: bool },
}

/// Keep a Socket Mode connection open, forwarding messages from `channel`
/// to `inbound`, until `cancel` fires or the receiver goes away.
pub async fn run_socket_mode(
    client: Arc<SlackClient>,
    channel: String,
    inbound: mpsc::Sender<InboundMessage>,
    cancel: CancellationToken,
) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let attempt = tokio::select! {
            () = cancel.cancelled() => break,
            result = run_session(&client, &channel, &inbound, &cancel) => result,
        };
        match attempt {
            Ok(SessionEnd::Cancelled) => break,
            Ok(SessionEnd::Closed { greeted: true }) => {
                tracing::info!("socket mode connection closed, reconnecting");
                backoff = INITIAL_BACKOFF;
                continue;
            }
            Ok(SessionEnd::Closed { greeted: false }) => {
                tracing::warn!("socket mode connection closed before hello");
            }
            Err(e) => tracing::warn!(retry_in = ?backoff, "socket mode connection failed: {e}"),
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
    tracing::info!("socket mode listener stopped");
}

async fn run_session(
    client: &SlackClient,
    channel: &str,
    inbound: &mpsc::Sender<InboundMessage>,
    cancel: &CancellationToken,
) -> Result<SessionEnd, SocketError> {
    let url = client.open_socket_url().await?;
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut write, mut read) = ws.split();
    let mut greeted = false;

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(SessionEnd::Cancelled);
            }
            frame = read.next() => frame,
        };
        let Some(frame) = frame else {
            return Ok(SessionEnd::Closed { greeted });
        };

        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(SessionEnd::Closed { greeted }),
            _ => continue,
        };

        match parse_frame(&text) {
            Ok(SocketFrame::Hello) => {
                greeted = true;
                tracing::info!("socket mode connected");
            }
            Ok(SocketFrame::Disconnect { reason }) => {
                tracing::debug!(reason, "slack requested reconnect");
                return Ok(SessionEnd::Closed { greeted });
            }
            Ok(SocketFrame::Event {
                envelope_id,
                message,
            }) => {
                write.send(ack(&envelope_id)).await?;
                let Some(message) = message.filter(|m| m.channel == channel) else {
                    continue;
                };
                if inbound.send(message).await.is_err() {
                    return Ok(SessionEnd::Cancelled);
                }
            }
            Ok(SocketFrame::Other {
                envelope_id: Some(envelope_id),
            }) => {
                write.send(ack(&envelope_id)).await?;
            }
            Ok(SocketFrame::Other { envelope_id: None }) => {}
            Err(e) => tracing::debug!("unparseable socket mode frame: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use tokio::net::TcpListener;

    #[test]
    fn parse_hello_and_disconnect() {
        assert_eq!(
            parse_frame(r#"{"type":"hello","num_connections":1}"#).expect("parse"),
            SocketFrame::Hello
        );
        assert_eq!(
            parse_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#).expect("parse"),
            SocketFrame::Disconnect {
                reason: "refresh_requested".into()
            }
        );
    }

    #[test]
    fn parse_threaded_reply() {
        let frame = parse_frame(
            r#"{
                "type": "events_api",
                "envelope_id": "env-1",
                "payload": {
                    "event": {
                        "type": "message",
                        "channel": "C0123",
                        "user": "U1",
                        "text": "yes",
                        "ts": "1700000001.000200",
                        "thread_ts": "1700000000.000100"
                    }
                }
            }"#,
        )
        .expect("parse");
        assert_eq!(
            frame,
            SocketFrame::Event {
                envelope_id: "env-1".into(),
                message: Some(InboundMessage {
                    thread_ref: Some("1700000000.000100".into()),
                    channel: "C0123".into(),
                    text: Some("yes".into()),
                    is_bot: false,
                    subtype: None,
                }),
            }
        );
    }

    #[test]
    fn parse_bot_message_marks_bot() {
        let frame = parse_frame(
            r#"{"type":"events_api","envelope_id":"e","payload":{"event":{
                "type":"message","channel":"C0123","bot_id":"B1","subtype":"bot_message",
                "text":"Sent to api: `y`","thread_ts":"1.2"}}}"#,
        )
        .expect("parse");
        let SocketFrame::Event {
            message: Some(message),
            ..
        } = frame
        else {
            panic!("expected event");
        };
        assert!(message.is_bot);
        assert!(message.routable().is_none());
    }

    #[test]
    fn non_message_events_still_ack() {
        let frame = parse_frame(
            r#"{"type":"events_api","envelope_id":"e2","payload":{"event":{"type":"reaction_added"}}}"#,
        )
        .expect("parse");
        assert_eq!(
            frame,
            SocketFrame::Event {
                envelope_id: "e2".into(),
                message: None
            }
        );

        let frame = parse_frame(r#"{"type":"slash_commands","envelope_id":"e3"}"#).expect("parse");
        assert_eq!(
            frame,
            SocketFrame::Other {
                envelope_id: Some("e3".into())
            }
        );
    }

    #[test]
    fn ack_payload() {
        assert_eq!(ack("env-9"), Message::text(r#"{"envelope_id":"env-9"}"#));
    }

    async fn mock_slack(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn post_message_returns_ts_and_sends_bot_token() {
        let app = Router::new().route(
            "/chat.postMessage",
            post(|headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if auth != "Bearer xoxb-test" {
                    return axum::Json(json!({ "ok": false, "error": "invalid_auth" }));
                }
                if body.get("thread_ts").is_some() {
                    return axum::Json(json!({ "ok": true, "ts": "1700000000.000200" }));
                }
                assert_eq!(body["channel"], "C0123");
                axum::Json(json!({ "ok": true, "ts": "1700000000.000100" }))
            }),
        );
        let base = mock_slack(app).await;

        let client = SlackClient::new("xoxb-test", "xapp-test")
            .expect("client")
            .with_base_url(&base);
        let ts = client
            .post_message("C0123", "*[api]* New Claude Code session")
            .await
            .expect("post");
        assert_eq!(ts, "1700000000.000100");
        client
            .post_threaded_message("C0123", &ts, "*[api]* Reconnected")
            .await
            .expect("threaded post");

        let wrong = SlackClient::new("xoxb-wrong", "xapp-test")
            .expect("client")
            .with_base_url(&base);
        let err = wrong.post_message("C0123", "hi").await.expect_err("rejected");
        assert!(matches!(err, ChatError::Api(ref e) if e == "invalid_auth"));
    }

    #[tokio::test]
    async fn open_socket_url_uses_app_token() {
        let app = Router::new().route(
            "/apps.connections.open",
            post(|headers: HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                axum::Json(json!({
                    "ok": auth == "Bearer xapp-test",
                    "url": "wss://example.invalid/link",
                }))
            }),
        );
        let base = mock_slack(app).await;
        let client = SlackClient::new("xoxb-test", "xapp-test")
            .expect("client")
            .with_base_url(base);
        assert_eq!(
            client.open_socket_url().await.expect("url"),
            "wss://example.invalid/link"
        );
    }

    #[tokio::test]
    async fn unreachable_api_is_transport_error() {
        let client = SlackClient::new("xoxb-test", "xapp-test")
            .expect("client")
            .with_base_url("http://127.0.0.1:9");
        let err = client.post_message("C0123", "hi").await.expect_err("unreachable");
        assert!(matches!(err, ChatError::Transport(_)));
    }
}

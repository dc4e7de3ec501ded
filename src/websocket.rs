//! # WebSocket Capture Handler
//!
//! Clients connect to `/ws` (or `/`) and stream capture sessions.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: server sends a `hello` message
//! 2. **Audio**: a binary frame of little-endian `f32` mono samples;
//!    answered with `captured`
//! 3. **Name**: a text frame naming the capture; answered with `committed`
//!    once `<name>.wav` exists
//! 4. Repeat 2-3 for as many captures as the client likes
//!
//! The frame opcode is the message kind. Failures are answered with an
//! `error` message and never close the connection.
//!
//! ## Message Format:
//! - **Client → Server**: binary audio frames, text name frames
//! - **Server → Client**: JSON objects tagged by `type`

use crate::audio::container::ContainerEncoder;
use crate::capture::{CaptureSession, ClientMessage, SessionEvent};
use crate::config::SampleFormat;
use crate::error::CaptureError;
use crate::state::AppState;

use actix::prelude::*;
use actix_http::ws::Item;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Legacy greeting text, carried in the `message` field of `hello`.
pub const GREETING: &str = "Hello Client";

/// Server → client messages.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Sent once when the connection opens
    #[serde(rename = "hello")]
    Hello {
        connection_id: Uuid,
        message: String,
        sample_rate: u32,
        sample_format: SampleFormat,
    },

    /// Audio stored, waiting for a name
    #[serde(rename = "captured")]
    Captured {
        sequence: u64,
        samples: usize,
        bytes: u64,
    },

    /// Capture saved under its final name
    #[serde(rename = "committed")]
    Committed {
        sequence: u64,
        name: String,
        file: String,
        samples: usize,
        timestamp: String,
    },

    #[serde(rename = "error")]
    Error {
        /// One of `invalid_payload`, `unexpected_message`, `storage_failure`, `commit_failure`
        code: String,
        message: String,
        /// Position of the failed message on this connection (1-based)
        message_count: u64,
    },
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Captured {
                sequence,
                samples,
                bytes,
            } => ServerMessage::Captured {
                sequence,
                samples,
                bytes,
            },
            SessionEvent::Committed {
                sequence,
                name,
                file,
                samples,
            } => ServerMessage::Committed {
                sequence,
                name,
                file: file.display().to_string(),
                samples,
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }
}

impl ServerMessage {
    pub fn from_error(error: &CaptureError, message_count: u64) -> Self {
        ServerMessage::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            message_count,
        }
    }
}

/// One actor per connection.
///
/// Data messages are handled one at a time: while a message is being
/// stored or committed the actor does not read the next frame, so append
/// and rename of a session never overlap and arrival order is kept. Other
/// connections keep running on the same event loop meanwhile.
pub struct CaptureWebSocket {
    connection_id: Uuid,
    /// `None` only while a message is in flight.
    session: Option<CaptureSession>,
    state: AppState,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl CaptureWebSocket {
    pub fn new(state: AppState) -> Self {
        let connection_id = Uuid::new_v4();
        let config = state.get_config();
        let session = CaptureSession::new(
            connection_id,
            state.store.clone(),
            ContainerEncoder::from_config(&config.audio),
        );
        let heartbeat_interval = Duration::from_secs(config.server.heartbeat_interval_secs);
        let client_timeout = Duration::from_secs(config.server.client_timeout_secs);

        Self {
            connection_id,
            session: Some(session),
            state,
            last_heartbeat: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(e) => error!(connection_id = %self.connection_id, error = %e, "Failed to serialize reply"),
        }
    }

    /// Run one data message through the session and reply with its outcome.
    fn dispatch(&mut self, message: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(mut session) = self.session.take() else {
            error!(connection_id = %self.connection_id, "Message arrived while another was in flight");
            return;
        };

        let work = async move {
            let result = session.handle(message).await;
            (session, result)
        };

        ctx.wait(work.into_actor(self).map(|(session, result), act, ctx| {
            let message_count = session.message_count();
            act.session = Some(session);

            match result {
                Ok(event) => {
                    act.state.record_event(&event);
                    act.send(ctx, &ServerMessage::from(event));
                }
                Err(err) => {
                    act.state.record_error(&err);
                    warn!(
                        connection_id = %act.connection_id,
                        message_count,
                        code = err.code(),
                        error = %err,
                        "Capture message rejected"
                    );
                    act.send(ctx, &ServerMessage::from_error(&err, message_count));
                }
            }
        }));
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(connection_id = %act.connection_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for CaptureWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.state.connection_opened();
        info!(connection_id = %self.connection_id, "WebSocket connection started");

        let config = self.state.get_config();
        let hello = ServerMessage::Hello {
            connection_id: self.connection_id,
            message: GREETING.to_string(),
            sample_rate: config.audio.sample_rate,
            sample_format: config.audio.sample_format,
        };
        self.send(ctx, &hello);

        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state.connection_closed();
        info!(connection_id = %self.connection_id, "WebSocket connection stopped");

        // A session still in flight is dropped with its future; the startup
        // reset removes whatever scratch it left.
        if let Some(session) = self.session.take() {
            let state = self.state.clone();
            actix::spawn(async move {
                if session.close().await.is_some() {
                    state.record_discarded();
                }
            });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for CaptureWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                debug!(connection_id = %self.connection_id, bytes = data.len(), "Received audio frame");
                self.dispatch(ClientMessage::Audio(data.to_vec()), ctx);
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                info!(connection_id = %self.connection_id, name = %text, "Received capture name");
                self.dispatch(ClientMessage::Name(text.to_string()), ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(connection_id = %self.connection_id, reason = ?reason, "WebSocket closed by client");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(item)) => {
                // Reply once per fragmented message, at its first frame.
                if matches!(item, Item::FirstText(_) | Item::FirstBinary(_)) {
                    let err = CaptureError::UnexpectedMessage(
                        "fragmented messages are not supported; send each message in one frame"
                            .to_string(),
                    );
                    self.state.record_error(&err);
                    let message_count = self
                        .session
                        .as_ref()
                        .map(|session| session.message_count())
                        .unwrap_or_default();
                    self.send(ctx, &ServerMessage::from_error(&err, message_count));
                }
                warn!(connection_id = %self.connection_id, "Dropped continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(connection_id = %self.connection_id, error = %err, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Upgrade an HTTP request to a capture connection.
pub async fn capture_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(peer = ?req.connection_info().peer_addr(), "New WebSocket connection request");

    let max_frame_bytes = state.get_config().server.max_frame_bytes;
    ws::WsResponseBuilder::new(CaptureWebSocket::new(state.get_ref().clone()), &req, stream)
        .frame_size(max_frame_bytes)
        .start()
}

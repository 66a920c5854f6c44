//! # WebSocket Audio Streaming Handler
//!
//! Clients connect to `/ws/audio` and stream raw PCM audio as binary messages.
//! The server answers with one JSON text message per window in which speech was
//! recognized:
//!
//! ```json
//! {"emotion": "joy", "text": "what a lovely day"}
//! ```
//!
//! ## Message Format:
//! - **Client → Server**: Binary PCM audio data (16-bit LE, 48kHz, mono), any chunk size
//! - **Server → Client**: JSON emotion results only; silence and failures produce nothing
//!
//! ## Actor / session split:
//! Each connection is an Actix actor that only deals with frames. It forwards audio,
//! in arrival order, into a bounded queue drained by the connection's [`AudioSession`]
//! task. Receiving frames therefore never waits on a window being transcribed, while
//! the session still processes windows strictly one after another. A client that
//! outruns the session by a full queue is disconnected.
//!
//! Close frames, protocol errors and heartbeat timeouts signal the session directly,
//! so it stops without working through audio that is still queued.

use crate::audio::session::{feed_channel, ChannelClosed, FeedError, SessionClose, SessionFeed};
use crate::audio::{AudioSession, EmotionResult, ResultSink};
use crate::error::AppError;
use crate::state::{AppState, SessionSlot};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// WebSocket actor for one audio streaming connection.
pub struct AudioWebSocket {
    session_id: Uuid,

    app_state: web::Data<AppState>,

    /// Held until the session task takes it over; dropping it frees the slot
    slot: Option<SessionSlot>,

    /// Transport side of the session loop, present while the connection is open
    feed: Option<SessionFeed>,

    window_threshold_bytes: usize,
    max_queued_chunks: usize,
    heartbeat_interval: Duration,
    client_timeout: Duration,

    /// Last time the client showed signs of life (any frame, pong included)
    last_heartbeat: Instant,
}

impl AudioWebSocket {
    pub fn new(app_state: web::Data<AppState>, slot: SessionSlot) -> Self {
        let config = app_state.get_config();
        Self {
            session_id: Uuid::new_v4(),
            app_state,
            slot: Some(slot),
            feed: None,
            window_threshold_bytes: config.audio.window_threshold_bytes,
            max_queued_chunks: config.performance.max_queued_chunks,
            heartbeat_interval: config.performance.heartbeat_interval(),
            client_timeout: config.performance.client_timeout(),
            last_heartbeat: Instant::now(),
        }
    }

    /// Ping the client periodically and drop it once it goes quiet for too long.
    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!(session_id = %act.session_id, "WebSocket heartbeat timeout, closing connection");
                act.end_session(SessionClose::TransportError("heartbeat timeout".to_string()));
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Spawn the session loop that consumes this connection's audio.
    fn start_session(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let (feed, input) = feed_channel(self.max_queued_chunks);
        self.feed = Some(feed);

        let session = AudioSession::new(
            self.session_id,
            self.window_threshold_bytes,
            self.app_state.pipeline.clone(),
        );
        let sink = ActorSink { addr: ctx.address() };
        let state = self.app_state.clone();
        let slot = self.slot.take();
        let span = info_span!("session", id = %self.session_id);

        actix_web::rt::spawn(
            async move {
                let summary = session.run(input, sink).await;
                state.record_session(&summary);
                drop(slot);
            }
            .instrument(span),
        );
    }

    /// Queue a chunk for the session loop.
    fn forward(&self, chunk: Vec<u8>) -> Result<(), FeedError> {
        match &self.feed {
            Some(feed) => feed.push(chunk),
            None => Err(FeedError::Ended),
        }
    }

    /// Tell the session loop to stop now, dropping whatever audio is queued.
    fn end_session(&mut self, reason: SessionClose) {
        if let Some(feed) = self.feed.as_mut() {
            feed.close(reason);
        }
    }
}

/// Emotion result travelling from the session task back to its actor.
#[derive(Message)]
#[rtype(result = "()")]
struct SendResult(EmotionResult);

/// Delivers session results through the actor's mailbox.
struct ActorSink {
    addr: Addr<AudioWebSocket>,
}

impl ResultSink for ActorSink {
    fn deliver(&mut self, result: &EmotionResult) -> Result<(), ChannelClosed> {
        if !self.addr.connected() {
            return Err(ChannelClosed);
        }
        self.addr.do_send(SendResult(result.clone()));
        Ok(())
    }
}

impl Actor for AudioWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection established");
        self.start_heartbeat(ctx);
        self.start_session(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "WebSocket connection closed");

        self.end_session(SessionClose::Disconnect);
        self.feed = None;
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                match self.forward(data.to_vec()) {
                    Ok(()) => {}
                    Err(FeedError::Backlogged) => {
                        warn!(
                            session_id = %self.session_id,
                            max_queued_chunks = self.max_queued_chunks,
                            "Session is too far behind the audio stream, closing connection"
                        );
                        self.end_session(SessionClose::TransportError("audio backlog full".to_string()));
                        ctx.close(Some(ws::CloseReason {
                            code: ws::CloseCode::Again,
                            description: Some("audio backlog full".to_string()),
                        }));
                        ctx.stop();
                    }
                    Err(FeedError::Ended) => {
                        warn!(session_id = %self.session_id, "Session loop has ended, closing connection");
                        ctx.stop();
                    }
                }
            }
            Ok(ws::Message::Text(_)) => {
                self.last_heartbeat = Instant::now();
                warn!(session_id = %self.session_id, "Ignoring text frame, only binary PCM audio is accepted");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(session_id = %self.session_id, "Close frame received: {:?}", reason);
                self.end_session(SessionClose::Disconnect);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(session_id = %self.session_id, "Ignoring fragmented frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session_id, "WebSocket protocol error: {}", err);
                self.end_session(SessionClose::TransportError(err.to_string()));
                ctx.stop();
            }
        }
    }
}

impl Handler<SendResult> for AudioWebSocket {
    type Result = ();

    fn handle(&mut self, msg: SendResult, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(json) => ctx.text(json),
            Err(err) => error!(session_id = %self.session_id, "Failed to serialize result: {}", err),
        }
    }
}

/// WebSocket endpoint handler.
///
/// Reserves a session slot, then upgrades the HTTP request. Upgrades beyond
/// `max_concurrent_sessions` are refused with 503 before any handshake happens.
pub async fn audio_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());

    let Some(slot) = app_state.try_open_session() else {
        let max = app_state.get_config().performance.max_concurrent_sessions;
        warn!(max_sessions = max, "Rejecting WebSocket connection, session limit reached");
        return Err(AppError::ServiceUnavailable(format!(
            "Maximum concurrent sessions ({}) reached",
            max
        ))
        .into());
    };

    ws::start(AudioWebSocket::new(app_state, slot), &req, stream)
}

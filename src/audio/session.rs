//! # Audio Session Loop
//!
//! Owns one connection's audio from accept to disconnect. Each session is a single
//! logical sequence: chunks are fed to the accumulator in arrival order and a
//! flushed window is fully processed, and its result delivered, before the next
//! chunk is looked at.
//!
//! ## Session Lifecycle:
//! 1. **Connecting**: created, transport handshake not finished
//! 2. **Open**: receiving audio, flushing and processing windows
//! 3. **Closed**: client disconnected or the transport failed
//!
//! ## Failure containment:
//! Pipeline failures (no speech, service errors, timeouts, even panics) are
//! logged and the window is dropped; the session stays open. Only the channel
//! itself can close a session.
//!
//! ## Closing:
//! The transport's close signal travels outside the audio queue. It ends the loop
//! even while chunks are queued or a window is waiting on an external service, and
//! none of that audio is processed afterwards.

use crate::audio::{AudioAccumulator, EmotionResult, Window, WindowPipeline};
use crate::error::PipelineError;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closed => "closed",
        }
    }
}

/// Why the transport ended the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionClose {
    /// The client closed the connection
    Disconnect,
    /// The transport failed; the connection is unusable
    TransportError(String),
}

/// Why a chunk could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedError {
    /// The session is behind by a full queue of chunks
    Backlogged,
    /// The session loop has ended
    Ended,
}

/// Transport side of a session: queues audio and signals close.
///
/// The close signal does not wait behind queued audio. Dropping the feed counts
/// as a disconnect.
#[derive(Debug)]
pub struct SessionFeed {
    audio: mpsc::Sender<Vec<u8>>,
    close: Option<oneshot::Sender<SessionClose>>,
}

/// Session side of the channel pair, consumed by [`AudioSession::run`].
#[derive(Debug)]
pub struct SessionInput {
    audio: mpsc::Receiver<Vec<u8>>,
    closed: oneshot::Receiver<SessionClose>,
}

/// Create the channel pair between a transport and its session loop.
///
/// At most `capacity` chunks wait in the queue.
pub fn feed_channel(capacity: usize) -> (SessionFeed, SessionInput) {
    let (audio_tx, audio_rx) = mpsc::channel(capacity.max(1));
    let (close_tx, close_rx) = oneshot::channel();
    (
        SessionFeed { audio: audio_tx, close: Some(close_tx) },
        SessionInput { audio: audio_rx, closed: close_rx },
    )
}

impl SessionFeed {
    /// Queue one binary message of raw PCM without waiting.
    pub fn push(&self, chunk: Vec<u8>) -> Result<(), FeedError> {
        self.audio.try_send(chunk).map_err(|err| match err {
            TrySendError::Full(_) => FeedError::Backlogged,
            TrySendError::Closed(_) => FeedError::Ended,
        })
    }

    /// End the session. Only the first call has an effect.
    pub fn close(&mut self, reason: SessionClose) {
        if let Some(tx) = self.close.take() {
            let _ = tx.send(reason);
        }
    }
}

/// The outbound side of the channel could not accept a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelClosed;

/// Where emotion results go. Implemented by the WebSocket actor's address
/// and by in-memory channels in tests.
pub trait ResultSink {
    fn deliver(&mut self, result: &EmotionResult) -> Result<(), ChannelClosed>;
}

impl ResultSink for mpsc::UnboundedSender<EmotionResult> {
    fn deliver(&mut self, result: &EmotionResult) -> Result<(), ChannelClosed> {
        self.send(result.clone()).map_err(|_| ChannelClosed)
    }
}

/// How a session ended, folded into the process-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub bytes_received: usize,
    pub windows_processed: u64,
    pub results_emitted: u64,
    pub windows_skipped: u64,
    pub windows_failed: u64,
    /// Windows still in flight when the session closed
    pub windows_abandoned: u64,
    /// Audio thrown away at close: the partial window plus chunks still queued
    pub discarded_bytes: usize,
}

/// Outcome of processing one window.
#[derive(Debug)]
enum WindowOutcome {
    Emotion(EmotionResult),
    NoSpeech,
    Failed(PipelineError),
}

/// Why the loop stopped in the middle of a chunk.
enum Stop {
    Closed(SessionClose),
    SinkGone,
}

impl From<ChannelClosed> for Stop {
    fn from(_: ChannelClosed) -> Self {
        Stop::SinkGone
    }
}

pub struct AudioSession {
    pub session_id: Uuid,
    state: SessionState,
    accumulator: AudioAccumulator,
    pipeline: Arc<WindowPipeline>,
    summary: SessionSummary,
}

impl AudioSession {
    pub fn new(session_id: Uuid, window_threshold_bytes: usize, pipeline: Arc<WindowPipeline>) -> Self {
        Self {
            session_id,
            state: SessionState::Connecting,
            accumulator: AudioAccumulator::new(window_threshold_bytes),
            pipeline,
            summary: SessionSummary::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until the transport closes or the audio stream ends.
    ///
    /// A close signal wins over queued audio and over a window in flight: both are
    /// dropped and the loop returns at once.
    pub async fn run<S: ResultSink>(mut self, mut input: SessionInput, mut sink: S) -> SessionSummary {
        self.state = SessionState::Open;
        info!(threshold_bytes = self.accumulator.threshold(), "Session open");

        loop {
            tokio::select! {
                biased;
                reason = &mut input.closed => {
                    log_close(&reason.unwrap_or(SessionClose::Disconnect));
                    break;
                }
                chunk = input.audio.recv() => {
                    let Some(chunk) = chunk else {
                        info!("Audio stream ended");
                        break;
                    };
                    match self.handle_chunk(&chunk, &mut input.closed, &mut sink).await {
                        Ok(()) => {}
                        Err(Stop::Closed(reason)) => {
                            log_close(&reason);
                            break;
                        }
                        Err(Stop::SinkGone) => {
                            warn!("Result channel closed, ending session");
                            break;
                        }
                    }
                }
            }
        }

        self.close(input)
    }

    /// Feed one chunk and, if it completes a window, process and deliver it.
    async fn handle_chunk<S: ResultSink>(
        &mut self,
        chunk: &[u8],
        closed: &mut oneshot::Receiver<SessionClose>,
        sink: &mut S,
    ) -> Result<(), Stop> {
        self.summary.bytes_received += chunk.len();
        debug!(chunk_bytes = chunk.len(), buffered = self.accumulator.buffered_len(), "Audio received");

        let Some(window) = self.accumulator.feed(chunk) else {
            return Ok(());
        };

        let outcome = tokio::select! {
            biased;
            reason = &mut *closed => {
                debug!(window_bytes = window.len(), "Session closing, abandoning window in flight");
                self.summary.windows_abandoned += 1;
                return Err(Stop::Closed(reason.unwrap_or(SessionClose::Disconnect)));
            }
            outcome = self.process_window(&window) => outcome,
        };

        self.summary.windows_processed += 1;
        match outcome {
            WindowOutcome::Emotion(result) => {
                sink.deliver(&result)?;
                self.summary.results_emitted += 1;
            }
            WindowOutcome::NoSpeech => {
                debug!(window_bytes = window.len(), "No speech detected, skipping window");
                self.summary.windows_skipped += 1;
            }
            WindowOutcome::Failed(err) => {
                let stage = err.stage().map(|s| s.as_str()).unwrap_or("unknown");
                if matches!(err, PipelineError::Internal(_)) {
                    error!(
                        window_bytes = window.len(),
                        stage,
                        kind = err.kind().as_str(),
                        "Error during processing: {}", err
                    );
                } else {
                    warn!(
                        window_bytes = window.len(),
                        stage,
                        kind = err.kind().as_str(),
                        "Error during processing: {}", err
                    );
                }
                self.summary.windows_failed += 1;
            }
        }

        Ok(())
    }

    /// Run the pipeline with panics caught, so nothing escapes this window.
    async fn process_window(&self, window: &Window) -> WindowOutcome {
        let outcome = AssertUnwindSafe(self.pipeline.process(window))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Some(result))) => WindowOutcome::Emotion(result),
            Ok(Ok(None)) => WindowOutcome::NoSpeech,
            Ok(Err(err)) => WindowOutcome::Failed(err),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic while processing window".to_string());
                WindowOutcome::Failed(PipelineError::Internal(message))
            }
        }
    }

    /// Drop the partial window and anything still queued.
    fn close(mut self, mut input: SessionInput) -> SessionSummary {
        input.audio.close();
        let mut discarded = self.accumulator.discard();
        while let Ok(chunk) = input.audio.try_recv() {
            discarded += chunk.len();
        }

        self.summary.discarded_bytes = discarded;
        self.state = SessionState::Closed;
        info!(
            state = self.state.as_str(),
            bytes_received = self.summary.bytes_received,
            windows = self.summary.windows_processed,
            results = self.summary.results_emitted,
            abandoned = self.summary.windows_abandoned,
            discarded_bytes = self.summary.discarded_bytes,
            "Session closed"
        );
        self.summary
    }
}

fn log_close(reason: &SessionClose) {
    match reason {
        SessionClose::Disconnect => info!("Client disconnected"),
        SessionClose::TransportError(reason) => warn!(reason = %reason, "Transport error, ending session"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pipeline::testing::{pipeline, Heard, ScriptedRecognizer};
    use std::time::Duration;

    const THRESHOLD: usize = 192_000;
    const CHUNK: usize = 20_000;

    struct Harness {
        feed: SessionFeed,
        results: mpsc::UnboundedReceiver<EmotionResult>,
        recognizer: Arc<ScriptedRecognizer>,
        task: tokio::task::JoinHandle<SessionSummary>,
    }

    fn start(script: Vec<Heard>) -> Harness {
        let recognizer = Arc::new(ScriptedRecognizer::new(script));
        let session = AudioSession::new(Uuid::new_v4(), THRESHOLD, Arc::new(pipeline(recognizer.clone())));
        assert_eq!(session.state(), SessionState::Connecting);

        let (feed, input) = feed_channel(64);
        let (sink, results) = mpsc::unbounded_channel();
        let task = tokio::spawn(session.run(input, sink));

        Harness { feed, results, recognizer, task }
    }

    impl Harness {
        /// Queue one full window's worth of chunks (10 x 20000 bytes).
        fn send_window(&self) {
            for _ in 0..10 {
                self.feed.push(vec![0u8; CHUNK]).unwrap();
            }
        }

        async fn wait_for_calls(&self, n: usize) {
            while self.recognizer.calls.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    #[tokio::test]
    async fn test_window_with_speech_emits_one_result() {
        let mut h = start(vec![Heard::Speech("i am so angry right now")]);
        h.send_window();

        let result = h.results.recv().await.unwrap();
        assert_eq!(result, EmotionResult { emotion: "anger".into(), text: "i am so angry right now".into() });

        h.feed.close(SessionClose::Disconnect);
        let summary = h.task.await.unwrap();
        assert_eq!(summary.bytes_received, 200_000);
        assert_eq!(summary.windows_processed, 1);
        assert_eq!(summary.results_emitted, 1);
        assert_eq!(summary.discarded_bytes, 0);
        assert!(h.results.try_recv().is_err());

        // 200000 bytes of 16-bit audio
        assert_eq!(*h.recognizer.calls.lock().unwrap(), vec![100_000]);
    }

    #[tokio::test]
    async fn test_no_speech_keeps_session_open() {
        let mut h = start(vec![Heard::Silence, Heard::Speech("what a wonderful surprise")]);
        h.send_window();
        h.send_window();

        let result = h.results.recv().await.unwrap();
        assert_eq!(result.text, "what a wonderful surprise");
        assert_eq!(result.emotion, "joy");

        drop(h.feed);
        let summary = h.task.await.unwrap();
        assert_eq!(summary.windows_processed, 2);
        assert_eq!(summary.windows_skipped, 1);
        assert_eq!(summary.results_emitted, 1);
    }

    #[tokio::test]
    async fn test_classification_error_skips_only_that_window() {
        let mut h = start(vec![Heard::Speech("error in the model"), Heard::Speech("this is sad")]);
        h.send_window();
        h.send_window();

        let result = h.results.recv().await.unwrap();
        assert_eq!(result, EmotionResult { emotion: "sadness".into(), text: "this is sad".into() });

        h.feed.close(SessionClose::Disconnect);
        let summary = h.task.await.unwrap();
        assert_eq!(summary.windows_failed, 1);
        assert_eq!(summary.results_emitted, 1);
    }

    #[tokio::test]
    async fn test_transcription_failure_and_panic_are_contained() {
        let mut h = start(vec![Heard::Fail, Heard::Panic, Heard::Speech("hello again")]);
        h.send_window();
        h.send_window();
        h.send_window();

        let result = h.results.recv().await.unwrap();
        assert_eq!(result.text, "hello again");

        h.feed.close(SessionClose::Disconnect);
        let summary = h.task.await.unwrap();
        assert_eq!(summary.windows_failed, 2);
        assert_eq!(summary.results_emitted, 1);
    }

    #[tokio::test]
    async fn test_disconnect_mid_accumulation_discards_partial_window() {
        let mut h = start(vec![Heard::Speech("never heard")]);
        for _ in 0..9 {
            h.feed.push(vec![0u8; CHUNK]).unwrap();
        }
        h.feed.close(SessionClose::Disconnect);

        let summary = h.task.await.unwrap();
        assert_eq!(summary.windows_processed, 0);
        // Buffered or still queued, none of it is processed
        assert_eq!(summary.discarded_bytes, 180_000);
        assert!(h.recognizer.calls.lock().unwrap().is_empty());
        assert!(h.results.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_drops_queued_windows_and_window_in_flight() {
        let mut h = start(vec![Heard::Stall, Heard::Speech("too late")]);
        for _ in 0..5 {
            h.send_window();
        }
        h.wait_for_calls(1).await;

        h.feed.close(SessionClose::Disconnect);
        // Well under the 1s adapter timeout the stalled call would otherwise hit
        let summary = tokio::time::timeout(Duration::from_millis(500), h.task)
            .await
            .expect("session did not stop promptly")
            .unwrap();

        assert_eq!(h.recognizer.calls.lock().unwrap().len(), 1);
        assert_eq!(summary.bytes_received, 200_000);
        assert_eq!(summary.windows_processed, 0);
        assert_eq!(summary.windows_abandoned, 1);
        assert_eq!(summary.discarded_bytes, 800_000);
        assert!(h.results.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_results_follow_window_order() {
        let mut h = start(vec![
            Heard::Speech("first sad thing"),
            Heard::Speech("second angry thing"),
            Heard::Speech("third happy thing"),
        ]);
        for _ in 0..3 {
            h.send_window();
        }

        let texts: Vec<String> = vec![
            h.results.recv().await.unwrap().text,
            h.results.recv().await.unwrap().text,
            h.results.recv().await.unwrap().text,
        ];
        assert_eq!(texts, vec!["first sad thing", "second angry thing", "third happy thing"]);

        h.feed.close(SessionClose::TransportError("reset by peer".into()));
        let summary = h.task.await.unwrap();
        assert_eq!(summary.results_emitted, 3);
    }

    #[tokio::test]
    async fn test_closed_sink_ends_session() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![Heard::Speech("anyone there")]));
        let session = AudioSession::new(Uuid::new_v4(), THRESHOLD, Arc::new(pipeline(recognizer)));
        let (feed, input) = feed_channel(16);
        let (sink, results) = mpsc::unbounded_channel::<EmotionResult>();
        drop(results);

        let task = tokio::spawn(session.run(input, sink));
        for _ in 0..10 {
            feed.push(vec![0u8; CHUNK]).unwrap();
        }

        let summary = task.await.unwrap();
        assert_eq!(summary.windows_processed, 1);
        assert_eq!(summary.results_emitted, 0);
    }

    #[test]
    fn test_feed_is_bounded() {
        let (mut feed, input) = feed_channel(2);
        assert_eq!(feed.push(vec![0u8; 4]), Ok(()));
        assert_eq!(feed.push(vec![0u8; 4]), Ok(()));
        assert_eq!(feed.push(vec![0u8; 4]), Err(FeedError::Backlogged));

        drop(input);
        assert_eq!(feed.push(vec![0u8; 4]), Err(FeedError::Ended));
        // A second close after the session is gone is harmless
        feed.close(SessionClose::Disconnect);
        feed.close(SessionClose::Disconnect);
    }
}

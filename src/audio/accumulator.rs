//! # Audio Accumulator
//!
//! Collects the raw PCM chunks of one session until enough audio has arrived to
//! form a processing window.
//!
//! ## Windowing policy:
//! - Chunks are appended in arrival order, never reordered or split
//! - Once the buffer holds **more than** the threshold, the whole buffer becomes a window
//! - Windows are therefore variable in size and always larger than the threshold
//! - Extraction and reset happen in one step, so the next chunk starts a fresh buffer

/// An immutable run of raw PCM bytes flushed out of the accumulator.
///
/// A window is consumed exactly once by the pipeline and has no identity of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window(Vec<u8>);

impl Window {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Window {
    fn from(bytes: Vec<u8>) -> Self {
        Window(bytes)
    }
}

/// Per-session append-only buffer with a flush threshold.
///
/// Owned exclusively by one session loop, so no locking is involved.
#[derive(Debug)]
pub struct AudioAccumulator {
    buffer: Vec<u8>,
    threshold: usize,
}

impl AudioAccumulator {
    /// Create an accumulator that flushes once it holds more than `threshold` bytes.
    pub fn new(threshold: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(threshold + threshold / 4),
            threshold,
        }
    }

    /// Append a chunk and flush a window if the threshold has been crossed.
    ///
    /// ## Returns:
    /// - **Some(Window)**: everything accumulated since the last flush, chunk included
    /// - **None**: still at or below the threshold
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Window> {
        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() > self.threshold {
            Some(self.take_window())
        } else {
            None
        }
    }

    /// Swap the live buffer for an empty one and hand back what it held.
    fn take_window(&mut self) -> Window {
        let fresh = Vec::with_capacity(self.buffer.capacity());
        Window(std::mem::replace(&mut self.buffer, fresh))
    }

    /// Bytes currently waiting below the threshold.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Drop any partial audio, returning how many bytes were discarded.
    ///
    /// Used when a session closes: a partial window is never processed.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer = Vec::new();
        dropped
    }
}

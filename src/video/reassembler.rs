//! Frame reassembly engine
//!
//! Feeds decoder output through the marker splitter and hands every complete
//! frame to event subscribers (push) and to [`FrameStream`]s (pull).

use crate::events::{DroneEvent, EventBus};
use bytes::Bytes;
use futures::Stream;
use quadlink_shared::codec::FrameSplitter;
use quadlink_shared::VideoError;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Item delivered to pull consumers
#[derive(Debug)]
enum VideoSignal {
    Frame(Bytes),
    Ended(String),
}

struct ReassemblerState {
    splitter: FrameSplitter,
    consumers: Vec<mpsc::UnboundedSender<VideoSignal>>,
    ended: Option<String>,
    frames_emitted: u64,
}

/// Turns an open-ended byte stream into discrete frames
pub struct FrameReassembler {
    state: Mutex<ReassemblerState>,
    events: EventBus,
}

impl FrameReassembler {
    /// Create an engine with the default 5 MiB buffer ceiling
    pub fn new(events: EventBus) -> Self {
        Self::with_splitter(FrameSplitter::new(), events)
    }

    /// Create an engine around a configured splitter
    pub fn with_splitter(splitter: FrameSplitter, events: EventBus) -> Self {
        Self {
            state: Mutex::new(ReassemblerState {
                splitter,
                consumers: Vec::new(),
                ended: None,
                frames_emitted: 0,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReassemblerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append decoder output and emit every frame it completes
    ///
    /// Returns the number of frames emitted.
    pub fn feed(&self, chunk: &[u8]) -> usize {
        let mut state = self.lock();
        let frames = state.splitter.push(chunk);
        let count = frames.len();

        for frame in frames {
            state
                .consumers
                .retain(|consumer| consumer.send(VideoSignal::Frame(frame.clone())).is_ok());
            self.events.publish(DroneEvent::Frame(frame));
        }
        state.frames_emitted += count as u64;

        count
    }

    /// Drop buffered bytes after an upstream restart and accept input again
    pub fn reset(&self) {
        let mut state = self.lock();
        debug!(
            "[VIDEO] Reset, discarding {} buffered bytes",
            state.splitter.buffer_len()
        );
        state.splitter.clear();
        state.ended = None;
    }

    /// Announce that no more input will arrive
    ///
    /// Pull consumers finish the frames already delivered, then resolve with
    /// [`VideoError::StreamEnded`].
    pub fn end_stream(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.lock();
        if state.ended.is_some() {
            return;
        }

        info!(
            "[VIDEO] Stream ended after {} frame(s): {}",
            state.frames_emitted, reason
        );
        for consumer in state.consumers.drain(..) {
            let _ = consumer.send(VideoSignal::Ended(reason.clone()));
        }
        state.ended = Some(reason.clone());
        drop(state);

        self.events.publish(DroneEvent::VideoStreamEnded(reason));
    }

    /// Whether the upstream source is still live
    pub fn is_active(&self) -> bool {
        self.lock().ended.is_none()
    }

    /// Undelimited bytes currently held
    pub fn buffered(&self) -> usize {
        self.lock().splitter.buffer_len()
    }

    /// Total frames emitted since creation
    pub fn frames_emitted(&self) -> u64 {
        self.lock().frames_emitted
    }

    /// Open a pull consumer that sees every frame emitted from now on
    pub fn frames(&self) -> FrameStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        match &state.ended {
            Some(reason) => {
                let _ = tx.send(VideoSignal::Ended(reason.clone()));
            }
            None => state.consumers.push(tx),
        }
        FrameStream { rx, ended: None }
    }
}

/// Single-consumer lazy sequence of frames
///
/// Frames are queued per stream, so a slow reader never loses frames.
pub struct FrameStream {
    rx: mpsc::UnboundedReceiver<VideoSignal>,
    ended: Option<String>,
}

impl FrameStream {
    /// Next frame, or why no more will come
    pub async fn next_frame(&mut self) -> Result<Bytes, VideoError> {
        if let Some(reason) = &self.ended {
            return Err(VideoError::StreamEnded(reason.clone()));
        }
        let signal = self.rx.recv().await;
        self.resolve(signal)
    }

    fn resolve(&mut self, signal: Option<VideoSignal>) -> Result<Bytes, VideoError> {
        match signal {
            Some(VideoSignal::Frame(frame)) => Ok(frame),
            Some(VideoSignal::Ended(reason)) => {
                self.ended = Some(reason.clone());
                Err(VideoError::StreamEnded(reason))
            }
            None => {
                let reason = "frame reassembler dropped".to_string();
                self.ended = Some(reason.clone());
                Err(VideoError::StreamEnded(reason))
            }
        }
    }
}

impl Stream for FrameStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        if self.ended.is_some() {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(signal) => Poll::Ready(self.resolve(signal).ok()),
            Poll::Pending => Poll::Pending,
        }
    }
}

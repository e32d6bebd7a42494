//! In-process decoder fed through a [`FrameFeed`].
//!
//! The host (console, camera bridge, test) pushes frames into the feed; the
//! running scanner receives them. A push while no scanner is listening fails
//! with [`DecoderError::NotActive`] instead of being queued.

use super::{DecoderError, DecoderEvent, FrameStream, QrDecoder, ScanEvent, StartFuture};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use turnstile_core::environment::Clock;

#[derive(Default)]
struct Listener {
    sender: Option<mpsc::UnboundedSender<DecoderEvent>>,
    generation: u64,
    denied: Option<String>,
}

struct Shared {
    listener: Mutex<Listener>,
    active: watch::Sender<bool>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Listener> {
        self.listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Decoder whose frames come from a [`FrameFeed`]
#[derive(Clone)]
pub struct ChannelDecoder {
    shared: Arc<Shared>,
}

/// Producer side of a [`ChannelDecoder`]
#[derive(Clone)]
pub struct FrameFeed {
    shared: Arc<Shared>,
}

impl ChannelDecoder {
    /// Create a decoder and the feed that drives it
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> (Self, FrameFeed) {
        let (active, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            listener: Mutex::new(Listener::default()),
            active,
            clock,
        });

        (
            Self {
                shared: Arc::clone(&shared),
            },
            FrameFeed { shared },
        )
    }
}

// Clears the listener when the stream it belongs to is dropped
struct ListenerGuard {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let mut listener = self.shared.lock();
        if listener.generation == self.generation {
            listener.sender = None;
            self.shared.active.send_replace(false);
            tracing::debug!(generation = self.generation, "Scanner released");
        }
    }
}

impl QrDecoder for ChannelDecoder {
    fn start(&self) -> StartFuture {
        let shared = Arc::clone(&self.shared);

        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();

            let generation = {
                let mut listener = shared.lock();
                if let Some(reason) = listener.denied.clone() {
                    return Err(DecoderError::PermissionDenied(reason));
                }
                listener.generation += 1;
                listener.sender = Some(tx);
                listener.generation
            };
            shared.active.send_replace(true);
            tracing::debug!(generation, "Scanner started");

            let guard = ListenerGuard {
                shared: Arc::clone(&shared),
                generation,
            };

            let frames: FrameStream = Box::pin(async_stream::stream! {
                let _guard = guard;
                while let Some(event) = rx.recv().await {
                    let stop = matches!(event, DecoderEvent::CameraFailed(_));
                    yield event;
                    if stop {
                        break;
                    }
                }
            });

            Ok(frames)
        })
    }
}

impl FrameFeed {
    /// Push decoded text
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::NotActive`] if no scanner is running.
    pub fn push_text(&self, payload: impl Into<String>) -> Result<(), DecoderError> {
        let received_at = self.shared.clock.now();
        self.push(DecoderEvent::Decoded(ScanEvent {
            payload: payload.into(),
            received_at,
        }))
    }

    /// Report a frame that could not be decoded
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::NotActive`] if no scanner is running.
    pub fn push_unreadable(&self, reason: impl Into<String>) -> Result<(), DecoderError> {
        self.push(DecoderEvent::FrameUnreadable(reason.into()))
    }

    /// Report a camera failure; the running scanner stops after delivering it
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::NotActive`] if no scanner is running.
    pub fn push_camera_failure(&self, reason: impl Into<String>) -> Result<(), DecoderError> {
        self.push(DecoderEvent::CameraFailed(reason.into()))
    }

    /// Make following `start()` calls fail as if camera access was refused
    pub fn deny_camera(&self, reason: Option<String>) {
        self.shared.lock().denied = reason;
    }

    /// Whether a scanner is currently listening
    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.shared.active.borrow()
    }

    /// Wait until the listening state equals `active`
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::NotActive`] on timeout.
    pub async fn wait_until(&self, active: bool, timeout: Duration) -> Result<(), DecoderError> {
        let mut rx = self.shared.active.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|a| *a == active))
            .await
            .map_err(|_| DecoderError::NotActive)?
            .map(|_| ())
            .map_err(|_| DecoderError::NotActive)
    }

    fn push(&self, event: DecoderEvent) -> Result<(), DecoderError> {
        let listener = self.shared.lock();
        match &listener.sender {
            Some(tx) if !tx.is_closed() => tx.send(event).map_err(|_| DecoderError::NotActive),
            _ => {
                tracing::warn!("Frame pushed with no active scanner");
                Err(DecoderError::NotActive)
            },
        }
    }
}

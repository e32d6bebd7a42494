//! QR decoder adapters.
//!
//! A decoder is an event source: [`QrDecoder::start`] acquires the capture
//! device and returns a stream of [`DecoderEvent`]s. Dropping the stream is
//! `stop()`: it releases the device and unregisters the listener, so nothing
//! decoded afterwards can reach the workflow.
//!
//! Decoders never retry. An unreadable frame is reported and capture
//! continues; a camera failure is reported once and the stream ends.

use chrono::{DateTime, Utc};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub mod channel;
pub mod line;

pub use channel::{ChannelDecoder, FrameFeed};
pub use line::{LineDecoder, MAX_LINE_BYTES};

/// One successfully decoded frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEvent {
    /// Decoded text
    pub payload: String,
    /// When the frame was decoded
    pub received_at: DateTime<Utc>,
}

/// Everything a running decoder can report
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecoderEvent {
    /// A frame decoded to text
    Decoded(ScanEvent),
    /// A frame could not be decoded; capture continues
    FrameUnreadable(String),
    /// The camera failed or access was revoked; the stream ends after this
    CameraFailed(String),
}

/// Stream of decoder events; drop it to stop capture
pub type FrameStream = Pin<Box<dyn Stream<Item = DecoderEvent> + Send>>;

/// Boxed future returned by [`QrDecoder::start`]
pub type StartFuture = Pin<Box<dyn Future<Output = Result<FrameStream, DecoderError>> + Send>>;

/// Decoder start failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    /// The operator (or platform) refused camera access
    #[error("Camera access denied: {0}")]
    PermissionDenied(String),

    /// The capture device could not be opened
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    /// A frame was pushed while no scanner is listening
    #[error("No active scanner")]
    NotActive,
}

/// A startable source of decoded QR frames
pub trait QrDecoder: Send + Sync {
    /// Acquire the device and begin decoding
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError`] if the device cannot be acquired.
    fn start(&self) -> StartFuture;
}

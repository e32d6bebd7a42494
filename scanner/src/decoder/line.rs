//! Line-oriented decoder for keyboard-wedge and serial QR scanners.
//!
//! Such scanners decode in hardware and emit one line per code. Each line is
//! a decoded frame. A line that is not UTF-8, or that runs past
//! [`MAX_LINE_BYTES`], is an unreadable frame; failing to open or read the
//! device is a camera failure. End of input ends the stream.

use super::{DecoderError, DecoderEvent, FrameStream, QrDecoder, ScanEvent, StartFuture};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use turnstile_core::environment::Clock;

/// Longest line read as one frame, terminator included
///
/// Room for the longest ticket id wrapped in a JSON payload.
pub const MAX_LINE_BYTES: u64 = 8 * 1024;

type Reader = Box<dyn AsyncRead + Send + Unpin>;

enum Source {
    /// Re-opened on every start
    Path(PathBuf),
    /// Usable for one start only
    Reader(Mutex<Option<Reader>>),
}

/// Decoder reading newline-terminated codes from a device, file, or reader
#[derive(Clone)]
pub struct LineDecoder {
    source: Arc<Source>,
    clock: Arc<dyn Clock>,
}

impl LineDecoder {
    /// Read from a device or file path, opened on each start
    #[must_use]
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: Arc::new(Source::Path(path.into())),
            clock,
        }
    }

    /// Read from an already open reader; only the first start succeeds
    #[must_use]
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: Arc::new(Source::Reader(Mutex::new(Some(Box::new(reader))))),
            clock,
        }
    }
}

impl QrDecoder for LineDecoder {
    fn start(&self) -> StartFuture {
        let source = Arc::clone(&self.source);
        let clock = Arc::clone(&self.clock);

        Box::pin(async move {
            let reader: Reader = match &*source {
                Source::Path(path) => {
                    let file = tokio::fs::File::open(path).await.map_err(|e| {
                        DecoderError::Unavailable(format!("{}: {e}", path.display()))
                    })?;
                    Box::new(file)
                },
                Source::Reader(slot) => take_reader(slot)?,
            };

            tracing::debug!("Line scanner started");
            Ok(lines(BufReader::new(reader), clock))
        })
    }
}

fn take_reader(slot: &Mutex<Option<Reader>>) -> Result<Reader, DecoderError> {
    slot.lock()
        .map_err(|_| DecoderError::Unavailable("reader lock poisoned".to_string()))?
        .take()
        .ok_or_else(|| DecoderError::Unavailable("input already consumed".to_string()))
}

fn lines(mut reader: BufReader<Reader>, clock: Arc<dyn Clock>) -> FrameStream {
    Box::pin(async_stream::stream! {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {},
                Err(e) => {
                    yield DecoderEvent::CameraFailed(e.to_string());
                    break;
                },
            }

            if buf.last() != Some(&b'\n') && buf.len() as u64 >= MAX_LINE_BYTES {
                if let Err(e) = skip_line(&mut reader).await {
                    yield DecoderEvent::CameraFailed(e.to_string());
                    break;
                }
                yield DecoderEvent::FrameUnreadable(format!(
                    "line longer than {MAX_LINE_BYTES} bytes"
                ));
                continue;
            }

            match std::str::from_utf8(&buf) {
                Ok(text) if text.trim().is_empty() => {},
                Ok(text) => {
                    yield DecoderEvent::Decoded(ScanEvent {
                        payload: text.trim_end_matches(['\r', '\n']).to_string(),
                        received_at: clock.now(),
                    });
                },
                Err(e) => {
                    yield DecoderEvent::FrameUnreadable(format!("not UTF-8: {e}"));
                },
            }
        }
        tracing::debug!("Line scanner input ended");
    })
}

/// Discard input up to and including the next newline
async fn skip_line(reader: &mut BufReader<Reader>) -> std::io::Result<()> {
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        let (used, found) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };
        reader.consume(used);
        if found {
            return Ok(());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use futures::StreamExt;
    use turnstile_testing::test_clock;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(test_clock())
    }

    #[tokio::test]
    async fn test_each_line_is_a_frame() {
        let input: &[u8] = b"T-101\r\n\n{\"ticketId\":\"T-102\"}\n\xff\xfe\nT-103";
        let decoder = LineDecoder::from_reader(input, clock());

        let events: Vec<_> = decoder.start().await.unwrap().collect().await;

        let payloads: Vec<_> = events
            .iter()
            .map(|e| match e {
                DecoderEvent::Decoded(scan) => scan.payload.clone(),
                DecoderEvent::FrameUnreadable(_) => "<unreadable>".to_string(),
                DecoderEvent::CameraFailed(_) => "<failed>".to_string(),
            })
            .collect();
        assert_eq!(
            payloads,
            vec!["T-101", "{\"ticketId\":\"T-102\"}", "<unreadable>", "T-103"]
        );
    }

    #[tokio::test]
    async fn test_overlong_line_is_unreadable() {
        let mut input = vec![b'A'; MAX_LINE_BYTES as usize * 3];
        input.extend_from_slice(b"\nT-1\n");
        let decoder = LineDecoder::from_reader(std::io::Cursor::new(input), clock());

        let events: Vec<_> = decoder.start().await.unwrap().collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], DecoderEvent::FrameUnreadable(reason) if reason.contains("longer than")));
        assert!(matches!(&events[1], DecoderEvent::Decoded(scan) if scan.payload == "T-1"));
    }

    #[tokio::test]
    async fn test_line_at_limit_is_a_frame() {
        let mut input = vec![b'A'; MAX_LINE_BYTES as usize - 1];
        input.push(b'\n');
        let decoder = LineDecoder::from_reader(std::io::Cursor::new(input), clock());

        let events: Vec<_> = decoder.start().await.unwrap().collect().await;

        assert_eq!(events.len(), 1);
        assert!(
            matches!(&events[0], DecoderEvent::Decoded(scan) if scan.payload.len() == MAX_LINE_BYTES as usize - 1)
        );
    }

    #[tokio::test]
    async fn test_reader_is_single_use() {
        let decoder = LineDecoder::from_reader(&b"T-1\n"[..], clock());

        let _first = decoder.start().await.unwrap();
        let second = decoder.start().await;

        assert!(matches!(second, Err(DecoderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_missing_device() {
        let decoder = LineDecoder::open("/nonexistent/turnstile-scanner", clock());

        let result = decoder.start().await;

        assert!(matches!(result, Err(DecoderError::Unavailable(_))));
    }
}

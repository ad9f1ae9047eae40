use crate::capture::{
    AudioChunk, AudioEncoding, CaptureControl, CaptureDevice, CaptureError, CaptureSession,
};
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Device that replays a fixed list of chunks. Used by tests and by headless
/// builds where no microphone backend is compiled in.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCaptureDevice {
    supported: Vec<AudioEncoding>,
    reported_mime: Option<String>,
    chunks: Vec<AudioChunk>,
    fail_after: Option<usize>,
    unavailable: Option<String>,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ScriptedCaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supporting(mut self, encoding: AudioEncoding) -> Self {
        self.supported.push(encoding);
        self
    }

    pub fn reporting_mime(mut self, mime_type: &str) -> Self {
        self.reported_mime = Some(mime_type.to_owned());
        self
    }

    pub fn with_chunk(mut self, chunk: AudioChunk) -> Self {
        self.chunks.push(chunk);
        self
    }

    /// Deliver the first `n` chunks, then report a device failure.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Refuse every `open` as if access had been denied.
    pub fn unavailable(mut self, details: &str) -> Self {
        self.unavailable = Some(details.to_owned());
        self
    }

    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for ScriptedCaptureDevice {
    fn supports(&self, encoding: AudioEncoding) -> bool {
        self.supported.contains(&encoding)
    }

    fn open(&self, _encoding: AudioEncoding) -> BoxFuture<'_, Result<CaptureSession, CaptureError>> {
        async move {
            if let Some(details) = &self.unavailable {
                return Err(CaptureError::DeviceUnavailable {
                    details: details.clone(),
                });
            }
            self.opened.fetch_add(1, Ordering::SeqCst);

            let (tx, rx) = mpsc::channel(self.chunks.len() + 1);
            for (index, chunk) in self.chunks.iter().enumerate() {
                let item = if self.fail_after == Some(index) {
                    Err(CaptureError::Device(format!(
                        "scripted failure after {index} chunks"
                    )))
                } else {
                    Ok(chunk.clone())
                };
                let failed = item.is_err();
                // capacity covers every chunk, so this never drops
                let _ = tx.try_send(item);
                if failed {
                    break;
                }
            }

            Ok(CaptureSession {
                mime_type: self.reported_mime.clone(),
                chunks: rx,
                control: Box::new(ScriptedControl {
                    sender: Some(tx),
                    released: Arc::clone(&self.released),
                }),
            })
        }
        .boxed()
    }
}

struct ScriptedControl {
    sender: Option<mpsc::Sender<Result<AudioChunk, CaptureError>>>,
    released: Arc<AtomicUsize>,
}

impl CaptureControl for ScriptedControl {
    fn request_stop(&mut self) {
        self.sender = None;
    }

    fn release(&mut self) {
        self.sender = None;
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

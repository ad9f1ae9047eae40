//! Audio capture: encoding negotiation, chunk accumulation and artifact
//! finalization.
//!
//! A [`CaptureController`] drives one [`CaptureDevice`] through
//! `Idle -> Recording -> Stopping -> Idle`. Devices deliver encoded chunks
//! over an ordered channel and close it once everything is flushed; closing
//! the channel is what `stop_capture` waits for.

#[cfg(feature = "audio-device")]
mod microphone;
mod scripted;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

#[cfg(feature = "audio-device")]
pub use microphone::MicrophoneDevice;
pub use scripted::ScriptedCaptureDevice;

/// Used when neither the device, the negotiated encoding nor the chunks
/// carry a type.
pub const DEFAULT_MIME_TYPE: &str = "audio/webm";

/// Probed in order; the first encoding the device supports wins and
/// `ContainerDefault` is the fallback. Fixed so artifacts stay decodable by
/// the remote transcriber.
pub const ENCODING_PREFERENCE: [AudioEncoding; 2] =
    [AudioEncoding::WebmOpus, AudioEncoding::OggOpus];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioEncoding {
    WebmOpus,
    OggOpus,
    /// Whatever the device's container produces by default.
    ContainerDefault,
}

impl AudioEncoding {
    pub fn mime_type(&self) -> Option<&'static str> {
        match self {
            AudioEncoding::WebmOpus => Some("audio/webm;codecs=opus"),
            AudioEncoding::OggOpus => Some("audio/ogg;codecs=opus"),
            AudioEncoding::ContainerDefault => None,
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type().unwrap_or("container-default"))
    }
}

/// A finalized audio payload. Immutable: every capture or file load yields a
/// new value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioArtifact {
    bytes: Bytes,
    mime_type: String,
    duration_hint: Option<Duration>,
}

impl AudioArtifact {
    pub fn new(bytes: impl Into<Bytes>, mime_type: &str) -> Self {
        let mime_type = mime_type.trim();
        Self {
            bytes: bytes.into(),
            mime_type: if mime_type.is_empty() {
                DEFAULT_MIME_TYPE.to_owned()
            } else {
                mime_type.to_owned()
            },
            duration_hint: None,
        }
    }

    pub fn with_duration_hint(self, duration: Duration) -> Self {
        Self {
            duration_hint: Some(duration),
            ..self
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn duration_hint(&self) -> Option<Duration> {
        self.duration_hint
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension the remote transcriber uses to pick a decoder.
    /// Precedence: ogg, wav, m4a, then webm.
    pub fn upload_extension(&self) -> &'static str {
        let mime = self.mime_type.to_ascii_lowercase();
        if mime.contains("ogg") {
            "ogg"
        } else if mime.contains("wav") {
            "wav"
        } else if mime.contains("m4a") || mime.contains("mp4") {
            "m4a"
        } else {
            "webm"
        }
    }

    pub fn upload_filename(&self) -> String {
        format!("recording.{}", self.upload_extension())
    }
}

/// Builds an artifact from bytes that did not come from a recording.
pub fn load_from_file(bytes: impl Into<Bytes>, declared_type: &str) -> AudioArtifact {
    let artifact = AudioArtifact::new(bytes, declared_type);
    tracing::debug!(
        bytes = artifact.len(),
        mime_type = %artifact.mime_type(),
        "artifact loaded from file"
    );
    artifact
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioChunk {
    pub bytes: Bytes,
    pub mime_type: Option<String>,
}

impl AudioChunk {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: &str) -> Self {
        self.mime_type = Some(mime_type.to_owned());
        self
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("audio input unavailable: {details}")]
    DeviceUnavailable { details: String },

    #[error("a capture is already in progress")]
    AlreadyActive,

    #[error("no capture in progress")]
    NotRecording,

    #[error("capture device failed: {0}")]
    Device(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureWarning {
    EmptyRecording,
}

impl fmt::Display for CaptureWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureWarning::EmptyRecording => {
                f.write_str("no audio was captured; check the microphone and try again")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedCapture {
    pub artifact: AudioArtifact,
    pub warning: Option<CaptureWarning>,
}

/// Stops and releases a device that is recording.
pub trait CaptureControl: Send {
    /// Ask the device to flush what it has and close the chunk channel.
    fn request_stop(&mut self);

    /// Give the device handle back. Called exactly once per session.
    fn release(&mut self);
}

pub struct CaptureSession {
    /// What the device says it is producing, if anything.
    pub mime_type: Option<String>,
    pub chunks: mpsc::Receiver<Result<AudioChunk, CaptureError>>,
    pub control: Box<dyn CaptureControl>,
}

pub trait CaptureDevice: Send + Sync {
    fn supports(&self, encoding: AudioEncoding) -> bool;

    /// Acquire the device and start recording. Fails with
    /// [`CaptureError::DeviceUnavailable`] when access is denied or there is
    /// no device.
    fn open(&self, encoding: AudioEncoding) -> BoxFuture<'_, Result<CaptureSession, CaptureError>>;
}

pub fn negotiate_encoding<D: CaptureDevice + ?Sized>(device: &D) -> AudioEncoding {
    ENCODING_PREFERENCE
        .into_iter()
        .find(|encoding| device.supports(*encoding))
        .unwrap_or(AudioEncoding::ContainerDefault)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Stopping,
}

struct ActiveCapture {
    encoding: AudioEncoding,
    session: CaptureSession,
    started_at: Instant,
}

enum ControllerState {
    Idle,
    Recording(ActiveCapture),
    Stopping,
}

pub struct CaptureController<D> {
    device: D,
    state: ControllerState,
}

impl<D: CaptureDevice> CaptureController<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: ControllerState::Idle,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn state(&self) -> CaptureState {
        match self.state {
            ControllerState::Idle => CaptureState::Idle,
            ControllerState::Recording(_) => CaptureState::Recording,
            ControllerState::Stopping => CaptureState::Stopping,
        }
    }

    pub async fn start_capture(&mut self) -> Result<AudioEncoding, CaptureError> {
        if !matches!(self.state, ControllerState::Idle) {
            return Err(CaptureError::AlreadyActive);
        }

        let encoding = negotiate_encoding(&self.device);
        let session = self.device.open(encoding).await.map_err(|e| {
            tracing::warn!(error = %e, %encoding, "capture device could not be opened");
            e
        })?;

        tracing::info!(%encoding, "capture started");
        self.state = ControllerState::Recording(ActiveCapture {
            encoding,
            session,
            started_at: Instant::now(),
        });
        Ok(encoding)
    }

    /// Waits until the device has flushed every chunk, then assembles the
    /// artifact. The device is released and the controller is back to
    /// `Idle` on every exit path, including cancellation of this future.
    pub async fn stop_capture(&mut self) -> Result<FinalizedCapture, CaptureError> {
        let active = match std::mem::replace(&mut self.state, ControllerState::Stopping) {
            ControllerState::Recording(active) => active,
            other => {
                self.state = other;
                return Err(CaptureError::NotRecording);
            }
        };

        let ActiveCapture {
            encoding,
            session,
            started_at,
        } = active;
        let CaptureSession {
            mime_type: reported_mime,
            mut chunks,
            control,
        } = session;

        let mut guard = StopGuard {
            state: &mut self.state,
            control,
        };
        guard.control.request_stop();

        let mut collected = Vec::new();
        while let Some(item) = chunks.recv().await {
            match item {
                Ok(chunk) => collected.push(chunk),
                Err(e) => {
                    tracing::warn!(error = %e, chunks = collected.len(), "capture failed while flushing");
                    return Err(e);
                }
            }
        }
        drop(guard);

        let mime_type = reported_mime
            .filter(|m| !m.trim().is_empty())
            .or_else(|| encoding.mime_type().map(str::to_owned))
            .or_else(|| collected.first().and_then(|c| c.mime_type.clone()))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_owned());

        let total: usize = collected.iter().map(|c| c.bytes.len()).sum();
        let mut payload = BytesMut::with_capacity(total);
        for chunk in &collected {
            payload.extend_from_slice(&chunk.bytes);
        }

        let artifact =
            AudioArtifact::new(payload.freeze(), &mime_type).with_duration_hint(started_at.elapsed());
        let warning = artifact.is_empty().then_some(CaptureWarning::EmptyRecording);
        match warning {
            Some(w) => tracing::warn!(%mime_type, "{w}"),
            None => tracing::info!(
                bytes = artifact.len(),
                chunks = collected.len(),
                %mime_type,
                "capture finalized"
            ),
        }

        Ok(FinalizedCapture { artifact, warning })
    }
}

struct StopGuard<'a> {
    state: &'a mut ControllerState,
    control: Box<dyn CaptureControl>,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.control.release();
        *self.state = ControllerState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_takes_the_first_supported_encoding() {
        let both = ScriptedCaptureDevice::new()
            .supporting(AudioEncoding::OggOpus)
            .supporting(AudioEncoding::WebmOpus);
        assert_eq!(negotiate_encoding(&both), AudioEncoding::WebmOpus);

        let ogg = ScriptedCaptureDevice::new().supporting(AudioEncoding::OggOpus);
        assert_eq!(negotiate_encoding(&ogg), AudioEncoding::OggOpus);

        let none = ScriptedCaptureDevice::new();
        assert_eq!(negotiate_encoding(&none), AudioEncoding::ContainerDefault);
    }

    #[tokio::test]
    async fn chunks_are_concatenated_in_arrival_order() {
        let device = ScriptedCaptureDevice::new()
            .supporting(AudioEncoding::WebmOpus)
            .with_chunk(AudioChunk::new(&b"ab"[..]))
            .with_chunk(AudioChunk::new(&b"cd"[..]))
            .with_chunk(AudioChunk::new(&b"e"[..]));
        let mut controller = CaptureController::new(device);

        let encoding = controller.start_capture().await.unwrap();
        assert_eq!(encoding, AudioEncoding::WebmOpus);
        assert_eq!(controller.state(), CaptureState::Recording);

        let finalized = controller.stop_capture().await.unwrap();
        assert_eq!(finalized.artifact.bytes().as_ref(), b"abcde");
        assert_eq!(finalized.artifact.mime_type(), "audio/webm;codecs=opus");
        assert!(finalized.artifact.duration_hint().is_some());
        assert_eq!(finalized.warning, None);
        assert_eq!(controller.state(), CaptureState::Idle);
        assert_eq!(controller.device().released_count(), 1);
    }

    #[tokio::test]
    async fn second_start_while_recording_is_rejected() {
        let device = ScriptedCaptureDevice::new().with_chunk(AudioChunk::new(&b"x"[..]));
        let mut controller = CaptureController::new(device);
        controller.start_capture().await.unwrap();
        assert_eq!(
            controller.start_capture().await,
            Err(CaptureError::AlreadyActive)
        );
        assert_eq!(controller.device().opened_count(), 1);
        controller.stop_capture().await.unwrap();
        controller.start_capture().await.unwrap();
        assert_eq!(controller.device().opened_count(), 2);
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let mut controller = CaptureController::new(ScriptedCaptureDevice::new());
        assert_eq!(
            controller.stop_capture().await,
            Err(CaptureError::NotRecording)
        );
        assert_eq!(controller.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn empty_capture_is_flagged_not_failed() {
        let mut controller = CaptureController::new(ScriptedCaptureDevice::new());
        controller.start_capture().await.unwrap();
        let finalized = controller.stop_capture().await.unwrap();
        assert!(finalized.artifact.is_empty());
        assert_eq!(finalized.warning, Some(CaptureWarning::EmptyRecording));
        assert_eq!(controller.state(), CaptureState::Idle);
        assert_eq!(controller.device().released_count(), 1);
    }

    #[tokio::test]
    async fn denied_device_leaves_controller_idle() {
        let device = ScriptedCaptureDevice::new().unavailable("permission denied");
        let mut controller = CaptureController::new(device);
        let err = controller.start_capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable { .. }));
        assert_eq!(controller.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn device_failure_while_flushing_still_releases() {
        let device = ScriptedCaptureDevice::new()
            .with_chunk(AudioChunk::new(&b"ok"[..]))
            .with_chunk(AudioChunk::new(&b"lost"[..]))
            .failing_after(1);
        let mut controller = CaptureController::new(device);
        controller.start_capture().await.unwrap();
        let err = controller.stop_capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::Device(_)));
        assert_eq!(controller.state(), CaptureState::Idle);
        assert_eq!(controller.device().released_count(), 1);
    }

    #[tokio::test]
    async fn mime_type_falls_back_in_priority_order() {
        // device-reported type wins
        let device = ScriptedCaptureDevice::new()
            .reporting_mime("audio/wav")
            .supporting(AudioEncoding::WebmOpus)
            .with_chunk(AudioChunk::new(&b"1"[..]).with_mime_type("audio/ogg"));
        let mut controller = CaptureController::new(device);
        controller.start_capture().await.unwrap();
        assert_eq!(controller.stop_capture().await.unwrap().artifact.mime_type(), "audio/wav");

        // container default has no type of its own, so the first chunk's is used
        let device = ScriptedCaptureDevice::new()
            .with_chunk(AudioChunk::new(&b"1"[..]).with_mime_type("audio/mp4"))
            .with_chunk(AudioChunk::new(&b"2"[..]).with_mime_type("audio/ogg"));
        let mut controller = CaptureController::new(device);
        controller.start_capture().await.unwrap();
        assert_eq!(controller.stop_capture().await.unwrap().artifact.mime_type(), "audio/mp4");

        let device = ScriptedCaptureDevice::new().with_chunk(AudioChunk::new(&b"1"[..]));
        let mut controller = CaptureController::new(device);
        controller.start_capture().await.unwrap();
        assert_eq!(
            controller.stop_capture().await.unwrap().artifact.mime_type(),
            DEFAULT_MIME_TYPE
        );
    }

    #[tokio::test]
    async fn each_capture_produces_a_fresh_artifact() {
        let device = ScriptedCaptureDevice::new().with_chunk(AudioChunk::new(&b"take"[..]));
        let mut controller = CaptureController::new(device);
        controller.start_capture().await.unwrap();
        let first = controller.stop_capture().await.unwrap().artifact;
        controller.start_capture().await.unwrap();
        let second = controller.stop_capture().await.unwrap().artifact;
        assert_eq!(first.bytes(), second.bytes());
        assert_eq!(controller.device().released_count(), 2);
    }

    #[test]
    fn upload_extension_precedence() {
        let ext = |mime: &str| AudioArtifact::new(Bytes::new(), mime).upload_extension();
        assert_eq!(ext("audio/ogg;codecs=opus"), "ogg");
        assert_eq!(ext("audio/wav"), "wav");
        assert_eq!(ext("audio/x-wav"), "wav");
        assert_eq!(ext("audio/mp4"), "m4a");
        assert_eq!(ext("audio/x-m4a"), "m4a");
        assert_eq!(ext("audio/webm;codecs=opus"), "webm");
        assert_eq!(ext("audio/mpeg"), "webm");
        assert_eq!(
            AudioArtifact::new(Bytes::new(), "audio/wav").upload_filename(),
            "recording.wav"
        );
    }

    #[test]
    fn file_loads_default_an_empty_declared_type() {
        let artifact = load_from_file(vec![1u8, 2, 3], "  ");
        assert_eq!(artifact.mime_type(), DEFAULT_MIME_TYPE);
        assert_eq!(artifact.len(), 3);
        assert_eq!(artifact.duration_hint(), None);
    }
}

use crate::capture::AudioArtifact;
use crate::device::{describe_devices, find_device};
use crate::playback::{ArtifactPlayer, PlaybackError};
use futures::future::{BoxFuture, FutureExt};
use rodio::cpal::traits::HostTrait;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Speaker output through rodio.
///
/// The output stream is opened on the first clip and then kept, since every
/// sink connected to it stops when it drops. Clones share the stream. After
/// the host reports that no output device exists at all, the player turns
/// itself off and later clips are dropped silently.
#[derive(Clone, Default)]
pub struct AudioPlayer {
    output_device_name: Option<String>,
    stream: Arc<Mutex<Option<OutputStream>>>,
    open_attempts: Arc<AtomicUsize>,
    disabled: Arc<OnceLock<String>>,
}

impl AudioPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer this output device; the default one is used if it is missing.
    pub fn with_output_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_device_name = Some(name.into());
        self
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.disabled.get().map(String::as_str)
    }

    fn open_stream(&self) -> Result<OutputStream, PlaybackError> {
        let attempt = self.open_attempts.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            attempt,
            output_device = %self.output_device_name.as_deref().unwrap_or("<default>"),
            "opening audio output"
        );

        if let Some(wanted) = self.output_device_name.as_deref() {
            match open_named_stream(wanted) {
                Ok(stream) => return Ok(stream),
                Err(reason) => tracing::warn!(
                    wanted_device = %wanted,
                    %reason,
                    "output device unusable; using the default output device"
                ),
            }
        }

        OutputStreamBuilder::open_default_stream().map_err(|e| {
            let details = format!("default output device: {e}");
            if format!("{e:?}").contains("NoDevice") {
                let _ = self.disabled.set(details.clone());
            }
            PlaybackError::AudioOutputUnavailable { details }
        })
    }

    fn connect_sink(&self) -> Result<Sink, PlaybackError> {
        let mut slot = match self.stream.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("audio output lock was poisoned; reusing the stream");
                poisoned.into_inner()
            }
        };
        let stream = match &mut *slot {
            Some(stream) => stream,
            empty => empty.insert(self.open_stream()?),
        };
        Ok(Sink::connect_new(stream.mixer()))
    }
}

fn open_named_stream(wanted: &str) -> Result<OutputStream, String> {
    let devices = rodio::cpal::default_host()
        .output_devices()
        .map_err(|e| format!("cannot list output devices: {e}"))?;
    let device = find_device(devices, wanted)
        .map_err(|seen| format!("not found (available: {})", describe_devices(&seen)))?;
    OutputStreamBuilder::from_device(device)
        .and_then(|builder| builder.open_stream_or_fallback())
        .map_err(|e| e.to_string())
}

impl ArtifactPlayer for AudioPlayer {
    fn play(&self, artifact: AudioArtifact) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            if let Some(reason) = self.disabled_reason() {
                tracing::debug!(%reason, "audio output disabled; skipping playback");
                return Ok(());
            }
            if artifact.is_empty() {
                tracing::debug!(mime_type = %artifact.mime_type(), "nothing to play");
                return Ok(());
            }

            // Decode before touching the device so a bad clip never opens it.
            let source = Decoder::new(Cursor::new(artifact.bytes().clone()))
                .map_err(|e| PlaybackError::Undecodable(e.to_string()))?;
            let sink = self.connect_sink()?;
            sink.append(source);

            tracing::debug!(
                bytes = artifact.len(),
                mime_type = %artifact.mime_type(),
                "playing artifact"
            );
            tokio::task::spawn_blocking(move || sink.sleep_until_end())
                .await
                .map_err(|e| PlaybackError::AudioOutputUnavailable {
                    details: format!("playback task failed: {e}"),
                })
        }
        .boxed()
    }
}

use crate::capture::AudioArtifact;
use crate::playback::{ArtifactPlayer, PlaybackError};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Player for builds without an audio backend: logs what would have been
/// played and succeeds.
#[derive(Clone, Debug, Default)]
pub struct SilentPlayer;

impl SilentPlayer {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactPlayer for SilentPlayer {
    fn play(&self, artifact: AudioArtifact) -> BoxFuture<'_, Result<(), PlaybackError>> {
        async move {
            tracing::info!(
                bytes = artifact.len(),
                mime_type = %artifact.mime_type(),
                "no audio output compiled in; skipping playback"
            );
            Ok(())
        }
        .boxed()
    }
}

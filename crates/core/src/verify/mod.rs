//! Local decodability check for recorded artifacts.
//!
//! Verification never fails the flow: an artifact the local decoder cannot
//! read is reported as [`VerifyOutcome::Unverified`] and can still be sent
//! for classification.

use crate::capture::AudioArtifact;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

#[derive(Clone, Debug, PartialEq)]
pub enum VerifyOutcome {
    /// At least one frame decoded. `duration` is known when the container
    /// reports a frame count.
    Verified { duration: Option<Duration> },
    Unverified { reason: String },
}

impl VerifyOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerifyOutcome::Verified { .. })
    }
}

#[derive(thiserror::Error, Debug)]
enum DecodeError {
    #[error("artifact is empty")]
    Empty,

    #[error("unrecognised container: {0}")]
    Probe(String),

    #[error("no audio track")]
    NoAudioTrack,

    #[error("unsupported codec: {0}")]
    Codec(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("no decodable frames")]
    NoFrames,
}

pub trait ArtifactVerifier: Send + Sync {
    fn verify(&self, artifact: AudioArtifact) -> BoxFuture<'_, VerifyOutcome>;
}

/// Probes and decodes with symphonia on the blocking pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct SymphoniaVerifier;

impl ArtifactVerifier for SymphoniaVerifier {
    fn verify(&self, artifact: AudioArtifact) -> BoxFuture<'_, VerifyOutcome> {
        async move {
            let mime_type = artifact.mime_type().to_owned();
            let bytes = artifact.len();
            let joined = tokio::task::spawn_blocking(move || decode_first_frame(&artifact)).await;
            let outcome = match joined {
                Ok(Ok(duration)) => VerifyOutcome::Verified { duration },
                Ok(Err(e)) => VerifyOutcome::Unverified {
                    reason: e.to_string(),
                },
                Err(e) => VerifyOutcome::Unverified {
                    reason: format!("verifier task failed: {e}"),
                },
            };
            match &outcome {
                VerifyOutcome::Verified { duration } => tracing::debug!(
                    %mime_type,
                    bytes,
                    duration_ms = duration.map(|d| d.as_millis() as u64),
                    "artifact verified"
                ),
                VerifyOutcome::Unverified { reason } => tracing::warn!(
                    %mime_type,
                    bytes,
                    %reason,
                    "artifact could not be verified locally"
                ),
            }
            outcome
        }
        .boxed()
    }
}

fn essence(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

fn extension_hint(mime_type: &str) -> Option<&'static str> {
    match essence(mime_type).to_ascii_lowercase().as_str() {
        "audio/webm" | "video/webm" => Some("webm"),
        "audio/ogg" | "application/ogg" => Some("ogg"),
        "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some("wav"),
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => Some("m4a"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}

fn decode_first_frame(artifact: &AudioArtifact) -> Result<Option<Duration>, DecodeError> {
    if artifact.is_empty() {
        return Err(DecodeError::Empty);
    }

    let source = MediaSourceStream::new(
        Box::new(Cursor::new(artifact.bytes().to_vec())),
        Default::default(),
    );
    let mut hint = Hint::new();
    hint.mime_type(essence(artifact.mime_type()));
    if let Some(ext) = extension_hint(artifact.mime_type()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Probe(e.to_string()))?;
    let mut format = probed.format;

    let (track_id, params) = {
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        (track.id, track.codec_params.clone())
    };
    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => {
            Some(Duration::from_secs_f64(frames as f64 / f64::from(rate)))
        }
        _ => None,
    };

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Codec(e.to_string()))?;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(DecodeError::NoFrames)
            }
            Err(e) => return Err(DecodeError::Read(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) if decoded.frames() > 0 => return Ok(duration),
            Ok(_) | Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(DecodeError::Read(e.to_string())),
        }
    }
}

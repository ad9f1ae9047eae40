use crate::capture::{
    AudioChunk, AudioEncoding, CaptureControl, CaptureDevice, CaptureError, CaptureSession,
};
use crate::device::{describe_devices, find_device};
use futures::future::{BoxFuture, FutureExt};
use rodio::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rodio::cpal::{self, SizedSample};
use std::io::Cursor;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

const WAV_MIME_TYPE: &str = "audio/wav";

/// System microphone via cpal. Records interleaved PCM and hands back a
/// single 16-bit WAV chunk when stopped, so only the container default
/// encoding is offered.
#[derive(Clone, Debug, Default)]
pub struct MicrophoneDevice {
    input_device_name: Option<String>,
}

impl MicrophoneDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_device_name<S: Into<String>>(mut self, name: S) -> Self {
        self.input_device_name = Some(name.into());
        self
    }
}

impl CaptureDevice for MicrophoneDevice {
    fn supports(&self, encoding: AudioEncoding) -> bool {
        encoding == AudioEncoding::ContainerDefault
    }

    fn open(&self, _encoding: AudioEncoding) -> BoxFuture<'_, Result<CaptureSession, CaptureError>> {
        let wanted = self.input_device_name.clone();
        async move {
            let (chunk_tx, chunk_rx) = mpsc::channel(1);
            let (ready_tx, ready_rx) = oneshot::channel();
            let (stop_tx, stop_rx) = std_mpsc::channel();

            // cpal streams are not Send on every host, so the stream lives
            // and dies on its own thread.
            std::thread::Builder::new()
                .name("microphone-capture".to_owned())
                .spawn(move || record(wanted, ready_tx, stop_rx, chunk_tx))
                .map_err(|e| CaptureError::DeviceUnavailable {
                    details: format!("failed to start capture thread: {e}"),
                })?;

            let format = ready_rx
                .await
                .map_err(|_| CaptureError::DeviceUnavailable {
                    details: "capture thread exited before the stream opened".to_owned(),
                })??;
            tracing::debug!(
                sample_rate = format.sample_rate,
                channels = format.channels,
                "microphone stream opened"
            );

            Ok(CaptureSession {
                mime_type: Some(WAV_MIME_TYPE.to_owned()),
                chunks: chunk_rx,
                control: Box::new(MicrophoneControl {
                    stop: Some(stop_tx),
                }),
            })
        }
        .boxed()
    }
}

struct MicrophoneControl {
    stop: Option<std_mpsc::Sender<()>>,
}

impl CaptureControl for MicrophoneControl {
    fn request_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    fn release(&mut self) {
        // Dropping the sender also ends the capture thread if stop was
        // never requested.
        self.stop = None;
    }
}

#[derive(Clone, Copy, Debug)]
struct InputFormat {
    sample_rate: u32,
    channels: u16,
}

type ChunkSender = mpsc::Sender<Result<AudioChunk, CaptureError>>;

fn record(
    wanted: Option<String>,
    ready: oneshot::Sender<Result<InputFormat, CaptureError>>,
    stop: std_mpsc::Receiver<()>,
    chunks: ChunkSender,
) {
    let buffer = Arc::new(Mutex::new(Vec::<f32>::new()));
    let (stream, format) = match open_input_stream(wanted.as_deref(), Arc::clone(&buffer)) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(CaptureError::DeviceUnavailable {
            details: format!("failed to start input stream: {e}"),
        }));
        return;
    }
    if ready.send(Ok(format)).is_err() {
        return;
    }

    // Returns on an explicit stop or when the control is dropped.
    let _ = stop.recv();
    drop(stream);

    let samples = match buffer.lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    // Nothing recorded: close the channel without a chunk so the artifact
    // comes out empty.
    if samples.is_empty() {
        return;
    }

    let item = encode_wav(&samples, format).map(|bytes| AudioChunk {
        bytes: bytes.into(),
        mime_type: Some(WAV_MIME_TYPE.to_owned()),
    });
    let _ = chunks.blocking_send(item);
}

fn open_input_stream(
    wanted: Option<&str>,
    buffer: Arc<Mutex<Vec<f32>>>,
) -> Result<(cpal::Stream, InputFormat), CaptureError> {
    let host = cpal::default_host();
    let device = match wanted {
        Some(name) => find_input_device(&host, name)?,
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable {
                details: "no default input device".to_owned(),
            })?,
    };

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::DeviceUnavailable {
            details: format!("no usable input configuration: {e}"),
        })?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let format = InputFormat {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => input_stream(&device, &config, buffer, |s: f32| s),
        cpal::SampleFormat::I16 => {
            input_stream(&device, &config, buffer, |s: i16| s as f32 / i16::MAX as f32)
        }
        cpal::SampleFormat::U16 => input_stream(&device, &config, buffer, |s: u16| {
            (s as f32 - 32_768.0) / 32_768.0
        }),
        cpal::SampleFormat::I32 => {
            input_stream(&device, &config, buffer, |s: i32| s as f32 / i32::MAX as f32)
        }
        cpal::SampleFormat::F64 => input_stream(&device, &config, buffer, |s: f64| s as f32),
        other => {
            return Err(CaptureError::DeviceUnavailable {
                details: format!("unsupported input sample format {other:?}"),
            })
        }
    }?;

    Ok((stream, format))
}

fn input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    convert: fn(T) -> f32,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mut guard = match buffer.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.extend(data.iter().map(|s| convert(*s)));
            },
            |err| tracing::warn!(error = %err, "audio input stream error"),
            None,
        )
        .map_err(|e| CaptureError::DeviceUnavailable {
            details: format!("failed to open input stream: {e}"),
        })
}

fn find_input_device(host: &cpal::Host, wanted: &str) -> Result<cpal::Device, CaptureError> {
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::DeviceUnavailable {
            details: format!("cannot list input devices: {e}"),
        })?;
    find_device(devices, wanted).map_err(|seen| CaptureError::DeviceUnavailable {
        details: format!(
            "input device '{wanted}' not found (available: {})",
            describe_devices(&seen)
        ),
    })
}

fn encode_wav(samples: &[f32], format: InputFormat) -> Result<Vec<u8>, CaptureError> {
    let spec = hound::WavSpec {
        channels: format.channels.max(1),
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut out = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut out), spec)
        .map_err(|e| CaptureError::Device(format!("wav encode failed: {e}")))?;
    for sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(pcm)
            .map_err(|e| CaptureError::Device(format!("wav encode failed: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| CaptureError::Device(format!("wav encode failed: {e}")))?;
    Ok(out)
}

//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleRate, Stream, StreamConfig};

use crate::config::AudioConfig;
use crate::voice::queue::FrameQueue;
use crate::{Error, Result};

/// Captures audio from an input device into a [`FrameQueue`]
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// Picks the configured device by name, or the default input device.
    ///
    /// # Errors
    ///
    /// Returns error if no suitable audio device/config is available
    pub fn new(audio: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();

        let device = match &audio.device {
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| &n == name))
                .ok_or_else(|| Error::Audio(format!("input device not found: {name}")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string()))?,
        };

        let sample_rate = audio.sample_rate;
        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let mut config = supported.with_sample_rate(SampleRate(sample_rate)).config();
        config.buffer_size = BufferSize::Fixed(audio.frame_samples());

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            frame_samples = audio.frame_samples(),
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
        })
    }

    /// Start capturing into `queue`
    ///
    /// The device callback converts each delivery to 16-bit PCM and pushes it
    /// as one frame; a full queue drops the frame rather than stalling the
    /// callback. The returned guard stops the device and closes the queue
    /// when dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be opened or started
    pub fn start(&self, queue: FrameQueue) -> Result<CaptureStream> {
        let callback_queue = queue.clone();

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let frame: Vec<i16> = data
                        .iter()
                        .map(|&s| {
                            #[allow(clippy::cast_possible_truncation)]
                            let sample = (s * 32767.0).clamp(-32768.0, 32767.0) as i16;
                            sample
                        })
                        .collect();
                    if !callback_queue.push(frame) {
                        tracing::trace!("frame dropped, queue full");
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio capture started");

        Ok(CaptureStream {
            stream: Some(stream),
            queue,
        })
    }

    /// Sample rate frames are captured at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Scoped handle to a running capture stream
///
/// Dropping it stops audio production, closes the queue and discards any
/// buffered frames. This is the only way the device is released, so release
/// happens on every exit path.
pub struct CaptureStream {
    stream: Option<Stream>,
    queue: FrameQueue,
}

impl CaptureStream {
    /// Frames dropped by the callback so far
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.queue.dropped()
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.queue.close();
        self.queue.drain();
        tracing::debug!("audio capture stopped");
    }
}

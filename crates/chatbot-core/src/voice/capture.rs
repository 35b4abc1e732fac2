//! Microphone samples for call turns

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Rate the detector and the STT upload both assume
pub const SAMPLE_RATE: u32 = 16000;

fn audio_err(e: impl std::fmt::Display) -> Error {
    Error::Audio(e.to_string())
}

/// Mono 16 kHz config for `device`, if it has one
fn mono_speech_config(device: &Device) -> Result<StreamConfig> {
    let wanted = SampleRate(SAMPLE_RATE);
    let range = device
        .supported_input_configs()
        .map_err(audio_err)?
        .find(|c| c.channels() == 1 && (c.min_sample_rate()..=c.max_sample_rate()).contains(&wanted))
        .ok_or_else(|| Error::Audio("microphone does not support 16kHz mono".to_string()))?;

    Ok(range.with_sample_rate(wanted).config())
}

/// The call's microphone: samples pile up in `pending` until a turn drains them
///
/// Holds a cpal stream, so it must stay on the thread that created it.
pub struct MicCapture {
    device: Device,
    config: StreamConfig,
    pending: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl MicCapture {
    /// # Errors
    ///
    /// Returns error if there is no microphone or it cannot record speech-rate mono
    pub fn open() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Audio("no microphone found".to_string()))?;
        let config = mono_speech_config(&device)?;

        tracing::debug!(mic = %device.name().unwrap_or_default(), "microphone opened for call");

        Ok(Self {
            device,
            config,
            pending: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Begin recording. Calling it again while recording does nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn resume(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let pending = Arc::clone(&self.pending);
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut pending) = pending.lock() {
                        pending.extend_from_slice(data);
                    }
                },
                |err| tracing::warn!(error = %err, "microphone stream error during call"),
                None,
            )
            .map_err(audio_err)?;
        stream.play().map_err(audio_err)?;

        self.stream = Some(stream);
        tracing::debug!("microphone recording");
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("microphone paused");
        }
    }

    /// Samples recorded since the previous drain
    #[must_use]
    pub fn drain(&self) -> Vec<f32> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }

    /// Throw away whatever was heard before a turn starts
    pub fn discard(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.pause();
    }
}

/// Pack an utterance as a 16-bit mono WAV file for upload
///
/// Samples outside [-1, 1] are clipped.
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let format = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = std::io::Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut wav, format).map_err(audio_err)?;
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let pcm = (sample * f32::from(i16::MAX)).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        writer.write_sample(pcm).map_err(audio_err)?;
    }
    writer.finalize().map_err(audio_err)?;

    Ok(wav.into_inner())
}

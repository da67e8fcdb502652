//! Audio output using cpal.
//!
//! This module runs the real-time audio thread that:
//! - Reads decoded audio from a lock-free ring buffer
//! - Applies volume using atomic state
//! - Outputs to the audio device
//!
//! # Real-time Safety
//!
//! The cpal callback runs on a high-priority system thread. To avoid audio glitches:
//! - No locks (RwLock/Mutex) - use atomics via `AudioSharedState`
//! - No allocations - use `rtrb` ring buffer for sample data
//! - No blocking operations

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use rtrb::{Consumer, Producer, RingBuffer};

use super::PlayerError;
use super::decoder::AudioDecoder;
use super::resampler::Resampler;
use super::state::{AudioSharedState, PlaybackStatus, PlayerCommand, PlayerEvent, PlayerState};

/// Audio output manager.
pub struct AudioOutput {
    _stream: Stream,
    _audio_thread: JoinHandle<()>,
    /// Lock-free shared state for the audio callback
    pub audio_shared: Arc<AudioSharedState>,
}

impl AudioOutput {
    /// Create a new audio output.
    pub fn new(
        state: Arc<RwLock<PlayerState>>,
        command_rx: Receiver<PlayerCommand>,
        event_tx: Sender<PlayerEvent>,
    ) -> Result<Self, PlayerError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioInit("No output device found".to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        tracing::info!("Using audio device: {}", device_name);

        let supported_config = device
            .default_output_config()
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels();

        tracing::info!("Audio format: {}Hz, {} channels", sample_rate, channels);

        let config = StreamConfig {
            channels,
            sample_rate: supported_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        // ~0.5 seconds of stereo audio at 48kHz
        let (producer, consumer) = RingBuffer::<f32>::new(48000);

        let audio_shared = AudioSharedState::new();

        {
            let ui_state = state.read();
            audio_shared.set_volume(ui_state.effective_volume());
            audio_shared.set_playing(ui_state.status == PlaybackStatus::Playing);
        }

        let state_for_thread = Arc::clone(&state);
        let audio_shared_for_thread = Arc::clone(&audio_shared);

        let audio_thread = thread::Builder::new()
            .name("audio-decoder".to_string())
            .spawn(move || {
                audio_thread_main(
                    state_for_thread,
                    audio_shared_for_thread,
                    command_rx,
                    event_tx,
                    producer,
                    sample_rate,
                    channels,
                );
            })
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

        let callback_audio_shared = Arc::clone(&audio_shared);

        let stream = match supported_config.sample_format() {
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &config, consumer, callback_audio_shared)
            }
            SampleFormat::I16 => {
                build_stream_i16(&device, &config, consumer, callback_audio_shared)
            }
            format => {
                return Err(PlayerError::AudioInit(format!(
                    "Unsupported sample format: {:?}",
                    format
                )));
            }
        }
        .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioInit(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            _audio_thread: audio_thread,
            audio_shared,
        })
    }
}

/// Build output stream for f32 format.
///
/// # Real-time Safety
/// This callback uses only:
/// - Atomic operations for state (no locks)
/// - Lock-free ring buffer for samples (no allocations)
fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: Consumer<f32>,
    audio_shared: Arc<AudioSharedState>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let volume = audio_shared.volume();
            let is_playing = audio_shared.is_playing();
            let is_flushing = audio_shared.is_flushing();

            if is_flushing {
                while consumer.pop().is_ok() {}
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0f32);
                }
                return;
            }

            if !is_playing {
                for sample in data.iter_mut() {
                    *sample = T::from_sample(0.0f32);
                }
                return;
            }

            for sample in data.iter_mut() {
                match consumer.pop() {
                    Ok(s) => *sample = T::from_sample(s * volume),
                    Err(_) => {
                        audio_shared.increment_underruns();
                        *sample = T::from_sample(0.0f32);
                    }
                }
            }
        },
        |err| {
            tracing::error!("Audio stream error: {}", err);
        },
        None,
    )
}

/// Build output stream for i16 format.
///
/// # Real-time Safety
/// This callback uses only:
/// - Atomic operations for state (no locks)
/// - Lock-free ring buffer for samples (no allocations)
fn build_stream_i16(
    device: &Device,
    config: &StreamConfig,
    mut consumer: Consumer<f32>,
    audio_shared: Arc<AudioSharedState>,
) -> Result<Stream, cpal::BuildStreamError> {
    device.build_output_stream(
        config,
        move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
            let volume = audio_shared.volume();
            let is_playing = audio_shared.is_playing();
            let is_flushing = audio_shared.is_flushing();

            if is_flushing {
                while consumer.pop().is_ok() {}
                for sample in data.iter_mut() {
                    *sample = 0;
                }
                return;
            }

            if !is_playing {
                for sample in data.iter_mut() {
                    *sample = 0;
                }
                return;
            }

            for sample in data.iter_mut() {
                match consumer.pop() {
                    Ok(s) => *sample = (s * volume * 32767.0) as i16,
                    Err(_) => {
                        audio_shared.increment_underruns();
                        *sample = 0;
                    }
                }
            }
        },
        |err| {
            tracing::error!("Audio stream error: {}", err);
        },
        None,
    )
}

/// Audio thread context - encapsulates mutable state
struct AudioThreadContext {
    decoder: Option<AudioDecoder>,
    resampler: Option<Resampler>,
    pending_path: Option<PathBuf>,
    /// Event sender to notify UI of state changes
    event_tx: Sender<PlayerEvent>,
    /// Output device sample rate
    output_sample_rate: u32,
    /// Output device channels
    output_channels: u16,
    /// Samples per position update (updates position every ~50ms)
    samples_per_position_update: usize,
    /// Sample counter for position updates
    sample_counter: usize,
}

impl AudioThreadContext {
    fn new(output_sample_rate: u32, output_channels: u16, event_tx: Sender<PlayerEvent>) -> Self {
        let samples_per_position_update =
            (output_sample_rate as usize * output_channels as usize) / 20;
        Self {
            decoder: None,
            resampler: None,
            pending_path: None,
            event_tx,
            output_sample_rate,
            output_channels,
            samples_per_position_update,
            sample_counter: 0,
        }
    }

    /// Send an event to the UI. Ignores send failures (UI may have disconnected).
    fn emit(&self, event: PlayerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                tracing::warn!(target: "player::events", "Event channel full - UI may be falling behind");
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                tracing::debug!(target: "player::events", "Event channel disconnected - UI shutting down");
            }
        }
    }

    /// Handle a player command, returning whether to continue running
    fn handle_command(
        &mut self,
        cmd: PlayerCommand,
        state: &RwLock<PlayerState>,
        audio_shared: &AudioSharedState,
        producer: &mut Producer<f32>,
    ) -> bool {
        match cmd {
            PlayerCommand::Load(path) => {
                tracing::info!(path = ?path.file_name(), "Queuing track for load");
                self.pending_path = Some(path);
            }
            PlayerCommand::Play => {
                self.start_or_resume(state, audio_shared, producer);
            }
            PlayerCommand::Pause => {
                state.write().status = PlaybackStatus::Paused;
                audio_shared.set_playing(false);
                self.emit(PlayerEvent::StatusChanged(PlaybackStatus::Paused));
            }
            PlayerCommand::Stop => {
                state.write().status = PlaybackStatus::Stopped;
                audio_shared.set_playing(false);
                self.decoder = None;
                self.resampler = None;
                self.emit(PlayerEvent::StatusChanged(PlaybackStatus::Stopped));
            }
            PlayerCommand::Seek(pos) => {
                if let Some(ref mut dec) = self.decoder {
                    let duration = dec.duration();
                    let new_pos = duration.mul_f32(pos);
                    audio_shared.set_position(new_pos);
                    self.sample_counter = 0;

                    if let Some(ref mut resampler) = self.resampler {
                        resampler.reset();
                    }

                    if let Err(e) = dec.seek(pos) {
                        tracing::warn!(error = %e, "Seek failed");
                        self.emit(PlayerEvent::Error(format!("Seek failed: {}", e)));
                    }
                } else {
                    tracing::warn!("Seek ignored - no decoder");
                }
            }
            PlayerCommand::Shutdown => {
                return false;
            }
        }
        true
    }

    fn start_or_resume(
        &mut self,
        state: &RwLock<PlayerState>,
        audio_shared: &AudioSharedState,
        producer: &mut Producer<f32>,
    ) {
        match self.pending_path.take() {
            Some(path) => self.load_and_play(path, state, audio_shared, producer),
            None => {
                if self.decoder.is_some() {
                    state.write().status = PlaybackStatus::Playing;
                    audio_shared.set_playing(true);
                    self.emit(PlayerEvent::StatusChanged(PlaybackStatus::Playing));
                } else {
                    tracing::warn!("Play command ignored: No track loaded");
                    state.write().status = PlaybackStatus::Stopped;
                    audio_shared.set_playing(false);
                    self.emit(PlayerEvent::StatusChanged(PlaybackStatus::Stopped));
                }
            }
        }
    }

    fn load_and_play(
        &mut self,
        path: PathBuf,
        state: &RwLock<PlayerState>,
        audio_shared: &AudioSharedState,
        _producer: &mut Producer<f32>,
    ) {
        // Start flushing - audio callback will drain buffer and output silence.
        // This prevents hearing stale audio from the previous track.
        audio_shared.start_flush();

        match AudioDecoder::open(&path) {
            Ok(dec) => {
                let source_rate = dec.sample_rate();
                let source_channels = dec.channels();
                let duration = dec.duration();

                let resampler =
                    Resampler::new(source_rate, self.output_sample_rate, source_channels);

                if resampler.needs_resampling() {
                    tracing::info!(
                        "Resampling: {}Hz -> {}Hz",
                        source_rate,
                        self.output_sample_rate
                    );
                }

                {
                    let mut s = state.write();
                    s.status = PlaybackStatus::Playing;
                    s.current_track = Some(path.clone());
                    s.duration = duration;
                    s.position = Duration::ZERO;
                    s.sample_rate = source_rate;
                    s.channels = source_channels;
                }

                tracing::info!("Track loaded: {}Hz / {}ch", source_rate, source_channels);

                audio_shared.set_playing(true);
                audio_shared.stop_flush();
                audio_shared.set_position(Duration::ZERO);
                self.sample_counter = 0;
                self.decoder = Some(dec);
                self.resampler = Some(resampler);

                self.emit(PlayerEvent::TrackLoaded {
                    path,
                    duration,
                    sample_rate: source_rate,
                    channels: source_channels,
                });
                self.emit(PlayerEvent::StatusChanged(PlaybackStatus::Playing));
            }
            Err(e) => {
                tracing::error!("Failed to open file: {}", e);
                state.write().status = PlaybackStatus::Stopped;
                audio_shared.set_playing(false);
                audio_shared.stop_flush();
                self.emit(PlayerEvent::Error(format!("Failed to open file: {}", e)));
                self.emit(PlayerEvent::StatusChanged(PlaybackStatus::Stopped));
            }
        }
    }

    /// Decode next chunk and send to outputs. Returns false if playback ended.
    fn decode_and_send(
        &mut self,
        producer: &mut Producer<f32>,
        state: &RwLock<PlayerState>,
        audio_shared: &AudioSharedState,
    ) -> bool {
        let Some(ref mut dec) = self.decoder else {
            return true;
        };

        let available = producer.slots();
        if available < 1024 {
            thread::sleep(Duration::from_millis(5));
            return true;
        }

        let mut samples = Vec::with_capacity(4096);

        match dec.decode_next(|s| samples.extend_from_slice(s)) {
            Ok(Some(frame)) => {
                let output_samples = if let Some(ref mut resampler) = self.resampler {
                    resampler.process(&samples)
                } else {
                    samples.clone()
                };

                for &sample in &output_samples {
                    while producer.push(sample).is_err() {
                        thread::sleep(Duration::from_micros(100));
                    }
                }

                self.sample_counter += output_samples.len();
                if self.sample_counter >= self.samples_per_position_update {
                    audio_shared.set_position(frame.timestamp);
                    self.sample_counter = 0;
                }

                true
            }
            Ok(None) => {
                if let Some(ref mut resampler) = self.resampler {
                    let flushed = resampler.flush();
                    for &sample in &flushed {
                        while producer.push(sample).is_err() {
                            thread::sleep(Duration::from_micros(100));
                        }
                    }
                }

                tracing::info!("Playback finished");
                state.write().status = PlaybackStatus::Stopped;
                audio_shared.set_playing(false);
                self.decoder = None;
                self.resampler = None;
                self.emit(PlayerEvent::PlaybackFinished);
                self.emit(PlayerEvent::StatusChanged(PlaybackStatus::Stopped));
                true
            }
            Err(e) => {
                tracing::error!("Decode error: {}", e);
                state.write().status = PlaybackStatus::Stopped;
                audio_shared.set_playing(false);
                self.decoder = None;
                self.resampler = None;
                self.emit(PlayerEvent::Error(format!("Decode error: {}", e)));
                self.emit(PlayerEvent::StatusChanged(PlaybackStatus::Stopped));
                true
            }
        }
    }
}

/// Main loop for the audio/decoder thread.
fn audio_thread_main(
    state: Arc<RwLock<PlayerState>>,
    audio_shared: Arc<AudioSharedState>,
    command_rx: Receiver<PlayerCommand>,
    event_tx: Sender<PlayerEvent>,
    mut producer: Producer<f32>,
    output_sample_rate: u32,
    output_channels: u16,
) {
    let mut ctx = AudioThreadContext::new(output_sample_rate, output_channels, event_tx);

    loop {
        let is_idle = matches!(
            state.read().status,
            PlaybackStatus::Stopped | PlaybackStatus::Paused
        );

        let command = if is_idle {
            command_rx.recv().ok()
        } else {
            command_rx.try_recv().ok()
        };

        if let Some(cmd) = command
            && !ctx.handle_command(cmd, &state, &audio_shared, &mut producer)
        {
            break;
        }

        if state.read().status == PlaybackStatus::Playing {
            if !ctx.decode_and_send(&mut producer, &state, &audio_shared) {
                break;
            }
        } else if !is_idle {
            thread::sleep(Duration::from_millis(10));
        }
    }
}

// ============================================================================
// Defensive Tests - Verify cpal API contracts used by this module
// ============================================================================

#[cfg(test)]
mod cpal_api_tests {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{BufferSize, SampleFormat, StreamConfig};

    #[test]
    fn test_default_host_available() {
        let host = cpal::default_host();
        let _devices_result = host.output_devices();
        let _default_device = host.default_output_device();
    }

    #[test]
    fn test_device_trait_methods() {
        let host = cpal::default_host();
        if let Some(device) = host.default_output_device() {
            let _name: Result<String, _> = device.name();
            let _config = device.default_output_config();
        }
    }

    #[test]
    fn test_sample_format_variants() {
        let _f32_format: SampleFormat = SampleFormat::F32;
        let _i16_format: SampleFormat = SampleFormat::I16;
        let _ = format!("{:?}", _f32_format);
    }

    #[test]
    fn test_stream_config_construction() {
        use cpal::SampleRate;

        let config = StreamConfig {
            channels: 2,
            sample_rate: SampleRate(48000),
            buffer_size: BufferSize::Default,
        };

        assert_eq!(config.channels, 2);
        assert_eq!(config.sample_rate.0, 48000);
        assert!(matches!(config.buffer_size, BufferSize::Default));
    }

    #[test]
    fn test_stream_trait_play_exists() {
        #[allow(dead_code)]
        fn requires_stream_trait<T: StreamTrait>(_s: &T) {}
    }

    #[test]
    fn test_sample_traits_exist() {
        fn requires_sample_traits<T: cpal::SizedSample + cpal::FromSample<f32>>() {}
        requires_sample_traits::<f32>();
    }

    #[test]
    fn test_supported_stream_config_methods() {
        let host = cpal::default_host();
        if let Some(device) = host.default_output_device()
            && let Ok(supported) = device.default_output_config()
        {
            let _rate = supported.sample_rate();
            let _channels = supported.channels();
            let _format = supported.sample_format();
        }
    }

    #[test]
    fn test_output_callback_info_exists() {
        #[allow(dead_code)]
        fn callback_signature(_data: &mut [f32], _info: &cpal::OutputCallbackInfo) {}
    }
}

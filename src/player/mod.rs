//! Playback engine: decode, resample, and output one track at a time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Player (Main Thread)                       │
//! │        Holds state, receives commands from the MVU loop         │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ crossbeam channels
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Audio Thread (Real-time)                     │
//! │          Decodes audio, resamples, fills the output buffer      │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ cpal callback
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Device Output                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Event-Driven State Synchronization
//!
//! 1. The UI loop sends a `PlayerCommand` (Play, Pause, ...) via channel.
//! 2. The audio thread processes it and updates the shared state.
//! 3. The audio thread emits a `PlayerEvent` back.
//! 4. The UI loop calls `poll_events()` on its 150ms timer and folds the
//!    events into the model.
//!
//! This module owns exactly one track's worth of playback; which track
//! plays next is the playing queue's decision (`crate::queue`), not this
//! module's.

mod audio;
mod decoder;
mod resampler;
mod state;

pub use audio::AudioOutput;
pub use decoder::AudioDecoder;
pub use resampler::Resampler;
pub use state::{
    AudioSharedState, PlaybackStatus, PlayerCommand, PlayerEvent, PlayerState, TrackInfo,
    format_duration,
};

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// The playback engine.
///
/// Owns the audio thread and the cpal stream for the lifetime of the
/// process. Callers drive it with `load_and_play`/`play`/`pause`/`stop`/
/// `seek`/`set_volume`/`set_muted` and read `state()` each tick.
pub struct Player {
    state: Arc<RwLock<PlayerState>>,
    /// Lock-free shared state for the audio callback
    audio_shared: Option<Arc<AudioSharedState>>,
    command_tx: Sender<PlayerCommand>,
    event_rx: Receiver<PlayerEvent>,
    _audio: Option<AudioOutput>,
}

impl Player {
    /// Create a new player instance.
    ///
    /// Returns `None` if audio output cannot be initialized.
    pub fn new() -> Option<Self> {
        let state = Arc::new(RwLock::new(PlayerState::default()));
        let (command_tx, command_rx) = bounded(32);
        let (event_tx, event_rx) = bounded(64);

        let audio = AudioOutput::new(Arc::clone(&state), command_rx, event_tx).ok()?;
        let audio_shared = Some(Arc::clone(&audio.audio_shared));

        Some(Self {
            state,
            audio_shared,
            command_tx,
            event_rx,
            _audio: Some(audio),
        })
    }

    /// Poll for events from the audio thread.
    ///
    /// Returns all pending events. Called from the UI loop's 150ms timer.
    pub fn poll_events(&self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Load a track and start playing it immediately.
    pub fn load_and_play(&mut self, path: PathBuf) -> Result<(), PlayerError> {
        self.command_tx
            .send(PlayerCommand::Load(path))
            .map_err(|_| PlayerError::ChannelClosed)?;
        self.command_tx
            .send(PlayerCommand::Play)
            .map_err(|_| PlayerError::ChannelClosed)
    }

    /// Play / resume playback.
    pub fn play(&self) -> Result<(), PlayerError> {
        self.command_tx
            .send(PlayerCommand::Play)
            .map_err(|_| PlayerError::ChannelClosed)
    }

    /// Pause playback.
    pub fn pause(&self) -> Result<(), PlayerError> {
        self.command_tx
            .send(PlayerCommand::Pause)
            .map_err(|_| PlayerError::ChannelClosed)
    }

    /// Toggle play/pause.
    pub fn toggle(&self) -> Result<(), PlayerError> {
        match self.state.read().status {
            PlaybackStatus::Playing => self.pause(),
            PlaybackStatus::Paused | PlaybackStatus::Stopped => self.play(),
        }
    }

    /// Stop playback and unload the current track.
    pub fn stop(&self) -> Result<(), PlayerError> {
        self.command_tx
            .send(PlayerCommand::Stop)
            .map_err(|_| PlayerError::ChannelClosed)
    }

    /// Seek to a position (0.0 - 1.0).
    pub fn seek(&self, position: f32) -> Result<(), PlayerError> {
        self.command_tx
            .send(PlayerCommand::Seek(position.clamp(0.0, 1.0)))
            .map_err(|_| PlayerError::ChannelClosed)
    }

    /// Set volume (0.0 - 1.0). Has no audible effect while muted, but the
    /// level is remembered for when mute is lifted.
    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        let mut state = self.state.write();
        state.volume = clamped;
        if let Some(ref audio_shared) = self.audio_shared {
            audio_shared.set_volume(state.effective_volume());
        }
    }

    pub fn volume(&self) -> f32 {
        self.state.read().volume
    }

    /// Set the mute flag without touching the remembered volume.
    pub fn set_muted(&self, muted: bool) {
        let mut state = self.state.write();
        state.muted = muted;
        if let Some(ref audio_shared) = self.audio_shared {
            audio_shared.set_volume(state.effective_volume());
        }
    }

    pub fn is_muted(&self) -> bool {
        self.state.read().muted
    }

    /// Get current playback state snapshot.
    ///
    /// Syncs position and underrun count from the atomic audio state.
    pub fn state(&self) -> PlayerState {
        let mut state = self.state.read().clone();
        if let Some(ref audio_shared) = self.audio_shared {
            state.position = audio_shared.position();
            state.underruns = audio_shared.underruns();
        }
        state
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new().expect("Failed to initialize audio output")
    }
}

/// List available audio output devices.
pub fn list_audio_devices() -> Vec<String> {
    use cpal::traits::{DeviceTrait, HostTrait};
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Get the current/default audio device name.
pub fn current_audio_device() -> String {
    use cpal::traits::{DeviceTrait, HostTrait};
    let host = cpal::default_host();
    host.default_output_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Player errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlayerError {
    #[error("Audio output initialization failed: {0}")]
    AudioInit(String),

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Audio channel closed")]
    ChannelClosed,

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_player_state_default() {
        let state = PlayerState::default();
        assert_eq!(state.status, PlaybackStatus::Stopped);
        assert_eq!(state.volume, 1.0);
        assert_eq!(state.position, Duration::ZERO);
    }
}

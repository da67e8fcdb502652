//! Player state and command types.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free shared state for the audio callback.
///
/// This struct uses atomics to avoid priority inversion in the real-time audio thread.
/// The cpal callback runs on a high-priority system thread and must never block on locks.
#[derive(Debug)]
pub struct AudioSharedState {
    /// Volume as f32 bits (use `f32::to_bits()` / `f32::from_bits()`)
    volume_bits: AtomicU32,
    /// Whether playback is active
    is_playing: AtomicBool,
    /// Whether the buffer is being flushed (drain old samples, output silence)
    is_flushing: AtomicBool,
    /// Current position in nanoseconds
    position_nanos: AtomicU64,
    /// Buffer underrun count
    underruns: AtomicU32,
}

impl Default for AudioSharedState {
    fn default() -> Self {
        Self {
            volume_bits: AtomicU32::new(1.0_f32.to_bits()),
            is_playing: AtomicBool::new(false),
            is_flushing: AtomicBool::new(false),
            position_nanos: AtomicU64::new(0),
            underruns: AtomicU32::new(0),
        }
    }
}

impl AudioSharedState {
    /// Create a new audio shared state wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the current volume (0.0 - 1.0).
    #[inline]
    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    /// Set the volume (0.0 - 1.0).
    #[inline]
    pub fn set_volume(&self, volume: f32) {
        self.volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Check if playback is active.
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    /// Set the playing state.
    #[inline]
    pub fn set_playing(&self, playing: bool) {
        self.is_playing.store(playing, Ordering::Relaxed);
    }

    /// Check if buffer is being flushed.
    #[inline]
    pub fn is_flushing(&self) -> bool {
        self.is_flushing.load(Ordering::Acquire)
    }

    /// Start flushing - audio callback will drain buffer and output silence.
    #[inline]
    pub fn start_flush(&self) {
        self.is_flushing.store(true, Ordering::Release);
    }

    /// Stop flushing - audio callback resumes normal operation.
    #[inline]
    pub fn stop_flush(&self) {
        self.is_flushing.store(false, Ordering::Release);
    }

    /// Get the current position as Duration.
    #[inline]
    pub fn position(&self) -> Duration {
        Duration::from_nanos(self.position_nanos.load(Ordering::Relaxed))
    }

    /// Set the current position.
    #[inline]
    pub fn set_position(&self, position: Duration) {
        self.position_nanos
            .store(position.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Get the underrun count.
    #[inline]
    pub fn underruns(&self) -> u32 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Increment the underrun count (returns new value).
    #[inline]
    pub fn increment_underruns(&self) -> u32 {
        self.underruns.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reset performance counters.
    pub fn reset_stats(&self) {
        self.underruns.store(0, Ordering::Relaxed);
    }
}

/// Current playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Shared player state.
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Current playback status
    pub status: PlaybackStatus,
    /// Current track path (if any)
    pub current_track: Option<PathBuf>,
    /// Current position in the track
    pub position: Duration,
    /// Total duration of the track
    pub duration: Duration,
    /// Volume level (0.0 - 1.0), preserved across mute/unmute
    pub volume: f32,
    /// Muted flag; unmuting restores `volume` unchanged
    pub muted: bool,
    /// Sample rate of current track
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Buffer underrun count (for diagnostics)
    pub underruns: u32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            status: PlaybackStatus::Stopped,
            current_track: None,
            position: Duration::ZERO,
            duration: Duration::ZERO,
            volume: 1.0,
            muted: false,
            sample_rate: 44100,
            channels: 2,
            underruns: 0,
        }
    }
}

impl PlayerState {
    /// Get position as a fraction (0.0 - 1.0).
    pub fn position_fraction(&self) -> f32 {
        if self.duration.is_zero() {
            0.0
        } else {
            self.position.as_secs_f32() / self.duration.as_secs_f32()
        }
    }

    /// Format position as MM:SS.
    pub fn position_str(&self) -> String {
        format_duration(self.position)
    }

    /// Format duration as MM:SS.
    pub fn duration_str(&self) -> String {
        format_duration(self.duration)
    }

    /// The volume actually sent to the audio thread: 0 while muted, the
    /// stored level otherwise.
    pub fn effective_volume(&self) -> f32 {
        if self.muted { 0.0 } else { self.volume }
    }

    /// Get a compact debug summary for logging.
    /// Format: "Status@Pos/Dur" e.g. "Playing@1:23/4:56"
    pub fn debug_summary(&self) -> String {
        let status = match self.status {
            PlaybackStatus::Stopped => "Stopped",
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
        };
        format!("{}@{}/{}", status, self.position_str(), self.duration_str())
    }
}

/// Format a duration as MM:SS or HH:MM:SS.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Commands sent to the audio thread.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    /// Load a new file
    Load(PathBuf),
    /// Start/resume playback
    Play,
    /// Pause playback
    Pause,
    /// Stop playback
    Stop,
    /// Seek to position (0.0 - 1.0)
    Seek(f32),
    /// Shutdown the audio thread
    Shutdown,
}

/// Events sent from the audio thread to notify the UI of state changes.
///
/// This enables an event-driven architecture where:
/// 1. UI sends commands via `PlayerCommand`
/// 2. Audio thread processes commands and emits events
/// 3. UI receives events and updates state (single source of truth)
///
/// This avoids race conditions from polling stale state after sending commands.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// Playback status changed
    StatusChanged(PlaybackStatus),
    /// A new track was loaded with its metadata
    TrackLoaded {
        path: PathBuf,
        duration: Duration,
        sample_rate: u32,
        channels: u16,
    },
    /// Position updated (sent periodically during playback)
    PositionChanged(Duration),
    /// Playback finished (end of track)
    PlaybackFinished,
    /// An error occurred
    Error(String),
}

/// Track metadata for display.
#[derive(Debug, Clone, Default)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<u32>,
    pub year: Option<i32>,
    pub genre: Option<String>,
}

impl TrackInfo {
    /// Get display title (filename if no title tag).
    pub fn display_title(&self, path: &std::path::Path) -> String {
        self.title.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string())
        })
    }

    /// Get display artist.
    pub fn display_artist(&self) -> &str {
        self.artist.as_deref().unwrap_or("Unknown Artist")
    }

    /// Get display album.
    pub fn display_album(&self) -> &str {
        self.album.as_deref().unwrap_or("Unknown Album")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1:01:01");
    }

    #[test]
    fn test_position_fraction() {
        let mut state = PlayerState::default();
        assert_eq!(state.position_fraction(), 0.0);

        state.duration = Duration::from_secs(100);
        state.position = Duration::from_secs(50);
        assert!((state.position_fraction() - 0.5).abs() < 0.01);
    }

    #[test]
    fn muting_preserves_the_underlying_volume() {
        let mut state = PlayerState {
            volume: 0.6,
            ..Default::default()
        };
        assert!((state.effective_volume() - 0.6).abs() < 0.001);
        state.muted = true;
        assert_eq!(state.effective_volume(), 0.0);
        state.muted = false;
        assert!((state.effective_volume() - 0.6).abs() < 0.001);
    }
}

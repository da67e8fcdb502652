//! Configuration file loading, defaults, and atomic save.
//!
//! Config is TOML, searched in order (later wins): `$XDG_CONFIG_HOME/waves/config.toml`
//! (or `~/.config/waves/config.toml`), then `./config.toml`. The file is
//! human-readable and editable; unset keys fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration, exactly the keys in spec.md §6.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Start path for the file browser (`~` expanded). Empty means cwd.
    pub default_folder: String,

    /// Icon glyph set.
    pub icons: IconSet,

    /// Roots scanned for music.
    pub library_sources: Vec<PathBuf>,

    pub slskd: SlskdConfig,
    pub musicbrainz: MusicBrainzConfig,
    pub lastfm: LastfmConfig,
    pub radio: RadioConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IconSet {
    Nerd,
    Unicode,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SlskdConfig {
    pub url: String,
    pub apikey: String,
    pub completed_path: String,
}

impl SlskdConfig {
    /// Trailing `/` is stripped from `url` on load, per spec.md §6.
    fn normalize(&mut self) {
        while self.url.ends_with('/') {
            self.url.pop();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MusicBrainzConfig {
    pub albums_only: bool,
}

impl Default for MusicBrainzConfig {
    fn default() -> Self {
        Self { albums_only: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LastfmConfig {
    pub api_key: String,
    pub api_secret: String,
}

impl LastfmConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Radio scheduler tuning, every numeric default from spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadioConfig {
    pub buffer_size: i64,
    pub similar_artists_limit: i64,
    pub shuffle_pool_size: i64,
    pub artists_per_fill: i64,
    pub artist_match_threshold: f64,
    pub max_artist_repeat: i64,
    pub artist_repeat_window: i64,
    pub recent_seeds_window: i64,
    pub top_track_boost: f64,
    pub user_boost: f64,
    pub favorite_boost: f64,
    pub decay_factor: f64,
    pub min_similarity_weight: f64,
    pub cache_ttl_days: i64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1,
            similar_artists_limit: 50,
            shuffle_pool_size: 10,
            artists_per_fill: 5,
            artist_match_threshold: 0.8,
            max_artist_repeat: 2,
            artist_repeat_window: 20,
            recent_seeds_window: 3,
            top_track_boost: 3.0,
            user_boost: 1.3,
            favorite_boost: 2.0,
            decay_factor: 0.1,
            min_similarity_weight: 0.1,
            cache_ttl_days: 7,
        }
    }
}

impl Config {
    /// True once slskd is reachable (url and apikey both set).
    pub fn has_slskd_config(&self) -> bool {
        !self.slskd.url.is_empty() && !self.slskd.apikey.is_empty()
    }

    /// True once Last.fm scrobbling can be enabled.
    pub fn has_lastfm_config(&self) -> bool {
        self.lastfm.is_configured()
    }

    pub fn get_radio_config(&self) -> &RadioConfig {
        &self.radio
    }

    /// Clamp/replace invalid values with defaults, per spec.md §6:
    /// "Invalid or zero values fall back to defaults."
    fn normalize(&mut self) {
        self.slskd.normalize();
        let d = RadioConfig::default();
        let r = &mut self.radio;
        if r.buffer_size <= 0 {
            r.buffer_size = d.buffer_size;
        }
        r.buffer_size = r.buffer_size.clamp(1, 20);
        if r.similar_artists_limit <= 0 {
            r.similar_artists_limit = d.similar_artists_limit;
        }
        if r.shuffle_pool_size <= 0 {
            r.shuffle_pool_size = d.shuffle_pool_size;
        }
        if r.artists_per_fill <= 0 {
            r.artists_per_fill = d.artists_per_fill;
        }
        if !(0.0..=1.0).contains(&r.artist_match_threshold) || r.artist_match_threshold == 0.0 {
            r.artist_match_threshold = d.artist_match_threshold;
        }
        if r.max_artist_repeat <= 0 {
            r.max_artist_repeat = d.max_artist_repeat;
        }
        if r.artist_repeat_window <= 0 {
            r.artist_repeat_window = d.artist_repeat_window;
        }
        if r.recent_seeds_window <= 0 {
            r.recent_seeds_window = d.recent_seeds_window;
        }
        if r.top_track_boost <= 0.0 {
            r.top_track_boost = d.top_track_boost;
        }
        if r.user_boost <= 0.0 {
            r.user_boost = d.user_boost;
        }
        if r.favorite_boost <= 0.0 {
            r.favorite_boost = d.favorite_boost;
        }
        if !(0.0..=1.0).contains(&r.decay_factor) {
            r.decay_factor = d.decay_factor;
        }
        if !(0.0..=1.0).contains(&r.min_similarity_weight) {
            r.min_similarity_weight = d.min_similarity_weight;
        }
        if r.cache_ttl_days <= 0 {
            r.cache_ttl_days = d.cache_ttl_days;
        }
    }

    /// Resolve `default_folder`, expanding a leading `~`.
    pub fn default_folder_path(&self) -> PathBuf {
        if let Some(rest) = self.default_folder.strip_prefix('~')
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest.trim_start_matches('/'));
        }
        if self.default_folder.is_empty() {
            std::env::current_dir().unwrap_or_default()
        } else {
            PathBuf::from(&self.default_folder)
        }
    }
}

/// Directory holding `config.toml`, following XDG then the `dirs` crate's
/// platform config-dir fallback.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Some(PathBuf::from(xdg).join("waves"));
    }
    dirs::home_dir().map(|home| home.join(".config").join("waves"))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration, merging the XDG config file and `./config.toml`
/// (later wins) per spec.md §6. Returns defaults if neither file exists
/// or parses; never fails — a missing/corrupt config must not abort startup.
pub fn load() -> Config {
    let mut config = Config::default();

    if let Some(path) = config_path() {
        merge_from_file(&mut config, &path);
    } else {
        tracing::warn!("Could not determine config directory, using defaults");
    }

    merge_from_file(&mut config, Path::new("config.toml"));
    config.normalize();
    config
}

fn merge_from_file(config: &mut Config, path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(loaded) => {
                tracing::info!("Loaded config from {}", path.display());
                *config = loaded;
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {}: {}", path.display(), e);
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {}: {}", path.display(), e);
        }
    }
}

/// Save configuration to the XDG config path, atomically (temp file + rename).
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {}", path.display());
    Ok(())
}

pub async fn save_async(config: Config) -> Result<(), ConfigError> {
    tokio::task::spawn_blocking(move || save(&config))
        .await
        .map_err(|e| ConfigError::TaskJoin(e.to_string()))?
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Seed test 1: "Load empty config".
    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.default_folder, "");
        assert!(!config.has_slskd_config());
        assert!(!config.has_lastfm_config());
        assert_eq!(config.get_radio_config().buffer_size, 1);
    }

    #[test]
    fn default_config_roundtrips() {
        let mut config = Config::default();
        config.lastfm.api_key = "key".into();
        config.lastfm.api_secret = "secret".into();
        config.library_sources.push(PathBuf::from("/music"));

        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, config);
        assert!(parsed.has_lastfm_config());
    }

    #[test]
    fn trailing_slash_stripped_from_slskd_url() {
        let mut config = Config {
            slskd: SlskdConfig {
                url: "http://localhost:5030/".into(),
                apikey: "k".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.normalize();
        assert_eq!(config.slskd.url, "http://localhost:5030");
    }

    #[test]
    fn invalid_radio_values_fall_back_to_defaults() {
        let mut config = Config::default();
        config.radio.artist_match_threshold = -1.0;
        config.radio.decay_factor = 2.0;
        config.normalize();
        let d = RadioConfig::default();
        assert_eq!(config.radio.artist_match_threshold, d.artist_match_threshold);
        assert_eq!(config.radio.decay_factor, d.decay_factor);
    }

    #[test]
    fn buffer_size_clamped_to_one_twenty() {
        let mut config = Config::default();
        config.radio.buffer_size = 999;
        config.normalize();
        assert_eq!(config.radio.buffer_size, 20);
    }
}

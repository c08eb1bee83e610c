use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::player::PlaybackPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Límites
    pub max_song_duration: u64, // En segundos
    pub idle_check_interval: Duration,
    pub resolve_timeout: Duration,

    // Fuentes
    pub ytdlp_path: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Límites
            max_song_duration: std::env::var("MAX_SONG_DURATION")
                .unwrap_or_else(|_| "300".to_string()) // 5 minutos
                .parse()
                .context("MAX_SONG_DURATION inválido")?,
            idle_check_interval: duration_var("IDLE_CHECK_INTERVAL", "30s")?,
            resolve_timeout: duration_var("RESOLVE_TIMEOUT", "45s")?,

            // Fuentes
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            spotify_client_id: optional_var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: optional_var("SPOTIFY_CLIENT_SECRET"),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token must not be empty
    /// - Durations and intervals must be greater than zero
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN cannot be empty");
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        if self.idle_check_interval.is_zero() {
            anyhow::bail!("Idle check interval must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn playback_policy(&self) -> PlaybackPolicy {
        PlaybackPolicy {
            max_track_duration: Duration::from_secs(self.max_song_duration),
            resolve_timeout: self.resolve_timeout,
        }
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token and Spotify secrets.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Limits: {}s max duration, resolve timeout {}\n  \
            Reaper: every {}\n  \
            Sources: yt-dlp at `{}`, Spotify={}",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_song_duration,
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.idle_check_interval),
            self.ytdlp_path,
            self.spotify_enabled(),
        )
    }
}

fn duration_var(key: &str, default: &str) -> Result<Duration> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    humantime::parse_duration(raw.trim()).with_context(|| format!("{} inválido: `{}`", key, raw))
}

fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            // Limit defaults
            max_song_duration: 300,
            idle_check_interval: Duration::from_secs(30),
            resolve_timeout: Duration::from_secs(45),

            // Source defaults
            ytdlp_path: "yt-dlp".to_string(),
            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}

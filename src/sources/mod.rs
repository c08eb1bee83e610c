//! # Sources Module
//!
//! Turns a playback request (URL, Spotify link or free-text search) into
//! track metadata and a playable stream.
//!
//! The scheduler only sees the [`Resolver`] trait. [`SourceManager`] is the
//! production implementation:
//!
//! - Plain URLs and searches are handed to yt-dlp ([`youtube::YouTubeClient`])
//! - Spotify track links are translated into a YouTube search first
//!   ([`spotify::SpotifyClient`]), since Spotify audio cannot be streamed
//!
//! Resolved tracks are never cached; every dequeue resolves again so that
//! short-lived stream URLs are always fresh.

pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

use crate::{audio::queue::RequestKind, config::Config, error::ResolveError};

/// Contrato del resolver: debe poder llamarse en paralelo desde varias guilds
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Solo metadata, sin stream. Se usa antes de encolar.
    async fn probe(&self, query: &str) -> Result<TrackInfo, ResolveError>;

    /// Metadata más URL de stream lista para reproducir
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, ResolveError>;
}

/// Metadata de un track
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
    /// URL canónica de la página (no del stream)
    pub url: String,
    pub source_type: SourceType,
}

impl TrackInfo {
    pub fn new(title: impl Into<String>, url: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            title: title.into(),
            artist: None,
            duration: None,
            thumbnail: None,
            url: url.into(),
            source_type,
        }
    }

    pub fn with_artist(mut self, artist: String) -> Self {
        self.artist = Some(artist);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = source_type;
        self
    }
}

/// Track listo para reproducir. Vive lo que dura una reproducción.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub info: TrackInfo,
    pub stream_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    YouTube,
    Spotify,
    DirectUrl,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YouTube => "YouTube",
            SourceType::Spotify => "Spotify",
            SourceType::DirectUrl => "Directo",
        }
    }
}

/// Resolver de producción: yt-dlp con traducción previa de links de Spotify
pub struct SourceManager {
    youtube: YouTubeClient,
    spotify: Option<SpotifyClient>,
}

impl SourceManager {
    pub fn new(config: &Config) -> Self {
        let spotify = match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => Some(SpotifyClient::new(id.clone(), secret.clone())),
            _ => None,
        };

        Self {
            youtube: YouTubeClient::new(config.ytdlp_path.clone()),
            spotify,
        }
    }

    /// Convierte un link de Spotify en una búsqueda de YouTube
    async fn spotify_search_query(&self, url: &str) -> Result<String, ResolveError> {
        let spotify = self.spotify.as_ref().ok_or_else(|| {
            ResolveError::Unsupported("links de Spotify deshabilitados (faltan credenciales)".into())
        })?;

        let query = spotify.search_query(url).await?;
        info!("🎧 Spotify traducido a búsqueda: {}", query);
        Ok(query)
    }
}

#[async_trait]
impl Resolver for SourceManager {
    async fn probe(&self, query: &str) -> Result<TrackInfo, ResolveError> {
        debug!("🔎 Sondeando: {}", query);

        match RequestKind::classify(query) {
            RequestKind::Url => self.youtube.get_info(query).await,
            RequestKind::Search => self.youtube.search_first(query).await,
            RequestKind::Spotify => {
                let search = self.spotify_search_query(query).await?;
                let info = self.youtube.search_first(&search).await?;
                Ok(info.with_source_type(SourceType::Spotify))
            }
        }
    }

    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, ResolveError> {
        match RequestKind::classify(query) {
            RequestKind::Spotify => {
                let search = self.spotify_search_query(query).await?;
                self.youtube.resolve(&format!("ytsearch1:{}", search)).await
            }
            RequestKind::Search => self.youtube.resolve(&format!("ytsearch1:{}", query)).await,
            RequestKind::Url => self.youtube.resolve(query).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config_without_spotify() -> Config {
        Config::default()
    }

    #[test]
    fn test_track_info_builder() {
        let info = TrackInfo::new("Song", "https://youtu.be/x", SourceType::YouTube)
            .with_artist("Artist".into())
            .with_duration(Duration::from_secs(120))
            .with_thumbnail("https://i.ytimg.com/x.jpg".into());

        assert_eq!(info.artist.as_deref(), Some("Artist"));
        assert_eq!(info.duration, Some(Duration::from_secs(120)));
        assert_eq!(info.source_type.as_str(), "YouTube");
    }

    #[tokio::test]
    async fn test_spotify_links_unsupported_without_credentials() {
        let manager = SourceManager::new(&config_without_spotify());
        let err = manager
            .probe("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC")
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::Unsupported(_)));
    }
}

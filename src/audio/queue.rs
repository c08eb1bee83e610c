use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;
use url::Url;

use super::session::PlaybackStatus;
use crate::sources::{SpotifyClient, TrackInfo};

/// Tipo de petición según el texto recibido
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Url,
    Spotify,
    Search,
}

impl RequestKind {
    pub fn classify(query: &str) -> Self {
        match Url::parse(query.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                if SpotifyClient::is_valid_url(query) {
                    RequestKind::Spotify
                } else {
                    RequestKind::Url
                }
            }
            _ => RequestKind::Search,
        }
    }
}

/// Petición en cola. Inmutable una vez encolada.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    query: String,
    title: Option<String>,
    duration: Option<Duration>,
    requested_by: UserId,
    requested_at: DateTime<Utc>,
}

impl PlaybackRequest {
    pub fn new(query: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            query: query.into(),
            title: None,
            duration: None,
            requested_by,
            requested_at: Utc::now(),
        }
    }

    /// Petición a partir de metadata ya sondeada; apunta a la URL canónica o,
    /// si la fuente no dio ninguna, al texto original
    pub fn from_track(query: &str, info: &TrackInfo, requested_by: UserId) -> Self {
        let query = if info.url.trim().is_empty() { query } else { info.url.as_str() };
        Self {
            query: query.to_string(),
            title: Some(info.title.clone()),
            duration: info.duration,
            requested_by,
            requested_at: Utc::now(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Título conocido o, si no, el texto original
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.query)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }
}

/// Resultado de `/play`: lo que se encoló y en qué posición
#[derive(Debug, Clone)]
pub struct QueuedTrack {
    pub info: TrackInfo,
    pub requested_by: UserId,
    /// 1-based; 1 significa que será lo próximo en sonar
    pub position: usize,
}

/// Track sonando ahora
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub info: TrackInfo,
    pub requested_by: UserId,
    pub paused: bool,
}

/// Foto del estado de una sesión para mostrar
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub status: PlaybackStatus,
    pub now_playing: Option<NowPlaying>,
    pub pending: Vec<PlaybackRequest>,
    pub connected: bool,
}

impl QueueSnapshot {
    pub fn total_duration(&self) -> Duration {
        let queued: Duration = self.pending.iter().filter_map(|r| r.duration()).sum();
        let current = self
            .now_playing
            .as_ref()
            .and_then(|n| n.info.duration)
            .unwrap_or_default();
        queued + current
    }

    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.pending.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: self.pending[start..end].to_vec(),
            first_position: start + 1,
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<PlaybackRequest>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType;
    use pretty_assertions::assert_eq;

    fn request(n: u64) -> PlaybackRequest {
        let info = TrackInfo::new(format!("Song {n}"), format!("https://youtu.be/{n}"), SourceType::YouTube)
            .with_duration(Duration::from_secs(60 * n));
        PlaybackRequest::from_track("ignored", &info, UserId::new(n))
    }

    fn snapshot(pending: Vec<PlaybackRequest>) -> QueueSnapshot {
        QueueSnapshot {
            status: PlaybackStatus::Playing,
            now_playing: None,
            pending,
            connected: true,
        }
    }

    #[test]
    fn test_classify_requests() {
        assert_eq!(
            RequestKind::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            RequestKind::Url
        );
        assert_eq!(
            RequestKind::classify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"),
            RequestKind::Spotify
        );
        assert_eq!(RequestKind::classify("daft punk around the world"), RequestKind::Search);
        assert_eq!(RequestKind::classify("ftp://example.com/song.mp3"), RequestKind::Search);
    }

    #[test]
    fn test_request_from_track_keeps_metadata() {
        let req = request(2);
        assert_eq!(req.query(), "https://youtu.be/2");
        assert_eq!(req.display_title(), "Song 2");
        assert_eq!(req.duration(), Some(Duration::from_secs(120)));
        assert_eq!(RequestKind::classify(req.query()), RequestKind::Url);

        let raw = PlaybackRequest::new("lofi beats", UserId::new(1));
        assert_eq!(raw.display_title(), "lofi beats");
    }

    #[test]
    fn test_request_without_canonical_url_keeps_query() {
        let info = TrackInfo::new("Radio", "", SourceType::DirectUrl);
        let req = PlaybackRequest::from_track("https://radio.example.com/live", &info, UserId::new(1));

        assert_eq!(req.query(), "https://radio.example.com/live");
        assert_eq!(req.display_title(), "Radio");
    }

    #[test]
    fn test_total_duration() {
        let snap = snapshot(vec![request(1), request(2)]);
        assert_eq!(snap.total_duration(), Duration::from_secs(180));
    }

    #[test]
    fn test_pagination() {
        let snap = snapshot((1..=12).map(request).collect());

        let page = snap.get_page(2, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.first_position, 6);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.items[0].display_title(), "Song 6");

        let last = snap.get_page(99, 5);
        assert_eq!(last.current_page, 3);
        assert_eq!(last.items.len(), 2);

        let empty = snapshot(Vec::new()).get_page(1, 5);
        assert_eq!(empty.total_pages, 1);
        assert!(empty.items.is_empty());
    }
}

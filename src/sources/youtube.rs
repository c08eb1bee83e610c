use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ResolvedTrack, SourceType, TrackInfo};
use crate::error::ResolveError;

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    ytdlp_path: String,
    rate_limiter: tokio::sync::Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    /// Solo presente cuando se selecciona un formato con `-f`
    url: Option<String>,
    is_live: Option<bool>,
}

impl YouTubeClient {
    pub fn new(ytdlp_path: impl Into<String>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: tokio::sync::Semaphore::new(3),
        }
    }

    pub fn is_youtube_url(url: &str) -> bool {
        static YOUTUBE: OnceLock<Regex> = OnceLock::new();
        YOUTUBE
            .get_or_init(|| {
                Regex::new(r"^https?://(www\.|music\.|m\.)?(youtube\.com|youtu\.be)/")
                    .expect("regex válida")
            })
            .is_match(url)
    }

    /// Obtiene información de una URL específica
    pub async fn get_info(&self, url: &str) -> Result<TrackInfo, ResolveError> {
        debug!("📊 Obteniendo info de: {}", url);
        let info = self.dump_json(&["--no-playlist", "--dump-json", "--no-warnings", url]).await?;
        Ok(info_to_track(info))
    }

    /// Primer resultado de una búsqueda en YouTube
    pub async fn search_first(&self, query: &str) -> Result<TrackInfo, ResolveError> {
        info!("🔍 Buscando en YouTube: {}", query);
        let search_query = format!("ytsearch1:{}", query);
        let info = self
            .dump_json(&["--no-playlist", "--dump-json", "--no-warnings", &search_query])
            .await?;
        Ok(info_to_track(info))
    }

    /// Metadata y URL de stream de audio en una sola invocación
    pub async fn resolve(&self, target: &str) -> Result<ResolvedTrack, ResolveError> {
        debug!("🎵 Resolviendo stream para: {}", target);

        let info = self
            .dump_json(&[
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--dump-json",
                "--no-warnings",
                target,
            ])
            .await?;

        let stream_url = info
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ResolveError::Failed("yt-dlp no devolvió URL de stream".into()))?;

        Ok(ResolvedTrack {
            info: info_to_track(info),
            stream_url,
        })
    }

    async fn dump_json(&self, args: &[&str]) -> Result<YtDlpInfo, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Failed(e.to_string()))?;

        // Si se descarta el future (skip, stop, timeout) el proceso muere con él
        let output = Command::new(&self.ytdlp_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolveError::Failed(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp error: {}", stderr.trim());
            return Err(classify_ytdlp_error(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_first_info(&stdout)
    }
}

fn parse_first_info(stdout: &str) -> Result<YtDlpInfo, ResolveError> {
    let line = stdout
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ResolveError::NotFound("yt-dlp no devolvió resultados".into()))?;

    serde_json::from_str(line)
        .map_err(|e| ResolveError::Failed(format!("respuesta de yt-dlp inválida: {}", e)))
}

fn classify_ytdlp_error(stderr: &str) -> ResolveError {
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or(stderr)
        .trim()
        .to_string();

    if message.contains("Unsupported URL") {
        ResolveError::Unsupported(message)
    } else if message.contains("Video unavailable")
        || message.contains("HTTP Error 404")
        || message.contains("does not exist")
    {
        ResolveError::NotFound(message)
    } else {
        ResolveError::Failed(message)
    }
}

fn info_to_track(info: YtDlpInfo) -> TrackInfo {
    let url = info
        .webpage_url
        .or(info.original_url)
        .unwrap_or_default();
    let source_type = if YouTubeClient::is_youtube_url(&url) {
        SourceType::YouTube
    } else {
        SourceType::DirectUrl
    };

    let mut track = TrackInfo::new(info.title, url, source_type);

    if let Some(artist) = info.uploader {
        track = track.with_artist(artist);
    }

    // Los directos no tienen duración fija
    if !info.is_live.unwrap_or(false) {
        if let Some(seconds) = info.duration.filter(|d| *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(seconds));
        }
    }

    if let Some(thumbnail) = info.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }

    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{"id":"dQw4w9WgXcQ","title":"Never Gonna Give You Up","duration":213.0,"uploader":"Rick Astley","thumbnail":"https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg","webpage_url":"https://www.youtube.com/watch?v=dQw4w9WgXcQ","url":"https://rr1---sn.googlevideo.com/videoplayback?x=1","is_live":false}"#;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeClient::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(YouTubeClient::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(!YouTubeClient::is_youtube_url("https://example.com/video"));
    }

    #[test]
    fn test_parse_dump_json() {
        let info = parse_first_info(&format!("\n{}\n", SAMPLE)).unwrap();
        assert_eq!(info.url.as_deref(), Some("https://rr1---sn.googlevideo.com/videoplayback?x=1"));

        let track = info_to_track(info);
        assert_eq!(track.title, "Never Gonna Give You Up");
        assert_eq!(track.artist.as_deref(), Some("Rick Astley"));
        assert_eq!(track.duration, Some(Duration::from_secs(213)));
        assert_eq!(track.source_type, SourceType::YouTube);
    }

    #[test]
    fn test_live_streams_have_no_duration() {
        let json = r#"{"title":"Lofi radio","duration":0,"webpage_url":"https://www.youtube.com/watch?v=live","is_live":true}"#;
        let track = info_to_track(parse_first_info(json).unwrap());
        assert_eq!(track.duration, None);
    }

    #[test]
    fn test_empty_output_is_not_found() {
        assert!(matches!(
            parse_first_info("  \n").unwrap_err(),
            ResolveError::NotFound(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancelled_resolve_kills_process() {
        let marker = std::env::temp_dir().join(format!("jukebox-ytdlp-{}", std::process::id()));
        let _ = std::fs::remove_file(&marker);
        let script = format!("sleep 1 && touch {}", marker.display());

        let client = YouTubeClient::new("sh");
        let result =
            tokio::time::timeout(Duration::from_millis(200), client.dump_json(&["-c", &script])).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
        assert_eq!(client.rate_limiter.available_permits(), 3);
    }

    #[test]
    fn test_error_classification() {
        let err = classify_ytdlp_error("WARNING: foo\nERROR: Unsupported URL: https://example.com\n");
        assert!(matches!(err, ResolveError::Unsupported(_)));

        let err = classify_ytdlp_error("ERROR: [youtube] abc: Video unavailable");
        assert!(matches!(err, ResolveError::NotFound(_)));

        let err = classify_ytdlp_error("ERROR: unable to download webpage");
        assert!(matches!(err, ResolveError::Failed(_)));
    }
}

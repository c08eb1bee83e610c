// Traduce links de pistas de Spotify a búsquedas de YouTube.
// Spotify no expone audio reproducible, solo metadata.

use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ResolveError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const TRACKS_URL: &str = "https://api.spotify.com/v1/tracks";

pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    name: String,
    artists: Vec<SpotifyArtist>,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            token: Mutex::new(None),
        }
    }

    pub fn is_valid_url(url: &str) -> bool {
        url.contains("open.spotify.com")
    }

    /// Extrae el ID de una pista; otros tipos de link no están soportados
    pub fn track_id(url: &str) -> Result<String, ResolveError> {
        static TRACK: OnceLock<Regex> = OnceLock::new();
        let re = TRACK.get_or_init(|| {
            Regex::new(r"open\.spotify\.com/(?:intl-[a-z]+/)?track/([A-Za-z0-9]+)")
                .expect("regex válida")
        });

        re.captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| {
                ResolveError::Unsupported("el link de Spotify debe ser de una pista".into())
            })
    }

    /// Búsqueda de YouTube equivalente a la pista de Spotify
    pub async fn search_query(&self, url: &str) -> Result<String, ResolveError> {
        let id = Self::track_id(url)?;
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{}/{}", TRACKS_URL, id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ResolveError::Failed(format!("Spotify: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolveError::NotFound(format!("pista de Spotify {}", id)));
        }

        let track: SpotifyTrack = response
            .error_for_status()
            .map_err(|e| ResolveError::Failed(format!("Spotify: {}", e)))?
            .json()
            .await
            .map_err(|e| ResolveError::Failed(format!("Spotify: {}", e)))?;

        Ok(build_search_query(&track))
    }

    async fn access_token(&self) -> Result<String, ResolveError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("🔑 Renovando token de Spotify");
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));

        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", credentials))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ResolveError::Failed(format!("token de Spotify: {}", e)))?
            .json()
            .await
            .map_err(|e| ResolveError::Failed(format!("token de Spotify: {}", e)))?;

        // Margen para no usar un token a punto de expirar
        let lifetime = Duration::from_secs(response.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            access_token: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(response.access_token)
    }
}

fn build_search_query(track: &SpotifyTrack) -> String {
    match track.artists.first() {
        Some(artist) => format!("{} - {} lyrics audio", artist.name, track.name),
        None => format!("{} lyrics audio", track.name),
    }
}

use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
    model::id::UserId,
};
use std::time::Duration;

use crate::{
    audio::queue::{NowPlaying, PlaybackRequest, QueueSnapshot, QueuedTrack},
    error::{PlaybackError, ResolveError, VoiceError},
    sources::TrackInfo,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox";

const ITEMS_PER_PAGE: usize = 10;

fn track_fields(mut embed: CreateEmbed, track: &TrackInfo, requested_by: UserId) -> CreateEmbed {
    embed = embed.field(
        "🎤 Artista",
        track.artist.as_deref().unwrap_or("Desconocido"),
        true,
    );

    embed = match track.duration {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = embed
        .field("👤 Solicitado por", format!("<@{}>", requested_by), true)
        .field("🔗 Fuente", track.source_type.as_str(), true);

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    if track.url.starts_with("http") {
        embed = embed.url(&track.url);
    }

    embed
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackInfo, requested_by: UserId) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track, requested_by)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(queued: &QueuedTrack) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!(
            "**{}** se ha agregado a la cola en la posición **#{}**",
            queued.info.title, queued.position
        ))
        .color(colors::MUSIC_PURPLE);

    let footer = if queued.position == 1 {
        "🎵 Será la próxima en sonar"
    } else {
        "🎵 Se reproducirá automáticamente cuando llegue su turno"
    };

    track_fields(embed, &queued.info, queued.requested_by)
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize) -> CreateEmbed {
    let queue_page = snapshot.get_page(page, ITEMS_PER_PAGE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.now_playing.is_none() && snapshot.pending.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &snapshot.now_playing {
        embed = embed.field(now_playing_label(current), now_playing_line(current), false);
    }

    // Próximas canciones
    if !queue_page.items.is_empty() {
        let description: String = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| queue_line(queue_page.first_position + i, item))
            .collect();

        embed = embed.field("Próximas canciones", description, false);
    }

    // Información adicional
    embed = embed.field("Información", queue_summary(snapshot), false);

    // Paginación
    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • Jukebox",
            queue_page.current_page, queue_page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Línea de la cola: posición, título, duración, quién la pidió y hace cuánto
fn queue_line(position: usize, item: &PlaybackRequest) -> String {
    let duration = item
        .duration()
        .map(|d| format!(" `[{}]`", format_duration(d)))
        .unwrap_or_default();
    format!(
        "**{}**. {}{} • <@{}> <t:{}:R>\n",
        position,
        item.display_title(),
        duration,
        item.requested_by(),
        item.requested_at().timestamp()
    )
}

fn queue_summary(snapshot: &QueueSnapshot) -> String {
    let mut info = format!("**En cola:** {} canciones", snapshot.pending.len());
    let total = snapshot.total_duration();
    if total > Duration::ZERO {
        info.push_str(&format!(" • **Duración:** {}", format_duration(total)));
    }
    if !snapshot.connected {
        info.push_str(" • 🔇 Sin conexión de voz");
    }
    info
}

fn now_playing_label(current: &NowPlaying) -> &'static str {
    if current.paused {
        "⏸️ En pausa"
    } else {
        "▶️ Reproduciendo"
    }
}

fn now_playing_line(current: &NowPlaying) -> String {
    let artist = current
        .info
        .artist
        .as_ref()
        .map(|a| format!(" - {}", a))
        .unwrap_or_default();
    format!("**{}**{} • <@{}>", current.info.title, artist, current.requested_by)
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Aviso de un track que no se pudo reproducir
pub fn create_track_failed_embed(title: &str, error: &PlaybackError) -> CreateEmbed {
    CreateEmbed::default()
        .title("⚠️ Canción Omitida")
        .description(format!("No se pudo reproducir **{}**\n{}", title, error))
        .color(colors::WARNING_ORANGE)
        .footer(CreateEmbedFooter::new("⏭️ Continuando con la siguiente de la cola"))
        .timestamp(Timestamp::now())
}

/// Título y mensaje para mostrar un error al usuario
pub fn describe_error(error: &PlaybackError) -> (&'static str, String) {
    let title = match error {
        PlaybackError::NothingPlaying => "Nada en Reproducción",
        PlaybackError::TrackTooLong { .. } => "Canción Demasiado Larga",
        PlaybackError::NotInVoiceChannel => "No Estás en un Canal de Voz",
        PlaybackError::Resolve(ResolveError::NotFound(_)) => "Sin Resultados",
        PlaybackError::Resolve(ResolveError::Timeout(_)) => "Tiempo Agotado",
        PlaybackError::Resolve(ResolveError::Unsupported(_)) => "Fuente No Soportada",
        PlaybackError::Resolve(ResolveError::Failed(_)) => "Error al Buscar",
        PlaybackError::Voice(VoiceError::NoPermission) => "Sin Permisos",
        PlaybackError::Voice(VoiceError::AlreadyConnected) => "Ya Conectado",
        PlaybackError::Voice(VoiceError::NotConnected) => "No Conectado",
        PlaybackError::Voice(VoiceError::Transport(_)) => "Error de Voz",
    };

    let mut description = error.to_string();
    if let PlaybackError::TrackTooLong { limit, .. } = error {
        description.push_str(&format!(
            "\n\n💡 El máximo permitido es **{}**",
            format_duration(*limit)
        ));
    }

    (title, description)
}

pub fn create_playback_error_embed(error: &PlaybackError) -> CreateEmbed {
    let (title, description) = describe_error(error);
    create_error_embed(title, &description)
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::PlaybackStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "0:05");
        assert_eq!(format_duration(Duration::from_secs(301)), "5:01");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_describe_track_too_long() {
        let (title, description) = describe_error(&PlaybackError::TrackTooLong {
            duration: Duration::from_secs(301),
            limit: Duration::from_secs(300),
        });
        assert_eq!(title, "Canción Demasiado Larga");
        assert!(description.contains("5:00"));
    }

    #[test]
    fn test_queue_line_shows_requester_and_age() {
        let request = PlaybackRequest::new("lofi beats", UserId::new(7));
        let line = queue_line(3, &request);

        assert!(line.starts_with("**3**. lofi beats • <@7>"));
        assert!(line.contains(&format!("<t:{}:R>", request.requested_at().timestamp())));
    }

    #[test]
    fn test_queue_summary_flags_missing_voice() {
        let mut snapshot = QueueSnapshot {
            status: PlaybackStatus::Idle,
            now_playing: None,
            pending: vec![PlaybackRequest::new("a", UserId::new(1))],
            connected: true,
        };
        assert_eq!(queue_summary(&snapshot), "**En cola:** 1 canciones");

        snapshot.connected = false;
        assert!(queue_summary(&snapshot).ends_with("Sin conexión de voz"));
    }

    #[test]
    fn test_describe_wrapped_errors() {
        let (title, _) = describe_error(&ResolveError::NotFound("xyz".into()).into());
        assert_eq!(title, "Sin Resultados");

        let (title, _) = describe_error(&VoiceError::NoPermission.into());
        assert_eq!(title, "Sin Permisos");
    }
}

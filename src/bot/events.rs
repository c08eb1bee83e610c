use dashmap::DashMap;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::player::{DisconnectReason, SessionEvent},
    ui::{buttons, embeds},
};

/// Último mensaje "reproduciendo ahora" de cada guild, cuyos botones hay que
/// desactivar cuando queda obsoleto
#[derive(Debug, Default)]
pub struct PlayerMessages {
    messages: HashMap<GuildId, (ChannelId, MessageId)>,
}

impl PlayerMessages {
    /// Registra el mensaje nuevo y devuelve el anterior, si había
    pub fn replace(
        &mut self,
        guild_id: GuildId,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Option<(ChannelId, MessageId)> {
        self.messages.insert(guild_id, (channel_id, message_id))
    }

    pub fn take(&mut self, guild_id: GuildId) -> Option<(ChannelId, MessageId)> {
        self.messages.remove(&guild_id)
    }
}

/// Consume los eventos del scheduler y los publica en el canal de texto
/// de cada guild. Entrega best-effort: los errores de Discord solo se
/// registran.
pub async fn run_announcer(
    http: Arc<Http>,
    mut events: broadcast::Receiver<SessionEvent>,
    channels: Arc<DashMap<GuildId, ChannelId>>,
    shutdown: CancellationToken,
) {
    info!("📣 Anunciador de eventos iniciado");
    let mut player_messages = PlayerMessages::default();

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(event) => announce(&http, &channels, &mut player_messages, event).await,
            Err(RecvError::Lagged(skipped)) => {
                warn!("📣 Anunciador atrasado, {} eventos descartados", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    debug!("Anunciador detenido");
}

async fn announce(
    http: &Http,
    channels: &DashMap<GuildId, ChannelId>,
    player_messages: &mut PlayerMessages,
    event: SessionEvent,
) {
    match event {
        SessionEvent::NowPlaying {
            guild_id,
            track,
            requested_by,
        } => {
            let Some(channel_id) = announce_channel(channels, guild_id) else {
                return;
            };

            let message = CreateMessage::new()
                .embed(embeds::create_now_playing_embed(&track, requested_by))
                .components(buttons::create_player_buttons(false, false));

            match channel_id.send_message(http, message).await {
                Ok(sent) => {
                    if let Some(previous) = player_messages.replace(guild_id, channel_id, sent.id) {
                        disable_buttons(http, previous).await;
                    }
                }
                Err(e) => error!("Error al enviar mensaje now playing: {:?}", e),
            }
        }
        SessionEvent::QueueDrained { guild_id } => {
            if let Some(previous) = player_messages.take(guild_id) {
                disable_buttons(http, previous).await;
            }
        }
        SessionEvent::TrackFailed {
            guild_id,
            title,
            error,
        } => {
            if let Some(channel_id) = announce_channel(channels, guild_id) {
                send_embed(http, channel_id, embeds::create_track_failed_embed(&title, &error)).await;
            }
        }
        SessionEvent::Disconnected { guild_id, reason } => {
            if reason == DisconnectReason::Idle {
                if let Some(channel_id) = announce_channel(channels, guild_id) {
                    let embed = embeds::create_info_embed(
                        "Desconectado por Inactividad",
                        "👋 No quedaba nadie escuchando en el canal de voz",
                    );
                    send_embed(http, channel_id, embed).await;
                }
            }
        }
    }
}

fn announce_channel(channels: &DashMap<GuildId, ChannelId>, guild_id: GuildId) -> Option<ChannelId> {
    let channel = channels.get(&guild_id).map(|c| *c);
    if channel.is_none() {
        debug!("Sin canal de anuncios para guild {}", guild_id);
    }
    channel
}

async fn send_embed(http: &Http, channel_id: ChannelId, embed: serenity::builder::CreateEmbed) {
    if let Err(e) = channel_id
        .send_message(http, CreateMessage::new().embed(embed))
        .await
    {
        error!("Error al enviar mensaje al canal {}: {:?}", channel_id, e);
    }
}

async fn disable_buttons(http: &Http, (channel_id, message_id): (ChannelId, MessageId)) {
    let edit = EditMessage::new().components(buttons::create_player_buttons(false, true));
    if let Err(e) = channel_id.edit_message(http, message_id, edit).await {
        // El mensaje pudo ser borrado; no es un error del bot
        debug!("No se pudieron desactivar botones de {}: {:?}", message_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_player_messages_replace_returns_previous() {
        let guild = GuildId::new(1);
        let channel = ChannelId::new(10);
        let mut messages = PlayerMessages::default();

        assert_eq!(messages.replace(guild, channel, MessageId::new(100)), None);
        assert_eq!(
            messages.replace(guild, channel, MessageId::new(101)),
            Some((channel, MessageId::new(100)))
        );
        assert_eq!(messages.take(guild), Some((channel, MessageId::new(101))));
        assert_eq!(messages.take(guild), None);
    }

    #[test]
    fn test_player_messages_are_per_guild() {
        let mut messages = PlayerMessages::default();
        messages.replace(GuildId::new(1), ChannelId::new(10), MessageId::new(100));
        messages.replace(GuildId::new(2), ChannelId::new(20), MessageId::new(200));

        assert_eq!(
            messages.take(GuildId::new(1)),
            Some((ChannelId::new(10), MessageId::new(100)))
        );
        assert!(messages.take(GuildId::new(2)).is_some());
    }
}

//! Songbird implementation of the voice transport.
//!
//! Audio is streamed straight from the resolved URL with
//! [`HttpRequest`]; there is no local buffering. Occupancy is read from the
//! serenity cache, which is attached once the client exists.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::{
    cache::Cache,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    error::JoinError,
    input::HttpRequest,
    tracks::{ControlError, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use super::voice::{Occupant, TrackEndNotifier, VoiceHandle, VoiceTransport};
use crate::{error::VoiceError, sources::ResolvedTrack};

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    cache: OnceLock<Arc<Cache>>,
    http: reqwest::Client,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            cache: OnceLock::new(),
            http: reqwest::Client::new(),
        }
    }

    /// Cache del cliente de serenity; debe asignarse antes de iniciar el cliente
    pub fn attach_cache(&self, cache: Arc<Cache>) {
        if self.cache.set(cache).is_err() {
            warn!("El cache de serenity ya estaba asignado");
        }
    }

    fn cache(&self) -> Result<&Arc<Cache>, VoiceError> {
        self.cache
            .get()
            .ok_or_else(|| VoiceError::Transport("cache de serenity no inicializado".into()))
    }

    /// Verifica Connect y Speak con los datos del cache.
    /// Si la guild o el miembro no están en cache, decide Discord.
    fn check_permissions(
        &self,
        cache: &Cache,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), VoiceError> {
        let bot_id = cache.current_user().id;
        let Some(guild) = cache.guild(guild_id) else {
            debug!("Guild {} fuera de cache, omitiendo verificación de permisos", guild_id);
            return Ok(());
        };

        let (Some(channel), Some(member)) = (guild.channels.get(&channel_id), guild.members.get(&bot_id))
        else {
            return Ok(());
        };

        let permissions = guild.user_permissions_in(channel, member);
        if permissions.connect() && permissions.speak() {
            Ok(())
        } else {
            Err(VoiceError::NoPermission)
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceHandle>, VoiceError> {
        let cache = self.cache()?.clone();
        self.check_permissions(&cache, guild_id, channel_id)?;

        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            warn!("Error al conectar a voz en guild {}: {:?}", guild_id, e);
            VoiceError::Transport(e.to_string())
        })?;

        info!("🔊 Conexión de voz establecida en guild {}", guild_id);

        Ok(Arc::new(SongbirdVoice {
            guild_id,
            call,
            manager: self.manager.clone(),
            cache,
            http: self.http.clone(),
            current: Mutex::new(None),
        }))
    }
}

/// Conexión de voz de una guild
pub struct SongbirdVoice {
    guild_id: GuildId,
    call: Arc<tokio::sync::Mutex<Call>>,
    manager: Arc<Songbird>,
    cache: Arc<Cache>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdVoice {
    fn with_current(
        &self,
        action: impl FnOnce(&TrackHandle) -> Result<(), ControlError>,
    ) -> Result<(), VoiceError> {
        match self.current.lock().as_ref() {
            Some(track) => action(track).or_else(ignore_finished),
            None => Ok(()),
        }
    }
}

fn ignore_finished(e: ControlError) -> Result<(), VoiceError> {
    match e {
        ControlError::Finished => Ok(()),
        e => Err(VoiceError::Transport(e.to_string())),
    }
}

#[async_trait]
impl VoiceHandle for SongbirdVoice {
    async fn play(&self, track: &ResolvedTrack, on_end: TrackEndNotifier) -> Result<(), VoiceError> {
        let input = HttpRequest::new(self.http.clone(), track.stream_url.clone());

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input.into())
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackEndHandler {
                        notifier: on_end.clone(),
                    },
                )
                .map_err(|e| VoiceError::Transport(format!("Error al agregar event handler: {}", e)))?;
        }

        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), VoiceError> {
        match self.current.lock().take() {
            Some(track) => track.stop().or_else(ignore_finished),
            None => Ok(()),
        }
    }

    async fn pause(&self) -> Result<(), VoiceError> {
        self.with_current(|track| track.pause())
    }

    async fn resume(&self) -> Result<(), VoiceError> {
        self.with_current(|track| track.play())
    }

    async fn disconnect(&self) -> Result<(), VoiceError> {
        self.current.lock().take();
        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(VoiceError::Transport(e.to_string())),
        }
    }

    async fn occupants(&self) -> Result<Vec<Occupant>, VoiceError> {
        let Some(channel) = self.call.lock().await.current_channel() else {
            return Ok(Vec::new());
        };
        let channel_id = ChannelId::from(channel.0);
        let bot_id = self.cache.current_user().id;

        let guild = self
            .cache
            .guild(self.guild_id)
            .ok_or_else(|| VoiceError::Transport(format!("guild {} fuera de cache", self.guild_id)))?;

        let occupants = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id))
            .map(|state| {
                let bot = state.user_id == bot_id
                    || state
                        .member
                        .as_ref()
                        .map(|m| m.user.bot)
                        .or_else(|| guild.members.get(&state.user_id).map(|m| m.user.bot))
                        .or_else(|| self.cache.user(state.user_id).map(|u| u.bot))
                        .unwrap_or(false);
                Occupant {
                    user_id: state.user_id,
                    bot,
                }
            })
            .collect();

        Ok(occupants)
    }
}

/// Avisa al scheduler cuando un track termina o falla
struct TrackEndHandler {
    notifier: TrackEndNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(states) = ctx {
            for (state, _) in states.iter() {
                if let songbird::tracks::PlayMode::Errored(e) = &state.playing {
                    warn!("Error de reproducción en track {}: {}", self.notifier.generation(), e);
                }
            }
        }

        self.notifier.notify();
        None
    }
}

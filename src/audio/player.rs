//! Playback scheduler: the per-guild play/continue state machine.
//!
//! Every session gets a driver task that consumes [`DriverSignal`]s one at a
//! time. Track completion comes back as a signal instead of a nested
//! callback, so `advance` never recurses and completions for a guild are
//! handled strictly in order. Command-facing operations only take the
//! session lock for bookkeeping; resolving and starting audio happen with the
//! lock released.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    queue::{NowPlaying, PlaybackRequest, QueueSnapshot, QueuedTrack},
    session::{
        ActiveTrack, DriverSignal, GuildSession, PendingResolve, PlaybackStatus, SessionStore,
    },
    voice::{same_handle, TrackEndNotifier, VoiceHandle, VoiceTransport},
};
use crate::{
    error::{PlaybackError, PlaybackResult, ResolveError, VoiceError},
    sources::{Resolver, TrackInfo},
};

const EVENT_CAPACITY: usize = 64;

/// Límites aplicados por el scheduler
#[derive(Debug, Clone, Copy)]
pub struct PlaybackPolicy {
    pub max_track_duration: Duration,
    pub resolve_timeout: Duration,
}

impl Default for PlaybackPolicy {
    fn default() -> Self {
        Self {
            max_track_duration: Duration::from_secs(300),
            resolve_timeout: Duration::from_secs(45),
        }
    }
}

/// Por qué se cerró una conexión de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Leave,
    Idle,
    Evicted,
}

/// Eventos para la capa de presentación. Entrega best-effort.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    NowPlaying {
        guild_id: GuildId,
        track: TrackInfo,
        requested_by: UserId,
    },
    TrackFailed {
        guild_id: GuildId,
        title: String,
        error: PlaybackError,
    },
    QueueDrained {
        guild_id: GuildId,
    },
    Disconnected {
        guild_id: GuildId,
        reason: DisconnectReason,
    },
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    store: SessionStore,
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn VoiceTransport>,
    events: broadcast::Sender<SessionEvent>,
    policy: PlaybackPolicy,
}

enum SkipAction {
    StopActive(Arc<dyn VoiceHandle>),
    CancelPending,
    Advance,
}

impl Scheduler {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn VoiceTransport>,
        policy: PlaybackPolicy,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(SchedulerInner {
                store: SessionStore::new(),
                resolver,
                transport,
                events,
                policy,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Sesión de la guild, creada (con su driver) si no existía
    pub fn session(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.inner.store.get_or_create(guild_id, |session, receiver| {
            tokio::spawn(self.inner.clone().drive(session.clone(), receiver));
        })
    }

    /// Sesiones conectadas a voz con su handle actual
    pub fn connected_sessions(&self) -> Vec<(GuildId, Arc<dyn VoiceHandle>)> {
        self.inner.store.connected()
    }

    pub fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        self.session(guild_id).snapshot()
    }

    /// Conecta la sesión a un canal de voz
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> PlaybackResult<()> {
        let session = self.session(guild_id);
        if session.is_connected() {
            return Err(VoiceError::AlreadyConnected.into());
        }

        let voice = self.inner.transport.connect(guild_id, channel_id).await?;

        let mut state = session.lock();
        if state.voice.is_some() {
            // Otro join ganó la carrera; su handle es el válido
            return Err(VoiceError::AlreadyConnected.into());
        }
        state.voice = Some(voice);
        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    /// Agrega al final de la cola. Si la sesión estaba en Idle dispara
    /// `advance` sin esperar. Devuelve la posición (1-based) en la cola.
    pub fn enqueue(&self, guild_id: GuildId, request: PlaybackRequest) -> PlaybackResult<usize> {
        let session = self.session(guild_id);

        let (position, start) = {
            let mut state = session.lock();
            if state.voice.is_none() {
                return Err(VoiceError::NotConnected.into());
            }

            info!("➕ Agregado a la cola en guild {}: {}", guild_id, request.display_title());
            state.queue.push_back(request);

            let start = state.status == PlaybackStatus::Idle;
            if start {
                state.status = PlaybackStatus::Playing;
            }
            (state.queue.len(), start)
        };

        if start {
            session.signal(DriverSignal::Advance);
        }

        Ok(position)
    }

    /// Flujo completo de `/play`: sondea, valida duración, conecta si hace
    /// falta y encola.
    pub async fn play(
        &self,
        guild_id: GuildId,
        requester_channel: Option<ChannelId>,
        query: &str,
        requested_by: UserId,
    ) -> PlaybackResult<QueuedTrack> {
        let timeout = self.inner.policy.resolve_timeout;
        let info = tokio::time::timeout(timeout, self.inner.resolver.probe(query))
            .await
            .map_err(|_| ResolveError::Timeout(timeout))??;

        self.check_duration(&info)?;

        if !self.session(guild_id).is_connected() {
            let channel_id = requester_channel.ok_or(PlaybackError::NotInVoiceChannel)?;
            match self.join(guild_id, channel_id).await {
                Ok(()) | Err(PlaybackError::Voice(VoiceError::AlreadyConnected)) => {}
                Err(e) => return Err(e),
            }
        }

        let position = self.enqueue(guild_id, PlaybackRequest::from_track(query, &info, requested_by))?;

        Ok(QueuedTrack {
            info,
            requested_by,
            position,
        })
    }

    /// Rechaza tracks por encima del límite. Sin duración (directos) pasa.
    pub fn check_duration(&self, info: &TrackInfo) -> PlaybackResult<()> {
        let limit = self.inner.policy.max_track_duration;
        match info.duration {
            Some(duration) if duration > limit => {
                debug!("⛔ {} excede el límite ({}s)", info.title, duration.as_secs());
                Err(PlaybackError::TrackTooLong { duration, limit })
            }
            _ => Ok(()),
        }
    }

    /// Salta el track actual. Devuelve cuántas quedan en cola.
    pub async fn skip(&self, guild_id: GuildId) -> PlaybackResult<usize> {
        let session = self.session(guild_id);

        let (action, remaining) = {
            let mut state = session.lock();
            let action = match (&state.active, &state.pending, &state.voice) {
                (Some(_), _, Some(voice)) => SkipAction::StopActive(voice.clone()),
                (_, Some(pending), _) => {
                    pending.cancel.cancel();
                    SkipAction::CancelPending
                }
                _ if !state.queue.is_empty() => SkipAction::Advance,
                _ => return Err(PlaybackError::NothingPlaying),
            };
            if let SkipAction::StopActive(_) = action {
                // Invalida el track aunque su audio aún no haya arrancado
                state.interrupt();
            }
            (action, state.queue.len())
        };

        match action {
            SkipAction::StopActive(voice) => {
                info!("⏭️ Saltando track en guild {}", guild_id);
                if let Err(e) = voice.stop().await {
                    warn!("Error al detener track en guild {}: {:?}", guild_id, e);
                }
                session.signal(DriverSignal::Advance);
            }
            SkipAction::CancelPending => {
                info!("⏭️ Cancelando resolución en curso en guild {}", guild_id);
            }
            SkipAction::Advance => session.signal(DriverSignal::Advance),
        }

        Ok(remaining)
    }

    /// Vacía la cola y corta el audio. La conexión de voz se mantiene.
    pub async fn stop(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self.session(guild_id);

        let (voice, had_track, was_playing) = {
            let mut state = session.lock();
            state.queue.clear();
            let had_track = state.interrupt();
            let was_playing = state.status == PlaybackStatus::Playing;
            state.status = PlaybackStatus::Idle;
            (state.voice.clone(), had_track, was_playing)
        };

        if had_track {
            if let Some(voice) = voice {
                if let Err(e) = voice.stop().await {
                    warn!("Error al detener track en guild {}: {:?}", guild_id, e);
                }
            }
        }

        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        if was_playing {
            self.inner.emit(SessionEvent::QueueDrained { guild_id });
        }
        Ok(())
    }

    /// Vacía la cola, corta el audio y desconecta
    pub async fn leave(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self.session(guild_id);
        let voice = session.voice().ok_or(VoiceError::NotConnected)?;
        self.inner.teardown(&session, &voice, DisconnectReason::Leave).await;
        Ok(())
    }

    /// Limpieza del reaper: solo actúa si `voice` sigue siendo el handle de
    /// la sesión. Devuelve si hubo desconexión.
    pub async fn reap(&self, guild_id: GuildId, voice: &Arc<dyn VoiceHandle>) -> bool {
        let session = self.session(guild_id);
        self.inner.teardown(&session, voice, DisconnectReason::Idle).await
    }

    /// El bot fue sacado del canal desde fuera; se resetea la sesión
    pub async fn evicted(&self, guild_id: GuildId) {
        let Some(session) = self.inner.store.get(guild_id) else {
            return;
        };
        if let Some(voice) = session.voice() {
            self.inner.teardown(&session, &voice, DisconnectReason::Evicted).await;
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.set_paused(guild_id, true).await
    }

    pub async fn resume(&self, guild_id: GuildId) -> PlaybackResult<()> {
        self.set_paused(guild_id, false).await
    }

    /// Alterna pausa. Devuelve `true` si quedó en pausa.
    pub async fn toggle_pause(&self, guild_id: GuildId) -> PlaybackResult<bool> {
        let paused = self
            .session(guild_id)
            .lock()
            .active
            .as_ref()
            .map(|a| a.now_playing.paused)
            .ok_or(PlaybackError::NothingPlaying)?;

        self.set_paused(guild_id, !paused).await?;
        Ok(!paused)
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> PlaybackResult<()> {
        let session = self.session(guild_id);

        let (voice, generation) = {
            let state = session.lock();
            let (Some(voice), Some(active)) = (state.voice.clone(), state.active.as_ref()) else {
                return Err(PlaybackError::NothingPlaying);
            };
            (voice, active.generation)
        };

        if paused {
            voice.pause().await?;
            info!("⏸️ Reproducción pausada en guild {}", guild_id);
        } else {
            voice.resume().await?;
            info!("▶️ Reproducción reanudada en guild {}", guild_id);
        }

        // Solo si el track sigue siendo el mismo que se pausó
        let mut state = session.lock();
        if let Some(active) = state.active.as_mut().filter(|a| a.generation == generation) {
            active.now_playing.paused = paused;
        }
        Ok(())
    }
}

impl SchedulerInner {
    fn emit(&self, event: SessionEvent) {
        // Sin suscriptores no hay a quién avisar
        let _ = self.events.send(event);
    }

    /// Bucle del driver: una señal a la vez por sesión
    async fn drive(
        self: Arc<Self>,
        session: Arc<GuildSession>,
        mut signals: mpsc::UnboundedReceiver<DriverSignal>,
    ) {
        let guild_id = session.guild_id();
        debug!("🚦 Driver iniciado para guild {}", guild_id);

        while let Some(signal) = signals.recv().await {
            let proceed = {
                let mut state = session.lock();
                let proceed = match signal {
                    DriverSignal::Advance => state.active.is_none(),
                    DriverSignal::TrackEnded { generation } => {
                        let current = state.active.as_ref().map(|a| a.generation);
                        if current == Some(generation) {
                            state.active = None;
                            true
                        } else {
                            false
                        }
                    }
                };
                proceed
            };

            if proceed {
                self.advance(&session).await;
            } else {
                debug!("Señal {:?} ignorada en guild {}", signal, guild_id);
            }
        }

        debug!("Driver finalizado para guild {}", guild_id);
    }

    /// Saca el siguiente pedido y lo pone a sonar. Los fallos de resolución o
    /// de salida pasan al siguiente sin salir del bucle.
    async fn advance(&self, session: &GuildSession) {
        let guild_id = session.guild_id();

        loop {
            let (request, generation, cancel, voice) = {
                let mut state = session.lock();

                let voice = match (state.queue.is_empty(), state.voice.clone()) {
                    (false, Some(voice)) => voice,
                    (empty, voice) => {
                        if !empty && voice.is_none() {
                            warn!("Cola sin conexión de voz en guild {}, descartando", guild_id);
                            state.queue.clear();
                        }
                        let was_playing = state.status == PlaybackStatus::Playing;
                        state.status = PlaybackStatus::Idle;
                        state.pending = None;
                        drop(state);

                        if was_playing {
                            info!("📭 Cola vacía en guild {}", guild_id);
                            self.emit(SessionEvent::QueueDrained { guild_id });
                        }
                        return;
                    }
                };

                let Some(request) = state.queue.pop_front() else {
                    return;
                };
                state.generation += 1;
                let generation = state.generation;
                let cancel = CancellationToken::new();
                state.pending = Some(PendingResolve {
                    generation,
                    cancel: cancel.clone(),
                });
                state.status = PlaybackStatus::Playing;
                (request, generation, cancel, voice)
            };

            debug!("➡️ Siguiente en cola (FIFO) en guild {}: {}", guild_id, request.display_title());

            let timeout = self.policy.resolve_timeout;
            let resolved = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Resolución cancelada en guild {}", guild_id);
                    continue;
                }
                result = tokio::time::timeout(timeout, self.resolver.resolve(request.query())) => {
                    result.unwrap_or(Err(ResolveError::Timeout(timeout)))
                }
            };

            let track = match resolved {
                Ok(track) => track,
                Err(e) => {
                    warn!("❌ No se pudo resolver {} en guild {}: {}", request.display_title(), guild_id, e);
                    self.clear_pending(session, generation);
                    self.emit(SessionEvent::TrackFailed {
                        guild_id,
                        title: request.display_title().to_string(),
                        error: e.into(),
                    });
                    continue;
                }
            };

            {
                let mut state = session.lock();
                if state.generation != generation || cancel.is_cancelled() {
                    debug!("Track {} invalidado antes de sonar en guild {}", generation, guild_id);
                    continue;
                }
                state.pending = None;
                state.active = Some(ActiveTrack {
                    generation,
                    now_playing: NowPlaying {
                        info: track.info.clone(),
                        requested_by: request.requested_by(),
                        paused: false,
                    },
                });
            }

            let notifier = TrackEndNotifier::new(guild_id, generation, session.signals());
            if let Err(e) = voice.play(&track, notifier).await {
                error!("❌ Error al iniciar audio en guild {}: {}", guild_id, e);
                {
                    let mut state = session.lock();
                    if state.active.as_ref().is_some_and(|a| a.generation == generation) {
                        state.active = None;
                    }
                }
                self.emit(SessionEvent::TrackFailed {
                    guild_id,
                    title: track.info.title.clone(),
                    error: e.into(),
                });
                continue;
            }

            // Stop/leave pudo correr mientras arrancaba el audio
            let superseded = session
                .lock()
                .active
                .as_ref()
                .map_or(true, |a| a.generation != generation);
            if superseded {
                debug!("Track {} reemplazado durante el arranque en guild {}", generation, guild_id);
                if let Err(e) = voice.stop().await {
                    debug!("stop tras reemplazo falló en guild {}: {:?}", guild_id, e);
                }
                continue;
            }

            info!("🎵 Reproduciendo en guild {}: {}", guild_id, track.info.title);
            self.emit(SessionEvent::NowPlaying {
                guild_id,
                track: track.info,
                requested_by: request.requested_by(),
            });
            return;
        }
    }

    fn clear_pending(&self, session: &GuildSession, generation: u64) {
        let mut state = session.lock();
        if state.pending.as_ref().is_some_and(|p| p.generation == generation) {
            state.pending = None;
        }
    }

    /// Vacía, corta y desconecta si `expected` sigue siendo el handle actual
    async fn teardown(
        &self,
        session: &GuildSession,
        expected: &Arc<dyn VoiceHandle>,
        reason: DisconnectReason,
    ) -> bool {
        let guild_id = session.guild_id();

        let (voice, had_track) = {
            let mut state = session.lock();
            match &state.voice {
                Some(current) if same_handle(current, expected) => {}
                _ => return false,
            }
            state.queue.clear();
            let had_track = state.interrupt();
            state.status = PlaybackStatus::Idle;
            (state.voice.take(), had_track)
        };

        if let Some(voice) = voice {
            if had_track {
                if let Err(e) = voice.stop().await {
                    debug!("stop previo a desconectar falló en guild {}: {:?}", guild_id, e);
                }
            }
            if reason != DisconnectReason::Evicted {
                if let Err(e) = voice.disconnect().await {
                    warn!("Error al desconectar en guild {}: {:?}", guild_id, e);
                }
            }
        }

        info!("👋 Desconectado en guild {} ({:?})", guild_id, reason);
        self.emit(SessionEvent::QueueDrained { guild_id });
        self.emit(SessionEvent::Disconnected { guild_id, reason });
        true
    }
}

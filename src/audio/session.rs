use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::{Mutex, MutexGuard};
use serenity::model::id::GuildId;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    queue::{NowPlaying, PlaybackRequest, QueueSnapshot},
    voice::VoiceHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
}

/// Mensajes que consume el driver de cada sesión, en orden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverSignal {
    /// Arrancar la cola si no hay track activo
    Advance,
    /// Terminó el track con esta generación
    TrackEnded { generation: u64 },
}

pub(crate) struct ActiveTrack {
    pub generation: u64,
    pub now_playing: NowPlaying,
}

/// Resolución en curso, cancelable por skip/stop/leave
pub(crate) struct PendingResolve {
    pub generation: u64,
    pub cancel: CancellationToken,
}

/// Estado mutable de una guild. Solo se toca con el lock de la sesión.
#[derive(Default)]
pub struct SessionState {
    pub(crate) queue: VecDeque<PlaybackRequest>,
    pub(crate) status: PlaybackStatus,
    pub(crate) voice: Option<Arc<dyn VoiceHandle>>,
    pub(crate) active: Option<ActiveTrack>,
    pub(crate) pending: Option<PendingResolve>,
    /// Crece con cada track iniciado o invalidado
    pub(crate) generation: u64,
}

impl SessionState {
    /// Invalida el track activo y cualquier resolución en curso
    pub(crate) fn interrupt(&mut self) -> bool {
        self.generation += 1;
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
        }
        self.active.take().is_some()
    }

    pub(crate) fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            status: self.status,
            now_playing: self.active.as_ref().map(|a| a.now_playing.clone()),
            pending: self.queue.iter().cloned().collect(),
            connected: self.voice.is_some(),
        }
    }
}

/// Sesión de reproducción de una guild
pub struct GuildSession {
    guild_id: GuildId,
    state: Mutex<SessionState>,
    signals: mpsc::UnboundedSender<DriverSignal>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId) -> (Self, mpsc::UnboundedReceiver<DriverSignal>) {
        let (signals, receiver) = mpsc::unbounded_channel();
        let session = Self {
            guild_id,
            state: Mutex::new(SessionState::default()),
            signals,
        };
        (session, receiver)
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Nunca mantener el guard a través de un `.await`
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    pub(crate) fn signals(&self) -> mpsc::UnboundedSender<DriverSignal> {
        self.signals.clone()
    }

    pub(crate) fn signal(&self, signal: DriverSignal) {
        if self.signals.send(signal).is_err() {
            debug!("Driver de guild {} no disponible", self.guild_id);
        }
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.lock().status
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().voice.is_some()
    }

    pub fn voice(&self) -> Option<Arc<dyn VoiceHandle>> {
        self.state.lock().voice.clone()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.state.lock().snapshot()
    }
}

/// Mapa guild → sesión. Cada sesión tiene su propio lock; el mapa solo se
/// bloquea por shard durante la inserción.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devuelve la sesión existente o crea una nueva en Idle.
    /// `on_create` recibe el receptor de señales de la sesión recién creada.
    pub fn get_or_create<F>(&self, guild_id: GuildId, on_create: F) -> Arc<GuildSession>
    where
        F: FnOnce(&Arc<GuildSession>, mpsc::UnboundedReceiver<DriverSignal>),
    {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let (session, receiver) = GuildSession::new(guild_id);
                let session = Arc::new(session);
                debug!("🆕 Sesión creada para guild {}", guild_id);
                on_create(&session, receiver);
                entry.insert(session.clone());
                session
            }
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Sesiones con conexión de voz, junto con su handle actual
    pub fn connected(&self) -> Vec<(GuildId, Arc<dyn VoiceHandle>)> {
        self.sessions
            .iter()
            .filter_map(|entry| entry.value().voice().map(|voice| (*entry.key(), voice)))
            .collect()
    }
}

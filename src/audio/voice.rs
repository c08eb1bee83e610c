//! Voice transport contract used by the scheduler.
//!
//! The scheduler never talks to songbird directly: it owns an
//! `Arc<dyn VoiceHandle>` per guild and reports track completion through a
//! [`TrackEndNotifier`]. See [`super::songbird_voice`] for the Discord
//! implementation.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use super::session::DriverSignal;
use crate::{error::VoiceError, sources::ResolvedTrack};

/// Usuario presente en el canal de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub user_id: UserId,
    pub bot: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Conecta al canal. El handle devuelto pasa a ser propiedad de la sesión.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceHandle>, VoiceError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceHandle: Send + Sync {
    /// Reemplaza cualquier track activo. `on_end` se dispara al terminar,
    /// al fallar o al ser detenido.
    async fn play(&self, track: &ResolvedTrack, on_end: TrackEndNotifier) -> Result<(), VoiceError>;

    async fn stop(&self) -> Result<(), VoiceError>;

    async fn pause(&self) -> Result<(), VoiceError>;

    async fn resume(&self) -> Result<(), VoiceError>;

    async fn disconnect(&self) -> Result<(), VoiceError>;

    /// Usuarios en el canal actual, bots incluidos
    async fn occupants(&self) -> Result<Vec<Occupant>, VoiceError>;
}

/// Señal de fin de track de vuelta al driver de la sesión.
///
/// Lleva la generación del track; el driver descarta las que no
/// correspondan al track activo, así que notificar dos veces es inocuo.
#[derive(Debug, Clone)]
pub struct TrackEndNotifier {
    guild_id: GuildId,
    generation: u64,
    signals: mpsc::UnboundedSender<DriverSignal>,
}

impl TrackEndNotifier {
    pub(crate) fn new(
        guild_id: GuildId,
        generation: u64,
        signals: mpsc::UnboundedSender<DriverSignal>,
    ) -> Self {
        Self {
            guild_id,
            generation,
            signals,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self) {
        trace!("🔔 Fin de track {} en guild {}", self.generation, self.guild_id);
        // El receptor solo desaparece si el driver terminó
        let _ = self.signals.send(DriverSignal::TrackEnded {
            generation: self.generation,
        });
    }
}

/// Compara dos handles por identidad
pub(crate) fn same_handle(a: &Arc<dyn VoiceHandle>, b: &Arc<dyn VoiceHandle>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Cuenta ocupantes humanos
pub fn human_occupants(occupants: &[Occupant]) -> usize {
    occupants.iter().filter(|o| !o.bot).count()
}

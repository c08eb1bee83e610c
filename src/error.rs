//! Error taxonomy shared by the scheduler and its collaborators.
//!
//! Only [`PlaybackError`] reaches the command surface. Resolver and voice
//! failures are wrapped into it when an operation has to report them.

use std::time::Duration;
use thiserror::Error;

/// Fallos al convertir una petición en un stream reproducible
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no se encontraron resultados para `{0}`")]
    NotFound(String),

    #[error("la resolución superó el tiempo límite de {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("fuente no soportada: {0}")]
    Unsupported(String),

    #[error("error del resolver: {0}")]
    Failed(String),
}

/// Fallos del transporte de voz
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("sin permisos para conectar o hablar en el canal de voz")]
    NoPermission,

    #[error("ya hay una conexión de voz activa en este servidor")]
    AlreadyConnected,

    #[error("no hay conexión de voz")]
    NotConnected,

    #[error("error de voz: {0}")]
    Transport(String),
}

/// Errores que ve quien invoca una operación del scheduler
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("no hay nada reproduciéndose")]
    NothingPlaying,

    #[error("la canción dura {}s y el máximo es {}s", .duration.as_secs(), .limit.as_secs())]
    TrackTooLong { duration: Duration, limit: Duration },

    #[error("debes estar en un canal de voz")]
    NotInVoiceChannel,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

pub type PlaybackResult<T> = std::result::Result<T, PlaybackError>;

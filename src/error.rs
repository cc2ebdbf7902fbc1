use serenity::model::id::GuildId;
use thiserror::Error;

/// Errores de las operaciones de música.
///
/// Todos salvo [`MusicError::UnknownGuild`] son recuperables: el handler del
/// comando los convierte en una única respuesta corta para el usuario.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusicError {
    /// The guild was never initialized in the state store.
    #[error("guild {0} is not initialized")]
    UnknownGuild(GuildId),

    /// The invoking user is not in a voice channel.
    #[error("user is not in a voice channel")]
    InvalidClient,

    /// Connecting or moving to the voice channel failed.
    #[error("failed to join voice channel: {0}")]
    JoinError(String),

    /// No track could be resolved from the query.
    #[error("no tracks resolved ({errors} errors)")]
    ResolutionFailed { errors: usize },

    #[error("cannot skip {requested} tracks (max {max})")]
    InvalidSkipCount { requested: usize, max: usize },

    #[error("index {index} is out of range (queue has {len} tracks)")]
    InvalidIndex { index: usize, len: usize },

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("nothing is playing")]
    NothingPlaying,

    #[error("queue is empty")]
    QueueEmpty,

    #[error("queue is full (max {max} tracks)")]
    QueueFull { max: usize },

    /// The player rejected a command.
    #[error("player error: {0}")]
    Player(String),
}

impl MusicError {
    /// Un guild desconocido indica una inicialización perdida, no un error del usuario.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MusicError::UnknownGuild(_))
    }
}

pub type MusicResult<T> = Result<T, MusicError>;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{audio::track::Track, error::MusicError};

/// Identificador de la conexión de voz de un guild.
///
/// Cambia con cada conexión nueva y con cada desconexión, de modo que las
/// señales de fin de track de una conexión anterior se reconocen como obsoletas.
pub type SessionId = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("cannot create input: {0}")]
    Input(String),

    #[error("track command failed: {0}")]
    Track(String),
}

impl From<PlayerError> for MusicError {
    fn from(err: PlayerError) -> Self {
        match err {
            PlayerError::Connect(msg) => MusicError::JoinError(msg),
            other => MusicError::Player(other.to_string()),
        }
    }
}

/// Aviso de que el track de una sesión terminó.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEnd {
    pub guild_id: GuildId,
    pub session: SessionId,
}

/// Señal de finalización que el player dispara cuando el track termina o se detiene.
///
/// Se entrega por canal al coordinador, que la descarta si la sesión ya no
/// coincide con la actual del guild.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    end: TrackEnd,
    tx: mpsc::UnboundedSender<TrackEnd>,
}

impl CompletionSignal {
    pub fn new(guild_id: GuildId, session: SessionId, tx: mpsc::UnboundedSender<TrackEnd>) -> Self {
        Self {
            end: TrackEnd { guild_id, session },
            tx,
        }
    }

    pub fn session(&self) -> SessionId {
        self.end.session
    }

    pub fn fire(&self) {
        if self.tx.send(self.end).is_err() {
            debug!("Coordinador cerrado, fin de track ignorado en guild {}", self.end.guild_id);
        }
    }
}

/// Controlador opaco de una sesión de salida de audio.
///
/// `stop` no invoca la señal de forma síncrona: el fin de track llega más
/// tarde por el canal del coordinador.
#[async_trait]
pub trait PlayerHandle: Send + Sync {
    async fn play(&self, track: &Track, on_complete: CompletionSignal) -> Result<(), PlayerError>;

    async fn pause(&self) -> Result<(), PlayerError>;

    async fn resume(&self) -> Result<(), PlayerError>;

    async fn stop(&self) -> Result<(), PlayerError>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    /// Mueve la conexión existente a otro canal del mismo guild.
    async fn move_to(&self, channel_id: ChannelId) -> Result<(), PlayerError>;

    async fn disconnect(&self);

    /// Descarta un handle que perdió la carrera por instalarse en el guild.
    ///
    /// Libera lo que es propio del handle sin cerrar una conexión de voz que
    /// comparta con el handle instalado.
    async fn release(&self);
}

/// Crea conexiones de voz.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn PlayerHandle>, PlayerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_delivers_tagged_end() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let signal = CompletionSignal::new(GuildId::new(7), 3, tx);
        signal.fire();

        let end = rx.try_recv().unwrap();
        assert_eq!(end, TrackEnd { guild_id: GuildId::new(7), session: 3 });
    }

    #[test]
    fn connect_errors_map_to_join_error() {
        let err: MusicError = PlayerError::Connect("timeout".into()).into();
        assert_eq!(err, MusicError::JoinError("timeout".into()));
    }
}

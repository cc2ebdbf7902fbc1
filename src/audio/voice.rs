use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{ControlError, PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audio::{
    player::{CompletionSignal, PlayerError, PlayerHandle, VoiceConnector},
    track::Track,
};

/// Conecta guilds a canales de voz usando Songbird.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, volume: f32) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            volume,
        }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn PlayerHandle>, PlayerError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::Connect(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            if handler.is_deaf() {
                debug!("Ya ensordecido en guild {}", guild_id);
            } else if let Err(e) = handler.deafen(true).await {
                warn!("No se pudo ensordecer en guild {}: {:?}", guild_id, e);
            }
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(SongbirdPlayer {
            guild_id,
            manager: self.manager.clone(),
            call,
            http: self.http.clone(),
            volume: self.volume,
            current: Mutex::new(None),
        }))
    }
}

/// Player sobre un `Call` de Songbird; reproduce un track a la vez.
pub struct SongbirdPlayer {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdPlayer {
    fn current_handle(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }

    async fn play_mode(&self) -> Option<PlayMode> {
        let handle = self.current_handle()?;
        // Un handle de un track terminado devuelve error
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

#[async_trait]
impl PlayerHandle for SongbirdPlayer {
    async fn play(&self, track: &Track, on_complete: CompletionSignal) -> Result<(), PlayerError> {
        let uri = track
            .source_uri()
            .ok_or_else(|| PlayerError::Input(format!("{} has no stream url", track.display_title())))?;

        let input: Input = HttpRequest::new(self.http.clone(), uri.to_string()).into();

        let track_handle = {
            let mut handler = self.call.lock().await;
            handler.play_input(input)
        };

        let _ = track_handle.set_volume(self.volume);

        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = track_handle.add_event(
                Event::Track(event),
                TrackEndNotifier {
                    signal: on_complete.clone(),
                },
            ) {
                let _ = track_handle.stop();
                return Err(PlayerError::Track(e.to_string()));
            }
        }

        *self.current.lock() = Some(track_handle);

        debug!("▶️ Track iniciado en guild {}: {}", self.guild_id, track.display_title());
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        match self.current_handle() {
            Some(handle) => handle.pause().map_err(|e| PlayerError::Track(e.to_string())),
            None => Ok(()),
        }
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        match self.current_handle() {
            Some(handle) => handle.play().map_err(|e| PlayerError::Track(e.to_string())),
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        match self.current_handle() {
            // Un track que terminó solo ya no admite comandos
            Some(handle) => match handle.stop() {
                Ok(()) | Err(ControlError::Finished) => Ok(()),
                Err(e) => Err(PlayerError::Track(e.to_string())),
            },
            None => Ok(()),
        }
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), PlayerError> {
        // Songbird mueve la llamada existente si el guild ya está conectado
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| PlayerError::Connect(e.to_string()))
    }

    async fn disconnect(&self) {
        if let Some(handle) = self.current.lock().take() {
            let _ = handle.stop();
        }

        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("Error al salir del canal de voz en guild {}: {:?}", self.guild_id, e);
        }

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
    }

    async fn release(&self) {
        // El `Call` es del guild y lo sigue usando el handle instalado
        if let Some(handle) = self.current.lock().take() {
            let _ = handle.stop();
        }
        debug!("Handle de voz descartado en guild {}", self.guild_id);
    }
}

/// Dispara la señal de finalización cuando Songbird termina el track
struct TrackEndNotifier {
    signal: CompletionSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("🎵 Track terminado (sesión {})", self.signal.session());
        self.signal.fire();
        None
    }
}

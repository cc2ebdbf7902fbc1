//! Dobles de prueba para el player y el conector de voz.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::{
        coordinator::PlaybackCoordinator,
        player::{CompletionSignal, PlayerError, PlayerHandle, VoiceConnector},
        queue::QueueInfo,
        track::Track,
    },
    sources::{MockTrackResolver, ResolveError, Resolved},
};

pub fn track(title: &str) -> Track {
    Track::new(
        Some(format!("https://cdn.test/{title}")),
        Some(title.to_string()),
        Some(title.to_lowercase()),
    )
}

/// Resolver simulado: cada consulta devuelve sus títulos (separados por comas) en orden
pub fn resolver_with(catalog: &[(&str, &str)]) -> MockTrackResolver {
    let catalog: Vec<(String, Vec<Track>)> = catalog
        .iter()
        .map(|(query, titles)| (query.to_string(), titles.split(',').map(track).collect()))
        .collect();

    let mut resolver = MockTrackResolver::new();
    resolver.expect_resolve().returning(move |query| {
        catalog
            .iter()
            .find(|(q, _)| q == query)
            .map(|(_, tracks)| Resolved {
                tracks: tracks.clone(),
                error_count: 0,
            })
            .ok_or_else(|| ResolveError::Extractor(format!("no results for {query}")))
    });
    resolver
}

/// Espera a que el estado del guild cumpla `check` (las señales se procesan en otra tarea)
pub async fn wait_until(
    coordinator: &PlaybackCoordinator,
    guild_id: GuildId,
    check: impl Fn(&QueueInfo) -> bool,
) -> QueueInfo {
    for _ in 0..200 {
        let info = coordinator.queue_info(guild_id).await.unwrap();
        if check(&info) {
            return info;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("guild {guild_id} never reached the expected state");
}

#[derive(Default)]
struct FakeState {
    active: Option<(Track, CompletionSignal)>,
    paused: bool,
    played: Vec<Track>,
    failing: Vec<String>,
    channel: Option<ChannelId>,
    disconnected: bool,
    stop_fails: bool,
}

/// Player en memoria. `stop` y `disconnect` disparan la señal del track activo,
/// igual que el evento de fin de track de songbird.
#[derive(Default)]
pub struct FakePlayer {
    state: Mutex<FakeState>,
}

impl FakePlayer {
    /// Simula que el track actual terminó de sonar
    pub fn finish(&self) {
        let active = self.state.lock().active.take();
        if let Some((_, signal)) = active {
            signal.fire();
        }
    }

    pub fn fail_on(&self, title: &str) {
        self.state.lock().failing.push(title.to_string());
    }

    /// A partir de ahora `stop` falla como un track que Songbird ya descartó
    pub fn fail_stop(&self) {
        self.state.lock().stop_fails = true;
    }

    pub fn current_signal(&self) -> Option<CompletionSignal> {
        self.state.lock().active.as_ref().map(|(_, signal)| signal.clone())
    }

    pub fn played_titles(&self) -> Vec<String> {
        self.state
            .lock()
            .played
            .iter()
            .map(|t| t.display_title().to_string())
            .collect()
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.state.lock().channel
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }

    fn end_active(&self) {
        let active = {
            let mut state = self.state.lock();
            state.paused = false;
            state.active.take()
        };
        if let Some((_, signal)) = active {
            signal.fire();
        }
    }
}

#[async_trait]
impl PlayerHandle for FakePlayer {
    async fn play(&self, track: &Track, on_complete: CompletionSignal) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if state.failing.iter().any(|t| t == track.display_title()) {
            return Err(PlayerError::Input(format!("unplayable: {}", track.display_title())));
        }
        state.paused = false;
        state.played.push(track.clone());
        state.active = Some((track.clone(), on_complete));
        Ok(())
    }

    async fn pause(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if state.active.is_some() {
            state.paused = true;
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), PlayerError> {
        self.state.lock().paused = false;
        Ok(())
    }

    async fn stop(&self) -> Result<(), PlayerError> {
        if self.state.lock().stop_fails {
            return Err(PlayerError::Track("track already finished".into()));
        }
        self.end_active();
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.active.is_some() && !state.paused
    }

    async fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.active.is_some() && state.paused
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), PlayerError> {
        self.state.lock().channel = Some(channel_id);
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.lock().disconnected = true;
        self.end_active();
    }

    async fn release(&self) {
        // Cada FakePlayer es una conexión propia
        self.state.lock().disconnected = true;
    }
}

/// Conector que crea un [`FakePlayer`] por conexión y los guarda en orden.
#[derive(Default)]
pub struct FakeConnector {
    players: Mutex<Vec<Arc<FakePlayer>>>,
    fail_next: AtomicBool,
}

impl FakeConnector {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn player(&self, index: usize) -> Arc<FakePlayer> {
        self.players.lock()[index].clone()
    }

    pub fn connections(&self) -> usize {
        self.players.lock().len()
    }
}

#[async_trait]
impl VoiceConnector for FakeConnector {
    async fn connect(
        &self,
        _guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn PlayerHandle>, PlayerError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PlayerError::Connect("voice gateway timed out".into()));
        }
        // El handshake de voz cede el turno, como una conexión real
        tokio::task::yield_now().await;

        let player = Arc::new(FakePlayer::default());
        player.state.lock().channel = Some(channel_id);
        self.players.lock().push(player.clone());

        let handle: Arc<dyn PlayerHandle> = player;
        Ok(handle)
    }
}

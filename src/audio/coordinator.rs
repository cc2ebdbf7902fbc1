use serenity::model::id::{ChannelId, GuildId};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        player::{CompletionSignal, PlayerHandle, SessionId, TrackEnd, VoiceConnector},
        queue::{QueueInfo, QueuePosition},
        store::GuildStore,
        track::Track,
    },
    error::{MusicError, MusicResult},
    sources::{Resolved, TrackResolver},
};

/// Resultado de `join`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Connected(ChannelId),
    /// La conexión existente se movió a otro canal
    Moved(ChannelId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueOutcome {
    pub added: Vec<Track>,
    /// Entradas que el resolver no pudo convertir
    pub error_count: usize,
    /// Tracks resueltos que no cupieron en la cola
    pub dropped: usize,
    pub position: QueuePosition,
}

/// Resultado de un paso de avance de la cola
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    /// Empezó un track nuevo; `failed` cuenta los que no se pudieron iniciar antes
    Started { track: Track, failed: usize },
    /// Ya había un track activo (sonando o en pausa)
    AlreadyPlaying,
    QueueEmpty { failed: usize },
}

/// Resultado del comando compuesto `play`
#[derive(Debug, Clone, PartialEq)]
pub struct PlayReport {
    pub resumed: bool,
    pub enqueued: Option<EnqueueOutcome>,
    pub playback: PlayOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipOutcome {
    pub skipped: usize,
    pub stopped: bool,
}

/// Transiciones disparadas por el fin de un track, para anunciarlas en el chat
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    NowPlaying { guild_id: GuildId, track: Track },
    QueueFinished { guild_id: GuildId },
}

impl PlaybackEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            PlaybackEvent::NowPlaying { guild_id, .. } | PlaybackEvent::QueueFinished { guild_id } => *guild_id,
        }
    }
}

/// Máquina de estados de reproducción por guild.
///
/// Cada operación se ejecuta como una única llamada a [`GuildStore::mutate`],
/// de modo que los comandos del usuario y las señales de fin de track del
/// player nunca intercalan sus lecturas y escrituras sobre el mismo guild.
/// La resolución de tracks y la conexión de voz ocurren fuera del lock.
pub struct PlaybackCoordinator {
    store: Arc<GuildStore>,
    resolver: Arc<dyn TrackResolver>,
    connector: Arc<dyn VoiceConnector>,
    completions: mpsc::UnboundedSender<TrackEnd>,
    events: broadcast::Sender<PlaybackEvent>,
    max_queue_size: usize,
}

impl PlaybackCoordinator {
    /// Crea el coordinador y lanza la tarea que recibe los fines de track.
    ///
    /// Debe llamarse dentro de un runtime de Tokio.
    pub fn new(
        store: Arc<GuildStore>,
        resolver: Arc<dyn TrackResolver>,
        connector: Arc<dyn VoiceConnector>,
        max_queue_size: usize,
    ) -> Arc<Self> {
        let (completions, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);

        let coordinator = Arc::new(Self {
            store,
            resolver,
            connector,
            completions,
            events,
            max_queue_size,
        });

        tokio::spawn(completion_loop(Arc::downgrade(&coordinator), rx));
        coordinator
    }

    pub fn store(&self) -> &GuildStore {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn initialize(&self, guild_id: GuildId) {
        self.store.initialize(guild_id);
    }

    /// Conecta al canal del usuario, o mueve la conexión existente.
    pub async fn join(&self, guild_id: GuildId, channel: Option<ChannelId>) -> MusicResult<JoinOutcome> {
        let channel_id = channel.ok_or(MusicError::InvalidClient)?;

        let existing = self
            .store
            .mutate(guild_id, |queue| Box::pin(async move { Ok(queue.connection()) }))
            .await?;

        if let Some(player) = existing {
            // Una sola conexión por guild: se mueve en lugar de crear otra
            let was_playing = player.is_playing().await;
            if was_playing {
                player.pause().await?;
            }
            player.move_to(channel_id).await?;
            if was_playing {
                player.resume().await?;
            }

            info!("🔀 Conexión movida al canal {} en guild {}", channel_id, guild_id);
            return Ok(JoinOutcome::Moved(channel_id));
        }

        let player = self.connector.connect(guild_id, channel_id).await?;

        let fresh = player.clone();
        let winner = self
            .store
            .mutate(guild_id, move |queue| {
                Box::pin(async move {
                    if let Some(winner) = queue.connection() {
                        return Ok(Some(winner));
                    }
                    queue.session += 1;
                    queue.current = None;
                    queue.connection = Some(fresh);
                    Ok(None)
                })
            })
            .await?;

        match winner {
            None => {
                info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
                Ok(JoinOutcome::Connected(channel_id))
            }
            Some(winner) => {
                // Otro join concurrente instaló su conexión primero: se usa esa
                debug!("Otra conexión se instaló primero en guild {}", guild_id);
                player.release().await;
                winner.move_to(channel_id).await?;
                Ok(JoinOutcome::Moved(channel_id))
            }
        }
    }

    /// Resuelve `query` y agrega los tracks a la cola.
    ///
    /// El éxito parcial es éxito: los errores del resolver se informan en
    /// `error_count` y solo falla si no se resolvió ningún track.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        query: &str,
        position: QueuePosition,
    ) -> MusicResult<EnqueueOutcome> {
        if !self.store.contains(guild_id) {
            return Err(MusicError::UnknownGuild(guild_id));
        }

        let resolved = match self.resolver.resolve(query).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("❌ Error resolviendo '{}': {}", query, e);
                Resolved::failed(1)
            }
        };

        if resolved.tracks.is_empty() {
            return Err(MusicError::ResolutionFailed {
                errors: resolved.error_count,
            });
        }

        let max_size = self.max_queue_size;
        let Resolved { tracks, error_count } = resolved;

        self.store
            .mutate(guild_id, move |queue| {
                Box::pin(async move {
                    let available = max_size.saturating_sub(queue.len());
                    if available == 0 {
                        return Err(MusicError::QueueFull { max: max_size });
                    }

                    let dropped = tracks.len().saturating_sub(available);
                    let added: Vec<Track> = tracks.into_iter().take(available).collect();
                    queue.insert_tracks(added.clone(), position, max_size);

                    Ok(EnqueueOutcome {
                        added,
                        error_count,
                        dropped,
                        position,
                    })
                })
            })
            .await
    }

    /// Avanza al siguiente track si no hay uno activo.
    pub async fn play_next(&self, guild_id: GuildId) -> MusicResult<PlayOutcome> {
        self.advance(guild_id, None)
            .await?
            .ok_or(MusicError::NotConnected)
    }

    /// `/play`: reanuda si está en pausa, agrega la consulta y arranca la cola.
    pub async fn play(&self, guild_id: GuildId, query: Option<&str>) -> MusicResult<PlayReport> {
        let resumed = self.resume(guild_id).await?;

        let enqueued = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => Some(self.enqueue(guild_id, query, QueuePosition::End).await?),
            None => None,
        };

        let playback = self.play_next(guild_id).await?;

        Ok(PlayReport {
            resumed,
            enqueued,
            playback,
        })
    }

    /// `/next`: agrega la consulta al principio de la cola y arranca si está parada.
    pub async fn play_next_with(&self, guild_id: GuildId, query: &str) -> MusicResult<PlayReport> {
        let enqueued = self.enqueue(guild_id, query, QueuePosition::Front).await?;
        let playback = self.play_next(guild_id).await?;

        Ok(PlayReport {
            resumed: false,
            enqueued: Some(enqueued),
            playback,
        })
    }

    /// Salta el track actual y `count - 1` tracks de la cola.
    ///
    /// El avance lo hace la señal de fin de track que dispara `stop`. Si el
    /// player ya no tiene un track activo, el primero de la cola ocupa el lugar
    /// del actual y se descartan `count` entradas.
    pub async fn skip(&self, guild_id: GuildId, count: usize) -> MusicResult<SkipOutcome> {
        self.store
            .mutate(guild_id, move |queue| {
                Box::pin(async move {
                    let max = queue.len() + 1;
                    if count > max {
                        return Err(MusicError::InvalidSkipCount {
                            requested: count,
                            max,
                        });
                    }

                    if count == 0 {
                        return Ok(SkipOutcome {
                            skipped: 0,
                            stopped: false,
                        });
                    }

                    let stopped = stop_active(queue.connection()).await?;
                    queue.drop_front(if stopped { count - 1 } else { count });
                    queue.current = None;

                    info!("⏭️ Saltadas {} canciones en guild {}", count, guild_id);
                    Ok(SkipOutcome {
                        skipped: count,
                        stopped,
                    })
                })
            })
            .await
    }

    /// Pausa la reproducción; devuelve `false` si ya estaba parada.
    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<bool> {
        self.store
            .mutate(guild_id, |queue| {
                Box::pin(async move {
                    let player = queue.connection().ok_or(MusicError::NotConnected)?;
                    if !player.is_playing().await {
                        return Ok(false);
                    }
                    player.pause().await?;
                    info!("⏸️ Reproducción pausada");
                    Ok(true)
                })
            })
            .await
    }

    /// Reanuda la reproducción; devuelve `false` si no estaba en pausa.
    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<bool> {
        self.store
            .mutate(guild_id, |queue| {
                Box::pin(async move {
                    let player = queue.connection().ok_or(MusicError::NotConnected)?;
                    if !player.is_paused().await {
                        return Ok(false);
                    }
                    player.resume().await?;
                    info!("▶️ Reproducción reanudada");
                    Ok(true)
                })
            })
            .await
    }

    /// Vuelve a poner el track actual al principio y lo reinicia.
    pub async fn repeat(&self, guild_id: GuildId) -> MusicResult<Track> {
        let max_size = self.max_queue_size;

        self.store
            .mutate(guild_id, move |queue| {
                Box::pin(async move {
                    let player = queue.connection().ok_or(MusicError::NotConnected)?;
                    let current = queue.current.clone().ok_or(MusicError::NothingPlaying)?;
                    if queue.len() >= max_size {
                        return Err(MusicError::QueueFull { max: max_size });
                    }

                    stop_active(Some(player)).await?;
                    queue.pending.push_front(current.clone());
                    queue.current = None;

                    info!("🔂 Repitiendo track: {}", current.display_title());
                    Ok(current)
                })
            })
            .await
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> MusicResult<usize> {
        self.store
            .mutate(guild_id, |queue| Box::pin(async move { queue.shuffle() }))
            .await
    }

    /// Elimina el track en la posición `index` (empezando en 1).
    pub async fn remove(&self, guild_id: GuildId, index: usize) -> MusicResult<Track> {
        self.store
            .mutate(guild_id, move |queue| Box::pin(async move { queue.remove(index) }))
            .await
    }

    /// Vacía la cola y detiene el track actual.
    pub async fn clear(&self, guild_id: GuildId) -> MusicResult<usize> {
        self.store
            .mutate(guild_id, |queue| {
                Box::pin(async move {
                    stop_active(queue.connection()).await?;
                    let cleared = queue.clear();
                    queue.current = None;
                    Ok(cleared)
                })
            })
            .await
    }

    /// Sale del canal de voz; el track activo vuelve al principio de la cola.
    pub async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self
            .store
            .mutate(guild_id, |queue| {
                Box::pin(async move {
                    let player = queue.connection.take().ok_or(MusicError::NotConnected)?;

                    let active = player.is_playing().await || player.is_paused().await;
                    if active && queue.current.is_some() {
                        queue.requeue_current();
                    } else {
                        queue.current = None;
                    }

                    // Las señales de la conexión anterior quedan obsoletas
                    queue.session += 1;
                    queue.leaving = true;
                    Ok(player)
                })
            })
            .await?;

        player.disconnect().await;
        Ok(())
    }

    /// El bot fue desconectado desde fuera: el guild vuelve a estar vacío.
    ///
    /// No hace nada si la desconexión vino de nuestro propio `leave`, aunque
    /// llegue después de que un `join` posterior instalara otra conexión.
    pub async fn handle_disconnect(&self, guild_id: GuildId) -> MusicResult<()> {
        let player = self
            .store
            .mutate(guild_id, |queue| {
                Box::pin(async move {
                    if std::mem::take(&mut queue.leaving) {
                        debug!("Desconexión propia confirmada en guild {}", guild_id);
                        return Ok(None);
                    }
                    if queue.connection.is_none() {
                        return Ok(None);
                    }
                    Ok(queue.reset())
                })
            })
            .await?;

        if let Some(player) = player {
            warn!("🔌 Bot desconectado externamente en guild {}, cola reiniciada", guild_id);
            player.disconnect().await;
        }

        Ok(())
    }

    /// El guild dejó de estar disponible.
    pub async fn forget(&self, guild_id: GuildId) {
        let Some(entry) = self.store.remove(guild_id) else {
            return;
        };

        let player = entry.lock().await.reset();
        if let Some(player) = player {
            player.disconnect().await;
        }
        info!("🗑️ Estado eliminado para guild {}", guild_id);
    }

    pub async fn queue_info(&self, guild_id: GuildId) -> MusicResult<QueueInfo> {
        Ok(self.store.get(guild_id).await?.info())
    }

    /// Paso de avance compartido por los comandos y las señales de fin de track.
    ///
    /// Con `expected_session` la llamada viene de una señal: si la sesión ya
    /// cambió, se descarta y devuelve `None`.
    async fn advance(
        &self,
        guild_id: GuildId,
        expected_session: Option<SessionId>,
    ) -> MusicResult<Option<PlayOutcome>> {
        let completions = self.completions.clone();

        self.store
            .mutate(guild_id, move |queue| {
                Box::pin(async move {
                    if let Some(expected) = expected_session {
                        if queue.session != expected {
                            debug!(
                                "Señal obsoleta en guild {} (sesión {} != {})",
                                guild_id, expected, queue.session
                            );
                            return Ok(None);
                        }
                    }

                    let player = match queue.connection() {
                        Some(player) => player,
                        None if expected_session.is_some() => return Ok(None),
                        None => return Err(MusicError::NotConnected),
                    };

                    if player.is_playing().await || player.is_paused().await {
                        return Ok(Some(PlayOutcome::AlreadyPlaying));
                    }

                    let mut failed = 0;
                    while let Some(track) = queue.pop_next() {
                        let signal = CompletionSignal::new(guild_id, queue.session, completions.clone());
                        match player.play(&track, signal).await {
                            Ok(()) => {
                                info!("🎵 Reproduciendo en guild {}: {}", guild_id, track.display_title());
                                queue.current = Some(track.clone());
                                return Ok(Some(PlayOutcome::Started { track, failed }));
                            }
                            Err(e) => {
                                warn!("❌ No se pudo reproducir {}: {}", track.display_title(), e);
                                failed += 1;
                            }
                        }
                    }

                    queue.current = None;
                    info!("📭 Cola vacía en guild {}", guild_id);
                    Ok(Some(PlayOutcome::QueueEmpty { failed }))
                })
            })
            .await
    }

    async fn on_track_end(&self, end: TrackEnd) {
        match self.advance(end.guild_id, Some(end.session)).await {
            Ok(Some(PlayOutcome::Started { track, .. })) => {
                let _ = self.events.send(PlaybackEvent::NowPlaying {
                    guild_id: end.guild_id,
                    track,
                });
            }
            Ok(Some(PlayOutcome::QueueEmpty { .. })) => {
                let _ = self.events.send(PlaybackEvent::QueueFinished {
                    guild_id: end.guild_id,
                });
            }
            Ok(Some(PlayOutcome::AlreadyPlaying)) | Ok(None) => {}
            Err(e) if e.is_fatal() => error!("Error fatal en guild {}: {}", end.guild_id, e),
            Err(e) => warn!("Error al avanzar la cola en guild {}: {}", end.guild_id, e),
        }
    }
}

/// Detiene el track si el player está sonando o en pausa.
///
/// Devuelve `false` sin tocar el player si no había un track activo.
async fn stop_active(player: Option<Arc<dyn PlayerHandle>>) -> MusicResult<bool> {
    let Some(player) = player else {
        return Ok(false);
    };
    if !(player.is_playing().await || player.is_paused().await) {
        return Ok(false);
    }
    player.stop().await?;
    Ok(true)
}

/// Punto único de reentrada de las señales de fin de track
async fn completion_loop(coordinator: Weak<PlaybackCoordinator>, mut rx: mpsc::UnboundedReceiver<TrackEnd>) {
    while let Some(end) = rx.recv().await {
        let Some(coordinator) = coordinator.upgrade() else {
            break;
        };
        // Cada guild avanza por su cuenta; el lock del guild serializa las señales
        tokio::spawn(async move { coordinator.on_track_end(end).await });
    }
    debug!("Bucle de fin de tracks terminado");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{resolver_with, track, wait_until, FakeConnector, FakePlayer};
    use crate::sources::{MockTrackResolver, ResolveError};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn guild() -> GuildId {
        GuildId::new(100)
    }

    fn channel() -> ChannelId {
        ChannelId::new(200)
    }

    struct Harness {
        coordinator: Arc<PlaybackCoordinator>,
        connector: Arc<FakeConnector>,
    }

    impl Harness {
        fn new(resolver: MockTrackResolver) -> Self {
            Self::with_capacity(resolver, 1000)
        }

        fn with_capacity(resolver: MockTrackResolver, max_queue_size: usize) -> Self {
            let store = Arc::new(GuildStore::new());
            store.initialize(guild());
            let connector = Arc::new(FakeConnector::default());
            let coordinator =
                PlaybackCoordinator::new(store, Arc::new(resolver), connector.clone(), max_queue_size);
            Self { coordinator, connector }
        }

        async fn joined(resolver: MockTrackResolver) -> Self {
            let harness = Self::new(resolver);
            harness.coordinator.join(guild(), Some(channel())).await.unwrap();
            harness
        }

        fn player(&self) -> Arc<FakePlayer> {
            self.connector.player(0)
        }

        async fn enqueue(&self, query: &str) -> EnqueueOutcome {
            self.coordinator
                .enqueue(guild(), query, QueuePosition::End)
                .await
                .unwrap()
        }

        async fn pending_titles(&self) -> Vec<String> {
            titles(&self.coordinator.queue_info(guild()).await.unwrap().items)
        }
    }

    fn titles(tracks: &[Track]) -> Vec<String> {
        tracks.iter().map(|t| t.display_title().to_string()).collect()
    }

    fn catalog() -> MockTrackResolver {
        resolver_with(&[
            ("song A", "A"),
            ("song B", "B"),
            ("abc", "A,B,C"),
            ("xabc", "X,A,B,C"),
            ("front", "F1,F2"),
        ])
    }

    #[tokio::test]
    async fn plays_single_track_then_reports_empty_queue() {
        let h = Harness::joined(catalog()).await;
        let mut events = h.coordinator.subscribe();

        h.enqueue("song A").await;
        let outcome = h.coordinator.play_next(guild()).await.unwrap();
        assert_eq!(outcome, PlayOutcome::Started { track: track("A"), failed: 0 });

        let info = h.coordinator.queue_info(guild()).await.unwrap();
        assert_eq!(info.current, Some(track("A")));
        assert!(info.items.is_empty());
        assert!(h.player().is_playing().await);

        // El player termina el track y dispara la señal
        h.player().finish();
        let info = wait_until(&h.coordinator, guild(), |info| info.current.is_none()).await;
        assert!(info.items.is_empty());

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, PlaybackEvent::QueueFinished { guild_id: guild() });
    }

    #[tokio::test]
    async fn completion_starts_the_next_track() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        h.player().finish();
        let info = wait_until(&h.coordinator, guild(), |info| info.current == Some(track("B"))).await;
        assert_eq!(titles(&info.items), vec!["C"]);
        assert_eq!(h.player().played_titles(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn redundant_play_next_does_not_double_advance() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;

        let (first, second) = tokio::join!(
            h.coordinator.play_next(guild()),
            h.coordinator.play_next(guild())
        );
        let outcomes = [first.unwrap(), second.unwrap()];

        let started = outcomes
            .iter()
            .filter(|o| matches!(o, PlayOutcome::Started { .. }))
            .count();
        assert_eq!(started, 1);
        assert!(outcomes.contains(&PlayOutcome::AlreadyPlaying));
        assert_eq!(h.pending_titles().await, vec!["B", "C"]);
        assert_eq!(h.player().played_titles(), vec!["A"]);
    }

    #[tokio::test]
    async fn paused_track_is_not_replaced() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        assert!(h.coordinator.pause(guild()).await.unwrap());
        assert!(!h.coordinator.pause(guild()).await.unwrap());

        assert_eq!(h.coordinator.play_next(guild()).await.unwrap(), PlayOutcome::AlreadyPlaying);

        assert!(h.coordinator.resume(guild()).await.unwrap());
        assert!(!h.coordinator.resume(guild()).await.unwrap());
        assert!(h.player().is_playing().await);
    }

    #[tokio::test]
    async fn skip_two_discards_current_and_head() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("xabc").await;
        h.coordinator.play_next(guild()).await.unwrap();
        assert_eq!(h.pending_titles().await, vec!["A", "B", "C"]);

        let outcome = h.coordinator.skip(guild(), 2).await.unwrap();
        assert_eq!(outcome, SkipOutcome { skipped: 2, stopped: true });

        let info = wait_until(&h.coordinator, guild(), |info| info.current == Some(track("B"))).await;
        assert_eq!(titles(&info.items), vec!["C"]);
        assert_eq!(h.player().played_titles(), vec!["X", "B"]);
    }

    #[tokio::test]
    async fn skip_one_discards_current() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        h.coordinator.skip(guild(), 1).await.unwrap();
        let info = wait_until(&h.coordinator, guild(), |info| info.current == Some(track("B"))).await;
        assert_eq!(titles(&info.items), vec!["C"]);
    }

    #[tokio::test]
    async fn skip_validates_count() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        assert_eq!(
            h.coordinator.skip(guild(), 4).await,
            Err(MusicError::InvalidSkipCount { requested: 4, max: 3 })
        );
        assert_eq!(
            h.coordinator.skip(guild(), 0).await,
            Ok(SkipOutcome { skipped: 0, stopped: false })
        );
        assert_eq!(h.pending_titles().await, vec!["B", "C"]);
        assert_eq!(h.player().played_titles(), vec!["A"]);
    }

    #[tokio::test]
    async fn skip_everything_empties_the_queue() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        h.coordinator.skip(guild(), 3).await.unwrap();
        let info = wait_until(&h.coordinator, guild(), |info| info.current.is_none()).await;
        assert!(info.items.is_empty());
    }

    #[tokio::test]
    async fn double_skip_before_completion_lands_on_third() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        // La segunda llamada llega antes de que la señal de A se procese
        let first = h.coordinator.skip(guild(), 1).await.unwrap();
        let second = h.coordinator.skip(guild(), 1).await.unwrap();
        assert_eq!(first, SkipOutcome { skipped: 1, stopped: true });
        assert_eq!(second.skipped, 1);

        let info = wait_until(&h.coordinator, guild(), |info| info.current == Some(track("C"))).await;
        assert!(info.items.is_empty());
        assert!(h.player().is_playing().await);
    }

    #[tokio::test]
    async fn failed_stop_leaves_queue_untouched() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("xabc").await;
        h.coordinator.play_next(guild()).await.unwrap();
        h.player().fail_stop();

        assert!(matches!(h.coordinator.skip(guild(), 3).await, Err(MusicError::Player(_))));
        assert!(matches!(h.coordinator.repeat(guild()).await, Err(MusicError::Player(_))));
        assert!(matches!(h.coordinator.clear(guild()).await, Err(MusicError::Player(_))));

        let info = h.coordinator.queue_info(guild()).await.unwrap();
        assert_eq!(info.current, Some(track("X")));
        assert_eq!(titles(&info.items), vec!["A", "B", "C"]);
        assert!(h.player().is_playing().await);
    }

    #[tokio::test]
    async fn repeat_replays_current() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        assert_eq!(h.coordinator.repeat(guild()).await.unwrap(), track("A"));
        wait_until(&h.coordinator, guild(), |info| info.items.len() == 2).await;

        assert_eq!(h.player().played_titles(), vec!["A", "A"]);
        assert_eq!(h.pending_titles().await, vec!["B", "C"]);
    }

    #[tokio::test]
    async fn repeat_requires_a_current_track() {
        let h = Harness::joined(catalog()).await;
        assert_eq!(h.coordinator.repeat(guild()).await, Err(MusicError::NothingPlaying));
    }

    #[tokio::test]
    async fn repeat_respects_queue_capacity() {
        let h = Harness::with_capacity(catalog(), 3);
        h.coordinator.join(guild(), Some(channel())).await.unwrap();
        h.enqueue("xabc").await;
        h.coordinator.play_next(guild()).await.unwrap();
        h.enqueue("song A").await;
        assert_eq!(h.pending_titles().await, vec!["A", "B", "A"]);

        assert_eq!(h.coordinator.repeat(guild()).await, Err(MusicError::QueueFull { max: 3 }));
        assert_eq!(h.pending_titles().await, vec!["A", "B", "A"]);
        assert!(h.player().is_playing().await);
    }

    #[tokio::test]
    async fn front_enqueue_then_play_next_plays_first_resolved() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("song B").await;

        let report = h.coordinator.play_next_with(guild(), "front").await.unwrap();
        assert_eq!(report.playback, PlayOutcome::Started { track: track("F1"), failed: 0 });
        assert_eq!(h.pending_titles().await, vec!["F2", "B"]);
    }

    #[tokio::test]
    async fn pending_length_tracks_resolved_minus_consumed() {
        let h = Harness::joined(catalog()).await;
        for query in ["abc", "song A", "front"] {
            h.enqueue(query).await;
        }
        assert_eq!(h.pending_titles().await.len(), 6);

        h.coordinator.play_next(guild()).await.unwrap();
        assert_eq!(h.pending_titles().await.len(), 5);
    }

    #[tokio::test]
    async fn remove_out_of_range_leaves_pending_unchanged() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;

        assert_eq!(
            h.coordinator.remove(guild(), 4).await,
            Err(MusicError::InvalidIndex { index: 4, len: 3 })
        );
        assert_eq!(
            h.coordinator.remove(guild(), 0).await,
            Err(MusicError::InvalidIndex { index: 0, len: 3 })
        );
        assert_eq!(h.pending_titles().await, vec!["A", "B", "C"]);

        assert_eq!(h.coordinator.remove(guild(), 2).await.unwrap(), track("B"));
        assert_eq!(h.pending_titles().await, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn shuffle_reports_empty_queue() {
        let h = Harness::joined(catalog()).await;
        assert_eq!(h.coordinator.shuffle(guild()).await, Err(MusicError::QueueEmpty));

        h.enqueue("abc").await;
        assert_eq!(h.coordinator.shuffle(guild()).await, Ok(3));
    }

    #[tokio::test]
    async fn partial_resolution_is_success() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|_| {
            Ok(Resolved {
                tracks: vec![track("A")],
                error_count: 2,
            })
        });
        let h = Harness::joined(resolver).await;

        let outcome = h.enqueue("playlist").await;
        assert_eq!(outcome.added, vec![track("A")]);
        assert_eq!(outcome.error_count, 2);
    }

    #[tokio::test]
    async fn zero_tracks_is_resolution_failure() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .times(2)
            .returning(|query| match query {
                "empty" => Ok(Resolved::failed(3)),
                _ => Err(ResolveError::Extractor("unavailable".into())),
            });
        let h = Harness::joined(resolver).await;

        assert_eq!(
            h.coordinator.enqueue(guild(), "empty", QueuePosition::End).await,
            Err(MusicError::ResolutionFailed { errors: 3 })
        );
        assert_eq!(
            h.coordinator.enqueue(guild(), "broken", QueuePosition::End).await,
            Err(MusicError::ResolutionFailed { errors: 1 })
        );
        assert!(h.pending_titles().await.is_empty());
    }

    #[tokio::test]
    async fn queue_capacity_is_enforced() {
        let h = Harness::with_capacity(catalog(), 2);
        let outcome = h
            .coordinator
            .enqueue(guild(), "abc", QueuePosition::End)
            .await
            .unwrap();
        assert_eq!(outcome.dropped, 1);

        assert_eq!(
            h.coordinator.enqueue(guild(), "song A", QueuePosition::End).await,
            Err(MusicError::QueueFull { max: 2 })
        );
    }

    #[tokio::test]
    async fn failing_tracks_are_skipped() {
        let h = Harness::joined(catalog()).await;
        h.player().fail_on("A");
        h.enqueue("abc").await;

        let outcome = h.coordinator.play_next(guild()).await.unwrap();
        assert_eq!(outcome, PlayOutcome::Started { track: track("B"), failed: 1 });
    }

    #[tokio::test]
    async fn join_requires_voice_presence() {
        let h = Harness::new(catalog());
        assert_eq!(h.coordinator.join(guild(), None).await, Err(MusicError::InvalidClient));
    }

    #[tokio::test]
    async fn join_failure_is_reported() {
        let h = Harness::new(catalog());
        h.connector.fail_next();
        assert!(matches!(
            h.coordinator.join(guild(), Some(channel())).await,
            Err(MusicError::JoinError(_))
        ));
        assert_eq!(h.connector.connections(), 0);
    }

    #[tokio::test]
    async fn second_join_moves_the_existing_connection() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        let other = ChannelId::new(201);
        assert_eq!(
            h.coordinator.join(guild(), Some(other)).await,
            Ok(JoinOutcome::Moved(other))
        );
        assert_eq!(h.connector.connections(), 1);
        assert_eq!(h.player().channel(), Some(other));
        assert!(h.player().is_playing().await);
    }

    #[tokio::test]
    async fn join_while_paused_stays_paused() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();
        h.coordinator.pause(guild()).await.unwrap();

        let other = ChannelId::new(201);
        assert_eq!(
            h.coordinator.join(guild(), Some(other)).await,
            Ok(JoinOutcome::Moved(other))
        );
        assert_eq!(h.player().channel(), Some(other));
        assert!(h.player().is_paused().await);
        assert!(!h.player().is_playing().await);
    }

    #[tokio::test]
    async fn concurrent_joins_keep_one_connection() {
        let h = Harness::new(catalog());
        let other = ChannelId::new(201);

        let (first, second) = tokio::join!(
            h.coordinator.join(guild(), Some(channel())),
            h.coordinator.join(guild(), Some(other))
        );
        let mut outcomes = vec![first.unwrap(), second.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, JoinOutcome::Moved(_)));
        assert!(matches!(outcomes[0], JoinOutcome::Connected(_)));
        assert!(matches!(outcomes[1], JoinOutcome::Moved(_)));

        // El perdedor se descarta y el instalado queda en el último canal pedido
        assert_eq!(h.connector.connections(), 2);
        let released = (0..2).filter(|&i| h.connector.player(i).is_disconnected()).count();
        assert_eq!(released, 1);

        let queue = h.coordinator.store().get(guild()).await.unwrap();
        assert!(queue.is_connected());
        let installed = (0..2)
            .map(|i| h.connector.player(i))
            .find(|p| !p.is_disconnected())
            .unwrap();
        let JoinOutcome::Moved(last) = outcomes[1] else { unreachable!() };
        assert_eq!(installed.channel(), Some(last));
    }

    #[tokio::test]
    async fn leave_requeues_the_active_track() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        h.coordinator.leave(guild()).await.unwrap();

        let info = h.coordinator.queue_info(guild()).await.unwrap();
        assert_eq!(info.current, None);
        assert_eq!(titles(&info.items), vec!["A", "B", "C"]);
        assert!(h.player().is_disconnected());
        assert_eq!(h.coordinator.leave(guild()).await, Err(MusicError::NotConnected));
    }

    #[tokio::test]
    async fn leave_while_paused_requeues() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();
        h.coordinator.pause(guild()).await.unwrap();

        h.coordinator.leave(guild()).await.unwrap();

        let info = h.coordinator.queue_info(guild()).await.unwrap();
        assert_eq!(info.current, None);
        assert_eq!(titles(&info.items), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn stale_completion_is_discarded() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();
        let stale = h.player().current_signal().unwrap();

        h.coordinator.leave(guild()).await.unwrap();
        h.coordinator.join(guild(), Some(channel())).await.unwrap();

        // La señal de la sesión 1 llega después de la reconexión
        stale.fire();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let info = h.coordinator.queue_info(guild()).await.unwrap();
        assert_eq!(info.current, None);
        assert_eq!(titles(&info.items), vec!["A", "B", "C"]);
        assert!(h.connector.player(1).played_titles().is_empty());
    }

    #[tokio::test]
    async fn clear_empties_queue_and_stops() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        assert_eq!(h.coordinator.clear(guild()).await.unwrap(), 2);
        let info = wait_until(&h.coordinator, guild(), |info| info.current.is_none()).await;
        assert!(info.items.is_empty());
    }

    #[tokio::test]
    async fn external_disconnect_resets_guild() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.play_next(guild()).await.unwrap();

        h.coordinator.handle_disconnect(guild()).await.unwrap();
        let queue = h.coordinator.store().get(guild()).await.unwrap();
        assert!(!queue.is_connected());
        assert!(queue.is_empty());
        assert!(queue.current().is_none());
    }

    #[tokio::test]
    async fn disconnect_after_leave_keeps_queue() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.leave(guild()).await.unwrap();

        h.coordinator.handle_disconnect(guild()).await.unwrap();
        assert_eq!(h.pending_titles().await, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn late_disconnect_from_leave_spares_new_connection() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("abc").await;
        h.coordinator.leave(guild()).await.unwrap();
        h.coordinator.join(guild(), Some(channel())).await.unwrap();

        // La actualización de voz del `leave` llega después del nuevo `join`
        h.coordinator.handle_disconnect(guild()).await.unwrap();
        let queue = h.coordinator.store().get(guild()).await.unwrap();
        assert!(queue.is_connected());
        assert_eq!(queue.len(), 3);
        assert!(!h.connector.player(1).is_disconnected());

        // Una desconexión externa posterior sí reinicia el guild
        h.coordinator.handle_disconnect(guild()).await.unwrap();
        let queue = h.coordinator.store().get(guild()).await.unwrap();
        assert!(!queue.is_connected());
        assert!(queue.is_empty());
        assert!(h.connector.player(1).is_disconnected());
    }

    #[tokio::test]
    async fn play_resumes_and_enqueues() {
        let h = Harness::joined(catalog()).await;
        h.enqueue("song A").await;
        h.coordinator.play_next(guild()).await.unwrap();
        h.coordinator.pause(guild()).await.unwrap();

        let report = h.coordinator.play(guild(), Some("song B")).await.unwrap();
        assert!(report.resumed);
        assert_eq!(report.enqueued.unwrap().added, vec![track("B")]);
        assert_eq!(report.playback, PlayOutcome::AlreadyPlaying);
    }

    #[tokio::test]
    async fn commands_without_connection_fail() {
        let h = Harness::new(catalog());
        assert_eq!(h.coordinator.play_next(guild()).await, Err(MusicError::NotConnected));
        assert_eq!(h.coordinator.pause(guild()).await, Err(MusicError::NotConnected));
    }

    #[tokio::test]
    async fn unknown_guild_is_reported() {
        let h = Harness::new(catalog());
        let unknown = GuildId::new(999);
        assert_eq!(
            h.coordinator.play_next(unknown).await,
            Err(MusicError::UnknownGuild(unknown))
        );
        assert_eq!(
            h.coordinator.enqueue(unknown, "song A", QueuePosition::End).await,
            Err(MusicError::UnknownGuild(unknown))
        );
    }

    #[tokio::test]
    async fn guilds_are_independent() {
        let h = Harness::joined(catalog()).await;
        let other = GuildId::new(101);
        h.coordinator.initialize(other);
        h.coordinator.join(other, Some(ChannelId::new(300))).await.unwrap();

        h.enqueue("song A").await;
        h.coordinator.enqueue(other, "abc", QueuePosition::End).await.unwrap();
        h.coordinator.play_next(guild()).await.unwrap();

        let other_info = h.coordinator.queue_info(other).await.unwrap();
        assert_eq!(other_info.current, None);
        assert_eq!(titles(&other_info.items), vec!["A", "B", "C"]);
    }
}

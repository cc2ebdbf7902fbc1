//! # Bot Module
//!
//! Discord front-end for the playback coordinator.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command and button dispatch, one reply per interaction ([`handlers`])
//! - Guild lifecycle and voice state events ([`GuildJukeboxBot`])
//! - Announcements of automatic track transitions
//!
//! ## Architecture
//!
//! [`GuildJukeboxBot`] implements Serenity's [`EventHandler`] trait. It owns
//! no playback state itself: every command is forwarded to the shared
//! [`PlaybackCoordinator`], keyed by the guild of the interaction.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{
        ChannelId, Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild,
        VoiceState,
    },
    async_trait,
    http::Http,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::coordinator::{PlaybackCoordinator, PlaybackEvent},
    config::Config,
    ui::messages,
};

/// Main Discord event handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (token, limits, dev guild)
/// - `coordinator`: Per-guild playback state machine
/// - `announce_channels`: Last text channel that issued a command, per guild
pub struct GuildJukeboxBot {
    config: Arc<Config>,
    coordinator: Arc<PlaybackCoordinator>,
    announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    announcer_started: AtomicBool,
}

impl GuildJukeboxBot {
    pub fn new(config: Config, coordinator: Arc<PlaybackCoordinator>) -> Self {
        Self {
            config: Arc::new(config),
            coordinator,
            announce_channels: Arc::new(DashMap::new()),
            announcer_started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &PlaybackCoordinator {
        &self.coordinator
    }

    /// Guarda el canal donde se anunciarán los cambios automáticos de track
    pub fn remember_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.announce_channels.insert(guild_id, channel_id);
    }

    /// Registers slash commands with Discord.
    ///
    /// Uses the dev guild when `GUILD_ID` is set (instant propagation),
    /// global commands otherwise (up to an hour).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for GuildJukeboxBot {
    /// Called when the bot is connected to Discord.
    ///
    /// Initializes state for every guild in the ready payload, registers the
    /// slash commands and starts the announcement task (once per process).
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        for guild in &ready.guilds {
            self.coordinator.initialize(guild.id);
        }

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        if !self.announcer_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(announce_events(
                ctx.http.clone(),
                self.coordinator.subscribe(),
                self.announce_channels.clone(),
            ));
        }
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        self.coordinator.initialize(guild.id);
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Una caída temporal de Discord también llega como guild_delete
        if incomplete.unavailable {
            debug!("Guild {} temporalmente no disponible", incomplete.id);
            return;
        }

        self.announce_channels.remove(&incomplete.id);
        self.coordinator.forget(incomplete.id).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando botón: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Detects the bot being disconnected by someone else.
    ///
    /// The update caused by our own `leave` is recognized by the coordinator
    /// and ignored, even when a later `join` already installed a new call.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            if let Err(e) = self.coordinator.handle_disconnect(guild_id).await {
                error!("Error al limpiar estado tras desconexión: {}", e);
            }
        }
    }
}

/// Publica en el chat los cambios automáticos de track
async fn announce_events(
    http: Arc<Http>,
    mut events: tokio::sync::broadcast::Receiver<PlaybackEvent>,
    channels: Arc<DashMap<GuildId, ChannelId>>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ {} anuncios descartados", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(channel_id) = channels.get(&event.guild_id()).map(|entry| *entry) else {
            continue;
        };

        if let Err(e) = channel_id.say(&*http, messages::event_message(&event)).await {
            warn!("No se pudo anunciar en el canal {}: {:?}", channel_id, e);
        }
    }
}

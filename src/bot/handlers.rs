use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::coordinator::PlaybackCoordinator,
    bot::GuildJukeboxBot,
    error::{MusicError, MusicResult},
    ui::{
        buttons::{self, PlayerControl},
        embeds, messages,
    },
};

/// Respuesta única de un comando
enum Reply {
    Text(String),
    Embed(CreateEmbed),
    /// Embed con los botones del reproductor
    Controls(CreateEmbed, Vec<CreateActionRow>),
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &GuildJukeboxBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Este comando solo funciona en servidores")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    bot.remember_channel(guild_id, command.channel_id);

    // Defer la respuesta ya que la resolución puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let reply = match execute(ctx, &command, bot, guild_id).await {
        Ok(reply) => reply,
        Err(e) => {
            if e.is_fatal() {
                error!("❌ Error fatal en /{} (guild {}): {}", command.data.name, guild_id, e);
            } else {
                warn!("⚠️ /{} falló en guild {}: {}", command.data.name, guild_id, e);
            }
            Reply::Text(messages::error_message(&e))
        }
    };

    let response = match reply {
        Reply::Text(content) => EditInteractionResponse::new().content(content),
        Reply::Embed(embed) => EditInteractionResponse::new().embed(embed),
        Reply::Controls(embed, rows) => EditInteractionResponse::new().embed(embed).components(rows),
    };
    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

/// Maneja los botones del embed de la canción actual
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &GuildJukeboxBot,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    let Some(control) = PlayerControl::from_custom_id(&component.data.custom_id) else {
        debug!("Botón desconocido: {}", component.data.custom_id);
        return Ok(());
    };

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    bot.remember_channel(guild_id, component.channel_id);
    let content = run_control(bot.coordinator(), guild_id, control).await;

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
        )
        .await?;

    Ok(())
}

/// Ejecuta la acción de un botón y devuelve el texto de respuesta
async fn run_control(coordinator: &PlaybackCoordinator, guild_id: GuildId, control: PlayerControl) -> String {
    let result = match control {
        PlayerControl::Skip => coordinator
            .skip(guild_id, 1)
            .await
            .map(|outcome| messages::skip_message(&outcome)),
        PlayerControl::Clear => coordinator.clear(guild_id).await.map(messages::clear_message),
    };

    result.unwrap_or_else(|e| {
        warn!("⚠️ Botón {:?} falló en guild {}: {}", control, guild_id, e);
        messages::error_message(&e)
    })
}

async fn execute(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildJukeboxBot,
    guild_id: GuildId,
) -> MusicResult<Reply> {
    let coordinator = bot.coordinator();

    let reply = match command.data.name.as_str() {
        "play" => {
            ensure_connected(ctx, command, bot, guild_id).await?;
            let report = coordinator.play(guild_id, string_option(command, "query")).await?;
            messages::play_message(&report).into()
        }
        "next" => {
            let query = string_option(command, "query").ok_or(MusicError::ResolutionFailed { errors: 0 })?;
            ensure_connected(ctx, command, bot, guild_id).await?;
            let report = coordinator.play_next_with(guild_id, query).await?;
            messages::play_message(&report).into()
        }
        "join" => {
            let channel = user_voice_channel(ctx, guild_id, command.user.id);
            messages::join_message(&coordinator.join(guild_id, channel).await?).into()
        }
        "leave" => {
            coordinator.leave(guild_id).await?;
            messages::leave_message().into()
        }
        "skip" => {
            let count = count_option(command, "amount").unwrap_or(1);
            messages::skip_message(&coordinator.skip(guild_id, count).await?).into()
        }
        "pause" => messages::pause_message(coordinator.pause(guild_id).await?).into(),
        "resume" => messages::resume_message(coordinator.resume(guild_id).await?).into(),
        "repeat" => messages::repeat_message(&coordinator.repeat(guild_id).await?).into(),
        "shuffle" => messages::shuffle_message(coordinator.shuffle(guild_id).await?).into(),
        "remove" => {
            let index = count_option(command, "index").unwrap_or(0);
            let removed = coordinator.remove(guild_id, index).await?;
            messages::remove_message(index, &removed).into()
        }
        "clear" => messages::clear_message(coordinator.clear(guild_id).await?).into(),
        "queue" => {
            let page = count_option(command, "page").unwrap_or(1);
            let info = coordinator.queue_info(guild_id).await?;
            Reply::Embed(embeds::create_queue_embed(&info, page, bot.config().queue_page_size))
        }
        "nowplaying" => {
            let info = coordinator.queue_info(guild_id).await?;
            let track = info.current.as_ref().ok_or(MusicError::NothingPlaying)?;
            Reply::Controls(
                embeds::create_now_playing_embed(track, &info),
                buttons::create_player_controls(),
            )
        }
        "help" => Reply::Embed(embeds::create_help_embed()),
        other => {
            warn!("Comando no reconocido: {}", other);
            Reply::Text("❌ Comando no reconocido".to_string())
        }
    };

    Ok(reply)
}

/// Conecta al canal del usuario si el bot todavía no está en ninguno
async fn ensure_connected(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildJukeboxBot,
    guild_id: GuildId,
) -> MusicResult<()> {
    let coordinator = bot.coordinator();
    if coordinator.store().get(guild_id).await?.is_connected() {
        return Ok(());
    }

    let channel = user_voice_channel(ctx, guild_id, command.user.id);
    coordinator.join(guild_id, channel).await?;
    Ok(())
}

// Funciones auxiliares

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

/// Opción entera no negativa; los valores negativos se saturan a un valor fuera de rango
fn count_option(command: &CommandInteraction, name: &str) -> Option<usize> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
        .map(|value| usize::try_from(value).unwrap_or(usize::MAX))
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    guild_id.to_guild_cached(&ctx.cache).and_then(|guild| {
        guild
            .voice_states
            .get(&user_id)
            .and_then(|voice_state| voice_state.channel_id)
    })
}

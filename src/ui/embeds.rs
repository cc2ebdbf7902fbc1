use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;
use url::Url;

use crate::audio::{queue::QueueInfo, track::Track};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch";

const YOUTUBE_THUMBNAIL_URL: &str = "https://i.ytimg.com/vi";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, queue_info: &QueueInfo) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.display_title()))
        .color(colors::SUCCESS_GREEN);

    embed = match track.duration() {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    embed = embed.field("📋 En cola", queue_info.total_items.to_string(), true);

    if let Some(next) = queue_info.items.first() {
        embed = embed.field("⏭️ Siguiente", next.display_title(), false);
    }

    if let Some(link) = track_link(track) {
        embed = embed.url(link);
    }

    if let Some(thumbnail) = track_thumbnail(track) {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize, items_per_page: usize) -> CreateEmbed {
    let queue_page = queue_info.get_page(page, items_per_page);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &queue_info.current {
        embed = embed.field("▶️ Reproduciendo", format!("**{}**", current.display_title()), false);
    }

    if queue_info.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let description: String = queue_page
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let duration = item
                .duration()
                .map(|dur| format!(" `[{}]`", format_duration(dur)))
                .unwrap_or_default();
            format!("**{}**. {}{}\n", queue_page.first_position + i, item.display_title(), duration)
        })
        .collect();

    embed = embed.field("Próximas canciones", description, false);

    let mut info = format!("**Total:** {} canciones", queue_info.total_items);
    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            humantime::format_duration(Duration::from_secs(queue_info.total_duration.as_secs()))
        ));
    }
    embed = embed.field("Información", info, false);

    let footer = if queue_page.total_pages > 1 {
        format!(
            "Página {} de {} • Guild Jukebox",
            queue_page.current_page, queue_page.total_pages
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Guild Jukebox - Comandos")
        .color(colors::INFO_BLUE)
        .field(
            "🎵 Reproducción",
            "• `/play [canción]` - Agrega a la cola y reproduce\n\
            • `/next <canción>` - Reproduce a continuación\n\
            • `/pause` - Pausa la reproducción\n\
            • `/resume` - Reanuda la reproducción\n\
            • `/skip [cantidad]` - Salta canciones\n\
            • `/repeat` - Repite la canción actual",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/nowplaying` - Muestra la canción actual\n\
            • `/shuffle` - Mezcla la cola\n\
            • `/remove <posición>` - Elimina una canción\n\
            • `/clear` - Limpia la cola",
            false,
        )
        .field(
            "🔊 Conexión",
            "• `/join` - Conecta a tu canal de voz\n\
            • `/leave` - Desconecta del canal",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Enlace público del track: la página original o, si falta, el video de YouTube
pub fn track_link(track: &Track) -> Option<String> {
    if let Some(page_url) = track.page_url() {
        return Some(page_url.to_string());
    }

    let id = track.external_id()?;
    Url::parse_with_params(YOUTUBE_WATCH_URL, &[("v", id)])
        .ok()
        .map(String::from)
}

/// Miniatura de YouTube a partir del id del video
pub fn track_thumbnail(track: &Track) -> Option<String> {
    track
        .external_id()
        .map(|id| format!("{}/{}/default.jpg", YOUTUBE_THUMBNAIL_URL, id))
}

/// Formatea una duración en formato legible
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

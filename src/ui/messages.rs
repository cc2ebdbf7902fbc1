//! Respuestas de una línea para cada comando.
//!
//! Todas las funciones son puras: reciben el resultado de una operación del
//! coordinador y devuelven el texto que se envía al canal.

use crate::{
    audio::{
        coordinator::{EnqueueOutcome, JoinOutcome, PlayOutcome, PlayReport, PlaybackEvent, SkipOutcome},
        queue::QueuePosition,
        track::Track,
    },
    error::MusicError,
};

/// Texto para un error de música
pub fn error_message(error: &MusicError) -> String {
    match error {
        MusicError::UnknownGuild(_) => {
            "❌ Este servidor no está inicializado, intenta de nuevo en unos segundos".to_string()
        }
        MusicError::InvalidClient => "❌ Debes estar en un canal de voz".to_string(),
        MusicError::JoinError(reason) => format!("❌ No pude conectarme al canal de voz: {}", reason),
        MusicError::ResolutionFailed { errors } if *errors > 1 => {
            format!("❌ No se encontraron canciones ({} errores)", errors)
        }
        MusicError::ResolutionFailed { .. } => "❌ No se encontraron canciones".to_string(),
        MusicError::InvalidSkipCount { max, .. } => {
            format!("❌ Solo puedes saltar entre 0 y {} canciones", max)
        }
        MusicError::InvalidIndex { len: 0, .. } => "❌ La cola está vacía".to_string(),
        MusicError::InvalidIndex { len, .. } => {
            format!("❌ La posición debe estar entre 1 y {}", len)
        }
        MusicError::NotConnected => "❌ No estoy conectado a un canal de voz".to_string(),
        MusicError::NothingPlaying => "❌ No hay nada reproduciéndose".to_string(),
        MusicError::QueueEmpty => "📭 La cola está vacía".to_string(),
        MusicError::QueueFull { max } => format!("❌ La cola está llena (máximo {} canciones)", max),
        MusicError::Player(reason) => format!("❌ Error del reproductor: {}", reason),
    }
}

pub fn join_message(outcome: &JoinOutcome) -> String {
    match outcome {
        JoinOutcome::Connected(channel_id) => format!("🔊 Conectado a <#{}>", channel_id),
        JoinOutcome::Moved(channel_id) => format!("🔀 Movido a <#{}>", channel_id),
    }
}

pub fn enqueue_message(outcome: &EnqueueOutcome) -> String {
    let mut message = match (outcome.added.as_slice(), outcome.position) {
        ([track], QueuePosition::End) => format!("➕ Agregada a la cola: **{}**", track.display_title()),
        ([track], QueuePosition::Front) => format!("⏭️ Sonará a continuación: **{}**", track.display_title()),
        (tracks, QueuePosition::End) => format!("➕ Agregadas {} canciones a la cola", tracks.len()),
        (tracks, QueuePosition::Front) => {
            format!("⏭️ {} canciones sonarán a continuación", tracks.len())
        }
    };

    if outcome.error_count > 0 {
        message.push_str(&format!(" ({} no se pudieron cargar)", outcome.error_count));
    }
    if outcome.dropped > 0 {
        message.push_str(&format!(" ({} descartadas, cola llena)", outcome.dropped));
    }

    message
}

pub fn now_playing_message(track: &Track) -> String {
    format!("🎵 Reproduciendo: **{}**", track.display_title())
}

/// Respuesta de `/play` y `/next`
pub fn play_message(report: &PlayReport) -> String {
    let mut lines = Vec::new();

    if report.resumed {
        lines.push("▶️ Reproducción reanudada".to_string());
    }
    if let Some(enqueued) = &report.enqueued {
        lines.push(enqueue_message(enqueued));
    }

    match &report.playback {
        PlayOutcome::Started { track, failed } => {
            let mut line = now_playing_message(track);
            if *failed > 0 {
                line.push_str(&format!(" ({} saltadas por error)", failed));
            }
            lines.push(line);
        }
        PlayOutcome::QueueEmpty { .. } if report.enqueued.is_none() && !report.resumed => {
            lines.push("📭 La cola está vacía".to_string());
        }
        PlayOutcome::QueueEmpty { failed } if *failed > 0 => {
            lines.push(format!("❌ No se pudo reproducir ninguna canción ({} errores)", failed));
        }
        PlayOutcome::AlreadyPlaying if lines.is_empty() => {
            lines.push("🎶 Ya hay música sonando".to_string());
        }
        PlayOutcome::QueueEmpty { .. } | PlayOutcome::AlreadyPlaying => {}
    }

    lines.join("\n")
}

pub fn skip_message(outcome: &SkipOutcome) -> String {
    match outcome.skipped {
        0 => "⏭️ No se saltó ninguna canción".to_string(),
        1 => "⏭️ Canción saltada".to_string(),
        n => format!("⏭️ Saltadas {} canciones", n),
    }
}

pub fn pause_message(changed: bool) -> String {
    if changed {
        "⏸️ Reproducción pausada".to_string()
    } else {
        "⏸️ No hay nada sonando".to_string()
    }
}

pub fn resume_message(changed: bool) -> String {
    if changed {
        "▶️ Reproducción reanudada".to_string()
    } else {
        "▶️ La reproducción no estaba en pausa".to_string()
    }
}

pub fn repeat_message(track: &Track) -> String {
    format!("🔂 Repitiendo: **{}**", track.display_title())
}

pub fn shuffle_message(count: usize) -> String {
    format!("🔀 Cola mezclada ({} canciones)", count)
}

pub fn remove_message(index: usize, track: &Track) -> String {
    format!("🗑️ Eliminada la posición {}: **{}**", index, track.display_title())
}

pub fn clear_message(cleared: usize) -> String {
    format!("🗑️ Cola limpiada ({} canciones)", cleared)
}

pub fn leave_message() -> String {
    "👋 Desconectado del canal de voz".to_string()
}

/// Anuncio en el chat de una transición automática
pub fn event_message(event: &PlaybackEvent) -> String {
    match event {
        PlaybackEvent::NowPlaying { track, .. } => now_playing_message(track),
        PlaybackEvent::QueueFinished { .. } => "📭 Se terminó la cola".to_string(),
    }
}

//! Presentación de respuestas: texto de una línea, embeds y botones.

pub mod buttons;
pub mod embeds;
pub mod messages;

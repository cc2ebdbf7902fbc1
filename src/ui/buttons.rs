use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const SKIP: &str = "player_skip";
    pub const CLEAR: &str = "player_clear";
}

/// Acción de un botón del reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerControl {
    Skip,
    Clear,
}

impl PlayerControl {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::SKIP => Some(PlayerControl::Skip),
            button_ids::CLEAR => Some(PlayerControl::Clear),
            _ => None,
        }
    }
}

/// Controles que acompañan al embed de la canción actual
pub fn create_player_controls() -> Vec<CreateActionRow> {
    let skip_btn = CreateButton::new(button_ids::SKIP)
        .label("Skip")
        .emoji('⏭')
        .style(ButtonStyle::Success);

    let clear_btn = CreateButton::new(button_ids::CLEAR)
        .label("Clear")
        .emoji('🗑')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![skip_btn, clear_btn])]
}

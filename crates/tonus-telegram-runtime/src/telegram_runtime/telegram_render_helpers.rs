use serde_json::{json, Value};
use tonus_navigation::Menu;

const COMMAND_KEYBOARD_ROW_WIDTH: usize = 2;

/// One inline-keyboard row per menu row; each button echoes its token back
/// as `callback_data`.
pub(super) fn render_inline_keyboard(menu: &Menu) -> Value {
    let rows = menu
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|option| {
                    json!({
                        "text": option.label,
                        "callback_data": option.token(),
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    json!({ "inline_keyboard": rows })
}

pub(super) fn render_command_keyboard(commands: &[&str]) -> Value {
    let rows = commands
        .chunks(COMMAND_KEYBOARD_ROW_WIDTH)
        .map(|chunk| {
            chunk
                .iter()
                .map(|command| json!({ "text": command }))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    json!({
        "keyboard": rows,
        "resize_keyboard": true,
    })
}

use std::time::Duration;

use mlua::{Lua, Result as LuaResult, Value, Variadic};

use super::args::{expect_range, expect_text};
use super::SessionServices;

pub(super) fn install_gui(lua: &Lua, services: SessionServices) -> LuaResult<()> {
    let gui = lua.create_table()?;

    let core = services.core.clone();
    gui.set(
        "DrawText",
        lua.create_function(move |_, args: Variadic<Value>| {
            if args.is_empty() {
                return Ok(());
            }
            let mut text = expect_text("gui.DrawText", &args, 0)?;
            text.push('\n');
            core.set_debug_text(&text);
            Ok(())
        })?,
    )?;

    let core = services.core;
    let default_duration = services.config.default_message_duration();
    gui.set(
        "Msg",
        lua.create_function(move |_, args: Variadic<Value>| {
            const NAME: &str = "gui.Msg";
            if args.is_empty() {
                return Ok(());
            }
            let text = expect_text(NAME, &args, 0)?;
            let duration = if args.len() >= 2 {
                let millis = expect_range(NAME, &args, 1, 0..=i64::from(u32::MAX))?;
                Duration::from_millis(millis as u64)
            } else {
                default_duration
            };
            core.display_message(&format!("Lua Msg: {text}"), duration);
            Ok(())
        })?,
    )?;

    lua.globals().set("gui", gui)?;
    Ok(())
}

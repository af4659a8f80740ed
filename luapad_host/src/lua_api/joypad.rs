use std::sync::Arc;

use mlua::{Lua, Result as LuaResult, Value, Variadic};

use super::args::{argument_error, expect_axis, expect_count, expect_integer, expect_number, expect_text};
use crate::overlay::InputOverlayBridge;
use crate::pad::{parse_button_codes, parse_dpad_codes, polar_to_axes};

fn polar_args(function: &str, args: &[Value]) -> LuaResult<(u8, u8)> {
    expect_count(function, args, 2)?;
    let magnitude = expect_integer(function, args, 0)?;
    let angle = expect_number(function, args, 1)?;
    polar_to_axes(magnitude, angle).map_err(|err| argument_error(function, err))
}

fn axis_pair(function: &str, args: &[Value]) -> LuaResult<(u8, u8)> {
    expect_count(function, args, 2)?;
    Ok((expect_axis(function, args, 0)?, expect_axis(function, args, 1)?))
}

pub(super) fn install_joypad(lua: &Lua, overlay: Arc<InputOverlayBridge>) -> LuaResult<()> {
    let joypad = lua.create_table()?;

    let bridge = overlay.clone();
    joypad.set(
        "getAnalog",
        lua.create_function(move |_, ()| {
            let pad = bridge.last_observed();
            Ok((pad.stick_x, pad.stick_y))
        })?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "setAnalog",
        lua.create_function(move |_, args: Variadic<Value>| {
            let (x, y) = axis_pair("joypad.setAnalog", &args)?;
            bridge.set_stick(x, y);
            Ok(())
        })?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "setAnalogPolar",
        lua.create_function(move |_, args: Variadic<Value>| {
            let (x, y) = polar_args("joypad.setAnalogPolar", &args)?;
            bridge.set_stick(x, y);
            Ok(())
        })?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "getCStick",
        lua.create_function(move |_, ()| {
            let pad = bridge.last_observed();
            Ok((pad.substick_x, pad.substick_y))
        })?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "setCStick",
        lua.create_function(move |_, args: Variadic<Value>| {
            let (x, y) = axis_pair("joypad.setCStick", &args)?;
            bridge.set_c_stick(x, y);
            Ok(())
        })?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "setCStickPolar",
        lua.create_function(move |_, args: Variadic<Value>| {
            let (x, y) = polar_args("joypad.setCStickPolar", &args)?;
            bridge.set_c_stick(x, y);
            Ok(())
        })?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "getButtons",
        lua.create_function(move |_, ()| Ok(bridge.last_observed().button))?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "setButtons",
        lua.create_function(move |_, args: Variadic<Value>| {
            const NAME: &str = "joypad.setButtons";
            let codes = expect_text(NAME, &args, 0)?;
            let parsed = parse_button_codes(&codes).map_err(|err| argument_error(NAME, err))?;
            bridge.apply_buttons(parsed);
            Ok(())
        })?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "setDPad",
        lua.create_function(move |_, args: Variadic<Value>| {
            const NAME: &str = "joypad.setDPad";
            let codes = expect_text(NAME, &args, 0)?;
            let pressed = parse_dpad_codes(&codes).map_err(|err| argument_error(NAME, err))?;
            bridge.press(pressed);
            Ok(())
        })?,
    )?;

    let bridge = overlay.clone();
    joypad.set(
        "getTriggers",
        lua.create_function(move |_, ()| {
            let pad = bridge.last_observed();
            Ok((pad.trigger_left, pad.trigger_right))
        })?,
    )?;

    joypad.set(
        "setTriggers",
        lua.create_function(move |_, args: Variadic<Value>| {
            let (left, right) = axis_pair("joypad.setTriggers", &args)?;
            overlay.set_triggers(left, right);
            Ok(())
        })?,
    )?;

    lua.globals().set("joypad", joypad)?;
    Ok(())
}

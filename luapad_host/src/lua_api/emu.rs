use mlua::{Lua, Result as LuaResult, Value, Variadic};

use super::args::{argument_error, expect_number, expect_range};
use super::{optional, SessionServices};

/// Highest numbered save-state slot.
pub(crate) const MAX_STATE_SLOT: i64 = 99;

pub(super) fn install_emu(lua: &Lua, services: SessionServices) -> LuaResult<()> {
    let emu = lua.create_table()?;

    let frames = services.frames.clone();
    emu.set(
        "frameAdvance",
        lua.create_function(move |_, ()| {
            frames.advance()?;
            Ok(())
        })?,
    )?;

    let core = services.core.clone();
    emu.set(
        "getFrameCount",
        lua.create_function(move |_, ()| Ok(core.frame_clock().current()))?,
    )?;

    let core = services.core.clone();
    emu.set(
        "getMovieLength",
        lua.create_function(move |_, ()| {
            let total = core.total_frames().map(|frames| Value::Integer(frames as i64));
            Ok(optional(total))
        })?,
    )?;

    let core = services.core.clone();
    emu.set(
        "softReset",
        lua.create_function(move |_, ()| {
            core.soft_reset();
            Ok(())
        })?,
    )?;

    let core = services.core.clone();
    emu.set(
        "saveState",
        lua.create_function(move |_, args: Variadic<Value>| {
            let slot = expect_range("emu.saveState", &args, 0, 0..=MAX_STATE_SLOT)?;
            core.save_state(slot as u32);
            Ok(())
        })?,
    )?;

    let core = services.core.clone();
    emu.set(
        "loadState",
        lua.create_function(move |_, args: Variadic<Value>| {
            let slot = expect_range("emu.loadState", &args, 0, 0..=MAX_STATE_SLOT)?;
            core.load_state(slot as u32);
            Ok(())
        })?,
    )?;

    let core = services.core;
    emu.set(
        "setEmulatorSpeed",
        lua.create_function(move |_, args: Variadic<Value>| {
            const NAME: &str = "emu.setEmulatorSpeed";
            let percent = expect_number(NAME, &args, 0)?;
            if percent < 0.0 {
                return Err(argument_error(NAME, format!("speed must not be negative (got {percent})")));
            }
            core.set_emulation_speed((percent * 0.01) as f32);
            Ok(())
        })?,
    )?;

    lua.globals().set("emu", emu)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::core::{EmulatorCore, MemoryBus};
    use crate::lua_api::tests::harness;

    #[test]
    fn movie_length_is_absent_without_a_movie() {
        let h = harness();
        let count: i64 = h
            .lua
            .load("return select('#', emu.getMovieLength())")
            .eval()
            .expect("eval");
        assert_eq!(count, 0);

        h.core.start_playback(360);
        let length: i64 = h
            .lua
            .load("return emu.getMovieLength()")
            .eval()
            .expect("eval");
        assert_eq!(length, 360);
    }

    #[test]
    fn control_calls_reach_the_core() {
        let h = harness();
        h.core.write_u8(0x8000_0000, 3);
        h.lua
            .load(
                r#"
                emu.saveState(7)
                memory.WriteByte(0x80000000, 4)
                emu.loadState(7)
                emu.softReset()
                emu.setEmulatorSpeed(200)
                "#,
            )
            .exec()
            .expect("script runs");
        assert_eq!(h.core.read_u8(0x8000_0000), 3);
        assert!(h.core.has_save_slot(7));
        assert_eq!(h.core.reset_count(), 1);
        assert!((h.core.emulation_speed() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn frame_count_tracks_the_clock() {
        let h = harness();
        h.core.run_frame();
        h.core.run_frame();
        let frame: i64 = h
            .lua
            .load("return emu.getFrameCount()")
            .eval()
            .expect("eval");
        assert_eq!(frame as u64, h.core.frame_clock().current());
    }

    #[test]
    fn slots_outside_range_are_rejected() {
        let h = harness();
        assert!(h.lua.load("emu.saveState(100)").exec().is_err());
        assert!(h.lua.load("emu.loadState(-1)").exec().is_err());
        assert!(h.lua.load("emu.setEmulatorSpeed(-5)").exec().is_err());
    }
}

use mlua::{Lua, Result as LuaResult, Value, Variadic};

use super::args::expect_bits;

pub(super) fn install_bit(lua: &Lua) -> LuaResult<()> {
    let bit = lua.create_table()?;
    bit.set(
        "band",
        lua.create_function(|_, args: Variadic<Value>| {
            let a = expect_bits("bit.band", &args, 0, 32)?;
            let b = expect_bits("bit.band", &args, 1, 32)?;
            Ok(a & b)
        })?,
    )?;
    lua.globals().set("bit", bit)?;
    Ok(())
}

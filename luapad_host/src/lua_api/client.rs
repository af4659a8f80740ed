use mlua::{Lua, Result as LuaResult, Value, Variadic};

use super::args::display_value;
use super::SessionServices;

/// `client.print` writes one line per call to the session console.
pub(super) fn install_client(lua: &Lua, services: SessionServices) -> LuaResult<()> {
    let client = lua.create_table()?;
    client.set(
        "print",
        lua.create_function(move |_, args: Variadic<Value>| {
            let mut line = display_value(args.first());
            line.push('\n');
            services.log(&line);
            Ok(())
        })?,
    )?;
    lua.globals().set("client", client)?;
    Ok(())
}

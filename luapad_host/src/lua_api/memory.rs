use mlua::{Lua, MultiValue, Result as LuaResult, Value, Variadic};

use super::args::{
    argument_error, expect_address, expect_bits, expect_bytes, expect_float, expect_integer,
    expect_offset,
};
use super::optional;
use crate::memory::{MemoryAccessBridge, MemoryValue, Width};

/// Largest `ReadString` a script may request in one call.
pub(crate) const MAX_STRING_READ: i64 = 1 << 20;

/// Parses `(base, off1, ..., offN)` out of the first `len` arguments.
fn address_chain(function: &str, args: &[Value], len: usize) -> LuaResult<(u32, Vec<u32>)> {
    let base = expect_address(function, args, 0)?;
    let offsets = (1..len)
        .map(|index| expect_offset(function, args, index))
        .collect::<LuaResult<Vec<u32>>>()?;
    Ok((base, offsets))
}

fn to_lua<'lua>(lua: &'lua Lua, value: MemoryValue) -> LuaResult<Value<'lua>> {
    Ok(match value {
        MemoryValue::Byte(v) => Value::Integer(i64::from(v)),
        MemoryValue::Short(v) => Value::Integer(i64::from(v)),
        MemoryValue::Int(v) => Value::Integer(i64::from(v)),
        MemoryValue::Float(v) => Value::Number(f64::from(v)),
        MemoryValue::Bytes(bytes) => Value::String(lua.create_string(&bytes)?),
    })
}

fn write_value(function: &str, width: Width, args: &[Value], index: usize) -> LuaResult<MemoryValue> {
    Ok(match width {
        Width::Byte => MemoryValue::Byte(expect_bits(function, args, index, 8)? as u8),
        Width::Short => MemoryValue::Short(expect_bits(function, args, index, 16)? as u16),
        Width::Int => MemoryValue::Int(expect_bits(function, args, index, 32)?),
        Width::Float => MemoryValue::Float(expect_float(function, args, index)? as f32),
    })
}

const SCALARS: [(&str, &str, Width); 4] = [
    ("ReadByte", "WriteByte", Width::Byte),
    ("ReadShort", "WriteShort", Width::Short),
    ("ReadInt", "WriteInt", Width::Int),
    ("ReadFloat", "WriteFloat", Width::Float),
];

pub(super) fn install_memory(lua: &Lua, bridge: MemoryAccessBridge) -> LuaResult<()> {
    let memory = lua.create_table()?;

    for (read_name, write_name, width) in SCALARS {
        let read_bridge = bridge.clone();
        let read_label = format!("memory.{read_name}");
        memory.set(
            read_name,
            lua.create_function(move |lua, args: Variadic<Value>| {
                if args.is_empty() {
                    return Ok(MultiValue::new());
                }
                let (base, offsets) = address_chain(&read_label, &args, args.len())?;
                let value = read_bridge.read(width, base, &offsets);
                Ok(optional(Some(to_lua(lua, value)?)))
            })?,
        )?;

        let write_bridge = bridge.clone();
        let write_label = format!("memory.{write_name}");
        memory.set(
            write_name,
            lua.create_function(move |_, args: Variadic<Value>| {
                if args.is_empty() {
                    return Ok(());
                }
                if args.len() < 2 {
                    return Err(argument_error(&write_label, "expected an address and a value"));
                }
                let value_index = args.len() - 1;
                let (base, offsets) = address_chain(&write_label, &args, value_index)?;
                let value = write_value(&write_label, width, &args, value_index)?;
                write_bridge.write(base, &offsets, &value);
                Ok(())
            })?,
        )?;
    }

    let read_bridge = bridge.clone();
    memory.set(
        "ReadString",
        lua.create_function(move |lua, args: Variadic<Value>| {
            const NAME: &str = "memory.ReadString";
            if args.is_empty() {
                return Ok(MultiValue::new());
            }
            if args.len() < 2 {
                return Err(argument_error(NAME, "expected an address and a length"));
            }
            let len_index = args.len() - 1;
            let len = expect_integer(NAME, &args, len_index)?;
            if !(0..=MAX_STRING_READ).contains(&len) {
                return Err(argument_error(
                    NAME,
                    format!("length must be within [0, {MAX_STRING_READ}] (got {len})"),
                ));
            }
            let (base, offsets) = address_chain(NAME, &args, len_index)?;
            let bytes = read_bridge.read_string(base, &offsets, len as usize);
            Ok(optional(Some(to_lua(lua, MemoryValue::Bytes(bytes))?)))
        })?,
    )?;

    let write_bridge = bridge.clone();
    memory.set(
        "WriteString",
        lua.create_function(move |_, args: Variadic<Value>| {
            const NAME: &str = "memory.WriteString";
            if args.is_empty() {
                return Ok(());
            }
            if args.len() < 2 {
                return Err(argument_error(NAME, "expected an address and a string"));
            }
            let text_index = args.len() - 1;
            let (base, offsets) = address_chain(NAME, &args, text_index)?;
            let bytes = expect_bytes(NAME, &args, text_index)?;
            write_bridge.write(base, &offsets, &MemoryValue::Bytes(bytes));
            Ok(())
        })?,
    )?;

    memory.set(
        "GetPointer",
        lua.create_function(move |_, args: Variadic<Value>| {
            const NAME: &str = "memory.GetPointer";
            if args.is_empty() {
                return Ok(MultiValue::new());
            }
            let (base, offsets) = address_chain(NAME, &args, args.len())?;
            let pointer = bridge.pointer(base, &offsets);
            Ok(optional(Some(Value::Integer(i64::from(pointer)))))
        })?,
    )?;

    lua.globals().set("memory", memory)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::core::MemoryBus;
    use crate::lua_api::tests::harness;

    #[test]
    fn scalar_round_trips_through_script() {
        let h = harness();
        h.lua
            .load(
                r#"
                memory.WriteByte(0x80000100, 0xAB)
                memory.WriteShort(0x80000102, 0xBEEF)
                memory.WriteInt(0x80000104, 0xDEADBEEF)
                memory.WriteFloat(0x80000108, 1.25)
                assert(memory.ReadByte(0x80000100) == 0xAB)
                assert(memory.ReadShort(0x80000102) == 0xBEEF)
                assert(memory.ReadInt(0x80000104) == 0xDEADBEEF)
                assert(memory.ReadFloat(0x80000108) == 1.25)
                "#,
            )
            .exec()
            .expect("script runs");
        assert_eq!(h.core.read_u32(0x8000_0104), 0xDEAD_BEEF);
    }

    #[test]
    fn negative_values_wrap_to_width() {
        let h = harness();
        h.lua
            .load("memory.WriteByte(0x80000000, -1)")
            .exec()
            .expect("script runs");
        assert_eq!(h.core.read_u8(0x8000_0000), 0xFF);
    }

    #[test]
    fn multilevel_reads_and_writes() {
        let h = harness();
        h.core.write_u32(0x8000_0200, 0x8000_0300);
        h.core.write_u32(0x8000_0308, 0x8000_0400);
        h.lua
            .load(
                r#"
                assert(memory.GetPointer(0x80000200) == 0x80000300)
                assert(memory.GetPointer(0x80000200, 0x8, 0x10) == 0x80000410)
                memory.WriteInt(0x80000200, 0x8, 0x10, 77)
                assert(memory.ReadInt(0x80000200, 0x8, 0x10) == 77)
                assert(memory.ReadInt(0x80000410) == 77)
                "#,
            )
            .exec()
            .expect("script runs");
        assert_eq!(h.core.read_u32(0x8000_0410), 77);
    }

    #[test]
    fn strings_use_explicit_length() {
        let h = harness();
        h.lua
            .load(
                r#"
                memory.WriteString(0x80000500, "LINK")
                assert(memory.ReadString(0x80000500, 2) == "LI")
                assert(memory.ReadString(0x80000500, 4) == "LINK")
                assert(#memory.ReadString(0x80000500, 6) == 6)
                "#,
            )
            .exec()
            .expect("script runs");
        assert_eq!(h.core.read_u8(0x8000_0504), 0, "no terminator is written");
    }

    #[test]
    fn writes_are_ignored_during_replay() {
        let h = harness();
        h.core.write_u8(0x8000_0600, 1);
        h.core.write_u16(0x8000_0602, 2);
        h.core.write_u32(0x8000_0604, 5);
        h.core.write_f32(0x8000_0608, 1.5);
        h.core.write_bytes(0x8000_060C, b"ABCD");
        h.core.start_playback(600);
        h.lua
            .load(
                r#"
                memory.WriteByte(0x80000600, 0x7F)
                memory.WriteShort(0x80000602, 0x7FFF)
                memory.WriteInt(0x80000604, 9)
                memory.WriteFloat(0x80000608, -2.25)
                memory.WriteString(0x8000060C, "WXYZ")
                assert(memory.ReadByte(0x80000600) == 1)
                assert(memory.ReadShort(0x80000602) == 2)
                assert(memory.ReadInt(0x80000604) == 5)
                assert(memory.ReadFloat(0x80000608) == 1.5)
                assert(memory.ReadString(0x8000060C, 4) == "ABCD")
                "#,
            )
            .exec()
            .expect("script runs");
        assert_eq!(h.core.read_u8(0x8000_0600), 1);
        assert_eq!(h.core.read_u16(0x8000_0602), 2);
        assert_eq!(h.core.read_u32(0x8000_0604), 5);
        assert_eq!(h.core.read_f32(0x8000_0608), 1.5);
        assert_eq!(h.core.read_bytes(0x8000_060C, 4), b"ABCD".to_vec());
    }

    #[test]
    fn non_finite_floats_round_trip() {
        let h = harness();
        h.lua
            .load(
                r#"
                memory.WriteFloat(0x80000700, math.huge)
                assert(memory.ReadFloat(0x80000700) == math.huge)
                memory.WriteFloat(0x80000704, -math.huge)
                assert(memory.ReadFloat(0x80000704) == -math.huge)
                memory.WriteFloat(0x80000708, 0/0)
                local nan = memory.ReadFloat(0x80000708)
                assert(nan ~= nan)
                "#,
            )
            .exec()
            .expect("script runs");
        assert_eq!(h.core.read_u32(0x8000_0700), f32::INFINITY.to_bits());
        assert_eq!(h.core.read_u32(0x8000_0704), f32::NEG_INFINITY.to_bits());
        assert!(h.core.read_f32(0x8000_0708).is_nan());
    }

    #[test]
    fn address_without_value_is_an_argument_error() {
        let h = harness();
        for call in [
            "memory.WriteByte(0x80000800)",
            "memory.WriteShort(0x80000800)",
            "memory.WriteInt(0x80000800)",
            "memory.WriteFloat(0x80000800)",
            "memory.WriteString(0x80000800)",
            "memory.ReadString(0x80000800)",
        ] {
            let err = h.lua.load(call).exec().expect_err(call);
            assert!(err.to_string().contains("expected an address and a"), "{call}: {err}");
        }
        let count: i64 = h
            .lua
            .load("memory.WriteInt() return select('#', memory.ReadString())")
            .eval()
            .expect("zero-argument calls are no-ops");
        assert_eq!(count, 0);
    }

    #[test]
    fn type_mismatch_is_a_script_error() {
        let h = harness();
        let caught: String = h
            .lua
            .load(
                r#"
                local ok, err = pcall(memory.ReadInt, "not an address")
                assert(not ok)
                return tostring(err)
                "#,
            )
            .eval()
            .expect("pcall returns");
        assert!(caught.contains("memory.ReadInt"), "{caught}");
    }
}

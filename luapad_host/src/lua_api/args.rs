//! Typed validation of script-supplied arguments.
//!
//! Every exposed function funnels its arguments through these helpers so a
//! type or range mismatch becomes a catchable Lua error naming the function
//! and the argument position.

use std::fmt::Display;

use mlua::{Error as LuaError, Result as LuaResult, Value};

pub(crate) fn argument_error(function: &str, message: impl Display) -> LuaError {
    LuaError::RuntimeError(format!("{function}: {message}"))
}

fn bad_argument(function: &str, index: usize, expected: &str, got: Option<&Value>) -> LuaError {
    let got = got.map_or("no value", |value| value.type_name());
    argument_error(
        function,
        format!("bad argument #{} ({expected} expected, got {got})", index + 1),
    )
}

pub(crate) fn expect_count(function: &str, args: &[Value], count: usize) -> LuaResult<()> {
    if args.len() != count {
        return Err(argument_error(
            function,
            format!("expected {count} arguments, got {}", args.len()),
        ));
    }
    Ok(())
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        Value::String(text) => text.to_str().ok()?.trim().parse().ok(),
        _ => None,
    }
}

/// Any Lua number, infinities and NaN included.
pub(crate) fn expect_float(function: &str, args: &[Value], index: usize) -> LuaResult<f64> {
    let value = args.get(index);
    value
        .and_then(numeric)
        .ok_or_else(|| bad_argument(function, index, "number", value))
}

pub(crate) fn expect_number(function: &str, args: &[Value], index: usize) -> LuaResult<f64> {
    let number = expect_float(function, args, index)?;
    if !number.is_finite() {
        return Err(argument_error(
            function,
            format!("bad argument #{} (finite number expected, got {number})", index + 1),
        ));
    }
    Ok(number)
}

pub(crate) fn expect_integer(function: &str, args: &[Value], index: usize) -> LuaResult<i64> {
    let value = args.get(index);
    if let Some(Value::Integer(i)) = value {
        return Ok(*i);
    }
    value
        .and_then(numeric)
        .filter(|n| n.is_finite() && n.fract() == 0.0)
        .map(|n| n as i64)
        .ok_or_else(|| bad_argument(function, index, "integer", value))
}

pub(crate) fn expect_range(
    function: &str,
    args: &[Value],
    index: usize,
    range: std::ops::RangeInclusive<i64>,
) -> LuaResult<i64> {
    let value = expect_integer(function, args, index)?;
    if !range.contains(&value) {
        return Err(argument_error(
            function,
            format!(
                "argument #{} out of range [{}, {}] (got {value})",
                index + 1,
                range.start(),
                range.end()
            ),
        ));
    }
    Ok(value)
}

pub(crate) fn expect_address(function: &str, args: &[Value], index: usize) -> LuaResult<u32> {
    expect_range(function, args, index, 0..=i64::from(u32::MAX)).map(|value| value as u32)
}

/// Pointer-chain offsets may be negative; they wrap in 32-bit space.
pub(crate) fn expect_offset(function: &str, args: &[Value], index: usize) -> LuaResult<u32> {
    expect_range(function, args, index, i64::from(i32::MIN)..=i64::from(u32::MAX))
        .map(|value| value as u32)
}

/// Integer that fits `bits` either signed or unsigned; returned as its
/// unsigned two's-complement pattern.
pub(crate) fn expect_bits(function: &str, args: &[Value], index: usize, bits: u32) -> LuaResult<u32> {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << bits) - 1;
    expect_range(function, args, index, min..=max).map(|value| (value as u32) & (max as u32))
}

pub(crate) fn expect_axis(function: &str, args: &[Value], index: usize) -> LuaResult<u8> {
    expect_range(function, args, index, 0..=i64::from(u8::MAX)).map(|value| value as u8)
}

/// Strings pass through as raw bytes; numbers are formatted the way Lua
/// would coerce them.
pub(crate) fn expect_bytes(function: &str, args: &[Value], index: usize) -> LuaResult<Vec<u8>> {
    match args.get(index) {
        Some(Value::String(text)) => Ok(text.as_bytes().to_vec()),
        Some(Value::Integer(i)) => Ok(i.to_string().into_bytes()),
        Some(Value::Number(n)) => Ok(n.to_string().into_bytes()),
        other => Err(bad_argument(function, index, "string", other)),
    }
}

pub(crate) fn expect_text(function: &str, args: &[Value], index: usize) -> LuaResult<String> {
    expect_bytes(function, args, index).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Text shown for an arbitrary value by `client.print`.
pub(crate) fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Nil) => "nil".to_string(),
        Some(Value::Boolean(flag)) => flag.to_string(),
        Some(Value::Integer(i)) => i.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(text)) => String::from_utf8_lossy(text.as_bytes()).into_owned(),
        Some(other) => other.type_name().to_string(),
    }
}

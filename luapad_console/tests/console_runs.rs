use std::fs;
use std::process::Command;

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::tempdir;

#[test]
fn script_output_and_report_are_produced() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory")?;
    let script = temp_dir.path().join("hello.lua");
    fs::write(
        &script,
        r#"
        client.print("value " .. memory.ReadInt(0x80000010))
        emu.frameAdvance()
        emu.frameAdvance()
        gui.Msg("done")
        "#,
    )?;
    let report_path = temp_dir.path().join("reports").join("session.json");

    let output = Command::new(env!("CARGO_BIN_EXE_luapad_console"))
        .arg(&script)
        .args(["--frame-interval-ms", "1", "--poke", "0x80000010=1234"])
        .arg("--report-json")
        .arg(&report_path)
        .output()
        .context("executing luapad_console")?;

    assert!(
        output.status.success(),
        "luapad_console exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("value 1234"), "stdout: {stdout}");

    let manifest: Value = serde_json::from_str(
        &fs::read_to_string(&report_path).context("reading session report")?,
    )?;
    assert_eq!(manifest["report"]["outcome"], "completed");
    assert_eq!(manifest["report"]["frames_advanced"], 2);
    assert_eq!(manifest["messages"][0]["text"], "Lua Msg: done");
    assert_eq!(manifest["console"], "value 1234\n");
    Ok(())
}

#[test]
fn frame_budget_stops_an_endless_script() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory")?;
    let script = temp_dir.path().join("endless.lua");
    fs::write(&script, "while true do emu.frameAdvance() end")?;
    let report_path = temp_dir.path().join("endless.json");

    let output = Command::new(env!("CARGO_BIN_EXE_luapad_console"))
        .arg(&script)
        .args(["--frame-interval-ms", "1", "--frames", "20"])
        .arg("--report-json")
        .arg(&report_path)
        .output()
        .context("executing luapad_console")?;

    assert!(output.status.success(), "exit status {:?}", output.status);
    let manifest: Value = serde_json::from_str(&fs::read_to_string(&report_path)?)?;
    assert_eq!(manifest["report"]["outcome"], "cancelled");
    assert!(manifest["report"]["frames_advanced"].as_u64().unwrap_or_default() > 0);
    assert!(manifest["final_frame"].as_u64().unwrap_or_default() >= 20);
    assert_eq!(manifest["console"], "Script exited.\n");
    Ok(())
}

#[test]
fn failing_script_exits_with_error() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory")?;
    let script = temp_dir.path().join("broken.lua");
    fs::write(&script, "memory.WriteInt(0x80000000, 5)\nerror('broken on purpose')")?;

    let output = Command::new(env!("CARGO_BIN_EXE_luapad_console"))
        .arg(&script)
        .args(["--frame-interval-ms", "1", "--replay-length", "1000"])
        .output()
        .context("executing luapad_console")?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken on purpose"), "stderr: {stderr}");
    Ok(())
}

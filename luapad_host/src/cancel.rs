use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mlua::{Error as LuaError, HookTriggers, Lua};

use crate::config::ControllerConfig;

/// Runtime error text raised into the script once a stop is requested.
pub const SCRIPT_EXITED: &str = "Script exited.";

/// One-way stop request for a single session.
#[derive(Debug, Default)]
pub struct CancellationFlag {
    requested: AtomicBool,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. There is no way to take the request back.
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Error to raise when the script is observed past a stop request.
    pub fn check(&self) -> mlua::Result<()> {
        if self.is_cancelled() {
            Err(LuaError::RuntimeError(SCRIPT_EXITED.to_string()))
        } else {
            Ok(())
        }
    }
}

pub(crate) fn hook_triggers(config: &ControllerConfig) -> HookTriggers {
    HookTriggers {
        every_line: config.hook_every_line,
        every_nth_instruction: config.hook_instruction_interval.filter(|n| *n > 0),
        ..HookTriggers::default()
    }
}

/// Installs the per-line / per-instruction stop check on the interpreter.
/// The interpreter never yields on its own, so this is the only point at
/// which a running script can be interrupted.
pub(crate) fn install_cancellation_hook(
    lua: &Lua,
    flag: Arc<CancellationFlag>,
    config: &ControllerConfig,
) {
    lua.set_hook(hook_triggers(config), move |_lua, _debug| flag.check());
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::{LuaOptions, StdLib};

    fn lua() -> Lua {
        Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default()).expect("lua state")
    }

    #[test]
    fn flag_is_monotonic() {
        let flag = CancellationFlag::new();
        assert!(flag.check().is_ok());
        flag.cancel();
        flag.cancel();
        assert!(flag.is_cancelled());
        assert!(flag.check().is_err());
    }

    #[test]
    fn hook_interrupts_infinite_loop() {
        let lua = lua();
        let flag = Arc::new(CancellationFlag::new());
        flag.cancel();
        install_cancellation_hook(&lua, flag, &ControllerConfig::default());
        let err = lua
            .load("while true do end")
            .exec()
            .expect_err("cancelled loop must fail");
        assert!(err.to_string().contains(SCRIPT_EXITED), "unexpected: {err}");
    }

    #[test]
    fn hook_is_silent_until_cancelled() {
        let lua = lua();
        install_cancellation_hook(
            &lua,
            Arc::new(CancellationFlag::new()),
            &ControllerConfig::default(),
        );
        let sum: i64 = lua
            .load("local s = 0\nfor i = 1, 100 do\n  s = s + i\nend\nreturn s")
            .eval()
            .expect("script runs");
        assert_eq!(sum, 5050);
    }
}

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Destination for script output and session error text. Implementations
/// must accept appends from any thread.
pub trait ConsoleSink: Send + Sync {
    fn append(&self, text: &str);
}

impl fmt::Debug for dyn ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConsoleSink")
    }
}

/// In-memory output console.
#[derive(Debug, Default)]
pub struct ConsoleBuffer {
    text: Mutex<String>,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ConsoleSink for ConsoleBuffer {
    fn append(&self, text: &str) {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }
}

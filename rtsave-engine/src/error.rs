//! Error taxonomy for the save/merge engine.
//!
//! Merge conflicts and interrupts are *not* errors: they surface as
//! [`SaveOutcome`](crate::SaveOutcome) variants. Everything here aborts the
//! current cycle and leaves the session state untouched for the next one.

/// Engine errors.
#[derive(Debug, Clone, PartialEq)]
pub enum SaverError {
    /// A merge, version or fetch request did not complete.
    Transport(String),
    /// The server answered with something we could not interpret.
    Parse(String),
    /// The physical save was rejected.
    Save { status: Option<u16>, message: String },
    /// The editor could not provide its current content.
    ContentUnavailable,
    /// The version ledger could not be advanced after a save.
    Desync(String),
    /// The realtime channel failed.
    Realtime(String),
    /// Invalid engine configuration.
    Config(String),
    /// The engine was stopped while the operation was pending.
    Stopped,
}

impl SaverError {
    /// Whether the next scheduled cycle may simply try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Parse(_) | Self::Save { .. } | Self::ContentUnavailable
        )
    }
}

impl std::fmt::Display for SaverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Save { status: Some(code), message } => {
                write!(f, "Save failed with status {code}: {message}")
            }
            Self::Save { status: None, message } => write!(f, "Save failed: {message}"),
            Self::ContentUnavailable => write!(f, "Unable to get the content of the document"),
            Self::Desync(e) => write!(f, "Version ledger desync: {e}"),
            Self::Realtime(e) => write!(f, "Realtime channel error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Stopped => write!(f, "Saver stopped"),
        }
    }
}

impl std::error::Error for SaverError {}

impl From<reqwest::Error> for SaverError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SaverError::Parse(e.to_string())
        } else {
            SaverError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SaverError {
    fn from(e: serde_json::Error) -> Self {
        SaverError::Parse(e.to_string())
    }
}

//! Collaborators the engine drives but does not implement.
//!
//! ```text
//!            ┌──────────────┐
//!            │    Saver     │
//!            └──────┬───────┘
//!   ┌────────┬──────┼────────┬──────────┬──────────┐
//!   ▼        ▼      ▼        ▼          ▼          ▼
//! Backend  Editor History  Prompt   Reporter   EventSink
//! (HTTP)   surface (depth) (choice) (errors)   (user msgs)
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::SaverError;
use crate::protocol::{MergeRequest, MergeResult, RemoteContent, SafeSaveRequest, VersionInfo, VersionQuery};

/// Server endpoints: merge, version query, remote fetch, physical save.
#[async_trait]
pub trait SaveBackend: Send + Sync {
    async fn merge(&self, request: &MergeRequest) -> Result<MergeResult, SaverError>;

    async fn version(&self, query: &VersionQuery) -> Result<VersionInfo, SaverError>;

    async fn fetch_remote(&self) -> Result<RemoteContent, SaverError>;

    /// Submit serialized form data to the save endpoint.
    async fn save_document(&self, form: &str) -> Result<(), SaverError>;
}

/// The host editor: where content is read from and written to.
#[async_trait]
pub trait EditorSurface: Send + Sync {
    /// Current editable content, `None` if the editor cannot provide it.
    fn text_value(&self) -> Option<String>;

    /// Replace the editable content. `overwrite` is set when the user chose
    /// to discard local edits.
    async fn set_text_value(&self, content: &str, overwrite: bool) -> Result<(), SaverError>;

    /// Serialized save form for the physical save.
    fn save_value(&self) -> String;

    /// Save without the merge step (used when merge-on-save is disabled).
    async fn safe_save(&self, request: SafeSaveRequest) -> Result<(), SaverError>;

    /// Leave the editor for the view page.
    fn redirect_to_view(&self) {}
}

/// Realtime history of the edited content.
pub trait History: Send + Sync {
    /// How far back `content` appears in the known history, `None` if never.
    fn depth_of_state(&self, content: &str) -> Option<usize>;
}

/// User's answer to a merge conflict prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Keep the realtime (local) content.
    KeepLocal,
    /// Discard local edits, load the saved remote content.
    KeepRemote,
    /// Prompt closed without an answer.
    Dismissed,
}

/// Texts of the binary conflict prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictPrompt {
    pub question: String,
    pub keep_local_label: String,
    pub keep_remote_label: String,
    /// Merge conflict as reported by the server
    pub details: String,
}

/// Presents a two-way choice to the user.
#[async_trait]
pub trait DecisionPrompt: Send + Sync {
    async fn choose(&self, prompt: &ConflictPrompt) -> ConflictChoice;
}

/// Error classes shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Merge answer could not be parsed
    Parse,
    /// Merge endpoint failed
    Merge,
    /// Physical save failed
    Save,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::Merge => write!(f, "merge"),
            Self::Save => write!(f, "save"),
        }
    }
}

/// Error box and crash reporting.
pub trait Reporter: Send + Sync {
    fn show(&self, kind: ErrorKind, details: &str);

    /// Unrecoverable desync of the shared version ledger.
    fn safe_crash(&self, context: &str, details: &str);
}

/// Messages for the user about saves and merges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaverEvent {
    /// We saved a new version.
    Saved { version: String },
    /// Someone with our editor type saved and we adopted their version.
    SavedRemote { version: String, by: String },
    /// Someone saved from a different editor.
    SavedRemoteNoMerge { version: String, by: String, editor_name: String },
    /// A peer's save closed our open conflict prompt.
    ConflictResolved { version: String },
    /// Local content was replaced with the saved remote content.
    MergeOverwrite,
    /// The server merged against this version.
    VersionHint { version: String },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: SaverEvent);
}

/// [`Reporter`] writing to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn show(&self, kind: ErrorKind, details: &str) {
        log::error!("[{kind}] {details}");
    }

    fn safe_crash(&self, context: &str, details: &str) {
        log::error!("saver crashed in {context}: {details}");
    }
}

/// [`EventSink`] writing to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl EventSink for LogEvents {
    fn emit(&self, event: SaverEvent) {
        log::info!("{event:?}");
    }
}

/// Everything the engine talks to, bundled for the session.
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn SaveBackend>,
    pub surface: Arc<dyn EditorSurface>,
    pub history: Arc<dyn History>,
    pub prompt: Arc<dyn DecisionPrompt>,
    pub reporter: Arc<dyn Reporter>,
    pub events: Arc<dyn EventSink>,
}

impl Collaborators {
    /// Bundle with log-backed reporting and events.
    pub fn new(
        backend: Arc<dyn SaveBackend>,
        surface: Arc<dyn EditorSurface>,
        history: Arc<dyn History>,
        prompt: Arc<dyn DecisionPrompt>,
    ) -> Self {
        Self {
            backend,
            surface,
            history,
            prompt,
            reporter: Arc::new(LogReporter),
            events: Arc::new(LogEvents),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

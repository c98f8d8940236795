//! # rtsave-engine — Save/merge coordination for realtime wiki editing
//!
//! Decides when a shared realtime document gets persisted, reconciles it
//! with the wiki's three-way merge, and tells every other editor about new
//! versions so that exactly one of them saves.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  tick (jitter)  ┌──────────────┐   POST merge    ┌─────────────┐
//! │  Scheduler   │ ──────────────► │    Merge     │ ──────────────► │    Wiki     │
//! │  (guards)    │                 │ coordinator  │ ◄────────────── │ (HTTP)      │
//! └──────────────┘                 └──────┬───────┘  MergeResult    └─────────────┘
//!                                         │ conflict?
//!                                         ▼
//!                                  ┌──────────────┐
//!                                  │  Conflict    │ keep local / keep remote
//!                                  │  resolver    │
//!                                  └──────┬───────┘
//!                                         ▼
//! ┌──────────────┐  peer map (yrs) ┌──────────────┐
//! │   Channel    │ ◄────────────── │ Version bump │  (version, sha256, by)
//! │ (peer saves) │ ──────────────► │              │
//! └──────────────┘   ISAVE / echo  └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`record`] — last saved (version, content) and coordination flags
//! - [`peer`] — peer save records and the validated peer map
//! - [`channel`] — publish our saves, react to everyone else's
//! - [`merge`] — merge coordinator and [`SaveOutcome`]
//! - [`conflict`] — keep-local / keep-remote resolution
//! - [`bump`] — version bump and announcement
//! - [`scheduler`] — jittered periodic save check
//! - [`saver`] — engine facade: start/stop, save buttons, save hooks
//! - [`session`] — per-session context shared by all of the above
//! - [`collab`] — collaborator traits (backend, editor, history, prompt, reporter)
//! - [`protocol`] — endpoint request/response shapes
//! - [`transport`] — realtime transport trait and the in-process yrs hub
//! - [`http`] — reqwest implementation of the wiki endpoints
//! - [`config`] — [`SaverConfig`]
//! - [`error`] — [`SaverError`]

pub mod bump;
pub mod channel;
pub mod collab;
pub mod config;
pub mod conflict;
pub mod error;
pub mod http;
pub mod merge;
pub mod peer;
pub mod protocol;
pub mod record;
pub mod saver;
pub mod scheduler;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use collab::{
    Collaborators, ConflictChoice, ConflictPrompt, DecisionPrompt, EditorSurface, ErrorKind,
    EventSink, History, LogEvents, LogReporter, Reporter, SaveBackend, SaverEvent,
};
pub use config::SaverConfig;
pub use error::SaverError;
pub use http::HttpBackend;
pub use merge::SaveOutcome;
pub use peer::{PeerMap, PeerSave, PeerState};
pub use protocol::{
    DocumentRef, MergeConflict, MergeRequest, MergeResult, RemoteContent, SafeSaveRequest,
    VersionInfo, VersionQuery,
};
pub use record::{LastSavedRecord, SavedState};
pub use saver::Saver;
pub use scheduler::{Check, SkipReason};
pub use session::Session;
pub use transport::{HubTransport, RealtimeTransport, SharedMapHub, TransportEvent};

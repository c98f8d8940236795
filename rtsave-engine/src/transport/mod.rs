//! Realtime replication of the peer map.
//!
//! The engine only needs a replicated string document per channel plus
//! three notifications; how bytes travel is the transport's business.
//!
//! - [`hub`] — in-process yrs-backed implementation (tests, agent)
//! - [`frame`] — bincode framing used by the hub

pub mod frame;
pub mod hub;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SaverError;

pub use frame::HubFrame;
pub use hub::{HubStats, HubTransport, SharedMapHub};

/// Notifications delivered by a joined transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// Initial state is in; `user_doc` is meaningful from now on.
    Ready,
    /// A remote participant changed the user document.
    Remote,
    /// The channel is gone.
    Abort,
}

/// A replicated user document shared by every editor of one page.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Join the channel. The receiver yields `Ready` first.
    async fn join(&self) -> Result<mpsc::Receiver<TransportEvent>, SaverError>;

    /// Current user document (JSON-encoded peer map).
    fn user_doc(&self) -> String;

    /// Publish a new user document.
    async fn content_update(&self, doc: &str) -> Result<(), SaverError>;

    /// Resolves once local changes have propagated.
    async fn settle(&self);

    /// Leave the channel; no events are delivered afterwards.
    async fn leave(&self);
}

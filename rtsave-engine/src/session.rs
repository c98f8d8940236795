//! Session-scoped coordination context.
//!
//! One [`Session`] per editing session; every component receives it
//! explicitly. Locks are never held across an await.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify, RwLock};
use tokio::task::AbortHandle;

use crate::collab::Collaborators;
use crate::config::SaverConfig;
use crate::peer::PeerMap;
use crate::protocol::{DocumentRef, VersionQuery};
use crate::record::LastSavedRecord;
use crate::transport::RealtimeTransport;

/// Advisory flags checked synchronously by the scheduler.
#[derive(Debug, Default)]
pub struct Guards {
    /// A conflict prompt is open
    pub dialog_open: bool,
    /// A save attempt is running
    pub attempt_in_flight: bool,
    /// Remote notifications are processed silently until ready
    pub initializing: bool,
    /// Closes the open conflict prompt
    dismiss: Option<oneshot::Sender<()>>,
}

impl Guards {
    /// Mark the prompt open; the receiver fires if it gets dismissed.
    pub fn open_dialog(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.dialog_open = true;
        self.dismiss = Some(tx);
        rx
    }

    pub fn close_dialog(&mut self) {
        self.dialog_open = false;
        self.dismiss = None;
    }

    /// Close the prompt from outside. Returns whether one was open.
    pub fn dismiss_dialog(&mut self) -> bool {
        let was_open = self.dialog_open;
        if let Some(tx) = self.dismiss.take() {
            let _ = tx.send(());
        }
        self.dialog_open = false;
        was_open
    }
}

pub struct Session {
    pub config: SaverConfig,
    pub collab: Collaborators,
    pub transport: Arc<dyn RealtimeTransport>,
    pub record: RwLock<LastSavedRecord>,
    /// Our copy of the shared peer map
    pub peers: RwLock<PeerMap>,
    pub guards: Mutex<Guards>,
    /// Signalled whenever `attempt_in_flight` is cleared
    attempt_done: Notify,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl Session {
    pub fn new(
        config: SaverConfig,
        collab: Collaborators,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Arc<Self> {
        let record = LastSavedRecord::new(config.version.clone(), config.version_time);
        Arc::new(Self {
            config,
            collab,
            transport,
            record: RwLock::new(record),
            peers: RwLock::new(PeerMap::new()),
            guards: Mutex::new(Guards {
                initializing: true,
                ..Guards::default()
            }),
            attempt_done: Notify::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn document(&self) -> DocumentRef {
        DocumentRef {
            wiki: self.config.wiki.clone(),
            document: self.config.document.clone(),
            language: self.config.language.clone(),
        }
    }

    pub async fn version_query(&self) -> VersionQuery {
        VersionQuery {
            doc: self.document(),
            version: self.record.read().await.version().to_string(),
        }
    }

    /// Consume the ISAVE interrupt. True means: abort what you are doing.
    pub async fn take_interrupt(&self) -> bool {
        if self.record.write().await.take_interrupt() {
            log::warn!("another client sent an ISAVE, aborting save action");
            true
        } else {
            false
        }
    }

    /// Wait until no attempt is running, then claim the slot.
    pub async fn acquire_attempt(&self) {
        loop {
            let notified = self.attempt_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut guards = self.guards.lock().await;
                if !guards.attempt_in_flight {
                    guards.attempt_in_flight = true;
                    return;
                }
            }
            log::debug!("waiting for the running save attempt");
            notified.await;
        }
    }

    /// Free the attempt slot and wake anyone waiting for it.
    pub async fn release_attempt(&self) {
        self.guards.lock().await.attempt_in_flight = false;
        self.attempt_done.notify_waiters();
    }

    pub async fn is_initializing(&self) -> bool {
        self.guards.lock().await.initializing
    }

    /// JSON blob attached to error reports.
    pub async fn debug_log(&self, state: &str) -> String {
        let record = self.record.read().await;
        json!({
            "state": state,
            "lastSavedVersion": record.version(),
            "lastSavedContent": record.content(),
            "user": self.config.user_name,
            "content": self.collab.surface.text_value(),
        })
        .to_string()
    }

    /// Track a background task so `shutdown` can cancel it.
    pub async fn track(&self, handle: AbortHandle) {
        let mut tasks = self.tasks.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Cancel tracked tasks and reset all session state.
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        {
            let mut guards = self.guards.lock().await;
            guards.dismiss_dialog();
            guards.attempt_in_flight = false;
            guards.initializing = true;
        }
        self.attempt_done.notify_waiters();
        self.peers.write().await.clear();
        self.record.write().await.reset();
    }
}

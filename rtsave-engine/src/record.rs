//! The client's belief about the last saved version.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Last known-saved state of the document.
///
/// `version` and `content` only change together, through
/// [`LastSavedRecord::adopt`] or [`LastSavedRecord::reset`].
#[derive(Debug, Default)]
pub struct LastSavedRecord {
    version: String,
    content: String,
    /// Epoch ms of the last save-relevant event
    pub time: u64,
    pub has_modifications: bool,
    pub was_edited_locally: bool,
    /// A peer's ISAVE arrived since the last save attempt started
    pub received_isave: bool,
    /// The pending physical save navigates away once echoed
    pub should_redirect: bool,
    own_isave: Option<oneshot::Sender<()>>,
}

impl LastSavedRecord {
    pub fn new(version: impl Into<String>, time: u64) -> Self {
        Self {
            version: version.into(),
            time,
            ..Self::default()
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Record a save of `content`: bumps the time, clears the local edit flag.
    pub fn update(&mut self, content: impl Into<String>) {
        self.time = now_millis();
        self.content = content.into();
        self.was_edited_locally = false;
    }

    pub fn set_edited_locally(&mut self, flag: bool) {
        self.was_edited_locally = flag;
        if flag {
            self.has_modifications = true;
        }
    }

    /// Override the content without touching time or flags.
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    /// Take a new authoritative (version, content) pair.
    pub fn adopt(&mut self, version: impl Into<String>, content: impl Into<String>) {
        self.version = version.into();
        self.content = content.into();
    }

    /// Arm the one-shot "own ISAVE came back" slot, replacing any pending one.
    pub fn arm_own_isave(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.own_isave = Some(tx);
        rx
    }

    pub fn own_isave_pending(&self) -> bool {
        self.own_isave.is_some()
    }

    /// Fire and clear the own-ISAVE slot. Returns whether something fired.
    pub fn fire_own_isave(&mut self) -> bool {
        match self.own_isave.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Consume the interrupt flag.
    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.received_isave)
    }

    /// Back to an empty record. Drops any armed own-ISAVE slot.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Cheap copy of the comparable fields.
    pub fn snapshot(&self) -> SavedState {
        SavedState {
            version: self.version.clone(),
            content: self.content.clone(),
            time: self.time,
            was_edited_locally: self.was_edited_locally,
        }
    }
}

/// Point-in-time view of a [`LastSavedRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedState {
    pub version: String,
    pub content: String,
    pub time: u64,
    pub was_edited_locally: bool,
}

//! Conflict resolution: ask the user, then keep local edits or load the
//! saved remote content.
//!
//! While the prompt is open `Guards::dialog_open` keeps the scheduler from
//! starting another attempt. The prompt closes when the user answers, when
//! a peer save dismisses it, or when the optional timeout elapses.

use tokio::time::sleep;

use crate::collab::{ConflictChoice, ConflictPrompt, ErrorKind, SaverEvent};
use crate::error::SaverError;
use crate::merge::SaveOutcome;
use crate::session::Session;

impl ConflictPrompt {
    /// The standard two-way question for a merge conflict.
    pub fn for_conflict(details: impl Into<String>) -> Self {
        Self {
            question: "Your changes conflict with a version saved by someone else. \
                       Keep your realtime changes, or discard them and load the saved version?"
                .into(),
            keep_local_label: "Keep realtime changes".into(),
            keep_remote_label: "Load saved version".into(),
            details: details.into(),
        }
    }
}

/// Show the prompt and wait for a decision.
pub async fn resolve(session: &Session, details: &str) -> ConflictChoice {
    let dismissed = session.guards.lock().await.open_dialog();
    let prompt = ConflictPrompt::for_conflict(details);
    let ask = session.collab.prompt.choose(&prompt);

    let choice = match session.config.conflict_timeout() {
        Some(limit) => tokio::select! {
            choice = ask => choice,
            _ = dismissed => ConflictChoice::Dismissed,
            _ = sleep(limit) => {
                log::warn!("conflict prompt unanswered after {} ms", limit.as_millis());
                ConflictChoice::Dismissed
            }
        },
        None => tokio::select! {
            choice = ask => choice,
            _ = dismissed => ConflictChoice::Dismissed,
        },
    };

    session.guards.lock().await.close_dialog();
    log::debug!("conflict resolved: {choice:?}");
    choice
}

/// Discard local edits in favour of the saved remote content. Never merges
/// again; the caller goes straight to the version bump.
pub async fn keep_remote(session: &Session) -> Result<SaveOutcome, SaverError> {
    let remote = match session.collab.backend.fetch_remote().await {
        Ok(remote) => remote,
        Err(e) => {
            log::warn!("unable to fetch the saved content: {e}");
            let details = session.debug_log("keepremote").await;
            session.collab.reporter.show(ErrorKind::Merge, &details);
            return Err(e);
        }
    };

    session.collab.surface.set_text_value(&remote.content, true).await?;
    session.collab.events.emit(SaverEvent::MergeOverwrite);
    Ok(SaveOutcome::NoSaveNeeded)
}

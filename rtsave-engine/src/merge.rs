//! Merge coordinator.
//!
//! ```text
//! POST merge ──► interrupted? ──yes──► Interrupted
//!                    │ no
//!                    ▼
//!      content == last saved? ──yes──► Unchanged (clear edited flag)
//!                    │ no
//!                    ▼
//!               merged? ──no──────────────────────────────┐
//!                    │ yes                                │
//!                    ▼                                    │
//!               conflict? ──yes──► ConflictResolver       │
//!                    │ no                                 │
//!                    ▼                                    │
//!      local text moved? ──yes──► Stale                   │
//!                    │ no                                 │
//!                    ▼                                    │
//!      ancestor in history? ──no──► apply merged text     │
//!                    │                    │               │
//!                    ▼                    ▼               ▼
//!              interrupted? ──► SaveNeeded / NoSaveNeeded
//! ```

use crate::collab::{ConflictChoice, ErrorKind, SaverEvent};
use crate::conflict;
use crate::error::SaverError;
use crate::protocol::{MergeRequest, MergeResult};
use crate::session::Session;

/// How a save attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing changed since the last save.
    Unchanged,
    /// The server already has this content; bump without saving.
    NoSaveNeeded,
    /// A physical save is required.
    SaveNeeded,
    /// A peer saved while we were waiting.
    Interrupted,
    /// Local content moved while the merge was in flight.
    Stale,
    /// The conflict prompt closed without an answer.
    ConflictPending,
}

impl SaveOutcome {
    /// Whether the version bump runs after this outcome.
    pub fn bumps(self) -> bool {
        matches!(self, Self::SaveNeeded | Self::NoSaveNeeded)
    }
}

/// Merge `content` (the pre-merge snapshot) against the server's history.
pub async fn merge_routine(session: &Session, content: String) -> Result<SaveOutcome, SaverError> {
    let request = MergeRequest {
        doc: session.document(),
        version: session.record.read().await.version().to_string(),
        content,
        convert_html: session.config.is_html.then_some(1),
    };

    let result = match session.collab.backend.merge(&request).await {
        Ok(result) => result.normalize(),
        Err(e) => {
            log::warn!("merge request failed: {e}");
            let kind = match e {
                SaverError::Parse(_) => ErrorKind::Parse,
                _ => ErrorKind::Merge,
            };
            let details = session.debug_log("merge").await;
            session.collab.reporter.show(kind, &format!("{e}\n{details}"));
            return Err(e);
        }
    };

    if session.take_interrupt().await {
        return Ok(SaveOutcome::Interrupted);
    }

    {
        let mut record = session.record.write().await;
        if result.content == record.content() {
            log::debug!("merge result is the last saved content, nothing to save");
            record.set_edited_locally(false);
            return Ok(SaveOutcome::Unchanged);
        }
    }

    if !result.merged {
        return Ok(finish(session, &result).await);
    }

    if !result.current_version.is_empty() {
        session.collab.events.emit(SaverEvent::VersionHint {
            version: result.current_version.clone(),
        });
    }

    if let Some(details) = result.conflict() {
        return match conflict::resolve(session, details).await {
            ConflictChoice::KeepLocal => Ok(finish(session, &result).await),
            ConflictChoice::KeepRemote => conflict::keep_remote(session).await,
            ConflictChoice::Dismissed => Ok(SaveOutcome::ConflictPending),
        };
    }

    let now = session.collab.surface.text_value();
    if now.as_deref() != Some(request.content.as_str()) {
        log::warn!("content changed during the merge, retrying next cycle");
        return Ok(SaveOutcome::Stale);
    }

    let seen = result
        .previous_version_content
        .as_deref()
        .and_then(|previous| session.collab.history.depth_of_state(previous));
    match seen {
        Some(depth) => {
            log::debug!("merged a version already in history (depth {depth}), not applying");
        }
        None => {
            session
                .collab
                .surface
                .set_text_value(&result.content, false)
                .await?;
        }
    }

    Ok(finish(session, &result).await)
}

/// Last interrupt check, then the server's "save needed?" answer.
async fn finish(session: &Session, result: &MergeResult) -> SaveOutcome {
    if session.take_interrupt().await {
        SaveOutcome::Interrupted
    } else if result.save_required {
        SaveOutcome::SaveNeeded
    } else {
        SaveOutcome::NoSaveNeeded
    }
}

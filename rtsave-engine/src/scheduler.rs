//! Save scheduler.
//!
//! ```text
//!        ┌────────── sleep(rand[0, check_cycle)) ◄──────────┐
//!        ▼                                                  │
//!    CHECK_DUE ── busy / not edited / too soon /            │
//!        │        dialog open / demo mode ──► SKIP ─────────┤
//!        ▼                                                  │
//!     ATTEMPT (own task) ─────────── next tick ─────────────┘
//!        │
//!        ▼
//!   save_routine ──► finalize (save + bump │ bump │ nothing)
//! ```
//!
//! The next tick never waits for an attempt: attempts run on their own task
//! and `attempt_in_flight` keeps them from overlapping.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::bump;
use crate::collab::{ErrorKind, SaverEvent};
use crate::error::SaverError;
use crate::merge::{self, SaveOutcome};
use crate::protocol::SafeSaveRequest;
use crate::record::now_millis;
use crate::session::Session;

/// Why a check did not start an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another attempt is still running.
    Busy,
    /// No local edits since the last save.
    NotEdited,
    /// The last save is more recent than the minimum gap.
    TooSoon { remaining_ms: u64 },
    /// A conflict prompt is open.
    DialogOpen,
    /// Saving is disabled for this session.
    DemoMode,
}

/// Result of one scheduler tick.
#[derive(Debug)]
pub enum Check {
    Skipped(SkipReason),
    Started(JoinHandle<Result<SaveOutcome, SaverError>>),
}

/// Random delay in `[0, cycle)`, so peers do not save in lockstep.
pub fn jitter(cycle: Duration) -> Duration {
    let ceiling = cycle.as_millis() as u64;
    if ceiling == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..ceiling))
}

/// Run the periodic check until the task is aborted.
pub fn spawn(session: Arc<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = jitter(session.config.check_cycle());
            log::trace!("will attempt to save again in {} ms", wait.as_millis());
            sleep(wait).await;

            match check(&session).await {
                Check::Started(attempt) => session.track(attempt.abort_handle()).await,
                Check::Skipped(reason) => log::trace!("not saving: {reason:?}"),
            }
        }
    })
}

/// Evaluate the guards and start an attempt if they all pass.
pub async fn check(session: &Arc<Session>) -> Check {
    {
        let mut guards = session.guards.lock().await;
        let record = session.record.read().await;

        let reason = if guards.attempt_in_flight {
            Some(SkipReason::Busy)
        } else if !record.was_edited_locally {
            Some(SkipReason::NotEdited)
        } else {
            let elapsed = now_millis().saturating_sub(record.time);
            let gap = session.config.save_interval().as_millis() as u64;
            if elapsed < gap {
                Some(SkipReason::TooSoon {
                    remaining_ms: gap - elapsed,
                })
            } else if guards.dialog_open {
                Some(SkipReason::DialogOpen)
            } else if session.config.demo_mode {
                Some(SkipReason::DemoMode)
            } else {
                None
            }
        };

        if let Some(reason) = reason {
            return Check::Skipped(reason);
        }
        guards.attempt_in_flight = true;
    }

    let session = session.clone();
    Check::Started(tokio::spawn(async move {
        let result = attempt(&session).await;
        session.release_attempt().await;
        result
    }))
}

async fn attempt(session: &Session) -> Result<SaveOutcome, SaverError> {
    let outcome = match save_routine(session, false, true).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_retryable() => {
            log::warn!("save attempt aborted, retrying next cycle: {e}");
            return Err(e);
        }
        Err(e) => {
            log::error!("save attempt aborted: {e}");
            return Err(e);
        }
    };
    finalize(session, outcome).await?;
    Ok(outcome)
}

/// One save attempt up to the "save needed?" decision.
pub async fn save_routine(
    session: &Session,
    force: bool,
    autosave: bool,
) -> Result<SaveOutcome, SaverError> {
    // Any ISAVE seen before this point is already accounted for.
    session.record.write().await.received_isave = false;

    let Some(content) = session.collab.surface.text_value() else {
        log::warn!("unable to get the content of the document, not saving");
        return Err(SaverError::ContentUnavailable);
    };

    if !force && content == session.record.read().await.content() {
        log::debug!("content unchanged since the last save");
        return Ok(SaveOutcome::Unchanged);
    }

    if session.config.merge_content {
        return merge::merge_routine(session, content).await;
    }

    let request = {
        let record = session.record.read().await;
        SafeSaveRequest {
            force,
            autosave,
            version: record.version().to_string(),
            version_time: record.time,
        }
    };
    session.collab.surface.safe_save(request).await?;
    Ok(SaveOutcome::SaveNeeded)
}

/// Act on the decision: save and bump, bump only, or nothing.
pub async fn finalize(session: &Session, outcome: SaveOutcome) -> Result<(), SaverError> {
    if !outcome.bumps() {
        log::debug!("no save after {outcome:?}");
        return Ok(());
    }
    if outcome == SaveOutcome::NoSaveNeeded {
        {
            let mut record = session.record.write().await;
            if let Some(current) = session.collab.surface.text_value() {
                record.set_content(current);
            }
            // The server already holds these edits.
            record.set_edited_locally(false);
        }
        bump::bump_version(session, None).await?;
        return Ok(());
    }

    let to_save = session
        .collab
        .surface
        .text_value()
        .ok_or(SaverError::ContentUnavailable)?;
    let form = session.collab.surface.save_value();
    if let Err(e) = session.collab.backend.save_document(&form).await {
        log::warn!("physical save failed: {e}");
        session.collab.reporter.show(ErrorKind::Save, &e.to_string());
        return Err(e);
    }
    session.record.write().await.update(to_save);

    let info = bump::bump_version(session, None).await?;
    session
        .collab
        .events
        .emit(SaverEvent::Saved { version: info.version });
    Ok(())
}

//! Peer notification channel.
//!
//! ```text
//!  publish(state)                         receive(user_doc)
//!       │                                       │
//!       ▼                                       ▼
//!  user_doc + own slot ──► content_update   parse ─► diff vs snapshot
//!                                               │
//!                 ┌─────────────────────────────┼────────────────────┐
//!                 ▼                             ▼                    ▼
//!        own type, new version        own type, same version    foreign type
//!        adopt + clear edited flag    fire own-ISAVE slot       notify only
//! ```

use crate::collab::SaverEvent;
use crate::error::SaverError;
use crate::peer::{PeerMap, PeerSave, PeerState};
use crate::record::now_millis;
use crate::session::Session;

/// Announce our own save. Only our slot is written; other slots are taken
/// from the transport's current replica.
pub async fn publish(session: &Session, state: PeerState) -> Result<(), SaverError> {
    let editor_type = session.config.editor_type.as_str();
    let mut doc = match PeerMap::parse(&session.transport.user_doc()) {
        Ok((map, _)) => map,
        Err(e) => {
            log::warn!("replacing unreadable user doc: {e}");
            PeerMap::new()
        }
    };
    doc.insert(editor_type, state.clone());
    let sent = doc.to_json()?;

    // Our own slot is never reported back as a change.
    session.peers.write().await.insert(editor_type, state.clone());
    session.transport.content_update(&sent).await?;

    let published = PeerMap::parse(&session.transport.user_doc())
        .ok()
        .and_then(|(map, _)| map.get(editor_type).cloned());
    if published.as_ref() != Some(&state) {
        log::warn!("user doc after publish does not hold our save of version {}", state.version);
    }
    Ok(())
}

/// Process a new user document. Returns how many entries changed.
pub async fn receive(session: &Session, raw: &str) -> Result<usize, SaverError> {
    let (next, corrupted) = PeerMap::parse(raw)?;
    if corrupted > 0 {
        log::debug!("ignoring {corrupted} malformed peer entries");
    }

    let changes = session.peers.read().await.changes(&next);
    let quiet = session.is_initializing().await;
    for change in &changes {
        apply_change(session, change, quiet).await;
    }

    *session.peers.write().await = next;
    Ok(changes.len())
}

async fn apply_change(session: &Session, change: &PeerSave, quiet: bool) {
    let state = &change.state;
    let own_type = change.editor_type == session.config.editor_type;

    let adopted = if own_type {
        // Read before locking the record; the surface may be slow.
        let current = session.collab.surface.text_value().unwrap_or_default();
        let mut record = session.record.write().await;
        record.received_isave = true;
        let adopted = record.version() != state.version;
        if adopted {
            log::debug!("adopting version {} saved by {}", state.version, state.by);
            record.adopt(&state.version, current);
            record.set_edited_locally(false);
        } else {
            record.fire_own_isave();
        }
        record.time = now_millis();
        adopted
    } else {
        session.record.write().await.received_isave = true;
        false
    };

    // Our own echo is not worth a message.
    if own_type && !adopted {
        return;
    }
    let dismissed = session.guards.lock().await.dismiss_dialog();
    if quiet {
        return;
    }

    let by = state.sender_name().to_string();
    let event = if dismissed {
        SaverEvent::ConflictResolved {
            version: state.version.clone(),
        }
    } else if own_type {
        SaverEvent::SavedRemote {
            version: state.version.clone(),
            by,
        }
    } else {
        SaverEvent::SavedRemoteNoMerge {
            version: state.version.clone(),
            by,
            editor_name: state.editor_name.clone(),
        }
    };
    session.collab.events.emit(event);
}

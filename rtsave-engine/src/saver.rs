//! Engine facade: lifecycle, manual save actions and save hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bump;
use crate::channel;
use crate::collab::{Collaborators, ErrorKind};
use crate::config::SaverConfig;
use crate::error::SaverError;
use crate::record::{now_millis, SavedState};
use crate::scheduler;
use crate::session::Session;
use crate::transport::{RealtimeTransport, TransportEvent};

/// HTTP status the wiki answers when its own conflict handling took over.
pub const STATUS_CONFLICT: u16 = 409;

/// One autosave engine bound to one editing session.
pub struct Saver {
    session: Arc<Session>,
    running: Arc<AtomicBool>,
}

impl Saver {
    pub fn new(
        config: SaverConfig,
        collab: Collaborators,
        transport: Arc<dyn RealtimeTransport>,
    ) -> Self {
        Self {
            session: Session::new(config, collab, transport),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Join the realtime channel and start processing its events. The
    /// scheduler starts once the transport reports ready.
    pub async fn start(&self) -> Result<(), SaverError> {
        self.session.config.validate()?;
        // The minimum gap between saves counts from session start.
        self.session.record.write().await.time = now_millis();
        let events = self.session.transport.join().await?;
        self.running.store(true, Ordering::Release);

        let handle = tokio::spawn(run_events(
            self.session.clone(),
            self.running.clone(),
            events,
        ));
        self.session.track(handle.abort_handle()).await;
        log::info!(
            "saver started for {} ({})",
            self.session.config.document,
            self.session.config.editor_type
        );
        Ok(())
    }

    /// Stop timers and tasks, leave the channel and forget all state.
    pub async fn stop(&self) {
        halt(&self.session, &self.running).await;
    }

    /// "Save & View": forced save, then leave for the view page once our
    /// own save notification comes back.
    pub async fn save_and_view(&self) -> Result<(), SaverError> {
        self.manual_save(true).await
    }

    /// "Save & Continue": forced save, stay in the editor.
    pub async fn save_and_continue(&self) -> Result<(), SaverError> {
        self.manual_save(false).await
    }

    async fn manual_save(&self, redirect: bool) -> Result<(), SaverError> {
        if !self.is_running() {
            return Err(SaverError::Stopped);
        }
        self.session.acquire_attempt().await;
        let result = self.forced_save(redirect).await;
        self.session.release_attempt().await;
        result
    }

    async fn forced_save(&self, redirect: bool) -> Result<(), SaverError> {
        match scheduler::save_routine(&self.session, true, false).await {
            Ok(outcome) => log::debug!("manual save routine: {outcome:?}"),
            Err(e) => log::warn!("manual save routine failed: {e}"),
        }
        self.session.record.write().await.should_redirect = redirect;

        let form = self.session.collab.surface.save_value();
        match self.session.collab.backend.save_document(&form).await {
            Ok(()) => self.on_saved().await,
            Err(e) => {
                let status = match &e {
                    SaverError::Save { status, .. } => *status,
                    _ => None,
                };
                self.on_save_failed(status, &e.to_string());
                Err(e)
            }
        }
    }

    /// Hook for any physical save the host performed.
    pub async fn on_saved(&self) -> Result<(), SaverError> {
        let session = &self.session;
        let text = session
            .collab
            .surface
            .text_value()
            .ok_or(SaverError::ContentUnavailable)?;
        session.record.write().await.update(text);

        let query = session.version_query().await;
        let info = match session.collab.backend.version(&query).await {
            Ok(info) if !info.is_new => info,
            Ok(_) => {
                let message = "the document does not exist after saving".to_string();
                session.collab.reporter.show(ErrorKind::Save, &message);
                return Err(SaverError::Save {
                    status: None,
                    message,
                });
            }
            Err(e) => {
                session.collab.reporter.show(ErrorKind::Save, &e.to_string());
                return Err(e);
            }
        };

        let echoed = session.record.write().await.arm_own_isave();
        let waiter_session = session.clone();
        let waiter = tokio::spawn(async move {
            if echoed.await.is_err() {
                return;
            }
            let redirect = std::mem::take(&mut waiter_session.record.write().await.should_redirect);
            if redirect {
                waiter_session.collab.surface.redirect_to_view();
            }
        });
        session.track(waiter.abort_handle()).await;

        bump::bump_version(session, Some(info)).await?;
        Ok(())
    }

    /// Hook for a physical save the server rejected.
    pub fn on_save_failed(&self, status: Option<u16>, details: &str) {
        if status == Some(STATUS_CONFLICT) {
            log::info!("save conflict handled by the wiki: {details}");
            return;
        }
        log::warn!("save failed ({status:?}): {details}");
        self.session.collab.reporter.show(ErrorKind::Save, details);
    }

    /// The host saw a local edit (or wants to clear the flag).
    pub async fn set_local_edit_flag(&self, edited: bool) {
        self.session.record.write().await.set_edited_locally(edited);
    }

    /// Override the last saved content without touching time or flags.
    pub async fn set_last_saved_content(&self, content: impl Into<String>) {
        self.session.record.write().await.set_content(content);
    }

    pub async fn last_saved(&self) -> SavedState {
        self.session.record.read().await.snapshot()
    }
}

async fn run_events(
    session: Arc<Session>,
    running: Arc<AtomicBool>,
    mut events: mpsc::Receiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Ready => {
                if let Err(e) = channel::receive(&session, &session.transport.user_doc()).await {
                    log::warn!("unreadable initial user doc: {e}");
                }
                session.guards.lock().await.initializing = false;
                let ticker = scheduler::spawn(session.clone());
                session.track(ticker.abort_handle()).await;
            }
            TransportEvent::Remote => {
                if session.is_initializing().await {
                    continue;
                }
                if let Err(e) = channel::receive(&session, &session.transport.user_doc()).await {
                    log::warn!("unreadable user doc: {e}");
                }
            }
            TransportEvent::Abort => {
                log::warn!("realtime channel aborted, stopping the saver");
                // halt aborts this task, so it runs on its own.
                tokio::spawn(async move { halt(&session, &running).await });
                return;
            }
        }
    }
}

async fn halt(session: &Session, running: &AtomicBool) {
    running.store(false, Ordering::Release);
    session.shutdown().await;
    session.transport.leave().await;
    log::info!("saver stopped");
}

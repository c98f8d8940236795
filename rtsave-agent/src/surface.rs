//! A plain file as the editable surface.
//!
//! The agent polls the file; every distinct content it observes or writes
//! goes into a bounded history so the engine can recognise merges of
//! states this session has already seen.

use async_trait::async_trait;
use rtsave_engine::bump::content_hash;
use rtsave_engine::collab::{EditorSurface, History};
use rtsave_engine::{SafeSaveRequest, SaverError};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use url::form_urlencoded;

/// Number of content states remembered for `depth_of_state`.
const HISTORY_DEPTH: usize = 256;

pub struct FileSurface {
    path: PathBuf,
    last_seen: Mutex<Option<String>>,
    /// Content hashes, oldest first
    history: Mutex<VecDeque<String>>,
}

impl FileSurface {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SaverError> {
        let path = path.as_ref().to_path_buf();
        let initial = std::fs::read_to_string(&path)
            .map_err(|e| SaverError::Config(format!("cannot read {}: {e}", path.display())))?;
        let surface = Self {
            path,
            last_seen: Mutex::new(None),
            history: Mutex::new(VecDeque::new()),
        };
        surface.observe(&initial);
        Ok(surface)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn observe(&self, content: &str) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Some(content.to_string());
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(content_hash(content));
        while history.len() > HISTORY_DEPTH {
            history.pop_front();
        }
    }

    /// Re-read the file. True if someone edited it since the last look.
    pub fn poll_edit(&self) -> bool {
        let Some(current) = self.text_value() else {
            return false;
        };
        let changed = self
            .last_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_deref()
            != Some(current.as_str());
        if changed {
            self.observe(&current);
        }
        changed
    }
}

#[async_trait]
impl EditorSurface for FileSurface {
    fn text_value(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("cannot read {}: {e}", self.path.display());
                None
            }
        }
    }

    async fn set_text_value(&self, content: &str, overwrite: bool) -> Result<(), SaverError> {
        if overwrite {
            log::warn!("discarding local edits in {}", self.path.display());
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| SaverError::Realtime(format!("cannot write {}: {e}", self.path.display())))?;
        self.observe(content);
        Ok(())
    }

    fn save_value(&self) -> String {
        let content = self.text_value().unwrap_or_default();
        form_urlencoded::Serializer::new(String::new())
            .append_pair("content", &content)
            .finish()
    }

    /// The agent only runs with server-side merging (`load_config` rejects
    /// `mergeContent: false`), so there is no local pre-save check.
    async fn safe_save(&self, request: SafeSaveRequest) -> Result<(), SaverError> {
        log::info!(
            "saving {} over version {} without merge",
            self.path.display(),
            request.version
        );
        Ok(())
    }

    fn redirect_to_view(&self) {
        log::info!("{} saved, done editing", self.path.display());
    }
}

impl History for FileSurface {
    fn depth_of_state(&self, content: &str) -> Option<usize> {
        let hash = content_hash(content);
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().rev().position(|h| *h == hash)
    }
}

//! Engine configuration.
//!
//! Deserializes from the same camelCase JSON the host page would hand to
//! the saver, so an agent can load it straight from a file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SaverError;

/// Default minimum gap between two autosaves (ms).
pub const DEFAULT_SAVE_INTERVAL_MS: u64 = 60_000;

/// Default ceiling of the jittered check period (ms).
pub const DEFAULT_CHECK_CYCLE_MS: u64 = 20_000;

/// Saver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaverConfig {
    /// Wiki the document lives in
    pub wiki: String,
    /// Full document reference (space + page)
    pub document: String,
    /// Document language, `default` for the main translation
    pub language: String,

    /// Three-way merge endpoint
    pub merge_url: String,
    /// Version query endpoint
    pub version_url: String,
    /// REST URL of the document, used to fetch the remote content
    pub rest_url: String,
    /// Physical save endpoint
    pub save_url: String,
    /// CSRF token sent with the physical save
    pub form_token: String,

    /// Run a server-side merge before every save
    pub merge_content: bool,
    /// Preview mode: never save
    pub demo_mode: bool,
    /// Editor content is HTML and must be converted before merging
    pub is_html: bool,

    /// Current user identity, published with every ISAVE
    pub user_name: String,
    /// Editor-session-type label, our slot in the peer map
    pub editor_type: String,
    /// Human readable editor name
    pub editor_name: String,
    /// Realtime channel carrying the peer map
    pub channel: String,

    /// Version the editor was loaded with
    pub version: String,
    /// Time (epoch ms) of that version
    pub version_time: u64,

    /// Minimum gap between two autosaves
    pub save_interval_ms: u64,
    /// Ceiling of the jittered check period
    pub check_cycle_ms: u64,
    /// Auto-dismiss a conflict prompt after this long (None = wait for the user)
    pub conflict_timeout_ms: Option<u64>,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            wiki: "xwiki".to_string(),
            document: String::new(),
            language: "default".to_string(),
            merge_url: String::new(),
            version_url: String::new(),
            rest_url: String::new(),
            save_url: String::new(),
            form_token: String::new(),
            merge_content: true,
            demo_mode: false,
            is_html: false,
            user_name: String::new(),
            editor_type: "wiki".to_string(),
            editor_name: "Wiki".to_string(),
            channel: String::new(),
            version: "1.1".to_string(),
            version_time: 0,
            save_interval_ms: DEFAULT_SAVE_INTERVAL_MS,
            check_cycle_ms: DEFAULT_CHECK_CYCLE_MS,
            conflict_timeout_ms: None,
        }
    }
}

impl SaverConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), SaverError> {
        if self.editor_type.is_empty() {
            return Err(SaverError::Config("editorType must not be empty".into()));
        }
        if self.check_cycle_ms == 0 {
            return Err(SaverError::Config("checkCycleMs must be positive".into()));
        }
        Ok(())
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.save_interval_ms)
    }

    pub fn check_cycle(&self) -> Duration {
        Duration::from_millis(self.check_cycle_ms)
    }

    pub fn conflict_timeout(&self) -> Option<Duration> {
        self.conflict_timeout_ms.map(Duration::from_millis)
    }

    /// Merge endpoint with the plain-output query the wiki expects.
    pub fn merge_endpoint(&self) -> String {
        format!("{}?xpage=plain&outputSyntax=plain", self.merge_url)
    }

    pub fn version_endpoint(&self) -> String {
        format!("{}?xpage=plain", self.version_url)
    }

    /// REST endpoint of the current translation, JSON media.
    pub fn remote_content_endpoint(&self) -> String {
        let mut url = self.rest_url.clone();
        if self.language != "default" && !is_translation_url(&url) {
            url.push_str(&self.language);
        }
        format!("{url}?media=json")
    }
}

/// `/pages/<name>/translations/` already pins the language.
fn is_translation_url(url: &str) -> bool {
    match url.find("/pages/") {
        Some(idx) => {
            let rest = &url[idx + "/pages/".len()..];
            rest.find("/translations/").is_some_and(|pos| pos > 0)
        }
        None => false,
    }
}

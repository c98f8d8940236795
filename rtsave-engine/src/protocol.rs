//! Request and response shapes of the wiki endpoints.
//!
//! ```text
//! merge    POST {wiki, document, language, version, content[, convertHTML]}
//!            → {content, merged, error?, conflicts?, currentVersion, saveRequired, previousVersionContent?}
//! version  POST {wiki, document, language, version}
//!            → {version, content, isNew}
//! remote   GET  <rest>?media=json
//!            → {content}
//! ```

use serde::{Deserialize, Serialize};

/// Identity of the edited document, sent with every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub wiki: String,
    pub document: String,
    pub language: String,
}

/// Body of a version query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionQuery {
    #[serde(flatten)]
    pub doc: DocumentRef,
    /// Last version this client knows about
    pub version: String,
}

/// Body of a merge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRequest {
    #[serde(flatten)]
    pub doc: DocumentRef,
    pub version: String,
    pub content: String,
    #[serde(rename = "convertHTML", skip_serializing_if = "Option::is_none")]
    pub convert_html: Option<u8>,
}

/// One conflict reported by the three-way merge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflict {
    #[serde(default)]
    pub formatted_message: Option<String>,
    /// Anything else the server says about the conflict
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Result of a server-side three-way merge. Never persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub content: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub conflicts: Vec<MergeConflict>,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub save_required: bool,
    #[serde(default)]
    pub previous_version_content: Option<String>,
}

impl MergeResult {
    /// Lift the first conflict's message into `error` when the server did
    /// not set one.
    pub fn normalize(mut self) -> Self {
        if self.error.as_deref().map_or(true, str::is_empty) {
            self.error = self
                .conflicts
                .first()
                .and_then(|c| c.formatted_message.clone())
                .filter(|m| !m.is_empty());
        }
        self
    }

    /// Conflict message, if the merge could not be completed cleanly.
    pub fn conflict(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// Canonical version of the document as seen by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub content: String,
    #[serde(default)]
    pub is_new: bool,
}

/// Payload of the REST document fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteContent {
    pub content: String,
}

/// What the host's safe-save hook receives when merge-on-save is off.
#[derive(Debug, Clone, PartialEq)]
pub struct SafeSaveRequest {
    pub force: bool,
    pub autosave: bool,
    pub version: String,
    pub version_time: u64,
}

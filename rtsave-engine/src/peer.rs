//! Peer save records and the shared editor-type → record map.
//!
//! ```text
//! userDoc = {
//!   "wiki":      {"version": "4.1", "by": "xwiki:XWiki.Alice", "hash": "9f86…", "editorName": "Wiki"},
//!   "rtwysiwyg": {"version": "4.1", "by": "xwiki:XWiki.Bob",   "hash": "9f86…", "editorName": "WYSIWYG"},
//! }
//! ```
//!
//! Each editor-session-type owns exactly one slot. Entries that do not have
//! exactly the four fields above are corrupted and ignored.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::error::SaverError;

/// Last save announced for one editor-session-type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PeerState {
    pub version: String,
    pub by: String,
    pub hash: String,
    pub editor_name: String,
}

impl PeerState {
    /// Validate one raw entry against the schema.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Display name of the sender.
    ///
    /// Session ids look like `<prefix>-<name>%2d<digits>` with a
    /// percent-encoded name; anything else is shown verbatim.
    pub fn sender_name(&self) -> Cow<'_, str> {
        let by = self.by.as_str();
        let Some(marker) = by.rfind("%2d") else {
            return Cow::Borrowed(by);
        };
        if !by[marker + 3..].bytes().all(|b| b.is_ascii_digit()) {
            return Cow::Borrowed(by);
        }
        let head = &by[..marker];
        let Some(dash) = head.rfind('-') else {
            return Cow::Borrowed(by);
        };
        let name = &head[dash + 1..];
        urlencoding::decode(name).unwrap_or(Cow::Borrowed(name))
    }
}

/// A changed, well-formed entry found while diffing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSave {
    pub editor_type: String,
    pub state: PeerState,
}

/// Local copy of the shared peer map.
///
/// Ordered so that serialization is canonical: two clients holding the same
/// entries publish byte-identical documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerMap {
    entries: BTreeMap<String, PeerState>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, editor_type: &str) -> Option<&PeerState> {
        self.entries.get(editor_type)
    }

    /// Replace our own slot wholesale.
    pub fn insert(&mut self, editor_type: impl Into<String>, state: PeerState) {
        self.entries.insert(editor_type.into(), state);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Canonical JSON form published on the realtime channel.
    pub fn to_json(&self) -> Result<String, SaverError> {
        Ok(serde_json::to_string(&self.entries)?)
    }

    /// Parse a user document, dropping corrupted entries.
    ///
    /// Returns the valid map plus the number of entries that were skipped.
    pub fn parse(raw: &str) -> Result<(Self, usize), SaverError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let Some(object) = value.as_object() else {
            return Err(SaverError::Parse("peer map is not an object".into()));
        };

        let mut map = PeerMap::new();
        let mut corrupted = 0;
        for (editor_type, entry) in object {
            match PeerState::from_value(entry) {
                Some(state) => {
                    map.entries.insert(editor_type.clone(), state);
                }
                None => corrupted += 1,
            }
        }
        Ok((map, corrupted))
    }

    /// Entries of `next` that are new or differ from ours.
    pub fn changes(&self, next: &PeerMap) -> Vec<PeerSave> {
        next.entries
            .iter()
            .filter(|(editor_type, state)| self.entries.get(*editor_type) != Some(*state))
            .map(|(editor_type, state)| PeerSave {
                editor_type: editor_type.clone(),
                state: state.clone(),
            })
            .collect()
    }
}

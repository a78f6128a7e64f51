//! Note key→file contract shared with the vault synchronizer.
//!
//! The synchronizer itself (vault events, rename and delete bookkeeping)
//! lives with the client application. Defined here are the payload shapes it
//! exchanges with the worker and the rule resolving a note to its library
//! item.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Frontmatter field carrying the library item key of a literature note.
pub const ITEM_KEY_FIELD: &str = "item-key";

/// Metadata of one markdown note, as collected by the vault scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteMeta {
    pub file: String,
    #[serde(default)]
    pub frontmatter: BTreeMap<String, String>,
    /// Block anchors defined in the note body, in document order.
    #[serde(default)]
    pub block_ids: Vec<String>,
}

/// One literature note resolved to its library item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFileInfo {
    pub key: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
}

/// Resolve notes to key→file entries.
///
/// Notes without a non-empty item-key frontmatter field are not literature
/// notes and produce no entry. The first block anchor, when present, becomes
/// the jump target for the item.
pub fn key_file_entries(notes: &[NoteMeta]) -> Vec<KeyFileInfo> {
    notes
        .iter()
        .filter_map(|note| {
            let key = note.frontmatter.get(ITEM_KEY_FIELD)?;
            if key.is_empty() {
                return None;
            }
            Some(KeyFileInfo {
                key: key.clone(),
                file: note.file.clone(),
                block_id: note.block_ids.first().cloned(),
            })
        })
        .collect()
}

//! Record rows and their folding into indexable items.
//!
//! Rows arrive the way the library database produces them: one row per item
//! field, one per creator, one per citation key. [`merge_rows`] folds them
//! into per-item records before indexing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One field value of one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRow {
    pub item_id: i64,
    pub item_key: String,
    pub field: String,
    pub value: String,
}

/// One creator of one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorRow {
    pub item_id: i64,
    pub first_name: String,
    pub last_name: String,
}

/// Citation key attached to an item by the bibliography plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitekeyRow {
    pub item_id: i64,
    pub citekey: String,
}

/// Everything one index build reads from the databases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordBatch {
    pub fields: Vec<FieldRow>,
    pub creators: Vec<CreatorRow>,
    pub citekeys: Vec<CitekeyRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub first_name: String,
    pub last_name: String,
}

/// One indexable item assembled from its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_id: i64,
    pub item_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Year component of the item's date field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creators: Vec<Creator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citekey: Option<String>,
    /// Fields with no dedicated slot, keyed by field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Fold row batches into per-item records.
///
/// Field rows establish items; creator and citekey rows attach to items
/// already seen and are dropped otherwise. Output is ordered by item id.
pub fn merge_rows(batch: RecordBatch) -> Vec<ItemRecord> {
    let mut items: BTreeMap<i64, ItemRecord> = BTreeMap::new();

    for row in batch.fields {
        let entry = items.entry(row.item_id).or_insert_with(|| ItemRecord {
            item_id: row.item_id,
            item_key: row.item_key.clone(),
            title: None,
            date: None,
            creators: Vec::new(),
            citekey: None,
            extra: BTreeMap::new(),
        });
        match row.field.as_str() {
            "title" => entry.title = Some(row.value),
            "date" => entry.date = Some(year_of(&row.value)),
            _ => {
                entry.extra.insert(row.field, row.value);
            }
        }
    }

    for row in batch.creators {
        if let Some(entry) = items.get_mut(&row.item_id) {
            entry.creators.push(Creator {
                first_name: row.first_name,
                last_name: row.last_name,
            });
        }
    }

    for row in batch.citekeys {
        if let Some(entry) = items.get_mut(&row.item_id) {
            entry.citekey = Some(row.citekey);
        }
    }

    items.into_values().collect()
}

/// Leading year component of a multipart date value: `"2019-05-01"` and
/// `"2019-05-01 2019"` both reduce to `"2019"`.
fn year_of(value: &str) -> String {
    let first_part = value.split_whitespace().next().unwrap_or(value);
    first_part.split('-').next().unwrap_or(first_part).to_string()
}

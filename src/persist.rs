//! Per-table layout snapshots
//!
//! A snapshot records the width and hidden flag of every column. It is
//! written on each width or visibility change and read once when a table is
//! constructed. Older pages stored a bare width array; that form is still
//! accepted and reads as "nothing hidden".

use crate::error::GridError;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub widths: Vec<u32>,
    pub hidden: Vec<bool>,
}

/// Everything that has ever been written under a layout key
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLayout {
    Snapshot {
        #[serde(default)]
        widths: Option<Vec<f64>>,
        #[serde(default)]
        hidden: Option<Vec<bool>>,
    },
    Widths(Vec<f64>),
}

fn whole_pixels(widths: Vec<f64>) -> Vec<u32> {
    widths.into_iter().map(|w| w.max(0.0).round() as u32).collect()
}

impl LayoutSnapshot {
    pub fn new(widths: Vec<u32>, hidden: Vec<bool>) -> Self {
        Self { widths, hidden }
    }

    /// Decode a stored snapshot. A record without widths yields `None`.
    pub fn from_json(json: &str) -> Result<Option<Self>, GridError> {
        let stored: StoredLayout = serde_json::from_str(json)?;
        Ok(match stored {
            StoredLayout::Widths(widths) => Some(Self::new(whole_pixels(widths), Vec::new())),
            StoredLayout::Snapshot { widths: Some(widths), hidden } => {
                Some(Self::new(whole_pixels(widths), hidden.unwrap_or_default()))
            }
            StoredLayout::Snapshot { widths: None, .. } => None,
        })
    }

    pub fn to_json(&self) -> Result<String, GridError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether the snapshot describes a table with `column_count` columns
    pub fn fits(&self, column_count: usize) -> bool {
        !self.widths.is_empty()
            && self.widths.len() == column_count
            && (self.hidden.is_empty() || self.hidden.len() == column_count)
    }

    pub fn is_hidden(&self, index: usize) -> bool {
        self.hidden.get(index).copied().unwrap_or(false)
    }
}

/// Keyed storage for layout snapshots, scoped by table id
pub trait LayoutStore {
    fn load(&self, table_id: &str) -> Option<LayoutSnapshot>;
    fn save(&self, table_id: &str, snapshot: &LayoutSnapshot);
}

/// Store kept in memory, used off the page and in tests
#[derive(Debug, Default)]
pub struct MemoryLayoutStore {
    entries: RefCell<HashMap<String, LayoutSnapshot>>,
}

impl MemoryLayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table_id: &str, snapshot: LayoutSnapshot) {
        self.entries.borrow_mut().insert(table_id.to_string(), snapshot);
    }

    pub fn get(&self, table_id: &str) -> Option<LayoutSnapshot> {
        self.entries.borrow().get(table_id).cloned()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl LayoutStore for MemoryLayoutStore {
    fn load(&self, table_id: &str) -> Option<LayoutSnapshot> {
        self.get(table_id)
    }

    fn save(&self, table_id: &str, snapshot: &LayoutSnapshot) {
        self.insert(table_id, snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = LayoutSnapshot::new(vec![120, 0, 80], vec![false, true, false]);
        let json = snapshot.to_json().unwrap();
        assert_eq!(json, r#"{"widths":[120,0,80],"hidden":[false,true,false]}"#);
        assert_eq!(LayoutSnapshot::from_json(&json).unwrap(), Some(snapshot));
    }

    #[test]
    fn test_legacy_width_array() {
        let snapshot = LayoutSnapshot::from_json("[100, 80.6, 50]").unwrap().unwrap();
        assert_eq!(snapshot.widths, vec![100, 81, 50]);
        assert!(snapshot.hidden.is_empty());
        assert!(snapshot.fits(3));
        assert!(!snapshot.is_hidden(1));
    }

    #[test]
    fn test_record_without_widths_is_ignored() {
        assert_eq!(LayoutSnapshot::from_json(r#"{"hidden":[true]}"#).unwrap(), None);
        assert!(LayoutSnapshot::from_json("not json").is_err());
    }

    #[test]
    fn test_fits_checks_lengths() {
        let snapshot = LayoutSnapshot::new(vec![100, 100], vec![false]);
        assert!(!snapshot.fits(2));
        assert!(!snapshot.fits(3));
        assert!(!LayoutSnapshot::default().fits(0));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryLayoutStore::new();
        assert!(store.load("orders").is_none());
        store.save("orders", &LayoutSnapshot::new(vec![90], vec![false]));
        assert_eq!(store.load("orders").unwrap().widths, vec![90]);
    }
}

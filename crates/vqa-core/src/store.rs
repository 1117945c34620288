use std::{collections::HashMap, path::Path};

use serde_json::Value;
use tracing::debug;
use vqa_model::{Item, ItemId};

use crate::error::CoreError;

/// Ordered, id-indexed collection of items: the workload of one run.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    items: Vec<Item>,
    positions: HashMap<ItemId, usize>,
}

impl RecordStore {
    /// Build a store, rejecting duplicate ids.
    pub fn from_items(items: Vec<Item>) -> Result<Self, CoreError> {
        let mut positions = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            if positions.insert(item.id.clone(), pos).is_some() {
                return Err(CoreError::DuplicateId(item.id.clone()));
            }
        }
        Ok(Self { items, positions })
    }

    /// Load an input file: a JSON array of records, or JSON Lines for `.jsonl` / `.ndjson`.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let bytes = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;
        let store = if is_json_lines(path) {
            Self::parse_json_lines(path, &bytes)?
        } else {
            Self::parse_json_array(path, &bytes)?
        };
        debug!(target: "vqa.core.store", path = %path.display(), items = store.len(), "input loaded");
        Ok(store)
    }

    fn parse_json_array(path: &Path, bytes: &[u8]) -> Result<Self, CoreError> {
        let records: Vec<Value> =
            serde_json::from_slice(bytes).map_err(|e| CoreError::json(path, e))?;
        Self::from_records(path, records)
    }

    fn parse_json_lines(path: &Path, bytes: &[u8]) -> Result<Self, CoreError> {
        let records = bytes
            .split(|b| *b == b'\n')
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(serde_json::from_slice::<Value>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::json(path, e))?;
        Self::from_records(path, records)
    }

    fn from_records(path: &Path, records: Vec<Value>) -> Result<Self, CoreError> {
        let items = records
            .into_iter()
            .enumerate()
            .map(|(index, value)| Item::from_record(index, value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| CoreError::Record {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_items(items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Original position of an item.
    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.position(id).map(|pos| &self.items[pos])
    }
}

fn is_json_lines(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jsonl" | "ndjson"))
        .unwrap_or(false)
}

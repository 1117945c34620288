use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Item;

/// Final output unit: the original input record with a `scores` object attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoredRecord(Map<String, Value>);

impl ScoredRecord {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    pub fn scores(&self) -> Option<&Value> {
        self.0.get("scores")
    }
}

impl From<Item> for ScoredRecord {
    fn from(item: Item) -> Self {
        let mut fields = if item.record.is_empty() {
            let mut m = Map::new();
            m.insert("id".into(), Value::String(item.id.to_string()));
            m.insert("video".into(), Value::String(item.video_ref));
            m.insert(
                "labels".into(),
                Value::Array(item.labels.into_iter().map(Value::String).collect()),
            );
            m
        } else {
            item.record
        };
        // Scores always serialize to an object; a failure here would be a bug in `Scores`.
        let scores = serde_json::to_value(&item.scores).unwrap_or(Value::Object(Map::new()));
        fields.insert("scores".into(), scores);
        Self(fields)
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ItemId, LabelScore, ModelError, Scores};

/// Keys accepted for the video locator, in lookup order.
const VIDEO_KEYS: [&str; 2] = ["video", "video_ref"];

/// One unit of scoring work: a video plus the labels to score it against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stable identifier, unique across the record store.
    pub id: ItemId,
    /// Opaque locator handed to the scorer (path or URL).
    pub video_ref: String,
    /// Distinct labels in first-seen order.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Scores collected so far.
    #[serde(default, skip_serializing_if = "Scores::is_empty")]
    pub scores: Scores,
    /// The input record exactly as read, written back around the scores.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub record: Map<String, Value>,
}

impl Item {
    pub fn new<I, L>(id: impl Into<ItemId>, video_ref: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            id: id.into(),
            video_ref: video_ref.into(),
            labels: distinct(labels.into_iter().map(Into::into)),
            scores: Scores::new(),
            record: Map::new(),
        }
    }

    /// Parse an input record.
    ///
    /// Accepts `video` (or `video_ref`), then `labels` (array) or `label` (string), plus an optional `id`.
    /// A missing `id` falls back to the video locator. Every other key is kept untouched.
    pub fn from_record(index: usize, value: Value) -> Result<Self, ModelError> {
        let invalid = |reason: &str| ModelError::InvalidRecord {
            index,
            reason: reason.to_string(),
        };

        let Value::Object(record) = value else {
            return Err(invalid("expected a JSON object"));
        };

        let video_ref = VIDEO_KEYS
            .iter()
            .find_map(|k| record.get(*k))
            .ok_or_else(|| invalid("missing 'video'"))?
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| invalid("'video' must be a non-empty string"))?
            .to_string();

        let id = match record.get("id") {
            None | Some(Value::Null) => ItemId::new(video_ref.clone()),
            Some(Value::String(s)) if !s.is_empty() => ItemId::new(s.clone()),
            Some(Value::Number(n)) => ItemId::new(n.to_string()),
            Some(_) => return Err(invalid("'id' must be a non-empty string or a number")),
        };

        let labels = match (record.get("labels"), record.get("label")) {
            (Some(Value::Array(list)), _) => list
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("'labels' must contain only strings"))?,
            (Some(_), _) => return Err(invalid("'labels' must be an array")),
            (None, Some(Value::String(s))) => vec![s.clone()],
            (None, Some(_)) => return Err(invalid("'label' must be a string")),
            (None, None) => Vec::new(),
        };

        Ok(Self {
            id,
            video_ref,
            labels: distinct(labels),
            scores: Scores::new(),
            record,
        })
    }

    /// Labels that have no score entry yet.
    pub fn pending_labels(&self) -> impl Iterator<Item = &str> {
        self.labels
            .iter()
            .map(String::as_str)
            .filter(|l| !self.scores.contains(l))
    }

    /// Mark every label without a score as failed.
    pub fn fail_pending(&mut self, reason: &str) {
        let pending: Vec<String> = self.pending_labels().map(str::to_string).collect();
        for label in pending {
            self.scores.insert(label, LabelScore::failed(reason));
        }
    }

    /// Every label has an entry (score or sentinel).
    pub fn is_settled(&self) -> bool {
        self.pending_labels().next().is_none()
    }
}

fn distinct(labels: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        if !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

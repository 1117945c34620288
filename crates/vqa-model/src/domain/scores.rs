use std::fmt;

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{MapAccess, Visitor},
    ser::SerializeMap,
};

use crate::LabelScore;

/// Label → score mapping of one item.
///
/// Keeps insertion order (the item's label order) so serialized output is stable.
/// Serialized as a JSON object; inserting an existing label replaces its score in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores(Vec<(String, LabelScore)>);

impl Scores {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, label: impl Into<String>, score: LabelScore) {
        let label = label.into();
        match self.0.iter_mut().find(|(l, _)| *l == label) {
            Some((_, slot)) => *slot = score,
            None => self.0.push((label, score)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&LabelScore> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, s)| s)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelScore)> {
        self.0.iter().map(|(l, s)| (l.as_str(), s))
    }

    /// Number of labels carrying a failure sentinel.
    pub fn failed_count(&self) -> usize {
        self.0.iter().filter(|(_, s)| s.is_failed()).count()
    }
}

impl Serialize for Scores {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, score) in &self.0 {
            map.serialize_entry(label, score)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Scores {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ScoresVisitor;

        impl<'de> Visitor<'de> for ScoresVisitor {
            type Value = Scores;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of label to score")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut scores = Scores::new();
                while let Some((label, score)) = access.next_entry::<String, LabelScore>()? {
                    scores.insert(label, score);
                }
                Ok(scores)
            }
        }

        deserializer.deserialize_map(ScoresVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_replaces() {
        let mut scores = Scores::new();
        scores.insert("b", LabelScore::Value(0.1));
        scores.insert("a", LabelScore::Value(0.2));
        scores.insert("b", LabelScore::failed("retry"));

        let labels: Vec<_> = scores.iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["b", "a"]);
        assert!(scores.get("b").unwrap().is_failed());
        assert_eq!(scores.failed_count(), 1);
    }

    #[test]
    fn serializes_as_object_in_label_order() {
        let mut scores = Scores::new();
        scores.insert("zoom", LabelScore::Value(0.5));
        scores.insert("pan", LabelScore::failed("decode"));

        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"zoom":0.5,"pan":{"error":"decode"}}"#);

        let back: Scores = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scores);
    }
}

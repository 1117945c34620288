use serde::{Deserialize, Serialize};

/// Outcome of scoring one (video, label) pair.
///
/// Serialized untagged: a plain number for a score, `{"error": "..."}` for a failure sentinel.
/// Downstream consumers can therefore tell "scored low" apart from "failed to score".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelScore {
    /// Finite compatibility score returned by the scorer.
    Value(f64),
    /// The pair could not be scored.
    Failed { error: String },
}

impl LabelScore {
    /// Build a score, turning non-finite values into a failure (JSON cannot carry them).
    pub fn from_value(value: f64) -> Self {
        if value.is_finite() {
            LabelScore::Value(value)
        } else {
            LabelScore::failed(format!("non-finite score: {value}"))
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        LabelScore::Failed {
            error: reason.into(),
        }
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, LabelScore::Failed { .. })
    }

    #[inline]
    pub fn value(&self) -> Option<f64> {
        match self {
            LabelScore::Value(v) => Some(*v),
            LabelScore::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_serializes_as_number() {
        let json = serde_json::to_string(&LabelScore::Value(0.25)).unwrap();
        assert_eq!(json, "0.25");
    }

    #[test]
    fn failure_serializes_as_error_object() {
        let json = serde_json::to_string(&LabelScore::failed("corrupt video")).unwrap();
        assert_eq!(json, r#"{"error":"corrupt video"}"#);
    }

    #[test]
    fn deserializes_both_shapes() {
        let v: LabelScore = serde_json::from_str("1").unwrap();
        assert_eq!(v, LabelScore::Value(1.0));

        let f: LabelScore = serde_json::from_str(r#"{"error":"boom"}"#).unwrap();
        assert!(f.is_failed());
        assert_eq!(f.value(), None);
    }

    #[test]
    fn non_finite_values_become_failures() {
        assert!(LabelScore::from_value(f64::NAN).is_failed());
        assert!(LabelScore::from_value(f64::INFINITY).is_failed());
        assert_eq!(LabelScore::from_value(0.5).value(), Some(0.5));
    }
}

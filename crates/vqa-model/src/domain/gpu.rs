use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Device ordinal as understood by `CUDA_VISIBLE_DEVICES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpuId(pub u32);

impl fmt::Display for GpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ordered, duplicate-free list of GPUs for one run.
///
/// Order matters: slice `j` goes to the `j`-th GPU, and slices concatenated in this order rebuild the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<GpuId>", into = "Vec<GpuId>")]
pub struct GpuSet(Vec<GpuId>);

impl GpuSet {
    /// GPUs `0..count`.
    pub fn from_count(count: u32) -> Result<Self, ModelError> {
        if count == 0 {
            return Err(ModelError::NoGpus);
        }
        Ok(Self((0..count).map(GpuId).collect()))
    }

    pub fn from_ids(ids: Vec<GpuId>) -> Result<Self, ModelError> {
        if ids.is_empty() {
            return Err(ModelError::NoGpus);
        }
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(ModelError::DuplicateGpuId(id.0));
            }
        }
        Ok(Self(ids))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = GpuId> + '_ {
        self.0.iter().copied()
    }
}

impl FromStr for GpuSet {
    type Err = ModelError;

    /// Parse a comma-separated id list such as `"0,2,3"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ids = s
            .split(',')
            .map(|part| part.trim().parse::<u32>().map(GpuId))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ModelError::InvalidGpuList(s.to_string()))?;
        Self::from_ids(ids)
    }
}

impl TryFrom<Vec<GpuId>> for GpuSet {
    type Error = ModelError;

    fn try_from(ids: Vec<GpuId>) -> Result<Self, Self::Error> {
        Self::from_ids(ids)
    }
}

impl From<GpuSet> for Vec<GpuId> {
    fn from(set: GpuSet) -> Self {
        set.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_enumerates_from_zero() {
        let set = GpuSet::from_count(3).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![GpuId(0), GpuId(1), GpuId(2)]);
        assert!(matches!(GpuSet::from_count(0), Err(ModelError::NoGpus)));
    }

    #[test]
    fn parses_explicit_list_in_given_order() {
        let set: GpuSet = " 3, 0 ,2".parse().unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![GpuId(3), GpuId(0), GpuId(2)]);
    }

    #[test]
    fn rejects_malformed_lists() {
        for bad in ["", "0,,1", "a,b", "-1", "0;1", "1,"] {
            assert!(
                matches!(bad.parse::<GpuSet>(), Err(ModelError::InvalidGpuList(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_duplicates() {
        assert!(matches!(
            "0,1,0".parse::<GpuSet>(),
            Err(ModelError::DuplicateGpuId(0))
        ));
    }

    #[test]
    fn serde_validates_on_read() {
        assert!(serde_json::from_str::<GpuSet>("[1,1]").is_err());
        let set: GpuSet = serde_json::from_str("[1,4]").unwrap();
        assert_eq!(serde_json::to_string(&set).unwrap(), "[1,4]");
    }
}

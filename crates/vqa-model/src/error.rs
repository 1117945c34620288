use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
    #[error("invalid gpu id list '{0}' (expected comma-separated integers, e.g. 0,2,3)")]
    InvalidGpuList(String),
    #[error("gpu id {0} listed more than once")]
    DuplicateGpuId(u32),
    #[error("gpu count must be at least 1")]
    NoGpus,
}

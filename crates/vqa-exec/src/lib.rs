mod error;
pub use error::{ExecError, ExecResult};

pub mod limits;
pub use limits::{ChildLimits, attach_child_limits};

pub mod util;

pub mod scorer;
pub use scorer::{CommandScorer, FnScorer, ScoreError, Scorer, ScorerConfig};

pub mod worker;
pub use worker::{WorkerConfig, load_slice, run_slice, run_worker, score_slice};

pub mod dispatch;
pub use dispatch::{DispatchConfig, ExitOutcome, WorkerExit, dispatch};

/// Environment variable that pins a worker to its GPU.
pub const ENV_VISIBLE_DEVICES: &str = "CUDA_VISIBLE_DEVICES";
/// Environment variable exposing the label catalog path to the scorer.
pub const ENV_LABEL_CATALOG: &str = "VQA_LABEL_CATALOG";

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::{CommandScorer, DispatchConfig, Scorer, ScorerConfig};
}

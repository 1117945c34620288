mod item_id;
pub use item_id::ItemId;

mod label_score;
pub use label_score::LabelScore;

mod scores;
pub use scores::Scores;

mod item;
pub use item::Item;

mod scored_record;
pub use scored_record::ScoredRecord;

mod gpu;
pub use gpu::{GpuId, GpuSet};

mod slice;
pub use slice::Slice;

mod partial;
pub use partial::{PartialResult, PartialStatus};

mod manifest;
pub use manifest::{RunManifest, SliceEntry};

mod status;
pub use status::{RunStatus, SliceStatus};

/// Identifier of one dispatch run.
///
/// Keys the partial-output namespace so concurrent runs sharing a working directory never collide.
pub type RunId = String;

/// Sentinel reason for labels a worker never reached because it was asked to stop.
pub const INTERRUPTED: &str = "interrupted";

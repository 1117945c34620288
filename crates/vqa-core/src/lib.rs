pub mod error;
pub use error::CoreError;

pub mod config;
pub use config::RunConfig;

pub mod fsio;

pub mod store;
pub use store::RecordStore;

pub mod layout;
pub use layout::RunLayout;

pub mod partition;
pub use partition::{Plan, partition, slice_bounds};

pub mod merge;
pub use merge::{MergeOutcome, SliceReport, merge, merge_from_manifest};

pub mod state;
pub use state::{RunState, SliceState};

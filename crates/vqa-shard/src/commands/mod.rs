pub mod ingest;
pub mod merge;
pub mod relabel;
pub mod run;
pub mod worker;

pub use ingest::IngestCommand;
pub use merge::MergeCommand;
pub use relabel::RelabelCommand;
pub use run::RunCommand;
pub use worker::WorkerCommand;

/// The merger detected an integrity problem; no output was written.
pub const EXIT_MERGE_FAILED: u8 = 2;
/// The run or worker was stopped by SIGINT/SIGTERM.
pub const EXIT_INTERRUPTED: u8 = 130;

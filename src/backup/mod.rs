pub mod archiver;
pub mod engine;
pub mod history;
pub mod lock;
pub mod promoter;
pub mod purger;
pub mod staging;

pub use engine::{run_backup, BackupEngine, RunOutcome, RunReport, Stage, TargetReport};
pub use purger::{prune, PruneReport};
pub use staging::{stage, ScratchDir, StagingEntry};

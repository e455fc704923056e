//! # backsnap
//!
//! Scheduled, filtered, recursive backups into dated zip archives.
//!
//! Each run walks the configured targets, copies matching files into a
//! private staging tree, compresses it into `<run id>.zip` (optionally
//! AES-encrypted), moves the finished archive into the destination store
//! and prunes archives past the retention window. It features:
//!
//! - **Per-target filters**: regex patterns on file base names
//! - **Depth budgets**: limit how far each target is descended
//! - **Crash-safe promotion**: the store only ever sees complete archives
//! - **Scratch cleanup**: staging trees never outlive their run
//! - **Cron scheduling**: run as a daemon from a cron expression

pub mod backup;
pub mod cli;
pub mod common;
pub mod scanner;
pub mod scheduler;

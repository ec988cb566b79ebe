//! Command-line front end for elfkit.
//!
//! This crate provides:
//! - Edit plans: the `--remove-section`, `--rename-symbol`, ... arguments and their parsers
//! - The runner: parse, apply edits in a fixed order, report, write atomically
//! - Reports: a plain header/segment/section listing and a JSON dump of the model
//! - Structured JSONL logging of every run

#![forbid(unsafe_code)]

pub mod error;
pub mod report;
pub mod runner;
pub mod structured_log;

pub use error::CliError;
pub use report::FileReport;
pub use runner::{EditPlan, RunOptions, RunSummary, run};

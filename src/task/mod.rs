#![forbid(unsafe_code)]

pub mod model;

pub use model::{StatusReport, TaskStatus, TaskSummary};

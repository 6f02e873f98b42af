//! Process level plumbing: arguments, configuration, logging, runtime startup and shutdown

pub mod args;
pub mod config;
pub mod log;
pub mod rt;
pub mod shutdown;

pub use log::{init_logging_no_file, init_logging_with_file};

//! Common utilities for the gracedown helper.
//!
//! This crate provides:
//! - A named single-instance guard
//! - A shell command runner with a bounded wait
//! - Environment capture from a probe command's standard output

mod capture;
mod instance;
mod runner;

pub use capture::*;
pub use instance::*;
pub use runner::*;

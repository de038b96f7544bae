//! High-level operations.
//!
//! This module contains the implementation of biscuit-build commands.

pub mod build;
pub mod configure;
pub mod task;

pub use build::{build, plan_for, BuildOptions};
pub use configure::{
    check_build_dir, configure, load_configured, regenerate_if_stale, ConfigureOptions,
    ConfiguredState, CACHE_FILE, COMPILE_COMMANDS,
};
pub use task::{list_tasks, run_named_task, TaskListing};
pub use test::{run_tests, TestOptions};

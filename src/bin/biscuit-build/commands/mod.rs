//! Command implementations

pub mod build;
pub mod completions;
pub mod configure;
pub mod task;
pub mod tasks;
pub mod test;

//! biscuit-build - configure, build and verify a C++ database project
//!
//! This crate provides the library behind the `biscuit-build` binary:
//! source discovery, framework bootstrapping, target graph construction,
//! incremental native builds and optional verification tasks.

pub mod bootstrap;
pub mod builder;
pub mod core;
pub mod ops;
pub mod util;
pub mod verify;

/// Test fixtures for unit tests.
///
/// This module is only available when compiling with `--cfg test`. It writes
/// sample projects to temporary directories and provides shell-script
/// stand-ins for the compiler, archiver, cmake and verification tools.
#[cfg(test)]
pub mod test_support;

pub use crate::core::{BuildProfile, ConfigureError, Project, Target, TargetKind};
pub use builder::TargetGraph;
pub use ops::ConfiguredState;

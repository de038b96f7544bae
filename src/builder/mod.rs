//! Build execution.
//!
//! This module lowers the target graph to a plan and runs it:
//! - Target graph construction and validation
//! - Build plan generation
//! - Toolchain command generation
//! - Incremental compilation and linking

pub mod fingerprint;
pub mod graph;
pub mod native;
pub mod plan;
pub mod toolchain;

pub use graph::{GraphBuilder, TargetGraph};
pub use native::{BuildSummary, NativeBuilder};
pub use plan::{BuildPlan, BuildStep, CompileCommand};
pub use toolchain::{detect_cmake, CommandSpec, Toolchain};

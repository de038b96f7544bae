//! Optional verification tasks.
//!
//! - [`locator`] finds the formatter, static analyzer and lint script
//! - [`tasks`] registers one task per located tool and mode
//! - [`run`] executes a registered task
//!
//! A missing tool only removes its tasks; it never fails configuration.

pub mod locator;
pub mod run;
pub mod tasks;

pub use locator::{ToolKind, ToolLocator, ToolRecord, ToolSet};
pub use run::{run_task, TaskReport};
pub use tasks::{TaskAction, TaskMode, TaskRegistry, VerificationTask};

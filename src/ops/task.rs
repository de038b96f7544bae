//! Implementation of `biscuit-build task` and `biscuit-build tasks`.

use std::path::Path;

use anyhow::{bail, Result};

use crate::ops::configure::{load_configured, regenerate_if_stale};
use crate::verify::tasks::describe_search;
use crate::verify::{run_task, TaskReport, ToolKind, VerificationTask};

/// Run the registered task `name`.
pub fn run_named_task(build_dir: &Path, name: &str) -> Result<TaskReport> {
    let state = regenerate_if_stale(load_configured(build_dir)?)?;

    if let Some(task) = state.tasks.get(name) {
        tracing::info!("Running {} ({})", task.name, task.program.display());
        return run_task(task);
    }

    if let Some(tool) = state.tasks.missing_tool(name) {
        let searched = state
            .tools
            .get(tool)
            .map(describe_search)
            .unwrap_or_default();
        bail!(
            "`{}` is not configured: {} was not found ({})\n\
             hint: install it or add its directory to `tools.search_dirs`, then re-run `biscuit-build configure`",
            name,
            tool,
            searched
        );
    }

    let names = state.tasks.names();
    bail!(
        "unknown task `{}`\n\
         available tasks: {}",
        name,
        if names.is_empty() {
            "(none)".to_string()
        } else {
            names.join(", ")
        }
    );
}

/// Registered tasks and the ones omitted for missing tools.
#[derive(Debug, Clone)]
pub struct TaskListing {
    pub registered: Vec<VerificationTask>,
    pub missing: Vec<(String, ToolKind)>,
}

pub fn list_tasks(build_dir: &Path) -> Result<TaskListing> {
    let state = load_configured(build_dir)?;
    Ok(TaskListing {
        registered: state.tasks.tasks().cloned().collect(),
        missing: state
            .tasks
            .missing()
            .map(|(name, tool)| (name.to_string(), tool))
            .collect(),
    })
}

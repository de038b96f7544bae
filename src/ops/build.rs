//! Implementation of `biscuit-build build`.

use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::builder::{BuildPlan, BuildSummary, NativeBuilder};
use crate::ops::configure::{load_configured, regenerate_if_stale, ConfiguredState};

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub build_dir: PathBuf,

    /// Specific targets to build (empty = all)
    pub targets: Vec<String>,

    /// Number of parallel jobs
    pub jobs: Option<usize>,

    /// Show a progress bar
    pub progress: bool,
}

/// Validate that all requested targets exist in the configured graph.
fn validate_target_filter(state: &ConfiguredState, targets: &[String]) -> Result<()> {
    let valid_targets: Vec<_> = state.graph.targets().iter().map(|t| t.name.as_str()).collect();

    for requested in targets {
        if !valid_targets.iter().any(|t| t == requested) {
            bail!(
                "unknown target `{}`\n\
                 available targets: {}",
                requested,
                if valid_targets.is_empty() {
                    "(none)".to_string()
                } else {
                    valid_targets.join(", ")
                }
            );
        }
    }

    Ok(())
}

/// Build the plan for `targets`, or for every target when empty.
pub fn plan_for(state: &ConfiguredState, targets: &[String]) -> Result<BuildPlan> {
    validate_target_filter(state, targets)?;

    let mut plan = state.plan();
    if !targets.is_empty() {
        let closure = state.graph.closure(targets.iter().map(String::as_str))?;
        plan.retain_targets(&closure);
    }
    Ok(plan)
}

/// Build a configured directory, regenerating first if sources changed.
pub fn build(opts: &BuildOptions) -> Result<(ConfiguredState, BuildSummary)> {
    let state = regenerate_if_stale(load_configured(&opts.build_dir)?)?;
    let plan = plan_for(&state, &opts.targets)?;

    tracing::info!(
        "Building {} ({}): {} compile step(s), {} link step(s)",
        state.project_name,
        state.configuration().profile,
        plan.compile_count(),
        plan.link_count()
    );

    let summary = NativeBuilder::new(&state.toolchain, &state.build_dir)
        .jobs(opts.jobs.or(state.jobs))
        .progress(opts.progress)
        .execute(&plan)?;

    Ok((state, summary))
}

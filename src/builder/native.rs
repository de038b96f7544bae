//! Native C++ compiler driver.
//!
//! Compiles sources in parallel on a bounded rayon pool, then archives and
//! links sequentially in plan order.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::builder::fingerprint::{command_fingerprint, FingerprintCache, FINGERPRINT_FILE};
use crate::builder::plan::{BuildPlan, BuildStep, CompileStep};
use crate::builder::toolchain::{CommandSpec, Toolchain};
use crate::util::fs::{ensure_dir, remove_file_if_exists};

/// What a build run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub compiled: usize,
    pub fresh: usize,
    pub linked: usize,
}

/// Native C++ builder.
pub struct NativeBuilder<'a> {
    toolchain: &'a Toolchain,
    build_dir: &'a Path,
    jobs: Option<usize>,
    progress: bool,
}

impl<'a> NativeBuilder<'a> {
    pub fn new(toolchain: &'a Toolchain, build_dir: &'a Path) -> Self {
        NativeBuilder {
            toolchain,
            build_dir,
            jobs: None,
            progress: false,
        }
    }

    /// Bound compile parallelism. `None` uses rayon's default.
    pub fn jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }

    /// Show a progress bar on stderr.
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Execute the build plan.
    ///
    /// Compile steps run in parallel; archive and link steps run
    /// sequentially afterwards, in dependency order. Fingerprints of
    /// completed steps are saved even when a later step fails.
    pub fn execute(&self, plan: &BuildPlan) -> Result<BuildSummary> {
        let start = Instant::now();
        let cache_path = self.build_dir.join(FINGERPRINT_FILE);
        let mut cache = FingerprintCache::load(&cache_path);
        let mut summary = BuildSummary::default();

        let pb = self.progress_bar((plan.compile_count() + plan.link_count()) as u64);

        let pending: Vec<(&CompileStep, CommandSpec, String)> = plan
            .compile_steps()
            .filter_map(|step| {
                let cmd = self.toolchain.compile_command(step);
                let fp = command_fingerprint(&cmd);
                if cache.needs_compile(&step.output, &step.depfile, &step.source, &fp) {
                    Some((step, cmd, fp))
                } else {
                    pb.inc(1);
                    None
                }
            })
            .collect();
        summary.fresh += plan.compile_count() - pending.len();

        if !pending.is_empty() {
            tracing::info!("Compiling {} file(s)", pending.len());

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.jobs.unwrap_or(0))
                .build()
                .context("failed to start compile workers")?;

            let results: Vec<Result<(PathBuf, String)>> = pool.install(|| {
                pending
                    .par_iter()
                    .map(|(step, cmd, fp)| {
                        pb.set_message(display_name(&step.source));
                        let result = compile(step, cmd).map(|_| (step.output.clone(), fp.clone()));
                        pb.inc(1);
                        result
                    })
                    .collect()
            });

            let mut first_error = None;
            for result in results {
                match result {
                    Ok((output, fp)) => {
                        cache.record(output, fp);
                        summary.compiled += 1;
                    }
                    Err(e) if first_error.is_none() => first_error = Some(e),
                    Err(_) => {}
                }
            }
            if let Some(e) = first_error {
                pb.abandon();
                cache.save(&cache_path)?;
                return Err(e);
            }
        }

        for step in &plan.steps {
            let (output, inputs, cmd) = match step {
                BuildStep::Compile(_) => continue,
                BuildStep::Archive(s) => (&s.output, s.objects.clone(), self.toolchain.archive_command(s)),
                BuildStep::Link(s) => {
                    let mut inputs = s.objects.clone();
                    inputs.extend(s.libraries.iter().cloned());
                    (&s.output, inputs, self.toolchain.link_command(s))
                }
            };

            pb.set_message(step.target().to_string());
            let fp = command_fingerprint(&cmd);
            if cache.needs_link(output, &inputs, &fp) {
                // `ar r` keeps members of deleted sources; recreate the archive
                let result = match step {
                    BuildStep::Archive(_) => remove_file_if_exists(output)
                        .and_then(|()| run_step(step.target(), output, &cmd)),
                    _ => run_step(step.target(), output, &cmd),
                };
                if let Err(e) = result {
                    pb.abandon();
                    cache.save(&cache_path)?;
                    return Err(e);
                }
                cache.record(output.clone(), fp);
                summary.linked += 1;
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        cache.save(&cache_path)?;

        tracing::info!(
            "Finished in {:.2}s ({} compiled, {} fresh, {} linked)",
            start.elapsed().as_secs_f64(),
            summary.compiled,
            summary.fresh,
            summary.linked
        );
        Ok(summary)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.progress || total == 0 {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Compile a single source file.
fn compile(step: &CompileStep, cmd: &CommandSpec) -> Result<()> {
    if let Some(parent) = step.output.parent() {
        ensure_dir(parent)?;
    }

    tracing::debug!("Compiling {} -> {}", step.source.display(), step.output.display());

    let output = cmd.to_process().exec()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("compilation failed for {}\n{}", step.source.display(), stderr);
    }
    Ok(())
}

/// Run an archive or link command.
fn run_step(target: &str, output_path: &Path, cmd: &CommandSpec) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        ensure_dir(parent)?;
    }

    tracing::debug!("{}", cmd.to_process().display_command());

    let output = cmd.to_process().exec()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("linking failed for {} ({})\n{}", target, output_path.display(), stderr);
    }
    Ok(())
}

//! Running verification tasks.
//!
//! The file set of a task is rediscovered on every run. Check-only tasks
//! report failures in a [`TaskReport`]; only an inability to run the tool at
//! all is an `Err`.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use regex::Regex;

use crate::core::source_set::{DiscoveryRule, SourceRole};
use crate::util::process::{find_executable, ProcessBuilder};
use crate::verify::tasks::{TaskAction, TaskMode, VerificationTask};

/// Files handed to the formatter per invocation.
const FORMAT_CHUNK: usize = 64;

/// Outcome of one task run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub task: String,

    /// Number of files in scope
    pub files: usize,

    /// One entry per failing file or batch
    pub failures: Vec<String>,
}

impl TaskReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a registered task.
pub fn run_task(task: &VerificationTask) -> Result<TaskReport> {
    if !task.program.exists() {
        bail!(
            "{} disappeared from {}; re-run `biscuit-build configure`",
            task.tool,
            task.program.display()
        );
    }

    let files = scope_files(task)?;
    tracing::info!("Running {} on {} file(s)", task.name, files.len());

    let failures = match &task.action {
        TaskAction::Format => run_format(task, &files)?,
        TaskAction::Lint {
            batch_size,
            workers,
            line_length,
            suppress,
        } => run_lint(task, &files, *batch_size, *workers, *line_length, suppress)?,
        TaskAction::Analyze {
            build_dir,
            requires,
        } => run_analyze(task, &files, build_dir, requires)?,
    };

    Ok(TaskReport {
        task: task.name.clone(),
        files: files.len(),
        failures,
    })
}

fn scope_files(task: &VerificationTask) -> Result<Vec<PathBuf>> {
    let manifest = DiscoveryRule::new(SourceRole::LintScope, task.roots.clone(), task.extensions.clone())
        .exclude_names(task.exclude.iter().cloned())
        .discover(&task.working_dir)?;
    Ok(manifest.files.into_iter().collect())
}

fn run_format(task: &VerificationTask, files: &[PathBuf]) -> Result<Vec<String>> {
    let mut failures = Vec::new();

    for chunk in files.chunks(FORMAT_CHUNK) {
        let cmd = ProcessBuilder::new(&task.program).cwd(&task.working_dir);
        let cmd = match task.mode {
            TaskMode::MutateInPlace => cmd.arg("-i"),
            TaskMode::CheckOnly => cmd.arg("--dry-run").arg("-Werror"),
        };
        let cmd = cmd.arg("-style=file").args(chunk);

        tracing::debug!("{}", cmd.display_command());
        let output = cmd.exec()?;
        if output.status.success() {
            continue;
        }

        match task.mode {
            TaskMode::MutateInPlace => bail!(
                "{} failed to rewrite files\n{}",
                task.tool,
                String::from_utf8_lossy(&output.stderr)
            ),
            TaskMode::CheckOnly => failures.extend(unformatted_files(chunk, &output)),
        }
    }

    Ok(failures)
}

/// Files named in the formatter's diagnostics; the whole chunk if none are.
fn unformatted_files(chunk: &[PathBuf], output: &Output) -> Vec<String> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let named: Vec<String> = chunk
        .iter()
        .map(|f| f.display().to_string())
        .filter(|f| stderr.contains(f.as_str()))
        .collect();

    if named.is_empty() {
        chunk
            .iter()
            .map(|f| format!("{}: not in canonical form", f.display()))
            .collect()
    } else {
        named
            .into_iter()
            .map(|f| format!("{}: not in canonical form", f))
            .collect()
    }
}

/// The lint script command, through python when it is a `.py` file.
fn lint_command(program: &Path) -> Result<ProcessBuilder> {
    if program.extension().is_some_and(|e| e == "py") {
        let python = find_executable("python3")
            .or_else(|| find_executable("python"))
            .context("python3 is required to run the lint script")?;
        Ok(ProcessBuilder::new(python).arg(program))
    } else {
        Ok(ProcessBuilder::new(program))
    }
}

fn run_lint(
    task: &VerificationTask,
    files: &[PathBuf],
    batch_size: usize,
    workers: usize,
    line_length: usize,
    suppress: &[String],
) -> Result<Vec<String>> {
    let base = lint_command(&task.program)?
        .cwd(&task.working_dir)
        .arg("--verbose=2")
        .arg(format!("--linelength={}", line_length));
    let base = if suppress.is_empty() {
        base
    } else {
        let filter = suppress
            .iter()
            .map(|c| format!("-{}", c))
            .collect::<Vec<_>>()
            .join(",");
        base.arg(format!("--filter={}", filter))
    };

    let total = Regex::new(r"Total errors found: (\d+)")?;
    let batches: Vec<&[PathBuf]> = files.chunks(batch_size.max(1)).collect();
    tracing::debug!("{} lint batch(es) on {} worker(s)", batches.len(), workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .context("failed to start lint workers")?;

    let results: Vec<Result<Option<String>>> = pool.install(|| {
        batches
            .par_iter()
            .enumerate()
            .map(|(i, batch)| {
                let output = base.clone().args(batch.iter()).exec()?;
                let stderr = String::from_utf8_lossy(&output.stderr);
                let errors: usize = total
                    .captures(&stderr)
                    .and_then(|c| c[1].parse().ok())
                    .unwrap_or(0);

                if output.status.success() && errors == 0 {
                    return Ok(None);
                }

                let details: Vec<&str> = stderr
                    .lines()
                    .filter(|l| !l.starts_with("Done processing") && !total.is_match(l))
                    .collect();
                Ok(Some(format!(
                    "batch {}: {} error(s)\n{}",
                    i + 1,
                    errors.max(1),
                    details.join("\n")
                )))
            })
            .collect()
    });

    let mut failures = Vec::new();
    for result in results {
        if let Some(failure) = result? {
            failures.push(failure);
        }
    }
    Ok(failures)
}

fn run_analyze(
    task: &VerificationTask,
    files: &[PathBuf],
    build_dir: &Path,
    requires: &[PathBuf],
) -> Result<Vec<String>> {
    let database = build_dir.join("compile_commands.json");
    if !database.is_file() {
        bail!(
            "{} is missing; re-run `biscuit-build configure`",
            database.display()
        );
    }
    if let Some(missing) = requires.iter().find(|p| !p.exists()) {
        bail!(
            "framework headers not found at {}; re-run `biscuit-build configure`",
            missing.display()
        );
    }

    if files.is_empty() {
        return Ok(Vec::new());
    }

    let cmd = ProcessBuilder::new(&task.program)
        .cwd(&task.working_dir)
        .arg("-p")
        .arg(build_dir)
        .arg("--warnings-as-errors=*")
        .arg("--quiet")
        .args(files);

    tracing::debug!("{}", cmd.display_command());
    let output = cmd.exec()?;
    if output.status.success() {
        return Ok(Vec::new());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let findings: Vec<String> = stdout
        .lines()
        .filter(|l| l.contains(": error:") || l.contains(": warning:"))
        .map(str::to_string)
        .collect();

    if findings.is_empty() {
        Ok(vec![format!(
            "{} exited with {}\n{}",
            task.tool,
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )])
    } else {
        Ok(findings)
    }
}

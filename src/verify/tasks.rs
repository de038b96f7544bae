//! Verification task registry.
//!
//! Tasks exist only for tools that were located. A task whose tool is
//! missing is recorded separately so callers can tell "not configured"
//! apart from "unknown task name"; it is never registered in a failing
//! state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::project::Project;
use crate::verify::locator::{ToolKind, ToolRecord, ToolSet};

pub const FORMAT: &str = "format";
pub const CHECK_FORMAT: &str = "check-format";
pub const CHECK_LINT: &str = "check-lint";
pub const CHECK_CLANG_TIDY: &str = "check-clang-tidy";

/// Whether a task rewrites files or only reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskMode {
    MutateInPlace,
    CheckOnly,
}

/// Tool-specific invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum TaskAction {
    Format,
    Lint {
        batch_size: usize,
        workers: usize,
        line_length: usize,
        /// Categories passed as `-<category>` filters
        suppress: Vec<String>,
    },
    Analyze {
        /// Directory holding `compile_commands.json`
        build_dir: PathBuf,
        /// Framework header directories that must exist before analysis
        requires: Vec<PathBuf>,
    },
}

/// A runnable verification task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTask {
    pub name: String,

    pub tool: ToolKind,

    /// Located tool binary or script
    pub program: PathBuf,

    pub mode: TaskMode,

    /// Project root; the tool runs from here
    pub working_dir: PathBuf,

    /// Directory trees scanned
    pub roots: Vec<PathBuf>,

    /// File extensions in scope
    pub extensions: Vec<String>,

    /// File name patterns skipped
    pub exclude: Vec<String>,

    pub action: TaskAction,
}

/// Registered tasks plus the names omitted for missing tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, VerificationTask>,

    /// Omitted task name -> the tool that was not found
    missing: BTreeMap<String, ToolKind>,
}

impl TaskRegistry {
    /// Register tasks for every located tool; warn for the rest.
    pub fn register(
        project: &Project,
        tools: &ToolSet,
        build_dir: &Path,
        framework_includes: Vec<PathBuf>,
    ) -> Self {
        let descriptor = project.descriptor();
        let layout = project.layout();
        let roots = vec![project.src_dir(), project.test_dir(), project.benchmark_dir()];

        let mut all_exts = layout.source_extensions.clone();
        all_exts.extend(layout.header_extensions.iter().cloned());

        let mut registry = TaskRegistry::default();

        let formatter = |name: &str, mode: TaskMode, program: PathBuf| VerificationTask {
            name: name.to_string(),
            tool: ToolKind::Formatter,
            program,
            mode,
            working_dir: project.root().to_path_buf(),
            roots: roots.clone(),
            extensions: all_exts.clone(),
            exclude: descriptor.format.exclude.clone(),
            action: TaskAction::Format,
        };

        match tools.get(ToolKind::Formatter).and_then(|r| r.path.clone()) {
            Some(program) => {
                registry.add(formatter(FORMAT, TaskMode::MutateInPlace, program.clone()));
                registry.add(formatter(CHECK_FORMAT, TaskMode::CheckOnly, program));
            }
            None => registry.omit(ToolKind::Formatter, &[FORMAT, CHECK_FORMAT]),
        }

        match tools.path(ToolKind::LintScript) {
            Some(program) => registry.add(VerificationTask {
                name: CHECK_LINT.to_string(),
                tool: ToolKind::LintScript,
                program: program.to_path_buf(),
                mode: TaskMode::CheckOnly,
                working_dir: project.root().to_path_buf(),
                roots: roots.clone(),
                extensions: all_exts.clone(),
                exclude: Vec::new(),
                action: TaskAction::Lint {
                    batch_size: descriptor.lint.batch_size.max(1),
                    workers: descriptor.lint.workers.max(1),
                    line_length: descriptor.lint.line_length,
                    suppress: descriptor.lint.suppress.clone(),
                },
            }),
            None => registry.omit(ToolKind::LintScript, &[CHECK_LINT]),
        }

        match tools.path(ToolKind::StaticAnalyzer) {
            Some(program) => registry.add(VerificationTask {
                name: CHECK_CLANG_TIDY.to_string(),
                tool: ToolKind::StaticAnalyzer,
                program: program.to_path_buf(),
                mode: TaskMode::CheckOnly,
                working_dir: project.root().to_path_buf(),
                roots: roots.clone(),
                extensions: layout.source_extensions.clone(),
                exclude: Vec::new(),
                action: TaskAction::Analyze {
                    build_dir: build_dir.to_path_buf(),
                    requires: framework_includes,
                },
            }),
            None => registry.omit(ToolKind::StaticAnalyzer, &[CHECK_CLANG_TIDY]),
        }

        registry
    }

    fn add(&mut self, task: VerificationTask) {
        tracing::debug!("registered task `{}` ({})", task.name, task.program.display());
        self.tasks.insert(task.name.clone(), task);
    }

    fn omit(&mut self, tool: ToolKind, names: &[&str]) {
        tracing::warn!(
            "{} not found; {} will not be available",
            tool,
            names
                .iter()
                .map(|n| format!("`{}`", n))
                .collect::<Vec<_>>()
                .join(", ")
        );
        for name in names {
            self.missing.insert(name.to_string(), tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&VerificationTask> {
        self.tasks.get(name)
    }

    /// The tool whose absence omitted `name`, if any.
    pub fn missing_tool(&self, name: &str) -> Option<ToolKind> {
        self.missing.get(name).copied()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &VerificationTask> {
        self.tasks.values()
    }

    pub fn missing(&self) -> impl Iterator<Item = (&str, ToolKind)> {
        self.missing.iter().map(|(n, t)| (n.as_str(), *t))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }
}

/// Describe where a missing tool was looked for.
pub fn describe_search(record: &ToolRecord) -> String {
    format!(
        "tried {} in {} director{}",
        record.names.join(", "),
        record.searched.len(),
        if record.searched.len() == 1 { "y" } else { "ies" }
    )
}

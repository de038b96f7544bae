//! Source set discovery.
//!
//! Manifests are never cached across configure runs: every configure (and
//! every build that checks for staleness) walks the directory roots again,
//! so a file added or removed under a watched root shows up in the next
//! manifest without anyone editing a file list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::project::Project;
use crate::util::fs::relative_path;
use crate::util::hash::Fingerprint;

/// What a manifest is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceRole {
    /// Sources of the shared object set (entry point excluded)
    Library,
    Test,
    Benchmark,
    /// Everything the linter and formatter look at
    LintScope,
    /// The executable's `main` source; not discovered
    EntryPoint,
}

impl SourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceRole::Library => "library",
            SourceRole::Test => "test",
            SourceRole::Benchmark => "benchmark",
            SourceRole::LintScope => "lint-scope",
            SourceRole::EntryPoint => "entry-point",
        }
    }
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to discover one manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRule {
    pub role: SourceRole,

    /// Directory roots, scanned recursively
    pub roots: Vec<PathBuf>,

    /// Accepted file extensions (without the dot)
    pub extensions: Vec<String>,

    /// Exact paths left out of the manifest
    #[serde(default)]
    pub exclude_paths: Vec<PathBuf>,

    /// Glob patterns matched against the file name
    #[serde(default)]
    pub exclude_names: Vec<String>,
}

impl DiscoveryRule {
    pub fn new(role: SourceRole, roots: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        DiscoveryRule {
            role,
            roots,
            extensions,
            exclude_paths: Vec::new(),
            exclude_names: Vec::new(),
        }
    }

    pub fn exclude_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude_paths.push(path.into());
        self
    }

    pub fn exclude_names(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude_names.extend(names.into_iter().map(Into::into));
        self
    }

    fn accepts_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }

    /// Walk the roots and produce a fresh manifest.
    ///
    /// Missing roots contribute nothing; an empty manifest is valid.
    pub fn discover(&self, base: &Path) -> Result<SourceManifest> {
        let patterns = self
            .exclude_names
            .iter()
            .map(|p| Pattern::new(p).with_context(|| format!("invalid exclusion pattern `{}`", p)))
            .collect::<Result<Vec<_>>>()?;

        let mut files = BTreeSet::new();
        for root in &self.roots {
            if !root.is_dir() {
                tracing::debug!("{} root {} does not exist", self.role, root.display());
                continue;
            }

            for entry in WalkDir::new(root).follow_links(true) {
                let entry = entry.with_context(|| format!("failed to scan {}", root.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                if !self.accepts_extension(path) || self.exclude_paths.iter().any(|p| p == path) {
                    continue;
                }

                let excluded_by_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| patterns.iter().any(|p| p.matches(name)));
                if excluded_by_name {
                    continue;
                }

                files.insert(path.to_path_buf());
            }
        }

        tracing::debug!("discovered {} {} file(s)", files.len(), self.role);
        Ok(SourceManifest::new(self.role, base, files))
    }
}

/// A discovered set of files for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceManifest {
    pub role: SourceRole,

    /// Absolute paths, sorted
    pub files: BTreeSet<PathBuf>,

    /// Hash over the sorted root-relative paths
    pub digest: String,
}

impl SourceManifest {
    pub fn new(role: SourceRole, base: &Path, files: BTreeSet<PathBuf>) -> Self {
        let mut fp = Fingerprint::new();
        fp.field(role.as_str());
        for file in &files {
            fp.path(&relative_path(base, file));
        }

        SourceManifest {
            role,
            files,
            digest: fp.hex(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }
}

/// The discovery rules for a project.
pub fn rules_for(project: &Project) -> Vec<DiscoveryRule> {
    let layout = project.layout();
    let sources = layout.source_extensions.clone();
    let mut lint_exts = sources.clone();
    lint_exts.extend(layout.header_extensions.iter().cloned());

    vec![
        DiscoveryRule::new(SourceRole::Library, vec![project.src_dir()], sources.clone())
            .exclude_path(project.entry_point()),
        DiscoveryRule::new(SourceRole::Test, vec![project.test_dir()], sources.clone()),
        DiscoveryRule::new(SourceRole::Benchmark, vec![project.benchmark_dir()], sources),
        DiscoveryRule::new(
            SourceRole::LintScope,
            vec![project.src_dir(), project.test_dir(), project.benchmark_dir()],
            lint_exts,
        ),
    ]
}

/// All manifests of one discovery pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSets {
    manifests: BTreeMap<SourceRole, SourceManifest>,
}

impl SourceSets {
    /// Run a full discovery pass over a project.
    pub fn discover(project: &Project) -> Result<Self> {
        let mut manifests = BTreeMap::new();
        for rule in rules_for(project) {
            let manifest = rule.discover(project.root())?;
            manifests.insert(rule.role, manifest);
        }
        Ok(SourceSets { manifests })
    }

    /// The manifest for a role; empty if the role was never discovered.
    pub fn get(&self, role: SourceRole) -> SourceManifest {
        self.manifests
            .get(&role)
            .cloned()
            .unwrap_or_else(|| SourceManifest {
                role,
                files: BTreeSet::new(),
                digest: String::new(),
            })
    }

    /// Role -> digest, for staleness checks.
    pub fn digests(&self) -> BTreeMap<SourceRole, String> {
        self.manifests
            .iter()
            .map(|(role, m)| (*role, m.digest.clone()))
            .collect()
    }

    /// Roles whose digest differs from `other`.
    pub fn changed_roles(&self, other: &SourceSets) -> Vec<SourceRole> {
        let mine = self.digests();
        let theirs = other.digests();
        let roles: BTreeSet<_> = mine.keys().chain(theirs.keys()).copied().collect();
        roles
            .into_iter()
            .filter(|r| mine.get(r) != theirs.get(r))
            .collect()
    }
}

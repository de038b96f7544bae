//! Optional tool discovery.
//!
//! Each tool has an ordered list of accepted names, version-qualified names
//! first. Names are tried in order; for each name every search directory is
//! tried before moving to the next name, so `clang-format-15` anywhere beats
//! a plain `clang-format` earlier on the path. Absence is recorded, never
//! raised.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::config::ToolsConfig;

/// Well-known install locations searched after PATH.
const WELL_KNOWN_DIRS: [&str; 4] = [
    "/usr/local/bin",
    "/usr/bin",
    "/usr/local/opt/llvm/bin",
    "/opt/homebrew/opt/llvm/bin",
];

/// An optional verification tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    Formatter,
    StaticAnalyzer,
    LintScript,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::Formatter, ToolKind::StaticAnalyzer, ToolKind::LintScript];

    /// Name used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Formatter => "clang-format",
            ToolKind::StaticAnalyzer => "clang-tidy",
            ToolKind::LintScript => "cpplint",
        }
    }

    /// Accepted binary names, most preferred first.
    pub fn default_names(&self) -> Vec<String> {
        match self {
            ToolKind::Formatter | ToolKind::StaticAnalyzer => {
                let base = self.label();
                (12..=15)
                    .rev()
                    .map(|v| format!("{}-{}", base, v))
                    .chain(std::iter::once(base.to_string()))
                    .collect()
            }
            ToolKind::LintScript => vec!["cpplint.py".to_string(), "cpplint".to_string()],
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of searching for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRecord {
    pub kind: ToolKind,

    /// Accepted names, in the order they were tried
    pub names: Vec<String>,

    /// Resolved absolute path, if found
    pub path: Option<PathBuf>,

    /// Directories searched, in order
    pub searched: Vec<PathBuf>,
}

impl ToolRecord {
    pub fn is_found(&self) -> bool {
        self.path.is_some()
    }
}

/// Searches configured and standard locations for tools.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    search_dirs: Vec<PathBuf>,
    build_support: Option<PathBuf>,
    system_path: bool,
    names: BTreeMap<ToolKind, Vec<String>>,
}

impl ToolLocator {
    pub fn new(config: &ToolsConfig) -> Self {
        let mut names = BTreeMap::new();
        for (kind, configured) in [
            (ToolKind::Formatter, &config.formatter),
            (ToolKind::StaticAnalyzer, &config.analyzer),
            (ToolKind::LintScript, &config.lint),
        ] {
            if !configured.is_empty() {
                names.insert(kind, configured.clone());
            }
        }

        ToolLocator {
            search_dirs: config.search_dirs.clone(),
            build_support: None,
            system_path: config.use_system_path(),
            names,
        }
    }

    /// Project script directory, searched for the lint script.
    pub fn build_support(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_support = Some(dir.into());
        self
    }

    pub fn names_for(&self, kind: ToolKind) -> Vec<String> {
        self.names
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_names())
    }

    /// Directories searched for `kind`, in order.
    pub fn search_path(&self, kind: ToolKind) -> Vec<PathBuf> {
        let mut dirs = self.search_dirs.clone();
        if kind == ToolKind::LintScript {
            dirs.extend(self.build_support.iter().cloned());
        }
        if self.system_path {
            if let Some(path) = std::env::var_os("PATH") {
                dirs.extend(std::env::split_paths(&path));
            }
            dirs.extend(WELL_KNOWN_DIRS.iter().map(PathBuf::from));
        }

        let mut seen = std::collections::BTreeSet::new();
        dirs.retain(|d| !d.as_os_str().is_empty() && seen.insert(d.clone()));
        dirs
    }

    pub fn locate(&self, kind: ToolKind) -> ToolRecord {
        let names = self.names_for(kind);
        let searched = self.search_path(kind);

        let path = names.iter().find_map(|name| {
            searched
                .iter()
                .find_map(|dir| find_in_dir(name, dir))
        });

        match &path {
            Some(p) => tracing::debug!("found {} at {}", kind, p.display()),
            None => tracing::debug!("{} not found in {} directories", kind, searched.len()),
        }

        ToolRecord {
            kind,
            names,
            path,
            searched,
        }
    }
}

/// A script (`*.py`) only has to exist; it is run through an interpreter.
fn find_in_dir(name: &str, dir: &Path) -> Option<PathBuf> {
    if name.ends_with(".py") {
        let candidate = dir.join(name);
        return candidate.is_file().then_some(candidate);
    }
    which::which_in(name, Some(dir.as_os_str()), dir).ok()
}

/// Presence/absence of every optional tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSet {
    records: BTreeMap<ToolKind, ToolRecord>,
}

impl ToolSet {
    pub fn locate_all(locator: &ToolLocator) -> Self {
        ToolSet {
            records: ToolKind::ALL
                .into_iter()
                .map(|kind| (kind, locator.locate(kind)))
                .collect(),
        }
    }

    pub fn get(&self, kind: ToolKind) -> Option<&ToolRecord> {
        self.records.get(&kind)
    }

    /// Path of a located tool.
    pub fn path(&self, kind: ToolKind) -> Option<&Path> {
        self.get(kind).and_then(|r| r.path.as_deref())
    }

    pub fn records(&self) -> impl Iterator<Item = &ToolRecord> {
        self.records.values()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::fake_executable;
    use tempfile::TempDir;

    fn isolated(dirs: Vec<PathBuf>) -> ToolsConfig {
        ToolsConfig {
            search_dirs: dirs,
            system_path: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_names_prefer_versions() {
        let names = ToolKind::Formatter.default_names();
        assert_eq!(names.first().map(String::as_str), Some("clang-format-15"));
        assert_eq!(names.last().map(String::as_str), Some("clang-format"));
    }

    #[test]
    fn test_versioned_name_wins_across_directories() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        fake_executable(&first, "clang-tidy", "exit 0");
        let versioned = fake_executable(&second, "clang-tidy-14", "exit 0");

        let locator = ToolLocator::new(&isolated(vec![first.clone(), second.clone()]));
        let record = locator.locate(ToolKind::StaticAnalyzer);

        assert_eq!(record.path, Some(versioned));
        assert_eq!(record.searched, vec![first, second]);
    }

    #[test]
    fn test_missing_tool_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let locator = ToolLocator::new(&isolated(vec![tmp.path().to_path_buf()]));
        let record = locator.locate(ToolKind::Formatter);

        assert!(!record.is_found());
        assert_eq!(record.searched, vec![tmp.path().to_path_buf()]);
    }

    #[test]
    fn test_lint_script_found_in_build_support() {
        let tmp = TempDir::new().unwrap();
        let support = tmp.path().join("build_support");
        std::fs::create_dir_all(&support).unwrap();
        std::fs::write(support.join("cpplint.py"), "# lint").unwrap();

        let locator = ToolLocator::new(&isolated(vec![])).build_support(&support);
        let tools = ToolSet::locate_all(&locator);

        assert_eq!(tools.path(ToolKind::LintScript), Some(support.join("cpplint.py").as_path()));
        assert!(tools.path(ToolKind::Formatter).is_none());
    }

    #[test]
    fn test_configured_names_replace_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = fake_executable(tmp.path(), "my-format", "exit 0");
        let mut config = isolated(vec![tmp.path().to_path_buf()]);
        config.formatter = vec!["my-format".into()];

        let record = ToolLocator::new(&config).locate(ToolKind::Formatter);
        assert_eq!(record.path, Some(path));
    }
}

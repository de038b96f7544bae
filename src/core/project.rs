//! The project descriptor (`Biscuit.toml`) and the directory roles it assigns.
//!
//! Every section is optional; the defaults describe the biscuit database
//! tree (`src/`, `src/include/`, `test/`, `benchmark/`, `build_support/`)
//! with googletest and google benchmark as external frameworks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::error::ConfigureError;

/// File name of the top-level build descriptor.
pub const DESCRIPTOR_NAME: &str = "Biscuit.toml";

/// Parsed `Biscuit.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDescriptor {
    pub project: ProjectSection,

    #[serde(default)]
    pub layout: Layout,

    #[serde(default)]
    pub options: CodegenOptions,

    #[serde(default)]
    pub format: FormatSection,

    #[serde(default)]
    pub lint: LintSection,

    #[serde(default = "HarnessSection::default_test")]
    pub test: HarnessSection,

    #[serde(default = "HarnessSection::default_benchmark")]
    pub benchmark: HarnessSection,

    /// External frameworks, bootstrapped at configure time
    #[serde(default = "default_dependencies")]
    pub dependencies: BTreeMap<String, DependencySpec>,
}

/// `[project]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name; target names derive from it
    pub name: String,

    /// Value passed as `-std=`
    #[serde(default = "default_cxx_standard")]
    pub cxx_standard: String,
}

fn default_cxx_standard() -> String {
    "c++17".to_string()
}

/// `[layout]` - directory roles, relative to the project root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub src: PathBuf,
    pub include: PathBuf,
    pub test: PathBuf,
    pub benchmark: PathBuf,
    pub build_support: PathBuf,

    /// Source backing the main executable; kept out of the object set
    pub entry_point: PathBuf,

    /// Extensions of compilable files
    pub source_extensions: Vec<String>,

    /// Extensions of header files
    pub header_extensions: Vec<String>,
}

impl Default for Layout {
    fn default() -> Self {
        Layout {
            src: PathBuf::from("src"),
            include: PathBuf::from("src/include"),
            test: PathBuf::from("test"),
            benchmark: PathBuf::from("benchmark"),
            build_support: PathBuf::from("build_support"),
            entry_point: PathBuf::from("src/main.cpp"),
            source_extensions: vec!["cpp".into(), "cc".into(), "cxx".into()],
            header_extensions: vec!["h".into(), "hpp".into()],
        }
    }
}

/// `[options]` - codegen flags every consumer of the object set inherits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenOptions {
    /// Architecture-specific codegen
    pub arch: Vec<String>,

    /// Enables the 16-byte compare-and-exchange instruction
    pub wide_cas: Vec<String>,

    /// System libraries linked into every executable
    pub system_libs: Vec<String>,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            arch: vec!["-march=native".into()],
            wide_cas: vec!["-mcx16".into()],
            system_libs: vec!["pthread".into()],
        }
    }
}

/// `[format]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatSection {
    /// File names (or glob patterns on the file name) never reformatted
    pub exclude: Vec<String>,
}

/// `[lint]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LintSection {
    /// Files handed to one linter process
    pub batch_size: usize,

    /// Maximum concurrent linter processes
    pub workers: usize,

    pub line_length: usize,

    /// Violation categories suppressed by policy
    pub suppress: Vec<String>,
}

impl Default for LintSection {
    fn default() -> Self {
        LintSection {
            batch_size: 12,
            workers: 8,
            line_length: 120,
            suppress: vec!["legal/copyright".into(), "build/header_guard".into()],
        }
    }
}

/// `[test]` / `[benchmark]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSection {
    /// Imported sub-targets the binary links against
    pub links: Vec<String>,
}

impl HarnessSection {
    fn default_test() -> Self {
        HarnessSection {
            links: vec!["gtest".into(), "gtest_main".into()],
        }
    }

    fn default_benchmark() -> Self {
        HarnessSection {
            links: vec!["benchmark".into(), "benchmark_main".into()],
        }
    }
}

/// `[dependencies.<name>]` - an external framework.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencySpec {
    /// Git repository URL
    pub git: Option<String>,
    pub tag: Option<String>,
    pub branch: Option<String>,
    pub rev: Option<String>,

    /// Gzip tarball URL
    pub url: Option<String>,
    pub sha256: Option<String>,
    pub strip_prefix: Option<String>,

    /// Local source directory, relative to the project root
    pub path: Option<PathBuf>,

    /// Cache options for the nested configure step
    pub cmake_args: Vec<String>,

    /// Sub-targets this dependency exposes
    pub targets: BTreeMap<String, ExposedTarget>,
}

/// A linkable sub-target produced by a dependency's nested build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedTarget {
    /// Library base name (`gtest` -> `libgtest.a`)
    pub library: String,

    /// Include directories, relative to the dependency's source root
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

impl ExposedTarget {
    fn new(library: &str, include: &[&str]) -> Self {
        ExposedTarget {
            library: library.to_string(),
            include: include.iter().map(PathBuf::from).collect(),
        }
    }
}

fn default_dependencies() -> BTreeMap<String, DependencySpec> {
    let googletest = DependencySpec {
        git: Some("https://github.com/google/googletest.git".into()),
        tag: Some("release-1.12.1".into()),
        cmake_args: vec![
            "-DINSTALL_GTEST=OFF".into(),
            "-Dgtest_force_shared_crt=ON".into(),
        ],
        targets: [
            ("gtest", ExposedTarget::new("gtest", &["googletest/include"])),
            ("gtest_main", ExposedTarget::new("gtest_main", &["googletest/include"])),
            (
                "gmock",
                ExposedTarget::new("gmock", &["googlemock/include", "googletest/include"]),
            ),
            (
                "gmock_main",
                ExposedTarget::new("gmock_main", &["googlemock/include", "googletest/include"]),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect(),
        ..Default::default()
    };

    let benchmark = DependencySpec {
        git: Some("https://github.com/google/benchmark.git".into()),
        tag: Some("v1.7.1".into()),
        cmake_args: vec![
            "-DBENCHMARK_ENABLE_TESTING=OFF".into(),
            "-DBENCHMARK_ENABLE_GTEST_TESTS=OFF".into(),
            "-DBENCHMARK_ENABLE_INSTALL=OFF".into(),
        ],
        targets: [
            ("benchmark", ExposedTarget::new("benchmark", &["include"])),
            ("benchmark_main", ExposedTarget::new("benchmark_main", &["include"])),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect(),
        ..Default::default()
    };

    [
        ("googletest".to_string(), googletest),
        ("benchmark".to_string(), benchmark),
    ]
    .into_iter()
    .collect()
}

impl ProjectDescriptor {
    /// Parse a descriptor from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid project descriptor")
    }

    /// Load a descriptor from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// A loaded project: its root directory and descriptor.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    descriptor: ProjectDescriptor,
}

impl Project {
    /// Load the project rooted at `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(DESCRIPTOR_NAME);
        if !path.is_file() {
            return Err(ConfigureError::MissingDescriptor {
                dir: root.to_path_buf(),
                descriptor: DESCRIPTOR_NAME.to_string(),
            }
            .into());
        }

        let descriptor = ProjectDescriptor::load(&path)?;
        Ok(Project {
            root: root.to_path_buf(),
            descriptor,
        })
    }

    /// Build a project from an already-parsed descriptor.
    pub fn from_descriptor(root: impl Into<PathBuf>, descriptor: ProjectDescriptor) -> Self {
        Project {
            root: root.into(),
            descriptor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn descriptor(&self) -> &ProjectDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.project.name
    }

    pub fn layout(&self) -> &Layout {
        &self.descriptor.layout
    }

    pub fn src_dir(&self) -> PathBuf {
        self.root.join(&self.descriptor.layout.src)
    }

    pub fn include_dir(&self) -> PathBuf {
        self.root.join(&self.descriptor.layout.include)
    }

    pub fn test_dir(&self) -> PathBuf {
        self.root.join(&self.descriptor.layout.test)
    }

    pub fn benchmark_dir(&self) -> PathBuf {
        self.root.join(&self.descriptor.layout.benchmark)
    }

    pub fn build_support_dir(&self) -> PathBuf {
        self.root.join(&self.descriptor.layout.build_support)
    }

    pub fn entry_point(&self) -> PathBuf {
        self.root.join(&self.descriptor.layout.entry_point)
    }
}

//! Target definitions - what gets built.
//!
//! A Target is declared once during graph construction and never mutated.
//! Only the object set compiles library sources; the libraries derived from
//! it consume its objects by reference.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::source_set::SourceRole;

/// The kind of target being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    /// Compiled translation units shared by every link target
    ObjectSet,

    /// Static library (.a) archived from the object set
    StaticLibrary,

    /// Shared library (.so / .dylib) linked from the object set
    SharedLibrary,

    /// Main executable
    Executable,

    /// Unit-test binary
    TestBinary,

    /// Benchmark binary
    BenchmarkBinary,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::ObjectSet => "object-set",
            TargetKind::StaticLibrary => "static-library",
            TargetKind::SharedLibrary => "shared-library",
            TargetKind::Executable => "executable",
            TargetKind::TestBinary => "test-binary",
            TargetKind::BenchmarkBinary => "benchmark-binary",
        }
    }

    /// Output subdirectory of the build directory.
    pub fn output_subdir(&self) -> &'static str {
        match self {
            TargetKind::ObjectSet => "obj",
            TargetKind::StaticLibrary | TargetKind::SharedLibrary => "lib",
            TargetKind::Executable | TargetKind::TestBinary | TargetKind::BenchmarkBinary => "bin",
        }
    }

    /// Get the output filename for a target of this kind.
    pub fn output_filename(&self, name: &str) -> String {
        match self {
            TargetKind::ObjectSet => name.to_string(),
            TargetKind::StaticLibrary => format!("lib{}.a", name),
            TargetKind::SharedLibrary => {
                if cfg!(target_os = "macos") {
                    format!("lib{}.dylib", name)
                } else {
                    format!("lib{}.so", name)
                }
            }
            TargetKind::Executable | TargetKind::TestBinary | TargetKind::BenchmarkBinary => {
                name.to_string()
            }
        }
    }

    /// Whether this kind runs the compiler over its own sources.
    pub fn compiles_sources(&self) -> bool {
        !matches!(self, TargetKind::StaticLibrary | TargetKind::SharedLibrary)
    }

    /// Whether this kind produces an executable.
    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            TargetKind::Executable | TargetKind::TestBinary | TargetKind::BenchmarkBinary
        )
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-target compile and link options.
///
/// Private options apply to the target itself. Public options also apply
/// to every target that depends on it, directly or transitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_compile: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_compile: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_link: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_link: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_include_dirs: Vec<PathBuf>,
}

impl TargetOptions {
    pub fn private_compile(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.private_compile.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn public_compile(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.public_compile.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn private_link(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.private_link.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn public_link(mut self, flags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.public_link.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn public_include(mut self, dir: impl Into<PathBuf>) -> Self {
        self.public_include_dirs.push(dir.into());
        self
    }
}

/// A build target with its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Unique target name
    pub name: String,

    pub kind: TargetKind,

    /// Base name of the produced file (`biscuit` -> `libbiscuit.a`)
    pub output_name: String,

    /// Manifest the sources came from, if the target compiles any
    pub source_role: Option<SourceRole>,

    /// Sources compiled by this target
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// In-project targets this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Object set whose objects this target consumes instead of compiling
    pub objects_from: Option<String>,

    /// Imported framework sub-targets linked in
    #[serde(default)]
    pub imports: Vec<String>,

    /// System libraries (`-l<name>`)
    #[serde(default)]
    pub system_libs: Vec<String>,

    #[serde(default)]
    pub options: TargetOptions,
}

impl Target {
    /// Create a new target with the given name and kind.
    pub fn new(name: impl Into<String>, kind: TargetKind) -> Self {
        let name = name.into();
        Target {
            output_name: name.clone(),
            name,
            kind,
            source_role: None,
            sources: Vec::new(),
            dependencies: Vec::new(),
            objects_from: None,
            imports: Vec::new(),
            system_libs: Vec::new(),
            options: TargetOptions::default(),
        }
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }

    pub fn with_sources(mut self, role: SourceRole, sources: impl IntoIterator<Item = PathBuf>) -> Self {
        self.source_role = Some(role);
        self.sources = sources.into_iter().collect();
        self
    }

    pub fn depends_on(mut self, target: impl Into<String>) -> Self {
        self.dependencies.push(target.into());
        self
    }

    /// Consume the objects of `object_set` and depend on it.
    pub fn archive_of(mut self, object_set: impl Into<String>) -> Self {
        let object_set = object_set.into();
        self.dependencies.push(object_set.clone());
        self.objects_from = Some(object_set);
        self
    }

    pub fn imports(mut self, imports: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.imports.extend(imports.into_iter().map(Into::into));
        self
    }

    pub fn system_libs(mut self, libs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.system_libs.extend(libs.into_iter().map(Into::into));
        self
    }

    pub fn with_options(mut self, options: TargetOptions) -> Self {
        self.options = options;
        self
    }

    /// Output path relative to the build directory.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(self.kind.output_subdir()).join(self.kind.output_filename(&self.output_name))
    }
}

//! External framework bootstrap.
//!
//! Each dependency is fetched, configured and built while the outer build
//! directory is being configured, before any target is declared. The
//! libraries it exposes are then registered as [`ImportedTarget`]s that the
//! target graph links against by name.
//!
//! Staging layout under the build directory:
//!
//! ```text
//! _deps/<name>-src     fetched source
//! _deps/<name>-stage   generated wrapper descriptor
//! _deps/<name>-build   nested build tree
//! _deps/<name>-stamp   fetch / configure stamps
//! ```
//!
//! Rerunning against a completed staging directory skips the fetch and the
//! nested configure; the nested build step always runs and is a no-op when
//! nothing changed. Any failure is fatal.

pub mod cmake;
pub mod fetch;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::error::ConfigureError;
use crate::core::project::{DependencySpec, ExposedTarget};
use crate::util::fs::{read_to_string, write_string};

pub use cmake::NestedBuild;
pub use fetch::{GitReference, Retrieval};

/// Directory holding all staging areas, relative to the build directory.
pub const DEPS_DIR: &str = "_deps";

/// Per-dependency staging directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingLayout {
    pub src: PathBuf,
    pub stage: PathBuf,
    pub build: PathBuf,
    pub stamp: PathBuf,
}

impl StagingLayout {
    pub fn new(build_dir: &Path, name: &str) -> Self {
        let deps = build_dir.join(DEPS_DIR);
        StagingLayout {
            src: deps.join(format!("{}-src", name)),
            stage: deps.join(format!("{}-stage", name)),
            build: deps.join(format!("{}-build", name)),
            stamp: deps.join(format!("{}-stamp", name)),
        }
    }

    pub fn read_stamp(&self, step: &str) -> Option<String> {
        let path = self.stamp.join(step);
        if !path.is_file() {
            return None;
        }
        read_to_string(&path).ok().map(|s| s.trim().to_string())
    }

    pub fn write_stamp(&self, step: &str, fingerprint: &str) -> Result<()> {
        write_string(&self.stamp.join(step), fingerprint)
    }
}

/// A framework declared under `[dependencies]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDependency {
    pub name: String,
    pub retrieval: Retrieval,
    pub cmake_args: Vec<String>,
    pub exposed: BTreeMap<String, ExposedTarget>,
}

impl ExternalDependency {
    pub fn from_spec(name: &str, spec: &DependencySpec, project_root: &Path) -> Result<Self> {
        Ok(ExternalDependency {
            name: name.to_string(),
            retrieval: Retrieval::from_spec(name, spec, project_root)?,
            cmake_args: spec.cmake_args.clone(),
            exposed: spec.targets.clone(),
        })
    }
}

/// A library produced by a nested build, linkable by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedTarget {
    pub name: String,

    /// Dependency that produced it
    pub dependency: String,

    pub library: PathBuf,

    pub include_dirs: Vec<PathBuf>,
}

/// Runs fetch + nested build for each dependency.
pub struct Bootstrapper {
    build_dir: PathBuf,
    cmake: PathBuf,
    cache_args: Vec<String>,
}

impl Bootstrapper {
    pub fn new(build_dir: impl Into<PathBuf>, cmake: impl Into<PathBuf>) -> Self {
        Bootstrapper {
            build_dir: build_dir.into(),
            cmake: cmake.into(),
            cache_args: Vec::new(),
        }
    }

    /// Cache arguments passed to every nested configure (e.g. the compiler).
    pub fn cache_arg(mut self, arg: impl Into<String>) -> Self {
        self.cache_args.push(arg.into());
        self
    }

    pub fn staging(&self, name: &str) -> StagingLayout {
        StagingLayout::new(&self.build_dir, name)
    }

    /// Fetch, configure and build one dependency.
    pub fn bootstrap(&self, dep: &ExternalDependency) -> Result<Vec<ImportedTarget>> {
        let layout = self.staging(&dep.name);

        self.fetch(dep, &layout)?;

        let mut args = self.cache_args.clone();
        args.extend(dep.cmake_args.iter().cloned());
        let nested = NestedBuild::new(&dep.name, &self.cmake, &layout).args(args);

        nested.materialize()?;
        if nested.is_configured() {
            tracing::debug!("{} already configured", dep.name);
        } else {
            nested.configure()?;
        }
        nested.build()?;

        let mut imported = Vec::new();
        for (name, exposed) in &dep.exposed {
            match locate_library(&layout.build, &exposed.library) {
                Some(library) => imported.push(ImportedTarget {
                    name: name.clone(),
                    dependency: dep.name.clone(),
                    library,
                    include_dirs: exposed.include.iter().map(|i| layout.src.join(i)).collect(),
                }),
                None => tracing::warn!(
                    "{} did not produce lib{}.a; `{}` will not be linkable",
                    dep.name,
                    exposed.library,
                    name
                ),
            }
        }

        Ok(imported)
    }

    fn fetch(&self, dep: &ExternalDependency, layout: &StagingLayout) -> Result<()> {
        let fingerprint = dep.retrieval.fingerprint();
        if layout.src.is_dir() && layout.read_stamp("fetch").as_deref() == Some(fingerprint.as_str())
        {
            tracing::debug!("{} already fetched", dep.name);
            return Ok(());
        }

        if dep.retrieval.is_remote() {
            tracing::info!("Fetching dependency {}", dep.name);
        } else {
            tracing::info!("Copying dependency {}", dep.name);
        }
        dep.retrieval
            .fetch(&layout.src)
            .map_err(|e| ConfigureError::FetchFailed {
                name: dep.name.clone(),
                message: format!("{:#}", e),
            })?;
        layout.write_stamp("fetch", &fingerprint)
    }

    /// Bootstrap every dependency in name order. The first failure aborts.
    pub fn bootstrap_all(
        &self,
        deps: &[ExternalDependency],
    ) -> Result<BTreeMap<String, ImportedTarget>> {
        let mut imports = BTreeMap::new();
        for dep in deps {
            for target in self.bootstrap(dep)? {
                if let Some(previous) = imports.get(&target.name) {
                    let previous: &ImportedTarget = previous;
                    tracing::warn!(
                        "`{}` is exposed by both {} and {}; using {}",
                        target.name,
                        previous.dependency,
                        target.dependency,
                        target.dependency
                    );
                }
                imports.insert(target.name.clone(), target);
            }
        }
        Ok(imports)
    }
}

/// Find `lib<name>.a` (or a shared variant) anywhere under a build tree.
fn locate_library(build: &Path, library: &str) -> Option<PathBuf> {
    let candidates = [
        format!("lib{}.a", library),
        format!("lib{}.so", library),
        format!("lib{}.dylib", library),
    ];

    for candidate in &candidates {
        let found = WalkDir::new(build)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().is_file() && e.file_name().to_str() == Some(candidate));
        if let Some(entry) = found {
            return Some(entry.into_path());
        }
    }
    None
}

//! Build plan generation.
//!
//! A BuildPlan lowers the target graph into compile, archive and link steps
//! in dependency order. Library sources are compiled by the object set only;
//! the static and shared libraries reference those objects instead of
//! compiling them again.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::graph::TargetGraph;
use crate::builder::toolchain::Toolchain;
use crate::core::target::{Target, TargetKind};
use crate::util::fs::relative_path;

/// A complete build plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildPlan {
    /// All build steps in execution order
    pub steps: Vec<BuildStep>,
}

/// A build step in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildStep {
    /// Compile a source file to an object file
    Compile(CompileStep),
    /// Create a static library from object files
    Archive(ArchiveStep),
    /// Link objects into a shared library or executable
    Link(LinkStep),
}

impl BuildStep {
    /// Target this step belongs to.
    pub fn target(&self) -> &str {
        match self {
            BuildStep::Compile(s) => &s.target,
            BuildStep::Archive(s) => &s.target,
            BuildStep::Link(s) => &s.target,
        }
    }
}

/// A single compilation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStep {
    /// Target name
    pub target: String,

    pub source: PathBuf,

    /// Output object file
    pub output: PathBuf,

    /// Make-style dependency file written next to the object
    pub depfile: PathBuf,

    pub include_dirs: Vec<PathBuf>,

    /// Preprocessor defines (without `-D`)
    pub defines: Vec<String>,

    pub flags: Vec<String>,
}

/// A step to create a static library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStep {
    pub target: String,

    /// Object files to archive
    pub objects: Vec<PathBuf>,

    pub output: PathBuf,
}

/// A single link step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStep {
    pub target: String,

    pub kind: TargetKind,

    pub objects: Vec<PathBuf>,

    /// Archives and imported libraries, most dependent first
    pub libraries: Vec<PathBuf>,

    /// System libraries (without `-l`)
    pub system_libs: Vec<String>,

    pub flags: Vec<String>,

    pub output: PathBuf,
}

/// An entry of `compile_commands.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub file: PathBuf,
    pub arguments: Vec<String>,
    pub output: PathBuf,
}

impl BuildPlan {
    /// Lower a validated graph into steps rooted at `build_dir`.
    pub fn lower(graph: &TargetGraph, source_root: &Path, build_dir: &Path) -> Self {
        let mut steps = Vec::new();
        let mut objects: BTreeMap<&str, Vec<PathBuf>> = BTreeMap::new();

        for target in graph.topological_order() {
            if target.kind.compiles_sources() {
                let compiled = compile_steps(graph, target, source_root, build_dir);
                objects.insert(
                    target.name.as_str(),
                    compiled.iter().map(|s| s.output.clone()).collect(),
                );
                steps.extend(compiled.into_iter().map(BuildStep::Compile));
            }

            let output = build_dir.join(target.output_path());
            let shared_objects = target
                .objects_from
                .as_deref()
                .and_then(|o| objects.get(o))
                .cloned()
                .unwrap_or_default();

            match target.kind {
                TargetKind::ObjectSet => {}
                TargetKind::StaticLibrary => steps.push(BuildStep::Archive(ArchiveStep {
                    target: target.name.clone(),
                    objects: shared_objects,
                    output,
                })),
                TargetKind::SharedLibrary => steps.push(BuildStep::Link(LinkStep {
                    target: target.name.clone(),
                    kind: target.kind,
                    objects: shared_objects,
                    libraries: Vec::new(),
                    system_libs: graph.system_libs(&target.name),
                    flags: graph.link_flags(&target.name),
                    output,
                })),
                TargetKind::Executable | TargetKind::TestBinary | TargetKind::BenchmarkBinary => {
                    let own = objects.get(target.name.as_str()).cloned().unwrap_or_default();
                    steps.push(BuildStep::Link(LinkStep {
                        target: target.name.clone(),
                        kind: target.kind,
                        objects: own,
                        libraries: link_libraries(graph, target, build_dir),
                        system_libs: graph.system_libs(&target.name),
                        flags: graph.link_flags(&target.name),
                        output,
                    }));
                }
            }
        }

        BuildPlan { steps }
    }

    /// Keep only the steps of `targets`.
    pub fn retain_targets(&mut self, targets: &BTreeSet<String>) {
        self.steps.retain(|s| targets.contains(s.target()));
    }

    pub fn compile_steps(&self) -> impl Iterator<Item = &CompileStep> {
        self.steps.iter().filter_map(|s| match s {
            BuildStep::Compile(c) => Some(c),
            _ => None,
        })
    }

    pub fn compile_count(&self) -> usize {
        self.compile_steps().count()
    }

    /// Archive and link steps.
    pub fn link_count(&self) -> usize {
        self.steps.len() - self.compile_count()
    }

    /// Entries for the compilation database.
    pub fn compile_commands(&self, toolchain: &Toolchain, build_dir: &Path) -> Vec<CompileCommand> {
        self.compile_steps()
            .map(|step| {
                let spec = toolchain.compile_command(step);
                let mut arguments = vec![spec.program.display().to_string()];
                arguments.extend(spec.args);
                CompileCommand {
                    directory: build_dir.to_path_buf(),
                    file: step.source.clone(),
                    arguments,
                    output: step.output.clone(),
                }
            })
            .collect()
    }
}

fn compile_steps(
    graph: &TargetGraph,
    target: &Target,
    source_root: &Path,
    build_dir: &Path,
) -> Vec<CompileStep> {
    let flags = graph.compile_flags(&target.name);
    let defines = graph.defines(&target.name);
    let include_dirs = graph.include_dirs(&target.name);
    let object_dir = build_dir
        .join(TargetKind::ObjectSet.output_subdir())
        .join(&target.name);

    target
        .sources
        .iter()
        .map(|source| {
            let rel = relative_path(source_root, source);
            let stem = object_dir.join(rel);
            CompileStep {
                target: target.name.clone(),
                source: source.clone(),
                output: with_suffix(&stem, "o"),
                depfile: with_suffix(&stem, "d"),
                include_dirs: include_dirs.clone(),
                defines: defines.clone(),
                flags: flags.clone(),
            }
        })
        .collect()
}

/// `src/a.cpp` -> `src/a.cpp.o`, so `a.cpp` and `a.cc` never collide.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(suffix);
    PathBuf::from(s)
}

/// In-project archives followed by imported libraries.
fn link_libraries(graph: &TargetGraph, target: &Target, build_dir: &Path) -> Vec<PathBuf> {
    let mut libs: Vec<PathBuf> = graph
        .transitive_dependencies(&target.name)
        .into_iter()
        .filter(|t| t.kind == TargetKind::StaticLibrary)
        .map(|t| build_dir.join(t.output_path()))
        .collect();
    libs.extend(
        graph
            .import_targets(&target.name)
            .into_iter()
            .map(|i| i.library.clone()),
    );
    libs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::graph::GraphBuilder;
    use crate::core::profile::BuildProfile;
    use crate::core::source_set::SourceSets;
    use crate::test_support::{imports_for, sample_project};
    use tempfile::TempDir;

    fn plan() -> (TempDir, BuildPlan) {
        let tmp = TempDir::new().unwrap();
        let project = sample_project(tmp.path());
        let sources = SourceSets::discover(&project).unwrap();
        let config = BuildProfile::Debug.configuration();
        let imports = imports_for(tmp.path());
        let graph = GraphBuilder::new(&project, &config, &sources, &imports)
            .build()
            .unwrap();
        let plan = BuildPlan::lower(&graph, tmp.path(), &tmp.path().join("build"));
        (tmp, plan)
    }

    #[test]
    fn test_library_sources_compile_once() {
        let (_tmp, plan) = plan();
        let util: Vec<_> = plan
            .compile_steps()
            .filter(|s| s.source.ends_with("src/common/util.cpp"))
            .collect();
        assert_eq!(util.len(), 1);
        assert_eq!(util[0].target, "biscuit_objects");
    }

    #[test]
    fn test_libraries_reuse_object_set_outputs() {
        let (tmp, plan) = plan();
        let object = tmp
            .path()
            .join("build/obj/biscuit_objects/src/common/util.cpp.o");

        let archive = plan
            .steps
            .iter()
            .find_map(|s| match s {
                BuildStep::Archive(a) => Some(a),
                _ => None,
            })
            .unwrap();
        assert_eq!(archive.objects, vec![object.clone()]);
        assert_eq!(archive.output, tmp.path().join("build/lib/libbiscuit.a"));

        let shared = plan
            .steps
            .iter()
            .find_map(|s| match s {
                BuildStep::Link(l) if l.kind == TargetKind::SharedLibrary => Some(l),
                _ => None,
            })
            .unwrap();
        assert_eq!(shared.objects, vec![object]);
    }

    #[test]
    fn test_binaries_land_in_bin() {
        let (tmp, plan) = plan();
        let outputs: Vec<_> = plan
            .steps
            .iter()
            .filter_map(|s| match s {
                BuildStep::Link(l) if l.kind.is_executable() => Some(l.output.clone()),
                _ => None,
            })
            .collect();
        let bin = tmp.path().join("build/bin");
        assert_eq!(
            outputs,
            vec![bin.join("biscuit"), bin.join("biscuit_test"), bin.join("biscuit_benchmark")]
        );
    }

    #[test]
    fn test_test_binary_links_archive_then_framework() {
        let (tmp, plan) = plan();
        let link = plan
            .steps
            .iter()
            .find_map(|s| match s {
                BuildStep::Link(l) if l.target == "biscuit_test" => Some(l),
                _ => None,
            })
            .unwrap();
        assert_eq!(link.libraries[0], tmp.path().join("build/lib/libbiscuit.a"));
        assert!(link.libraries[1].ends_with("libgtest.a"));
        assert!(link.system_libs.contains(&"pthread".to_string()));
    }

    #[test]
    fn test_retain_targets() {
        let (_tmp, mut plan) = plan();
        let keep: BTreeSet<String> = ["biscuit_objects", "biscuit_static"]
            .into_iter()
            .map(String::from)
            .collect();
        plan.retain_targets(&keep);
        assert_eq!(plan.link_count(), 1);
        assert!(plan.compile_steps().all(|s| s.target == "biscuit_objects"));
    }
}

//! Target graph construction.
//!
//! The graph is declared in a fixed order: the object set first, then the
//! libraries archived from it, then the binaries linking the static
//! library. Every target receives the same immutable [`BuildConfiguration`];
//! nothing is applied retroactively.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::bootstrap::ImportedTarget;
use crate::core::error::ConfigureError;
use crate::core::profile::{BuildConfiguration, COVERAGE_FLAG};
use crate::core::project::Project;
use crate::core::source_set::{SourceRole, SourceSets};
use crate::core::target::{Target, TargetKind, TargetOptions};

/// Warning flags every in-project translation unit is compiled with.
const STRICT_WARNINGS: [&str; 2] = ["-Wall", "-Werror"];

/// Symbol visibility flags of the static library.
const HIDDEN_VISIBILITY_COMPILE: [&str; 2] = ["-fvisibility=hidden", "-fvisibility-inlines-hidden"];
const HIDDEN_VISIBILITY_LINK: [&str; 1] = ["-fvisibility=hidden"];

/// The validated set of targets for one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGraph {
    /// Targets in declaration order
    targets: Vec<Target>,

    /// Name of the shared object set
    object_set: String,

    /// Imported framework targets available for linking
    imports: BTreeMap<String, ImportedTarget>,

    configuration: BuildConfiguration,

    cxx_standard: String,
}

impl TargetGraph {
    /// Validate and assemble a graph.
    ///
    /// Fails on unknown dependencies, unresolved imports, cycles, and any
    /// target that does not reach the object set.
    pub fn new(
        targets: Vec<Target>,
        object_set: impl Into<String>,
        imports: BTreeMap<String, ImportedTarget>,
        configuration: BuildConfiguration,
        cxx_standard: impl Into<String>,
    ) -> Result<Self, ConfigureError> {
        let graph = TargetGraph {
            targets,
            object_set: object_set.into(),
            imports,
            configuration,
            cxx_standard: cxx_standard.into(),
        };
        graph.validate()?;
        Ok(graph)
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn object_set(&self) -> &str {
        &self.object_set
    }

    pub fn imports(&self) -> &BTreeMap<String, ImportedTarget> {
        &self.imports
    }

    pub fn configuration(&self) -> &BuildConfiguration {
        &self.configuration
    }

    /// Dependency graph with an edge from each dependency to its dependent.
    fn petgraph(&self) -> (DiGraph<&str, ()>, HashMap<&str, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for target in &self.targets {
            nodes.insert(target.name.as_str(), graph.add_node(target.name.as_str()));
        }
        for target in &self.targets {
            for dep in &target.dependencies {
                let from = nodes.get(dep.as_str());
                let to = nodes.get(target.name.as_str());
                if let (Some(&from), Some(&to)) = (from, to) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        (graph, nodes)
    }

    fn validate(&self) -> Result<(), ConfigureError> {
        for target in &self.targets {
            for dep in &target.dependencies {
                if self.get(dep).is_none() {
                    return Err(ConfigureError::UnknownTarget {
                        target: target.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            for import in &target.imports {
                if !self.imports.contains_key(import) {
                    return Err(ConfigureError::MissingImport {
                        target: target.name.clone(),
                        import: import.clone(),
                    });
                }
            }
        }

        let (graph, nodes) = self.petgraph();
        toposort(&graph, None).map_err(|cycle| ConfigureError::CycleDetected {
            target: graph[cycle.node_id()].to_string(),
        })?;

        let Some(&anchor) = nodes.get(self.object_set.as_str()) else {
            return Err(ConfigureError::UnknownTarget {
                target: self.object_set.clone(),
                dependency: self.object_set.clone(),
            });
        };

        for target in &self.targets {
            if target.name == self.object_set {
                if let Some(dep) = target.dependencies.first() {
                    return Err(ConfigureError::CycleDetected {
                        target: dep.clone(),
                    });
                }
                continue;
            }
            let node = nodes[target.name.as_str()];
            if !has_path_connecting(&graph, anchor, node, None) {
                return Err(ConfigureError::Unanchored {
                    target: target.name.clone(),
                    object_set: self.object_set.clone(),
                });
            }
        }

        Ok(())
    }

    /// Targets with dependencies before dependents, otherwise in
    /// declaration order.
    pub fn topological_order(&self) -> Vec<&Target> {
        let mut emitted: BTreeSet<&str> = BTreeSet::new();
        let mut order = Vec::with_capacity(self.targets.len());

        while order.len() < self.targets.len() {
            let ready = self.targets.iter().find(|t| {
                !emitted.contains(t.name.as_str())
                    && t.dependencies.iter().all(|d| emitted.contains(d.as_str()))
            });
            match ready {
                Some(target) => {
                    emitted.insert(target.name.as_str());
                    order.push(target);
                }
                // Unreachable for a validated graph
                None => break,
            }
        }
        order
    }

    /// All targets `name` depends on, nearest first, each listed once.
    pub fn transitive_dependencies(&self, name: &str) -> Vec<&Target> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue: Vec<&str> = match self.get(name) {
            Some(t) => t.dependencies.iter().map(String::as_str).collect(),
            None => return order,
        };

        while !queue.is_empty() {
            let mut next = Vec::new();
            for dep in queue {
                if !seen.insert(dep) {
                    continue;
                }
                if let Some(target) = self.get(dep) {
                    order.push(target);
                    next.extend(target.dependencies.iter().map(String::as_str));
                }
            }
            queue = next;
        }
        order
    }

    /// The named targets plus everything they depend on.
    pub fn closure<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<BTreeSet<String>, ConfigureError> {
        let mut set = BTreeSet::new();
        for name in names {
            if self.get(name).is_none() {
                return Err(ConfigureError::UnknownTarget {
                    target: name.to_string(),
                    dependency: name.to_string(),
                });
            }
            set.insert(name.to_string());
            set.extend(self.transitive_dependencies(name).into_iter().map(|t| t.name.clone()));
        }
        Ok(set)
    }

    /// Archives that consume the objects of `object_set`.
    fn consumers_of<'a>(&'a self, object_set: &'a str) -> impl Iterator<Item = &'a Target> + 'a {
        self.targets
            .iter()
            .filter(move |t| t.objects_from.as_deref() == Some(object_set))
    }

    /// Compile flags for the sources of `name`.
    ///
    /// Standard, profile flags, the target's own options, then the public
    /// options of everything it depends on. An object set also picks up the
    /// private compile options of the archives built from its objects, since
    /// those objects are compiled only once.
    ///
    /// The shared library links the same objects, so the static library's
    /// `-fvisibility=hidden` applies to it too: `lib<name>.so` exports only
    /// symbols the sources mark with default visibility.
    pub fn compile_flags(&self, name: &str) -> Vec<String> {
        let Some(target) = self.get(name) else {
            return Vec::new();
        };

        let mut flags = vec![format!("-std={}", self.cxx_standard)];
        flags.extend(self.configuration.compile_flags.iter().cloned());
        flags.extend(target.options.private_compile.iter().cloned());
        flags.extend(target.options.public_compile.iter().cloned());
        if target.kind == TargetKind::ObjectSet {
            for consumer in self.consumers_of(name) {
                flags.extend(consumer.options.private_compile.iter().cloned());
            }
        }
        for dep in self.transitive_dependencies(name) {
            flags.extend(dep.options.public_compile.iter().cloned());
        }
        dedup(flags)
    }

    pub fn defines(&self, _name: &str) -> Vec<String> {
        self.configuration.defines.clone()
    }

    /// Include directories: own public dirs, those of dependencies, then
    /// those of imported frameworks.
    pub fn include_dirs(&self, name: &str) -> Vec<PathBuf> {
        let Some(target) = self.get(name) else {
            return Vec::new();
        };

        let mut dirs = target.options.public_include_dirs.clone();
        for dep in self.transitive_dependencies(name) {
            dirs.extend(dep.options.public_include_dirs.iter().cloned());
        }
        for import in self.import_targets(name) {
            dirs.extend(import.include_dirs.iter().cloned());
        }
        dedup(dirs)
    }

    /// Link flags: profile flags, own options, then dependencies' public ones.
    pub fn link_flags(&self, name: &str) -> Vec<String> {
        let Some(target) = self.get(name) else {
            return Vec::new();
        };

        let mut flags = self.configuration.link_flags.clone();
        flags.extend(target.options.private_link.iter().cloned());
        flags.extend(target.options.public_link.iter().cloned());
        for dep in self.transitive_dependencies(name) {
            flags.extend(dep.options.public_link.iter().cloned());
        }
        dedup(flags)
    }

    /// Imported targets linked by `name` or any of its dependencies.
    pub fn import_targets(&self, name: &str) -> Vec<&ImportedTarget> {
        let mut names: Vec<&str> = Vec::new();
        if let Some(target) = self.get(name) {
            names.extend(target.imports.iter().map(String::as_str));
        }
        for dep in self.transitive_dependencies(name) {
            names.extend(dep.imports.iter().map(String::as_str));
        }
        dedup(names)
            .into_iter()
            .filter_map(|n| self.imports.get(n))
            .collect()
    }

    /// System libraries for `name` and its dependencies.
    pub fn system_libs(&self, name: &str) -> Vec<String> {
        let mut libs = Vec::new();
        if let Some(target) = self.get(name) {
            libs.extend(target.system_libs.iter().cloned());
        }
        for dep in self.transitive_dependencies(name) {
            libs.extend(dep.system_libs.iter().cloned());
        }
        dedup(libs)
    }
}

fn dedup<T: Clone + Ord>(items: Vec<T>) -> Vec<T> {
    let mut seen = BTreeSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

/// Declares the project's targets from discovered sources.
pub struct GraphBuilder<'a> {
    project: &'a Project,
    configuration: &'a BuildConfiguration,
    sources: &'a SourceSets,
    imports: &'a BTreeMap<String, ImportedTarget>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        project: &'a Project,
        configuration: &'a BuildConfiguration,
        sources: &'a SourceSets,
        imports: &'a BTreeMap<String, ImportedTarget>,
    ) -> Self {
        GraphBuilder {
            project,
            configuration,
            sources,
            imports,
        }
    }

    pub fn object_set_name(&self) -> String {
        format!("{}_objects", self.project.name())
    }

    pub fn build(&self) -> Result<TargetGraph, ConfigureError> {
        let name = self.project.name();
        let options = &self.project.descriptor().options;
        let objects = self.object_set_name();
        let static_lib = format!("{}_static", name);

        let mut targets = Vec::new();

        targets.push(
            Target::new(&objects, TargetKind::ObjectSet)
                .with_sources(SourceRole::Library, self.sources.get(SourceRole::Library).files)
                .with_options(
                    TargetOptions::default()
                        .private_compile(STRICT_WARNINGS)
                        .private_compile(["-fPIC"])
                        .public_compile(options.arch.iter().cloned())
                        .public_compile(options.wide_cas.iter().cloned())
                        .public_include(self.project.include_dir()),
                ),
        );

        targets.push(
            Target::new(&static_lib, TargetKind::StaticLibrary)
                .with_output_name(name)
                .archive_of(&objects)
                .with_options(
                    TargetOptions::default()
                        .private_compile(HIDDEN_VISIBILITY_COMPILE)
                        .private_link(HIDDEN_VISIBILITY_LINK),
                ),
        );

        targets.push(
            Target::new(format!("{}_shared", name), TargetKind::SharedLibrary)
                .with_output_name(name)
                .archive_of(&objects)
                .system_libs(options.system_libs.iter().cloned()),
        );

        let entry_point = self.project.entry_point();
        if entry_point.is_file() {
            targets.push(
                Target::new(name, TargetKind::Executable)
                    .with_sources(SourceRole::EntryPoint, [entry_point])
                    .depends_on(&static_lib)
                    .system_libs(options.system_libs.iter().cloned())
                    .with_options(TargetOptions::default().private_compile(STRICT_WARNINGS)),
            );
        } else {
            tracing::warn!(
                "entry point {} not found; the `{}` executable is not declared",
                entry_point.display(),
                name
            );
        }

        let harnesses = [
            (
                format!("{}_test", name),
                TargetKind::TestBinary,
                SourceRole::Test,
                &self.project.descriptor().test.links,
            ),
            (
                format!("{}_benchmark", name),
                TargetKind::BenchmarkBinary,
                SourceRole::Benchmark,
                &self.project.descriptor().benchmark.links,
            ),
        ];

        for (target_name, kind, role, links) in harnesses {
            for import in links.iter() {
                if !self.imports.contains_key(import) {
                    return Err(ConfigureError::MissingImport {
                        target: target_name,
                        import: import.clone(),
                    });
                }
            }

            targets.push(
                Target::new(target_name, kind)
                    .with_sources(role, self.sources.get(role).files)
                    .depends_on(&static_lib)
                    .imports(links.iter().cloned())
                    .system_libs(options.system_libs.iter().cloned())
                    .with_options(TargetOptions::default().private_link([COVERAGE_FLAG])),
            );
        }

        for target in &targets {
            tracing::debug!(
                "declared {} `{}` ({} source(s))",
                target.kind,
                target.name,
                target.sources.len()
            );
        }

        TargetGraph::new(
            targets,
            objects,
            self.imports.clone(),
            self.configuration.clone(),
            &self.project.descriptor().project.cxx_standard,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::BuildProfile;
    use crate::test_support::{imports_for, sample_project};
    use tempfile::TempDir;

    fn graph_for(profile: BuildProfile) -> (TempDir, TargetGraph) {
        let tmp = TempDir::new().unwrap();
        let project = sample_project(tmp.path());
        let sources = SourceSets::discover(&project).unwrap();
        let config = profile.configuration();
        let imports = imports_for(tmp.path());
        let graph = GraphBuilder::new(&project, &config, &sources, &imports)
            .build()
            .unwrap();
        (tmp, graph)
    }

    #[test]
    fn test_declares_all_targets() {
        let (_tmp, graph) = graph_for(BuildProfile::Debug);
        let names: Vec<_> = graph.targets().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "biscuit_objects",
                "biscuit_static",
                "biscuit_shared",
                "biscuit",
                "biscuit_test",
                "biscuit_benchmark"
            ]
        );
    }

    #[test]
    fn test_every_target_reaches_object_set() {
        let (_tmp, graph) = graph_for(BuildProfile::Debug);
        let objects = graph.get("biscuit_objects").unwrap();
        assert!(objects.dependencies.is_empty());

        for target in graph.targets() {
            if target.name == "biscuit_objects" {
                continue;
            }
            let deps: Vec<_> = graph
                .transitive_dependencies(&target.name)
                .into_iter()
                .map(|t| t.name.as_str())
                .collect();
            assert!(deps.contains(&"biscuit_objects"), "{} is unanchored", target.name);
        }

        let order = graph.topological_order();
        assert_eq!(order[0].name, "biscuit_objects");
    }

    #[test]
    fn test_only_object_set_and_binaries_compile() {
        let (_tmp, graph) = graph_for(BuildProfile::Debug);
        let lib = graph.get("biscuit_static").unwrap();
        assert!(lib.sources.is_empty());
        assert_eq!(lib.objects_from.as_deref(), Some("biscuit_objects"));

        let exe = graph.get("biscuit").unwrap();
        assert_eq!(exe.sources.len(), 1);
        assert!(exe.sources[0].ends_with("src/main.cpp"));
        assert_eq!(exe.source_role, Some(SourceRole::EntryPoint));

        let objects = graph.get("biscuit_objects").unwrap();
        assert!(!objects.sources.iter().any(|s| s.ends_with("main.cpp")));
    }

    #[test]
    fn test_public_options_are_inherited() {
        let (_tmp, graph) = graph_for(BuildProfile::Debug);

        let exe_flags = graph.compile_flags("biscuit");
        assert!(exe_flags.contains(&"-march=native".to_string()));
        assert!(exe_flags.contains(&"-mcx16".to_string()));
        assert!(exe_flags.contains(&"-Werror".to_string()));
        assert!(!exe_flags.contains(&"-fPIC".to_string()));

        let test_flags = graph.compile_flags("biscuit_test");
        assert!(test_flags.contains(&"-mcx16".to_string()));
        assert!(!test_flags.contains(&"-Werror".to_string()));

        let objects_flags = graph.compile_flags("biscuit_objects");
        assert!(objects_flags.contains(&"-fvisibility=hidden".to_string()));
        assert_eq!(objects_flags[0], "-std=c++17");
    }

    #[test]
    fn test_harnesses_link_coverage_in_release() {
        let (_tmp, graph) = graph_for(BuildProfile::Release);
        assert!(!graph.configuration().link_flags.contains(&COVERAGE_FLAG.to_string()));
        assert!(graph.link_flags("biscuit_test").contains(&COVERAGE_FLAG.to_string()));
        assert!(graph.link_flags("biscuit_benchmark").contains(&COVERAGE_FLAG.to_string()));
        assert!(!graph.link_flags("biscuit").contains(&COVERAGE_FLAG.to_string()));
        assert_eq!(graph.defines("biscuit"), vec!["NDEBUG".to_string()]);
    }

    #[test]
    fn test_harness_includes_framework_headers() {
        let (tmp, graph) = graph_for(BuildProfile::Debug);
        let dirs = graph.include_dirs("biscuit_test");
        assert!(dirs.contains(&tmp.path().join("src/include")));
        assert!(dirs.iter().any(|d| d.ends_with("googletest/include")));

        let imports: Vec<_> = graph
            .import_targets("biscuit_benchmark")
            .into_iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(imports, vec!["benchmark", "benchmark_main"]);
    }

    #[test]
    fn test_missing_import_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let project = sample_project(tmp.path());
        let sources = SourceSets::discover(&project).unwrap();
        let config = BuildProfile::Debug.configuration();
        let mut imports = imports_for(tmp.path());
        imports.remove("gtest_main");

        let err = GraphBuilder::new(&project, &config, &sources, &imports)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigureError::MissingImport { ref target, ref import }
                if target == "biscuit_test" && import == "gtest_main"
        ));
    }

    #[test]
    fn test_empty_library_still_builds_graph() {
        let tmp = TempDir::new().unwrap();
        let project = sample_project(tmp.path());
        std::fs::remove_file(tmp.path().join("src/common/util.cpp")).unwrap();
        let sources = SourceSets::discover(&project).unwrap();
        let config = BuildProfile::Debug.configuration();
        let imports = imports_for(tmp.path());

        let graph = GraphBuilder::new(&project, &config, &sources, &imports)
            .build()
            .unwrap();
        assert!(graph.get("biscuit_objects").unwrap().sources.is_empty());
        assert!(graph.get("biscuit_static").is_some());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let config = BuildProfile::Debug.configuration();
        let targets = vec![
            Target::new("objs", TargetKind::ObjectSet),
            Target::new("a", TargetKind::StaticLibrary)
                .archive_of("objs")
                .depends_on("b"),
            Target::new("b", TargetKind::Executable).depends_on("a"),
        ];
        let err = TargetGraph::new(targets, "objs", BTreeMap::new(), config, "c++17").unwrap_err();
        assert!(matches!(err, ConfigureError::CycleDetected { .. }));
    }

    #[test]
    fn test_unanchored_target_is_rejected() {
        let config = BuildProfile::Debug.configuration();
        let targets = vec![
            Target::new("objs", TargetKind::ObjectSet),
            Target::new("tool", TargetKind::Executable),
        ];
        let err = TargetGraph::new(targets, "objs", BTreeMap::new(), config, "c++17").unwrap_err();
        assert!(matches!(err, ConfigureError::Unanchored { ref target, .. } if target == "tool"));
    }
}

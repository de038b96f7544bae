//! Implementation of `biscuit-build configure`.
//!
//! Configuration runs strictly in order: safety checks, profile, toolchain,
//! discovery, framework bootstrap, target graph, tool location, task
//! registration. Any fatal step aborts before the cache is written, so a
//! failed configure leaves the build directory unconfigured rather than
//! half-configured.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::bootstrap::{Bootstrapper, ExternalDependency};
use crate::builder::{detect_cmake, BuildPlan, GraphBuilder, TargetGraph, Toolchain};
use crate::core::error::ConfigureError;
use crate::core::profile::BuildConfiguration;
use crate::core::project::{Project, DESCRIPTOR_NAME};
use crate::core::source_set::SourceSets;
use crate::util::config::{load_for_source, Config};
use crate::util::fs::{ensure_dir, normalize_path, read_to_string, write_string};
use crate::util::hash::sha256_hex;
use crate::verify::{TaskRegistry, ToolLocator, ToolSet};

/// Configure cache inside the build directory.
pub const CACHE_FILE: &str = "BiscuitCache.json";

/// Compilation database inside the build directory.
pub const COMPILE_COMMANDS: &str = "compile_commands.json";

/// Bumped when the cache layout changes.
const CACHE_VERSION: u32 = 1;

/// Options for the configure command.
#[derive(Debug, Clone, Default)]
pub struct ConfigureOptions {
    /// Project root holding `Biscuit.toml`
    pub source_dir: PathBuf,

    pub build_dir: PathBuf,

    /// Requested profile; falls back to `build.profile` in config, then debug
    pub profile: Option<String>,

    /// Use this instead of the layered config files
    pub config: Option<Config>,
}

/// Everything a configure run decided, persisted as `BiscuitCache.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredState {
    pub version: u32,

    pub project_name: String,

    pub source_root: PathBuf,

    pub build_dir: PathBuf,

    /// SHA-256 of `Biscuit.toml` at configure time
    pub descriptor_digest: String,

    pub toolchain: Toolchain,

    /// Default parallelism from config
    pub jobs: Option<usize>,

    pub sources: SourceSets,

    pub graph: TargetGraph,

    pub tools: ToolSet,

    pub tasks: TaskRegistry,

    /// Config used, so regeneration reproduces it
    #[serde(skip)]
    config: Option<Config>,
}

impl ConfiguredState {
    pub fn configuration(&self) -> &BuildConfiguration {
        self.graph.configuration()
    }

    pub fn cache_path(&self) -> PathBuf {
        self.build_dir.join(CACHE_FILE)
    }

    /// Lower the graph into a build plan for this build directory.
    pub fn plan(&self) -> BuildPlan {
        BuildPlan::lower(&self.graph, &self.source_root, &self.build_dir)
    }
}

/// Configure a build directory.
pub fn configure(opts: &ConfigureOptions) -> Result<ConfiguredState> {
    let source_root = normalize_path(&opts.source_dir);
    let build_dir = normalize_path(&absolute(&opts.build_dir)?);

    check_build_dir(&source_root, &build_dir)?;

    let project = Project::load(&source_root)?;
    let descriptor_digest = descriptor_digest(&source_root)?;

    let config = match &opts.config {
        Some(config) => config.clone(),
        None => load_for_source(&source_root),
    };

    let requested = opts.profile.as_deref().or(config.build.profile.as_deref());
    let configuration = BuildConfiguration::resolve(requested)?;
    tracing::info!("Configuring {} ({})", project.name(), configuration.profile);

    let toolchain = Toolchain::detect(&config.toolchain)?;

    ensure_dir(&build_dir)?;
    discard_cache(&build_dir)?;

    let sources = SourceSets::discover(&project)?;

    let dependencies = project
        .descriptor()
        .dependencies
        .iter()
        .map(|(name, spec)| ExternalDependency::from_spec(name, spec, &source_root))
        .collect::<Result<Vec<_>>>()?;

    let imports = if dependencies.is_empty() {
        Default::default()
    } else {
        let cmake = detect_cmake(&config.toolchain)?;
        Bootstrapper::new(&build_dir, cmake)
            .cache_arg(format!("-DCMAKE_CXX_COMPILER={}", toolchain.cxx.display()))
            .bootstrap_all(&dependencies)?
    };

    let graph = GraphBuilder::new(&project, &configuration, &sources, &imports).build()?;

    let locator = ToolLocator::new(&config.tools).build_support(project.build_support_dir());
    let tools = ToolSet::locate_all(&locator);
    let framework_includes = graph
        .imports()
        .values()
        .flat_map(|i| i.include_dirs.iter().cloned())
        .collect();
    let tasks = TaskRegistry::register(&project, &tools, &build_dir, framework_includes);

    let state = ConfiguredState {
        version: CACHE_VERSION,
        project_name: project.name().to_string(),
        source_root,
        build_dir,
        descriptor_digest,
        toolchain,
        jobs: config.build.jobs,
        sources,
        graph,
        tools,
        tasks,
        config: opts.config.clone(),
    };

    write_compile_commands(&state)?;
    save_cache(&state)?;

    tracing::info!(
        "Configured {} target(s) and {} task(s) in {}",
        state.graph.targets().len(),
        state.tasks.names().len(),
        state.build_dir.display()
    );
    Ok(state)
}

/// Refuse in-source configuration and build directories of other projects.
pub fn check_build_dir(source_root: &Path, build_dir: &Path) -> Result<(), ConfigureError> {
    let build = normalize_path(build_dir);
    if build == source_root || build.join(DESCRIPTOR_NAME).is_file() {
        return Err(ConfigureError::InSourceBuild {
            dir: build,
            descriptor: DESCRIPTOR_NAME.to_string(),
        });
    }

    let cache = build.join(CACHE_FILE);
    if let Ok(state) = read_cache(&cache) {
        if normalize_path(&state.source_root) != source_root {
            return Err(ConfigureError::ForeignBuildDir {
                build_dir: build,
                configured: state.source_root,
                requested: source_root.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    Ok(cwd.join(path))
}

fn descriptor_digest(source_root: &Path) -> Result<String> {
    Ok(sha256_hex(read_to_string(&source_root.join(DESCRIPTOR_NAME))?))
}

fn discard_cache(build_dir: &Path) -> Result<()> {
    let cache = build_dir.join(CACHE_FILE);
    if cache.exists() {
        std::fs::remove_file(&cache)
            .with_context(|| format!("failed to remove {}", cache.display()))?;
    }
    Ok(())
}

fn write_compile_commands(state: &ConfiguredState) -> Result<()> {
    let commands = state.plan().compile_commands(&state.toolchain, &state.build_dir);
    let json = serde_json::to_string_pretty(&commands)?;
    write_string(&state.build_dir.join(COMPILE_COMMANDS), &json)
}

/// Write the cache through a temporary file so readers never see half of it.
fn save_cache(state: &ConfiguredState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    let mut tmp = NamedTempFile::new_in(&state.build_dir)
        .with_context(|| format!("failed to create a temporary file in {}", state.build_dir.display()))?;
    tmp.write_all(json.as_bytes())?;
    tmp.persist(state.cache_path())
        .with_context(|| format!("failed to write {}", state.cache_path().display()))?;
    Ok(())
}

fn read_cache(path: &Path) -> Result<ConfiguredState> {
    let contents = read_to_string(path)?;
    let state: ConfiguredState = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if state.version != CACHE_VERSION {
        bail!(
            "{} was written by an incompatible version; re-run `biscuit-build configure`",
            path.display()
        );
    }
    Ok(state)
}

/// Load the state of a configured build directory.
pub fn load_configured(build_dir: &Path) -> Result<ConfiguredState> {
    let cache = absolute(build_dir)?.join(CACHE_FILE);
    if !cache.is_file() {
        bail!(
            "`{}` is not a configured build directory; run `biscuit-build configure` first",
            build_dir.display()
        );
    }
    read_cache(&cache)
}

/// Re-run discovery and reconfigure when the source set or the project
/// descriptor changed since the last configure.
pub fn regenerate_if_stale(state: ConfiguredState) -> Result<ConfiguredState> {
    let project = Project::load(&state.source_root)?;
    let current = SourceSets::discover(&project)?;
    let changed = current.changed_roles(&state.sources);
    let descriptor_changed = descriptor_digest(&state.source_root)? != state.descriptor_digest;

    if changed.is_empty() && !descriptor_changed {
        return Ok(state);
    }

    if descriptor_changed {
        tracing::info!("{} changed; regenerating", DESCRIPTOR_NAME);
    } else {
        let roles: Vec<_> = changed.iter().map(|r| r.to_string()).collect();
        tracing::info!("Sources changed ({}); regenerating", roles.join(", "));
    }

    configure(&ConfigureOptions {
        source_dir: state.source_root.clone(),
        build_dir: state.build_dir.clone(),
        profile: Some(state.configuration().profile.as_str().to_string()),
        config: state.config.clone(),
    })
}

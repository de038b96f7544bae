//! Fatal configuration errors.
//!
//! Every variant aborts configuration before a target graph is produced.
//! Messages name the offending input so the operator can fix it directly.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// A fatal error raised while configuring a build directory.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigureError {
    #[error("unknown build profile `{name}`")]
    #[diagnostic(
        code(biscuit::unknown_profile),
        help("valid profiles are: debug, fastdebug, release, relwithdebinfo")
    )]
    UnknownProfile { name: String },

    #[error("refusing to configure in `{}`: it holds the project's own {descriptor}", .dir.display())]
    #[diagnostic(
        code(biscuit::in_source_build),
        help("configure from a separate directory, e.g. `mkdir build && cd build && biscuit-build configure -S ..`")
    )]
    InSourceBuild { dir: PathBuf, descriptor: String },

    #[error(
        "build directory `{}` was configured for `{}`, not `{}`",
        .build_dir.display(),
        .configured.display(),
        .requested.display()
    )]
    #[diagnostic(
        code(biscuit::foreign_build_dir),
        help("use a fresh build directory or remove the existing one")
    )]
    ForeignBuildDir {
        build_dir: PathBuf,
        configured: PathBuf,
        requested: PathBuf,
    },

    #[error("no {descriptor} found in `{}`", .dir.display())]
    #[diagnostic(
        code(biscuit::missing_descriptor),
        help("pass the project root with `-S <dir>`")
    )]
    MissingDescriptor { dir: PathBuf, descriptor: String },

    #[error("fetch failed for dependency {name}: {message}")]
    #[diagnostic(code(biscuit::fetch_failed))]
    FetchFailed { name: String, message: String },

    #[error("configuration step failed for dependency {name}: {message}")]
    #[diagnostic(code(biscuit::dependency_configure_failed))]
    DependencyConfigureFailed { name: String, message: String },

    #[error("build step failed for dependency {name}: {message}")]
    #[diagnostic(code(biscuit::dependency_build_failed))]
    DependencyBuildFailed { name: String, message: String },

    #[error("target `{target}` links `{import}`, which no dependency provided")]
    #[diagnostic(
        code(biscuit::missing_import),
        help("check that a [dependencies] entry in Biscuit.toml exposes this target")
    )]
    MissingImport { target: String, import: String },

    #[error("target `{target}` depends on unknown target `{dependency}`")]
    #[diagnostic(code(biscuit::unknown_target))]
    UnknownTarget { target: String, dependency: String },

    #[error("target `{target}` does not depend on the object set `{object_set}`")]
    #[diagnostic(code(biscuit::unanchored_target))]
    Unanchored { target: String, object_set: String },

    #[error("dependency cycle in target graph involving `{target}`")]
    #[diagnostic(code(biscuit::cycle))]
    CycleDetected { target: String },

    #[error("{tool} not found")]
    #[diagnostic(
        code(biscuit::tool_missing),
        help("install it or set its path under [toolchain] in .biscuit/config.toml")
    )]
    ToolchainNotFound { tool: String },
}

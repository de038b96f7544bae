//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// biscuit-build - configure, build and verify a C++ database project
#[derive(Parser)]
#[command(name = "biscuit-build")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure a build directory for a project
    Configure(ConfigureArgs),

    /// Build configured targets
    Build(BuildArgs),

    /// Build and run the unit-test binary
    Test(TestArgs),

    /// Run a verification task (format, check-format, check-lint, check-clang-tidy)
    Task(TaskArgs),

    /// List registered verification tasks and missing tools
    Tasks(TasksArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildDirArg {
    /// Build directory
    #[arg(short = 'B', long = "build-dir", default_value = ".")]
    pub build_dir: PathBuf,
}

#[derive(Args)]
pub struct ConfigureArgs {
    /// Project root containing Biscuit.toml
    #[arg(short = 'S', long = "source-dir", default_value = ".")]
    pub source_dir: PathBuf,

    #[command(flatten)]
    pub build: BuildDirArg,

    /// Build profile: debug, fastdebug, release, relwithdebinfo
    #[arg(long, env = "BISCUIT_BUILD_TYPE")]
    pub profile: Option<String>,
}

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub build: BuildDirArg,

    /// Specific targets to build
    #[arg(long)]
    pub target: Vec<String>,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct TestArgs {
    #[command(flatten)]
    pub build: BuildDirArg,

    /// Number of parallel jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Arguments passed to the test binary
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[derive(Args)]
pub struct TaskArgs {
    /// Task name
    pub name: String,

    #[command(flatten)]
    pub build: BuildDirArg,
}

#[derive(Args)]
pub struct TasksArgs {
    #[command(flatten)]
    pub build: BuildDirArg,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

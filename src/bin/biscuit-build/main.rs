//! biscuit-build CLI - configure, build and verify a C++ project

use anyhow::Result;
use clap::Parser;
use miette::Diagnostic;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use biscuit_build::ConfigureError;
use cli::{Cli, Commands};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            if let Some(help) = e.downcast_ref::<ConfigureError>().and_then(|c| c.help()) {
                eprintln!("help: {}", help);
            }
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("biscuit_build=debug")
    } else {
        EnvFilter::new("biscuit_build=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Configure(args) => commands::configure::execute(args),
        Commands::Build(args) => commands::build::execute(args),
        Commands::Test(args) => commands::test::execute(args),
        Commands::Task(args) => commands::task::execute(args),
        Commands::Tasks(args) => commands::tasks::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

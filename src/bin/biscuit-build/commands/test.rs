//! `biscuit-build test` command

use std::io::IsTerminal;

use anyhow::Result;

use crate::cli::TestArgs;
use biscuit_build::ops::{run_tests, TestOptions};

pub fn execute(args: TestArgs) -> Result<i32> {
    let opts = TestOptions {
        build_dir: args.build.build_dir,
        jobs: args.jobs,
        args: args.args,
        progress: std::io::stderr().is_terminal(),
    };

    let status = run_tests(&opts)?;
    if !status.success() {
        eprintln!("    Tests failed ({})", status);
    }

    // Killed by a signal: no code to forward
    Ok(status.code().unwrap_or(1))
}

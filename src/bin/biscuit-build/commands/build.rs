//! `biscuit-build build` command

use std::io::IsTerminal;

use anyhow::Result;

use crate::cli::BuildArgs;
use biscuit_build::ops::{build, BuildOptions};

pub fn execute(args: BuildArgs) -> Result<i32> {
    let opts = BuildOptions {
        build_dir: args.build.build_dir,
        targets: args.target,
        jobs: args.jobs,
        progress: std::io::stderr().is_terminal(),
    };

    let (state, summary) = build(&opts)?;

    eprintln!(
        "    Finished `{}` ({}): {} compiled, {} fresh, {} linked",
        state.project_name,
        state.configuration().profile,
        summary.compiled,
        summary.fresh,
        summary.linked
    );

    Ok(0)
}

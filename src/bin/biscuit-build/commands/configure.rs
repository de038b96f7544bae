//! `biscuit-build configure` command

use anyhow::Result;

use crate::cli::ConfigureArgs;
use biscuit_build::ops::{configure, ConfigureOptions};

pub fn execute(args: ConfigureArgs) -> Result<i32> {
    let opts = ConfigureOptions {
        source_dir: args.source_dir,
        build_dir: args.build.build_dir,
        profile: args.profile,
        config: None,
    };

    let state = configure(&opts)?;

    eprintln!(
        "    Configured `{}` ({}) in {}",
        state.project_name,
        state.configuration().profile,
        state.build_dir.display()
    );
    for (name, tool) in state.tasks.missing() {
        eprintln!("    Skipped `{}` ({} not found)", name, tool);
    }

    Ok(0)
}

//! `biscuit-build tasks` command

use anyhow::Result;

use crate::cli::TasksArgs;
use biscuit_build::ops::list_tasks;

pub fn execute(args: TasksArgs) -> Result<i32> {
    let listing = list_tasks(&args.build.build_dir)?;

    if listing.registered.is_empty() {
        println!("No verification tasks are configured.");
    }
    for task in &listing.registered {
        println!("{:<18} {}", task.name, task.program.display());
    }

    if !listing.missing.is_empty() {
        println!();
        println!("Not configured:");
        for (name, tool) in &listing.missing {
            println!("{:<18} {} not found", name, tool);
        }
    }

    Ok(0)
}

//! `biscuit-build task` command

use anyhow::Result;

use crate::cli::TaskArgs;
use biscuit_build::ops::run_named_task;

pub fn execute(args: TaskArgs) -> Result<i32> {
    let report = run_named_task(&args.build.build_dir, &args.name)?;

    if report.passed() {
        eprintln!("    Finished `{}`: {} file(s) checked", report.task, report.files);
        return Ok(0);
    }

    for failure in &report.failures {
        eprintln!("{}", failure);
    }
    eprintln!(
        "    Failed `{}`: {} problem(s) in {} file(s)",
        report.task,
        report.failures.len(),
        report.files
    );
    Ok(1)
}

//! Running external tools: the compiler, cmake and verification tools.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};

use anyhow::{Context, Result};

/// A command line plus working directory, run either captured or attached.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(self, arg: impl AsRef<OsStr>) -> Self {
        self.args([arg])
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    /// Run to completion with stdout and stderr captured.
    pub fn exec(&self) -> Result<Output> {
        self.command()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))
    }

    /// Run attached to our stdio; the caller decides what the status means.
    pub fn status(&self) -> Result<ExitStatus> {
        self.command()
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))
    }

    /// Shell-like rendering for logs.
    pub fn display_command(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Exit status plus the last `tail_lines` lines of stderr.
pub fn describe_failure(output: &Output, tail_lines: usize) -> String {
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());

    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    let tail = lines[lines.len().saturating_sub(tail_lines)..].join("\n");

    if tail.is_empty() {
        format!("exit status {}", code)
    } else {
        format!("exit status {}\n{}", code, tail)
    }
}

/// Look a program name up on PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Resolve a program from an environment variable, then a list of candidates.
fn find_with_env(var: &str, candidates: &[&str]) -> Option<PathBuf> {
    if let Ok(value) = std::env::var(var) {
        if let Some(path) = find_executable(&value) {
            return Some(path);
        }
        tracing::debug!("{}={} does not name an executable, ignoring", var, value);
    }

    candidates.iter().find_map(|name| find_executable(name))
}

/// `CXX`, then the usual driver names.
pub fn find_cxx_compiler() -> Option<PathBuf> {
    find_with_env("CXX", &["c++", "g++", "clang++"])
}

/// `AR`, then `ar` / `llvm-ar`.
pub fn find_ar() -> Option<PathBuf> {
    find_with_env("AR", &["ar", "llvm-ar"])
}

pub fn find_cmake() -> Option<PathBuf> {
    find_executable("cmake")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_captures_output_in_cwd() {
        let tmp = tempfile::TempDir::new().unwrap();
        let output = ProcessBuilder::new("sh")
            .args(["-c", "pwd"])
            .cwd(tmp.path())
            .exec()
            .unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let expected = tmp.path().canonicalize().unwrap();
        assert_eq!(Path::new(stdout.trim()).canonicalize().unwrap(), expected);
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("c++")
            .arg("-c")
            .args(["util.cpp", "-o", "util.cpp.o"]);

        assert_eq!(pb.display_command(), "c++ -c util.cpp -o util.cpp.o");
    }

    #[test]
    fn test_describe_failure_keeps_tail() {
        let output = ProcessBuilder::new("sh")
            .args(["-c", "echo one >&2; echo two >&2; echo three >&2; exit 4"])
            .exec()
            .unwrap();

        assert_eq!(describe_failure(&output, 2), "exit status 4\ntwo\nthree");
    }
}

//! GCC/Clang-style toolchain.
//!
//! Generates the compile, archive and link commands for the plan's steps.
//! Tools are resolved once at configure time and recorded in the cache.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::builder::plan::{ArchiveStep, CompileStep, LinkStep};
use crate::core::error::ConfigureError;
use crate::core::target::TargetKind;
use crate::util::config::ToolchainSettings;
use crate::util::process::{find_ar, find_cmake, find_cxx_compiler, find_executable, ProcessBuilder};

/// A command to execute, with program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to run (e.g., "g++", "ar")
    pub program: PathBuf,
    /// Command arguments
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn to_process(&self) -> ProcessBuilder {
        ProcessBuilder::new(&self.program).args(&self.args)
    }
}

/// Resolved compiler and archiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toolchain {
    /// Path to the C++ compiler (also the link driver)
    pub cxx: PathBuf,
    /// Path to the archiver
    pub ar: PathBuf,
}

impl Toolchain {
    pub fn new(cxx: impl Into<PathBuf>, ar: impl Into<PathBuf>) -> Self {
        Toolchain {
            cxx: cxx.into(),
            ar: ar.into(),
        }
    }

    /// Resolve the toolchain: configured path, then environment, then PATH.
    pub fn detect(settings: &ToolchainSettings) -> Result<Self, ConfigureError> {
        let cxx = resolve_tool(settings.cxx.as_deref(), find_cxx_compiler, "C++ compiler")?;
        let ar = resolve_tool(settings.ar.as_deref(), find_ar, "archiver")?;
        tracing::debug!("using compiler {} and archiver {}", cxx.display(), ar.display());
        Ok(Toolchain { cxx, ar })
    }

    pub fn compile_command(&self, step: &CompileStep) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.cxx).args(step.flags.iter().cloned());

        for dir in &step.include_dirs {
            cmd = cmd.arg(format!("-I{}", dir.display()));
        }
        for define in &step.defines {
            cmd = cmd.arg(format!("-D{}", define));
        }

        cmd.arg("-MMD")
            .arg("-MF")
            .arg(step.depfile.display().to_string())
            .arg("-c")
            .arg(step.source.display().to_string())
            .arg("-o")
            .arg(step.output.display().to_string())
    }

    /// Archive with symbol index. Existing members are kept, so the caller
    /// removes a stale archive first.
    pub fn archive_command(&self, step: &ArchiveStep) -> CommandSpec {
        CommandSpec::new(&self.ar)
            .arg("rcs")
            .arg(step.output.display().to_string())
            .args(step.objects.iter().map(|o| o.display().to_string()))
    }

    pub fn link_command(&self, step: &LinkStep) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.cxx);
        if step.kind == TargetKind::SharedLibrary {
            cmd = cmd.arg("-shared");
        }

        cmd = cmd
            .arg("-o")
            .arg(step.output.display().to_string())
            .args(step.objects.iter().map(|o| o.display().to_string()))
            .args(step.libraries.iter().map(|l| l.display().to_string()));

        for lib in &step.system_libs {
            cmd = cmd.arg(format!("-l{}", lib));
        }

        cmd.args(step.flags.iter().cloned())
    }
}

/// Locate the nested build tool.
pub fn detect_cmake(settings: &ToolchainSettings) -> Result<PathBuf, ConfigureError> {
    resolve_tool(settings.cmake.as_deref(), find_cmake, "cmake")
}

fn resolve_tool(
    configured: Option<&Path>,
    fallback: fn() -> Option<PathBuf>,
    what: &str,
) -> Result<PathBuf, ConfigureError> {
    let found = match configured {
        // A bare name goes through PATH; anything with a directory must exist
        Some(path) if path.components().count() == 1 => {
            path.to_str().and_then(find_executable)
        }
        Some(path) => path.is_file().then(|| path.to_path_buf()),
        None => fallback(),
    };

    found.ok_or_else(|| ConfigureError::ToolchainNotFound {
        tool: match configured {
            Some(path) => format!("{} `{}`", what, path.display()),
            None => what.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolchain() -> Toolchain {
        Toolchain::new("/usr/bin/g++", "/usr/bin/ar")
    }

    #[test]
    fn test_compile_command() {
        let step = CompileStep {
            target: "biscuit_objects".into(),
            source: PathBuf::from("/p/src/a.cpp"),
            output: PathBuf::from("/b/obj/biscuit_objects/src/a.cpp.o"),
            depfile: PathBuf::from("/b/obj/biscuit_objects/src/a.cpp.d"),
            include_dirs: vec![PathBuf::from("/p/src/include")],
            defines: vec!["NDEBUG".into()],
            flags: vec!["-std=c++17".into(), "-O3".into()],
        };

        let cmd = toolchain().compile_command(&step);
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/g++"));
        assert_eq!(
            cmd.args,
            vec![
                "-std=c++17",
                "-O3",
                "-I/p/src/include",
                "-DNDEBUG",
                "-MMD",
                "-MF",
                "/b/obj/biscuit_objects/src/a.cpp.d",
                "-c",
                "/p/src/a.cpp",
                "-o",
                "/b/obj/biscuit_objects/src/a.cpp.o",
            ]
        );
    }

    #[test]
    fn test_archive_command() {
        let step = ArchiveStep {
            target: "biscuit_static".into(),
            objects: vec![PathBuf::from("a.o"), PathBuf::from("b.o")],
            output: PathBuf::from("lib/libbiscuit.a"),
        };
        let cmd = toolchain().archive_command(&step);
        assert_eq!(cmd.program, PathBuf::from("/usr/bin/ar"));
        assert_eq!(cmd.args, vec!["rcs", "lib/libbiscuit.a", "a.o", "b.o"]);
    }

    #[test]
    fn test_shared_link_command() {
        let step = LinkStep {
            target: "biscuit_shared".into(),
            kind: TargetKind::SharedLibrary,
            objects: vec![PathBuf::from("a.o")],
            libraries: vec![],
            system_libs: vec!["pthread".into()],
            flags: vec!["--coverage".into()],
            output: PathBuf::from("lib/libbiscuit.so"),
        };
        let cmd = toolchain().link_command(&step);
        assert_eq!(
            cmd.args,
            vec!["-shared", "-o", "lib/libbiscuit.so", "a.o", "-lpthread", "--coverage"]
        );
    }

    #[test]
    fn test_missing_configured_tool_is_fatal() {
        let settings = ToolchainSettings {
            cxx: Some(PathBuf::from("/nonexistent/bin/c++")),
            ar: None,
            cmake: Some(PathBuf::from("definitely-not-a-cmake-binary")),
        };
        let err = Toolchain::detect(&settings).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/bin/c++"));

        let err = detect_cmake(&settings).unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-cmake-binary"));
    }
}

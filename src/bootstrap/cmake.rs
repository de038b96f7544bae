//! Nested CMake build of a fetched framework.
//!
//! A small wrapper `CMakeLists.txt` is materialized in the staging
//! directory. It pulls the fetched source in with `add_subdirectory`, so the
//! framework's own targets are built with our cache options.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Result;

use crate::bootstrap::StagingLayout;
use crate::core::error::ConfigureError;
use crate::util::fs::{ensure_dir, write_string};
use crate::util::hash::Fingerprint;
use crate::util::process::{describe_failure, ProcessBuilder};

/// Lines of nested-build stderr carried into error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Configure and build one dependency with CMake.
pub struct NestedBuild<'a> {
    name: &'a str,
    cmake: &'a Path,
    layout: &'a StagingLayout,
    cache_args: Vec<String>,
}

impl<'a> NestedBuild<'a> {
    pub fn new(name: &'a str, cmake: &'a Path, layout: &'a StagingLayout) -> Self {
        NestedBuild {
            name,
            cmake,
            layout,
            cache_args: Vec::new(),
        }
    }

    /// Add `-D` cache arguments for the configure step.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cache_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Path of the materialized descriptor.
    pub fn descriptor_path(&self) -> PathBuf {
        self.layout.stage.join("CMakeLists.txt")
    }

    /// Text of the wrapper descriptor.
    pub fn descriptor(&self) -> String {
        format!(
            "# Generated by biscuit-build for `{name}`. Do not edit.\n\
             cmake_minimum_required(VERSION 3.14)\n\
             project({name}-bootstrap LANGUAGES C CXX)\n\
             add_subdirectory(\"{src}\" \"{name}\")\n",
            name = self.name,
            src = self.layout.src.display().to_string().replace('\\', "/"),
        )
    }

    /// Identity of descriptor plus cache options; changes force a reconfigure.
    pub fn fingerprint(&self) -> String {
        Fingerprint::new()
            .field(self.descriptor())
            .fields(&self.cache_args)
            .hex()
    }

    /// Write the wrapper descriptor into the staging directory.
    pub fn materialize(&self) -> Result<()> {
        ensure_dir(&self.layout.stage)?;
        let path = self.descriptor_path();
        let contents = self.descriptor();
        if std::fs::read_to_string(&path).ok().as_deref() != Some(contents.as_str()) {
            write_string(&path, &contents)?;
        }
        Ok(())
    }

    /// Whether a previous configure with the same fingerprint completed.
    pub fn is_configured(&self) -> bool {
        self.layout.build.join("CMakeCache.txt").is_file()
            && self.layout.read_stamp("configure").as_deref() == Some(self.fingerprint().as_str())
    }

    /// Run the configure step.
    pub fn configure(&self) -> Result<(), ConfigureError> {
        tracing::info!("Configuring dependency {}", self.name);

        let cmd = ProcessBuilder::new(self.cmake)
            .arg("-S")
            .arg(&self.layout.stage)
            .arg("-B")
            .arg(&self.layout.build)
            .arg("-DCMAKE_BUILD_TYPE=Release")
            .arg("-DCMAKE_POSITION_INDEPENDENT_CODE=ON")
            .args(&self.cache_args);

        tracing::debug!("{}", cmd.display_command());
        check(cmd.exec()).map_err(|message| ConfigureError::DependencyConfigureFailed {
            name: self.name.to_string(),
            message,
        })?;

        self.layout
            .write_stamp("configure", &self.fingerprint())
            .map_err(|e| ConfigureError::DependencyConfigureFailed {
                name: self.name.to_string(),
                message: format!("{:#}", e),
            })
    }

    /// Run the build step. CMake itself makes an up-to-date rebuild a no-op.
    pub fn build(&self) -> Result<(), ConfigureError> {
        tracing::info!("Building dependency {}", self.name);

        let cmd = ProcessBuilder::new(self.cmake)
            .arg("--build")
            .arg(&self.layout.build)
            .arg("--config")
            .arg("Release");

        tracing::debug!("{}", cmd.display_command());
        check(cmd.exec()).map_err(|message| ConfigureError::DependencyBuildFailed {
            name: self.name.to_string(),
            message,
        })
    }
}

/// Turn a finished (or unspawnable) process into a failure message.
fn check(result: Result<Output>) -> Result<(), String> {
    let output = result.map_err(|e| format!("{:#}", e))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(describe_failure(&output, STDERR_TAIL_LINES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_descriptor_wraps_source() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::new(tmp.path(), "googletest");
        let nested = NestedBuild::new("googletest", Path::new("cmake"), &layout);

        let text = nested.descriptor();
        assert!(text.contains("project(googletest-bootstrap"));
        assert!(text.contains("add_subdirectory("));
        assert!(text.contains("googletest-src"));
    }

    #[test]
    fn test_materialize_writes_descriptor() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::new(tmp.path(), "benchmark");
        let nested = NestedBuild::new("benchmark", Path::new("cmake"), &layout);

        nested.materialize().unwrap();
        let written = std::fs::read_to_string(nested.descriptor_path()).unwrap();
        assert_eq!(written, nested.descriptor());
    }

    #[test]
    fn test_fingerprint_tracks_cache_args() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::new(tmp.path(), "benchmark");
        let a = NestedBuild::new("benchmark", Path::new("cmake"), &layout);
        let b = NestedBuild::new("benchmark", Path::new("cmake"), &layout)
            .args(["-DBENCHMARK_ENABLE_TESTING=OFF"]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_failing_steps_name_the_dependency() {
        let tmp = TempDir::new().unwrap();
        let layout = StagingLayout::new(tmp.path(), "googletest");
        let missing = tmp.path().join("no-such-cmake");
        let nested = NestedBuild::new("googletest", &missing, &layout);

        let err = nested.configure().unwrap_err();
        assert!(err
            .to_string()
            .starts_with("configuration step failed for dependency googletest"));

        let err = nested.build().unwrap_err();
        assert!(err
            .to_string()
            .starts_with("build step failed for dependency googletest"));
    }
}

//! Build fingerprinting for incremental builds.
//!
//! A compile step is fresh when its command fingerprint is unchanged and its
//! object is newer than the source and every header the compiler recorded
//! in the step's dependency file. Archive and link steps are fresh when the
//! output is newer than all inputs and the command is unchanged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::toolchain::CommandSpec;
use crate::util::fs::{mtime, write_string};
use crate::util::hash::Fingerprint;

/// File name of the fingerprint store inside the build directory.
pub const FINGERPRINT_FILE: &str = ".fingerprints.json";

/// Fingerprint of a command line.
pub fn command_fingerprint(cmd: &CommandSpec) -> String {
    Fingerprint::new().path(&cmd.program).fields(&cmd.args).short()
}

/// Parse a make-style dependency file into its prerequisites.
///
/// ```text
/// out.o: src/a.cpp include/a.h \
///   include/with\ space.h
/// ```
pub fn parse_depfile(contents: &str) -> Vec<PathBuf> {
    let joined = contents.replace("\\\r\n", " ").replace("\\\n", " ");

    // Prerequisites follow the first `: ` (a bare `:` may be a drive letter)
    let body = match joined.find(": ") {
        Some(idx) => &joined[idx + 2..],
        None => match joined.strip_suffix(':') {
            Some(_) => "",
            None => return Vec::new(),
        },
    };

    let mut deps = Vec::new();
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&' ') => {
                current.push(' ');
                chars.next();
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    deps.push(PathBuf::from(std::mem::take(&mut current)));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        deps.push(PathBuf::from(current));
    }
    deps
}

/// Whether `output` exists and is newer than every input.
///
/// A missing input counts as changed.
pub fn is_up_to_date<'a>(output: &Path, inputs: impl IntoIterator<Item = &'a Path>) -> bool {
    let Some(built) = mtime(output) else {
        return false;
    };
    inputs
        .into_iter()
        .all(|input| mtime(input).is_some_and(|t: SystemTime| t <= built))
}

/// Command fingerprints of the last successful run, by output path.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FingerprintCache {
    #[serde(default)]
    pub outputs: BTreeMap<PathBuf, String>,
}

impl FingerprintCache {
    /// Load fingerprint cache from a file. A missing or unreadable cache is empty.
    pub fn load(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return FingerprintCache::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::debug!("ignoring corrupt fingerprint cache {}: {}", path.display(), e);
            FingerprintCache::default()
        })
    }

    /// Save fingerprint cache to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_string(path, &content)
            .with_context(|| format!("failed to save fingerprints to {}", path.display()))
    }

    /// Whether a compile step must run.
    pub fn needs_compile(&self, output: &Path, depfile: &Path, source: &Path, fingerprint: &str) -> bool {
        if self.outputs.get(output).map(String::as_str) != Some(fingerprint) {
            return true;
        }

        let headers = match std::fs::read_to_string(depfile) {
            Ok(contents) => parse_depfile(&contents),
            Err(_) => return true,
        };

        !is_up_to_date(
            output,
            std::iter::once(source).chain(headers.iter().map(PathBuf::as_path)),
        )
    }

    /// Whether an archive or link step must run.
    pub fn needs_link(&self, output: &Path, inputs: &[PathBuf], fingerprint: &str) -> bool {
        self.outputs.get(output).map(String::as_str) != Some(fingerprint)
            || !is_up_to_date(output, inputs.iter().map(PathBuf::as_path))
    }

    pub fn record(&mut self, output: PathBuf, fingerprint: String) {
        self.outputs.insert(output, fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch_later(path: &Path, secs: u64) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_parse_depfile() {
        let deps = parse_depfile(
            "/b/obj/a.cpp.o: /p/src/a.cpp /p/src/include/a.h \\\n /p/src/include/my\\ b.h\n",
        );
        assert_eq!(
            deps,
            vec![
                PathBuf::from("/p/src/a.cpp"),
                PathBuf::from("/p/src/include/a.h"),
                PathBuf::from("/p/src/include/my b.h"),
            ]
        );
        assert!(parse_depfile("garbage").is_empty());
    }

    #[test]
    fn test_compile_freshness_follows_headers() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.cpp");
        let header = tmp.path().join("a.h");
        let object = tmp.path().join("a.cpp.o");
        let depfile = tmp.path().join("a.cpp.d");
        fs::write(&source, "#include \"a.h\"").unwrap();
        fs::write(&header, "").unwrap();
        fs::write(
            &depfile,
            format!("{}: {} {}\n", object.display(), source.display(), header.display()),
        )
        .unwrap();
        fs::write(&object, "obj").unwrap();
        touch_later(&object, 10);

        let mut cache = FingerprintCache::default();
        assert!(cache.needs_compile(&object, &depfile, &source, "fp1"));

        cache.record(object.clone(), "fp1".into());
        assert!(!cache.needs_compile(&object, &depfile, &source, "fp1"));
        assert!(cache.needs_compile(&object, &depfile, &source, "fp2"));

        touch_later(&header, 20);
        assert!(cache.needs_compile(&object, &depfile, &source, "fp1"));
    }

    #[test]
    fn test_link_freshness() {
        let tmp = TempDir::new().unwrap();
        let object = tmp.path().join("a.o");
        let archive = tmp.path().join("liba.a");
        fs::write(&object, "").unwrap();

        let mut cache = FingerprintCache::default();
        assert!(cache.needs_link(&archive, &[object.clone()], "fp"));

        fs::write(&archive, "").unwrap();
        touch_later(&archive, 10);
        cache.record(archive.clone(), "fp".into());
        assert!(!cache.needs_link(&archive, &[object.clone()], "fp"));

        touch_later(&object, 20);
        assert!(cache.needs_link(&archive, &[object], "fp"));
    }

    #[test]
    fn test_cache_roundtrip_and_corruption() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(FINGERPRINT_FILE);

        let mut cache = FingerprintCache::default();
        cache.record(PathBuf::from("a.o"), "abc".into());
        cache.save(&path).unwrap();
        assert_eq!(FingerprintCache::load(&path).outputs.len(), 1);

        fs::write(&path, "{not json").unwrap();
        assert!(FingerprintCache::load(&path).outputs.is_empty());
    }
}

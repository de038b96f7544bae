//! Retrieval of external framework sources: git, tarball or local path.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use git2::{Repository, ResetType};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::project::DependencySpec;
use crate::util::fs::{copy_dir_all, ensure_dir, remove_dir_all_if_exists};
use crate::util::hash::{sha256_hex, Fingerprint};

/// Which commit of a git repository to check out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitReference {
    DefaultBranch,
    Branch(String),
    Tag(String),
    Rev(String),
}

/// Where a dependency's source comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Retrieval {
    Git {
        url: String,
        reference: GitReference,
    },
    Archive {
        url: String,
        sha256: String,
        strip_prefix: Option<String>,
    },
    Path {
        path: PathBuf,
    },
}

impl Retrieval {
    /// Interpret the retrieval keys of a `[dependencies.<name>]` entry.
    pub fn from_spec(name: &str, spec: &DependencySpec, project_root: &Path) -> Result<Self> {
        let given = [spec.git.is_some(), spec.url.is_some(), spec.path.is_some()]
            .iter()
            .filter(|b| **b)
            .count();
        if given != 1 {
            bail!(
                "dependency `{}` must set exactly one of `git`, `url` or `path`",
                name
            );
        }

        if let Some(git) = &spec.git {
            Url::parse(git).with_context(|| format!("invalid git URL for `{}`: {}", name, git))?;
            let reference = match (&spec.tag, &spec.branch, &spec.rev) {
                (Some(tag), None, None) => GitReference::Tag(tag.clone()),
                (None, Some(branch), None) => GitReference::Branch(branch.clone()),
                (None, None, Some(rev)) => GitReference::Rev(rev.clone()),
                (None, None, None) => GitReference::DefaultBranch,
                _ => bail!(
                    "dependency `{}` may set only one of `tag`, `branch` or `rev`",
                    name
                ),
            };
            return Ok(Retrieval::Git {
                url: git.clone(),
                reference,
            });
        }

        if let Some(url) = &spec.url {
            Url::parse(url).with_context(|| format!("invalid URL for `{}`: {}", name, url))?;
            let Some(sha256) = &spec.sha256 else {
                bail!("dependency `{}` fetched from a URL needs a `sha256`", name);
            };
            return Ok(Retrieval::Archive {
                url: url.clone(),
                sha256: sha256.to_ascii_lowercase(),
                strip_prefix: spec.strip_prefix.clone(),
            });
        }

        let path = spec.path.as_ref().map(|p| project_root.join(p)).unwrap_or_default();
        Ok(Retrieval::Path { path })
    }

    /// Stable identity of what would be fetched.
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        match self {
            Retrieval::Git { url, reference } => {
                fp.field("git").field(url).field(format!("{:?}", reference));
            }
            Retrieval::Archive {
                url,
                sha256,
                strip_prefix,
            } => {
                fp.field("archive").field(url).field(sha256);
                fp.optional(strip_prefix.as_deref());
            }
            Retrieval::Path { path } => {
                fp.field("path").path(path);
            }
        }
        fp.hex()
    }

    /// Whether fetching needs the network.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Retrieval::Path { .. })
    }

    /// Fetch into `dest`, replacing whatever is there.
    ///
    /// The source is first materialized in a scratch directory next to
    /// `dest` and renamed into place, so an interrupted fetch never leaves a
    /// half-populated `dest`.
    pub fn fetch(&self, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .with_context(|| format!("invalid fetch destination {}", dest.display()))?;
        ensure_dir(parent)?;

        let scratch = tempfile::Builder::new()
            .prefix(".fetch-")
            .tempdir_in(parent)
            .context("failed to create scratch directory")?;
        let staged = scratch.path().join("src");

        match self {
            Retrieval::Git { url, reference } => fetch_git(url, reference, &staged)?,
            Retrieval::Archive {
                url,
                sha256,
                strip_prefix,
            } => fetch_archive(url, sha256, strip_prefix.as_deref(), &staged)?,
            Retrieval::Path { path } => {
                if !path.is_dir() {
                    bail!("source directory {} does not exist", path.display());
                }
                tracing::info!("Copying {}", path.display());
                copy_dir_all(path, &staged)?;
            }
        }

        remove_dir_all_if_exists(dest)?;
        std::fs::rename(&staged, dest)
            .with_context(|| format!("failed to move fetched source to {}", dest.display()))?;
        Ok(())
    }
}

fn fetch_git(url: &str, reference: &GitReference, dest: &Path) -> Result<()> {
    tracing::info!("Cloning {}", url);

    let repo = Repository::clone(url, dest).with_context(|| format!("failed to clone {}", url))?;

    let commit = match reference {
        GitReference::DefaultBranch => repo.head()?.peel_to_commit()?,
        GitReference::Branch(branch) => repo
            .find_reference(&format!("refs/remotes/origin/{}", branch))
            .with_context(|| format!("branch `{}` not found in {}", branch, url))?
            .peel_to_commit()?,
        GitReference::Tag(tag) => repo
            .find_reference(&format!("refs/tags/{}", tag))
            .with_context(|| format!("tag `{}` not found in {}", tag, url))?
            .peel_to_commit()?,
        GitReference::Rev(rev) => {
            let oid = git2::Oid::from_str(rev)?;
            repo.find_commit(oid)
                .with_context(|| format!("revision `{}` not found in {}", rev, url))?
        }
    };

    tracing::debug!("Checking out {} at {}", url, commit.id());
    repo.reset(commit.as_object(), ResetType::Hard, None)?;

    Ok(())
}

fn fetch_archive(url: &str, sha256: &str, strip_prefix: Option<&str>, dest: &Path) -> Result<()> {
    tracing::info!("Downloading {}", url);

    let response =
        reqwest::blocking::get(url).with_context(|| format!("failed to download {}", url))?;

    if !response.status().is_success() {
        bail!("failed to download {}: HTTP {}", url, response.status());
    }

    let bytes = response
        .bytes()
        .context("failed to read response body")?;

    let actual = sha256_hex(&bytes);
    if actual != sha256 {
        bail!(
            "hash mismatch for {}:\n  expected: {}\n  actual:   {}",
            url,
            sha256,
            actual
        );
    }

    extract_tarball(&bytes, dest, strip_prefix)
        .with_context(|| format!("failed to extract {}", url))
}

/// Extract a gzip tarball, optionally stripping a leading directory.
pub fn extract_tarball(data: &[u8], dest: &Path, strip_prefix: Option<&str>) -> Result<()> {
    use flate2::read::GzDecoder;
    use std::io::Cursor;
    use tar::Archive;

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(data)));
    ensure_dir(dest)?;

    for entry in archive.entries().context("failed to read tarball entries")? {
        let mut entry = entry.context("failed to read tarball entry")?;
        let entry_path = entry.path().context("failed to get entry path")?.into_owned();

        let relative = match strip_prefix {
            Some(prefix) => match entry_path.strip_prefix(prefix.trim_end_matches('/')) {
                Ok(rest) => rest.to_path_buf(),
                Err(_) => entry_path.clone(),
            },
            None => entry_path.clone(),
        };

        if relative.as_os_str().is_empty() {
            continue;
        }
        if relative
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!(
                "tarball entry escapes destination directory: {}",
                entry_path.display()
            );
        }

        let output_path = dest.join(&relative);
        if let Some(parent) = output_path.parent() {
            ensure_dir(parent)?;
        }

        entry
            .unpack(&output_path)
            .with_context(|| format!("failed to extract {}", output_path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn spec() -> DependencySpec {
        DependencySpec {
            targets: BTreeMap::new(),
            ..Default::default()
        }
    }

    #[test]
    fn test_from_spec_git_tag() {
        let mut s = spec();
        s.git = Some("https://github.com/google/googletest.git".into());
        s.tag = Some("release-1.12.1".into());

        let r = Retrieval::from_spec("googletest", &s, Path::new("/proj")).unwrap();
        assert_eq!(
            r,
            Retrieval::Git {
                url: "https://github.com/google/googletest.git".into(),
                reference: GitReference::Tag("release-1.12.1".into()),
            }
        );
        assert!(r.is_remote());
    }

    #[test]
    fn test_from_spec_rejects_ambiguous() {
        let mut s = spec();
        s.git = Some("https://example.com/x.git".into());
        s.path = Some(PathBuf::from("vendor/x"));
        let err = Retrieval::from_spec("x", &s, Path::new("/proj")).unwrap_err();
        assert!(err.to_string().contains("exactly one"));

        let err = Retrieval::from_spec("y", &spec(), Path::new("/proj")).unwrap_err();
        assert!(err.to_string().contains("`y`"));
    }

    #[test]
    fn test_from_spec_archive_requires_hash() {
        let mut s = spec();
        s.url = Some("https://example.com/bench.tar.gz".into());
        assert!(Retrieval::from_spec("benchmark", &s, Path::new("/")).is_err());

        s.sha256 = Some("ABCDEF".into());
        let r = Retrieval::from_spec("benchmark", &s, Path::new("/")).unwrap();
        assert!(matches!(r, Retrieval::Archive { ref sha256, .. } if sha256 == "abcdef"));
    }

    #[test]
    fn test_path_fetch_copies_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let vendor = tmp.path().join("vendor/fw");
        std::fs::create_dir_all(&vendor).unwrap();
        std::fs::write(vendor.join("CMakeLists.txt"), "project(fw)").unwrap();

        let dest = tmp.path().join("build/_deps/fw-src");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), "old").unwrap();

        let r = Retrieval::Path { path: vendor };
        r.fetch(&dest).unwrap();

        assert!(dest.join("CMakeLists.txt").exists());
        assert!(!dest.join("stale.txt").exists());
    }

    #[test]
    fn test_path_fetch_missing_source() {
        let tmp = TempDir::new().unwrap();
        let r = Retrieval::Path {
            path: tmp.path().join("nope"),
        };
        let dest = tmp.path().join("out");
        assert!(r.fetch(&dest).is_err());
        assert!(!dest.exists());
    }

    #[test]
    fn test_fingerprint_tracks_reference() {
        let a = Retrieval::Git {
            url: "https://x/y.git".into(),
            reference: GitReference::Tag("v1".into()),
        };
        let b = Retrieval::Git {
            url: "https://x/y.git".into(),
            reference: GitReference::Tag("v2".into()),
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn test_extract_tarball_with_strip_prefix() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use tar::Builder;

        let mut tar_data = Vec::new();
        {
            let encoder = GzEncoder::new(&mut tar_data, Compression::default());
            let mut builder = Builder::new(encoder);

            let mut header = tar::Header::new_gnu();
            header.set_path("benchmark-1.7.1/include/benchmark.h").unwrap();
            header.set_size(5);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append(&header, std::io::Cursor::new(b"hello"))
                .unwrap();

            builder.into_inner().unwrap().finish().unwrap();
        }

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out");
        extract_tarball(&tar_data, &dest, Some("benchmark-1.7.1")).unwrap();

        let content = std::fs::read_to_string(dest.join("include/benchmark.h")).unwrap();
        assert_eq!(content, "hello");
    }
}

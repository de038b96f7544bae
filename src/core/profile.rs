//! Build profiles and the flag sets they resolve to.
//!
//! A [`BuildConfiguration`] is resolved once per configure run and passed by
//! reference to every target declaration. Nothing mutates it afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::ConfigureError;

/// Coverage instrumentation, shared by the debug profile and by the
/// test/benchmark link steps.
pub const COVERAGE_FLAG: &str = "--coverage";

/// A named build profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    /// Debug symbols, no optimization, coverage.
    #[default]
    Debug,
    /// Debug symbols with light optimization.
    FastDebug,
    /// Full optimization, assertions off.
    Release,
    /// Moderate optimization, assertions off, debug symbols kept.
    RelWithDebInfo,
}

impl BuildProfile {
    /// All recognized profiles.
    pub const ALL: [BuildProfile; 4] = [
        BuildProfile::Debug,
        BuildProfile::FastDebug,
        BuildProfile::Release,
        BuildProfile::RelWithDebInfo,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildProfile::Debug => "debug",
            BuildProfile::FastDebug => "fastdebug",
            BuildProfile::Release => "release",
            BuildProfile::RelWithDebInfo => "relwithdebinfo",
        }
    }

    /// Resolve the flag set for this profile.
    pub fn configuration(self) -> BuildConfiguration {
        let (compile, defines, link): (&[&str], &[&str], &[&str]) = match self {
            BuildProfile::Debug => (
                &[
                    "-O0",
                    "-ggdb",
                    "-fno-omit-frame-pointer",
                    "-fno-optimize-sibling-calls",
                    COVERAGE_FLAG,
                ],
                &[],
                &[COVERAGE_FLAG],
            ),
            BuildProfile::FastDebug => (
                &[
                    "-O1",
                    "-ggdb",
                    "-fno-omit-frame-pointer",
                    "-fno-optimize-sibling-calls",
                ],
                &[],
                &[],
            ),
            BuildProfile::Release => (&["-O3"], &["NDEBUG"], &[]),
            BuildProfile::RelWithDebInfo => (&["-O2", "-g"], &["NDEBUG"], &[]),
        };

        BuildConfiguration {
            profile: self,
            compile_flags: to_owned(compile),
            defines: to_owned(defines),
            link_flags: to_owned(link),
        }
    }
}

fn to_owned(flags: &[&str]) -> Vec<String> {
    flags.iter().map(|s| s.to_string()).collect()
}

impl fmt::Display for BuildProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildProfile {
    type Err = ConfigureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        BuildProfile::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| ConfigureError::UnknownProfile {
                name: s.to_string(),
            })
    }
}

/// The compiler, preprocessor and linker flags of the active profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
    /// Profile this was resolved from
    pub profile: BuildProfile,

    /// Compiler flags, in order
    pub compile_flags: Vec<String>,

    /// Preprocessor definitions (without `-D`)
    pub defines: Vec<String>,

    /// Linker flags, in order
    pub link_flags: Vec<String>,
}

impl BuildConfiguration {
    /// Resolve a requested profile name. `None` selects `debug`.
    pub fn resolve(requested: Option<&str>) -> Result<Self, ConfigureError> {
        let profile = match requested {
            Some(name) => name.parse::<BuildProfile>()?,
            None => BuildProfile::default(),
        };
        Ok(profile.configuration())
    }

    /// Whether assertions are compiled out.
    pub fn assertions_disabled(&self) -> bool {
        self.defines.iter().any(|d| d == "NDEBUG")
    }

    /// Whether coverage instrumentation is requested at compile time.
    pub fn has_coverage(&self) -> bool {
        self.compile_flags.iter().any(|f| f == COVERAGE_FLAG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_default_is_debug() {
        let config = BuildConfiguration::resolve(None).unwrap();
        assert_eq!(config.profile, BuildProfile::Debug);
        assert!(config.compile_flags.contains(&COVERAGE_FLAG.to_string()));
        assert!(config.link_flags.contains(&COVERAGE_FLAG.to_string()));
        assert!(config.compile_flags.contains(&"-O0".to_string()));
        assert!(config
            .compile_flags
            .contains(&"-fno-omit-frame-pointer".to_string()));
        assert!(config
            .compile_flags
            .contains(&"-fno-optimize-sibling-calls".to_string()));
    }

    #[test]
    fn test_resolve_case_insensitive() {
        for name in ["Release", "RELEASE", "release", " release "] {
            let config = BuildConfiguration::resolve(Some(name)).unwrap();
            assert_eq!(config.profile, BuildProfile::Release);
        }
        assert_eq!(
            BuildConfiguration::resolve(Some("RelWithDebInfo"))
                .unwrap()
                .profile,
            BuildProfile::RelWithDebInfo
        );
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for profile in BuildProfile::ALL {
            let a = BuildConfiguration::resolve(Some(profile.as_str())).unwrap();
            let b = BuildConfiguration::resolve(Some(&profile.as_str().to_uppercase())).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_release_flags() {
        let config = BuildConfiguration::resolve(Some("release")).unwrap();
        assert!(config.assertions_disabled());
        assert!(config.compile_flags.contains(&"-O3".to_string()));
        assert!(!config.compile_flags.iter().any(|f| f.starts_with("-g")));
        assert!(!config.link_flags.contains(&COVERAGE_FLAG.to_string()));
        assert!(!config.has_coverage());
    }

    #[test]
    fn test_fastdebug_and_relwithdebinfo() {
        let fast = BuildProfile::FastDebug.configuration();
        assert!(fast.compile_flags.contains(&"-O1".to_string()));
        assert!(fast.compile_flags.contains(&"-ggdb".to_string()));
        assert!(!fast.has_coverage());
        assert!(!fast.assertions_disabled());

        let rel = BuildProfile::RelWithDebInfo.configuration();
        assert!(rel.compile_flags.contains(&"-O2".to_string()));
        assert!(rel.compile_flags.contains(&"-g".to_string()));
        assert!(rel.assertions_disabled());
    }

    #[test]
    fn test_unknown_profile_always_fails() {
        for _ in 0..3 {
            let err = BuildConfiguration::resolve(Some("turbo")).unwrap_err();
            assert!(matches!(err, ConfigureError::UnknownProfile { ref name } if name == "turbo"));
        }
        assert!(BuildConfiguration::resolve(Some("")).is_err());
    }
}

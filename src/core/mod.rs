//! Core data structures.
//!
//! - Build profiles and the configuration they resolve to
//! - The project descriptor and its directory roles
//! - Source manifests produced by discovery
//! - Targets and their options

pub mod error;
pub mod profile;
pub mod project;
pub mod source_set;
pub mod target;

pub use error::ConfigureError;
pub use profile::{BuildConfiguration, BuildProfile};
pub use project::{Project, ProjectDescriptor, DESCRIPTOR_NAME};
pub use source_set::{DiscoveryRule, SourceManifest, SourceRole, SourceSets};
pub use target::{Target, TargetKind, TargetOptions};

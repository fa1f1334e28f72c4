//! License artifacts and the registry that de-duplicates them.
//!
//! - [`registry`]: process-wide table keyed by destination path; owns the
//!   find / promote / create step.
//! - [`artifact`]: one license text on disk plus its single-flight initializer.
//! - [`copyright`]: copyright line extraction.
//! - [`expression`]: leaf identifiers of SPDX license expressions.

pub mod artifact;
pub mod copyright;
pub mod expression;
pub mod registry;

pub use artifact::LicenseArtifact;
pub use registry::LicenseRegistry;

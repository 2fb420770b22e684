//! The validation pipeline.
//!
//! A package is validated in tiers. Each tier only runs when the earlier ones
//! passed, unless the configuration is `determined`:
//!
//! 1. package type and install manifest
//! 2. chrome registrations
//! 3. file contents (scripts, markup, stylesheets, nested packages)

mod detect;
mod runner;

pub use detect::{detect_jetpack, detect_type, identify_library};
pub use runner::Runner;

use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::bundle::ErrorBundle;
use crate::config::ValidationConfig;
use crate::js::EngineFault;
use crate::package::{self, PackageError, PackageReader};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("validation timed out")]
    Timeout,

    #[error("engine fault in {file}: {fault}")]
    Engine { file: String, fault: EngineFault },

    #[error("could not open package: {0}")]
    Package(#[from] PackageError),
}

/// Validate the package (archive or directory) at `path`.
pub fn validate(path: &Path, config: &ValidationConfig) -> Result<ErrorBundle, ValidationError> {
    let package = package::open(path)?;
    validate_package(package.as_ref(), config)
}

/// Validate an already opened package into a fresh bundle.
pub fn validate_package(
    package: &dyn PackageReader,
    config: &ValidationConfig,
) -> Result<ErrorBundle, ValidationError> {
    let mut bundle = ErrorBundle::new().with_supported_versions(config.supported_versions());
    info!(package = package.name(), "validating");
    Runner::new(config).run(&mut bundle, package)?;
    info!(
        package = package.name(),
        errors = bundle.errors.len(),
        warnings = bundle.warnings.len(),
        notices = bundle.notices.len(),
        "validation finished"
    );
    Ok(bundle)
}

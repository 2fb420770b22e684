//! Package manifests: `install.rdf` and `chrome.manifest`.

pub mod chrome;
pub mod install;
pub mod rdf;

pub use chrome::{ChromeEntry, ChromeManifest};
pub use install::test_install_rdf;
pub use rdf::{RdfObject, RdfParser, Triple};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("no `{0}` description in the manifest")]
    MissingRoot(&'static str),
}

//! xpilint - static analyzer for browser extension packages.
//!
//! xpilint opens an add-on package, checks its manifests, and runs every
//! script through an abstract interpreter that knows the host's APIs. The
//! result is a bundle of errors, warnings and notices, each tagged with a
//! stable identifier tuple such as `javascript.dangerous_global.eval`.
//!
//! # Architecture
//!
//! - `bundle`: Diagnostic records, message tree, summaries and version gating
//! - `js`: tree-sitter front end, traverser, value model and entity registry
//! - `patterns`: Regex batteries plus the markup and stylesheet checkers
//! - `package`: Readers for archives, directories and in-memory packages
//! - `manifest`: install.rdf and chrome.manifest
//! - `validate`: The tiered validation pipeline
//! - `config`: YAML configuration
//! - `report`: Output formatting (pretty, JSON)
//!
//! # Adding a Rule
//!
//! Host API behaviour lives in `src/js/entities/`. Each rule module exposes a
//! `register` function that adds entities to the `RegistryBuilder`; add yours
//! to `build_standard` in `entities/mod.rs`.

pub mod bundle;
pub mod cli;
pub mod config;
pub mod js;
pub mod manifest;
pub mod package;
pub mod patterns;
pub mod report;
pub mod validate;

pub use bundle::{Diagnostic, ErrorBundle, Finding, PackageType, Severity, SigningSeverity};
pub use config::ValidationConfig;
pub use js::{test_js_file, EngineFault, JsOptions};
pub use validate::{validate, validate_package, ValidationError};

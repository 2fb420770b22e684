//! Command-line interface for xpilint.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::bundle::PackageType;
use crate::config::{ValidationConfig, VersionSpec};
use crate::report;
use crate::validate::{self, ValidationError};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Static analyzer for browser extension packages.
///
/// xpilint unpacks an add-on, reads its manifests and walks every script
/// with an abstract interpreter, reporting insecure, deprecated and
/// incompatible code.
#[derive(Parser)]
#[command(name = "xpilint")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate an add-on package
    #[command(visible_alias = "check")]
    Validate(ValidateArgs),
}

/// Arguments for the validate command.
#[derive(Parser)]
pub struct ValidateArgs {
    /// Package to validate (.xpi/.jar archive or unpacked directory)
    pub path: PathBuf,

    /// Path to configuration YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Expected package type (extension, theme, dictionary, langpack, search, multi)
    #[arg(short = 't', long = "type")]
    pub expected_type: Option<PackageType>,

    /// Only report compatibility findings for this Firefox version window, as FROM:TO
    #[arg(long)]
    pub for_firefox: Option<String>,

    /// Continue to later tiers after a failing one
    #[arg(long)]
    pub determined: bool,

    /// Abort on internal engine faults instead of reporting them
    #[arg(long)]
    pub strict: bool,

    /// Overall time limit in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Do not require an add-on name in install.rdf
    #[arg(long)]
    pub ignore_empty_name: bool,

    /// Pass even when warnings were reported
    #[arg(long)]
    pub ignore_warnings: bool,
}

/// Install the log subscriber. `RUST_LOG` wins over `-v`.
pub fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "xpilint=debug",
        _ => "xpilint=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Merge the configuration file with command-line flags.
fn load_config(args: &ValidateArgs) -> anyhow::Result<ValidationConfig> {
    let mut config = match &args.config {
        Some(path) => ValidationConfig::parse_file(path)?,
        None => ValidationConfig::discover()?,
    };
    if args.expected_type.is_some() {
        config.expected_type = args.expected_type;
    }
    if let Some(window) = &args.for_firefox {
        let (from, to) = window
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("--for-firefox expects FROM:TO, got {:?}", window))?;
        config.for_appversions.insert(
            "firefox".to_string(),
            VersionSpec::Range {
                from: from.to_string(),
                to: to.to_string(),
            },
        );
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    config.determined |= args.determined;
    config.strict |= args.strict;
    config.overrides.ignore_empty_name |= args.ignore_empty_name;
    Ok(config)
}

/// Run the validate command.
pub fn run_validate(args: &ValidateArgs) -> anyhow::Result<i32> {
    // Validate format
    if args.format != "pretty" && args.format != "json" {
        eprintln!("Error: invalid format {:?}, must be 'pretty' or 'json'", args.format);
        return Ok(EXIT_ERROR);
    }

    let config = match load_config(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    if !args.path.exists() {
        eprintln!("Error: cannot access path {:?}", args.path);
        return Ok(EXIT_ERROR);
    }

    let bundle = match validate::validate(&args.path, &config) {
        Ok(bundle) => bundle,
        Err(ValidationError::Timeout) => {
            eprintln!("Error: validation timed out after {}s", config.timeout_secs);
            return Ok(EXIT_ERROR);
        }
        Err(e) => return Err(e.into()),
    };

    let fail_on_warnings = !args.ignore_warnings;
    let path_str = args.path.to_string_lossy().to_string();
    match args.format.as_str() {
        "json" => report::write_json(&bundle, fail_on_warnings)?,
        _ => report::write_pretty(&path_str, &bundle, fail_on_warnings),
    }

    if bundle.failed(fail_on_warnings) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> ValidateArgs {
        let mut argv = vec!["xpilint", "validate", "addon.xpi"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Validate(args) => args,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.yaml");
        std::fs::write(&path, "timeout_secs: 5\n").unwrap();
        let path = path.to_string_lossy().to_string();

        let config = load_config(&args(&[
            "--config",
            &path,
            "--timeout",
            "9",
            "--type",
            "theme",
            "--for-firefox",
            "38.0a1:39.0a1",
            "--ignore-empty-name",
        ]))
        .unwrap();
        assert_eq!(config.timeout_secs, 9);
        assert_eq!(config.expected_type, Some(PackageType::Theme));
        assert!(config.overrides.ignore_empty_name);
        assert!(config.supported_versions().is_some());
    }

    #[test]
    fn test_bad_version_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.yaml");
        std::fs::write(&path, "{}\n").unwrap();
        let path = path.to_string_lossy().to_string();
        assert!(load_config(&args(&["--config", &path, "--for-firefox", "38"])).is_err());
    }
}

//! Output formatting for validation results.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: the structured report consumed by other tools

use colored::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::bundle::{
    Diagnostic, ErrorBundle, MessageTree, PackageType, Severity, SigningSummary, Summary,
};

// =============================================================================
// JSON Format
// =============================================================================

/// The full JSON report.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonReport {
    pub detected_type: PackageType,
    pub ending_tier: u8,
    pub success: bool,
    /// Errors, then warnings, then notices; each tagged with `type`.
    pub messages: Vec<Diagnostic>,
    pub errors: usize,
    pub warnings: usize,
    pub notices: usize,
    pub message_tree: MessageTree,
    pub compatibility_summary: Summary,
    pub signing_summary: SigningSummary,
    pub metadata: Map<String, Value>,
}

/// Build the report for a finished validation.
pub fn build_json(bundle: &ErrorBundle, fail_on_warnings: bool) -> JsonReport {
    JsonReport {
        detected_type: bundle.detected_type,
        ending_tier: bundle.ending_tier,
        success: !bundle.failed(fail_on_warnings),
        messages: bundle.messages().cloned().collect(),
        errors: bundle.errors.len(),
        warnings: bundle.warnings.len(),
        notices: bundle.notices.len(),
        message_tree: bundle.message_tree.clone(),
        compatibility_summary: bundle.compat_summary,
        signing_summary: bundle.signing_summary,
        metadata: bundle.metadata.clone(),
    }
}

/// Write results in JSON format.
pub fn write_json(bundle: &ErrorBundle, fail_on_warnings: bool) -> anyhow::Result<()> {
    let report = build_json(bundle, fail_on_warnings);
    let json = serde_json::to_string_pretty(&report)?;
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write results with colors for the terminal.
pub fn write_pretty(path: &str, bundle: &ErrorBundle, fail_on_warnings: bool) {
    // Header
    println!();
    print!("  ");
    print!("{}", "xpilint".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();

    print!("  {}", "Package: ".dimmed());
    println!("{}", path);
    print!("  {}", "Type:    ".dimmed());
    println!("{}", bundle.detected_type.as_str());
    println!();

    let messages: Vec<&Diagnostic> = bundle.messages().collect();
    if !messages.is_empty() {
        write_messages(&messages);
        println!();
    }

    let signing = &bundle.signing_summary;
    if signing.trivial + signing.low + signing.medium + signing.high > 0 {
        write_signing_summary(signing);
        println!();
    }

    write_final_status(bundle, fail_on_warnings);
    println!();
}

fn write_messages(messages: &[&Diagnostic]) {
    println!("  {} ({}):", "Messages".bold(), messages.len());
    println!();

    for d in messages {
        write_severity_tag(d.kind);
        print!("   ");
        print!("{:<40}", d.id_str().dimmed());
        if !d.file.is_empty() {
            print!("{}", d.file.join(" > ").blue());
            if let Some(line) = d.line {
                print!("{}", format!(":{}", line).dimmed());
            }
        }
        println!();

        println!("            {}", d.message);
        for line in &d.description {
            println!("            {}", line.dimmed());
        }
        if let Some(context) = d.context.as_ref().and_then(|c| c[1].as_ref()) {
            println!("            {}", format!("> {}", context.trim()).dimmed());
        }
        println!();
    }
}

fn write_severity_tag(severity: Severity) {
    match severity {
        Severity::Error => print!("    {} ", "ERROR ".red()),
        Severity::Warning => print!("    {} ", "WARN  ".yellow()),
        Severity::Notice => print!("    {} ", "NOTICE".blue()),
    }
}

fn write_signing_summary(signing: &SigningSummary) {
    println!("  {}", "Signing:".bold());
    println!(
        "    high {}  medium {}  low {}  trivial {}",
        signing.high.to_string().red(),
        signing.medium.to_string().yellow(),
        signing.low,
        signing.trivial.to_string().dimmed()
    );
}

fn write_final_status(bundle: &ErrorBundle, fail_on_warnings: bool) {
    print!(
        "  {}",
        format!(
            "{} errors, {} warnings, {} notices (tier {})",
            bundle.errors.len(),
            bundle.warnings.len(),
            bundle.notices.len(),
            bundle.ending_tier
        )
        .dimmed()
    );
    print!("  ");

    if bundle.failed(fail_on_warnings) {
        print!("{}", "FAILED".red());
    } else {
        print!("{}", "PASSED".green());
    }
    println!();
}

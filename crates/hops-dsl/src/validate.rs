//! Label rules and the directory validation report

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::automations::Automations;
use crate::diagnostics::Diagnostic;
use crate::error::DslError;
use crate::files::read_automation_dir;

/// Longest label accepted on a block
pub const MAX_LABEL_LEN: usize = 50;

pub const INVALID_LABEL_MESSAGE: &str =
    "Labels must be lowercase alphanumeric separated by underscores, max 50 characters";

/// Check a block label against `^[a-z\d][a-z\d]*(?:_[a-z\d]+)*$`, max 50 chars
pub fn validate_label(label: &str) -> Result<(), String> {
    let well_formed = !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && label.split('_').all(|word| {
            !word.is_empty()
                && word
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        });

    if well_formed {
        Ok(())
    } else {
        Err(INVALID_LABEL_MESSAGE.to_string())
    }
}

/// Outcome of validating an automations directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Diagnostics keyed by file, `""` for those not tied to a file
    pub diagnostics: BTreeMap<String, Vec<Diagnostic>>,
    pub file_count: usize,
    pub is_valid: bool,
    pub num_issues: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_error: Option<String>,
}

/// Load `root` and report every problem without failing
pub fn validate_dir(root: &Path) -> ValidationReport {
    let files = match read_automation_dir(root) {
        Ok(files) => files,
        Err(DslError::NoAutomations { .. }) => {
            return ValidationReport {
                read_error: Some(
                    "No automation directories found (or they're all empty)".to_string(),
                ),
                ..ValidationReport::default()
            }
        }
        Err(e) => {
            return ValidationReport {
                read_error: Some(e.to_string()),
                ..ValidationReport::default()
            }
        }
    };

    let file_count = files.len();
    let (_, diags) = Automations::from_files(files);

    let mut report = ValidationReport {
        file_count,
        is_valid: !diags.has_errors(),
        num_issues: diags.len(),
        ..ValidationReport::default()
    };
    for diag in diags {
        report
            .diagnostics
            .entry(diag.file.clone().unwrap_or_default())
            .or_default()
            .push(diag);
    }
    report
}

//
// diagnostics.rs
//
// Converts scan failures into positioned, document-scoped diagnostics.
// One diagnostic per failed scan call: only the error that aborted
// collection is surfaced. A successful scan publishes an empty list, which
// clears any previous diagnostics for the document.
//

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Url};

use crate::convert::{position_to_range, uri_to_relative};
use crate::index::ScanError;

pub const SOURCE: &str = "bilink";

pub fn scan_error_to_diagnostic(error: &ScanError, workspace_folders: &[Url]) -> Diagnostic {
    let message = match error {
        ScanError::DefNotFound { name, id, .. } => {
            let what = match (name, id) {
                (Some(name), _) => format!("name=`{}`", name),
                (None, Some(id)) => format!("id=`{}`", id),
                (None, None) => String::from("unknown"),
            };
            format!("Definition not found: {}", what)
        }
        ScanError::DuplicateId {
            id,
            first_uri,
            first_position,
            ..
        } => format!(
            "Duplicate definition id: `{}`, first defined at {} {}:{}",
            id,
            uri_to_relative(first_uri, workspace_folders),
            first_position.line,
            first_position.column
        ),
        ScanError::DuplicateName {
            name,
            first_uri,
            first_position,
            ..
        } => format!(
            "Duplicate definition name: `{}`, first defined at {} {}:{}",
            name,
            uri_to_relative(first_uri, workspace_folders),
            first_position.line,
            first_position.column
        ),
    };

    Diagnostic {
        range: position_to_range(error.position()),
        severity: Some(DiagnosticSeverity::ERROR),
        message,
        source: Some(SOURCE.to_string()),
        ..Default::default()
    }
}

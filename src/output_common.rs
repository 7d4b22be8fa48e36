//! Shared output formatting utilities for all response types.

use crate::error::IndexError;
use crate::output::{OccurrenceMatch, OutputFormat};
use serde::Serialize;

/// Render any serializable response as JSON with partial result wrapper
pub fn render_json_response<T: Serialize>(
    data: &T,
    partial: bool,
    format: OutputFormat,
) -> Result<String, IndexError> {
    use crate::output::json_response_with_partial;

    let payload = json_response_with_partial(data, partial);
    let rendered = if matches!(format, OutputFormat::Pretty) {
        serde_json::to_string_pretty(&payload)
    } else {
        serde_json::to_string(&payload)
    }?;
    Ok(rendered)
}

/// Format the "total: N" header for human-readable output
pub fn format_total_header(total: u64) -> String {
    format!("total: {}", total)
}

/// Format the "partial: true" footer for human-readable output
pub fn format_partial_footer() -> &'static str {
    "partial: true"
}

/// Check if format is JSON (either Json or Pretty)
pub fn is_json_format(format: OutputFormat) -> bool {
    matches!(format, OutputFormat::Json | OutputFormat::Pretty)
}

/// One human-readable line per occurrence, relations indented below it.
pub fn format_occurrence_lines(occurrence: &OccurrenceMatch) -> Vec<String> {
    let roles = if occurrence.roles.is_empty() {
        "-".to_string()
    } else {
        occurrence.roles.join(",")
    };
    let system = if occurrence.is_system { " [system]" } else { "" };
    let mut lines = vec![format!(
        "{}:{}:{} {} {} [{}] {}{}",
        occurrence.path,
        occurrence.line,
        occurrence.column,
        occurrence.kind,
        occurrence.name,
        roles,
        occurrence.usr,
        system
    )];
    for relation in &occurrence.relations {
        lines.push(format!(
            "  {} {} {}",
            relation.roles.join(","),
            relation.name,
            relation.usr
        ));
    }
    lines
}

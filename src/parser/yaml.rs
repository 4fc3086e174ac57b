use super::types::{SuiteDefinition, SuiteFile};
use crate::scoring::TracePoint;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse a YAML suite file into a validated SuiteDefinition
pub fn parse_suite_file(path: &Path) -> Result<SuiteDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    parse_suite_content(&content, path)
}

/// Parse YAML content into a SuiteDefinition
pub fn parse_suite_content(content: &str, source_path: &Path) -> Result<SuiteDefinition> {
    let file: SuiteFile = serde_yaml::from_str(content)
        .with_context(|| format!("Invalid suite file: {}", source_path.display()))?;

    // Fall back to the file stem when the suite has no explicit name
    let name = file.name.unwrap_or_else(|| {
        source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("suite")
            .to_string()
    });

    Ok(SuiteDefinition::new(&name, file.steps)?)
}

/// Load a recorded trace: a JSON array of `{x, y, timestampMs}`
pub fn parse_trace_file(path: &Path) -> Result<Vec<TracePoint>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid trace file: {}", path.display()))
}

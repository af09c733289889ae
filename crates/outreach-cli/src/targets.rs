//! Target list loading
//!
//! Accepts either a JSON array of target records or one record per line
//! (JSON Lines). Field names may be snake_case or camelCase.

use anyhow::{Context, Result};
use outreach_core::Target;
use std::path::Path;

pub fn load_targets(path: &Path) -> Result<Vec<Target>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read targets from {}", path.display()))?;
    parse_targets(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_targets(content: &str) -> Result<Vec<Target>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", number + 1))
        })
        .collect()
}

//! Roll-number CSV ingestion and JSON checkpoint files.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Roll numbers from a header-less CSV: first column of each row, with stray
/// quotes and commas stripped.
pub fn parse_roll_numbers<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rolls = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("Row {}: {}", i + 1, e);
                continue;
            }
        };
        let Some(first) = record.get(0) else { continue };

        let roll = first.trim().trim_matches('"').trim_matches(',');
        if !roll.is_empty() {
            rolls.push(roll.to_string());
        }
    }
    Ok(rolls)
}

pub fn load_roll_numbers(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open roll numbers {:?}", path))?;
    let rolls = parse_roll_numbers(file).with_context(|| format!("Bad CSV {:?}", path))?;
    info!("{} roll numbers loaded from {:?}", rolls.len(), path);
    Ok(rolls)
}

pub fn listing_urls(prefix: &str, rolls: &[String]) -> Vec<String> {
    if prefix.is_empty() {
        warn!("Listing URL prefix not configured; no URLs generated");
        return vec![];
    }
    rolls.iter().map(|roll| format!("{}{}", prefix, roll)).collect()
}

// ── Checkpoints ───────────────────────────────────────────────────────────────

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {:?}", path))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let raw = serde_json::to_string_pretty(value)?;
    std::fs::write(path, raw).with_context(|| format!("Failed to write {:?}", path))?;
    debug!("Wrote {:?}", path);
    Ok(())
}

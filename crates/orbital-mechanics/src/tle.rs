//! Two-line element catalog ingestion
//!
//! Catalogs are plain text, three lines per satellite (name, line 1, line 2).
//! Blank lines and `#` comments are ignored; anything that does not form a
//! valid triplet is skipped one line at a time until the parser resyncs.

use crate::{OrbitalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoLineElement {
    pub name: String,
    pub line1: String,
    pub line2: String,
}

impl TwoLineElement {
    /// NORAD catalog number (columns 3-7 of line 1)
    pub fn norad_id(&self) -> Option<u32> {
        self.line1.get(2..7)?.trim().parse().ok()
    }

    /// Mean motion in revolutions per day (columns 53-63 of line 2)
    pub fn mean_motion_rev_per_day(&self) -> Option<f64> {
        self.line2
            .get(52..63)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| *n > 0.0)
    }

    /// Orbital period in minutes
    pub fn orbital_period_minutes(&self) -> Option<f64> {
        self.mean_motion_rev_per_day().map(|n| 1440.0 / n)
    }
}

fn is_line1(line: &str) -> bool {
    line.starts_with("1 ")
}

fn is_line2(line: &str) -> bool {
    line.starts_with("2 ")
}

/// Parse a TLE catalog, skipping malformed triplets
pub fn parse_catalog(text: &str) -> Vec<TwoLineElement> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();

    let mut records = Vec::new();
    let mut skipped = 0usize;
    let mut i = 0;

    while i + 2 < lines.len() {
        let (name, line1, line2) = (lines[i], lines[i + 1], lines[i + 2]);
        if is_line1(line1) && is_line2(line2) {
            records.push(TwoLineElement {
                name: name.to_string(),
                line1: line1.to_string(),
                line2: line2.to_string(),
            });
            i += 3;
        } else {
            skipped += 1;
            i += 1;
        }
    }

    if skipped > 0 {
        debug!("Skipped {} lines while resyncing TLE triplets", skipped);
    }

    records
}

/// Load a TLE catalog from disk
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<TwoLineElement>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| OrbitalError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let records = parse_catalog(&text);
    info!("Loaded {} TLE records from {:?}", records.len(), path);

    Ok(records)
}

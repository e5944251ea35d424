use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::models::VisitedRecord;

const URL_COLUMN: &str = "url";

/// Append-only CSV of every posting url ever surfaced (`url,date`).
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every recorded url. A missing or unreadable store is an empty set.
    pub fn load(&self) -> HashSet<String> {
        if !self.path.exists() {
            debug!("Ledger {} does not exist yet", self.path.display());
            return HashSet::new();
        }

        match self.read_urls() {
            Ok(urls) => {
                debug!("Loaded {} visited urls from {}", urls.len(), self.path.display());
                urls
            }
            Err(e) => {
                warn!("Ignoring unreadable ledger {}: {:#}", self.path.display(), e);
                HashSet::new()
            }
        }
    }

    fn read_urls(&self) -> Result<HashSet<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        // Stores written by other tools may name the column differently; the url is then first.
        let column = reader
            .headers()?
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(URL_COLUMN))
            .unwrap_or(0);

        let mut urls = HashSet::new();
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping malformed ledger row: {}", e);
                    continue;
                }
            };
            if let Some(url) = row.get(column).map(str::trim).filter(|u| !u.is_empty()) {
                urls.insert(url.to_string());
            }
        }
        Ok(urls)
    }

    /// Append records, creating the store with a header on first write.
    pub fn append(&self, records: &[VisitedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // An empty file (touched, or a crash before the first write) still needs its header.
        let write_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open ledger {}", self.path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write ledger {}", self.path.display()))?;

        debug!("Appended {} urls to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Today's date in ledger format.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

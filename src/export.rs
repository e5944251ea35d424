use anyhow::{Context, Result};
use log::info;
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

use crate::models::JobApplicationRecord;

pub const COLUMNS: [&str; 7] = [
    "Job Title",
    "Company",
    "URL",
    "Summary",
    "Category",
    "Tech Stack",
    "Cover Letter",
];

const COLUMN_WIDTHS: [f64; 7] = [35.0, 25.0, 50.0, 40.0, 20.0, 35.0, 80.0];

/// Write one row per record. A `.csv` path gets CSV, anything else an Excel workbook.
pub fn export(records: &[JobApplicationRecord], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        write_csv(records, path)?;
    } else {
        write_xlsx(records, path)?;
    }

    info!("Saved {} rows to {}", records.len(), path.display());
    Ok(())
}

fn write_csv(records: &[JobApplicationRecord], path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(records: &[JobApplicationRecord], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (col, (name, width)) in COLUMNS.iter().zip(COLUMN_WIDTHS).enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, *name, &header)?;
        worksheet.set_column_width(col, width)?;
    }

    for (i, record) in records.iter().enumerate() {
        let row = (i + 1) as u32;
        let cells = [
            &record.title,
            &record.company,
            &record.url,
            &record.summary,
            &record.category,
            &record.tech_stack,
            &record.cover_letter,
        ];
        for (col, value) in cells.into_iter().enumerate() {
            worksheet.write_string(row, col as u16, value.as_str())?;
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to save workbook to {}", path.display()))?;
    Ok(())
}

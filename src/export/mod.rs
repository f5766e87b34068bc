//! Export of comparison reports and the variable catalog.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::compare::ComparisonReport;
use crate::db::VariableCatalogEntry;
use crate::error::{Error, Result};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// Pick a format from the output path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Ok(ExportFormat::Json),
            Some("csv") => Ok(ExportFormat::Csv),
            other => Err(Error::unsupported(
                other.unwrap_or("").to_string(),
                "export",
            )),
        }
    }
}

pub fn export_report(
    report: &ComparisonReport,
    output_path: &Path,
    format: ExportFormat,
) -> Result<()> {
    match format {
        ExportFormat::Json => write_json(report, output_path),
        ExportFormat::Csv => report_csv(report, output_path),
    }
}

pub fn export_catalog(
    entries: &[VariableCatalogEntry],
    output_path: &Path,
    format: ExportFormat,
) -> Result<()> {
    match format {
        ExportFormat::Json => write_json(&entries, output_path),
        ExportFormat::Csv => catalog_csv(entries, output_path),
    }
}

fn write_json<T: serde::Serialize>(value: &T, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::render(format!("serializing export: {e}")))?;
    let mut file = File::create(output_path)
        .map_err(|e| Error::io(format!("creating {}", output_path.display()), e))?;
    file.write_all(json.as_bytes())
        .map_err(|e| Error::io(format!("writing {}", output_path.display()), e))?;
    Ok(())
}

fn report_csv(report: &ComparisonReport, output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .map_err(|e| Error::render(format!("creating {}: {e}", output_path.display())))?;
    let io_err = |e: csv::Error| Error::render(format!("writing {}: {e}", output_path.display()));

    writer
        .write_record(["section", "identifier", "kind", "score", "pass"])
        .map_err(io_err)?;
    for page in &report.pages {
        writer
            .write_record([
                "page",
                &page.page_number.to_string(),
                page.kind.as_str(),
                &format!("{:.1}", page.score),
                &page.pass.to_string(),
            ])
            .map_err(io_err)?;
    }
    for variable in &report.variables {
        writer
            .write_record([
                "variable",
                &variable.variable_name,
                "",
                &format!("{:.1}", variable.score),
                &variable.pass.to_string(),
            ])
            .map_err(io_err)?;
    }
    for page in &report.missing_pages {
        writer
            .write_record(["missing_page", &page.to_string(), "", "", ""])
            .map_err(io_err)?;
    }
    writer.flush().map_err(|e| {
        Error::io(format!("flushing {}", output_path.display()), e)
    })?;
    Ok(())
}

fn catalog_csv(entries: &[VariableCatalogEntry], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .map_err(|e| Error::render(format!("creating {}: {e}", output_path.display())))?;
    let io_err = |e: csv::Error| Error::render(format!("writing {}: {e}", output_path.display()));

    writer
        .write_record(["variable_name", "variable_kind", "usage_count", "sample_values"])
        .map_err(io_err)?;
    for entry in entries {
        writer
            .write_record([
                entry.variable_name.as_str(),
                entry.variable_kind.as_str(),
                &entry.usage_count.to_string(),
                &entry.sample_values.join("; "),
            ])
            .map_err(io_err)?;
    }
    writer.flush().map_err(|e| {
        Error::io(format!("flushing {}", output_path.display()), e)
    })?;
    Ok(())
}

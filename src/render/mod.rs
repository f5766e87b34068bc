//! Document rendering: placeholder substitution and coordinate overlay.

pub mod overlay;
pub mod placeholder;
pub mod rasterize;

use chrono::Local;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::RenderConfig;
use crate::db::{Annotation, FileKind};
use crate::error::{Error, Result};
use overlay::{plan_overlays, PlacedText};
use placeholder::{substitute, DocxTree, XlsxTree};

/// Result of one render invocation: where the output landed plus
/// best-effort diagnostics.
#[derive(Debug, Clone, Default)]
pub struct RenderOutcome {
    pub output_path: PathBuf,
    /// Token occurrences replaced (Mode A) or values drawn (Mode B).
    pub substitutions: usize,
    /// Token names with no supplied value, left verbatim in the output.
    pub unresolved: Vec<String>,
    /// Non-fatal problems encountered along the way.
    pub warnings: Vec<String>,
}

/// Stateless rendering engine; safe to share across threads for distinct
/// outputs since it only reads its inputs.
pub struct Renderer<'a> {
    config: &'a RenderConfig,
    dpi: u32,
}

impl<'a> Renderer<'a> {
    pub fn new(config: &'a RenderConfig, dpi: u32) -> Self {
        Self { config, dpi }
    }

    /// Mode A: placeholder substitution through the format's tree adapter.
    pub fn render_placeholders(
        &self,
        artifact: &Path,
        values: &BTreeMap<String, String>,
        output_dir: &Path,
    ) -> Result<RenderOutcome> {
        if !artifact.exists() {
            return Err(Error::missing(artifact));
        }
        let kind = require_kind(artifact, "placeholder rendering")?;
        let output_path = unique_output_path(artifact, output_dir)?;

        let stats = match kind {
            FileKind::Docx => {
                let mut tree = DocxTree::load(artifact)?;
                let stats = substitute(&mut tree, values);
                tree.save(&output_path)?;
                stats
            }
            FileKind::Xlsx => {
                let mut tree = XlsxTree::load(artifact)?;
                let stats = substitute(&mut tree, values);
                tree.save(&output_path)?;
                stats
            }
            other => {
                return Err(Error::unsupported(
                    other.as_str(),
                    "placeholder rendering",
                ))
            }
        };

        tracing::info!(
            artifact = %artifact.display(),
            output = %output_path.display(),
            replaced = stats.replaced,
            unresolved = stats.unresolved.len(),
            "rendered placeholders"
        );
        Ok(RenderOutcome {
            output_path,
            substitutions: stats.replaced,
            unresolved: stats.unresolved.into_iter().collect(),
            warnings: Vec::new(),
        })
    }

    /// Mode B: coordinate overlay over a PDF artifact.
    pub fn render_pdf_overlay(
        &self,
        artifact: &Path,
        annotations: &[Annotation],
        values: &BTreeMap<String, String>,
        output_dir: &Path,
    ) -> Result<RenderOutcome> {
        let placements = plan_overlays(annotations, values);
        let output_path = unique_output_path(artifact, output_dir)?;
        let warnings =
            overlay::overlay_pdf(artifact, &placements, self.config, self.dpi, &output_path)?;
        tracing::info!(
            artifact = %artifact.display(),
            output = %output_path.display(),
            placed = placements.len(),
            "rendered pdf overlay"
        );
        Ok(RenderOutcome {
            output_path,
            substitutions: placements.len(),
            unresolved: Vec::new(),
            warnings,
        })
    }

    /// Mode B fallback: coordinate overlay over one page image.
    pub fn render_raster_overlay(
        &self,
        page_image: &Path,
        page_number: u32,
        annotations: &[Annotation],
        values: &BTreeMap<String, String>,
        output_dir: &Path,
    ) -> Result<RenderOutcome> {
        let placements: Vec<PlacedText> = plan_overlays(annotations, values)
            .into_iter()
            .filter(|p| p.page_number == page_number)
            .collect();
        let output_path = unique_output_path(page_image, output_dir)?;
        let warnings =
            overlay::overlay_raster(page_image, &placements, self.config, &output_path)?;
        Ok(RenderOutcome {
            output_path,
            substitutions: placements.len(),
            unresolved: Vec::new(),
            warnings,
        })
    }
}

fn require_kind(artifact: &Path, operation: &'static str) -> Result<FileKind> {
    FileKind::from_path(artifact).ok_or_else(|| {
        let ext = artifact
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        Error::unsupported(ext, operation)
    })
}

/// `<basename>_<timestamp>.<ext>` under the output directory. A global
/// sequence number keeps two renders within the same second apart.
fn unique_output_path(artifact: &Path, output_dir: &Path) -> Result<PathBuf> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    std::fs::create_dir_all(output_dir)
        .map_err(|e| Error::io(format!("creating {}", output_dir.display()), e))?;

    let base = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let extension = artifact
        .extension()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);

    let filename = if extension.is_empty() {
        format!("{base}_{timestamp}_{seq}")
    } else {
        format!("{base}_{timestamp}_{seq}.{extension}")
    };
    Ok(output_dir.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use docx_rs::{Docx, Paragraph, Run};

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn output_names_are_unique_per_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = Path::new("contract.docx");
        let first = unique_output_path(artifact, dir.path()).unwrap();
        let second = unique_output_path(artifact, dir.path()).unwrap();
        assert_ne!(first, second);
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("contract_"));
        assert!(first.to_string_lossy().ends_with(".docx"));
    }

    #[test]
    fn unknown_extension_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.csv");
        std::fs::write(&source, b"a,b").unwrap();
        let config = RenderConfig::default();
        let renderer = Renderer::new(&config, 200);
        let err = renderer
            .render_placeholders(&source, &BTreeMap::new(), dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn missing_artifact_is_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig::default();
        let renderer = Renderer::new(&config, 200);
        let err = renderer
            .render_placeholders(Path::new("/nonexistent/contract.docx"), &BTreeMap::new(), dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::SourceMissing { .. }));
    }

    #[test]
    fn docx_round_trip_replaces_tokens_and_keeps_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("contract.docx");
        let file = std::fs::File::create(&source).unwrap();
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("姓名：{{name}}")))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("備註：{{note}}")))
            .build()
            .pack(file)
            .unwrap();

        let config = RenderConfig::default();
        let renderer = Renderer::new(&config, 200);
        let outcome = renderer
            .render_placeholders(&source, &values(&[("name", "王小明")]), dir.path())
            .unwrap();

        assert_eq!(outcome.substitutions, 1);
        assert_eq!(outcome.unresolved, vec!["note".to_string()]);
        assert!(outcome.output_path.exists());

        let mut reread = placeholder::DocxTree::load(&outcome.output_path).unwrap();
        let mut texts = Vec::new();
        use crate::render::placeholder::TextNodes;
        reread.for_each_text(&mut |t| texts.push(t.clone()));
        let joined = texts.join("\n");
        assert!(joined.contains("姓名：王小明"));
        assert!(!joined.contains("{{name}}"));
        assert!(joined.contains("{{note}}"));
    }

    #[test]
    fn xlsx_round_trip_replaces_cell_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sheet.xlsx");
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut((1, 1)).set_value("租金 {{rent}} 元，押金 {{rent}} 元");
        umya_spreadsheet::writer::xlsx::write(&book, &source).unwrap();

        let config = RenderConfig::default();
        let renderer = Renderer::new(&config, 200);
        let outcome = renderer
            .render_placeholders(&source, &values(&[("rent", "15000")]), dir.path())
            .unwrap();

        assert_eq!(outcome.substitutions, 2);
        let book = umya_spreadsheet::reader::xlsx::read(&outcome.output_path).unwrap();
        let sheet = book.get_sheet(&0).unwrap();
        assert_eq!(sheet.get_value((1, 1)), "租金 15000 元，押金 15000 元");
    }
}

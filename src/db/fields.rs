//! Types for spreadsheet-driven field groups and their template files.

use serde::{Deserialize, Serialize};

/// Best-effort input-widget hint inferred from a field's row. Not persisted
/// as ground truth; the declared description always wins in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Phone,
    Date,
    Email,
}

/// A named input slot driving placeholder substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub default_value: String,
    pub description: String,
    /// Ordered, possibly empty. Duplicates are kept.
    pub dropdown_options: Vec<String>,
    pub sort_order: u32,
    #[serde(default)]
    pub inferred_kind: FieldKind,
}

/// A named set of field definitions parsed from one spreadsheet.
#[derive(Debug, Clone)]
pub struct FieldGroup {
    pub id: i64,
    pub name: String,
    pub source_sheet_path: String,
    pub created_at: String,
    pub file_count: u32,
}

/// Recognized artifact formats for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Docx,
    Xlsx,
    Pdf,
    /// Raster page image, the fallback artifact for annotated templates.
    Raster,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Docx => "docx",
            FileKind::Xlsx => "xlsx",
            FileKind::Pdf => "pdf",
            FileKind::Raster => "raster",
        }
    }

    /// Classify by file extension; `None` for anything unhandled.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "docx" | "doc" => Some(FileKind::Docx),
            "xlsx" | "xls" => Some(FileKind::Xlsx),
            "pdf" => Some(FileKind::Pdf),
            "png" | "jpg" | "jpeg" => Some(FileKind::Raster),
            _ => None,
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// One stored format variant of a logical template.
#[derive(Debug, Clone)]
pub struct TemplateFile {
    pub id: i64,
    pub group_id: i64,
    pub filename: String,
    pub filepath: String,
    pub file_type: String,
    pub file_size: u64,
    pub sha256: Option<String>,
    pub created_at: String,
}

/// A named reference document registered for comparison.
#[derive(Debug, Clone)]
pub struct ComparisonTemplate {
    pub id: i64,
    pub name: String,
    pub filename: String,
    pub filepath: String,
    pub file_type: String,
    pub file_size: u64,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_kind_from_extension() {
        assert_eq!(FileKind::from_extension("docx"), Some(FileKind::Docx));
        assert_eq!(FileKind::from_extension("DOC"), Some(FileKind::Docx));
        assert_eq!(FileKind::from_extension("xlsx"), Some(FileKind::Xlsx));
        assert_eq!(FileKind::from_extension("pdf"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_extension("jpeg"), Some(FileKind::Raster));
        assert_eq!(FileKind::from_extension("csv"), None);
    }
}

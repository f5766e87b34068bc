//! Spreadsheet-driven field definitions.
//!
//! A field specification is a three-column table: field name, sample/default
//! value, free-text description. The description doubles as the place where
//! operators ask for dropdown widgets, so parsing runs the heuristic rule
//! tables in [`rules`] over every row.

pub mod rules;

use std::path::Path;

use crate::db::{Database, FieldDefinition, FieldGroup, FileKind, NewTemplateFile, TemplateFile};
use crate::error::{Error, Result};
use crate::storage;
use rules::{extract_dropdown_options, infer_field_kind, FieldFacts};

/// Parse a tabular field specification. Column 0 is the field name (rows
/// with a blank name are skipped), column 1 the default value, column 2 the
/// description. Deterministic: identical input yields an identical list.
pub fn parse_rows(rows: &[Vec<String>]) -> Vec<FieldDefinition> {
    let mut fields = Vec::new();
    for row in rows {
        let name = row.first().map(|s| s.trim()).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        let value = row.get(1).map(|s| s.trim()).unwrap_or("");
        let description = row.get(2).map(|s| s.trim()).unwrap_or("");

        let facts = FieldFacts {
            name,
            value,
            description,
        };
        fields.push(FieldDefinition {
            name: name.to_string(),
            default_value: value.to_string(),
            description: description.to_string(),
            dropdown_options: extract_dropdown_options(description),
            sort_order: fields.len() as u32,
            inferred_kind: infer_field_kind(&facts),
        });
    }
    fields
}

/// Load the first worksheet of an .xlsx spreadsheet into the row model and
/// parse it.
pub fn parse_xlsx(path: &Path) -> Result<Vec<FieldDefinition>> {
    match FileKind::from_path(path) {
        Some(FileKind::Xlsx) => {}
        _ => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string();
            return Err(Error::unsupported(ext, "field parsing"));
        }
    }
    if !path.exists() {
        return Err(Error::missing(path));
    }

    let book = umya_spreadsheet::reader::xlsx::read(path)
        .map_err(|e| Error::input(format!("could not read spreadsheet: {e}")))?;
    let sheet = book
        .get_sheet(&0)
        .ok_or_else(|| Error::input("spreadsheet has no worksheets"))?;

    let (max_col, max_row) = sheet.get_highest_column_and_row();
    let mut rows = Vec::with_capacity(max_row as usize);
    for row in 1..=max_row {
        let mut cells = Vec::new();
        for col in 1..=max_col.min(3) {
            cells.push(sheet.get_value((col, row)));
        }
        rows.push(cells);
    }
    Ok(parse_rows(&rows))
}

/// Group persistence plus the on-disk lifecycle of member template files.
pub struct FieldService<'a> {
    db: &'a Database,
}

impl<'a> FieldService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Describe an existing artifact for registration with a group.
    pub fn register_file(&self, path: &Path) -> Result<NewTemplateFile> {
        if !path.exists() {
            return Err(Error::missing(path));
        }
        let kind = FileKind::from_path(path).ok_or_else(|| {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string();
            Error::unsupported(ext, "template registration")
        })?;
        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::io(format!("inspecting {}", path.display()), e))?;
        Ok(NewTemplateFile {
            filename: path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            filepath: path.to_string_lossy().to_string(),
            file_type: kind.as_str().to_string(),
            file_size: metadata.len(),
            sha256: storage::sha256_hex(path).ok(),
        })
    }

    pub fn create_group(
        &self,
        name: &str,
        sheet_path: &Path,
        fields: &[FieldDefinition],
        files: &[NewTemplateFile],
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(Error::input("group name is required"));
        }
        if fields.is_empty() {
            return Err(Error::input("no fields could be parsed from the spreadsheet"));
        }
        let group_id = self.db.insert_field_group(
            name,
            &sheet_path.to_string_lossy(),
            fields,
            files,
        )?;
        tracing::info!(group_id, name, files = files.len(), "created field group");
        Ok(group_id)
    }

    pub fn list_groups(&self) -> Result<Vec<FieldGroup>> {
        self.db.list_field_groups()
    }

    pub fn definitions(&self, group_id: i64) -> Result<Vec<FieldDefinition>> {
        self.db.field_definitions(group_id)
    }

    pub fn replace_definitions(&self, group_id: i64, fields: &[FieldDefinition]) -> Result<()> {
        self.db.replace_field_definitions(group_id, fields)
    }

    pub fn files(&self, group_id: i64) -> Result<Vec<TemplateFile>> {
        self.db.template_files(group_id)
    }

    /// Delete one template file: the stored artifact first, then the row.
    pub fn delete_file(&self, file_id: i64) -> Result<()> {
        if let Some(file) = self.db.get_template_file(file_id)? {
            let path = Path::new(&file.filepath);
            if path.exists() {
                std::fs::remove_file(path)
                    .map_err(|e| Error::io(format!("removing {}", file.filepath), e))?;
            }
            self.db.delete_template_file(file_id)?;
        }
        Ok(())
    }

    /// Delete a whole group, its definitions and every stored artifact.
    pub fn delete_group(&self, group_id: i64) -> Result<()> {
        for file in self.db.template_files(group_id)? {
            let path = Path::new(&file.filepath);
            if path.exists() {
                std::fs::remove_file(path)
                    .map_err(|e| Error::io(format!("removing {}", file.filepath), e))?;
            }
        }
        self.db.delete_field_group(group_id)?;
        tracing::info!(group_id, "deleted field group");
        Ok(())
    }
}

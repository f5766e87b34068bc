//! SQLite backend implementation.
//!
//! Every mutation that touches more than one table (annotation rows plus the
//! derived variable catalog, group creation, definition replacement) runs
//! inside a single transaction so a crash mid-operation cannot leave the
//! catalog counts out of sync with the annotation rows.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use super::annotations::{
    Annotation, BoundingBox, PageInfo, PageKind, PageKindCounts, Template, VariableCatalogEntry,
    VariableKind,
};
use super::fields::{ComparisonTemplate, FieldDefinition, FieldGroup, TemplateFile};
use super::schema::{MIGRATIONS, SCHEMA};
use crate::error::{Error, Result};

/// Payload for registering a stored template file with a group.
#[derive(Debug, Clone)]
pub struct NewTemplateFile {
    pub filename: String,
    pub filepath: String,
    pub file_type: String,
    pub file_size: u64,
    pub sha256: Option<String>,
}

pub struct SqliteDb {
    pub(crate) conn: Connection,
}

fn persist(context: impl Into<String>, source: rusqlite::Error) -> Error {
    Error::Persistence {
        context: context.into(),
        source,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        let conn = Connection::open(path).map_err(|e| persist("opening database", e))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| persist("enabling foreign keys", e))?;
        Ok(Self { conn })
    }

    /// In-memory database for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| persist("opening database", e))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| persist("enabling foreign keys", e))?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(|e| persist("creating schema", e))?;
        for migration in MIGRATIONS {
            // Columns may already exist; migrations are best-effort.
            let _ = self.conn.execute(migration, []);
        }
        Ok(())
    }

    // ========================================================================
    // Templates
    // ========================================================================

    pub fn insert_template(&self, name: &str, description: &str, total_pages: u32) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO templates (name, description, total_pages, updated_at)
                 VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
                params![name, description, total_pages],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::input(format!("a template named '{name}' already exists"))
                } else {
                    persist(format!("inserting template '{name}'"), e)
                }
            })?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_template(&self, template_id: i64) -> Result<Option<Template>> {
        self.conn
            .query_row(
                "SELECT id, name, description, total_pages, created_at, updated_at
                 FROM templates WHERE id = ?",
                [template_id],
                row_to_template,
            )
            .optional()
            .map_err(|e| persist(format!("loading template {template_id}"), e))
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, description, total_pages, created_at, updated_at
                 FROM templates ORDER BY updated_at DESC",
            )
            .map_err(|e| persist("listing templates", e))?;
        let rows = stmt
            .query_map([], row_to_template)
            .map_err(|e| persist("listing templates", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| persist("listing templates", e))?;
        Ok(rows)
    }

    pub fn touch_template(&self, template_id: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE templates SET updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                [template_id],
            )
            .map_err(|e| persist(format!("touching template {template_id}"), e))?;
        Ok(())
    }

    /// Remove a template row. Pages and annotations go with it via the
    /// foreign-key cascade; catalog counts for its annotations are
    /// decremented first so the derived table stays consistent.
    pub fn delete_template(&self, template_id: i64) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| persist(format!("deleting template {template_id}"), e))?;
        {
            let mut stmt = tx
                .prepare("SELECT variable_name FROM annotations WHERE template_id = ?")
                .map_err(|e| persist(format!("deleting template {template_id}"), e))?;
            let names = stmt
                .query_map([template_id], |row| row.get::<_, String>(0))
                .map_err(|e| persist(format!("deleting template {template_id}"), e))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| persist(format!("deleting template {template_id}"), e))?;
            for name in names {
                decrement_catalog(&tx, &name)
                    .map_err(|e| persist(format!("deleting template {template_id}"), e))?;
            }
        }
        tx.execute("DELETE FROM templates WHERE id = ?", [template_id])
            .map_err(|e| persist(format!("deleting template {template_id}"), e))?;
        tx.commit()
            .map_err(|e| persist(format!("deleting template {template_id}"), e))?;
        Ok(())
    }

    // ========================================================================
    // Page classification
    // ========================================================================

    pub fn set_page_kind(
        &self,
        template_id: i64,
        page_number: u32,
        kind: PageKind,
        note: &str,
    ) -> Result<()> {
        // Notes only make sense on reference pages.
        let note = match kind {
            PageKind::Variable => "",
            PageKind::Reference => note,
        };
        let context = format!("setting page kind for template {template_id} page {page_number}");
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| persist(context.clone(), e))?;
        tx.execute(
            "INSERT INTO page_kinds (template_id, page_number, page_kind, note, updated_at)
             VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(template_id, page_number) DO UPDATE SET
                 page_kind = excluded.page_kind,
                 note = excluded.note,
                 updated_at = CURRENT_TIMESTAMP",
            params![template_id, page_number, kind.as_str(), note],
        )
        .map_err(|e| persist(context.clone(), e))?;
        tx.execute(
            "UPDATE templates SET updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            [template_id],
        )
        .map_err(|e| persist(context.clone(), e))?;
        tx.commit().map_err(|e| persist(context.clone(), e))?;
        Ok(())
    }

    pub fn get_page_info(&self, template_id: i64, page_number: u32) -> Result<PageInfo> {
        let info = self
            .conn
            .query_row(
                "SELECT page_kind, note FROM page_kinds
                 WHERE template_id = ? AND page_number = ?",
                params![template_id, page_number],
                |row| {
                    Ok(PageInfo {
                        kind: PageKind::parse(&row.get::<_, String>(0)?),
                        note: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| {
                persist(
                    format!("loading page info for template {template_id} page {page_number}"),
                    e,
                )
            })?;
        Ok(info.unwrap_or_default())
    }

    pub fn page_kind_counts(&self, template_id: i64, total_pages: u32) -> Result<PageKindCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT page_kind FROM page_kinds WHERE template_id = ?")
            .map_err(|e| persist(format!("counting page kinds for template {template_id}"), e))?;
        let mut counts = PageKindCounts::default();
        let kinds = stmt
            .query_map([template_id], |row| row.get::<_, String>(0))
            .map_err(|e| persist(format!("counting page kinds for template {template_id}"), e))?;
        let mut classified = 0u32;
        for kind in kinds {
            let kind =
                kind.map_err(|e| persist(format!("counting page kinds for template {template_id}"), e))?;
            classified += 1;
            match PageKind::parse(&kind) {
                PageKind::Variable => counts.variable += 1,
                PageKind::Reference => counts.reference += 1,
            }
        }
        counts.undefined = total_pages.saturating_sub(classified);
        Ok(counts)
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    pub fn insert_annotation(
        &self,
        template_id: i64,
        page_number: u32,
        variable_name: &str,
        variable_kind: VariableKind,
        bbox: BoundingBox,
        sample_value: &str,
    ) -> Result<i64> {
        let context = format!("creating annotation on template {template_id} page {page_number}");
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| persist(context.clone(), e))?;
        tx.execute(
            "INSERT INTO annotations
                 (template_id, page_number, variable_name, variable_kind,
                  x_start, y_start, x_end, y_end, sample_value)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                template_id,
                page_number,
                variable_name,
                variable_kind.as_str(),
                bbox.x_start,
                bbox.y_start,
                bbox.x_end,
                bbox.y_end,
                sample_value
            ],
        )
        .map_err(|e| persist(context.clone(), e))?;
        let id = tx.last_insert_rowid();
        upsert_catalog(&tx, variable_name, variable_kind, sample_value, true)
            .map_err(|e| persist(context.clone(), e))?;
        tx.commit().map_err(|e| persist(context.clone(), e))?;
        Ok(id)
    }

    pub fn get_annotation(&self, annotation_id: i64) -> Result<Option<Annotation>> {
        self.conn
            .query_row(
                "SELECT id, template_id, page_number, variable_name, variable_kind,
                        x_start, y_start, x_end, y_end, sample_value, created_at
                 FROM annotations WHERE id = ?",
                [annotation_id],
                row_to_annotation,
            )
            .optional()
            .map_err(|e| persist(format!("loading annotation {annotation_id}"), e))
    }

    /// Update an annotation in place. Renaming moves one usage count from
    /// the old catalog entry to the new one; a same-name update refreshes
    /// the entry's type and samples without touching the count.
    pub fn update_annotation(
        &self,
        annotation_id: i64,
        variable_name: &str,
        variable_kind: VariableKind,
        bbox: BoundingBox,
        sample_value: &str,
    ) -> Result<()> {
        let context = format!("updating annotation {annotation_id}");
        let old_name: String = self
            .conn
            .query_row(
                "SELECT variable_name FROM annotations WHERE id = ?",
                [annotation_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| persist(context.clone(), e))?
            .ok_or_else(|| Error::input(format!("annotation {annotation_id} does not exist")))?;

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| persist(context.clone(), e))?;
        tx.execute(
            "UPDATE annotations
             SET variable_name = ?, variable_kind = ?,
                 x_start = ?, y_start = ?, x_end = ?, y_end = ?, sample_value = ?
             WHERE id = ?",
            params![
                variable_name,
                variable_kind.as_str(),
                bbox.x_start,
                bbox.y_start,
                bbox.x_end,
                bbox.y_end,
                sample_value,
                annotation_id
            ],
        )
        .map_err(|e| persist(context.clone(), e))?;
        if old_name != variable_name {
            decrement_catalog(&tx, &old_name).map_err(|e| persist(context.clone(), e))?;
            upsert_catalog(&tx, variable_name, variable_kind, sample_value, true)
                .map_err(|e| persist(context.clone(), e))?;
        } else {
            upsert_catalog(&tx, variable_name, variable_kind, sample_value, false)
                .map_err(|e| persist(context.clone(), e))?;
        }
        tx.commit().map_err(|e| persist(context.clone(), e))?;
        Ok(())
    }

    pub fn delete_annotation(&self, annotation_id: i64) -> Result<()> {
        let context = format!("deleting annotation {annotation_id}");
        let name: Option<String> = self
            .conn
            .query_row(
                "SELECT variable_name FROM annotations WHERE id = ?",
                [annotation_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| persist(context.clone(), e))?;
        let Some(name) = name else {
            return Ok(());
        };
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| persist(context.clone(), e))?;
        tx.execute("DELETE FROM annotations WHERE id = ?", [annotation_id])
            .map_err(|e| persist(context.clone(), e))?;
        decrement_catalog(&tx, &name).map_err(|e| persist(context.clone(), e))?;
        tx.commit().map_err(|e| persist(context.clone(), e))?;
        Ok(())
    }

    pub fn list_annotations(
        &self,
        template_id: i64,
        page_number: Option<u32>,
    ) -> Result<Vec<Annotation>> {
        let context = format!("listing annotations for template {template_id}");
        let mut query = String::from(
            "SELECT id, template_id, page_number, variable_name, variable_kind,
                    x_start, y_start, x_end, y_end, sample_value, created_at
             FROM annotations WHERE template_id = ?",
        );
        if page_number.is_some() {
            query.push_str(" AND page_number = ?");
        }
        query.push_str(" ORDER BY id");
        let mut stmt = self.conn.prepare(&query).map_err(|e| persist(context.clone(), e))?;
        let rows = match page_number {
            Some(page) => stmt
                .query_map(params![template_id, page], row_to_annotation)
                .map_err(|e| persist(context.clone(), e))?
                .collect::<std::result::Result<Vec<_>, _>>(),
            None => stmt
                .query_map([template_id], row_to_annotation)
                .map_err(|e| persist(context.clone(), e))?
                .collect::<std::result::Result<Vec<_>, _>>(),
        }
        .map_err(|e| persist(context.clone(), e))?;
        Ok(rows)
    }

    // ========================================================================
    // Variable catalog
    // ========================================================================

    pub fn variable_catalog(&self) -> Result<Vec<VariableCatalogEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT variable_name, variable_kind, sample_values, usage_count
                 FROM variable_catalog
                 ORDER BY usage_count DESC, variable_name",
            )
            .map_err(|e| persist("listing variable catalog", e))?;
        let rows = stmt
            .query_map([], |row| {
                let samples_json: String = row.get(2)?;
                Ok(VariableCatalogEntry {
                    variable_name: row.get(0)?,
                    variable_kind: VariableKind::parse(&row.get::<_, String>(1)?),
                    sample_values: serde_json::from_str(&samples_json).unwrap_or_default(),
                    usage_count: row.get(3)?,
                })
            })
            .map_err(|e| persist("listing variable catalog", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| persist("listing variable catalog", e))?;
        Ok(rows)
    }

    // ========================================================================
    // Field groups
    // ========================================================================

    /// Create a group with its ordered definitions and template files in one
    /// transaction: either all rows land, or none do.
    pub fn insert_field_group(
        &self,
        name: &str,
        source_sheet_path: &str,
        fields: &[FieldDefinition],
        files: &[NewTemplateFile],
    ) -> Result<i64> {
        let context = format!("creating field group '{name}'");
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| persist(context.clone(), e))?;
        tx.execute(
            "INSERT INTO field_groups (name, source_sheet_path) VALUES (?, ?)",
            params![name, source_sheet_path],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::input(format!("a field group named '{name}' already exists"))
            } else {
                persist(context.clone(), e)
            }
        })?;
        let group_id = tx.last_insert_rowid();
        insert_definitions(&tx, group_id, fields).map_err(|e| persist(context.clone(), e))?;
        for file in files {
            insert_template_file(&tx, group_id, file).map_err(|e| persist(context.clone(), e))?;
        }
        tx.commit().map_err(|e| persist(context.clone(), e))?;
        Ok(group_id)
    }

    pub fn list_field_groups(&self) -> Result<Vec<FieldGroup>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT g.id, g.name, g.source_sheet_path, g.created_at,
                        (SELECT COUNT(*) FROM template_files f WHERE f.group_id = g.id)
                 FROM field_groups g ORDER BY g.created_at DESC",
            )
            .map_err(|e| persist("listing field groups", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FieldGroup {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    source_sheet_path: row.get(2)?,
                    created_at: row.get(3)?,
                    file_count: row.get(4)?,
                })
            })
            .map_err(|e| persist("listing field groups", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| persist("listing field groups", e))?;
        Ok(rows)
    }

    pub fn field_definitions(&self, group_id: i64) -> Result<Vec<FieldDefinition>> {
        let context = format!("loading field definitions for group {group_id}");
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, default_value, description, dropdown_options, sort_order
                 FROM field_definitions WHERE group_id = ? ORDER BY sort_order",
            )
            .map_err(|e| persist(context.clone(), e))?;
        let rows = stmt
            .query_map([group_id], |row| {
                let options_json: String = row.get(3)?;
                Ok(FieldDefinition {
                    name: row.get(0)?,
                    default_value: row.get(1)?,
                    description: row.get(2)?,
                    dropdown_options: serde_json::from_str(&options_json).unwrap_or_default(),
                    sort_order: row.get(4)?,
                    inferred_kind: Default::default(),
                })
            })
            .map_err(|e| persist(context.clone(), e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| persist(context.clone(), e))?;
        Ok(rows)
    }

    /// Replace a group's definitions wholesale (delete then insert), the way
    /// a re-parse of the source spreadsheet is confirmed.
    pub fn replace_field_definitions(
        &self,
        group_id: i64,
        fields: &[FieldDefinition],
    ) -> Result<()> {
        let context = format!("replacing field definitions for group {group_id}");
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| persist(context.clone(), e))?;
        tx.execute("DELETE FROM field_definitions WHERE group_id = ?", [group_id])
            .map_err(|e| persist(context.clone(), e))?;
        insert_definitions(&tx, group_id, fields).map_err(|e| persist(context.clone(), e))?;
        tx.commit().map_err(|e| persist(context.clone(), e))?;
        Ok(())
    }

    pub fn add_template_file(&self, group_id: i64, file: &NewTemplateFile) -> Result<i64> {
        let context = format!("adding template file to group {group_id}");
        insert_template_file(&self.conn, group_id, file).map_err(|e| persist(context.clone(), e))?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn template_files(&self, group_id: i64) -> Result<Vec<TemplateFile>> {
        let context = format!("listing template files for group {group_id}");
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, group_id, filename, filepath, file_type, file_size, sha256, created_at
                 FROM template_files WHERE group_id = ? ORDER BY id",
            )
            .map_err(|e| persist(context.clone(), e))?;
        let rows = stmt
            .query_map([group_id], row_to_template_file)
            .map_err(|e| persist(context.clone(), e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| persist(context.clone(), e))?;
        Ok(rows)
    }

    pub fn get_template_file(&self, file_id: i64) -> Result<Option<TemplateFile>> {
        self.conn
            .query_row(
                "SELECT id, group_id, filename, filepath, file_type, file_size, sha256, created_at
                 FROM template_files WHERE id = ?",
                [file_id],
                row_to_template_file,
            )
            .optional()
            .map_err(|e| persist(format!("loading template file {file_id}"), e))
    }

    pub fn delete_template_file(&self, file_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM template_files WHERE id = ?", [file_id])
            .map_err(|e| persist(format!("deleting template file {file_id}"), e))?;
        Ok(())
    }

    pub fn delete_field_group(&self, group_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM field_groups WHERE id = ?", [group_id])
            .map_err(|e| persist(format!("deleting field group {group_id}"), e))?;
        Ok(())
    }

    // ========================================================================
    // Comparison templates
    // ========================================================================

    pub fn insert_comparison_template(
        &self,
        name: &str,
        filename: &str,
        filepath: &str,
        file_type: &str,
        file_size: u64,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO comparison_templates (name, filename, filepath, file_type, file_size)
                 VALUES (?, ?, ?, ?, ?)",
                params![name, filename, filepath, file_type, file_size],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::input(format!("a comparison template named '{name}' already exists"))
                } else {
                    persist(format!("inserting comparison template '{name}'"), e)
                }
            })?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_comparison_templates(&self) -> Result<Vec<ComparisonTemplate>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, filename, filepath, file_type, file_size, created_at
                 FROM comparison_templates ORDER BY created_at DESC",
            )
            .map_err(|e| persist("listing comparison templates", e))?;
        let rows = stmt
            .query_map([], row_to_comparison_template)
            .map_err(|e| persist("listing comparison templates", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| persist("listing comparison templates", e))?;
        Ok(rows)
    }

    pub fn get_comparison_template(&self, id: i64) -> Result<Option<ComparisonTemplate>> {
        self.conn
            .query_row(
                "SELECT id, name, filename, filepath, file_type, file_size, created_at
                 FROM comparison_templates WHERE id = ?",
                [id],
                row_to_comparison_template,
            )
            .optional()
            .map_err(|e| persist(format!("loading comparison template {id}"), e))
    }

    pub fn delete_comparison_template(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM comparison_templates WHERE id = ?", [id])
            .map_err(|e| persist(format!("deleting comparison template {id}"), e))?;
        Ok(())
    }
}

// ============================================================================
// Row mappers and catalog helpers
// ============================================================================

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<Template> {
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        total_pages: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_annotation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Annotation> {
    Ok(Annotation {
        id: row.get(0)?,
        template_id: row.get(1)?,
        page_number: row.get(2)?,
        variable_name: row.get(3)?,
        variable_kind: VariableKind::parse(&row.get::<_, String>(4)?),
        bbox: BoundingBox {
            x_start: row.get(5)?,
            y_start: row.get(6)?,
            x_end: row.get(7)?,
            y_end: row.get(8)?,
        },
        sample_value: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn row_to_template_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateFile> {
    Ok(TemplateFile {
        id: row.get(0)?,
        group_id: row.get(1)?,
        filename: row.get(2)?,
        filepath: row.get(3)?,
        file_type: row.get(4)?,
        file_size: row.get::<_, i64>(5)? as u64,
        sha256: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn row_to_comparison_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<ComparisonTemplate> {
    Ok(ComparisonTemplate {
        id: row.get(0)?,
        name: row.get(1)?,
        filename: row.get(2)?,
        filepath: row.get(3)?,
        file_type: row.get(4)?,
        file_size: row.get::<_, i64>(5)? as u64,
        created_at: row.get(6)?,
    })
}

fn insert_definitions(
    conn: &Connection,
    group_id: i64,
    fields: &[FieldDefinition],
) -> rusqlite::Result<()> {
    for (i, field) in fields.iter().enumerate() {
        let options_json =
            serde_json::to_string(&field.dropdown_options).unwrap_or_else(|_| "[]".to_string());
        conn.execute(
            "INSERT INTO field_definitions
                 (group_id, name, default_value, description, dropdown_options, sort_order)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                group_id,
                field.name,
                field.default_value,
                field.description,
                options_json,
                i as i64
            ],
        )?;
    }
    Ok(())
}

fn insert_template_file(
    conn: &Connection,
    group_id: i64,
    file: &NewTemplateFile,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO template_files (group_id, filename, filepath, file_type, file_size, sha256)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            group_id,
            file.filename,
            file.filepath,
            file.file_type,
            file.file_size as i64,
            file.sha256
        ],
    )?;
    Ok(())
}

/// Register one more use of a variable name. When `count_use` is false only
/// the declared type and sample list are refreshed (a same-name update).
fn upsert_catalog(
    conn: &Connection,
    variable_name: &str,
    variable_kind: VariableKind,
    sample_value: &str,
    count_use: bool,
) -> rusqlite::Result<()> {
    let existing: Option<(i64, String, u32)> = conn
        .query_row(
            "SELECT id, sample_values, usage_count FROM variable_catalog WHERE variable_name = ?",
            [variable_name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match existing {
        Some((id, samples_json, usage_count)) => {
            let mut samples: Vec<String> = serde_json::from_str(&samples_json).unwrap_or_default();
            if !sample_value.is_empty() && !samples.iter().any(|s| s == sample_value) {
                samples.push(sample_value.to_string());
            }
            let samples_json =
                serde_json::to_string(&samples).unwrap_or_else(|_| "[]".to_string());
            let usage = if count_use { usage_count + 1 } else { usage_count };
            conn.execute(
                "UPDATE variable_catalog
                 SET variable_kind = ?, sample_values = ?, usage_count = ?,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?",
                params![variable_kind.as_str(), samples_json, usage, id],
            )?;
        }
        None => {
            let samples = if sample_value.is_empty() {
                Vec::new()
            } else {
                vec![sample_value.to_string()]
            };
            let samples_json =
                serde_json::to_string(&samples).unwrap_or_else(|_| "[]".to_string());
            conn.execute(
                "INSERT INTO variable_catalog
                     (variable_name, variable_kind, sample_values, usage_count)
                 VALUES (?, ?, ?, ?)",
                params![
                    variable_name,
                    variable_kind.as_str(),
                    samples_json,
                    if count_use { 1 } else { 0 }
                ],
            )?;
        }
    }
    Ok(())
}

/// Decrement a catalog entry's usage count, clamped at zero.
fn decrement_catalog(conn: &Connection, variable_name: &str) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE variable_catalog
         SET usage_count = MAX(usage_count - 1, 0), updated_at = CURRENT_TIMESTAMP
         WHERE variable_name = ?",
        [variable_name],
    )?;
    Ok(())
}

//! Annotation and page-classification service.
//!
//! One service object owns the store handles and is passed by reference to
//! every caller; there is no ambient global state. Validation happens
//! before any write, so a rejected call leaves both the rows and the
//! variable catalog untouched.

use image::DynamicImage;
use std::io::Cursor;

use crate::db::{
    Annotation, BoundingBox, Database, PageInfo, PageKind, PageKindCounts, Template,
    VariableCatalogEntry, VariableKind,
};
use crate::error::{Error, Result};
use crate::storage::FileStore;

pub struct AnnotationService<'a> {
    db: &'a Database,
    files: &'a FileStore,
}

impl<'a> AnnotationService<'a> {
    pub fn new(db: &'a Database, files: &'a FileStore) -> Self {
        Self { db, files }
    }

    // ========================================================================
    // Template lifecycle
    // ========================================================================

    /// Store a new template: the original artifact plus one PNG per page.
    pub fn save_template(
        &self,
        name: &str,
        description: &str,
        pdf_bytes: &[u8],
        page_images: &[DynamicImage],
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(Error::input("template name is required"));
        }
        if page_images.is_empty() {
            return Err(Error::input("template has no pages"));
        }

        let template_id = self
            .db
            .insert_template(name, description, page_images.len() as u32)?;

        let stored = self.store_template_files(template_id, pdf_bytes, page_images);
        if let Err(err) = stored {
            // The row is useless without its files; undo it.
            if let Err(cleanup) = self.db.delete_template(template_id) {
                tracing::warn!(template_id, %cleanup, "could not undo template row");
            }
            return Err(err);
        }

        tracing::info!(template_id, name, pages = page_images.len(), "saved template");
        Ok(template_id)
    }

    fn store_template_files(
        &self,
        template_id: i64,
        pdf_bytes: &[u8],
        page_images: &[DynamicImage],
    ) -> Result<()> {
        self.files
            .save(&FileStore::template_pdf_name(template_id), pdf_bytes)?;
        for (index, page) in page_images.iter().enumerate() {
            let mut encoded = Cursor::new(Vec::new());
            page.write_to(&mut encoded, image::ImageOutputFormat::Png)
                .map_err(|e| Error::render(format!("encoding page {}: {e}", index + 1)))?;
            self.files.save(
                &FileStore::template_page_name(template_id, index as u32 + 1),
                encoded.get_ref(),
            )?;
        }
        Ok(())
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        self.db.list_templates()
    }

    pub fn template_info(&self, template_id: i64) -> Result<Option<Template>> {
        self.db.get_template(template_id)
    }

    /// Delete a template as a unit: rows cascade, stored files are removed.
    pub fn delete_template(&self, template_id: i64) -> Result<()> {
        let Some(template) = self.db.get_template(template_id)? else {
            return Ok(());
        };
        self.db.delete_template(template_id)?;

        self.files.delete(&FileStore::template_pdf_name(template_id))?;
        for page_number in 1..=template.total_pages {
            self.files
                .delete(&FileStore::template_page_name(template_id, page_number))?;
        }
        tracing::info!(template_id, "deleted template");
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
        self.require_page(template_id, page_number)?;
        self.db.set_page_kind(template_id, page_number, kind, note)
    }

    pub fn get_page_info(&self, template_id: i64, page_number: u32) -> Result<PageInfo> {
        self.db.get_page_info(template_id, page_number)
    }

    pub fn page_kind_counts(&self, template_id: i64) -> Result<PageKindCounts> {
        let template = self
            .db
            .get_template(template_id)?
            .ok_or_else(|| Error::input(format!("template {template_id} does not exist")))?;
        self.db.page_kind_counts(template_id, template.total_pages)
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    pub fn create_annotation(
        &self,
        template_id: i64,
        page_number: u32,
        variable_name: &str,
        variable_kind: VariableKind,
        bbox: BoundingBox,
        sample_value: &str,
    ) -> Result<i64> {
        if variable_name.trim().is_empty() {
            return Err(Error::input("variable name is required"));
        }
        self.require_page(template_id, page_number)?;
        self.validate_bbox(template_id, page_number, bbox)?;

        let id = self.db.insert_annotation(
            template_id,
            page_number,
            variable_name,
            variable_kind,
            bbox,
            sample_value,
        )?;
        self.db.touch_template(template_id)?;
        tracing::debug!(template_id, page_number, variable_name, id, "created annotation");
        Ok(id)
    }

    pub fn update_annotation(
        &self,
        annotation_id: i64,
        variable_name: &str,
        variable_kind: VariableKind,
        bbox: BoundingBox,
        sample_value: &str,
    ) -> Result<()> {
        if variable_name.trim().is_empty() {
            return Err(Error::input("variable name is required"));
        }
        let existing = self
            .db
            .get_annotation(annotation_id)?
            .ok_or_else(|| Error::input(format!("annotation {annotation_id} does not exist")))?;
        self.validate_bbox(existing.template_id, existing.page_number, bbox)?;

        self.db
            .update_annotation(annotation_id, variable_name, variable_kind, bbox, sample_value)?;
        self.db.touch_template(existing.template_id)
    }

    pub fn delete_annotation(&self, annotation_id: i64) -> Result<()> {
        self.db.delete_annotation(annotation_id)
    }

    pub fn list_annotations(
        &self,
        template_id: i64,
        page_number: Option<u32>,
    ) -> Result<Vec<Annotation>> {
        self.db.list_annotations(template_id, page_number)
    }

    pub fn variable_catalog(&self) -> Result<Vec<VariableCatalogEntry>> {
        self.db.variable_catalog()
    }

    // ========================================================================
    // Validation helpers
    // ========================================================================

    fn require_page(&self, template_id: i64, page_number: u32) -> Result<()> {
        let template = self
            .db
            .get_template(template_id)?
            .ok_or_else(|| Error::input(format!("template {template_id} does not exist")))?;
        if page_number == 0 || page_number > template.total_pages {
            return Err(Error::input(format!(
                "page {page_number} is outside 1..={}",
                template.total_pages
            )));
        }
        Ok(())
    }

    /// Geometry first; then, when the stored page image is readable, the
    /// page bounds too.
    fn validate_bbox(&self, template_id: i64, page_number: u32, bbox: BoundingBox) -> Result<()> {
        bbox.validate()?;
        let page_path = self
            .files
            .resolve(&FileStore::template_page_name(template_id, page_number));
        if let Ok((width, height)) = image::image_dimensions(&page_path) {
            bbox.validate_within(width, height)?;
        }
        Ok(())
    }
}

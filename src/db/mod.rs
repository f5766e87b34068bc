mod schema;
pub mod annotations;
pub mod fields;
pub mod sqlite;

use std::path::Path;

pub use annotations::{
    Annotation, BoundingBox, PageInfo, PageKind, PageKindCounts, Template, VariableCatalogEntry,
    VariableKind,
};
pub use fields::{
    ComparisonTemplate, FieldDefinition, FieldGroup, FieldKind, FileKind, TemplateFile,
};
pub use schema::{MIGRATIONS, SCHEMA};
pub use sqlite::NewTemplateFile;

use crate::error::Result;

/// Facade over the backing store. The rest of the crate talks to this type
/// only, so the embedded engine stays swappable without touching callers.
pub struct Database {
    inner: sqlite::SqliteDb,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sqlite::SqliteDb::open(path)?;
        db.initialize()?;
        Ok(Self { inner: db })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = sqlite::SqliteDb::open_in_memory()?;
        db.initialize()?;
        Ok(Self { inner: db })
    }

    // ========================================================================
    // Templates
    // ========================================================================

    pub fn insert_template(&self, name: &str, description: &str, total_pages: u32) -> Result<i64> {
        self.inner.insert_template(name, description, total_pages)
    }

    pub fn get_template(&self, template_id: i64) -> Result<Option<Template>> {
        self.inner.get_template(template_id)
    }

    pub fn list_templates(&self) -> Result<Vec<Template>> {
        self.inner.list_templates()
    }

    pub fn touch_template(&self, template_id: i64) -> Result<()> {
        self.inner.touch_template(template_id)
    }

    pub fn delete_template(&self, template_id: i64) -> Result<()> {
        self.inner.delete_template(template_id)
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
        self.inner.set_page_kind(template_id, page_number, kind, note)
    }

    pub fn get_page_info(&self, template_id: i64, page_number: u32) -> Result<PageInfo> {
        self.inner.get_page_info(template_id, page_number)
    }

    pub fn page_kind_counts(&self, template_id: i64, total_pages: u32) -> Result<PageKindCounts> {
        self.inner.page_kind_counts(template_id, total_pages)
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
        self.inner.insert_annotation(
            template_id,
            page_number,
            variable_name,
            variable_kind,
            bbox,
            sample_value,
        )
    }

    pub fn get_annotation(&self, annotation_id: i64) -> Result<Option<Annotation>> {
        self.inner.get_annotation(annotation_id)
    }

    pub fn update_annotation(
        &self,
        annotation_id: i64,
        variable_name: &str,
        variable_kind: VariableKind,
        bbox: BoundingBox,
        sample_value: &str,
    ) -> Result<()> {
        self.inner
            .update_annotation(annotation_id, variable_name, variable_kind, bbox, sample_value)
    }

    pub fn delete_annotation(&self, annotation_id: i64) -> Result<()> {
        self.inner.delete_annotation(annotation_id)
    }

    pub fn list_annotations(
        &self,
        template_id: i64,
        page_number: Option<u32>,
    ) -> Result<Vec<Annotation>> {
        self.inner.list_annotations(template_id, page_number)
    }

    pub fn variable_catalog(&self) -> Result<Vec<VariableCatalogEntry>> {
        self.inner.variable_catalog()
    }

    // ========================================================================
    // Field groups
    // ========================================================================

    pub fn insert_field_group(
        &self,
        name: &str,
        source_sheet_path: &str,
        fields: &[FieldDefinition],
        files: &[NewTemplateFile],
    ) -> Result<i64> {
        self.inner
            .insert_field_group(name, source_sheet_path, fields, files)
    }

    pub fn list_field_groups(&self) -> Result<Vec<FieldGroup>> {
        self.inner.list_field_groups()
    }

    pub fn field_definitions(&self, group_id: i64) -> Result<Vec<FieldDefinition>> {
        self.inner.field_definitions(group_id)
    }

    pub fn replace_field_definitions(
        &self,
        group_id: i64,
        fields: &[FieldDefinition],
    ) -> Result<()> {
        self.inner.replace_field_definitions(group_id, fields)
    }

    pub fn add_template_file(&self, group_id: i64, file: &NewTemplateFile) -> Result<i64> {
        self.inner.add_template_file(group_id, file)
    }

    pub fn template_files(&self, group_id: i64) -> Result<Vec<TemplateFile>> {
        self.inner.template_files(group_id)
    }

    pub fn get_template_file(&self, file_id: i64) -> Result<Option<TemplateFile>> {
        self.inner.get_template_file(file_id)
    }

    pub fn delete_template_file(&self, file_id: i64) -> Result<()> {
        self.inner.delete_template_file(file_id)
    }

    pub fn delete_field_group(&self, group_id: i64) -> Result<()> {
        self.inner.delete_field_group(group_id)
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
        self.inner
            .insert_comparison_template(name, filename, filepath, file_type, file_size)
    }

    pub fn list_comparison_templates(&self) -> Result<Vec<ComparisonTemplate>> {
        self.inner.list_comparison_templates()
    }

    pub fn get_comparison_template(&self, id: i64) -> Result<Option<ComparisonTemplate>> {
        self.inner.get_comparison_template(id)
    }

    pub fn delete_comparison_template(&self, id: i64) -> Result<()> {
        self.inner.delete_comparison_template(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(10.0, 10.0, 100.0, 30.0)
    }

    #[test]
    fn create_then_list_returns_identical_annotation() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 3).unwrap();
        let id = db
            .insert_annotation(tid, 1, "tenant", VariableKind::Text, bbox(), "王小明")
            .unwrap();

        let listed = db.list_annotations(tid, None).unwrap();
        assert_eq!(listed.len(), 1);
        let ann = &listed[0];
        assert_eq!(ann.id, id);
        assert_eq!(ann.page_number, 1);
        assert_eq!(ann.variable_name, "tenant");
        assert_eq!(ann.variable_kind, VariableKind::Text);
        assert_eq!(ann.bbox, bbox());
        assert_eq!(ann.sample_value, "王小明");
    }

    #[test]
    fn list_annotations_filters_by_page() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 3).unwrap();
        db.insert_annotation(tid, 1, "a", VariableKind::Text, bbox(), "")
            .unwrap();
        db.insert_annotation(tid, 2, "b", VariableKind::Text, bbox(), "")
            .unwrap();

        assert_eq!(db.list_annotations(tid, None).unwrap().len(), 2);
        let page2 = db.list_annotations(tid, Some(2)).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].variable_name, "b");
    }

    #[test]
    fn delete_decrements_usage_count_and_clamps_at_zero() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 1).unwrap();
        let a = db
            .insert_annotation(tid, 1, "date", VariableKind::Date, bbox(), "2024-01-01")
            .unwrap();
        let b = db
            .insert_annotation(tid, 1, "date", VariableKind::Date, bbox(), "")
            .unwrap();

        let entry = &db.variable_catalog().unwrap()[0];
        assert_eq!(entry.usage_count, 2);

        db.delete_annotation(a).unwrap();
        assert_eq!(db.variable_catalog().unwrap()[0].usage_count, 1);
        db.delete_annotation(b).unwrap();
        assert_eq!(db.variable_catalog().unwrap()[0].usage_count, 0);
        // Deleting an already-gone row must not push the count negative.
        db.delete_annotation(b).unwrap();
        assert_eq!(db.variable_catalog().unwrap()[0].usage_count, 0);
        assert!(db.list_annotations(tid, None).unwrap().is_empty());
    }

    #[test]
    fn rename_moves_usage_from_old_entry_to_new() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 1).unwrap();
        let id = db
            .insert_annotation(tid, 1, "old_name", VariableKind::Text, bbox(), "")
            .unwrap();

        db.update_annotation(id, "new_name", VariableKind::Text, bbox(), "")
            .unwrap();

        let catalog = db.variable_catalog().unwrap();
        let old = catalog.iter().find(|e| e.variable_name == "old_name").unwrap();
        let new = catalog.iter().find(|e| e.variable_name == "new_name").unwrap();
        assert_eq!(old.usage_count, 0);
        assert_eq!(new.usage_count, 1);
    }

    #[test]
    fn same_name_update_does_not_inflate_usage_count() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 1).unwrap();
        let id = db
            .insert_annotation(tid, 1, "amount", VariableKind::Number, bbox(), "100")
            .unwrap();

        db.update_annotation(id, "amount", VariableKind::Number, bbox(), "250")
            .unwrap();

        let entry = &db.variable_catalog().unwrap()[0];
        assert_eq!(entry.usage_count, 1);
        assert_eq!(entry.sample_values, vec!["100", "250"]);
    }

    #[test]
    fn sample_values_are_deduplicated_in_insertion_order() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 1).unwrap();
        for sample in ["b", "a", "b", ""] {
            db.insert_annotation(tid, 1, "v", VariableKind::Text, bbox(), sample)
                .unwrap();
        }
        let entry = &db.variable_catalog().unwrap()[0];
        assert_eq!(entry.sample_values, vec!["b", "a"]);
        assert_eq!(entry.usage_count, 4);
    }

    #[test]
    fn catalog_orders_by_usage_then_name() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 1).unwrap();
        db.insert_annotation(tid, 1, "zeta", VariableKind::Text, bbox(), "")
            .unwrap();
        db.insert_annotation(tid, 1, "alpha", VariableKind::Text, bbox(), "")
            .unwrap();
        db.insert_annotation(tid, 1, "beta", VariableKind::Text, bbox(), "")
            .unwrap();
        db.insert_annotation(tid, 1, "beta", VariableKind::Text, bbox(), "")
            .unwrap();

        let names: Vec<_> = db
            .variable_catalog()
            .unwrap()
            .into_iter()
            .map(|e| e.variable_name)
            .collect();
        assert_eq!(names, vec!["beta", "alpha", "zeta"]);
    }

    #[test]
    fn page_info_round_trips_and_defaults() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 5).unwrap();

        assert_eq!(db.get_page_info(tid, 2).unwrap(), PageInfo::default());

        db.set_page_kind(tid, 2, PageKind::Reference, "appendix")
            .unwrap();
        let info = db.get_page_info(tid, 2).unwrap();
        assert_eq!(info.kind, PageKind::Reference);
        assert_eq!(info.note, "appendix");

        // Reclassifying as variable clears the note.
        db.set_page_kind(tid, 2, PageKind::Variable, "stale").unwrap();
        let info = db.get_page_info(tid, 2).unwrap();
        assert_eq!(info.kind, PageKind::Variable);
        assert_eq!(info.note, "");
    }

    #[test]
    fn page_kind_counts_report_undefined_pages() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 5).unwrap();
        db.set_page_kind(tid, 1, PageKind::Variable, "").unwrap();
        db.set_page_kind(tid, 3, PageKind::Reference, "copy").unwrap();

        let counts = db.page_kind_counts(tid, 5).unwrap();
        assert_eq!(counts.variable, 1);
        assert_eq!(counts.reference, 1);
        assert_eq!(counts.undefined, 3);
    }

    #[test]
    fn duplicate_template_name_is_rejected_as_input_error() {
        let db = test_db();
        db.insert_template("lease", "", 1).unwrap();
        let err = db.insert_template("lease", "", 1).unwrap_err();
        assert!(err.is_user_error());
    }

    #[test]
    fn deleting_template_cascades_and_releases_catalog_counts() {
        let db = test_db();
        let tid = db.insert_template("lease", "", 2).unwrap();
        db.insert_annotation(tid, 1, "tenant", VariableKind::Text, bbox(), "")
            .unwrap();
        db.set_page_kind(tid, 1, PageKind::Reference, "n").unwrap();

        db.delete_template(tid).unwrap();

        assert!(db.get_template(tid).unwrap().is_none());
        assert!(db.list_annotations(tid, None).unwrap().is_empty());
        let entry = &db.variable_catalog().unwrap()[0];
        assert_eq!(entry.usage_count, 0);
    }

    #[test]
    fn field_group_round_trip_preserves_order_and_options() {
        let db = test_db();
        let fields = vec![
            FieldDefinition {
                name: "性別".into(),
                default_value: "男".into(),
                description: "".into(),
                dropdown_options: vec!["男".into(), "女".into()],
                sort_order: 0,
                inferred_kind: FieldKind::Text,
            },
            FieldDefinition {
                name: "地址".into(),
                default_value: "".into(),
                description: "戶籍地址".into(),
                dropdown_options: vec![],
                sort_order: 1,
                inferred_kind: FieldKind::Text,
            },
        ];
        let gid = db
            .insert_field_group("contract-2024", "/tmp/fields.xlsx", &fields, &[])
            .unwrap();

        let loaded = db.field_definitions(gid).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "性別");
        assert_eq!(loaded[0].dropdown_options, vec!["男", "女"]);
        assert_eq!(loaded[1].name, "地址");
        assert!(loaded[1].dropdown_options.is_empty());
    }

    #[test]
    fn comparison_template_registry_round_trips() {
        let db = test_db();
        let id = db
            .insert_comparison_template("standard lease", "lease.pdf", "/data/lease.pdf", "pdf", 1024)
            .unwrap();

        let listed = db.list_comparison_templates().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "standard lease");

        let err = db
            .insert_comparison_template("standard lease", "x.pdf", "/data/x.pdf", "pdf", 1)
            .unwrap_err();
        assert!(err.is_user_error());

        db.delete_comparison_template(id).unwrap();
        assert!(db.get_comparison_template(id).unwrap().is_none());
    }

    #[test]
    fn replace_field_definitions_is_wholesale() {
        let db = test_db();
        let field = |name: &str| FieldDefinition {
            name: name.into(),
            default_value: "".into(),
            description: "".into(),
            dropdown_options: vec![],
            sort_order: 0,
            inferred_kind: FieldKind::Text,
        };
        let gid = db
            .insert_field_group("g", "/tmp/s.xlsx", &[field("a"), field("b")], &[])
            .unwrap();
        db.replace_field_definitions(gid, &[field("c")]).unwrap();

        let loaded = db.field_definitions(gid).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "c");
    }
}

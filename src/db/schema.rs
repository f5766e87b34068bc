pub const SCHEMA: &str = r#"
-- Templates: one row per uploaded reference document
CREATE TABLE IF NOT EXISTS templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    total_pages INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Per-page classification. Pages without a row default to 'variable'.
CREATE TABLE IF NOT EXISTS page_kinds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    template_id INTEGER NOT NULL,
    page_number INTEGER NOT NULL,
    page_kind TEXT NOT NULL DEFAULT 'variable',  -- 'variable' or 'reference'
    note TEXT NOT NULL DEFAULT '',               -- meaningful only for reference pages
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (template_id) REFERENCES templates(id) ON DELETE CASCADE,
    UNIQUE(template_id, page_number)
);

-- Rectangular variable markers on template pages (page-pixel coordinates)
CREATE TABLE IF NOT EXISTS annotations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    template_id INTEGER NOT NULL,
    page_number INTEGER NOT NULL,
    variable_name TEXT NOT NULL,
    variable_kind TEXT NOT NULL,
    x_start REAL NOT NULL,
    y_start REAL NOT NULL,
    x_end REAL NOT NULL,
    y_end REAL NOT NULL,
    sample_value TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (template_id) REFERENCES templates(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_annotations_template ON annotations(template_id);
CREATE INDEX IF NOT EXISTS idx_annotations_template_page ON annotations(template_id, page_number);

-- Cross-template directory of variable names with usage statistics
CREATE TABLE IF NOT EXISTS variable_catalog (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    variable_name TEXT NOT NULL UNIQUE,
    variable_kind TEXT NOT NULL,
    sample_values TEXT NOT NULL DEFAULT '[]',  -- JSON array, insertion-ordered
    usage_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Field groups: one spreadsheet-driven set of input slots
CREATE TABLE IF NOT EXISTS field_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    source_sheet_path TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS field_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    default_value TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    dropdown_options TEXT NOT NULL DEFAULT '[]',  -- JSON array, ordered
    sort_order INTEGER NOT NULL,
    FOREIGN KEY (group_id) REFERENCES field_groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_field_definitions_group ON field_definitions(group_id);

-- Format variants of one logical template, owned by a field group
CREATE TABLE IF NOT EXISTS template_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    filename TEXT NOT NULL,
    filepath TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    sha256 TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (group_id) REFERENCES field_groups(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_template_files_group ON template_files(group_id);

-- Named reference documents registered for the comparison flow
CREATE TABLE IF NOT EXISTS comparison_templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    filepath TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Idempotent migrations for databases created by earlier builds.
/// Each statement is allowed to fail (column already present).
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE page_kinds ADD COLUMN note TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE page_kinds ADD COLUMN updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP",
    "ALTER TABLE template_files ADD COLUMN sha256 TEXT",
];

//! Types for templates, page classification and variable annotations.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a template page is verified during comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// Checked field by field against the annotated variables.
    #[default]
    Variable,
    /// Checked only for holistic similarity.
    Reference,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Variable => "variable",
            PageKind::Reference => "reference",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "reference" => PageKind::Reference,
            _ => PageKind::Variable,
        }
    }
}

/// Declared type of an annotated variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    #[default]
    Text,
    Number,
    Date,
    Address,
    Other,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::Text => "text",
            VariableKind::Number => "number",
            VariableKind::Date => "date",
            VariableKind::Address => "address",
            VariableKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "number" => VariableKind::Number,
            "date" => VariableKind::Date,
            "address" => VariableKind::Address,
            "other" => VariableKind::Other,
            _ => VariableKind::Text,
        }
    }
}

/// Axis-aligned rectangle in page-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_start: f64,
    pub y_start: f64,
    pub x_end: f64,
    pub y_end: f64,
}

impl BoundingBox {
    pub fn new(x_start: f64, y_start: f64, x_end: f64, y_end: f64) -> Self {
        Self {
            x_start,
            y_start,
            x_end,
            y_end,
        }
    }

    pub fn width(&self) -> f64 {
        self.x_end - self.x_start
    }

    pub fn height(&self) -> f64 {
        self.y_end - self.y_start
    }

    /// Reject degenerate rectangles and negative coordinates.
    pub fn validate(&self) -> Result<()> {
        if self.x_start < 0.0 || self.y_start < 0.0 {
            return Err(Error::geometry(format!(
                "coordinates must be non-negative, got ({}, {})",
                self.x_start, self.y_start
            )));
        }
        if self.x_start >= self.x_end {
            return Err(Error::geometry(format!(
                "x_start {} must be less than x_end {}",
                self.x_start, self.x_end
            )));
        }
        if self.y_start >= self.y_end {
            return Err(Error::geometry(format!(
                "y_start {} must be less than y_end {}",
                self.y_start, self.y_end
            )));
        }
        Ok(())
    }

    /// Check the rectangle lies inside a page of the given pixel size.
    pub fn validate_within(&self, page_width: u32, page_height: u32) -> Result<()> {
        self.validate()?;
        if self.x_end > page_width as f64 || self.y_end > page_height as f64 {
            return Err(Error::geometry(format!(
                "box ({}, {})..({}, {}) exceeds page bounds {}x{}",
                self.x_start, self.y_start, self.x_end, self.y_end, page_width, page_height
            )));
        }
        Ok(())
    }
}

/// A stored reference document with structural metadata.
#[derive(Debug, Clone)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub total_pages: u32,
    pub created_at: String,
    pub updated_at: String,
}

/// Classification of one page, as returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub kind: PageKind,
    pub note: String,
}

impl Default for PageInfo {
    fn default() -> Self {
        Self {
            kind: PageKind::Variable,
            note: String::new(),
        }
    }
}

/// Per-kind page tallies for one template. Pages with no explicit record
/// are generated as variable pages but reported separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageKindCounts {
    pub variable: u32,
    pub reference: u32,
    pub undefined: u32,
}

/// A named, typed, rectangular marker on one template page.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub id: i64,
    pub template_id: i64,
    pub page_number: u32,
    pub variable_name: String,
    pub variable_kind: VariableKind,
    pub bbox: BoundingBox,
    pub sample_value: String,
    pub created_at: String,
}

/// Aggregated usage of one variable name across all templates.
#[derive(Debug, Clone, Serialize)]
pub struct VariableCatalogEntry {
    pub variable_name: String,
    pub variable_kind: VariableKind,
    pub sample_values: Vec<String>,
    pub usage_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_validation() {
        assert!(BoundingBox::new(10.0, 10.0, 100.0, 30.0).validate().is_ok());
        assert!(BoundingBox::new(100.0, 10.0, 100.0, 30.0).validate().is_err());
        assert!(BoundingBox::new(10.0, 30.0, 100.0, 30.0).validate().is_err());
        assert!(BoundingBox::new(-1.0, 0.0, 10.0, 10.0).validate().is_err());
    }

    #[test]
    fn bounding_box_within_page() {
        let bbox = BoundingBox::new(10.0, 10.0, 100.0, 30.0);
        assert!(bbox.validate_within(200, 200).is_ok());
        assert!(bbox.validate_within(50, 200).is_err());
    }

    #[test]
    fn kind_string_round_trips() {
        for kind in [PageKind::Variable, PageKind::Reference] {
            assert_eq!(PageKind::parse(kind.as_str()), kind);
        }
        for kind in [
            VariableKind::Text,
            VariableKind::Number,
            VariableKind::Date,
            VariableKind::Address,
            VariableKind::Other,
        ] {
            assert_eq!(VariableKind::parse(kind.as_str()), kind);
        }
    }
}

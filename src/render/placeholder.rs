//! Placeholder substitution across text-bearing document nodes.
//!
//! One generic traversal replaces `{{name}}` tokens wherever a format
//! adapter exposes mutable text. Adapters exist for docx (paragraphs and
//! table cells) and xlsx (worksheet cells); the substitution algorithm
//! itself knows nothing about either format.

use regex::Regex;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::sync::OnceLock;

use docx_rs::{
    read_docx, Docx, DocumentChild, ParagraphChild, RunChild, Table, TableCellContent,
    TableChild, TableRowChild,
};

use crate::error::{Error, Result};

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("valid token pattern"))
}

/// A document seen as a sequence of mutable text nodes, visited in
/// document order.
pub trait TextNodes {
    fn for_each_text(&mut self, visit: &mut dyn FnMut(&mut String));
}

/// Counters describing what one substitution pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionStats {
    /// Total token occurrences replaced.
    pub replaced: usize,
    /// Token names seen in the document with no matching value.
    pub unresolved: BTreeSet<String>,
}

/// Replace every `{{name}}` occurrence with its value across all text nodes.
/// Tokens with no matching value are left verbatim and reported.
pub fn substitute(document: &mut dyn TextNodes, values: &BTreeMap<String, String>) -> SubstitutionStats {
    let mut stats = SubstitutionStats::default();
    document.for_each_text(&mut |text| {
        replace_tokens(text, values, &mut stats);
    });
    stats
}

fn replace_tokens(
    text: &mut String,
    values: &BTreeMap<String, String>,
    stats: &mut SubstitutionStats,
) {
    if !text.contains("{{") {
        return;
    }
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;
    for captures in token_pattern().captures_iter(text) {
        let whole = captures.get(0).expect("match present");
        let name = captures.get(1).expect("group present").as_str();
        result.push_str(&text[last_end..whole.start()]);
        match values.get(name) {
            Some(value) => {
                result.push_str(value);
                stats.replaced += 1;
            }
            None => {
                result.push_str(whole.as_str());
                stats.unresolved.insert(name.to_string());
            }
        }
        last_end = whole.end();
    }
    result.push_str(&text[last_end..]);
    *text = result;
}

// ============================================================================
// docx adapter
// ============================================================================

/// A .docx document opened for in-place text substitution.
pub struct DocxTree {
    docx: Docx,
}

impl DocxTree {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        let docx = read_docx(&bytes)
            .map_err(|e| Error::render(format!("could not parse {}: {e:?}", path.display())))?;
        Ok(Self { docx })
    }

    pub fn save(self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| Error::io(format!("creating {}", path.display()), e))?;
        self.docx
            .build()
            .pack(file)
            .map_err(|e| Error::render(format!("could not write {}: {e:?}", path.display())))?;
        Ok(())
    }
}

impl TextNodes for DocxTree {
    fn for_each_text(&mut self, visit: &mut dyn FnMut(&mut String)) {
        for child in &mut self.docx.document.children {
            match child {
                DocumentChild::Paragraph(paragraph) => visit_paragraph(paragraph, visit),
                DocumentChild::Table(table) => visit_table(table, visit),
                _ => {}
            }
        }
    }
}

fn visit_paragraph(paragraph: &mut docx_rs::Paragraph, visit: &mut dyn FnMut(&mut String)) {
    for child in &mut paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &mut run.children {
                if let RunChild::Text(text) = run_child {
                    visit(&mut text.text);
                }
            }
        }
    }
}

fn visit_table(table: &mut Table, visit: &mut dyn FnMut(&mut String)) {
    for TableChild::TableRow(row) in &mut table.rows {
        for TableRowChild::TableCell(cell) in &mut row.cells {
            for content in &mut cell.children {
                match content {
                    TableCellContent::Paragraph(paragraph) => visit_paragraph(paragraph, visit),
                    TableCellContent::Table(nested) => visit_table(nested, visit),
                    _ => {}
                }
            }
        }
    }
}

// ============================================================================
// xlsx adapter
// ============================================================================

/// An .xlsx workbook opened for in-place cell substitution.
pub struct XlsxTree {
    book: umya_spreadsheet::Spreadsheet,
}

impl XlsxTree {
    pub fn load(path: &Path) -> Result<Self> {
        let book = umya_spreadsheet::reader::xlsx::read(path)
            .map_err(|e| Error::render(format!("could not parse {}: {e}", path.display())))?;
        Ok(Self { book })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        umya_spreadsheet::writer::xlsx::write(&self.book, path)
            .map_err(|e| Error::render(format!("could not write {}: {e}", path.display())))?;
        Ok(())
    }
}

impl TextNodes for XlsxTree {
    fn for_each_text(&mut self, visit: &mut dyn FnMut(&mut String)) {
        for sheet in self.book.get_sheet_collection_mut() {
            for cell in sheet.get_cell_collection_mut() {
                let original = cell.get_value().to_string();
                if original.is_empty() {
                    continue;
                }
                let mut text = original.clone();
                visit(&mut text);
                if text != original {
                    cell.set_value(text);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl TextNodes for Vec<String> {
        fn for_each_text(&mut self, visit: &mut dyn FnMut(&mut String)) {
            for text in self.iter_mut() {
                visit(text);
            }
        }
    }

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_every_occurrence_not_only_the_first() {
        let mut doc = vec![
            "姓名：{{name}}".to_string(),
            "本人 {{name}} 與 {{name}} 簽訂".to_string(),
        ];
        let stats = substitute(&mut doc, &values(&[("name", "王小明")]));

        assert_eq!(doc[0], "姓名：王小明");
        assert_eq!(doc[1], "本人 王小明 與 王小明 簽訂");
        assert_eq!(stats.replaced, 3);
        assert!(stats.unresolved.is_empty());
        assert!(!doc.iter().any(|t| t.contains("{{name}}")));
    }

    #[test]
    fn unresolved_tokens_are_left_verbatim_and_reported() {
        let mut doc = vec!["{{known}} and {{unknown}}".to_string()];
        let stats = substitute(&mut doc, &values(&[("known", "yes")]));

        assert_eq!(doc[0], "yes and {{unknown}}");
        assert_eq!(stats.replaced, 1);
        assert_eq!(
            stats.unresolved.iter().collect::<Vec<_>>(),
            vec!["unknown"]
        );
    }

    #[test]
    fn text_without_tokens_is_untouched() {
        let mut doc = vec!["no tokens here".to_string(), "almost {{ but not".to_string()];
        let stats = substitute(&mut doc, &values(&[("name", "x")]));
        assert_eq!(stats.replaced, 0);
        assert!(stats.unresolved.is_empty());
        assert_eq!(doc[1], "almost {{ but not");
    }

    #[test]
    fn substitution_works_through_the_xlsx_adapter() {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_mut(&0).unwrap();
        sheet.get_cell_mut((1, 1)).set_value("合約編號：{{contract_no}}");
        sheet.get_cell_mut((2, 3)).set_value("{{tenant}}");

        let mut tree = XlsxTree { book };
        let stats = substitute(
            &mut tree,
            &values(&[("contract_no", "A-001"), ("tenant", "王小明")]),
        );

        assert_eq!(stats.replaced, 2);
        let sheet = tree.book.get_sheet(&0).unwrap();
        assert_eq!(sheet.get_value((1, 1)), "合約編號：A-001");
        assert_eq!(sheet.get_value((2, 3)), "王小明");
    }

    #[test]
    fn substitution_works_through_the_docx_adapter() {
        use docx_rs::{Paragraph, Run};

        let docx = Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("姓名：{{name}}")))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("{{missing}}")));
        let mut tree = DocxTree { docx };

        let stats = substitute(&mut tree, &values(&[("name", "王小明")]));
        assert_eq!(stats.replaced, 1);
        assert_eq!(stats.unresolved.len(), 1);

        let mut collected = Vec::new();
        tree.for_each_text(&mut |t| collected.push(t.clone()));
        assert_eq!(collected, vec!["姓名：王小明", "{{missing}}"]);
    }
}

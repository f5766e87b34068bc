//! Coordinate-anchored text overlay for annotated templates.
//!
//! Values are drawn at each annotation's top-left corner. The underlying
//! page content is never touched: PDF overlays append a content stream,
//! raster overlays draw onto a copy of the page image.

use image::Rgba;
use imageproc::drawing::draw_text_mut;
use lopdf::{dictionary, Document, Object, Stream};
use rusttype::{Font, Scale};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::RenderConfig;
use crate::db::Annotation;
use crate::error::{Error, Result};

/// Overlay font resource name; chosen to dodge collisions with existing
/// page resources.
const OVERLAY_FONT_NAME: &str = "FdsOverlay";

/// Font locations probed when the config names none.
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// One value placed at a page position, in page-pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedText {
    pub page_number: u32,
    pub x: f64,
    pub y: f64,
    pub text: String,
}

/// Pair annotations with supplied values. Annotations whose variable has no
/// value are skipped, never blank-filled; the anchor is the box's top-left
/// corner.
pub fn plan_overlays(
    annotations: &[Annotation],
    values: &BTreeMap<String, String>,
) -> Vec<PlacedText> {
    annotations
        .iter()
        .filter_map(|ann| {
            values.get(&ann.variable_name).map(|value| PlacedText {
                page_number: ann.page_number,
                x: ann.bbox.x_start,
                y: ann.bbox.y_start,
                text: value.clone(),
            })
        })
        .collect()
}

fn by_page(placements: &[PlacedText]) -> BTreeMap<u32, Vec<&PlacedText>> {
    let mut pages: BTreeMap<u32, Vec<&PlacedText>> = BTreeMap::new();
    for placement in placements {
        pages.entry(placement.page_number).or_default().push(placement);
    }
    pages
}

// ============================================================================
// PDF overlay
// ============================================================================

/// Escape text for a PDF literal string. Characters outside Latin-1 cannot
/// be encoded with the built-in overlay font and degrade to '?'; the caller
/// is told so it can surface a warning.
fn pdf_escape(text: &str) -> (String, bool) {
    let mut escaped = String::with_capacity(text.len());
    let mut lossy = false;
    for ch in text.chars() {
        match ch {
            '(' => escaped.push_str("\\("),
            ')' => escaped.push_str("\\)"),
            '\\' => escaped.push_str("\\\\"),
            c if (c as u32) < 256 => escaped.push(c),
            _ => {
                escaped.push('?');
                lossy = true;
            }
        }
    }
    (escaped, lossy)
}

/// Convert a page-pixel anchor to PDF user space. Pixel space has its
/// origin at the top-left at `dpi` resolution; PDF user space is 72 points
/// per inch with the origin at the bottom-left. The text baseline sits one
/// em below the box's top edge.
fn to_pdf_point(x: f64, y: f64, page_height_pt: f64, dpi: u32, font_size_pt: f64) -> (f64, f64) {
    let scale = 72.0 / dpi as f64;
    let pdf_x = x * scale;
    let pdf_y = page_height_pt - y * scale - font_size_pt;
    (pdf_x, pdf_y)
}

fn page_height_pt(doc: &Document, page_id: lopdf::ObjectId) -> f64 {
    // MediaBox may be inherited; fall back to US Letter when unreadable.
    let media_box = doc
        .get_object(page_id)
        .ok()
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|dict| dict.get(b"MediaBox").ok())
        .and_then(|obj| obj.as_array().ok())
        .and_then(|arr| arr.get(3))
        .and_then(|obj| match obj {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r as f64),
            _ => None,
        });
    media_box.unwrap_or(792.0)
}

/// Draw values onto a PDF by appending one content stream per page. Returns
/// non-fatal warnings (unknown pages, characters the overlay font cannot
/// encode).
pub fn overlay_pdf(
    source: &Path,
    placements: &[PlacedText],
    config: &RenderConfig,
    dpi: u32,
    output: &Path,
) -> Result<Vec<String>> {
    if !source.exists() {
        return Err(Error::missing(source));
    }
    let mut doc = Document::load(source)
        .map_err(|e| Error::render(format!("could not parse {}: {e}", source.display())))?;
    let pages = doc.get_pages();
    let mut warnings = Vec::new();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let [r, g, b] = config.font_color;
    let (rf, gf, bf) = (r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    // Size is configured in page-pixel units; content streams want points.
    let size_pt = config.font_size as f64 * 72.0 / dpi as f64;

    for (page_number, page_placements) in by_page(placements) {
        let Some(&page_id) = pages.get(&page_number) else {
            warnings.push(format!("page {page_number} not present in {}", source.display()));
            continue;
        };
        let height_pt = page_height_pt(&doc, page_id);

        let mut ops = String::from("q\nBT\n");
        ops.push_str(&format!("/{OVERLAY_FONT_NAME} {size_pt:.2} Tf\n"));
        ops.push_str(&format!("{rf:.3} {gf:.3} {bf:.3} rg\n"));
        for placement in page_placements {
            let (x, y) = to_pdf_point(placement.x, placement.y, height_pt, dpi, size_pt);
            let (escaped, lossy) = pdf_escape(&placement.text);
            if lossy {
                warnings.push(format!(
                    "value '{}' on page {page_number} contains characters the overlay font cannot encode",
                    placement.text
                ));
            }
            ops.push_str(&format!("1 0 0 1 {x:.2} {y:.2} Tm\n({escaped}) Tj\n"));
        }
        ops.push_str("ET\nQ\n");

        let stream_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
        register_overlay(&mut doc, page_id, font_id, stream_id)
            .map_err(|e| Error::render(format!("page {page_number}: {e}")))?;
    }

    doc.save(output)
        .map_err(|e| Error::render(format!("could not write {}: {e}", output.display())))?;
    Ok(warnings)
}

/// Make the overlay font reachable from the page and chain the new content
/// stream after the existing ones.
fn register_overlay(
    doc: &mut Document,
    page_id: lopdf::ObjectId,
    font_id: lopdf::ObjectId,
    stream_id: lopdf::ObjectId,
) -> std::result::Result<(), lopdf::Error> {
    // Inherited resources are materialized onto the page before editing.
    let resources = match doc
        .get_object(page_id)?
        .as_dict()?
        .get(b"Resources")
        .ok()
        .cloned()
    {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => doc.get_object(id)?.as_dict()?.clone(),
        _ => dictionary! {},
    };
    let mut resources = resources;
    let mut fonts = match resources.get(b"Font").ok().cloned() {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => doc.get_object(id)?.as_dict()?.clone(),
        _ => dictionary! {},
    };
    fonts.set(OVERLAY_FONT_NAME, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));

    let existing_contents = doc
        .get_object(page_id)?
        .as_dict()?
        .get(b"Contents")
        .ok()
        .cloned();
    let mut contents: Vec<Object> = match existing_contents {
        Some(Object::Array(items)) => items,
        Some(single @ Object::Reference(_)) => vec![single],
        Some(other) => vec![other],
        None => Vec::new(),
    };
    contents.push(Object::Reference(stream_id));

    let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));
    Ok(())
}

// ============================================================================
// Raster overlay
// ============================================================================

fn load_overlay_font(config: &RenderConfig) -> Result<Font<'static>> {
    let candidates: Vec<PathBuf> = match &config.font_path {
        Some(path) => vec![path.clone()],
        None => FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
    };
    for candidate in &candidates {
        if let Ok(bytes) = std::fs::read(candidate) {
            if let Some(font) = Font::try_from_vec(bytes) {
                return Ok(font);
            }
        }
    }
    Err(Error::render(
        "no usable overlay font found; set render.font_path in the config",
    ))
}

/// Draw values onto a copy of a page image. Placements are expected to be
/// pre-filtered to this page.
pub fn overlay_raster(
    source: &Path,
    placements: &[PlacedText],
    config: &RenderConfig,
    output: &Path,
) -> Result<Vec<String>> {
    if !source.exists() {
        return Err(Error::missing(source));
    }
    let mut page = image::open(source)
        .map_err(|e| Error::render(format!("could not decode {}: {e}", source.display())))?
        .to_rgba8();
    let font = load_overlay_font(config)?;
    let [r, g, b] = config.font_color;
    let color = Rgba([r, g, b, 255]);
    let scale = Scale::uniform(config.font_size);
    let mut warnings = Vec::new();

    let (width, height) = page.dimensions();
    for placement in placements {
        if placement.x >= width as f64 || placement.y >= height as f64 {
            warnings.push(format!(
                "anchor ({}, {}) is outside the {}x{} page image",
                placement.x, placement.y, width, height
            ));
            continue;
        }
        draw_text_mut(
            &mut page,
            color,
            placement.x as i32,
            placement.y as i32,
            scale,
            &font,
            &placement.text,
        );
    }

    page.save(output)
        .map_err(|e| Error::render(format!("could not write {}: {e}", output.display())))?;
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BoundingBox, VariableKind};

    fn annotation(name: &str, page: u32, bbox: BoundingBox) -> Annotation {
        Annotation {
            id: 0,
            template_id: 1,
            page_number: page,
            variable_name: name.to_string(),
            variable_kind: VariableKind::Text,
            bbox,
            sample_value: String::new(),
            created_at: String::new(),
        }
    }

    #[test]
    fn plan_places_values_at_top_left_and_skips_missing() {
        let annotations = vec![
            annotation("date", 1, BoundingBox::new(10.0, 10.0, 100.0, 30.0)),
            annotation("absent", 1, BoundingBox::new(50.0, 50.0, 80.0, 70.0)),
        ];
        let mut values = BTreeMap::new();
        values.insert("date".to_string(), "2024-01-01".to_string());

        let placements = plan_overlays(&annotations, &values);
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].page_number, 1);
        assert_eq!(placements[0].x, 10.0);
        assert_eq!(placements[0].y, 10.0);
        assert_eq!(placements[0].text, "2024-01-01");
    }

    #[test]
    fn plan_keeps_annotation_order_within_a_page() {
        let annotations = vec![
            annotation("a", 2, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            annotation("b", 1, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            annotation("c", 2, BoundingBox::new(20.0, 20.0, 30.0, 30.0)),
        ];
        let values: BTreeMap<String, String> = [("a", "1"), ("b", "2"), ("c", "3")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let placements = plan_overlays(&annotations, &values);
        let pages = by_page(&placements);
        assert_eq!(pages[&2].len(), 2);
        assert_eq!(pages[&2][0].text, "1");
        assert_eq!(pages[&2][1].text, "3");
        assert_eq!(pages[&1].len(), 1);
    }

    #[test]
    fn pdf_escaping_handles_delimiters_and_flags_lossy_text() {
        let (escaped, lossy) = pdf_escape("a(b)c\\d");
        assert_eq!(escaped, "a\\(b\\)c\\\\d");
        assert!(!lossy);

        let (escaped, lossy) = pdf_escape("王小明");
        assert_eq!(escaped, "???");
        assert!(lossy);
    }

    #[test]
    fn pixel_anchor_maps_into_pdf_user_space() {
        // 200 dpi pixel (100, 200) on an 11in page: 36pt from the left,
        // 72pt down from the top edge, minus the font ascent.
        let (x, y) = to_pdf_point(100.0, 200.0, 792.0, 200, 12.0);
        assert!((x - 36.0).abs() < 1e-9);
        assert!((y - (792.0 - 72.0 - 12.0)).abs() < 1e-9);
    }
}

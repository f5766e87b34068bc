//! Similarity comparison between a reference template and a candidate
//! document.
//!
//! The engine walks Pending -> Parsing -> Scoring -> Completed, dropping to
//! Failed on an unrecoverable error. Scoring itself is pluggable; this
//! module owns only aggregation and the threshold policy.

pub mod scorer;

use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::{Annotation, FileKind, PageKind};
use crate::error::{Error, Result};
use crate::render::rasterize::{pdf_page_count, RasterCache};
use scorer::PageScorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonPhase {
    Pending,
    Parsing,
    Scoring,
    Completed,
    Failed,
}

/// Pass thresholds. A variable-page field is always held to a strictly
/// higher bar than a whole-page reference check: reference + 10, capped
/// at 95.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    pub reference: f64,
}

impl ThresholdPolicy {
    pub fn new(reference: f64) -> Self {
        Self { reference }
    }

    pub fn variable(&self) -> f64 {
        (self.reference + 10.0).min(95.0)
    }

    /// Whole-page checks use the reference threshold regardless of kind;
    /// only per-variable crops are held to the stricter bar.
    pub fn page_passes(&self, _kind: PageKind, score: f64) -> bool {
        score >= self.reference
    }

    pub fn variable_passes(&self, score: f64) -> bool {
        score >= self.variable()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub page_number: u32,
    pub kind: PageKind,
    pub score: f64,
    pub pass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableResult {
    pub page_number: u32,
    pub variable_name: String,
    pub score: f64,
    pub pass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ComparisonReport {
    pub overall_similarity: f64,
    pub pages: Vec<PageResult>,
    pub variables: Vec<VariableResult>,
    pub missing_pages: Vec<u32>,
    pub warnings: Vec<String>,
}

/// One reference page handed to the engine: its classification, its stored
/// page image, and (for variable pages) the annotations to check.
#[derive(Debug, Clone)]
pub struct ReferencePage {
    pub page_number: u32,
    pub kind: PageKind,
    pub image_path: PathBuf,
    pub annotations: Vec<Annotation>,
}

pub struct ComparisonEngine {
    scorer: Box<dyn PageScorer>,
    policy: ThresholdPolicy,
    phase: ComparisonPhase,
}

impl ComparisonEngine {
    pub fn new(scorer: Box<dyn PageScorer>, policy: ThresholdPolicy) -> Self {
        Self {
            scorer,
            policy,
            phase: ComparisonPhase::Pending,
        }
    }

    pub fn phase(&self) -> ComparisonPhase {
        self.phase
    }

    /// Compare candidate page images against the reference pages. Candidate
    /// page N is `candidate_pages[N-1]`.
    pub fn run(
        &mut self,
        reference: &[ReferencePage],
        candidate_pages: &[PathBuf],
    ) -> Result<ComparisonReport> {
        match self.run_inner(reference, candidate_pages) {
            Ok(report) => {
                self.phase = ComparisonPhase::Completed;
                Ok(report)
            }
            Err(err) => {
                self.phase = ComparisonPhase::Failed;
                Err(err)
            }
        }
    }

    fn run_inner(
        &mut self,
        reference: &[ReferencePage],
        candidate_pages: &[PathBuf],
    ) -> Result<ComparisonReport> {
        let mut report = ComparisonReport::default();

        self.phase = ComparisonPhase::Parsing;
        let mut pairs: Vec<(&ReferencePage, DynamicImage, DynamicImage)> = Vec::new();
        for page in reference {
            let candidate_path = match candidate_pages.get(page.page_number as usize - 1) {
                Some(path) => path,
                None => {
                    report.missing_pages.push(page.page_number);
                    continue;
                }
            };
            let reference_image = load_page(&page.image_path)?;
            let candidate_image = load_page(candidate_path)?;
            pairs.push((page, reference_image, candidate_image));
        }
        if candidate_pages.len() > reference.len() {
            report.warnings.push(format!(
                "candidate has {} extra page(s) beyond the template",
                candidate_pages.len() - reference.len()
            ));
        }

        self.phase = ComparisonPhase::Scoring;
        let mut score_sum = 0.0;
        for (page, reference_image, candidate_image) in &pairs {
            let score = self.scorer.score(reference_image, candidate_image)?;
            score_sum += score;
            report.pages.push(PageResult {
                page_number: page.page_number,
                kind: page.kind,
                score,
                pass: self.policy.page_passes(page.kind, score),
            });

            if page.kind != PageKind::Variable {
                continue;
            }
            for annotation in &page.annotations {
                let reference_crop = crop_to(reference_image, annotation);
                let candidate_crop = crop_to(candidate_image, annotation);
                let score = self.scorer.score(&reference_crop, &candidate_crop)?;
                report.variables.push(VariableResult {
                    page_number: page.page_number,
                    variable_name: annotation.variable_name.clone(),
                    score,
                    pass: self.policy.variable_passes(score),
                });
            }
        }

        report.overall_similarity = if report.pages.is_empty() {
            0.0
        } else {
            score_sum / report.pages.len() as f64
        };
        if !report.missing_pages.is_empty() {
            report.warnings.push(format!(
                "{} template page(s) have no counterpart in the candidate",
                report.missing_pages.len()
            ));
        }
        Ok(report)
    }
}

fn load_page(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(Error::missing(path));
    }
    image::open(path).map_err(|e| Error::render(format!("could not decode {}: {e}", path.display())))
}

/// Crop a page image to an annotation's box, clamped to the page.
fn crop_to(page: &DynamicImage, annotation: &Annotation) -> DynamicImage {
    let bbox = annotation.bbox;
    let x = bbox.x_start.max(0.0) as u32;
    let y = bbox.y_start.max(0.0) as u32;
    let width = (bbox.width().max(1.0) as u32).min(page.width().saturating_sub(x).max(1));
    let height = (bbox.height().max(1.0) as u32).min(page.height().saturating_sub(y).max(1));
    page.crop_imm(x, y, width, height)
}

/// Turn a candidate document into page images ready for scoring. PDFs go
/// through the rasterizer; a raster image stands for a single page.
pub fn prepare_candidate(
    path: &Path,
    cache: Option<&RasterCache>,
    dpi: u32,
) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(Error::missing(path));
    }
    match FileKind::from_path(path) {
        Some(FileKind::Pdf) => {
            let cache = cache.ok_or_else(|| {
                Error::render("no PDF rasterizer available for the candidate document")
            })?;
            let total = pdf_page_count(path)?;
            let key = format!("candidate_{}", crate::storage::sha256_hex(path)?);
            let mut pages = Vec::with_capacity(total as usize);
            for page_number in 1..=total {
                pages.push(cache.page_image(&key, path, page_number, dpi)?);
            }
            Ok(pages)
        }
        Some(FileKind::Raster) => Ok(vec![path.to_path_buf()]),
        Some(other) => Err(Error::unsupported(other.as_str(), "comparison")),
        None => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string();
            Err(Error::unsupported(ext, "comparison"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BoundingBox, VariableKind};

    struct FixedScorer(f64);

    impl PageScorer for FixedScorer {
        fn score(&self, _reference: &DynamicImage, _candidate: &DynamicImage) -> Result<f64> {
            Ok(self.0)
        }
    }

    fn write_page(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbaImage::from_pixel(100, 100, image::Rgba([255, 255, 255, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn annotation(name: &str, page: u32) -> Annotation {
        Annotation {
            id: 0,
            template_id: 1,
            page_number: page,
            variable_name: name.to_string(),
            variable_kind: VariableKind::Text,
            bbox: BoundingBox::new(10.0, 10.0, 60.0, 40.0),
            sample_value: String::new(),
            created_at: String::new(),
        }
    }

    #[test]
    fn variable_threshold_is_strictly_above_reference_threshold() {
        let policy = ThresholdPolicy::new(70.0);
        assert_eq!(policy.variable(), 80.0);

        // A score inside [T, T+10) passes as a reference page but fails as
        // a variable-page field.
        for score in [70.0, 75.0, 79.9] {
            assert!(policy.page_passes(PageKind::Reference, score));
            assert!(!policy.variable_passes(score));
        }
        assert!(policy.variable_passes(80.0));
    }

    #[test]
    fn variable_threshold_is_capped_at_95() {
        let policy = ThresholdPolicy::new(92.0);
        assert_eq!(policy.variable(), 95.0);
    }

    #[test]
    fn engine_reports_pages_variables_and_missing_pages() {
        let dir = tempfile::tempdir().unwrap();
        let reference = vec![
            ReferencePage {
                page_number: 1,
                kind: PageKind::Variable,
                image_path: write_page(dir.path(), "ref1.png"),
                annotations: vec![annotation("tenant", 1), annotation("date", 1)],
            },
            ReferencePage {
                page_number: 2,
                kind: PageKind::Reference,
                image_path: write_page(dir.path(), "ref2.png"),
                annotations: vec![],
            },
        ];
        let candidate = vec![write_page(dir.path(), "cand1.png")];

        let mut engine =
            ComparisonEngine::new(Box::new(FixedScorer(85.0)), ThresholdPolicy::new(70.0));
        assert_eq!(engine.phase(), ComparisonPhase::Pending);
        let report = engine.run(&reference, &candidate).unwrap();

        assert_eq!(engine.phase(), ComparisonPhase::Completed);
        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.pages[0].page_number, 1);
        assert!(report.pages[0].pass);
        assert_eq!(report.variables.len(), 2);
        assert!(report.variables.iter().all(|v| v.pass));
        assert_eq!(report.missing_pages, vec![2]);
        assert_eq!(report.overall_similarity, 85.0);
        assert!(!report.warnings.is_empty());
    }

    #[test]
    fn score_in_the_gap_passes_page_but_fails_variable() {
        let dir = tempfile::tempdir().unwrap();
        let reference = vec![ReferencePage {
            page_number: 1,
            kind: PageKind::Variable,
            image_path: write_page(dir.path(), "ref.png"),
            annotations: vec![annotation("tenant", 1)],
        }];
        let candidate = vec![write_page(dir.path(), "cand.png")];

        let mut engine =
            ComparisonEngine::new(Box::new(FixedScorer(75.0)), ThresholdPolicy::new(70.0));
        let report = engine.run(&reference, &candidate).unwrap();

        assert!(report.pages[0].pass);
        assert!(!report.variables[0].pass);
    }

    #[test]
    fn failed_phase_on_unreadable_reference() {
        let reference = vec![ReferencePage {
            page_number: 1,
            kind: PageKind::Reference,
            image_path: PathBuf::from("/nonexistent/ref.png"),
            annotations: vec![],
        }];
        let candidate = vec![PathBuf::from("/nonexistent/cand.png")];

        let mut engine =
            ComparisonEngine::new(Box::new(FixedScorer(50.0)), ThresholdPolicy::new(70.0));
        assert!(engine.run(&reference, &candidate).is_err());
        assert_eq!(engine.phase(), ComparisonPhase::Failed);
    }

    #[test]
    fn report_serializes_and_parses_back_equal() {
        let report = ComparisonReport {
            overall_similarity: 87.5,
            pages: vec![PageResult {
                page_number: 1,
                kind: PageKind::Variable,
                score: 87.5,
                pass: true,
            }],
            variables: vec![VariableResult {
                page_number: 1,
                variable_name: "tenant".into(),
                score: 90.0,
                pass: true,
            }],
            missing_pages: vec![],
            warnings: vec![],
        };
        let json = serde_json::to_string(&report).unwrap();
        let parsed: ComparisonReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }
}

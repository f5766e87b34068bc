//! PDF page rasterization behind a capability interface.
//!
//! Two interchangeable backends (poppler's `pdftoppm`, mupdf's `mutool`)
//! are selected by a single startup probe instead of per-call-site
//! fallbacks. Rasterized pages are memoized on disk per
//! (template, page, dpi) for the lifetime of the cache directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};

/// Renders one PDF page to a PNG file at the given resolution.
pub trait PageRasterizer {
    fn name(&self) -> &'static str;
    fn rasterize(&self, pdf: &Path, page_number: u32, dpi: u32, output: &Path) -> Result<()>;
}

pub struct PdftoppmRasterizer;

impl PageRasterizer for PdftoppmRasterizer {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    fn rasterize(&self, pdf: &Path, page_number: u32, dpi: u32, output: &Path) -> Result<()> {
        // -singlefile writes exactly `<prefix>.png`.
        let prefix = output.with_extension("");
        let status = Command::new("pdftoppm")
            .arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg(pdf)
            .arg(&prefix)
            .status()
            .map_err(|e| Error::io("spawning pdftoppm".to_string(), e))?;
        if !status.success() {
            return Err(Error::render(format!(
                "pdftoppm failed on page {page_number} of {}",
                pdf.display()
            )));
        }
        Ok(())
    }
}

pub struct MutoolRasterizer;

impl PageRasterizer for MutoolRasterizer {
    fn name(&self) -> &'static str {
        "mutool"
    }

    fn rasterize(&self, pdf: &Path, page_number: u32, dpi: u32, output: &Path) -> Result<()> {
        let status = Command::new("mutool")
            .arg("draw")
            .arg("-o")
            .arg(output)
            .arg("-r")
            .arg(dpi.to_string())
            .arg(pdf)
            .arg(page_number.to_string())
            .status()
            .map_err(|e| Error::io("spawning mutool".to_string(), e))?;
        if !status.success() {
            return Err(Error::render(format!(
                "mutool failed on page {page_number} of {}",
                pdf.display()
            )));
        }
        Ok(())
    }
}

fn binary_available(binary: &str, probe_arg: &str) -> bool {
    Command::new(binary).arg(probe_arg).output().is_ok()
}

/// One startup probe for an available backend, poppler preferred.
pub fn probe() -> Option<Box<dyn PageRasterizer>> {
    if binary_available("pdftoppm", "-v") {
        tracing::debug!("rasterizer probe selected pdftoppm");
        return Some(Box::new(PdftoppmRasterizer));
    }
    if binary_available("mutool", "-v") {
        tracing::debug!("rasterizer probe selected mutool");
        return Some(Box::new(MutoolRasterizer));
    }
    tracing::warn!("no PDF rasterizer found; install poppler-utils or mupdf-tools");
    None
}

/// Number of pages in a PDF, read from its page tree.
pub fn pdf_page_count(pdf: &Path) -> Result<u32> {
    if !pdf.exists() {
        return Err(Error::missing(pdf));
    }
    let doc = lopdf::Document::load(pdf)
        .map_err(|e| Error::render(format!("could not parse {}: {e}", pdf.display())))?;
    Ok(doc.get_pages().len() as u32)
}

/// Disk-backed memo of rasterized template pages.
pub struct RasterCache {
    dir: PathBuf,
    rasterizer: Box<dyn PageRasterizer>,
}

impl RasterCache {
    pub fn new(dir: impl Into<PathBuf>, rasterizer: Box<dyn PageRasterizer>) -> Self {
        Self {
            dir: dir.into(),
            rasterizer,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.rasterizer.name()
    }

    fn cache_path(&self, cache_key: &str, page_number: u32, dpi: u32) -> PathBuf {
        self.dir.join(format!("{cache_key}_p{page_number}_{dpi}.png"))
    }

    /// Rasterize a page, reusing the cached image when present.
    pub fn page_image(
        &self,
        cache_key: &str,
        pdf: &Path,
        page_number: u32,
        dpi: u32,
    ) -> Result<PathBuf> {
        let cached = self.cache_path(cache_key, page_number, dpi);
        if cached.exists() {
            return Ok(cached);
        }
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::io(format!("creating {}", self.dir.display()), e))?;
        self.rasterizer.rasterize(pdf, page_number, dpi, &cached)?;
        if !cached.exists() {
            return Err(Error::render(format!(
                "{} produced no output for page {page_number}",
                self.rasterizer.name()
            )));
        }
        Ok(cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingRasterizer {
        calls: std::cell::Cell<u32>,
    }

    impl PageRasterizer for CountingRasterizer {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn rasterize(&self, _pdf: &Path, _page: u32, _dpi: u32, output: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            let page = image::RgbaImage::from_pixel(4, 4, image::Rgba([255, 255, 255, 255]));
            page.save(output)
                .map_err(|e| Error::render(e.to_string()))?;
            Ok(())
        }
    }

    #[test]
    fn cache_memoizes_per_page_and_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let cache = RasterCache::new(
            dir.path(),
            Box::new(CountingRasterizer {
                calls: std::cell::Cell::new(0),
            }),
        );

        let first = cache
            .page_image("7", Path::new("ignored.pdf"), 1, 200)
            .unwrap();
        let second = cache
            .page_image("7", Path::new("ignored.pdf"), 1, 200)
            .unwrap();
        assert_eq!(first, second);

        // Different page or resolution means a different cache slot.
        let other_page = cache
            .page_image("7", Path::new("ignored.pdf"), 2, 200)
            .unwrap();
        let other_dpi = cache
            .page_image("7", Path::new("ignored.pdf"), 1, 300)
            .unwrap();
        assert_ne!(first, other_page);
        assert_ne!(first, other_dpi);
    }

    #[test]
    fn missing_pdf_is_source_missing() {
        let err = pdf_page_count(Path::new("/nonexistent/input.pdf")).unwrap_err();
        assert!(matches!(err, Error::SourceMissing { .. }));
    }
}

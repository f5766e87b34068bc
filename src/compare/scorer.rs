//! Pluggable page scoring.
//!
//! The engine only needs a number between 0 and 100 for a pair of page
//! images; how that number is produced is an external concern. The default
//! implementation hashes both pages perceptually and maps the hamming
//! distance onto the score range. It is a best-effort visual measure, not a
//! production-grade similarity algorithm.

use image::DynamicImage;
use img_hash::{HasherConfig, ImageHash};

use crate::error::{Error, Result};

/// Scores how similar a candidate page is to a reference page, 0-100.
pub trait PageScorer {
    fn score(&self, reference: &DynamicImage, candidate: &DynamicImage) -> Result<f64>;
}

pub struct PerceptualScorer {
    hash_size: u32,
}

impl PerceptualScorer {
    pub fn new(hash_size: u32) -> Self {
        Self { hash_size }
    }

    fn hash(&self, image: &DynamicImage) -> Result<ImageHash> {
        let hasher = HasherConfig::new()
            .hash_size(self.hash_size, self.hash_size)
            .to_hasher();

        // img_hash bundles its own image types; hand the pixels over raw.
        let thumbnail = image.thumbnail(64, 64).to_rgba8();
        let (width, height) = thumbnail.dimensions();
        let converted = img_hash::image::RgbaImage::from_raw(width, height, thumbnail.into_raw())
            .ok_or_else(|| Error::render("could not prepare page image for hashing"))?;
        Ok(hasher.hash_image(&img_hash::image::DynamicImage::ImageRgba8(converted)))
    }
}

impl Default for PerceptualScorer {
    fn default() -> Self {
        Self::new(16)
    }
}

impl PageScorer for PerceptualScorer {
    fn score(&self, reference: &DynamicImage, candidate: &DynamicImage) -> Result<f64> {
        let reference_hash = self.hash(reference)?;
        let candidate_hash = self.hash(candidate)?;
        let bits = (self.hash_size * self.hash_size) as f64;
        let distance = reference_hash.dist(&candidate_hash) as f64;
        Ok(((1.0 - distance / bits) * 100.0).clamp(0.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_image(rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            64,
            64,
            image::Rgba([rgb[0], rgb[1], rgb[2], 255]),
        ))
    }

    fn split_image() -> DynamicImage {
        let mut img = image::RgbaImage::from_pixel(64, 64, image::Rgba([255, 255, 255, 255]));
        for y in 0..64 {
            for x in 0..32 {
                img.put_pixel(x, y, image::Rgba([0, 0, 0, 255]));
            }
        }
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn identical_pages_score_one_hundred() {
        let scorer = PerceptualScorer::default();
        let page = flat_image([250, 250, 250]);
        let score = scorer.score(&page, &page).unwrap();
        assert_eq!(score, 100.0);
    }

    #[test]
    fn dissimilar_pages_score_lower_than_identical_ones() {
        let scorer = PerceptualScorer::default();
        let blank = flat_image([255, 255, 255]);
        let halved = split_image();
        let identical = scorer.score(&blank, &blank).unwrap();
        let different = scorer.score(&blank, &halved).unwrap();
        assert!(different < identical);
        assert!((0.0..=100.0).contains(&different));
    }
}

//! OCR image filter built on the `image` crate.
//!
//! Full mode:
//!
//! ```text
//! decode → grayscale → median blur(k) → gaussian adaptive threshold(block, C) → JPEG
//! ```
//!
//! Simple mode stops after grayscale.  The morphological close that
//! traditionally follows the threshold uses a 1×1 structuring element, which
//! is the identity, so it is not performed.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageError, ImageFormat, Luma};

use super::{ImagePreprocessor, PreprocessError, PreprocessOptions};

/// Production [`ImagePreprocessor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFilter;

impl ImageFilter {
    pub fn new() -> Self {
        Self
    }

    /// Apply the configured filter chain to an already-decoded image.
    pub fn filter(&self, img: &DynamicImage, options: &PreprocessOptions) -> GrayImage {
        let gray = img.to_luma8();
        if options.simple_mode {
            return gray;
        }
        let blurred = median_blur(&gray, options.effective_blur_kernel());
        adaptive_threshold_gaussian(
            &blurred,
            options.threshold_block_size,
            options.threshold_constant,
        )
    }
}

impl ImagePreprocessor for ImageFilter {
    fn preprocess(
        &self,
        source: &Path,
        dest: &Path,
        options: &PreprocessOptions,
    ) -> Result<(), PreprocessError> {
        options.validate()?;

        let img = image::open(source).map_err(|e| match e {
            ImageError::IoError(io) => PreprocessError::Read(io.to_string()),
            other => PreprocessError::Decode(format!("{}: {other}", source.display())),
        })?;

        let processed = self.filter(&img, options);

        DynamicImage::ImageLuma8(processed)
            .save_with_format(dest, ImageFormat::Jpeg)
            .map_err(|e| PreprocessError::Write(format!("{}: {e}", dest.display())))?;

        log::debug!("preprocess: saved {}", dest.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Median filter with a `ksize × ksize` window and replicated borders.
///
/// `ksize` must be odd; 1 returns a copy.
pub fn median_blur(img: &GrayImage, ksize: u32) -> GrayImage {
    if ksize <= 1 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let r = (ksize / 2) as i64;
    let mut window: Vec<u8> = Vec::with_capacity((ksize * ksize) as usize);

    GrayImage::from_fn(w, h, |x, y| {
        window.clear();
        for dy in -r..=r {
            for dx in -r..=r {
                let sx = clamp(x as i64 + dx, w);
                let sy = clamp(y as i64 + dy, h);
                window.push(img.get_pixel(sx, sy)[0]);
            }
        }
        let mid = window.len() / 2;
        let (_, median, _) = window.select_nth_unstable(mid);
        Luma([*median])
    })
}

/// Binary threshold against a Gaussian-weighted neighbourhood mean.
///
/// A pixel becomes 255 when it is brighter than `mean - c`, else 0.
/// `block` must be odd and greater than 1.
pub fn adaptive_threshold_gaussian(img: &GrayImage, block: u32, c: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let kernel = gaussian_kernel(block);
    let r = (block / 2) as i64;

    // Separable convolution: rows into `horizontal`, then columns on read.
    let mut horizontal = vec![0f32; (w as usize) * (h as usize)];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (i, weight) in kernel.iter().enumerate() {
                let sx = clamp(x as i64 + i as i64 - r, w);
                acc += weight * img.get_pixel(sx, y)[0] as f32;
            }
            horizontal[(y * w + x) as usize] = acc;
        }
    }

    GrayImage::from_fn(w, h, |x, y| {
        let mut mean = 0f32;
        for (i, weight) in kernel.iter().enumerate() {
            let sy = clamp(y as i64 + i as i64 - r, h);
            mean += weight * horizontal[(sy * w + x) as usize];
        }
        let threshold = mean.round() - c as f32;
        if img.get_pixel(x, y)[0] as f32 > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Normalised 1-D Gaussian weights; sigma derived from the size the way
/// common vision libraries do when none is given.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size as f32 - 1.0) / 2.0;
    let raw: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|v| v / sum).collect()
}

fn clamp(v: i64, len: u32) -> u32 {
    v.clamp(0, len as i64 - 1) as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use tempfile::tempdir;

    fn full_options() -> PreprocessOptions {
        PreprocessOptions {
            simple_mode: false,
            ..PreprocessOptions::default()
        }
    }

    #[test]
    fn median_removes_isolated_speck() {
        let mut img = GrayImage::from_pixel(5, 5, Luma([200]));
        img.put_pixel(2, 2, Luma([0]));

        let out = median_blur(&img, 3);
        assert_eq!(out.get_pixel(2, 2)[0], 200);
        assert_eq!(out.dimensions(), (5, 5));
    }

    #[test]
    fn median_kernel_one_is_identity() {
        let mut img = GrayImage::new(3, 3);
        img.put_pixel(1, 1, Luma([42]));
        assert_eq!(median_blur(&img, 1), img);
    }

    #[test]
    fn gaussian_kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(15);
        assert_eq!(k.len(), 15);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((k[0] - k[14]).abs() < 1e-7);
        assert!(k[7] > k[0]);
    }

    #[test]
    fn threshold_output_is_binary() {
        let img = GrayImage::from_fn(20, 20, |x, y| Luma([((x * 13 + y * 7) % 256) as u8]));
        let out = adaptive_threshold_gaussian(&img, 15, 10);
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn dark_stroke_on_light_page_becomes_black() {
        let mut img = GrayImage::from_pixel(21, 21, Luma([220]));
        for y in 0..21 {
            img.put_pixel(10, y, Luma([30]));
        }
        let out = adaptive_threshold_gaussian(&img, 15, 10);
        assert_eq!(out.get_pixel(10, 10)[0], 0);
        assert_eq!(out.get_pixel(2, 10)[0], 255);
    }

    #[test]
    fn simple_mode_is_plain_grayscale() {
        let rgb = RgbImage::from_pixel(4, 4, image::Rgb([10, 200, 30]));
        let img = DynamicImage::ImageRgb8(rgb);
        let out = ImageFilter::new().filter(&img, &PreprocessOptions::default());
        assert_eq!(out, img.to_luma8());
    }

    #[test]
    fn preprocess_writes_jpeg() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("page.png");
        let dest = dir.path().join("page.jpeg");
        RgbImage::from_pixel(16, 16, image::Rgb([250, 250, 250]))
            .save(&src)
            .unwrap();

        ImageFilter::new()
            .preprocess(&src, &dest, &full_options())
            .unwrap();

        let written = image::open(&dest).unwrap();
        assert_eq!((written.width(), written.height()), (16, 16));
    }

    #[test]
    fn undecodable_source_is_terminal() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("broken.png");
        std::fs::write(&src, b"definitely not a png").unwrap();

        let err = ImageFilter::new()
            .preprocess(&src, &dir.path().join("out.jpeg"), &PreprocessOptions::default())
            .unwrap_err();
        assert!(!err.is_retryable(), "got {err:?}");
    }

    #[test]
    fn unwritable_destination_is_retryable() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("page.png");
        GrayImage::new(4, 4).save(&src).unwrap();

        let err = ImageFilter::new()
            .preprocess(
                &src,
                &dir.path().join("missing_dir").join("out.jpeg"),
                &PreprocessOptions::default(),
            )
            .unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
    }
}

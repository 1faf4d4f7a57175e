//! Sizing and placement of rendered diagrams on a slide.
//!
//! All lengths here are inches. Conversion to EMU happens in the document layer.

use anyhow::{Result, anyhow};
use std::path::Path;
use tracing::warn;

/// Widescreen slide canvas.
pub const SLIDE_CANVAS: DisplaySize = DisplaySize {
    width: 13.33,
    height: 7.5,
};

/// Used when a rendered image cannot be read.
pub const FALLBACK_SIZE: DisplaySize = DisplaySize {
    width: 8.0,
    height: 3.0,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    pub left: f64,
    pub top: f64,
}

/// Scales a pixel size down (never up) so it fits inside `bounds`, keeping the aspect ratio.
pub fn fit_pixels(width_px: u32, height_px: u32, bounds: DisplaySize, dpi: f64) -> Result<DisplaySize> {
    if width_px == 0 || height_px == 0 {
        return Err(anyhow!(
            "image has an empty dimension ({}x{})",
            width_px,
            height_px
        ));
    }
    if !(dpi.is_finite() && dpi > 0.0) {
        return Err(anyhow!("pixel density must be positive (got {})", dpi));
    }
    if !(bounds.width > 0.0 && bounds.height > 0.0) {
        return Err(anyhow!(
            "display bounds must be positive ({}x{})",
            bounds.width,
            bounds.height
        ));
    }

    let mut width = f64::from(width_px) / dpi;
    let mut height = f64::from(height_px) / dpi;
    let aspect_ratio = f64::from(width_px) / f64::from(height_px);

    if width > bounds.width || height > bounds.height {
        if width / bounds.width > height / bounds.height {
            width = bounds.width;
            height = width / aspect_ratio;
        } else {
            height = bounds.height;
            width = height * aspect_ratio;
        }
    }

    Ok(DisplaySize { width, height })
}

/// Reads the image header at `path` and fits it into `bounds`, falling back to
/// [`FALLBACK_SIZE`] when the image cannot be decoded.
pub fn display_size_for_image(path: &Path, bounds: DisplaySize, dpi: f64) -> DisplaySize {
    let fitted = image::image_dimensions(path)
        .map_err(|err| anyhow!("failed to read image dimensions: {}", err))
        .and_then(|(width, height)| fit_pixels(width, height, bounds, dpi));
    match fitted {
        Ok(size) => size,
        Err(err) => {
            warn!(path = %path.display(), "{}; using fallback size", err);
            FALLBACK_SIZE
        }
    }
}

pub fn center_in(canvas: DisplaySize, size: DisplaySize) -> Offset {
    Offset {
        left: (canvas.width - size.width) / 2.0,
        top: (canvas.height - size.height) / 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDS: DisplaySize = DisplaySize {
        width: 12.0,
        height: 6.0,
    };
    const EPS: f64 = 1e-9;

    #[test]
    fn small_image_keeps_its_physical_size() {
        let size = fit_pixels(480, 288, BOUNDS, 96.0).unwrap();
        assert!((size.width - 5.0).abs() < EPS);
        assert!((size.height - 3.0).abs() < EPS);
    }

    #[test]
    fn image_exactly_at_bounds_is_unchanged() {
        let size = fit_pixels(1152, 576, BOUNDS, 96.0).unwrap();
        assert!((size.width - 12.0).abs() < EPS);
        assert!((size.height - 6.0).abs() < EPS);
    }

    #[test]
    fn wide_image_is_bound_by_width() {
        let size = fit_pixels(2400, 600, BOUNDS, 96.0).unwrap();
        assert!((size.width - 12.0).abs() < EPS);
        assert!((size.height - 3.0).abs() < EPS);
    }

    #[test]
    fn tall_image_is_bound_by_height() {
        let size = fit_pixels(600, 1800, BOUNDS, 96.0).unwrap();
        assert!((size.height - 6.0).abs() < EPS);
        assert!((size.width - 2.0).abs() < EPS);
    }

    #[test]
    fn oversized_images_touch_one_bound_and_keep_aspect() {
        let cases = [(3000, 1000), (1000, 3000), (5000, 2400), (1300, 700), (96 * 13, 96 * 7)];
        for (w, h) in cases {
            let size = fit_pixels(w, h, BOUNDS, 96.0).unwrap();
            let binding = (size.width / BOUNDS.width).max(size.height / BOUNDS.height);
            assert!((binding - 1.0).abs() < 1e-6, "{}x{} -> {:?}", w, h, size);
            let aspect = f64::from(w) / f64::from(h);
            assert!(
                (size.width / size.height - aspect).abs() < 1e-6,
                "{}x{} -> {:?}",
                w,
                h,
                size
            );
        }
    }

    #[test]
    fn zero_height_is_rejected() {
        assert!(fit_pixels(100, 0, BOUNDS, 96.0).is_err());
        assert!(fit_pixels(100, 100, BOUNDS, 0.0).is_err());
    }

    #[test]
    fn unreadable_image_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert_eq!(display_size_for_image(&path, BOUNDS, 96.0), FALLBACK_SIZE);
        assert_eq!(
            display_size_for_image(&dir.path().join("missing.png"), BOUNDS, 96.0),
            FALLBACK_SIZE
        );
    }

    #[test]
    fn reads_dimensions_from_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        image::RgbaImage::new(1920, 480).save(&path).unwrap();
        let size = display_size_for_image(&path, BOUNDS, 96.0);
        assert!((size.width - 12.0).abs() < EPS);
        assert!((size.height - 3.0).abs() < EPS);
    }

    #[test]
    fn centering_places_midpoints_together() {
        let sizes = [
            DisplaySize { width: 12.0, height: 3.0 },
            DisplaySize { width: 2.0, height: 6.0 },
            FALLBACK_SIZE,
        ];
        for size in sizes {
            let offset = center_in(SLIDE_CANVAS, size);
            assert!((offset.left + size.width / 2.0 - SLIDE_CANVAS.width / 2.0).abs() < EPS);
            assert!((offset.top + size.height / 2.0 - SLIDE_CANVAS.height / 2.0).abs() < EPS);
        }
    }
}

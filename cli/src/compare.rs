use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

const DIVIDER_WIDTH: u32 = 4;
const DIVIDER_LUMA: u8 = 230;

/// Writes a side-by-side before/after composite: original on the left,
/// enhanced on the right, heights equalized, a thin divider between them.
pub fn side_by_side(original: &Path, enhanced: &Path, out: &Path) -> Result<()> {
    let before = image::open(original)
        .with_context(|| format!("opening {}", original.display()))?;
    let after = image::open(enhanced)
        .with_context(|| format!("opening {}", enhanced.display()))?;
    let composite = compose(&before, &after);
    composite
        .save(out)
        .with_context(|| format!("writing comparison to {}", out.display()))?;
    println!("Wrote comparison {}", out.display());
    Ok(())
}

fn compose(before: &DynamicImage, after: &DynamicImage) -> RgbImage {
    // The enhanced side sets the height; the original is scaled up to match
    // so the comparison reads at the output's detail level.
    let height = after.height().max(1);
    let before = if before.height() == height {
        before.to_rgb8()
    } else {
        let scaled_width =
            ((before.width() as u64 * height as u64) / before.height().max(1) as u64).max(1) as u32;
        before
            .resize_exact(scaled_width, height, FilterType::Lanczos3)
            .to_rgb8()
    };
    let after = after.to_rgb8();

    let width = before.width() + DIVIDER_WIDTH + after.width();
    let mut canvas = RgbImage::from_pixel(width, height, image::Rgb([DIVIDER_LUMA; 3]));
    image::imageops::replace(&mut canvas, &before, 0, 0);
    image::imageops::replace(
        &mut canvas,
        &after,
        (before.width() + DIVIDER_WIDTH) as i64,
        0,
    );
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn composite_is_side_by_side_with_divider() {
        let before = solid(10, 20, [10, 10, 10]);
        let after = solid(12, 20, [200, 200, 200]);
        let canvas = compose(&before, &after);
        assert_eq!(canvas.width(), 10 + DIVIDER_WIDTH + 12);
        assert_eq!(canvas.height(), 20);
        assert_eq!(canvas.get_pixel(0, 10), &Rgb([10, 10, 10]));
        assert_eq!(canvas.get_pixel(11, 10), &Rgb([DIVIDER_LUMA; 3]));
        assert_eq!(canvas.get_pixel(10 + DIVIDER_WIDTH + 1, 10), &Rgb([200, 200, 200]));
    }

    #[test]
    fn original_is_scaled_to_enhanced_height() {
        let before = solid(10, 10, [50, 50, 50]);
        let after = solid(20, 40, [100, 100, 100]);
        let canvas = compose(&before, &after);
        // 10x10 scaled to height 40 keeps the square aspect: width 40.
        assert_eq!(canvas.height(), 40);
        assert_eq!(canvas.width(), 40 + DIVIDER_WIDTH + 20);
    }

    #[test]
    fn writes_jpeg_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let before_path = dir.path().join("before.png");
        let after_path = dir.path().join("after.png");
        let out_path = dir.path().join("compare.jpg");
        solid(8, 8, [0, 0, 0]).save(&before_path).unwrap();
        solid(8, 8, [255, 255, 255]).save(&after_path).unwrap();

        side_by_side(&before_path, &after_path, &out_path).unwrap();

        let written = image::open(&out_path).unwrap();
        assert_eq!(written.height(), 8);
        assert_eq!(written.width(), 8 + DIVIDER_WIDTH + 8);
    }
}

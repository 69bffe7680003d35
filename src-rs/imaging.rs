use crate::ports::Rect;
use image::{GrayImage, Luma, RgbaImage};
use imageproc::edges::canny;

fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b))
        .round()
        .clamp(0.0, 255.0) as u8
}

pub fn to_gray(img: &RgbaImage) -> GrayImage {
    let (w, h) = img.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let p = img.get_pixel(x, y).0;
        Luma([luma(p[0], p[1], p[2])])
    })
}

/// Bounds-checked crop. Returns `None` instead of clamping when the rect
/// leaves the frame, so callers never sample a partial cell.
pub fn crop(img: &RgbaImage, rect: Rect) -> Option<RgbaImage> {
    if !rect.fits_within(img.width(), img.height()) {
        return None;
    }
    Some(
        image::imageops::crop_imm(img, rect.x as u32, rect.y as u32, rect.w as u32, rect.h as u32)
            .to_image(),
    )
}

/// Binary mask of pixels whose grayscale absolute difference exceeds `threshold`.
pub fn diff_mask(baseline: &RgbaImage, current: &RgbaImage, threshold: u8) -> GrayImage {
    let w = baseline.width().min(current.width());
    let h = baseline.height().min(current.height());
    GrayImage::from_fn(w, h, |x, y| {
        let a = baseline.get_pixel(x, y).0;
        let b = current.get_pixel(x, y).0;
        let dr = (i16::from(a[0]) - i16::from(b[0])).unsigned_abs() as u8;
        let dg = (i16::from(a[1]) - i16::from(b[1])).unsigned_abs() as u8;
        let db = (i16::from(a[2]) - i16::from(b[2])).unsigned_abs() as u8;
        if luma(dr, dg, db) > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

pub fn count_nonzero(mask: &GrayImage, rect: Rect) -> Option<u32> {
    if !rect.fits_within(mask.width(), mask.height()) {
        return None;
    }
    let mut count = 0u32;
    for y in rect.y as u32..rect.bottom() as u32 {
        for x in rect.x as u32..rect.right() as u32 {
            if mask.get_pixel(x, y).0[0] > 0 {
                count += 1;
            }
        }
    }
    Some(count)
}

pub fn channel_means(img: &RgbaImage) -> [f64; 3] {
    let total = u64::from(img.width()) * u64::from(img.height());
    if total == 0 {
        return [0.0; 3];
    }
    let mut sums = [0u64; 3];
    for p in img.pixels() {
        sums[0] += u64::from(p.0[0]);
        sums[1] += u64::from(p.0[1]);
        sums[2] += u64::from(p.0[2]);
    }
    sums.map(|s| s as f64 / total as f64)
}

pub fn mean_luma(img: &GrayImage) -> f64 {
    let total = u64::from(img.width()) * u64::from(img.height());
    if total == 0 {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| u64::from(p.0[0])).sum();
    sum as f64 / total as f64
}

/// Number of edge pixels found by a Canny detector.
pub fn edge_count(gray: &GrayImage, low: f32, high: f32) -> u32 {
    if gray.width() < 3 || gray.height() < 3 {
        return 0;
    }
    canny(gray, low, high).pixels().filter(|p| p.0[0] > 0).count() as u32
}

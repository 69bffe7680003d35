use crate::ensure_parent_dir;
use crate::geometry::GridGeometry;
use crate::item::ItemInfo;
use crate::ports::Rect;
use anyhow::{Context, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::Path;

const GRID_LINE: Rgba<u8> = Rgba([255, 255, 255, 90]);
const LABEL_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 170]);

pub fn tier_color(quality: u8) -> Rgba<u8> {
    match quality {
        1 => Rgba([230, 230, 230, 255]),
        2 => Rgba([80, 200, 120, 255]),
        3 => Rgba([70, 140, 255, 255]),
        4 => Rgba([180, 90, 255, 255]),
        5 => Rgba([255, 160, 40, 255]),
        6 => Rgba([255, 59, 48, 255]),
        _ => Rgba([128, 128, 128, 255]),
    }
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| (f64::from(d) * inv + f64::from(s) * a).round().clamp(0.0, 255.0) as u8;
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

fn put_blended(img: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= img.width() as i32 || y >= img.height() as i32 {
        return;
    }
    let dst = *img.get_pixel(x as u32, y as u32);
    img.put_pixel(x as u32, y as u32, blend_pixel(dst, color));
}

/// Outline grown outward by `thickness`; parts outside the image are clipped.
pub fn draw_rect_outline(img: &mut RgbaImage, rect: Rect, color: Rgba<u8>, thickness: i32) {
    if rect.w <= 0 || rect.h <= 0 {
        return;
    }
    for t in 0..thickness.max(1) {
        let x0 = rect.x - t;
        let y0 = rect.y - t;
        let x1 = rect.right() - 1 + t;
        let y1 = rect.bottom() - 1 + t;
        for x in x0..=x1 {
            put_blended(img, x, y0, color);
            put_blended(img, x, y1, color);
        }
        for y in y0 + 1..y1 {
            put_blended(img, x0, y, color);
            put_blended(img, x1, y, color);
        }
    }
}

pub fn fill_rect_alpha(img: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            put_blended(img, x, y, color);
        }
    }
}

pub fn draw_bitmap_text(img: &mut RgbaImage, x: i32, y: i32, text: &str, color: Rgba<u8>, scale: u32) {
    let scale = scale.max(1) as i32;
    let mut cursor_x = x;
    for ch in text.chars() {
        let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
            cursor_x += 8 * scale;
            continue;
        };
        for (row_idx, bits) in glyph.iter().enumerate() {
            for col_idx in 0..8 {
                if (bits >> col_idx) & 1 == 0 {
                    continue;
                }
                let px = cursor_x + col_idx * scale;
                let py = y + row_idx as i32 * scale;
                for sy in 0..scale {
                    for sx in 0..scale {
                        put_blended(img, px + sx, py + sy, color);
                    }
                }
            }
        }
        cursor_x += 8 * scale;
    }
}

fn text_width(text: &str, scale: u32) -> i32 {
    text.chars().count() as i32 * 8 * scale.max(1) as i32
}

/// Grid lines for the visible rows plus one labelled box per item.
pub fn render_overlay(
    frame: &RgbaImage,
    geometry: &GridGeometry,
    columns: i32,
    visible_rows: i32,
    top_row: i32,
    items: &[ItemInfo],
) -> RgbaImage {
    let mut out = frame.clone();
    let left = geometry.origin_x;
    let top = geometry.origin_y;
    let right = geometry.right_edge(columns);
    let bottom = top + visible_rows * geometry.cell_height;

    for col in 0..=columns {
        let x = left + col * geometry.cell_width;
        fill_rect_alpha(&mut out, Rect::new(x, top, 1, bottom - top), GRID_LINE);
    }
    for row in 0..=visible_rows {
        let y = top + row * geometry.cell_height;
        fill_rect_alpha(&mut out, Rect::new(left, y, right - left, 1), GRID_LINE);
    }

    for item in items {
        let rect = geometry.block_rect(item.x, item.y, item.width, item.height, top_row);
        if rect.bottom() <= top || rect.y >= bottom {
            continue;
        }
        let color = tier_color(item.quality);
        draw_rect_outline(&mut out, Rect::new(rect.x + 2, rect.y + 2, rect.w - 4, rect.h - 4), color, 2);

        let label = format!("Q{}", item.quality);
        let label_box = Rect::new(rect.x + 3, rect.y + 3, text_width(&label, 1) + 4, 12);
        fill_rect_alpha(&mut out, label_box, LABEL_BACKGROUND);
        draw_bitmap_text(&mut out, label_box.x + 2, label_box.y + 2, &label, color, 1);
    }
    out
}

pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    DynamicImage::ImageRgba8(img.clone())
        .save(path)
        .with_context(|| format!("failed to save overlay image: {}", path.display()))?;
    Ok(())
}

use crate::config::QualityConfig;
use crate::ports::{Point, Rect};
use image::RgbaImage;
use palette::{IntoColor, Lab, Srgb};
use tracing::warn;

pub fn parse_hex_color(raw: &str) -> Option<[u8; 3]> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// CIE L*a*b* (D65) in the 8-bit encoding: L scaled to 0..255, a and b offset by 128.
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f64; 3] {
    let lab: Lab = Srgb::new(rgb[0], rgb[1], rgb[2]).into_format::<f32>().into_color();
    [
        f64::from(lab.l) * 255.0 / 100.0,
        f64::from(lab.a) + 128.0,
        f64::from(lab.b) + 128.0,
    ]
}

fn lab_distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// Nearest palette entry in Lab space. Distances are compared in whole
/// units, so entries closer than one unit tie and the earliest one wins.
#[derive(Debug, Clone)]
pub struct QualityClassifier {
    palette: Vec<([f64; 3], u8)>,
}

impl QualityClassifier {
    pub fn from_config(config: &QualityConfig) -> Self {
        let palette = config
            .palette
            .iter()
            .filter_map(|entry| match parse_hex_color(&entry.color) {
                Some(rgb) => Some((rgb_to_lab(rgb), entry.tier)),
                None => {
                    warn!(color = %entry.color, "ignoring unparsable palette colour");
                    None
                }
            })
            .collect();
        QualityClassifier { palette }
    }

    pub fn classify(&self, rgb: [u8; 3]) -> u8 {
        let lab = rgb_to_lab(rgb);
        let mut best: Option<(f64, u8)> = None;
        for (entry, tier) in &self.palette {
            let d = lab_distance(lab, *entry).trunc();
            if best.map_or(true, |(min, _)| d < min) {
                best = Some((d, *tier));
            }
        }
        best.map_or(0, |(_, tier)| tier)
    }
}

/// Swatch pixel: vertically centred, `inset` pixels in from the item's right edge.
pub fn swatch_point(item_rect: Rect, inset: i32) -> Point {
    Point::new(item_rect.right() - inset, item_rect.y + item_rect.h / 2)
}

pub fn sample_swatch(frame: &RgbaImage, item_rect: Rect, inset: i32) -> Option<[u8; 3]> {
    let p = swatch_point(item_rect, inset);
    if p.x < 0 || p.y < 0 || p.x as u32 >= frame.width() || p.y as u32 >= frame.height() {
        return None;
    }
    let px = frame.get_pixel(p.x as u32, p.y as u32).0;
    Some([px[0], px[1], px[2]])
}

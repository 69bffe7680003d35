use crate::config::TemplateConfig;
use crate::imaging::to_gray;
use crate::ports::{Rect, Template};
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use imageproc::template_matching::{find_extremes, match_template as cross_correlate, MatchTemplateMethod};
use std::collections::HashMap;
use tracing::debug;

/// Decoded template images, loaded on first use and dropped at session start.
#[derive(Debug)]
pub struct TemplateCache {
    config: TemplateConfig,
    images: HashMap<Template, GrayImage>,
}

impl TemplateCache {
    pub fn new(config: TemplateConfig) -> Self {
        TemplateCache {
            config,
            images: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    pub fn get(&mut self, template: Template) -> Result<&GrayImage> {
        if !self.images.contains_key(&template) {
            let path = self.config.path_for(template);
            let image = image::open(&path)
                .with_context(|| format!("failed to load template {template:?}: {}", path.display()))?
                .to_luma8();
            self.images.insert(template, image);
        }
        self.images
            .get(&template)
            .with_context(|| format!("template {template:?} missing from cache"))
    }
}

/// Top-left of the best normalised cross-correlation hit.
fn best_location(haystack: &GrayImage, needle: &GrayImage) -> Option<(u32, u32)> {
    if needle.width() > haystack.width() || needle.height() > haystack.height() {
        return None;
    }
    let scores = cross_correlate(haystack, needle, MatchTemplateMethod::CrossCorrelationNormalized);
    Some(find_extremes(&scores).max_value_location)
}

/// Zero-mean normalised correlation of two patches of the same size. This is
/// the score the confidence thresholds are expressed in.
fn zero_mean_score(patch: &GrayImage, needle: &GrayImage) -> f64 {
    let mean = |img: &GrayImage| {
        img.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / f64::from(img.width() * img.height())
    };
    let (mp, mn) = (mean(patch), mean(needle));
    let (mut cross, mut ep, mut en) = (0.0, 0.0, 0.0);
    for (p, n) in patch.pixels().zip(needle.pixels()) {
        let dp = f64::from(p.0[0]) - mp;
        let dn = f64::from(n.0[0]) - mn;
        cross += dp * dn;
        ep += dp * dp;
        en += dn * dn;
    }
    let denom = (ep * en).sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    cross / denom
}

/// Searches a `factor`-times downsampled copy first, then refines around the
/// coarse hit at full resolution. Returns the score and the match rect.
pub fn match_template(frame: &GrayImage, needle: &GrayImage, factor: u32) -> Option<(f64, Rect)> {
    let (fw, fh) = frame.dimensions();
    let (nw, nh) = needle.dimensions();
    if nw == 0 || nh == 0 || nw > fw || nh > fh {
        return None;
    }
    let max_x = fw - nw;
    let max_y = fh - nh;

    let factor = factor.max(1);
    let coarse_ok = factor > 1 && nw / factor >= 4 && nh / factor >= 4;
    let (x, y) = if coarse_ok {
        let small_frame = imageops::resize(frame, fw / factor, fh / factor, FilterType::Triangle);
        let small_needle = imageops::resize(needle, nw / factor, nh / factor, FilterType::Triangle);
        let (cx, cy) = best_location(&small_frame, &small_needle)?;
        let pad = factor * 2;
        let x0 = (cx * factor).saturating_sub(pad);
        let y0 = (cy * factor).saturating_sub(pad);
        let x1 = (cx * factor + pad).min(max_x);
        let y1 = (cy * factor + pad).min(max_y);
        let window = imageops::crop_imm(frame, x0, y0, x1 - x0 + nw, y1 - y0 + nh).to_image();
        let (wx, wy) = best_location(&window, needle)?;
        (x0 + wx, y0 + wy)
    } else {
        best_location(frame, needle)?
    };

    let patch = imageops::crop_imm(frame, x, y, nw, nh).to_image();
    let score = zero_mean_score(&patch, needle);
    Some((score, Rect::new(x as i32, y as i32, nw as i32, nh as i32)))
}

pub struct NccLocator {
    cache: TemplateCache,
    coarse_factor: u32,
}

impl NccLocator {
    pub fn new(cache: TemplateCache, coarse_factor: u32) -> Self {
        NccLocator { cache, coarse_factor }
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    pub fn locate(&mut self, frame: &RgbaImage, template: Template, confidence: f32) -> Result<Option<Rect>> {
        let factor = self.coarse_factor;
        let needle = self.cache.get(template)?;
        let Some((score, rect)) = match_template(&to_gray(frame), needle, factor) else {
            return Ok(None);
        };
        debug!(?template, score, ?rect, "template match");
        Ok((score >= f64::from(confidence)).then_some(rect))
    }
}

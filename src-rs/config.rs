use crate::ports::Template;
use crate::quality::parse_hex_color;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "WHLQ_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub scroll: ScrollConfig,
    pub quality: QualityConfig,
    pub price: PriceConfig,
    pub policy: PolicyConfig,
    pub timing: TimingConfig,
    pub templates: TemplateConfig,
    pub desktop: DesktopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub columns: i32,
    pub anchor_confidence: f32,
    pub visible_rows: i32,
    /// Cells scanned right of and below a hovered cell when tracing an item footprint.
    pub neighborhood: i32,
    pub max_rows: i32,
    pub empty_edge_threshold: u32,
    pub edge_low: f32,
    pub edge_high: f32,
    pub diff_threshold: u8,
    pub footprint_pixel_threshold: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            columns: 9,
            anchor_confidence: 0.1,
            visible_rows: 10,
            neighborhood: 6,
            max_rows: 100,
            empty_edge_threshold: 7,
            edge_low: 50.0,
            edge_high: 150.0,
            diff_threshold: 5,
            footprint_pixel_threshold: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub track_top: i32,
    pub track_width: i32,
    pub track_height_normal: i32,
    pub track_height_batch: i32,
    pub binarize_threshold: u8,
    pub active_column_threshold: u32,
    pub calibration_steps: i32,
    /// Indicator tops above this scroll toward the bottom during calibration.
    pub calibration_top_zone: i32,
    /// An indicator this close to the full track height means everything fits on one page.
    pub full_track_tolerance: i32,
    pub calibration_retry_ms: u64,
    pub row_count_offset: i32,
    pub unscanned_tail_rows: i32,
    pub max_attempts: u32,
    pub home_steps: i32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        ScrollConfig {
            track_top: 130,
            track_width: 25,
            track_height_normal: 848,
            track_height_batch: 803,
            binarize_threshold: 95,
            active_column_threshold: 2,
            calibration_steps: 5,
            calibration_top_zone: 100,
            full_track_tolerance: 4,
            calibration_retry_ms: 200,
            row_count_offset: 12,
            unscanned_tail_rows: 14,
            max_attempts: 6,
            home_steps: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteEntry {
    pub color: String,
    pub tier: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub swatch_inset: i32,
    pub palette: Vec<PaletteEntry>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        let palette = [
            ("#1a1f22", 1),
            ("#1a2824", 2),
            ("#22313d", 3),
            ("#262634", 4),
            ("#352b24", 5),
            ("#3c2224", 6),
        ]
        .into_iter()
        .map(|(color, tier)| PaletteEntry {
            color: color.to_string(),
            tier,
        })
        .collect();
        QualityConfig {
            swatch_inset: 3,
            palette,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceConfig {
    pub strip_width: i32,
    pub market_button_confidence: f32,
    pub market_channel_delta: f64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        PriceConfig {
            strip_width: 400,
            market_button_confidence: 0.1,
            market_channel_delta: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub quality_ceiling: u8,
    pub profit_threshold: i64,
    pub max_price_decrements: u32,
    pub price_change_pixels: u32,
    /// Fraction of the frame height above the compared price region.
    pub price_region_top: f64,
    pub price_region_width: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            quality_ceiling: 4,
            profit_threshold: 6000,
            max_price_decrements: 7,
            price_change_pixels: 600,
            price_region_top: 0.35,
            price_region_width: 0.57,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub ui_wait_ms: u64,
    pub poll_interval_ms: u64,
    pub jitter: f32,
    pub wait_confidence: f32,
    pub confirm_confidence: f32,
    pub confirm_poll_ms: u64,
    pub confirm_max_polls: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            ui_wait_ms: 1000,
            poll_interval_ms: 10,
            jitter: 0.2,
            wait_confidence: 0.7,
            confirm_confidence: 0.8,
            confirm_poll_ms: 100,
            confirm_max_polls: 300,
        }
    }
}

impl TimingConfig {
    pub fn wait_attempts(&self) -> u32 {
        let interval = self.poll_interval_ms.max(1);
        (self.ui_wait_ms.div_ceil(interval)).max(1) as u32
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub dir: PathBuf,
    pub files: BTreeMap<Template, String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        TemplateConfig {
            dir: PathBuf::from("images"),
            files: BTreeMap::new(),
        }
    }
}

impl TemplateConfig {
    pub fn path_for(&self, template: Template) -> PathBuf {
        let file = self
            .files
            .get(&template)
            .map(String::as_str)
            .unwrap_or_else(|| template.default_file());
        self.dir.join(file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopConfig {
    pub capture_command: Vec<String>,
    pub ocr_command: Vec<String>,
    pub move_command: Vec<String>,
    pub click_command: Vec<String>,
    pub scroll_up_command: Vec<String>,
    pub scroll_down_command: Vec<String>,
    pub key_command: Vec<String>,
    pub focus_command: Option<Vec<String>>,
    pub window_origin: (i32, i32),
    pub reference_short_side: u32,
    pub command_timeout_ms: u64,
    pub command_attempts: u32,
    pub matcher_coarse_factor: u32,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

impl Default for DesktopConfig {
    fn default() -> Self {
        DesktopConfig {
            capture_command: argv(&["import", "-window", "root", "{out}"]),
            ocr_command: argv(&["tesseract", "{in}", "stdout", "-l", "eng", "--psm", "7"]),
            move_command: argv(&["xdotool", "mousemove", "{x}", "{y}"]),
            click_command: argv(&["xdotool", "click", "1"]),
            scroll_up_command: argv(&["xdotool", "click", "--repeat", "{n}", "4"]),
            scroll_down_command: argv(&["xdotool", "click", "--repeat", "{n}", "5"]),
            key_command: argv(&["xdotool", "key", "{key}"]),
            focus_command: None,
            window_origin: (0, 0),
            reference_short_side: 1080,
            command_timeout_ms: 3000,
            command_attempts: 2,
            matcher_coarse_factor: 4,
        }
    }
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().filter(|v| !v.trim().is_empty()).map(PathBuf::from));
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file: {}", path.display()))?;
                serde_json::from_str::<EngineConfig>(&raw)
                    .with_context(|| format!("invalid config JSON: {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid.columns <= 0 {
            bail!("grid.columns must be positive");
        }
        if self.grid.visible_rows <= 0 || self.grid.max_rows <= 0 {
            bail!("grid.visible_rows and grid.max_rows must be positive");
        }
        if self.grid.neighborhood <= 0 {
            bail!("grid.neighborhood must be positive");
        }
        if self.grid.footprint_pixel_threshold == 0 || self.grid.empty_edge_threshold == 0 {
            bail!("grid cell thresholds must be non-zero");
        }
        if self.scroll.calibration_steps <= 0 || self.scroll.max_attempts == 0 {
            bail!("scroll.calibration_steps and scroll.max_attempts must be positive");
        }
        if self.timing.ui_wait_ms == 0 || self.timing.confirm_max_polls == 0 {
            bail!("timing ceilings must be positive");
        }
        if self.quality.palette.is_empty() {
            bail!("quality.palette must not be empty");
        }
        if let Some(bad) = self
            .quality
            .palette
            .iter()
            .find(|entry| parse_hex_color(&entry.color).is_none())
        {
            bail!("quality.palette colour is not #rrggbb: {}", bad.color);
        }
        if !(0.0..1.0).contains(&self.policy.price_region_top)
            || !(0.0..=1.0).contains(&self.policy.price_region_width)
        {
            bail!("policy price region fractions must lie within the frame");
        }
        Ok(())
    }
}

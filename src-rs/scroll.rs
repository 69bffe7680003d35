use crate::error::{Result, WarehouseError};
use crate::imaging::{crop, to_gray};
use crate::ports::{Point, Rect, Ui};
use crate::retry::{retry, RetryPolicy};
use crate::session::Session;
use image::RgbaImage;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Batch-sell mode renders a shorter scroll track, so each mode keeps its
/// own calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SellMode {
    #[default]
    Normal,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Indicator {
    pub top: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Calibration {
    /// Grid pixels scrolled per pixel of indicator travel.
    Scale(f64),
    /// No movable indicator: everything fits on one page.
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScrollState {
    /// Indicator pixels per grid row.
    pub pixels_per_row: Option<f64>,
    pub total_rows: Option<i32>,
    pub top_visible_row: i32,
}

impl ScrollState {
    pub fn single_page() -> Self {
        ScrollState {
            pixels_per_row: None,
            total_rows: None,
            top_visible_row: 0,
        }
    }

    pub fn from_reading(
        calibration: Calibration,
        indicator: Option<Indicator>,
        track_height: i32,
        cell_height: i32,
        row_offset: i32,
    ) -> Self {
        let scale = match calibration {
            Calibration::Scale(scale) => scale,
            Calibration::Degenerate => return ScrollState::single_page(),
        };
        let cell = f64::from(cell_height.max(1));
        let Some(indicator) = indicator else {
            return ScrollState {
                pixels_per_row: Some(cell / scale),
                ..ScrollState::single_page()
            };
        };
        let hidden = f64::from(track_height - indicator.height) * scale / cell;
        ScrollState {
            pixels_per_row: Some(cell / scale),
            total_rows: Some(hidden as i32 + row_offset),
            top_visible_row: (f64::from(indicator.top) * scale / cell) as i32,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.pixels_per_row.is_some() && self.total_rows.is_some()
    }
}

/// Per-mode calibration cache plus the last trusted viewport top. The top is
/// dropped by any wheel step or mode change and must be re-read before use.
#[derive(Debug, Default)]
pub struct ScrollCalibrator {
    normal: Option<Calibration>,
    batch: Option<Calibration>,
    mode: SellMode,
    viewport_top: Option<i32>,
}

impl ScrollCalibrator {
    pub fn mode(&self) -> SellMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SellMode) {
        if self.mode != mode {
            self.mode = mode;
            self.viewport_top = None;
        }
    }

    pub fn cached(&self, mode: SellMode) -> Option<Calibration> {
        match mode {
            SellMode::Normal => self.normal,
            SellMode::Batch => self.batch,
        }
    }

    fn store(&mut self, mode: SellMode, calibration: Calibration) {
        match mode {
            SellMode::Normal => self.normal = Some(calibration),
            SellMode::Batch => self.batch = Some(calibration),
        }
    }

    pub fn invalidate(&mut self) {
        self.viewport_top = None;
    }

    pub fn fresh_top(&self) -> Option<i32> {
        self.viewport_top
    }

    fn record(&mut self, top: i32) {
        self.viewport_top = Some(top);
    }
}

/// Longest vertical run of rows with more than `active_columns` bright pixels.
pub fn measure_indicator(frame: &RgbaImage, track: Rect, threshold: u8, active_columns: u32) -> Option<Indicator> {
    let area = to_gray(&crop(frame, track)?);
    let mut best: Option<Indicator> = None;
    let mut run_start: Option<u32> = None;

    for y in 0..=area.height() {
        let active = y < area.height()
            && (0..area.width())
                .filter(|x| area.get_pixel(*x, y).0[0] > threshold)
                .count() as u32
                > active_columns;
        match (active, run_start) {
            (true, None) => run_start = Some(y),
            (false, Some(start)) => {
                let run = Indicator {
                    top: start as i32,
                    height: (y - start) as i32,
                };
                if best.map_or(true, |b| run.height > b.height) {
                    best = Some(run);
                }
                run_start = None;
            }
            _ => {}
        }
    }
    best
}

/// `|steps * cell_height / (before - after)|`; `None` when the indicator did not move.
pub fn scale_from_readings(cell_height: i32, steps: i32, before_top: i32, after_top: i32) -> Option<f64> {
    let moved = before_top - after_top;
    if moved == 0 {
        return None;
    }
    Some((f64::from(cell_height) * f64::from(steps) / f64::from(moved)).abs())
}

impl<U: Ui> Session<U> {
    fn track_rect(&self) -> Result<(Rect, i32)> {
        let geometry = self.geometry()?;
        let cfg = &self.config().scroll;
        let height = match self.scroll.mode() {
            SellMode::Normal => cfg.track_height_normal,
            SellMode::Batch => cfg.track_height_batch,
        };
        let track = Rect::new(
            geometry.right_edge(self.config().grid.columns),
            cfg.track_top,
            cfg.track_width,
            height,
        );
        Ok((track, height))
    }

    fn measure(&mut self, track: Rect) -> Result<Option<Indicator>> {
        let frame = self.capture()?;
        let cfg = &self.config().scroll;
        Ok(measure_indicator(
            &frame,
            track,
            cfg.binarize_threshold,
            cfg.active_column_threshold,
        ))
    }

    /// Scale for the current mode, measured at most once per session.
    pub fn calibrate_scroll(&mut self) -> Result<Calibration> {
        let mode = self.scroll.mode();
        if let Some(calibration) = self.scroll.cached(mode) {
            return Ok(calibration);
        }
        let calibration = self.run_scale_experiment()?;
        info!(?mode, ?calibration, "scroll scale calibrated");
        self.scroll.store(mode, calibration);
        Ok(calibration)
    }

    fn run_scale_experiment(&mut self) -> Result<Calibration> {
        let (track, track_height) = self.track_rect()?;
        let cfg = self.config().scroll.clone();

        let Some(before) = self.measure(track)? else {
            warn!("scroll indicator not found; treating inventory as a single page");
            return Ok(Calibration::Degenerate);
        };
        if before.height >= track_height - cfg.full_track_tolerance {
            info!(height = before.height, "scroll indicator fills the track; single page");
            return Ok(Calibration::Degenerate);
        }

        let direction = if before.top < cfg.calibration_top_zone { 1 } else { -1 };
        let policy = RetryPolicy::new(cfg.max_attempts, Duration::from_millis(cfg.calibration_retry_ms));
        let measured = retry(self, policy, "scroll calibration", |session, attempt| {
            let scale = session.scale_attempt(track, direction, cfg.calibration_steps)?;
            if scale.is_none() {
                warn!(attempt, "scroll indicator did not move");
            }
            Ok(scale)
        });
        match measured {
            Ok(scale) => Ok(Calibration::Scale(scale)),
            // the indicator never left its starting row
            Err(WarehouseError::Timeout { attempts, .. }) => Err(WarehouseError::ScrollDesync {
                target: direction * cfg.calibration_steps,
                observed: 0,
                attempts,
            }),
            Err(err) => Err(err),
        }
    }

    /// Wheels `steps` in `direction` and back, measuring the indicator before
    /// and after. `None` when it did not move.
    fn scale_attempt(&mut self, track: Rect, direction: i32, steps: i32) -> Result<Option<f64>> {
        let geometry = self.geometry()?;
        let Some(before) = self.measure(track)? else {
            return Ok(None);
        };
        self.move_to(geometry.inside_point())?;
        for _ in 0..steps {
            self.wheel(direction)?;
            self.pause(100);
        }
        let after = self.measure(track)?;
        for _ in 0..steps {
            self.wheel(-direction)?;
            self.pause(100);
        }
        debug!(?before, ?after, "scroll calibration readings");
        Ok(after.and_then(|a| scale_from_readings(geometry.cell_height, steps, before.top, a.top)))
    }

    /// Fresh reading of the scrollbar; the only source of a trusted viewport top.
    pub fn read_scroll_state(&mut self) -> Result<ScrollState> {
        let calibration = self.calibrate_scroll()?;
        let geometry = self.geometry()?;
        let (track, track_height) = self.track_rect()?;
        let indicator = self.measure(track)?;
        let state = ScrollState::from_reading(
            calibration,
            indicator,
            track_height,
            geometry.cell_height,
            self.config().scroll.row_count_offset,
        );
        debug!(
            top = state.top_visible_row,
            total = ?state.total_rows,
            ?indicator,
            "scrollbar read"
        );
        self.scroll.record(state.top_visible_row);
        Ok(state)
    }

    pub fn top_row(&mut self) -> Result<i32> {
        match self.scroll.fresh_top() {
            Some(top) => Ok(top),
            None => Ok(self.read_scroll_state()?.top_visible_row),
        }
    }

    /// Brings `row` to the top of the viewport, re-reading after every move.
    pub fn scroll_to_row(&mut self, row: i32) -> Result<ScrollState> {
        let mut state = self.read_scroll_state()?;
        if !state.is_calibrated() {
            if state.top_visible_row == row {
                return Ok(state);
            }
            return Err(WarehouseError::ScrollDesync {
                target: row,
                observed: state.top_visible_row,
                attempts: 0,
            });
        }

        let geometry = self.geometry()?;
        let max_attempts = self.config().scroll.max_attempts;
        for attempt in 1..=max_attempts {
            if state.top_visible_row == row {
                return Ok(state);
            }
            let delta = row - state.top_visible_row;
            info!(target_row = row, from = state.top_visible_row, attempt, "scrolling");
            self.move_to(geometry.inside_point())?;
            for _ in 0..delta.abs() {
                self.wheel(delta.signum())?;
                self.pause(90);
            }
            state = self.read_scroll_state()?;
        }

        if state.top_visible_row == row {
            return Ok(state);
        }
        Err(WarehouseError::ScrollDesync {
            target: row,
            observed: state.top_visible_row,
            attempts: max_attempts,
        })
    }

    /// Centre of a cell, scrolling only when its row is outside the viewport.
    pub fn reach_cell(&mut self, col: i32, row: i32) -> Result<Point> {
        let geometry = self.geometry()?;
        let visible = self.config().grid.visible_rows;
        let mut top = self.top_row()?;
        if row < top || row >= top + visible {
            top = self.scroll_to_row(row)?.top_visible_row;
        }
        Ok(geometry.cell_center(col, row, top))
    }
}

use crate::config::EngineConfig;
use crate::error::{Result, WarehouseError};
use crate::execute::LiquidationReport;
use crate::geometry::GridGeometry;
use crate::item::ItemInfo;
use crate::plan::{plan_liquidation, LiquidationPlan, SellPolicy};
use crate::ports::{CancelToken, Clock, Key, Point, Rect, Template, Ui};
use crate::quality::QualityClassifier;
use crate::retry::{retry, RetryPolicy};
use crate::scroll::{ScrollCalibrator, ScrollState, SellMode};
use chrono::Utc;
use image::RgbaImage;
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub geometry: GridGeometry,
    pub scroll: ScrollState,
    pub rows_scanned: i32,
    pub items: Vec<ItemInfo>,
}

#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub started_at: String,
    pub finished_at: String,
    pub dry_run: bool,
    pub scan: ScanResult,
    pub plan: LiquidationPlan,
    pub liquidation: Option<LiquidationReport>,
}

/// One scan-and-liquidate session over a single UI. Every capability call
/// goes through here, sequentially.
pub struct Session<U: Ui> {
    ui: U,
    config: EngineConfig,
    cancel: CancelToken,
    classifier: QualityClassifier,
    geometry: Option<GridGeometry>,
    pub(crate) scroll: ScrollCalibrator,
}

impl<U: Ui> Session<U> {
    pub fn new(mut ui: U, config: EngineConfig) -> Self {
        ui.begin_session();
        let classifier = QualityClassifier::from_config(&config.quality);
        Session {
            ui,
            config,
            cancel: CancelToken::new(),
            classifier,
            geometry: None,
            scroll: ScrollCalibrator::default(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    pub(crate) fn ui_mut(&mut self) -> &mut U {
        &mut self.ui
    }

    pub(crate) fn classifier(&self) -> &QualityClassifier {
        &self.classifier
    }

    pub(crate) fn set_geometry(&mut self, geometry: GridGeometry) {
        self.geometry = Some(geometry);
    }

    pub(crate) fn geometry(&self) -> Result<GridGeometry> {
        self.geometry.ok_or_else(|| WarehouseError::GeometryNotFound {
            missing: "grid not detected yet".to_string(),
        })
    }

    pub(crate) fn capture(&mut self) -> Result<RgbaImage> {
        self.cancel.check()?;
        self.ui.capture_frame()
    }

    /// Polls for `template` until it shows up or the UI wait elapses.
    pub(crate) fn wait_for(&mut self, template: Template) -> Result<Option<Rect>> {
        let timing = &self.config.timing;
        let policy = RetryPolicy::new(timing.wait_attempts(), timing.poll_interval());
        let confidence = timing.wait_confidence;
        let cancel = self.cancel.clone();
        let found = retry(&mut self.ui, policy, "template", |ui, _| {
            cancel.check()?;
            let frame = ui.capture_frame()?;
            ui.locate(&frame, template, confidence)
        });
        match found {
            Ok(rect) => Ok(Some(rect)),
            Err(WarehouseError::Timeout { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Polls until `template` is no longer on screen. Still visible after
    /// `policy.max_attempts` polls is a `Timeout`.
    pub(crate) fn wait_until_gone(
        &mut self,
        template: Template,
        confidence: f32,
        policy: RetryPolicy,
        what: &str,
    ) -> Result<()> {
        let cancel = self.cancel.clone();
        retry(&mut self.ui, policy, what, |ui, _| {
            cancel.check()?;
            let frame = ui.capture_frame()?;
            Ok(ui.locate(&frame, template, confidence)?.is_none().then_some(()))
        })
    }

    pub(crate) fn pause(&mut self, ms: u64) {
        let jitter = self.config.timing.jitter;
        self.ui.sleep(Duration::from_millis(ms), jitter);
    }

    pub(crate) fn move_to(&mut self, at: Point) -> Result<()> {
        self.cancel.check()?;
        self.ui.move_pointer_to(at)
    }

    pub(crate) fn click(&mut self) -> Result<()> {
        self.ui.click()
    }

    pub(crate) fn click_at(&mut self, at: Point) -> Result<()> {
        self.move_to(at)?;
        self.ui.click()
    }

    pub(crate) fn press(&mut self, key: Key) -> Result<()> {
        self.ui.key_tap(key)
    }

    pub(crate) fn wheel(&mut self, steps: i32) -> Result<()> {
        self.cancel.check()?;
        self.scroll.invalidate();
        self.ui.scroll(steps)
    }

    pub(crate) fn set_mode(&mut self, mode: SellMode) {
        self.scroll.set_mode(mode);
    }

    /// Scan the grid and partition the result; liquidate unless `dry_run`.
    pub fn run(&mut self, dry_run: bool) -> Result<SessionReport> {
        let started_at = Utc::now().to_rfc3339();
        let scan = self.scan()?;
        let policy = SellPolicy::from_config(&self.config.policy);
        let plan = plan_liquidation(&scan.items, &policy);
        info!(
            system = plan.system.len(),
            market = plan.market.len(),
            held = plan.held.len(),
            "liquidation plan ready"
        );

        let liquidation = if dry_run {
            None
        } else {
            Some(self.liquidate(plan.clone())?)
        };

        Ok(SessionReport {
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            dry_run,
            scan,
            plan,
            liquidation,
        })
    }
}

impl<U: Ui> Clock for Session<U> {
    fn sleep(&mut self, duration: Duration, jitter: f32) {
        self.ui.sleep(duration, jitter);
    }
}

use crate::error::{Result, WarehouseError};
use crate::imaging::{count_nonzero, diff_mask};
use crate::item::ItemInfo;
use crate::plan::LiquidationPlan;
use crate::ports::{Key, Point, Rect, Template, Ui};
use crate::retry::RetryPolicy;
use crate::scroll::SellMode;
use crate::session::Session;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Clicking here closes whatever panel is open without touching the grid.
const NEUTRAL_POINT: Point = Point { x: 10, y: 10 };
/// Parks the pointer away from the price widgets while the market dialog settles.
const MARKET_PARK_POINT: Point = Point { x: 100, y: 100 };

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    SoldToSystem,
    ListedOnMarket { decrements: u32 },
    Abandoned { step: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub item: ItemInfo,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LiquidationReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl LiquidationReport {
    fn push(&mut self, item: ItemInfo, outcome: Outcome) {
        self.outcomes.push(ItemOutcome { item, outcome });
    }

    pub fn sold_to_system(&self) -> usize {
        self.count(|o| matches!(o, Outcome::SoldToSystem))
    }

    pub fn listed_on_market(&self) -> usize {
        self.count(|o| matches!(o, Outcome::ListedOnMarket { .. }))
    }

    pub fn abandoned(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Abandoned { .. }))
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }
}

/// Lower part of the frame where the market price text is drawn.
pub fn price_region(width: u32, height: u32, top: f64, region_width: f64) -> Rect {
    let y = (f64::from(height) * top) as i32;
    Rect::new(
        0,
        y,
        (f64::from(width) * region_width) as i32,
        (f64::from(height) * (1.0 - top)) as i32 - 1,
    )
}

fn step_of(err: &WarehouseError) -> String {
    match err {
        WarehouseError::SellFlowAbandoned { step } => step.clone(),
        other => other.to_string(),
    }
}

impl<U: Ui> Session<U> {
    /// Sells the system items (batch mode when there is more than one),
    /// then lists the market items one at a time. Per-item failures are
    /// recorded as abandoned and the run continues.
    pub fn liquidate(&mut self, plan: LiquidationPlan) -> Result<LiquidationReport> {
        let mut report = LiquidationReport::default();
        if plan.is_empty() {
            info!("nothing to sell");
            return Ok(report);
        }
        self.detect_geometry()?;
        self.set_mode(SellMode::Normal);

        match plan.system.as_slice() {
            [] => {}
            [item] => {
                let result = self.sell_one_to_system(item);
                let outcome = self.absorb(item, result)?;
                report.push(*item, outcome);
            }
            items => self.sell_batch_to_system(items, &mut report)?,
        }
        self.pause(500);

        for item in &plan.market {
            let result = self.list_on_market(item);
            let outcome = self.absorb(item, result)?;
            report.push(*item, outcome);
        }

        info!(
            system = report.sold_to_system(),
            market = report.listed_on_market(),
            abandoned = report.abandoned(),
            "liquidation finished"
        );
        Ok(report)
    }

    fn absorb(&mut self, item: &ItemInfo, result: Result<Outcome>) -> Result<Outcome> {
        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_item_local() => {
                warn!(%item, "failed to sell item: {err}");
                self.dismiss()?;
                Ok(Outcome::Abandoned { step: step_of(&err) })
            }
            Err(err) => Err(err),
        }
    }

    fn dismiss(&mut self) -> Result<()> {
        self.click_at(NEUTRAL_POINT)?;
        self.pause(300);
        Ok(())
    }

    fn await_button(&mut self, template: Template, step: &str) -> Result<Rect> {
        self.wait_for(template)?
            .ok_or_else(|| WarehouseError::abandoned(step))
    }

    fn open_sell_dialog(&mut self, item: &ItemInfo) -> Result<()> {
        let at = self.reach_cell(item.x, item.y)?;
        self.click_at(at)?;
        self.pause(100);
        let sell = self.await_button(Template::SellButton, "sell button")?;
        self.click_at(sell.center())?;
        self.pause(100);
        Ok(())
    }

    fn sell_one_to_system(&mut self, item: &ItemInfo) -> Result<Outcome> {
        self.open_sell_dialog(item)?;
        let button = self.await_button(Template::SellSystemButton, "system sell button")?;
        self.move_to(button.center())?;
        self.pause(500);
        self.click()?;
        info!(%item, "sold to system");
        Ok(Outcome::SoldToSystem)
    }

    fn sell_batch_to_system(&mut self, items: &[ItemInfo], report: &mut LiquidationReport) -> Result<()> {
        let Some(button) = self.wait_for(Template::BatchSellButton)? else {
            warn!(count = items.len(), "batch sell button not found");
            self.dismiss()?;
            for item in items {
                report.push(*item, Outcome::Abandoned { step: "batch sell button".to_string() });
            }
            return Ok(());
        };
        self.click_at(button.center())?;
        self.pause(100);

        self.set_mode(SellMode::Batch);
        let result = self.mark_and_submit(items);
        self.set_mode(SellMode::Normal);

        match result {
            Ok(()) => {
                info!(count = items.len(), "batch sold to system");
                for item in items {
                    report.push(*item, Outcome::SoldToSystem);
                }
                Ok(())
            }
            Err(err) if err.is_item_local() => {
                warn!(count = items.len(), "batch sale failed: {err}");
                self.press(Key::Escape)?;
                self.dismiss()?;
                for item in items {
                    report.push(*item, Outcome::Abandoned { step: step_of(&err) });
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn mark_and_submit(&mut self, items: &[ItemInfo]) -> Result<()> {
        for item in items {
            let at = self.reach_cell(item.x, item.y)?;
            self.move_to(at)?;
            self.pause(50);
            self.click()?;
            self.pause(80);
        }
        self.pause(300);

        let submit = self.await_button(Template::BatchSellSubmit, "batch sell submit")?;
        self.click_at(submit.center())?;
        self.pause(500);

        let timing = &self.config().timing;
        let confidence = timing.confirm_confidence;
        let policy = RetryPolicy::new(
            timing.confirm_max_polls,
            Duration::from_millis(timing.confirm_poll_ms),
        );
        self.wait_until_gone(Template::BatchSellConfirm, confidence, policy, "batch sell confirmation")?;

        self.pause(400);
        self.press(Key::Escape)
    }

    fn list_on_market(&mut self, item: &ItemInfo) -> Result<Outcome> {
        self.open_sell_dialog(item)?;
        let market = self.await_button(Template::SellMarketButton, "market sell button")?;
        self.move_to(market.center())?;
        self.pause(400);
        self.click()?;
        self.pause(100);
        self.move_to(MARKET_PARK_POINT)?;
        self.pause(200);

        let minus = self.await_button(Template::PriceDecrease, "price decrease button")?;
        self.move_to(minus.center())?;
        self.pause(100);
        let decrements = self.lower_price()?;

        let list = self.await_button(Template::ListOnMarket, "list on market button")?;
        self.click_at(list.center())?;
        self.pause(300);
        info!(%item, decrements, "listed on market");
        Ok(Outcome::ListedOnMarket { decrements })
    }

    /// Clicks the decrease control until the price text visibly changes from
    /// the frame before the first click, or the decrement limit is reached.
    fn lower_price(&mut self) -> Result<u32> {
        let policy = self.config().policy.clone();
        let threshold = self.config().grid.diff_threshold;
        let before = self.capture()?;
        let region = price_region(
            before.width(),
            before.height(),
            policy.price_region_top,
            policy.price_region_width,
        );

        for n in 1..=policy.max_price_decrements {
            self.click()?;
            self.pause(50);
            let after = self.capture()?;
            let mask = diff_mask(&before, &after, threshold);
            let changed = count_nonzero(&mask, region).unwrap_or(0);
            debug!(n, changed, "price decrement");
            if changed > policy.price_change_pixels {
                return Ok(n);
            }
        }
        Ok(policy.max_price_decrements)
    }
}

//! Scripted warehouse used by the unit tests. Frames are rendered from a
//! small world model so the pixel pipeline (edge check, hover diff, swatch,
//! scrollbar) runs unchanged; template lookups answer from the model.

use crate::config::{EngineConfig, QualityConfig};
use crate::error::Result;
use crate::ports::{CancelToken, Clock, FrameSource, InputDevice, Key, Point, Rect, Template, TemplateLocator, TextRecognizer};
use crate::quality::parse_hex_color;
use image::{Rgba, RgbaImage};
use std::collections::VecDeque;
use std::time::Duration;

pub const FRAME_W: u32 = 1280;
pub const FRAME_H: u32 = 1000;
pub const ORIGIN_X: i32 = 100;
pub const ORIGIN_Y: i32 = 200;
pub const CELL: i32 = 40;
pub const COLUMNS: i32 = 9;
/// Rows drawn below the origin; the grid area ends above the price widgets.
pub const VIEWPORT_ROWS: i32 = 12;

const TRACK_X: i32 = ORIGIN_X + COLUMNS * CELL;
const TRACK_TOP: i32 = 130;
const TRACK_NORMAL: i32 = 848;
const TRACK_BATCH: i32 = 803;
const PPR_NORMAL: i32 = 8;
const PPR_BATCH: i32 = 10;

const BACKGROUND: [u8; 3] = [24, 24, 24];
const ICON: [u8; 3] = [220, 220, 220];
const HOVER_LIFT: u8 = 40;

pub const LEFT_ANCHOR: Rect = Rect { x: 70, y: 200, w: 30, h: 20 };
pub const RIGHT_ANCHOR: Rect = Rect { x: 460, y: 180, w: 30, h: 20 };
pub const SELL_BUTTON: Rect = Rect { x: 900, y: 300, w: 120, h: 40 };
pub const SYSTEM_LABEL: Rect = Rect { x: 900, y: 400, w: 80, h: 30 };
pub const MARKET_LABEL: Rect = Rect { x: 900, y: 450, w: 80, h: 30 };
pub const MARKET_BUTTON: Rect = Rect { x: 900, y: 520, w: 120, h: 40 };
pub const SYSTEM_BUTTON: Rect = Rect { x: 1040, y: 520, w: 120, h: 40 };
pub const BATCH_BUTTON: Rect = Rect { x: 900, y: 150, w: 120, h: 40 };
pub const BATCH_SUBMIT: Rect = Rect { x: 900, y: 860, w: 120, h: 40 };
pub const BATCH_CONFIRM: Rect = Rect { x: 1000, y: 600, w: 120, h: 40 };
pub const DECREASE: Rect = Rect { x: 600, y: 600, w: 40, h: 40 };
pub const LIST_BUTTON: Rect = Rect { x: 900, y: 700, w: 120, h: 40 };
pub const PRICE_TEXT: Rect = Rect { x: 200, y: 720, w: 40, h: 20 };

/// Short UI waits so failing lookups stay cheap.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.timing.ui_wait_ms = 50;
    config.timing.poll_interval_ms = 10;
    config.timing.jitter = 0.0;
    config.timing.confirm_poll_ms = 10;
    config.timing.confirm_max_polls = 6;
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    InStock,
    Sold,
    Listed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimItem {
    pub col: i32,
    pub row: i32,
    pub width: i32,
    pub height: i32,
    pub tier: u8,
    pub system: i64,
    pub market: i64,
    pub market_ok: bool,
    /// Detail panel opens but never offers the sell button.
    pub broken: bool,
    /// Price strips recognise as nothing.
    pub unreadable: bool,
    pub state: SimState,
}

impl SimItem {
    pub fn new(col: i32, row: i32, width: i32, height: i32, tier: u8) -> Self {
        SimItem {
            col,
            row,
            width,
            height,
            tier,
            system: 0,
            market: 0,
            market_ok: true,
            broken: false,
            unreadable: false,
            state: SimState::InStock,
        }
    }

    pub fn prices(mut self, system: i64, market: i64) -> Self {
        self.system = system;
        self.market = market;
        self
    }

    pub fn market_disabled(mut self) -> Self {
        self.market_ok = false;
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }

    fn covers(&self, col: i32, row: i32) -> bool {
        (self.col..self.col + self.width).contains(&col) && (self.row..self.row + self.height).contains(&row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelStage {
    Detail,
    Sell,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    pub item: usize,
    pub stage: PanelStage,
}

#[derive(Debug, Clone)]
pub struct World {
    pub items: Vec<SimItem>,
    pub top_row: i32,
    pub total_rows: i32,
    pub anchors_visible: bool,
    pub stuck_scroll: bool,
    pub single_page: bool,
    pub batch_mode: bool,
    pub selected: Vec<usize>,
    pub panel: Option<Panel>,
    /// Polls the batch confirmation stays on screen after submitting.
    pub confirm_polls: u32,
    pub confirm_never_clears: bool,
    pub confirm_pending: u32,
    /// Decrease clicks before the market price text changes.
    pub clicks_to_change: u32,
    pub price_clicks: u32,
}

impl Default for World {
    fn default() -> Self {
        World {
            items: Vec::new(),
            top_row: 0,
            total_rows: 30,
            anchors_visible: true,
            stuck_scroll: false,
            single_page: false,
            batch_mode: false,
            selected: Vec::new(),
            panel: None,
            confirm_polls: 1,
            confirm_never_clears: false,
            confirm_pending: 0,
            clicks_to_change: 1,
            price_clicks: 0,
        }
    }
}

impl World {
    fn max_top(&self) -> i32 {
        if self.single_page {
            0
        } else {
            (self.total_rows - VIEWPORT_ROWS).max(0)
        }
    }

    fn pixels_per_row(&self) -> i32 {
        if self.batch_mode {
            PPR_BATCH
        } else {
            PPR_NORMAL
        }
    }

    fn track_height(&self) -> i32 {
        if self.batch_mode {
            TRACK_BATCH
        } else {
            TRACK_NORMAL
        }
    }

    fn item_at(&self, p: Point) -> Option<usize> {
        if p.x < ORIGIN_X || p.y < ORIGIN_Y {
            return None;
        }
        let col = (p.x - ORIGIN_X) / CELL;
        let visible_row = (p.y - ORIGIN_Y) / CELL;
        if col >= COLUMNS || visible_row >= VIEWPORT_ROWS {
            return None;
        }
        let row = visible_row + self.top_row;
        self.items
            .iter()
            .position(|item| item.state == SimState::InStock && item.covers(col, row))
    }

    fn stage(&self) -> Option<PanelStage> {
        self.panel.map(|p| p.stage)
    }

    fn panel_item(&self) -> Option<&SimItem> {
        self.panel.map(|p| &self.items[p.item])
    }
}

fn contains(rect: Rect, p: Point) -> bool {
    p.x >= rect.x && p.x < rect.right() && p.y >= rect.y && p.y < rect.bottom()
}

fn fill(frame: &mut RgbaImage, rect: Rect, rgb: [u8; 3]) {
    let x0 = rect.x.max(0);
    let y0 = rect.y.max(0);
    let x1 = rect.right().min(frame.width() as i32);
    let y1 = rect.bottom().min(frame.height() as i32);
    for y in y0..y1 {
        for x in x0..x1 {
            frame.put_pixel(x as u32, y as u32, Rgba([rgb[0], rgb[1], rgb[2], 255]));
        }
    }
}

fn lift(rgb: [u8; 3], by: u8) -> [u8; 3] {
    rgb.map(|c| c.saturating_add(by))
}

fn tier_color(tier: u8) -> [u8; 3] {
    QualityConfig::default()
        .palette
        .iter()
        .find(|entry| entry.tier == tier)
        .and_then(|entry| parse_hex_color(&entry.color))
        .unwrap_or([128, 128, 128])
}

fn with_commas(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Fake implementing every UI port over [`World`].
pub struct FakeUi {
    pub world: World,
    pub pointer: Point,
    pub captures: usize,
    pub wheel_steps: usize,
    pub escapes: usize,
    pub clicks: Vec<Point>,
    pub slept: Duration,
    /// Cancels the token once the viewport top reaches the given row.
    pub cancel_at_row: Option<(i32, CancelToken)>,
    /// Captures taken when `cancel_at_row` fired.
    pub captures_at_cancel: Option<usize>,
    pending_text: VecDeque<Option<String>>,
}

impl FakeUi {
    pub fn new(world: World) -> Self {
        FakeUi {
            world,
            pointer: Point::new(0, 0),
            captures: 0,
            wheel_steps: 0,
            escapes: 0,
            clicks: Vec::new(),
            slept: Duration::ZERO,
            cancel_at_row: None,
            captures_at_cancel: None,
            pending_text: VecDeque::new(),
        }
    }

    pub fn render(&self) -> RgbaImage {
        let world = &self.world;
        let mut frame = RgbaImage::from_pixel(FRAME_W, FRAME_H, Rgba([BACKGROUND[0], BACKGROUND[1], BACKGROUND[2], 255]));

        let hovered = if world.panel.is_none() {
            world.item_at(self.pointer)
        } else {
            None
        };
        for (id, item) in world.items.iter().enumerate() {
            if item.state != SimState::InStock {
                continue;
            }
            let by = if hovered == Some(id) { HOVER_LIFT } else { 0 };
            let base = lift(tier_color(item.tier), by);
            for row in item.row..item.row + item.height {
                let visible_row = row - world.top_row;
                if !(0..VIEWPORT_ROWS).contains(&visible_row) {
                    continue;
                }
                for col in item.col..item.col + item.width {
                    let x0 = ORIGIN_X + col * CELL;
                    let y0 = ORIGIN_Y + visible_row * CELL;
                    fill(&mut frame, Rect::new(x0, y0, CELL, CELL), base);
                    fill(&mut frame, Rect::new(x0 + 15, y0 + 15, 10, 10), lift(ICON, by));
                }
            }
        }

        let track = world.track_height();
        let ppr = world.pixels_per_row();
        let (top, height) = if world.single_page {
            (0, track)
        } else {
            (world.top_row * ppr, track - world.max_top() * ppr)
        };
        fill(&mut frame, Rect::new(TRACK_X, TRACK_TOP + top, 25, height), [200, 200, 200]);

        match (world.stage(), world.panel_item()) {
            (Some(PanelStage::Sell), Some(item)) => {
                let tint = if item.market_ok { [40, 160, 161] } else { [90, 90, 130] };
                fill(&mut frame, MARKET_BUTTON, tint);
            }
            (Some(PanelStage::Market), Some(_)) => {
                let text = if world.price_clicks >= world.clicks_to_change {
                    [230, 230, 230]
                } else {
                    [60, 60, 60]
                };
                fill(&mut frame, PRICE_TEXT, text);
            }
            _ => {}
        }
        frame
    }
}

impl FrameSource for FakeUi {
    fn capture_frame(&mut self) -> Result<RgbaImage> {
        self.captures += 1;
        Ok(self.render())
    }
}

impl TemplateLocator for FakeUi {
    fn locate(&mut self, _frame: &RgbaImage, template: Template, _confidence: f32) -> Result<Option<Rect>> {
        let world = &mut self.world;
        let stage = world.stage();
        let idle = world.panel.is_none();
        let found = match template {
            Template::GridLeftAnchor => world.anchors_visible.then_some(LEFT_ANCHOR),
            Template::GridRightAnchor => world.anchors_visible.then_some(RIGHT_ANCHOR),
            Template::SellButton => {
                let ready = stage == Some(PanelStage::Detail) && world.panel_item().is_some_and(|i| !i.broken);
                ready.then_some(SELL_BUTTON)
            }
            Template::SystemPriceLabel => (stage == Some(PanelStage::Sell)).then_some(SYSTEM_LABEL),
            Template::MarketPriceLabel => (stage == Some(PanelStage::Sell)).then_some(MARKET_LABEL),
            Template::SellMarketButton => (stage == Some(PanelStage::Sell)).then_some(MARKET_BUTTON),
            Template::SellSystemButton => (stage == Some(PanelStage::Sell)).then_some(SYSTEM_BUTTON),
            Template::BatchSellButton => (idle && !world.batch_mode).then_some(BATCH_BUTTON),
            Template::BatchSellSubmit => (idle && world.batch_mode).then_some(BATCH_SUBMIT),
            Template::BatchSellConfirm => {
                if world.confirm_pending > 0 {
                    if !world.confirm_never_clears {
                        world.confirm_pending -= 1;
                    }
                    Some(BATCH_CONFIRM)
                } else {
                    None
                }
            }
            Template::PriceDecrease => (stage == Some(PanelStage::Market)).then_some(DECREASE),
            Template::ListOnMarket => (stage == Some(PanelStage::Market)).then_some(LIST_BUTTON),
        };
        Ok(found)
    }
}

impl TextRecognizer for FakeUi {
    fn recognize_text(&mut self, _crop: &RgbaImage) -> Option<String> {
        self.pending_text.pop_front().flatten()
    }
}

impl InputDevice for FakeUi {
    fn move_pointer_to(&mut self, at: Point) -> Result<()> {
        self.pointer = at;
        Ok(())
    }

    fn click(&mut self) -> Result<()> {
        let p = self.pointer;
        self.clicks.push(p);
        let world = &mut self.world;

        if let Some(panel) = world.panel {
            if p.x < 50 && p.y < 50 {
                world.panel = None;
                return Ok(());
            }
            let item = &mut world.items[panel.item];
            match panel.stage {
                PanelStage::Detail if contains(SELL_BUTTON, p) && !item.broken => {
                    self.pending_text.clear();
                    if item.unreadable {
                        self.pending_text.extend([None, None]);
                    } else {
                        self.pending_text.push_back(Some(format!("{} Coins", with_commas(item.system))));
                        self.pending_text.push_back(Some(format!("{} Coins", with_commas(item.market))));
                    }
                    world.panel = Some(Panel {
                        stage: PanelStage::Sell,
                        ..panel
                    });
                }
                PanelStage::Sell if contains(SYSTEM_BUTTON, p) => {
                    item.state = SimState::Sold;
                    world.panel = None;
                }
                PanelStage::Sell if contains(MARKET_BUTTON, p) && item.market_ok => {
                    world.price_clicks = 0;
                    world.panel = Some(Panel {
                        stage: PanelStage::Market,
                        ..panel
                    });
                }
                PanelStage::Market if contains(DECREASE, p) => {
                    world.price_clicks = world.price_clicks.saturating_add(1);
                }
                PanelStage::Market if contains(LIST_BUTTON, p) => {
                    item.state = SimState::Listed;
                    world.panel = None;
                }
                _ => {}
            }
            return Ok(());
        }

        if world.batch_mode {
            if contains(BATCH_SUBMIT, p) {
                if !world.selected.is_empty() {
                    for id in std::mem::take(&mut world.selected) {
                        world.items[id].state = SimState::Sold;
                    }
                    world.confirm_pending = if world.confirm_never_clears {
                        u32::MAX
                    } else {
                        world.confirm_polls
                    };
                }
            } else if let Some(id) = world.item_at(p) {
                match world.selected.iter().position(|s| *s == id) {
                    Some(i) => {
                        world.selected.remove(i);
                    }
                    None => world.selected.push(id),
                }
            }
            return Ok(());
        }

        if contains(BATCH_BUTTON, p) {
            world.batch_mode = true;
        } else if let Some(id) = world.item_at(p) {
            world.panel = Some(Panel {
                item: id,
                stage: PanelStage::Detail,
            });
        }
        Ok(())
    }

    fn scroll(&mut self, steps: i32) -> Result<()> {
        self.wheel_steps += steps.unsigned_abs() as usize;
        let world = &mut self.world;
        if !world.stuck_scroll {
            world.top_row = (world.top_row + steps).clamp(0, world.max_top());
        }
        let reached = matches!(&self.cancel_at_row, Some((row, _)) if world.top_row >= *row);
        if reached {
            if let Some((_, token)) = self.cancel_at_row.take() {
                token.cancel();
                self.captures_at_cancel = Some(self.captures);
            }
        }
        Ok(())
    }

    fn key_tap(&mut self, key: Key) -> Result<()> {
        match key {
            Key::Escape => {
                self.escapes += 1;
                let world = &mut self.world;
                if world.panel.is_some() {
                    world.panel = None;
                } else if world.batch_mode {
                    world.batch_mode = false;
                    world.selected.clear();
                    world.confirm_pending = 0;
                }
            }
        }
        Ok(())
    }
}

impl Clock for FakeUi {
    fn sleep(&mut self, duration: Duration, _jitter: f32) {
        self.slept += duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prices_render_with_separators() {
        assert_eq!(with_commas(123456), "123,456");
        assert_eq!(with_commas(999), "999");
        assert_eq!(with_commas(1000), "1,000");
    }

    #[test]
    fn hover_lifts_only_the_item_under_the_pointer() {
        let mut ui = FakeUi::new(World {
            items: vec![SimItem::new(0, 0, 1, 1, 2), SimItem::new(2, 0, 1, 1, 2)],
            ..World::default()
        });
        let idle = ui.render();
        ui.pointer = Point::new(ORIGIN_X + 5, ORIGIN_Y + 5);
        let hovered = ui.render();
        assert_ne!(idle.get_pixel(105, 205), hovered.get_pixel(105, 205));
        assert_eq!(idle.get_pixel(185, 205), hovered.get_pixel(185, 205));
    }
}

use crate::error::{Result, WarehouseError};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// Axis-aligned box in reference-resolution pixels. `x`/`y` may be negative
/// for cells scrolled above the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelPos {
    TopRight,
    BottomLeft,
    Center,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Rect { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    pub fn anchor(&self, pos: RelPos) -> Point {
        match pos {
            RelPos::TopRight => Point::new(self.right(), self.y),
            RelPos::BottomLeft => Point::new(self.x, self.bottom()),
            RelPos::Center => Point::new(self.x + self.w / 2, self.y + self.h / 2),
        }
    }

    pub fn center(&self) -> Point {
        self.anchor(RelPos::Center)
    }

    /// True when the whole rect lies inside a `width`×`height` frame.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.w > 0
            && self.h > 0
            && self.x >= 0
            && self.y >= 0
            && i64::from(self.right()) <= i64::from(width)
            && i64::from(self.bottom()) <= i64::from(height)
    }
}

/// Reference images the engine looks for on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Template {
    GridLeftAnchor,
    GridRightAnchor,
    SellButton,
    SystemPriceLabel,
    MarketPriceLabel,
    SellMarketButton,
    SellSystemButton,
    BatchSellButton,
    BatchSellSubmit,
    BatchSellConfirm,
    PriceDecrease,
    ListOnMarket,
}

impl Template {
    pub fn default_file(self) -> &'static str {
        match self {
            Template::GridLeftAnchor => "warehouse/warehouse_lefttop.png",
            Template::GridRightAnchor => "warehouse/warehouse_righttop.png",
            Template::SellButton => "warehouse/btn_sell.png",
            Template::SystemPriceLabel => "warehouse/sell_ui/text_system_price.png",
            Template::MarketPriceLabel => "warehouse/sell_ui/text_market_price.png",
            Template::SellMarketButton => "warehouse/sell_ui/btn_sell_market.png",
            Template::SellSystemButton => "warehouse/sell_ui/btn_sell_system.png",
            Template::BatchSellButton => "warehouse/btn_batch_sell.png",
            Template::BatchSellSubmit => "warehouse/btn_batch_sell_sell.png",
            Template::BatchSellConfirm => "warehouse/btn_batch_sell_confirm.png",
            Template::PriceDecrease => "warehouse/btn_sell_market_minus_price.png",
            Template::ListOnMarket => "warehouse/btn_sell_market_upshelf.png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
}

pub trait FrameSource {
    /// Current frame of the target window, already scaled to the reference resolution.
    fn capture_frame(&mut self) -> Result<RgbaImage>;
}

pub trait TemplateLocator {
    /// Drops per-session state such as cached template images.
    fn begin_session(&mut self) {}

    fn locate(&mut self, frame: &RgbaImage, template: Template, confidence: f32) -> Result<Option<Rect>>;
}

pub trait TextRecognizer {
    fn recognize_text(&mut self, crop: &RgbaImage) -> Option<String>;
}

/// Input primitives in reference coordinates. Positive scroll steps move the
/// viewport toward later rows.
pub trait InputDevice {
    fn move_pointer_to(&mut self, at: Point) -> Result<()>;
    fn click(&mut self) -> Result<()>;
    fn scroll(&mut self, steps: i32) -> Result<()>;
    fn key_tap(&mut self, key: Key) -> Result<()>;
}

pub trait Clock {
    fn sleep(&mut self, duration: Duration, jitter: f32);
}

pub trait Ui: FrameSource + TemplateLocator + TextRecognizer + InputDevice + Clock {}

impl<T> Ui for T where T: FrameSource + TemplateLocator + TextRecognizer + InputDevice + Clock {}

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(WarehouseError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_follow_rect_edges() {
        let rect = Rect::new(10, 20, 30, 40);
        assert_eq!(rect.anchor(RelPos::TopRight), Point::new(40, 20));
        assert_eq!(rect.anchor(RelPos::BottomLeft), Point::new(10, 60));
        assert_eq!(rect.center(), Point::new(25, 40));
    }

    #[test]
    fn fits_within_rejects_edge_overhang() {
        assert!(Rect::new(0, 0, 10, 10).fits_within(10, 10));
        assert!(!Rect::new(1, 0, 10, 10).fits_within(10, 10));
        assert!(!Rect::new(0, -1, 5, 5).fits_within(10, 10));
        assert!(!Rect::new(0, 0, 0, 5).fits_within(10, 10));
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(observer.check().is_ok());
        token.cancel();
        assert!(matches!(observer.check(), Err(WarehouseError::Cancelled)));
    }
}

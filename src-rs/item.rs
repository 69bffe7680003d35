use serde::Serialize;
use std::fmt;

/// Item footprint in grid cells. `y` is an absolute row, not a viewport row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CellBox {
    pub fn from_cells(cells: &[(i32, i32)]) -> Option<CellBox> {
        let first = cells.first()?;
        let (mut left, mut top) = *first;
        let (mut right, mut bottom) = *first;
        for &(col, row) in cells {
            left = left.min(col);
            right = right.max(col);
            top = top.min(row);
            bottom = bottom.max(row);
        }
        Some(CellBox {
            x: left,
            y: top,
            width: right - left + 1,
            height: bottom - top + 1,
        })
    }

    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (self.y..self.y + self.height)
            .flat_map(move |row| (self.x..self.x + self.width).map(move |col| (col, row)))
    }
}

/// Quality tiers: 0 unknown, then white, green, blue, purple, orange, red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ItemInfo {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub quality: u8,
    pub price_system_buy: i64,
    pub price_market: i64,
    pub can_sell_in_market: bool,
}

impl ItemInfo {
    pub fn new(footprint: CellBox) -> Self {
        ItemInfo {
            x: footprint.x,
            y: footprint.y,
            width: footprint.width,
            height: footprint.height,
            quality: 0,
            price_system_buy: 0,
            price_market: 0,
            can_sell_in_market: false,
        }
    }

    pub fn clear_prices(&mut self) {
        self.price_system_buy = 0;
        self.price_market = 0;
        self.can_sell_in_market = false;
    }

    pub fn market_margin(&self) -> i64 {
        self.price_market - self.price_system_buy
    }
}

impl fmt::Display for ItemInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {}) q{} system={} market={}{}",
            self.width,
            self.height,
            self.x,
            self.y,
            self.quality,
            self.price_system_buy,
            self.price_market,
            if self.can_sell_in_market { "" } else { " (no market)" }
        )
    }
}

use crate::config::PolicyConfig;
use crate::item::ItemInfo;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellPolicy {
    pub quality_ceiling: u8,
    pub profit_threshold: i64,
}

impl SellPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        SellPolicy {
            quality_ceiling: config.quality_ceiling,
            profit_threshold: config.profit_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    System,
    Market,
    /// Above the quality ceiling; left for manual handling.
    Hold,
}

pub fn route(item: &ItemInfo, policy: &SellPolicy) -> Route {
    if item.quality > policy.quality_ceiling {
        Route::Hold
    } else if item.can_sell_in_market && item.market_margin() > policy.profit_threshold {
        Route::Market
    } else {
        Route::System
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LiquidationPlan {
    pub system: Vec<ItemInfo>,
    pub market: Vec<ItemInfo>,
    pub held: Vec<ItemInfo>,
}

impl LiquidationPlan {
    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.market.is_empty()
    }
}

/// Splits the scan result, keeping scan order within each list.
pub fn plan_liquidation(items: &[ItemInfo], policy: &SellPolicy) -> LiquidationPlan {
    let mut plan = LiquidationPlan::default();
    for item in items {
        match route(item, policy) {
            Route::System => plan.system.push(*item),
            Route::Market => plan.market.push(*item),
            Route::Hold => plan.held.push(*item),
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::CellBox;

    fn item(quality: u8, system: i64, market: i64, can_sell: bool) -> ItemInfo {
        let mut item = ItemInfo::new(CellBox {
            x: 0,
            y: 0,
            width: 1,
            height: 1,
        });
        item.quality = quality;
        item.price_system_buy = system;
        item.price_market = market;
        item.can_sell_in_market = can_sell;
        item
    }

    fn policy() -> SellPolicy {
        SellPolicy {
            quality_ceiling: 4,
            profit_threshold: 6000,
        }
    }

    #[test]
    fn wide_margin_goes_to_market() {
        assert_eq!(route(&item(3, 1000, 8000, true), &policy()), Route::Market);
    }

    #[test]
    fn narrow_margin_goes_to_system() {
        assert_eq!(route(&item(3, 1000, 6500, true), &policy()), Route::System);
        // margin equal to the threshold is not enough
        assert_eq!(route(&item(3, 1000, 7000, true), &policy()), Route::System);
    }

    #[test]
    fn disabled_market_goes_to_system() {
        assert_eq!(route(&item(2, 1000, 90000, false), &policy()), Route::System);
    }

    #[test]
    fn rare_items_are_held() {
        assert_eq!(route(&item(5, 1000, 90000, true), &policy()), Route::Hold);
        assert_eq!(route(&item(4, 0, 0, false), &policy()), Route::System);
    }

    #[test]
    fn partition_is_total_and_disjoint() {
        let items: Vec<ItemInfo> = (0..7)
            .map(|q| item(q, 1000, 1000 + i64::from(q) * 2500, q % 2 == 1))
            .collect();
        let plan = plan_liquidation(&items, &policy());
        let eligible = items.iter().filter(|i| i.quality <= 4).count();
        assert_eq!(plan.system.len() + plan.market.len(), eligible);
        assert_eq!(plan.held.len(), items.len() - eligible);
        for sold in &plan.market {
            assert!(!plan.system.contains(sold));
        }
        assert_eq!(plan.market.len(), 1);
        assert_eq!(plan.market[0].quality, 3);
    }
}

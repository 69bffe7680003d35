use crate::error::{Result, WarehouseError};
use crate::imaging::{channel_means, crop};
use crate::item::ItemInfo;
use crate::panel::PanelGuard;
use crate::ports::{Rect, Template, Ui};
use crate::session::Session;
use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceReading {
    pub system: i64,
    pub market: i64,
    pub can_sell_in_market: bool,
}

/// Keeps only the ASCII digits: `"123,456 Coins"` reads as 123456.
pub fn extract_number(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

pub fn read_prices(system_text: Option<&str>, market_text: Option<&str>) -> Result<(i64, i64)> {
    let (Some(system_text), Some(market_text)) = (system_text, market_text) else {
        return Err(WarehouseError::ExtractionFailure(
            "price text not recognised".to_string(),
        ));
    };
    let system = extract_number(system_text).ok_or_else(|| {
        WarehouseError::ExtractionFailure(format!("no digits in system price {system_text:?}"))
    })?;
    let market = extract_number(market_text).ok_or_else(|| {
        WarehouseError::ExtractionFailure(format!("no digits in market price {market_text:?}"))
    })?;
    Ok((system, market))
}

/// Strip to the right of a price label, clipped to the frame.
pub fn price_strip(label: Rect, width: i32, frame_width: u32) -> Rect {
    let available = i64::from(frame_width) - i64::from(label.right());
    Rect::new(label.right(), label.y, width.min(available.max(0) as i32), label.h)
}

/// An enabled button is tinted; a disabled one is drawn in grey. The blue
/// and green averages sit together on the enabled button.
pub fn market_button_active(button: &RgbaImage, max_delta: f64) -> bool {
    let [_, g, b] = channel_means(button);
    debug!(green = g, blue = b, "market button colour");
    (b - g).abs() < max_delta
}

fn failure(what: &str) -> WarehouseError {
    WarehouseError::ExtractionFailure(what.to_string())
}

impl<U: Ui> Session<U> {
    /// Opens the item under the pointer and fills in its prices. Failures
    /// specific to this item leave zeroed prices and no market listing.
    pub(crate) fn extract_prices(&mut self, item: &mut ItemInfo) -> Result<()> {
        match self.read_price_panel() {
            Ok(reading) => {
                item.price_system_buy = reading.system;
                item.price_market = reading.market;
                item.can_sell_in_market = reading.can_sell_in_market;
                Ok(())
            }
            Err(err) if err.is_item_local() => {
                warn!(x = item.x, y = item.y, "{err}");
                item.clear_prices();
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn read_price_panel(&mut self) -> Result<PriceReading> {
        self.click()?;
        self.pause(100);

        let mut panel = PanelGuard::new(self);
        let sell = panel
            .wait_for(Template::SellButton)?
            .ok_or_else(|| failure("sell button did not appear"))?;
        panel.click_at(sell.center())?;

        let system_label = panel
            .wait_for(Template::SystemPriceLabel)?
            .ok_or_else(|| failure("system price label did not appear"))?;
        let market_label = panel
            .wait_for(Template::MarketPriceLabel)?
            .ok_or_else(|| failure("market price label did not appear"))?;

        let frame = panel.capture()?;
        let strip_width = panel.config().price.strip_width;
        let system_crop = crop(&frame, price_strip(system_label, strip_width, frame.width()))
            .ok_or_else(|| failure("system price strip outside frame"))?;
        let market_crop = crop(&frame, price_strip(market_label, strip_width, frame.width()))
            .ok_or_else(|| failure("market price strip outside frame"))?;

        let system_text = panel.ui_mut().recognize_text(&system_crop);
        let market_text = panel.ui_mut().recognize_text(&market_crop);
        debug!(?system_text, ?market_text, "price text");
        let (system, market) = read_prices(system_text.as_deref(), market_text.as_deref())?;

        let confidence = panel.config().price.market_button_confidence;
        let max_delta = panel.config().price.market_channel_delta;
        let can_sell_in_market = panel
            .ui_mut()
            .locate(&frame, Template::SellMarketButton, confidence)?
            .and_then(|rect| crop(&frame, rect))
            .map(|button| market_button_active(&button, max_delta))
            .unwrap_or(false);

        panel.close()?;
        Ok(PriceReading {
            system,
            market,
            can_sell_in_market,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn digits_are_extracted_from_decorated_text() {
        assert_eq!(extract_number("123,456 Coins"), Some(123456));
        assert_eq!(extract_number(" 8 000\n"), Some(8000));
        assert_eq!(extract_number(""), None);
        assert_eq!(extract_number("Coins"), None);
        assert_eq!(extract_number("99999999999999999999999"), None);
    }

    #[test]
    fn missing_text_is_an_extraction_failure() {
        assert_eq!(read_prices(Some("1,000"), Some("8,000")).unwrap(), (1000, 8000));
        assert!(matches!(
            read_prices(None, Some("8,000")),
            Err(WarehouseError::ExtractionFailure(_))
        ));
        assert!(matches!(
            read_prices(Some("1,000"), Some("n/a")),
            Err(WarehouseError::ExtractionFailure(_))
        ));
    }

    #[test]
    fn strip_is_clipped_to_frame() {
        let label = Rect::new(1700, 300, 120, 30);
        assert_eq!(price_strip(label, 400, 1920), Rect::new(1820, 300, 100, 30));
        assert_eq!(price_strip(Rect::new(10, 5, 20, 8), 400, 1920).w, 400);
    }

    #[test]
    fn grey_button_is_inactive() {
        let tinted = RgbaImage::from_pixel(10, 10, Rgba([40, 160, 161, 255]));
        let grey = RgbaImage::from_pixel(10, 10, Rgba([90, 90, 130, 255]));
        assert!(market_button_active(&tinted, 3.0));
        assert!(!market_button_active(&grey, 3.0));
    }
}

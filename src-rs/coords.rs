use crate::ports::Point;

/// Converts between capture pixels, the reference resolution the templates
/// were taken at, and the input injector's screen coordinates.
///
/// `scale` is reference / capture: a bigger window yields a smaller scale.
/// The game scales its UI by the shorter window side, so only that side is used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale: f64,
    origin: Point,
}

impl CoordinateMapper {
    pub fn identity() -> Self {
        CoordinateMapper {
            scale: 1.0,
            origin: Point::new(0, 0),
        }
    }

    pub fn from_capture_size(width: u32, height: u32, reference_short_side: u32, origin: Point) -> Self {
        let short = width.min(height);
        let scale = if short == 0 {
            1.0
        } else {
            f64::from(reference_short_side) / f64::from(short)
        };
        CoordinateMapper { scale, origin }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn needs_resize(&self) -> bool {
        (self.scale - 1.0).abs() > f64::EPSILON
    }

    pub fn reference_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            ((f64::from(width) * self.scale).round() as u32).max(1),
            ((f64::from(height) * self.scale).round() as u32).max(1),
        )
    }

    pub fn reference_to_input(&self, p: Point) -> Point {
        Point::new(
            (f64::from(p.x) / self.scale) as i32 + self.origin.x,
            (f64::from(p.y) / self.scale) as i32 + self.origin.y,
        )
    }
}

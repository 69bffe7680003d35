use crate::error::{Result, WarehouseError};
use crate::ports::{Point, Rect, RelPos, Template, Ui};
use crate::session::Session;
use serde::Serialize;
use tracing::{debug, info};

/// Grid placement in reference pixels. Cells are square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridGeometry {
    pub origin_x: i32,
    pub origin_y: i32,
    pub cell_width: i32,
    pub cell_height: i32,
}

impl GridGeometry {
    /// The left anchor's top-right corner is the grid origin; the right
    /// anchor's bottom-left x is the grid's right edge.
    pub fn from_anchors(left: Rect, right: Rect, columns: i32) -> Option<GridGeometry> {
        let origin = left.anchor(RelPos::TopRight);
        let right_edge = right.anchor(RelPos::BottomLeft);
        let width = right_edge.x - origin.x;
        if width <= 0 || columns <= 0 {
            return None;
        }
        let cell = (width as f32 / columns as f32).ceil() as i32;
        Some(GridGeometry {
            origin_x: origin.x,
            origin_y: origin.y,
            cell_width: cell,
            cell_height: cell,
        })
    }

    /// Pixel rect of the cell at `col`, absolute `row`, given the row scrolled to the top.
    pub fn cell_rect(&self, col: i32, row: i32, top_row: i32) -> Rect {
        Rect::new(
            self.origin_x + col * self.cell_width,
            self.origin_y + (row - top_row) * self.cell_height,
            self.cell_width,
            self.cell_height,
        )
    }

    pub fn block_rect(&self, col: i32, row: i32, width: i32, height: i32, top_row: i32) -> Rect {
        let first = self.cell_rect(col, row, top_row);
        Rect::new(first.x, first.y, width * self.cell_width, height * self.cell_height)
    }

    pub fn cell_center(&self, col: i32, row: i32, top_row: i32) -> Point {
        self.cell_rect(col, row, top_row).center()
    }

    /// Centre of the first cell; wheel events must land inside the grid.
    pub fn inside_point(&self) -> Point {
        Point::new(
            self.origin_x + self.cell_width / 2,
            self.origin_y + self.cell_height / 2,
        )
    }

    /// Up and left of the grid, where the pointer highlights nothing.
    pub fn outside_point(&self) -> Point {
        Point::new(
            self.origin_x - self.cell_width / 2,
            self.origin_y - self.cell_height / 2,
        )
    }

    pub fn right_edge(&self, columns: i32) -> i32 {
        self.origin_x + columns * self.cell_width
    }
}

impl<U: Ui> Session<U> {
    /// One capture, two template matches. Fails when either anchor is below
    /// the confidence threshold.
    pub fn detect_geometry(&mut self) -> Result<GridGeometry> {
        let confidence = self.config().grid.anchor_confidence;
        let columns = self.config().grid.columns;
        let frame = self.capture()?;
        let left = self.ui_mut().locate(&frame, Template::GridLeftAnchor, confidence)?;
        let right = self.ui_mut().locate(&frame, Template::GridRightAnchor, confidence)?;

        let (left, right) = match (left, right) {
            (Some(l), Some(r)) => (l, r),
            (None, Some(_)) => return Err(not_found("left anchor")),
            (Some(_), None) => return Err(not_found("right anchor")),
            (None, None) => return Err(not_found("both anchors")),
        };
        debug!(?left, ?right, "grid anchors located");

        let geometry = GridGeometry::from_anchors(left, right, columns)
            .ok_or_else(|| not_found("anchors out of order"))?;
        info!(
            origin_x = geometry.origin_x,
            origin_y = geometry.origin_y,
            cell = geometry.cell_width,
            "warehouse grid detected"
        );
        self.set_geometry(geometry);
        Ok(geometry)
    }
}

fn not_found(missing: &str) -> WarehouseError {
    WarehouseError::GeometryNotFound {
        missing: missing.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, FakeUi, World};

    #[test]
    fn cell_size_rounds_up() {
        let left = Rect::new(70, 200, 30, 20);
        let right = Rect::new(455, 180, 30, 20);
        let geometry = GridGeometry::from_anchors(left, right, 9).unwrap();
        assert_eq!(geometry.origin_x, 100);
        assert_eq!(geometry.origin_y, 200);
        // 355 / 9 = 39.4
        assert_eq!(geometry.cell_width, 40);
        assert_eq!(geometry.cell_height, 40);
    }

    #[test]
    fn anchors_out_of_order_are_rejected() {
        let left = Rect::new(400, 200, 30, 20);
        let right = Rect::new(100, 180, 30, 20);
        assert!(GridGeometry::from_anchors(left, right, 9).is_none());
    }

    #[test]
    fn cell_rects_follow_viewport_top() {
        let geometry = GridGeometry {
            origin_x: 100,
            origin_y: 200,
            cell_width: 40,
            cell_height: 40,
        };
        assert_eq!(geometry.cell_rect(2, 5, 4), Rect::new(180, 240, 40, 40));
        assert_eq!(geometry.cell_rect(0, 3, 4).y, 160);
        assert_eq!(geometry.block_rect(1, 4, 2, 3, 4), Rect::new(140, 200, 80, 120));
        assert_eq!(geometry.outside_point(), Point::new(80, 180));
    }

    #[test]
    fn detection_is_idempotent_on_unchanged_frame() {
        let mut session = Session::new(FakeUi::new(World::default()), test_config());
        let first = session.detect_geometry().unwrap();
        let second = session.detect_geometry().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.cell_width, 40);
        assert_eq!(session.ui().captures, 2);
    }

    #[test]
    fn missing_anchor_is_geometry_not_found() {
        let world = World {
            anchors_visible: false,
            ..World::default()
        };
        let mut session = Session::new(FakeUi::new(world), test_config());
        let err = session.detect_geometry().unwrap_err();
        assert!(matches!(err, WarehouseError::GeometryNotFound { .. }));
    }
}

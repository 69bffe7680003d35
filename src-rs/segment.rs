use crate::config::GridConfig;
use crate::error::Result;
use crate::geometry::GridGeometry;
use crate::imaging::{count_nonzero, crop, diff_mask, edge_count, to_gray};
use crate::item::{CellBox, ItemInfo};
use crate::ports::Ui;
use crate::quality::sample_swatch;
use crate::scroll::{ScrollState, SellMode};
use crate::session::{ScanResult, Session};
use image::{GrayImage, RgbaImage};
use tracing::{debug, info, warn};

/// Cells already attributed to an item, indexed by absolute row and column.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    rows: i32,
    cols: i32,
    cells: Vec<bool>,
}

impl OccupancyGrid {
    pub fn new(rows: i32, cols: i32) -> Self {
        let rows = rows.max(0);
        let cols = cols.max(0);
        OccupancyGrid {
            rows,
            cols,
            cells: vec![false; (rows * cols) as usize],
        }
    }

    pub fn contains(&self, col: i32, row: i32) -> bool {
        (0..self.cols).contains(&col) && (0..self.rows).contains(&row)
    }

    fn index(&self, col: i32, row: i32) -> Option<usize> {
        self.contains(col, row).then(|| (row * self.cols + col) as usize)
    }

    pub fn is_occupied(&self, col: i32, row: i32) -> bool {
        self.index(col, row).is_some_and(|i| self.cells[i])
    }

    /// Marks every cell of `footprint`, or none of them when any cell falls
    /// outside the grid.
    pub fn claim(&mut self, footprint: CellBox) -> bool {
        let indices: Option<Vec<usize>> = footprint
            .cells()
            .map(|(col, row)| self.index(col, row))
            .collect();
        let Some(indices) = indices else {
            return false;
        };
        for i in indices {
            self.cells[i] = true;
        }
        true
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }
}

/// Cells right of and below (`col`, `row`) whose hover highlight changed
/// more than the footprint threshold. Cells outside the grid or the frame
/// are never sampled.
pub fn trace_footprint(
    mask: &GrayImage,
    geometry: &GridGeometry,
    occupancy: &OccupancyGrid,
    (col, row): (i32, i32),
    top_row: i32,
    config: &GridConfig,
) -> Vec<(i32, i32)> {
    let mut cells = Vec::new();
    for dy in 0..config.neighborhood {
        for dx in 0..config.neighborhood {
            let (c, r) = (col + dx, row + dy);
            if !occupancy.contains(c, r) {
                continue;
            }
            let rect = geometry.cell_rect(c, r, top_row);
            let Some(changed) = count_nonzero(mask, rect) else {
                continue;
            };
            if changed > config.footprint_pixel_threshold {
                cells.push((c, r));
            }
        }
    }
    cells
}

/// `None` when the cell is not fully inside the frame.
pub fn cell_is_empty(
    baseline: &RgbaImage,
    geometry: &GridGeometry,
    (col, row): (i32, i32),
    top_row: i32,
    config: &GridConfig,
) -> Option<bool> {
    let cell = crop(baseline, geometry.cell_rect(col, row, top_row))?;
    let edges = edge_count(&to_gray(&cell), config.edge_low, config.edge_high);
    Some(edges < config.empty_edge_threshold)
}

impl<U: Ui> Session<U> {
    /// Walks the grid row by row and returns every item found, with quality
    /// and prices filled in.
    pub fn scan(&mut self) -> Result<ScanResult> {
        let geometry = self.detect_geometry()?;
        let home_steps = self.config().scroll.home_steps;
        self.move_to(geometry.inside_point())?;
        self.wheel(-home_steps)?;
        self.pause(300);
        let geometry = self.detect_geometry()?;

        self.set_mode(SellMode::Normal);
        let mut state = self.read_scroll_state()?;
        if state.is_calibrated() && state.top_visible_row != 0 {
            state = self.scroll_to_row(0)?;
        }

        let grid = self.config().grid.clone();
        let (rows, grid_rows) = match state.total_rows {
            Some(total) => {
                let tail = self.config().scroll.unscanned_tail_rows;
                ((total - tail).clamp(1, grid.max_rows), total.min(grid.max_rows))
            }
            None => (grid.visible_rows, grid.visible_rows),
        };
        info!(rows, total = ?state.total_rows, "scanning warehouse");

        let mut occupancy = OccupancyGrid::new(grid_rows.max(rows), grid.columns);
        let mut items = Vec::new();
        for row in 0..rows {
            let top = if state.is_calibrated() {
                // keep one row above in view so items reaching into this row stay visible
                let target = if row < 2 { row } else { row - 1 };
                self.scroll_to_row(target)?.top_visible_row
            } else {
                0
            };
            self.scan_row(&geometry, row, top, &mut occupancy, &mut items)?;
        }

        let scroll = if state.is_calibrated() {
            self.read_scroll_state()?
        } else {
            let occupied_rows = items.iter().map(|i| i.y + i.height).max().unwrap_or(0);
            ScrollState {
                total_rows: Some(occupied_rows),
                ..ScrollState::single_page()
            }
        };
        info!(items = items.len(), cells = occupancy.occupied(), "scan finished");
        Ok(ScanResult {
            geometry,
            scroll,
            rows_scanned: rows,
            items,
        })
    }

    fn scan_row(
        &mut self,
        geometry: &GridGeometry,
        row: i32,
        top: i32,
        occupancy: &mut OccupancyGrid,
        items: &mut Vec<ItemInfo>,
    ) -> Result<()> {
        let grid = self.config().grid.clone();
        let inset = self.config().quality.swatch_inset;
        let ceiling = self.config().policy.quality_ceiling;

        self.pause(100);
        self.move_to(geometry.outside_point())?;
        self.pause(60);
        let baseline = self.capture()?;

        for col in 0..grid.columns {
            if occupancy.is_occupied(col, row) {
                continue;
            }
            match cell_is_empty(&baseline, geometry, (col, row), top, &grid) {
                Some(true) => continue,
                Some(false) => {}
                None => {
                    debug!(col, row, top, "cell outside frame");
                    continue;
                }
            }

            self.move_to(geometry.cell_center(col, row, top))?;
            self.pause(30);
            let hovered = self.capture()?;
            let mask = diff_mask(&baseline, &hovered, grid.diff_threshold);
            let cells = trace_footprint(&mask, geometry, occupancy, (col, row), top, &grid);
            let Some(footprint) = CellBox::from_cells(&cells) else {
                debug!(col, row, "highlight too small, ignoring");
                continue;
            };
            if !occupancy.claim(footprint) {
                warn!(?footprint, "footprint leaves the grid, skipping");
                continue;
            }

            let mut item = ItemInfo::new(footprint);
            let block = geometry.block_rect(footprint.x, footprint.y, footprint.width, footprint.height, top);
            item.quality = sample_swatch(&baseline, block, inset)
                .map(|rgb| self.classifier().classify(rgb))
                .unwrap_or(0);

            if item.quality > ceiling {
                info!(%item, "above quality ceiling, not pricing");
            } else {
                self.extract_prices(&mut item)?;
                info!(%item, "item found");
            }
            items.push(item);
            self.pause(100);
        }
        Ok(())
    }
}

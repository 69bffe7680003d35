use super::command::{fill_placeholders, CommandRunner};
use crate::coords::CoordinateMapper;
use crate::ports::Point;
use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use std::path::PathBuf;

/// Screenshots through an external command writing a PNG to `{out}`.
pub struct CommandCapture {
    command: Vec<String>,
    runner: CommandRunner,
    scratch: PathBuf,
    reference_short_side: u32,
    origin: Point,
}

impl CommandCapture {
    pub fn new(
        command: Vec<String>,
        runner: CommandRunner,
        scratch: PathBuf,
        reference_short_side: u32,
        origin: Point,
    ) -> Self {
        CommandCapture {
            command,
            runner,
            scratch,
            reference_short_side,
            origin,
        }
    }

    /// Frame rescaled to the reference resolution, plus the mapping back to screen.
    pub fn capture(&self) -> Result<(RgbaImage, CoordinateMapper)> {
        let out = self.scratch.join("frame.png");
        let argv = fill_placeholders(&self.command, &[("out", out.display().to_string())]);
        self.runner.run(&argv)?;
        let raw = image::open(&out)
            .with_context(|| format!("failed to read capture: {}", out.display()))?
            .to_rgba8();
        Ok(to_reference(raw, self.reference_short_side, self.origin))
    }
}

pub fn to_reference(raw: RgbaImage, reference_short_side: u32, origin: Point) -> (RgbaImage, CoordinateMapper) {
    let (w, h) = raw.dimensions();
    let mapper = CoordinateMapper::from_capture_size(w, h, reference_short_side, origin);
    if !mapper.needs_resize() {
        return (raw, mapper);
    }
    let (rw, rh) = mapper.reference_size(w, h);
    (imageops::resize(&raw, rw, rh, FilterType::Triangle), mapper)
}

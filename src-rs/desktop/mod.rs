//! Ports backed by external programs: a screenshot tool, an OCR engine and an
//! input injector, each driven through configurable command lines.

mod capture;
mod command;
mod input;
mod matcher;
mod ocr;

use anyhow::Context;
use crate::config::EngineConfig;
use crate::coords::CoordinateMapper;
use crate::error::{Result, WarehouseError};
use crate::ports::{Clock, FrameSource, InputDevice, Key, Point, Rect, Template, TemplateLocator, TextRecognizer};
use capture::CommandCapture;
use command::CommandRunner;
use image::RgbaImage;
use input::CommandInput;
use matcher::{NccLocator, TemplateCache};
use ocr::CommandOcr;
use rand::Rng;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// `duration` extended by `duration * jitter * roll`, with `roll` in `[0, 1)`.
pub fn jittered(duration: Duration, jitter: f32, roll: f32) -> Duration {
    if jitter <= 0.0 {
        return duration;
    }
    duration + duration.mul_f32(jitter * roll.clamp(0.0, 1.0))
}

pub struct DesktopUi {
    capture: CommandCapture,
    input: CommandInput,
    ocr: CommandOcr,
    locator: NccLocator,
    mapper: CoordinateMapper,
    /// Capture and OCR files; removed when the adapter is dropped.
    _scratch: TempDir,
}

impl DesktopUi {
    pub fn new(config: &EngineConfig) -> anyhow::Result<Self> {
        let desktop = &config.desktop;
        let scratch_dir = tempfile::Builder::new()
            .prefix("warehouse-liquidator-")
            .tempdir()
            .context("failed to create scratch directory")?;
        let scratch = scratch_dir.path().to_path_buf();

        let runner = CommandRunner::new(
            Duration::from_millis(desktop.command_timeout_ms),
            desktop.command_attempts,
        );
        if let Some(focus) = &desktop.focus_command {
            info!("focusing target window");
            runner.run(focus)?;
        }

        let origin = Point::new(desktop.window_origin.0, desktop.window_origin.1);
        Ok(DesktopUi {
            capture: CommandCapture::new(
                desktop.capture_command.clone(),
                runner.clone(),
                scratch.clone(),
                desktop.reference_short_side,
                origin,
            ),
            input: CommandInput::new(desktop, runner.clone()),
            ocr: CommandOcr::new(desktop.ocr_command.clone(), runner, scratch),
            locator: NccLocator::new(TemplateCache::new(config.templates.clone()), desktop.matcher_coarse_factor),
            mapper: CoordinateMapper::identity(),
            _scratch: scratch_dir,
        })
    }
}

impl FrameSource for DesktopUi {
    fn capture_frame(&mut self) -> Result<RgbaImage> {
        let (frame, mapper) = self
            .capture
            .capture()
            .map_err(|err| WarehouseError::Capture(format!("{err:#}")))?;
        debug!(scale = mapper.scale(), width = frame.width(), height = frame.height(), "frame captured");
        self.mapper = mapper;
        Ok(frame)
    }
}

impl TemplateLocator for DesktopUi {
    fn begin_session(&mut self) {
        self.locator.clear();
    }

    fn locate(&mut self, frame: &RgbaImage, template: Template, confidence: f32) -> Result<Option<Rect>> {
        self.locator
            .locate(frame, template, confidence)
            .map_err(|err| WarehouseError::Template(format!("{err:#}")))
    }
}

impl TextRecognizer for DesktopUi {
    fn recognize_text(&mut self, crop: &RgbaImage) -> Option<String> {
        match self.ocr.recognize(crop) {
            Ok(text) => text,
            Err(err) => {
                warn!("text recognition failed: {err:#}");
                None
            }
        }
    }
}

fn input_error(err: anyhow::Error) -> WarehouseError {
    WarehouseError::Input(format!("{err:#}"))
}

impl InputDevice for DesktopUi {
    fn move_pointer_to(&mut self, at: Point) -> Result<()> {
        let screen = self.mapper.reference_to_input(at);
        debug!(x = at.x, y = at.y, sx = screen.x, sy = screen.y, "move pointer");
        self.input.move_to(screen).map_err(input_error)
    }

    fn click(&mut self) -> Result<()> {
        self.input.click().map_err(input_error)
    }

    fn scroll(&mut self, steps: i32) -> Result<()> {
        self.input.scroll(steps).map_err(input_error)
    }

    fn key_tap(&mut self, key: Key) -> Result<()> {
        self.input.key_tap(key).map_err(input_error)
    }
}

impl Clock for DesktopUi {
    fn sleep(&mut self, duration: Duration, jitter: f32) {
        let roll: f32 = rand::thread_rng().gen();
        thread::sleep(jittered(duration, jitter, roll));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_only_extends() {
        let base = Duration::from_millis(100);
        assert_eq!(jittered(base, 0.0, 0.9), base);
        assert_eq!(jittered(base, 0.5, 0.0), base);
        assert_eq!(jittered(base, 0.5, 0.5), Duration::from_millis(125));
        assert!(jittered(base, 0.2, 7.0) < Duration::from_millis(121));
    }

    #[test]
    fn scratch_directory_is_removed_on_drop() {
        let ui = DesktopUi::new(&EngineConfig::default()).unwrap();
        let dir = ui._scratch.path().to_path_buf();
        assert!(dir.is_dir());
        drop(ui);
        assert!(!dir.exists());
    }
}

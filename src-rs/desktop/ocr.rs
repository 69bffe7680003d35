use super::command::{fill_placeholders, CommandRunner};
use crate::imaging::{mean_luma, to_gray};
use anyhow::{Context, Result};
use image::{GrayImage, RgbaImage};
use std::path::PathBuf;

/// Grayscale, inverted when the crop is mostly dark so the recognizer
/// always sees dark text on a light background.
pub fn prepare_for_ocr(crop: &RgbaImage) -> GrayImage {
    let mut gray = to_gray(crop);
    if mean_luma(&gray) < 128.0 {
        image::imageops::invert(&mut gray);
    }
    gray
}

pub struct CommandOcr {
    command: Vec<String>,
    runner: CommandRunner,
    scratch: PathBuf,
}

impl CommandOcr {
    pub fn new(command: Vec<String>, runner: CommandRunner, scratch: PathBuf) -> Self {
        CommandOcr {
            command,
            runner,
            scratch,
        }
    }

    /// Trimmed recognizer output; `None` when nothing was recognised.
    pub fn recognize(&self, crop: &RgbaImage) -> Result<Option<String>> {
        let input = self.scratch.join("ocr.png");
        prepare_for_ocr(crop)
            .save(&input)
            .with_context(|| format!("failed to write OCR input: {}", input.display()))?;
        let argv = fill_placeholders(&self.command, &[("in", input.display().to_string())]);
        let stdout = self.runner.run(&argv)?;
        let text = String::from_utf8_lossy(&stdout).trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }
}

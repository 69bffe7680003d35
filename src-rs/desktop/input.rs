use super::command::{fill_placeholders, CommandRunner};
use crate::config::DesktopConfig;
use crate::ports::{Key, Point};
use anyhow::Result;

pub fn key_name(key: Key) -> &'static str {
    match key {
        Key::Escape => "Escape",
    }
}

/// Input injection through external commands, in screen coordinates.
pub struct CommandInput {
    move_command: Vec<String>,
    click_command: Vec<String>,
    scroll_up_command: Vec<String>,
    scroll_down_command: Vec<String>,
    key_command: Vec<String>,
    runner: CommandRunner,
}

impl CommandInput {
    pub fn new(config: &DesktopConfig, runner: CommandRunner) -> Self {
        CommandInput {
            move_command: config.move_command.clone(),
            click_command: config.click_command.clone(),
            scroll_up_command: config.scroll_up_command.clone(),
            scroll_down_command: config.scroll_down_command.clone(),
            key_command: config.key_command.clone(),
            runner,
        }
    }

    pub fn move_to(&self, at: Point) -> Result<()> {
        let argv = fill_placeholders(
            &self.move_command,
            &[("x", at.x.to_string()), ("y", at.y.to_string())],
        );
        self.runner.run(&argv).map(drop)
    }

    pub fn click(&self) -> Result<()> {
        self.runner.run(&self.click_command).map(drop)
    }

    /// Positive steps scroll toward later rows.
    pub fn scroll(&self, steps: i32) -> Result<()> {
        if steps == 0 {
            return Ok(());
        }
        let command = if steps > 0 {
            &self.scroll_down_command
        } else {
            &self.scroll_up_command
        };
        let argv = fill_placeholders(command, &[("n", steps.unsigned_abs().to_string())]);
        self.runner.run(&argv).map(drop)
    }

    pub fn key_tap(&self, key: Key) -> Result<()> {
        let argv = fill_placeholders(&self.key_command, &[("key", key_name(key).to_string())]);
        self.runner.run(&argv).map(drop)
    }
}

use anyhow::{bail, Result};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Replaces `{name}` placeholders in every argument.
pub fn fill_placeholders(argv: &[String], vars: &[(&str, String)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        })
        .collect()
}

/// Runs helper programs under a deadline, retrying with linear backoff.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    attempts: u32,
    delay: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration, attempts: u32) -> Self {
        CommandRunner {
            timeout,
            attempts: attempts.max(1),
            delay: Duration::from_millis(50),
        }
    }

    /// Stdout of the first successful attempt.
    pub fn run(&self, argv: &[String]) -> Result<Vec<u8>> {
        let Some((program, args)) = argv.split_first() else {
            bail!("empty command");
        };

        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match self.run_once(program, args) {
                Ok(stdout) => {
                    debug!(program, attempt, bytes = stdout.len(), "command finished");
                    return Ok(stdout);
                }
                Err(err) => {
                    warn!(program, attempt, "command failed: {err:#}");
                    last_error = format!("{err:#}");
                }
            }
            if attempt < self.attempts {
                let backoff = self.delay.saturating_mul(attempt);
                thread::sleep(backoff.max(Duration::from_millis(10)));
            }
        }
        bail!("{program} failed after {} attempts: {last_error}", self.attempts)
    }

    fn run_once(&self, program: &str, args: &[String]) -> Result<Vec<u8>> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        match child.wait_timeout(self.timeout) {
            Ok(Some(_)) => {
                let output = child.wait_with_output()?;
                if output.status.success() {
                    return Ok(output.stdout);
                }
                let code = output.status.code().unwrap_or(1);
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                if stderr.is_empty() {
                    bail!("exited with status {code}");
                }
                bail!("exited with status {code}: {stderr}")
            }
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                bail!("timed out after {}ms", self.timeout.as_millis())
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(err.into())
            }
        }
    }
}

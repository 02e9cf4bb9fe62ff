//! Interaction surface for review prompts.
//!
//! The [`Interact`] trait decouples the refinement state machine from the
//! terminal. Tests use scripted interactors that replay predetermined answers
//! without touching stdin.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

/// Synchronous request/response abstraction over the user-facing surface.
///
/// A `None` answer means the user dismissed the prompt without choosing.
pub trait Interact {
    /// Present a numbered choice list; returns the selected index.
    fn choose(&mut self, prompt: &str, options: &[&str]) -> Result<Option<usize>>;

    /// Collect one line of free text. Empty input is `None`.
    fn input(&mut self, prompt: &str) -> Result<Option<String>>;

    /// Re-present content for review. Called on every entry into the
    /// reviewing state so a lost surface is always reopened.
    fn show(&mut self, heading: &str, content: &str) -> Result<()>;

    /// Informational notice (success, cancellation, fallback paths).
    fn notify(&mut self, message: &str) -> Result<()>;
}

/// Terminal interactor reading stdin and writing stdout.
pub struct Console;

impl Console {
    fn read_line(&self) -> Result<String> {
        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("read stdin")?;
        Ok(line.trim().to_string())
    }
}

impl Interact for Console {
    fn choose(&mut self, prompt: &str, options: &[&str]) -> Result<Option<usize>> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "\n{prompt}").context("write prompt")?;
        for (i, option) in options.iter().enumerate() {
            writeln!(out, "  {}) {option}", i + 1).context("write option")?;
        }
        write!(out, "> ").context("write cursor")?;
        out.flush().context("flush stdout")?;
        drop(out);

        let line = self.read_line()?;
        if line.is_empty() || line.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        match line.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => Ok(Some(n - 1)),
            _ => Ok(None),
        }
    }

    fn input(&mut self, prompt: &str) -> Result<Option<String>> {
        let mut out = std::io::stdout().lock();
        write!(out, "\n{prompt}\n> ").context("write prompt")?;
        out.flush().context("flush stdout")?;
        drop(out);

        let line = self.read_line()?;
        Ok((!line.is_empty()).then_some(line))
    }

    fn show(&mut self, heading: &str, content: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "\n--- {heading} ---\n{content}\n---").context("write content")?;
        out.flush().context("flush stdout")?;
        Ok(())
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{message}").context("write notice")?;
        out.flush().context("flush stdout")?;
        Ok(())
    }
}

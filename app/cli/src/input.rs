//! The stdin input queue.
//!
//! Reads UTF-8 lines and turns them into session prompts. Two delivery
//! modes:
//!
//! - **coalesce** (default): lines arriving within the coalescing window are
//!   merged into one prompt, so a multi-line paste becomes a single turn
//! - **literal**: every non-blank line is its own prompt
//!
//! A line may be a JSON object with an optional `message` field or plain
//! text (taken as the message body). Blank lines are ignored. EOF means "no
//! more prompts".

use std::time::Duration;

use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::io::Lines;
use tokio::io::Stdin;

/// How stdin lines become prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Merge lines arriving within the coalescing window.
    Coalesce,
    /// One prompt per line.
    Literal,
}

/// Queue of prompts read from a line source.
pub struct InputQueue<R: AsyncBufRead + Unpin> {
    lines: Lines<R>,
    mode: InputMode,
    window: Duration,
    eof: bool,
}

impl InputQueue<BufReader<Stdin>> {
    /// Queue reading from stdin.
    pub fn stdin(mode: InputMode, window: Duration) -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()), mode, window)
    }
}

impl<R: AsyncBufRead + Unpin> InputQueue<R> {
    /// Queue reading from any buffered line source.
    pub fn from_reader(reader: R, mode: InputMode, window: Duration) -> Self {
        Self {
            lines: reader.lines(),
            mode,
            window,
            eof: false,
        }
    }

    /// The next prompt, or `None` at end of input.
    pub async fn next_prompt(&mut self) -> Option<String> {
        if self.eof {
            return None;
        }
        match self.mode {
            InputMode::Literal => self.next_literal().await,
            InputMode::Coalesce => self.next_coalesced().await,
        }
    }

    async fn next_literal(&mut self) -> Option<String> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(message) = parse_line(&line) {
                        return Some(message);
                    }
                }
                Ok(None) | Err(_) => {
                    self.eof = true;
                    return None;
                }
            }
        }
    }

    async fn next_coalesced(&mut self) -> Option<String> {
        // Wait indefinitely for the first line of a prompt.
        let mut buffer = loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(message) = parse_line(&line) {
                        break message;
                    }
                }
                Ok(None) | Err(_) => {
                    self.eof = true;
                    return None;
                }
            }
        };

        // Keep absorbing lines until the window elapses with no new input.
        loop {
            match tokio::time::timeout(self.window, self.lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if let Some(message) = parse_line(&line) {
                        buffer.push('\n');
                        buffer.push_str(&message);
                    }
                }
                Ok(Ok(None)) | Ok(Err(_)) => {
                    self.eof = true;
                    return Some(buffer);
                }
                Err(_) => return Some(buffer),
            }
        }
    }
}

/// Interpret one input line.
///
/// JSON objects contribute their `message` field; anything else is plain
/// text. Blank lines (and JSON without a message) yield `None`.
fn parse_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            return value["message"]
                .as_str()
                .filter(|m| !m.is_empty())
                .map(str::to_string);
        }
    }

    Some(trimmed.to_string())
}

#[cfg(test)]
#[path = "input.test.rs"]
mod tests;

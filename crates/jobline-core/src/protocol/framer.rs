//! Line framer: bytes in, complete `\n`-terminated lines out.
//!
//! Each connection owns one framer. Whatever follows the last newline of a
//! read stays in the framer until a later read completes it.

use thiserror::Error;

/// Upper bound on a single unterminated line.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("line exceeds {limit} bytes without a newline")]
    LineTooLong { limit: usize },
}

#[derive(Debug)]
pub struct LineFramer {
    remainder: Vec<u8>,
    max_line_bytes: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line(max_line_bytes: usize) -> Self {
        Self {
            remainder: Vec::new(),
            max_line_bytes,
        }
    }

    /// Append a chunk and drain every complete line.
    ///
    /// Lines come back without the newline. Invalid UTF-8 is replaced, not
    /// rejected.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, FrameError> {
        self.remainder.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.remainder[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(String::from_utf8_lossy(&self.remainder[start..end]).into_owned());
            start = end + 1;
        }
        self.remainder.drain(..start);

        if self.remainder.len() > self.max_line_bytes {
            return Err(FrameError::LineTooLong {
                limit: self.max_line_bytes,
            });
        }
        Ok(lines)
    }

    /// Bytes received after the last newline.
    pub fn remainder(&self) -> &[u8] {
        &self.remainder
    }
}

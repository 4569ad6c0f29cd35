//! Receive buffer that turns raw socket reads into lines

use tracing::warn;

/// Accumulates bytes and hands out complete `\n`-terminated lines
///
/// A partial line longer than `max_line_len` is dropped together with the
/// rest of that line, so the buffer stays bounded against a peer that never
/// sends a terminator.
#[derive(Debug)]
pub struct LineBuffer {
    data: Vec<u8>,
    max_line_len: usize,
    /// Offset where the remainder of a dropped line will land
    discard_at: Option<usize>,
}

impl LineBuffer {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            data: Vec::with_capacity(max_line_len.min(4096)),
            max_line_len: max_line_len.max(1),
            discard_at: None,
        }
    }

    /// Bytes held, complete lines included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether a complete line is waiting
    pub fn has_line(&self) -> bool {
        self.data.contains(&b'\n')
    }

    /// Append raw bytes from one read
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);

        if let Some(at) = self.discard_at {
            match self.data[at..].iter().position(|b| *b == b'\n') {
                Some(offset) => {
                    self.data.drain(at..=at + offset);
                    self.discard_at = None;
                }
                None => {
                    self.data.truncate(at);
                    return;
                }
            }
        }

        let start = self.data.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        let partial = self.data.len() - start;
        if partial > self.max_line_len {
            warn!(len = partial, max = self.max_line_len, "Discarding overlong partial line");
            self.data.truncate(start);
            self.discard_at = Some(start);
        }
    }

    /// Next complete line without its terminator (and without a trailing `\r`)
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self.data.iter().position(|b| *b == b'\n')?;
            let mut line: Vec<u8> = self.data.drain(..=end).collect();
            line.pop();
            if let Some(at) = self.discard_at.as_mut() {
                *at -= end + 1;
            }

            if line.len() > self.max_line_len {
                warn!(len = line.len(), max = self.max_line_len, "Discarding overlong line");
                continue;
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }
}

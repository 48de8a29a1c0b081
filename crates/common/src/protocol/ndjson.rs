// Incremental newline framing for streamed response bodies.
//
// Network reads split lines arbitrarily; bytes are buffered until a full
// line is available. Lines are decoded lossily so one bad byte sequence
// cannot wedge the stream.

/// Splits a byte stream into complete, non-blank lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read. Returns every line completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut consumed = 0usize;
        while let Some(offset) = self.pending[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + offset;
            if let Some(line) = decode_line(&self.pending[consumed..end]) {
                lines.push(line);
            }
            consumed = end + 1;
        }
        self.pending.drain(..consumed);
        lines
    }

    /// Flush a final unterminated line once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        decode_line(&rest)
    }

    /// Bytes held back waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

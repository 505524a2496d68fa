//! Incremental NDJSON line decoding.
//!
//! The runtime streams newline-delimited JSON records, and the HTTP layer
//! hands us arbitrary byte chunks that may end mid-record. The decoder owns
//! the "bytes consumed" bookkeeping: every byte is examined exactly once, a
//! complete line is emitted exactly once, and a trailing fragment is held
//! back until its terminator arrives (or `finish` is called).

/// Splits a byte stream into complete lines across `push` calls.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed the next chunk; returns every line completed by it, in order.
    /// Line terminators are stripped (`\n`, and a preceding `\r` if present).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(i) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line_bytes: Vec<u8> = self.buf.drain(..=i).collect();
            line_bytes.pop();
            if line_bytes.last() == Some(&b'\r') {
                line_bytes.pop();
            }
            lines.push(String::from_utf8_lossy(&line_bytes).into_owned());
        }
        lines
    }

    /// Consume the decoder, returning the unterminated trailing line if the
    /// stream ended without a final newline.
    pub fn finish(self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buf).into_owned())
        }
    }
}

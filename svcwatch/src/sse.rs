//! Incremental `text/event-stream` frame decoder.

use std::time::Duration;

use tracing::warn;

/// Longest line kept; anything beyond it is discarded with its frame.
pub const MAX_LINE_BYTES: usize = 1 << 20;
/// Largest joined `data` payload accepted for one frame.
pub const MAX_FRAME_BYTES: usize = 4 << 20;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Feed raw body chunks in, get complete frames out. Chunks may split lines
/// and even multi-byte characters anywhere.
#[derive(Debug)]
pub struct SseDecoder {
    buf: Vec<u8>,
    max_line: usize,
    max_frame: usize,
    // the current line outgrew `max_line`
    line_overflow: bool,
    // the current frame lost data to a size limit and will be dropped
    oversized: bool,
    data_len: usize,
    // a chunk ended on '\r'; a leading '\n' in the next one belongs to it
    pending_cr: bool,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    // last `retry:` value seen; sticky across frames
    retry: Option<Duration>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_limits(MAX_LINE_BYTES, MAX_FRAME_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_line: usize, max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
            max_frame,
            line_overflow: false,
            oversized: false,
            data_len: 0,
            pending_cr: false,
            event: None,
            data: Vec::new(),
            id: None,
            retry: None,
        }
    }

    /// Reconnection delay requested by the server, if any.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut out = Vec::new();
        let mut bytes = chunk;
        if self.pending_cr {
            self.pending_cr = false;
            if let Some(rest) = bytes.strip_prefix(b"\n") {
                bytes = rest;
            }
        }
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => self.end_line(&mut out),
                b'\r' => {
                    self.end_line(&mut out);
                    match bytes.get(i + 1) {
                        Some(b'\n') => i += 1,
                        None => self.pending_cr = true,
                        Some(_) => {}
                    }
                }
                b if self.buf.len() < self.max_line => self.buf.push(b),
                _ => self.line_overflow = true,
            }
            i += 1;
        }
        out
    }

    fn end_line(&mut self, out: &mut Vec<SseFrame>) {
        if self.line_overflow {
            warn!(limit = self.max_line, "dropping oversized event stream line");
            self.buf.clear();
            self.line_overflow = false;
            self.oversized = true;
            return;
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        if line.is_empty() {
            if let Some(frame) = self.dispatch() {
                out.push(frame);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line.as_str(), ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.push_data(value),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
    }

    fn push_data(&mut self, value: &str) {
        if self.oversized {
            return;
        }
        self.data_len += value.len() + 1;
        if self.data_len > self.max_frame {
            warn!(limit = self.max_frame, "dropping oversized event stream frame");
            self.oversized = true;
            self.data.clear();
            return;
        }
        self.data.push(value.to_string());
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        self.data_len = 0;
        if std::mem::take(&mut self.oversized) {
            self.data.clear();
            return None;
        }
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.filter(|e| !e.is_empty()).unwrap_or_else(|| "message".into()),
            data,
            id,
        })
    }
}

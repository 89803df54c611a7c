//! Byte-level record framing.
//!
//! The input is a stream of JSON objects, optionally wrapped in one
//! top-level array, arriving in arbitrary chunk sizes. The scanner cuts
//! the stream into complete records by tracking brace depth with full
//! string/escape awareness, and stays re-entrant: a record may start in
//! one chunk and end many chunks later.
//!
//! Oversized records are discarded while the state machine keeps
//! scanning to their closing brace, so one runaway producer cannot
//! desynchronise the stream.

/// Outcome of scanning, delivered in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    /// A complete top-level object, byte-exact as received.
    Record(Vec<u8>),
    /// A run of non-record bytes at top level was skipped.
    Garbage,
    /// A record exceeded the size limit and was discarded.
    Oversize,
    /// Input ended in the middle of a record.
    Truncated,
}

#[derive(Debug)]
pub struct RecordScanner {
    buf: Vec<u8>,
    depth: u32,
    in_string: bool,
    escaped: bool,
    in_record: bool,
    discarding: bool,
    in_garbage: bool,
    max_record_bytes: usize,
}

impl Default for RecordScanner {
    fn default() -> Self {
        RecordScanner::new(64 * 1024)
    }
}

impl RecordScanner {
    pub fn new(max_record_bytes: usize) -> Self {
        RecordScanner {
            buf: Vec::new(),
            depth: 0,
            in_string: false,
            escaped: false,
            in_record: false,
            discarding: false,
            in_garbage: false,
            max_record_bytes,
        }
    }

    /// Feed one chunk; emits completed items into `out`.
    pub fn feed(&mut self, chunk: &[u8], out: &mut Vec<ScanItem>) {
        for &b in chunk {
            if self.in_record {
                self.record_byte(b, out);
            } else {
                self.top_level_byte(b, out);
            }
        }
    }

    /// Signal end of input; an unterminated record is reported.
    pub fn finish(&mut self, out: &mut Vec<ScanItem>) {
        if self.in_record {
            if !self.discarding {
                out.push(ScanItem::Truncated);
            }
            self.reset_record();
        }
        self.in_garbage = false;
    }

    fn top_level_byte(&mut self, b: u8, out: &mut Vec<ScanItem>) {
        match b {
            b'{' => {
                self.in_garbage = false;
                self.in_record = true;
                self.depth = 1;
                self.buf.clear();
                self.buf.push(b);
            }
            // Whitespace, array wrapper and element separators are
            // insignificant between records.
            b' ' | b'\t' | b'\r' | b'\n' | b',' | b'[' | b']' => {}
            _ => {
                if !self.in_garbage {
                    self.in_garbage = true;
                    out.push(ScanItem::Garbage);
                }
            }
        }
    }

    fn record_byte(&mut self, b: u8, out: &mut Vec<ScanItem>) {
        if !self.discarding {
            self.buf.push(b);
            if self.buf.len() > self.max_record_bytes {
                self.discarding = true;
                self.buf.clear();
                out.push(ScanItem::Oversize);
            }
        }
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if b == b'\\' {
                self.escaped = true;
            } else if b == b'"' {
                self.in_string = false;
            }
            return;
        }
        match b {
            b'"' => self.in_string = true,
            b'{' => self.depth += 1,
            b'}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    if !self.discarding {
                        out.push(ScanItem::Record(std::mem::take(&mut self.buf)));
                    }
                    self.reset_record();
                }
            }
            _ => {}
        }
    }

    fn reset_record(&mut self) {
        self.buf.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
        self.in_record = false;
        self.discarding = false;
    }
}

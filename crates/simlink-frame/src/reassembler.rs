use bytes::BytesMut;
use serde_json::Value;
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::locale::fix_locale_floats;

/// Default ceiling for a message that is still being reassembled: 16 MiB.
pub const DEFAULT_MAX_PARTIAL: usize = 16 * 1024 * 1024;

/// Configuration for the frame reassembler.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum bytes held for one unfinished message. Default: 16 MiB.
    pub max_partial_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_partial_len: DEFAULT_MAX_PARTIAL,
        }
    }
}

/// Rebuilds JSON objects from arbitrarily split stream chunks.
///
/// State carried between [`feed`](FrameReassembler::feed) calls:
/// - `carry`: trailing bytes of a UTF-8 sequence cut by the read boundary
/// - `line`: text received since the last newline
/// - `partial`: completed lines that belong to an object still missing its `}`
///
/// Two structural scans track `partial` and `partial + line` as bytes arrive,
/// so checking for a finished object never rescans earlier input.
pub struct FrameReassembler {
    config: FrameConfig,
    carry: BytesMut,
    line: String,
    partial: Vec<String>,
    partial_len: usize,
    partial_scan: ObjectScan,
    line_scan: ObjectScan,
}

impl FrameReassembler {
    /// Create a reassembler with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a reassembler with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            carry: BytesMut::new(),
            line: String::new(),
            partial: Vec::new(),
            partial_len: 0,
            partial_scan: ObjectScan::default(),
            line_scan: ObjectScan::default(),
        }
    }

    /// Feed one raw chunk and collect every message it completes.
    ///
    /// The outer error is fatal for the stream (the chunk was not UTF-8).
    /// Inner errors each cost exactly one message and leave the reassembler
    /// ready for the next one.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Result<Value>>> {
        let text = self.decode(chunk)?;
        let mut out = Vec::new();

        let mut pieces = text.split('\n').peekable();
        while let Some(piece) = pieces.next() {
            self.line.push_str(piece);
            self.line_scan.feed(piece);

            if pieces.peek().is_some() {
                let line = std::mem::take(&mut self.line);
                self.accept_line(line, &mut out);
            } else if self.tail_completes_object() {
                let line = std::mem::take(&mut self.line);
                self.accept_line(line, &mut out);
            } else {
                self.check_limit(&mut out);
            }
        }

        Ok(out)
    }

    /// Drop all buffered state.
    pub fn reset(&mut self) {
        self.carry.clear();
        self.line.clear();
        self.clear_partial();
    }

    /// Bytes currently held for unfinished messages.
    pub fn pending_len(&self) -> usize {
        self.carry.len() + self.line.len() + self.partial_len
    }

    /// True while an object has been opened but not yet closed.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Current configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<String> {
        self.carry.extend_from_slice(chunk);
        let bytes = self.carry.split();

        match std::str::from_utf8(&bytes) {
            Ok(text) => Ok(text.to_owned()),
            Err(err) if err.error_len().is_none() => {
                // Incomplete sequence at the very end: keep it for the next chunk.
                let valid = err.valid_up_to();
                self.carry.extend_from_slice(&bytes[valid..]);
                std::str::from_utf8(&bytes[..valid])
                    .map(str::to_owned)
                    .map_err(|_| FrameError::InvalidUtf8 { offset: valid })
            }
            Err(err) => Err(FrameError::InvalidUtf8 {
                offset: err.valid_up_to(),
            }),
        }
    }

    fn accept_line(&mut self, line: String, out: &mut Vec<Result<Value>>) {
        if line.chars().nth(1).is_none() {
            self.line_scan = self.partial_scan;
            return;
        }

        if line.starts_with('{') && line.ends_with('}') {
            self.line_scan = self.partial_scan;
            out.push(parse(&line));
            return;
        }

        if self.partial.is_empty() && !line.starts_with('{') {
            self.line_scan = self.partial_scan;
            trace!(len = line.len(), "fragment outside any object");
            out.push(Err(FrameError::Unanchored { len: line.len() }));
            return;
        }

        let closes = line.ends_with('}');
        self.partial_len += line.len();
        self.partial.push(line);
        self.partial_scan = self.line_scan;

        if closes {
            let assembled = self.partial.concat();
            self.clear_partial();
            trace!(len = assembled.len(), "assembled partial message");
            out.push(parse(&assembled));
        } else {
            self.check_limit(out);
        }
    }

    fn tail_completes_object(&self) -> bool {
        !self.line.is_empty() && self.line_scan.is_complete()
    }

    fn clear_partial(&mut self) {
        self.partial.clear();
        self.partial_len = 0;
        self.partial_scan = ObjectScan::default();
        self.line_scan = ObjectScan::default();
    }

    fn check_limit(&mut self, out: &mut Vec<Result<Value>>) {
        let size = self.line.len() + self.partial_len;
        if size > self.config.max_partial_len {
            self.line.clear();
            self.clear_partial();
            out.push(Err(FrameError::PartialTooLarge {
                size,
                max: self.config.max_partial_len,
            }));
        }
    }
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameReassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReassembler")
            .field("config", &self.config)
            .field("pending_len", &self.pending_len())
            .field("partial_fragments", &self.partial.len())
            .finish()
    }
}

fn parse(text: &str) -> Result<Value> {
    let fixed = fix_locale_floats(text);
    serde_json::from_str(&fixed).map_err(FrameError::from)
}

/// Incremental check that the text fed so far is exactly one
/// brace-balanced object. Braces inside string literals do not count.
#[derive(Debug, Clone, Copy, Default)]
struct ObjectScan {
    started: bool,
    depth: usize,
    in_string: bool,
    escaped: bool,
    closed: bool,
    broken: bool,
}

impl ObjectScan {
    fn feed(&mut self, text: &str) {
        for ch in text.chars() {
            if self.broken {
                return;
            }
            if self.closed {
                // anything after the final brace
                self.broken = true;
                return;
            }
            if !self.started {
                self.started = true;
                if ch != '{' {
                    self.broken = true;
                    return;
                }
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == '\\' {
                    self.escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match ch {
                '"' => self.in_string = true,
                '{' | '[' => self.depth += 1,
                '}' | ']' => {
                    if self.depth == 0 {
                        self.broken = true;
                        return;
                    }
                    self.depth -= 1;
                    if self.depth == 0 {
                        if ch == '}' {
                            self.closed = true;
                        } else {
                            self.broken = true;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn is_complete(&self) -> bool {
        self.closed && !self.broken
    }
}

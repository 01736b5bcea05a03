//! Purpose: Split a byte stream of concatenated top-level JSON values into raw spans.
//! Exports: `ObjectScanner`, `RawObject`, `ScanOptions`.
//! Role: First pipeline stage; feeds the decoder one object at a time.
//! Invariants: Only the current object is buffered; the rest of the file stays on disk.
//! Invariants: Depth tracking skips string contents, including escaped quotes.
//! Invariants: After end-of-input or an error the scanner is exhausted.
use std::io::{BufRead, BufReader, Read};

use bstr::ByteSlice;

use crate::core::error::{Error, ErrorKind};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const MAX_SNIPPET_BYTES: usize = 64;

#[derive(Copy, Clone, Debug, Default)]
pub struct ScanOptions {
    /// Objects longer than this many bytes are rejected as parse errors.
    pub max_object_bytes: Option<usize>,
}

/// One bracket-balanced top-level value exactly as it appears in the source.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawObject {
    /// 1-based position in the stream.
    pub index: u64,
    /// Byte offset of the opening bracket.
    pub offset: u64,
    pub bytes: Vec<u8>,
}

pub struct ObjectScanner<R: Read> {
    reader: BufReader<R>,
    options: ScanOptions,
    pos: u64,
    index: u64,
    done: bool,
}

impl<R: Read> ObjectScanner<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ScanOptions::default())
    }

    pub fn with_options(reader: R, options: ScanOptions) -> Self {
        Self {
            reader: BufReader::new(reader),
            options,
            pos: 0,
            index: 0,
            done: false,
        }
    }

    /// Bytes consumed from the underlying reader so far.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Returns the next object, `Ok(None)` at end of input, or a `Parse` error.
    pub fn next_object(&mut self) -> Result<Option<RawObject>, Error> {
        if self.done {
            return Ok(None);
        }
        let result = self.scan_next();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn scan_next(&mut self) -> Result<Option<RawObject>, Error> {
        if !self.skip_separators()? {
            return Ok(None);
        }

        let start = self.pos;
        let index = self.index + 1;
        let mut bytes = Vec::new();
        let mut stack: Vec<u8> = Vec::new();
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let base = self.pos;
            let buf = self.reader.fill_buf().map_err(|err| {
                Error::new(ErrorKind::FileAccess)
                    .with_message("failed to read fixture")
                    .with_offset(base)
                    .with_source(err)
            })?;
            if buf.is_empty() {
                return Err(parse_error("unexpected end of input inside object", start)
                    .with_index(index)
                    .with_hint(format!("object starts with: {}", snippet(&bytes))));
            }

            let mut complete = None;
            for (i, &byte) in buf.iter().enumerate() {
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if byte == b'\\' {
                        escaped = true;
                    } else if byte == b'"' {
                        in_string = false;
                    }
                    continue;
                }
                match byte {
                    b'"' => in_string = true,
                    b'{' | b'[' => stack.push(byte),
                    b'}' | b']' => {
                        let open = if byte == b'}' { b'{' } else { b'[' };
                        if stack.pop() != Some(open) {
                            let at = base + i as u64;
                            return Err(parse_error(
                                format!("unbalanced '{}'", byte as char),
                                at,
                            )
                            .with_index(index));
                        }
                        if stack.is_empty() {
                            complete = Some(i + 1);
                            break;
                        }
                    }
                    _ => {}
                }
            }

            let take = complete.unwrap_or(buf.len());
            bytes.extend_from_slice(&buf[..take]);
            self.reader.consume(take);
            self.pos += take as u64;

            if let Some(max) = self.options.max_object_bytes {
                if bytes.len() > max {
                    return Err(parse_error("object exceeds size limit", start)
                        .with_index(index)
                        .with_hint(format!("limit is {max} bytes")));
                }
            }
            if complete.is_some() {
                break;
            }
        }

        self.index = index;
        Ok(Some(RawObject {
            index,
            offset: start,
            bytes,
        }))
    }

    /// Skips whitespace (and a leading BOM) up to the next value. Returns false at
    /// end of input; errors if the next byte cannot open an object.
    fn skip_separators(&mut self) -> Result<bool, Error> {
        loop {
            let base = self.pos;
            let buf = self.reader.fill_buf().map_err(|err| {
                Error::new(ErrorKind::FileAccess)
                    .with_message("failed to read fixture")
                    .with_offset(base)
                    .with_source(err)
            })?;
            if buf.is_empty() {
                return Ok(false);
            }
            if base == 0 && buf.starts_with(UTF8_BOM) {
                self.reader.consume(UTF8_BOM.len());
                self.pos += UTF8_BOM.len() as u64;
                continue;
            }
            match buf.iter().position(|b| !is_json_whitespace(*b)) {
                Some(skip) => {
                    let next = buf[skip];
                    self.reader.consume(skip);
                    self.pos += skip as u64;
                    if next == b'{' || next == b'[' {
                        return Ok(true);
                    }
                    return Err(parse_error(
                        format!("expected '{{' but found {:?}", next as char),
                        self.pos,
                    )
                    .with_index(self.index + 1)
                    .with_hint("fixtures are whitespace-separated JSON objects without commas"));
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                    self.pos += len as u64;
                }
            }
        }
    }
}

fn is_json_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

fn parse_error(message: impl Into<String>, offset: u64) -> Error {
    Error::new(ErrorKind::Parse)
        .with_message(message)
        .with_offset(offset)
}

fn snippet(bytes: &[u8]) -> String {
    let text = bytes.to_str_lossy();
    if text.len() <= MAX_SNIPPET_BYTES {
        return text.into_owned();
    }
    let mut end = MAX_SNIPPET_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

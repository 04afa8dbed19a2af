//! Text decoding and line splitting for the text formats.
//!
//! Every text reader sees UTF-8: [`DecodingReader`] transcodes from the
//! table's declared encoding on the fly, replacing malformed sequences.
//! Line splitting follows an explicit [`NewlinePolicy`].

use crate::error::{Error, Result};
use encoding_rs::{CoderResult, Decoder, Encoding};
use std::io::{self, BufRead, Read};

const INPUT_CHUNK: usize = 8 * 1024;
const OUTPUT_CHUNK: usize = 16 * 1024;

/// How text is split into lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewlinePolicy {
    /// `\n`, `\r\n` and a bare `\r` all end a line
    Universal,
    /// Only `\n` ends a line; a bare `\r` stays inside the line
    LiteralLf,
}

impl NewlinePolicy {
    pub fn from_flag(universal_newlines: bool) -> Self {
        if universal_newlines {
            Self::Universal
        } else {
            Self::LiteralLf
        }
    }
}

/// Look up an encoding by its WHATWG label (`utf-8`, `latin1`, `utf-16le`, ...).
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    let label = if label.trim().is_empty() { "utf-8" } else { label };
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::Config(format!("Unknown encoding '{}'", label)))
}

/// `Read` adapter producing UTF-8 from bytes in any supported encoding.
/// A leading byte-order mark is honored and removed.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    input: Vec<u8>,
    in_start: usize,
    in_end: usize,
    output: Vec<u8>,
    out_start: usize,
    out_end: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder_with_bom_removal(),
            input: vec![0; INPUT_CHUNK],
            in_start: 0,
            in_end: 0,
            output: vec![0; OUTPUT_CHUNK],
            out_start: 0,
            out_end: 0,
            eof: false,
            finished: false,
        }
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.out_start < self.out_end {
                let n = buf.len().min(self.out_end - self.out_start);
                buf[..n].copy_from_slice(&self.output[self.out_start..self.out_start + n]);
                self.out_start += n;
                return Ok(n);
            }
            if self.finished || buf.is_empty() {
                return Ok(0);
            }

            if self.in_start == self.in_end && !self.eof {
                let n = self.inner.read(&mut self.input)?;
                self.in_start = 0;
                self.in_end = n;
                self.eof = n == 0;
            }

            let (result, read, written, _) = self.decoder.decode_to_utf8(
                &self.input[self.in_start..self.in_end],
                &mut self.output,
                self.eof,
            );
            self.in_start += read;
            self.out_start = 0;
            self.out_end = written;
            if self.eof && result == CoderResult::InputEmpty {
                self.finished = true;
            }
        }
    }
}

/// Iterator over the lines of a UTF-8 reader under a newline policy.
/// Terminators are not included in the yielded lines.
pub struct Lines<R> {
    reader: R,
    policy: NewlinePolicy,
    pending: std::collections::VecDeque<String>,
    done: bool,
}

impl<R: BufRead> Lines<R> {
    pub fn new(reader: R, policy: NewlinePolicy) -> Self {
        Self {
            reader,
            policy,
            pending: Default::default(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(line) = self.pending.pop_front() {
            return Some(Ok(line));
        }
        if self.done {
            return None;
        }

        let mut raw = Vec::new();
        match self.reader.read_until(b'\n', &mut raw) {
            Ok(0) => {
                self.done = true;
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        }
        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        let line = String::from_utf8_lossy(&raw).into_owned();

        match self.policy {
            NewlinePolicy::LiteralLf => Some(Ok(line)),
            NewlinePolicy::Universal => {
                let line = line.strip_suffix('\r').unwrap_or(&line);
                let mut parts = line.split('\r').map(str::to_string);
                let first = parts.next().unwrap_or_default();
                self.pending.extend(parts);
                Some(Ok(first))
            }
        }
    }
}

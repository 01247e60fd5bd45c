// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Line and header block scanning over a source.
//!
//! [`Scan`] is the single reading surface used by the format parsers. It has two
//! implementations, chosen once when a source is attached:
//!
//! ```text
//! Source::Stream ──────────────┐
//! Source::Window (gzip) ── WindowReader ──┴─ [gzip] ─ Buffered   (copying, forward-only)
//! Source::Window ─────────────────────────────────── Windowed   (zero-copy windows)
//! ```
//!
//! Everything above the trait (record framing, skipping unread payload, transport
//! header folding) is written once against `&mut dyn Scan`.

use std::io::{self, Read};
use std::ops::Range;

use crate::error::{Error, Result};
use crate::source::Slicer;

/// Literal prefix of an embedded HTTP header block.
pub(crate) const TRANSPORT_PREFIX: &[u8] = b"HTTP/";

/// Lines shorter than this terminate a header block (`"\r\n"` or `"\n"`).
const TERMINATOR_LEN: usize = 3;

pub(crate) trait Scan {
    /// Bytes consumed from the start of the (decompressed) source.
    fn position(&self) -> u64;

    /// Whether [`Scan::slice`] is supported.
    fn is_addressable(&self) -> bool;

    /// Up to `n` bytes at the current position without consuming them.
    /// Shorter only at end of stream.
    fn peek(&mut self, n: usize) -> io::Result<&[u8]>;

    /// Consume one line including its `'\n'`.
    ///
    /// At end of stream the result is the unterminated remainder, which is empty
    /// once the stream is exhausted.
    fn read_line(&mut self) -> io::Result<&[u8]>;

    /// Consume lines up to and including the first line shorter than three bytes.
    ///
    /// The consumed bytes become the current header block, or are appended to it if
    /// `extend` is set. Returns the number of bytes consumed by this call.
    fn read_block(&mut self, extend: bool) -> Result<usize>;

    /// The current header block.
    fn block(&self) -> io::Result<&[u8]>;

    fn clear_block(&mut self);

    /// Fill `buf` from the current position. Short only at end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discard up to `n` bytes. Returns the number of bytes discarded.
    fn skip(&mut self, n: u64) -> io::Result<u64>;

    /// Window at an absolute position, without consuming anything.
    fn slice(&self, offset: u64, len: usize) -> Result<&[u8]>;
}

/// Forward-only buffering over a [`Read`].
///
/// The line buffer and the header block scratch are owned here and reused when a
/// new source is attached. Both grow by doubling and never shrink.
pub(crate) struct Buffered<'a> {
    inner: Box<dyn Read + 'a>,
    buf: Vec<u8>,
    head: usize,
    tail: usize,
    eof: bool,
    pos: u64,
    block: Vec<u8>,
}

impl<'a> Buffered<'a> {
    pub(crate) fn new(capacity: usize) -> Self {
        Buffered {
            inner: Box::new(io::empty()),
            buf: vec![0; capacity.max(64)],
            head: 0,
            tail: 0,
            eof: false,
            pos: 0,
            block: Vec::new(),
        }
    }

    /// Attach a new reader, keeping the allocated buffers.
    pub(crate) fn reset(&mut self, inner: Box<dyn Read + 'a>) {
        self.inner = inner;
        self.head = 0;
        self.tail = 0;
        self.eof = false;
        self.pos = 0;
        self.block.clear();
    }

    /// Detach the current reader together with any bytes buffered but not yet consumed.
    pub(crate) fn detach(&mut self) -> (Vec<u8>, Box<dyn Read + 'a>) {
        let pending = self.buf[self.head..self.tail].to_vec();
        self.head = self.tail;
        let inner = std::mem::replace(&mut self.inner, Box::new(io::empty()));
        (pending, inner)
    }

    fn fill(&mut self) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        } else if self.tail == self.buf.len() {
            if self.head > 0 {
                self.buf.copy_within(self.head..self.tail, 0);
                self.tail -= self.head;
                self.head = 0;
            } else {
                let len = self.buf.len() * 2;
                self.buf.resize(len, 0);
            }
        }
        loop {
            match self.inner.read(&mut self.buf[self.tail..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.tail += n;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn consume(&mut self, n: usize) {
        self.head += n;
        self.pos += n as u64;
    }

    /// Span of the next line within `buf`, consumed.
    fn next_line(&mut self) -> io::Result<Range<usize>> {
        let mut scanned = 0;
        loop {
            let avail = &self.buf[self.head + scanned..self.tail];
            if let Some(nl) = avail.iter().position(|&b| b == b'\n') {
                let start = self.head;
                let end = self.head + scanned + nl + 1;
                self.consume(end - start);
                return Ok(start..end);
            }
            scanned = self.tail - self.head;
            if self.fill()? == 0 {
                let start = self.head;
                let end = self.tail;
                self.consume(end - start);
                return Ok(start..end);
            }
        }
    }
}

impl Scan for Buffered<'_> {
    fn position(&self) -> u64 {
        self.pos
    }

    fn is_addressable(&self) -> bool {
        false
    }

    fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        while self.tail - self.head < n {
            if self.fill()? == 0 {
                break;
            }
        }
        let end = self.tail.min(self.head + n);
        Ok(&self.buf[self.head..end])
    }

    fn read_line(&mut self) -> io::Result<&[u8]> {
        let span = self.next_line()?;
        Ok(&self.buf[span])
    }

    fn read_block(&mut self, extend: bool) -> Result<usize> {
        if !extend {
            self.block.clear();
        }
        let mut consumed = 0;
        loop {
            let span = self.next_line()?;
            let line = &self.buf[span];
            self.block.extend_from_slice(line);
            consumed += line.len();
            if !line.ends_with(b"\n") {
                return Err(Error::Truncated {
                    context: "end of stream inside header block",
                });
            }
            if line.len() < TERMINATOR_LEN {
                return Ok(consumed);
            }
        }
    }

    fn block(&self) -> io::Result<&[u8]> {
        Ok(&self.block)
    }

    fn clear_block(&mut self) {
        self.block.clear();
    }

    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < dst.len() {
            if self.head == self.tail && self.fill()? == 0 {
                break;
            }
            let k = (self.tail - self.head).min(dst.len() - n);
            dst[n..n + k].copy_from_slice(&self.buf[self.head..self.head + k]);
            self.consume(k);
            n += k;
        }
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> io::Result<u64> {
        let mut skipped = 0;
        while skipped < n {
            if self.head == self.tail && self.fill()? == 0 {
                break;
            }
            let avail = (self.tail - self.head) as u64;
            let k = avail.min(n - skipped) as usize;
            self.consume(k);
            skipped += k as u64;
        }
        Ok(skipped)
    }

    fn slice(&self, _offset: u64, _len: usize) -> Result<&[u8]> {
        Err(Error::NotSlicer)
    }
}

/// Zero-copy scanning over an addressable source.
///
/// Scans request successively wider windows until the wanted terminator shows up.
/// The header block is kept as a span of the source rather than a copy.
pub(crate) struct Windowed<'a> {
    src: Box<dyn Slicer + 'a>,
    pos: u64,
    block: Range<u64>,
    line_window: usize,
    block_window: usize,
}

impl<'a> Windowed<'a> {
    pub(crate) fn new(src: Box<dyn Slicer + 'a>, line_window: usize, block_window: usize) -> Self {
        Windowed {
            src,
            pos: 0,
            block: 0..0,
            line_window: line_window.max(16),
            block_window: block_window.max(16),
        }
    }
}

impl Scan for Windowed<'_> {
    fn position(&self) -> u64 {
        self.pos
    }

    fn is_addressable(&self) -> bool {
        true
    }

    fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        self.src.slice(self.pos, n)
    }

    fn read_line(&mut self) -> io::Result<&[u8]> {
        let mut want = self.line_window;
        loop {
            let (found, avail) = {
                let window = self.src.slice(self.pos, want)?;
                (window.iter().position(|&b| b == b'\n'), window.len())
            };
            let len = match found {
                Some(nl) => nl + 1,
                None if avail < want => avail,
                None => {
                    want = want.saturating_mul(2);
                    continue;
                }
            };
            let start = self.pos;
            self.pos += len as u64;
            return self.src.slice(start, len);
        }
    }

    fn read_block(&mut self, extend: bool) -> Result<usize> {
        if !extend || self.block.is_empty() {
            self.block = self.pos..self.pos;
        }
        let start = self.pos;
        let mut want = self.block_window;
        loop {
            let window = self.src.slice(self.pos, want)?;
            let mut complete = 0;
            while let Some(nl) = window[complete..].iter().position(|&b| b == b'\n') {
                let line_len = nl + 1;
                complete += line_len;
                if line_len < TERMINATOR_LEN {
                    self.pos += complete as u64;
                    self.block.end = self.pos;
                    return Ok((self.pos - start) as usize);
                }
            }
            if window.len() < want {
                self.pos += window.len() as u64;
                self.block.end = self.pos;
                return Err(Error::Truncated {
                    context: "end of stream inside header block",
                });
            }
            // Keep the complete lines, rescan from the partial one with a wider window.
            self.pos += complete as u64;
            want = want.saturating_mul(2);
        }
    }

    fn block(&self) -> io::Result<&[u8]> {
        self.src.slice(self.block.start, (self.block.end - self.block.start) as usize)
    }

    fn clear_block(&mut self) {
        self.block = self.pos..self.pos;
    }

    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let chunk = self.src.slice(self.pos, dst.len())?;
        let n = chunk.len();
        dst[..n].copy_from_slice(chunk);
        self.pos += n as u64;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> io::Result<u64> {
        let want = usize::try_from(n).unwrap_or(usize::MAX);
        let skipped = self.src.slice(self.pos, want)?.len() as u64;
        self.pos += skipped;
        Ok(skipped)
    }

    fn slice(&self, offset: u64, len: usize) -> Result<&[u8]> {
        Ok(self.src.slice(offset, len)?)
    }
}

/// Cursor state of the current record.
///
/// `start` is the absolute position of the first payload byte, `size` the number of
/// payload bytes and `read` how many of them have been consumed. `read <= size`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub start: u64,
    pub size: u64,
    pub read: u64,
}

impl Bounds {
    pub(crate) fn new(start: u64, size: u64) -> Self {
        Bounds {
            start,
            size,
            read: 0,
        }
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.size - self.read
    }

    /// Clamp a window `[offset, offset + len)` relative to the payload start.
    /// `None` if `offset` lies at or past the end.
    pub(crate) fn window(&self, offset: u64, len: usize) -> Option<(u64, usize)> {
        window(self.size, offset, len)
    }

    /// Clamp a window ending `offset` bytes before the end of the payload.
    pub(crate) fn window_from_end(&self, offset: u64, len: usize) -> Option<(u64, usize)> {
        window_from_end(self.size, offset, len)
    }
}

pub(crate) fn window(size: u64, offset: u64, len: usize) -> Option<(u64, usize)> {
    if offset >= size {
        return None;
    }
    let avail = size - offset;
    Some((offset, (len as u64).min(avail) as usize))
}

pub(crate) fn window_from_end(size: u64, offset: u64, len: usize) -> Option<(u64, usize)> {
    if offset >= size {
        return None;
    }
    let avail = size - offset;
    if len as u64 > avail {
        Some((0, avail as usize))
    } else {
        Some((avail - len as u64, len))
    }
}

/// Skip any unread payload of the current record.
pub(crate) fn skip_remainder(scan: &mut dyn Scan, bounds: &mut Bounds) -> Result<()> {
    let remaining = bounds.remaining();
    if remaining > 0 {
        let skipped = scan.skip(remaining)?;
        bounds.read += skipped;
        if skipped < remaining {
            return Err(Error::Truncated {
                context: "end of stream inside record payload",
            });
        }
    }
    Ok(())
}

/// Skip blank lines and copy the first non-blank line into `out`.
///
/// Returns the position the line started at, or `None` at a clean end of stream.
pub(crate) fn next_non_blank_line(scan: &mut dyn Scan, out: &mut Vec<u8>) -> Result<Option<u64>> {
    loop {
        let start = scan.position();
        let line = scan.read_line()?;
        if line.is_empty() {
            return Ok(None);
        }
        let terminated = line.ends_with(b"\n");
        if line.trim_ascii().is_empty() {
            if terminated {
                continue;
            }
            return Ok(None);
        }
        if !terminated {
            return Err(Error::Truncated {
                context: "end of stream inside record header line",
            });
        }
        out.clear();
        out.extend_from_slice(line);
        return Ok(Some(start));
    }
}

/// Transport headers larger than this are left in the payload.
pub(crate) const MAX_TRANSPORT_HEADER: usize = 1 << 20;

/// Length of the header block at the start of `data`, blank terminator line included.
///
/// Only complete lines count, so `None` if `data` ends before the terminator.
pub(crate) fn block_len(data: &[u8]) -> Option<usize> {
    let mut pos = 0;
    while let Some(nl) = data[pos..].iter().position(|&b| b == b'\n') {
        let end = pos + nl + 1;
        if end - pos < TERMINATOR_LEN {
            return Some(end);
        }
        pos = end;
    }
    None
}

/// Length of an HTTP header block at the start of `body`, terminator included.
pub(crate) fn transport_len(body: &[u8]) -> Option<usize> {
    if !body.starts_with(TRANSPORT_PREFIX) {
        return None;
    }
    block_len(body)
}

/// Look for a transport header ending within the first `limit` bytes ahead.
fn peek_transport_len(scan: &mut dyn Scan, limit: usize) -> io::Result<Option<usize>> {
    let mut want = limit.min(1024);
    loop {
        let window = scan.peek(want)?;
        if let Some(n) = transport_len(window) {
            return Ok(Some(n));
        }
        if window.len() < want || want >= limit {
            return Ok(None);
        }
        want = want.saturating_mul(2).min(limit);
    }
}

/// Fold an HTTP header block at the start of the payload into the header block.
///
/// Consumes the transport header up to and including its blank terminator line and
/// moves the payload start past it. Does nothing unless the payload is unread, starts
/// with `HTTP/` and the terminator lies within the payload.
pub(crate) fn fold_transport(scan: &mut dyn Scan, bounds: &mut Bounds) -> Result<bool> {
    if bounds.read != 0 || bounds.size < TRANSPORT_PREFIX.len() as u64 {
        return Ok(false);
    }
    let limit = usize::try_from(bounds.size).unwrap_or(usize::MAX).min(MAX_TRANSPORT_HEADER);
    let Some(len) = peek_transport_len(scan, limit)? else {
        return Ok(false);
    };
    let consumed = scan.read_block(true)?;
    if consumed != len {
        return Err(Error::header("HTTP", "header block does not match the scanned length"));
    }
    *bounds = Bounds::new(bounds.start + len as u64, bounds.size - len as u64);
    Ok(true)
}

/// Append the unread payload of the current record to `out`.
pub(crate) fn read_remaining(scan: &mut dyn Scan, bounds: &mut Bounds, out: &mut Vec<u8>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    while bounds.remaining() > 0 {
        let want = bounds.remaining().min(chunk.len() as u64) as usize;
        let n = scan.read(&mut chunk[..want])?;
        if n == 0 {
            return Err(Error::Truncated {
                context: "end of stream inside record payload",
            });
        }
        out.extend_from_slice(&chunk[..n]);
        bounds.read += n as u64;
    }
    Ok(())
}

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

//! Record headers and bounded record views.

use std::io::{self, Read};

use chrono::{DateTime, Utc};

use crate::arc::{UrlV1, UrlV2};
use crate::continuation::Merged;
use crate::error::{Error, Result};
use crate::header::{Fields, HeaderEncoding, HeaderMap};
use crate::scan::{window, window_from_end, Bounds, Scan};
use crate::warc::{WarcHeader, WarcRecordType};

/// Parsed identity of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    Warc(WarcHeader),
    UrlV1(UrlV1),
    UrlV2(UrlV2),
    /// Record assembled from WARC segments, carrying the identity of the first
    /// segment that was read.
    Continuation(WarcHeader),
}

impl Header {
    fn arc_base(&self) -> Option<&UrlV1> {
        match self {
            Header::UrlV1(h) => Some(h),
            Header::UrlV2(h) => Some(h.base()),
            _ => None,
        }
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        match self {
            Header::Warc(h) | Header::Continuation(h) => h.url(),
            _ => self.arc_base().map_or("", UrlV1::url),
        }
    }

    /// Capture date.
    pub fn date(&self) -> DateTime<Utc> {
        match self {
            Header::Warc(h) | Header::Continuation(h) => h.date(),
            Header::UrlV1(h) => h.date(),
            Header::UrlV2(h) => h.base().date(),
        }
    }

    /// Payload size as declared by the header.
    pub fn declared_size(&self) -> u64 {
        match self {
            Header::Warc(h) | Header::Continuation(h) => h.content_length(),
            Header::UrlV1(h) => h.size(),
            Header::UrlV2(h) => h.base().size(),
        }
    }

    /// WARC record type, `None` for ARC records.
    pub fn record_type(&self) -> Option<WarcRecordType> {
        match self {
            Header::Warc(h) | Header::Continuation(h) => Some(h.record_type()),
            _ => None,
        }
    }

    /// WARC record ID, `None` for ARC records.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            Header::Warc(h) | Header::Continuation(h) => Some(h.record_id()),
            _ => None,
        }
    }
}

enum Content<'r> {
    Stream {
        scan: &'r mut dyn Scan,
        bounds: &'r mut Bounds,
    },
    Memory {
        merged: &'r Merged,
        pos: usize,
    },
}

/// View of the current record, valid until the reader advances.
///
/// Reads are bounded by the record's payload: once [`Record::remaining`] is zero,
/// `read()` returns 0 regardless of what follows in the container.
pub struct Record<'r> {
    header: &'r Header,
    offset: u64,
    content: Content<'r>,
}

impl<'r> Record<'r> {
    pub(crate) fn stream(header: &'r Header, offset: u64, scan: &'r mut dyn Scan, bounds: &'r mut Bounds) -> Self {
        Record {
            header,
            offset,
            content: Content::Stream { scan, bounds },
        }
    }

    pub(crate) fn memory(merged: &'r Merged, offset: u64) -> Self {
        Record {
            header: &merged.header,
            offset,
            content: Content::Memory { merged, pos: 0 },
        }
    }

    pub fn header(&self) -> &Header {
        self.header
    }

    pub fn url(&self) -> &str {
        self.header.url()
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.header.date()
    }

    /// Size of the payload in bytes.
    ///
    /// Smaller than the declared size once a transport header has been folded into
    /// the record's fields, and the total body size for merged continuation records.
    pub fn size(&self) -> u64 {
        match &self.content {
            Content::Stream { bounds, .. } => bounds.size,
            Content::Memory { merged, .. } => merged.len() as u64,
        }
    }

    /// Payload bytes not consumed yet.
    pub fn remaining(&self) -> u64 {
        match &self.content {
            Content::Stream { bounds, .. } => bounds.remaining(),
            Content::Memory { merged, pos } => (merged.len() - pos) as u64,
        }
    }

    pub fn record_type(&self) -> Option<WarcRecordType> {
        self.header.record_type()
    }

    pub fn record_id(&self) -> Option<&str> {
        self.header.record_id()
    }

    /// Offset of the first line of the record within the (decompressed) container.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether [`slice`](Self::slice) and [`eof_slice`](Self::eof_slice) are supported.
    pub fn is_addressable(&self) -> bool {
        match &self.content {
            Content::Stream { scan, .. } => scan.is_addressable(),
            Content::Memory { .. } => true,
        }
    }

    /// Header fields as an ordered header map.
    ///
    /// For WARC records these are the WARC fields, followed by the transport header
    /// fields if one was folded in. For ARC records only a folded transport header
    /// contributes. Its status line is available through [`HeaderMap::status_line`].
    pub fn headers(&self) -> Result<HeaderMap> {
        let block = match &self.content {
            Content::Stream { scan, .. } => scan.block()?,
            Content::Memory { merged, .. } => merged.header_block(),
        };
        Ok(HeaderMap::parse(block, HeaderEncoding::Unicode))
    }

    /// Header fields as key to ordered values mapping.
    pub fn fields(&self) -> Result<Fields> {
        let mut fields = match self.header {
            Header::UrlV1(h) => h.fields(),
            Header::UrlV2(h) => h.fields(),
            _ => Fields::new(),
        };
        self.headers()?.extend_fields(&mut fields);
        Ok(fields)
    }

    /// Zero-copy slice of `len` payload bytes starting at `offset`.
    ///
    /// The slice is clamped to the end of the payload and empty if `offset` is past
    /// it. Does not move the read cursor.
    pub fn slice(&self, offset: u64, len: usize) -> Result<&[u8]> {
        match &self.content {
            Content::Stream { scan, bounds } => {
                if !scan.is_addressable() {
                    return Err(Error::NotSlicer);
                }
                match bounds.window(offset, len) {
                    Some((o, l)) => scan.slice(bounds.start + o, l),
                    None => Ok(&[]),
                }
            }
            Content::Memory { merged, .. } => Ok(memory_slice(merged.body(), window(merged.len() as u64, offset, len))),
        }
    }

    /// Zero-copy slice of up to `len` payload bytes ending `offset` bytes before the
    /// end of the payload.
    pub fn eof_slice(&self, offset: u64, len: usize) -> Result<&[u8]> {
        match &self.content {
            Content::Stream { scan, bounds } => {
                if !scan.is_addressable() {
                    return Err(Error::NotSlicer);
                }
                match bounds.window_from_end(offset, len) {
                    Some((o, l)) => scan.slice(bounds.start + o, l),
                    None => Ok(&[]),
                }
            }
            Content::Memory { merged, .. } => Ok(memory_slice(
                merged.body(),
                window_from_end(merged.len() as u64, offset, len),
            )),
        }
    }
}

fn memory_slice(body: &[u8], window: Option<(u64, usize)>) -> &[u8] {
    match window {
        Some((o, l)) => &body[o as usize..o as usize + l],
        None => &[],
    }
}

impl Read for Record<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.content {
            Content::Stream { scan, bounds } => {
                let want = (buf.len() as u64).min(bounds.remaining()) as usize;
                if want == 0 {
                    return Ok(0);
                }
                let n = scan.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "end of stream inside record payload",
                    ));
                }
                bounds.read += n as u64;
                Ok(n)
            }
            Content::Memory { merged, pos } => {
                let body = &merged.body()[*pos..];
                let n = body.len().min(buf.len());
                buf[..n].copy_from_slice(&body[..n]);
                *pos += n;
                Ok(n)
            }
        }
    }
}

impl std::fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("header", self.header)
            .field("offset", &self.offset)
            .field("size", &self.size())
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicateSegments;
    use crate::continuation::Continuations;
    use crate::scan::{Buffered, Windowed};

    const BLOCK: &[u8] = b"WARC-Type: resource\r\n\
        WARC-Target-URI: http://example.com/\r\n\
        WARC-Date: 2020-01-01T00:00:00Z\r\n\
        WARC-Record-ID: <urn:uuid:1>\r\n\
        Content-Length: 10\r\n\r\n";

    fn header() -> Header {
        Header::Warc(WarcHeader::parse(BLOCK).unwrap())
    }

    #[test]
    fn test_stream_record() {
        let header = header();
        let mut scan = Buffered::new(16);
        scan.reset(Box::new(&b"0123456789trailing"[..]));
        let mut bounds = Bounds::new(0, 10);
        let mut record = Record::stream(&header, 0, &mut scan, &mut bounds);
        assert_eq!(record.url(), "http://example.com/");
        assert_eq!(record.record_type(), Some(WarcRecordType::Resource));
        assert_eq!(record.record_id(), Some("<urn:uuid:1>"));
        assert!(!record.is_addressable());
        assert!(matches!(record.slice(0, 1), Err(Error::NotSlicer)));
        assert!(matches!(record.eof_slice(0, 1), Err(Error::NotSlicer)));

        let mut buf = [0u8; 4];
        assert_eq!(record.read(&mut buf).unwrap(), 4);
        assert_eq!(record.remaining(), 6);
        let mut rest = Vec::new();
        record.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"456789");
        assert_eq!(record.read(&mut buf).unwrap(), 0);
        assert_eq!(bounds.read, 10);
    }

    #[test]
    fn test_stream_record_truncated() {
        let header = header();
        let mut scan = Buffered::new(16);
        scan.reset(Box::new(&b"01234"[..]));
        let mut bounds = Bounds::new(0, 10);
        let mut record = Record::stream(&header, 0, &mut scan, &mut bounds);
        let mut out = Vec::new();
        let err = record.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(out, b"01234");
    }

    #[test]
    fn test_window_slices() {
        let header = header();
        let mut scan = Windowed::new(Box::new(b"xx0123456789yy".to_vec()), 16, 16);
        let mut bounds = Bounds::new(2, 10);
        let record = Record::stream(&header, 0, &mut scan, &mut bounds);
        assert!(record.is_addressable());
        assert_eq!(record.slice(0, 4).unwrap(), b"0123");
        assert_eq!(record.slice(8, 100).unwrap(), b"89");
        assert_eq!(record.slice(10, 1).unwrap(), b"");
        assert_eq!(record.eof_slice(0, 3).unwrap(), b"789");
        assert_eq!(record.eof_slice(2, 3).unwrap(), b"567");
        assert_eq!(record.eof_slice(5, 100).unwrap(), b"01234");
        assert_eq!(record.eof_slice(10, 1).unwrap(), b"");
        assert_eq!(record.remaining(), 10);
    }

    #[test]
    fn test_fields() {
        let header = header();
        let mut scan = Buffered::new(64);
        scan.reset(Box::new(BLOCK));
        scan.read_block(false).unwrap();
        let mut bounds = Bounds::new(BLOCK.len() as u64, 0);
        let record = Record::stream(&header, 0, &mut scan, &mut bounds);
        let fields = record.fields().unwrap();
        assert_eq!(fields["Content-Length"], vec!["10".to_string()]);
        assert_eq!(fields["WARC-Record-ID"], vec!["<urn:uuid:1>".to_string()]);
        assert_eq!(record.headers().unwrap().get("warc-type").as_deref(), Some("resource"));
    }

    #[test]
    fn test_memory_record() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        let block = b"WARC-Type: response\r\nWARC-Date: 2020-01-01T00:00:00Z\r\nWARC-Record-ID: <urn:uuid:m>\r\nContent-Length: 27\r\nWARC-Segment-Number: 1\r\nWARC-Segment-Total-Length: 27\r\n\r\n";
        let h = WarcHeader::parse(block).unwrap();
        let merged = c
            .submit(&h, block, b"HTTP/1.1 404 Nope\r\n\r\nbody!!".to_vec())
            .unwrap()
            .unwrap();
        let mut record = Record::memory(&merged, 42);
        assert_eq!(record.offset(), 42);
        assert_eq!(record.size(), 6);
        assert!(record.is_addressable());
        assert_eq!(record.slice(1, 3).unwrap(), b"ody");
        assert_eq!(record.eof_slice(0, 2).unwrap(), b"!!");
        let headers = record.headers().unwrap();
        assert_eq!(headers.status_code(), Some(404));
        assert_eq!(headers.get("WARC-Record-ID").as_deref(), Some("<urn:uuid:m>"));
        let mut body = String::new();
        record.read_to_string(&mut body).unwrap();
        assert_eq!(body, "body!!");
        assert_eq!(record.remaining(), 0);
    }
}

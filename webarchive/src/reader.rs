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

//! Sequential record reader.

use std::fmt;
use std::io::{self, Cursor, Read};

use flate2::read::MultiGzDecoder;
use tracing::{debug, trace};

use crate::arc::{self, ArcInfo, ARC_MAGIC};
use crate::config::ReaderConfig;
use crate::continuation::{Continuations, Merged};
use crate::error::{Error, Result};
use crate::record::{Header, Record};
use crate::scan::{fold_transport, next_non_blank_line, read_remaining, skip_remainder, Bounds, Buffered, Scan, Windowed};
use crate::source::{Compression, Source, WindowReader, GZIP_MAGIC};
use crate::warc::{WarcHeader, WarcRecordType, WARC_MAGIC};

/// Container format detected when a source is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Warc,
    Arc,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Warc => f.write_str("WARC"),
            Format::Arc => f.write_str("ARC"),
        }
    }
}

/// Attached source and the scanner reading it.
///
/// Uncompressed addressable sources are scanned in place. Everything else goes
/// through the streaming buffer, which is kept across resets.
struct Input<'a> {
    buffered: Buffered<'a>,
    windowed: Option<Windowed<'a>>,
    compression: Compression,
    line_window: usize,
    block_window: usize,
}

impl<'a> Input<'a> {
    fn new(config: &ReaderConfig) -> Self {
        Input {
            buffered: Buffered::new(config.buffer_capacity),
            windowed: None,
            compression: Compression::None,
            line_window: config.line_window,
            block_window: config.block_window,
        }
    }

    fn attach(&mut self, source: Source<'a>) -> Result<()> {
        self.windowed = None;
        match source {
            Source::Stream(reader) => {
                self.buffered.reset(reader);
                self.compression = Compression::detect(self.buffered.peek(GZIP_MAGIC.len())?);
                if self.compression.is_compressed() {
                    let (pending, inner) = self.buffered.detach();
                    let decoder = MultiGzDecoder::new(Cursor::new(pending).chain(inner));
                    self.buffered.reset(Box::new(decoder));
                }
            }
            Source::Window(slicer) => {
                self.compression = Compression::detect(slicer.slice(0, GZIP_MAGIC.len())?);
                if self.compression.is_compressed() {
                    let decoder = MultiGzDecoder::new(WindowReader::new(slicer));
                    self.buffered.reset(Box::new(decoder));
                } else {
                    self.buffered.reset(Box::new(io::empty()));
                    self.windowed = Some(Windowed::new(slicer, self.line_window, self.block_window));
                }
            }
        }
        Ok(())
    }

    fn scan(&mut self) -> &mut dyn Scan {
        match &mut self.windowed {
            Some(windowed) => windowed as &mut dyn Scan,
            None => &mut self.buffered as &mut dyn Scan,
        }
    }

    /// Drop the source, including any decompressor wrapping it.
    fn release(&mut self) {
        self.windowed = None;
        self.buffered.reset(Box::new(io::empty()));
        self.compression = Compression::None;
    }
}

/// Sequential reader over a WARC or ARC container.
///
/// The format and compression are detected when a source is attached. Records are
/// returned as views borrowing the reader, so at most one record is alive at a time;
/// advancing skips whatever the caller left unread.
///
/// # Example
///
/// ```no_run
/// use std::io::Read;
/// use webarchive::{Reader, Source};
///
/// let mut reader = Reader::open(Source::mmap("crawl.warc.gz")?)?;
/// while let Some(mut record) = reader.next_payload()? {
///     let mut body = Vec::new();
///     record.read_to_end(&mut body)?;
///     println!("{} {} bytes", record.url(), body.len());
/// }
/// # Ok::<(), webarchive::Error>(())
/// ```
pub struct Reader<'a> {
    config: ReaderConfig,
    input: Input<'a>,
    format: Format,
    arc: Option<ArcInfo>,
    header: Option<Header>,
    offset: u64,
    bounds: Bounds,
    line: Vec<u8>,
    continuations: Continuations,
    merged: Option<Merged>,
}

impl<'a> Reader<'a> {
    /// Open a reader with the default configuration.
    pub fn open(source: Source<'a>) -> Result<Self> {
        Self::with_config(source, ReaderConfig::default())
    }

    /// Open a reader.
    ///
    /// Fails with [`Error::NotWebArchive`] if the source is neither WARC nor ARC, and
    /// with [`Error::VersionBlock`] if it looks like ARC but the version block does
    /// not parse.
    pub fn with_config(source: Source<'a>, config: ReaderConfig) -> Result<Self> {
        let mut reader = Reader {
            input: Input::new(&config),
            continuations: Continuations::new(config.max_pending_continuations, config.duplicate_segments),
            config,
            format: Format::Warc,
            arc: None,
            header: None,
            offset: 0,
            bounds: Bounds::default(),
            line: Vec::new(),
            merged: None,
        };
        reader.attach(source)?;
        Ok(reader)
    }

    /// Attach a new source, reusing the reader's buffers.
    ///
    /// Incomplete continuation groups of the previous source are discarded.
    pub fn reset(&mut self, source: Source<'a>) -> Result<()> {
        self.attach(source)
    }

    fn attach(&mut self, source: Source<'a>) -> Result<()> {
        self.clear_state();
        self.input.attach(source)?;

        let scan = self.input.scan();
        let format = if scan.peek(WARC_MAGIC.len())? == WARC_MAGIC {
            Format::Warc
        } else {
            let looks_arc = scan.peek(ARC_MAGIC.len())? == ARC_MAGIC;
            match arc::read_version_block(scan) {
                Ok(info) => {
                    self.arc = Some(info);
                    Format::Arc
                }
                Err(e) if looks_arc => return Err(e),
                Err(e) => {
                    trace!(error = %e, "source is neither WARC nor ARC");
                    return Err(Error::NotWebArchive);
                }
            }
        };
        self.format = format;
        debug!(
            format = %self.format,
            compression = %self.input.compression,
            zero_copy = self.input.windowed.is_some(),
            "attached source"
        );
        Ok(())
    }

    fn clear_state(&mut self) {
        self.arc = None;
        self.header = None;
        self.offset = 0;
        self.bounds = Bounds::default();
        self.merged = None;
        self.continuations.clear();
    }

    /// Release the source. Further calls to `next()` return `Ok(None)`.
    ///
    /// Safe to call any number of times.
    pub fn close(&mut self) {
        self.clear_state();
        self.input.release();
    }

    /// Container format of the attached source.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Archive metadata from the version block, ARC only.
    pub fn arc_info(&self) -> Option<&ArcInfo> {
        self.arc.as_ref()
    }

    /// Compression detected on the attached source.
    pub fn compression(&self) -> Compression {
        self.input.compression
    }

    /// Whether records are read in place from an addressable source.
    pub fn is_zero_copy(&self) -> bool {
        self.input.windowed.is_some()
    }

    /// Number of continuation groups still waiting for segments.
    pub fn pending_continuations(&self) -> usize {
        self.continuations.len()
    }

    /// Configuration the reader was opened with.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Move to the next record header. Returns `false` at the end of the container.
    fn advance(&mut self) -> Result<bool> {
        self.merged = None;
        self.header = None;
        let scan = self.input.scan();
        skip_remainder(scan, &mut self.bounds)?;
        self.bounds = Bounds::default();
        scan.clear_block();

        let Some(offset) = next_non_blank_line(scan, &mut self.line)? else {
            return Ok(false);
        };
        let header = match self.format {
            Format::Warc => {
                scan.read_block(false)?;
                Header::Warc(WarcHeader::parse(scan.block()?)?)
            }
            Format::Arc => {
                let version = self.arc.as_ref().map_or(1, |info| info.version);
                arc::parse_url_record(&self.line, version)?
            }
        };
        self.bounds = Bounds::new(scan.position(), header.declared_size());
        self.offset = offset;
        trace!(offset, size = self.bounds.size, url = header.url(), "record header");
        self.header = Some(header);
        Ok(true)
    }

    fn current(&mut self) -> Option<Record<'_>> {
        let header = self.header.as_ref()?;
        Some(Record::stream(header, self.offset, self.input.scan(), &mut self.bounds))
    }

    /// Next record of any type.
    ///
    /// Returns `Ok(None)` at the end of the container.
    pub fn next(&mut self) -> Result<Option<Record<'_>>> {
        if !self.advance()? {
            return Ok(None);
        }
        Ok(self.current())
    }

    /// Next payload record.
    ///
    /// Segmented WARC records are collected until their group is complete and then
    /// returned as one record. Other WARC records are skipped unless their type is in
    /// [`ReaderConfig::payload_types`]. A transport header at the start of a `response`
    /// or ARC payload is folded into the record's fields.
    pub fn next_payload(&mut self) -> Result<Option<Record<'_>>> {
        loop {
            if !self.advance()? {
                return Ok(None);
            }
            let (segment, record_type) = match &self.header {
                Some(Header::Warc(h)) => (h.segment_number(), h.record_type()),
                _ => (0, WarcRecordType::Unknown),
            };
            if self.format == Format::Arc {
                fold_transport(self.input.scan(), &mut self.bounds)?;
                break;
            }
            if segment > 0 {
                if self.submit_segment()? {
                    return Ok(self.merged.as_ref().map(|m| Record::memory(m, self.offset)));
                }
                continue;
            }
            if !record_type.matches_bitmask(self.config.payload_types) {
                trace!(offset = self.offset, record_type = record_type.as_str(), "skipping record");
                continue;
            }
            if record_type == WarcRecordType::Response {
                fold_transport(self.input.scan(), &mut self.bounds)?;
            }
            break;
        }
        Ok(self.current())
    }

    /// Read the current segment and hand it to the continuation table.
    ///
    /// Returns `true` once a merged record is available.
    fn submit_segment(&mut self) -> Result<bool> {
        let Some(Header::Warc(header)) = &self.header else {
            return Ok(false);
        };
        let scan = self.input.scan();
        let mut payload = Vec::with_capacity(self.bounds.remaining().min(1 << 20) as usize);
        read_remaining(scan, &mut self.bounds, &mut payload)?;
        trace!(
            segment = header.segment_number(),
            bytes = payload.len(),
            "read continuation segment"
        );
        let merged = self.continuations.submit(header, scan.block()?, payload)?;
        self.merged = merged;
        Ok(self.merged.is_some())
    }
}

impl fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("format", &self.format)
            .field("compression", &self.input.compression)
            .field("zero_copy", &self.is_zero_copy())
            .field("offset", &self.offset)
            .field("pending_continuations", &self.continuations.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WARC: &[u8] = b"WARC/1.0\r\n\
        WARC-Type: warcinfo\r\n\
        WARC-Date: 2020-01-01T00:00:00Z\r\n\
        WARC-Record-ID: <urn:uuid:info>\r\n\
        Content-Length: 10\r\n\
        \r\n\
        0123456789\r\n\r\n\
        WARC/1.0\r\n\
        WARC-Type: response\r\n\
        WARC-Target-URI: http://example.com/\r\n\
        WARC-Date: 2020-01-01T00:00:01Z\r\n\
        WARC-Record-ID: <urn:uuid:resp>\r\n\
        Content-Length: 50\r\n\
        \r\n\
        HTTP/1.1 200 OK\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        hello\r\n\r\n";

    fn sources() -> Vec<Source<'static>> {
        vec![Source::stream(WARC), Source::window(WARC)]
    }

    #[test]
    fn test_next_reads_all_records() {
        for source in sources() {
            let mut reader = Reader::open(source).unwrap();
            assert_eq!(reader.format(), Format::Warc);
            assert!(reader.arc_info().is_none());

            let mut record = reader.next().unwrap().unwrap();
            assert_eq!(record.offset(), 0);
            assert_eq!(record.record_type(), Some(WarcRecordType::WarcInfo));
            let mut body = Vec::new();
            record.read_to_end(&mut body).unwrap();
            assert_eq!(body, b"0123456789");

            let record = reader.next().unwrap().unwrap();
            assert_eq!(record.url(), "http://example.com/");
            assert_eq!(record.size(), 50);
            // body left unread
            assert!(reader.next().unwrap().is_none());
            assert!(reader.next().unwrap().is_none());
        }
    }

    #[test]
    fn test_next_payload_folds_transport_header() {
        for source in sources() {
            let mut reader = Reader::open(source).unwrap();
            let mut record = reader.next_payload().unwrap().unwrap();
            assert_eq!(record.record_type(), Some(WarcRecordType::Response));
            assert_eq!(record.size(), 5);
            let headers = record.headers().unwrap();
            assert_eq!(headers.status_code(), Some(200));
            assert_eq!(headers.get("content-type").as_deref(), Some("text/plain"));
            assert_eq!(headers.get("WARC-Record-ID").as_deref(), Some("<urn:uuid:resp>"));
            let mut body = String::new();
            record.read_to_string(&mut body).unwrap();
            assert_eq!(body, "hello");
            assert!(reader.next_payload().unwrap().is_none());
        }
    }

    #[test]
    fn test_payload_type_filter() {
        let config = ReaderConfig::default().with_payload_types(&[WarcRecordType::WarcInfo]);
        let mut reader = Reader::with_config(Source::stream(WARC), config).unwrap();
        let record = reader.next_payload().unwrap().unwrap();
        assert_eq!(record.record_type(), Some(WarcRecordType::WarcInfo));
        assert_eq!(record.size(), 10);
        assert!(reader.next_payload().unwrap().is_none());
    }

    #[test]
    fn test_not_web_archive() {
        assert!(matches!(Reader::open(Source::stream(&b""[..])), Err(Error::NotWebArchive)));
        assert!(matches!(
            Reader::open(Source::window(&b"<html></html>\n"[..])),
            Err(Error::NotWebArchive)
        ));
        assert!(matches!(
            Reader::open(Source::stream(&b"filedesc://x.arc\n1 0 IA\n"[..])),
            Err(Error::VersionBlock { .. })
        ));
    }

    #[test]
    fn test_truncated_header_block() {
        let data: &[u8] = b"WARC/1.0\r\nWARC-Type: resource\r\nContent-Le";
        for source in [Source::stream(data), Source::window(data)] {
            let mut reader = Reader::open(source).unwrap();
            let err = reader.next().unwrap_err();
            assert!(err.is_truncation(), "{err}");
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut reader = Reader::open(Source::stream(WARC)).unwrap();
        assert!(reader.next().unwrap().is_some());
        reader.close();
        reader.close();
        assert!(reader.next().unwrap().is_none());
        assert_eq!(reader.compression(), Compression::None);
        assert!(!reader.is_zero_copy());
    }

    #[test]
    fn test_reset_reuses_reader() {
        let mut reader = Reader::open(Source::stream(WARC)).unwrap();
        assert!(reader.next().unwrap().is_some());
        reader.reset(Source::window(WARC)).unwrap();
        assert!(reader.is_zero_copy());
        let record = reader.next().unwrap().unwrap();
        assert_eq!(record.offset(), 0);
        assert_eq!(record.slice(0, 4).unwrap(), b"0123");
    }
}

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

//! Sequential readers for ARC and WARC web archive containers.
//!
//! A [`Reader`] is opened on a [`Source`], either a plain [`std::io::Read`] stream or
//! an addressable [`Slicer`] (a byte slice or a memory-mapped file). Gzip compression,
//! including one gzip member per record, is detected and unwrapped transparently.
//! Uncompressed addressable sources are scanned in place and support zero-copy
//! [`Record::slice`] and [`Record::eof_slice`].
//!
//! [`Reader::next`] returns every record. [`Reader::next_payload`] returns only
//! payload records: segmented WARC records are reassembled into one record and HTTP
//! headers at the start of a payload are moved into the record's fields.

mod arc;
mod config;
mod continuation;
mod error;
mod header;
mod reader;
mod record;
mod scan;
mod source;
mod warc;

pub use arc::{ArcInfo, UrlV1, UrlV2, ARC_MAGIC, ARC_TIME_FORMAT};
pub use config::{DuplicateSegments, ReaderConfig};
pub use error::{Error, Result};
pub use header::{canonical_key, header_pairs, Fields, FoldedLines, HeaderEncoding, HeaderMap};
pub use reader::{Format, Reader};
pub use record::{Header, Record};
pub use source::{Compression, Slicer, Source, GZIP_MAGIC};
pub use warc::{WarcHeader, WarcRecordType, WARC_MAGIC};

/// Open a reader on `source` with the default configuration.
pub fn open<'a>(source: Source<'a>) -> Result<Reader<'a>> {
    Reader::open(source)
}

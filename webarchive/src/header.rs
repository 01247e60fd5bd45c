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

//! Header blocks.
//!
//! A header block is a run of `Key: Value` lines terminated by a blank line. Lines
//! starting with a space or tab continue the previous value. Keys are canonicalised so
//! that lookups are insensitive to case and to the spelling conventions of WARC, ARC
//! and HTTP headers.

use std::borrow::Cow;
use std::collections::HashMap;

use encoding::all::WINDOWS_1252;
use encoding::{DecoderTrap, Encoding};

/// Field mapping of a record: canonical key to values in order of appearance.
pub type Fields = HashMap<String, Vec<String>>;

/// Field names whose canonical spelling is not plain hyphen-segment title case.
const KNOWN_FIELDS: &[&str] = &[
    "WARC-Type",
    "WARC-Record-ID",
    "WARC-Date",
    "WARC-Concurrent-To",
    "WARC-Block-Digest",
    "WARC-Payload-Digest",
    "WARC-IP-Address",
    "WARC-Refers-To",
    "WARC-Refers-To-Target-URI",
    "WARC-Refers-To-Date",
    "WARC-Target-URI",
    "WARC-Truncated",
    "WARC-Warcinfo-ID",
    "WARC-Filename",
    "WARC-Profile",
    "WARC-Identified-Payload-Type",
    "WARC-Segment-Number",
    "WARC-Segment-Origin-ID",
    "WARC-Segment-Total-Length",
    "WWW-Authenticate",
    "ETag",
    "Content-MD5",
    "DNT",
    "TE",
    "X-XSS-Protection",
];

/// Canonical form of a header key.
///
/// Each hyphen-separated segment is title-cased, then the result is mapped through
/// the table of known archive field names, so `content-length`, `Content-Length`
/// and `CONTENT-LENGTH` all become `Content-Length`, and `warc-record-id` becomes
/// `WARC-Record-ID`.
pub fn canonical_key(raw: &[u8]) -> String {
    let raw = String::from_utf8_lossy(raw.trim_ascii());
    let mut key = String::with_capacity(raw.len());
    for (i, part) in raw.split('-').enumerate() {
        if i > 0 {
            key.push('-');
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            key.push(first.to_ascii_uppercase());
            key.extend(chars.map(|c| c.to_ascii_lowercase()));
        }
    }
    match KNOWN_FIELDS.iter().find(|known| known.eq_ignore_ascii_case(&key)) {
        Some(known) => (*known).to_string(),
        None => key,
    }
}

fn split_line(buf: &[u8]) -> (&[u8], usize) {
    match buf.iter().position(|&b| b == b'\n') {
        Some(nl) => (buf[..nl].trim_ascii(), nl + 1),
        None => (buf.trim_ascii(), buf.len()),
    }
}

/// Iterator over the logical lines of a header block.
///
/// Continuation lines are folded into the preceding line, joined by a single space.
/// Each line is trimmed of surrounding whitespace, including the line terminator.
/// Blank lines are yielded as empty lines.
#[derive(Debug, Clone)]
pub struct FoldedLines<'b> {
    rest: &'b [u8],
}

impl<'b> FoldedLines<'b> {
    pub fn new(block: &'b [u8]) -> Self {
        FoldedLines { rest: block }
    }
}

impl<'b> Iterator for FoldedLines<'b> {
    type Item = Cow<'b, [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let (line, adv) = split_line(self.rest);
        self.rest = &self.rest[adv..];
        let mut folded = Cow::Borrowed(line);
        while let Some(b' ' | b'\t') = self.rest.first() {
            let (cont, adv) = split_line(self.rest);
            self.rest = &self.rest[adv..];
            let buf = folded.to_mut();
            buf.push(b' ');
            buf.extend_from_slice(cont);
        }
        Some(folded)
    }
}

/// Iterator over the `(canonical key, raw value)` pairs of a header block.
///
/// Lines without a colon (status lines, blank lines) are skipped.
pub fn header_pairs(block: &[u8]) -> impl Iterator<Item = (String, Vec<u8>)> + '_ {
    FoldedLines::new(block).filter_map(|line| {
        let colon = line.iter().position(|&b| b == b':')?;
        Some((
            canonical_key(&line[..colon]),
            line[colon + 1..].trim_ascii().to_vec(),
        ))
    })
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum HeaderEncoding {
    /// UTF-8, falling back to Windows-1252 for values that are not valid UTF-8.
    Unicode,
    Latin1,
}

/// Dict-like type representing a WARC or HTTP header block.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    encoding: HeaderEncoding,
    status_line: Vec<u8>,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl HeaderMap {
    /// Create a new header map with the specified encoding.
    ///
    /// # Arguments
    ///
    /// * `encoding` - Header source encoding
    pub fn new(encoding: HeaderEncoding) -> Self {
        HeaderMap {
            encoding,
            status_line: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Parse a raw header block.
    ///
    /// Keys are canonicalised. The first line without a colon becomes the status line
    /// (the status line of an HTTP header block folded into a record's fields).
    ///
    /// # Arguments
    ///
    /// * `block` - Raw header block, optionally including the blank terminator line
    /// * `encoding` - Header source encoding
    pub fn parse(block: &[u8], encoding: HeaderEncoding) -> Self {
        let mut map = HeaderMap::new(encoding);
        for line in FoldedLines::new(block) {
            if line.is_empty() {
                continue;
            }
            match line.iter().position(|&b| b == b':') {
                Some(colon) => map.append_bytes(canonical_key(&line[..colon]).as_bytes(), &line[colon + 1..]),
                None if map.status_line.is_empty() => map.status_line = line.into_owned(),
                None => {}
            }
        }
        map
    }

    /// Get the header encoding.
    pub fn encoding(&self) -> HeaderEncoding {
        self.encoding
    }

    /// Get the header status line.
    pub fn status_line(&self) -> Option<String> {
        if self.status_line.is_empty() {
            return None;
        }
        Some(self.decode(&self.status_line))
    }

    /// Get the raw status line as bytes.
    pub fn status_line_bytes(&self) -> &[u8] {
        &self.status_line
    }

    /// HTTP status code (unset if header block has no HTTP status line).
    pub fn status_code(&self) -> Option<u16> {
        if !self.status_line.starts_with(b"HTTP/") {
            return None;
        }
        let mut parts = self.status_line.splitn(3, |&b| b == b' ');
        // Skip HTTP/
        parts.next()?;
        String::from_utf8_lossy(parts.next()?).parse::<u16>().ok()
    }

    /// HTTP reason phrase.
    /// Returns None if the header block has no HTTP status line or no reason phrase was given.
    pub fn reason_phrase(&self) -> Option<String> {
        if !self.status_line.starts_with(b"HTTP/") {
            return None;
        }
        let mut parts = self.status_line.splitn(3, |&b| b == b' ');
        // Skip HTTP/ and status code
        parts.next()?;
        parts.next()?;
        Some(self.decode(parts.next()?))
    }

    fn decode(&self, byte_str: &[u8]) -> String {
        match self.encoding {
            HeaderEncoding::Unicode => match std::str::from_utf8(byte_str) {
                Ok(s) => s.to_string(),
                Err(_) => decode_latin1(byte_str),
            },
            HeaderEncoding::Latin1 => decode_latin1(byte_str),
        }
    }

    /// Get value for (case-insensitive) header key a string.
    /// Duplicate headers are returned as a single value joined with `","`.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    pub fn get(&self, key: &str) -> Option<String> {
        Some(self.decode(&self.get_bytes(key.as_bytes())?))
    }

    /// Get the first value for a (case-insensitive) header key.
    pub fn get_first(&self, key: &str) -> Option<String> {
        let key = key.as_bytes();
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| self.decode(v))
    }

    /// Get value for (case-insensitive) header key as bytes.
    /// Duplicate headers are returned as a single value joined with `","`.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    pub fn get_bytes(&self, key: &[u8]) -> Option<Vec<u8>> {
        let values: Vec<&[u8]> = self.headers.iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_slice())
            .collect();
        if !values.is_empty() {
            Some(values.as_slice().join(b",".as_slice()))
        } else {
            None
        }
    }

    /// Check if a (case-insensitive) header key exists.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    pub fn contains_key(&self, key: &str) -> bool {
        let key_bytes = key.as_bytes();
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(key_bytes))
    }

    /// Append header.
    ///
    /// Appending a new header is efficient and does not check for
    /// existing headers with the same name.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key as bytes
    /// * `value` - Header value as bytes
    pub fn append_bytes(&mut self, key: &[u8], value: &[u8]) {
        self.headers.push((key.trim_ascii().to_vec(), value.trim_ascii().to_vec()));
    }

    /// Iterator of keys and values.
    pub fn items(&self) -> impl Iterator<Item = (String, String)> + '_ {
        self.headers
            .iter()
            .map(|(k, v)| (self.decode(k), self.decode(v)))
    }

    /// Iterator of header keys.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.headers
            .iter()
            .map(|(k, _)| self.decode(k))
    }

    /// Headers as a field mapping.
    ///
    /// Values of repeated keys are kept in order of appearance.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        self.extend_fields(&mut fields);
        fields
    }

    /// Append all headers to an existing field mapping.
    pub fn extend_fields(&self, fields: &mut Fields) {
        for (k, v) in self.items() {
            fields.entry(k).or_default().push(v);
        }
    }

    /// Get the number of headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if the header map is empty.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

fn decode_latin1(byte_str: &[u8]) -> String {
    WINDOWS_1252.decode(byte_str, DecoderTrap::Replace)
        .unwrap_or_else(|_| String::from_utf8_lossy(byte_str).into_owned())
}

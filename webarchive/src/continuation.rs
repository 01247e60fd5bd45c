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

//! Reassembly of segmented WARC records.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::config::DuplicateSegments;
use crate::error::{Error, Result};
use crate::record::Header;
use crate::scan::transport_len;
use crate::warc::WarcHeader;

/// A complete logical record assembled from its segments.
///
/// `buf` holds the header block of the first submitted segment followed by the
/// concatenated segment payloads. Everything before `start` is header data,
/// including an embedded transport header if the body started with one.
#[derive(Debug)]
pub(crate) struct Merged {
    pub header: Header,
    pub buf: Vec<u8>,
    pub start: usize,
}

impl Merged {
    /// Body length after the header data.
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    pub fn body(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    pub fn header_block(&self) -> &[u8] {
        &self.buf[..self.start]
    }
}

#[derive(Debug)]
struct Pending {
    header: WarcHeader,
    fields: Vec<u8>,
    segments: BTreeMap<u32, Vec<u8>>,
    final_seen: bool,
    seq: u64,
}

impl Pending {
    /// The terminal segment was seen and no segment number up to the highest is missing.
    fn is_complete(&self) -> bool {
        let highest = self.segments.keys().next_back().copied().unwrap_or(0);
        self.final_seen && self.segments.len() as u64 == u64::from(highest)
    }
}

/// Incomplete continuation groups, keyed by the record ID of their first segment.
#[derive(Debug)]
pub(crate) struct Continuations {
    pending: HashMap<String, Pending>,
    seq: u64,
    max_pending: Option<usize>,
    duplicates: DuplicateSegments,
}

impl Continuations {
    pub fn new(max_pending: Option<usize>, duplicates: DuplicateSegments) -> Self {
        Continuations {
            pending: HashMap::new(),
            seq: 0,
            max_pending,
            duplicates,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            debug!(groups = self.pending.len(), "discarding incomplete continuation groups");
        }
        self.pending.clear();
    }

    /// Submit one segment with its raw header block and full payload.
    ///
    /// Returns the merged record once the terminal segment has been seen and no
    /// segment before it is missing, `None` otherwise.
    pub fn submit(&mut self, header: &WarcHeader, fields: &[u8], payload: Vec<u8>) -> Result<Option<Merged>> {
        let segment = header.segment_number();
        if segment == 0 {
            return Err(Error::field("WARC-Segment-Number", "0"));
        }
        let key = if segment == 1 {
            header.record_id().to_string()
        } else {
            header
                .origin_id()
                .ok_or_else(|| Error::field("WARC-Segment-Origin-ID", ""))?
                .to_string()
        };

        if !self.pending.contains_key(&key) {
            self.evict_for_insert();
            self.seq += 1;
            self.pending.insert(
                key.clone(),
                Pending {
                    header: header.clone(),
                    fields: fields.to_vec(),
                    segments: BTreeMap::new(),
                    final_seen: false,
                    seq: self.seq,
                },
            );
        }
        let Some(entry) = self.pending.get_mut(&key) else {
            return Ok(None);
        };

        if entry.segments.contains_key(&segment) {
            match self.duplicates {
                DuplicateSegments::Reject => {
                    return Err(Error::DuplicateSegment { origin: key, segment });
                }
                DuplicateSegments::Replace => {
                    warn!(origin = %key, segment, "duplicate segment replaces earlier submission");
                }
            }
        }
        entry.segments.insert(segment, payload);
        if header.total_length().is_some() {
            entry.final_seen = true;
        }

        if !entry.is_complete() {
            return Ok(None);
        }
        let Some(entry) = self.pending.remove(&key) else {
            return Ok(None);
        };

        let body_len: usize = entry.segments.values().map(Vec::len).sum();
        let mut buf = Vec::with_capacity(entry.fields.len() + body_len);
        buf.extend_from_slice(&entry.fields);
        for seg in entry.segments.into_values() {
            buf.extend_from_slice(&seg);
        }
        let mut start = entry.fields.len();
        if let Some(n) = transport_len(&buf[start..]) {
            start += n;
        }
        debug!(origin = %key, body = buf.len() - start, "merged continuation record");
        Ok(Some(Merged {
            header: Header::Continuation(entry.header),
            buf,
            start,
        }))
    }

    fn evict_for_insert(&mut self) {
        let Some(max) = self.max_pending else {
            return;
        };
        while !self.pending.is_empty() && self.pending.len() >= max {
            let oldest = self
                .pending
                .iter()
                .min_by_key(|(_, p)| p.seq)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest {
                if let Some(p) = self.pending.remove(&key) {
                    warn!(
                        origin = %key,
                        received = p.segments.len(),
                        "evicting incomplete continuation group"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "<urn:uuid:origin>";

    fn segment(number: u32, last: bool) -> (WarcHeader, Vec<u8>) {
        let mut block = format!(
            "WARC-Type: {}\r\nWARC-Target-URI: http://example.com/\r\nWARC-Date: 2020-01-01T00:00:00Z\r\nContent-Length: 4\r\nWARC-Segment-Number: {}\r\n",
            if number == 1 { "response" } else { "continuation" },
            number
        );
        if number == 1 {
            block.push_str(&format!("WARC-Record-ID: {}\r\n", ORIGIN));
        } else {
            block.push_str(&format!(
                "WARC-Record-ID: <urn:uuid:seg{}>\r\nWARC-Segment-Origin-ID: {}\r\n",
                number, ORIGIN
            ));
        }
        if last {
            block.push_str("WARC-Segment-Total-Length: 12\r\n");
        }
        block.push_str("\r\n");
        let header = WarcHeader::parse(block.as_bytes()).unwrap();
        (header, block.into_bytes())
    }

    fn submit(c: &mut Continuations, number: u32, last: bool, payload: &[u8]) -> Result<Option<Merged>> {
        let (header, block) = segment(number, last);
        c.submit(&header, &block, payload.to_vec())
    }

    #[test]
    fn test_merge_in_order() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        assert!(submit(&mut c, 1, false, b"aaaa").unwrap().is_none());
        assert!(submit(&mut c, 2, false, b"bbbb").unwrap().is_none());
        let merged = submit(&mut c, 3, true, b"cccc").unwrap().unwrap();
        assert_eq!(merged.body(), b"aaaabbbbcccc");
        assert_eq!(merged.len(), 12);
        assert_eq!(c.len(), 0);
        let Header::Continuation(h) = &merged.header else {
            panic!("expected continuation header");
        };
        assert_eq!(h.record_id(), ORIGIN);
        assert_eq!(h.record_type(), crate::warc::WarcRecordType::Response);
        assert!(merged.header_block().starts_with(b"WARC-Type: response"));
    }

    #[test]
    fn test_merge_out_of_order() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        assert!(submit(&mut c, 3, true, b"cccc").unwrap().is_none());
        assert!(submit(&mut c, 1, false, b"aaaa").unwrap().is_none());
        assert_eq!(c.len(), 1);
        let merged = submit(&mut c, 2, false, b"bbbb").unwrap().unwrap();
        assert_eq!(merged.body(), b"aaaabbbbcccc");
        // identity comes from the first segment submitted
        let Header::Continuation(h) = &merged.header else {
            panic!("expected continuation header");
        };
        assert_eq!(h.segment_number(), 3);
    }

    #[test]
    fn test_not_complete_without_final() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        assert!(submit(&mut c, 1, false, b"aaaa").unwrap().is_none());
        assert!(submit(&mut c, 2, false, b"bbbb").unwrap().is_none());
        assert_eq!(c.len(), 1);
        c.clear();
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn test_missing_origin() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        let block = b"WARC-Date: 2020-01-01T00:00:00Z\r\nContent-Length: 1\r\nWARC-Segment-Number: 2\r\n\r\n";
        let header = WarcHeader::parse(block).unwrap();
        assert!(matches!(
            c.submit(&header, block, vec![b'x']),
            Err(Error::Field { field: "WARC-Segment-Origin-ID", .. })
        ));
    }

    #[test]
    fn test_duplicate_replace() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        assert!(submit(&mut c, 1, false, b"xxxx").unwrap().is_none());
        assert!(submit(&mut c, 1, false, b"aaaa").unwrap().is_none());
        let merged = submit(&mut c, 2, true, b"bbbb").unwrap().unwrap();
        assert_eq!(merged.body(), b"aaaabbbb");
    }

    #[test]
    fn test_duplicate_reject() {
        let mut c = Continuations::new(None, DuplicateSegments::Reject);
        assert!(submit(&mut c, 1, false, b"aaaa").unwrap().is_none());
        assert!(matches!(
            submit(&mut c, 1, false, b"aaaa"),
            Err(Error::DuplicateSegment { segment: 1, .. })
        ));
    }

    #[test]
    fn test_eviction() {
        let mut c = Continuations::new(Some(2), DuplicateSegments::Replace);
        for i in 0..3 {
            let block = format!(
                "WARC-Date: 2020-01-01T00:00:00Z\r\nContent-Length: 1\r\nWARC-Segment-Number: 1\r\nWARC-Record-ID: <urn:uuid:{}>\r\n\r\n",
                i
            );
            let header = WarcHeader::parse(block.as_bytes()).unwrap();
            assert!(c.submit(&header, block.as_bytes(), vec![b'x']).unwrap().is_none());
        }
        assert_eq!(c.len(), 2);
        assert!(!c.pending.contains_key("<urn:uuid:0>"));
        assert!(c.pending.contains_key("<urn:uuid:2>"));
    }

    #[test]
    fn test_large_segment_number_does_not_allocate() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        let block = format!(
            "WARC-Date: 2020-01-01T00:00:00Z\r\nContent-Length: 1\r\nWARC-Segment-Number: 4000000000\r\n\
             WARC-Segment-Origin-ID: {}\r\nWARC-Segment-Total-Length: 1\r\n\r\n",
            ORIGIN
        );
        let header = WarcHeader::parse(block.as_bytes()).unwrap();
        assert!(c.submit(&header, block.as_bytes(), vec![b'x']).unwrap().is_none());
        assert_eq!(c.len(), 1);
        assert!(submit(&mut c, 1, false, b"aaaa").unwrap().is_none());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_gap_before_final_segment() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        assert!(submit(&mut c, 1, false, b"aaaa").unwrap().is_none());
        assert!(submit(&mut c, 3, true, b"cccc").unwrap().is_none());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_unterminated_transport_header_is_body() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        let merged = submit(&mut c, 1, true, b"HTTP/1.1 200 OK\r\nA: b\r\n").unwrap().unwrap();
        assert_eq!(merged.body(), b"HTTP/1.1 200 OK\r\nA: b\r\n");
    }

    #[test]
    fn test_transport_header_in_merged_body() {
        let mut c = Continuations::new(None, DuplicateSegments::Replace);
        assert!(submit(&mut c, 1, false, b"HTTP/1.1 200 OK\r\nContent-Ty").unwrap().is_none());
        let merged = submit(&mut c, 2, true, b"pe: text/plain\r\n\r\nbody").unwrap().unwrap();
        assert_eq!(merged.body(), b"body");
        assert!(merged.header_block().ends_with(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n\r\n"));
    }
}

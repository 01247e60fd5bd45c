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

//! WARC record headers.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::header::{HeaderEncoding, HeaderMap};

/// Magic bytes at the start of every WARC file.
pub const WARC_MAGIC: &[u8; 4] = b"WARC";

/// WARC record type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarcRecordType {
    WarcInfo = 2,
    Response = 4,
    Resource = 8,
    Request = 16,
    Metadata = 32,
    Revisit = 64,
    Conversion = 128,
    Continuation = 256,
    Unknown = 512,
    AnyType = 65535,
    NoType = 0,
}

impl WarcRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarcRecordType::WarcInfo => "warcinfo",
            WarcRecordType::Response => "response",
            WarcRecordType::Resource => "resource",
            WarcRecordType::Request => "request",
            WarcRecordType::Metadata => "metadata",
            WarcRecordType::Revisit => "revisit",
            WarcRecordType::Conversion => "conversion",
            WarcRecordType::Continuation => "continuation",
            _ => "unknown",
        }
    }

    pub fn matches_bitmask(&self, bitmask: u16) -> bool {
        (*self as u16) & bitmask != 0
    }
}

impl TryFrom<&str> for WarcRecordType {
    type Error = &'static str;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "warcinfo" => Ok(WarcRecordType::WarcInfo),
            "response" => Ok(WarcRecordType::Response),
            "resource" => Ok(WarcRecordType::Resource),
            "request" => Ok(WarcRecordType::Request),
            "metadata" => Ok(WarcRecordType::Metadata),
            "revisit" => Ok(WarcRecordType::Revisit),
            "conversion" => Ok(WarcRecordType::Conversion),
            "continuation" => Ok(WarcRecordType::Continuation),
            "unknown" => Ok(WarcRecordType::Unknown),
            _ => Err("Invalid enum value."),
        }
    }
}

impl From<WarcRecordType> for &'static str {
    fn from(value: WarcRecordType) -> Self {
        value.as_str()
    }
}

/// Identity of a WARC record, extracted from its header block.
#[derive(Debug, Clone, PartialEq)]
pub struct WarcHeader {
    url: String,
    id: String,
    date: DateTime<Utc>,
    size: u64,
    record_type: WarcRecordType,
    segment: u32,
    origin_id: Option<String>,
    total_length: Option<u64>,
}

impl WarcHeader {
    /// Extract the record identity from a raw header block.
    ///
    /// `WARC-Date` and `Content-Length` are required. A missing
    /// `WARC-Segment-Number` means the record is not segmented.
    pub fn parse(block: &[u8]) -> Result<Self> {
        let headers = HeaderMap::parse(block, HeaderEncoding::Unicode);

        let date = headers
            .get_first("WARC-Date")
            .ok_or_else(|| Error::field("WARC-Date", ""))?;
        let date = DateTime::parse_from_rfc3339(&date)
            .map_err(|_| Error::field("WARC-Date", date.as_str()))?
            .with_timezone(&Utc);

        let size = headers
            .get_first("Content-Length")
            .ok_or_else(|| Error::field("Content-Length", ""))?;
        let size = size
            .parse::<u64>()
            .map_err(|_| Error::field("Content-Length", size.as_str()))?;

        let segment = match headers.get_first("WARC-Segment-Number") {
            Some(s) => s
                .parse::<u32>()
                .map_err(|_| Error::field("WARC-Segment-Number", s.as_str()))?,
            None => 0,
        };

        let total_length = match headers.get_first("WARC-Segment-Total-Length") {
            Some(s) => Some(
                s.parse::<u64>()
                    .map_err(|_| Error::field("WARC-Segment-Total-Length", s.as_str()))?,
            ),
            None => None,
        };

        let record_type = headers
            .get_first("WARC-Type")
            .and_then(|t| WarcRecordType::try_from(t.as_str()).ok())
            .unwrap_or(WarcRecordType::Unknown);

        Ok(WarcHeader {
            url: headers.get_first("WARC-Target-URI").unwrap_or_default(),
            id: headers.get_first("WARC-Record-ID").unwrap_or_default(),
            date,
            size,
            record_type,
            segment,
            origin_id: headers.get_first("WARC-Segment-Origin-ID"),
            total_length,
        })
    }

    /// `WARC-Target-URI`
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `WARC-Record-ID`
    pub fn record_id(&self) -> &str {
        &self.id
    }

    /// `WARC-Date`
    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// `Content-Length`
    pub fn content_length(&self) -> u64 {
        self.size
    }

    /// `WARC-Type`
    pub fn record_type(&self) -> WarcRecordType {
        self.record_type
    }

    /// `WARC-Segment-Number`, 0 for records that are not segmented.
    pub fn segment_number(&self) -> u32 {
        self.segment
    }

    /// First `WARC-Segment-Origin-ID`, set on segments after the first.
    pub fn origin_id(&self) -> Option<&str> {
        self.origin_id.as_deref()
    }

    /// `WARC-Segment-Total-Length`, only present on the last segment.
    pub fn total_length(&self) -> Option<u64> {
        self.total_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &[u8] = b"WARC-Type: response\r\n\
        WARC-Target-URI: http://example.com/\r\n\
        WARC-Date: 2015-07-08T21:55:13Z\r\n\
        WARC-Record-ID: <urn:uuid:00000000-0000-0000-0000-000000000001>\r\n\
        Content-Length: 1234\r\n\
        \r\n";

    #[test]
    fn test_record_type_from_str() {
        assert_eq!(WarcRecordType::try_from("Response"), Ok(WarcRecordType::Response));
        assert_eq!(WarcRecordType::try_from("warcinfo"), Ok(WarcRecordType::WarcInfo));
        assert!(WarcRecordType::try_from("bogus").is_err());
        assert_eq!(<&str>::from(WarcRecordType::Revisit), "revisit");
    }

    #[test]
    fn test_parse_header() {
        let header = WarcHeader::parse(BLOCK).unwrap();
        assert_eq!(header.record_type(), WarcRecordType::Response);
        assert_eq!(header.url(), "http://example.com/");
        assert_eq!(header.record_id(), "<urn:uuid:00000000-0000-0000-0000-000000000001>");
        assert_eq!(header.date().to_rfc3339(), "2015-07-08T21:55:13+00:00");
        assert_eq!(header.content_length(), 1234);
        assert_eq!(header.segment_number(), 0);
        assert_eq!(header.origin_id(), None);
        assert_eq!(header.total_length(), None);
    }

    #[test]
    fn test_parse_segment_fields() {
        let block = b"WARC-Type: continuation\r\nWARC-Date: 2015-07-08T21:55:13Z\r\n\
            Content-Length: 3\r\nWARC-Segment-Number: 2\r\n\
            WARC-Segment-Origin-ID: <urn:x:1>\r\nWARC-Segment-Total-Length: 10\r\n\r\n";
        let header = WarcHeader::parse(block).unwrap();
        assert_eq!(header.record_type(), WarcRecordType::Continuation);
        assert_eq!(header.segment_number(), 2);
        assert_eq!(header.origin_id(), Some("<urn:x:1>"));
        assert_eq!(header.total_length(), Some(10));
    }

    #[test]
    fn test_case_insensitive_keys() {
        let block = b"warc-type: resource\r\nwarc-date: 2015-07-08T21:55:13Z\r\nCONTENT-LENGTH: 7\r\n\r\n";
        let header = WarcHeader::parse(block).unwrap();
        assert_eq!(header.record_type(), WarcRecordType::Resource);
        assert_eq!(header.content_length(), 7);
    }

    #[test]
    fn test_invalid_fields() {
        let bad_date = b"WARC-Date: yesterday\r\nContent-Length: 1\r\n\r\n";
        assert!(matches!(
            WarcHeader::parse(bad_date),
            Err(Error::Field { field: "WARC-Date", .. })
        ));

        let bad_length = b"WARC-Date: 2015-07-08T21:55:13Z\r\nContent-Length: ten\r\n\r\n";
        assert!(matches!(
            WarcHeader::parse(bad_length),
            Err(Error::Field { field: "Content-Length", .. })
        ));

        let missing_length = b"WARC-Date: 2015-07-08T21:55:13Z\r\n\r\n";
        assert!(matches!(
            WarcHeader::parse(missing_length),
            Err(Error::Field { field: "Content-Length", .. })
        ));
    }
}

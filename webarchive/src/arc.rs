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

//! ARC version blocks and URL records.
//!
//! An ARC file starts with a version block: a `filedesc://` URL record line, a line
//! holding the format version and origin code, and (for version 2) an XML metadata
//! payload. Each following record is introduced by a single space-separated URL
//! record line whose last token is the payload length.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::header::Fields;
use crate::record::Header;
use crate::scan::Scan;

/// Prefix of the first line of every ARC file.
pub const ARC_MAGIC: &[u8] = b"filedesc://";

/// ARC timestamp format (`YYYYMMDDhhmmss`, GMT).
pub const ARC_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

pub(crate) fn parse_arc_time(raw: &[u8]) -> Option<DateTime<Utc>> {
    let raw = std::str::from_utf8(raw).ok()?;
    NaiveDateTime::parse_from_str(raw, ARC_TIME_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

fn text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn tokens(line: &[u8]) -> Vec<&[u8]> {
    line.trim_ascii().split(|&b| b == b' ').collect()
}

/// Archive-level metadata from the ARC version block.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcInfo {
    /// The `filedesc://` path of the archive
    pub path: String,
    /// Network address of the archiving host
    pub address: String,
    /// Creation date of the archive
    pub file_date: DateTime<Utc>,
    /// Format version (1 or 2)
    pub version: u32,
    /// Name of the gathering organization
    pub origin_code: String,
}

/// Read the version block and position the source at the first URL record.
pub(crate) fn read_version_block(scan: &mut dyn Scan) -> Result<ArcInfo> {
    let line1 = scan.read_line()?.to_vec();
    let first = tokens(&line1);
    if line1.trim_ascii().is_empty() || first.len() < 3 {
        return Err(Error::version_block("expected at least 3 fields in the first line"));
    }
    let file_date = parse_arc_time(first[2])
        .ok_or_else(|| Error::version_block(format!("invalid file date {:?}", text(first[2]))))?;
    let last = first[first.len() - 1];
    let length = text(last)
        .parse::<u64>()
        .map_err(|_| Error::version_block(format!("invalid block length {:?}", text(last))))?;

    let line2 = scan.read_line()?;
    let consumed = line2.len() as u64;
    let second = tokens(line2);
    if second.len() < 3 {
        return Err(Error::version_block("expected at least 3 fields in the version line"));
    }
    let version = text(second[0])
        .parse::<u32>()
        .map_err(|_| Error::version_block(format!("invalid version {:?}", text(second[0]))))?;
    if version == 0 {
        return Err(Error::version_block("unsupported version 0"));
    }
    let origin_code = text(second[second.len() - 1].trim_ascii());

    let info = ArcInfo {
        path: text(first[0]),
        address: text(first[1]),
        file_date,
        version,
        origin_code,
    };

    let rest = length
        .checked_sub(consumed)
        .ok_or_else(|| Error::version_block("block length is shorter than the version line"))?;
    if scan.skip(rest)? < rest {
        return Err(Error::Truncated {
            context: "end of stream inside ARC version block",
        });
    }
    debug!(
        path = %info.path,
        version = info.version,
        origin = %info.origin_code,
        block_length = length,
        "read ARC version block"
    );
    Ok(info)
}

/// Version 1 URL record.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlV1 {
    url: String,
    ip: String,
    date: DateTime<Utc>,
    mime: String,
    size: u64,
}

impl UrlV1 {
    fn parse(parts: &[&[u8]]) -> Result<Self> {
        if parts.len() < 5 {
            return Err(Error::header("ARC", format!("expected at least 5 fields, got {}", parts.len())));
        }
        let date = parse_arc_time(parts[2])
            .ok_or_else(|| Error::field("Archive-Date", text(parts[2])))?;
        let last = parts[parts.len() - 1];
        let size = text(last)
            .parse::<u64>()
            .map_err(|_| Error::field("Archive-Length", text(last)))?;
        Ok(UrlV1 {
            url: text(parts[0]),
            ip: text(parts[1]),
            date,
            mime: text(parts[3]),
            size,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Dotted-quad IP address (e.g. `192.216.46.98` or `0.0.0.0`)
    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    /// `no-type` or the MIME type of the payload (e.g. `text/html`)
    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("URL".into(), vec![self.url.clone()]);
        fields.insert("IP".into(), vec![self.ip.clone()]);
        fields.insert("Date".into(), vec![self.date.format(ARC_TIME_FORMAT).to_string()]);
        fields.insert("MIME".into(), vec![self.mime.clone()]);
        fields.insert("Size".into(), vec![self.size.to_string()]);
        fields
    }
}

/// Version 2 URL record.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlV2 {
    base: UrlV1,
    status_code: u16,
    checksum: String,
    location: String,
    offset: u64,
    filename: String,
}

impl UrlV2 {
    fn parse(parts: &[&[u8]]) -> Result<Self> {
        if parts.len() != 10 {
            return Err(Error::header("ARC", format!("expected 10 fields, got {}", parts.len())));
        }
        let base = UrlV1::parse(parts)?;
        let status_code = text(parts[4])
            .parse::<u16>()
            .map_err(|_| Error::field("Result-Code", text(parts[4])))?;
        let offset = text(parts[7])
            .parse::<u64>()
            .map_err(|_| Error::field("Offset", text(parts[7])))?;
        Ok(UrlV2 {
            base,
            status_code,
            checksum: text(parts[5]),
            location: text(parts[6]),
            offset,
            filename: text(parts[8]),
        })
    }

    /// Fields shared with version 1 records.
    pub fn base(&self) -> &UrlV1 {
        &self.base
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Redirect location, `-` if none.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Offset of the record in the original archive file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Name of the archive file the record originated from.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn fields(&self) -> Fields {
        let mut fields = self.base.fields();
        fields.insert("StatusCode".into(), vec![self.status_code.to_string()]);
        fields.insert("Checksum".into(), vec![self.checksum.clone()]);
        fields.insert("Location".into(), vec![self.location.clone()]);
        fields.insert("Offset".into(), vec![self.offset.to_string()]);
        fields.insert("Filename".into(), vec![self.filename.clone()]);
        fields
    }
}

/// Parse a URL record line according to the archive's format version.
///
/// Version 1 uses the 5-field grammar, version 2 and later the 10-field one.
pub(crate) fn parse_url_record(line: &[u8], version: u32) -> Result<Header> {
    let parts = tokens(line);
    if version <= 1 {
        Ok(Header::UrlV1(UrlV1::parse(&parts)?))
    } else {
        Ok(Header::UrlV2(UrlV2::parse(&parts)?))
    }
}

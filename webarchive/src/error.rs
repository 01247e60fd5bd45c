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

//! Error types.

use std::io;

use thiserror::Error;

/// Errors returned while opening or iterating a web archive.
///
/// Reaching the end of a container is not an error: `next()` and `next_payload()`
/// return `Ok(None)` instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The source is neither a WARC nor an ARC container.
    #[error("not a valid ARC or WARC file")]
    NotWebArchive,

    /// The ARC version block could not be parsed.
    #[error("invalid ARC version block: {reason}")]
    VersionBlock { reason: String },

    /// A record header line or header block is malformed.
    #[error("invalid {format} header: {reason}")]
    Header { format: &'static str, reason: String },

    /// A required field is absent or its value does not parse.
    #[error("missing or invalid field {field}: {value:?}")]
    Field { field: &'static str, value: String },

    /// Slicing was requested on a source that cannot address arbitrary windows.
    #[error("underlying source must be addressable to support slicing")]
    NotSlicer,

    /// The stream ended inside a header block or before a declared payload ended.
    #[error("truncated stream: {context}")]
    Truncated { context: &'static str },

    /// A segment number was submitted twice for the same continuation group.
    #[error("duplicate segment {segment} for continuation group {origin}")]
    DuplicateSegment { origin: String, segment: u32 },

    /// I/O error from the underlying source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn header(format: &'static str, reason: impl Into<String>) -> Self {
        Error::Header {
            format,
            reason: reason.into(),
        }
    }

    pub(crate) fn field(field: &'static str, value: impl Into<String>) -> Self {
        Error::Field {
            field,
            value: value.into(),
        }
    }

    pub(crate) fn version_block(reason: impl Into<String>) -> Self {
        Error::VersionBlock {
            reason: reason.into(),
        }
    }

    /// Whether this error ends iteration because the data ran out early.
    pub fn is_truncation(&self) -> bool {
        match self {
            Error::Truncated { .. } => true,
            Error::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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

//! Reader configuration.

use crate::warc::WarcRecordType;

/// What to do when a continuation group receives the same segment number twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateSegments {
    /// The later segment replaces the earlier one.
    #[default]
    Replace,
    /// Submission fails with [`Error::DuplicateSegment`](crate::Error::DuplicateSegment).
    Reject,
}

/// Reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Initial capacity of the streaming buffer in bytes. The buffer grows when a
    /// single line does not fit and is reused across resets.
    pub buffer_capacity: usize,
    /// Initial window size for zero-copy line scans.
    pub line_window: usize,
    /// Initial window size for zero-copy header block scans.
    pub block_window: usize,
    /// Bitmask of WARC record types returned by `next_payload()`
    /// (see [`WarcRecordType::matches_bitmask`]).
    pub payload_types: u16,
    /// Maximum number of incomplete continuation groups to retain. `None` retains
    /// them until the reader is reset or closed.
    pub max_pending_continuations: Option<usize>,
    /// Policy for repeated segment numbers within one continuation group.
    pub duplicate_segments: DuplicateSegments,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            buffer_capacity: 64 * 1024,
            line_window: 100,
            block_window: 1000,
            payload_types: WarcRecordType::Response as u16
                | WarcRecordType::Resource as u16
                | WarcRecordType::Conversion as u16,
            max_pending_continuations: Some(1024),
            duplicate_segments: DuplicateSegments::Replace,
        }
    }
}

impl ReaderConfig {
    /// Set the initial streaming buffer capacity.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Set the initial zero-copy scan windows for lines and header blocks.
    pub fn with_windows(mut self, line_window: usize, block_window: usize) -> Self {
        self.line_window = line_window;
        self.block_window = block_window;
        self
    }

    /// Set the record types returned by `next_payload()`.
    pub fn with_payload_types(mut self, types: &[WarcRecordType]) -> Self {
        self.payload_types = types.iter().fold(0, |mask, t| mask | *t as u16);
        self
    }

    /// Set the cap on incomplete continuation groups.
    pub fn with_max_pending_continuations(mut self, max: Option<usize>) -> Self {
        self.max_pending_continuations = max;
        self
    }

    /// Set the duplicate segment policy.
    pub fn with_duplicate_segments(mut self, policy: DuplicateSegments) -> Self {
        self.duplicate_segments = policy;
        self
    }
}

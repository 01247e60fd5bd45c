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

//! Byte sources.
//!
//! A [`Source`] is either a plain forward-only stream (anything implementing
//! [`Read`]) or an addressable window source implementing [`Slicer`], which can hand
//! out arbitrary `(offset, length)` windows without copying. Memory maps and
//! in-memory buffers are addressable; files and network streams are not.
//!
//! Compressed sources are detected from the first three bytes when a reader is
//! opened. Zero-copy access is not possible through a decompressor, so a compressed
//! addressable source is read as a stream.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use memmap2::Mmap;

/// Gzip member magic: ID1, ID2 and the deflate compression method.
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Detected compression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression
    None,
    /// Gzip, possibly with one member per record (.warc.gz, .arc.gz)
    Gzip,
}

impl Compression {
    /// Detect compression format from magic bytes.
    pub fn detect(data: &[u8]) -> Self {
        if data.len() >= GZIP_MAGIC.len() && data[..GZIP_MAGIC.len()] == GZIP_MAGIC {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    /// Check if this represents compressed data.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
        }
    }
}

/// A source that can return arbitrary windows of its data without copying.
pub trait Slicer {
    /// Return the bytes in `[offset, offset + len)`.
    ///
    /// The result is shorter than `len` (possibly empty) when the window reaches past
    /// the end of the data; a short result is the end-of-data signal.
    fn slice(&self, offset: u64, len: usize) -> io::Result<&[u8]>;
}

fn clamp(data: &[u8], offset: u64, len: usize) -> &[u8] {
    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
    let end = start.saturating_add(len).min(data.len());
    &data[start..end]
}

impl Slicer for [u8] {
    fn slice(&self, offset: u64, len: usize) -> io::Result<&[u8]> {
        Ok(clamp(self, offset, len))
    }
}

impl Slicer for Vec<u8> {
    fn slice(&self, offset: u64, len: usize) -> io::Result<&[u8]> {
        Ok(clamp(self, offset, len))
    }
}

impl Slicer for Mmap {
    fn slice(&self, offset: u64, len: usize) -> io::Result<&[u8]> {
        Ok(clamp(self, offset, len))
    }
}

impl<T: Slicer + ?Sized> Slicer for &T {
    fn slice(&self, offset: u64, len: usize) -> io::Result<&[u8]> {
        (**self).slice(offset, len)
    }
}

impl<T: Slicer + ?Sized> Slicer for Box<T> {
    fn slice(&self, offset: u64, len: usize) -> io::Result<&[u8]> {
        (**self).slice(offset, len)
    }
}

/// Byte origin of a web archive.
pub enum Source<'a> {
    /// Sequential, forward-only source. Buffered internally.
    Stream(Box<dyn Read + 'a>),
    /// Addressable source. Read without an intermediate buffer when uncompressed.
    Window(Box<dyn Slicer + 'a>),
}

impl<'a> Source<'a> {
    /// Wrap a forward-only reader.
    pub fn stream<R: Read + 'a>(reader: R) -> Self {
        Source::Stream(Box::new(reader))
    }

    /// Wrap an addressable window source.
    pub fn window<S: Slicer + 'a>(slicer: S) -> Self {
        Source::Window(Box::new(slicer))
    }

    /// Whether this source supports zero-copy window access.
    pub fn is_addressable(&self) -> bool {
        matches!(self, Source::Window(_))
    }
}

impl Source<'static> {
    /// Open a file as a forward-only stream.
    pub fn file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Source::stream(File::open(path)?))
    }

    /// Memory-map a file as an addressable source.
    pub fn mmap<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            // Zero-length maps are rejected on some platforms.
            return Ok(Source::window(Vec::new()));
        }
        // The map is read-only. Truncating the file while it is mapped is undefined behaviour.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Source::window(mmap))
    }
}

impl std::fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Stream(_) => f.write_str("Source::Stream"),
            Source::Window(_) => f.write_str("Source::Window"),
        }
    }
}

/// Sequential [`Read`] over the windows of a [`Slicer`].
///
/// Feeds a decompressor from an addressable source.
pub(crate) struct WindowReader<'a> {
    src: Box<dyn Slicer + 'a>,
    pos: u64,
}

impl<'a> WindowReader<'a> {
    pub(crate) fn new(src: Box<dyn Slicer + 'a>) -> Self {
        WindowReader { src, pos: 0 }
    }
}

impl Read for WindowReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.src.slice(self.pos, buf.len())?;
        let n = chunk.len();
        buf[..n].copy_from_slice(chunk);
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_no_compression() {
        assert_eq!(Compression::detect(b"WARC/1.0"), Compression::None);
        assert_eq!(Compression::detect(b"fi"), Compression::None);
        assert_eq!(Compression::detect(b""), Compression::None);
    }

    #[test]
    fn test_detect_gzip() {
        let data = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00];
        assert_eq!(Compression::detect(&data), Compression::Gzip);
        assert!(Compression::Gzip.is_compressed());
        // Gzip ID bytes with a method other than deflate do not count.
        assert_eq!(Compression::detect(&[0x1f, 0x8b, 0x07]), Compression::None);
    }

    #[test]
    fn test_slice_is_truncated_at_end() {
        let data = b"0123456789".to_vec();
        assert_eq!(data.slice(2, 3).unwrap(), b"234");
        assert_eq!(data.slice(8, 5).unwrap(), b"89");
        assert!(data.slice(10, 5).unwrap().is_empty());
        assert!(data.slice(u64::MAX, 5).unwrap().is_empty());

        let borrowed: &[u8] = b"abc";
        assert_eq!(borrowed.slice(1, usize::MAX).unwrap(), b"bc");
    }

    #[test]
    fn test_window_reader_reads_sequentially() {
        let mut reader = WindowReader::new(Box::new(b"hello world".to_vec()));
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello world");
    }
}

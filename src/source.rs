//! Byte sources and the streaming source window
//!
//! Decoders never require a whole compressed file to be resident. They pull
//! it through a [`ByteSource`], either chunk by chunk (the inflater) or via
//! a [`SourceWindow`], a fixed 1 KiB buffer that slides forward as the
//! decoder consumes it.

use crate::{Result, Z64Error};
use log::trace;

/// Capacity of a [`SourceWindow`]
pub const WINDOW_SIZE: usize = 1024;

/// Random-access supplier of compressed bytes
pub trait ByteSource {
    /// Total number of bytes available
    fn len(&self) -> usize;

    /// Whether the source holds no bytes at all
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` with the bytes starting at `offset`
    ///
    /// Fails with [`Z64Error::Truncated`] if the range is not fully available.
    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()>;
}

fn truncated(offset: usize, length: usize, available: usize) -> Z64Error {
    Z64Error::Truncated {
        offset,
        length,
        available,
    }
}

impl ByteSource for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let available = <[u8]>::len(self);
        let end = offset
            .checked_add(buf.len())
            .filter(|&end| end <= available)
            .ok_or_else(|| truncated(offset, buf.len(), available))?;
        buf.copy_from_slice(&self[offset..end]);
        Ok(())
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.as_slice().read_at(offset, buf)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &S {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        (**self).read_at(offset, buf)
    }
}

/// A source that presents a synthetic header in front of another source
///
/// Used for headerless table entries: the codec sees a complete file while
/// the body is read straight from the ROM.
#[derive(Debug)]
pub struct HeaderPrefixed<'a, S: ByteSource + ?Sized> {
    header: Vec<u8>,
    body: &'a S,
}

impl<'a, S: ByteSource + ?Sized> HeaderPrefixed<'a, S> {
    /// Put `header` in front of `body`
    pub fn new(header: Vec<u8>, body: &'a S) -> Self {
        Self { header, body }
    }
}

impl<S: ByteSource + ?Sized> ByteSource for HeaderPrefixed<'_, S> {
    fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let total = ByteSource::len(self);
        if offset.checked_add(buf.len()).map_or(true, |end| end > total) {
            return Err(truncated(offset, buf.len(), total));
        }

        let mut written = 0;
        if offset < self.header.len() {
            let n = (self.header.len() - offset).min(buf.len());
            buf[..n].copy_from_slice(&self.header[offset..offset + n]);
            written = n;
        }
        if written < buf.len() {
            let body_offset = offset + written - self.header.len();
            self.body.read_at(body_offset, &mut buf[written..])?;
        }
        Ok(())
    }
}

/// Fixed-size sliding window over a region of a [`ByteSource`]
///
/// The decoder reads through `next_byte`. Once the cursor crosses the
/// safety margin, `refill` moves the unread tail to the front of the window
/// (ending on an 8-byte boundary) and appends fresh bytes. When the source
/// runs dry the scan limit is pinned to the end of the live data.
pub struct SourceWindow<'s, S: ByteSource + ?Sized> {
    source: &'s S,
    buf: [u8; WINDOW_SIZE],
    pos: usize,
    end: usize,
    limit: usize,
    next: usize,
    remaining: usize,
}

impl<'s, S: ByteSource + ?Sized> SourceWindow<'s, S> {
    /// Open a window over `length` bytes of `source` starting at `offset`
    pub fn new(source: &'s S, offset: usize, length: usize, margin: usize) -> Result<Self> {
        let available = source.len();
        if offset.checked_add(length).map_or(true, |end| end > available) {
            return Err(truncated(offset, length, available));
        }

        let mut window = Self {
            source,
            buf: [0; WINDOW_SIZE],
            pos: 0,
            end: 0,
            limit: WINDOW_SIZE - margin.min(WINDOW_SIZE),
            next: offset,
            remaining: length,
        };
        let size = window.remaining.min(WINDOW_SIZE);
        window.load(0, size)?;
        window.end = size;
        if window.remaining == 0 {
            window.limit = window.end;
        }
        Ok(window)
    }

    fn load(&mut self, at: usize, size: usize) -> Result<()> {
        if size != 0 {
            self.source.read_at(self.next, &mut self.buf[at..at + size])?;
            self.next += size;
            self.remaining -= size;
        }
        Ok(())
    }

    /// Whether the cursor has crossed the safety margin with source bytes left
    pub fn needs_refill(&self) -> bool {
        self.pos >= self.limit && self.remaining != 0
    }

    /// Slide the unread tail to the front and top the window up
    pub fn refill(&mut self) -> Result<()> {
        let unread = self.end.saturating_sub(self.pos);
        let start = (8 - (unread & 7)) & 7;
        if unread != 0 {
            self.buf.copy_within(self.pos..self.end, start);
        }

        let size = (WINDOW_SIZE - start - unread).min(self.remaining);
        self.load(start + unread, size)?;
        self.pos = start;
        self.end = start + unread + size;
        if self.remaining == 0 {
            self.limit = self.end;
        }

        trace!(
            "window refill: kept {} bytes, loaded {}, {} remaining",
            unread,
            size,
            self.remaining
        );
        Ok(())
    }

    /// Refill if the margin has been crossed
    pub fn refill_if_needed(&mut self) -> Result<()> {
        if self.needs_refill() {
            self.refill()?;
        }
        Ok(())
    }

    /// Read the byte under the cursor and advance
    ///
    /// Reads past the live data return stale or zero bytes; well-formed
    /// streams never do so.
    pub fn next_byte(&mut self) -> u8 {
        let byte = self.buf.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        byte
    }

    /// Source bytes not yet loaded into the window
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Whether every source byte has been loaded
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Whether the cursor has read past the last byte of the source
    pub fn is_overrun(&self) -> bool {
        self.remaining == 0 && self.pos > self.end
    }

    /// Number of source bytes consumed through the cursor so far
    pub fn consumed(&self, start: usize) -> usize {
        (self.next - start).saturating_sub(self.end.saturating_sub(self.pos))
    }
}

impl<S: ByteSource + ?Sized> std::fmt::Debug for SourceWindow<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWindow")
            .field("pos", &self.pos)
            .field("end", &self.end)
            .field("limit", &self.limit)
            .field("next", &self.next)
            .field("remaining", &self.remaining)
            .finish()
    }
}

//! Range-limited reader: one logical byte cursor over a source, with a stack of
//! nested byte-count limits standing in for sub-streams.
//!
//! Each pushed range counts the bytes read while it is on top. Popping a range
//! drains whatever it did not read and then advances the enclosing range by the
//! *declared* size, so sibling fields stay aligned even when a field's content
//! is shorter than its declared length.

use crate::error::DecodeError;
use crate::text::{decode_modified_utf8, Encoding};
use byteorder::{BigEndian, ByteOrder};
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek};

/// A forward-only byte source. `remaining_hint` is a best-effort estimate of the
/// bytes left (0 when unknown); it is only consulted by unbounded collections
/// decoded directly under the root range.
pub trait ByteSource: Read {
    fn remaining_hint(&mut self) -> u64 {
        0
    }
}

impl ByteSource for &[u8] {
    fn remaining_hint(&mut self) -> u64 {
        self.len() as u64
    }
}

impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {
    fn remaining_hint(&mut self) -> u64 {
        let len = self.get_ref().as_ref().len() as u64;
        len.saturating_sub(self.position())
    }
}

impl ByteSource for File {
    fn remaining_hint(&mut self) -> u64 {
        let len = match self.metadata() {
            Ok(m) => m.len(),
            Err(_) => return 0,
        };
        match self.stream_position() {
            Ok(pos) => len.saturating_sub(pos),
            Err(_) => 0,
        }
    }
}

impl<R: ByteSource> ByteSource for BufReader<R> {
    fn remaining_hint(&mut self) -> u64 {
        self.buffer().len() as u64 + self.get_mut().remaining_hint()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn remaining_hint(&mut self) -> u64 {
        (**self).remaining_hint()
    }
}

/// One entry of the range stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Declared byte count; `None` only for the root frame.
    pub limit: Option<u64>,
    /// Bytes read while this frame was on top.
    pub consumed: u64,
}

impl Frame {
    fn remaining(&self) -> Option<u64> {
        self.limit.map(|l| l.saturating_sub(self.consumed))
    }
}

/// Reader decorator enforcing nested byte ranges. All multi-byte reads are big-endian.
#[derive(Debug)]
pub struct RangedReader<R> {
    inner: R,
    root: Frame,
    ranges: Vec<Frame>,
    position: u64,
}

impl<R: ByteSource> RangedReader<R> {
    pub fn new(inner: R) -> Self {
        RangedReader {
            inner,
            root: Frame {
                limit: None,
                consumed: 0,
            },
            ranges: Vec::new(),
            position: 0,
        }
    }

    /// Give the source back. Any pushed ranges are discarded.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Total bytes pulled from the source since construction.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of ranges pushed above the root.
    pub fn depth(&self) -> usize {
        self.ranges.len()
    }

    /// The frame currently bounding reads.
    pub fn current(&self) -> &Frame {
        self.ranges.last().unwrap_or(&self.root)
    }

    fn current_mut(&mut self) -> &mut Frame {
        match self.ranges.last_mut() {
            Some(frame) => frame,
            None => &mut self.root,
        }
    }

    /// Bound subsequent reads to `limit` bytes from here.
    pub fn push_range(&mut self, limit: u64) -> Result<(), DecodeError> {
        if let Some(available) = self.current().remaining() {
            if limit > available {
                return Err(DecodeError::RangeExceedsEnclosing {
                    requested: limit,
                    available,
                });
            }
        }
        self.ranges.push(Frame {
            limit: Some(limit),
            consumed: 0,
        });
        Ok(())
    }

    /// Close the innermost range: skip its unread bytes, then advance the
    /// enclosing range by the range's declared size.
    pub fn pop_range(&mut self) -> Result<(), DecodeError> {
        let top = match self.ranges.last() {
            Some(frame) => *frame,
            None => return Err(DecodeError::contract("pop_range with only the root range left")),
        };
        let limit = top.limit.unwrap_or(top.consumed);
        let unread = limit.saturating_sub(top.consumed);
        if unread > 0 && self.skip(unread)? < unread {
            return Err(DecodeError::UnexpectedEndOfStream);
        }
        self.ranges.pop();
        self.current_mut().consumed += limit;
        Ok(())
    }

    /// Bytes left in the current range, or the source's estimate under the root.
    pub fn available(&mut self) -> u64 {
        match self.current().remaining() {
            Some(n) => n,
            None => self.inner.remaining_hint(),
        }
    }

    /// Next byte, or `None` at the end of the current range or of the source.
    pub fn read_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        let mut b = [0u8; 1];
        loop {
            match Read::read(self, &mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(b[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fill `buf` completely or fail with `UnexpectedEndOfStream`.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        Read::read_exact(self, buf).map_err(DecodeError::from)
    }

    /// Read and discard up to `n` bytes; returns how many were skipped.
    pub fn skip(&mut self, n: u64) -> Result<u64, DecodeError> {
        let skipped = io::copy(&mut Read::by_ref(self).take(n), &mut io::sink())?;
        Ok(skipped)
    }

    /// Exactly `n` bytes.
    pub fn read_vec(&mut self, n: u64) -> Result<Vec<u8>, DecodeError> {
        let len = usize::try_from(n).map_err(|_| DecodeError::contract(format!("byte count {} too large", n)))?;
        let mut out = Vec::with_capacity(len.min(64 * 1024));
        let got = Read::by_ref(self).take(n).read_to_end(&mut out)?;
        if got < len {
            return Err(DecodeError::UnexpectedEndOfStream);
        }
        Ok(out)
    }

    /// Everything left in the current range (or in the source under the root).
    pub fn read_remaining(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::new();
        Read::read_to_end(self, &mut out)?;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.read_byte()?.ok_or(DecodeError::UnexpectedEndOfStream)
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u16(&buf))
    }

    pub fn read_i16(&mut self) -> Result<i16, DecodeError> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_i16(&buf))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u32(&buf))
    }

    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_i32(&buf))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u64(&buf))
    }

    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_i64(&buf))
    }

    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_f32(&buf))
    }

    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_f64(&buf))
    }

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    /// A UTF-16 code unit; lone surrogates are rejected.
    pub fn read_char(&mut self) -> Result<char, DecodeError> {
        let unit = self.read_u16()?;
        char::from_u32(unit as u32)
            .ok_or_else(|| DecodeError::malformed("UTF-16", format!("lone surrogate 0x{:04x}", unit)))
    }

    /// Big-endian unsigned integer of `n` bytes (1..=8).
    pub fn read_uint(&mut self, n: usize) -> Result<u64, DecodeError> {
        if n == 0 || n > 8 {
            return Err(DecodeError::contract(format!("integer width {} not in 1..=8", n)));
        }
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf[..n])?;
        Ok(BigEndian::read_uint(&buf[..n], n))
    }

    pub fn read_modified_utf8(&mut self, byte_len: u32) -> Result<String, DecodeError> {
        let bytes = self.read_vec(byte_len as u64)?;
        decode_modified_utf8(&bytes)
    }

    /// Exactly `byte_len` bytes decoded with `encoding`.
    pub fn read_string(&mut self, byte_len: u64, encoding: Encoding) -> Result<String, DecodeError> {
        if encoding == Encoding::ModifiedUtf8 {
            let len = u32::try_from(byte_len)
                .map_err(|_| DecodeError::contract(format!("modified UTF-8 string of {} bytes", byte_len)))?;
            return self.read_modified_utf8(len);
        }
        let bytes = self.read_vec(byte_len)?;
        encoding.decode(&bytes)
    }
}

impl<R: ByteSource> Read for RangedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = match self.current().remaining() {
            Some(0) => return Ok(0),
            Some(left) => buf.len().min(usize::try_from(left).unwrap_or(usize::MAX)),
            None => buf.len(),
        };
        let n = self.inner.read(&mut buf[..want])?;
        self.current_mut().consumed += n as u64;
        self.position += n as u64;
        Ok(n)
    }
}

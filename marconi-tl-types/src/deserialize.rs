//! Reconstruction of Rust values from their TL byte representation.
use crate::{Blob, RawVec};
use std::fmt;

/// A read-only view over a serialized buffer that tracks how far decoding
/// has progressed.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Wraps a byte slice for decoding, starting at its first byte.
    pub fn from_slice(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The number of bytes consumed so far.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The number of bytes left to consume.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reads a single byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.pos < self.buf.len() {
            let byte = self.buf[self.pos];
            self.pos += 1;
            Ok(byte)
        } else {
            Err(Error::UnexpectedEof)
        }
    }

    /// Reads exactly `n` bytes, borrowing them from the underlying buffer.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Reads whatever is left, leaving the cursor exhausted.
    pub fn read_to_end(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}

/// The ways decoding can fail.
///
/// Decoding is strict about structure but makes no attempt to validate
/// semantics; a well-formed buffer for the wrong constructor fails with
/// [`Error::UnexpectedConstructor`], everything else that goes wrong is a
/// truncated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The buffer ended before the value was complete.
    UnexpectedEof,

    /// The 32-bit identifier that was read does not belong to any
    /// constructor valid at this position.
    UnexpectedConstructor {
        /// The identifier actually found.
        id: u32,
    },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected eof"),
            Self::UnexpectedConstructor { id } => write!(f, "unexpected constructor: {id:08x}"),
        }
    }
}

/// Alias for the result of deserializing a value.
pub type Result<T> = std::result::Result<T, Error>;

/// Convenience alias for the cursor parameter threaded through every
/// [`Deserializable`] implementation.
pub type Buffer<'a, 'b> = &'b mut Cursor<'a>;

/// A value that can be reconstructed from its TL binary form.
pub trait Deserializable: Sized {
    /// Reads the value from the cursor, advancing it past what was consumed.
    fn deserialize(buf: Buffer) -> Result<Self>;

    /// Decodes a value from the beginning of a byte slice.
    ///
    /// Trailing bytes are ignored, matching how message bodies may carry
    /// padding after the value itself.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::deserialize(&mut Cursor::from_slice(bytes))
    }
}

impl Deserializable for bool {
    /// Accepts exactly the two boxed boolean constructors.
    fn deserialize(buf: Buffer) -> Result<Self> {
        match u32::deserialize(buf)? {
            0x997275b5 => Ok(true),
            0xbc799737 => Ok(false),
            id => Err(Error::UnexpectedConstructor { id }),
        }
    }
}

impl Deserializable for i32 {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(buf.read(4)?);
        Ok(Self::from_le_bytes(bytes))
    }
}

impl Deserializable for u32 {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(buf.read(4)?);
        Ok(Self::from_le_bytes(bytes))
    }
}

impl Deserializable for i64 {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(buf.read(8)?);
        Ok(Self::from_le_bytes(bytes))
    }
}

impl Deserializable for f64 {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(buf.read(8)?);
        Ok(Self::from_le_bytes(bytes))
    }
}

impl Deserializable for [u8; 16] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut out = [0; 16];
        out.copy_from_slice(buf.read(16)?);
        Ok(out)
    }
}

impl Deserializable for [u8; 32] {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let mut out = [0; 32];
        out.copy_from_slice(buf.read(32)?);
        Ok(out)
    }
}

impl Deserializable for Vec<u8> {
    /// TL `bytes`, the inverse of the serialized short and long forms,
    /// including the zero padding up to a multiple of four.
    fn deserialize(buf: Buffer) -> Result<Self> {
        let first = buf.read_byte()?;
        let (len, header_len) = if first == 0xfe {
            let mut len = [0; 4];
            len[..3].copy_from_slice(buf.read(3)?);
            (u32::from_le_bytes(len) as usize, 4)
        } else {
            (first as usize, 1)
        };
        let data = buf.read(len)?.to_vec();
        buf.read((4 - (header_len + len) % 4) % 4)?;
        Ok(data)
    }
}

impl Deserializable for String {
    /// Strings reuse the `bytes` encoding; invalid UTF-8 is replaced rather
    /// than rejected, since string contents are not this layer's problem.
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(String::from_utf8_lossy(&Vec::<u8>::deserialize(buf)?).into_owned())
    }
}

impl<T: Deserializable> Deserializable for Vec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        match u32::deserialize(buf)? {
            0x1cb5c415 => {}
            id => return Err(Error::UnexpectedConstructor { id }),
        }
        let len = i32::deserialize(buf)?;
        (0..len).map(|_| T::deserialize(buf)).collect()
    }
}

impl<T: Deserializable> Deserializable for RawVec<T> {
    fn deserialize(buf: Buffer) -> Result<Self> {
        let len = i32::deserialize(buf)?;
        Ok(Self((0..len).map(|_| T::deserialize(buf)).collect::<Result<_>>()?))
    }
}

impl Deserializable for Blob {
    fn deserialize(buf: Buffer) -> Result<Self> {
        Ok(Self(buf.read_to_end().to_vec()))
    }
}

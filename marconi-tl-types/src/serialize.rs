//! Conversion of Rust values into their TL byte representation.
use crate::{Blob, RawVec};

/// A value that can be written out in TL binary form.
pub trait Serializable {
    /// Appends the TL representation of `self` to `buf`.
    fn serialize(&self, buf: &mut impl Extend<u8>);

    /// Serializes into a freshly allocated byte vector.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        self.serialize(&mut buffer);
        buffer
    }
}

impl Serializable for bool {
    /// Booleans are boxed on the wire: either of the `boolTrue` or
    /// `boolFalse` constructor identifiers, nothing else.
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        if *self {
            0x997275b5u32.serialize(buf)
        } else {
            0xbc799737u32.serialize(buf)
        }
    }
}

impl Serializable for i32 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for u32 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for i64 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for f64 {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.to_le_bytes());
    }
}

impl Serializable for [u8; 16] {
    /// `int128` values travel as 16 raw bytes, no length prefix.
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

impl Serializable for [u8; 32] {
    /// `int256` values travel as 32 raw bytes, no length prefix.
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.iter().copied());
    }
}

impl Serializable for &[u8] {
    /// TL `bytes`: a one-byte length for anything up to 253 bytes, otherwise
    /// the marker `0xfe` followed by a three-byte little-endian length. In
    /// both forms the total is padded with zeros to a multiple of four.
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        let len = self.len();
        let header_len = if len <= 253 {
            buf.extend([len as u8]);
            1
        } else {
            buf.extend([
                0xfe,
                (len & 0xff) as u8,
                ((len >> 8) & 0xff) as u8,
                ((len >> 16) & 0xff) as u8,
            ]);
            4
        };
        buf.extend(self.iter().copied());
        let padding = (4 - (header_len + len) % 4) % 4;
        buf.extend(std::iter::repeat(0).take(padding));
    }
}

impl Serializable for Vec<u8> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_slice().serialize(buf)
    }
}

impl Serializable for &str {
    /// Strings reuse the `bytes` encoding over their UTF-8 representation.
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_bytes().serialize(buf)
    }
}

impl Serializable for String {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        self.as_str().serialize(buf)
    }
}

// No ambiguity with the `Vec<u8>` impl above: `u8` itself is not
// `Serializable`, and coherence keeps downstream crates from making it so.
impl<T: Serializable> Serializable for Vec<T> {
    /// Boxed `vector`: the `vector#1cb5c415` identifier, the element count
    /// as a 32-bit integer, then each element in order.
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        0x1cb5c415u32.serialize(buf);
        (self.len() as i32).serialize(buf);
        self.iter().for_each(|x| x.serialize(buf));
    }
}

impl<T: Serializable> Serializable for RawVec<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        (self.0.len() as i32).serialize(buf);
        self.0.iter().for_each(|x| x.serialize(buf));
    }
}

/// Conditional fields write nothing when absent; whether they are present
/// is recorded separately in the constructor's flags.
impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        if let Some(x) = self {
            x.serialize(buf);
        }
    }
}

impl Serializable for Blob {
    fn serialize(&self, buf: &mut impl Extend<u8>) {
        buf.extend(self.0.iter().copied());
    }
}

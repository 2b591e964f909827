//! Pluggable transport framings.
//!
//! A [`Transport`] wraps outgoing payloads in wire framing and locates
//! complete payloads inside a receive buffer. Codecs never touch sockets;
//! the caller owns the byte stream and feeds bytes through in both
//! directions, which keeps the same codecs usable over blocking TCP,
//! async TCP, or an obfuscated tunnel.

use std::fmt;

use marconi_crypto::DequeBuffer;

/// Frames larger than this indicate a corrupted or hostile stream.
const MAXIMUM_DATA: usize = 2 * 1024 * 1024;

// ─── Trait ────────────────────────────────────────────────────────────────────

/// A codec for one MTProto transport framing.
///
/// `pack` and `unpack` keep independent state, so a single codec instance
/// serves both directions of one connection. After a reconnect, [`reset`]
/// (or a fresh codec) is required before reuse.
///
/// [`reset`]: Transport::reset
pub trait Transport {
    /// Wrap the payload currently held by `buffer` in wire framing, in place.
    ///
    /// The payload length must be a multiple of 4.
    fn pack(&mut self, buffer: &mut DequeBuffer);

    /// Find the first complete payload inside `buffer`.
    ///
    /// Returns [`Error::MissingBytes`] when the frame is still incomplete;
    /// the caller should read more bytes and retry with the same buffer.
    fn unpack(&mut self, buffer: &[u8]) -> Result<Unpacked, Error>;

    /// Return to the fresh-connection state.
    fn reset(&mut self);
}

/// Where a deframed payload sits inside the receive buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unpacked {
    /// Offset of the first payload byte.
    pub head: usize,
    /// Offset one past the last payload byte.
    pub tail: usize,
    /// Total bytes consumed from the buffer, framing included.
    pub consumed: usize,
}

/// Errors that can occur while deframing incoming bytes.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    MissingBytes(usize),
    BadLen { got: u32 },
    BadSeq { expected: u32, got: u32 },
    BadCrc { expected: u32, got: u32 },
    BadStatus { status: i32 },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBytes(n) => write!(f, "need {n} bytes to decode the next frame"),
            Self::BadLen { got } => write!(f, "invalid frame length {got}"),
            Self::BadSeq { expected, got }
                => write!(f, "frame seq mismatch: got {got}, expected {expected}"),
            Self::BadCrc { expected, got }
                => write!(f, "frame crc mismatch: got {got:08x}, expected {expected:08x}"),
            Self::BadStatus { status } => write!(f, "transport-level status {status}"),
        }
    }
}

// A 4-byte payload holding a negative number is a transport-level error
// code rather than an MTProto message.
fn check_status(payload: &[u8]) -> Result<(), Error> {
    if payload.len() == 4 {
        let status = i32::from_le_bytes(payload.try_into().unwrap());
        if status < 0 {
            return Err(Error::BadStatus { status });
        }
    }
    Ok(())
}

// ─── Abridged ─────────────────────────────────────────────────────────────────

/// The [abridged] framing: one `0xef` byte on first send, then each packet
/// is `[length/4 as 1 or 4 bytes][payload]`.
///
/// [abridged]: https://core.telegram.org/mtproto/mtproto-transports#abridged
#[derive(Debug, Default)]
pub struct Abridged {
    init_sent: bool,
}

impl Abridged {
    /// The protocol tag an obfuscated tunnel sends in place of the preamble.
    pub const OBFUSCATED_TAG: [u8; 4] = [0xef, 0xef, 0xef, 0xef];

    /// Codec for a fresh connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec for a connection whose obfuscation header already carried the
    /// protocol tag, so no preamble byte must be sent.
    pub fn without_preamble() -> Self {
        Self { init_sent: true }
    }
}

impl Transport for Abridged {
    fn pack(&mut self, buffer: &mut DequeBuffer) {
        debug_assert!(buffer.len() % 4 == 0);

        let len = buffer.len() / 4;
        if len < 127 {
            buffer.extend_front(&[len as u8]);
        } else {
            buffer.extend_front(&[
                0x7f,
                (len & 0xff) as u8,
                ((len >> 8) & 0xff) as u8,
                ((len >> 16) & 0xff) as u8,
            ]);
        }

        if !self.init_sent {
            buffer.extend_front(&[0xef]);
            self.init_sent = true;
        }
    }

    fn unpack(&mut self, buffer: &[u8]) -> Result<Unpacked, Error> {
        if buffer.is_empty() {
            return Err(Error::MissingBytes(1));
        }

        let (header_len, len) = if buffer[0] < 127 {
            (1, buffer[0] as usize * 4)
        } else {
            if buffer.len() < 4 {
                return Err(Error::MissingBytes(4));
            }
            let mut len_bytes = [0u8; 4];
            len_bytes[..3].copy_from_slice(&buffer[1..4]);
            (4, u32::from_le_bytes(len_bytes) as usize * 4)
        };

        if len > MAXIMUM_DATA {
            return Err(Error::BadLen { got: len as u32 });
        }
        if buffer.len() < header_len + len {
            return Err(Error::MissingBytes(header_len + len));
        }

        check_status(&buffer[header_len..header_len + len])?;
        Ok(Unpacked {
            head: header_len,
            tail: header_len + len,
            consumed: header_len + len,
        })
    }

    fn reset(&mut self) {
        self.init_sent = false;
    }
}

// ─── Intermediate ─────────────────────────────────────────────────────────────

/// The [intermediate] framing: a `0xeeeeeeee` preamble on first send, then
/// each packet is `[length as 4 bytes][payload]`.
///
/// [intermediate]: https://core.telegram.org/mtproto/mtproto-transports#intermediate
#[derive(Debug, Default)]
pub struct Intermediate {
    init_sent: bool,
}

impl Intermediate {
    /// The protocol tag an obfuscated tunnel sends in place of the preamble.
    pub const OBFUSCATED_TAG: [u8; 4] = [0xee, 0xee, 0xee, 0xee];

    /// Codec for a fresh connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec for a connection whose obfuscation header already carried the
    /// protocol tag, so no preamble must be sent.
    pub fn without_preamble() -> Self {
        Self { init_sent: true }
    }
}

impl Transport for Intermediate {
    fn pack(&mut self, buffer: &mut DequeBuffer) {
        debug_assert!(buffer.len() % 4 == 0);

        let len = buffer.len() as u32;
        buffer.extend_front(&len.to_le_bytes());

        if !self.init_sent {
            buffer.extend_front(&Self::OBFUSCATED_TAG);
            self.init_sent = true;
        }
    }

    fn unpack(&mut self, buffer: &[u8]) -> Result<Unpacked, Error> {
        if buffer.len() < 4 {
            return Err(Error::MissingBytes(4));
        }

        let len = u32::from_le_bytes(buffer[..4].try_into().unwrap()) as usize;
        if len > MAXIMUM_DATA {
            return Err(Error::BadLen { got: len as u32 });
        }
        if buffer.len() < 4 + len {
            return Err(Error::MissingBytes(4 + len));
        }

        check_status(&buffer[4..4 + len])?;
        Ok(Unpacked {
            head: 4,
            tail: 4 + len,
            consumed: 4 + len,
        })
    }

    fn reset(&mut self) {
        self.init_sent = false;
    }
}

// ─── Full ─────────────────────────────────────────────────────────────────────

/// The [full] framing: `[length][seq_no][payload][crc32]`, with the length
/// covering all four parts and the checksum covering the first three.
///
/// Sequence numbers count packets per direction, starting at zero.
///
/// [full]: https://core.telegram.org/mtproto/mtproto-transports#full
#[derive(Debug, Default)]
pub struct Full {
    send_seq: u32,
    recv_seq: u32,
}

impl Full {
    /// Codec for a fresh connection.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transport for Full {
    fn pack(&mut self, buffer: &mut DequeBuffer) {
        debug_assert!(buffer.len() % 4 == 0);

        let len_bytes = ((buffer.len() + 12) as u32).to_le_bytes();
        let seq_bytes = self.send_seq.to_le_bytes();

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&len_bytes);
        hasher.update(&seq_bytes);
        hasher.update(buffer.as_ref());
        let crc = hasher.finalize();

        buffer.extend_front(&seq_bytes);
        buffer.extend_front(&len_bytes);
        buffer.extend(crc.to_le_bytes());
        self.send_seq += 1;
    }

    fn unpack(&mut self, buffer: &[u8]) -> Result<Unpacked, Error> {
        if buffer.len() < 4 {
            return Err(Error::MissingBytes(12));
        }

        let total = u32::from_le_bytes(buffer[..4].try_into().unwrap()) as usize;
        if total < 12 || total > MAXIMUM_DATA + 12 {
            return Err(Error::BadLen { got: total as u32 });
        }
        if buffer.len() < total {
            return Err(Error::MissingBytes(total));
        }

        let crc = u32::from_le_bytes(buffer[total - 4..total].try_into().unwrap());
        let expected = crc32fast::hash(&buffer[..total - 4]);
        if crc != expected {
            return Err(Error::BadCrc { expected, got: crc });
        }

        let seq = u32::from_le_bytes(buffer[4..8].try_into().unwrap());
        if seq != self.recv_seq {
            return Err(Error::BadSeq {
                expected: self.recv_seq,
                got: seq,
            });
        }
        self.recv_seq += 1;

        check_status(&buffer[8..total - 4])?;
        Ok(Unpacked {
            head: 8,
            tail: total - 4,
            consumed: total,
        })
    }

    fn reset(&mut self) {
        self.send_seq = 0;
        self.recv_seq = 0;
    }
}

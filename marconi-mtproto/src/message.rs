//! Message identifiers and the plaintext message envelope.

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Allocator for 64-bit message identifiers.
///
/// Identifiers approximate server time: the upper 32 bits are Unix seconds
/// corrected by the known clock skew, the lower 32 bits come from the
/// sub-second nanoseconds shifted so the two least significant bits are
/// zero, as required of client messages. Allocation never repeats or goes
/// backwards, even with callers racing on several threads; when the clock
/// would hand out a stale value the previous identifier is bumped by four
/// instead.
pub struct MsgIdGen {
    last: AtomicI64,
    time_offset: AtomicI32,
}

impl MsgIdGen {
    /// Creates a generator with the given clock skew in seconds.
    pub fn new(time_offset: i32) -> Self {
        Self {
            last: AtomicI64::new(0),
            time_offset: AtomicI32::new(time_offset),
        }
    }

    /// The current clock skew applied to generated identifiers.
    pub fn time_offset(&self) -> i32 {
        self.time_offset.load(Ordering::Relaxed)
    }

    /// Replaces the clock skew, effective from the next allocation.
    pub fn set_time_offset(&self, seconds: i32) {
        self.time_offset.store(seconds, Ordering::Relaxed);
    }

    /// Re-derives the clock skew from a message identifier the server just
    /// produced, which embeds the server's own clock in its upper half.
    pub fn correct_from_server_id(&self, server_msg_id: i64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let server_secs = server_msg_id >> 32;
        self.set_time_offset((server_secs - now) as i32);
    }

    /// Allocates the next identifier.
    pub fn next(&self) -> i64 {
        let candidate = self.candidate();
        let prev = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| {
                Some(if candidate > prev { candidate } else { prev + 4 })
            })
            .unwrap_or_else(|prev| prev);
        if candidate > prev { candidate } else { prev + 4 }
    }

    fn candidate(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs = now.as_secs() as i64 + self.time_offset.load(Ordering::Relaxed) as i64;
        let nanos = now.subsec_nanos() as i64;
        (secs << 32) | (nanos << 2)
    }
}

/// Errors produced while taking apart a plaintext frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The frame is shorter than the fixed 20-byte plaintext header.
    TooShort {
        /// How many bytes there actually were.
        len: usize,
    },
    /// The frame claims to be encrypted (or corrupt); plaintext frames must
    /// carry a zero key identifier.
    BadAuthKeyId {
        /// The identifier that was found.
        got: i64,
    },
    /// The declared body length does not fit in the frame.
    BadLength {
        /// The declared length.
        got: u32,
        /// How many body bytes were available.
        available: usize,
    },
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "plaintext frame too short: {len} bytes"),
            Self::BadAuthKeyId { got } => write!(f, "expected zero auth_key_id, got {got:x}"),
            Self::BadLength { got, available } => {
                write!(f, "declared body length {got} exceeds available {available}")
            }
        }
    }
}

/// A message exchanged before any authorization key exists.
///
/// Only the key generation handshake uses this envelope:
///
/// ```text
/// auth_key_id: i64  (always zero)
/// msg_id:      i64
/// len:         u32
/// body:        [u8; len]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Identifier allocated for (or carried by) this message.
    pub msg_id: i64,
    /// TL-serialized body, constructor identifier included.
    pub body: Vec<u8>,
}

impl Message {
    /// Lays the message out in the plaintext wire format.
    pub fn to_plaintext_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 4 + self.body.len());
        buf.extend(0i64.to_le_bytes());
        buf.extend(self.msg_id.to_le_bytes());
        buf.extend((self.body.len() as u32).to_le_bytes());
        buf.extend(&self.body);
        buf
    }

    /// Parses a plaintext frame received from the server.
    pub fn from_plaintext_bytes(frame: &[u8]) -> Result<Self, Error> {
        if frame.len() < 20 {
            return Err(Error::TooShort { len: frame.len() });
        }
        let auth_key_id = i64::from_le_bytes(frame[..8].try_into().unwrap());
        if auth_key_id != 0 {
            return Err(Error::BadAuthKeyId { got: auth_key_id });
        }
        let msg_id = i64::from_le_bytes(frame[8..16].try_into().unwrap());
        let len = u32::from_le_bytes(frame[16..20].try_into().unwrap());
        let available = frame.len() - 20;
        if len as usize > available {
            return Err(Error::BadLength { got: len, available });
        }
        Ok(Self {
            msg_id,
            body: frame[20..20 + len as usize].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn msg_ids_are_strictly_increasing() {
        let r#gen = MsgIdGen::new(0);
        let mut last = 0;
        for _ in 0..10_000 {
            let id = r#gen.next();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn msg_ids_keep_client_parity() {
        let r#gen = MsgIdGen::new(0);
        for _ in 0..1_000 {
            assert_eq!(r#gen.next() % 4, 0);
        }
    }

    #[test]
    fn msg_ids_stay_unique_across_threads() {
        let r#gen = Arc::new(MsgIdGen::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let r#gen = Arc::clone(&r#gen);
                std::thread::spawn(move || {
                    let mut ids = Vec::with_capacity(2_000);
                    let mut last = 0;
                    for _ in 0..2_000 {
                        let id = r#gen.next();
                        assert!(id > last, "ids must increase within a thread");
                        last = id;
                        ids.push(id);
                    }
                    ids
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate msg_id {id}");
            }
        }
    }

    #[test]
    fn time_offset_shifts_the_upper_half() {
        let behind = MsgIdGen::new(-3600);
        let ahead = MsgIdGen::new(3600);
        let delta = (ahead.next() >> 32) - (behind.next() >> 32);
        assert!((3595..=3605).contains(&delta), "delta was {delta}");
    }

    #[test]
    fn server_id_correction_tracks_the_server_clock() {
        let r#gen = MsgIdGen::new(0);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        r#gen.correct_from_server_id((now + 120) << 32 | 1);
        assert!((115..=125).contains(&r#gen.time_offset()));
    }

    #[test]
    fn plaintext_roundtrip() {
        let message = Message {
            msg_id: 0x0102030405060708,
            body: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let bytes = message.to_plaintext_bytes();
        assert_eq!(&bytes[..8], &[0u8; 8]);
        assert_eq!(Message::from_plaintext_bytes(&bytes).unwrap(), message);
    }

    #[test]
    fn plaintext_rejects_nonzero_key_id() {
        let mut bytes = Message {
            msg_id: 1,
            body: vec![0; 4],
        }
        .to_plaintext_bytes();
        bytes[3] = 0x99;
        assert!(matches!(
            Message::from_plaintext_bytes(&bytes),
            Err(Error::BadAuthKeyId { .. })
        ));
    }

    #[test]
    fn plaintext_rejects_lying_lengths() {
        let mut bytes = Message {
            msg_id: 1,
            body: vec![0; 8],
        }
        .to_plaintext_bytes();
        bytes[16] = 0xff;
        assert!(matches!(
            Message::from_plaintext_bytes(&bytes),
            Err(Error::BadLength { .. })
        ));
        assert!(matches!(
            Message::from_plaintext_bytes(&bytes[..12]),
            Err(Error::TooShort { len: 12 })
        ));
    }
}

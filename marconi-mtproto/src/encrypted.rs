//! Encrypted MTProto 2.0 session, used for everything after key generation.

use std::fmt;

use marconi_crypto::{AuthKey, DequeBuffer, decrypt_data_v2, encrypt_data_v2};
use marconi_tl_types::Serializable;

use crate::message::MsgIdGen;

/// Errors that can occur when decrypting a server frame.
#[derive(Debug)]
pub enum DecryptError {
    /// The crypto layer rejected the frame outright.
    Crypto(marconi_crypto::DecryptError),
    /// The plaintext is shorter than the 32-byte inner header.
    FrameTooShort,
    /// The frame belongs to a different session, so it is either a replay
    /// or arrived over the wrong connection.
    SessionMismatch,
    /// The inner header declares more body bytes than were decrypted.
    BadLength {
        /// The declared body length.
        got: u32,
    },
}

impl std::error::Error for DecryptError {}

impl fmt::Display for DecryptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crypto(e) => write!(f, "crypto: {e}"),
            Self::FrameTooShort => write!(f, "inner plaintext too short"),
            Self::SessionMismatch => write!(f, "session_id mismatch"),
            Self::BadLength { got } => write!(f, "inner length {got} exceeds plaintext"),
        }
    }
}

/// The inner payload extracted from a successfully decrypted server frame.
pub struct DecryptedMessage {
    /// Salt the server stamped on the frame.
    pub salt: i64,
    /// Session the frame belongs to.
    pub session_id: i64,
    /// Identifier of the inner message.
    pub msg_id: i64,
    /// Sequence number of the inner message.
    pub seq_no: i32,
    /// TL-serialized body.
    pub body: Vec<u8>,
}

/// State of one encrypted session: the authorization key, a random session
/// identifier, the sequence counter and the current server salt.
///
/// [`pack`](Self::pack) turns outgoing payloads into wire-ready ciphertext,
/// [`unpack`](Self::unpack) reverses incoming frames. Identifier allocation
/// lives in a shared [`MsgIdGen`] so readers can correct the clock skew
/// without touching the rest of the state.
pub struct EncryptedSession {
    auth_key: AuthKey,
    session_id: i64,
    sequence: i32,
    id_gen: MsgIdGen,
    /// Salt to stamp on outgoing messages.
    pub salt: i64,
}

impl EncryptedSession {
    /// Creates a session over an existing authorization key. The session
    /// identifier is freshly random, so the server will answer the first
    /// message with `new_session_created`.
    pub fn new(auth_key: [u8; 256], first_salt: i64, time_offset: i32) -> Self {
        let mut rnd = [0u8; 8];
        getrandom::getrandom(&mut rnd).expect("getrandom");
        let session_id = i64::from_le_bytes(rnd);
        log::debug!("starting encrypted session {session_id:x}");
        Self {
            auth_key: AuthKey::from_bytes(auth_key),
            session_id,
            sequence: 0,
            id_gen: MsgIdGen::new(time_offset),
            salt: first_salt,
        }
    }

    fn next_seq_no(&mut self, content_related: bool) -> i32 {
        if content_related {
            let seq = self.sequence * 2 + 1;
            self.sequence += 1;
            seq
        } else {
            self.sequence * 2
        }
    }

    /// Encrypts an already-serialized body into a wire-ready frame,
    /// returning the frame and the identifier allocated for it.
    ///
    /// Layout of the plaintext prior to encryption:
    ///
    /// ```text
    /// salt:       i64
    /// session_id: i64
    /// msg_id:     i64
    /// seq_no:     i32
    /// len:        u32
    /// body:       [u8; len]
    /// ```
    ///
    /// `content_related` decides the sequence number parity: requests that
    /// expect an acknowledgement take odd numbers and advance the counter,
    /// service messages (pings, acks) take the current even number.
    pub fn pack_body(&mut self, body: &[u8], content_related: bool) -> (Vec<u8>, i64) {
        let msg_id = self.id_gen.next();
        let seq_no = self.next_seq_no(content_related);

        // Head room fits the prepended auth_key_id and msg_key.
        let mut buf = DequeBuffer::with_capacity(32 + body.len(), 32);
        buf.extend(self.salt.to_le_bytes());
        buf.extend(self.session_id.to_le_bytes());
        buf.extend(msg_id.to_le_bytes());
        buf.extend(seq_no.to_le_bytes());
        buf.extend((body.len() as u32).to_le_bytes());
        buf.extend(body.iter().copied());

        encrypt_data_v2(&mut buf, &self.auth_key);
        (buf.as_ref().to_vec(), msg_id)
    }

    /// Serializes and encrypts a TL value. See [`pack_body`](Self::pack_body).
    pub fn pack<S: Serializable>(&mut self, value: &S, content_related: bool) -> (Vec<u8>, i64) {
        self.pack_body(&value.to_bytes(), content_related)
    }

    /// Decrypts a server frame addressed to this session.
    pub fn unpack(&self, frame: &mut [u8]) -> Result<DecryptedMessage, DecryptError> {
        let message = Self::decrypt_frame(&self.auth_key, self.session_id, frame)?;
        Ok(message)
    }

    /// The authorization key bytes, for persistence.
    pub fn auth_key_bytes(&self) -> [u8; 256] {
        self.auth_key.to_bytes()
    }

    /// This session's random identifier.
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    /// The shared message identifier allocator.
    pub fn msg_ids(&self) -> &MsgIdGen {
        &self.id_gen
    }

    fn decrypt_frame(
        auth_key: &AuthKey,
        session_id: i64,
        frame: &mut [u8],
    ) -> Result<DecryptedMessage, DecryptError> {
        let plaintext = decrypt_data_v2(frame, auth_key).map_err(DecryptError::Crypto)?;
        if plaintext.len() < 32 {
            return Err(DecryptError::FrameTooShort);
        }

        let salt = i64::from_le_bytes(plaintext[..8].try_into().unwrap());
        let sid = i64::from_le_bytes(plaintext[8..16].try_into().unwrap());
        let msg_id = i64::from_le_bytes(plaintext[16..24].try_into().unwrap());
        let seq_no = i32::from_le_bytes(plaintext[24..28].try_into().unwrap());
        let len = u32::from_le_bytes(plaintext[28..32].try_into().unwrap());

        if sid != session_id {
            return Err(DecryptError::SessionMismatch);
        }
        if len as usize > plaintext.len() - 32 {
            return Err(DecryptError::BadLength { got: len });
        }

        Ok(DecryptedMessage {
            salt,
            session_id: sid,
            msg_id,
            seq_no,
            body: plaintext[32..32 + len as usize].to_vec(),
        })
    }

    /// Decrypts a frame given the raw key and session identifier, with no
    /// access to mutable session state. Reader tasks use this so decryption
    /// never contends with writers on a lock.
    pub fn decrypt_frame_standalone(
        auth_key: &[u8; 256],
        session_id: i64,
        frame: &mut [u8],
    ) -> Result<DecryptedMessage, DecryptError> {
        Self::decrypt_frame(&AuthKey::from_bytes(*auth_key), session_id, frame)
    }
}

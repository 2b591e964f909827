//! Session used before an authorization key exists.

use std::fmt;

use marconi_tl_types::{Deserializable, RemoteCall};

use crate::message::{self, Message, MsgIdGen};

/// Errors from unpacking a plaintext reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The plaintext envelope itself was malformed.
    Envelope(message::Error),
    /// The envelope was fine but the body failed to decode.
    Tl(marconi_tl_types::deserialize::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope(e) => write!(f, "envelope: {e}"),
            Self::Tl(e) => write!(f, "body: {e}"),
        }
    }
}

impl From<message::Error> for Error {
    fn from(e: message::Error) -> Self {
        Self::Envelope(e)
    }
}

impl From<marconi_tl_types::deserialize::Error> for Error {
    fn from(e: marconi_tl_types::deserialize::Error) -> Self {
        Self::Tl(e)
    }
}

/// Packs and unpacks the unencrypted messages of the key generation
/// handshake.
///
/// Identifiers still have to move forward across the three round trips, so
/// the session keeps its own [`MsgIdGen`] with no clock correction; the
/// server tolerates skew on plaintext messages.
pub struct PlainSession {
    id_gen: MsgIdGen,
}

impl PlainSession {
    /// Creates a fresh plaintext session.
    pub fn new() -> Self {
        Self {
            id_gen: MsgIdGen::new(0),
        }
    }

    /// Serializes a call into a ready-to-send plaintext frame.
    pub fn pack<R: RemoteCall>(&self, call: &R) -> Vec<u8> {
        Message {
            msg_id: self.id_gen.next(),
            body: call.to_bytes(),
        }
        .to_plaintext_bytes()
    }

    /// Parses a plaintext frame into the reply type of the call it answers.
    pub fn unpack<R: RemoteCall>(&self, frame: &[u8]) -> Result<R::Return, Error> {
        let message = Message::from_plaintext_bytes(frame)?;
        Ok(R::Return::from_bytes(&message.body)?)
    }
}

impl Default for PlainSession {
    fn default() -> Self {
        Self::new()
    }
}

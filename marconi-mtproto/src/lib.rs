//! Implementation of the [MTProto] client protocol, free of any I/O.
//!
//! This crate handles:
//! * Authorization key generation ([`authentication`])
//! * Message framing (message IDs, sequence numbers, the plaintext and
//!   encrypted envelopes)
//! * Transport framings ([`transport`])
//!
//! Every piece is sans-io: state machines consume server replies and
//! produce byte buffers, and the caller owns the sockets, timers and
//! retries. [`session::PlainSession`] drives the handshake requests and
//! [`encrypted::EncryptedSession`] everything after it.
//!
//! [MTProto]: https://core.telegram.org/mtproto

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod authentication;
pub mod encrypted;
pub mod message;
pub mod session;
pub mod transport;

pub use encrypted::{DecryptedMessage, EncryptedSession};
pub use message::{Message, MsgIdGen};
pub use session::PlainSession;
pub use transport::Transport;

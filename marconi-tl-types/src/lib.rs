//! Runtime for the [TL binary serialization] format, together with the
//! hand-written [MTProto service schema] spoken by the session layer itself.
//!
//! The traits in this crate define how Rust values map to TL-serialized
//! bytes and back. The [`mtproto`] module applies them to the small, frozen
//! set of constructors used during key generation and session upkeep
//! (`req_pq_multi`, `ping`, `msgs_ack` and friends). API-layer schemas are
//! out of scope here; anything that implements [`RemoteCall`] works with the
//! higher-level crates regardless of where it was defined.
//!
//! [TL binary serialization]: https://core.telegram.org/mtproto/serialize
//! [MTProto service schema]: https://core.telegram.org/schema/mtproto
#![deny(unsafe_code)]
pub mod deserialize;
pub mod mtproto;
pub mod serialize;

pub use deserialize::{Cursor, Deserializable};
pub use serialize::Serializable;

/// Anything with a known, fixed 32-bit constructor identifier.
///
/// The identifier is the CRC32 of the constructor's definition in the TL
/// schema, and is what appears on the wire in front of boxed values.
pub trait Identifiable {
    /// The constructor identifier.
    const CONSTRUCTOR_ID: u32;
}

/// A serializable value that the server knows how to answer.
///
/// Implemented by function constructors. Tying the return type to the call
/// lets the caller deserialize responses without naming the result type at
/// every call site.
pub trait RemoteCall: Serializable {
    /// The type of the value the server responds with.
    type Return: Deserializable;
}

/// A `vector` of values serialized without the usual `vector#1cb5c415`
/// prefix, only the element count followed by the elements themselves.
///
/// Some service constructors embed their contents bare like this; wrapping
/// the inner `Vec` makes the intent explicit at the use site.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVec<T>(pub Vec<T>);

/// A chunk of already-serialized bytes, written to the buffer verbatim.
///
/// Useful when a message body was produced elsewhere (for example a request
/// serialized ahead of time) and must be embedded without re-encoding. On
/// deserialization it swallows everything that remains in the cursor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Blob(pub Vec<u8>);

impl From<Vec<u8>> for Blob {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

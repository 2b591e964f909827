//! # marconi: MTProto client stack
//!
//! `marconi` wires the focused sub-crates of the workspace together
//! for convenience:
//!
//! | Sub-crate          | Role                                                |
//! |--------------------|-----------------------------------------------------|
//! | `marconi-tl-types` | TL constructors, functions and enums of the core    |
//! | `marconi-crypto`   | AES-IGE, RSA, factorization, authorization keys     |
//! | `marconi-mtproto`  | Sans-io session state machines, transport framings  |
//! | `marconi-sender`   | Async connection driver: RPC, updates, reconnection |
//!
//! ## Quick start
//!
//! ```no_run
//! use marconi::sender::{Sender, SenderConfig};
//! use marconi::tl::mtproto::functions;
//!
//! # async fn run() -> Result<(), marconi::sender::InvocationError> {
//! let (sender, mut updates) = Sender::connect(SenderConfig::default()).await?;
//!
//! let pong = sender.invoke(&functions::Ping { ping_id: 1 }).await?;
//! println!("alive: {pong:?}");
//!
//! while let Some(update) = updates.next().await {
//!     println!("{} raw update bytes", update.len());
//! }
//! sender.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! The sub-crates remain usable on their own; everything here is a
//! re-export.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`marconi_tl_types`]: generated constructors, functions and enums.
pub use marconi_tl_types as tl;

/// Re-export of [`marconi_mtproto`]: plaintext and encrypted sessions, authentication, transports.
pub use marconi_mtproto as mtproto;

/// Re-export of [`marconi_crypto`]: AES-IGE, RSA, factorize, AuthKey.
pub use marconi_crypto as crypto;

/// Re-export of [`marconi_sender`]: the async session driver.
pub use marconi_sender as sender;

// ─── Convenience re-exports ──────────────────────────────────────────────────

pub use marconi_tl_types::{Cursor, Deserializable, Identifiable, RemoteCall, Serializable};

pub use marconi_mtproto::authentication::{self, Finished, finish, step1, step2, step3};
pub use marconi_mtproto::{EncryptedSession, PlainSession};

pub use marconi_crypto::AuthKey;

pub use marconi_sender::{InvocationError, RpcError, Sender, SenderConfig, Updates};

//! Failure types surfaced by the sender.
//!
//! [`RpcError`] is the server saying "no" to a specific request.
//! [`InvocationError`] covers everything that can go wrong between
//! handing a request to [`Sender::invoke`](crate::Sender::invoke) and
//! getting its answer back.

use std::fmt;
use std::io;

use marconi_mtproto::{authentication, session, transport};
use marconi_tl_types::deserialize;

// ─── RpcError ────────────────────────────────────────────────────────────────

/// A request-scoped error reported by the server.
///
/// Error messages arrive as strings such as `FLOOD_WAIT_32` or
/// `PHONE_MIGRATE_2`. The trailing integer, when present, is split off
/// into [`value`](Self::value) so callers can match on the bare name.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcError {
    /// Numeric class of the error, e.g. `420` for flood control.
    pub code: i32,
    /// Upper snake case name with any trailing number removed.
    pub name: String,
    /// The number split off the name, if there was one.
    pub value: Option<u32>,
}

impl RpcError {
    /// Splits a raw `rpc_error` into code, name and trailing value.
    pub fn from_telegram(code: i32, message: &str) -> Self {
        if let Some(pos) = message.rfind('_') {
            let (name, tail) = message.split_at(pos);
            let tail = &tail[1..];
            if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(value) = tail.parse::<u32>() {
                    return Self {
                        code,
                        name: name.to_string(),
                        value: Some(value),
                    };
                }
            }
        }
        Self {
            code,
            name: message.to_string(),
            value: None,
        }
    }

    /// Matches the error name against a pattern.
    ///
    /// A leading or trailing `*` in the pattern matches any suffix or
    /// prefix respectively; otherwise the comparison is exact.
    pub fn is(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
            (Some(suffix), None) => self.name.ends_with(suffix),
            (None, Some(prefix)) => self.name.starts_with(prefix),
            (Some(_), Some(_)) => {
                let inner = &pattern[1..pattern.len() - 1];
                self.name.contains(inner)
            }
            (None, None) => self.name == pattern,
        }
    }

    /// Seconds the server asked us to wait, for flood-control errors.
    pub fn flood_wait_seconds(&self) -> Option<u32> {
        if self.code == 420 && self.name == "FLOOD_WAIT" {
            self.value
        } else {
            None
        }
    }

    /// The data-center this session belongs on, for `303` redirects.
    ///
    /// Redirects without an explicit number fall back to dc 2, the
    /// usual home for fresh sessions.
    pub fn migration_dc(&self) -> Option<i32> {
        if self.code == 303 {
            Some(self.value.unwrap_or(2) as i32)
        } else {
            None
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {}: {}", self.code, self.name)?;
        if let Some(value) = self.value {
            write!(f, " (value: {value})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

// ─── InvocationError ─────────────────────────────────────────────────────────

/// Why a remote call did not produce an answer.
#[derive(Debug)]
pub enum InvocationError {
    /// The server answered with an error for this request.
    Rpc(RpcError),
    /// The network gave up underneath us.
    Io(io::Error),
    /// The peer violated the framing protocol.
    Transport(transport::Error),
    /// Key negotiation failed a security check.
    Authentication(authentication::Error),
    /// The response bytes did not parse.
    Deserialize(String),
    /// No answer arrived within the configured deadline.
    Timeout,
    /// The sender shut down before the answer arrived.
    Dropped,
}

impl InvocationError {
    /// Delegates to [`RpcError::is`] for the `Rpc` variant.
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Rpc(error) => error.is(pattern),
            _ => false,
        }
    }

    /// Delegates to [`RpcError::flood_wait_seconds`].
    pub fn flood_wait_seconds(&self) -> Option<u32> {
        match self {
            Self::Rpc(error) => error.flood_wait_seconds(),
            _ => None,
        }
    }

    /// Delegates to [`RpcError::migration_dc`].
    pub(crate) fn migration_dc(&self) -> Option<i32> {
        match self {
            Self::Rpc(error) => error.migration_dc(),
            _ => None,
        }
    }

    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Security failures and server-side rejections are final; link
    /// trouble is not.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Transport(_) | Self::Deserialize(_) | Self::Timeout
        )
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rpc(error) => write!(f, "{error}"),
            Self::Io(error) => write!(f, "I/O error: {error}"),
            Self::Transport(error) => write!(f, "transport error: {error}"),
            Self::Authentication(error) => write!(f, "authentication error: {error}"),
            Self::Deserialize(error) => write!(f, "deserialize error: {error}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Dropped => write!(f, "request dropped"),
        }
    }
}

impl std::error::Error for InvocationError {}

impl From<io::Error> for InvocationError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<transport::Error> for InvocationError {
    fn from(error: transport::Error) -> Self {
        Self::Transport(error)
    }
}

impl From<authentication::Error> for InvocationError {
    fn from(error: authentication::Error) -> Self {
        Self::Authentication(error)
    }
}

impl From<deserialize::Error> for InvocationError {
    fn from(error: deserialize::Error) -> Self {
        Self::Deserialize(error.to_string())
    }
}

impl From<session::Error> for InvocationError {
    fn from(error: session::Error) -> Self {
        Self::Deserialize(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_number_is_split_off() {
        let error = RpcError::from_telegram(420, "FLOOD_WAIT_32");
        assert_eq!(error.code, 420);
        assert_eq!(error.name, "FLOOD_WAIT");
        assert_eq!(error.value, Some(32));
    }

    #[test]
    fn names_without_number_are_kept_whole() {
        let error = RpcError::from_telegram(401, "AUTH_KEY_UNREGISTERED");
        assert_eq!(error.name, "AUTH_KEY_UNREGISTERED");
        assert_eq!(error.value, None);
    }

    #[test]
    fn non_numeric_tail_is_not_a_value() {
        let error = RpcError::from_telegram(400, "PHONE_NUMBER_INVALID");
        assert_eq!(error.name, "PHONE_NUMBER_INVALID");
        assert_eq!(error.value, None);
    }

    #[test]
    fn wildcard_patterns_match() {
        let error = RpcError::from_telegram(303, "PHONE_MIGRATE_5");
        assert!(error.is("PHONE_MIGRATE"));
        assert!(error.is("*_MIGRATE"));
        assert!(error.is("PHONE_*"));
        assert!(error.is("*MIGRATE*"));
        assert!(!error.is("FILE_MIGRATE"));
    }

    #[test]
    fn flood_wait_exposes_seconds() {
        let error = RpcError::from_telegram(420, "FLOOD_WAIT_10");
        assert_eq!(error.flood_wait_seconds(), Some(10));

        let other = RpcError::from_telegram(420, "SLOWMODE_WAIT_10");
        assert_eq!(other.flood_wait_seconds(), None);
    }

    #[test]
    fn migration_reads_target_dc() {
        let error = RpcError::from_telegram(303, "PHONE_MIGRATE_4");
        assert_eq!(error.migration_dc(), Some(4));

        let bare = RpcError::from_telegram(303, "NETWORK_MIGRATE");
        assert_eq!(bare.migration_dc(), Some(2));

        let flood = RpcError::from_telegram(420, "FLOOD_WAIT_4");
        assert_eq!(flood.migration_dc(), None);
    }
}

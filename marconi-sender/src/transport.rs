//! Async connections carrying the wire framing.
//!
//! The framing codecs themselves are synchronous and byte-oriented;
//! this module pairs them with a TCP stream, an optional obfuscation
//! layer and an optional SOCKS5 hop, and splits the result into a
//! read half and a write half that live on different tasks.

use std::io;
use std::time::Duration;

use marconi_crypto::obfuscation::{self, ObfuscationCipher};
use marconi_crypto::DequeBuffer;
use marconi_mtproto::transport::{Abridged, Full, Intermediate, Transport, Error as FrameError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::errors::InvocationError;
use crate::socks5::Socks5Config;

const READ_CHUNK: usize = 8 * 1024;

// ─── TransportKind ───────────────────────────────────────────────────────────

/// Which framing a connection speaks.
///
/// | Kind                    | Overhead    | Hidden from middleboxes |
/// |-------------------------|-------------|-------------------------|
/// | `Abridged`              | 1-4 bytes   | no                      |
/// | `Intermediate`          | 4 bytes     | no                      |
/// | `Full`                  | 12 bytes    | no                      |
/// | `Obfuscated`            | 1-4 bytes   | yes                     |
/// | `ObfuscatedIntermediate`| 4 bytes     | yes                     |
///
/// The obfuscated kinds wrap the whole stream in AES-CTR keyed from a
/// random 64-byte header, with an optional 16-byte proxy secret folded
/// in, so the traffic carries no recognizable preamble.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum TransportKind {
    /// Smallest overhead, the usual choice.
    #[default]
    Abridged,
    /// Fixed four-byte length prefix.
    Intermediate,
    /// Length, sequence and CRC32 on every frame.
    Full,
    /// Abridged framing under stream obfuscation.
    Obfuscated {
        /// Proxy secret folded into the cipher keys, when required.
        secret: Option<[u8; 16]>,
    },
    /// Intermediate framing under stream obfuscation.
    ObfuscatedIntermediate {
        /// Proxy secret folded into the cipher keys, when required.
        secret: Option<[u8; 16]>,
    },
}

type Codec = Box<dyn Transport + Send>;

impl TransportKind {
    /// One codec instance plus the tag to bury in the obfuscation
    /// header, when this kind uses one.
    fn codec(&self) -> (Codec, Option<[u8; 4]>) {
        match self {
            Self::Abridged => (Box::new(Abridged::new()), None),
            Self::Intermediate => (Box::new(Intermediate::new()), None),
            Self::Full => (Box::new(Full::new()), None),
            Self::Obfuscated { .. } => (
                Box::new(Abridged::without_preamble()),
                Some(Abridged::OBFUSCATED_TAG),
            ),
            Self::ObfuscatedIntermediate { .. } => (
                Box::new(Intermediate::without_preamble()),
                Some(Intermediate::OBFUSCATED_TAG),
            ),
        }
    }

    fn secret(&self) -> Option<&[u8; 16]> {
        match self {
            Self::Obfuscated { secret } | Self::ObfuscatedIntermediate { secret } => {
                secret.as_ref()
            }
            _ => None,
        }
    }
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// An established, framed, possibly obfuscated TCP connection.
pub(crate) struct Connection {
    reader: ConnectionReader,
    writer: ConnectionWriter,
}

/// The half that receives frames. Owned by the read loop.
pub(crate) struct ConnectionReader {
    io: OwnedReadHalf,
    codec: Codec,
    decrypt: Option<ObfuscationCipher>,
    buffer: Vec<u8>,
}

/// The half that sends frames.
pub(crate) struct ConnectionWriter {
    io: OwnedWriteHalf,
    codec: Codec,
    encrypt: Option<ObfuscationCipher>,
}

impl Connection {
    /// Dials `addr`, directly or through SOCKS5, retrying transient
    /// failures up to `attempts` times with `backoff` between tries,
    /// then performs the transport preamble.
    pub(crate) async fn connect(
        addr: &str,
        kind: &TransportKind,
        socks5: Option<&Socks5Config>,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Self, InvocationError> {
        let mut attempt = 0;
        let mut stream = loop {
            attempt += 1;
            let dialed = match socks5 {
                Some(proxy) => proxy.connect(addr).await,
                None => TcpStream::connect(addr).await.map_err(InvocationError::Io),
            };
            match dialed {
                Ok(stream) => break stream,
                Err(error) if attempt < attempts => {
                    tracing::warn!(
                        "connecting to {addr} failed (attempt {attempt}/{attempts}): {error}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(error) => return Err(error),
            }
        };
        tracing::debug!("connected to {addr}");
        stream.set_nodelay(true)?;
        configure_keepalive(&stream)?;

        let (read_codec, _) = kind.codec();
        let (write_codec, tag) = kind.codec();
        let (mut encrypt, mut decrypt) = (None, None);
        if let Some(tag) = tag {
            let obfuscation = obfuscation::client(tag, kind.secret());
            stream.write_all(&obfuscation.header).await?;
            encrypt = Some(obfuscation.send);
            decrypt = Some(obfuscation.recv);
        }

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: ConnectionReader {
                io: read_half,
                codec: read_codec,
                decrypt,
                buffer: Vec::new(),
            },
            writer: ConnectionWriter {
                io: write_half,
                codec: write_codec,
                encrypt,
            },
        })
    }

    pub(crate) fn split(self) -> (ConnectionReader, ConnectionWriter) {
        (self.reader, self.writer)
    }
}

impl ConnectionReader {
    /// Waits for the next complete frame and returns its payload.
    pub(crate) async fn recv(&mut self) -> Result<Vec<u8>, InvocationError> {
        loop {
            match self.codec.unpack(&self.buffer) {
                Ok(unpacked) => {
                    let payload = self.buffer[unpacked.head..unpacked.tail].to_vec();
                    self.buffer.drain(..unpacked.consumed);
                    return Ok(payload);
                }
                Err(FrameError::MissingBytes(_)) => {
                    let mut chunk = [0u8; READ_CHUNK];
                    let n = self.io.read(&mut chunk).await?;
                    if n == 0 {
                        return Err(InvocationError::Io(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "connection closed by peer",
                        )));
                    }
                    if let Some(cipher) = &mut self.decrypt {
                        cipher.apply(&mut chunk[..n]);
                    }
                    self.buffer.extend_from_slice(&chunk[..n]);
                }
                Err(error) => return Err(InvocationError::Transport(error)),
            }
        }
    }
}

impl ConnectionWriter {
    /// Frames and sends one payload.
    pub(crate) async fn send(&mut self, payload: &[u8]) -> Result<(), InvocationError> {
        // 16 bytes of head room covers every framing preamble.
        let mut buffer = DequeBuffer::with_capacity(payload.len() + 16, 16);
        buffer.extend(payload.iter().copied());
        self.codec.pack(&mut buffer);
        let frame = buffer.as_mut();
        if let Some(cipher) = &mut self.encrypt {
            cipher.apply(frame);
        }
        self.io.write_all(frame).await?;
        Ok(())
    }
}

fn configure_keepalive(stream: &TcpStream) -> io::Result<()> {
    let keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(30));
    socket2::SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

//! Transport obfuscation (the "obfuscated2" scheme).
//!
//! Both directions run AES-256-CTR keyed from a random 64-byte header the
//! client sends first. Bytes 8..40 and 40..56 of the header form the send
//! key/iv; the byte-reversed 8..56 span forms the receive key/iv, so the two
//! keystreams never coincide. Bytes 56..60 carry the inner framing tag and
//! travel encrypted, as does everything after the header.

use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::sha256;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// One direction of the obfuscated stream.
pub struct ObfuscationCipher {
    inner: Aes256Ctr,
}

impl ObfuscationCipher {
    fn new(key: [u8; 32], iv: [u8; 16]) -> Self {
        Self { inner: Aes256Ctr::new(&key.into(), &iv.into()) }
    }

    /// Transform `data` in place, advancing the keystream.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }
}

/// Client-side handshake state: the header to transmit plus both ciphers,
/// already positioned past the header.
pub struct Obfuscation {
    /// The 64 bytes to send before any framed data.
    pub header: [u8; 64],
    /// Cipher for outgoing bytes.
    pub send: ObfuscationCipher,
    /// Cipher for incoming bytes.
    pub recv: ObfuscationCipher,
}

// Header prefixes that would make the stream look like another protocol
// (HTTP verbs, the plain framing preambles, the TLS-ish 0x02010316 record).
const FORBIDDEN_FIRST: [u32; 7] = [
    0x44414548, 0x54534f50, 0x20544547, 0x4954504f, 0xdddddddd, 0xeeeeeeee, 0x02010316,
];

/// Begin an obfuscated connection.
///
/// `protocol_tag` is the 4-byte tag of the framing carried inside (for
/// example `[0xef; 4]` for abridged). `secret` is an optional 16-byte proxy
/// secret folded into both keys.
pub fn client(protocol_tag: [u8; 4], secret: Option<&[u8; 16]>) -> Obfuscation {
    loop {
        let mut random = [0u8; 64];
        getrandom::getrandom(&mut random).expect("getrandom failed");
        if let Some(obfuscation) = do_client(&random, protocol_tag, secret) {
            return obfuscation;
        }
    }
}

pub(crate) fn do_client(
    random: &[u8; 64],
    protocol_tag: [u8; 4],
    secret: Option<&[u8; 16]>,
) -> Option<Obfuscation> {
    if random[0] == 0xef {
        return None;
    }
    let first = u32::from_le_bytes([random[0], random[1], random[2], random[3]]);
    if FORBIDDEN_FIRST.contains(&first) {
        return None;
    }
    let second = u32::from_le_bytes([random[4], random[5], random[6], random[7]]);
    if second == 0 {
        return None;
    }

    let mut header = *random;
    header[56..60].copy_from_slice(&protocol_tag);

    let (send_key, send_iv) = forward_keys(&header, secret);
    let (recv_key, recv_iv) = reversed_keys(&header, secret);
    let mut send = ObfuscationCipher::new(send_key, send_iv);
    let recv = ObfuscationCipher::new(recv_key, recv_iv);

    // The wire header keeps bytes 0..56 in the clear and takes 56..64 from
    // the encrypted copy; running the full 64 bytes through the cipher leaves
    // the keystream aligned with the payload that follows.
    let mut encrypted = header;
    send.apply(&mut encrypted);
    header[56..64].copy_from_slice(&encrypted[56..64]);

    Some(Obfuscation { header, send, recv })
}

/// Accept an obfuscated connection from its 64-byte header.
///
/// Returns the inner protocol tag plus `(send, recv)` ciphers for the
/// accepting side. `None` means the header failed to decode under `secret`.
pub fn accept(
    header: &[u8; 64],
    secret: Option<&[u8; 16]>,
) -> Option<([u8; 4], ObfuscationCipher, ObfuscationCipher)> {
    // Roles mirror the client: our receive direction is keyed the way the
    // client keyed its send direction, and vice versa.
    let (recv_key, recv_iv) = forward_keys(header, secret);
    let (send_key, send_iv) = reversed_keys(header, secret);
    let mut recv = ObfuscationCipher::new(recv_key, recv_iv);
    let send = ObfuscationCipher::new(send_key, send_iv);

    let mut decrypted = *header;
    recv.apply(&mut decrypted);

    let mut tag = [0u8; 4];
    tag.copy_from_slice(&decrypted[56..60]);
    Some((tag, send, recv))
}

fn forward_keys(header: &[u8; 64], secret: Option<&[u8; 16]>) -> ([u8; 32], [u8; 16]) {
    let mut key = [0u8; 32];
    key.copy_from_slice(&header[8..40]);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&header[40..56]);
    (fold_secret(key, secret), iv)
}

fn reversed_keys(header: &[u8; 64], secret: Option<&[u8; 16]>) -> ([u8; 32], [u8; 16]) {
    let mut span = [0u8; 48];
    span.copy_from_slice(&header[8..56]);
    span.reverse();

    let mut key = [0u8; 32];
    key.copy_from_slice(&span[..32]);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&span[32..]);
    (fold_secret(key, secret), iv)
}

fn fold_secret(key: [u8; 32], secret: Option<&[u8; 16]>) -> [u8; 32] {
    match secret {
        Some(secret) => sha256!(&key, secret),
        None => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_random() -> [u8; 64] {
        std::array::from_fn(|i| (i as u8).wrapping_mul(31).wrapping_add(5))
    }

    #[test]
    fn rejects_lookalike_headers() {
        let mut random = [1u8; 64];
        random[0] = 0xef;
        assert!(do_client(&random, [0xef; 4], None).is_none());

        let mut random = [1u8; 64];
        random[..4].copy_from_slice(&0xeeeeeeeeu32.to_le_bytes());
        assert!(do_client(&random, [0xef; 4], None).is_none());

        let mut random = [1u8; 64];
        random[4..8].fill(0);
        assert!(do_client(&random, [0xef; 4], None).is_none());
    }

    #[test]
    fn header_hides_the_protocol_tag() {
        let obf = do_client(&fixed_random(), [0xee; 4], None).unwrap();
        assert_ne!(obf.header[56..60], [0xee; 4]);
        assert_eq!(obf.header[..56], fixed_random()[..56]);
    }

    #[test]
    fn accept_recovers_tag_and_pairs_with_client() {
        let mut client_side = do_client(&fixed_random(), [0xee; 4], None).unwrap();
        let (tag, mut server_send, mut server_recv) =
            accept(&client_side.header, None).unwrap();
        assert_eq!(tag, [0xee; 4]);

        // client → server
        let mut frame = *b"intermediate len";
        client_side.send.apply(&mut frame);
        server_recv.apply(&mut frame);
        assert_eq!(&frame, b"intermediate len");

        // server → client
        let mut reply = *b"response payload";
        server_send.apply(&mut reply);
        client_side.recv.apply(&mut reply);
        assert_eq!(&reply, b"response payload");
    }

    #[test]
    fn secret_changes_both_keystreams() {
        let plain = do_client(&fixed_random(), [0xef; 4], None).unwrap();
        let secret = [9u8; 16];
        let with_secret = do_client(&fixed_random(), [0xef; 4], Some(&secret)).unwrap();
        assert_ne!(plain.header[56..64], with_secret.header[56..64]);
    }
}

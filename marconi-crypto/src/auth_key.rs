//! The 256-byte authorization key shared with one data-center.

use crate::sha1;

/// A 2048-bit authorization key plus its pre-computed identifiers.
///
/// The key itself never changes once derived; both identifiers come from a
/// single SHA-1 of the raw key material.
#[derive(Clone)]
pub struct AuthKey {
    pub(crate) data: [u8; 256],
    pub(crate) aux_hash: [u8; 8],
    pub(crate) key_id: [u8; 8],
}

impl AuthKey {
    /// Construct from the raw 256-byte DH output.
    pub fn from_bytes(data: [u8; 256]) -> Self {
        let sha = sha1!(&data);
        let mut aux_hash = [0u8; 8];
        aux_hash.copy_from_slice(&sha[..8]);
        let mut key_id = [0u8; 8];
        key_id.copy_from_slice(&sha[12..20]);
        Self { data, aux_hash, key_id }
    }

    /// The raw 256-byte key material.
    pub fn to_bytes(&self) -> [u8; 256] {
        self.data
    }

    /// The 8-byte identifier (SHA-1(key)[12..20]) that tags encrypted frames.
    pub fn key_id(&self) -> [u8; 8] {
        self.key_id
    }

    /// New-nonce hash used to verify `dh_gen_ok` / `dh_gen_retry` /
    /// `dh_gen_fail`; `number` is 1, 2 or 3 respectively.
    pub fn calc_new_nonce_hash(&self, new_nonce: &[u8; 32], number: u8) -> [u8; 16] {
        let mut data = [0u8; 41];
        data[..32].copy_from_slice(new_nonce);
        data[32] = number;
        data[33..].copy_from_slice(&self.aux_hash);

        let sha = sha1!(&data);
        let mut out = [0u8; 16];
        out.copy_from_slice(&sha[4..]);
        out
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthKey(id={})", u64::from_le_bytes(self.key_id))
    }
}

impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool {
        self.key_id == other.key_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_come_from_one_sha1() {
        let key = AuthKey::from_bytes(std::array::from_fn(|i| i as u8));
        let sha = sha1!(&key.to_bytes());
        assert_eq!(key.aux_hash, sha[..8]);
        assert_eq!(key.key_id(), sha[12..20]);
    }

    #[test]
    fn nonce_hash_depends_on_number() {
        let key = AuthKey::from_bytes([7u8; 256]);
        let nonce = [3u8; 32];
        assert_ne!(
            key.calc_new_nonce_hash(&nonce, 1),
            key.calc_new_nonce_hash(&nonce, 2)
        );
    }
}

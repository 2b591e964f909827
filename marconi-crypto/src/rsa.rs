//! RSA public keys and the handshake payload encryption.
//!
//! The key exchange encrypts exactly one payload with RSA: the PQ-proof inner
//! data. The server advertises fingerprints of the keys it will accept and
//! the client picks the first one it knows from an explicit [`Keyring`];
//! there is no process-wide key registry.

use num_bigint::BigUint;

use crate::sha1;

/// An RSA public key `(n, e)`.
pub struct Key {
    n: BigUint,
    e: BigUint,
}

impl Key {
    /// Parse decimal `n` and `e` strings.
    pub fn new(n: &str, e: &str) -> Option<Self> {
        Some(Self {
            n: BigUint::parse_bytes(n.as_bytes(), 10)?,
            e: BigUint::parse_bytes(e.as_bytes(), 10)?,
        })
    }
}

/// Immutable fingerprint → public-key table used during key exchange.
pub struct Keyring {
    keys: Vec<(i64, Key)>,
}

impl Keyring {
    /// Build a keyring from explicit `(fingerprint, key)` pairs.
    pub fn new(keys: Vec<(i64, Key)>) -> Self {
        Self { keys }
    }

    /// The built-in production and test data-center keys.
    pub fn known() -> Self {
        let production = Key::new(
            "29379598170669337022986177149456128565388431120058863768162556424047512191330847455146576344487764408661701890505066208632169112269581063774293102577308490531282748465986139880977280302242772832972539403531316010870401287642763009136156734339538042419388722777357134487746169093539093850251243897188928735903389451772730245253062963384108812842079887538976360465290946139638691491496062099570836476454855996319192747663615955633778034897140982517446405334423701359108810182097749467210509584293428076654573384828809574217079944388301239431309115013843331317877374435868468779972014486325557807783825502498215169806323",
            "65537",
        );
        let test = Key::new(
            "25342889448840415564971689590713473206898847759084779052582026594546022463853940585885215951168491965708222649399180603818074200620463776135424884632162512403163793083921641631564740959529419359595852941166848940585952337613333022396096584117954892216031229237302943701877588456738335398602461675225081791820393153757504952636234951323237820036543581047826906120927972487366805292115792231423684261262330394324750785450942589751755390156647751460719351439969059949569615302809050721500330239005077889855323917509948255722081644689442127297605422579707142646660768825302832201908302295573257427896031830742328565032949",
            "65537",
        );
        let mut keys = Vec::with_capacity(2);
        if let Some(key) = production {
            keys.push((-3414540481677951611, key));
        }
        if let Some(key) = test {
            keys.push((-5595554452916591101, key));
        }
        Self { keys }
    }

    /// Look up a key by fingerprint.
    pub fn get(&self, fingerprint: i64) -> Option<&Key> {
        self.keys
            .iter()
            .find(|(fp, _)| *fp == fingerprint)
            .map(|(_, key)| key)
    }

    /// Pick the first server-offered fingerprint present in this ring,
    /// preserving the server's preference order.
    pub fn first_match(&self, fingerprints: &[i64]) -> Option<(i64, &Key)> {
        fingerprints
            .iter()
            .find_map(|&fp| self.get(fp).map(|key| (fp, key)))
    }
}

/// RSA-encrypt a handshake payload.
///
/// The plaintext block is `SHA1(data) ‖ data ‖ random padding` brought up to
/// 255 bytes, interpreted big-endian and raised to `e` mod `n`; the result is
/// emitted as exactly 256 bytes. `random_bytes` supplies the padding.
pub fn encrypt_hashed(data: &[u8], key: &Key, random_bytes: &[u8; 256]) -> Vec<u8> {
    assert!(data.len() + 20 <= 255, "payload too large for one RSA block");

    let mut data_with_hash = Vec::with_capacity(255);
    data_with_hash.extend_from_slice(&sha1!(data));
    data_with_hash.extend_from_slice(data);
    let padding = 255 - data_with_hash.len();
    data_with_hash.extend_from_slice(&random_bytes[..padding]);

    let payload = BigUint::from_bytes_be(&data_with_hash);
    let encrypted = payload.modpow(&key.e, &key.n);

    let mut block = encrypted.to_bytes_be();
    while block.len() < 256 {
        block.insert(0, 0);
    }
    block
}

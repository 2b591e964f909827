//! Durable session state and the places it can live.
//!
//! A [`StoredSession`] records the home data-center, which network it
//! belongs to and one entry per data-center the session has negotiated
//! an authorization key with. Losing it means redoing key exchange;
//! corrupting the test/production marker would mean reusing a key on
//! the wrong network, so the marker is part of the record.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

// ─── StoredSession ───────────────────────────────────────────────────────────

/// Credentials for one data-center.
#[derive(Clone, Debug)]
pub struct DcEntry {
    /// The data-center these credentials belong to.
    pub dc_id: i32,
    /// Negotiated authorization key, if key exchange has run.
    pub auth_key: Option<[u8; 256]>,
    /// Last server salt seen on this data-center.
    pub first_salt: i64,
    /// Clock skew in seconds relative to this data-center.
    pub time_offset: i32,
}

/// Who this session is signed in as.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UserMarker {
    /// The user id reported at sign-in.
    pub id: i64,
    /// Whether the session belongs to a bot.
    pub bot: bool,
}

/// Everything worth keeping between runs.
#[derive(Clone, Debug)]
pub struct StoredSession {
    /// The data-center this session lives on.
    pub home_dc_id: i32,
    /// Keys negotiated on the test network never work on production.
    pub test_mode: bool,
    /// Set once sign-in succeeds; cleared on logout.
    pub user: Option<UserMarker>,
    /// Per data-center credentials.
    pub dcs: Vec<DcEntry>,
}

impl StoredSession {
    /// A session that has never connected.
    pub fn fresh(home_dc_id: i32, test_mode: bool) -> Self {
        Self {
            home_dc_id,
            test_mode,
            user: None,
            dcs: Vec::new(),
        }
    }

    /// Credentials for `dc_id`, if any were stored.
    pub fn entry(&self, dc_id: i32) -> Option<&DcEntry> {
        self.dcs.iter().find(|dc| dc.dc_id == dc_id)
    }

    /// Credentials for `dc_id`, created blank when missing.
    pub fn entry_mut(&mut self, dc_id: i32) -> &mut DcEntry {
        if let Some(pos) = self.dcs.iter().position(|dc| dc.dc_id == dc_id) {
            &mut self.dcs[pos]
        } else {
            self.dcs.push(DcEntry {
                dc_id,
                auth_key: None,
                first_salt: 0,
                time_offset: 0,
            });
            let last = self.dcs.len() - 1;
            &mut self.dcs[last]
        }
    }

    /// Serializes into the flat little-endian record format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32 + self.dcs.len() * 280);
        out.extend_from_slice(&self.home_dc_id.to_le_bytes());
        out.push(u8::from(self.test_mode));
        match self.user {
            Some(user) => {
                out.push(1);
                out.extend_from_slice(&user.id.to_le_bytes());
                out.push(u8::from(user.bot));
            }
            None => out.push(0),
        }
        out.push(self.dcs.len() as u8);
        for dc in &self.dcs {
            out.extend_from_slice(&dc.dc_id.to_le_bytes());
            match &dc.auth_key {
                Some(key) => {
                    out.push(1);
                    out.extend_from_slice(key);
                }
                None => out.push(0),
            }
            out.extend_from_slice(&dc.first_salt.to_le_bytes());
            out.extend_from_slice(&dc.time_offset.to_le_bytes());
        }
        out
    }

    /// Parses the format written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut pos = 0usize;
        macro_rules! r {
            ($n:expr) => {{
                let end = pos + $n;
                if end > bytes.len() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "truncated session",
                    ));
                }
                let slice = &bytes[pos..end];
                pos = end;
                slice
            }};
        }

        let home_dc_id = i32::from_le_bytes(r!(4).try_into().unwrap());
        let test_mode = r!(1)[0] != 0;
        let user = if r!(1)[0] != 0 {
            let id = i64::from_le_bytes(r!(8).try_into().unwrap());
            let bot = r!(1)[0] != 0;
            Some(UserMarker { id, bot })
        } else {
            None
        };
        let count = r!(1)[0] as usize;
        let mut dcs = Vec::with_capacity(count);
        for _ in 0..count {
            let dc_id = i32::from_le_bytes(r!(4).try_into().unwrap());
            let auth_key = if r!(1)[0] != 0 {
                Some(<[u8; 256]>::try_from(r!(256)).unwrap())
            } else {
                None
            };
            let first_salt = i64::from_le_bytes(r!(8).try_into().unwrap());
            let time_offset = i32::from_le_bytes(r!(4).try_into().unwrap());
            dcs.push(DcEntry {
                dc_id,
                auth_key,
                first_salt,
                time_offset,
            });
        }
        Ok(Self {
            home_dc_id,
            test_mode,
            user,
            dcs,
        })
    }
}

// ─── SessionStore ────────────────────────────────────────────────────────────

/// Where a [`StoredSession`] is kept between runs.
pub trait SessionStore: Send + Sync {
    /// Persists the session, replacing whatever was there.
    fn save(&self, session: &StoredSession) -> io::Result<()>;
    /// Loads the stored session. `Ok(None)` when none exists yet.
    fn load(&self) -> io::Result<Option<StoredSession>>;
    /// Removes the stored session, if any.
    fn delete(&self) -> io::Result<()>;
    /// Short label for diagnostics.
    fn name(&self) -> &str;
}

/// Stores the session as a single binary file.
pub struct BinaryFileStore {
    path: PathBuf,
}

impl BinaryFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionStore for BinaryFileStore {
    fn save(&self, session: &StoredSession) -> io::Result<()> {
        std::fs::write(&self.path, session.to_bytes())
    }

    fn load(&self) -> io::Result<Option<StoredSession>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => StoredSession::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "binary-file"
    }
}

/// Keeps the session in memory only. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Option<StoredSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with an existing session.
    pub fn seeded(session: StoredSession) -> Self {
        Self {
            data: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, session: &StoredSession) -> io::Result<()> {
        *self.data.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> io::Result<Option<StoredSession>> {
        Ok(self.data.lock().unwrap().clone())
    }

    fn delete(&self) -> io::Result<()> {
        *self.data.lock().unwrap() = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredSession {
        StoredSession {
            home_dc_id: 2,
            test_mode: true,
            user: Some(UserMarker {
                id: 987654321,
                bot: false,
            }),
            dcs: vec![
                DcEntry {
                    dc_id: 2,
                    auth_key: Some([0xAB; 256]),
                    first_salt: -4398046511104,
                    time_offset: -17,
                },
                DcEntry {
                    dc_id: 4,
                    auth_key: None,
                    first_salt: 0,
                    time_offset: 3,
                },
            ],
        }
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let session = sample();
        let restored = StoredSession::from_bytes(&session.to_bytes()).unwrap();
        assert_eq!(restored.home_dc_id, 2);
        assert!(restored.test_mode);
        assert_eq!(restored.user, Some(UserMarker { id: 987654321, bot: false }));
        assert_eq!(restored.dcs.len(), 2);
        assert_eq!(restored.dcs[0].auth_key, Some([0xAB; 256]));
        assert_eq!(restored.dcs[0].first_salt, -4398046511104);
        assert_eq!(restored.dcs[0].time_offset, -17);
        assert_eq!(restored.dcs[1].auth_key, None);
        assert_eq!(restored.dcs[1].dc_id, 4);
    }

    #[test]
    fn truncated_bytes_are_invalid_data() {
        let bytes = sample().to_bytes();
        let error = StoredSession::from_bytes(&bytes[..bytes.len() - 3]).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn entry_mut_creates_blank_entries() {
        let mut session = StoredSession::fresh(2, false);
        assert!(session.entry(5).is_none());
        session.entry_mut(5).first_salt = 42;
        assert_eq!(session.entry(5).unwrap().first_salt, 42);
        assert_eq!(session.dcs.len(), 1);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&sample()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.home_dc_id, 2);
        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_round_trip() {
        let path = std::env::temp_dir().join(format!("marconi-session-{}", std::process::id()));
        let store = BinaryFileStore::new(&path);
        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
        store.save(&sample()).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.dcs[0].auth_key, Some([0xAB; 256]));
        store.delete().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}

//! Identity store backed by sled
//!
//! Holds the device id and wallet address under stable keys. Each value is a
//! single UTF-8 string, so no schema versioning is kept.

use sled::Db;
use std::path::Path;
use thiserror::Error;

const DEVICE_ID_KEY: &[u8] = b"identity:device_id";
const ADDRESS_KEY: &[u8] = b"identity:wallet_address";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Corrupt value under {key}: not valid UTF-8")]
    Corrupt { key: String },
}

/// Persistent device and wallet identifiers
#[derive(Clone)]
pub struct IdentityStore {
    db: Db,
    persistent: bool,
}

impl IdentityStore {
    /// Open or create the identity database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IdentityError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            persistent: true,
        })
    }

    /// Session-only store: identifiers live until the process exits
    pub fn ephemeral() -> Result<Self, IdentityError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            persistent: false,
        })
    }

    /// Open the store at `path`, falling back to an ephemeral one when the
    /// directory cannot be used.
    pub fn open_or_ephemeral<P: AsRef<Path>>(path: P) -> Result<Self, IdentityError> {
        match Self::open(path.as_ref()) {
            Ok(store) => Ok(store),
            Err(e) => {
                log::warn!(
                    "⚠️ Identity storage at {} unavailable ({}), identity will not survive this session",
                    path.as_ref().display(),
                    e
                );
                Self::ephemeral()
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Read the device id, creating and persisting one on first use.
    ///
    /// Creation is a compare-and-swap against an empty slot, so concurrent
    /// callers all observe the same id.
    pub fn get_or_create_device_id(&self) -> Result<String, IdentityError> {
        if let Some(existing) = self.read(DEVICE_ID_KEY)? {
            return Ok(existing);
        }

        let candidate = generate_device_id();
        match self.db.compare_and_swap(
            DEVICE_ID_KEY,
            None as Option<&[u8]>,
            Some(candidate.as_bytes()),
        )? {
            Ok(()) => {
                self.db.flush()?;
                log::info!("🆔 New device id created: {}", candidate);
                Ok(candidate)
            }
            Err(conflict) => {
                let current = conflict.current.ok_or_else(|| IdentityError::Corrupt {
                    key: key_name(DEVICE_ID_KEY),
                })?;
                decode(DEVICE_ID_KEY, &current)
            }
        }
    }

    pub fn get_persisted_address(&self) -> Result<Option<String>, IdentityError> {
        self.read(ADDRESS_KEY)
    }

    /// Store the wallet address, replacing any previous one
    pub fn persist_address(&self, address: &str) -> Result<(), IdentityError> {
        self.db.insert(ADDRESS_KEY, address.as_bytes())?;
        self.db.flush()?;
        log::debug!("💾 Wallet address persisted: {}", address);
        Ok(())
    }

    /// Forget the wallet address. The device id is kept.
    pub fn clear_address(&self) -> Result<(), IdentityError> {
        self.db.remove(ADDRESS_KEY)?;
        self.db.flush()?;
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Result<Option<String>, IdentityError> {
        match self.db.get(key)? {
            Some(data) => Ok(Some(decode(key, &data)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore")
            .field("persistent", &self.persistent)
            .finish()
    }
}

/// Random token plus a microsecond timestamp, e.g.
/// `device_3f9a0c1be24d_1729331234567890`
pub fn generate_device_id() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    let micros = chrono::Utc::now().timestamp_micros();
    format!("device_{}_{}", &token[..12], micros)
}

fn decode(key: &[u8], data: &[u8]) -> Result<String, IdentityError> {
    String::from_utf8(data.to_vec()).map_err(|_| IdentityError::Corrupt { key: key_name(key) })
}

fn key_name(key: &[u8]) -> String {
    String::from_utf8_lossy(key).to_string()
}

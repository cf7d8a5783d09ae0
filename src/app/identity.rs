//! Identity store: the agent's view of its persisted state.
//!
//! Wraps a [`StoragePort`] and owns every key in the `"ota"` namespace:
//!
//! | Key        | Type       | Meaning                                   |
//! |------------|------------|-------------------------------------------|
//! | `id`       | 32 bytes   | device id                                 |
//! | `key`      | 32 bytes   | device key                                |
//! | `signup`   | bool       | server acknowledged the identity          |
//! | `firmware` | string     | firmware track, settable at runtime       |
//! | `hash`     | string     | last successfully applied image           |
//!
//! Identity halves are written before anything uses them, so a crash after
//! generation never leaves a device talking to the server with an identity
//! it can't reproduce on the next boot.

use log::{debug, info};

use super::ports::{EntropyPort, StoragePort, StorageError};
use super::types::{
    DeviceIdentity, FIRMWARE_HASH_MAX_LEN, FIRMWARE_ID_MAX_LEN, FirmwareHash, FirmwareId,
    IDENTITY_LEN,
};
use crate::error::{Error, Result};

pub const NAMESPACE: &str = "ota";

const KEY_ID: &str = "id";
const KEY_SECRET: &str = "key";
const KEY_SIGNUP: &str = "signup";
const KEY_FIRMWARE: &str = "firmware";
const KEY_HASH: &str = "hash";

pub struct IdentityStore<S> {
    storage: S,
}

impl<S: StoragePort> IdentityStore<S> {
    /// Wrap `storage` and make sure the namespace exists.
    pub fn open(mut storage: S) -> Result<Self> {
        storage.create(NAMESPACE)?;
        Ok(Self { storage })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    // ── Identity ──────────────────────────────────────────────

    /// Load the persisted identity, generating and persisting whichever half
    /// is missing. Calling this twice yields the same identity.
    ///
    /// A freshly generated half means an identity the server has never
    /// acknowledged, so the signup flag is cleared before either is written.
    pub fn ensure_identity(&mut self, entropy: &mut impl EntropyPort) -> Result<DeviceIdentity> {
        let stored_id = self.read_half(KEY_ID)?;
        let stored_key = self.read_half(KEY_SECRET)?;
        if stored_id.is_none() || stored_key.is_none() {
            self.storage.write_bool(NAMESPACE, KEY_SIGNUP, false)?;
        }

        let id = match stored_id {
            Some(id) => id,
            None => {
                let id = generate(entropy);
                self.storage.write_bytes(NAMESPACE, KEY_ID, &id)?;
                info!("OTA: generated new device id");
                id
            }
        };

        let key = match stored_key {
            Some(key) => key,
            None => {
                let key = generate(entropy);
                self.storage.write_bytes(NAMESPACE, KEY_SECRET, &key)?;
                info!("OTA: generated new device key");
                key
            }
        };

        Ok(DeviceIdentity { id, key })
    }

    fn read_half(&self, key: &str) -> Result<Option<[u8; IDENTITY_LEN]>> {
        let mut buf = [0u8; IDENTITY_LEN];
        match self.storage.read_bytes(NAMESPACE, key, &mut buf)? {
            None => Ok(None),
            Some(IDENTITY_LEN) => Ok(Some(buf)),
            Some(len) => {
                debug!("NVS: '{}' has {} bytes, expected {}", key, len, IDENTITY_LEN);
                Err(Error::Storage(StorageError::InvalidLength))
            }
        }
    }

    // ── Registration ──────────────────────────────────────────

    pub fn is_registered(&self) -> Result<bool> {
        Ok(self
            .storage
            .read_bool(NAMESPACE, KEY_SIGNUP)?
            .unwrap_or(false))
    }

    /// Record the server's 201. There is no way back to `false` short of a
    /// new key.
    pub fn mark_registered(&mut self) -> Result<()> {
        self.storage.write_bool(NAMESPACE, KEY_SIGNUP, true)?;
        Ok(())
    }

    // ── Firmware track ────────────────────────────────────────

    pub fn firmware(&self) -> Result<Option<FirmwareId>> {
        let mut buf = [0u8; FIRMWARE_ID_MAX_LEN];
        match self.storage.read_str(NAMESPACE, KEY_FIRMWARE, &mut buf)? {
            Some(s) => Ok(Some(FirmwareId::new(s)?)),
            None => Ok(None),
        }
    }

    /// Persist the track to follow, or forget it with `None`.
    pub fn set_firmware(&mut self, firmware: Option<&FirmwareId>) -> Result<()> {
        match firmware {
            Some(id) => self
                .storage
                .write_str(NAMESPACE, KEY_FIRMWARE, id.as_str())?,
            None => self.storage.delete(NAMESPACE, KEY_FIRMWARE)?,
        }
        Ok(())
    }

    // ── Applied hash ──────────────────────────────────────────

    pub fn applied_hash(&self) -> Result<Option<FirmwareHash>> {
        let mut buf = [0u8; FIRMWARE_HASH_MAX_LEN];
        match self.storage.read_str(NAMESPACE, KEY_HASH, &mut buf)? {
            Some(s) => Ok(Some(FirmwareHash::new(s)?)),
            None => Ok(None),
        }
    }

    /// Only the agent's apply path calls this, after the installer reported
    /// a clean finish.
    pub(crate) fn commit_applied_hash(&mut self, hash: &FirmwareHash) -> Result<()> {
        self.storage.write_str(NAMESPACE, KEY_HASH, hash.as_str())?;
        Ok(())
    }

    /// Erase everything in the namespace (factory reset).
    pub fn purge(&mut self) -> Result<()> {
        self.storage.erase_all(NAMESPACE)?;
        Ok(())
    }
}

fn generate(entropy: &mut impl EntropyPort) -> [u8; IDENTITY_LEN] {
    let mut bytes = [0u8; IDENTITY_LEN];
    entropy.fill_bytes(&mut bytes);
    bytes
}

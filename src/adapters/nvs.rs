//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] for the update agent.
//!
//! # Notes
//!
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - Typed entries: blobs, strings and `u8` flags are stored with their
//!   native NVS types, so reading a key back with the wrong type is a
//!   [`StorageError::TypeMismatch`] on both backends.
//! - The device key lives in the `"ota"` namespace. Production builds
//!   should enable NVS encryption (`CONFIG_NVS_ENCRYPTION`); the API is
//!   the same either way.
//! - Names are limited to 15 bytes by NVS; longer names are rejected, not
//!   truncated.

use crate::app::ports::{StorageError, StoragePort};
use log::{debug, info};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::warn;

/// NVS key and namespace length limit, excluding the NUL terminator.
const NVS_NAME_MAX: usize = 15;

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Blob(Vec<u8>),
    Str(String),
    Flag(u8),
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Entry>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(StorageError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called before the
            // agent task starts, so nothing else is using NVS yet.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t
            {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK as esp_err_t {
                    return Err(StorageError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK as esp_err_t {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK as esp_err_t {
                return Err(StorageError::IoError);
            }
            info!("NVS: ESP-IDF flash initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NVS: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: HashMap::new(),
        })
    }
}

/// NUL-terminated copy of a namespace or key name.
fn c_name(name: &str) -> Result<[u8; NVS_NAME_MAX + 1], StorageError> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > NVS_NAME_MAX || bytes.contains(&0) {
        return Err(StorageError::InvalidValue);
    }
    let mut buf = [0u8; NVS_NAME_MAX + 1];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl NvsAdapter {
    fn composite_key(namespace: &str, key: &str) -> Result<String, StorageError> {
        c_name(namespace)?;
        c_name(key)?;
        Ok(format!("{}::{}", namespace, key))
    }

    fn get(&self, namespace: &str, key: &str) -> Result<Option<&Entry>, StorageError> {
        Ok(self.store.get(&Self::composite_key(namespace, key)?))
    }

    fn put(&mut self, namespace: &str, key: &str, entry: Entry) -> Result<(), StorageError> {
        let composite = Self::composite_key(namespace, key)?;
        self.store.insert(composite, entry);
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl StoragePort for NvsAdapter {
    fn create(&mut self, namespace: &str) -> Result<(), StorageError> {
        // Namespaces are implicit in the composite key.
        c_name(namespace)?;
        debug!("NVS: namespace '{}' ready (simulation)", namespace);
        Ok(())
    }

    fn read_bytes(
        &self,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<Option<usize>, StorageError> {
        match self.get(namespace, key)? {
            None => Ok(None),
            Some(Entry::Blob(data)) => {
                let dst = buf.get_mut(..data.len()).ok_or(StorageError::InvalidLength)?;
                dst.copy_from_slice(data);
                Ok(Some(data.len()))
            }
            Some(_) => Err(StorageError::TypeMismatch),
        }
    }

    fn write_bytes(
        &mut self,
        namespace: &str,
        key: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        self.put(namespace, key, Entry::Blob(data.to_vec()))
    }

    fn read_str<'b>(
        &self,
        namespace: &str,
        key: &str,
        buf: &'b mut [u8],
    ) -> Result<Option<&'b str>, StorageError> {
        match self.get(namespace, key)? {
            None => Ok(None),
            Some(Entry::Str(s)) => {
                let dst = buf.get_mut(..s.len()).ok_or(StorageError::InvalidLength)?;
                dst.copy_from_slice(s.as_bytes());
                core::str::from_utf8(dst)
                    .map(Some)
                    .map_err(|_| StorageError::InvalidValue)
            }
            Some(_) => Err(StorageError::TypeMismatch),
        }
    }

    fn write_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        if value.as_bytes().contains(&0) {
            return Err(StorageError::InvalidValue);
        }
        self.put(namespace, key, Entry::Str(value.into()))
    }

    fn read_bool(&self, namespace: &str, key: &str) -> Result<Option<bool>, StorageError> {
        match self.get(namespace, key)? {
            None => Ok(None),
            Some(Entry::Flag(v)) => Ok(Some(*v != 0)),
            Some(_) => Err(StorageError::TypeMismatch),
        }
    }

    fn write_bool(&mut self, namespace: &str, key: &str, value: bool) -> Result<(), StorageError> {
        self.put(namespace, key, Entry::Flag(u8::from(value)))
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let composite = Self::composite_key(namespace, key)?;
        self.store.remove(&composite);
        Ok(())
    }

    fn erase_all(&mut self, namespace: &str) -> Result<(), StorageError> {
        c_name(namespace)?;
        let prefix = format!("{}::", namespace);
        self.store.retain(|k, _| !k.starts_with(&prefix));
        info!("NVS: erased namespace '{}' (simulation)", namespace);
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl NvsAdapter {
    /// Open an NVS namespace, execute a closure with the handle, then close.
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, esp_err_t>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
    {
        let ns_buf = c_name(namespace).map_err(|_| ESP_ERR_NVS_INVALID_NAME as esp_err_t)?;

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK as esp_err_t {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    /// Run a write closure and commit.
    fn write_with<F>(namespace: &str, key: &str, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(nvs_handle_t, *const core::ffi::c_char) -> esp_err_t,
    {
        let key_buf = c_name(key)?;
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            let ret = f(handle, key_buf.as_ptr() as *const _);
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| {
            warn!("NVS: write of '{}::{}' failed ({})", namespace, key, e);
            storage_error(e)
        })
    }

    /// Run a read closure; "not found" (key or namespace) becomes `None`.
    fn read_with<F, T>(namespace: &str, key: &str, f: F) -> Result<Option<T>, StorageError>
    where
        F: FnOnce(nvs_handle_t, *const core::ffi::c_char) -> Result<T, esp_err_t>,
    {
        let key_buf = c_name(key)?;
        match Self::with_nvs_handle(namespace, false, |handle| {
            f(handle, key_buf.as_ptr() as *const _)
        }) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND as esp_err_t => Ok(None),
            Err(e) => Err(storage_error(e)),
        }
    }
}

#[cfg(target_os = "espidf")]
fn storage_error(code: esp_err_t) -> StorageError {
    if code == ESP_ERR_NVS_INVALID_LENGTH as esp_err_t {
        StorageError::InvalidLength
    } else if code == ESP_ERR_NVS_TYPE_MISMATCH as esp_err_t {
        StorageError::TypeMismatch
    } else if code == ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t {
        StorageError::Full
    } else if code == ESP_ERR_NVS_INVALID_NAME as esp_err_t
        || code == ESP_ERR_NVS_KEY_TOO_LONG as esp_err_t
        || code == ESP_ERR_NVS_VALUE_TOO_LONG as esp_err_t
    {
        StorageError::InvalidValue
    } else {
        StorageError::IoError
    }
}

#[cfg(target_os = "espidf")]
impl StoragePort for NvsAdapter {
    fn create(&mut self, namespace: &str) -> Result<(), StorageError> {
        // Opening read-write creates the namespace if it doesn't exist.
        Self::with_nvs_handle(namespace, true, |_| Ok(())).map_err(storage_error)?;
        debug!("NVS: namespace '{}' ready", namespace);
        Ok(())
    }

    fn read_bytes(
        &self,
        namespace: &str,
        key: &str,
        buf: &mut [u8],
    ) -> Result<Option<usize>, StorageError> {
        Self::read_with(namespace, key, |handle, key| {
            // First call: get size
            let mut size: usize = 0;
            let ret = unsafe { nvs_get_blob(handle, key, core::ptr::null_mut(), &mut size) };
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            if size > buf.len() {
                return Err(ESP_ERR_NVS_INVALID_LENGTH as esp_err_t);
            }
            let ret = unsafe { nvs_get_blob(handle, key, buf.as_mut_ptr() as *mut _, &mut size) };
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            Ok(size)
        })
    }

    fn write_bytes(
        &mut self,
        namespace: &str,
        key: &str,
        data: &[u8],
    ) -> Result<(), StorageError> {
        Self::write_with(namespace, key, |handle, key| unsafe {
            nvs_set_blob(handle, key, data.as_ptr() as *const _, data.len())
        })
    }

    fn read_str<'b>(
        &self,
        namespace: &str,
        key: &str,
        buf: &'b mut [u8],
    ) -> Result<Option<&'b str>, StorageError> {
        // NVS reports string sizes including the NUL terminator.
        let len = Self::read_with(namespace, key, |handle, key| {
            let mut size: usize = 0;
            let ret = unsafe { nvs_get_str(handle, key, core::ptr::null_mut(), &mut size) };
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            if size == 0 || size - 1 > buf.len() {
                return Err(ESP_ERR_NVS_INVALID_LENGTH as esp_err_t);
            }
            let mut tmp = vec![0u8; size];
            let ret = unsafe { nvs_get_str(handle, key, tmp.as_mut_ptr() as *mut _, &mut size) };
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            let text_len = size.saturating_sub(1);
            buf[..text_len].copy_from_slice(&tmp[..text_len]);
            Ok(text_len)
        })?;

        match len {
            None => Ok(None),
            Some(n) => core::str::from_utf8(&buf[..n])
                .map(Some)
                .map_err(|_| StorageError::InvalidValue),
        }
    }

    fn write_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        if value.as_bytes().contains(&0) {
            return Err(StorageError::InvalidValue);
        }
        let mut c_value = Vec::with_capacity(value.len() + 1);
        c_value.extend_from_slice(value.as_bytes());
        c_value.push(0);
        Self::write_with(namespace, key, |handle, key| unsafe {
            nvs_set_str(handle, key, c_value.as_ptr() as *const _)
        })
    }

    fn read_bool(&self, namespace: &str, key: &str) -> Result<Option<bool>, StorageError> {
        Self::read_with(namespace, key, |handle, key| {
            let mut v: u8 = 0;
            let ret = unsafe { nvs_get_u8(handle, key, &mut v) };
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            Ok(v != 0)
        })
    }

    fn write_bool(&mut self, namespace: &str, key: &str, value: bool) -> Result<(), StorageError> {
        Self::write_with(namespace, key, |handle, key| unsafe {
            nvs_set_u8(handle, key, u8::from(value))
        })
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        Self::write_with(namespace, key, |handle, key| {
            let ret = unsafe { nvs_erase_key(handle, key) };
            if ret == ESP_ERR_NVS_NOT_FOUND as esp_err_t {
                ESP_OK as esp_err_t
            } else {
                ret
            }
        })
    }

    fn erase_all(&mut self, namespace: &str) -> Result<(), StorageError> {
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            let ret = unsafe { nvs_erase_all(handle) };
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK as esp_err_t {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(storage_error)?;
        info!("NVS: erased namespace '{}'", namespace);
        Ok(())
    }
}

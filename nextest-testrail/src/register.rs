// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A file-backed register shared by the processes of a test session.
//!
//! When tests are spread across several worker processes, each process drives its own
//! [`TestRailSession`](crate::session::TestRailSession). The processes agree on values that must be
//! unique per session (most importantly, the ID of a newly created run) through a small JSON
//! object on disk. Every key can be written once: the first writer wins, and later writers see the
//! stored value.
//!
//! The register consists of:
//!
//! - `store_<name>.json`, a JSON object with the stored keys.
//! - `store_<name>.json.lock`, a lock file held exclusively while the JSON file is read or written.

use crate::errors::{DuplicateKeyError, RegisterError};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use serde_json::{Map, Value};
use std::{fs::File, io, io::Write};
use tracing::debug;

/// The register key holding the ID of the run results are published to.
pub const RUN_ID_KEY: &str = "run_id";

/// The register key holding the ID of the plan results are published to.
pub const PLAN_ID_KEY: &str = "plan_id";

/// A write-once mapping of keys to JSON values, shared across processes through the filesystem.
///
/// The backing files are created lazily by the first write and removed by [`Register::clear`].
#[derive(Clone, Debug)]
pub struct Register {
    file_path: Utf8PathBuf,
    lock_path: Utf8PathBuf,
}

impl Register {
    /// Creates a register named `name` within `dir`.
    ///
    /// No files are created until a value is set.
    pub fn new(dir: &Utf8Path, name: &str) -> Self {
        let file_path = dir.join(format!("store_{name}.json"));
        let lock_path = dir.join(format!("store_{name}.json.lock"));
        Self {
            file_path,
            lock_path,
        }
    }

    /// Returns the path to the JSON file backing this register.
    pub fn file_path(&self) -> &Utf8Path {
        &self.file_path
    }

    /// Returns the path to the lock file.
    pub fn lock_path(&self) -> &Utf8Path {
        &self.lock_path
    }

    /// Acquires an exclusive lock on the register.
    ///
    /// Blocks until no other process holds the lock. The lock is released when the returned value
    /// is dropped, including on early returns and panics.
    pub fn lock(&self) -> Result<LockedRegister<'_>, RegisterError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|error| RegisterError::FileLock {
                path: self.lock_path.clone(),
                error,
            })?;

        // The lock is only held for as long as it takes to read or write a tiny file, or to create
        // a single run, so it's fine to block.
        file.lock().map_err(|error| RegisterError::FileLock {
            path: self.lock_path.clone(),
            error,
        })?;

        Ok(LockedRegister {
            register: self,
            locked_file: DebugIgnore(file),
        })
    }

    /// Returns a snapshot of all stored values.
    ///
    /// Returns an empty map if nothing has been stored yet.
    pub fn get_all(&self) -> Result<Map<String, Value>, RegisterError> {
        self.lock()?.get_all()
    }

    /// Stores `value` under `key`.
    ///
    /// Returns [`RegisterError::DuplicateKey`] if `key` already holds a value. The check and the
    /// write happen under a single lock acquisition.
    pub fn set_value(&self, key: &str, value: impl Into<Value>) -> Result<(), RegisterError> {
        self.lock()?.set_value(key, value)
    }

    /// Removes the register's files.
    ///
    /// Files that don't exist are ignored. Other errors are logged and otherwise ignored: a stale
    /// register is only a problem if the next session is started from the same directory.
    pub fn clear(&self) {
        for path in [&self.file_path, &self.lock_path] {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("removed register file `{path}`"),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => debug!("error removing register file `{path}`: {error}"),
            }
        }
    }
}

/// A [`Register`] that has been locked for exclusive access.
///
/// The lifetime parameter ensures this isn't held for longer than the corresponding [`Register`].
#[derive(Debug)]
pub struct LockedRegister<'reg> {
    register: &'reg Register,
    // Keeps the lock held until drop.
    #[expect(dead_code)]
    locked_file: DebugIgnore<File>,
}

impl LockedRegister<'_> {
    /// Returns a snapshot of all stored values.
    pub fn get_all(&self) -> Result<Map<String, Value>, RegisterError> {
        let path = &self.register.file_path;
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|error| RegisterError::Deserialize {
                    path: path.clone(),
                    error,
                })
            }
            // If the file doesn't exist, nothing has been stored yet.
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(error) => Err(RegisterError::Read {
                path: path.clone(),
                error,
            }),
        }
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<Value>, RegisterError> {
        Ok(self.get_all()?.remove(key).filter(is_set))
    }

    /// Stores `value` under `key`, keeping all other stored values.
    pub fn set_value(&self, key: &str, value: impl Into<Value>) -> Result<(), RegisterError> {
        let mut data = self.get_all()?;
        if data.get(key).is_some_and(is_set) {
            return Err(DuplicateKeyError::new(key).into());
        }
        data.insert(key.to_owned(), value.into());

        let path = &self.register.file_path;
        let json = serde_json::to_string(&data).map_err(|error| RegisterError::Serialize {
            path: path.clone(),
            error,
        })?;
        atomicwrites::AtomicFile::new(path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(json.as_bytes()))
            .map_err(|error| RegisterError::Write {
                path: path.clone(),
                error,
            })?;

        debug!("set register key `{key}` in `{path}`");
        Ok(())
    }
}

/// Returns true if a stored value counts as set.
///
/// Null, false, zero and empty values don't: a run ID of 0 means "no run".
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

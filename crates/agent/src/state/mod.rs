// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic read/write of named JSON-like documents under a state directory.
//!
//! `write` is crash-safe: serialize, write to a sibling temp file, fsync,
//! rename over the target. `append_line` is used only for append-only
//! logs and rotates by rewriting the tail through the same atomic path.
//! `with_lock` acquires a named advisory lock file, non-blocking, so the
//! session driver can skip a tick rather than hang behind another one.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{OrchestratorError, TaggedError};

/// Exclusive access to the documents living under `root`.
///
/// Mirrors the teacher's file-backed `EventLog`: no in-memory buffering,
/// every read goes to disk, every write is atomic.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

/// Guard returned by [`StateStore::with_lock`]; releases the advisory
/// lock on drop.
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn io_err(detail: impl Into<String>) -> anyhow::Error {
        TaggedError::new(OrchestratorError::StateIOError, detail).into()
    }

    /// Read and deserialize a named document. Returns `Ok(None)` when the
    /// document does not yet exist (a fresh state directory).
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<Option<T>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| Self::io_err(format!("read {}: {e}", path.display())))?;
        let value = serde_json::from_str(&contents)
            .map_err(|e| Self::io_err(format!("parse {}: {e}", path.display())))?;
        Ok(Some(value))
    }

    /// Serialize and atomically write a named document.
    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(value)
            .map_err(|e| Self::io_err(format!("serialize {name}: {e}")))?;
        self.write_raw(name, &contents)
    }

    /// Atomically write pre-serialized content to a named document. Used
    /// for non-JSON siblings (the shell-sourcable `context.env`, raw
    /// per-session logs) that still want the write-temp/fsync/rename
    /// guarantee every other document gets.
    pub fn write_raw(&self, name: &str, contents: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| Self::io_err(format!("create state dir: {e}")))?;
        let path = self.path_for(name);
        let tmp = self.root.join(format!("{name}.tmp.{}", std::process::id()));

        let mut file = File::create(&tmp)
            .map_err(|e| Self::io_err(format!("create temp for {name}: {e}")))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| Self::io_err(format!("write temp for {name}: {e}")))?;
        file.sync_all().map_err(|e| Self::io_err(format!("fsync temp for {name}: {e}")))?;
        drop(file);

        fs::rename(&tmp, &path)
            .map_err(|e| Self::io_err(format!("rename into {}: {e}", path.display())))?;
        Ok(())
    }

    /// Append one line to a named append-only log, creating it if absent.
    /// When `max_lines` is `Some(n)` and the log would exceed `n` lines
    /// after the append, it is rewritten to keep only the last `n`.
    pub fn append_line(&self, name: &str, line: &str, max_lines: Option<usize>) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| Self::io_err(format!("create state dir: {e}")))?;
        let path = self.path_for(name);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Self::io_err(format!("open {name} for append: {e}")))?;
        writeln!(file, "{line}").map_err(|e| Self::io_err(format!("append to {name}: {e}")))?;
        drop(file);

        if let Some(max) = max_lines {
            self.rotate_tail(name, max)?;
        }
        Ok(())
    }

    /// Read all lines of an append-only log (empty vec if absent).
    pub fn read_lines(&self, name: &str) -> anyhow::Result<Vec<String>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut contents = String::new();
        File::open(&path)
            .map_err(|e| Self::io_err(format!("open {name}: {e}")))?
            .read_to_string(&mut contents)
            .map_err(|e| Self::io_err(format!("read {name}: {e}")))?;
        Ok(contents.lines().map(str::to_owned).collect())
    }

    fn rotate_tail(&self, name: &str, max_lines: usize) -> anyhow::Result<()> {
        let lines = self.read_lines(name)?;
        if lines.len() <= max_lines {
            return Ok(());
        }
        let tail = &lines[lines.len() - max_lines..];
        let path = self.path_for(name);
        let tmp = self.root.join(format!("{name}.tmp.{}", std::process::id()));
        let mut file =
            File::create(&tmp).map_err(|e| Self::io_err(format!("rotate temp for {name}: {e}")))?;
        for line in tail {
            writeln!(file, "{line}").map_err(|e| Self::io_err(format!("rotate write {name}: {e}")))?;
        }
        file.sync_all().map_err(|e| Self::io_err(format!("rotate fsync {name}: {e}")))?;
        drop(file);
        fs::rename(&tmp, &path).map_err(|e| Self::io_err(format!("rotate rename {name}: {e}")))?;
        Ok(())
    }

    /// Acquire a non-blocking advisory lock named `name.lock`. Returns
    /// `Err(LockBusy)` immediately if another process holds it.
    pub fn with_lock(&self, name: &str) -> anyhow::Result<LockGuard> {
        fs::create_dir_all(&self.root)
            .map_err(|e| Self::io_err(format!("create state dir: {e}")))?;
        let path = self.root.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Self::io_err(format!("open lock {name}: {e}")))?;
        file.try_lock_exclusive()
            .map_err(|_| TaggedError::new(OrchestratorError::LockBusy, name.to_string()))?;
        Ok(LockGuard { file })
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

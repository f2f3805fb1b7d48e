// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Atomic file replacement.
//!
//! Content is written to a temporary sibling, synced, then renamed over the
//! target so readers observe either the old or the new file. Some targets cannot
//! be replaced by rename: `/etc/hosts` inside a container is a bind mount, where
//! rename fails with `EBUSY` (or `EXDEV`), and a read-only parent directory
//! cannot hold the temporary sibling at all. For those an existing target is
//! rewritten in place.

use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Replace `path` with `contents`.
///
/// The file is created if it does not exist. Existing permissions of the target
/// are carried over to the replacement.
///
/// # Errors
///
/// Returns the underlying I/O error if neither the rename nor the in-place
/// fallback succeeds.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    match replace_by_rename(path, contents) {
        Ok(()) => {
            debug!(path = %path.display(), bytes = contents.len(), "Replaced file atomically");
            Ok(())
        }
        Err(err) if rename_unsupported(&err) && path.exists() => {
            warn!(
                path = %path.display(),
                error = %err,
                "Target cannot be replaced by rename, rewriting in place"
            );
            write_in_place(path, contents)
        }
        Err(err) => Err(err),
    }
}

fn replace_by_rename(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".hosts-sync-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;

    if let Ok(metadata) = std::fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }

    tmp.persist(path).map(|_| ()).map_err(|err| err.error)
}

/// Rename refused (bind mount), or no temporary sibling could be created
/// (read-only parent directory).
fn rename_unsupported(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ResourceBusy
            | io::ErrorKind::CrossesDevices
            | io::ErrorKind::ReadOnlyFilesystem
            | io::ErrorKind::PermissionDenied
    )
}

fn write_in_place(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .create(true)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
#[path = "fs_util_tests.rs"]
mod fs_util_tests;

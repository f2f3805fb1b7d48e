// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hosts file adapter.
//!
//! [`HostsFile`] is the in-memory form of a hosts file between load and flush.
//! Lines are kept in their original order; lines that are never mutated are
//! written back exactly as they were read, including comments, blank lines and
//! anything that does not parse as `<address> <hostname>...`.
//!
//! [`HostsFileAdapter`] owns the file path and the managed address range and
//! serializes every load → mutate → flush transaction behind a mutex, since the
//! file itself has no application-level locking. Loads and flushes run on the
//! blocking thread pool.

use crate::errors::HostsError;
use crate::fs_util::write_atomic;
use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// An `<address> <hostname>...` line of the hosts file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostsEntry {
    pub address: IpAddr,
    pub hostnames: Vec<String>,
    /// Trailing `#` comment, without the leading `#`
    comment: Option<String>,
    /// Text and hostnames as read; the text is written back while they still match
    original: Option<(String, Vec<String>)>,
}

impl HostsEntry {
    fn new(address: IpAddr, hostname: &str) -> Self {
        Self {
            address,
            hostnames: vec![hostname.to_string()],
            comment: None,
            original: None,
        }
    }

    fn has(&self, hostname: &str) -> bool {
        self.hostnames
            .iter()
            .any(|h| h.eq_ignore_ascii_case(hostname))
    }

    /// Remove every listed hostname, returning whether anything was removed.
    fn strip<S: AsRef<str>>(&mut self, hostnames: &[S]) -> bool {
        let before = self.hostnames.len();
        self.hostnames.retain(|h| {
            !hostnames
                .iter()
                .any(|remove| h.eq_ignore_ascii_case(remove.as_ref()))
        });
        self.hostnames.len() != before
    }
}

impl fmt::Display for HostsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((raw, hostnames)) = &self.original {
            if *hostnames == self.hostnames {
                return f.write_str(raw);
            }
        }
        write!(f, "{}", self.address)?;
        for hostname in &self.hostnames {
            write!(f, " {hostname}")?;
        }
        if let Some(comment) = &self.comment {
            write!(f, " #{comment}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Line {
    /// Blank, comment, or unparseable line
    Verbatim(String),
    Entry(HostsEntry),
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Self::Verbatim(raw.to_string());
        }

        let (data, comment) = match trimmed.split_once('#') {
            Some((data, comment)) => (data, Some(comment.to_string())),
            None => (trimmed, None),
        };
        let mut fields = data.split_whitespace();
        let Some(Ok(address)) = fields.next().map(str::parse::<IpAddr>) else {
            return Self::Verbatim(raw.to_string());
        };

        let hostnames: Vec<String> = fields.map(str::to_string).collect();
        Self::Entry(HostsEntry {
            address,
            hostnames: hostnames.clone(),
            comment,
            original: Some((raw.to_string(), hostnames)),
        })
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verbatim(raw) => f.write_str(raw),
            Self::Entry(entry) => fmt::Display::fmt(entry, f),
        }
    }
}

/// In-memory representation of a hosts file.
#[derive(Clone, Debug)]
pub struct HostsFile {
    path: PathBuf,
    managed: IpNet,
    lines: Vec<Line>,
    trailing_newline: bool,
    dirty: bool,
}

impl HostsFile {
    /// Read and parse the hosts file at `path`.
    ///
    /// `managed` is the address range this daemon owns: a hostname moved by
    /// [`HostsFile::add`] is only unmapped from addresses inside it.
    ///
    /// # Errors
    ///
    /// Returns [`HostsError::Load`] if the file cannot be read.
    pub fn load(path: &Path, managed: IpNet) -> Result<Self, HostsError> {
        let content = std::fs::read_to_string(path).map_err(|source| HostsError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(path, managed, &content))
    }

    /// Parse hosts file content that was read from `path`.
    #[must_use]
    pub fn parse(path: &Path, managed: IpNet, content: &str) -> Self {
        let (lines, trailing_newline) = if content.is_empty() {
            (Vec::new(), true)
        } else {
            let body = content.strip_suffix('\n').unwrap_or(content);
            (
                body.split('\n').map(Line::parse).collect(),
                content.ends_with('\n'),
            )
        };

        Self {
            path: path.to_path_buf(),
            managed,
            lines,
            trailing_newline,
            dirty: false,
        }
    }

    /// Ensure `hostname` resolves to `address`.
    ///
    /// If the hostname is currently mapped to a different address inside the
    /// managed range, that stale mapping is removed first. Returns whether the
    /// in-memory state changed.
    pub fn add(&mut self, address: IpAddr, hostname: &str) -> bool {
        let managed = self.managed;
        let mut changed = self.strip_where(
            |entry| entry.address != address && managed.contains(&entry.address),
            &[hostname],
        );

        let already_mapped = self
            .entries()
            .any(|entry| entry.address == address && entry.has(hostname));
        if !already_mapped {
            let existing = self.lines.iter_mut().rev().find_map(|line| match line {
                Line::Entry(entry) if entry.address == address => Some(entry),
                _ => None,
            });
            match existing {
                Some(entry) => entry.hostnames.push(hostname.to_string()),
                None => self
                    .lines
                    .push(Line::Entry(HostsEntry::new(address, hostname))),
            }
            changed = true;
        }

        self.dirty |= changed;
        changed
    }

    /// Ensure none of `hostnames` is associated with `address`.
    ///
    /// Absent hostnames are ignored. Lines left without hostnames are dropped.
    /// Returns whether the in-memory state changed.
    pub fn remove<S: AsRef<str>>(&mut self, address: IpAddr, hostnames: &[S]) -> bool {
        let changed = self.strip_where(|entry| entry.address == address, hostnames);
        self.dirty |= changed;
        changed
    }

    /// Remove every entry whose address is inside `cidr`, whatever its hostnames.
    ///
    /// Comments and entries outside the range are left untouched. Returns the
    /// number of removed lines.
    pub fn purge_managed_range(&mut self, cidr: &IpNet) -> usize {
        let before = self.lines.len();
        self.lines.retain(|line| match line {
            Line::Entry(entry) => !cidr.contains(&entry.address),
            Line::Verbatim(_) => true,
        });
        let removed = before - self.lines.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Persist the in-memory state back to the file.
    ///
    /// # Errors
    ///
    /// Returns [`HostsError::Flush`] if the file cannot be written.
    pub fn flush(&mut self) -> Result<(), HostsError> {
        write_atomic(&self.path, self.to_string().as_bytes()).map_err(|source| {
            HostsError::Flush {
                path: self.path.clone(),
                source,
            }
        })?;
        self.dirty = false;
        Ok(())
    }

    /// Whether there are mutations that have not been flushed yet.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All address entries in file order.
    pub fn entries(&self) -> impl Iterator<Item = &HostsEntry> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry(entry) => Some(entry),
            Line::Verbatim(_) => None,
        })
    }

    /// Addresses `hostname` is currently mapped to, in file order.
    #[must_use]
    pub fn addresses_of(&self, hostname: &str) -> Vec<IpAddr> {
        self.entries()
            .filter(|entry| entry.has(hostname))
            .map(|entry| entry.address)
            .collect()
    }

    fn strip_where<S, P>(&mut self, matches: P, hostnames: &[S]) -> bool
    where
        S: AsRef<str>,
        P: Fn(&HostsEntry) -> bool,
    {
        let mut changed = false;
        self.lines.retain_mut(|line| match line {
            Line::Entry(entry) if matches(entry) => {
                if entry.strip(hostnames) {
                    changed = true;
                    !entry.hostnames.is_empty()
                } else {
                    true
                }
            }
            _ => true,
        });
        changed
    }
}

impl fmt::Display for HostsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, line) in self.lines.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            fmt::Display::fmt(line, f)?;
        }
        if self.trailing_newline && !self.lines.is_empty() {
            f.write_str("\n")?;
        }
        Ok(())
    }
}

/// Serialized access to the hosts file shared by every watch driver.
#[derive(Debug)]
pub struct HostsFileAdapter {
    path: PathBuf,
    managed: IpNet,
    /// Held for the whole of every transaction; `true` once closed
    closed: Mutex<bool>,
}

impl HostsFileAdapter {
    #[must_use]
    pub fn new(path: PathBuf, managed: IpNet) -> Self {
        Self {
            path,
            managed,
            closed: Mutex::new(false),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn managed_range(&self) -> IpNet {
        self.managed
    }

    /// Run `apply` against a freshly loaded copy of the file and flush the result
    /// if it changed anything.
    ///
    /// Returns `Ok(None)` without touching the file once the adapter has been
    /// closed by [`HostsFileAdapter::close_and_purge`].
    ///
    /// # Errors
    ///
    /// Returns a [`HostsError`] when loading or flushing fails; nothing is
    /// persisted in that case.
    pub async fn transaction<F, R>(&self, apply: F) -> Result<Option<R>, HostsError>
    where
        F: FnOnce(&mut HostsFile) -> R,
    {
        let closed = self.closed.lock().await;
        if *closed {
            debug!(path = %self.path.display(), "Hosts file adapter is closed, skipping update");
            return Ok(None);
        }

        let mut file = self.load().await?;
        let result = apply(&mut file);
        if file.is_dirty() {
            flush(file).await?;
            debug!(path = %self.path.display(), "Flushed hosts file");
        }
        Ok(Some(result))
    }

    /// Remove every managed entry and flush, keeping the adapter open.
    ///
    /// # Errors
    ///
    /// Returns a [`HostsError`] when loading or flushing fails.
    pub async fn purge(&self) -> Result<usize, HostsError> {
        let managed = self.managed;
        let removed = self
            .transaction(|file| file.purge_managed_range(&managed))
            .await?
            .unwrap_or(0);
        info!(
            path = %self.path.display(),
            range = %managed,
            removed,
            "Purged managed hosts entries"
        );
        Ok(removed)
    }

    /// Close the adapter, then remove every managed entry and flush.
    ///
    /// Transactions started after this call are skipped. Calling it again purges
    /// once more, which is a no-op on an already clean file.
    ///
    /// # Errors
    ///
    /// Returns a [`HostsError`] when loading or flushing fails. The adapter stays
    /// closed either way.
    pub async fn close_and_purge(&self) -> Result<usize, HostsError> {
        let mut closed = self.closed.lock().await;
        *closed = true;

        let mut file = self.load().await?;
        let removed = file.purge_managed_range(&self.managed);
        if file.is_dirty() {
            flush(file).await?;
        }
        info!(
            path = %self.path.display(),
            range = %self.managed,
            removed,
            "Closed hosts file adapter and purged managed entries"
        );
        Ok(removed)
    }

    async fn load(&self) -> Result<HostsFile, HostsError> {
        let path = self.path.clone();
        let managed = self.managed;
        tokio::task::spawn_blocking(move || HostsFile::load(&path, managed))
            .await
            .map_err(|err| HostsError::Load {
                path: self.path.clone(),
                source: err.into(),
            })?
    }
}

async fn flush(mut file: HostsFile) -> Result<(), HostsError> {
    let path = file.path().to_path_buf();
    tokio::task::spawn_blocking(move || file.flush())
        .await
        .map_err(|err| HostsError::Flush {
            path,
            source: err.into(),
        })?
}

#[cfg(test)]
#[path = "hosts_tests.rs"]
mod hosts_tests;

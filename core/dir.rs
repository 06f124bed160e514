// This file is part of the Divolte session-binning core.
// SPDX-License-Identifier: Apache-2.0

//! The remote append-only file system adapter (spec.md §4.3).
//!
//! This is deliberately narrow: `create`/`delete` on the directory, and
//! `hsync`/`write_all`/`close` on an open stream. The production remote
//! file system client (e.g. an HDFS client) is an external collaborator
//! out of scope for this core; [`LocalDir`] stands in for it so the sink
//! can be exercised against a real filesystem, and [`MockDir`] lets the
//! sink's own tests inject failures deterministically (mirroring the
//! teacher's pattern of mocking `db::dir::SampleFileDir` behind the
//! `DirWriter`/`FileWriter` traits for `db::writer::Syncer`'s tests).

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use base::{err, ErrorKind};

/// A directory on the remote append-only file system that can create new
/// files and delete old ones.
pub trait RemoteFs: Send + Sync + 'static {
    type Stream: RemoteStream;

    /// Creates `path` with the given replication factor and returns an open
    /// stream. Must succeed even when no storage node can currently persist
    /// data -- that's why an immediate `hsync` is required afterward (see
    /// [`RoundFile`](crate::writer::RoundFile) construction).
    fn create(&self, path: &str, replication: u32) -> Result<Self::Stream, base::Error>;

    /// Removes `path`. Safe to call on a path whose creation never
    /// succeeded in gaining durability.
    fn delete(&self, path: &str) -> Result<(), base::Error>;
}

/// An open, append-only stream on the remote file system.
pub trait RemoteStream: Send + 'static {
    /// Forces durability of everything written so far across storage
    /// replicas. Any failure here must be surfaced: spec.md §4.4 requires
    /// the sink to treat a failed `hsync` immediately after `create` as
    /// reason to delete the half-created file.
    fn hsync(&mut self) -> Result<(), base::Error>;

    /// Appends pre-encoded bytes; never validated by the writer above it.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), base::Error>;

    /// Closes the stream. Called on both success and failure paths.
    fn close(self) -> Result<(), base::Error>;
}

/// Wraps a [`RemoteStream`] with the minimal container framing spec.md
/// §4.3 calls for: pre-encoded rows concatenated as-is, with an explicit
/// block-boundary marker written only at `sync()`. Reimplementing the full
/// Avro container format is out of scope -- records arrive pre-encoded --
/// so the "container" here reduces to that one responsibility.
pub struct ContainerWriter<S: RemoteStream> {
    stream: S,
}

/// Marks a block boundary in the stand-in container format. An upstream
/// reader of the real Avro-based format would see a sync marker here
/// instead; this crate only needs *a* boundary marker so tests can assert
/// sync placement.
const BLOCK_BOUNDARY_MARKER: &[u8] = b"\x00";

impl<S: RemoteStream> ContainerWriter<S> {
    pub fn new(stream: S) -> Self {
        ContainerWriter { stream }
    }

    /// Appends one pre-encoded row.
    pub fn append_encoded(&mut self, bytes: &[u8]) -> Result<(), base::Error> {
        self.stream.write_all(bytes)
    }

    /// Closes the current block, so downstream readers see a boundary here.
    pub fn sync(&mut self) -> Result<(), base::Error> {
        self.stream.write_all(BLOCK_BOUNDARY_MARKER)
    }

    /// Forces durability of the underlying stream.
    pub fn hsync(&mut self) -> Result<(), base::Error> {
        self.stream.hsync()
    }

    pub fn close(self) -> Result<(), base::Error> {
        self.stream.close()
    }
}

/// A real, local-filesystem-backed [`RemoteFs`], standing in for the
/// production remote client.
#[derive(Clone)]
pub struct LocalDir {
    root: PathBuf,
}

impl LocalDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalDir { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

pub struct LocalStream {
    path: PathBuf,
    file: std::fs::File,
}

impl RemoteFs for LocalDir {
    type Stream = LocalStream;

    fn create(&self, path: &str, _replication: u32) -> Result<Self::Stream, base::Error> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| base::Error::with_source(ErrorKind::Io, "mkdir -p", e))?;
        }
        let file = std::fs::File::create(&full)
            .map_err(|e| base::Error::with_source(ErrorKind::Io, format!("create {full:?}"), e))?;
        Ok(LocalStream { path: full, file })
    }

    fn delete(&self, path: &str) -> Result<(), base::Error> {
        let full = self.resolve(path);
        match std::fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(base::Error::with_source(
                ErrorKind::Io,
                format!("delete {full:?}"),
                e,
            )),
        }
    }
}

impl RemoteStream for LocalStream {
    fn hsync(&mut self) -> Result<(), base::Error> {
        self.file
            .sync_all()
            .map_err(|e| base::Error::with_source(ErrorKind::Io, format!("hsync {:?}", self.path), e))
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), base::Error> {
        self.file
            .write_all(bytes)
            .map_err(|e| base::Error::with_source(ErrorKind::Io, format!("write {:?}", self.path), e))
    }

    fn close(mut self) -> Result<(), base::Error> {
        self.file
            .flush()
            .map_err(|e| base::Error::with_source(ErrorKind::Io, format!("close {:?}", self.path), e))
    }
}

/// Which operation a [`MockDir`] should fail on next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailPoint {
    Create,
    Hsync,
    Append,
    Sync,
}

#[derive(Default)]
struct MockState {
    files: std::collections::HashMap<String, Vec<u8>>,
    deleted: Vec<String>,
    fail_once: Option<FailPoint>,
    fail_forever: Option<FailPoint>,
    create_calls: u32,
    hsync_calls: u32,
}

/// An in-memory [`RemoteFs`] that can be told to fail a specific operation,
/// used by the sink's own test suite to exercise Alive→Broken→Alive
/// deterministically (spec.md §8, "Broken-state behavior").
#[derive(Clone, Default)]
pub struct MockDir {
    state: Arc<Mutex<MockState>>,
}

impl MockDir {
    pub fn new() -> Self {
        MockDir::default()
    }

    /// The next (and only the next) matching operation will fail.
    pub fn fail_once(&self, point: FailPoint) {
        self.state.lock().unwrap().fail_once = Some(point);
    }

    /// Every matching operation will fail until cleared.
    pub fn fail_forever(&self, point: FailPoint) {
        self.state.lock().unwrap().fail_forever = Some(point);
    }

    pub fn clear_failures(&self) {
        let mut s = self.state.lock().unwrap();
        s.fail_once = None;
        s.fail_forever = None;
    }

    pub fn create_call_count(&self) -> u32 {
        self.state.lock().unwrap().create_calls
    }

    pub fn hsync_call_count(&self) -> u32 {
        self.state.lock().unwrap().hsync_calls
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().unwrap().files.contains_key(path)
    }

    pub fn was_deleted(&self, path: &str) -> bool {
        self.state.lock().unwrap().deleted.iter().any(|p| p == path)
    }

    pub fn deleted_count(&self) -> usize {
        self.state.lock().unwrap().deleted.len()
    }

    fn should_fail(&self, point: FailPoint) -> bool {
        let mut s = self.state.lock().unwrap();
        if s.fail_once == Some(point) {
            s.fail_once = None;
            return true;
        }
        s.fail_forever == Some(point)
    }
}

impl RemoteFs for MockDir {
    type Stream = MockStream;

    fn create(&self, path: &str, _replication: u32) -> Result<Self::Stream, base::Error> {
        {
            let mut s = self.state.lock().unwrap();
            s.create_calls += 1;
        }
        if self.should_fail(FailPoint::Create) {
            return Err(err!(RemoteIo, "mock create failure for {}", path));
        }
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), Vec::new());
        Ok(MockStream {
            dir: self.clone(),
            path: path.to_string(),
        })
    }

    fn delete(&self, path: &str) -> Result<(), base::Error> {
        let mut s = self.state.lock().unwrap();
        s.files.remove(path);
        s.deleted.push(path.to_string());
        Ok(())
    }
}

pub struct MockStream {
    dir: MockDir,
    path: String,
}

impl RemoteStream for MockStream {
    fn hsync(&mut self) -> Result<(), base::Error> {
        {
            let mut s = self.dir.state.lock().unwrap();
            s.hsync_calls += 1;
        }
        if self.dir.should_fail(FailPoint::Hsync) {
            return Err(err!(RemoteIo, "mock hsync failure for {}", self.path));
        }
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), base::Error> {
        if self.dir.should_fail(FailPoint::Append) {
            return Err(err!(RemoteIo, "mock write failure for {}", self.path));
        }
        let mut s = self.dir.state.lock().unwrap();
        s.files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn close(self) -> Result<(), base::Error> {
        Ok(())
    }
}

/// Returns the local host name, falling back to `localhost` on lookup
/// failure, per spec.md §6 ("NameResolution ... substituted with
/// `localhost`").
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_dir_creates_writes_and_closes_a_real_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LocalDir::new(tmp.path());

        let mut stream = dir.create("2026/07/27/host-tag-0.avro", 1).unwrap();
        stream.write_all(b"row one").unwrap();
        stream.hsync().unwrap();
        stream.write_all(b"row two").unwrap();
        stream.close().unwrap();

        let contents = std::fs::read(tmp.path().join("2026/07/27/host-tag-0.avro")).unwrap();
        assert_eq!(contents, b"row onerow two");
    }

    #[test]
    fn local_dir_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LocalDir::new(tmp.path());

        let stream = dir.create("half-created.avro", 1).unwrap();
        stream.close().unwrap();
        assert!(tmp.path().join("half-created.avro").exists());

        dir.delete("half-created.avro").unwrap();
        assert!(!tmp.path().join("half-created.avro").exists());

        // Deleting an already-gone path is not an error (spec.md §4.4: the
        // durability-probe-failure path deletes a file that may have never
        // gained any replicas).
        dir.delete("half-created.avro").unwrap();
        dir.delete("never-existed.avro").unwrap();
    }

    #[test]
    fn mock_dir_fail_once_clears_after_triggering() {
        let dir = MockDir::new();
        dir.fail_once(FailPoint::Create);

        assert!(dir.create("a", 1).is_err());
        assert!(dir.create("a", 1).is_ok());
        assert_eq!(dir.create_call_count(), 2);
    }

    #[test]
    fn mock_dir_fail_forever_keeps_failing_until_cleared() {
        let dir = MockDir::new();
        dir.fail_forever(FailPoint::Append);
        let mut stream = dir.create("a", 1).unwrap();

        assert!(stream.write_all(b"x").is_err());
        assert!(stream.write_all(b"x").is_err());

        dir.clear_failures();
        assert!(stream.write_all(b"x").is_ok());
    }
}

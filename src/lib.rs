//! # obsfs
//!
//! Mounts a package-build service's REST/XML API as a POSIX filesystem.
//!
//! The server only speaks two things: XML listings for directories and raw
//! bytes for files. Everything else — attributes, symlinks, the synthetic
//! `_failed`/`_my_projects`/`_log` trees — is synthesized here and cached,
//! so that `ls`, `find`, and `grep` stay usable against a slow backend.
//!
//! The engine is generic over [`Transport`] so tests can feed it canned
//! responses; [`ObsFs`] is the engine over real HTTP. The kernel side lives
//! in [`fuse`] and the mount binary; both only ever call the path-based
//! operations defined on [`ObsFsGeneric`].

mod cache;
mod classify;
mod error;
pub mod fuse;
mod options;
mod oscrc;
mod parse;
mod stat;
mod status;
mod transport;
mod vpath;

#[cfg(test)]
mod tests;

use std::{
    fs::{File, OpenOptions},
    io::{BufReader, Seek, SeekFrom},
    os::unix::fs::{FileExt, MetadataExt},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;
use tempfile::TempDir;

pub use crate::{
    cache::{ATTR_TTL, Attr, AttrCache, DIR_TTL, Dir, DirCache},
    classify::{Filter, ROOT_DIRS, RewritePlan, SyntheticEntry, classify},
    error::{FsError, IOError},
    options::{DEFAULT_HOST, MountOptions},
    oscrc::{Account, account_for_host, config_path},
    stat::{FileStat, NodeKind},
    transport::{Body, HttpTransport, Transport},
};
use crate::parse::ParseSink;

/// Unmodified cached file contents older than this are refetched on open.
pub const FILE_TTL: Duration = Duration::from_secs(600);

/// Receiver for directory enumeration: entry name and kind.
pub type DirSink<'a> = dyn FnMut(&str, NodeKind) + 'a;

/// The filesystem engine over real HTTP.
pub type ObsFs = ObsFsGeneric<HttpTransport>;

/// Generic implementation of the filesystem engine, configured by the
/// [`Transport`] trait.
pub struct ObsFsGeneric<T> {
    options: MountOptions,
    transport: T,
    /// Scratch directory mirroring the virtual tree as a write-through
    /// file cache. Removed recursively on drop.
    scratch: TempDir,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    attrs: AttrCache,
    dirs: DirCache,
}

impl ObsFs {
    pub fn new(options: MountOptions) -> Result<Self, FsError> {
        let options = options.sanitize();
        let transport = HttpTransport::new(&options.user, &options.pass);
        Self::with_transport(transport, options)
    }
}

impl<T: Transport> ObsFsGeneric<T> {
    /// Build an engine over an arbitrary transport.
    pub fn with_transport(transport: T, options: MountOptions) -> Result<Self, FsError> {
        let options = options.sanitize();
        let scratch = tempfile::Builder::new().prefix("obsfs").tempdir()?;
        tracing::debug!(dir = %scratch.path().display(), host = %options.host, "engine up");
        Ok(Self { options, transport, scratch, state: Mutex::new(CacheState::default()) })
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    /// Root of the on-disk file cache.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Drop everything both metadata caches hold.
    pub fn clear_caches(&self) {
        let mut state = self.state.lock();
        state.attrs.clear();
        state.dirs.clear();
    }

    /// Where a virtual path's contents live in the file cache.
    fn local_path(&self, path: &str) -> PathBuf {
        self.scratch.path().join(path.trim_start_matches('/'))
    }

    fn url(&self, api_path: &str, rev: Option<&str>) -> String {
        vpath::make_url(&self.options.api_url(), api_path, rev)
    }

    fn is_root_dir(path: &str) -> bool {
        path.strip_prefix('/').is_some_and(|rest| ROOT_DIRS.contains(&rest))
    }

    /// Stat a virtual path.
    ///
    /// The server has no per-file metadata endpoint; the only way to learn
    /// about an entry is to enumerate its directory. A cache miss therefore
    /// reads the parent in cache-only mode and asks again.
    pub fn getattr(&self, path: &str) -> Result<FileStat, FsError> {
        let span = tracing::debug_span!("getattr", path);
        let _enter = span.enter();

        // The server answers "/" with a human-readable info page, so the
        // root and its children are hardcoded.
        if path == "/" || Self::is_root_dir(path) {
            return Ok(FileStat::dir());
        }

        let mut state = self.state.lock();
        if let Some(attr) = state.attrs.find(path) {
            return Ok(attr.st);
        }
        let parent = vpath::parent(path).to_string();
        if let Err(err) = self.read_dir_locked(&mut state, &parent, None) {
            tracing::debug!(path, %err, "parent listing failed during lookup");
        }
        state.attrs.find(path).map(|attr| attr.st).ok_or_else(|| FsError::not_found(path))
    }

    /// Enumerate a directory. With `sink` absent, only the caches are
    /// populated (the lookup trick above).
    pub fn readdir(&self, path: &str, sink: Option<&mut DirSink<'_>>) -> Result<(), FsError> {
        let span = tracing::debug_span!("readdir", path, cache_only = sink.is_none());
        let _enter = span.enter();
        let mut state = self.state.lock();
        self.read_dir_locked(&mut state, path, sink)
    }

    /// Resolve a symlink.
    pub fn readlink(&self, path: &str) -> Result<String, FsError> {
        let mut state = self.state.lock();
        if state.attrs.find(path).is_none() {
            let parent = vpath::parent(path).to_string();
            if let Err(err) = self.read_dir_locked(&mut state, &parent, None) {
                tracing::debug!(path, %err, "parent listing failed during readlink");
            }
        }
        state
            .attrs
            .find(path)
            .and_then(|attr| attr.symlink.clone())
            .ok_or_else(|| FsError::not_found(path))
    }

    fn read_dir_locked(
        &self,
        state: &mut CacheState,
        path: &str,
        mut sink: Option<&mut DirSink<'_>>,
    ) -> Result<(), FsError> {
        if let Some(f) = sink.as_mut() {
            f(".", NodeKind::Dir);
            f("..", NodeKind::Dir);
        }

        if let Some(dir) = state.dirs.find(path) {
            tracing::debug!(path, entries = dir.len(), "dir cache hit");
            if let Some(f) = sink.as_mut() {
                for (name, is_dir) in dir.entries() {
                    f(name, if is_dir { NodeKind::Dir } else { NodeKind::File });
                }
            }
            return Ok(());
        }

        let plan = classify(path, &self.options);
        tracing::debug!(path, canonical = %plan.canonical_path, api = ?plan.api_path, "fetching listing");

        let mut dir = Dir::new();
        if let Some(api_path) = &plan.api_path {
            let url = self.url(api_path, None);
            match self.transport.get(&url) {
                Err(err) => {
                    // Degrade to an empty listing without committing either
                    // cache; the next request retries.
                    tracing::warn!(path, %err, "directory fetch failed");
                    return Ok(());
                }
                Ok(body) => {
                    let mut parse_sink = ParseSink {
                        fs_path: path,
                        plan: &plan,
                        dir: &mut dir,
                        attrs: &mut state.attrs,
                        cache_root: self.scratch.path(),
                    };
                    parse::parse_listing(BufReader::new(body), &mut parse_sink)?;
                }
            }
        }

        // Most of the API is not exposed through listings; the entries we
        // know to be fetchable by URL are appended here. A mangled path is
        // an alias of a tree that already got them.
        if !plan.mangled {
            for entry in &plan.synthetic {
                let st = match entry.kind {
                    NodeKind::Dir => FileStat::dir(),
                    _ => FileStat::file(),
                };
                parse::add_dir_node(
                    &mut state.attrs,
                    &mut dir,
                    self.scratch.path(),
                    path,
                    &entry.name,
                    st,
                    None,
                    entry.hardlink.as_deref(),
                );
            }
        }

        if let Some(f) = sink.as_mut() {
            for (name, is_dir) in dir.entries() {
                f(name, if is_dir { NodeKind::Dir } else { NodeKind::File });
            }
        }
        state.dirs.insert(path, dir);
        Ok(())
    }

    /// Open a file: reuse the cached copy if fresh, otherwise fetch it.
    ///
    /// The transfer follows the attr's hardlink target when set, and
    /// attaches `?rev=` when the introducing listing carried a revision.
    pub fn open(&self, path: &str) -> Result<File, FsError> {
        let span = tracing::debug_span!("open", path);
        let _enter = span.enter();

        let mut state = self.state.lock();
        let local = self.local_path(path);
        let attr = state.attrs.find(path).cloned();

        // Discard unmodified cached copies that have gone stale.
        if let Ok(meta) = std::fs::metadata(&local) {
            let age = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map_or(0, |now| now.as_secs() as i64 - meta.mtime());
            if attr.as_ref().is_some_and(|a| !a.modified) && age > FILE_TTL.as_secs() as i64 {
                tracing::debug!(path, "expiring cached file");
                let _ = std::fs::remove_file(&local);
            }
        }

        let file = match OpenOptions::new().read(true).write(true).open(&local) {
            Ok(file) => file,
            Err(_) => {
                if let Some(parent) = local.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&local)?;
                let effective =
                    attr.as_ref().and_then(|a| a.hardlink.as_deref()).unwrap_or(path);
                let rev = attr.as_ref().and_then(|a| a.rev.as_deref());
                let url = self.url(effective, rev);
                match self.transport.get(&url) {
                    Ok(mut body) => {
                        std::io::copy(&mut body, &mut file)?;
                    }
                    // The zero-length cache file stays; empty and failed
                    // are indistinguishable from here on.
                    Err(err) => tracing::warn!(path, %err, "file fetch failed"),
                }
                file
            }
        };

        // Now that the actual size is known, reinstate the attr. The sizes
        // of the synthetic nodes are unknown until this point.
        let meta = file.metadata()?;
        let mut st = attr.as_ref().map_or_else(FileStat::file, |a| a.st);
        st.size = meta.len();
        st.mtime = meta.mtime();
        state.attrs.add(
            path,
            st,
            attr.as_ref().and_then(|a| a.symlink.as_deref()),
            attr.as_ref().and_then(|a| a.hardlink.as_deref()),
            attr.as_ref().and_then(|a| a.rev.as_deref()),
        );
        Ok(file)
    }

    /// Read from the cached copy.
    pub fn read(&self, file: &File, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        Ok(file.read_at(buf, offset)?)
    }

    /// Write to the cached copy and mark the path dirty.
    pub fn write(
        &self,
        path: &str,
        file: &File,
        data: &[u8],
        offset: u64,
    ) -> Result<usize, FsError> {
        let mut state = self.state.lock();
        let parent = vpath::parent(path).to_string();
        let CacheState { attrs, dirs } = &mut *state;
        let Some(attr) = attrs.find_mut(path) else {
            return Err(FsError::StaleHandle(path.to_string()));
        };
        if !attr.modified {
            attr.modified = true;
            if let Some(dir) = dirs.find_mut(&parent) {
                dir.modified += 1;
            }
        }
        let end = offset + data.len() as u64;
        if end > attr.st.size {
            attr.st.size = end;
        }
        Ok(file.write_at(data, offset)?)
    }

    /// Upload a dirty file and clear its dirty marks.
    ///
    /// The server answers with a status document; an error status maps to
    /// the matching errno and leaves the file dirty.
    pub fn flush(&self, path: &str, file: &File) -> Result<(), FsError> {
        let span = tracing::debug_span!("flush", path);
        let _enter = span.enter();

        let mut state = self.state.lock();
        let parent = vpath::parent(path).to_string();
        let CacheState { attrs, dirs } = &mut *state;
        let Some(attr) = attrs.find_mut(path) else {
            return Err(FsError::StaleHandle(path.to_string()));
        };
        if !attr.modified {
            return Ok(());
        }

        let mut upload = file.try_clone()?;
        upload.seek(SeekFrom::Start(0))?;
        let len = upload.metadata()?.len();
        // No revision on upload; the server creates a new one.
        let url = self.url(path, None);
        let body = self.transport.put(&url, &mut upload, len)?;
        status::check_status(body)?;

        attr.modified = false;
        if let Some(dir) = dirs.find_mut(&parent) {
            dir.modified = dir.modified.saturating_sub(1);
        }
        Ok(())
    }

    /// Truncate the cached copy.
    pub fn truncate(&self, path: &str, size: u64) -> Result<(), FsError> {
        let file = OpenOptions::new().write(true).open(self.local_path(path))?;
        file.set_len(size)?;
        Ok(())
    }

    /// Create a file in the cache and register it with its parent listing.
    pub fn create(&self, path: &str, perm: u32) -> Result<File, FsError> {
        let span = tracing::debug_span!("create", path);
        let _enter = span.enter();

        let mut state = self.state.lock();
        let local = self.local_path(path);
        if let Some(parent) = local.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&local)?;

        let mut st = FileStat::file();
        st.perm = perm & 0o7777;
        state.attrs.add(path, st, None, None, None);

        // The fresh attr is not marked modified (an empty file need not be
        // synced), so the parent's dirty count stays untouched here.
        let parent = vpath::parent(path).to_string();
        if let Some(dir) = state.dirs.find_mut(&parent) {
            dir.push(vpath::basename(path), false);
        }
        Ok(file)
    }

    /// Remove a file locally and remotely; either side succeeding counts.
    pub fn unlink(&self, path: &str) -> Result<(), FsError> {
        let span = tracing::debug_span!("unlink", path);
        let _enter = span.enter();

        let mut state = self.state.lock();
        state.attrs.remove(path);
        state.dirs.remove(path);

        let local = std::fs::remove_file(self.local_path(path));
        let remote = self.transport.delete(&self.url(path, None));
        match (local, remote) {
            (Err(local_err), Err(remote_err)) => {
                tracing::debug!(path, %remote_err, "remote delete failed");
                Err(local_err.into())
            }
            _ => Ok(()),
        }
    }
}

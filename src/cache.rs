//! The two metadata caches: attributes and directory listings.
//!
//! Both are keyed by the virtual path exactly as requested. Expiry happens
//! on lookup, never in the background; entries with local modifications are
//! pinned until flushed. Directory entries age with an allowance for their
//! size, because a big listing is expensive to refetch.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::{stat::FileStat, vpath};

/// Attributes rarely ever change server-side. In fact, most of them are
/// entirely made up to begin with, so a much larger timeout than for
/// listings is safe and reduces server load.
pub const ATTR_TTL: Duration = Duration::from_secs(3600);

/// Base lifetime of a cached directory listing.
pub const DIR_TTL: Duration = Duration::from_secs(20);

/// One virtual inode.
#[derive(Debug, Clone)]
pub struct Attr {
    pub st: FileStat,
    /// Symlink target; present iff the mode is symlink.
    pub symlink: Option<String>,
    /// Virtual path the node's *contents* are fetched from, e.g. a failed
    /// build aliased to the package's `_log`.
    pub hardlink: Option<String>,
    /// Revision token to attach to content GETs, from the listing that
    /// introduced this node.
    pub rev: Option<String>,
    /// Local changes not yet flushed. Pins the entry past its TTL.
    pub modified: bool,
    timestamp: Instant,
}

/// One directory listing.
#[derive(Debug, Clone)]
pub struct Dir {
    /// Entry name → is_dir, in listing order.
    entries: IndexMap<String, bool, FxBuildHasher>,
    pub rev: Option<String>,
    /// Count of children with unflushed local changes. Pins the entry.
    pub modified: u32,
    timestamp: Instant,
}

impl Dir {
    pub fn new() -> Self {
        Self { entries: IndexMap::default(), rev: None, modified: 0, timestamp: Instant::now() }
    }

    pub fn push(&mut self, name: &str, is_dir: bool) {
        self.entries.insert(name.to_string(), is_dir);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(name, is_dir)| (name.as_str(), *is_dir))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expired(&self, now: Instant) -> bool {
        let ttl = DIR_TTL + Duration::from_secs(self.entries.len() as u64 / 10);
        self.modified == 0 && now.duration_since(self.timestamp) > ttl
    }
}

impl Default for Dir {
    fn default() -> Self {
        Self::new()
    }
}

/// Mapping `path → Attr` with expiry on lookup.
#[derive(Default)]
pub struct AttrCache {
    map: FxHashMap<String, Attr>,
}

impl AttrCache {
    /// Insert an attribute, replacing any previous entry for the path.
    pub fn add(
        &mut self,
        path: &str,
        st: FileStat,
        symlink: Option<&str>,
        hardlink: Option<&str>,
        rev: Option<&str>,
    ) {
        self.map.insert(
            path.to_string(),
            Attr {
                st,
                symlink: symlink.map(str::to_string),
                hardlink: hardlink.map(str::to_string),
                rev: rev.map(str::to_string),
                modified: false,
                timestamp: Instant::now(),
            },
        );
    }

    pub fn find(&mut self, path: &str) -> Option<&Attr> {
        self.find_at(path, Instant::now())
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut Attr> {
        self.find_at(path, Instant::now())?;
        self.map.get_mut(path)
    }

    pub(crate) fn find_at(&mut self, path: &str, now: Instant) -> Option<&Attr> {
        if let Some(attr) = self.map.get(path) {
            if !attr.modified && now.duration_since(attr.timestamp) > ATTR_TTL {
                tracing::debug!(path, "attr cache entry expired");
                self.map.remove(path);
                return None;
            }
        }
        self.map.get(path)
    }

    /// Remove an entry. Goes through the expiring `find` first, so an
    /// already-expired entry is evicted rather than removed; the observable
    /// result is the same.
    pub fn remove(&mut self, path: &str) {
        if self.find(path).is_some() {
            self.map.remove(path);
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, path: &str, age: Duration) {
        if let Some(attr) = self.map.get_mut(path) {
            attr.timestamp -= age;
        }
    }
}

/// Mapping `path → Dir` with expiry on lookup and per-name removal.
#[derive(Default)]
pub struct DirCache {
    map: FxHashMap<String, Dir>,
}

impl DirCache {
    /// Install a freshly fetched listing, replacing any previous one.
    pub fn insert(&mut self, path: &str, dir: Dir) {
        self.map.insert(path.to_string(), dir);
    }

    pub fn find(&mut self, path: &str) -> Option<&Dir> {
        self.find_at(path, Instant::now())
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut Dir> {
        self.find_at(path, Instant::now())?;
        self.map.get_mut(path)
    }

    pub(crate) fn find_at(&mut self, path: &str, now: Instant) -> Option<&Dir> {
        if let Some(dir) = self.map.get(path) {
            if dir.expired(now) {
                tracing::debug!(path, "dir cache entry expired");
                self.map.remove(path);
                return None;
            }
        }
        self.map.get(path)
    }

    /// Remove the entry named by `basename(path)` from its *parent's*
    /// listing. The listing itself stays cached, which keeps an enumeration
    /// after `unlink` consistent without a refetch.
    pub fn remove(&mut self, path: &str) {
        let (parent, name) = (vpath::parent(path), vpath::basename(path));
        if let Some(dir) = self.find_mut(parent) {
            dir.entries.shift_remove(name);
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, path: &str, age: Duration) {
        if let Some(dir) = self.map.get_mut(path) {
            dir.timestamp -= age;
        }
    }
}

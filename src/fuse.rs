//! Kernel bridge: translates inode-based FUSE operations onto the
//! path-based engine.
//!
//! The kernel speaks inodes, the engine speaks virtual paths; an interning
//! table maps between them. Every reply carries a zero TTL so the kernel
//! never caches attributes — the engine's caches are the sole source of
//! truth, and attributes can change under the kernel's feet when a listing
//! is refetched.

use std::ffi::OsStr;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use rustc_hash::FxHashMap;
use rustix::io::Errno;

use crate::{FileStat, NodeKind, ObsFsGeneric, Transport, vpath};

/// Zero on purpose; see the module docs.
const TTL: Duration = Duration::ZERO;

/// Bidirectional inode ↔ virtual path interning. Inode 1 is `/`.
struct InodeTable {
    paths: FxHashMap<u64, String>,
    inos: FxHashMap<String, u64>,
    next: u64,
}

impl InodeTable {
    fn new() -> Self {
        let mut table =
            Self { paths: FxHashMap::default(), inos: FxHashMap::default(), next: 1 };
        table.intern("/");
        table
    }

    fn intern(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.inos.get(path) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.paths.insert(ino, path.to_string());
        self.inos.insert(path.to_string(), ino);
        ino
    }

    fn path(&self, ino: u64) -> Option<&str> {
        self.paths.get(&ino).map(String::as_str)
    }

    fn forget(&mut self, path: &str) {
        if let Some(ino) = self.inos.remove(path) {
            self.paths.remove(&ino);
        }
    }
}

struct OpenFile {
    path: String,
    file: File,
}

/// The FUSE driver over an engine.
pub struct ObsFuse<T> {
    fs: Arc<ObsFsGeneric<T>>,
    inodes: InodeTable,
    handles: FxHashMap<u64, OpenFile>,
    next_fh: u64,
}

impl<T: Transport> ObsFuse<T> {
    pub fn new(fs: Arc<ObsFsGeneric<T>>) -> Self {
        Self { fs, inodes: InodeTable::new(), handles: FxHashMap::default(), next_fh: 0 }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.path(ino).map(str::to_string)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        let parent = self.inodes.path(parent)?;
        Some(vpath::join(parent, name.to_str()?))
    }
}

fn fuse_attr(ino: u64, st: &FileStat) -> FileAttr {
    let mtime = UNIX_EPOCH + Duration::from_secs(st.mtime.max(0) as u64);
    FileAttr {
        ino,
        size: st.size,
        blocks: st.size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: match st.kind {
            NodeKind::Dir => FileType::Directory,
            NodeKind::Symlink => FileType::Symlink,
            NodeKind::File => FileType::RegularFile,
        },
        perm: st.perm as u16,
        nlink: st.nlink,
        uid: st.uid,
        gid: st.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

const ENOENT: i32 = Errno::NOENT.raw_os_error();
const EBADF: i32 = Errno::BADF.raw_os_error();

impl<T: Transport> Filesystem for ObsFuse<T> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(st) => {
                let ino = self.inodes.intern(&path);
                reply.entry(&TTL, &fuse_attr(ino, &st), 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.fs.getattr(&path) {
            Ok(st) => reply.attr(&TTL, &fuse_attr(ino, &st)),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        if let Some(size) = size {
            if let Err(err) = self.fs.truncate(&path, size) {
                reply.error(err.errno());
                return;
            }
        }
        match self.fs.getattr(&path) {
            Ok(st) => reply.attr(&TTL, &fuse_attr(ino, &st)),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.fs.readlink(&path) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        let mut entries: Vec<(String, NodeKind)> = Vec::new();
        let mut sink = |name: &str, kind: NodeKind| entries.push((name.to_string(), kind));
        if let Err(err) = self.fs.readdir(&path, Some(&mut sink)) {
            reply.error(err.errno());
            return;
        }
        for (i, (name, kind)) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            let child_ino = match name.as_str() {
                "." => ino,
                ".." => self.inodes.intern(vpath::parent(&path)),
                _ => self.inodes.intern(&vpath::join(&path, name)),
            };
            let file_type = match kind {
                NodeKind::Dir => FileType::Directory,
                _ => FileType::RegularFile,
            };
            if reply.add(child_ino, (i + 1) as i64, file_type, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match self.fs.open(&path) {
            Ok(file) => {
                self.next_fh += 1;
                self.handles.insert(self.next_fh, OpenFile { path, file });
                reply.opened(self.next_fh, 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(handle) = self.handles.get(&fh) else {
            reply.error(EBADF);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        match self.fs.read(&handle.file, &mut buf, offset.max(0) as u64) {
            Ok(n) => reply.data(&buf[..n]),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(handle) = self.handles.get(&fh) else {
            reply.error(EBADF);
            return;
        };
        match self.fs.write(&handle.path, &handle.file, data, offset.max(0) as u64) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        let Some(handle) = self.handles.get(&fh) else {
            reply.error(EBADF);
            return;
        };
        match self.fs.flush(&handle.path, &handle.file) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.handles.remove(&fh);
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        match self.fs.create(&path, mode & 0o7777) {
            Ok(file) => {
                let ino = self.inodes.intern(&path);
                let st = self.fs.getattr(&path).unwrap_or_else(|_| {
                    let mut st = FileStat::file();
                    st.perm = mode & 0o7777;
                    st
                });
                self.next_fh += 1;
                self.handles.insert(self.next_fh, OpenFile { path, file });
                reply.created(&TTL, &fuse_attr(ino, &st), 0, self.next_fh, 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(ENOENT);
            return;
        };
        match self.fs.unlink(&path) {
            Ok(()) => {
                self.inodes.forget(&path);
                reply.ok();
            }
            Err(err) => reply.error(err.errno()),
        }
    }
}

/// Mount the engine and serve kernel requests until unmounted.
pub fn mount<T: Transport>(fs: Arc<ObsFsGeneric<T>>, mountpoint: &Path) -> std::io::Result<()> {
    let options = [
        MountOption::FSName("obsfs".to_string()),
        MountOption::NoAtime,
        MountOption::DefaultPermissions,
    ];
    tracing::info!(mountpoint = %mountpoint.display(), "mounting (unprivileged via fusermount)");
    fuser::mount2(ObsFuse::new(fs), mountpoint, &options)
}

use std::sync::OnceLock;

/// What a virtual inode is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
    Symlink,
}

/// Synthesized stat record for one virtual inode.
///
/// The server has no notion of ownership or permissions, so everything here
/// except `size` and `mtime` is made up: regular files are `0644`, directories
/// `0755`, and uid/gid are those of the mounting process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: NodeKind,
    pub perm: u32,
    pub size: u64,
    pub nlink: u32,
    pub mtime: i64,
    pub uid: u32,
    pub gid: u32,
}

fn process_ids() -> (u32, u32) {
    static IDS: OnceLock<(u32, u32)> = OnceLock::new();
    *IDS.get_or_init(|| {
        (rustix::process::getuid().as_raw(), rustix::process::getgid().as_raw())
    })
}

impl FileStat {
    pub fn file() -> Self {
        let (uid, gid) = process_ids();
        Self { kind: NodeKind::File, perm: 0o644, size: 0, nlink: 1, mtime: 0, uid, gid }
    }

    pub fn dir() -> Self {
        let (uid, gid) = process_ids();
        Self { kind: NodeKind::Dir, perm: 0o755, size: 0, nlink: 2, mtime: 0, uid, gid }
    }

    pub fn symlink() -> Self {
        Self { kind: NodeKind::Symlink, ..Self::file() }
    }

    pub const fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir)
    }

    pub const fn is_symlink(&self) -> bool {
        matches!(self.kind, NodeKind::Symlink)
    }
}

#[test]
fn constructors() {
    let f = FileStat::file();
    assert_eq!((f.kind, f.perm, f.nlink), (NodeKind::File, 0o644, 1));
    let d = FileStat::dir();
    assert_eq!((d.kind, d.perm, d.nlink), (NodeKind::Dir, 0o755, 2));
    let l = FileStat::symlink();
    assert!(l.is_symlink());
    assert_eq!(l.uid, f.uid);
}

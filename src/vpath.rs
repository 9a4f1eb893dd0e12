//! Helpers for the virtual path strings used as cache keys.
//!
//! Virtual paths are always absolute, `/`-separated, and never end in a
//! slash (except the root itself). They are plain strings, not
//! [`std::path::Path`]s: the tree they name lives on the server, and string
//! keys keep the caches free of platform path semantics.

/// Parent directory of a virtual path (`/a/b` → `/a`, `/a` → `/`).
pub(crate) fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Last component of a virtual path.
pub(crate) fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Join a directory path and an entry name.
pub(crate) fn join(dir: &str, name: &str) -> String {
    if dir == "/" { format!("/{name}") } else { format!("{dir}/{name}") }
}

/// Extensions that mark a listing entry as a regular file even when the
/// server omits a size attribute.
const FILE_EXTS: &[&str] = &[".rpm", ".repo", ".xml", ".gz", ".key", ".asc", ".solv"];

/// Entry names that are files when they appear under the given tree.
const TREE_FILE_NAMES: &[(&str, &str)] = &[
    ("/published/", "content"),
    ("/published/", "packages"),
    ("/published/", "packages.DU"),
    ("/published/", "packages.en"),
    ("/published/", "directory.yast"),
];

/// Directories that exclusively contain files.
const FILE_ONLY_DIRS: &[&str] = &["/repocache"];

/// Is the entry `name` in the listing fetched from `api_path` a regular file?
///
/// Listings mostly describe directories, but some trees mix in files the
/// server does not size. These heuristics mirror what the server actually
/// serves.
pub(crate) fn is_file_entry(api_path: &str, name: &str) -> bool {
    FILE_EXTS.iter().any(|ext| name.ends_with(ext))
        || TREE_FILE_NAMES
            .iter()
            .any(|(tree, file)| api_path.starts_with(tree) && *file == name)
        || FILE_ONLY_DIRS.iter().any(|dir| api_path.ends_with(dir))
}

/// Compose a full request URL from the API prefix, an API path, and an
/// optional revision token.
pub(crate) fn make_url(prefix: &str, api_path: &str, rev: Option<&str>) -> String {
    match rev {
        Some(rev) => format!("{prefix}{api_path}?rev={rev}"),
        None => format!("{prefix}{api_path}"),
    }
}

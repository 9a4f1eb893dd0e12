//! Streaming parser for API directory listings.
//!
//! One parse services one fetch: element events are classified into files,
//! directories, symlinks, or hardlinks to other virtual paths, and every
//! accepted node lands in the attribute cache and the listing being built
//! in the same step. Nothing is buffered beyond the current element, so
//! arbitrarily large listings stream through in constant memory.

use std::io::BufRead;
use std::path::Path;

use quick_xml::{Reader, events::BytesStart, events::Event};

use crate::{
    cache::{AttrCache, Dir},
    classify::{self, RewritePlan},
    error::FsError,
    stat::FileStat,
    vpath,
};

/// Container elements that hold directory entries.
const CONTAINERS: &[&str] =
    &["directory", "binarylist", "result", "collection", "latest_added", "latest_updated"];

/// Add one node to the listing under construction and the attribute cache.
///
/// FUSE does a LOOKUP (through getattr) before every open but only a full
/// GETATTR the first time, so a re-fetched listing that reports size 0 for
/// a file the kernel already knows would wedge subsequent reads: the kernel
/// remembers the stale zero size and never asks again. If a local cache
/// copy exists, its on-disk size wins.
pub(crate) fn add_dir_node(
    attrs: &mut AttrCache,
    dir: &mut Dir,
    cache_root: &Path,
    fs_path: &str,
    name: &str,
    mut st: FileStat,
    symlink: Option<&str>,
    hardlink: Option<&str>,
) {
    let full_path = vpath::join(fs_path, name);

    if let Ok(meta) = std::fs::symlink_metadata(cache_root.join(&full_path[1..])) {
        st.size = meta.len();
    }

    attrs.add(&full_path, st, symlink, hardlink, dir.rev.as_deref());
    dir.push(name, st.is_dir());

    if st.is_dir() {
        if let Some(parent) = attrs.find_mut(fs_path) {
            parent.st.nlink += 1;
        }
    }
}

/// Everything one listing parse works against.
pub(crate) struct ParseSink<'a> {
    /// Directory being listed, as requested. Attribute-cache keys are
    /// formed under this path.
    pub fs_path: &'a str,
    pub plan: &'a RewritePlan,
    pub dir: &'a mut Dir,
    pub attrs: &'a mut AttrCache,
    pub cache_root: &'a Path,
}

#[derive(Default)]
struct Flags {
    in_dir: bool,
    in_collection: bool,
    in_latest: bool,
}

/// Attributes of one element, collected before any decisions are made.
#[derive(Default)]
struct ElementAttrs {
    name: Option<String>,
    filename: Option<String>,
    size: Option<u64>,
    mtime: Option<i64>,
    project: Option<String>,
    package: Option<String>,
    rev: Option<String>,
    filtered_out: bool,
}

fn collect_attrs(e: &BytesStart<'_>, plan: &RewritePlan) -> Result<ElementAttrs, FsError> {
    let mut out = ElementAttrs::default();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| FsError::InvalidXml(err.to_string()))?;
        let key = attr.key.local_name();
        let value = attr
            .unescape_value()
            .map_err(|err| FsError::InvalidXml(err.to_string()))?;

        if let Some(filter) = &plan.filter {
            if key.as_ref() == filter.attr.as_bytes() && value != filter.value {
                out.filtered_out = true;
            }
        }
        match key.as_ref() {
            b"name" => out.name = Some(value.into_owned()),
            b"filename" => out.filename = Some(value.into_owned()),
            b"size" => out.size = value.parse().ok(),
            b"mtime" => out.mtime = value.parse().ok(),
            b"project" => out.project = Some(value.into_owned()),
            b"package" => out.package = Some(value.into_owned()),
            b"rev" => out.rev = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(out)
}

/// Parse one listing response, populating the attribute cache and `sink.dir`.
pub(crate) fn parse_listing<R: BufRead>(reader: R, sink: &mut ParseSink<'_>) -> Result<(), FsError> {
    let mut xml = Reader::from_reader(reader);
    let mut buf = Vec::new();
    let mut flags = Flags::default();

    loop {
        let event = xml
            .read_event_into(&mut buf)
            .map_err(|err| FsError::InvalidXml(err.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) => {
                let local = e.local_name();
                let tag = std::str::from_utf8(local.as_ref())
                    .map_err(|err| FsError::InvalidXml(err.to_string()))?
                    .to_string();
                handle_element(&tag, &e, &mut flags, sink)?;
            }
            Event::End(e) => {
                if CONTAINERS.contains(&std::str::from_utf8(e.local_name().as_ref()).unwrap_or(""))
                {
                    flags = Flags::default();
                }
            }
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn handle_element(
    tag: &str,
    e: &BytesStart<'_>,
    flags: &mut Flags,
    sink: &mut ParseSink<'_>,
) -> Result<(), FsError> {
    if CONTAINERS.contains(&tag) {
        flags.in_dir = true;
        flags.in_collection = tag == "collection";
        flags.in_latest = tag.starts_with("latest_");
        let attrs = collect_attrs(e, sink.plan)?;
        if let Some(rev) = attrs.rev {
            // Expanded sources need the revision on subsequent file GETs to
            // stay consistent with this listing.
            tracing::debug!(path = sink.fs_path, rev = %rev, "listing carries a revision");
            sink.dir.rev = Some(rev);
        }
        return Ok(());
    }

    if !flags.in_dir {
        return Ok(());
    }

    match tag {
        "entry" | "binary" | "project" | "package" => {
            let attrs = collect_attrs(e, sink.plan)?;
            if !attrs.filtered_out {
                emit_entry(tag, attrs, flags, sink);
            }
        }
        "status" => {
            let attrs = collect_attrs(e, sink.plan)?;
            if attrs.filtered_out {
                return Ok(());
            }
            if let Some(package) = attrs.package {
                let hardlink =
                    classify::failed_log_target(&sink.plan.canonical_path, &package);
                add_dir_node(
                    sink.attrs,
                    sink.dir,
                    sink.cache_root,
                    sink.fs_path,
                    &package,
                    FileStat::file(),
                    None,
                    Some(&hardlink),
                );
            }
        }
        _ => {}
    }
    Ok(())
}

fn emit_entry(tag: &str, attrs: ElementAttrs, flags: &Flags, sink: &mut ParseSink<'_>) {
    let api_path = sink.plan.api_path.as_deref().unwrap_or("");
    let mut st = FileStat::dir();
    let mut name = None;
    let mut symlink = None;

    if flags.in_collection {
        if tag == "package" {
            if sink.fs_path.ends_with("/_my_packages") {
                // Listing the projects the user's packages live in: one
                // directory per distinct `project` attribute.
                if let Some(project) = attrs.project {
                    if !sink.dir.contains(&project) {
                        name = Some(project);
                    }
                }
            } else if let Some(pkg) = attrs.name {
                // A package below `_my_packages/<project>` links back into
                // the source tree.
                let project = vpath::basename(sink.fs_path);
                symlink = Some(format!("../../{project}/{pkg}"));
                st = FileStat::symlink();
                name = Some(pkg);
            }
        } else if let Some(entry) = attrs.name {
            // Project list: every entry links to the sibling project dir.
            symlink = Some(format!("../{entry}"));
            st = FileStat::symlink();
            name = Some(entry);
        }
    } else if flags.in_latest {
        if let Some(entry) = attrs.name {
            if let Some(project) = attrs.project {
                symlink = Some(format!("../../source/{project}/{entry}"));
                st = FileStat::symlink();
            }
            name = Some(entry);
        }
    } else {
        if let Some(entry) = attrs.name {
            // Muddy waters: some trees list sizeless entries that are files
            // anyway, and everything under /request is a file.
            if vpath::is_file_entry(api_path, &entry) || api_path.ends_with("/request") {
                st = FileStat::file();
            }
            name = Some(entry);
        }
        if let Some(filename) = attrs.filename {
            // binarylist entries are always regular files.
            st = FileStat::file();
            name = Some(filename);
        }
        if let Some(size) = attrs.size {
            // An entry with a size is always a regular file.
            if !st.is_symlink() {
                st = FileStat::file();
            }
            st.size = size;
        }
        if let Some(mtime) = attrs.mtime {
            st.mtime = mtime;
        }
    }

    let Some(name) = name else { return };

    if symlink.is_none() {
        if let Some(template) = &sink.plan.relink_template {
            symlink = Some(template.replace("%s", &name));
            st = FileStat::symlink();
        }
    }

    add_dir_node(
        sink.attrs,
        sink.dir,
        sink.cache_root,
        sink.fs_path,
        &name,
        st,
        symlink.as_deref(),
        None,
    );
}

//! Virtual-path classification.
//!
//! Most of the API namespace maps straight through, but a handful of
//! synthetic trees (`_failed`, `_my_projects`, `_my_packages`, the
//! statistics roots) and per-directory synthetic nodes (`_log`, `_status`,
//! `_history`, `_reason`, `_activity`, `_rating`) only exist because this
//! filesystem knows their URLs. Classification turns a requested path into
//! a [`RewritePlan`]: which URL to fetch, which XML elements to accept, and
//! which entries to append after the parse. Matching works on path
//! segments and produces plain data, so the aliasing rules live in one
//! table instead of being smeared over string surgery at the call sites.

use crate::{
    options::MountOptions,
    stat::NodeKind,
    vpath,
};

/// Top-level directories. The server answers `/` with a human-readable
/// info page, so the root listing is hardcoded.
pub const ROOT_DIRS: &[&str] = &["build", "source", "published", "request", "statistics"];

/// Attribute filter applied while parsing a listing: elements whose
/// `attr` differs from `value` are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filter {
    pub attr: &'static str,
    pub value: &'static str,
}

/// A file or directory appended to a listing even though the server's XML
/// does not mention it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticEntry {
    pub name: String,
    pub kind: NodeKind,
    /// Virtual path the entry's contents are fetched from, if not its own.
    pub hardlink: Option<String>,
}

impl SyntheticEntry {
    fn dir(name: &str) -> Self {
        Self { name: name.to_string(), kind: NodeKind::Dir, hardlink: None }
    }

    fn file(name: &str) -> Self {
        Self { name: name.to_string(), kind: NodeKind::File, hardlink: None }
    }

    fn file_linked(name: &str, hardlink: String) -> Self {
        Self { name: name.to_string(), kind: NodeKind::File, hardlink: Some(hardlink) }
    }
}

/// Everything the engine and parser need to know about one virtual path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewritePlan {
    /// The single path chosen as the API-side identity when multiple
    /// equivalent virtual paths exist (`_failed` aliasing). Hardlink
    /// targets are derived from it.
    pub canonical_path: String,
    /// Server URL path, possibly with a query. `None` for directories that
    /// are purely synthetic (`/`, `/statistics`).
    pub api_path: Option<String>,
    pub filter: Option<Filter>,
    /// The requested path was an alias that got rewritten. Suppresses
    /// synthetic-entry injection so the alias tree does not grow another
    /// alias of itself.
    pub mangled: bool,
    /// Symlink target template for named listing entries, with `%s`
    /// standing for the entry name.
    pub relink_template: Option<String>,
    /// Entries to append after the parse (unless `mangled`).
    pub synthetic: Vec<SyntheticEntry>,
}

impl RewritePlan {
    fn passthrough(path: &str) -> Self {
        Self {
            canonical_path: path.to_string(),
            api_path: Some(path.to_string()),
            filter: None,
            mangled: false,
            relink_template: None,
            synthetic: Vec::new(),
        }
    }

    fn synthetic_only(path: &str, synthetic: Vec<SyntheticEntry>) -> Self {
        Self { api_path: None, synthetic, ..Self::passthrough(path) }
    }
}

/// Does this segment name a real project/repo/package rather than one of
/// the injected `_`-prefixed nodes?
fn plain(seg: &str) -> bool {
    !seg.starts_with('_')
}

/// Rewrite `/build/<p>/_failed[...]` aliases to their canonical form with
/// `_failed` at the leaf. Returns the canonical segments and whether the
/// path was rewritten.
fn canonicalize(segs: &[&str]) -> (Vec<String>, bool) {
    if segs.first() == Some(&"build") && segs.len() >= 2 && plain(segs[1]) {
        match segs {
            ["build", p, "_failed"] => {
                return (vec!["build".into(), (*p).into()], true);
            }
            ["build", p, "_failed", f] => {
                return (vec!["build".into(), (*p).into(), (*f).into()], true);
            }
            ["build", p, "_failed", f, b] => {
                return (
                    vec!["build".into(), (*p).into(), (*f).into(), (*b).into(), "_failed".into()],
                    true,
                );
            }
            _ => {}
        }
    }
    (segs.iter().map(|s| (*s).to_string()).collect(), false)
}

/// Classify a virtual path. First matching rule wins.
pub fn classify(path: &str, options: &MountOptions) -> RewritePlan {
    let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segs.is_empty() {
        return RewritePlan::synthetic_only(
            "/",
            ROOT_DIRS.iter().map(|d| SyntheticEntry::dir(d)).collect(),
        );
    }

    let (canon, mangled) = canonicalize(&segs);
    let canon_path = format!("/{}", canon.join("/"));
    let canon: Vec<&str> = canon.iter().map(String::as_str).collect();
    let user = options.user.as_str();

    let mut plan = match canon.as_slice() {
        ["build"] => {
            let mut plan = RewritePlan::passthrough(&canon_path);
            plan.synthetic.push(SyntheticEntry::dir("_my_projects"));
            plan
        }
        ["source"] => {
            let mut plan = RewritePlan::passthrough(&canon_path);
            plan.synthetic.push(SyntheticEntry::dir("_my_projects"));
            plan.synthetic.push(SyntheticEntry::dir("_my_packages"));
            plan
        }
        ["statistics"] => RewritePlan::synthetic_only(
            &canon_path,
            vec![SyntheticEntry::dir("latest_added"), SyntheticEntry::dir("latest_updated")],
        ),
        ["build", p, r, a, "_failed"] => RewritePlan {
            api_path: Some(format!("/build/{p}/_result?repository={r}&arch={a}")),
            filter: Some(Filter { attr: "code", value: "failed" }),
            ..RewritePlan::passthrough(&canon_path)
        },
        ["source", "_my_projects"] | ["build", "_my_projects"] => RewritePlan {
            api_path: Some(format!("/search/project_id?match=person/@userid='{user}'")),
            relink_template: Some("../%s".to_string()),
            ..RewritePlan::passthrough(&canon_path)
        },
        ["source", "_my_packages"] => RewritePlan {
            api_path: Some(format!("/search/package_id?match=person/@userid='{user}'")),
            ..RewritePlan::passthrough(&canon_path)
        },
        ["source", "_my_packages", p] => RewritePlan {
            api_path: Some(format!(
                "/search/package_id?match=person/@userid='{user}'+and+@project='{p}'"
            )),
            relink_template: Some(format!("../../{p}/%s")),
            ..RewritePlan::passthrough(&canon_path)
        },
        ["source", p, pkg] if plain(p) => {
            let mut plan = RewritePlan::passthrough(&canon_path);
            plan.api_path = Some(format!("{canon_path}?expand=1"));
            plan.synthetic.push(SyntheticEntry::file_linked(
                "_activity",
                format!("/statistics/activity/{p}/{pkg}"),
            ));
            plan.synthetic.push(SyntheticEntry::file_linked(
                "_rating",
                format!("/statistics/rating/{p}/{pkg}"),
            ));
            plan
        }
        ["build", p] if plain(p) => {
            let mut plan = RewritePlan::passthrough(&canon_path);
            plan.synthetic.push(SyntheticEntry::dir("_failed"));
            plan
        }
        ["build", _, _, _] => {
            let mut plan = RewritePlan::passthrough(&canon_path);
            plan.synthetic.push(SyntheticEntry::dir("_failed"));
            plan
        }
        ["build", _, _, _, pkg] if *pkg != "_failed" => {
            let mut plan = RewritePlan::passthrough(&canon_path);
            for name in ["_history", "_reason", "_status", "_log"] {
                plan.synthetic.push(SyntheticEntry::file(name));
            }
            plan
        }
        _ => RewritePlan::passthrough(&canon_path),
    };

    plan.mangled = mangled;
    plan
}

/// Hardlink target for a failed-build entry: the package's `_log` next to
/// the canonical `_failed` directory.
pub(crate) fn failed_log_target(canonical_path: &str, package: &str) -> String {
    format!("{}/{package}/_log", vpath::parent(canonical_path))
}

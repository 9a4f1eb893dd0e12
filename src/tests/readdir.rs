use crate::tests::{MockTransport, engine, ls, names};
use crate::NodeKind;

#[test]
fn root_listing_is_hardcoded() {
    let fs = engine(&MockTransport::default());
    let entries = ls(&fs, "/");
    assert_eq!(
        names(&entries),
        [".", "..", "build", "source", "published", "request", "statistics"]
    );
    // Nothing was fetched for it.
    assert!(fs.transport.gets().is_empty());
}

#[test]
fn plain_directory_listing_populates_both_caches() {
    let mock = MockTransport::default();
    mock.respond("/build/proj", r#"<directory><entry name="x86_64"/></directory>"#);
    let fs = engine(&mock);

    let entries = ls(&fs, "/build/proj");
    assert_eq!(names(&entries), [".", "..", "x86_64", "_failed"]);

    let mut state = fs.state.lock();
    assert!(state.attrs.find("/build/proj/x86_64").unwrap().st.is_dir());
    assert!(state.attrs.find("/build/proj/_failed").unwrap().st.is_dir());
    assert!(state.dirs.find("/build/proj").unwrap().contains("x86_64"));
}

#[test]
fn second_enumeration_is_served_from_cache() {
    let mock = MockTransport::default();
    mock.respond("/build/proj", r#"<directory><entry name="x86_64"/></directory>"#);
    let fs = engine(&mock);

    let first = ls(&fs, "/build/proj");
    let second = ls(&fs, "/build/proj");
    assert_eq!(first, second);
    assert_eq!(mock.gets().len(), 1);
}

#[test]
fn fetch_failure_degrades_to_an_empty_listing() {
    let mock = MockTransport::default();
    let fs = engine(&mock);

    let entries = ls(&fs, "/build/unreachable");
    assert_eq!(names(&entries), [".", ".."]);

    // Nothing was committed, so the next enumeration retries.
    ls(&fs, "/build/unreachable");
    assert_eq!(mock.gets().len(), 2);
}

#[test]
fn malformed_listing_is_invalid() {
    let mock = MockTransport::default();
    mock.respond("/build/proj", "<directory><entry name=");
    let fs = engine(&mock);
    let err = fs.readdir("/build/proj", None).unwrap_err();
    assert!(matches!(err, crate::FsError::InvalidXml(_)));
}

#[test]
fn binarylist_entries_are_files_with_sizes() {
    let mock = MockTransport::default();
    mock.respond(
        "/build/proj/repo/arch/pkg",
        r#"<binarylist>
             <binary filename="pkg-1.0-1.x86_64.rpm" size="4711" mtime="1280000000"/>
           </binarylist>"#,
    );
    let fs = engine(&mock);

    let entries = ls(&fs, "/build/proj/repo/arch/pkg");
    assert_eq!(
        names(&entries),
        [".", "..", "pkg-1.0-1.x86_64.rpm", "_history", "_reason", "_status", "_log"]
    );

    let mut state = fs.state.lock();
    let attr = state.attrs.find("/build/proj/repo/arch/pkg/pkg-1.0-1.x86_64.rpm").unwrap();
    assert_eq!(attr.st.kind, NodeKind::File);
    assert_eq!(attr.st.size, 4711);
    assert_eq!(attr.st.mtime, 1_280_000_000);
}

#[test]
fn failed_listing_filters_and_hardlinks() {
    let mock = MockTransport::default();
    mock.respond(
        "/build/proj/_result?repository=repo&arch=arch",
        r#"<resultlist>
             <result project="proj" repository="repo" arch="arch">
               <status package="pk1" code="failed"/>
               <status package="pk2" code="succeeded"/>
             </result>
           </resultlist>"#,
    );
    let fs = engine(&mock);

    let entries = ls(&fs, "/build/proj/repo/arch/_failed");
    assert_eq!(names(&entries), [".", "..", "pk1"]);

    let mut state = fs.state.lock();
    let attr = state.attrs.find("/build/proj/repo/arch/_failed/pk1").unwrap();
    assert_eq!(attr.st.kind, NodeKind::File);
    assert_eq!(attr.hardlink.as_deref(), Some("/build/proj/repo/arch/pk1/_log"));
}

#[test]
fn failed_alias_lists_the_same_packages_without_extra_synthetics() {
    let mock = MockTransport::default();
    mock.respond(
        "/build/proj/_result?repository=repo&arch=arch",
        r#"<result><status package="pk1" code="failed"/></result>"#,
    );
    let fs = engine(&mock);

    // The alias spelling: _failed between project and repo.
    let entries = ls(&fs, "/build/proj/_failed/repo/arch");
    assert_eq!(names(&entries), [".", "..", "pk1"]);

    // The hardlink still points at the canonical tree.
    let mut state = fs.state.lock();
    let attr = state.attrs.find("/build/proj/_failed/repo/arch/pk1").unwrap();
    assert_eq!(attr.hardlink.as_deref(), Some("/build/proj/repo/arch/pk1/_log"));
}

#[test]
fn mangled_project_alias_gets_no_failed_child() {
    let mock = MockTransport::default();
    mock.respond("/build/proj", r#"<directory><entry name="repo"/></directory>"#);
    let fs = engine(&mock);

    let entries = ls(&fs, "/build/proj/_failed");
    assert_eq!(names(&entries), [".", "..", "repo"]);
}

#[test]
fn my_projects_are_symlinks() {
    let mock = MockTransport::default();
    mock.respond(
        "/search/project_id?match=person/@userid='alice'",
        r#"<collection><project name="a"/><project name="b"/></collection>"#,
    );
    let fs = engine(&mock);

    let entries = ls(&fs, "/source/_my_projects");
    assert_eq!(names(&entries), [".", "..", "a", "b"]);
    assert_eq!(fs.readlink("/source/_my_projects/a").unwrap(), "../a");
    assert_eq!(fs.readlink("/source/_my_projects/b").unwrap(), "../b");
}

#[test]
fn my_packages_top_level_lists_distinct_projects() {
    let mock = MockTransport::default();
    mock.respond(
        "/search/package_id?match=person/@userid='alice'",
        r#"<collection>
             <package name="one" project="projA"/>
             <package name="two" project="projA"/>
             <package name="three" project="projB"/>
           </collection>"#,
    );
    let fs = engine(&mock);

    let entries = ls(&fs, "/source/_my_packages");
    assert_eq!(names(&entries), [".", "..", "projA", "projB"]);
    assert!(entries.iter().skip(2).all(|(_, kind)| *kind == NodeKind::Dir));
}

#[test]
fn my_packages_under_a_project_link_into_the_source_tree() {
    let mock = MockTransport::default();
    mock.respond(
        "/search/package_id?match=person/@userid='alice'+and+@project='projA'",
        r#"<collection>
             <package name="one" project="projA"/>
             <package name="two" project="projA"/>
           </collection>"#,
    );
    let fs = engine(&mock);

    let entries = ls(&fs, "/source/_my_packages/projA");
    assert_eq!(names(&entries), [".", "..", "one", "two"]);
    assert_eq!(fs.readlink("/source/_my_packages/projA/one").unwrap(), "../../projA/one");
}

#[test]
fn latest_statistics_link_into_the_source_tree() {
    let mock = MockTransport::default();
    mock.respond(
        "/statistics/latest_added",
        r#"<latest_added>
             <package name="pkg" project="projA" created="2010-07-22T14:03:00Z"/>
           </latest_added>"#,
    );
    let fs = engine(&mock);

    let entries = ls(&fs, "/statistics/latest_added");
    assert_eq!(names(&entries), [".", "..", "pkg"]);
    assert_eq!(
        fs.readlink("/statistics/latest_added/pkg").unwrap(),
        "../../source/projA/pkg"
    );
}

#[test]
fn source_package_listing_records_the_revision() {
    let mock = MockTransport::default();
    mock.respond(
        "/source/proj/pkg?expand=1",
        r#"<directory rev="41"><entry name="pkg.spec" size="9" mtime="5"/></directory>"#,
    );
    let fs = engine(&mock);

    let entries = ls(&fs, "/source/proj/pkg");
    assert_eq!(names(&entries), [".", "..", "pkg.spec", "_activity", "_rating"]);

    let mut state = fs.state.lock();
    assert_eq!(state.dirs.find("/source/proj/pkg").unwrap().rev.as_deref(), Some("41"));
    assert_eq!(state.attrs.find("/source/proj/pkg/pkg.spec").unwrap().rev.as_deref(), Some("41"));
    // The statistics hardlinks inherit the listing's revision too.
    let activity = state.attrs.find("/source/proj/pkg/_activity").unwrap();
    assert_eq!(activity.hardlink.as_deref(), Some("/statistics/activity/proj/pkg"));
    assert_eq!(activity.rev.as_deref(), Some("41"));
}

#[test]
fn published_tree_file_heuristics_apply() {
    let mock = MockTransport::default();
    mock.respond(
        "/published/repo/oss",
        r#"<directory>
             <entry name="content"/>
             <entry name="media.1"/>
             <entry name="repodata.xml"/>
           </directory>"#,
    );
    let fs = engine(&mock);

    let entries = ls(&fs, "/published/repo/oss");
    let kind_of = |wanted: &str| {
        entries.iter().find(|(name, _)| name == wanted).map(|(_, kind)| *kind).unwrap()
    };
    assert_eq!(kind_of("content"), NodeKind::File);
    assert_eq!(kind_of("media.1"), NodeKind::Dir);
    assert_eq!(kind_of("repodata.xml"), NodeKind::File);
}

#[test]
fn request_tree_entries_are_files() {
    let mock = MockTransport::default();
    mock.respond("/request", r#"<directory><entry name="1234"/></directory>"#);
    let fs = engine(&mock);
    let entries = ls(&fs, "/request");
    assert_eq!(entries.last().unwrap(), &("1234".to_string(), NodeKind::File));
}

#[test]
fn directory_nlink_grows_with_subdirectories() {
    let mock = MockTransport::default();
    mock.respond("/build", r#"<directory><entry name="p1"/><entry name="p2"/></directory>"#);
    mock.respond("/build/p1", r#"<directory><entry name="repo"/></directory>"#);
    let fs = engine(&mock);

    ls(&fs, "/build");
    ls(&fs, "/build/p1");

    let mut state = fs.state.lock();
    // p1 started at 2 and gained one subdirectory plus the synthetic _failed.
    assert_eq!(state.attrs.find("/build/p1").unwrap().st.nlink, 4);
}

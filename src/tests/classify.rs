use crate::tests::test_options;
use crate::{NodeKind, classify};

fn plan_for(path: &str) -> crate::RewritePlan {
    classify(path, &test_options())
}

fn synthetic_names(plan: &crate::RewritePlan) -> Vec<&str> {
    plan.synthetic.iter().map(|s| s.name.as_str()).collect()
}

#[test]
fn root_is_synthetic() {
    let plan = plan_for("/");
    assert_eq!(plan.canonical_path, "/");
    assert_eq!(plan.api_path, None);
    assert!(!plan.mangled);
    assert_eq!(synthetic_names(&plan), ["build", "source", "published", "request", "statistics"]);
    assert!(plan.synthetic.iter().all(|s| s.kind == NodeKind::Dir));
}

#[test]
fn top_level_roots() {
    let plan = plan_for("/source");
    assert_eq!(plan.api_path.as_deref(), Some("/source"));
    assert_eq!(synthetic_names(&plan), ["_my_projects", "_my_packages"]);

    let plan = plan_for("/build");
    assert_eq!(synthetic_names(&plan), ["_my_projects"]);

    let plan = plan_for("/published");
    assert!(plan.synthetic.is_empty());

    let plan = plan_for("/statistics");
    assert_eq!(plan.api_path, None);
    assert_eq!(synthetic_names(&plan), ["latest_added", "latest_updated"]);
}

#[test]
fn failed_aliases_are_canonicalized() {
    // build/<p>/_failed/<f>/<b> is equivalent to build/<p>/<f>/<b>/_failed.
    let plan = plan_for("/build/proj/_failed/repo/arch");
    assert_eq!(plan.canonical_path, "/build/proj/repo/arch/_failed");
    assert!(plan.mangled);
    assert_eq!(
        plan.api_path.as_deref(),
        Some("/build/proj/_result?repository=repo&arch=arch")
    );

    // build/<p>/_failed and build/<p>/_failed/<f> strip down.
    let plan = plan_for("/build/proj/_failed");
    assert_eq!(plan.canonical_path, "/build/proj");
    assert!(plan.mangled);
    assert_eq!(plan.api_path.as_deref(), Some("/build/proj"));

    let plan = plan_for("/build/proj/_failed/repo");
    assert_eq!(plan.canonical_path, "/build/proj/repo");
    assert!(plan.mangled);
}

#[test]
fn canonical_failed_dir_maps_to_result_query() {
    let plan = plan_for("/build/proj/repo/arch/_failed");
    assert!(!plan.mangled);
    assert_eq!(
        plan.api_path.as_deref(),
        Some("/build/proj/_result?repository=repo&arch=arch")
    );
    let filter = plan.filter.unwrap();
    assert_eq!((filter.attr, filter.value), ("code", "failed"));
}

#[test]
fn my_projects_and_packages_search() {
    let plan = plan_for("/source/_my_projects");
    assert_eq!(
        plan.api_path.as_deref(),
        Some("/search/project_id?match=person/@userid='alice'")
    );
    assert_eq!(plan.relink_template.as_deref(), Some("../%s"));

    let plan = plan_for("/build/_my_projects");
    assert_eq!(
        plan.api_path.as_deref(),
        Some("/search/project_id?match=person/@userid='alice'")
    );

    let plan = plan_for("/source/_my_packages");
    assert_eq!(
        plan.api_path.as_deref(),
        Some("/search/package_id?match=person/@userid='alice'")
    );
    assert_eq!(plan.relink_template, None);

    let plan = plan_for("/source/_my_packages/proj");
    assert_eq!(
        plan.api_path.as_deref(),
        Some("/search/package_id?match=person/@userid='alice'+and+@project='proj'")
    );
    assert_eq!(plan.relink_template.as_deref(), Some("../../proj/%s"));
}

#[test]
fn source_packages_expand_and_get_statistics_nodes() {
    let plan = plan_for("/source/proj/pkg");
    assert_eq!(plan.api_path.as_deref(), Some("/source/proj/pkg?expand=1"));
    assert_eq!(synthetic_names(&plan), ["_activity", "_rating"]);
    assert_eq!(
        plan.synthetic[0].hardlink.as_deref(),
        Some("/statistics/activity/proj/pkg")
    );
    assert_eq!(
        plan.synthetic[1].hardlink.as_deref(),
        Some("/statistics/rating/proj/pkg")
    );
    assert!(plan.synthetic.iter().all(|s| s.kind == NodeKind::File));
}

#[test]
fn build_tree_synthetic_nodes() {
    let plan = plan_for("/build/proj");
    assert_eq!(synthetic_names(&plan), ["_failed"]);

    let plan = plan_for("/build/proj/repo/arch");
    assert_eq!(synthetic_names(&plan), ["_failed"]);

    let plan = plan_for("/build/proj/repo/arch/pkg");
    assert_eq!(synthetic_names(&plan), ["_history", "_reason", "_status", "_log"]);
    assert!(plan.synthetic.iter().all(|s| s.kind == NodeKind::File));

    // The repository level gets nothing.
    let plan = plan_for("/build/proj/repo");
    assert!(plan.synthetic.is_empty());

    // _my_projects is not a project.
    let plan = plan_for("/build/_my_projects");
    assert!(plan.synthetic.is_empty());
}

#[test]
fn default_is_passthrough() {
    for path in ["/request/123", "/published/repo/oss/x86_64", "/source/proj"] {
        let plan = plan_for(path);
        assert_eq!(plan.canonical_path, path);
        assert_eq!(plan.api_path.as_deref(), Some(path));
        assert!(!plan.mangled);
        assert_eq!(plan.filter, None);
    }
}

#[test]
fn classifier_is_idempotent_on_canonical_paths() {
    for path in [
        "/",
        "/build",
        "/source",
        "/build/proj",
        "/build/proj/repo/arch",
        "/build/proj/repo/arch/_failed",
        "/build/proj/repo/arch/pkg",
        "/source/proj/pkg",
        "/source/_my_projects",
        "/source/_my_packages/proj",
        "/statistics",
        "/statistics/latest_added",
    ] {
        assert_eq!(plan_for(path).canonical_path, path, "{path}");
    }
}

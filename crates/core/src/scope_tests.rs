// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn manifest(allow: &[&str], deny: &[&str], log_only: &[&str]) -> CompiledScope {
    ScopeManifest {
        description: String::new(),
        allow: allow.iter().map(|s| s.to_string()).collect(),
        deny: deny.iter().map(|s| s.to_string()).collect(),
        log_only: log_only.iter().map(|s| s.to_string()).collect(),
    }
    .compile()
}

#[yare::parameterized(
    inside_allow   = { "projects/foo/index.md", PathClass::Allow },
    nested_allow   = { "projects/foo/sub/deep.rs", PathClass::Allow },
    outside_allow  = { "projects/bar/index.md", PathClass::Deny },
    repo_root_file = { "README.md", PathClass::Deny },
)]
fn allow_list_restricts(path: &str, expected: PathClass) {
    let scope = manifest(&["projects/foo/**"], &[], &[]);
    assert_eq!(scope.classify(path), expected);
}

#[test]
fn deny_wins_over_allow() {
    let scope = manifest(&["projects/foo/**"], &["projects/foo/secrets/**"], &[]);
    assert_eq!(scope.classify("projects/foo/code.rs"), PathClass::Allow);
    assert_eq!(scope.classify("projects/foo/secrets/key.pem"), PathClass::Deny);
}

#[test]
fn empty_allow_permits_everything_not_denied() {
    let scope = manifest(&[], &["vendor/**"], &[]);
    assert_eq!(scope.classify("src/main.rs"), PathClass::Allow);
    assert_eq!(scope.classify("vendor/lib.rs"), PathClass::Deny);
}

#[test]
fn log_only_marks_permitted_paths() {
    let scope = manifest(&[], &[], &["docs/**"]);
    assert_eq!(scope.classify("docs/notes.md"), PathClass::LogOnly);
    assert_eq!(scope.classify("src/lib.rs"), PathClass::Allow);
}

#[test]
fn deny_wins_over_log_only() {
    let scope = manifest(&[], &["docs/private/**"], &["docs/**"]);
    assert_eq!(scope.classify("docs/private/draft.md"), PathClass::Deny);
    assert_eq!(scope.classify("docs/public.md"), PathClass::LogOnly);
}

#[test]
fn empty_path_is_denied() {
    let scope = manifest(&[], &[], &[]);
    assert_eq!(scope.classify(""), PathClass::Deny);
    assert_eq!(scope.classify("./"), PathClass::Deny);
}

#[test]
fn paths_and_patterns_are_normalized() {
    let scope = manifest(&["./projects/foo/**"], &[], &[]);
    assert_eq!(scope.classify("./projects/foo/a.txt"), PathClass::Allow);
    assert_eq!(scope.classify("projects\\foo\\a.txt"), PathClass::Allow);
}

#[test]
fn fallback_allows_project_subtree_only() {
    let scope = ScopeManifest::fallback("projects/foo").compile();
    assert_eq!(scope.classify("projects/foo/any/file"), PathClass::Allow);
    assert_eq!(scope.classify("projects/bar/file"), PathClass::Deny);
}

#[test]
fn find_violations_keeps_order_and_normalizes() {
    let scope = manifest(&["projects/foo/**"], &[], &[]);
    let violations =
        scope.find_violations(["projects/bar/b.md", "projects/foo/ok.md", "./README.md"]);
    assert_eq!(violations, vec!["projects/bar/b.md".to_string(), "README.md".to_string()]);
}

#[test]
fn invalid_patterns_are_dropped_not_fatal() {
    // `a**` is an invalid recursive wildcard for glob; the deny list loses
    // it but classification still runs.
    let scope = manifest(&[], &["a**"], &[]);
    assert_eq!(scope.classify("abc"), PathClass::Allow);
}

#[test]
fn manifest_serde_round_trip() {
    let manifest = ScopeManifest {
        description: "frontend only".into(),
        allow: vec!["web/**".into()],
        deny: vec!["web/dist/**".into()],
        log_only: vec!["web/docs/**".into()],
    };
    let json = serde_json::to_string(&manifest).unwrap();
    let parsed: ScopeManifest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, manifest);
}

proptest! {
    #[test]
    fn deny_always_wins(path in "[a-z]{1,8}/[a-z]{1,8}\\.[a-z]{1,3}") {
        let scope = manifest(&["**"], &["**"], &["**"]);
        prop_assert_eq!(scope.classify(&path), PathClass::Deny);
    }

    #[test]
    fn empty_allow_never_denies_undenied(path in "[a-z]{1,8}/[a-z]{1,8}") {
        let scope = manifest(&[], &[], &[]);
        prop_assert_eq!(scope.classify(&path), PathClass::Allow);
    }
}

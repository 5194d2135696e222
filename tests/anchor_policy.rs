//! Integration tests for the anchored path sandbox.

use std::fs;
use std::path::PathBuf;

use proptest::prelude::*;
use streamflow_core::{AnchorPolicy, StreamError, StreamPolicy};
use tempfile::{TempDir, tempdir};

/// Creates `<tmp>/data` and `<tmp>/logs` and a policy anchoring both.
fn sandbox() -> (TempDir, AnchorPolicy, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let data = dir.path().join("data");
    fs::create_dir_all(data.join("sub")).expect("mkdir data");
    fs::create_dir_all(dir.path().join("logs")).expect("mkdir logs");
    let policy = AnchorPolicy::new([("data", data.clone()), ("logs", dir.path().join("logs"))])
        .expect("policy");
    let canonical = data.canonicalize().expect("canonical data");
    (dir, policy, canonical)
}

#[test]
fn logical_paths_map_into_the_anchor() {
    let (_dir, policy, data) = sandbox();
    let resolved = policy.resolve_path("data/sub/events.jsonl").expect("resolve");
    assert_eq!(resolved, data.join("sub").join("events.jsonl"));
}

#[test]
fn scheme_and_leading_separators_are_stripped() {
    let (_dir, policy, data) = sandbox();
    let expected = data.join("x.log");
    assert_eq!(policy.resolve_path("file://data/x.log").expect("scheme"), expected);
    assert_eq!(policy.resolve_path("/data/x.log").expect("leading slash"), expected);
}

#[test]
fn repeated_anchor_name_is_deduplicated() {
    let (_dir, policy, _) = sandbox();
    assert_eq!(
        policy.resolve_path("data/data/x").expect("doubled"),
        policy.resolve_path("data/x").expect("single")
    );
    assert_eq!(
        policy.resolve_path("data/data/data/x").expect("tripled"),
        policy.resolve_path("data/x").expect("single")
    );
}

#[test]
fn only_the_anchor_directory_name_is_deduplicated() {
    let dir = tempdir().expect("tempdir");
    let data = dir.path().join("project").join("data");
    fs::create_dir_all(&data).expect("mkdir");
    let policy = AnchorPolicy::new([("data", &data)]).expect("policy");
    let data = data.canonicalize().expect("canonical");

    assert_eq!(
        policy.resolve_path("data/project/x").expect("ancestor name kept"),
        data.join("project").join("x")
    );
    assert_eq!(
        policy.resolve_path("data/x/data").expect("trailing name kept"),
        data.join("x").join("data")
    );
}

#[test]
fn resolution_is_idempotent() {
    let (_dir, policy, _) = sandbox();
    let once = policy.resolve("data/sub/../sub/a.txt").expect("first pass");
    let twice = policy.resolve(&once).expect("second pass");
    assert_eq!(once, twice);
}

#[test]
fn traversal_is_blocked() {
    let (_dir, policy, _) = sandbox();
    let err = policy
        .resolve_path("data/../../etc/passwd")
        .expect_err("must not escape");
    assert!(matches!(err, StreamError::PathTraversal { .. }));
    assert!(err.is_security());
}

#[test]
fn sibling_anchor_is_still_an_escape() {
    let (_dir, policy, _) = sandbox();
    let err = policy.resolve_path("data/../logs/x").expect_err("cross-anchor hop");
    assert!(matches!(err, StreamError::PathTraversal { .. }));
}

#[test]
fn absolute_path_dressed_as_anchor_is_blocked() {
    let (_dir, policy, data) = sandbox();
    let sneaky = format!("{}/../../outside.txt", data.display());
    let err = policy.resolve_path(&sneaky).expect_err("absolute escape");
    assert!(matches!(err, StreamError::PathTraversal { .. }));
}

#[test]
fn unknown_anchor_lists_registered_keys() {
    let (_dir, policy, _) = sandbox();
    match policy.resolve_path("tmp/x.log") {
        Err(StreamError::Unauthorized { key, available }) => {
            assert_eq!(key, "tmp");
            assert_eq!(available, vec!["data", "logs"]);
        }
        other => panic!("expected Unauthorized, got {other:?}"),
    }
}

#[test]
fn anchors_are_never_created() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("missing_folder");
    assert!(AnchorPolicy::new([("bad", &missing)]).is_err());
    assert!(!missing.exists());
}

fn segment() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-z]{1,8}",
        1 => Just("..".to_string()),
        1 => Just(".".to_string()),
        1 => Just("data".to_string()),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn resolved_paths_stay_inside_the_anchor(segments in prop::collection::vec(segment(), 1..6)) {
        let (_dir, policy, data) = sandbox();
        let logical = format!("data/{}", segments.join("/"));
        match policy.resolve_path(&logical) {
            Ok(path) => {
                prop_assert!(
                    path.starts_with(&data),
                    "{} escaped {}",
                    path.display(),
                    data.display()
                );
                let again = policy
                    .resolve_path(path.to_str().expect("utf-8"))
                    .expect("idempotent");
                prop_assert_eq!(again, path);
            }
            Err(err) => prop_assert!(
                matches!(err, StreamError::PathTraversal { .. }),
                "unexpected error: {:?}",
                err
            ),
        }
    }
}

// tests/build_scenarios.rs
//
// End-to-end builds through `run_targets` with the real shell and a
// temporary project directory.
#![cfg(unix)]

mod common;
use crate::common::{backdate, init_tracing, read_file, touch, write_file};

use std::path::Path;

use tempfile::TempDir;

use emk::dag::NodeId;
use emk::engine::RunOptions;
use emk::errors::EmkError;
use emk::run_targets;

const TWO_LEVEL: &str = r#"
[tasks]
all = "build/x.txt"

[outputs.build]
"x.txt" = { deps = "src/x.txt", run = "cp $< $@" }
"#;

fn project(emkfile: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "Emkfile.toml", emkfile);
    dir
}

fn options(dir: &Path) -> RunOptions {
    RunOptions {
        cwd: dir.to_path_buf(),
        ..RunOptions::default()
    }
}

async fn build(dir: &Path, targets: &[&str]) -> emk::errors::Result<emk::engine::RunReport> {
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    run_targets(&dir.join("Emkfile.toml"), &targets, &options(dir)).await
}

#[tokio::test]
async fn two_level_build_runs_only_what_changed() {
    init_tracing();
    let dir = project(TWO_LEVEL);
    write_file(dir.path(), "src/x.txt", "hi");
    backdate(dir.path(), "src/x.txt");

    let first = build(dir.path(), &["all"]).await.unwrap();
    assert_eq!(first.executed, vec![NodeId::output("build/x.txt")]);
    assert_eq!(read_file(dir.path(), "build/x.txt"), "hi");

    let second = build(dir.path(), &["all"]).await.unwrap();
    assert!(second.executed.is_empty());
    assert_eq!(second.up_to_date, vec![NodeId::output("build/x.txt")]);

    write_file(dir.path(), "src/x.txt", "hello");
    touch(dir.path(), "src/x.txt");
    let third = build(dir.path(), &["all"]).await.unwrap();
    assert_eq!(third.executed, vec![NodeId::output("build/x.txt")]);
    assert_eq!(read_file(dir.path(), "build/x.txt"), "hello");
}

#[tokio::test]
async fn default_target_is_used_without_arguments() {
    init_tracing();
    let dir = project(TWO_LEVEL);
    write_file(dir.path(), "src/x.txt", "hi");
    backdate(dir.path(), "src/x.txt");

    let report = build(dir.path(), &[]).await.unwrap();
    assert_eq!(report.executed.len(), 1);
    assert!(dir.path().join("build/x.txt").is_file());
}

#[tokio::test]
async fn copy_leaves_produce_identical_files_once() {
    init_tracing();
    let dir = project(
        r#"
        [tasks]
        all = ["dist/a.txt", "dist/b.txt"]

        [outputs.dist]
        ":file(*).txt" = { copy = "src/$file.txt" }
        "#,
    );
    write_file(dir.path(), "src/a.txt", "alpha\n");
    write_file(dir.path(), "src/b.txt", "beta\n");
    backdate(dir.path(), "src/a.txt");
    backdate(dir.path(), "src/b.txt");

    let first = build(dir.path(), &[]).await.unwrap();
    assert_eq!(first.executed.len(), 2);
    assert_eq!(read_file(dir.path(), "dist/a.txt"), "alpha\n");
    assert_eq!(read_file(dir.path(), "dist/b.txt"), "beta\n");

    let second = build(dir.path(), &[]).await.unwrap();
    assert!(second.executed.is_empty());
    assert_eq!(second.up_to_date.len(), 2);
}

#[tokio::test]
async fn conflicting_definitions_abort_before_running_anything() {
    init_tracing();
    let dir = project(
        r#"
        [tasks]
        all = "build/*"

        [outputs.build]
        "y.txt" = { run = "echo one > $@" }
        "{y,z}.txt" = { run = "echo two > $@" }
        "#,
    );

    let err = build(dir.path(), &[]).await.unwrap_err();
    match err {
        EmkError::ConflictingRecipeDefinition { id, .. } => assert_eq!(id, "build/y.txt"),
        other => panic!("expected conflict, got {other:?}"),
    }
    assert!(!dir.path().join("build").exists());
}

#[tokio::test]
async fn failing_recipe_reports_its_exit_code() {
    init_tracing();
    let dir = project(
        r#"
        [tasks]
        broken = { run = "exit 3" }
        "#,
    );

    let err = build(dir.path(), &["broken"]).await.unwrap_err();
    match err {
        EmkError::RecipeFailed { node, exit_code } => {
            assert_eq!(node, "#broken");
            assert_eq!(exit_code, 3);
        }
        other => panic!("expected RecipeFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn bindings_reach_the_script_as_variables() {
    init_tracing();
    let dir = project(
        r#"
        [outputs.greet]
        ":name(*).txt" = { run = "printf '%s' \"$name\" > $@" }
        "#,
    );

    let report = build(dir.path(), &["greet/world.txt"]).await.unwrap();
    assert_eq!(report.executed, vec![NodeId::output("greet/world.txt")]);
    assert_eq!(read_file(dir.path(), "greet/world.txt"), "world");
}

#[tokio::test]
async fn recipe_that_creates_nothing_fails() {
    init_tracing();
    let dir = project(
        r#"
        [outputs]
        "ghost.txt" = { run = "true" }
        "#,
    );

    let err = build(dir.path(), &["ghost.txt"]).await.unwrap_err();
    assert!(matches!(err, EmkError::OutputNotProduced { path } if path == "ghost.txt"));
}

#[tokio::test]
async fn dry_run_executes_nothing() {
    init_tracing();
    let dir = project(TWO_LEVEL);
    write_file(dir.path(), "src/x.txt", "hi");

    let targets = vec!["all".to_string()];
    let opts = RunOptions {
        dry_run: true,
        ..options(dir.path())
    };
    let report = run_targets(&dir.path().join("Emkfile.toml"), &targets, &opts)
        .await
        .unwrap();
    assert_eq!(report.executed_count(), 0);
    assert!(!dir.path().join("build").exists());
}

#[tokio::test]
async fn force_rebuilds_up_to_date_outputs() {
    init_tracing();
    let dir = project(TWO_LEVEL);
    write_file(dir.path(), "src/x.txt", "hi");
    backdate(dir.path(), "src/x.txt");
    build(dir.path(), &[]).await.unwrap();

    let targets = vec!["all".to_string()];
    let opts = RunOptions {
        force: true,
        ..options(dir.path())
    };
    let report = run_targets(&dir.path().join("Emkfile.toml"), &targets, &opts)
        .await
        .unwrap();
    assert_eq!(report.executed, vec![NodeId::output("build/x.txt")]);
}

#[tokio::test]
async fn unknown_target_is_fatal() {
    init_tracing();
    let dir = project(TWO_LEVEL);

    let err = build(dir.path(), &["nope"]).await.unwrap_err();
    assert!(matches!(err, EmkError::NoSuchTarget { target } if target == "nope"));
}

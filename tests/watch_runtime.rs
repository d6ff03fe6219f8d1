// tests/watch_runtime.rs
//
// Drives WatchRuntime with hand-made events; no real watcher involved.

mod common;
use crate::common::builders::engine_with;
use crate::common::{init_tracing, with_timeout, FakeRunner};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use emk::dag::NodeId;
use emk::engine::{Engine, RuntimeEvent, WatchExit, WatchRuntime};
use emk::errors::{EmkError, Result};
use emk::fs::mock::MockFileSystem;

const PER_FILE: &str = r#"
[tasks]
all = ["build/x.txt", "build/y.txt"]

[outputs.build]
":name(*).txt" = { deps = "src/$name.txt", run = "cp $< $@" }
"#;

struct Harness {
    fs: Arc<MockFileSystem>,
    runner: Arc<FakeRunner>,
    tx: mpsc::Sender<RuntimeEvent>,
    handle: JoinHandle<Result<WatchExit>>,
}

async fn start() -> Harness {
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("/p/src/x.txt", "x");
    fs.add_file("/p/src/y.txt", "y");
    let runner = Arc::new(
        FakeRunner::new()
            .writing_to(fs.clone())
            .with_delay(Duration::from_millis(50)),
    );
    let engine: Engine = engine_with(PER_FILE, "/p", fs.clone(), runner.clone());

    let mut plan = engine.plan(&[]).unwrap();
    engine.execute(&mut plan, false).await.unwrap();
    runner.clear();

    let (tx, rx) = mpsc::channel(16);
    let runtime = WatchRuntime::new(engine, plan, tx.clone(), rx);
    let handle = tokio::spawn(runtime.run());
    Harness {
        fs,
        runner,
        tx,
        handle,
    }
}

async fn wait_for_runs(runner: &FakeRunner, n: usize) {
    while runner.count() < n {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn changes_during_a_chain_are_serialized() {
    init_tracing();
    let h = start().await;

    h.fs.touch("/p/src/x.txt");
    h.fs.touch("/p/src/y.txt");
    h.tx.send(RuntimeEvent::SourceChanged {
        source: NodeId::source("src/x.txt"),
    })
    .await
    .unwrap();
    h.tx.send(RuntimeEvent::SourceChanged {
        source: NodeId::source("src/y.txt"),
    })
    .await
    .unwrap();

    with_timeout(wait_for_runs(&h.runner, 2)).await;
    // let the second chain report back before asking to stop
    tokio::time::sleep(Duration::from_millis(100)).await;

    h.tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();
    let exit = with_timeout(h.handle).await.unwrap().unwrap();

    assert_eq!(exit, WatchExit::Shutdown);
    assert_eq!(h.runner.labels(), vec!["build/x.txt", "build/y.txt"]);
    assert_eq!(h.runner.max_concurrent(), 1);
}

#[tokio::test]
async fn unchanged_source_runs_nothing() {
    init_tracing();
    let h = start().await;

    h.tx.send(RuntimeEvent::SourceChanged {
        source: NodeId::source("src/x.txt"),
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.tx.send(RuntimeEvent::ShutdownRequested).await.unwrap();

    let exit = with_timeout(h.handle).await.unwrap().unwrap();
    assert_eq!(exit, WatchExit::Shutdown);
    assert_eq!(h.runner.count(), 0);
}

#[tokio::test]
async fn removed_source_stops_with_an_error() {
    init_tracing();
    let h = start().await;

    h.tx.send(RuntimeEvent::SourceRemoved {
        source: NodeId::source("src/x.txt"),
    })
    .await
    .unwrap();

    let err = with_timeout(h.handle).await.unwrap().unwrap_err();
    assert!(matches!(err, EmkError::SourceRemoved { path } if path == "src/x.txt"));
}

#[tokio::test]
async fn config_change_requests_a_reload() {
    init_tracing();
    let h = start().await;

    h.tx.send(RuntimeEvent::ConfigChanged).await.unwrap();

    let exit = with_timeout(h.handle).await.unwrap().unwrap();
    assert_eq!(exit, WatchExit::Reload);
    assert_eq!(h.runner.count(), 0);
}

#[tokio::test]
async fn config_change_mid_chain_waits_for_the_chain() {
    init_tracing();
    let h = start().await;

    h.fs.touch("/p/src/x.txt");
    h.fs.touch("/p/src/y.txt");
    h.tx.send(RuntimeEvent::SourceChanged {
        source: NodeId::source("src/x.txt"),
    })
    .await
    .unwrap();
    h.tx.send(RuntimeEvent::ConfigChanged).await.unwrap();
    h.tx.send(RuntimeEvent::SourceChanged {
        source: NodeId::source("src/y.txt"),
    })
    .await
    .unwrap();

    let exit = with_timeout(h.handle).await.unwrap().unwrap();
    assert_eq!(exit, WatchExit::Reload);
    // the chain for x finished; the queued y chain was dropped by the reload
    assert_eq!(h.runner.labels(), vec!["build/x.txt"]);
}

#[tokio::test]
async fn failing_chain_stops_the_loop() {
    init_tracing();
    let fs = Arc::new(MockFileSystem::new());
    fs.add_file("/p/src/x.txt", "x");
    fs.add_file("/p/src/y.txt", "y");
    fs.add_file("/p/build/x.txt", "x");
    fs.add_file("/p/build/y.txt", "y");
    let runner = Arc::new(FakeRunner::new().exiting_with(1));
    let engine = engine_with(PER_FILE, "/p", fs.clone(), runner.clone());
    let plan = engine.plan(&[]).unwrap();

    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(WatchRuntime::new(engine, plan, tx.clone(), rx).run());

    fs.touch("/p/src/x.txt");
    tx.send(RuntimeEvent::SourceChanged {
        source: NodeId::source("src/x.txt"),
    })
    .await
    .unwrap();

    let err = with_timeout(handle).await.unwrap().unwrap_err();
    match err {
        EmkError::RecipeFailed { node, exit_code } => {
            assert_eq!(node, "build/x.txt");
            assert_eq!(exit_code, 1);
        }
        other => panic!("expected RecipeFailed, got {other:?}"),
    }
    assert_eq!(runner.labels(), vec!["build/x.txt"]);
}

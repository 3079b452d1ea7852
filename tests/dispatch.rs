//! Integration tests for resolving and running targets with real processes

mod common;

use common::{create_test_config, read_lines};
use rmake::config::{build_registry, parse_config_file};
use rmake::error::{ConfigError, EXIT_ACTION_FAILED, EXIT_SUCCESS};
use rmake::runner::{
    Dispatch, Dispatcher, FileStateStore, ProcessExecutor, RunOptions, StalenessOracle,
    TargetState, Verbosity,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn dispatcher(project_dir: &Path, config_path: &Path) -> Dispatcher {
    let config = parse_config_file(config_path).unwrap();
    let registry = build_registry(&config).unwrap();
    let store = FileStateStore::open_in(project_dir).unwrap();

    Dispatcher::new(
        Arc::new(registry),
        Arc::new(ProcessExecutor::new(project_dir)),
        StalenessOracle::new(project_dir).with_store(Arc::new(store)),
    )
}

fn silent() -> RunOptions {
    RunOptions::new().with_verbosity(Verbosity::Silent)
}

const PIPELINE: &str = r#"
targets:
  app:
    deps: [obj]
    outputs: app.bin
    run: echo app >> log.txt && cat obj.o > app.bin

  obj:
    outputs: obj.o
    run: echo obj >> log.txt && echo compiled > obj.o

  clean:
    phony: true
    run: rm -f app.bin obj.o
"#;

#[tokio::test]
async fn test_builds_prerequisites_first() {
    let (temp_dir, config_path) = create_test_config(PIPELINE);
    let dispatcher = dispatcher(temp_dir.path(), &config_path);

    let dispatch = dispatcher.run(Some("app"), &silent()).await.unwrap();

    assert_eq!(dispatch.exit_code(), EXIT_SUCCESS);
    assert_eq!(read_lines(&temp_dir.path().join("log.txt")), vec!["obj", "app"]);
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("app.bin")).unwrap(),
        "compiled\n"
    );
}

#[tokio::test]
async fn test_second_run_skips_fresh_targets() {
    let (temp_dir, config_path) = create_test_config(PIPELINE);

    let first = dispatcher(temp_dir.path(), &config_path)
        .run(Some("app"), &silent())
        .await
        .unwrap();
    assert_eq!(first.exit_code(), EXIT_SUCCESS);

    // A fresh dispatcher reads the state recorded by the first run
    let second = dispatcher(temp_dir.path(), &config_path)
        .run(Some("app"), &silent())
        .await
        .unwrap();

    let report = second.report().unwrap();
    assert!(report.success);
    assert_eq!(report.skipped(), vec!["obj", "app"]);
    assert_eq!(read_lines(&temp_dir.path().join("log.txt")), vec!["obj", "app"]);
}

#[tokio::test]
async fn test_missing_output_rebuilds_dependents() {
    let (temp_dir, config_path) = create_test_config(PIPELINE);
    dispatcher(temp_dir.path(), &config_path)
        .run(Some("app"), &silent())
        .await
        .unwrap();

    fs::remove_file(temp_dir.path().join("obj.o")).unwrap();

    let dispatch = dispatcher(temp_dir.path(), &config_path)
        .run(Some("app"), &silent())
        .await
        .unwrap();

    let report = dispatch.report().unwrap();
    assert_eq!(report.executed(), vec!["obj", "app"]);
    assert_eq!(
        read_lines(&temp_dir.path().join("log.txt")),
        vec!["obj", "app", "obj", "app"]
    );
}

#[tokio::test]
async fn test_changed_action_is_stale() {
    let (temp_dir, config_path) = create_test_config(PIPELINE);
    dispatcher(temp_dir.path(), &config_path)
        .run(Some("obj"), &silent())
        .await
        .unwrap();

    fs::write(
        &config_path,
        PIPELINE.replace("echo compiled > obj.o", "echo optimized > obj.o"),
    )
    .unwrap();

    let dispatch = dispatcher(temp_dir.path(), &config_path)
        .run(Some("obj"), &silent())
        .await
        .unwrap();

    assert_eq!(dispatch.report().unwrap().executed(), vec!["obj"]);
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("obj.o")).unwrap(),
        "optimized\n"
    );
}

#[tokio::test]
async fn test_failure_stops_dependents() {
    let (temp_dir, config_path) = create_test_config(
        r#"
targets:
  release:
    phony: true
    deps: [test]
    run: touch released
  test:
    phony: true
    run: exit 7
"#,
    );
    let dispatcher = dispatcher(temp_dir.path(), &config_path);

    let dispatch = dispatcher.run(Some("release"), &silent()).await.unwrap();

    assert_eq!(dispatch.exit_code(), EXIT_ACTION_FAILED);
    let report = dispatch.report().unwrap();
    assert_eq!(report.state("test"), Some(TargetState::Failed));
    assert_eq!(report.state("release"), Some(TargetState::Pending));
    assert_eq!(
        report.failures().next().unwrap().outcome.clone(),
        rmake::runner::Outcome::Failed(rmake::error::ExecutionError::ActionFailed {
            exit_code: Some(7),
            output: String::new(),
        })
    );
    assert!(!temp_dir.path().join("released").exists());
}

#[tokio::test]
async fn test_keep_going_runs_independent_targets() {
    let (temp_dir, config_path) = create_test_config(
        r#"
targets:
  all:
    phony: true
    deps: [broken, docs, after-broken]
    run: "true"
  broken:
    phony: true
    run: "false"
  after-broken:
    phony: true
    deps: [broken]
    run: touch after
  docs:
    outputs: docs.html
    run: touch docs.html
"#,
    );
    let dispatcher = dispatcher(temp_dir.path(), &config_path);
    let options = silent().with_fail_fast(false);

    let dispatch = dispatcher.run(Some("all"), &options).await.unwrap();

    let report = dispatch.report().unwrap();
    assert!(!report.success);
    assert_eq!(report.state("broken"), Some(TargetState::Failed));
    assert_eq!(report.state("docs"), Some(TargetState::Succeeded));
    assert_eq!(report.state("after-broken"), Some(TargetState::Blocked));
    assert_eq!(report.state("all"), Some(TargetState::Blocked));
    assert!(temp_dir.path().join("docs.html").exists());
    assert!(!temp_dir.path().join("after").exists());
}

#[tokio::test]
async fn test_timeout_fails_target() {
    let (temp_dir, config_path) = create_test_config(
        r#"
targets:
  slow:
    phony: true
    run: sleep 5
"#,
    );
    let dispatcher = dispatcher(temp_dir.path(), &config_path);
    let options = silent().with_timeout(Some(Duration::from_millis(200)));

    let dispatch = dispatcher.run(Some("slow"), &options).await.unwrap();

    assert_eq!(dispatch.exit_code(), EXIT_ACTION_FAILED);
    let failure = dispatch.report().unwrap().failures().next().unwrap();
    match &failure.outcome {
        rmake::runner::Outcome::Failed(e) => assert!(e.is_timeout()),
        other => panic!("Expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_target_runs_in_its_directory() {
    let (temp_dir, config_path) = create_test_config(
        r#"
targets:
  site:
    dir: web
    outputs: web/index.html
    run: touch index.html
"#,
    );
    fs::create_dir(temp_dir.path().join("web")).unwrap();
    let dispatcher = dispatcher(temp_dir.path(), &config_path);

    let dispatch = dispatcher.run(Some("site"), &silent()).await.unwrap();

    assert_eq!(dispatch.exit_code(), EXIT_SUCCESS);
    assert!(temp_dir.path().join("web/index.html").exists());
}

#[tokio::test]
async fn test_unknown_prerequisite_names_referrer() {
    let (temp_dir, config_path) = create_test_config(
        r#"
targets:
  app:
    deps: [codegen]
    run: "true"
"#,
    );
    let dispatcher = dispatcher(temp_dir.path(), &config_path);

    let err = dispatcher.run(Some("app"), &silent()).await.unwrap_err();

    assert_eq!(
        err,
        ConfigError::UnknownTarget {
            name: "codegen".to_string(),
            referenced_by: Some("app".to_string()),
        }
    );
}

#[tokio::test]
async fn test_cycle_path_is_reported() {
    let (temp_dir, config_path) = create_test_config(
        r#"
targets:
  a:
    deps: [b]
    run: touch a
  b:
    deps: [c]
    run: touch b
  c:
    deps: [a]
    run: touch c
"#,
    );
    let dispatcher = dispatcher(temp_dir.path(), &config_path);

    let err = dispatcher.run(Some("a"), &silent()).await.unwrap_err();

    assert_eq!(
        err,
        ConfigError::Cycle {
            path: vec!["a", "b", "c", "a"].into_iter().map(String::from).collect(),
        }
    );
    for name in ["a", "b", "c"] {
        assert!(!temp_dir.path().join(name).exists());
    }
}

#[tokio::test]
async fn test_dry_run_plans_without_running() {
    let (temp_dir, config_path) = create_test_config(PIPELINE);
    let dispatcher = dispatcher(temp_dir.path(), &config_path);

    let dispatch = dispatcher
        .run(None, &silent().with_dry_run(true))
        .await
        .unwrap();

    match dispatch {
        Dispatch::DryRun(plan) => assert_eq!(plan.names(), vec!["obj", "app"]),
        other => panic!("Expected dry run, got {:?}", other),
    }
    assert!(!temp_dir.path().join("log.txt").exists());
}

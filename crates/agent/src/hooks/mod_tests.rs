// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

use tempfile::tempdir;

use super::*;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn env() -> HookEnv {
    HookEnv { session_number: 1, mode: Mode::Build, counter: 1, log_file: PathBuf::from("/tmp/wakeloop-test.log") }
}

#[tokio::test]
async fn runs_unsuffixed_hooks_in_every_mode() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "01-always.sh", "#!/bin/sh\nexit 0\n");
    let runner = HookRunner::new(dir.path(), HookBudget::pre_session());

    let results = runner.run(Mode::Audit, &env()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].class, HookClass::Success);
}

#[tokio::test]
async fn mode_suffixed_hook_only_runs_for_its_mode() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "01-build-only_B.sh", "#!/bin/sh\nexit 0\n");
    let runner = HookRunner::new(dir.path(), HookBudget::pre_session());

    let build_results = runner.run(Mode::Build, &env()).await.unwrap();
    assert_eq!(build_results.len(), 1);

    let engage_results = runner.run(Mode::Engage, &env()).await.unwrap();
    assert!(engage_results.is_empty());
}

#[tokio::test]
async fn nonzero_exit_without_fatal_manifest_is_warn() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "01-flaky.sh", "#!/bin/sh\nexit 3\n");
    let runner = HookRunner::new(dir.path(), HookBudget::pre_session());

    let results = runner.run(Mode::Build, &env()).await.unwrap();
    assert_eq!(results[0].class, HookClass::Warn);
    assert_eq!(results[0].exit, Some(3));
}

#[tokio::test]
async fn nonzero_exit_with_fatal_manifest_is_fatal() {
    let dir = tempdir().unwrap();
    let script = write_script(dir.path(), "01-critical.sh", "#!/bin/sh\nexit 1\n");
    let mut manifest_name = script.as_os_str().to_os_string();
    manifest_name.push(".json");
    std::fs::write(manifest_name, r#"{"fatal_on_nonzero": true}"#).unwrap();

    let runner = HookRunner::new(dir.path(), HookBudget::pre_session());
    let results = runner.run(Mode::Build, &env()).await.unwrap();
    assert_eq!(results[0].class, HookClass::Fatal);
}

#[tokio::test]
async fn hook_past_per_hook_timeout_never_hangs_the_batch() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "01-slow.sh", "#!/bin/sh\nsleep 5\nexit 0\n");
    let budget = HookBudget { per_hook_timeout: Duration::from_millis(50), global_budget: Duration::from_secs(90), max_parallel: 4 };
    let runner = HookRunner::new(dir.path(), budget);

    let results = runner.run(Mode::Build, &env()).await.unwrap();
    assert_eq!(results[0].exit, None);
}

#[tokio::test]
async fn global_budget_exhaustion_skips_remaining_hooks() {
    let dir = tempdir().unwrap();
    write_script(dir.path(), "01-slow.sh", "#!/bin/sh\nsleep 1\nexit 0\n");
    write_script(dir.path(), "02-never-runs.sh", "#!/bin/sh\nexit 0\n");
    let budget = HookBudget { per_hook_timeout: Duration::from_secs(2), global_budget: Duration::from_millis(50), max_parallel: 1 };
    let runner = HookRunner::new(dir.path(), budget);

    let results = runner.run(Mode::Build, &env()).await.unwrap();
    assert!(results.iter().any(|r| r.class == HookClass::BudgetExceeded));
}

#[test]
fn missing_hooks_dir_yields_no_hooks() {
    let runner = HookRunner::new("/nonexistent/path/for/wakeloop/hooks", HookBudget::pre_session());
    let hooks = runner.discover(Mode::Build).unwrap();
    assert!(hooks.is_empty());
}

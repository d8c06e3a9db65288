//! Orchestrator contract tests: one testbed per session, builds strictly
//! in order, duplicate names rejected, teardown guaranteed.

mod helpers;

use helpers::TestEnv;
use reprocheck::error::Error;
use reprocheck::orchestrator::Orchestrator;
use reprocheck::variation::VariationSpec;
use std::fs;

#[test]
fn test_builds_run_in_submission_order() {
    let env = TestEnv::new();
    fs::write(env.source.join("in.txt"), "data\n").unwrap();
    let test_args = env.test_args("cp in.txt out.txt", "out.txt");
    let spawner = env.spawner();

    let mut session =
        Orchestrator::prime_on(&spawner, &test_args, &env.testbed_args()).unwrap();
    let a = session.submit("alpha", &VariationSpec::empty()).unwrap();
    let b = session.submit("beta", &VariationSpec::empty()).unwrap();
    let c = session.submit("gamma", &VariationSpec::empty()).unwrap();
    session.close().unwrap();

    assert_eq!(a, env.results.join("alpha"));
    assert_eq!(b, env.results.join("beta"));
    assert_eq!(c, env.results.join("gamma"));

    // The copydown events mirror the submission order.
    let downs: Vec<_> = env
        .events()
        .into_iter()
        .filter(|e| e.starts_with("copydown"))
        .collect();
    assert_eq!(downs.len(), 3);
    assert!(downs[0].contains("build-alpha"));
    assert!(downs[1].contains("build-beta"));
    assert!(downs[2].contains("build-gamma"));
}

#[test]
fn test_artifacts_mirror_glob_under_source_root() {
    let env = TestEnv::new();
    fs::create_dir_all(env.source.join("pkg")).unwrap();
    fs::write(env.source.join("pkg/in.txt"), "data\n").unwrap();
    let test_args = env.test_args("cp pkg/in.txt pkg/out.txt", "pkg/out.txt");
    let spawner = env.spawner();

    let mut session =
        Orchestrator::prime_on(&spawner, &test_args, &env.testbed_args()).unwrap();
    let dir = session.submit("control", &VariationSpec::empty()).unwrap();
    session.close().unwrap();

    // Parent directories are preserved under the fixed source-root name.
    let artifact = dir.join("source-root/pkg/out.txt");
    assert_eq!(fs::read_to_string(artifact).unwrap(), "data\n");
}

#[test]
fn test_duplicate_name_rejected_before_any_sandbox_command() {
    let env = TestEnv::new();
    fs::write(env.source.join("in.txt"), "data\n").unwrap();
    let test_args = env.test_args("cp in.txt out.txt", "out.txt");
    let spawner = env.spawner();

    let mut session =
        Orchestrator::prime_on(&spawner, &test_args, &env.testbed_args()).unwrap();
    session.submit("control", &VariationSpec::empty()).unwrap();

    let events_before = env.events().len();
    let err = session
        .submit("control", &VariationSpec::empty())
        .err()
        .unwrap();
    assert!(matches!(err, Error::DuplicateBuildName(name) if name == "control"));
    // Nothing crossed the testbed boundary for the rejected submission.
    assert_eq!(env.events().len(), events_before);

    session.close().unwrap();
}

#[test]
fn test_failed_build_surfaces_testbed_failure() {
    let env = TestEnv::new();
    let test_args = env.test_args("exit 7", "out.txt");
    let spawner = env.spawner();

    let mut session =
        Orchestrator::prime_on(&spawner, &test_args, &env.testbed_args()).unwrap();
    let err = session
        .submit("control", &VariationSpec::empty())
        .err()
        .unwrap();
    assert!(matches!(err, Error::TestbedFailure { code: 7, .. }));
    session.close().unwrap();
}

#[test]
fn test_session_close_stops_testbed_cleanly() {
    let env = TestEnv::new();
    fs::write(env.source.join("in.txt"), "data\n").unwrap();
    let test_args = env.test_args("cp in.txt out.txt", "out.txt");
    let spawner = env.spawner();

    Orchestrator::with_session(&spawner, &test_args, &env.testbed_args(), |session| {
        session.submit("control", &VariationSpec::empty())
    })
    .unwrap();

    assert_eq!(env.exit_code(), Some(0));
    let events = env.events();
    assert!(!events.iter().any(|e| e == "poison"));
    assert_eq!(events.last().unwrap(), "shutdown 0");
}

#[test]
fn test_failed_session_without_preserve_still_stops() {
    let env = TestEnv::new();
    let test_args = env.test_args("exit 1", "out.txt");
    let spawner = env.spawner();

    let err = Orchestrator::with_session(&spawner, &test_args, &env.testbed_args(), |session| {
        session.submit("control", &VariationSpec::empty())
    })
    .err()
    .unwrap();
    assert!(matches!(err, Error::TestbedFailure { .. }));

    assert_eq!(env.exit_code(), Some(0));
    assert!(!env.events().iter().any(|e| e == "poison"));
}

#[test]
fn test_failed_session_with_preserve_poisons_testbed() {
    let env = TestEnv::new();
    let mut test_args = env.test_args("exit 1", "out.txt");
    test_args.preserve_on_error = true;
    let spawner = env.spawner();

    let err = Orchestrator::with_session(&spawner, &test_args, &env.testbed_args(), |session| {
        session.submit("control", &VariationSpec::empty())
    })
    .err()
    .unwrap();
    assert!(matches!(err, Error::TestbedFailure { .. }));

    // Poison, then a non-zero backend exit: the operator's signal that
    // scratch state was kept on purpose.
    let events = env.events();
    assert!(events.iter().any(|e| e == "poison"));
    assert_eq!(env.exit_code(), Some(1));
}

#[test]
fn test_init_snippet_runs_once_before_builds() {
    let env = TestEnv::new();
    fs::write(env.source.join("in.txt"), "data\n").unwrap();
    let test_args = env.test_args("cp in.txt out.txt", "out.txt");
    let mut testbed_args = env.testbed_args();
    testbed_args.init = Some("true".to_string());
    let spawner = env.spawner();

    let mut session = Orchestrator::prime_on(&spawner, &test_args, &testbed_args).unwrap();
    session.submit("control", &VariationSpec::empty()).unwrap();
    session.close().unwrap();

    let events = env.events();
    let first_exec = events.iter().position(|e| e.starts_with("execute")).unwrap();
    let first_copy = events.iter().position(|e| e.starts_with("copydown")).unwrap();
    assert!(first_exec < first_copy, "init must run before the first build");
}

#[test]
fn test_source_pattern_filters_copydown() {
    let env = TestEnv::new();
    fs::write(env.source.join("wanted.c"), "int x;\n").unwrap();
    fs::write(env.source.join("ignored.log"), "noise\n").unwrap();
    let mut test_args = env.test_args("cp wanted.c out.txt", "out.txt");
    test_args.source_pattern = Some("*.c".to_string());
    let spawner = env.spawner();

    let mut session =
        Orchestrator::prime_on(&spawner, &test_args, &env.testbed_args()).unwrap();
    session.submit("control", &VariationSpec::empty()).unwrap();
    session.close().unwrap();

    let testbed_src = env.results.join(".testbed/build-control");
    assert!(testbed_src.join("wanted.c").exists());
    assert!(!testbed_src.join("ignored.log").exists());
}

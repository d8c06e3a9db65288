//! Shared test utilities: an in-process virtual server and a session
//! harness.
//!
//! The real sandbox backends live outside this crate, so the integration
//! tests drive the orchestrator and strategies against `FakeServer`: a
//! `VirtualServer` that executes commands directly on the host under a
//! temporary scratch directory and records every protocol event for
//! assertions.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use reprocheck::common::copy_tree;
use reprocheck::error::{Error, Result};
use reprocheck::server::{ExecReply, OpenReply, VirtualServer};
use reprocheck::variation::{action, Action, Policy, VariationTransform};
use reprocheck::{TestArgs, TestbedArgs};

/// Protocol events observed by a session's fake servers.
#[derive(Debug, Default)]
pub struct ServerLog {
    pub events: Vec<String>,
    /// Exit code of the last shutdown, once one happened.
    pub exit_code: Option<i32>,
}

pub type SharedLog = Arc<Mutex<ServerLog>>;

pub struct FakeServer {
    log: SharedLog,
    root: bool,
    poisoned: bool,
}

impl FakeServer {
    pub fn new(log: SharedLog) -> Self {
        Self {
            log,
            root: false,
            poisoned: false,
        }
    }

    fn record(&self, event: impl Into<String>) {
        self.log.lock().unwrap().events.push(event.into());
    }

    fn clear_dest(dest: &Path) -> Result<()> {
        match fs::symlink_metadata(dest) {
            Ok(meta) => {
                if meta.file_type().is_symlink() || meta.is_file() {
                    fs::remove_file(dest)?;
                } else {
                    fs::remove_dir_all(dest)?;
                }
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}

impl VirtualServer for FakeServer {
    fn open(&mut self, scratch_dir: &Path, _host_distro: Option<&str>) -> Result<OpenReply> {
        fs::create_dir_all(scratch_dir)?;
        self.record("open");
        Ok(OpenReply {
            scratch_root: scratch_dir.to_path_buf(),
            root: self.root,
        })
    }

    fn execute(&mut self, argv: &[String], env: &BTreeMap<String, String>) -> Result<ExecReply> {
        let program = argv
            .first()
            .ok_or_else(|| Error::Protocol("empty argv".to_string()))?;
        self.record(format!("execute {program}"));

        let output = Command::new(program)
            .args(&argv[1..])
            .envs(env)
            .output()
            .map_err(|e| Error::Protocol(format!("fake execute failed: {e}")))?;

        Ok(ExecReply {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn copydown(&mut self, source: &Path, dest: &Path) -> Result<()> {
        self.record(format!("copydown {}", dest.display()));
        Self::clear_dest(dest)?;
        copy_tree(source, dest)
    }

    fn copyup(&mut self, source: &Path, dest: &Path) -> Result<()> {
        self.record(format!("copyup {}", dest.display()));
        Self::clear_dest(dest)?;
        copy_tree(source, dest)
    }

    fn poison(&mut self) -> Result<()> {
        self.record("poison");
        self.poisoned = true;
        Ok(())
    }

    fn shutdown(self: Box<Self>) -> Result<i32> {
        let code = if self.poisoned { 1 } else { 0 };
        let mut log = self.log.lock().unwrap();
        log.events.push(format!("shutdown {code}"));
        log.exit_code = Some(code);
        Ok(code)
    }
}

/// Test session: temp source tree, result directory, shared event log.
pub struct TestEnv {
    pub _temp_dir: TempDir,
    pub source: PathBuf,
    pub results: PathBuf,
    pub log: SharedLog,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let source = temp_dir.path().join("source");
        fs::create_dir_all(&source).expect("Failed to create source dir");
        let results = temp_dir.path().join("results");

        Self {
            _temp_dir: temp_dir,
            source,
            results,
            log: Arc::new(Mutex::new(ServerLog::default())),
        }
    }

    pub fn test_args(&self, build_command: &str, artifact_pattern: &str) -> TestArgs {
        TestArgs::new(build_command, &self.source, artifact_pattern, &self.results)
    }

    pub fn testbed_args(&self) -> TestbedArgs {
        TestbedArgs::new(vec!["fake-server".to_string()])
    }

    /// Server source handing out fake servers wired to this env's log.
    pub fn spawner(&self) -> impl Fn() -> Result<Box<dyn VirtualServer>> {
        let log = self.log.clone();
        move || Ok(Box::new(FakeServer::new(log.clone())) as Box<dyn VirtualServer>)
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().events.clone()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.log.lock().unwrap().exit_code
    }
}

/// A synthetic clock axis: the build reads `$CLOCK`, the transform pins it
/// or moves it.
pub fn clock_axis(policy: Policy) -> Action {
    let transform: VariationTransform = std::sync::Arc::new(|build, vary| {
        Ok(build.with_env("CLOCK", if vary { "2000000000" } else { "1000000000" }))
    });
    action("time", policy, transform)
}

/// A synthetic locale axis that never affects the test builds' output.
pub fn locale_axis(policy: Policy) -> Action {
    let transform: VariationTransform = std::sync::Arc::new(|build, vary| {
        Ok(build.with_env("LC_ALL", if vary { "fr_FR.UTF-8" } else { "C" }))
    });
    action("locale", policy, transform)
}

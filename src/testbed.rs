//! Lifecycle of one sandboxed execution environment.
//!
//! A `Testbed` owns exactly one virtual-server backend for the whole
//! verification session and exposes the remote-exec and copy primitives
//! builds are sequenced against. States: spawned backend, then open after
//! the handshake, then stopped (clean) or poisoned (preserved on error).
//! No operation is valid in a terminal state.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::server::{ExecReply, ServerProcess, VirtualServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Open,
    Stopped,
    Poisoned,
}

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Open => "open",
            State::Stopped => "stopped",
            State::Poisoned => "poisoned",
        }
    }
}

pub struct Testbed {
    server: Option<Box<dyn VirtualServer>>,
    state: State,
    scratch_root: PathBuf,
    root_on_testbed: bool,
}

impl Testbed {
    /// Launch the backend subprocess and perform the open handshake.
    pub fn start(
        server_argv: &[String],
        scratch_dir: &Path,
        host_distro: Option<&str>,
    ) -> Result<Self> {
        let server = ServerProcess::spawn(server_argv)?;
        Self::with_server(Box::new(server), scratch_dir, host_distro)
    }

    /// Open a testbed over an already-constructed server connection.
    ///
    /// This is the seam the test suite uses to substitute an in-process
    /// backend; production code goes through [`Testbed::start`].
    pub fn with_server(
        mut server: Box<dyn VirtualServer>,
        scratch_dir: &Path,
        host_distro: Option<&str>,
    ) -> Result<Self> {
        let reply = server.open(scratch_dir, host_distro)?;
        Ok(Self {
            server: Some(server),
            state: State::Open,
            scratch_root: reply.scratch_root,
            root_on_testbed: reply.root,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Scratch directory inside the testbed; per-build paths live under it.
    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Whether the backend runs our commands as root inside the testbed.
    pub fn root_on_testbed(&self) -> bool {
        self.root_on_testbed
    }

    fn server(&mut self, op: &'static str) -> Result<&mut Box<dyn VirtualServer>> {
        match self.state {
            State::Open => Ok(self.server.as_mut().expect("open testbed has a server")),
            state => Err(Error::BadState {
                state: state.name(),
                op,
            }),
        }
    }

    /// Run a command inside the testbed, returning its exit code and
    /// captured output. A non-zero exit is *not* an error here.
    pub fn execute(
        &mut self,
        argv: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<ExecReply> {
        self.server("execute")?.execute(argv, env)
    }

    /// Like [`Testbed::execute`], but a non-zero exit is a
    /// [`Error::TestbedFailure`]. Output on stderr alone never fails a
    /// command; build tools routinely write warnings there.
    pub fn check_exec(
        &mut self,
        argv: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<ExecReply> {
        let reply = self.execute(argv, env)?;
        if reply.exit_code != 0 {
            if !reply.stderr.is_empty() {
                eprint!("{}", reply.stderr);
            }
            return Err(Error::TestbedFailure {
                argv: argv.to_vec(),
                code: reply.exit_code,
            });
        }
        Ok(reply)
    }

    /// Run a shell snippet inside the testbed via `sh -ec`.
    pub fn check_sh(&mut self, script: &str, env: &BTreeMap<String, String>) -> Result<ExecReply> {
        let argv = vec!["sh".to_string(), "-ec".to_string(), script.to_string()];
        self.check_exec(&argv, env)
    }

    /// Recursively copy a host directory into the testbed.
    pub fn copy_in(&mut self, host_path: &Path, testbed_path: &Path) -> Result<()> {
        self.server("copydown")?.copydown(host_path, testbed_path)
    }

    /// Recursively copy a testbed directory back out to the host.
    pub fn copy_out(&mut self, testbed_path: &Path, host_path: &Path) -> Result<()> {
        self.server("copyup")?.copyup(testbed_path, host_path)
    }

    /// Clean teardown. Valid exactly once; the testbed is terminal after.
    pub fn stop(&mut self) -> Result<()> {
        self.server("stop")?;
        let server = self.server.take().expect("open testbed has a server");
        self.state = State::Stopped;
        server.shutdown()?;
        Ok(())
    }

    /// Teardown that tells the backend to exit non-zero, signalling to the
    /// operator that scratch state was intentionally preserved.
    pub fn poison(&mut self) -> Result<()> {
        let server = self.server("poison")?;
        server.poison()?;
        let server = self.server.take().expect("open testbed has a server");
        self.state = State::Poisoned;
        // The backend is expected to exit non-zero here; that is the
        // signal, not a failure.
        server.shutdown()?;
        Ok(())
    }
}

impl Drop for Testbed {
    fn drop(&mut self) {
        // Backstop only; orchestrator teardown runs stop/poison explicitly.
        if let Some(server) = self.server.take() {
            let _ = server.shutdown();
        }
    }
}

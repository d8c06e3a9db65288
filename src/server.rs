//! Virtual-server command protocol and backend discovery.
//!
//! The concrete sandbox backends (null, chroot, container, VM) live
//! outside this crate. The contract they implement is a JSON-line
//! request/reply protocol over the backend subprocess's stdin/stdout:
//!
//! ```text
//! -> {"cmd":"open","scratch_dir":"/tmp/rc.xyz","host_distro":"debian"}
//! <- {"scratch_root":"/tmp/rc.xyz","root":false}
//! -> {"cmd":"execute","argv":["sh","-ec","..."],"env":{"K":"V"}}
//! <- {"exit_code":0,"stdout":"","stderr":""}
//! -> {"cmd":"copydown","source":"/host/src","dest":"/scratch/build-a"}
//! <- {"ok":true}
//! -> {"cmd":"copyup","source":"/scratch/artifacts-a","dest":"/host/out"}
//! <- {"ok":true}
//! -> {"cmd":"quit_with_error"}
//! ```
//!
//! One request line, one reply line, strictly in order. Closing stdin asks
//! the backend to exit cleanly (stop); `quit_with_error` is the poison
//! command, after which the backend must exit non-zero.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Backend names probed by [`discover_servers`] when the caller has no
/// preference of its own.
pub const KNOWN_SERVERS: &[&str] = &[
    "reprocheck-null",
    "reprocheck-chroot",
    "reprocheck-podman",
    "reprocheck-qemu",
];

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request<'a> {
    Open {
        scratch_dir: &'a Path,
        #[serde(skip_serializing_if = "Option::is_none")]
        host_distro: Option<&'a str>,
    },
    Execute {
        argv: &'a [String],
        env: &'a BTreeMap<String, String>,
    },
    Copydown {
        source: &'a Path,
        dest: &'a Path,
    },
    Copyup {
        source: &'a Path,
        dest: &'a Path,
    },
    QuitWithError,
}

/// Reply to `open`: where the backend put its scratch space and what it
/// can do for us.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenReply {
    pub scratch_root: PathBuf,
    /// The backend can run commands as root inside the testbed.
    #[serde(default)]
    pub root: bool,
}

/// Reply to `execute`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecReply {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

#[derive(Debug, Deserialize)]
struct CopyReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// The fixed command protocol every sandbox backend implements.
///
/// Production code talks to a [`ServerProcess`]; tests substitute an
/// in-process fake.
pub trait VirtualServer {
    fn open(&mut self, scratch_dir: &Path, host_distro: Option<&str>) -> Result<OpenReply>;
    fn execute(
        &mut self,
        argv: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<ExecReply>;
    fn copydown(&mut self, source: &Path, dest: &Path) -> Result<()>;
    fn copyup(&mut self, source: &Path, dest: &Path) -> Result<()>;
    /// Send the poison command; the backend must exit non-zero afterwards.
    fn poison(&mut self) -> Result<()>;
    /// Close the connection and reap the backend. Returns its exit code.
    fn shutdown(self: Box<Self>) -> Result<i32>;
}

/// Source of fresh server connections. A verification session spawns
/// exactly one; strategies that run several sessions (environment triage)
/// spawn one per session.
pub trait ServerSpawner {
    fn spawn_server(&self) -> Result<Box<dyn VirtualServer>>;
}

impl<F> ServerSpawner for F
where
    F: Fn() -> Result<Box<dyn VirtualServer>>,
{
    fn spawn_server(&self) -> Result<Box<dyn VirtualServer>> {
        self()
    }
}

/// Spawns [`ServerProcess`] backends from a fixed argv.
pub struct ProcessSpawner {
    server_argv: Vec<String>,
}

impl ProcessSpawner {
    pub fn new(server_argv: Vec<String>) -> Self {
        Self { server_argv }
    }
}

impl ServerSpawner for ProcessSpawner {
    fn spawn_server(&self) -> Result<Box<dyn VirtualServer>> {
        Ok(Box::new(ServerProcess::spawn(&self.server_argv)?))
    }
}

/// A live backend subprocess speaking the JSON-line protocol.
pub struct ServerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    argv0: String,
}

impl ServerProcess {
    /// Spawn the backend. The handshake happens separately via
    /// [`VirtualServer::open`], so a backend that dies instantly is
    /// reported from there with its exit status.
    pub fn spawn(server_argv: &[String]) -> Result<Self> {
        let program = server_argv.first().ok_or_else(|| Error::TestbedStartup {
            reason: "empty virtual-server argv".to_string(),
        })?;

        let mut child = Command::new(program)
            .args(&server_argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::TestbedStartup {
                reason: format!("failed to spawn '{program}': {e}"),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| Error::TestbedStartup {
            reason: "backend stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| Error::TestbedStartup {
            reason: "backend stdout unavailable".to_string(),
        })?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            argv0: program.clone(),
        })
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::protocol("connection already closed"))?;
        let mut line = serde_json::to_string(request)
            .map_err(|e| Error::protocol(format!("failed to encode request: {e}")))?;
        line.push('\n');
        stdin.write_all(line.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }

    fn recv_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.stdout.read_line(&mut line)?;
        if n == 0 {
            // EOF: the backend died mid-conversation.
            let status = self.child.try_wait()?;
            return Err(Error::protocol(format!(
                "'{}' closed the connection ({})",
                self.argv0,
                status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "still running".to_string()),
            )));
        }
        Ok(line)
    }

    fn request<T: serde::de::DeserializeOwned>(&mut self, request: &Request) -> Result<T> {
        self.send(request)?;
        let line = self.recv_line()?;
        serde_json::from_str(line.trim_end())
            .map_err(|e| Error::protocol(format!("malformed reply {line:?}: {e}")))
    }
}

impl VirtualServer for ServerProcess {
    fn open(&mut self, scratch_dir: &Path, host_distro: Option<&str>) -> Result<OpenReply> {
        self.request(&Request::Open {
            scratch_dir,
            host_distro,
        })
        .map_err(|e| {
            // An early exit before the handshake is a startup failure,
            // not a protocol hiccup.
            Error::TestbedStartup {
                reason: format!("'{}' failed its open handshake: {e}", self.argv0),
            }
        })
    }

    fn execute(
        &mut self,
        argv: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<ExecReply> {
        self.request(&Request::Execute { argv, env })
    }

    fn copydown(&mut self, source: &Path, dest: &Path) -> Result<()> {
        let reply: CopyReply = self.request(&Request::Copydown { source, dest })?;
        if reply.ok {
            Ok(())
        } else {
            Err(Error::Copy {
                op: "copydown",
                path: source.to_path_buf(),
                reason: reply.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    fn copyup(&mut self, source: &Path, dest: &Path) -> Result<()> {
        let reply: CopyReply = self.request(&Request::Copyup { source, dest })?;
        if reply.ok {
            Ok(())
        } else {
            Err(Error::Copy {
                op: "copyup",
                path: source.to_path_buf(),
                reason: reply.error.unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    fn poison(&mut self) -> Result<()> {
        self.send(&Request::QuitWithError)
    }

    fn shutdown(mut self: Box<Self>) -> Result<i32> {
        // Closing stdin is the stop signal.
        drop(self.stdin.take());
        let status = self.child.wait()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// One-shot probe for available backends on this host.
///
/// The result is passed explicitly to whoever constructs the testbed; this
/// crate keeps no process-wide cache of it.
pub fn discover_servers(candidates: &[&str]) -> Vec<String> {
    candidates
        .iter()
        .filter(|name| which::which(name).is_ok())
        .map(|name| name.to_string())
        .collect()
}

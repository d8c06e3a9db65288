//! Error taxonomy for a verification session.
//!
//! Infrastructure failures (sandbox, tool invocation) are errors; a
//! negative reproducibility verdict is an ordinary return value and never
//! travels through this type.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The virtual-server backend exited before its open handshake
    /// completed. Fatal to the whole session.
    #[error("testbed failed to start: {reason}")]
    TestbedStartup { reason: String },

    /// A command inside the testbed exited non-zero. Fatal to the current
    /// build and therefore to the session.
    #[error("command failed inside testbed (exit code {code}): {argv:?}")]
    TestbedFailure { argv: Vec<String>, code: i32 },

    /// A perturbation axis needs a tool the host does not have. Callers
    /// downgrade this to a warning; the build will very likely fail later.
    #[error("variation '{axis}' is unsupported on this host (missing: {})", tools.join(", "))]
    UnsupportedVariation { axis: String, tools: Vec<String> },

    /// The comparison tool itself broke (exit code other than 0/1).
    /// Distinct from a "different" verdict.
    #[error("diff tool exited with code {0}")]
    DifferTool(i32),

    /// The virtual-server subprocess violated the command protocol.
    #[error("virtual-server protocol error: {0}")]
    Protocol(String),

    /// A testbed operation was attempted in a state that forbids it.
    #[error("testbed is {state}; cannot {op}")]
    BadState { state: &'static str, op: &'static str },

    /// A build name was submitted twice in one orchestrator session.
    #[error("build name '{0}' was already used in this session")]
    DuplicateBuildName(String),

    /// A directory copy across the testbed boundary failed.
    #[error("{op} failed for {}: {reason}", path.display())]
    Copy {
        op: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// A host-side helper command failed (pre-session hook, umask probe).
    #[error(transparent)]
    Host(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}

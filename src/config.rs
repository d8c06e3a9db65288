//! Session configuration records.
//!
//! `TestArgs` and `TestbedArgs` are produced by the caller (normally a CLI
//! or preset layer outside this crate) and consumed read-only here. They
//! are plain immutable data; no merging or auto-detection happens at this
//! level.

use std::path::PathBuf;

/// What to build and how to judge the result.
#[derive(Debug, Clone)]
pub struct TestArgs {
    /// Shell text of the build command, run with `sh -ec`.
    pub build_command: String,
    /// Host-side source tree copied into the testbed for every build.
    pub source_root: PathBuf,
    /// Shell glob (expanded inside the testbed) selecting the artifacts to
    /// collect and compare.
    pub artifact_pattern: String,
    /// Host-side directory receiving one subdirectory per build, plus diff
    /// reports.
    pub result_dir: PathBuf,
    /// Optional glob restricting which source files are copied in. None
    /// copies the whole tree.
    pub source_pattern: Option<String>,
    /// Keep the testbed scratch state when a session fails, by poisoning
    /// the server instead of stopping it cleanly.
    pub preserve_on_error: bool,
    /// Structural diff tool argv template; the two directories are
    /// appended. None falls back to `diff -ru`.
    pub diff_command: Option<Vec<String>>,
    /// Use an existing artifact directory as the control instead of
    /// building it.
    pub control_build: Option<PathBuf>,
}

impl TestArgs {
    pub fn new(
        build_command: impl Into<String>,
        source_root: impl Into<PathBuf>,
        artifact_pattern: impl Into<String>,
        result_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            build_command: build_command.into(),
            source_root: source_root.into(),
            artifact_pattern: artifact_pattern.into(),
            result_dir: result_dir.into(),
            source_pattern: None,
            preserve_on_error: false,
            diff_command: None,
            control_build: None,
        }
    }
}

/// How to start and prepare the testbed.
#[derive(Debug, Clone)]
pub struct TestbedArgs {
    /// Virtual-server backend invocation, e.g. `["reprocheck-null"]`.
    pub server_argv: Vec<String>,
    /// Shell snippet run on the host before the server starts.
    pub host_pre: Option<String>,
    /// Shell snippet run inside the testbed once, right after the open
    /// handshake (e.g. install build dependencies for the session).
    pub init: Option<String>,
    /// Shell snippet run inside the testbed before every single build.
    pub pre_build: Option<String>,
    /// Hint about the host distribution, forwarded to the backend.
    pub host_distro: Option<String>,
}

impl TestbedArgs {
    pub fn new(server_argv: Vec<String>) -> Self {
        Self {
            server_argv,
            host_pre: None,
            init: None,
            pre_build: None,
            host_distro: None,
        }
    }
}

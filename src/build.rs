//! Immutable build plans and the perturbation pipeline.
//!
//! A `Build` describes one shell build: the command text, the environment
//! it runs under, and the working tree it runs in. Perturbation transforms
//! are pure `Build -> Build` functions; `plan` folds a spec's transforms
//! over a base build in axis order to produce the final plan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process;
use crate::variation::VariationSpec;

/// Environment entry naming the tree the generated script must `cd` into
/// before the user command runs. Exported by `plan`, consumed and unset by
/// the script, and updated by any transform that relocates the tree.
pub const BUILD_PATH_VAR: &str = "REPROTEST_BUILD_PATH";

/// Environment entry carrying the umask the build runs under. Same
/// lifecycle as [`BUILD_PATH_VAR`].
pub const UMASK_VAR: &str = "REPROTEST_UMASK";

/// An immutable description of one shell build.
///
/// Never mutated after construction; every `with_*` helper returns a new
/// value, which is what lets transforms compose as pure functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    /// Shell text, run with `sh -ec`.
    pub build_command: String,
    /// Environment the command runs under (ordered by name).
    pub env: BTreeMap<String, String>,
    /// Working tree inside the testbed.
    pub tree: PathBuf,
}

impl Build {
    pub fn new(build_command: impl Into<String>, tree: impl Into<PathBuf>) -> Self {
        Self {
            build_command: build_command.into(),
            env: BTreeMap::new(),
            tree: tree.into(),
        }
    }

    /// New build with one environment entry set.
    pub fn with_env(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.env.insert(name.into(), value.into());
        next
    }

    /// New build with one environment entry removed (no-op if absent).
    pub fn without_env(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.env.remove(name);
        next
    }

    /// New build rooted at a different tree. Also re-points
    /// [`BUILD_PATH_VAR`] so the generated script follows the move.
    pub fn with_tree(&self, tree: impl Into<PathBuf>) -> Self {
        let mut next = self.clone();
        next.tree = tree.into();
        next.env.insert(
            BUILD_PATH_VAR.to_string(),
            next.tree.to_string_lossy().into_owned(),
        );
        next
    }

    /// New build with a different command (e.g. wrapped in a setup step).
    pub fn with_command(&self, build_command: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.build_command = build_command.into();
        next
    }

    /// Render the final `sh -ec` script.
    ///
    /// The bootstrap lines consume the two exported entries and unset them
    /// before the user command runs, so the command itself stays agnostic
    /// to where the tree ended up.
    pub fn script(&self) -> String {
        format!(
            "cd \"${bp}\"\numask \"${um}\"\nunset {bp} {um}\n{cmd}\n",
            bp = BUILD_PATH_VAR,
            um = UMASK_VAR,
            cmd = self.build_command,
        )
    }

}

/// Fold a variation spec over a base build to produce the final plan.
///
/// The two bootstrap exports always happen before any transform runs, so
/// a transform that must `cd` somewhere else (different working directory,
/// bind-mounted alias) only has to rewrite [`BUILD_PATH_VAR`].
pub fn plan(spec: &VariationSpec, base: &Build) -> Result<Build> {
    plan_with_umask(spec, base, &ambient_umask()?)
}

/// `plan` with the umask supplied by the caller instead of sampled from
/// the host. The seam the tests use.
pub fn plan_with_umask(spec: &VariationSpec, base: &Build, umask: &str) -> Result<Build> {
    let mut build = base
        .with_env(BUILD_PATH_VAR, base.tree.to_string_lossy().into_owned())
        .with_env(UMASK_VAR, umask);

    for act in spec.actions() {
        match (act.transform)(build.clone(), act.policy.is_varied()) {
            Ok(next) => build = next,
            // Missing host tooling is a warning, not an eager failure;
            // the build itself will almost certainly fail later.
            Err(Error::UnsupportedVariation { axis, tools }) => {
                eprintln!(
                    "  [WARN] variation '{}' unsupported on this host (missing: {}); leaving it unapplied",
                    axis,
                    tools.join(", ")
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(build)
}

/// The host's ambient umask, as the octal string `umask` prints.
fn ambient_umask() -> Result<String> {
    let result = process::shell("umask")?;
    Ok(result.stdout_trimmed().to_string())
}

/// Quote a string for safe interpolation into `sh` text.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b'@' | b':' | b'=' | b'+' | b','))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Quote a path for safe interpolation into `sh` text.
pub fn shell_quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

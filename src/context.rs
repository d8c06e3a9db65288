//! Per-build execution context.
//!
//! A `BuildContext` binds one named build to the live testbed: it derives
//! the testbed-side source and artifact paths and the host-side result
//! path from the build name, copies sources in, runs the generated build
//! script, and copies the collected artifacts back out. One context per
//! submitted build; it is discarded after copy-up.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::build::{shell_quote_path, Build};
use crate::common;
use crate::error::Result;
use crate::testbed::Testbed;

/// Fixed subdirectory of the artifact tree; artifact paths are mirrored
/// under it with their parent directories preserved.
pub const SOURCE_ROOT: &str = "source-root";

#[derive(Debug, Clone)]
pub struct BuildContext {
    build_name: String,
    /// Source tree inside the testbed: `<scratch>/build-<name>`.
    testbed_src: PathBuf,
    /// Collected artifacts inside the testbed: `<scratch>/artifacts-<name>`.
    testbed_dist: PathBuf,
    /// Host-side destination: `<result_dir>/<name>`.
    local_result: PathBuf,
    /// Host-side source tree to copy in.
    local_source: PathBuf,
    /// Optional glob restricting which source files are copied in.
    source_pattern: Option<String>,
}

impl BuildContext {
    pub fn new(
        testbed_root: &Path,
        result_root: &Path,
        local_source: &Path,
        build_name: &str,
        source_pattern: Option<&str>,
    ) -> Self {
        Self {
            build_name: build_name.to_string(),
            testbed_src: testbed_root.join(format!("build-{build_name}")),
            testbed_dist: testbed_root.join(format!("artifacts-{build_name}")),
            local_result: result_root.join(build_name),
            local_source: local_source.to_path_buf(),
            source_pattern: source_pattern.map(str::to_string),
        }
    }

    pub fn build_name(&self) -> &str {
        &self.build_name
    }

    /// Where the planned build must run; transforms see this as the tree.
    pub fn testbed_source_path(&self) -> &Path {
        &self.testbed_src
    }

    pub fn local_result_path(&self) -> &Path {
        &self.local_result
    }

    /// Copy the source tree into the testbed's per-build source path.
    ///
    /// With a source pattern set, only matching files are copied; they are
    /// staged on the host first so the testbed boundary always sees one
    /// plain recursive copy.
    pub fn copydown(&self, testbed: &mut Testbed) -> Result<()> {
        match &self.source_pattern {
            None => testbed.copy_in(&self.local_source, &self.testbed_src),
            Some(pattern) => {
                let staging_parent = self
                    .local_result
                    .parent()
                    .expect("result path has a parent")
                    .to_path_buf();
                let staging = common::prepare_work_dir(
                    &staging_parent,
                    &format!(".staging-{}", self.build_name),
                )?;
                let outcome = self.stage_sources(pattern, &staging).and_then(|_| {
                    testbed.copy_in(&staging, &self.testbed_src)
                });
                common::cleanup_work_dir(&staging);
                outcome
            }
        }
    }

    fn stage_sources(&self, pattern: &str, staging: &Path) -> Result<()> {
        let full = self.local_source.join(pattern);
        let matches = glob::glob(&full.to_string_lossy())
            .map_err(|e| anyhow!("invalid source pattern '{pattern}': {e}"))?;
        for path in matches {
            let path = path.map_err(|e| anyhow!("source pattern walk failed: {e}"))?;
            let rel = path
                .strip_prefix(&self.local_source)
                .map_err(|_| anyhow!("source pattern escaped the source root"))?;
            let dest = staging.join(rel);
            if path.is_dir() {
                common::copy_tree(&path, &dest)?;
            } else {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&path, &dest)?;
            }
        }
        Ok(())
    }

    /// Execute one build inside the testbed.
    ///
    /// Pre-existing artifact matches in the source tree are removed first;
    /// some build tools only ever update outputs in place, and a stale file
    /// surviving from the copy would corrupt the comparison. Collection
    /// resets every copied timestamp to epoch zero so the copy itself can
    /// never introduce a timestamp difference.
    pub fn run_build(
        &self,
        testbed: &mut Testbed,
        build: &Build,
        artifact_pattern: &str,
        pre_build: Option<&str>,
    ) -> Result<()> {
        let no_env = BTreeMap::new();
        let src = shell_quote_path(&self.testbed_src);
        let dist = shell_quote_path(&self.testbed_dist);

        // The artifact pattern is deliberately unquoted: the testbed's
        // shell expands it.
        let clear = format!("cd {src}\nrm -rf {artifact_pattern}");
        testbed.check_sh(&clear, &no_env)?;

        if let Some(snippet) = pre_build {
            testbed.check_sh(snippet, &no_env)?;
        }

        println!("  running build '{}'", self.build_name);
        let script = build.script();
        let argv = if testbed.root_on_testbed() {
            // Artifacts must not come out root-owned; drop privileges for
            // the build itself.
            vec![
                "runuser".to_string(),
                "-u".to_string(),
                "nobody".to_string(),
                "--".to_string(),
                "sh".to_string(),
                "-ec".to_string(),
                script,
            ]
        } else {
            vec!["sh".to_string(), "-ec".to_string(), script]
        };
        testbed.check_exec(&argv, &build.env)?;

        // An artifact pattern matching nothing makes `cp` fail on the
        // literal name: an error, not an empty result.
        let collect = format!(
            "cd {src}\nmkdir -p {dist}/{SOURCE_ROOT}\n\
             cp --parents -a -t {dist}/{SOURCE_ROOT} {artifact_pattern}\n\
             find {dist}/{SOURCE_ROOT} -exec touch --no-dereference --date=@0 {{}} +"
        );
        testbed.check_sh(&collect, &no_env)?;
        Ok(())
    }

    /// Copy the artifact tree back to the host-side result directory and
    /// return its path.
    pub fn copyup(&self, testbed: &mut Testbed) -> Result<PathBuf> {
        testbed.copy_out(&self.testbed_dist, &self.local_result)?;
        Ok(self.local_result.clone())
    }
}

//! The all-variations check: control plus one build per experiment spec.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::anyhow;

use crate::config::{TestArgs, TestbedArgs};
use crate::differ::{compare, link_duplicate};
use crate::error::Result;
use crate::hash::hash_artifacts;
use crate::orchestrator::Orchestrator;
use crate::server::ServerSpawner;
use crate::variation::VariationSpec;

/// Verdict of one `check` run.
#[derive(Debug)]
pub struct CheckOutcome {
    /// True iff every experiment matched the control byte-for-byte.
    pub reproducible: bool,
    /// Names of the experiments that diverged.
    pub divergent: Vec<String>,
    /// Content hashes of the control artifacts, emitted when everything
    /// matched.
    pub artifact_hashes: Option<BTreeMap<String, String>>,
    /// One diff report file per divergent experiment.
    pub diff_reports: Vec<PathBuf>,
}

impl CheckOutcome {
    fn reproducible(hashes: BTreeMap<String, String>) -> Self {
        Self {
            reproducible: true,
            divergent: Vec::new(),
            artifact_hashes: Some(hashes),
            diff_reports: Vec::new(),
        }
    }
}

/// Build under `specs[0]` (the control) and once per remaining spec, then
/// diff every experiment against the control.
///
/// The control is submitted first; artifact directories appear strictly in
/// submission order. With a control-build override configured the control
/// artifacts are taken from disk instead of built.
pub fn check(
    spawner: &dyn ServerSpawner,
    test_args: &TestArgs,
    testbed_args: &TestbedArgs,
    specs: &[VariationSpec],
) -> Result<CheckOutcome> {
    let (control_spec, experiment_specs) = specs
        .split_first()
        .ok_or_else(|| anyhow!("check needs at least a control spec"))?;

    let (control_dir, experiments) =
        Orchestrator::with_session(spawner, test_args, testbed_args, |session| {
            let control_dir = match &test_args.control_build {
                Some(path) => {
                    println!("  using existing control build at {}", path.display());
                    path.clone()
                }
                None => session.submit("control", control_spec)?,
            };

            let mut experiments = Vec::new();
            for (i, spec) in experiment_specs.iter().enumerate() {
                let name = format!("experiment-{}", i + 1);
                let dir = session.submit(&name, spec)?;
                experiments.push((name, dir));
            }
            Ok((control_dir, experiments))
        })?;

    let mut divergent = Vec::new();
    let mut diff_reports = Vec::new();
    for (name, dir) in &experiments {
        let report = test_args.result_dir.join(format!("{name}.diff"));
        let cmp = compare(
            &control_dir,
            dir,
            test_args.diff_command.as_deref(),
            Some(&report),
        )?;
        if cmp.verdict.is_identical() {
            println!("  '{name}' matches control");
            // No divergence, nothing worth keeping: drop the empty report
            // and store the duplicate tree as a link to the control.
            let _ = std::fs::remove_file(&report);
            link_duplicate(&control_dir, dir)?;
        } else {
            println!("  '{name}' differs from control (report: {})", report.display());
            divergent.push(name.clone());
            diff_reports.push(report);
        }
    }

    if divergent.is_empty() {
        Ok(CheckOutcome::reproducible(hash_artifacts(&control_dir)?))
    } else {
        Ok(CheckOutcome {
            reproducible: false,
            divergent,
            artifact_hashes: None,
            diff_reports,
        })
    }
}

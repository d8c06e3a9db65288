//! Environment-variable triage.
//!
//! Two staged checks over the hard-coded categorization in `envvars`:
//! stage 1 varies only the known-noisy blacklist; stage 2 additionally
//! varies every ambient variable not on the whitelist. A robust build
//! passes both.

use std::collections::BTreeSet;

use crate::config::{TestArgs, TestbedArgs};
use crate::envvars::{env_variation, known_noisy, triage_set, ENVIRONMENT_AXIS};
use crate::error::Result;
use crate::server::ServerSpawner;
use crate::strategy::check::{check, CheckOutcome};
use crate::variation::{action, Policy, VariationSpec};

/// One stage of the triage: which variables were varied and how the check
/// went.
#[derive(Debug)]
pub struct EnvStage {
    pub varied: BTreeSet<String>,
    pub outcome: CheckOutcome,
}

/// Verdict of one `check_env` run.
#[derive(Debug)]
pub struct EnvOutcome {
    pub reproducible: bool,
    /// Known-noisy variables varied.
    pub stage1: EnvStage,
    /// Unknown (non-whitelisted) variables added; skipped when stage 1
    /// already failed.
    pub stage2: Option<EnvStage>,
}

fn stage_specs(names: &BTreeSet<String>) -> [VariationSpec; 2] {
    let fixed = VariationSpec::new([action(
        ENVIRONMENT_AXIS,
        Policy::Fixed,
        env_variation(names),
    )]);
    let varied = VariationSpec::new([action(
        ENVIRONMENT_AXIS,
        Policy::Varied,
        env_variation(names),
    )]);
    [fixed, varied]
}

fn run_stage(
    spawner: &dyn ServerSpawner,
    test_args: &TestArgs,
    testbed_args: &TestbedArgs,
    stage_name: &str,
    names: BTreeSet<String>,
) -> Result<EnvStage> {
    println!(
        "  {stage_name}: varying {} environment variable(s)",
        names.len()
    );
    // Each stage is its own session with its own result subtree, so build
    // names and artifact paths never collide across stages.
    let mut stage_args = test_args.clone();
    stage_args.result_dir = test_args.result_dir.join(stage_name);

    let specs = stage_specs(&names);
    let outcome = check(spawner, &stage_args, testbed_args, &specs)?;
    if !outcome.reproducible {
        println!(
            "  {stage_name} failed; varied set was: {}",
            names.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(EnvStage {
        varied: names,
        outcome,
    })
}

/// Staged environment triage. `ambient` is the set of variable names in
/// the calling environment (normally `std::env::vars()` keys); it feeds
/// the unknown set stage 2 varies.
pub fn check_env(
    spawner: &dyn ServerSpawner,
    test_args: &TestArgs,
    testbed_args: &TestbedArgs,
    ambient: impl IntoIterator<Item = String>,
) -> Result<EnvOutcome> {
    let stage1 = run_stage(
        spawner,
        test_args,
        testbed_args,
        "env-stage1",
        known_noisy(),
    )?;
    if !stage1.outcome.reproducible {
        return Ok(EnvOutcome {
            reproducible: false,
            stage1,
            stage2: None,
        });
    }

    let mut names = known_noisy();
    names.extend(triage_set(ambient));
    let stage2 = run_stage(spawner, test_args, testbed_args, "env-stage2", names)?;

    Ok(EnvOutcome {
        reproducible: stage2.outcome.reproducible,
        stage1,
        stage2: Some(stage2),
    })
}

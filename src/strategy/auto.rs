//! Auto-bisection: find which varied axes break reproducibility.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::{TestArgs, TestbedArgs};
use crate::differ::compare;
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::server::ServerSpawner;
use crate::variation::{Policy, VariationSpec};

/// Verdict of one `check_auto` run.
#[derive(Debug)]
pub struct AutoOutcome {
    /// True iff the maximally varied build matched the control.
    pub reproducible: bool,
    /// False when even two maximally fixed builds disagreed; the search
    /// is pointless in that case and `contributors` stays empty.
    pub self_consistent: bool,
    /// Axes whose variation broke reproducibility.
    pub contributors: Vec<String>,
}

/// Build once under `spec_fixed` (control) and search for the axes in
/// `spec_varied` responsible for any non-reproducibility.
///
/// The candidate axes are visited in a randomized order. That is a
/// property of the search, not an accident: when several axes are each
/// individually sufficient to break reproducibility, different orders can
/// legitimately name different minimal sets. Pass a seed to make one
/// particular order repeatable.
pub fn check_auto(
    spawner: &dyn ServerSpawner,
    test_args: &TestArgs,
    testbed_args: &TestbedArgs,
    spec_fixed: &VariationSpec,
    spec_varied: &VariationSpec,
    seed: Option<u64>,
) -> Result<AutoOutcome> {
    Orchestrator::with_session(spawner, test_args, testbed_args, |session| {
        let diff_command = test_args.diff_command.as_deref();
        let report_for =
            |name: &str| test_args.result_dir.join(format!("{name}.diff"));

        let control_dir = session.submit("control", spec_fixed)?;

        // Gate: a build that cannot reproduce itself under the maximally
        // fixed spec leaves nothing to bisect.
        let recheck_dir = session.submit("control-recheck", spec_fixed)?;
        let recheck = compare(&control_dir, &recheck_dir, diff_command, Some(&report_for("control-recheck")))?;
        if !recheck.verdict.is_identical() {
            println!("  build is not reproducible even fully fixed; nothing to bisect");
            return Ok(AutoOutcome {
                reproducible: false,
                self_consistent: false,
                contributors: Vec::new(),
            });
        }

        let varied_dir = session.submit("all-varied", spec_varied)?;
        let varied = compare(&control_dir, &varied_dir, diff_command, Some(&report_for("all-varied")))?;
        if varied.verdict.is_identical() {
            println!("  reproducible under all variations; nothing to bisect");
            return Ok(AutoOutcome {
                reproducible: true,
                self_consistent: true,
                contributors: Vec::new(),
            });
        }

        // Greedy bisection: tentatively enable one axis at a time on top
        // of the known-good set; keep it if the build stays reproducible,
        // otherwise record it as a contributor.
        let mut candidates: Vec<String> = spec_varied
            .varied_axes()
            .into_iter()
            .filter(|axis| spec_fixed.policy_of(axis) != Some(Policy::Varied))
            .collect();
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        candidates.shuffle(&mut rng);

        let mut known_good = spec_fixed.clone();
        let mut contributors = Vec::new();
        for axis in candidates {
            let action = spec_varied
                .action_of(&axis)
                .expect("candidate axes come from spec_varied")
                .clone();
            let candidate_spec = known_good.extend([action]);

            let name = format!("bisect-{axis}");
            let dir = session.submit(&name, &candidate_spec)?;
            let cmp = compare(&control_dir, &dir, diff_command, Some(&report_for(&name)))?;
            if cmp.verdict.is_identical() {
                println!("  axis '{axis}' varies cleanly; keeping it enabled");
                known_good = candidate_spec;
            } else {
                println!("  axis '{axis}' breaks reproducibility");
                contributors.push(axis);
            }
        }

        Ok(AutoOutcome {
            reproducible: false,
            self_consistent: true,
            contributors,
        })
    })
}

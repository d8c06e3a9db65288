//! Sequencing of builds against one shared testbed.
//!
//! Starting a sandbox (container, chroot, VM) can be the single most
//! expensive step of a verification run, so the orchestrator starts it
//! once and amortizes it across every comparison build. Builds run
//! strictly in submission order; the testbed's filesystem is shared,
//! stateful, and never touched concurrently.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use crate::build::{plan, Build};
use crate::config::{TestArgs, TestbedArgs};
use crate::context::BuildContext;
use crate::error::{Error, Result};
use crate::process;
use crate::server::{ProcessSpawner, ServerSpawner};
use crate::testbed::Testbed;
use crate::variation::VariationSpec;

/// One verification session: a live testbed plus the bookkeeping to run
/// named builds against it in order.
///
/// Callers end a session through exactly one of [`Orchestrator::close`]
/// (normal path) or [`Orchestrator::abort`] (an error is propagating).
pub struct Orchestrator {
    testbed: Testbed,
    test_args: TestArgs,
    testbed_args: TestbedArgs,
    seen: BTreeSet<String>,
}

impl Orchestrator {
    /// Start the testbed, run the host-pre and init hooks, and hand back a
    /// session ready to accept builds.
    pub fn prime(test_args: &TestArgs, testbed_args: &TestbedArgs) -> Result<Self> {
        let spawner = ProcessSpawner::new(testbed_args.server_argv.clone());
        Self::prime_on(&spawner, test_args, testbed_args)
    }

    /// [`Orchestrator::prime`] over a caller-supplied server source. The
    /// seam the test suite uses to run sessions against an in-process
    /// backend.
    pub fn prime_on(
        spawner: &dyn ServerSpawner,
        test_args: &TestArgs,
        testbed_args: &TestbedArgs,
    ) -> Result<Self> {
        if let Some(snippet) = &testbed_args.host_pre {
            process::shell(snippet)?;
        }
        fs::create_dir_all(&test_args.result_dir)?;

        let scratch_hint = test_args.result_dir.join(".testbed");
        let mut testbed = Testbed::with_server(
            spawner.spawn_server()?,
            &scratch_hint,
            testbed_args.host_distro.as_deref(),
        )?;

        if let Some(snippet) = &testbed_args.init {
            testbed.check_sh(snippet, &Default::default())?;
        }

        Ok(Self {
            testbed,
            test_args: test_args.clone(),
            testbed_args: testbed_args.clone(),
            seen: BTreeSet::new(),
        })
    }

    /// Run one named build under the given variation spec and return the
    /// host-side artifact directory.
    ///
    /// Build names are unique per session; a repeat is rejected before any
    /// sandbox command is issued for it.
    pub fn submit(&mut self, build_name: &str, spec: &VariationSpec) -> Result<PathBuf> {
        if !self.seen.insert(build_name.to_string()) {
            return Err(Error::DuplicateBuildName(build_name.to_string()));
        }

        let scratch = self.testbed.scratch_root().to_path_buf();
        let ctx = BuildContext::new(
            &scratch,
            &self.test_args.result_dir,
            &self.test_args.source_root,
            build_name,
            self.test_args.source_pattern.as_deref(),
        );

        let base = Build::new(
            self.test_args.build_command.clone(),
            ctx.testbed_source_path(),
        );
        let planned = plan(spec, &base)?;

        ctx.copydown(&mut self.testbed)?;
        ctx.run_build(
            &mut self.testbed,
            &planned,
            &self.test_args.artifact_pattern,
            self.testbed_args.pre_build.as_deref(),
        )?;
        ctx.copyup(&mut self.testbed)
    }

    /// Normal teardown: stop the testbed cleanly.
    pub fn close(mut self) -> Result<()> {
        self.testbed.stop()
    }

    /// Error-path teardown. With preserve-on-error set the testbed is
    /// poisoned instead of stopped, so the backend exits non-zero and the
    /// operator knows scratch state was left behind on purpose.
    pub fn abort(mut self) {
        let outcome = if self.test_args.preserve_on_error {
            self.testbed.poison()
        } else {
            self.testbed.stop()
        };
        if let Err(e) = outcome {
            eprintln!("  [WARN] testbed teardown after failure also failed: {e}");
        }
    }

    /// Run a whole session body, guaranteeing exactly one teardown on
    /// every exit path.
    pub fn with_session<T>(
        spawner: &dyn ServerSpawner,
        test_args: &TestArgs,
        testbed_args: &TestbedArgs,
        body: impl FnOnce(&mut Orchestrator) -> Result<T>,
    ) -> Result<T> {
        let mut session = Self::prime_on(spawner, test_args, testbed_args)?;
        match body(&mut session) {
            Ok(value) => {
                session.close()?;
                Ok(value)
            }
            Err(e) => {
                session.abort();
                Err(e)
            }
        }
    }
}

//! Top-level verification strategies.
//!
//! All three are built on the orchestrator and the differ. They treat a
//! negative reproducibility verdict as an ordinary outcome value; only
//! infrastructure failures (testbed, diff tool) travel as errors, and a
//! `TestbedFailure` is never swallowed here.

mod auto;
mod check;
mod env;

pub use auto::{check_auto, AutoOutcome};
pub use check::{check, CheckOutcome};
pub use env::{check_env, EnvOutcome, EnvStage};

//! Reprocheck - build-reproducibility verification engine.
//!
//! Runs the same build one or more times inside an isolated testbed,
//! deliberately fixing or perturbing axes of non-determinism, collects the
//! artifacts, and compares them to decide whether the build is
//! reproducible. The bisection mode narrows a failure down to the
//! responsible axes.
//!
//! The concrete sandbox backends and the perturbation axis library live
//! outside this crate; see `server` for the backend protocol and
//! `variation` for how axes plug in.

pub mod build;
pub mod common;
pub mod config;
pub mod context;
pub mod differ;
pub mod envvars;
pub mod error;
pub mod hash;
pub mod orchestrator;
pub mod process;
pub mod server;
pub mod strategy;
pub mod testbed;
pub mod variation;

pub use config::{TestArgs, TestbedArgs};
pub use error::{Error, Result};

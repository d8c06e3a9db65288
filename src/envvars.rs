//! Environment-variable categorization for the triage strategy.
//!
//! Two hard-coded lists drive `check_env`: variables known to leak noise
//! into builds (they should be pinned in production, but a robust build
//! must tolerate them varying), and variables expected in any sane
//! environment and left alone. Everything ambient and on neither list is
//! unknown and gets flagged for triage.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::build::{BUILD_PATH_VAR, UMASK_VAR};
use crate::variation::VariationTransform;

/// Axis name used by environment variation specs.
pub const ENVIRONMENT_AXIS: &str = "environment";

/// Suffix appended to a varied variable's value; also the value a varied
/// but previously-unset variable receives.
pub const ENV_MARKER: &str = "i-capture-the-environment";

/// Known-noisy variables: frequent, documented sources of irreproducibility.
pub const KNOWN_NOISY: &[&str] = &[
    "TERM",
    "SHELL",
    "USER",
    "USERNAME",
    "LOGNAME",
    "HOSTNAME",
    "LANG",
    "LANGUAGE",
    "LC_ALL",
    "TZ",
    "MAIL",
    "OLDPWD",
];

/// Variables any environment is expected to carry; never flagged.
pub const EXPECTED: &[&str] = &[
    "HOME",
    "PATH",
    "PWD",
    "SHLVL",
    "TMPDIR",
    "_",
    BUILD_PATH_VAR,
    UMASK_VAR,
];

pub fn known_noisy() -> BTreeSet<String> {
    KNOWN_NOISY.iter().map(|s| s.to_string()).collect()
}

/// Ambient variable names that are neither expected nor the bootstrap
/// entries: the unknown set stage 2 of the triage varies.
pub fn triage_set(ambient: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    ambient
        .into_iter()
        .filter(|name| !EXPECTED.contains(&name.as_str()))
        .collect()
}

/// The one transform this crate owns: perturb a fixed set of environment
/// variables.
///
/// Fixed policy canonicalizes each named variable to the empty string, so
/// control builds agree no matter what the ambient environment held.
/// Varied policy gives each a different but still-valid value: the
/// existing value with the marker appended, or the marker alone when
/// unset.
pub fn env_variation(names: &BTreeSet<String>) -> VariationTransform {
    let names = names.clone();
    Arc::new(move |build, vary| {
        let mut next = build;
        for name in &names {
            let value = if vary {
                match next.env.get(name) {
                    Some(current) => format!("{current}-{ENV_MARKER}"),
                    None => ENV_MARKER.to_string(),
                }
            } else {
                String::new()
            };
            next = next.with_env(name, value);
        }
        Ok(next)
    })
}

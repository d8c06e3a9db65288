//! Variation specs: which perturbation axes apply to a build, and how.
//!
//! The concrete axis library (time, filesystem order, locale, ...) lives
//! outside this crate; here an axis is just a name plus a transform
//! function. Order matters: transforms are folded over the build plan in
//! the order their axes entered the spec, so later axes observe the
//! environment and tree left by earlier ones.

use std::fmt;
use std::sync::Arc;

use crate::build::Build;
use crate::error::Result;

/// Whether an axis is normalized to one canonical value or deliberately
/// changed to a different, still-valid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Fixed,
    Varied,
}

impl Policy {
    pub fn is_varied(self) -> bool {
        matches!(self, Policy::Varied)
    }
}

/// A pure plan transform. Receives the build accumulated so far plus the
/// axis policy as a bool (`true` = vary) and returns a new plan.
///
/// Contract: a transform that relocates the working tree must also update
/// the `REPROTEST_BUILD_PATH` environment entry, so the generated script
/// still `cd`s to the right place.
pub type VariationTransform = Arc<dyn Fn(Build, bool) -> Result<Build> + Send + Sync>;

/// One axis decision inside a spec.
#[derive(Clone)]
pub struct Action {
    pub axis: String,
    pub policy: Policy,
    pub transform: VariationTransform,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("axis", &self.axis)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// An ordered, immutable mapping of axis name to (policy, transform).
///
/// Axis names are unique within a spec; insertion order is preserved and is
/// part of the contract, not an implementation detail.
#[derive(Debug, Clone, Default)]
pub struct VariationSpec {
    actions: Vec<Action>,
}

impl VariationSpec {
    /// The empty spec: no axes touched, the build runs as-is.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a spec from axis decisions. A repeated axis name keeps only
    /// the last decision, at the axis's first position.
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self::empty().extend(actions)
    }

    /// Return a new spec with more axis decisions merged in.
    ///
    /// A decision for an axis already present replaces it in place (the
    /// axis keeps its original position); a new axis is appended.
    pub fn extend(&self, actions: impl IntoIterator<Item = Action>) -> Self {
        let mut merged = self.actions.clone();
        for action in actions {
            match merged.iter_mut().find(|a| a.axis == action.axis) {
                Some(slot) => *slot = action,
                None => merged.push(action),
            }
        }
        Self { actions: merged }
    }

    /// Ordered (axis, should_vary, transform) triples.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action_of(&self, axis: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.axis == axis)
    }

    pub fn policy_of(&self, axis: &str) -> Option<Policy> {
        self.actions
            .iter()
            .find(|a| a.axis == axis)
            .map(|a| a.policy)
    }

    /// Names of axes marked varied, in spec order.
    pub fn varied_axes(&self) -> Vec<String> {
        self.actions
            .iter()
            .filter(|a| a.policy.is_varied())
            .map(|a| a.axis.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Convenience constructor for one axis decision.
pub fn action(
    axis: impl Into<String>,
    policy: Policy,
    transform: VariationTransform,
) -> Action {
    Action {
        axis: axis.into(),
        policy,
        transform,
    }
}

/// A transform that leaves the plan untouched. Useful for axes whose only
/// effect happens outside the plan (or in tests).
pub fn identity_transform() -> VariationTransform {
    Arc::new(|build, _| Ok(build))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn env_marker(key: &'static str) -> VariationTransform {
        Arc::new(move |build: Build, vary| {
            Ok(if vary {
                build.with_env(key, "varied")
            } else {
                build.with_env(key, "fixed")
            })
        })
    }

    fn base() -> Build {
        Build::new("true", PathBuf::from("/tmp/src"))
    }

    #[test]
    fn test_repeated_axis_keeps_last_decision() {
        let spec = VariationSpec::new([
            action("time", Policy::Fixed, identity_transform()),
            action("time", Policy::Varied, identity_transform()),
        ]);

        assert_eq!(spec.actions().len(), 1);
        assert_eq!(spec.policy_of("time"), Some(Policy::Varied));
    }

    #[test]
    fn test_extend_preserves_order_and_replaces() {
        let spec = VariationSpec::new([
            action("time", Policy::Fixed, identity_transform()),
            action("locale", Policy::Fixed, identity_transform()),
        ]);

        let extended = spec.extend([
            action("time", Policy::Varied, identity_transform()),
            action("hostname", Policy::Varied, identity_transform()),
        ]);

        let names: Vec<_> = extended.actions().iter().map(|a| a.axis.as_str()).collect();
        assert_eq!(names, ["time", "locale", "hostname"]);
        assert_eq!(extended.policy_of("time"), Some(Policy::Varied));
        // The original spec is untouched.
        assert_eq!(spec.policy_of("time"), Some(Policy::Fixed));
    }

    #[test]
    fn test_varied_axes_in_order() {
        let spec = VariationSpec::new([
            action("time", Policy::Varied, identity_transform()),
            action("locale", Policy::Fixed, identity_transform()),
            action("hostname", Policy::Varied, identity_transform()),
        ]);

        assert_eq!(spec.varied_axes(), ["time", "hostname"]);
    }

    #[test]
    fn test_transforms_see_policy() {
        let spec = VariationSpec::new([
            action("a", Policy::Fixed, env_marker("A")),
            action("b", Policy::Varied, env_marker("B")),
        ]);

        let mut build = base();
        for act in spec.actions() {
            build = (act.transform)(build, act.policy.is_varied()).unwrap();
        }
        assert_eq!(build.env.get("A").unwrap(), "fixed");
        assert_eq!(build.env.get("B").unwrap(), "varied");
    }
}

use tracing::debug;

use crate::{
    error::Error,
    joint::{JointSpecs, JointVector},
};

/// Consistent copy of both joint vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSnapshot {
    pub current: JointVector,
    pub target: JointVector,
}

/// Owner of the `current` and `target` joint vectors.
///
/// This is the only writer of either vector. `target` always satisfies the
/// joint limits; `current` mirrors whatever the authority (or the local
/// stepper) reports and is not clamped.
#[derive(Debug, Clone)]
pub struct JointStateStore {
    specs: JointSpecs,
    current: JointVector,
    target: JointVector,
}

impl JointStateStore {
    pub fn new(specs: JointSpecs) -> Self {
        let current = specs.zeros();
        let target = specs.zeros();
        Self {
            specs,
            current,
            target,
        }
    }

    pub fn specs(&self) -> &JointSpecs {
        &self.specs
    }

    pub fn current(&self) -> &JointVector {
        &self.current
    }

    pub fn target(&self) -> &JointVector {
        &self.target
    }

    pub fn snapshot(&self) -> JointSnapshot {
        JointSnapshot {
            current: self.current.clone(),
            target: self.target.clone(),
        }
    }

    /// Clamps `value` to the joint limit and stores it as the target of
    /// `index`. Returns the stored value.
    ///
    /// A non-finite `value` is an error and leaves the target unchanged.
    pub fn set_target(&mut self, index: usize, value: f64) -> Result<f64, Error> {
        let spec = self.specs.get(index)?;
        let clamped = spec.clamp(value)?;
        if clamped != value {
            debug!(joint = %spec.name, value, clamped, "target clamped to joint limit");
        }
        self.target.as_mut_slice()[index] = clamped;
        Ok(clamped)
    }

    /// Replaces the whole target, clamping each component. On error the old
    /// target is kept.
    pub fn set_targets(&mut self, targets: &JointVector) -> Result<&JointVector, Error> {
        self.target = self.specs.clamp(targets)?;
        Ok(&self.target)
    }

    pub fn reset_target(&mut self) {
        self.target = self.specs.zeros();
    }

    /// Replaces `current` wholesale with a snapshot pushed by the authority.
    pub fn apply_current(&mut self, current: JointVector) -> Result<(), Error> {
        self.specs.check_dimension(current.len())?;
        self.current = current;
        Ok(())
    }

    /// Moves each component of `current` the fraction `t` of the remaining
    /// distance toward `goal`.
    ///
    /// Each call advances from the latest `current`, so calling it twice with
    /// the same `t` moves twice. The local stepper calls it once per tick with
    /// `t = step / steps`, which lands exactly on `goal` at the last step.
    pub fn step_current_toward(&mut self, goal: &JointVector, t: f64) -> Result<(), Error> {
        self.specs.check_dimension(goal.len())?;
        step_toward(self.current.as_mut_slice(), goal, t);
        Ok(())
    }
}

fn step_toward(current: &mut [f64], goal: &[f64], t: f64) {
    let t = t.clamp(0.0, 1.0);
    for (c, g) in current.iter_mut().zip(goal.iter()) {
        *c += (g - *c) * t;
    }
}

/// Number of ticks a local move takes. At least one, so every move ends on
/// its goal.
pub(crate) fn effective_steps(steps: usize) -> usize {
    steps.max(1)
}

/// Every intermediate vector the local stepper produces for a move from
/// `start` to `goal` in `steps` ticks, `start` included.
///
/// Uses the same stepping as [`JointStateStore::step_current_toward`], and a
/// `steps` of 0 is treated as 1 like [`MotionController`](crate::MotionController) does.
pub fn local_trajectory(
    start: &JointVector,
    goal: &JointVector,
    steps: usize,
) -> Vec<JointVector> {
    let steps = effective_steps(steps);
    let mut points = Vec::with_capacity(steps + 1);
    let mut current = start.clone();
    points.push(current.clone());
    for step in 1..=steps {
        step_toward(current.as_mut_slice(), goal, step as f64 / steps as f64);
        points.push(current.clone());
    }
    points
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;
    use crate::joint::JointSpecConfig;

    fn store(n: usize) -> JointStateStore {
        let configs = (0..n)
            .map(|i| JointSpecConfig::new(format!("j{i}"), -90.0, 90.0))
            .collect::<Vec<_>>();
        JointStateStore::new(JointSpecs::try_new(&configs).unwrap())
    }

    #[test]
    fn test_set_target_clamps_to_nearest_bound() {
        let mut store = store(2);
        assert_approx_eq!(store.set_target(0, 120.0).unwrap(), 90.0);
        assert_eq!(store.target().as_slice(), &[90.0, 0.0]);
        assert_approx_eq!(store.set_target(1, -1000.0).unwrap(), -90.0);
        assert_approx_eq!(store.set_target(1, 45.5).unwrap(), 45.5);
        assert_eq!(store.target().as_slice(), &[90.0, 45.5]);
        // current is untouched
        assert_eq!(store.current().as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_set_target_index_out_of_range() {
        let mut store = store(2);
        assert!(matches!(
            store.set_target(2, 0.0),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert_eq!(store.target().as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_set_target_rejects_non_finite() {
        let mut store = store(2);
        store.set_target(0, 30.0).unwrap();
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                store.set_target(0, value),
                Err(Error::NonFiniteTarget { index: 0, .. })
            ));
        }
        assert!(store.set_target(1, "nan".parse().unwrap()).is_err());
        assert_eq!(store.target().as_slice(), &[30.0, 0.0]);
    }

    #[test]
    fn test_set_targets_rejects_non_finite() {
        let mut store = store(3);
        store.set_targets(&vec![1.0, 2.0, 3.0].into()).unwrap();
        assert!(matches!(
            store.set_targets(&vec![10.0, f64::NAN, 10.0].into()),
            Err(Error::NonFiniteTarget { index: 1, .. })
        ));
        assert_eq!(store.target().as_slice(), &[1.0, 2.0, 3.0]);
        assert!(store.target().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_set_targets() {
        let mut store = store(3);
        let stored = store
            .set_targets(&vec![10.0, 200.0, -200.0].into())
            .unwrap()
            .clone();
        assert_eq!(stored.as_slice(), &[10.0, 90.0, -90.0]);
        assert!(store.set_targets(&vec![1.0].into()).is_err());
        assert_eq!(store.target(), &stored);
    }

    #[test]
    fn test_apply_current() {
        let mut store = store(7);
        store.set_target(3, 5.0).unwrap();
        store
            .apply_current(vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0].into())
            .unwrap();
        assert_eq!(
            store.current().as_slice(),
            &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]
        );
        assert_eq!(store.target().as_slice(), &[0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0]);
        assert!(matches!(
            store.apply_current(vec![1.0; 6].into()),
            Err(Error::DimensionMismatch {
                expected: 7,
                actual: 6
            })
        ));
    }

    #[test]
    fn test_apply_current_is_not_clamped() {
        let mut store = store(1);
        store.apply_current(vec![135.0].into()).unwrap();
        assert_approx_eq!(store.current()[0], 135.0);
    }

    #[test]
    fn test_step_current_toward_is_not_idempotent() {
        let mut store = store(1);
        let goal = JointVector::new(vec![80.0]);
        store.step_current_toward(&goal, 0.5).unwrap();
        assert_approx_eq!(store.current()[0], 40.0);
        store.step_current_toward(&goal, 0.5).unwrap();
        assert_approx_eq!(store.current()[0], 60.0);
    }

    #[test]
    fn test_thirty_steps_converge_from_any_start() {
        for start in [vec![0.0, 0.0], vec![-90.0, 90.0], vec![33.3, -12.5]] {
            let mut store = store(2);
            store.apply_current(start.into()).unwrap();
            let goal = JointVector::new(vec![90.0, -45.0]);
            for step in 1..=30 {
                store
                    .step_current_toward(&goal, step as f64 / 30.0)
                    .unwrap();
            }
            assert_approx_eq!(store.current()[0], 90.0, 1e-9);
            assert_approx_eq!(store.current()[1], -45.0, 1e-9);
        }
    }

    #[test]
    fn test_step_dimension_mismatch() {
        let mut store = store(2);
        assert!(store
            .step_current_toward(&JointVector::zeros(3), 0.5)
            .is_err());
    }

    #[test]
    fn test_local_trajectory() {
        let start = JointVector::new(vec![0.0, 10.0]);
        let goal = JointVector::new(vec![90.0, -10.0]);
        let points = local_trajectory(&start, &goal, 30);
        assert_eq!(points.len(), 31);
        assert_eq!(points[0], start);
        assert_approx_eq!(points[30][0], 90.0);
        assert_approx_eq!(points[30][1], -10.0);
        // first step covers 1/30 of the distance
        assert_approx_eq!(points[1][0], 3.0);
    }

    #[test]
    fn test_local_trajectory_with_zero_steps_reaches_goal() {
        let start = JointVector::new(vec![0.0]);
        let goal = JointVector::new(vec![45.0]);
        let points = local_trajectory(&start, &goal, 0);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], start);
        assert_eq!(points[1], goal);
    }

    #[test]
    fn test_local_trajectory_matches_stepper() {
        let mut store = store(2);
        store.apply_current(vec![-20.0, 70.0].into()).unwrap();
        let goal = JointVector::new(vec![85.0, -33.0]);
        let points = local_trajectory(store.current(), &goal, 7);
        for (step, point) in points.iter().enumerate().skip(1) {
            store.step_current_toward(&goal, step as f64 / 7.0).unwrap();
            assert_eq!(store.current(), point);
        }
    }
}

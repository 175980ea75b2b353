use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    connection::AuthoritySink,
    error::Error,
    joint::JointVector,
    protocol::ClientMessage,
    store::{effective_steps, JointStateStore},
    timer::Timer,
};

pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_INTERPOLATION_STEPS: usize = 30;
pub const DEFAULT_INTERPOLATION_TICK: Duration = Duration::from_millis(33);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    Idle,
    Moving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionConfig {
    /// How long a remote move stays `Moving` before it is assumed done.
    pub completion_timeout: Duration,
    pub interpolation_steps: usize,
    pub interpolation_tick: Duration,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
            interpolation_steps: DEFAULT_INTERPOLATION_STEPS,
            interpolation_tick: DEFAULT_INTERPOLATION_TICK,
        }
    }
}

/// Which way a move was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePath {
    /// Sent to the authority as a `move` command.
    Remote,
    /// Interpolated locally.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveOutcome {
    Started(MovePath),
    /// A move was already in progress.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionEvent {
    /// One local interpolation tick was applied to `current`.
    Stepped { step: usize, steps: usize },
    Completed { path: MovePath },
}

#[derive(Debug)]
enum ActiveMove {
    Remote { goal: JointVector },
    Local { goal: JointVector, step: usize },
}

/// `Idle`/`Moving` state machine.
///
/// Owns one timer: the completion timeout on the remote path, the next
/// interpolation tick on the local path. The store and the connection are
/// passed in per call; this type never keeps copies of either.
#[derive(Debug)]
pub struct MotionController {
    config: MotionConfig,
    active: Option<ActiveMove>,
    timer: Timer,
}

impl MotionController {
    pub fn new(mut config: MotionConfig) -> Self {
        config.interpolation_steps = effective_steps(config.interpolation_steps);
        Self {
            config,
            active: None,
            timer: Timer::default(),
        }
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    pub fn state(&self) -> MotionState {
        if self.active.is_some() {
            MotionState::Moving
        } else {
            MotionState::Idle
        }
    }

    pub fn is_moving(&self) -> bool {
        self.active.is_some()
    }

    /// The goal captured by the move in progress.
    pub fn goal(&self) -> Option<&JointVector> {
        match &self.active {
            Some(ActiveMove::Remote { goal } | ActiveMove::Local { goal, .. }) => Some(goal),
            None => None,
        }
    }

    pub fn path(&self) -> Option<MovePath> {
        match &self.active {
            Some(ActiveMove::Remote { .. }) => Some(MovePath::Remote),
            Some(ActiveMove::Local { .. }) => Some(MovePath::Local),
            None => None,
        }
    }

    /// Starts a move to the store's current `target`.
    ///
    /// Tries the authority first; any send failure falls back to local
    /// interpolation. Does nothing while a move is in progress.
    pub fn move_to_target<S>(&mut self, store: &JointStateStore, sink: &mut S) -> MoveOutcome
    where
        S: AuthoritySink + ?Sized,
    {
        if self.is_moving() {
            debug!("move already in progress, ignoring");
            return MoveOutcome::Ignored;
        }
        let goal = store.target().clone();
        match sink.send(&ClientMessage::Move {
            angles: goal.clone(),
        }) {
            Ok(()) => {
                info!(?goal, "move sent to authority");
                self.timer.schedule(self.config.completion_timeout);
                self.active = Some(ActiveMove::Remote { goal });
                MoveOutcome::Started(MovePath::Remote)
            }
            Err(e) => {
                info!(?goal, reason = %e, "interpolating move locally");
                self.timer.schedule(self.config.interpolation_tick);
                self.active = Some(ActiveMove::Local { goal, step: 0 });
                MoveOutcome::Started(MovePath::Local)
            }
        }
    }

    /// Zeroes `target` right away, whatever the motion state, then moves
    /// there.
    pub fn reset_to_home<S>(&mut self, store: &mut JointStateStore, sink: &mut S) -> MoveOutcome
    where
        S: AuthoritySink + ?Sized,
    {
        store.reset_target();
        self.move_to_target(store, sink)
    }

    /// Resolves when the timer of the move in progress fires. Never resolves
    /// while `Idle`.
    ///
    /// Cancel safe.
    pub async fn due(&self) {
        self.timer.expired().await
    }

    /// Handles the timer firing. Call once after every [`due`](Self::due).
    pub fn on_due(&mut self, store: &mut JointStateStore) -> Result<Option<MotionEvent>, Error> {
        self.timer.cancel();
        match self.active.take() {
            None => Ok(None),
            Some(ActiveMove::Remote { goal }) => {
                info!(?goal, "move assumed complete");
                Ok(Some(MotionEvent::Completed {
                    path: MovePath::Remote,
                }))
            }
            Some(ActiveMove::Local { goal, step }) => {
                let steps = self.config.interpolation_steps;
                let step = step + 1;
                store.step_current_toward(&goal, step as f64 / steps as f64)?;
                if step >= steps {
                    info!(?goal, "local interpolation finished");
                    return Ok(Some(MotionEvent::Completed {
                        path: MovePath::Local,
                    }));
                }
                self.timer.schedule(self.config.interpolation_tick);
                self.active = Some(ActiveMove::Local { goal, step });
                Ok(Some(MotionEvent::Stepped { step, steps }))
            }
        }
    }

    /// Cancels a pending remote completion. A local interpolation keeps
    /// running until its last step.
    pub fn teardown(&mut self) {
        if let Some(ActiveMove::Remote { .. }) = self.active {
            self.timer.cancel();
            self.active = None;
            debug!("pending move completion cancelled");
        }
    }
}

impl Default for MotionController {
    fn default() -> Self {
        Self::new(MotionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;
    use tokio::time::Instant;

    use super::*;
    use crate::joint::{JointSpecConfig, JointSpecs};

    /// Records everything sent while "open".
    #[derive(Debug, Default)]
    struct RecordingSink {
        open: bool,
        sent: Vec<ClientMessage>,
    }

    impl AuthoritySink for RecordingSink {
        fn send(&mut self, message: &ClientMessage) -> Result<(), Error> {
            if !self.open {
                return Err(Error::NotConnected);
            }
            self.sent.push(message.clone());
            Ok(())
        }
    }

    fn two_joint_store() -> JointStateStore {
        JointStateStore::new(
            JointSpecs::try_new(&[
                JointSpecConfig::new("a", -90.0, 90.0),
                JointSpecConfig::new("b", -90.0, 90.0),
            ])
            .unwrap(),
        )
    }

    async fn run_to_idle(motion: &mut MotionController, store: &mut JointStateStore) -> usize {
        let mut ticks = 0;
        while motion.is_moving() {
            motion.due().await;
            if let Some(MotionEvent::Stepped { .. }) = motion.on_due(store).unwrap() {
                ticks += 1;
            }
        }
        ticks
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_interpolation_converges() {
        let mut store = two_joint_store();
        let mut sink = RecordingSink::default();
        let mut motion = MotionController::default();

        store.set_target(0, 120.0).unwrap();
        assert_eq!(store.target().as_slice(), &[90.0, 0.0]);

        let start = Instant::now();
        assert_eq!(
            motion.move_to_target(&store, &mut sink),
            MoveOutcome::Started(MovePath::Local)
        );
        assert_eq!(motion.state(), MotionState::Moving);
        // 29 intermediate ticks and the final one
        assert_eq!(run_to_idle(&mut motion, &mut store).await, 29);
        assert_eq!(motion.state(), MotionState::Idle);
        assert!(start.elapsed() >= DEFAULT_INTERPOLATION_TICK * 30);
        assert_approx_eq!(store.current()[0], 90.0);
        assert_approx_eq!(store.current()[1], 0.0);
        assert!(sink.sent.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_move_completes_on_timeout() {
        let mut store = two_joint_store();
        let mut sink = RecordingSink {
            open: true,
            ..Default::default()
        };
        let mut motion = MotionController::default();
        store.set_target(1, -45.0).unwrap();

        let start = Instant::now();
        assert_eq!(
            motion.move_to_target(&store, &mut sink),
            MoveOutcome::Started(MovePath::Remote)
        );
        assert_eq!(
            sink.sent,
            vec![ClientMessage::Move {
                angles: vec![0.0, -45.0].into()
            }]
        );
        // the connection going away does not affect the completion timer
        sink.open = false;
        motion.due().await;
        assert!(start.elapsed() >= DEFAULT_COMPLETION_TIMEOUT);
        assert_eq!(
            motion.on_due(&mut store).unwrap(),
            Some(MotionEvent::Completed {
                path: MovePath::Remote
            })
        );
        assert_eq!(motion.state(), MotionState::Idle);
        // current is left to the authority
        assert_eq!(store.current().as_slice(), &[0.0, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_while_moving_is_ignored() {
        let mut store = two_joint_store();
        let mut sink = RecordingSink {
            open: true,
            ..Default::default()
        };
        let mut motion = MotionController::default();
        motion.move_to_target(&store, &mut sink);
        store.set_target(0, 10.0).unwrap();
        assert_eq!(motion.move_to_target(&store, &mut sink), MoveOutcome::Ignored);
        assert_eq!(sink.sent.len(), 1);
        assert_eq!(motion.goal().unwrap().as_slice(), &[0.0, 0.0]);

        let mut local = MotionController::default();
        sink.open = false;
        local.move_to_target(&store, &mut sink);
        local.due().await;
        local.on_due(&mut store).unwrap();
        assert_eq!(local.move_to_target(&store, &mut sink), MoveOutcome::Ignored);
        assert_eq!(local.path(), Some(MovePath::Local));
        assert_eq!(run_to_idle(&mut local, &mut store).await, 28);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_to_home_is_idempotent() {
        let mut store = two_joint_store();
        let mut sink = RecordingSink::default();
        let mut motion = MotionController::default();
        store.apply_current(vec![30.0, -60.0].into()).unwrap();
        store.set_target(0, 45.0).unwrap();

        for _ in 0..2 {
            motion.reset_to_home(&mut store, &mut sink);
            assert_eq!(store.target().as_slice(), &[0.0, 0.0]);
            run_to_idle(&mut motion, &mut store).await;
            assert_approx_eq!(store.current()[0], 0.0);
            assert_approx_eq!(store.current()[1], 0.0);
            assert_eq!(store.target().as_slice(), &[0.0, 0.0]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_zeroes_target_while_moving() {
        let mut store = two_joint_store();
        let mut sink = RecordingSink {
            open: true,
            ..Default::default()
        };
        let mut motion = MotionController::default();
        store.set_target(0, 50.0).unwrap();
        motion.move_to_target(&store, &mut sink);
        assert_eq!(motion.reset_to_home(&mut store, &mut sink), MoveOutcome::Ignored);
        assert_eq!(store.target().as_slice(), &[0.0, 0.0]);
        assert_eq!(sink.sent.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_remote_only() {
        let mut store = two_joint_store();
        let mut sink = RecordingSink {
            open: true,
            ..Default::default()
        };
        let mut remote = MotionController::default();
        remote.move_to_target(&store, &mut sink);
        remote.teardown();
        assert_eq!(remote.state(), MotionState::Idle);
        let res = tokio::time::timeout(Duration::from_secs(5), remote.due()).await;
        assert!(res.is_err());

        sink.open = false;
        let mut local = MotionController::default();
        local.move_to_target(&store, &mut sink);
        local.teardown();
        assert_eq!(local.state(), MotionState::Moving);
        run_to_idle(&mut local, &mut store).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_step_config() {
        let mut store = two_joint_store();
        let mut sink = RecordingSink::default();
        let mut motion = MotionController::new(MotionConfig {
            interpolation_steps: 0,
            ..Default::default()
        });
        assert_eq!(motion.config().interpolation_steps, 1);
        store.set_target(1, 20.0).unwrap();
        motion.move_to_target(&store, &mut sink);
        assert_eq!(run_to_idle(&mut motion, &mut store).await, 0);
        assert_eq!(store.current().as_slice(), &[0.0, 20.0]);
    }
}

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState},
    error::Error,
    joint::{JointSpecs, JointVector},
    motion::{MotionConfig, MotionController, MotionEvent, MotionState, MoveOutcome},
    protocol::{AuthorityMessage, EndEffectorPose},
    store::JointStateStore,
    transport::Transport,
};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub connection: ConnectionConfig,
    pub motion: MotionConfig,
}

/// Everything a renderer or status indicator needs, taken at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSnapshot {
    pub current: JointVector,
    pub target: JointVector,
    pub connection: ConnectionState,
    pub motion: MotionState,
    /// Last pose reported by the authority. Display only.
    pub end_effector: Option<EndEffectorPose>,
    /// Number of `joint_state` messages applied to `current`.
    pub authority_updates: u64,
}

#[derive(Debug)]
enum Command {
    SetTarget {
        index: usize,
        value: f64,
        reply: oneshot::Sender<Result<f64, Error>>,
    },
    SetTargets {
        targets: JointVector,
        reply: oneshot::Sender<Result<JointVector, Error>>,
    },
    MoveToTarget {
        reply: oneshot::Sender<MoveOutcome>,
    },
    ResetToHome {
        reply: oneshot::Sender<MoveOutcome>,
    },
    Connect {
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Store, connection and motion controller running on one timeline.
///
/// Every state change happens inside [`spawn`](Self::spawn)'s task, one event
/// at a time: a handle command, a connection event or a motion timer. A
/// snapshot is published after each.
#[derive(Debug)]
pub struct SyncEngine {
    store: JointStateStore,
    connection: ConnectionManager,
    motion: MotionController,
    end_effector: Option<EndEffectorPose>,
    authority_updates: u64,
    snapshots: watch::Sender<SyncSnapshot>,
}

impl SyncEngine {
    pub fn new<T>(specs: JointSpecs, transport: T, options: SyncOptions) -> Self
    where
        T: Transport + 'static,
    {
        let store = JointStateStore::new(specs);
        let connection = ConnectionManager::new(Arc::new(transport), options.connection);
        let motion = MotionController::new(options.motion);
        let (snapshots, _) = watch::channel(SyncSnapshot {
            current: store.current().clone(),
            target: store.target().clone(),
            connection: connection.state(),
            motion: motion.state(),
            end_effector: None,
            authority_updates: 0,
        });
        Self {
            store,
            connection,
            motion,
            end_effector: None,
            authority_updates: 0,
            snapshots,
        }
    }

    pub fn specs(&self) -> &JointSpecs {
        self.store.specs()
    }

    /// Starts the engine on the current tokio runtime.
    pub fn spawn(self) -> (SyncHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SyncHandle {
            specs: self.store.specs().clone(),
            commands: commands_tx,
            snapshots: self.snapshots.subscribe(),
        };
        (handle, tokio::spawn(self.run(commands_rx)))
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(
            joints = self.store.specs().len(),
            endpoint = %self.connection.endpoint(),
            "sync engine started"
        );
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        commands.close();
                        self.teardown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("every handle dropped");
                        self.teardown();
                        break;
                    }
                },
                event = self.connection.next_event() => {
                    self.handle_connection_event(event);
                    self.publish();
                }
                () = self.motion.due() => {
                    self.handle_motion_due();
                    self.publish();
                }
            }
        }
        info!("sync engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "command");
        match command {
            Command::SetTarget {
                index,
                value,
                reply,
            } => {
                let result = self.store.set_target(index, value);
                self.publish();
                let _ = reply.send(result);
            }
            Command::SetTargets { targets, reply } => {
                let result = self.store.set_targets(&targets).cloned();
                self.publish();
                let _ = reply.send(result);
            }
            Command::MoveToTarget { reply } => {
                let outcome = self.motion.move_to_target(&self.store, &mut self.connection);
                self.publish();
                let _ = reply.send(outcome);
            }
            Command::ResetToHome { reply } => {
                let outcome = self
                    .motion
                    .reset_to_home(&mut self.store, &mut self.connection);
                self.publish();
                let _ = reply.send(outcome);
            }
            Command::Connect { reply } => {
                let started = self.connection.connect();
                self.publish();
                let _ = reply.send(started);
            }
            Command::Shutdown { .. } => unreachable!("handled by the run loop"),
        }
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Message(AuthorityMessage::JointState {
                angles,
                end_effector,
            }) => {
                if let Err(e) = self.store.apply_current(angles) {
                    if e.is_configuration_error() {
                        error!(error = %e, "joint_state does not match the joint table, dropping");
                    } else {
                        warn!(error = %e, "joint_state rejected, dropping");
                    }
                    return;
                }
                self.authority_updates += 1;
                if end_effector.is_some() {
                    self.end_effector = end_effector;
                }
            }
            event => debug!(?event, state = ?self.connection.state(), "connection event"),
        }
    }

    fn handle_motion_due(&mut self) {
        match self.motion.on_due(&mut self.store) {
            Ok(Some(MotionEvent::Completed { path })) => debug!(?path, "motion idle"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "local interpolation failed"),
        }
    }

    fn teardown(&mut self) {
        self.connection.teardown();
        self.motion.teardown();
        self.publish();
    }

    fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            current: self.store.current().clone(),
            target: self.store.target().clone(),
            connection: self.connection.state(),
            motion: self.motion.state(),
            end_effector: self.end_effector.clone(),
            authority_updates: self.authority_updates,
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshots.send_if_modified(|published| {
            if *published == snapshot {
                return false;
            }
            *published = snapshot;
            true
        });
    }
}

/// Cloneable handle to a spawned [`SyncEngine`].
///
/// Every operation fails with [`Error::Closed`] once the engine has shut
/// down.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    specs: JointSpecs,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<SyncSnapshot>,
}

impl SyncHandle {
    pub fn specs(&self) -> &JointSpecs {
        &self.specs
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> Command,
    ) -> Result<R, Error> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Sets the target of joint `index`, clamped to its limit. Returns the
    /// stored value.
    pub async fn set_target(&self, index: usize, value: f64) -> Result<f64, Error> {
        self.request(|reply| Command::SetTarget {
            index,
            value,
            reply,
        })
        .await?
    }

    /// Replaces every target at once, clamped per joint.
    pub async fn set_targets(&self, targets: JointVector) -> Result<JointVector, Error> {
        self.request(|reply| Command::SetTargets { targets, reply })
            .await?
    }

    pub async fn move_to_target(&self) -> Result<MoveOutcome, Error> {
        self.request(|reply| Command::MoveToTarget { reply }).await
    }

    pub async fn reset_to_home(&self) -> Result<MoveOutcome, Error> {
        self.request(|reply| Command::ResetToHome { reply }).await
    }

    /// Returns `true` if a connection attempt was started.
    pub async fn connect(&self) -> Result<bool, Error> {
        self.request(|reply| Command::Connect { reply }).await
    }

    pub fn snapshot(&self) -> Result<SyncSnapshot, Error> {
        if self.commands.is_closed() {
            return Err(Error::Closed);
        }
        Ok(self.snapshots.borrow().clone())
    }

    /// A receiver that sees every published snapshot.
    pub fn subscribe(&self) -> Result<watch::Receiver<SyncSnapshot>, Error> {
        if self.commands.is_closed() {
            return Err(Error::Closed);
        }
        let mut rx = self.snapshots.clone();
        rx.mark_changed();
        Ok(rx)
    }

    /// Waits until no move is in progress.
    pub async fn wait_until_idle(&self) -> Result<SyncSnapshot, Error> {
        self.wait_for(|s| s.motion == MotionState::Idle).await
    }

    /// Waits up to `timeout` for the connection to open. Returns `false` on
    /// timeout.
    pub async fn wait_until_open(&self, timeout: Duration) -> Result<bool, Error> {
        match tokio::time::timeout(
            timeout,
            self.wait_for(|s| s.connection == ConnectionState::Open),
        )
        .await
        {
            Ok(res) => res.map(|_| true),
            Err(_) => Ok(false),
        }
    }

    /// Waits for the first snapshot satisfying `f`, the current one
    /// included.
    pub async fn wait_for(
        &self,
        mut f: impl FnMut(&SyncSnapshot) -> bool,
    ) -> Result<SyncSnapshot, Error> {
        let mut rx = self.subscribe()?;
        let snapshot = rx.wait_for(|s| f(s)).await.map_err(|_| Error::Closed)?;
        Ok(snapshot.clone())
    }

    /// Tears the engine down and waits for it to stop. No reconnection
    /// follows.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

use std::{path::Path, time::Duration};

use armsync::{
    ConnectionConfig, JointSpecConfig, JointSpecs, MotionConfig, PlacementModel, RenderShape,
    SyncOptions,
};
use armsync_ws::{WebSocketTransport, WebSocketTransportConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::Error;

/// Joint table used when `joints` is empty.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RobotProfile {
    #[default]
    KukaIiwa,
    SixAxis,
}

impl RobotProfile {
    pub fn joint_specs(self) -> JointSpecs {
        match self {
            RobotProfile::KukaIiwa => JointSpecs::kuka_iiwa(),
            RobotProfile::SixAxis => JointSpecs::six_axis(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ArmSyncConfig {
    /// Address of the authority. Reconnection reuses it indefinitely.
    #[serde(default = "default_endpoint")]
    pub endpoint: Url,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// A move sent to the authority is considered done after this long.
    #[serde(default = "default_move_completion_timeout_ms")]
    pub move_completion_timeout_ms: u64,
    #[serde(default = "default_interpolation_steps")]
    pub interpolation_steps: usize,
    #[serde(default = "default_interpolation_tick_ms")]
    pub interpolation_tick_ms: u64,
    #[serde(default)]
    pub placement: PlacementModel,
    #[serde(default)]
    pub render_shape: RenderShape,
    #[serde(default)]
    pub profile: RobotProfile,
    #[serde(default)]
    pub websocket: WebSocketTransportConfig,
    /// Overrides `profile` when not empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joints: Vec<JointSpecConfig>,
}

fn default_endpoint() -> Url {
    ConnectionConfig::default().endpoint
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_move_completion_timeout_ms() -> u64 {
    1000
}

fn default_interpolation_steps() -> usize {
    30
}

fn default_interpolation_tick_ms() -> u64 {
    33
}

impl Default for ArmSyncConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            move_completion_timeout_ms: default_move_completion_timeout_ms(),
            interpolation_steps: default_interpolation_steps(),
            interpolation_tick_ms: default_interpolation_tick_ms(),
            placement: PlacementModel::default(),
            render_shape: RenderShape::default(),
            profile: RobotProfile::default(),
            websocket: WebSocketTransportConfig::default(),
            joints: vec![],
        }
    }
}

impl ArmSyncConfig {
    pub fn try_new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::from_str(
            &std::fs::read_to_string(&path)
                .map_err(|e| Error::NoFile(path.as_ref().to_owned(), e))?,
            &path,
        )
    }

    pub fn from_str<P: AsRef<Path>>(s: &str, path: P) -> Result<Self, Error> {
        let config: ArmSyncConfig =
            toml::from_str(s).map_err(|e| Error::TomlParseFailure(path.as_ref().to_owned(), e))?;
        // Reject bad joint tables at load time rather than at first use.
        config.joint_specs()?;
        debug!(path = ?path.as_ref(), "config loaded");
        Ok(config)
    }

    pub fn joint_specs(&self) -> Result<JointSpecs, Error> {
        if self.joints.is_empty() {
            return Ok(self.profile.joint_specs());
        }
        Ok(JointSpecs::try_new(&self.joints)?)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            connection: ConnectionConfig {
                endpoint: self.endpoint.clone(),
                reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            },
            motion: MotionConfig {
                completion_timeout: Duration::from_millis(self.move_completion_timeout_ms),
                interpolation_steps: self.interpolation_steps,
                interpolation_tick: Duration::from_millis(self.interpolation_tick_ms),
            },
        }
    }

    pub fn transport(&self) -> WebSocketTransport {
        WebSocketTransport::new(self.websocket.clone())
    }
}

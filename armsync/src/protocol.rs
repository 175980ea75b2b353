//! JSON text messages exchanged with the authority.

use serde::{Deserialize, Serialize};

use crate::{error::Error, joint::JointVector};

/// Client to authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Asks the authority to push its current joint state.
    GetState,
    /// Asks the authority to drive the arm to `angles` (degrees).
    Move { angles: JointVector },
}

impl ClientMessage {
    pub fn to_text(&self) -> String {
        // Serializing these variants cannot fail: no maps with non-string
        // keys, no custom Serialize impls.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Pose of the last link as reported by the authority. Display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndEffectorPose {
    pub position: [f64; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub orientation: [f64; 4],
}

/// Authority to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthorityMessage {
    JointState {
        angles: JointVector,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_effector: Option<EndEffectorPose>,
    },
}

impl AuthorityMessage {
    /// Parses one text frame. Malformed JSON, a missing `type`, or an unknown
    /// `type` all fail with [`Error::Protocol`].
    pub fn from_text(text: &str) -> Result<Self, Error> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("malformed JSON: {e}")))?;
        let ty = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::protocol("message has no string `type` field"))?;
        match ty {
            "joint_state" => serde_json::from_value(value)
                .map_err(|e| Error::protocol(format!("invalid joint_state message: {e}"))),
            other => Err(Error::protocol(format!("unknown message type `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages_wire_format() {
        assert_eq!(ClientMessage::GetState.to_text(), r#"{"type":"get_state"}"#);
        assert_eq!(
            ClientMessage::Move {
                angles: vec![10.0, -20.5].into()
            }
            .to_text(),
            r#"{"type":"move","angles":[10.0,-20.5]}"#
        );
    }

    #[test]
    fn test_parse_joint_state() {
        let msg = AuthorityMessage::from_text(
            r#"{"type":"joint_state","angles":[10,20,30,40,50,60,70]}"#,
        )
        .unwrap();
        let AuthorityMessage::JointState {
            angles,
            end_effector,
        } = msg;
        assert_eq!(
            angles.as_slice(),
            &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0]
        );
        assert!(end_effector.is_none());
    }

    #[test]
    fn test_parse_joint_state_with_end_effector() {
        let msg = AuthorityMessage::from_text(
            r#"{"type":"joint_state","angles":[0.0],"end_effector":{"position":[0.1,0.2,0.3],"orientation":[0,0,0,1]}}"#,
        )
        .unwrap();
        let AuthorityMessage::JointState { end_effector, .. } = msg;
        let pose = end_effector.unwrap();
        assert_eq!(pose.position, [0.1, 0.2, 0.3]);
        assert_eq!(pose.orientation, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_parse_rejects_bad_payloads() {
        for text in [
            "not json",
            "[]",
            r#"{"angles":[1,2]}"#,
            r#"{"type":5}"#,
            r#"{"type":"pong"}"#,
            r#"{"type":"joint_state"}"#,
            r#"{"type":"joint_state","angles":["a"]}"#,
        ] {
            assert!(
                matches!(AuthorityMessage::from_text(text), Err(Error::Protocol { .. })),
                "{text}"
            );
        }
    }
}

//! Link placement for rendering.
//!
//! Nothing here is authoritative. Angles come in as degrees and are converted
//! to radians only in this module. The frame is Y-up.

use nalgebra as na;
use schemars::JsonSchema;
use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};

use crate::{
    error::Error,
    joint::{Axis, JointSpecs},
};

/// One rigid visual segment of the chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkDescriptor {
    pub axis: Axis,
    pub rest_length: f64,
    pub joint_index: usize,
}

impl LinkDescriptor {
    /// One descriptor per joint, base first.
    pub fn chain_from(specs: &JointSpecs) -> Vec<Self> {
        specs
            .iter()
            .map(|spec| Self {
                axis: spec.axis,
                rest_length: spec.link_length,
                joint_index: spec.index,
            })
            .collect()
    }
}

/// World-space placement of one link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkPlacement {
    pub position: na::Vector3<f64>,
    pub rotation: na::UnitQuaternion<f64>,
}

impl LinkPlacement {
    fn new(position: na::Vector3<f64>, rotation: na::UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    pub fn position_array(&self) -> [f64; 3] {
        [self.position.x, self.position.y, self.position.z]
    }

    /// `[x, y, z, w]`
    pub fn rotation_array(&self) -> [f64; 4] {
        let q = self.rotation.quaternion();
        [q.i, q.j, q.k, q.w]
    }
}

impl Serialize for LinkPlacement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("LinkPlacement", 2)?;
        s.serialize_field("position", &self.position_array())?;
        s.serialize_field("rotation", &self.rotation_array())?;
        s.end()
    }
}

/// How link placements are derived from joint angles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PlacementModel {
    /// The on-screen model operators are used to.
    ///
    /// - link 0 turns about its axis at the origin,
    /// - link 1 sits on top of link 0, turned by the base, and bends by its
    ///   own angle,
    /// - link 2 starts at the end of link 1 and bends by the sum of the
    ///   angles of joints 1 and 2 about the axis of joint 1,
    /// - every further link stacks straight up on the previous one and only
    ///   applies its own angle; earlier rotations do not compound.
    #[default]
    ApproximateStack,
    /// Full rigid-transform composition along the chain.
    ExactChain,
}

/// Places every link of `links` for the joint angles `angles_deg`.
///
/// The output is index-aligned with `links`.
pub fn place(
    model: PlacementModel,
    links: &[LinkDescriptor],
    angles_deg: &[f64],
) -> Result<Vec<LinkPlacement>, Error> {
    let angles = links
        .iter()
        .map(|link| {
            angles_deg
                .get(link.joint_index)
                .map(|deg| deg.to_radians())
                .ok_or(Error::IndexOutOfRange {
                    index: link.joint_index,
                    len: angles_deg.len(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match model {
        PlacementModel::ApproximateStack => approximate_stack(links, &angles),
        PlacementModel::ExactChain => exact_chain(links, &angles),
    })
}

fn rotation(axis: Axis, angle: f64) -> na::UnitQuaternion<f64> {
    na::UnitQuaternion::from_axis_angle(&axis.unit(), angle)
}

/// A segment of `length` pointing up, turned by `angle` about `axis`.
fn bend_offset(axis: Axis, angle: f64, length: f64) -> na::Vector3<f64> {
    let (sin, cos) = angle.sin_cos();
    match axis {
        Axis::X => na::Vector3::new(0.0, length * cos, length * sin),
        Axis::Y => na::Vector3::new(0.0, length, 0.0),
        Axis::Z => na::Vector3::new(-length * sin, length * cos, 0.0),
    }
}

fn up(length: f64) -> na::Vector3<f64> {
    na::Vector3::new(0.0, length, 0.0)
}

fn approximate_stack(links: &[LinkDescriptor], angles: &[f64]) -> Vec<LinkPlacement> {
    let mut placements: Vec<LinkPlacement> = Vec::with_capacity(links.len());
    let Some(base) = links.first() else {
        return placements;
    };
    let base_rotation = rotation(base.axis, angles[0]);
    placements.push(LinkPlacement::new(na::Vector3::zeros(), base_rotation));

    for (i, link) in links.iter().enumerate().skip(1) {
        let prev = &links[i - 1];
        let prev_position = placements[i - 1].position;
        let placement = match i {
            1 => LinkPlacement::new(
                base_rotation * up(prev.rest_length),
                base_rotation * rotation(link.axis, angles[1]),
            ),
            2 => LinkPlacement::new(
                prev_position + base_rotation * bend_offset(prev.axis, angles[1], prev.rest_length),
                base_rotation * rotation(prev.axis, angles[1] + angles[2]),
            ),
            _ => LinkPlacement::new(
                prev_position + up(prev.rest_length),
                rotation(link.axis, angles[i]),
            ),
        };
        placements.push(placement);
    }
    placements
}

fn exact_chain(links: &[LinkDescriptor], angles: &[f64]) -> Vec<LinkPlacement> {
    let mut placements = Vec::with_capacity(links.len());
    let mut frame = na::Isometry3::identity();
    for (i, link) in links.iter().enumerate() {
        if i > 0 {
            frame *= na::Translation3::from(up(links[i - 1].rest_length));
        }
        frame *= rotation(link.axis, angles[i]);
        placements.push(LinkPlacement::new(frame.translation.vector, frame.rotation));
    }
    placements
}

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    joint::{JointSpecs, JointVector},
    placement::{place, LinkDescriptor, LinkPlacement, PlacementModel},
};

/// What the active renderer consumes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RenderShape {
    /// One `(position, rotation)` per link.
    #[default]
    Placements,
    /// Joint name to radians, for renderers driving an articulated model.
    NamedJoints,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderFrame {
    Placements(Vec<LinkPlacement>),
    NamedJoints(IndexMap<String, f64>),
}

/// Converts `current` into the shape the renderer expects.
pub fn render_frame(
    shape: RenderShape,
    specs: &JointSpecs,
    current: &JointVector,
    model: PlacementModel,
) -> Result<RenderFrame, Error> {
    specs.check_dimension(current.len())?;
    Ok(match shape {
        RenderShape::Placements => {
            let links = LinkDescriptor::chain_from(specs);
            RenderFrame::Placements(place(model, &links, current)?)
        }
        RenderShape::NamedJoints => RenderFrame::NamedJoints(current.to_named_radians(specs)?),
    })
}

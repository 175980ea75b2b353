use std::{fmt, ops::Deref, sync::Arc};

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Rotation axis of a joint, in the renderer's Y-up frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Axis used when a joint table does not name one: the base turns about
    /// the vertical axis, the rest alternate between bend and roll like a
    /// typical 6/7-axis arm.
    pub fn default_for(index: usize) -> Self {
        if index % 2 == 0 {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    pub fn unit(&self) -> nalgebra::Unit<nalgebra::Vector3<f64>> {
        match self {
            Axis::X => nalgebra::Vector3::x_axis(),
            Axis::Y => nalgebra::Vector3::y_axis(),
            Axis::Z => nalgebra::Vector3::z_axis(),
        }
    }
}

pub const DEFAULT_LINK_LENGTH: f64 = 0.2;

/// Static description of one joint. Defined at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointSpec {
    pub index: usize,
    pub name: String,
    pub min_deg: f64,
    pub max_deg: f64,
    pub axis: Axis,
    /// Rest length of the link driven by this joint, used for rendering only.
    pub link_length: f64,
}

impl JointSpec {
    /// Clamps `value` to the joint limit. NaN and infinities are rejected.
    pub fn clamp(&self, value: f64) -> Result<f64, Error> {
        if !value.is_finite() {
            return Err(Error::NonFiniteTarget {
                index: self.index,
                value,
            });
        }
        Ok(value.clamp(self.min_deg, self.max_deg))
    }
}

/// One entry of a joint table as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct JointSpecConfig {
    pub name: String,
    pub min_deg: f64,
    pub max_deg: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axis: Option<Axis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_length: Option<f64>,
}

impl JointSpecConfig {
    pub fn new(name: impl Into<String>, min_deg: f64, max_deg: f64) -> Self {
        Self {
            name: name.into(),
            min_deg,
            max_deg,
            axis: None,
            link_length: None,
        }
    }

    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.axis = Some(axis);
        self
    }

    pub fn with_link_length(mut self, link_length: f64) -> Self {
        self.link_length = Some(link_length);
        self
    }
}

/// The fixed, validated joint table of one robot configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSpecs(Arc<[JointSpec]>);

impl JointSpecs {
    pub fn try_new(configs: &[JointSpecConfig]) -> Result<Self, Error> {
        if configs.is_empty() {
            return Err(Error::InvalidJointSpec {
                message: "at least one joint is required".to_owned(),
            });
        }
        let mut specs = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            if !config.min_deg.is_finite() || !config.max_deg.is_finite() {
                return Err(Error::InvalidJointSpec {
                    message: format!("joint `{}` has a non-finite limit", config.name),
                });
            }
            if config.min_deg > config.max_deg {
                return Err(Error::InvalidJointSpec {
                    message: format!(
                        "joint `{}` has min_deg ({}) larger than max_deg ({})",
                        config.name, config.min_deg, config.max_deg
                    ),
                });
            }
            let link_length = config.link_length.unwrap_or(DEFAULT_LINK_LENGTH);
            if !link_length.is_finite() || link_length < 0.0 {
                return Err(Error::InvalidJointSpec {
                    message: format!("joint `{}` has an invalid link_length", config.name),
                });
            }
            if specs.iter().any(|s: &JointSpec| s.name == config.name) {
                return Err(Error::InvalidJointSpec {
                    message: format!("joint name `{}` is duplicated", config.name),
                });
            }
            specs.push(JointSpec {
                index,
                name: config.name.clone(),
                min_deg: config.min_deg,
                max_deg: config.max_deg,
                axis: config.axis.unwrap_or_else(|| Axis::default_for(index)),
                link_length,
            });
        }
        Ok(Self(specs.into()))
    }

    /// KUKA LBR iiwa 7-axis profile.
    pub fn kuka_iiwa() -> Self {
        const LIMITS: [f64; 7] = [170.0, 120.0, 170.0, 120.0, 170.0, 120.0, 175.0];
        const LENGTHS: [f64; 7] = [0.34, 0.4, 0.4, 0.2, 0.2, 0.126, 0.08];
        let configs = LIMITS
            .iter()
            .zip(LENGTHS)
            .enumerate()
            .map(|(i, (limit, length))| {
                JointSpecConfig::new(format!("lbr_iiwa_joint_{}", i + 1), -limit, *limit)
                    .with_link_length(length)
            })
            .collect::<Vec<_>>();
        Self::try_new(&configs).expect("built-in profile is valid")
    }

    /// Generic 6-axis arm profile.
    pub fn six_axis() -> Self {
        let configs = vec![
            JointSpecConfig::new("base", -180.0, 180.0).with_link_length(0.3),
            JointSpecConfig::new("shoulder", -90.0, 90.0).with_link_length(0.5),
            JointSpecConfig::new("elbow", -135.0, 135.0).with_link_length(0.4),
            JointSpecConfig::new("wrist_1", -180.0, 180.0).with_link_length(0.15),
            JointSpecConfig::new("wrist_2", -120.0, 120.0).with_link_length(0.1),
            JointSpecConfig::new("wrist_3", -180.0, 180.0).with_link_length(0.08),
        ];
        Self::try_new(&configs).expect("built-in profile is valid")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JointSpec> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Result<&JointSpec, Error> {
        self.0.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|s| s.name.clone()).collect()
    }

    pub fn zeros(&self) -> JointVector {
        JointVector::zeros(self.len())
    }

    pub fn check_dimension(&self, len: usize) -> Result<(), Error> {
        if len != self.len() {
            return Err(Error::DimensionMismatch {
                expected: self.len(),
                actual: len,
            });
        }
        Ok(())
    }

    /// Clamps every component to its joint limit.
    pub fn clamp(&self, vector: &JointVector) -> Result<JointVector, Error> {
        self.check_dimension(vector.len())?;
        self.0
            .iter()
            .zip(vector.iter())
            .map(|(spec, v)| spec.clamp(*v))
            .collect()
    }

    pub fn configs(&self) -> Vec<JointSpecConfig> {
        self.0
            .iter()
            .map(|s| JointSpecConfig {
                name: s.name.clone(),
                min_deg: s.min_deg,
                max_deg: s.max_deg,
                axis: Some(s.axis),
                link_length: Some(s.link_length),
            })
            .collect()
    }
}

impl Deref for JointSpecs {
    type Target = [JointSpec];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Per-joint angles in degrees, index-aligned to [`JointSpecs`].
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointVector(Vec<f64>);

impl JointVector {
    pub fn new(angles: Vec<f64>) -> Self {
        Self(angles)
    }

    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn to_radians(&self) -> Vec<f64> {
        self.0.iter().map(|deg| deg.to_radians()).collect()
    }

    /// Joint name to radians, for renderers that drive an articulated model
    /// by joint name.
    pub fn to_named_radians(&self, specs: &JointSpecs) -> Result<IndexMap<String, f64>, Error> {
        specs.check_dimension(self.len())?;
        Ok(specs
            .iter()
            .zip(self.0.iter())
            .map(|(spec, deg)| (spec.name.clone(), deg.to_radians()))
            .collect())
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for JointVector {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<f64>> for JointVector {
    fn from(angles: Vec<f64>) -> Self {
        Self(angles)
    }
}

impl From<&[f64]> for JointVector {
    fn from(angles: &[f64]) -> Self {
        Self(angles.to_vec())
    }
}

impl FromIterator<f64> for JointVector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Debug for JointVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

//! Shared data model for gymkit robot descriptions.
//!
//! This crate defines the records produced when a robot-description document
//! is read (initial velocities, masses, randomization ranges and the body
//! tree) and the impulses derived from them at episode reset.
//!
//! Everything here is plain data; parsing lives in `gymkit-mjcf` and the
//! engine-facing logic in `gymkit-physics`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Mass recorded for an `inertia` element without a `mass` attribute.
pub const DEFAULT_MASS: f64 = 1.0;

/// Upper mass bound recorded for an `inertia` element without `maxmass`.
pub const DEFAULT_MAX_MASS: f64 = 1.0;

/// 3D vector with f64 components (meters, or radians for angular values).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vec3 {
    /// Create a new Vec3.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Component along `axis`.
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Component-wise sum.
    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// X axis.
    X,
    /// Y axis.
    Y,
    /// Z axis.
    Z,
}

impl Axis {
    /// All three axes in `x, y, z` order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Attribute name used for this axis in description documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-axis randomization envelope `(xmin, xmax, ymin, ymax, zmin, zmax)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    /// Lower X bound.
    pub xmin: f64,
    /// Upper X bound.
    pub xmax: f64,
    /// Lower Y bound.
    pub ymin: f64,
    /// Upper Y bound.
    pub ymax: f64,
    /// Lower Z bound.
    pub zmin: f64,
    /// Upper Z bound.
    pub zmax: f64,
}

impl Default for AxisRange {
    fn default() -> Self {
        Self {
            xmin: -1.0,
            xmax: 1.0,
            ymin: -1.0,
            ymax: 1.0,
            zmin: -1.0,
            zmax: 1.0,
        }
    }
}

impl AxisRange {
    /// `(min, max)` bounds along `axis`.
    pub fn bounds(&self, axis: Axis) -> (f64, f64) {
        match axis {
            Axis::X => (self.xmin, self.xmax),
            Axis::Y => (self.ymin, self.ymax),
            Axis::Z => (self.zmin, self.zmax),
        }
    }

    /// The six bounds in document order.
    pub fn to_tuple(&self) -> (f64, f64, f64, f64, f64, f64) {
        (self.xmin, self.xmax, self.ymin, self.ymax, self.zmin, self.zmax)
    }
}

/// Target initial velocity of one body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyVelocitySpec {
    /// Linear velocity (m/s).
    pub linear: Vec3,
    /// Angular velocity (rad/s).
    pub angular: Vec3,
}

/// Randomization envelopes for a body's initial velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityRange {
    /// Envelope for the linear velocity.
    pub linear: AxisRange,
    /// Envelope for the angular velocity.
    pub angular: AxisRange,
}

/// The four name-keyed mappings read from a description document.
///
/// Velocity and mass entries are independent: a body may appear in either,
/// both, or neither.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InitialState {
    /// Initial velocities, one per body with a `velocity` element.
    pub initial_velocities: HashMap<String, BodyVelocitySpec>,
    /// Explicit masses, one per body with an `inertial/inertia` element.
    pub link_masses: HashMap<String, f64>,
    /// Velocity randomization envelopes, keyed like `initial_velocities`.
    pub range_velocities: HashMap<String, VelocityRange>,
    /// Maximum masses for randomization, keyed like `link_masses`.
    pub range_masses: HashMap<String, f64>,
}

impl InitialState {
    /// Returns true when no body carries an initial velocity.
    pub fn starts_at_rest(&self) -> bool {
        self.initial_velocities.is_empty()
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Linear and angular impulse for one body.
///
/// Each component is `mass * velocity / dt`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpulseSpec {
    /// Linear impulse.
    pub linear_impulse: Vec3,
    /// Angular impulse.
    pub angular_impulse: Vec3,
}

/// Engine-side identity of a named part: `(body_index, link_index)`.
///
/// `link_index == -1` addresses the base of the multibody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartIndex {
    /// Index of the multibody in the engine.
    pub body_index: usize,
    /// Link within the multibody, `-1` for the base.
    pub link_index: i32,
}

impl PartIndex {
    /// Create a new part index.
    pub fn new(body_index: usize, link_index: i32) -> Self {
        Self {
            body_index,
            link_index,
        }
    }
}

impl fmt::Display for PartIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.body_index, self.link_index)
    }
}

/// Unit of angles written in a description document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleUnit {
    /// Degrees (the document format's default).
    #[default]
    Degree,
    /// Radians.
    Radian,
}

/// Collision geometry attached to a body, in the body's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeomKind {
    /// Sphere centered at `pos`.
    Sphere {
        /// Radius.
        radius: f64,
    },
    /// Capsule between two endpoints.
    Capsule {
        /// First segment endpoint.
        from: Vec3,
        /// Second segment endpoint.
        to: Vec3,
        /// Radius.
        radius: f64,
    },
    /// Cylinder between two endpoints.
    Cylinder {
        /// First cap center.
        from: Vec3,
        /// Second cap center.
        to: Vec3,
        /// Radius.
        radius: f64,
    },
    /// Axis-aligned box centered at `pos`.
    Box {
        /// Half extents along each axis.
        half_extents: Vec3,
    },
}

/// A geom element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeomDef {
    /// Optional geom name.
    pub name: Option<String>,
    /// Shape.
    pub kind: GeomKind,
    /// Center offset in the body frame (ignored for endpoint shapes).
    pub pos: Vec3,
    /// Density in kg/m^3.
    pub density: f64,
}

/// Degrees of freedom a joint grants its body relative to the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JointKind {
    /// Rotation about `axis`.
    Hinge {
        /// Rotation axis in the body frame.
        axis: Vec3,
        /// Angle limits in radians.
        limits: Option<(f64, f64)>,
    },
    /// Translation along `axis`.
    Slide {
        /// Translation axis in the body frame.
        axis: Vec3,
        /// Position limits in meters.
        limits: Option<(f64, f64)>,
    },
    /// Free rotation about the anchor.
    Ball,
    /// Unconstrained six degrees of freedom.
    Free,
}

/// A joint element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDef {
    /// Joint name, generated as `{body}_joint{n}` when absent.
    pub name: String,
    /// Joint type.
    pub kind: JointKind,
    /// Anchor in the body frame.
    pub pos: Vec3,
}

/// A body element, flattened out of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyDef {
    /// Body name (unique within the document).
    pub name: String,
    /// Name of the enclosing body, `None` for roots.
    pub parent: Option<String>,
    /// Offset from the parent frame.
    pub pos: Vec3,
    /// Attached geoms.
    pub geoms: Vec<GeomDef>,
    /// Joints connecting this body to its parent.
    pub joints: Vec<JointDef>,
}

impl BodyDef {
    /// Create a body with no geoms or joints.
    pub fn new(name: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            name: name.into(),
            parent,
            pos: Vec3::zeros(),
            geoms: Vec::new(),
            joints: Vec::new(),
        }
    }
}

/// The body tree and simulation options of a description document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotModel {
    /// Model name (`model` attribute of the root element).
    pub name: String,
    /// Simulation timestep from `option`, if given.
    pub timestep: Option<f64>,
    /// Gravity vector from `option`.
    pub gravity: Vec3,
    /// Angle unit declared by `compiler`.
    pub angle_unit: AngleUnit,
    /// Bodies in document (pre-)order; parents precede children.
    pub bodies: Vec<BodyDef>,
}

impl RobotModel {
    /// Create an empty model with default gravity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestep: None,
            gravity: Vec3::new(0.0, 0.0, -9.81),
            angle_unit: AngleUnit::default(),
            bodies: Vec::new(),
        }
    }

    /// Look up a body by name.
    pub fn body(&self, name: &str) -> Option<&BodyDef> {
        self.bodies.iter().find(|b| b.name == name)
    }

    /// Names of all joints in document order.
    pub fn joint_names(&self) -> Vec<String> {
        self.bodies
            .iter()
            .flat_map(|b| b.joints.iter().map(|j| j.name.clone()))
            .collect()
    }
}

/// A fully read description document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    /// Body tree and options.
    pub model: RobotModel,
    /// Initial velocities, masses and ranges.
    pub initial_state: InitialState,
}

impl Description {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_range_defaults_to_unit_envelope() {
        let range = AxisRange::default();
        assert_eq!(range.to_tuple(), (-1.0, 1.0, -1.0, 1.0, -1.0, 1.0));
        assert_eq!(range.bounds(Axis::Y), (-1.0, 1.0));
    }

    #[test]
    fn vec3_components_by_axis() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let picked: Vec<f64> = Axis::ALL.iter().map(|&a| v.get(a)).collect();
        assert_eq!(picked, vec![1.0, 2.0, 3.0]);
        assert_eq!(Axis::Z.to_string(), "z");
    }

    #[test]
    fn description_json_keeps_body_tree() {
        let mut model = RobotModel::new("cartpole");
        let mut cart = BodyDef::new("cart", None);
        cart.joints.push(JointDef {
            name: "slider".to_string(),
            kind: JointKind::Slide {
                axis: Vec3::new(1.0, 0.0, 0.0),
                limits: Some((-1.0, 1.0)),
            },
            pos: Vec3::zeros(),
        });
        model.bodies.push(cart);
        model.bodies.push(BodyDef::new("pole", Some("cart".to_string())));

        let mut state = InitialState::default();
        state.link_masses.insert("pole".to_string(), 2.0);

        let desc = Description {
            model,
            initial_state: state,
        };
        let json = desc.to_json().unwrap();
        let back = Description::from_json(&json).unwrap();

        assert_eq!(back.model.joint_names(), vec!["slider".to_string()]);
        assert_eq!(
            back.model.body("pole").and_then(|b| b.parent.as_deref()),
            Some("cart")
        );
        assert!(back.initial_state.starts_at_rest());
    }
}

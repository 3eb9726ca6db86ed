//! Joint conversion from description joints to Rapier.

use gymkit_ir::{BodyDef, JointDef, JointKind};
use nalgebra::{Point3, UnitVector3, Vector3};
use rapier3d::dynamics::{GenericJoint, GenericJointBuilder, JointAxesMask, JointAxis, MotorModel};

use crate::colliders::{point, vector};
use crate::error::PhysicsError;

/// Default motor parameters.
pub const DEFAULT_MOTOR_STIFFNESS: f32 = 1000.0;
/// Default motor damping.
pub const DEFAULT_MOTOR_DAMPING: f32 = 100.0;
/// Maximum force a joint motor may apply.
pub const DEFAULT_MAX_FORCE: f32 = 1000.0;

const AXIS_TOLERANCE: f32 = 1e-6;

/// A single scalar degree of freedom of a Rapier joint.
#[derive(Debug, Clone)]
pub struct JointDof {
    /// Name of the description joint driving this axis.
    pub name: String,
    /// Rapier axis of the joint frame.
    pub axis: JointAxis,
    /// Unit direction in the child body frame.
    pub direction: Vector3<f32>,
    /// `true` for rotation, `false` for translation.
    pub angular: bool,
    /// `-1.0` when the description axis points against the Rapier axis.
    pub sign: f32,
}

/// How a body is attached to its parent (or the world).
#[derive(Debug)]
pub enum JointPlan {
    /// No joint; the body moves freely.
    Free,
    /// No joints declared; the body is rigidly attached.
    Weld(GenericJoint),
    /// One Rapier joint carrying the declared joints.
    Articulated {
        /// The joint to insert.
        joint: GenericJoint,
        /// Scalar axes exposed for control and observation.
        dofs: Vec<JointDof>,
    },
}

/// Plan the joint that attaches `body` to its parent.
///
/// `origin_in_parent` is the body origin expressed in the parent frame (or
/// in world coordinates for root bodies).
pub fn plan_joint(body: &BodyDef, origin_in_parent: Point3<f32>) -> Result<JointPlan, PhysicsError> {
    let has_free = body.joints.iter().any(|j| j.kind == JointKind::Free);
    if has_free {
        if body.joints.len() > 1 {
            return Err(PhysicsError::InvalidJoint(format!(
                "body '{}' combines a free joint with other joints",
                body.name
            )));
        }
        return Ok(JointPlan::Free);
    }

    let Some(first) = body.joints.first() else {
        return Ok(JointPlan::Weld(create_fixed_joint(
            origin_in_parent,
            Point3::origin(),
        )));
    };

    let child_anchor = point(first.pos);
    let parent_anchor = origin_in_parent + child_anchor.coords;
    if body.joints.iter().any(|j| j.pos != first.pos) {
        tracing::debug!(body = %body.name, "joints with different anchors, using the first");
    }

    if let [joint] = body.joints.as_slice() {
        return single_joint(joint, parent_anchor, child_anchor);
    }

    if body.joints.iter().any(|j| j.kind == JointKind::Ball) {
        return Err(PhysicsError::InvalidJoint(format!(
            "body '{}' combines a ball joint with other joints",
            body.name
        )));
    }
    composite_joint(body, parent_anchor, child_anchor)
}

fn single_joint(
    joint: &JointDef,
    parent_anchor: Point3<f32>,
    child_anchor: Point3<f32>,
) -> Result<JointPlan, PhysicsError> {
    match &joint.kind {
        JointKind::Hinge { axis, limits } => {
            let direction = unit_axis(joint, vector(*axis))?;
            let limits = limits.map(|(l, u)| (l as f32, u as f32));
            Ok(JointPlan::Articulated {
                joint: create_revolute_joint(parent_anchor, child_anchor, direction, limits),
                dofs: vec![JointDof {
                    name: joint.name.clone(),
                    axis: JointAxis::AngX,
                    direction: direction.into_inner(),
                    angular: true,
                    sign: 1.0,
                }],
            })
        }
        JointKind::Slide { axis, limits } => {
            let direction = unit_axis(joint, vector(*axis))?;
            let limits = limits.map(|(l, u)| (l as f32, u as f32));
            Ok(JointPlan::Articulated {
                joint: create_prismatic_joint(parent_anchor, child_anchor, direction, limits),
                dofs: vec![JointDof {
                    name: joint.name.clone(),
                    axis: JointAxis::LinX,
                    direction: direction.into_inner(),
                    angular: false,
                    sign: 1.0,
                }],
            })
        }
        JointKind::Ball => Ok(JointPlan::Articulated {
            joint: create_ball_joint(parent_anchor, child_anchor),
            dofs: Vec::new(),
        }),
        JointKind::Free => Ok(JointPlan::Free),
    }
}

fn unit_axis(joint: &JointDef, axis: Vector3<f32>) -> Result<UnitVector3<f32>, PhysicsError> {
    UnitVector3::try_new(axis, AXIS_TOLERANCE).ok_or_else(|| {
        PhysicsError::InvalidJoint(format!("joint '{}' has a zero-length axis", joint.name))
    })
}

/// Several hinge/slide joints on one body. Every axis must be aligned with
/// a coordinate axis of the body frame, and no coordinate axis may be used
/// twice.
fn composite_joint(
    body: &BodyDef,
    parent_anchor: Point3<f32>,
    child_anchor: Point3<f32>,
) -> Result<JointPlan, PhysicsError> {
    let mut locked = JointAxesMask::LOCKED_FIXED_AXES;
    let mut builder_limits = Vec::new();
    let mut dofs: Vec<JointDof> = Vec::with_capacity(body.joints.len());

    for joint in &body.joints {
        let (axis, limits, angular) = match &joint.kind {
            JointKind::Hinge { axis, limits } => (*axis, *limits, true),
            JointKind::Slide { axis, limits } => (*axis, *limits, false),
            JointKind::Ball | JointKind::Free => {
                return Err(PhysicsError::InvalidJoint(format!(
                    "body '{}' has an unsupported joint combination",
                    body.name
                )));
            }
        };
        let direction = unit_axis(joint, vector(axis))?;
        let (index, sign) = aligned_index(&direction).ok_or_else(|| {
            PhysicsError::InvalidJoint(format!(
                "joint '{}' axis is not aligned with a body axis",
                joint.name
            ))
        })?;
        let rapier_axis = rapier_axis(index, angular);
        if dofs.iter().any(|d| d.axis == rapier_axis) {
            return Err(PhysicsError::InvalidJoint(format!(
                "joint '{}' reuses an axis already driven on body '{}'",
                joint.name, body.name
            )));
        }
        locked.remove(axis_mask(rapier_axis));
        if let Some((lower, upper)) = limits {
            let (lower, upper) = (lower as f32 * sign, upper as f32 * sign);
            builder_limits.push((rapier_axis, lower.min(upper), lower.max(upper)));
        }
        dofs.push(JointDof {
            name: joint.name.clone(),
            axis: rapier_axis,
            direction: direction.into_inner(),
            angular,
            sign,
        });
    }

    let mut builder = GenericJointBuilder::new(locked)
        .local_anchor1(parent_anchor)
        .local_anchor2(child_anchor)
        .contacts_enabled(false);
    for (axis, lower, upper) in builder_limits {
        builder = builder.limits(axis, [lower, upper]);
    }
    for dof in &dofs {
        builder = builder
            .motor_model(dof.axis, MotorModel::AccelerationBased)
            .motor_max_force(dof.axis, DEFAULT_MAX_FORCE);
    }

    Ok(JointPlan::Articulated {
        joint: builder.build(),
        dofs,
    })
}

fn aligned_index(direction: &UnitVector3<f32>) -> Option<(usize, f32)> {
    (0..3).find_map(|i| {
        let c = direction[i];
        ((c.abs() - 1.0).abs() < 1e-4).then(|| (i, c.signum()))
    })
}

fn rapier_axis(index: usize, angular: bool) -> JointAxis {
    match (index, angular) {
        (0, false) => JointAxis::LinX,
        (1, false) => JointAxis::LinY,
        (_, false) => JointAxis::LinZ,
        (0, true) => JointAxis::AngX,
        (1, true) => JointAxis::AngY,
        (_, true) => JointAxis::AngZ,
    }
}

fn axis_mask(axis: JointAxis) -> JointAxesMask {
    match axis {
        JointAxis::LinX => JointAxesMask::LIN_X,
        JointAxis::LinY => JointAxesMask::LIN_Y,
        JointAxis::LinZ => JointAxesMask::LIN_Z,
        JointAxis::AngX => JointAxesMask::ANG_X,
        JointAxis::AngY => JointAxesMask::ANG_Y,
        JointAxis::AngZ => JointAxesMask::ANG_Z,
    }
}

fn create_fixed_joint(parent_anchor: Point3<f32>, child_anchor: Point3<f32>) -> GenericJoint {
    GenericJointBuilder::new(JointAxesMask::LOCKED_FIXED_AXES)
        .local_anchor1(parent_anchor)
        .local_anchor2(child_anchor)
        .contacts_enabled(false)
        .build()
}

fn create_revolute_joint(
    parent_anchor: Point3<f32>,
    child_anchor: Point3<f32>,
    axis: UnitVector3<f32>,
    limits: Option<(f32, f32)>,
) -> GenericJoint {
    let mut builder = GenericJointBuilder::new(JointAxesMask::LOCKED_REVOLUTE_AXES)
        .local_anchor1(parent_anchor)
        .local_anchor2(child_anchor)
        .contacts_enabled(false)
        .local_axis1(axis)
        .local_axis2(axis);

    if let Some((lower, upper)) = limits {
        builder = builder.limits(JointAxis::AngX, [lower, upper]);
    }

    builder = builder
        .motor_model(JointAxis::AngX, MotorModel::AccelerationBased)
        .motor_max_force(JointAxis::AngX, DEFAULT_MAX_FORCE);

    builder.build()
}

fn create_prismatic_joint(
    parent_anchor: Point3<f32>,
    child_anchor: Point3<f32>,
    axis: UnitVector3<f32>,
    limits: Option<(f32, f32)>,
) -> GenericJoint {
    let mut builder = GenericJointBuilder::new(JointAxesMask::LOCKED_PRISMATIC_AXES)
        .local_anchor1(parent_anchor)
        .local_anchor2(child_anchor)
        .contacts_enabled(false)
        .local_axis1(axis)
        .local_axis2(axis);

    if let Some((lower, upper)) = limits {
        builder = builder.limits(JointAxis::LinX, [lower, upper]);
    }

    builder = builder
        .motor_model(JointAxis::LinX, MotorModel::AccelerationBased)
        .motor_max_force(JointAxis::LinX, DEFAULT_MAX_FORCE);

    builder.build()
}

fn create_ball_joint(parent_anchor: Point3<f32>, child_anchor: Point3<f32>) -> GenericJoint {
    GenericJointBuilder::new(JointAxesMask::LOCKED_SPHERICAL_AXES)
        .local_anchor1(parent_anchor)
        .local_anchor2(child_anchor)
        .contacts_enabled(false)
        .build()
}

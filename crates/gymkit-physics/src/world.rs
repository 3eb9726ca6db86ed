//! Physics world management using Rapier3d.

use std::collections::HashMap;

use gymkit_ir::{ImpulseSpec, PartIndex, RobotModel};
use nalgebra::{Isometry3, Point3, Vector3};
use rapier3d::dynamics::{
    CCDSolver, ImpulseJointHandle, ImpulseJointSet, IntegrationParameters, IslandManager,
    MultibodyJointSet, RigidBodyBuilder, RigidBodyHandle, RigidBodySet, RigidBodyType,
};
use rapier3d::geometry::{BroadPhaseMultiSap, ColliderHandle, ColliderSet, NarrowPhase};
use rapier3d::pipeline::{PhysicsPipeline, QueryPipeline};

use crate::colliders::{body_colliders, vector};
use crate::error::PhysicsError;
use crate::impulse::MassQuery;
use crate::joints::{plan_joint, JointDof, JointPlan, DEFAULT_MOTOR_DAMPING, DEFAULT_MOTOR_STIFFNESS};

/// Name reported as the parent of joints attached to the world.
pub const WORLD_NAME: &str = "World";

/// State of a single joint.
#[derive(Debug, Clone, Default)]
pub struct JointState {
    /// Joint position (radians for hinges, meters for slides).
    pub position: f64,
    /// Joint velocity (rad/s for hinges, m/s for slides).
    pub velocity: f64,
    /// Last commanded torque/force (Nm for hinges, N for slides).
    pub effort: f64,
}

/// World-frame kinematics of a part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartKinematics {
    /// Position in meters.
    pub position: [f64; 3],
    /// Orientation quaternion as `[x, y, z, w]`.
    pub orientation: [f64; 4],
    /// Linear velocity in m/s.
    pub linear_velocity: [f64; 3],
    /// Angular velocity in rad/s.
    pub angular_velocity: [f64; 3],
}

impl PartKinematics {
    /// Position followed by orientation, as `[x, y, z, qx, qy, qz, qw]`.
    pub fn pose(&self) -> [f64; 7] {
        let [x, y, z] = self.position;
        let [qx, qy, qz, qw] = self.orientation;
        [x, y, z, qx, qy, qz, qw]
    }
}

/// An active contact between two parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactInfo {
    /// First part.
    pub part1: String,
    /// Second part.
    pub part2: String,
    /// Contact point in world coordinates.
    pub position: [f64; 3],
    /// Contact normal pointing from the first part to the second.
    pub normal: [f64; 3],
    /// Normal force magnitude over the last step.
    pub force: f64,
}

#[derive(Debug, Clone)]
struct JointRecord {
    handle: ImpulseJointHandle,
    parent: RigidBodyHandle,
    child: RigidBodyHandle,
    parent_name: String,
    child_name: String,
    anchor1: Point3<f32>,
    anchor2: Point3<f32>,
    dof: JointDof,
    effort: f64,
}

/// Physics simulation world.
pub struct PhysicsWorld {
    // Rapier components
    pipeline: PhysicsPipeline,
    gravity: Vector3<f32>,
    integration_params: IntegrationParameters,
    islands: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    // Mapping from description bodies to Rapier
    robot_name: String,
    body_handles: HashMap<String, RigidBodyHandle>,
    handle_names: HashMap<RigidBodyHandle, String>,
    part_indices: HashMap<String, PartIndex>,
    /// Part handles in document order; `links[0]` is link -1.
    links: Vec<RigidBodyHandle>,

    /// Scalar joints in document order.
    joints: Vec<JointRecord>,
    elapsed: f64,
}

impl PhysicsWorld {
    /// Create a physics world from a parsed robot model.
    ///
    /// Every body becomes one rigid body registered as a part of robot 0.
    /// The first body is the base (`link_index == -1`) and the remaining
    /// bodies are links `0..` in document order. Masses in `link_masses`
    /// override the mass derived from geom densities.
    pub fn from_model(
        model: &RobotModel,
        link_masses: &HashMap<String, f64>,
    ) -> Result<Self, PhysicsError> {
        if model.bodies.is_empty() {
            return Err(PhysicsError::NoBodies);
        }

        let mut world = Self::new(&model.name);
        world.gravity = vector(model.gravity);

        let mut origins: HashMap<&str, Vector3<f32>> = HashMap::new();

        for (ordinal, body) in model.bodies.iter().enumerate() {
            let parent_handle = match &body.parent {
                Some(parent) => Some(
                    world
                        .body_handles
                        .get(parent)
                        .copied()
                        .ok_or_else(|| PhysicsError::MissingBody(parent.clone()))?,
                ),
                None => None,
            };
            let parent_origin = body
                .parent
                .as_deref()
                .and_then(|p| origins.get(p))
                .copied()
                .unwrap_or_else(Vector3::zeros);
            let origin = parent_origin + vector(body.pos);
            origins.insert(body.name.as_str(), origin);

            let origin_in_parent = match parent_handle {
                Some(_) => Point3::from(vector(body.pos)),
                None => Point3::from(origin),
            };
            let plan = plan_joint(body, origin_in_parent)?;

            let body_type = match (&plan, parent_handle) {
                (JointPlan::Weld(_), None) => RigidBodyType::Fixed,
                _ => RigidBodyType::Dynamic,
            };
            let rigid_body = RigidBodyBuilder::new(body_type)
                .position(Isometry3::translation(origin.x, origin.y, origin.z))
                .build();
            let handle = world.bodies.insert(rigid_body);

            for collider in body_colliders(body, link_masses.get(&body.name).copied())? {
                world
                    .colliders
                    .insert_with_parent(collider, handle, &mut world.bodies);
            }

            let part = PartIndex::new(0, ordinal as i32 - 1);
            world.body_handles.insert(body.name.clone(), handle);
            world.handle_names.insert(handle, body.name.clone());
            world.part_indices.insert(body.name.clone(), part);
            world.links.push(handle);

            world.attach(body.name.as_str(), body.parent.as_deref(), parent_handle, handle, plan);
        }

        for (_, rb) in world.bodies.iter_mut() {
            rb.recompute_mass_properties_from_colliders(&world.colliders);
        }

        tracing::debug!(
            robot = %world.robot_name,
            parts = world.links.len(),
            joints = world.joints.len(),
            "built physics world"
        );

        Ok(world)
    }

    /// Create an empty physics world.
    fn new(robot_name: &str) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: Vector3::new(0.0, 0.0, -9.81),
            integration_params: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            robot_name: robot_name.to_string(),
            body_handles: HashMap::new(),
            handle_names: HashMap::new(),
            part_indices: HashMap::new(),
            links: Vec::new(),
            joints: Vec::new(),
            elapsed: 0.0,
        }
    }

    fn attach(
        &mut self,
        child_name: &str,
        parent_name: Option<&str>,
        parent_handle: Option<RigidBodyHandle>,
        child: RigidBodyHandle,
        plan: JointPlan,
    ) {
        let (joint, dofs) = match plan {
            JointPlan::Free => return,
            JointPlan::Weld(joint) => match parent_handle {
                Some(_) => (joint, Vec::new()),
                // Root bodies without joints were made fixed instead.
                None => return,
            },
            JointPlan::Articulated { joint, dofs } => (joint, dofs),
        };

        // World-grounded joints hang off a fixed body at the origin.
        let parent = parent_handle.unwrap_or_else(|| {
            self.bodies
                .insert(RigidBodyBuilder::fixed().position(Isometry3::identity()).build())
        });
        let anchor1 = joint.local_anchor1();
        let anchor2 = joint.local_anchor2();
        let handle = self.impulse_joints.insert(parent, child, joint, true);

        for dof in dofs {
            self.joints.push(JointRecord {
                handle,
                parent,
                child,
                parent_name: parent_name.unwrap_or(WORLD_NAME).to_string(),
                child_name: child_name.to_string(),
                anchor1,
                anchor2,
                dof,
                effort: 0.0,
            });
        }
    }

    /// Step the physics simulation by `dt` seconds.
    ///
    /// Forces and torques added since the previous step act for this step
    /// only and are cleared afterwards.
    pub fn step(&mut self, dt: f64) {
        self.integration_params.dt = dt as f32;

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        for (_, rb) in self.bodies.iter_mut() {
            rb.reset_forces(false);
            rb.reset_torques(false);
        }
        self.elapsed += dt;
    }

    /// Queue initial-state impulses for the next step.
    ///
    /// Each impulse is added as a force/torque on the named part, so that a
    /// step of the same `dt` used to derive it yields the prescribed
    /// velocity. All names are checked before anything is applied.
    pub fn apply_impulses(
        &mut self,
        impulses: &HashMap<String, ImpulseSpec>,
    ) -> Result<(), PhysicsError> {
        let mut targets = Vec::with_capacity(impulses.len());
        for (name, impulse) in impulses {
            let handle = self
                .body_handles
                .get(name)
                .copied()
                .ok_or_else(|| PhysicsError::MissingBody(name.clone()))?;
            targets.push((name, handle, impulse));
        }

        for (name, handle, impulse) in targets {
            if let Some(rb) = self.bodies.get_mut(handle) {
                rb.add_force(vector(impulse.linear_impulse), true);
                rb.add_torque(vector(impulse.angular_impulse), true);
                tracing::debug!(body = %name, ?impulse, "applied initial impulse");
            }
        }
        Ok(())
    }

    fn joint_record(&self, name: &str) -> Result<&JointRecord, PhysicsError> {
        self.joints
            .iter()
            .find(|j| j.dof.name == name)
            .ok_or_else(|| PhysicsError::MissingJoint(name.to_string()))
    }

    fn joint_record_mut(&mut self, name: &str) -> Result<&mut JointRecord, PhysicsError> {
        self.joints
            .iter_mut()
            .find(|j| j.dof.name == name)
            .ok_or_else(|| PhysicsError::MissingJoint(name.to_string()))
    }

    fn measure(&self, record: &JointRecord) -> Option<JointState> {
        let parent = self.bodies.get(record.parent)?;
        let child = self.bodies.get(record.child)?;
        let frame = parent.rotation().inverse();

        let (position, velocity) = if record.dof.angular {
            let relative = frame * child.rotation();
            let angle = relative.scaled_axis().dot(&record.dof.direction);
            let rate = (frame * (child.angvel() - parent.angvel())).dot(&record.dof.direction);
            (angle, rate)
        } else {
            let p1 = parent.position() * record.anchor1;
            let p2 = child.position() * record.anchor2;
            let offset = (frame * (p2 - p1)).dot(&record.dof.direction);
            let rate = (frame * (child.linvel() - parent.linvel())).dot(&record.dof.direction);
            (offset, rate)
        };

        Some(JointState {
            position: position as f64,
            velocity: velocity as f64,
            effort: record.effort,
        })
    }

    /// Get the current state of one joint.
    pub fn joint_state(&self, joint: &str) -> Result<JointState, PhysicsError> {
        let record = self.joint_record(joint)?;
        self.measure(record)
            .ok_or_else(|| PhysicsError::MissingJoint(joint.to_string()))
    }

    /// Get the current state of all joints.
    pub fn joint_states(&self) -> HashMap<String, JointState> {
        self.joints
            .iter()
            .filter_map(|record| Some((record.dof.name.clone(), self.measure(record)?)))
            .collect()
    }

    /// Parent and child part names of a joint.
    pub fn joint_bodies(&self, joint: &str) -> Option<(&str, &str)> {
        let record = self.joint_record(joint).ok()?;
        Some((record.parent_name.as_str(), record.child_name.as_str()))
    }

    /// Set the target position for a joint (radians or meters).
    pub fn set_joint_position(&mut self, joint: &str, target: f64) -> Result<(), PhysicsError> {
        let record = self.joint_record_mut(joint)?;
        record.effort = 0.0;
        let (handle, axis, sign) = (record.handle, record.dof.axis, record.dof.sign);
        if let Some(j) = self.impulse_joints.get_mut(handle, true) {
            j.data.set_motor_position(
                axis,
                target as f32 * sign,
                DEFAULT_MOTOR_STIFFNESS,
                DEFAULT_MOTOR_DAMPING,
            );
        }
        Ok(())
    }

    /// Set the target velocity for a joint (rad/s or m/s).
    pub fn set_joint_velocity(&mut self, joint: &str, target: f64) -> Result<(), PhysicsError> {
        let record = self.joint_record_mut(joint)?;
        record.effort = 0.0;
        let (handle, axis, sign) = (record.handle, record.dof.axis, record.dof.sign);
        if let Some(j) = self.impulse_joints.get_mut(handle, true) {
            j.data
                .set_motor_velocity(axis, target as f32 * sign, DEFAULT_MOTOR_DAMPING);
        }
        Ok(())
    }

    /// Apply torque/force along a joint axis for the next step.
    ///
    /// The child receives the effort and the parent the reaction.
    pub fn apply_joint_torque(&mut self, joint: &str, torque: f64) -> Result<(), PhysicsError> {
        let record = self.joint_record_mut(joint)?;
        record.effort = torque;
        let (parent, child, dof) = (record.parent, record.child, record.dof.clone());

        let direction = match self.bodies.get(child) {
            Some(rb) => rb.rotation() * dof.direction * torque as f32,
            None => return Err(PhysicsError::MissingJoint(joint.to_string())),
        };
        for (handle, effort) in [(child, direction), (parent, -direction)] {
            if let Some(rb) = self.bodies.get_mut(handle) {
                if dof.angular {
                    rb.add_torque(effort, true);
                } else {
                    rb.add_force(effort, true);
                }
            }
        }
        Ok(())
    }

    /// World-frame kinematics of a part.
    pub fn part_kinematics(&self, part: &str) -> Option<PartKinematics> {
        let handle = self.body_handles.get(part)?;
        let body = self.bodies.get(*handle)?;
        let pos = body.position();
        let linvel = body.linvel();
        let angvel = body.angvel();

        Some(PartKinematics {
            position: [
                pos.translation.x as f64,
                pos.translation.y as f64,
                pos.translation.z as f64,
            ],
            orientation: [
                pos.rotation.i as f64,
                pos.rotation.j as f64,
                pos.rotation.k as f64,
                pos.rotation.w as f64,
            ],
            linear_velocity: [linvel.x as f64, linvel.y as f64, linvel.z as f64],
            angular_velocity: [angvel.x as f64, angvel.y as f64, angvel.z as f64],
        })
    }

    /// Active contacts between parts after the last step.
    pub fn contacts(&self) -> Vec<ContactInfo> {
        let dt = self.integration_params.dt;
        let mut contacts = Vec::new();

        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let (Some(part1), Some(part2)) = (
                self.collider_part(pair.collider1),
                self.collider_part(pair.collider2),
            ) else {
                continue;
            };
            let Some(manifold) = pair
                .manifolds
                .iter()
                .find(|m| !m.data.solver_contacts.is_empty())
            else {
                continue;
            };
            let point = manifold.data.solver_contacts[0].point;
            let normal = manifold.data.normal;

            contacts.push(ContactInfo {
                part1: part1.to_string(),
                part2: part2.to_string(),
                position: [point.x as f64, point.y as f64, point.z as f64],
                normal: [normal.x as f64, normal.y as f64, normal.z as f64],
                force: (pair.total_impulse().norm() / dt) as f64,
            });
        }

        contacts
    }

    fn collider_part(&self, collider: ColliderHandle) -> Option<&str> {
        let parent = self.colliders.get(collider)?.parent()?;
        self.handle_names.get(&parent).map(String::as_str)
    }

    /// Name of the simulated robot.
    pub fn robot_name(&self) -> &str {
        &self.robot_name
    }

    /// Simulated time since the world was built, in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Names of all scalar joints in document order.
    pub fn joint_ids(&self) -> Vec<String> {
        self.joints.iter().map(|j| j.dof.name.clone()).collect()
    }

    /// Part names in document order (base first).
    pub fn part_names(&self) -> Vec<String> {
        self.links
            .iter()
            .filter_map(|h| self.handle_names.get(h).cloned())
            .collect()
    }

    /// Registry from part name to engine index.
    pub fn part_indices(&self) -> &HashMap<String, PartIndex> {
        &self.part_indices
    }

    /// Engine index of a named part.
    pub fn part_index(&self, part: &str) -> Option<PartIndex> {
        self.part_indices.get(part).copied()
    }

    fn part_handle(&self, part: PartIndex) -> Option<RigidBodyHandle> {
        if part.body_index != 0 || part.link_index < -1 {
            return None;
        }
        self.links.get((part.link_index + 1) as usize).copied()
    }
}

impl MassQuery for PhysicsWorld {
    fn dynamics_mass(&self, part: PartIndex) -> Result<f64, PhysicsError> {
        let handle = self
            .part_handle(part)
            .ok_or_else(|| PhysicsError::mass_query(part, "no such part"))?;
        let body = self
            .bodies
            .get(handle)
            .ok_or_else(|| PhysicsError::mass_query(part, "body was removed"))?;
        Ok(body.mass() as f64)
    }
}

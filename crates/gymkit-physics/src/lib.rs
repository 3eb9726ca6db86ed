#![warn(missing_docs)]

//! Rapier-backed robot environments with impulse-based initial state.
//!
//! This crate turns a parsed robot description into a physics simulation,
//! derives the impulses that give each body its prescribed initial velocity,
//! and exposes the result through a gym-like reset/step interface.
//!
//! # Features
//!
//! - Impulse derivation with explicit masses and live mass queries
//! - Rapier world built from the description's bodies, geoms and joints
//! - Joint control by torque, position target or velocity target
//! - Environment registry loaded from TOML
//! - Text diagnostics (kinematics, contacts, joint states)
//!
//! # Example
//!
//! ```ignore
//! use gymkit_physics::{Action, Registry, RobotEnv};
//!
//! let registry = Registry::load("assets/registry.toml")?;
//! let mut env = RobotEnv::from_registry(&registry, "InvertedPendulumPyBulletEnv-v0")?;
//!
//! let (obs, logs) = env.reset()?;
//! let result = env.step(&Action::Torque(vec![0.0; env.action_dim()]));
//! ```

mod colliders;
mod error;
mod gym;
mod impulse;
mod joints;
mod logs;
mod registry;
mod world;

pub use colliders::{estimate_mass, geom_volume};
pub use error::{ImpulseKind, PhysicsError};
pub use gym::{Action, NullTask, Observation, RobotEnv, StepResult, Task};
pub use impulse::{derive_impulses, resolve_mass, MassQuery, DEFAULT_TIMESTEP};
pub use logs::{
    contact_logs, generate_logs, joint_logs, kinematics_logs, time_log, KinematicInfo, NameSwap,
};
pub use registry::{EnvSpec, Registry};
pub use world::{ContactInfo, JointState, PartKinematics, PhysicsWorld, WORLD_NAME};

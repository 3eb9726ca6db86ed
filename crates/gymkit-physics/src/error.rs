//! Error types for physics simulation and initial-state derivation.

use std::fmt;

use gymkit_ir::{Axis, PartIndex};
use gymkit_mjcf::DescriptionError;
use thiserror::Error;

/// Which half of an [`ImpulseSpec`](gymkit_ir::ImpulseSpec) a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpulseKind {
    /// Linear impulse.
    Linear,
    /// Angular impulse.
    Angular,
}

impl fmt::Display for ImpulseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpulseKind::Linear => f.write_str("linear"),
            ImpulseKind::Angular => f.write_str("angular"),
        }
    }
}

/// Errors that can occur during physics simulation.
#[derive(Error, Debug)]
pub enum PhysicsError {
    /// The description document could not be read.
    #[error(transparent)]
    Description(#[from] DescriptionError),

    /// I/O error reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed registry configuration.
    #[error("Invalid registry configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Description has no bodies to simulate.
    #[error("Description has no bodies")]
    NoBodies,

    /// Missing body.
    #[error("Body not found: {0}")]
    MissingBody(String),

    /// Missing joint.
    #[error("Joint not found: {0}")]
    MissingJoint(String),

    /// Failed to create collision shape.
    #[error("Failed to create collision shape for {name}: {reason}")]
    CollisionShape {
        /// Body name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid joint configuration.
    #[error("Invalid joint configuration: {0}")]
    InvalidJoint(String),

    /// A body has an initial velocity but neither an explicit mass nor a
    /// registered part to query.
    #[error("Cannot resolve mass for body '{0}': no explicit mass and no registered part")]
    UnresolvedBody(String),

    /// A computed impulse component is unusable.
    #[error("Invalid {kind} impulse for body '{body}' on axis {axis}: {reason}")]
    InvalidImpulse {
        /// Body name.
        body: String,
        /// Linear or angular component.
        kind: ImpulseKind,
        /// Axis of the offending component.
        axis: Axis,
        /// What made the component invalid.
        reason: String,
    },

    /// Timestep must be finite and positive.
    #[error("Invalid timestep: {0}")]
    InvalidTimestep(f64),

    /// The live mass query failed.
    #[error("Mass query failed for part {part}: {reason}")]
    MassQuery {
        /// Part that was queried.
        part: PartIndex,
        /// Reason for failure.
        reason: String,
    },

    /// Environment id not present in the registry.
    #[error("Unknown environment: {0}")]
    UnknownEnv(String),

    /// Environment settings that cannot be simulated.
    #[error("Invalid environment {id}: {reason}")]
    InvalidEnv {
        /// Environment id.
        id: String,
        /// What made the settings invalid.
        reason: String,
    },

    /// Environment id registered twice.
    #[error("Environment already registered: {0}")]
    DuplicateEnv(String),
}

impl PhysicsError {
    /// Create an invalid impulse error.
    pub fn invalid_impulse(
        body: impl Into<String>,
        kind: ImpulseKind,
        axis: Axis,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidImpulse {
            body: body.into(),
            kind,
            axis,
            reason: reason.into(),
        }
    }

    /// Create an invalid environment error.
    pub fn invalid_env(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEnv {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a mass query error.
    pub fn mass_query(part: PartIndex, reason: impl Into<String>) -> Self {
        Self::MassQuery {
            part,
            reason: reason.into(),
        }
    }
}

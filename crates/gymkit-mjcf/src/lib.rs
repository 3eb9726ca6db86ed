#![warn(missing_docs)]

//! Robot-description reader for gymkit environments.
//!
//! Reads MJCF-style documents and produces two things:
//!
//! - the four name-keyed mappings used to start an episode with a prescribed
//!   kinematic state (initial velocities, explicit masses, and their
//!   randomization ranges), and
//! - the body tree (geoms, joints, options) the physics world is built from.
//!
//! # Example
//!
//! ```
//! let xml = r#"
//! <mujoco model="ball">
//!   <worldbody>
//!     <body name="ball">
//!       <velocity><linear x="1" y="0" z="0"/></velocity>
//!       <inertial><inertia mass="2"/></inertial>
//!     </body>
//!   </worldbody>
//! </mujoco>"#;
//!
//! let state = gymkit_mjcf::extract_initial_state(xml).unwrap();
//! assert_eq!(state.link_masses["ball"], 2.0);
//! assert_eq!(state.initial_velocities["ball"].linear.x, 1.0);
//! ```

mod error;
mod parser;

use std::fs;
use std::path::Path;

use gymkit_ir::{Description, InitialState};

pub use error::{DescriptionError, Result};
pub use parser::{parse_description_str, DEFAULT_GEOM_DENSITY};

/// Extract initial velocities, masses and their ranges from a document.
///
/// Bodies are visited at any depth. A body without a `velocity` element is
/// absent from the velocity mappings and starts at rest.
pub fn extract_initial_state(xml: &str) -> Result<InitialState> {
    parse_description_str(xml).map(|d| d.initial_state)
}

/// Read and parse a description document from disk.
pub fn load_description(path: impl AsRef<Path>) -> Result<Description> {
    let path = path.as_ref();
    let xml = fs::read_to_string(path)?;
    tracing::debug!(path = %path.display(), "loading description");
    parse_description_str(&xml)
}

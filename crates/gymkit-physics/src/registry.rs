//! Environment registry loaded from TOML.
//!
//! ```toml
//! [[env]]
//! id = "InvertedPendulum-v0"
//! model = "inverted_pendulum.xml"
//! max_episode_steps = 1000
//! reward_threshold = 950.0
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PhysicsError;
use crate::impulse::DEFAULT_TIMESTEP;

fn default_frame_skip() -> u32 {
    1
}

fn default_max_episode_steps() -> u32 {
    1000
}

/// Registration entry of one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvSpec {
    /// Environment id, e.g. `InvertedPendulum-v0`.
    pub id: String,
    /// Description document, relative to the registry file.
    pub model: PathBuf,
    /// Steps before an episode is truncated.
    #[serde(default = "default_max_episode_steps")]
    pub max_episode_steps: u32,
    /// Score at which the task counts as solved.
    #[serde(default)]
    pub reward_threshold: Option<f64>,
    /// Physics timestep in seconds.
    #[serde(default)]
    pub timestep: Option<f64>,
    /// Physics steps per environment step.
    #[serde(default = "default_frame_skip")]
    pub frame_skip: u32,
    /// Include joint states in the diagnostic logs.
    #[serde(default)]
    pub logs_with_joints: bool,
    /// Replace part names with `RB{i}` in the diagnostic logs.
    #[serde(default)]
    pub obfuscate_logs: bool,
}

impl EnvSpec {
    /// Create a spec with default settings.
    pub fn new(id: impl Into<String>, model: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            max_episode_steps: default_max_episode_steps(),
            reward_threshold: None,
            timestep: None,
            frame_skip: default_frame_skip(),
            logs_with_joints: false,
            obfuscate_logs: false,
        }
    }

    /// Physics timestep: this entry's value, else the document's, else
    /// [`DEFAULT_TIMESTEP`].
    pub fn timestep(&self, document: Option<f64>) -> f64 {
        self.timestep.or(document).unwrap_or(DEFAULT_TIMESTEP)
    }

    /// Check settings that would leave an environment unable to step.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.frame_skip == 0 {
            return Err(PhysicsError::invalid_env(&self.id, "frame_skip must be at least 1"));
        }
        if let Some(dt) = self.timestep {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(PhysicsError::InvalidTimestep(dt));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    env: Vec<EnvSpec>,
}

/// Registered environments keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    base_dir: PathBuf,
    envs: BTreeMap<String, EnvSpec>,
}

impl Registry {
    /// Create an empty registry resolving models against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            envs: BTreeMap::new(),
        }
    }

    /// Parse a registry from TOML text.
    pub fn from_toml_str(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self, PhysicsError> {
        let file: RegistryFile = toml::from_str(text)?;
        let mut registry = Self::new(base_dir);
        for spec in file.env {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    /// Load a registry file; model paths resolve relative to its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PhysicsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let registry = Self::from_toml_str(&text, base_dir)?;
        tracing::info!(path = %path.display(), envs = registry.envs.len(), "loaded environment registry");
        Ok(registry)
    }

    /// Register an environment.
    pub fn register(&mut self, spec: EnvSpec) -> Result<(), PhysicsError> {
        spec.validate()?;
        if self.envs.contains_key(&spec.id) {
            return Err(PhysicsError::DuplicateEnv(spec.id));
        }
        self.envs.insert(spec.id.clone(), spec);
        Ok(())
    }

    /// Look up an environment.
    pub fn spec(&self, id: &str) -> Result<&EnvSpec, PhysicsError> {
        self.envs
            .get(id)
            .ok_or_else(|| PhysicsError::UnknownEnv(id.to_string()))
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.envs.keys().map(String::as_str)
    }

    /// Resolved path of a spec's description document.
    pub fn model_path(&self, spec: &EnvSpec) -> PathBuf {
        self.base_dir.join(&spec.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY: &str = r#"
[[env]]
id = "InvertedPendulum-v0"
model = "inverted_pendulum.xml"
max_episode_steps = 1000
reward_threshold = 950.0

[[env]]
id = "Ant-v0"
model = "ant.xml"
timestep = 0.0165
frame_skip = 4
logs_with_joints = true
obfuscate_logs = true
"#;

    #[test]
    fn test_parse_registry() {
        let registry = Registry::from_toml_str(REGISTRY, "assets").unwrap();
        let ids: Vec<&str> = registry.ids().collect();
        assert_eq!(ids, vec!["Ant-v0", "InvertedPendulum-v0"]);

        let pendulum = registry.spec("InvertedPendulum-v0").unwrap();
        assert_eq!(pendulum.reward_threshold, Some(950.0));
        assert_eq!(pendulum.frame_skip, 1);
        assert_eq!(pendulum.timestep(None), DEFAULT_TIMESTEP);
        assert_eq!(pendulum.timestep(Some(0.01)), 0.01);
        assert!(!pendulum.logs_with_joints);
        assert_eq!(
            registry.model_path(pendulum),
            Path::new("assets").join("inverted_pendulum.xml")
        );

        let ant = registry.spec("Ant-v0").unwrap();
        assert_eq!(ant.frame_skip, 4);
        assert_eq!(ant.timestep(Some(0.01)), 0.0165);
        assert_eq!(ant.max_episode_steps, 1000);
        assert!(ant.obfuscate_logs);
    }

    #[test]
    fn test_unknown_env() {
        let registry = Registry::from_toml_str(REGISTRY, ".").unwrap();
        assert!(matches!(
            registry.spec("Humanoid-v0"),
            Err(PhysicsError::UnknownEnv(id)) if id == "Humanoid-v0"
        ));
    }

    #[test]
    fn test_duplicate_env() {
        let text = r#"
[[env]]
id = "A-v0"
model = "a.xml"

[[env]]
id = "A-v0"
model = "b.xml"
"#;
        assert!(matches!(
            Registry::from_toml_str(text, "."),
            Err(PhysicsError::DuplicateEnv(_))
        ));
    }

    #[test]
    fn test_zero_frame_skip_rejected() {
        let text = r#"
[[env]]
id = "Stuck-v0"
model = "a.xml"
frame_skip = 0
"#;
        assert!(matches!(
            Registry::from_toml_str(text, "."),
            Err(PhysicsError::InvalidEnv { id, .. }) if id == "Stuck-v0"
        ));
    }

    #[test]
    fn test_negative_timestep_rejected() {
        let mut registry = Registry::new(".");
        let mut spec = EnvSpec::new("Fast-v0", "a.xml");
        spec.timestep = Some(-0.01);
        assert!(matches!(
            registry.register(spec),
            Err(PhysicsError::InvalidTimestep(_))
        ));
        assert_eq!(registry.ids().count(), 0);
    }

    #[test]
    fn test_load_bundled_registry() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/registry.toml");
        let registry = Registry::load(&path).unwrap();

        assert_eq!(registry.ids().count(), 2);
        for id in registry.ids() {
            let spec = registry.spec(id).unwrap();
            assert!(registry.model_path(spec).is_file(), "{id} model missing");
        }
    }

    #[test]
    fn test_missing_registry_file() {
        assert!(matches!(
            Registry::load("does/not/exist.toml"),
            Err(PhysicsError::Io(_))
        ));
    }

    #[test]
    fn test_malformed_registry() {
        let text = "[[env]]\nid = 3\n";
        assert!(matches!(
            Registry::from_toml_str(text, "."),
            Err(PhysicsError::Config(_))
        ));
    }
}

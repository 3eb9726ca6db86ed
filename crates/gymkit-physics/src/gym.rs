//! Gym-style interface for reinforcement learning.

use gymkit_ir::Description;
use serde::{Deserialize, Serialize};

use crate::error::PhysicsError;
use crate::impulse::derive_impulses;
use crate::logs::{generate_logs, NameSwap};
use crate::registry::{EnvSpec, Registry};
use crate::world::PhysicsWorld;

/// Observation from the robot environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Joint positions (radians for hinges, meters for slides).
    pub joint_positions: Vec<f64>,
    /// Joint velocities (rad/s for hinges, m/s for slides).
    pub joint_velocities: Vec<f64>,
    /// Part poses as [x, y, z, qx, qy, qz, qw] in meters.
    pub part_poses: Vec<[f64; 7]>,
}

impl Observation {
    /// Create a zero observation with the given dimensions.
    pub fn zeros(num_joints: usize, num_parts: usize) -> Self {
        Self {
            joint_positions: vec![0.0; num_joints],
            joint_velocities: vec![0.0; num_joints],
            part_poses: vec![[0.0; 7]; num_parts],
        }
    }
}

/// Action to apply to the robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Action {
    /// Torque/force commands for each joint (Nm or N).
    Torque(Vec<f64>),
    /// Position targets for each joint (radians or meters).
    PositionTarget(Vec<f64>),
    /// Velocity targets for each joint (rad/s or m/s).
    VelocityTarget(Vec<f64>),
}

/// Outcome of one environment step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Observation after the step.
    pub observation: Observation,
    /// Task reward.
    pub reward: f64,
    /// The task reached a terminal state.
    pub terminated: bool,
    /// The episode hit `max_episode_steps`.
    pub truncated: bool,
    /// Diagnostic logs, grouped by section.
    pub logs: Vec<Vec<String>>,
}

/// Reward and termination rules of an environment.
pub trait Task {
    /// Reward for reaching `obs`.
    fn reward(&self, _obs: &Observation, _world: &PhysicsWorld) -> f64 {
        0.0
    }

    /// Whether `obs` ends the episode.
    fn is_terminated(&self, _obs: &Observation, _world: &PhysicsWorld) -> bool {
        false
    }
}

/// Task with zero reward that never terminates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTask;

impl Task for NullTask {}

/// Robot environment for RL training.
pub struct RobotEnv {
    spec: EnvSpec,
    /// Parsed once, reused on every reset.
    description: Description,
    world: PhysicsWorld,
    joint_ids: Vec<String>,
    part_names: Vec<String>,
    names: NameSwap,
    task: Box<dyn Task>,
    /// Physics timestep.
    dt: f64,
    current_step: u32,
    seed: Option<u64>,
}

impl RobotEnv {
    /// Create a new robot environment.
    ///
    /// The timestep is resolved by [`EnvSpec::timestep`] against the
    /// document's `option` element.
    pub fn new(spec: EnvSpec, description: Description) -> Result<Self, PhysicsError> {
        spec.validate()?;
        let dt = spec.timestep(description.model.timestep);
        if !dt.is_finite() || dt <= 0.0 {
            return Err(PhysicsError::InvalidTimestep(dt));
        }

        let world =
            PhysicsWorld::from_model(&description.model, &description.initial_state.link_masses)?;
        let joint_ids = world.joint_ids();
        let part_names = world.part_names();
        let names = NameSwap::new(
            world.robot_name(),
            part_names.iter().map(String::as_str),
            spec.obfuscate_logs,
        );

        Ok(Self {
            spec,
            description,
            world,
            joint_ids,
            part_names,
            names,
            task: Box::new(NullTask),
            dt,
            current_step: 0,
            seed: None,
        })
    }

    /// Create the environment registered under `id`.
    pub fn from_registry(registry: &Registry, id: &str) -> Result<Self, PhysicsError> {
        let spec = registry.spec(id)?.clone();
        let description = gymkit_mjcf::load_description(registry.model_path(&spec))?;
        Self::new(spec, description)
    }

    /// Replace the task.
    pub fn with_task(mut self, task: impl Task + 'static) -> Self {
        self.task = Box::new(task);
        self
    }

    /// Reset the environment to its initial state.
    ///
    /// Rebuilds the world, derives the initial impulses from the cached
    /// description, applies them and steps once so that every body starts
    /// with its prescribed velocity. On error the previous world is kept.
    pub fn reset(&mut self) -> Result<(Observation, Vec<Vec<String>>), PhysicsError> {
        let state = &self.description.initial_state;
        let mut world = PhysicsWorld::from_model(&self.description.model, &state.link_masses)?;

        let impulses = derive_impulses(
            &state.initial_velocities,
            &state.link_masses,
            world.part_indices(),
            &world,
            self.dt,
        )?;
        world.apply_impulses(&impulses)?;
        world.step(self.dt);

        tracing::info!(
            env = %self.spec.id,
            seed = ?self.seed,
            impulses = impulses.len(),
            "reset environment"
        );

        self.world = world;
        self.current_step = 0;

        let obs = self.observe();
        Ok((obs, self.logs()))
    }

    /// Step the environment with an action.
    pub fn step(&mut self, action: &Action) -> StepResult {
        self.apply_targets(action);

        for _ in 0..self.spec.frame_skip {
            // Forces last one physics step, so torques are re-applied.
            if let Action::Torque(torques) = action {
                for (joint_id, &torque) in self.joint_ids.iter().zip(torques) {
                    if let Err(e) = self.world.apply_joint_torque(joint_id, torque) {
                        tracing::warn!(joint = %joint_id, error = %e, "failed to apply torque");
                    }
                }
            }
            self.world.step(self.dt);
        }

        self.current_step += 1;

        let observation = self.observe();
        let reward = self.task.reward(&observation, &self.world);
        let terminated = self.task.is_terminated(&observation, &self.world);
        let truncated = self.current_step >= self.spec.max_episode_steps;

        StepResult {
            observation,
            reward,
            terminated,
            truncated,
            logs: self.logs(),
        }
    }

    /// Get current observation without stepping.
    pub fn observe(&self) -> Observation {
        let mut positions = Vec::with_capacity(self.joint_ids.len());
        let mut velocities = Vec::with_capacity(self.joint_ids.len());

        for joint_id in &self.joint_ids {
            let state = self.world.joint_state(joint_id).unwrap_or_default();
            positions.push(state.position);
            velocities.push(state.velocity);
        }

        let part_poses = self
            .part_names
            .iter()
            .map(|part| {
                self.world
                    .part_kinematics(part)
                    .map(|k| k.pose())
                    .unwrap_or([0.0; 7])
            })
            .collect();

        Observation {
            joint_positions: positions,
            joint_velocities: velocities,
            part_poses,
        }
    }

    /// Diagnostic logs for the current state.
    pub fn logs(&self) -> Vec<Vec<String>> {
        let elapsed = self.current_step as f64 * self.spec.frame_skip as f64 * self.dt;
        generate_logs(&self.world, &self.names, elapsed, self.spec.logs_with_joints)
    }

    /// Set the random seed.
    pub fn seed(&mut self, seed: u64) {
        self.seed = Some(seed);
    }

    /// Seed recorded by the last call to [`seed`](Self::seed).
    pub fn current_seed(&self) -> Option<u64> {
        self.seed
    }

    /// Registration entry.
    pub fn spec(&self) -> &EnvSpec {
        &self.spec
    }

    /// The simulated world.
    pub fn world(&self) -> &PhysicsWorld {
        &self.world
    }

    /// Physics timestep in seconds.
    pub fn timestep(&self) -> f64 {
        self.dt
    }

    /// Steps taken since the last reset.
    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    /// Get the number of joints (action dimension for position/velocity control).
    pub fn num_joints(&self) -> usize {
        self.joint_ids.len()
    }

    /// Get the observation dimension.
    pub fn observation_dim(&self) -> usize {
        self.joint_ids.len() * 2 + self.part_names.len() * 7
    }

    /// Get the action dimension (for torque control).
    pub fn action_dim(&self) -> usize {
        self.joint_ids.len()
    }

    fn apply_targets(&mut self, action: &Action) {
        let result = match action {
            Action::Torque(_) => Ok(()),
            Action::PositionTarget(targets) => self
                .joint_ids
                .iter()
                .zip(targets)
                .try_for_each(|(joint_id, &target)| self.world.set_joint_position(joint_id, target)),
            Action::VelocityTarget(targets) => self
                .joint_ids
                .iter()
                .zip(targets)
                .try_for_each(|(joint_id, &target)| self.world.set_joint_velocity(joint_id, target)),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to apply joint targets");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gymkit_mjcf::parse_description_str;
    use std::path::Path;

    use crate::logs::time_log;

    const BALL: &str = r#"
<mujoco model="ball">
  <option gravity="0 0 0"/>
  <worldbody>
    <body name="ball" pos="0 0 1">
      <freejoint/>
      <geom type="sphere" size="0.1"/>
      <velocity>
        <linear x="1" y="0" z="0"/>
      </velocity>
      <inertial><inertia mass="2"/></inertial>
    </body>
  </worldbody>
</mujoco>
"#;

    const CARTPOLE: &str = r#"
<mujoco model="cartpole">
  <compiler angle="radian"/>
  <option gravity="0 0 -9.81"/>
  <worldbody>
    <body name="cart" pos="0 0 0">
      <joint name="slider" type="slide" axis="1 0 0" range="-1 1"/>
      <geom type="box" size="0.1 0.1 0.05"/>
      <body name="pole" pos="0 0 0">
        <joint name="hinge" type="hinge" axis="0 1 0"/>
        <geom type="capsule" fromto="0 0 0 0 0 0.6" size="0.049"/>
        <velocity>
          <angular x="0" y="0.5" z="0"/>
        </velocity>
      </body>
    </body>
  </worldbody>
</mujoco>
"#;

    fn env(xml: &str) -> RobotEnv {
        let description = parse_description_str(xml).unwrap();
        RobotEnv::new(EnvSpec::new("Test-v0", "test.xml"), description).unwrap()
    }

    #[test]
    fn test_env_creation() {
        let env = env(CARTPOLE);

        assert_eq!(env.num_joints(), 2);
        assert_eq!(env.action_dim(), 2);
        assert_eq!(env.observation_dim(), 2 * 2 + 2 * 7);
        assert_eq!(env.timestep(), crate::DEFAULT_TIMESTEP);
    }

    #[test]
    fn test_reset_applies_initial_velocity() {
        let mut env = env(BALL);

        let (obs, logs) = env.reset().unwrap();
        assert_eq!(obs.part_poses.len(), 1);

        let k = env.world().part_kinematics("ball").unwrap();
        assert_relative_eq!(k.linear_velocity[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(k.linear_velocity[1], 0.0, epsilon = 1e-6);
        assert_eq!(logs[0], vec!["Time: 0.000"]);
    }

    #[test]
    fn test_reset_is_repeatable() {
        let mut env = env(BALL);
        env.reset().unwrap();
        for _ in 0..10 {
            env.step(&Action::Torque(vec![]));
        }
        env.reset().unwrap();

        let k = env.world().part_kinematics("ball").unwrap();
        assert_relative_eq!(k.linear_velocity[0], 1.0, epsilon = 1e-3);
        assert_eq!(env.current_step(), 0);
    }

    #[test]
    fn test_reset_uses_live_mass_when_not_explicit() {
        let mut env = env(CARTPOLE);
        env.reset().unwrap();

        let pole = env.world().part_kinematics("pole").unwrap();
        assert!(pole.angular_velocity[1].abs() > 0.0);
    }

    #[test]
    fn test_env_step() {
        let mut env = env(CARTPOLE);
        env.reset().unwrap();

        let result = env.step(&Action::PositionTarget(vec![0.2, 0.0]));

        assert_eq!(result.observation.joint_positions.len(), 2);
        assert_eq!(result.reward, 0.0);
        assert!(!result.terminated);
        assert!(!result.truncated);
        assert_eq!(result.logs.len(), 3);
    }

    #[test]
    fn test_truncation() {
        let description = parse_description_str(BALL).unwrap();
        let mut spec = EnvSpec::new("Ball-v0", "ball.xml");
        spec.max_episode_steps = 3;
        spec.logs_with_joints = true;
        let mut env = RobotEnv::new(spec, description).unwrap();
        env.reset().unwrap();

        assert!(!env.step(&Action::Torque(vec![])).truncated);
        assert!(!env.step(&Action::Torque(vec![])).truncated);
        let last = env.step(&Action::Torque(vec![]));
        assert!(last.truncated);
        assert_eq!(last.logs.len(), 4);
    }

    struct Upright;

    impl Task for Upright {
        fn reward(&self, _obs: &Observation, _world: &PhysicsWorld) -> f64 {
            1.0
        }

        fn is_terminated(&self, obs: &Observation, _world: &PhysicsWorld) -> bool {
            obs.joint_positions.get(1).is_some_and(|angle| angle.abs() > 0.2)
        }
    }

    #[test]
    fn test_custom_task() {
        let mut env = env(CARTPOLE).with_task(Upright);
        env.reset().unwrap();

        let result = env.step(&Action::Torque(vec![0.0, 0.0]));
        assert_eq!(result.reward, 1.0);
        assert!(!result.terminated);
    }

    #[test]
    fn test_failed_reset_is_reported() {
        let mut description = parse_description_str(BALL).unwrap();
        description
            .initial_state
            .initial_velocities
            .get_mut("ball")
            .unwrap()
            .linear
            .x = f64::INFINITY;
        let mut env = RobotEnv::new(EnvSpec::new("Ball-v0", "ball.xml"), description).unwrap();

        assert!(matches!(
            env.reset(),
            Err(PhysicsError::InvalidImpulse { .. })
        ));
    }

    #[test]
    fn test_bundled_pendulum() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/registry.toml");
        let registry = Registry::load(path).unwrap();
        let mut env =
            RobotEnv::from_registry(&registry, "InvertedPendulumLogsPyBulletEnv-v0").unwrap();
        assert_eq!(env.timestep(), 0.004125);
        assert_eq!(env.num_joints(), 2);

        let (_, logs) = env.reset().unwrap();
        assert_eq!(logs.len(), 4);
        assert_eq!(logs[2].len(), 2);
        assert!(logs[2][0].starts_with("RB0's part RB1:"));
        assert!(logs[2][1].starts_with("RB0's part RB2:"));

        let result = env.step(&Action::Torque(vec![0.0, 0.0]));
        assert_eq!(result.logs[0], vec![time_log(4.0 * 0.004125)]);
        assert!(!result.terminated);
    }

    #[test]
    fn test_unknown_registry_id() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/registry.toml");
        let registry = Registry::load(path).unwrap();
        assert!(matches!(
            RobotEnv::from_registry(&registry, "Nope-v0"),
            Err(PhysicsError::UnknownEnv(_))
        ));
    }

    #[test]
    fn test_document_timestep_used_when_unset() {
        let xml = r#"<mujoco model="ball">
            <option timestep="0.01"/>
            <worldbody>
                <body name="ball"><geom type="sphere" size="0.1"/></body>
            </worldbody>
        </mujoco>"#;
        let description = parse_description_str(xml).unwrap();

        let env = RobotEnv::new(EnvSpec::new("Ball-v0", "ball.xml"), description.clone()).unwrap();
        assert_eq!(env.timestep(), 0.01);

        let mut spec = EnvSpec::new("Ball-v0", "ball.xml");
        spec.timestep = Some(0.002);
        let env = RobotEnv::new(spec, description).unwrap();
        assert_eq!(env.timestep(), 0.002);
    }

    #[test]
    fn test_zero_frame_skip_rejected() {
        let mut spec = EnvSpec::new("Test-v0", "test.xml");
        spec.frame_skip = 0;
        let description = parse_description_str(CARTPOLE).unwrap();
        assert!(matches!(
            RobotEnv::new(spec, description),
            Err(PhysicsError::InvalidEnv { .. })
        ));
    }

    #[test]
    fn test_seed_is_recorded() {
        let mut env = env(BALL);
        assert_eq!(env.current_seed(), None);
        env.seed(7);
        assert_eq!(env.current_seed(), Some(7));
    }
}

//! Text diagnostics produced alongside observations.

use std::collections::HashMap;

use crate::world::{PhysicsWorld, WORLD_NAME};

/// Kinematic quantities that can appear in a part log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KinematicInfo {
    /// World position.
    Position,
    /// Orientation quaternion `x y z w`.
    Orientation,
    /// Linear velocity.
    LinearVelocity,
    /// Angular velocity.
    AngularVelocity,
}

impl KinematicInfo {
    /// Every quantity, in log order.
    pub const ALL: [KinematicInfo; 4] = [
        KinematicInfo::Position,
        KinematicInfo::Orientation,
        KinematicInfo::LinearVelocity,
        KinematicInfo::AngularVelocity,
    ];
}

/// Display names for the robot and its parts.
#[derive(Debug, Clone, Default)]
pub struct NameSwap {
    names: HashMap<String, String>,
}

impl NameSwap {
    /// Build the table for a robot and its parts.
    ///
    /// With `obfuscate` every name (robot first, then parts in order) is
    /// replaced by `RB{i}`.
    pub fn new<'a>(
        robot: &str,
        parts: impl IntoIterator<Item = &'a str>,
        obfuscate: bool,
    ) -> Self {
        let mut order: Vec<&str> = vec![robot];
        for part in parts {
            if !order.contains(&part) {
                order.push(part);
            }
        }

        let names = order
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let shown = if obfuscate {
                    format!("RB{i}")
                } else {
                    name.to_string()
                };
                (name.to_string(), shown)
            })
            .collect();
        Self { names }
    }

    /// Display name, or the name itself when not in the table.
    pub fn get<'a>(&'a self, name: &'a str) -> &'a str {
        self.names.get(name).map(String::as_str).unwrap_or(name)
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.2}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parts added for joint bookkeeping carry `link` in their name.
fn is_logged_part(name: &str) -> bool {
    !name.contains("link")
}

/// `Time: t` line for the current simulation time.
pub fn time_log(elapsed: f64) -> String {
    format!("Time: {elapsed:.3}")
}

/// One entry per active contact between logged parts.
pub fn contact_logs(world: &PhysicsWorld, names: &NameSwap) -> Vec<String> {
    let robot = names.get(world.robot_name());
    let mut logs = Vec::new();
    for contact in world.contacts() {
        if !is_logged_part(&contact.part1) || !is_logged_part(&contact.part2) {
            continue;
        }
        logs.push(format!(
            "Contact between {robot}'s link {} and {robot}'s link {}",
            names.get(&contact.part1),
            names.get(&contact.part2)
        ));
        logs.push(format!("position: {}", join(&contact.position)));
        logs.push(format!("normal: {}", join(&contact.normal)));
        logs.push(format!("force: {:.2}\n", contact.force));
    }
    logs
}

/// Kinematic state of every logged part.
pub fn kinematics_logs(
    world: &PhysicsWorld,
    names: &NameSwap,
    infos: &[KinematicInfo],
) -> Vec<String> {
    let robot = names.get(world.robot_name());
    world
        .part_names()
        .iter()
        .filter(|part| is_logged_part(part))
        .filter_map(|part| {
            let k = world.part_kinematics(part)?;
            let mut log = format!("{robot}'s part {}:\n", names.get(part));
            for info in infos {
                let line = match info {
                    KinematicInfo::Position => format!("Position: {}\n", join(&k.position)),
                    KinematicInfo::Orientation => {
                        format!("Orientation: {}\n", join(&k.orientation))
                    }
                    KinematicInfo::LinearVelocity => {
                        format!("Linear Velocities: {}\n", join(&k.linear_velocity))
                    }
                    KinematicInfo::AngularVelocity => {
                        format!("Angular Velocities: {}\n", join(&k.angular_velocity))
                    }
                };
                log.push_str(&line);
            }
            Some(log)
        })
        .collect()
}

/// Position, velocity and effort of every joint.
pub fn joint_logs(world: &PhysicsWorld) -> Vec<String> {
    world
        .joint_ids()
        .iter()
        .filter_map(|joint| {
            let state = world.joint_state(joint).ok()?;
            let (parent, child) = world.joint_bodies(joint).unwrap_or((WORLD_NAME, ""));
            Some(format!(
                "Joint {joint}:\nBody {parent} -> Body {child}\nPosition: {:.3}, Velocity: {:.3}, Force: {:.3}",
                state.position, state.velocity, state.effort
            ))
        })
        .collect()
}

/// Full diagnostic log for the current world state, grouped by section.
///
/// `elapsed` is the episode time reported on the `Time:` line.
pub fn generate_logs(
    world: &PhysicsWorld,
    names: &NameSwap,
    elapsed: f64,
    with_joints: bool,
) -> Vec<Vec<String>> {
    let mut logs = vec![
        vec![time_log(elapsed)],
        contact_logs(world, names),
        kinematics_logs(world, names, &KinematicInfo::ALL),
    ];
    if with_joints {
        logs.push(joint_logs(world));
    }
    logs
}

#[cfg(test)]
mod tests {
    use super::*;
    use gymkit_ir::{BodyDef, GeomDef, GeomKind, JointDef, JointKind, RobotModel, Vec3};

    fn model() -> RobotModel {
        let mut model = RobotModel::new("pendulum");
        model.gravity = Vec3::zeros();
        let mut pole = BodyDef::new("pole", None);
        pole.pos = Vec3::new(0.0, 0.0, 1.0);
        pole.geoms.push(GeomDef {
            name: None,
            kind: GeomKind::Sphere { radius: 0.1 },
            pos: Vec3::zeros(),
            density: 1000.0,
        });
        pole.joints.push(JointDef {
            name: "hinge".to_string(),
            kind: JointKind::Hinge {
                axis: Vec3::new(0.0, 1.0, 0.0),
                limits: None,
            },
            pos: Vec3::zeros(),
        });
        let mut link = BodyDef::new("link0", Some("pole".to_string()));
        link.pos = Vec3::new(0.0, 0.0, 0.5);
        model.bodies = vec![pole, link];
        model
    }

    #[test]
    fn test_name_swap() {
        let plain = NameSwap::new("ant", ["torso", "leg"], false);
        assert_eq!(plain.get("torso"), "torso");
        assert_eq!(plain.get("unknown"), "unknown");

        let hidden = NameSwap::new("ant", ["torso", "leg"], true);
        assert_eq!(hidden.get("ant"), "RB0");
        assert_eq!(hidden.get("torso"), "RB1");
        assert_eq!(hidden.get("leg"), "RB2");
    }

    #[test]
    fn test_time_log() {
        assert_eq!(time_log(0.0), "Time: 0.000");
        assert_eq!(time_log(1.0 / 60.0), "Time: 0.017");
    }

    #[test]
    fn test_kinematics_log_format() {
        let world = PhysicsWorld::from_model(&model(), &HashMap::new()).unwrap();
        let names = NameSwap::new("pendulum", ["pole", "link0"], false);

        let logs = kinematics_logs(&world, &names, &KinematicInfo::ALL);

        // `link0` is bookkeeping and stays out of the log.
        assert_eq!(logs.len(), 1);
        assert_eq!(
            logs[0],
            "pendulum's part pole:\n\
             Position: 0.00 0.00 1.00\n\
             Orientation: 0.00 0.00 0.00 1.00\n\
             Linear Velocities: 0.00 0.00 0.00\n\
             Angular Velocities: 0.00 0.00 0.00\n"
        );
    }

    #[test]
    fn test_kinematics_log_subset_obfuscated() {
        let world = PhysicsWorld::from_model(&model(), &HashMap::new()).unwrap();
        let names = NameSwap::new("pendulum", ["pole", "link0"], true);

        let logs = kinematics_logs(&world, &names, &[KinematicInfo::AngularVelocity]);

        assert_eq!(logs[0], "RB0's part RB1:\nAngular Velocities: 0.00 0.00 0.00\n");
    }

    #[test]
    fn test_joint_log_format() {
        let world = PhysicsWorld::from_model(&model(), &HashMap::new()).unwrap();
        let logs = joint_logs(&world);
        assert_eq!(
            logs,
            vec!["Joint hinge:\nBody World -> Body pole\nPosition: 0.000, Velocity: 0.000, Force: 0.000"]
        );
    }

    #[test]
    fn test_generate_logs_sections() {
        let world = PhysicsWorld::from_model(&model(), &HashMap::new()).unwrap();
        let names = NameSwap::new("pendulum", ["pole"], false);

        assert_eq!(generate_logs(&world, &names, 0.0, false).len(), 3);
        let logs = generate_logs(&world, &names, 0.25, true);
        assert_eq!(logs.len(), 4);
        assert_eq!(logs[0], vec!["Time: 0.250"]);
    }
}

//! Initial-state impulse derivation.
//!
//! Converts per-body initial velocities into the impulse that brings each
//! body to that velocity after one simulation step:
//! `impulse = mass * velocity / dt`.

use std::collections::HashMap;

use gymkit_ir::{Axis, BodyVelocitySpec, ImpulseSpec, PartIndex, Vec3};

use crate::error::{ImpulseKind, PhysicsError};

/// Default simulation timestep (240 Hz).
pub const DEFAULT_TIMESTEP: f64 = 1.0 / 240.0;

/// Live mass lookup for a registered part.
pub trait MassQuery {
    /// Mass of the given body/link pair as currently simulated.
    fn dynamics_mass(&self, part: PartIndex) -> Result<f64, PhysicsError>;
}

impl<F> MassQuery for F
where
    F: Fn(PartIndex) -> Result<f64, PhysicsError>,
{
    fn dynamics_mass(&self, part: PartIndex) -> Result<f64, PhysicsError> {
        self(part)
    }
}

impl MassQuery for HashMap<PartIndex, f64> {
    fn dynamics_mass(&self, part: PartIndex) -> Result<f64, PhysicsError> {
        self.get(&part)
            .copied()
            .ok_or_else(|| PhysicsError::mass_query(part, "no such part"))
    }
}

/// Resolve the mass used for a body's impulse.
///
/// An explicit mass wins; otherwise the body's part is looked up and the
/// engine is asked.
pub fn resolve_mass<Q: MassQuery + ?Sized>(
    name: &str,
    link_masses: &HashMap<String, f64>,
    parts: &HashMap<String, PartIndex>,
    masses: &Q,
) -> Result<f64, PhysicsError> {
    if let Some(&mass) = link_masses.get(name) {
        return Ok(mass);
    }
    let part = parts
        .get(name)
        .ok_or_else(|| PhysicsError::UnresolvedBody(name.to_string()))?;
    masses.dynamics_mass(*part)
}

/// Derive the impulse for every body with an initial velocity.
///
/// Bodies that only have a mass produce no entry. Either every body gets a
/// valid impulse or an error is returned; no partial mapping escapes.
///
/// # Errors
///
/// - [`PhysicsError::InvalidTimestep`] if `dt` is not finite and positive.
/// - [`PhysicsError::UnresolvedBody`] if a body has neither an explicit
///   mass nor a registered part.
/// - [`PhysicsError::InvalidImpulse`] if the resolved mass is negative or
///   non-finite, or a component comes out non-finite.
pub fn derive_impulses<Q: MassQuery + ?Sized>(
    initial_velocities: &HashMap<String, BodyVelocitySpec>,
    link_masses: &HashMap<String, f64>,
    parts: &HashMap<String, PartIndex>,
    masses: &Q,
    dt: f64,
) -> Result<HashMap<String, ImpulseSpec>, PhysicsError> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(PhysicsError::InvalidTimestep(dt));
    }

    // Sorted so that the reported failure does not depend on hash order.
    let mut names: Vec<&String> = initial_velocities.keys().collect();
    names.sort();

    let mut impulses = HashMap::with_capacity(names.len());
    for name in names {
        let velocity = &initial_velocities[name];
        let mass = resolve_mass(name, link_masses, parts, masses)?;
        let impulse = ImpulseSpec {
            linear_impulse: impulse_vector(name, ImpulseKind::Linear, mass, velocity.linear, dt)?,
            angular_impulse: impulse_vector(name, ImpulseKind::Angular, mass, velocity.angular, dt)?,
        };
        tracing::debug!(body = %name, mass, ?impulse, "derived initial impulse");
        impulses.insert(name.clone(), impulse);
    }

    Ok(impulses)
}

fn impulse_vector(
    body: &str,
    kind: ImpulseKind,
    mass: f64,
    velocity: Vec3,
    dt: f64,
) -> Result<Vec3, PhysicsError> {
    let mut out = [0.0; 3];
    for (slot, axis) in out.iter_mut().zip(Axis::ALL) {
        *slot = impulse_component(body, kind, axis, mass, velocity.get(axis), dt)?;
    }
    Ok(Vec3::from(out))
}

fn impulse_component(
    body: &str,
    kind: ImpulseKind,
    axis: Axis,
    mass: f64,
    velocity: f64,
    dt: f64,
) -> Result<f64, PhysicsError> {
    if !mass.is_finite() || mass < 0.0 {
        return Err(PhysicsError::invalid_impulse(
            body,
            kind,
            axis,
            format!("mass {mass} is not a finite non-negative value"),
        ));
    }
    let value = mass * velocity / dt;
    if !value.is_finite() {
        return Err(PhysicsError::invalid_impulse(
            body,
            kind,
            axis,
            format!("component {value} from velocity {velocity}"),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn velocities(entries: &[(&str, [f64; 3], [f64; 3])]) -> HashMap<String, BodyVelocitySpec> {
        entries
            .iter()
            .map(|(name, linear, angular)| {
                (
                    name.to_string(),
                    BodyVelocitySpec {
                        linear: Vec3::from(*linear),
                        angular: Vec3::from(*angular),
                    },
                )
            })
            .collect()
    }

    fn no_parts() -> HashMap<String, PartIndex> {
        HashMap::new()
    }

    fn unreachable_query(part: PartIndex) -> Result<f64, PhysicsError> {
        Err(PhysicsError::mass_query(part, "query must not be called"))
    }

    #[test]
    fn impulse_is_mass_times_velocity_over_dt() {
        let v = velocities(&[("ball", [1.0, 0.0, 0.0], [0.0, 0.0, 0.0])]);
        let masses = HashMap::from([("ball".to_string(), 2.0)]);

        let out = derive_impulses(&v, &masses, &no_parts(), &unreachable_query, DEFAULT_TIMESTEP)
            .unwrap();

        let ball = out["ball"];
        assert_relative_eq!(ball.linear_impulse.x, 480.0, epsilon = 1e-9);
        assert_eq!(ball.linear_impulse.y, 0.0);
        assert_eq!(ball.linear_impulse.z, 0.0);
        assert_eq!(ball.angular_impulse, Vec3::zeros());
    }

    #[test]
    fn angular_impulse_uses_same_relation() {
        let v = velocities(&[("wheel", [0.0, 0.0, 0.0], [0.0, -0.5, 2.0])]);
        let masses = HashMap::from([("wheel".to_string(), 3.0)]);

        let out = derive_impulses(&v, &masses, &no_parts(), &unreachable_query, 0.01).unwrap();

        assert_relative_eq!(out["wheel"].angular_impulse.y, -150.0, epsilon = 1e-9);
        assert_relative_eq!(out["wheel"].angular_impulse.z, 600.0, epsilon = 1e-9);
    }

    #[test]
    fn mass_only_bodies_produce_no_impulse() {
        let v = velocities(&[("pole", [0.0, 1.0, 0.0], [0.0, 0.0, 0.0])]);
        let masses = HashMap::from([("pole".to_string(), 1.0), ("cart".to_string(), 10.0)]);

        let out = derive_impulses(&v, &masses, &no_parts(), &unreachable_query, DEFAULT_TIMESTEP)
            .unwrap();

        assert_eq!(out.len(), 1);
        assert!(!out.contains_key("cart"));
    }

    #[test]
    fn missing_mass_falls_back_to_live_query() {
        let v = velocities(&[("torso", [1.0, 0.0, 0.0], [0.0, 0.0, 1.0])]);
        let parts = HashMap::from([("torso".to_string(), PartIndex::new(0, -1))]);
        let query = |part: PartIndex| -> Result<f64, PhysicsError> {
            assert_eq!(part, PartIndex::new(0, -1));
            Ok(5.0)
        };

        let out = derive_impulses(&v, &HashMap::new(), &parts, &query, DEFAULT_TIMESTEP).unwrap();

        assert_relative_eq!(out["torso"].linear_impulse.x, 5.0 * 240.0, epsilon = 1e-9);
        assert_relative_eq!(out["torso"].angular_impulse.z, 5.0 * 240.0, epsilon = 1e-9);
    }

    #[test]
    fn explicit_mass_wins_over_registry() {
        let v = velocities(&[("torso", [1.0, 0.0, 0.0], [0.0, 0.0, 0.0])]);
        let parts = HashMap::from([("torso".to_string(), PartIndex::new(0, -1))]);
        let masses = HashMap::from([("torso".to_string(), 2.0)]);

        let out = derive_impulses(&v, &masses, &parts, &unreachable_query, 1.0).unwrap();

        assert_eq!(out["torso"].linear_impulse.x, 2.0);
    }

    #[test]
    fn part_table_serves_as_mass_query() {
        let v = velocities(&[("thigh", [0.0, 0.0, 1.0], [0.0, 0.0, 0.0])]);
        let parts = HashMap::from([("thigh".to_string(), PartIndex::new(0, 2))]);
        let live = HashMap::from([(PartIndex::new(0, 2), 4.0)]);

        let out = derive_impulses(&v, &HashMap::new(), &parts, &live, 0.5).unwrap();

        assert_eq!(out["thigh"].linear_impulse.z, 8.0);
    }

    #[test]
    fn body_without_mass_or_part_is_unresolved() {
        let v = velocities(&[("ghost", [1.0, 0.0, 0.0], [0.0, 0.0, 0.0])]);

        let err = derive_impulses(
            &v,
            &HashMap::new(),
            &no_parts(),
            &unreachable_query,
            DEFAULT_TIMESTEP,
        )
        .unwrap_err();

        match err {
            PhysicsError::UnresolvedBody(name) => assert_eq!(name, "ghost"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failed_mass_query_propagates() {
        let v = velocities(&[("torso", [1.0, 0.0, 0.0], [0.0, 0.0, 0.0])]);
        let parts = HashMap::from([("torso".to_string(), PartIndex::new(3, 0))]);
        let live: HashMap<PartIndex, f64> = HashMap::new();

        let err = derive_impulses(&v, &HashMap::new(), &parts, &live, DEFAULT_TIMESTEP).unwrap_err();

        assert!(matches!(err, PhysicsError::MassQuery { .. }));
    }

    #[test]
    fn non_finite_velocity_rejects_whole_derivation() {
        let v = velocities(&[
            ("good", [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]),
            ("bad", [f64::INFINITY, 0.0, 0.0], [0.0, 0.0, 0.0]),
        ]);
        let masses = HashMap::from([("good".to_string(), 1.0), ("bad".to_string(), 1.0)]);

        let result = derive_impulses(&v, &masses, &no_parts(), &unreachable_query, DEFAULT_TIMESTEP);

        match result {
            Err(PhysicsError::InvalidImpulse {
                body, kind, axis, ..
            }) => {
                assert_eq!(body, "bad");
                assert_eq!(kind, ImpulseKind::Linear);
                assert_eq!(axis, Axis::X);
            }
            other => panic!("expected invalid impulse, got {other:?}"),
        }
    }

    #[test]
    fn nan_angular_velocity_names_axis() {
        let v = velocities(&[("pole", [0.0, 0.0, 0.0], [0.0, 0.0, f64::NAN])]);
        let masses = HashMap::from([("pole".to_string(), 1.0)]);

        let err = derive_impulses(&v, &masses, &no_parts(), &unreachable_query, DEFAULT_TIMESTEP)
            .unwrap_err();

        assert!(matches!(
            err,
            PhysicsError::InvalidImpulse {
                kind: ImpulseKind::Angular,
                axis: Axis::Z,
                ..
            }
        ));
    }

    #[test]
    fn negative_or_non_finite_mass_is_rejected() {
        let v = velocities(&[("a", [0.0, 0.0, 0.0], [0.0, 0.0, 0.0])]);

        for mass in [-1.0, f64::NAN, f64::INFINITY] {
            let masses = HashMap::from([("a".to_string(), mass)]);
            let result = derive_impulses(&v, &masses, &no_parts(), &unreachable_query, 0.1);
            assert!(
                matches!(result, Err(PhysicsError::InvalidImpulse { .. })),
                "mass {mass} should be rejected"
            );
        }
    }

    #[test]
    fn live_query_returning_negative_mass_is_rejected() {
        let v = velocities(&[("torso", [1.0, 0.0, 0.0], [0.0, 0.0, 0.0])]);
        let parts = HashMap::from([("torso".to_string(), PartIndex::new(0, -1))]);
        let query = |_: PartIndex| -> Result<f64, PhysicsError> { Ok(-5.0) };

        let result = derive_impulses(&v, &HashMap::new(), &parts, &query, DEFAULT_TIMESTEP);

        assert!(matches!(result, Err(PhysicsError::InvalidImpulse { .. })));
    }

    #[test]
    fn invalid_timestep_is_rejected() {
        let v = velocities(&[]);
        for dt in [0.0, -0.01, f64::NAN] {
            let result = derive_impulses(&v, &HashMap::new(), &no_parts(), &unreachable_query, dt);
            assert!(matches!(result, Err(PhysicsError::InvalidTimestep(_))));
        }
    }
}

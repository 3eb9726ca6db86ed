//! Collision shape generation from description geoms.

use std::f32::consts::PI;

use gymkit_ir::{BodyDef, GeomDef, GeomKind, Vec3};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use parry3d::shape::SharedShape;
use rapier3d::geometry::{Collider, ColliderBuilder};

use crate::error::PhysicsError;

/// Radius of the ball given to bodies without geoms.
pub const PLACEHOLDER_RADIUS: f32 = 0.05;

const FRICTION: f32 = 0.5;
const RESTITUTION: f32 = 0.1;

pub(crate) fn point(v: Vec3) -> Point3<f32> {
    Point3::new(v.x as f32, v.y as f32, v.z as f32)
}

pub(crate) fn vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x as f32, v.y as f32, v.z as f32)
}

/// Generate a collision shape and its pose in the body frame.
pub fn geom_to_shape(
    geom: &GeomDef,
    body: &str,
) -> Result<(SharedShape, Isometry3<f32>), PhysicsError> {
    match &geom.kind {
        GeomKind::Sphere { radius } => {
            check_radius(*radius, body)?;
            Ok((
                SharedShape::ball(*radius as f32),
                Isometry3::translation(geom.pos.x as f32, geom.pos.y as f32, geom.pos.z as f32),
            ))
        }
        GeomKind::Capsule { from, to, radius } => {
            check_radius(*radius, body)?;
            Ok((
                SharedShape::capsule(point(*from), point(*to), *radius as f32),
                Isometry3::identity(),
            ))
        }
        GeomKind::Cylinder { from, to, radius } => {
            check_radius(*radius, body)?;
            let segment = vector(*to) - vector(*from);
            let length = segment.norm();
            if length <= f32::EPSILON {
                return Err(PhysicsError::CollisionShape {
                    name: body.to_string(),
                    reason: "Cylinder has zero length".to_string(),
                });
            }
            // Parry cylinders run along Y.
            let rotation = UnitQuaternion::rotation_between(&Vector3::y(), &segment)
                .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI));
            let center = (vector(*from) + vector(*to)) / 2.0;
            Ok((
                SharedShape::cylinder(length / 2.0, *radius as f32),
                Isometry3::from_parts(Translation3::from(center), rotation),
            ))
        }
        GeomKind::Box { half_extents } => {
            if half_extents.x <= 0.0 || half_extents.y <= 0.0 || half_extents.z <= 0.0 {
                return Err(PhysicsError::CollisionShape {
                    name: body.to_string(),
                    reason: format!("Box half extents must be positive, got {half_extents:?}"),
                });
            }
            Ok((
                SharedShape::cuboid(
                    half_extents.x as f32,
                    half_extents.y as f32,
                    half_extents.z as f32,
                ),
                Isometry3::translation(geom.pos.x as f32, geom.pos.y as f32, geom.pos.z as f32),
            ))
        }
    }
}

fn check_radius(radius: f64, body: &str) -> Result<(), PhysicsError> {
    if radius > 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::CollisionShape {
            name: body.to_string(),
            reason: format!("Radius must be positive, got {radius}"),
        })
    }
}

/// Build the colliders of a body.
///
/// With an explicit `mass` the mass is split evenly across the geoms;
/// otherwise each geom contributes `volume * density`. A body without geoms
/// gets a small placeholder ball so that it still has mass properties.
pub fn body_colliders(body: &BodyDef, mass: Option<f64>) -> Result<Vec<Collider>, PhysicsError> {
    if body.geoms.is_empty() {
        tracing::debug!(body = %body.name, "no geoms, using placeholder collider");
        let builder = ColliderBuilder::ball(PLACEHOLDER_RADIUS)
            .friction(FRICTION)
            .restitution(RESTITUTION);
        let builder = match mass {
            Some(m) => builder.mass(m as f32),
            None => builder,
        };
        return Ok(vec![builder.build()]);
    }

    let share = mass.map(|m| (m / body.geoms.len() as f64) as f32);
    body.geoms
        .iter()
        .map(|geom| {
            let (shape, pose) = geom_to_shape(geom, &body.name)?;
            let builder = ColliderBuilder::new(shape)
                .position(pose)
                .friction(FRICTION)
                .restitution(RESTITUTION);
            let builder = match share {
                Some(m) => builder.mass(m),
                None => builder.density(geom.density as f32),
            };
            Ok(builder.build())
        })
        .collect()
}

/// Volume of a geom in cubic meters.
pub fn geom_volume(geom: &GeomDef) -> f64 {
    use std::f64::consts::PI;

    match &geom.kind {
        GeomKind::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
        GeomKind::Capsule { from, to, radius } => {
            let length = to.add(Vec3::new(-from.x, -from.y, -from.z)).norm();
            PI * radius.powi(2) * length + 4.0 / 3.0 * PI * radius.powi(3)
        }
        GeomKind::Cylinder { from, to, radius } => {
            let length = to.add(Vec3::new(-from.x, -from.y, -from.z)).norm();
            PI * radius.powi(2) * length
        }
        GeomKind::Box { half_extents } => 8.0 * half_extents.x * half_extents.y * half_extents.z,
    }
}

/// Estimate a body's mass from its geoms assuming uniform density per geom.
pub fn estimate_mass(body: &BodyDef) -> f64 {
    body.geoms
        .iter()
        .map(|g| geom_volume(g) * g.density)
        .sum()
}

//! Description document parser.
//!
//! Walks the whole element tree with a streaming reader. Every `body`
//! element is visited regardless of depth; the enclosing body (if any) is
//! tracked so that `velocity`, `inertial`, `geom` and `joint` children land
//! on the right record.

use std::collections::HashSet;
use std::io::BufRead;

use gymkit_ir::{
    AngleUnit, Axis, AxisRange, BodyDef, BodyVelocitySpec, Description, GeomDef, GeomKind,
    InitialState, JointDef, JointKind, RobotModel, Vec3, VelocityRange, DEFAULT_MASS,
    DEFAULT_MAX_MASS,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{DescriptionError, Result};

/// Density assigned to geoms without a `density` attribute (water, kg/m^3).
pub const DEFAULT_GEOM_DENSITY: f64 = 1000.0;

const RANGE_ATTRIBUTES: [(&str, f64); 6] = [
    ("xmin", -1.0),
    ("xmax", 1.0),
    ("ymin", -1.0),
    ("ymax", 1.0),
    ("zmin", -1.0),
    ("zmax", 1.0),
];

/// Parse a description document held in a string.
///
/// # Errors
///
/// Returns an error if the markup is malformed, a `linear`/`angular`
/// element lacks an axis attribute, or an attribute value is not numeric.
pub fn parse_description_str(xml: &str) -> Result<Description> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    parse_description_reader(&mut reader)
}

fn parse_description_reader<R: BufRead>(reader: &mut Reader<R>) -> Result<Description> {
    let mut builder = Builder::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                builder.open_root(e)?;
                parse_start(reader, e, &mut builder, None)?;
            }
            Ok(Event::Empty(ref e)) => {
                builder.open_root(e)?;
                parse_empty(e, &mut builder, None)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DescriptionError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    builder.finish()
}

/// Accumulates the model and the initial-state mappings during the walk.
#[derive(Default)]
struct Builder {
    model: Option<RobotModel>,
    state: InitialState,
    names: HashSet<String>,
    anonymous: HashSet<usize>,
    joint_counters: Vec<usize>,
}

impl Builder {
    fn open_root(&mut self, e: &BytesStart) -> Result<()> {
        if self.model.is_none() {
            let name = get_attribute(e, "model")?.unwrap_or_else(|| "unnamed".to_string());
            self.model = Some(RobotModel::new(name));
        }
        Ok(())
    }

    fn model_mut(&mut self) -> &mut RobotModel {
        self.model.get_or_insert_with(|| RobotModel::new("unnamed"))
    }

    fn body_name(&self, index: usize) -> &str {
        self.model
            .as_ref()
            .and_then(|m| m.bodies.get(index))
            .map(|b| b.name.as_str())
            .unwrap_or("")
    }

    fn begin_body(&mut self, e: &BytesStart, parent: Option<usize>) -> Result<usize> {
        let index = self.model_mut().bodies.len();
        let parent_name = parent.map(|p| self.body_name(p).to_string());

        let name = match get_attribute(e, "name")? {
            Some(name) => {
                if !self.names.insert(name.clone()) {
                    return Err(DescriptionError::DuplicateBody(name));
                }
                name
            }
            None => {
                self.anonymous.insert(index);
                self.generated_name(index)
            }
        };

        let mut body = BodyDef::new(name, parent_name);
        if let Some(pos) = parse_vec3_attr(e, "pos", &body.name, "body")? {
            body.pos = pos;
        }

        self.model_mut().bodies.push(body);
        self.joint_counters.push(0);
        Ok(index)
    }

    /// Reserve a free `body{index}` name, suffixed when an earlier body
    /// already took it.
    fn generated_name(&mut self, index: usize) -> String {
        let mut name = format!("body{index}");
        let mut suffix = 1;
        while self.names.contains(&name) {
            name = format!("body{index}_{suffix}");
            suffix += 1;
        }
        self.names.insert(name.clone());
        name
    }

    /// Name under which per-body records are keyed; anonymous bodies cannot
    /// carry them.
    fn record_key(&self, index: usize) -> Result<String> {
        if self.anonymous.contains(&index) {
            return Err(DescriptionError::missing_attribute(
                self.body_name(index),
                "body",
                "name",
            ));
        }
        Ok(self.body_name(index).to_string())
    }

    fn set_velocity(&mut self, index: usize, spec: BodyVelocitySpec, range: VelocityRange) -> Result<()> {
        let key = self.record_key(index)?;
        self.state.initial_velocities.insert(key.clone(), spec);
        self.state.range_velocities.insert(key, range);
        Ok(())
    }

    fn set_mass(&mut self, index: usize, mass: f64, max_mass: f64) -> Result<()> {
        let key = self.record_key(index)?;
        self.state.link_masses.insert(key.clone(), mass);
        self.state.range_masses.insert(key, max_mass);
        Ok(())
    }

    fn add_geom(&mut self, index: usize, geom: GeomDef) {
        if let Some(body) = self.model_mut().bodies.get_mut(index) {
            body.geoms.push(geom);
        }
    }

    fn add_joint(&mut self, index: usize, e: &BytesStart, free: bool) -> Result<()> {
        let counter = self.joint_counters[index];
        let body = self.body_name(index).to_string();
        let joint = parse_joint_attrs(e, &body, counter, free)?;
        self.joint_counters[index] += 1;
        if let Some(b) = self.model_mut().bodies.get_mut(index) {
            b.joints.push(joint);
        }
        Ok(())
    }

    fn read_option(&mut self, e: &BytesStart) -> Result<()> {
        let timestep = parse_float_attr(e, "timestep", "", "option")?;
        let gravity = parse_vec3_attr(e, "gravity", "", "option")?;
        let model = self.model_mut();
        if timestep.is_some() {
            model.timestep = timestep;
        }
        if let Some(g) = gravity {
            model.gravity = g;
        }
        Ok(())
    }

    fn read_compiler(&mut self, e: &BytesStart) -> Result<()> {
        if let Some(angle) = get_attribute(e, "angle")? {
            self.model_mut().angle_unit = match angle.as_str() {
                "radian" => AngleUnit::Radian,
                "degree" => AngleUnit::Degree,
                _ => {
                    return Err(DescriptionError::invalid_attribute(
                        "", "compiler", "angle", angle,
                    ))
                }
            };
        }
        Ok(())
    }

    fn finish(self) -> Result<Description> {
        let mut model = self
            .model
            .ok_or_else(|| DescriptionError::XmlParse("document has no root element".into()))?;

        if model.angle_unit == AngleUnit::Degree {
            for joint in model.bodies.iter_mut().flat_map(|b| b.joints.iter_mut()) {
                if let JointKind::Hinge {
                    limits: Some((lo, hi)),
                    ..
                } = &mut joint.kind
                {
                    *lo = lo.to_radians();
                    *hi = hi.to_radians();
                }
            }
        }

        tracing::debug!(
            model = %model.name,
            bodies = model.bodies.len(),
            velocities = self.state.initial_velocities.len(),
            masses = self.state.link_masses.len(),
            "parsed description"
        );

        Ok(Description {
            model,
            initial_state: self.state,
        })
    }
}

/// Handle an opening tag; consumes everything up to the matching end tag.
fn parse_start<R: BufRead>(
    reader: &mut Reader<R>,
    e: &BytesStart,
    builder: &mut Builder,
    body: Option<usize>,
) -> Result<()> {
    let name = e.name().as_ref().to_vec();
    match (name.as_slice(), body) {
        (b"body", _) => parse_body(reader, e, builder, body),
        (b"velocity", Some(index)) => {
            let key = builder.body_name(index).to_string();
            let (spec, range) = parse_velocity(reader, &key)?;
            builder.set_velocity(index, spec, range)
        }
        (b"inertial", Some(index)) => parse_inertial(reader, builder, index),
        (b"geom", Some(index)) => {
            let key = builder.body_name(index).to_string();
            if let Some(geom) = parse_geom_attrs(e, &key)? {
                builder.add_geom(index, geom);
            }
            skip_element(reader, &name)
        }
        (b"joint", Some(index)) | (b"freejoint", Some(index)) => {
            builder.add_joint(index, e, name.as_slice() == b"freejoint")?;
            skip_element(reader, &name)
        }
        (b"option", _) => {
            builder.read_option(e)?;
            parse_container(reader, &name, builder, body)
        }
        (b"compiler", _) => {
            builder.read_compiler(e)?;
            skip_element(reader, &name)
        }
        _ => parse_container(reader, &name, builder, body),
    }
}

/// Handle a self-closing tag.
fn parse_empty(e: &BytesStart, builder: &mut Builder, body: Option<usize>) -> Result<()> {
    match (e.name().as_ref(), body) {
        (b"body", _) => {
            builder.begin_body(e, body)?;
        }
        (b"velocity", Some(index)) => {
            builder.set_velocity(index, BodyVelocitySpec::default(), VelocityRange::default())?;
        }
        (b"geom", Some(index)) => {
            let key = builder.body_name(index).to_string();
            if let Some(geom) = parse_geom_attrs(e, &key)? {
                builder.add_geom(index, geom);
            }
        }
        (b"joint", Some(index)) => builder.add_joint(index, e, false)?,
        (b"freejoint", Some(index)) => builder.add_joint(index, e, true)?,
        (b"option", _) => builder.read_option(e)?,
        (b"compiler", _) => builder.read_compiler(e)?,
        _ => {}
    }
    Ok(())
}

/// Walk the children of an element without interpreting it.
fn parse_container<R: BufRead>(
    reader: &mut Reader<R>,
    end: &[u8],
    builder: &mut Builder,
    body: Option<usize>,
) -> Result<()> {
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => parse_start(reader, e, builder, body)?,
            Ok(Event::Empty(ref e)) => parse_empty(e, builder, body)?,
            Ok(Event::End(ref e)) if e.name().as_ref() == end => break,
            Ok(Event::Eof) => return Err(unexpected_eof(end)),
            Ok(_) => {}
            Err(e) => return Err(DescriptionError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(())
}

/// Parse a body element and, recursively, everything nested in it.
fn parse_body<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart,
    builder: &mut Builder,
    parent: Option<usize>,
) -> Result<()> {
    let index = builder.begin_body(start, parent)?;
    parse_container(reader, b"body", builder, Some(index))
}

/// Parse a `velocity` element with optional `linear` and `angular` children.
fn parse_velocity<R: BufRead>(
    reader: &mut Reader<R>,
    body: &str,
) -> Result<(BodyVelocitySpec, VelocityRange)> {
    let mut spec = BodyVelocitySpec::default();
    let mut range = VelocityRange::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                read_velocity_child(e, body, &mut spec, &mut range)?;
                skip_element(reader, &name)?;
            }
            Ok(Event::Empty(ref e)) => read_velocity_child(e, body, &mut spec, &mut range)?,
            Ok(Event::End(ref e)) if e.name().as_ref() == b"velocity" => break,
            Ok(Event::Eof) => return Err(unexpected_eof(b"velocity")),
            Ok(_) => {}
            Err(e) => return Err(DescriptionError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok((spec, range))
}

fn read_velocity_child(
    e: &BytesStart,
    body: &str,
    spec: &mut BodyVelocitySpec,
    range: &mut VelocityRange,
) -> Result<()> {
    match e.name().as_ref() {
        b"linear" => (spec.linear, range.linear) = parse_axes(e, body, "linear")?,
        b"angular" => (spec.angular, range.angular) = parse_axes(e, body, "angular")?,
        _ => {}
    }
    Ok(())
}

/// Parse an `inertial` element; only its `inertia` child is read.
fn parse_inertial<R: BufRead>(reader: &mut Reader<R>, builder: &mut Builder, index: usize) -> Result<()> {
    let body = builder.body_name(index).to_string();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                if name.as_slice() == b"inertia" {
                    let (mass, max_mass) = parse_inertia_attrs(e, &body)?;
                    builder.set_mass(index, mass, max_mass)?;
                }
                skip_element(reader, &name)?;
            }
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"inertia" {
                    let (mass, max_mass) = parse_inertia_attrs(e, &body)?;
                    builder.set_mass(index, mass, max_mass)?;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"inertial" => break,
            Ok(Event::Eof) => return Err(unexpected_eof(b"inertial")),
            Ok(_) => {}
            Err(e) => return Err(DescriptionError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(())
}

/// Read `mass` and `maxmass`, each defaulting to 1.0.
fn parse_inertia_attrs(e: &BytesStart, body: &str) -> Result<(f64, f64)> {
    let mass = parse_float_attr(e, "mass", body, "inertia")?.unwrap_or(DEFAULT_MASS);
    let max_mass = parse_float_attr(e, "maxmass", body, "inertia")?.unwrap_or(DEFAULT_MAX_MASS);
    Ok((mass, max_mass))
}

/// Read the mandatory `x`, `y`, `z` attributes and the optional range bounds.
fn parse_axes(e: &BytesStart, body: &str, element: &'static str) -> Result<(Vec3, AxisRange)> {
    let mut v = [0.0; 3];
    for (slot, axis) in v.iter_mut().zip(Axis::ALL) {
        let attribute = axis.as_str();
        *slot = parse_float_attr(e, attribute, body, element)?
            .ok_or_else(|| DescriptionError::missing_attribute(body, element, attribute))?;
    }

    let mut bounds = [0.0; 6];
    for (slot, (attribute, default)) in bounds.iter_mut().zip(RANGE_ATTRIBUTES) {
        *slot = parse_float_attr(e, attribute, body, element)?.unwrap_or(default);
    }
    let range = AxisRange {
        xmin: bounds[0],
        xmax: bounds[1],
        ymin: bounds[2],
        ymax: bounds[3],
        zmin: bounds[4],
        zmax: bounds[5],
    };

    Ok((Vec3::from(v), range))
}

/// Parse geom attributes. Returns `None` for shapes that carry no mass
/// (planes) or that are not supported.
fn parse_geom_attrs(e: &BytesStart, body: &str) -> Result<Option<GeomDef>> {
    let geom_type = get_attribute(e, "type")?.unwrap_or_else(|| "sphere".to_string());
    let size = parse_float_list_attr(e, "size", body, "geom")?;
    let fromto = parse_float_list_attr(e, "fromto", body, "geom")?;
    let pos = parse_vec3_attr(e, "pos", body, "geom")?.unwrap_or_default();
    let density = parse_float_attr(e, "density", body, "geom")?.unwrap_or(DEFAULT_GEOM_DENSITY);

    let size_at = |i: usize| -> Result<f64> {
        match &size {
            None => Err(DescriptionError::missing_attribute(body, "geom", "size")),
            Some(values) => values.get(i).copied().ok_or_else(|| {
                DescriptionError::invalid_attribute(body, "geom", "size", format!("{values:?}"))
            }),
        }
    };

    let segment = |radius: f64| -> Result<(Vec3, Vec3, f64)> {
        match &fromto {
            Some(ft) if ft.len() == 6 => Ok((
                Vec3::new(ft[0], ft[1], ft[2]),
                Vec3::new(ft[3], ft[4], ft[5]),
                radius,
            )),
            Some(ft) => Err(DescriptionError::invalid_attribute(
                body,
                "geom",
                "fromto",
                format!("{ft:?}"),
            )),
            None => {
                let half = size_at(1)?;
                Ok((
                    pos.add(Vec3::new(0.0, 0.0, -half)),
                    pos.add(Vec3::new(0.0, 0.0, half)),
                    radius,
                ))
            }
        }
    };

    let kind = match geom_type.as_str() {
        "sphere" => GeomKind::Sphere {
            radius: size_at(0)?,
        },
        "capsule" => {
            let (from, to, radius) = segment(size_at(0)?)?;
            GeomKind::Capsule { from, to, radius }
        }
        "cylinder" => {
            let (from, to, radius) = segment(size_at(0)?)?;
            GeomKind::Cylinder { from, to, radius }
        }
        "box" => GeomKind::Box {
            half_extents: Vec3::new(size_at(0)?, size_at(1)?, size_at(2)?),
        },
        "plane" => return Ok(None),
        other => {
            tracing::warn!("Skipping unsupported geom type '{}' on body '{}'", other, body);
            return Ok(None);
        }
    };

    Ok(Some(GeomDef {
        name: get_attribute(e, "name")?,
        kind,
        pos,
        density,
    }))
}

/// Parse joint (or freejoint) attributes.
fn parse_joint_attrs(e: &BytesStart, body: &str, counter: usize, free: bool) -> Result<JointDef> {
    let name = get_attribute(e, "name")?.unwrap_or_else(|| format!("{body}_joint{counter}"));
    let pos = parse_vec3_attr(e, "pos", body, "joint")?.unwrap_or_default();
    let axis = parse_vec3_attr(e, "axis", body, "joint")?.unwrap_or(Vec3::new(0.0, 0.0, 1.0));

    let limited = get_attribute(e, "limited")?.map_or(true, |v| v != "false");
    let limits = match parse_float_list_attr(e, "range", body, "joint")? {
        Some(r) if r.len() == 2 && limited => Some((r[0], r[1])),
        Some(r) if r.len() != 2 => {
            return Err(DescriptionError::invalid_attribute(
                body,
                "joint",
                "range",
                format!("{r:?}"),
            ))
        }
        _ => None,
    };

    let joint_type = if free {
        "free".to_string()
    } else {
        get_attribute(e, "type")?.unwrap_or_else(|| "hinge".to_string())
    };

    let kind = match joint_type.as_str() {
        "hinge" => JointKind::Hinge { axis, limits },
        "slide" => JointKind::Slide { axis, limits },
        "ball" => JointKind::Ball,
        "free" => JointKind::Free,
        _ => {
            return Err(DescriptionError::invalid_attribute(
                body, "joint", "type", joint_type,
            ))
        }
    };

    Ok(JointDef { name, kind, pos })
}

/// Get an attribute value, unescaped.
fn get_attribute(e: &BytesStart, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| DescriptionError::XmlParse(err.to_string()))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| DescriptionError::XmlParse(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Parse a finite float attribute; `None` when absent.
fn parse_float_attr(
    e: &BytesStart,
    attribute: &'static str,
    body: &str,
    element: &'static str,
) -> Result<Option<f64>> {
    match get_attribute(e, attribute)? {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(DescriptionError::invalid_attribute(
                body, element, attribute, raw,
            )),
        },
    }
}

/// Parse a whitespace-separated list of finite floats.
fn parse_float_list_attr(
    e: &BytesStart,
    attribute: &'static str,
    body: &str,
    element: &'static str,
) -> Result<Option<Vec<f64>>> {
    let Some(raw) = get_attribute(e, attribute)? else {
        return Ok(None);
    };
    let mut values = Vec::new();
    for part in raw.split_whitespace() {
        match part.parse::<f64>() {
            Ok(v) if v.is_finite() => values.push(v),
            _ => {
                return Err(DescriptionError::invalid_attribute(
                    body, element, attribute, raw,
                ))
            }
        }
    }
    Ok(Some(values))
}

/// Parse a three-component vector attribute.
fn parse_vec3_attr(
    e: &BytesStart,
    attribute: &'static str,
    body: &str,
    element: &'static str,
) -> Result<Option<Vec3>> {
    match parse_float_list_attr(e, attribute, body, element)? {
        None => Ok(None),
        Some(v) if v.len() == 3 => Ok(Some(Vec3::new(v[0], v[1], v[2]))),
        Some(v) => Err(DescriptionError::invalid_attribute(
            body,
            element,
            attribute,
            format!("{v:?}"),
        )),
    }
}

fn unexpected_eof(element: &[u8]) -> DescriptionError {
    DescriptionError::XmlParse(format!(
        "unexpected EOF in {}",
        String::from_utf8_lossy(element)
    ))
}

/// Skip an element and all its children.
fn skip_element<R: BufRead>(reader: &mut Reader<R>, name: &[u8]) -> Result<()> {
    let mut buf = Vec::new();
    let mut depth = 1;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == name => {
                depth += 1;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Ok(Event::Eof) => return Err(unexpected_eof(name)),
            Ok(_) => {}
            Err(e) => return Err(DescriptionError::XmlParse(e.to_string())),
        }
        buf.clear();
    }

    Ok(())
}

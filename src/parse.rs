//! OpenDRIVE document parsing and validation.
//!
//! Parses `.xodr` XML (roxmltree) or a JSON snapshot of the model into a
//! [`RoadNetwork`]. Loading is atomic: any structural violation rejects the
//! whole document with `Error::Validation` and nothing is returned.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use roxmltree::{Document, Node};

use crate::error::{Error, Result};
use crate::model::*;
use crate::profile::{Poly3, S_TOLERANCE};

/// Load a network from a `.xodr` or `.json` file.
pub fn load(path: &Path) -> Result<RoadNetwork> {
    let text = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("xodr") | Some("xml") => parse_xodr(&text),
        Some("json") => from_json(&text),
        other => Err(Error::Validation(format!(
            "unknown document extension {other:?}, expected .xodr or .json"
        ))),
    }
}

/// Parse an OpenDRIVE XML document.
pub fn parse_xodr(text: &str) -> Result<RoadNetwork> {
    let doc = Document::parse(text)?;
    let root = doc.root_element();

    let mut network = RoadNetwork::default();

    for node in root.children().filter(Node::is_element) {
        match node.tag_name().name() {
            "road" => {
                let road = parse_road(node, &mut network.signals)?;
                network.roads.insert(road.id.clone(), road);
            }
            "controller" => {
                let controller = parse_controller(node)?;
                network.controllers.insert(controller.id.clone(), controller);
            }
            "junction" => {
                let junction = parse_junction(node)?;
                network.junctions.insert(junction.id.clone(), junction);
            }
            "junctionGroup" => {
                let group = parse_junction_group(node)?;
                network.junction_groups.insert(group.id.clone(), group);
            }
            _ => {}
        }
    }

    validate(&network)?;
    debug!(
        "parsed {} roads, {} junctions, {} signals",
        network.roads.len(),
        network.junctions.len(),
        network.signals.len()
    );
    Ok(network)
}

/// Parse a JSON snapshot produced by [`to_json`]. The result is validated
/// the same way as an XML document.
pub fn from_json(text: &str) -> Result<RoadNetwork> {
    let network: RoadNetwork = serde_json::from_str(text)?;
    validate(&network)?;
    Ok(network)
}

pub fn to_json(network: &RoadNetwork) -> Result<String> {
    Ok(serde_json::to_string_pretty(network)?)
}

fn req_attr<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name).ok_or_else(|| {
        Error::Validation(format!(
            "<{}> is missing required attribute '{name}'",
            node.tag_name().name()
        ))
    })
}

fn req_f64(node: Node, name: &str) -> Result<f64> {
    let raw = req_attr(node, name)?;
    raw.trim().parse().map_err(|_| {
        Error::Validation(format!(
            "<{}> attribute '{name}' is not a number: '{raw}'",
            node.tag_name().name()
        ))
    })
}

fn opt_f64(node: Node, name: &str) -> Result<Option<f64>> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Error::Validation(format!(
                "<{}> attribute '{name}' is not a number: '{raw}'",
                node.tag_name().name()
            ))
        }),
    }
}

fn req_i32(node: Node, name: &str) -> Result<i32> {
    let raw = req_attr(node, name)?;
    raw.trim().parse().map_err(|_| {
        Error::Validation(format!(
            "<{}> attribute '{name}' is not an integer: '{raw}'",
            node.tag_name().name()
        ))
    })
}

fn children<'a, 'd: 'a>(node: Node<'a, 'd>, name: &'a str) -> impl Iterator<Item = Node<'a, 'd>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn child<'a, 'd: 'a>(node: Node<'a, 'd>, name: &str) -> Option<Node<'a, 'd>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn parse_poly(node: Node) -> Result<Poly3> {
    Ok(Poly3::new(
        req_f64(node, "a")?,
        req_f64(node, "b")?,
        req_f64(node, "c")?,
        req_f64(node, "d")?,
    ))
}

fn parse_contact_point(raw: &str) -> Result<ContactPoint> {
    match raw {
        "start" => Ok(ContactPoint::Start),
        "end" => Ok(ContactPoint::End),
        other => Err(Error::Validation(format!("invalid contactPoint '{other}'"))),
    }
}

fn parse_road_link(node: Node) -> Result<RoadLink> {
    let element_type = match req_attr(node, "elementType")? {
        "road" => ElementType::Road,
        "junction" => ElementType::Junction,
        other => {
            return Err(Error::Validation(format!(
                "invalid link elementType '{other}'"
            )))
        }
    };
    let contact_point = node
        .attribute("contactPoint")
        .map(parse_contact_point)
        .transpose()?;
    Ok(RoadLink {
        element_type,
        element_id: req_attr(node, "elementId")?.to_string(),
        contact_point,
    })
}

fn parse_road(node: Node, signals: &mut BTreeMap<String, Signal>) -> Result<Road> {
    let id = req_attr(node, "id")?.to_string();

    let mut road = Road {
        id: id.clone(),
        name: node.attribute("name").unwrap_or_default().to_string(),
        length: req_f64(node, "length")?,
        junction: req_attr(node, "junction")?.to_string(),
        predecessor: None,
        successor: None,
        neighbors: Vec::new(),
        geometry: Vec::new(),
        elevations: Vec::new(),
        superelevations: Vec::new(),
        crossfalls: Vec::new(),
        shapes: Vec::new(),
        lane_offsets: Vec::new(),
        lane_sections: Vec::new(),
        signal_ids: Vec::new(),
        signal_references: Vec::new(),
    };

    if let Some(link) = child(node, "link") {
        if let Some(n) = child(link, "predecessor") {
            road.predecessor = Some(parse_road_link(n)?);
        }
        if let Some(n) = child(link, "successor") {
            road.successor = Some(parse_road_link(n)?);
        }
        for n in children(link, "neighbor") {
            road.neighbors.push(Neighbor {
                side: req_attr(n, "side")?.to_string(),
                element_id: req_attr(n, "elementId")?.to_string(),
                direction: req_attr(n, "direction")?.to_string(),
            });
        }
    }

    if let Some(plan_view) = child(node, "planView") {
        for n in children(plan_view, "geometry") {
            road.geometry.push(parse_geometry(n)?);
        }
    }

    if let Some(profile) = child(node, "elevationProfile") {
        for n in children(profile, "elevation") {
            road.elevations.push(ElevationRecord {
                s: req_f64(n, "s")?,
                poly: parse_poly(n)?,
            });
        }
    }

    if let Some(profile) = child(node, "lateralProfile") {
        for n in children(profile, "superelevation") {
            road.superelevations.push(SuperelevationRecord {
                s: req_f64(n, "s")?,
                poly: parse_poly(n)?,
            });
        }
        for n in children(profile, "crossfall") {
            let side = match n.attribute("side").unwrap_or("both") {
                "left" => CrossfallSide::Left,
                "right" => CrossfallSide::Right,
                "both" => CrossfallSide::Both,
                other => {
                    return Err(Error::Validation(format!(
                        "invalid crossfall side '{other}'"
                    )))
                }
            };
            road.crossfalls.push(CrossfallRecord {
                side,
                s: req_f64(n, "s")?,
                poly: parse_poly(n)?,
            });
        }
        for n in children(profile, "shape") {
            road.shapes.push(ShapeRecord {
                s: req_f64(n, "s")?,
                t: req_f64(n, "t")?,
                poly: parse_poly(n)?,
            });
        }
    }

    if let Some(lanes) = child(node, "lanes") {
        for n in children(lanes, "laneOffset") {
            road.lane_offsets.push(LaneOffsetRecord {
                s: req_f64(n, "s")?,
                poly: parse_poly(n)?,
            });
        }
        for n in children(lanes, "laneSection") {
            road.lane_sections.push(parse_lane_section(n)?);
        }
    }

    if let Some(signals_node) = child(node, "signals") {
        for n in children(signals_node, "signal") {
            let signal = parse_signal(n, &id)?;
            road.signal_ids.push(signal.id.clone());
            signals.insert(signal.id.clone(), signal);
        }
        for n in children(signals_node, "signalReference") {
            road.signal_references.push(SignalReference {
                s: req_f64(n, "s")?,
                t: req_f64(n, "t")?,
                signal_id: req_attr(n, "id")?.to_string(),
                orientation: req_attr(n, "orientation")?.to_string(),
                validities: parse_validities(n)?,
            });
        }
    }

    Ok(road)
}

fn parse_geometry(node: Node) -> Result<GeometryRecord> {
    let shape = node
        .children()
        .find(Node::is_element)
        .ok_or_else(|| Error::Validation("<geometry> has no shape element".to_string()))?;

    let kind = match shape.tag_name().name() {
        "line" => GeometryKind::Line,
        "spiral" => GeometryKind::Spiral {
            curv_start: req_f64(shape, "curvStart")?,
            curv_end: req_f64(shape, "curvEnd")?,
        },
        "arc" => GeometryKind::Arc {
            curvature: req_f64(shape, "curvature")?,
        },
        other => {
            return Err(Error::Validation(format!(
                "invalid geometry type '{other}'"
            )))
        }
    };

    Ok(GeometryRecord {
        s: req_f64(node, "s")?,
        x: req_f64(node, "x")?,
        y: req_f64(node, "y")?,
        hdg: req_f64(node, "hdg")?,
        length: req_f64(node, "length")?,
        kind,
    })
}

fn parse_lane_section(node: Node) -> Result<LaneSection> {
    let mut lanes = Vec::new();
    // lanes sit under <left>/<center>/<right> side groups
    for group in node.children().filter(Node::is_element) {
        for n in children(group, "lane") {
            lanes.push(parse_lane(n)?);
        }
    }

    Ok(LaneSection {
        s: req_f64(node, "s")?,
        single_side: node.attribute("singleSide") == Some("true"),
        lanes,
    })
}

fn parse_lane(node: Node) -> Result<Lane> {
    let mut lane = Lane {
        id: req_i32(node, "id")?,
        kind: req_attr(node, "type")?.to_string(),
        level: node.attribute("level") == Some("true"),
        predecessor: None,
        successor: None,
        widths: Vec::new(),
        borders: Vec::new(),
        road_marks: Vec::new(),
        materials: Vec::new(),
        visibilities: Vec::new(),
        speeds: Vec::new(),
        accesses: Vec::new(),
        heights: Vec::new(),
        rules: Vec::new(),
    };

    if let Some(link) = child(node, "link") {
        if let Some(n) = child(link, "predecessor") {
            lane.predecessor = Some(req_i32(n, "id")?);
        }
        if let Some(n) = child(link, "successor") {
            lane.successor = Some(req_i32(n, "id")?);
        }
    }

    for n in children(node, "width") {
        lane.widths.push(WidthRecord {
            s_offset: req_f64(n, "sOffset")?,
            poly: parse_poly(n)?,
        });
    }
    // if both <width> and <border> are present, width prevails downstream
    for n in children(node, "border") {
        lane.borders.push(WidthRecord {
            s_offset: req_f64(n, "sOffset")?,
            poly: parse_poly(n)?,
        });
    }
    for n in children(node, "roadMark") {
        lane.road_marks.push(RoadMarkRecord {
            s_offset: req_f64(n, "sOffset")?,
            kind: req_attr(n, "type")?.to_string(),
            weight: n.attribute("weight").unwrap_or_default().to_string(),
            color: n.attribute("color").unwrap_or_default().to_string(),
            material: n.attribute("material").map(str::to_string),
            width: opt_f64(n, "width")?.unwrap_or(0.0),
            lane_change: n.attribute("laneChange").unwrap_or("both").to_string(),
            height: opt_f64(n, "height")?.unwrap_or(0.0),
        });
    }
    for n in children(node, "material") {
        lane.materials.push(MaterialRecord {
            s_offset: req_f64(n, "sOffset")?,
            surface: n.attribute("surface").unwrap_or_default().to_string(),
            friction: req_f64(n, "friction")?,
            roughness: opt_f64(n, "roughness")?.unwrap_or(0.0),
        });
    }
    for n in children(node, "visibility") {
        lane.visibilities.push(VisibilityRecord {
            s_offset: req_f64(n, "sOffset")?,
            forward: req_f64(n, "forward")?,
            back: req_f64(n, "back")?,
            left: req_f64(n, "left")?,
            right: req_f64(n, "right")?,
        });
    }
    for n in children(node, "speed") {
        lane.speeds.push(SpeedRecord {
            s_offset: req_f64(n, "sOffset")?,
            max: req_f64(n, "max")?,
            unit: n.attribute("unit").unwrap_or("m/s").to_string(),
        });
    }
    for n in children(node, "access") {
        lane.accesses.push(AccessRecord {
            s_offset: req_f64(n, "sOffset")?,
            restriction: req_attr(n, "restriction")?.to_string(),
        });
    }
    for n in children(node, "height") {
        lane.heights.push(LaneHeightRecord {
            s_offset: req_f64(n, "sOffset")?,
            inner: opt_f64(n, "inner")?.unwrap_or(0.0),
            outer: opt_f64(n, "outer")?.unwrap_or(0.0),
        });
    }
    for n in children(node, "rule") {
        lane.rules.push(RuleRecord {
            s_offset: req_f64(n, "sOffset")?,
            value: req_attr(n, "value")?.to_string(),
        });
    }

    Ok(lane)
}

fn parse_validities(node: Node) -> Result<Vec<LaneValidity>> {
    let mut validities = Vec::new();
    for n in children(node, "validity") {
        validities.push(LaneValidity {
            from_lane: req_i32(n, "fromLane")?,
            to_lane: req_i32(n, "toLane")?,
        });
    }
    Ok(validities)
}

fn parse_signal(node: Node, road_id: &str) -> Result<Signal> {
    let raw_id = req_attr(node, "id")?;
    let name = node.attribute("name").unwrap_or_default().to_string();
    // signal ids may repeat across roads; namespace unnamed signals
    let id = if name.trim().is_empty() {
        format!("{road_id}.{raw_id}")
    } else {
        raw_id.to_string()
    };

    let mut dependencies = Vec::new();
    for n in children(node, "dependency") {
        dependencies.push(SignalDependency {
            id: req_attr(n, "id")?.to_string(),
            kind: n.attribute("type").unwrap_or_default().to_string(),
        });
    }

    Ok(Signal {
        id,
        name,
        road_id: road_id.to_string(),
        s: req_f64(node, "s")?,
        t: req_f64(node, "t")?,
        dynamic: node.attribute("dynamic") == Some("yes"),
        orientation: req_attr(node, "orientation")?.to_string(),
        z_offset: req_f64(node, "zOffset")?,
        country: node.attribute("country").map(str::to_string),
        kind: req_attr(node, "type")?.to_string(),
        subtype: node.attribute("subtype").unwrap_or_default().to_string(),
        value: opt_f64(node, "value")?.unwrap_or(0.0),
        unit: node.attribute("unit").map(str::to_string),
        height: opt_f64(node, "height")?,
        width: opt_f64(node, "width")?,
        text: node.attribute("text").map(str::to_string),
        h_offset: opt_f64(node, "hOffset")?,
        pitch: opt_f64(node, "pitch")?,
        roll: opt_f64(node, "roll")?,
        validities: parse_validities(node)?,
        dependencies,
    })
}

fn parse_controller(node: Node) -> Result<Controller> {
    let mut controls = Vec::new();
    for n in children(node, "control") {
        controls.push(Control {
            signal_id: req_attr(n, "signalId")?.to_string(),
            kind: n.attribute("type").unwrap_or_default().to_string(),
        });
    }

    Ok(Controller {
        id: req_attr(node, "id")?.to_string(),
        name: node.attribute("name").unwrap_or_default().to_string(),
        sequence: node
            .attribute("sequence")
            .map(|v| v.parse().unwrap_or(-1))
            .unwrap_or(-1),
        controls,
    })
}

fn parse_junction(node: Node) -> Result<Junction> {
    let mut connections = Vec::new();
    for n in children(node, "connection") {
        let mut lane_links = Vec::new();
        for link in children(n, "laneLink") {
            lane_links.push(LaneLink {
                from: req_i32(link, "from")?,
                to: req_i32(link, "to")?,
            });
        }
        connections.push(Connection {
            id: req_attr(n, "id")?.to_string(),
            incoming_road: req_attr(n, "incomingRoad")?.to_string(),
            connecting_road: req_attr(n, "connectingRoad")?.to_string(),
            contact_point: n
                .attribute("contactPoint")
                .map(parse_contact_point)
                .transpose()?,
            lane_links,
        });
    }

    let mut priorities = Vec::new();
    for n in children(node, "priority") {
        priorities.push(JunctionPriority {
            high: n.attribute("high").unwrap_or_default().to_string(),
            low: n.attribute("low").unwrap_or_default().to_string(),
        });
    }

    let mut controllers = Vec::new();
    for n in children(node, "controller") {
        controllers.push(JunctionController {
            id: req_attr(n, "id")?.to_string(),
            kind: n.attribute("type").unwrap_or_default().to_string(),
            sequence: n
                .attribute("sequence")
                .map(|v| v.parse().unwrap_or(-1))
                .unwrap_or(-1),
        });
    }

    Ok(Junction {
        id: req_attr(node, "id")?.to_string(),
        name: node.attribute("name").unwrap_or_default().to_string(),
        connections,
        priorities,
        controllers,
    })
}

fn parse_junction_group(node: Node) -> Result<JunctionGroup> {
    let mut junction_refs = Vec::new();
    for n in children(node, "junctionReference") {
        junction_refs.push(req_attr(n, "junction")?.to_string());
    }

    Ok(JunctionGroup {
        id: req_attr(node, "id")?.to_string(),
        name: node.attribute("name").unwrap_or_default().to_string(),
        kind: node.attribute("type").unwrap_or_default().to_string(),
        junction_refs,
    })
}

/// Structural validation, fail-fast. The rules mirror what downstream
/// geometry resolution relies on.
pub fn validate(network: &RoadNetwork) -> Result<()> {
    for (key, road) in &network.roads {
        if key != &road.id {
            return Err(Error::Validation(format!(
                "road map key '{key}' does not match road id '{}'",
                road.id
            )));
        }
        validate_road(road)?;
    }
    Ok(())
}

fn validate_road(road: &Road) -> Result<()> {
    let id = &road.id;

    match road.id.parse::<i64>() {
        Ok(n) if n >= 0 => {}
        _ => {
            return Err(Error::Validation(format!(
                "road id '{id}' is not a non-negative numeric string"
            )))
        }
    }

    if !(road.length > 0.0) {
        return Err(Error::Validation(format!(
            "road#{id} length {} must be positive",
            road.length
        )));
    }

    if road.geometry.is_empty() {
        return Err(Error::Validation(format!("road#{id} has no geometry")));
    }
    if road.lane_sections.is_empty() {
        return Err(Error::Validation(format!("road#{id} has no lane sections")));
    }

    for (i, geometry) in road.geometry.iter().enumerate() {
        for (name, value) in [
            ("s", geometry.s),
            ("x", geometry.x),
            ("y", geometry.y),
            ("hdg", geometry.hdg),
            ("length", geometry.length),
        ] {
            if !value.is_finite() {
                return Err(Error::Validation(format!(
                    "road#{id} geometry#{i} attribute '{name}' is not finite"
                )));
            }
        }
        if geometry.length < 0.0 {
            return Err(Error::Validation(format!(
                "road#{id} geometry#{i} has negative length"
            )));
        }
    }

    let end = road.end_s();
    if (road.length - end).abs() > S_TOLERANCE {
        return Err(Error::Validation(format!(
            "road#{id} length {} does not match geometry total length {end}",
            road.length
        )));
    }

    for (i, section) in road.lane_sections.iter().enumerate() {
        if (section.s - road.length).abs() < S_TOLERANCE {
            return Err(Error::Validation(format!(
                "road#{id} laneSection#{i} starts at the road end"
            )));
        }
        if section.lanes.is_empty() {
            return Err(Error::Validation(format!(
                "road#{id} laneSection#{i} has no lanes"
            )));
        }
        for lane in &section.lanes {
            if lane.id != 0 && lane.widths.is_empty() && lane.borders.is_empty() {
                return Err(Error::Validation(format!(
                    "road#{id} laneSection#{i} lane#{} has no width or border record",
                    lane.id
                )));
            }
        }
    }

    Ok(())
}

//! Entity model for an OpenDRIVE road network.
//!
//! Every type serializes with serde and round-trips through JSON exactly.
//! Maps are `BTreeMap` keyed by entity id so serialized output is
//! deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::profile::{Poly3, SRecord};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoadNetwork {
    pub roads: BTreeMap<String, Road>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub signals: BTreeMap<String, Signal>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub controllers: BTreeMap<String, Controller>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub junctions: BTreeMap<String, Junction>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub junction_groups: BTreeMap<String, JunctionGroup>,
}

impl RoadNetwork {
    pub fn has_road(&self, road_id: &str) -> bool {
        self.roads.contains_key(road_id)
    }

    pub fn road_ids(&self) -> Vec<&str> {
        self.roads.keys().map(String::as_str).collect()
    }

    pub fn roads_count(&self) -> usize {
        self.roads.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Road {
    pub id: String,
    pub name: String,
    pub length: f64,
    /// Id of the junction this road belongs to, `"-1"` for none.
    pub junction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessor: Option<RoadLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successor: Option<RoadLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<Neighbor>,
    pub geometry: Vec<GeometryRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elevations: Vec<ElevationRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub superelevations: Vec<SuperelevationRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crossfalls: Vec<CrossfallRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shapes: Vec<ShapeRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lane_offsets: Vec<LaneOffsetRecord>,
    pub lane_sections: Vec<LaneSection>,
    /// Ids into [`RoadNetwork::signals`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signal_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signal_references: Vec<SignalReference>,
}

impl Road {
    /// End of the reference line: start plus length of the last geometry
    /// record. Matches `length` within tolerance on a validated road.
    pub fn end_s(&self) -> f64 {
        self.geometry
            .last()
            .map(|g| g.s + g.length)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Road,
    Junction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactPoint {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadLink {
    pub element_type: ElementType,
    pub element_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_point: Option<ContactPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub side: String,
    pub element_id: String,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryRecord {
    pub s: f64,
    pub x: f64,
    pub y: f64,
    pub hdg: f64,
    pub length: f64,
    pub kind: GeometryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Line,
    Spiral { curv_start: f64, curv_end: f64 },
    Arc { curvature: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationRecord {
    pub s: f64,
    #[serde(flatten)]
    pub poly: Poly3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperelevationRecord {
    pub s: f64,
    #[serde(flatten)]
    pub poly: Poly3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossfallSide {
    Left,
    Right,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossfallRecord {
    pub side: CrossfallSide,
    pub s: f64,
    #[serde(flatten)]
    pub poly: Poly3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    pub s: f64,
    pub t: f64,
    #[serde(flatten)]
    pub poly: Poly3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneOffsetRecord {
    pub s: f64,
    #[serde(flatten)]
    pub poly: Poly3,
}

macro_rules! impl_s_record {
    ($($ty:ty),+) => {
        $(impl SRecord for $ty {
            fn start(&self) -> f64 {
                self.s
            }
            fn poly(&self) -> Poly3 {
                self.poly
            }
            fn rebased(&self, s: f64) -> Self {
                let mut record = self.clone();
                record.poly = self.poly.shifted(s - self.s);
                record.s = s;
                record
            }
        })+
    };
}

impl_s_record!(ElevationRecord, SuperelevationRecord, CrossfallRecord, LaneOffsetRecord);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneSection {
    pub s: f64,
    #[serde(default)]
    pub single_side: bool,
    pub lanes: Vec<Lane>,
}

impl LaneSection {
    /// Center lane (id 0), if present.
    pub fn center_lane(&self) -> Option<&Lane> {
        self.lanes.iter().find(|l| l.id == 0)
    }

    /// Lanes on one side of the reference line, sorted by |id| ascending
    /// so a fold visits them inside out.
    pub fn side_lanes(&self, left: bool) -> Vec<&Lane> {
        let mut lanes: Vec<&Lane> = self
            .lanes
            .iter()
            .filter(|l| if left { l.id > 0 } else { l.id < 0 })
            .collect();
        lanes.sort_by_key(|l| l.id.abs());
        lanes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    /// 0 for the center lane, positive left, negative right.
    pub id: i32,
    pub kind: String,
    #[serde(default)]
    pub level: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessor: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successor: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub widths: Vec<WidthRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub borders: Vec<WidthRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub road_marks: Vec<RoadMarkRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub materials: Vec<MaterialRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visibilities: Vec<VisibilityRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub speeds: Vec<SpeedRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accesses: Vec<AccessRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub heights: Vec<LaneHeightRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleRecord>,
}

/// Width and border records share a shape: a cubic anchored at an sOffset
/// within the lane section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidthRecord {
    pub s_offset: f64,
    #[serde(flatten)]
    pub poly: Poly3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadMarkRecord {
    pub s_offset: f64,
    pub kind: String,
    pub weight: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    pub width: f64,
    pub lane_change: String,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRecord {
    pub s_offset: f64,
    pub surface: String,
    pub friction: f64,
    pub roughness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityRecord {
    pub s_offset: f64,
    pub forward: f64,
    pub back: f64,
    pub left: f64,
    pub right: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedRecord {
    pub s_offset: f64,
    pub max: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub s_offset: f64,
    pub restriction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneHeightRecord {
    pub s_offset: f64,
    pub inner: f64,
    pub outer: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub s_offset: f64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub name: String,
    /// Id of the road the signal is anchored to.
    pub road_id: String,
    pub s: f64,
    pub t: f64,
    pub dynamic: bool,
    /// `"+"`, `"-"` or `"none"` relative to the track direction.
    pub orientation: String,
    pub z_offset: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub kind: String,
    pub subtype: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validities: Vec<LaneValidity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<SignalDependency>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneValidity {
    pub from_lane: i32,
    pub to_lane: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDependency {
    pub id: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReference {
    pub s: f64,
    pub t: f64,
    pub signal_id: String,
    pub orientation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validities: Vec<LaneValidity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    pub id: String,
    pub name: String,
    /// Sequence number, -1 for none.
    pub sequence: i64,
    pub controls: Vec<Control>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub signal_id: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Junction {
    pub id: String,
    pub name: String,
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub priorities: Vec<JunctionPriority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controllers: Vec<JunctionController>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub incoming_road: String,
    pub connecting_road: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_point: Option<ContactPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lane_links: Vec<LaneLink>,
}

/// `from` is the incoming lane id, `to` the connecting lane id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneLink {
    pub from: i32,
    pub to: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionPriority {
    pub high: String,
    pub low: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionController {
    pub id: String,
    pub kind: String,
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionGroup {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub junction_refs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_lanes_sorted_inside_out() {
        let section = LaneSection {
            s: 0.0,
            single_side: false,
            lanes: vec![
                Lane { id: -2, ..lane_stub() },
                Lane { id: 1, ..lane_stub() },
                Lane { id: 0, ..lane_stub() },
                Lane { id: -1, ..lane_stub() },
                Lane { id: 2, ..lane_stub() },
            ],
        };

        let left: Vec<i32> = section.side_lanes(true).iter().map(|l| l.id).collect();
        let right: Vec<i32> = section.side_lanes(false).iter().map(|l| l.id).collect();
        assert_eq!(left, vec![1, 2]);
        assert_eq!(right, vec![-1, -2]);
        assert_eq!(section.center_lane().unwrap().id, 0);
    }

    fn lane_stub() -> Lane {
        Lane {
            id: 0,
            kind: "driving".to_string(),
            level: false,
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
        }
    }

    #[test]
    fn geometry_kind_json_round_trip() {
        let kinds = vec![
            GeometryKind::Line,
            GeometryKind::Spiral { curv_start: 0.0, curv_end: 0.013 },
            GeometryKind::Arc { curvature: -0.02 },
        ];
        let text = serde_json::to_string(&kinds).unwrap();
        let back: Vec<GeometryKind> = serde_json::from_str(&text).unwrap();
        assert_eq!(kinds, back);
    }
}

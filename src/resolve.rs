//! Reference-line resolution: lane-offset subdivision, end-position
//! assignment and range extraction.
//!
//! Lane-offset records bend the paved reference line away from the plan-view
//! geometry, so each geometry record is split at lane-offset starts into
//! sub-segments carrying at most one offset polynomial. Only straight
//! geometry supports a bent offset; a non-zero offset over an arc or spiral
//! is refused outright.

use std::collections::BTreeMap;

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, Error, Result};
use crate::model::{ContactPoint, ElementType, GeometryKind, GeometryRecord, LaneOffsetRecord, Road, RoadNetwork};
use crate::profile::{Poly3, S_TOLERANCE};
use crate::sample::{spiral_points, ProfileSlice};

/// A resolved reference-line sub-segment. `x, y` start the paved line
/// (shifted by the offset where one applies); `central_x, central_y` start
/// the unshifted plan-view line. `ex, ey` is the known true end point, used
/// for sampling error correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefSegment {
    pub s: f64,
    pub x: f64,
    pub y: f64,
    pub hdg: f64,
    pub length: f64,
    pub kind: GeometryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Poly3>,
    pub central_x: f64,
    pub central_y: f64,
    pub central_length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ex: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ey: Option<f64>,
}

impl RefSegment {
    fn from_record(record: &GeometryRecord) -> Self {
        RefSegment {
            s: record.s,
            x: record.x,
            y: record.y,
            hdg: record.hdg,
            length: record.length,
            kind: record.kind,
            offset: None,
            central_x: record.x,
            central_y: record.y,
            central_length: record.length,
            ex: None,
            ey: None,
        }
    }

    pub fn end(&self) -> f64 {
        self.s + self.length
    }
}

/// Split a road's geometry at lane-offset record starts.
pub fn subdivide(road: &Road) -> Result<Vec<RefSegment>> {
    let base: Vec<RefSegment> = road.geometry.iter().map(RefSegment::from_record).collect();
    if road.lane_offsets.is_empty() {
        return Ok(base);
    }

    let offsets = &road.lane_offsets;
    let road_end = road.end_s();
    let mut segments = Vec::new();
    let mut offset_id = 0usize;

    for geometry in &base {
        if geometry.kind != GeometryKind::Line {
            if let Some(record) = overlapping_offset(offsets, geometry, road_end) {
                return Err(Error::UnsupportedFeature(format!(
                    "road#{} has a lane offset at s={} over {:?} geometry at s={}",
                    road.id, record.s, geometry.kind, geometry.s
                )));
            }
            segments.push(geometry.clone());
            continue;
        }

        let mut found_head = false;

        for j in offset_id..offsets.len() {
            let offset = &offsets[j];
            let next_offset_s = offsets.get(j + 1).map(|o| o.s).unwrap_or(road_end);

            if geometry.end() <= offset.s {
                if !found_head {
                    segments.push(geometry.clone());
                }
                break;
            } else if offset.s > geometry.s {
                if !found_head {
                    found_head = true;
                    segments.push(RefSegment {
                        length: offset.s - geometry.s,
                        central_length: offset.s - geometry.s,
                        offset: None,
                        ..geometry.clone()
                    });
                }

                let s = offset.s;
                let length = geometry.end().min(next_offset_s) - s;
                let x = geometry.x + (s - geometry.s) * geometry.hdg.cos();
                let y = geometry.y + (s - geometry.s) * geometry.hdg.sin();
                segments.push(RefSegment {
                    s,
                    x,
                    y,
                    length,
                    central_x: x,
                    central_y: y,
                    central_length: length,
                    offset: active_poly(offset),
                    ..geometry.clone()
                });
                if next_offset_s <= geometry.end() {
                    offset_id += 1;
                }
            } else if offset.s == geometry.s {
                found_head = true;
                let length = geometry.end().min(next_offset_s) - offset.s;
                segments.push(RefSegment {
                    length,
                    central_length: length,
                    offset: active_poly(offset),
                    ..geometry.clone()
                });
                if next_offset_s <= geometry.end() {
                    offset_id += 1;
                }
            } else if offset.s < geometry.s && next_offset_s > geometry.s {
                if !found_head {
                    found_head = true;
                    let length = geometry.end().min(next_offset_s) - geometry.s;
                    // the record started earlier: re-anchor its polynomial
                    let poly = offset.poly.shifted(geometry.s - offset.s);
                    segments.push(RefSegment {
                        length,
                        central_length: length,
                        offset: if offset.poly.is_zero() { None } else { Some(poly) },
                        ..geometry.clone()
                    });
                }
                if next_offset_s <= geometry.end() {
                    offset_id += 1;
                }
            } else {
                break;
            }
        }
    }

    Ok(segments)
}

fn active_poly(record: &LaneOffsetRecord) -> Option<Poly3> {
    if record.poly.is_zero() {
        None
    } else {
        Some(record.poly)
    }
}

fn overlapping_offset<'a>(
    offsets: &'a [LaneOffsetRecord],
    geometry: &RefSegment,
    road_end: f64,
) -> Option<&'a LaneOffsetRecord> {
    offsets.iter().enumerate().find_map(|(j, offset)| {
        let next_s = offsets.get(j + 1).map(|o| o.s).unwrap_or(road_end);
        let overlaps = offset.s < geometry.end() && next_s > geometry.s;
        (overlaps && !offset.poly.is_zero()).then_some(offset)
    })
}

/// Subdivide a road and assign each sub-segment its true end position:
/// the next sub-segment's start, or the successor road's first geometry
/// when the roads meet at the successor's start.
pub fn resolve_road(roads: &BTreeMap<String, Road>, road_id: &str) -> Result<Vec<RefSegment>> {
    let road = roads
        .get(road_id)
        .ok_or_else(|| Error::Validation(format!("unknown road id '{road_id}'")))?;

    let mut segments = subdivide(road)?;

    let successor_start = match &road.successor {
        Some(link) if link.element_type == ElementType::Road => {
            let next = roads.get(&link.element_id).ok_or_else(|| {
                Error::Validation(format!(
                    "road#{road_id} successor road '{}' not found",
                    link.element_id
                ))
            })?;
            match link.contact_point {
                Some(ContactPoint::Start) => {
                    next.geometry.first().map(|g| (g.x, g.y))
                }
                _ => None,
            }
        }
        _ => None,
    };

    let starts: Vec<(f64, f64)> = segments.iter().map(|g| (g.x, g.y)).collect();
    for (i, segment) in segments.iter_mut().enumerate() {
        let end = starts.get(i + 1).copied().or(if i + 1 == starts.len() {
            successor_start
        } else {
            None
        });
        segment.ex = end.map(|(x, _)| x);
        segment.ey = end.map(|(_, y)| y);
    }

    Ok(segments)
}

/// Resolve every road, isolating failures: a road that cannot be resolved
/// is reported as a diagnostic and skipped.
pub fn resolve_network(
    network: &RoadNetwork,
) -> (BTreeMap<String, Vec<RefSegment>>, Vec<Diagnostic>) {
    let results: Vec<(String, Result<Vec<RefSegment>>)> = network
        .roads
        .par_iter()
        .map(|(id, _)| (id.clone(), resolve_road(&network.roads, id)))
        .collect();

    let mut resolved = BTreeMap::new();
    let mut diagnostics = Vec::new();
    for (id, result) in results {
        match result {
            Ok(segments) => {
                resolved.insert(id, segments);
            }
            Err(err) => diagnostics.push(Diagnostic::road(&id, err.to_string())),
        }
    }

    if !diagnostics.is_empty() {
        info!(
            "resolved {} roads, {} failed",
            resolved.len(),
            diagnostics.len()
        );
    }
    (resolved, diagnostics)
}

/// Extract the resolved segments covering `[s, es)`, trimming the first and
/// last segment to the range bounds.
pub fn segments_in_range(segments: &[RefSegment], s: f64, es: f64) -> Result<Vec<RefSegment>> {
    if s >= es + S_TOLERANCE {
        return Err(Error::Range(format!(
            "geometry range start {s} is not before end {es}"
        )));
    }

    let mut out = Vec::new();
    let mut found = false;

    for segment in segments {
        if found {
            if segment.end() <= es {
                out.push(segment.clone());
            } else if segment.s < es && (segment.s - es).abs() > S_TOLERANCE {
                out.push(trim_end(segment, es)?);
            } else {
                break;
            }
            continue;
        }

        if (segment.s - s).abs() < S_TOLERANCE {
            if segment.end() <= es {
                out.push(segment.clone());
            } else {
                out.push(trim_end(segment, es)?);
            }
            found = true;
        } else if segment.s < s && segment.end() > s {
            out.push(trim_start(segment, s, es)?);
            found = true;
        }
    }

    Ok(out)
}

/// Keep the segment's start, cut it short at `es`.
fn trim_end(segment: &RefSegment, es: f64) -> Result<RefSegment> {
    let length = es - segment.s;
    let mut out = RefSegment {
        length,
        central_length: length,
        ex: None,
        ey: None,
        ..segment.clone()
    };

    let (ex, ey) = match segment.kind {
        GeometryKind::Line => (
            out.x + length * out.hdg.cos(),
            out.y + length * out.hdg.sin(),
        ),
        GeometryKind::Arc { curvature } => arc_end(out.x, out.y, out.hdg, curvature, 0.0, length),
        GeometryKind::Spiral { curv_start, curv_end } => {
            let samples = spiral_points(
                segment.length,
                &ProfileSlice::default(),
                &[],
                segment.x,
                segment.y,
                segment.hdg,
                curv_start,
                curv_end,
                segment.ex.zip(segment.ey),
                None,
                Some((0.0, length)),
            );
            let last = samples
                .points
                .last()
                .ok_or_else(|| Error::Geometry("empty spiral sampling".to_string()))?;
            out.kind = partial_spiral(curv_start, curv_end, segment.length, 0.0, length);
            (last.x, last.y)
        }
    };
    out.ex = Some(ex);
    out.ey = Some(ey);
    Ok(out)
}

/// Start the segment mid-curve at `s`, covering at most `es`.
fn trim_start(segment: &RefSegment, s: f64, es: f64) -> Result<RefSegment> {
    if segment.offset.is_some() {
        // offsets start at lane-section boundaries; a range query landing
        // inside an offset segment would need a re-anchored polynomial
        return Err(Error::UnsupportedFeature(format!(
            "range starting at {s} inside an offset sub-segment at {}",
            segment.s
        )));
    }

    let ds = s - segment.s;
    let length = segment.end().min(es) - s;

    match segment.kind {
        GeometryKind::Line => {
            let x = segment.x + ds * segment.hdg.cos();
            let y = segment.y + ds * segment.hdg.sin();
            Ok(RefSegment {
                s,
                x,
                y,
                length,
                central_x: x,
                central_y: y,
                central_length: length,
                ex: Some(segment.x + (ds + length) * segment.hdg.cos()),
                ey: Some(segment.y + (ds + length) * segment.hdg.sin()),
                ..segment.clone()
            })
        }
        GeometryKind::Arc { curvature } => {
            let (x, y) = arc_end(segment.x, segment.y, segment.hdg, curvature, 0.0, ds);
            let hdg = segment.hdg + ds * curvature;
            let (ex, ey) = arc_end(segment.x, segment.y, segment.hdg, curvature, 0.0, ds + length);
            Ok(RefSegment {
                s,
                x,
                y,
                hdg,
                length,
                central_x: x,
                central_y: y,
                central_length: length,
                ex: Some(ex),
                ey: Some(ey),
                ..segment.clone()
            })
        }
        GeometryKind::Spiral { curv_start, curv_end } => {
            let samples = spiral_points(
                segment.length,
                &ProfileSlice::default(),
                &[],
                segment.x,
                segment.y,
                segment.hdg,
                curv_start,
                curv_end,
                segment.ex.zip(segment.ey),
                None,
                Some((ds, length)),
            );
            let (first, last) = samples
                .points
                .first()
                .zip(samples.points.last())
                .ok_or_else(|| Error::Geometry("empty spiral sampling".to_string()))?;
            Ok(RefSegment {
                s,
                x: first.x,
                y: first.y,
                hdg: samples.headings[0],
                length,
                kind: partial_spiral(curv_start, curv_end, segment.length, ds, length),
                central_x: first.x,
                central_y: first.y,
                central_length: length,
                ex: Some(last.x),
                ey: Some(last.y),
                ..segment.clone()
            })
        }
    }
}

/// Closed-form arc end point after advancing `to - from` along the curve.
pub fn arc_end(x: f64, y: f64, hdg: f64, curvature: f64, from: f64, to: f64) -> (f64, f64) {
    let radius = 1.0 / curvature.abs();
    let rotation = hdg - curvature.signum() * std::f64::consts::FRAC_PI_2;
    let theta_from = from * curvature;
    let theta_to = to * curvature;
    (
        x - radius * (rotation + theta_from).cos() + radius * (rotation + theta_to).cos(),
        y - radius * (rotation + theta_from).sin() + radius * (rotation + theta_to).sin(),
    )
}

fn partial_spiral(curv_start: f64, curv_end: f64, length: f64, ds: f64, sub_length: f64) -> GeometryKind {
    let rate = (curv_end - curv_start) / length;
    GeometryKind::Spiral {
        curv_start: curv_start + ds * rate,
        curv_end: curv_start + (ds + sub_length) * rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LaneSection, RoadLink};

    fn line_road(id: &str, length: f64) -> Road {
        Road {
            id: id.to_string(),
            name: String::new(),
            length,
            junction: "-1".to_string(),
            predecessor: None,
            successor: None,
            neighbors: Vec::new(),
            geometry: vec![GeometryRecord {
                s: 0.0,
                x: 0.0,
                y: 0.0,
                hdg: 0.0,
                length,
                kind: GeometryKind::Line,
            }],
            elevations: Vec::new(),
            superelevations: Vec::new(),
            crossfalls: Vec::new(),
            shapes: Vec::new(),
            lane_offsets: Vec::new(),
            lane_sections: vec![LaneSection { s: 0.0, single_side: false, lanes: Vec::new() }],
            signal_ids: Vec::new(),
            signal_references: Vec::new(),
        }
    }

    #[test]
    fn subdivision_splits_at_offset_start() {
        let mut road = line_road("1", 10.0);
        road.lane_offsets = vec![LaneOffsetRecord {
            s: 4.0,
            poly: Poly3::new(1.0, 0.0, 0.0, 0.0),
        }];

        let segments = subdivide(&road).unwrap();
        assert_eq!(segments.len(), 2);

        assert_eq!(segments[0].s, 0.0);
        assert_eq!(segments[0].length, 4.0);
        assert!(segments[0].offset.is_none());

        assert_eq!(segments[1].s, 4.0);
        assert_eq!(segments[1].length, 6.0);
        assert_eq!(segments[1].x, 4.0);
        assert_eq!(segments[1].offset.unwrap().a, 1.0);
    }

    #[test]
    fn offset_starting_before_geometry_is_rebased() {
        let mut road = line_road("1", 10.0);
        road.geometry = vec![
            GeometryRecord { s: 0.0, x: 0.0, y: 0.0, hdg: 0.0, length: 6.0, kind: GeometryKind::Line },
            GeometryRecord { s: 6.0, x: 6.0, y: 0.0, hdg: 0.0, length: 4.0, kind: GeometryKind::Line },
        ];
        road.lane_offsets = vec![LaneOffsetRecord {
            s: 2.0,
            poly: Poly3::new(0.0, 0.5, 0.0, 0.0),
        }];

        let segments = subdivide(&road).unwrap();
        assert_eq!(segments.len(), 3);

        // second geometry starts 4 m into the offset record: a' = 0.5 * 4
        let rebased = segments[2].offset.unwrap();
        assert!((rebased.a - 2.0).abs() < 1e-12);
        assert!((rebased.b - 0.5).abs() < 1e-12);
    }

    #[test]
    fn all_zero_offset_record_yields_no_offset() {
        let mut road = line_road("1", 10.0);
        road.lane_offsets = vec![LaneOffsetRecord { s: 0.0, poly: Poly3::default() }];
        let segments = subdivide(&road).unwrap();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].offset.is_none());
    }

    #[test]
    fn offset_over_arc_is_unsupported() {
        let mut road = line_road("1", 10.0);
        road.geometry[0].kind = GeometryKind::Arc { curvature: 0.1 };
        road.lane_offsets = vec![LaneOffsetRecord {
            s: 0.0,
            poly: Poly3::new(1.0, 0.0, 0.0, 0.0),
        }];
        assert!(matches!(
            subdivide(&road),
            Err(Error::UnsupportedFeature(_))
        ));

        // a zero record over the arc is harmless
        road.lane_offsets[0].poly = Poly3::default();
        assert!(subdivide(&road).is_ok());
    }

    #[test]
    fn end_positions_from_next_segment_and_successor() {
        let mut roads = BTreeMap::new();
        let mut first = line_road("1", 10.0);
        first.geometry = vec![
            GeometryRecord { s: 0.0, x: 0.0, y: 0.0, hdg: 0.0, length: 5.0, kind: GeometryKind::Line },
            GeometryRecord { s: 5.0, x: 5.0, y: 0.0, hdg: 0.0, length: 5.0, kind: GeometryKind::Line },
        ];
        first.successor = Some(RoadLink {
            element_type: ElementType::Road,
            element_id: "2".to_string(),
            contact_point: Some(ContactPoint::Start),
        });
        let mut second = line_road("2", 10.0);
        second.geometry[0].x = 10.0;
        roads.insert("1".to_string(), first);
        roads.insert("2".to_string(), second);

        let segments = resolve_road(&roads, "1").unwrap();
        assert_eq!(segments[0].ex, Some(5.0));
        assert_eq!(segments[0].ey, Some(0.0));
        // last segment ends where the successor road begins
        assert_eq!(segments[1].ex, Some(10.0));
    }

    #[test]
    fn no_successor_leaves_end_open() {
        let mut roads = BTreeMap::new();
        roads.insert("1".to_string(), line_road("1", 10.0));
        let segments = resolve_road(&roads, "1").unwrap();
        assert_eq!(segments[0].ex, None);
    }

    #[test]
    fn network_resolution_isolates_failures() {
        let mut network = RoadNetwork::default();
        network.roads.insert("1".to_string(), line_road("1", 10.0));
        let mut bad = line_road("2", 10.0);
        bad.geometry[0].kind = GeometryKind::Arc { curvature: 0.1 };
        bad.lane_offsets = vec![LaneOffsetRecord {
            s: 0.0,
            poly: Poly3::new(1.0, 0.0, 0.0, 0.0),
        }];
        network.roads.insert("2".to_string(), bad);

        let (resolved, diagnostics) = resolve_network(&network);
        assert!(resolved.contains_key("1"));
        assert!(!resolved.contains_key("2"));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].road_id, "2");
    }

    #[test]
    fn range_extraction_trims_line_segments() {
        let roads: BTreeMap<String, Road> =
            [("1".to_string(), line_road("1", 10.0))].into();
        let segments = resolve_road(&roads, "1").unwrap();

        let range = segments_in_range(&segments, 2.0, 7.0).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].s, 2.0);
        assert_eq!(range[0].length, 5.0);
        assert_eq!(range[0].x, 2.0);
        assert_eq!(range[0].ex, Some(7.0));

        assert!(matches!(
            segments_in_range(&segments, 7.0, 7.0 - 1e-3),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn range_start_near_segment_start_skips_the_trim() {
        let roads: BTreeMap<String, Road> =
            [("1".to_string(), line_road("1", 10.0))].into();
        let segments = resolve_road(&roads, "1").unwrap();

        // a start within s-tolerance of the segment start keeps it whole
        let range = segments_in_range(&segments, 5e-5, 10.0).unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].s, 0.0);
        assert_eq!(range[0].length, 10.0);
    }

    #[test]
    fn range_extraction_arc_closed_form() {
        let curvature = 0.1;
        let length = 10.0;
        let mut road = line_road("1", length);
        road.geometry[0].kind = GeometryKind::Arc { curvature };
        let roads: BTreeMap<String, Road> = [("1".to_string(), road)].into();
        let segments = resolve_road(&roads, "1").unwrap();

        let range = segments_in_range(&segments, 3.0, 8.0).unwrap();
        assert_eq!(range.len(), 1);
        let (x, y) = arc_end(0.0, 0.0, 0.0, curvature, 0.0, 3.0);
        assert!((range[0].x - x).abs() < 1e-12);
        assert!((range[0].y - y).abs() < 1e-12);
        assert!((range[0].hdg - 0.3).abs() < 1e-12);
        let (ex, ey) = arc_end(0.0, 0.0, 0.0, curvature, 0.0, 8.0);
        assert!((range[0].ex.unwrap() - ex).abs() < 1e-12);
        assert!((range[0].ey.unwrap() - ey).abs() < 1e-12);
    }
}

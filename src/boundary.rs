//! Lane boundary resolution.
//!
//! Within a lane section, lanes grow outward from the reference line: each
//! lane's inner border is its inner neighbor's outer border, and the outer
//! border adds the lane's width polynomial on its side. The fold visits
//! each side's lanes sorted by |id| ascending, carrying the accumulated
//! border polynomial through a work queue of (sub-segment, border, lane)
//! items split at width-record starts.

use std::collections::{BTreeMap, VecDeque};

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, Result};
use crate::model::{ElevationRecord, Lane, LaneSection, Road, RoadNetwork};
use crate::profile::{lane_height_range, sub_range, HeightPoint, Poly3, S_TOLERANCE};
use crate::resolve::{segments_in_range, RefSegment};
use crate::sample::{arc_points, line_points, spiral_points, ProfileSlice, Vec3};

/// Sampled borders of one lane across a lane section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneStrip {
    pub lane_id: i32,
    pub kind: String,
    /// Border shared with the inner neighbor (or the reference line).
    pub inner: Vec<Vec3>,
    /// Border `width` further out on the lane's side.
    pub outer: Vec<Vec3>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionBoundaries {
    pub s: f64,
    pub left: Vec<LaneStrip>,
    pub right: Vec<LaneStrip>,
}

/// Sample the paved reference line of one resolved segment.
pub fn reference_line(segment: &RefSegment, elevations: &[ElevationRecord]) -> Result<Vec<Vec3>> {
    let elevations = clip_elevations(elevations, segment.s, segment.end())?;
    let profile = ProfileSlice { elevations: &elevations, ..Default::default() };
    let lateral = segment.offset.as_ref();

    let points = match segment.kind {
        crate::model::GeometryKind::Line => line_points(
            segment.central_length,
            &profile,
            &[],
            segment.central_x,
            segment.central_y,
            segment.hdg,
            lateral,
        ),
        crate::model::GeometryKind::Arc { curvature } => {
            arc_points(
                segment.central_length,
                &profile,
                &[],
                segment.central_x,
                segment.central_y,
                segment.hdg,
                curvature,
                segment.ex.zip(segment.ey),
                lateral,
                None,
            )
            .points
        }
        crate::model::GeometryKind::Spiral { curv_start, curv_end } => {
            spiral_points(
                segment.central_length,
                &profile,
                &[],
                segment.central_x,
                segment.central_y,
                segment.hdg,
                curv_start,
                curv_end,
                segment.ex.zip(segment.ey),
                lateral,
                None,
            )
            .points
        }
    };
    Ok(points)
}

/// Clip elevation records to `[s, es)`, synthesizing a flat record so the
/// sampled range always owns a `ds = 0` origin at `s`.
fn clip_elevations(elevations: &[ElevationRecord], s: f64, es: f64) -> Result<Vec<ElevationRecord>> {
    let mut clipped = sub_range(elevations, s, es)?;
    if clipped.is_empty() {
        clipped.push(ElevationRecord { s, poly: Poly3::default() });
    }
    Ok(clipped)
}

/// Resolve the lane boundaries of one lane section. Lane-level failures
/// become diagnostics; the error covers failures affecting the whole
/// section (bad index, unextractable geometry range).
pub fn section_boundaries(
    road: &Road,
    segments: &[RefSegment],
    section_index: usize,
) -> Result<(SectionBoundaries, Vec<Diagnostic>)> {
    let section = road.lane_sections.get(section_index).ok_or_else(|| {
        crate::error::Error::Range(format!(
            "road#{} has no lane section #{section_index}",
            road.id
        ))
    })?;
    let es = road
        .lane_sections
        .get(section_index + 1)
        .map(|next| next.s)
        .unwrap_or(road.length);

    let in_range = segments_in_range(segments, section.s, es)?;

    let mut diagnostics = Vec::new();
    let left = fold_side(road, section, section_index, &in_range, es, true, &mut diagnostics);
    let right = fold_side(road, section, section_index, &in_range, es, false, &mut diagnostics);
    Ok((SectionBoundaries { s: section.s, left, right }, diagnostics))
}

/// Resolve the lane boundaries of every section of `road`, given its
/// resolved reference-line segments. Lanes that cannot be resolved are
/// reported as diagnostics, the rest of the road is unaffected.
pub fn road_boundaries(
    road: &Road,
    segments: &[RefSegment],
) -> (Vec<SectionBoundaries>, Vec<Diagnostic>) {
    let mut sections = Vec::new();
    let mut diagnostics = Vec::new();

    for i in 0..road.lane_sections.len() {
        match section_boundaries(road, segments, i) {
            Ok((section, section_diagnostics)) => {
                sections.push(section);
                diagnostics.extend(section_diagnostics);
            }
            Err(err) => diagnostics.push(
                Diagnostic::road(&road.id, err.to_string()).with_section(i),
            ),
        }
    }

    (sections, diagnostics)
}

/// Resolve boundaries for every resolved road in parallel.
pub fn network_boundaries(
    network: &RoadNetwork,
    resolved: &BTreeMap<String, Vec<RefSegment>>,
) -> (BTreeMap<String, Vec<SectionBoundaries>>, Vec<Diagnostic>) {
    let results: Vec<(String, Vec<SectionBoundaries>, Vec<Diagnostic>)> = resolved
        .par_iter()
        .filter_map(|(id, segments)| {
            let road = network.roads.get(id)?;
            let (sections, diagnostics) = road_boundaries(road, segments);
            Some((id.clone(), sections, diagnostics))
        })
        .collect();

    let mut boundaries = BTreeMap::new();
    let mut diagnostics = Vec::new();
    for (id, sections, road_diagnostics) in results {
        boundaries.insert(id, sections);
        diagnostics.extend(road_diagnostics);
    }

    if !diagnostics.is_empty() {
        info!("lane boundary resolution produced {} diagnostics", diagnostics.len());
    }
    (boundaries, diagnostics)
}

/// One work item of the fold: a sub-segment, the border polynomial at its
/// inner edge (anchored at the sub-segment start) and the lane it feeds.
struct WorkItem {
    segment: RefSegment,
    inner: Poly3,
    lane_index: usize,
}

fn fold_side(
    road: &Road,
    section: &LaneSection,
    section_index: usize,
    segments: &[RefSegment],
    es: f64,
    left: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<LaneStrip> {
    let lanes = section.side_lanes(left);
    if lanes.is_empty() {
        return Vec::new();
    }

    let mut strips: Vec<LaneStrip> = lanes
        .iter()
        .map(|lane| LaneStrip {
            lane_id: lane.id,
            kind: lane.kind.clone(),
            inner: Vec::new(),
            outer: Vec::new(),
        })
        .collect();

    let mut queue: VecDeque<WorkItem> = segments
        .iter()
        .map(|segment| WorkItem {
            segment: RefSegment { offset: None, ..segment.clone() },
            inner: segment.offset.unwrap_or_default(),
            lane_index: 0,
        })
        .collect();

    while let Some(item) = queue.pop_front() {
        let lane = lanes[item.lane_index];
        let sign = if lane.id > 0 { 1.0 } else { -1.0 };

        for (k, width) in lane.widths.iter().enumerate() {
            let ws = width.s_offset + section.s;
            let w_end = lane
                .widths
                .get(k + 1)
                .map(|w| w.s_offset + section.s)
                .unwrap_or(es);

            let gs = item.segment.s.max(ws);
            let ge = item.segment.end().min(w_end);
            if ge - gs < S_TOLERANCE {
                continue;
            }

            // re-anchor both polynomials at the overlap start
            let g_offset = gs - item.segment.s;
            let w_offset = gs - ws;
            let inner = item.inner.shifted(g_offset);
            let shifted = width.poly.shifted(w_offset);
            let outer = Poly3::new(
                inner.a + sign * shifted.a,
                inner.b + sign * shifted.b,
                inner.c + sign * shifted.c,
                inner.d + sign * shifted.d,
            );

            match lane_pair(road, &item.segment, lane, section.s, gs, ge, &inner, &outer) {
                Ok((sub, inner_points, outer_points)) => {
                    strips[item.lane_index].inner.extend(inner_points);
                    strips[item.lane_index].outer.extend(outer_points);
                    if item.lane_index + 1 < lanes.len() {
                        queue.push_back(WorkItem {
                            segment: sub,
                            inner: outer,
                            lane_index: item.lane_index + 1,
                        });
                    }
                }
                Err(err) => diagnostics.push(
                    Diagnostic::lane(&road.id, section_index, lane.id, err.to_string()),
                ),
            }
        }
    }

    strips
}

/// Sample the inner and outer borders of `lane` over `[gs, ge)` of one
/// sub-segment. Returns the trimmed sub-segment for the next lane out.
#[allow(clippy::too_many_arguments)]
fn lane_pair(
    road: &Road,
    segment: &RefSegment,
    lane: &Lane,
    section_start: f64,
    gs: f64,
    ge: f64,
    inner: &Poly3,
    outer: &Poly3,
) -> Result<(RefSegment, Vec<Vec3>, Vec<Vec3>)> {
    let sub = segments_in_range(std::slice::from_ref(segment), gs, ge)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            crate::error::Error::Geometry(format!(
                "no geometry covering [{gs}, {ge}) on road#{}",
                road.id
            ))
        })?;

    let elevations = clip_elevations(&road.elevations, gs, ge)?;
    let superelevations = sub_range(&road.superelevations, gs, ge)?;
    let crossfalls = sub_range(&road.crossfalls, gs, ge)?;
    let profile = ProfileSlice {
        elevations: &elevations,
        superelevations: &superelevations,
        crossfalls: &crossfalls,
    };
    let (inner_heights, outer_heights) = lane_height_range(section_start, &lane.heights, gs, ge)?;

    let inner_points = border_points(&sub, &profile, &inner_heights, inner);
    let outer_points = border_points(&sub, &profile, &outer_heights, outer);
    Ok((sub, inner_points, outer_points))
}

fn border_points(
    sub: &RefSegment,
    profile: &ProfileSlice,
    heights: &[HeightPoint],
    lateral: &Poly3,
) -> Vec<Vec3> {
    match sub.kind {
        crate::model::GeometryKind::Line => line_points(
            sub.length,
            profile,
            heights,
            sub.central_x,
            sub.central_y,
            sub.hdg,
            Some(lateral),
        ),
        crate::model::GeometryKind::Arc { curvature } => {
            arc_points(
                sub.length,
                profile,
                heights,
                sub.central_x,
                sub.central_y,
                sub.hdg,
                curvature,
                sub.ex.zip(sub.ey),
                Some(lateral),
                None,
            )
            .points
        }
        crate::model::GeometryKind::Spiral { curv_start, curv_end } => {
            spiral_points(
                sub.length,
                profile,
                heights,
                sub.central_x,
                sub.central_y,
                sub.hdg,
                curv_start,
                curv_end,
                sub.ex.zip(sub.ey),
                Some(lateral),
                None,
            )
            .points
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GeometryKind, GeometryRecord, WidthRecord};

    fn lane(id: i32, width: f64) -> Lane {
        Lane {
            id,
            kind: "driving".to_string(),
            level: false,
            predecessor: None,
            successor: None,
            widths: if id == 0 {
                Vec::new()
            } else {
                vec![WidthRecord { s_offset: 0.0, poly: Poly3::new(width, 0.0, 0.0, 0.0) }]
            },
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

    fn two_lane_road(length: f64) -> Road {
        Road {
            id: "1".to_string(),
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
            lane_sections: vec![LaneSection {
                s: 0.0,
                single_side: false,
                lanes: vec![lane(1, 3.0), lane(0, 0.0), lane(-1, 3.0)],
            }],
            signal_ids: Vec::new(),
            signal_references: Vec::new(),
        }
    }

    fn resolved(road: &Road) -> Vec<RefSegment> {
        let roads: BTreeMap<String, Road> = [(road.id.clone(), road.clone())].into();
        crate::resolve::resolve_road(&roads, &road.id).unwrap()
    }

    #[test]
    fn outer_border_is_inner_plus_signed_width() {
        let road = two_lane_road(10.0);
        let segments = resolved(&road);
        let (sections, diagnostics) = road_boundaries(&road, &segments);
        assert!(diagnostics.is_empty());
        assert_eq!(sections.len(), 1);

        let left = &sections[0].left;
        let right = &sections[0].right;
        assert_eq!(left.len(), 1);
        assert_eq!(right.len(), 1);

        // at s = 5 the inner borders sit on the reference line and the
        // outer borders 3 m out on each side
        let mid = |points: &[Vec3]| points.iter().find(|p| (p.x - 5.0).abs() < 1e-9).copied();
        assert_eq!(mid(&left[0].inner).unwrap().y, 0.0);
        assert!((mid(&left[0].outer).unwrap().y - 3.0).abs() < 1e-9);
        assert!((mid(&right[0].outer).unwrap().y + 3.0).abs() < 1e-9);
    }

    #[test]
    fn stacked_lanes_accumulate_widths() {
        let mut road = two_lane_road(10.0);
        road.lane_sections[0].lanes.push(lane(2, 2.5));
        let segments = resolved(&road);
        let (sections, diagnostics) = road_boundaries(&road, &segments);
        assert!(diagnostics.is_empty());

        let left = &sections[0].left;
        assert_eq!(left.len(), 2);
        assert_eq!(left[0].lane_id, 1);
        assert_eq!(left[1].lane_id, 2);

        // lane 2 rides on lane 1's outer border
        let first = left[1].inner[0];
        assert!((first.y - 3.0).abs() < 1e-9);
        let first_outer = left[1].outer[0];
        assert!((first_outer.y - 5.5).abs() < 1e-9);
    }

    #[test]
    fn lane_offset_shifts_both_sides() {
        let mut road = two_lane_road(10.0);
        road.lane_offsets = vec![crate::model::LaneOffsetRecord {
            s: 0.0,
            poly: Poly3::new(1.0, 0.0, 0.0, 0.0),
        }];
        let segments = resolved(&road);
        let (sections, diagnostics) = road_boundaries(&road, &segments);
        assert!(diagnostics.is_empty());

        let left = &sections[0].left;
        let right = &sections[0].right;
        // the paved center moved 1 m left, borders follow
        assert!((left[0].inner[0].y - 1.0).abs() < 1e-9);
        assert!((left[0].outer[0].y - 4.0).abs() < 1e-9);
        assert!((right[0].outer[0].y + 2.0).abs() < 1e-9);
    }

    #[test]
    fn width_records_split_the_strip() {
        let mut road = two_lane_road(10.0);
        let widths = vec![
            WidthRecord { s_offset: 0.0, poly: Poly3::new(3.0, 0.0, 0.0, 0.0) },
            WidthRecord { s_offset: 6.0, poly: Poly3::new(4.0, 0.0, 0.0, 0.0) },
        ];
        road.lane_sections[0].lanes[0].widths = widths;
        let segments = resolved(&road);
        let (sections, diagnostics) = road_boundaries(&road, &segments);
        assert!(diagnostics.is_empty());

        let strip = &sections[0].left[0];
        // the widened tail is sampled at 4 m out
        assert!(strip.outer.iter().any(|p| (p.y - 4.0).abs() < 1e-9 && p.x >= 6.0));
        // and the head at 3 m
        assert!(strip.outer.iter().any(|p| (p.y - 3.0).abs() < 1e-9 && p.x < 6.0));
    }

    #[test]
    fn lane_heights_lift_borders() {
        let mut road = two_lane_road(10.0);
        road.lane_sections[0].lanes[0].heights = vec![crate::model::LaneHeightRecord {
            s_offset: 0.0,
            inner: 0.1,
            outer: 0.3,
        }];
        let segments = resolved(&road);
        let (sections, diagnostics) = road_boundaries(&road, &segments);
        assert!(diagnostics.is_empty());

        let strip = &sections[0].left[0];
        for p in &strip.inner {
            assert!((p.z - 0.1).abs() < 1e-9);
        }
        for p in &strip.outer {
            assert!((p.z - 0.3).abs() < 1e-9);
        }
    }

    #[test]
    fn reference_line_follows_offset() {
        let mut road = two_lane_road(10.0);
        road.lane_offsets = vec![crate::model::LaneOffsetRecord {
            s: 0.0,
            poly: Poly3::new(2.0, 0.0, 0.0, 0.0),
        }];
        let segments = resolved(&road);
        let points = reference_line(&segments[0], &road.elevations).unwrap();
        for p in &points {
            assert!((p.y - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn network_boundaries_cover_all_resolved_roads() {
        let mut network = RoadNetwork::default();
        network.roads.insert("1".to_string(), two_lane_road(10.0));
        let mut second = two_lane_road(8.0);
        second.id = "2".to_string();
        network.roads.insert("2".to_string(), second);

        let (resolved, _) = crate::resolve::resolve_network(&network);
        let (boundaries, diagnostics) = network_boundaries(&network, &resolved);
        assert!(diagnostics.is_empty());
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries["2"].len(), 1);
    }
}

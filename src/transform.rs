//! Track-to-inertial coordinate transform and governing-record queries.
//!
//! Track coordinates address a point by arclength `s` along the reference
//! line, lateral offset `t` (positive left) and height `h` above the road
//! surface. The transform yields an inertial position plus an orientation
//! assembled from the road's heading, the elevation slope and the lateral
//! banking at `s`.

use crate::error::{Error, Result};
use crate::model::{
    CrossfallRecord, CrossfallSide, ElevationRecord, GeometryKind, GeometryRecord,
    LaneOffsetRecord, LaneSection, Road, Signal, SuperelevationRecord,
};
use crate::profile::{active_by, S_TOLERANCE};
use crate::resolve::arc_end;
use crate::sample::{spiral_points, ProfileSlice, Vec3};

/// Step used for the finite-difference pitch estimate.
const PITCH_DELTA: f64 = 0.1;

/// Intrinsic rotation: roll about the travel axis, pitch about the lateral
/// axis, yaw about the up axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: EulerAngles,
}

/// The geometry record governing `s`.
pub fn geometry_at_s(road: &Road, s: f64) -> Option<&GeometryRecord> {
    active_by(&road.geometry, s, road.length, |g| g.s)
}

pub fn elevation_at_s(road: &Road, s: f64) -> Option<&ElevationRecord> {
    active_by(&road.elevations, s, road.length, |r| r.s)
}

pub fn superelevation_at_s(road: &Road, s: f64) -> Option<&SuperelevationRecord> {
    active_by(&road.superelevations, s, road.length, |r| r.s)
}

pub fn crossfall_at_s(road: &Road, s: f64) -> Option<&CrossfallRecord> {
    active_by(&road.crossfalls, s, road.length, |r| r.s)
}

pub fn lane_offset_at_s(road: &Road, s: f64) -> Option<&LaneOffsetRecord> {
    active_by(&road.lane_offsets, s, road.length, |r| r.s)
}

pub fn lane_section_at_s(road: &Road, s: f64) -> Option<&LaneSection> {
    active_by(&road.lane_sections, s, road.length, |sec| sec.s)
}

/// Reference-line position and heading at `s`, before any lateral shift.
fn reference_pose(road: &Road, s: f64) -> Result<(f64, f64, f64)> {
    let geometry = geometry_at_s(road, s).ok_or_else(|| {
        Error::Geometry(format!("road#{} has no geometry covering s={s}", road.id))
    })?;
    let ds = s - geometry.s;

    match geometry.kind {
        GeometryKind::Line => Ok((
            geometry.x + ds * geometry.hdg.cos(),
            geometry.y + ds * geometry.hdg.sin(),
            geometry.hdg,
        )),
        GeometryKind::Arc { curvature } => {
            let (x, y) = arc_end(geometry.x, geometry.y, geometry.hdg, curvature, 0.0, ds);
            Ok((x, y, geometry.hdg + ds * curvature))
        }
        GeometryKind::Spiral { curv_start, curv_end } => {
            let samples = spiral_points(
                geometry.length,
                &ProfileSlice::default(),
                &[],
                geometry.x,
                geometry.y,
                geometry.hdg,
                curv_start,
                curv_end,
                None,
                None,
                None,
            );
            // samples sit at 1 m steps with the last landing on the curve
            // end; interpolate at the fractional index
            let last = samples.points.len() - 1;
            let index = (ds.floor() as usize).min(last);
            if index == last {
                let p = samples.points[last];
                return Ok((p.x, p.y, samples.headings[last]));
            }
            let frac = ds - index as f64;
            let (a, b) = (samples.points[index], samples.points[index + 1]);
            let (ha, hb) = (samples.headings[index], samples.headings[index + 1]);
            Ok((
                a.x + frac * (b.x - a.x),
                a.y + frac * (b.y - a.y),
                ha + frac * (hb - ha),
            ))
        }
    }
}

/// Transform track coordinates `(s, t, h)` on `road` into an inertial pose.
pub fn track_to_inertial(road: &Road, s: f64, t: f64, h: f64) -> Result<Pose> {
    if s < 0.0 || s > road.length + S_TOLERANCE {
        return Err(Error::Range(format!(
            "s={s} outside road#{} of length {}",
            road.id, road.length
        )));
    }

    let (x, y, hdg) = reference_pose(road, s)?;

    let (z, pitch) = match elevation_at_s(road, s) {
        Some(elevation) => {
            let ds = s - elevation.s;
            let z = elevation.poly.eval(ds);
            let prez = elevation.poly.eval(ds - PITCH_DELTA);
            (z, ((z - prez) / PITCH_DELTA).atan())
        }
        None => (0.0, 0.0),
    };

    let superelevation_angle = superelevation_at_s(road, s)
        .map(|r| r.poly.eval(s - r.s))
        .unwrap_or(0.0);

    let mut roll = superelevation_angle;
    if let Some(crossfall) = crossfall_at_s(road, s) {
        let on_falling_side = (t > 0.0 && crossfall.side == CrossfallSide::Right)
            || (t < 0.0 && crossfall.side == CrossfallSide::Left);
        if !on_falling_side {
            roll += crossfall.poly.eval(s - crossfall.s) * -t.signum();
        }
    }

    let svector = Vec3::new(hdg.cos(), hdg.sin(), 0.0);
    let tvector = svector
        .cross(Vec3::new(0.0, 0.0, -1.0))
        .rotated_about(svector, roll);
    let hvector = svector.cross(tvector);

    let shift_t = tvector.scaled(t);
    let shift_h = hvector.scaled(h);

    Ok(Pose {
        position: Vec3::new(
            x + shift_t.x + shift_h.x,
            y + shift_t.y + shift_h.y,
            z + shift_t.z + shift_h.z,
        ),
        rotation: EulerAngles { roll, pitch: -pitch, yaw: hdg },
    })
}

/// Inertial pose of a signal anchored to `road`. The signal faces across
/// the track; a `"+"` orientation flips it to face oncoming traffic.
pub fn signal_pose(road: &Road, signal: &Signal) -> Result<Pose> {
    let mut pose = track_to_inertial(road, signal.s, signal.t, 0.0)?;
    pose.position.z += signal.z_offset;
    pose.rotation.yaw += std::f64::consts::FRAC_PI_2;
    if signal.orientation == "+" {
        pose.rotation.yaw += std::f64::consts::PI;
    }
    Ok(pose)
}

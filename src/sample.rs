//! Curve sampling: reference-line and border polylines in 3D.
//!
//! All three primitive shapes sample at a fixed 1 m step, re-anchored at
//! every elevation record start so each elevation segment owns its local
//! `ds = 0` origin. Arc and clothoid stepping use a midpoint-curvature
//! Euler advance; when the true end point is known the residual is
//! redistributed over interior samples linearly by fractional arclength.
//! Lateral offsets ride an orthonormal s/t/h frame per sample, rotated by
//! superelevation and (side-gated) crossfall.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::model::{CrossfallRecord, CrossfallSide, ElevationRecord, SuperelevationRecord};
use crate::profile::{HeightPoint, Poly3, S_TOLERANCE};

/// Sampling step along s, in meters.
pub const SAMPLE_STEP: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn scaled(self, factor: f64) -> Vec3 {
        Vec3 {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    /// Rodrigues rotation about a unit axis.
    pub fn rotated_about(self, axis: Vec3, angle: f64) -> Vec3 {
        let (sin, cos) = angle.sin_cos();
        let cross = axis.cross(self);
        let dot = axis.dot(self);
        Vec3 {
            x: self.x * cos + cross.x * sin + axis.x * dot * (1.0 - cos),
            y: self.y * cos + cross.y * sin + axis.y * dot * (1.0 - cos),
            z: self.z * cos + cross.z * sin + axis.z * dot * (1.0 - cos),
        }
    }
}

/// Elevation and lateral profile slices governing one sampled range.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileSlice<'a> {
    pub elevations: &'a [ElevationRecord],
    pub superelevations: &'a [SuperelevationRecord],
    pub crossfalls: &'a [CrossfallRecord],
}

/// Sampled polyline with the per-sample heading of the underlying curve.
#[derive(Debug, Clone, Default)]
pub struct CurveSamples {
    pub points: Vec<Vec3>,
    pub headings: Vec<f64>,
    s_offsets: Vec<f64>,
    t_offsets: Vec<f64>,
}

fn padded<T: Clone>(records: &[T], zero: T) -> Cow<'_, [T]> {
    if records.is_empty() {
        Cow::Owned(vec![zero])
    } else {
        Cow::Borrowed(records)
    }
}

fn zero_elevation() -> ElevationRecord {
    ElevationRecord { s: 0.0, poly: Poly3::default() }
}

fn zero_superelevation() -> SuperelevationRecord {
    SuperelevationRecord { s: 0.0, poly: Poly3::default() }
}

fn zero_crossfall() -> CrossfallRecord {
    CrossfallRecord { side: CrossfallSide::Both, s: 0.0, poly: Poly3::default() }
}

fn zero_height() -> HeightPoint {
    HeightPoint { s: 0.0, height: 0.0 }
}

/// Sample a straight segment. The lateral polynomial is anchored at
/// `(sx, sy)`, the elevation records at their own absolute s.
pub fn line_points(
    length: f64,
    profile: &ProfileSlice,
    heights: &[HeightPoint],
    sx: f64,
    sy: f64,
    hdg: f64,
    lateral: Option<&Poly3>,
) -> Vec<Vec3> {
    let elevations = padded(profile.elevations, zero_elevation());
    let elevation_s0 = elevations[0].s;

    let mut points = Vec::new();
    let mut s_offsets = Vec::new();
    let mut t_offsets = Vec::new();

    for (i, elevation) in elevations.iter().enumerate() {
        let next_s = elevations
            .get(i + 1)
            .map(|e| e.s)
            .unwrap_or(elevation_s0 + length);
        let seg_len = next_s - elevation.s;
        let seg_off = elevation.s - elevation_s0;

        let mut ds = 0.0;
        loop {
            if ds > seg_len || (ds - seg_len).abs() < S_TOLERANCE {
                if (seg_off + seg_len - length).abs() < S_TOLERANCE {
                    // the segment closes the curve: land exactly on its end
                    ds = seg_len;
                } else {
                    // the next elevation record supplies this boundary
                    break;
                }
            }

            let x = sx + (ds + seg_off) * hdg.cos();
            let y = sy + (ds + seg_off) * hdg.sin();
            let z = elevation.poly.eval(ds);

            points.push(Vec3::new(x, y, z));
            s_offsets.push(ds + seg_off);
            if let Some(lateral) = lateral {
                t_offsets.push(lateral.eval(ds + seg_off));
            }

            ds += SAMPLE_STEP;
            if ds >= seg_len + SAMPLE_STEP {
                break;
            }
        }
    }

    if let Some(_lateral) = lateral {
        let headings = vec![hdg; points.len()];
        apply_lateral_profile(
            &mut points,
            &headings,
            &t_offsets,
            &s_offsets,
            profile,
            heights,
            elevation_s0,
            length,
        );
    }

    points
}

/// Sample an arc of constant curvature.
#[allow(clippy::too_many_arguments)]
pub fn arc_points(
    length: f64,
    profile: &ProfileSlice,
    heights: &[HeightPoint],
    sx: f64,
    sy: f64,
    hdg: f64,
    curvature: f64,
    end: Option<(f64, f64)>,
    lateral: Option<&Poly3>,
    sub: Option<(f64, f64)>,
) -> CurveSamples {
    euler_curve(
        length,
        profile,
        heights,
        sx,
        sy,
        hdg,
        |_s, _pre_s| curvature,
        end,
        lateral,
        sub,
    )
}

/// Sample a clothoid with linearly varying curvature.
#[allow(clippy::too_many_arguments)]
pub fn spiral_points(
    length: f64,
    profile: &ProfileSlice,
    heights: &[HeightPoint],
    sx: f64,
    sy: f64,
    hdg: f64,
    curv_start: f64,
    curv_end: f64,
    end: Option<(f64, f64)>,
    lateral: Option<&Poly3>,
    sub: Option<(f64, f64)>,
) -> CurveSamples {
    let rate = (curv_end - curv_start) / length;
    euler_curve(
        length,
        profile,
        heights,
        sx,
        sy,
        hdg,
        // curvature at the step midpoint
        move |s, pre_s| (s + pre_s) * 0.5 * rate + curv_start,
        end,
        lateral,
        sub,
    )
}

#[allow(clippy::too_many_arguments)]
fn euler_curve(
    length: f64,
    profile: &ProfileSlice,
    heights: &[HeightPoint],
    sx: f64,
    sy: f64,
    hdg: f64,
    curvature_at: impl Fn(f64, f64) -> f64,
    end: Option<(f64, f64)>,
    lateral: Option<&Poly3>,
    sub: Option<(f64, f64)>,
) -> CurveSamples {
    let elevations = padded(profile.elevations, zero_elevation());
    let elevation_s0 = elevations[0].s;

    let mut samples = CurveSamples::default();
    let mut theta = hdg;
    let mut pre_s = 0.0;

    for (i, elevation) in elevations.iter().enumerate() {
        let next_s = elevations
            .get(i + 1)
            .map(|e| e.s)
            .unwrap_or(elevation_s0 + length);
        let seg_len = next_s - elevation.s;
        let seg_off = elevation.s - elevation_s0;

        let mut s = seg_off;
        loop {
            if s == 0.0 {
                samples.points.push(Vec3::new(sx, sy, elevations[0].poly.a));
                samples.headings.push(theta);
                if let Some(lateral) = lateral {
                    samples.t_offsets.push(lateral.a);
                }
                samples.s_offsets.push(s);
                s += SAMPLE_STEP;
                if s >= seg_off + seg_len + SAMPLE_STEP {
                    break;
                }
                continue;
            }

            if s > seg_off + seg_len || (s - seg_off - seg_len).abs() < S_TOLERANCE {
                if (seg_off + seg_len - length).abs() < S_TOLERANCE {
                    // segment closes the curve: land exactly on its end
                    s = seg_off + seg_len;
                } else {
                    break;
                }
            }

            let curvature = curvature_at(s, pre_s);
            let pre_point = samples.points[samples.points.len() - 1];

            let step = s - pre_s;
            let x = pre_point.x + step * (theta + curvature * step / 2.0).cos();
            let y = pre_point.y + step * (theta + curvature * step / 2.0).sin();
            let z = elevation.poly.eval(s - seg_off);

            theta += curvature * step;
            pre_s = s;
            s += SAMPLE_STEP;

            samples.points.push(Vec3::new(x, y, z));
            samples.headings.push(theta);
            if let Some(lateral) = lateral {
                samples.t_offsets.push(lateral.eval(pre_s));
            }
            samples.s_offsets.push(pre_s);

            if s >= seg_off + seg_len + SAMPLE_STEP {
                break;
            }
        }
    }

    if let Some((ex, ey)) = end {
        correct_end_point(&mut samples.points, &samples.s_offsets, length, ex, ey);
    }

    if lateral.is_some() {
        let headings = samples.headings.clone();
        apply_lateral_profile(
            &mut samples.points,
            &headings,
            &samples.t_offsets,
            &samples.s_offsets,
            profile,
            heights,
            elevation_s0,
            length,
        );
    }

    if let Some((sub_offset, sub_length)) = sub {
        extract_sub(&mut samples, &elevations, elevation_s0, length, sub_offset, sub_length);
    }

    samples
}

/// Move the last sample onto the known end point and spread the residual
/// over the interior samples linearly by fractional arclength.
fn correct_end_point(points: &mut [Vec3], s_offsets: &[f64], length: f64, ex: f64, ey: f64) {
    let last = points.len() - 1;
    let dx = ex - points[last].x;
    let dy = ey - points[last].y;
    points[last].x = ex;
    points[last].y = ey;

    for i in (0..last).rev() {
        points[i].x += dx * s_offsets[i] / length;
        points[i].y += dy * s_offsets[i] / length;
    }
}

/// Shift every sample by `t` along the lateral axis and by `height` along
/// the surface normal, with superelevation and crossfall rotations applied.
#[allow(clippy::too_many_arguments)]
fn apply_lateral_profile(
    points: &mut [Vec3],
    headings: &[f64],
    t_offsets: &[f64],
    s_offsets: &[f64],
    profile: &ProfileSlice,
    heights: &[HeightPoint],
    s0: f64,
    length: f64,
) {
    let superelevations = padded(profile.superelevations, zero_superelevation());
    let crossfalls = padded(profile.crossfalls, zero_crossfall());
    let heights = padded(heights, zero_height());

    let mut superelevation_index = 0;
    let mut crossfall_index = 0;
    let mut height_index = 0;

    let next_start =
        |starts: &[f64], index: usize| starts.get(index + 1).copied().unwrap_or(s0 + length);
    let superelevation_starts: Vec<f64> = superelevations.iter().map(|r| r.s).collect();
    let crossfall_starts: Vec<f64> = crossfalls.iter().map(|r| r.s).collect();
    let height_starts: Vec<f64> = heights.iter().map(|r| r.s).collect();

    for i in 0..points.len() {
        let t = t_offsets[i];
        let ds = s_offsets[i];
        let heading = headings[i];

        // advance the governing records; never past the range end
        while {
            let next = next_start(&superelevation_starts, superelevation_index);
            (next <= ds + s0 || (next - ds - s0).abs() < S_TOLERANCE)
                && s0 + length - next >= S_TOLERANCE
        } {
            superelevation_index += 1;
        }
        while {
            let next = next_start(&crossfall_starts, crossfall_index);
            (next <= ds + s0 || (next - ds - s0).abs() < S_TOLERANCE)
                && s0 + length - next >= S_TOLERANCE
        } {
            crossfall_index += 1;
        }
        while {
            let next = next_start(&height_starts, height_index);
            (next <= ds + s0 || (next - ds - s0).abs() < S_TOLERANCE)
                && s0 + length - next >= S_TOLERANCE
        } {
            height_index += 1;
        }

        let superelevation = &superelevations[superelevation_index];
        let crossfall = &crossfalls[crossfall_index];
        let height = &heights[height_index];

        let svector = Vec3::new(heading.cos(), heading.sin(), 0.0);
        let mut tvector = svector.cross(Vec3::new(0.0, 0.0, -1.0));

        if t != 0.0 {
            let superelevation_angle = superelevation.poly.eval(ds + s0 - superelevation.s);
            let crossfall_angle = crossfall.poly.eval(ds + s0 - crossfall.s);

            tvector = tvector.rotated_about(svector, superelevation_angle);

            let on_falling_side = (t > 0.0 && crossfall.side == CrossfallSide::Right)
                || (t < 0.0 && crossfall.side == CrossfallSide::Left);
            if !on_falling_side {
                tvector = tvector.rotated_about(svector, crossfall_angle * -t.signum());
            }
        }

        let hvector = svector.cross(tvector);
        let shift_t = tvector.scaled(t);
        let shift_h = hvector.scaled(height.height);

        points[i].x += shift_t.x + shift_h.x;
        points[i].y += shift_t.y + shift_h.y;
        points[i].z += shift_t.z + shift_h.z;
    }
}

/// Cut `[sub_offset, sub_offset + sub_length]` out of the sampled curve by
/// locating fractional sample indices per elevation segment and
/// interpolating the cut points.
fn extract_sub(
    samples: &mut CurveSamples,
    elevations: &[ElevationRecord],
    s0: f64,
    length: f64,
    sub_offset: f64,
    sub_length: f64,
) {
    let mut start_index = 0usize;
    let mut end_index = 0usize;
    let mut start_diff = 0.0;
    let mut end_diff = 0.0;
    let mut start_found = false;
    let mut end_found = false;

    for (i, elevation) in elevations.iter().enumerate() {
        let elevation_s = elevation.s;
        let next_s = elevations.get(i + 1).map(|e| e.s).unwrap_or(s0 + length);

        if !start_found {
            if next_s <= s0 + sub_offset - S_TOLERANCE {
                start_index += ((next_s - elevation_s) / SAMPLE_STEP - 1.0).ceil() as usize;
            } else if (elevation_s - (s0 + sub_offset)).abs() < S_TOLERANCE {
                if (elevation_s - s0).abs() >= S_TOLERANCE {
                    start_index += 1;
                }
                start_diff = 0.0;
                start_found = true;
            } else if elevation_s < s0 + sub_offset {
                let steps = (s0 + sub_offset - elevation_s) / SAMPLE_STEP;
                start_index += steps.floor() as usize;
                start_diff = steps - steps.floor();
                start_found = true;
            }
        }

        if !end_found {
            let sub_end = s0 + sub_offset + sub_length;
            if next_s <= sub_end - S_TOLERANCE {
                end_index += ((next_s - elevation_s) / SAMPLE_STEP).ceil() as usize;
            } else if (next_s - sub_end).abs() < S_TOLERANCE {
                end_index += ((next_s - elevation_s) / SAMPLE_STEP).ceil() as usize;
                end_diff = 0.0;
                end_found = true;
            } else if elevation_s < sub_end {
                let steps = (sub_end - elevation_s) / SAMPLE_STEP;
                end_index += steps.floor() as usize;
                end_diff = steps - steps.floor();
                end_found = true;
            }
        }

        if start_found && end_found {
            break;
        }
    }

    let lerp = |a: Vec3, b: Vec3, f: f64| {
        Vec3::new(a.x + f * (b.x - a.x), a.y + f * (b.y - a.y), a.z + f * (b.z - a.z))
    };

    let points = &mut samples.points;
    let headings = &mut samples.headings;

    let frac = start_diff / SAMPLE_STEP;
    points[start_index] = lerp(points[start_index], points[start_index + 1], frac);
    headings[start_index] += (headings[start_index + 1] - headings[start_index]) * frac;

    if end_diff > 0.0 {
        let frac = end_diff / SAMPLE_STEP;
        let cut = lerp(points[end_index], points[end_index + 1], frac);
        let heading = headings[end_index] + (headings[end_index + 1] - headings[end_index]) * frac;
        end_index += 1;
        points[end_index] = cut;
        headings[end_index] = heading;
    }

    points.truncate(end_index + 1);
    points.drain(..start_index);
    headings.truncate(end_index + 1);
    headings.drain(..start_index);
    samples.s_offsets.clear();
    samples.t_offsets.clear();
}

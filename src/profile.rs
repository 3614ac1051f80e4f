//! Cubic polynomial profiles and s-range queries.
//!
//! Elevation, superelevation, crossfall and lane-offset records all carry a
//! cubic polynomial anchored at a start s-coordinate. Clipping a record list
//! to a sub-range and finding the record governing a given s is the same
//! algorithm for every record kind, so both are generic over [`SRecord`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Two s-coordinates closer than this are the same position (sub-millimeter).
pub const S_TOLERANCE: f64 = 1e-4;

/// Cubic polynomial `a + b*ds + c*ds^2 + d*ds^3`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Poly3 {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Poly3 {
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        Poly3 { a, b, c, d }
    }

    pub fn eval(&self, ds: f64) -> f64 {
        self.a + self.b * ds + self.c * ds * ds + self.d * ds * ds * ds
    }

    /// Re-anchor the polynomial `ds` ahead of its current origin (Taylor
    /// shift): evaluating the result at 0 equals evaluating self at `ds`.
    pub fn shifted(&self, ds: f64) -> Poly3 {
        Poly3 {
            a: self.a + self.b * ds + self.c * ds * ds + self.d * ds * ds * ds,
            b: self.b + 2.0 * self.c * ds + 3.0 * self.d * ds * ds,
            c: self.c + 3.0 * self.d * ds,
            d: self.d,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.a == 0.0 && self.b == 0.0 && self.c == 0.0 && self.d == 0.0
    }
}

/// A record anchored at an s-coordinate carrying a cubic polynomial.
pub trait SRecord: Clone {
    fn start(&self) -> f64;
    fn poly(&self) -> Poly3;
    /// The same record re-anchored at `s` with its polynomial Taylor-shifted.
    fn rebased(&self, s: f64) -> Self;
}

/// Clip `records` to `[s, es)`. The first covered record is re-anchored at
/// `s` when it starts earlier; succeeding records are copied until `es`.
pub fn sub_range<R: SRecord>(records: &[R], s: f64, es: f64) -> Result<Vec<R>> {
    if s >= es + S_TOLERANCE {
        return Err(Error::Range(format!(
            "sub-range start {s} is not before end {es}"
        )));
    }

    let mut out = Vec::new();
    let mut found = false;

    for (i, record) in records.iter().enumerate() {
        let next_s = records.get(i + 1).map(|r| r.start()).unwrap_or(es);

        if found {
            if record.start() < es {
                out.push(record.clone());
            } else {
                break;
            }
        } else {
            if next_s <= s {
                continue;
            }
            if (record.start() - s).abs() < S_TOLERANCE {
                out.push(record.clone());
            } else if record.start() < s && next_s > s {
                out.push(record.rebased(s));
            }
            found = true;
        }
    }

    Ok(out)
}

/// The item governing `s` in a list of records ordered by start. `end_s` is
/// the coverage end of the last item; at `s == end_s` the last item wins.
pub fn active_by<T>(items: &[T], s: f64, end_s: f64, start: impl Fn(&T) -> f64) -> Option<&T> {
    let mut result = None;

    for (i, item) in items.iter().enumerate() {
        let next_s = items.get(i + 1).map(&start).unwrap_or(end_s);
        if next_s <= s {
            continue;
        } else if start(item) > s {
            break;
        } else {
            result = Some(item);
        }
    }

    // s at or beyond the last record's coverage
    result.or_else(|| items.last())
}

/// A height breakpoint along s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightPoint {
    pub s: f64,
    pub height: f64,
}

/// Split lane height records (sOffset-anchored within a lane section) into
/// inner and outer breakpoint sequences covering `[s, es)`.
pub fn lane_height_range(
    section_start: f64,
    heights: &[crate::model::LaneHeightRecord],
    s: f64,
    es: f64,
) -> Result<(Vec<HeightPoint>, Vec<HeightPoint>)> {
    if s >= es + S_TOLERANCE {
        return Err(Error::Range(format!(
            "height range start {s} is not before end {es}"
        )));
    }

    let mut inner = Vec::new();
    let mut outer = Vec::new();
    let mut found = false;

    for (i, height) in heights.iter().enumerate() {
        let record_s = height.s_offset + section_start;
        let next_s = heights
            .get(i + 1)
            .map(|h| h.s_offset + section_start)
            .unwrap_or(es);

        if found {
            if record_s < es {
                inner.push(HeightPoint { s: record_s, height: height.inner });
                outer.push(HeightPoint { s: record_s, height: height.outer });
            } else {
                break;
            }
        } else {
            if next_s <= s {
                continue;
            }
            if (record_s - s).abs() < S_TOLERANCE || (record_s < s && next_s > s) {
                inner.push(HeightPoint { s: record_s, height: height.inner });
                outer.push(HeightPoint { s: record_s, height: height.outer });
                found = true;
            }
        }
    }

    Ok((inner, outer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElevationRecord;

    #[test]
    fn poly_eval_and_shift() {
        let p = Poly3::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(p.eval(0.0), 1.0);
        assert_eq!(p.eval(2.0), 1.0 + 4.0 + 12.0 + 32.0);

        // shifted polynomial evaluates identically on the common domain
        let q = p.shifted(1.5);
        for i in 0..10 {
            let ds = i as f64 * 0.3;
            assert!((q.eval(ds) - p.eval(ds + 1.5)).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_poly() {
        assert!(Poly3::default().is_zero());
        assert!(!Poly3::new(0.0, 0.0, 1e-12, 0.0).is_zero());
    }

    fn elev(s: f64, a: f64) -> ElevationRecord {
        ElevationRecord { s, poly: Poly3::new(a, 0.1, 0.0, 0.0) }
    }

    #[test]
    fn sub_range_clips_and_rebases() {
        let records = vec![elev(0.0, 1.0), elev(10.0, 2.0), elev(20.0, 3.0)];

        // start inside the first record: rebase it to s = 4
        let clipped = sub_range(&records, 4.0, 15.0).unwrap();
        assert_eq!(clipped.len(), 2);
        assert!((clipped[0].s - 4.0).abs() < 1e-12);
        assert!((clipped[0].poly.a - (1.0 + 0.1 * 4.0)).abs() < 1e-12);
        assert_eq!(clipped[1].s, 10.0);

        // exact record boundary keeps the record untouched
        let clipped = sub_range(&records, 10.0, 30.0).unwrap();
        assert_eq!(clipped.len(), 2);
        assert_eq!(clipped[0].s, 10.0);
        assert_eq!(clipped[0].poly.a, 2.0);
    }

    #[test]
    fn sub_range_tolerates_near_coincident_start() {
        // a record starting a hair after s still covers the range start
        let records = vec![elev(5.00005, 2.0)];
        let clipped = sub_range(&records, 5.0, 10.0).unwrap();
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].poly.a, 2.0);
    }

    #[test]
    fn sub_range_rejects_inverted_range() {
        let records = vec![elev(0.0, 0.0)];
        assert!(matches!(
            sub_range(&records, 5.0, 5.0 - 1e-3),
            Err(Error::Range(_))
        ));
    }

    #[test]
    fn active_record_governs_s() {
        let records = vec![elev(0.0, 1.0), elev(10.0, 2.0)];
        let hit = active_by(&records, 3.0, 25.0, |r| r.s).unwrap();
        assert_eq!(hit.poly.a, 1.0);
        let hit = active_by(&records, 10.0, 25.0, |r| r.s).unwrap();
        assert_eq!(hit.poly.a, 2.0);

        // s at the very end returns the last record
        let hit = active_by(&records, 25.0, 25.0, |r| r.s).unwrap();
        assert_eq!(hit.poly.a, 2.0);
    }

    #[test]
    fn lane_heights_split() {
        use crate::model::LaneHeightRecord;
        let heights = vec![
            LaneHeightRecord { s_offset: 0.0, inner: 0.1, outer: 0.2 },
            LaneHeightRecord { s_offset: 5.0, inner: 0.3, outer: 0.4 },
        ];
        let (inner, outer) = lane_height_range(10.0, &heights, 10.0, 20.0).unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0], HeightPoint { s: 10.0, height: 0.1 });
        assert_eq!(outer[1], HeightPoint { s: 15.0, height: 0.4 });
    }
}

//! Numeric helpers over per-frame signals.
//!
//! Signals are `&[Option<f64>]` indexed by frame; `None` is a frame where the
//! value could not be measured. Nothing here knows about poses or videos.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Maximum,
    Minimum,
}

impl Extremum {
    fn orient(self, value: f64) -> f64 {
        match self {
            Extremum::Maximum => value,
            Extremum::Minimum => -value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtremumSearch {
    pub window: Range<usize>,
    /// Half-width, in samples, of the neighbourhood a peak must dominate.
    pub radius: usize,
    /// Required prominence as a fraction of the signal range in the window.
    pub min_prominence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtremumHit {
    pub index: usize,
    pub value: f64,
    /// Prominence relative to the signal range, in `[0, 1]`.
    pub prominence: f64,
}

/// All qualifying extrema of `kind` inside the search window, in frame order.
///
/// A sample qualifies when both direct neighbours are defined, it is the
/// first highest (or lowest) value within `radius` samples on either side,
/// and it stands out from the deepest point of that neighbourhood by at least
/// `min_prominence` of the window's range. Flat or empty signals yield
/// nothing.
pub fn find_extrema(
    samples: &[Option<f64>],
    kind: Extremum,
    search: &ExtremumSearch,
) -> Vec<ExtremumHit> {
    let end = search.window.end.min(samples.len());
    let start = search.window.start.min(end);
    let value = |index: usize| samples[index].filter(|v| v.is_finite()).map(|v| kind.orient(v));

    let Some((low, high)) = value_range(samples, start..end) else {
        return Vec::new();
    };
    let range = high - low;
    if range <= f64::EPSILON * high.abs().max(low.abs()).max(1.0) {
        return Vec::new();
    }

    let mut hits = Vec::new();
    if end < start + 3 {
        return hits;
    }
    for index in (start + 1)..(end - 1) {
        let (Some(prev), Some(current), Some(next)) =
            (value(index - 1), value(index), value(index + 1))
        else {
            continue;
        };
        if !(current > prev && current >= next) {
            continue;
        }

        let lo = index.saturating_sub(search.radius).max(start);
        let hi = (index + search.radius + 1).min(end);
        let mut dominant = true;
        let mut left_floor = f64::INFINITY;
        for candidate in (lo..index).filter_map(|j| value(j)) {
            if candidate >= current {
                dominant = false;
                break;
            }
            left_floor = left_floor.min(candidate);
        }
        let mut right_floor = f64::INFINITY;
        if dominant {
            for candidate in ((index + 1)..hi).filter_map(|j| value(j)) {
                if candidate > current {
                    dominant = false;
                    break;
                }
                right_floor = right_floor.min(candidate);
            }
        }
        if !dominant {
            continue;
        }

        let prominence = (current - left_floor.max(right_floor)) / range;
        if prominence >= search.min_prominence {
            hits.push(ExtremumHit {
                index,
                value: kind.orient(current),
                prominence: prominence.clamp(0.0, 1.0),
            });
        }
    }
    hits
}

/// First qualifying extremum, see [`find_extrema`].
pub fn find_extremum(
    samples: &[Option<f64>],
    kind: Extremum,
    search: &ExtremumSearch,
) -> Option<ExtremumHit> {
    find_extrema(samples, kind, search).into_iter().next()
}

/// Sub-sample position of an extremum by fitting a parabola through the
/// sample and its two neighbours. Falls back to `index` when a neighbour is
/// missing or the three points are collinear.
pub fn refine_index(samples: &[Option<f64>], index: usize) -> f64 {
    let position = index as f64;
    if index == 0 {
        return position;
    }
    let neighbours = (
        samples.get(index - 1).copied().flatten(),
        samples.get(index).copied().flatten(),
        samples.get(index + 1).copied().flatten(),
    );
    let (Some(a), Some(b), Some(c)) = neighbours else {
        return position;
    };
    let curvature = a - 2.0 * b + c;
    if curvature.abs() < 1e-12 {
        return position;
    }
    position + (0.5 * (a - c) / curvature).clamp(-0.5, 0.5)
}

/// Lowest and highest defined value inside `window`.
pub fn value_range(samples: &[Option<f64>], window: Range<usize>) -> Option<(f64, f64)> {
    let end = window.end.min(samples.len());
    let start = window.start.min(end);
    samples[start..end]
        .iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((low, high)) => Some((low.min(v), high.max(v))),
        })
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Fraction of defined samples in `window`.
pub fn coverage(samples: &[Option<f64>], window: Range<usize>) -> f64 {
    let end = window.end.min(samples.len());
    let start = window.start.min(end);
    if end == start {
        return 0.0;
    }
    let defined = samples[start..end].iter().filter(|v| v.is_some()).count();
    defined as f64 / (end - start) as f64
}

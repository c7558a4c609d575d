//! Multilinear interpolation over performance tables.
//!
//! Each axis is bracketed by binary search. Queries outside the sampled
//! range are clamped to the boundary sample unless the table explicitly
//! allows linear extrapolation. Absent cells are never treated as zero:
//! the nearest populated cell along the affected axis is used instead and
//! the result is flagged as incomplete.

use serde::Serialize;
use tracing::debug;

use crate::error::MetricError;
use crate::models::Field;
use crate::table::{Axis, BoundaryPolicy, PerformanceTable};

/// Relative tolerance for treating a query coordinate as a sample hit.
pub const DEFAULT_EXACT_TOLERANCE: f64 = 1e-9;

/// Where a query coordinate fell on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "position", rename_all = "snake_case")]
pub enum AxisPosition {
    Exact { index: usize },
    Between { lower: usize, upper: usize, fraction: f64 },
    Below { extrapolated: bool },
    Above { extrapolated: bool },
}

impl AxisPosition {
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, AxisPosition::Below { .. } | AxisPosition::Above { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisQuery {
    pub field: Field,
    pub requested: f64,
    /// Coordinate actually evaluated (the boundary sample when clamped)
    pub used: f64,
    pub position: AxisPosition,
}

/// Interpolated value plus how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpolation {
    pub value: f64,
    pub within_bounds: bool,
    pub extrapolated: bool,
    pub incomplete_data: bool,
    pub axes: Vec<AxisQuery>,
}

#[derive(Debug, Clone, Copy)]
struct Bracket {
    lower: usize,
    upper: usize,
    fraction: f64,
    coordinate: f64,
}

/// Interpolates tables at query points.
#[derive(Debug, Clone, Copy)]
pub struct Interpolator {
    exact_tolerance: f64,
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(DEFAULT_EXACT_TOLERANCE)
    }
}

impl Interpolator {
    pub fn new(exact_tolerance: f64) -> Self {
        Self {
            exact_tolerance: exact_tolerance.abs(),
        }
    }

    /// Interpolate `table` at `query`, one coordinate per axis in axis order.
    pub fn interpolate(
        &self,
        table: &PerformanceTable,
        query: &[f64],
    ) -> Result<Interpolation, MetricError> {
        if query.len() != table.dimensions() {
            return Err(MetricError::DimensionMismatch {
                metric: table.metric().to_string(),
                expected: table.dimensions(),
                found: query.len(),
            });
        }

        let mut brackets = Vec::with_capacity(query.len());
        let mut axes = Vec::with_capacity(query.len());
        for (axis, &requested) in table.axes().iter().zip(query) {
            if !requested.is_finite() {
                return Err(MetricError::NonFiniteInput {
                    metric: table.metric().to_string(),
                    field: axis.field.clone(),
                });
            }
            let (bracket, position) = self.locate(axis, requested, table.boundary());
            if position.is_out_of_bounds() {
                debug!(
                    metric = table.metric(),
                    field = %axis.field,
                    requested,
                    used = bracket.coordinate,
                    "query outside table range"
                );
            }
            axes.push(AxisQuery {
                field: axis.field.clone(),
                requested,
                used: bracket.coordinate,
                position,
            });
            brackets.push(bracket);
        }

        let mut incomplete_data = false;
        let mut index = Vec::with_capacity(brackets.len());
        let value = evaluate(table, &brackets, &mut index, &mut incomplete_data).ok_or_else(
            || MetricError::NoData {
                metric: table.metric().to_string(),
            },
        )?;

        let out_of_bounds = axes.iter().any(|a| a.position.is_out_of_bounds());
        let extrapolated = out_of_bounds && table.boundary() == BoundaryPolicy::Extrapolate;

        Ok(Interpolation {
            value,
            within_bounds: !out_of_bounds,
            extrapolated,
            incomplete_data,
            axes,
        })
    }

    fn locate(&self, axis: &Axis, q: f64, policy: BoundaryPolicy) -> (Bracket, AxisPosition) {
        let samples = &axis.samples;
        let n = samples.len();
        let hit = |i: usize| Bracket {
            lower: i,
            upper: i,
            fraction: 0.0,
            coordinate: samples[i],
        };

        // first sample >= q
        let upper = samples.partition_point(|&s| s < q);
        let candidates = [upper.checked_sub(1), (upper < n).then_some(upper)];
        if let Some(i) = candidates
            .into_iter()
            .flatten()
            .find(|&i| self.is_exact(samples[i], q))
        {
            return (hit(i), AxisPosition::Exact { index: i });
        }

        let extrapolate = policy == BoundaryPolicy::Extrapolate;
        if q < axis.first() {
            let bracket = if extrapolate {
                segment(samples, 0, q)
            } else {
                hit(0)
            };
            return (bracket, AxisPosition::Below { extrapolated: extrapolate });
        }
        if q > axis.last() {
            let bracket = if extrapolate {
                segment(samples, n - 2, q)
            } else {
                hit(n - 1)
            };
            return (bracket, AxisPosition::Above { extrapolated: extrapolate });
        }

        let bracket = segment(samples, upper - 1, q);
        (
            bracket,
            AxisPosition::Between {
                lower: bracket.lower,
                upper: bracket.upper,
                fraction: bracket.fraction,
            },
        )
    }

    fn is_exact(&self, sample: f64, q: f64) -> bool {
        (sample - q).abs() <= self.exact_tolerance * sample.abs().max(1.0)
    }
}

/// Interpolate with the default exact-match tolerance.
pub fn interpolate(table: &PerformanceTable, query: &[f64]) -> Result<Interpolation, MetricError> {
    Interpolator::default().interpolate(table, query)
}

fn segment(samples: &[f64], lower: usize, q: f64) -> Bracket {
    let (x0, x1) = (samples[lower], samples[lower + 1]);
    Bracket {
        lower,
        upper: lower + 1,
        fraction: (q - x0) / (x1 - x0),
        coordinate: q,
    }
}

fn evaluate(
    table: &PerformanceTable,
    brackets: &[Bracket],
    index: &mut Vec<usize>,
    incomplete: &mut bool,
) -> Option<f64> {
    let dim = index.len();
    if dim == brackets.len() {
        return table.cell(index);
    }

    let b = brackets[dim];
    let direct = if b.lower == b.upper {
        evaluate_at(table, brackets, index, b.lower, incomplete)
    } else {
        let lo = evaluate_at(table, brackets, index, b.lower, incomplete);
        let hi = evaluate_at(table, brackets, index, b.upper, incomplete);
        match (lo, hi) {
            (Some(lo), Some(hi)) => Some(lerp(lo, hi, b.fraction)),
            _ => None,
        }
    };
    if direct.is_some() {
        return direct;
    }

    // Gap in a sparse table: take the nearest populated slice along this axis.
    *incomplete = true;
    let samples = &table.axes()[dim].samples;
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by(|&x, &y| {
        (samples[x] - b.coordinate)
            .abs()
            .total_cmp(&(samples[y] - b.coordinate).abs())
    });
    order
        .into_iter()
        .find_map(|i| evaluate_at(table, brackets, index, i, incomplete))
}

fn evaluate_at(
    table: &PerformanceTable,
    brackets: &[Bracket],
    index: &mut Vec<usize>,
    i: usize,
    incomplete: &mut bool,
) -> Option<f64> {
    index.push(i);
    let value = evaluate(table, brackets, index, incomplete);
    index.pop();
    value
}

fn lerp(lo: f64, hi: f64, fraction: f64) -> f64 {
    let value = lo + (hi - lo) * fraction;
    if (0.0..=1.0).contains(&fraction) {
        value.clamp(lo.min(hi), lo.max(hi))
    } else {
        value
    }
}

//! Performance tables: sampled functions of one to three axes.
//!
//! Tables are validated once on construction and immutable afterwards.

use serde::{Deserialize, Serialize};

use crate::error::DataIntegrityError;
use crate::models::Field;

pub const MAX_AXES: usize = 3;

/// What to do with a query beyond the sampled range of an axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    /// Use the boundary sample (flagged out of bounds)
    #[default]
    Clamp,
    /// Extend the boundary segment linearly (explicit allowance)
    Extrapolate,
}

/// One independent axis of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub field: Field,
    #[serde(default)]
    pub unit: String,
    pub samples: Vec<f64>,
}

impl Axis {
    pub fn new(field: Field, unit: impl Into<String>, samples: Vec<f64>) -> Self {
        Self {
            field,
            unit: unit.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> f64 {
        self.samples[0]
    }

    pub fn last(&self) -> f64 {
        self.samples[self.samples.len() - 1]
    }
}

/// Grid values as they appear in a dataset document.
///
/// `null` marks an absent cell. Nested forms are indexed
/// `[axis0][axis1][axis2]`; the flat form is row-major in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GridValues {
    Flat(Vec<Option<f64>>),
    Rows(Vec<Vec<Option<f64>>>),
    Planes(Vec<Vec<Vec<Option<f64>>>>),
}

/// A table as supplied by the dataset loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub metric: String,
    pub unit: String,
    pub axes: Vec<Axis>,
    pub values: GridValues,
    #[serde(default)]
    pub boundary: BoundaryPolicy,
}

/// A validated, immutable performance table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceTable {
    metric: String,
    unit: String,
    axes: Vec<Axis>,
    cells: Vec<Option<f64>>,
    #[serde(skip)]
    strides: Vec<usize>,
    boundary: BoundaryPolicy,
}

impl PerformanceTable {
    /// Build a table from row-major cells, validating its structure.
    pub fn new(
        metric: impl Into<String>,
        unit: impl Into<String>,
        axes: Vec<Axis>,
        cells: Vec<Option<f64>>,
        boundary: BoundaryPolicy,
    ) -> Result<Self, DataIntegrityError> {
        let metric = metric.into();
        validate_axes(&metric, &axes)?;

        let expected: usize = axes.iter().map(Axis::len).product();
        if cells.len() != expected {
            return Err(DataIntegrityError::GridShape {
                metric,
                expected: format!("{expected} cells"),
                found: format!("{} cells", cells.len()),
            });
        }

        if let Some(index) = cells
            .iter()
            .position(|cell| matches!(cell, Some(v) if !v.is_finite()))
        {
            return Err(DataIntegrityError::NonFiniteValue { metric, index });
        }
        if cells.iter().all(Option::is_none) {
            return Err(DataIntegrityError::EmptyGrid { metric });
        }

        let mut strides = vec![1; axes.len()];
        for dim in (0..axes.len().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * axes[dim + 1].len();
        }

        Ok(Self {
            metric,
            unit: unit.into(),
            axes,
            cells,
            strides,
            boundary,
        })
    }

    /// Build a table from its dataset definition.
    pub fn from_def(def: TableDef) -> Result<Self, DataIntegrityError> {
        validate_axes(&def.metric, &def.axes)?;
        let cells = flatten_grid(&def.metric, &def.axes, def.values)?;
        Self::new(def.metric, def.unit, def.axes, cells, def.boundary)
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn dimensions(&self) -> usize {
        self.axes.len()
    }

    pub fn boundary(&self) -> BoundaryPolicy {
        self.boundary
    }

    /// Cell value at a grid index, `None` if absent.
    pub fn cell(&self, index: &[usize]) -> Option<f64> {
        if index.len() != self.axes.len() {
            return None;
        }
        let mut offset = 0;
        for (dim, &i) in index.iter().enumerate() {
            if i >= self.axes[dim].len() {
                return None;
            }
            offset += i * self.strides[dim];
        }
        self.cells.get(offset).copied().flatten()
    }

    /// Number of populated cells.
    pub fn populated(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

fn validate_axes(metric: &str, axes: &[Axis]) -> Result<(), DataIntegrityError> {
    if axes.is_empty() || axes.len() > MAX_AXES {
        return Err(DataIntegrityError::AxisCount {
            metric: metric.to_string(),
            count: axes.len(),
        });
    }

    for (axis_idx, axis) in axes.iter().enumerate() {
        if axis.field.is_metric() {
            return Err(DataIntegrityError::UnsupportedAxisField {
                metric: metric.to_string(),
                field: axis.field.clone(),
            });
        }
        if axes[..axis_idx].iter().any(|other| other.field == axis.field) {
            return Err(DataIntegrityError::DuplicateAxisField {
                metric: metric.to_string(),
                field: axis.field.clone(),
            });
        }
        if axis.len() < 2 {
            return Err(DataIntegrityError::AxisTooShort {
                metric: metric.to_string(),
                axis: axis_idx,
                count: axis.len(),
            });
        }
        if let Some(index) = axis.samples.iter().position(|s| !s.is_finite()) {
            return Err(DataIntegrityError::NonFiniteSample {
                metric: metric.to_string(),
                axis: axis_idx,
                index,
            });
        }
        if let Some(index) = axis.samples.windows(2).position(|w| w[1] <= w[0]) {
            return Err(DataIntegrityError::AxisNotMonotonic {
                metric: metric.to_string(),
                axis: axis_idx,
                index: index + 1,
            });
        }
    }
    Ok(())
}

fn flatten_grid(
    metric: &str,
    axes: &[Axis],
    values: GridValues,
) -> Result<Vec<Option<f64>>, DataIntegrityError> {
    let lens: Vec<usize> = axes.iter().map(Axis::len).collect();
    let shape_error = |found: String| DataIntegrityError::GridShape {
        metric: metric.to_string(),
        expected: format!("{lens:?}"),
        found,
    };

    match values {
        GridValues::Flat(cells) => Ok(cells),
        GridValues::Rows(rows) => {
            if lens.len() != 2 || rows.len() != lens[0] {
                return Err(shape_error(format!("{} rows", rows.len())));
            }
            if let Some(bad) = rows.iter().find(|row| row.len() != lens[1]) {
                return Err(shape_error(format!("row of {}", bad.len())));
            }
            Ok(rows.into_iter().flatten().collect())
        }
        GridValues::Planes(planes) => {
            if lens.len() != 3 || planes.len() != lens[0] {
                return Err(shape_error(format!("{} planes", planes.len())));
            }
            for plane in &planes {
                if plane.len() != lens[1] {
                    return Err(shape_error(format!("plane of {} rows", plane.len())));
                }
                if let Some(bad) = plane.iter().find(|row| row.len() != lens[2]) {
                    return Err(shape_error(format!("row of {}", bad.len())));
                }
            }
            Ok(planes.into_iter().flatten().flatten().collect())
        }
    }
}

//! Error types for dataset loading and per-metric evaluation.

use serde::Serialize;
use thiserror::Error;

use crate::models::Field;

/// Malformed performance data rejected while a dataset is being loaded.
///
/// Any of these aborts activation of the whole aircraft dataset. They are
/// never produced at query time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("dataset has an empty aircraft id")]
    MissingAircraftId,

    #[error("table '{metric}' declared more than once")]
    DuplicateTable { metric: String },

    #[error("table '{metric}' has {count} axes (expected 1 to 3)")]
    AxisCount { metric: String, count: usize },

    #[error("table '{metric}' axis {axis} has {count} samples (need at least 2)")]
    AxisTooShort {
        metric: String,
        axis: usize,
        count: usize,
    },

    #[error("table '{metric}' axis {axis} is not strictly increasing at index {index}")]
    AxisNotMonotonic {
        metric: String,
        axis: usize,
        index: usize,
    },

    #[error("table '{metric}' axis {axis} has a non-finite sample at index {index}")]
    NonFiniteSample {
        metric: String,
        axis: usize,
        index: usize,
    },

    #[error("table '{metric}' binds field '{field}' on more than one axis")]
    DuplicateAxisField { metric: String, field: Field },

    #[error("table '{metric}' cannot use '{field}' as an axis")]
    UnsupportedAxisField { metric: String, field: Field },

    #[error("table '{metric}' grid shape mismatch: expected {expected}, found {found}")]
    GridShape {
        metric: String,
        expected: String,
        found: String,
    },

    #[error("table '{metric}' has a non-finite value in cell {index}")]
    NonFiniteValue { metric: String, index: usize },

    #[error("table '{metric}' has no populated cells")]
    EmptyGrid { metric: String },

    #[error("correction '{id}' is invalid: {reason}")]
    InvalidCorrection { id: String, reason: String },

    #[error("correction '{id}' is a policy margin but is followed by physical correction '{next}'")]
    CorrectionOrder { id: String, next: String },

    #[error("limit '{id}' declared more than once")]
    DuplicateLimit { id: String },

    #[error("limit '{id}' is invalid: {reason}")]
    InvalidLimit { id: String, reason: String },

    #[error("mass and balance data is invalid: {0}")]
    InvalidMassBalance(String),
}

/// Why a single requested metric could not be computed.
///
/// Reported in that metric's result slot; sibling metrics in the same
/// request are unaffected.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricError {
    #[error("aircraft '{aircraft_id}' is not loaded")]
    UnknownAircraft { aircraft_id: String },

    #[error("no table for metric '{metric}' on aircraft '{aircraft_id}'")]
    NotFound { aircraft_id: String, metric: String },

    #[error("metric '{metric}' needs '{field}' which the conditions do not provide")]
    MissingInput { metric: String, field: Field },

    #[error("metric '{metric}' got a non-finite value for '{field}'")]
    NonFiniteInput { metric: String, field: Field },

    #[error("query for '{metric}' has {found} coordinates, table has {expected} axes")]
    DimensionMismatch {
        metric: String,
        expected: usize,
        found: usize,
    },

    #[error("no populated cell reachable for '{metric}' at the requested point")]
    NoData { metric: String },
}

/// Problems with a load sheet submitted for mass and balance.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadingError {
    #[error("aircraft has no mass and balance data")]
    NoMassBalanceData,

    #[error("unknown loading station '{0}'")]
    UnknownStation(String),

    #[error("station '{station}' loaded with {load_kg} kg, maximum is {max_kg} kg")]
    StationOverload {
        station: String,
        load_kg: f64,
        max_kg: f64,
    },

    #[error("fuel load {fuel_l} l exceeds usable capacity {capacity_l} l")]
    FuelOverload { fuel_l: f64, capacity_l: f64 },

    #[error("load for '{0}' is negative or not finite")]
    InvalidLoad(String),

    #[error("trip fuel exceeds fuel on board")]
    TripFuelExceedsFuel,

    #[error("aircraft '{0}' is not loaded")]
    UnknownAircraft(String),
}

//! Core data models for the performance engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::atmosphere;
use crate::error::MetricError;

const METRIC_PREFIX: &str = "metric:";

/// A quantity of the operating point that a table axis or an envelope
/// limit is expressed in.
///
/// Serialized as a plain string: `"weight"`, `"pressure_altitude"`, ...,
/// or `"metric:<name>"` for the corrected output of another metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Field {
    /// Takeoff (ramp) weight, kg
    Weight,
    /// Landing weight, kg
    LandingWeight,
    /// CG position at takeoff, m aft of datum
    Cg,
    /// CG position at landing, m aft of datum
    LandingCg,
    /// Pressure altitude, ft
    PressureAltitude,
    /// Outside air temperature, °C
    Temperature,
    /// Deviation from ISA temperature, °C
    IsaDeviation,
    /// Density altitude, ft
    DensityAltitude,
    /// Headwind component, kt (negative = tailwind)
    WindComponent,
    /// Crosswind component magnitude, kt
    Crosswind,
    /// Runway slope, percent (positive = uphill)
    Slope,
    /// Corrected output of a computed metric
    Metric(String),
}

impl Field {
    pub fn is_metric(&self) -> bool {
        matches!(self, Field::Metric(_))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Weight => "weight",
            Field::LandingWeight => "landing_weight",
            Field::Cg => "cg",
            Field::LandingCg => "landing_cg",
            Field::PressureAltitude => "pressure_altitude",
            Field::Temperature => "temperature",
            Field::IsaDeviation => "isa_deviation",
            Field::DensityAltitude => "density_altitude",
            Field::WindComponent => "wind_component",
            Field::Crosswind => "crosswind",
            Field::Slope => "slope",
            Field::Metric(name) => return write!(f, "{METRIC_PREFIX}{name}"),
        };
        f.write_str(name)
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let field = match s {
            "weight" => Field::Weight,
            "landing_weight" => Field::LandingWeight,
            "cg" => Field::Cg,
            "landing_cg" => Field::LandingCg,
            "pressure_altitude" => Field::PressureAltitude,
            "temperature" => Field::Temperature,
            "isa_deviation" => Field::IsaDeviation,
            "density_altitude" => Field::DensityAltitude,
            "wind_component" => Field::WindComponent,
            "crosswind" => Field::Crosswind,
            "slope" => Field::Slope,
            other => match other.strip_prefix(METRIC_PREFIX) {
                Some(name) if !name.is_empty() => Field::Metric(name.to_string()),
                _ => return Err(format!("unknown field '{other}'")),
            },
        };
        Ok(field)
    }
}

impl TryFrom<String> for Field {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.to_string()
    }
}

/// Runway surface and contamination state.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceCondition {
    #[default]
    PavedDry,
    PavedWet,
    GrassDry,
    GrassWet,
    Contaminated,
}

/// Wind as supplied by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindInput {
    #[default]
    Calm,
    /// Pre-resolved runway component (positive = headwind)
    Component { headwind_kt: f64 },
    /// Reported wind, resolved against the runway heading
    Reported {
        direction_deg: f64,
        speed_kt: f64,
        runway_heading_deg: f64,
    },
}

impl WindInput {
    /// Returns (headwind component, crosswind magnitude) in knots.
    pub fn components(&self) -> (f64, f64) {
        match *self {
            WindInput::Calm => (0.0, 0.0),
            WindInput::Component { headwind_kt } => (headwind_kt, 0.0),
            WindInput::Reported {
                direction_deg,
                speed_kt,
                runway_heading_deg,
            } => (
                atmosphere::headwind_component(direction_deg, speed_kt, runway_heading_deg),
                atmosphere::crosswind_component(direction_deg, speed_kt, runway_heading_deg).abs(),
            ),
        }
    }
}

/// Runway descriptor for the leg's departure or arrival.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunwayDescriptor {
    /// Slope in percent, positive = uphill in the direction of travel
    #[serde(default)]
    pub slope_percent: f64,
    #[serde(default)]
    pub surface: SurfaceCondition,
}

/// Flight conditions supplied with a performance request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightConditions {
    pub weight_kg: f64,
    #[serde(default)]
    pub cg_m: Option<f64>,
    pub pressure_altitude_ft: f64,
    pub temperature_c: f64,
    #[serde(default)]
    pub wind: WindInput,
    #[serde(default)]
    pub runway: RunwayDescriptor,
    /// Explicit landing weight; takes precedence over `trip_fuel_kg`
    #[serde(default)]
    pub landing_weight_kg: Option<f64>,
    #[serde(default)]
    pub landing_cg_m: Option<f64>,
    /// Fuel burned on the leg, used to derive landing weight
    #[serde(default)]
    pub trip_fuel_kg: Option<f64>,
}

impl FlightConditions {
    /// Create conditions with calm wind on a dry, level, paved runway.
    pub fn new(weight_kg: f64, pressure_altitude_ft: f64, temperature_c: f64) -> Self {
        Self {
            weight_kg,
            cg_m: None,
            pressure_altitude_ft,
            temperature_c,
            wind: WindInput::Calm,
            runway: RunwayDescriptor::default(),
            landing_weight_kg: None,
            landing_cg_m: None,
            trip_fuel_kg: None,
        }
    }

    pub fn with_cg(mut self, cg_m: f64) -> Self {
        self.cg_m = Some(cg_m);
        self
    }

    pub fn with_wind(mut self, wind: WindInput) -> Self {
        self.wind = wind;
        self
    }

    pub fn with_runway(mut self, slope_percent: f64, surface: SurfaceCondition) -> Self {
        self.runway = RunwayDescriptor {
            slope_percent,
            surface,
        };
        self
    }

    pub fn with_landing_weight(mut self, landing_weight_kg: f64) -> Self {
        self.landing_weight_kg = Some(landing_weight_kg);
        self
    }

    pub fn with_trip_fuel(mut self, trip_fuel_kg: f64) -> Self {
        self.trip_fuel_kg = Some(trip_fuel_kg);
        self
    }
}

/// The resolved query a performance request is evaluated at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatingPoint {
    pub weight_kg: f64,
    pub landing_weight_kg: Option<f64>,
    pub cg_m: Option<f64>,
    pub landing_cg_m: Option<f64>,
    pub pressure_altitude_ft: f64,
    pub temperature_c: f64,
    pub headwind_kt: f64,
    pub crosswind_kt: f64,
    pub slope_percent: f64,
    pub surface: SurfaceCondition,
    /// Corrected metric outputs, filled in by the engine before validation
    pub metrics: BTreeMap<String, f64>,
}

impl OperatingPoint {
    pub fn from_conditions(conditions: &FlightConditions) -> Self {
        let (headwind_kt, crosswind_kt) = conditions.wind.components();
        let landing_weight_kg = conditions.landing_weight_kg.or_else(|| {
            conditions
                .trip_fuel_kg
                .map(|trip| conditions.weight_kg - trip)
        });

        Self {
            weight_kg: conditions.weight_kg,
            landing_weight_kg,
            cg_m: conditions.cg_m,
            landing_cg_m: conditions.landing_cg_m,
            pressure_altitude_ft: conditions.pressure_altitude_ft,
            temperature_c: conditions.temperature_c,
            headwind_kt,
            crosswind_kt,
            slope_percent: conditions.runway.slope_percent,
            surface: conditions.runway.surface,
            metrics: BTreeMap::new(),
        }
    }

    /// Value of `field` at this point, if known.
    pub fn value(&self, field: &Field) -> Option<f64> {
        match field {
            Field::Weight => Some(self.weight_kg),
            Field::LandingWeight => self.landing_weight_kg,
            Field::Cg => self.cg_m,
            Field::LandingCg => self.landing_cg_m,
            Field::PressureAltitude => Some(self.pressure_altitude_ft),
            Field::Temperature => Some(self.temperature_c),
            Field::IsaDeviation => Some(atmosphere::isa_deviation_c(
                self.pressure_altitude_ft,
                self.temperature_c,
            )),
            Field::DensityAltitude => Some(atmosphere::density_altitude_ft(
                self.pressure_altitude_ft,
                self.temperature_c,
            )),
            Field::WindComponent => Some(self.headwind_kt),
            Field::Crosswind => Some(self.crosswind_kt),
            Field::Slope => Some(self.slope_percent),
            Field::Metric(name) => self.metrics.get(name).copied(),
        }
    }
}

/// Severity of an envelope violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational only
    Info,
    /// Advisory margin exceeded, result stays valid
    Soft,
    /// Certified limit exceeded, result is invalid
    Hard,
}

/// An envelope limit the operating point does not satisfy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub limit_id: String,
    pub severity: Severity,
    pub fields: Vec<Field>,
    /// Measured values in `fields` order; empty when the limit could not
    /// be evaluated
    pub measured: Vec<f64>,
    pub bound: String,
    pub message: String,
}

/// Non-fatal condition attached to a computed metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Query clamped to the table boundary
    OutOfBounds {
        metric: String,
        field: Field,
        requested: f64,
        used: f64,
    },
    /// Query linearly extrapolated under an explicit allowance
    Extrapolated {
        metric: String,
        field: Field,
        requested: f64,
        nearest_sample: f64,
    },
    /// Sparse table: nearest populated cell used in place of a gap
    IncompleteData { metric: String },
}

/// One correction applied to a metric, with its individual contribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedCorrection {
    pub id: String,
    pub kind: String,
    pub input: f64,
    pub output: f64,
    pub delta: f64,
    pub delta_percent: f64,
}

/// A successfully computed metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricResult {
    pub metric: String,
    pub unit: String,
    /// Interpolated table value before corrections
    pub base_value: f64,
    /// Value after the correction pipeline
    pub value: f64,
    pub within_bounds: bool,
    pub extrapolated: bool,
    pub incomplete_data: bool,
    pub corrections: Vec<AppliedCorrection>,
}

impl MetricResult {
    /// Whether this metric may be relied on for validity purposes.
    pub fn bounds_acceptable(&self) -> bool {
        self.within_bounds || self.extrapolated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricOutcome {
    Computed(MetricResult),
    Failed(MetricError),
}

/// Result slot for one requested metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSlot {
    pub metric: String,
    pub outcome: MetricOutcome,
}

/// Output of a performance computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceResult {
    pub aircraft_id: String,
    pub dataset_version: Option<String>,
    pub metrics: Vec<MetricSlot>,
    pub operating_point: OperatingPoint,
    pub warnings: Vec<Warning>,
    pub violations: Vec<Violation>,
    pub valid: bool,
    pub computed_at: DateTime<Utc>,
}

impl PerformanceResult {
    /// Look up a computed metric by name.
    pub fn metric(&self, name: &str) -> Option<&MetricResult> {
        self.metrics.iter().find_map(|slot| match &slot.outcome {
            MetricOutcome::Computed(result) if slot.metric == name => Some(result),
            _ => None,
        })
    }

    /// Look up the failure for a metric by name.
    pub fn failure(&self, name: &str) -> Option<&MetricError> {
        self.metrics.iter().find_map(|slot| match &slot.outcome {
            MetricOutcome::Failed(err) if slot.metric == name => Some(err),
            _ => None,
        })
    }

    pub fn all_metrics_resolved(&self) -> bool {
        self.metrics
            .iter()
            .all(|slot| matches!(slot.outcome, MetricOutcome::Computed(_)))
    }

    pub fn hard_violations(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Hard)
    }
}

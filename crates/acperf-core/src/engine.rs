//! Performance orchestration.
//!
//! Resolves tables from the store, interpolates each requested metric, runs
//! the correction pipeline, then validates the operating point (including
//! the corrected metric values) against the aircraft's envelope limits.

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::envelope;
use crate::error::{LoadingError, MetricError};
use crate::interpolation::{AxisPosition, Interpolator, DEFAULT_EXACT_TOLERANCE};
use crate::loading::{LoadSheet, LoadingSummary};
use crate::models::{
    FlightConditions, MetricOutcome, MetricResult, MetricSlot, OperatingPoint, PerformanceResult,
    Severity, Warning,
};
use crate::table_store::{AircraftSnapshot, TableStore};

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Evaluate metrics concurrently when more than one is requested
    pub parallel_metrics: bool,
    /// Relative tolerance for exact sample hits
    pub exact_match_tolerance: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_metrics: true,
            exact_match_tolerance: DEFAULT_EXACT_TOLERANCE,
        }
    }
}

/// Computes performance figures against the snapshots in a [`TableStore`].
#[derive(Debug, Clone)]
pub struct PerformanceEngine {
    store: Arc<TableStore>,
    config: EngineConfig,
    interpolator: Interpolator,
}

impl PerformanceEngine {
    pub fn new(store: Arc<TableStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<TableStore>, config: EngineConfig) -> Self {
        Self {
            store,
            interpolator: Interpolator::new(config.exact_match_tolerance),
            config,
        }
    }

    pub fn store(&self) -> &Arc<TableStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compute `metrics` for one flight leg.
    ///
    /// Always returns a result. A metric that cannot be computed reports its
    /// error in its own slot; the others are unaffected. `valid` is false
    /// when a hard limit is violated or a metric was clamped at a table
    /// boundary without an extrapolation allowance.
    pub fn compute_performance<S>(
        &self,
        aircraft_id: &str,
        metrics: &[S],
        conditions: &FlightConditions,
    ) -> PerformanceResult
    where
        S: AsRef<str> + Sync,
    {
        let mut point = OperatingPoint::from_conditions(conditions);

        let Some(snapshot) = self.store.snapshot(aircraft_id) else {
            warn!(aircraft = aircraft_id, "performance requested for unknown aircraft");
            let slots = metrics
                .iter()
                .map(|m| MetricSlot {
                    metric: m.as_ref().to_string(),
                    outcome: MetricOutcome::Failed(MetricError::UnknownAircraft {
                        aircraft_id: aircraft_id.to_string(),
                    }),
                })
                .collect();
            return PerformanceResult {
                aircraft_id: aircraft_id.to_string(),
                dataset_version: None,
                metrics: slots,
                operating_point: point,
                warnings: Vec::new(),
                violations: Vec::new(),
                valid: false,
                computed_at: Utc::now(),
            };
        };

        let evaluate = |metric: &str| self.evaluate_metric(&snapshot, metric, &point);
        let evaluated: Vec<(MetricSlot, Vec<Warning>)> =
            if self.config.parallel_metrics && metrics.len() > 1 {
                metrics.par_iter().map(|m| evaluate(m.as_ref())).collect()
            } else {
                metrics.iter().map(|m| evaluate(m.as_ref())).collect()
            };

        let mut slots = Vec::with_capacity(evaluated.len());
        let mut warnings = Vec::new();
        for (slot, metric_warnings) in evaluated {
            if let MetricOutcome::Computed(result) = &slot.outcome {
                point.metrics.insert(result.metric.clone(), result.value);
            }
            warnings.extend(metric_warnings);
            slots.push(slot);
        }

        let violations = envelope::validate(&point, snapshot.limits());

        let bounds_ok = slots.iter().all(|slot| match &slot.outcome {
            MetricOutcome::Computed(result) => result.bounds_acceptable(),
            MetricOutcome::Failed(_) => true,
        });
        let hard = violations.iter().any(|v| v.severity == Severity::Hard);

        debug!(
            aircraft = aircraft_id,
            metrics = slots.len(),
            warnings = warnings.len(),
            violations = violations.len(),
            valid = bounds_ok && !hard,
            "performance computed"
        );

        PerformanceResult {
            aircraft_id: snapshot.aircraft_id.clone(),
            dataset_version: snapshot.version.clone(),
            metrics: slots,
            operating_point: point,
            warnings,
            violations,
            valid: bounds_ok && !hard,
            computed_at: Utc::now(),
        }
    }

    /// Run mass and balance for a load sheet, then compute performance at
    /// the resulting takeoff and landing weight/CG.
    pub fn compute_with_loading<S>(
        &self,
        aircraft_id: &str,
        metrics: &[S],
        conditions: &FlightConditions,
        sheet: &LoadSheet,
    ) -> Result<(LoadingSummary, PerformanceResult), LoadingError>
    where
        S: AsRef<str> + Sync,
    {
        let summary = self.mass_balance(aircraft_id, sheet)?;
        let mut conditions = conditions.clone();
        summary.apply_to(&mut conditions);
        let result = self.compute_performance(aircraft_id, metrics, &conditions);
        Ok((summary, result))
    }

    pub fn mass_balance(
        &self,
        aircraft_id: &str,
        sheet: &LoadSheet,
    ) -> Result<LoadingSummary, LoadingError> {
        let snapshot = self
            .store
            .snapshot(aircraft_id)
            .ok_or_else(|| LoadingError::UnknownAircraft(aircraft_id.to_string()))?;
        snapshot
            .mass_balance()
            .ok_or(LoadingError::NoMassBalanceData)?
            .compute(sheet)
    }

    fn evaluate_metric(
        &self,
        snapshot: &AircraftSnapshot,
        metric: &str,
        point: &OperatingPoint,
    ) -> (MetricSlot, Vec<Warning>) {
        match self.compute_metric(snapshot, metric, point) {
            Ok((result, warnings)) => (
                MetricSlot {
                    metric: metric.to_string(),
                    outcome: MetricOutcome::Computed(result),
                },
                warnings,
            ),
            Err(err) => {
                warn!(
                    aircraft = %snapshot.aircraft_id,
                    metric,
                    error = %err,
                    "metric not computed"
                );
                (
                    MetricSlot {
                        metric: metric.to_string(),
                        outcome: MetricOutcome::Failed(err),
                    },
                    Vec::new(),
                )
            }
        }
    }

    fn compute_metric(
        &self,
        snapshot: &AircraftSnapshot,
        metric: &str,
        point: &OperatingPoint,
    ) -> Result<(MetricResult, Vec<Warning>), MetricError> {
        let table = snapshot
            .table(metric)
            .ok_or_else(|| MetricError::NotFound {
                aircraft_id: snapshot.aircraft_id.clone(),
                metric: metric.to_string(),
            })?;

        let query = table
            .axes()
            .iter()
            .map(|axis| {
                point
                    .value(&axis.field)
                    .ok_or_else(|| MetricError::MissingInput {
                        metric: metric.to_string(),
                        field: axis.field.clone(),
                    })
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let interpolation = self.interpolator.interpolate(&table, &query)?;

        let mut warnings = Vec::new();
        for (axis, q) in table.axes().iter().zip(&interpolation.axes) {
            let nearest_sample = match q.position {
                AxisPosition::Below { .. } => axis.first(),
                AxisPosition::Above { .. } => axis.last(),
                _ => continue,
            };
            let extrapolated = matches!(
                q.position,
                AxisPosition::Below { extrapolated: true }
                    | AxisPosition::Above { extrapolated: true }
            );
            warn!(
                metric,
                field = %q.field,
                requested = q.requested,
                nearest_sample,
                extrapolated,
                "query outside table range"
            );
            warnings.push(if extrapolated {
                Warning::Extrapolated {
                    metric: metric.to_string(),
                    field: q.field.clone(),
                    requested: q.requested,
                    nearest_sample,
                }
            } else {
                Warning::OutOfBounds {
                    metric: metric.to_string(),
                    field: q.field.clone(),
                    requested: q.requested,
                    used: q.used,
                }
            });
        }
        if interpolation.incomplete_data {
            warn!(metric, "sparse table, nearest populated cell used");
            warnings.push(Warning::IncompleteData {
                metric: metric.to_string(),
            });
        }

        let corrected = snapshot.pipeline().apply(interpolation.value, metric, point);
        debug!(
            metric,
            base = interpolation.value,
            value = corrected.value,
            corrections = corrected.applied.len(),
            "metric computed"
        );

        let result = MetricResult {
            metric: metric.to_string(),
            unit: table.unit().to_string(),
            base_value: interpolation.value,
            value: corrected.value,
            within_bounds: interpolation.within_bounds,
            extrapolated: interpolation.extrapolated,
            incomplete_data: interpolation.incomplete_data,
            corrections: corrected.applied,
        };
        Ok((result, warnings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_store::AircraftDataset;

    fn engine(config: EngineConfig) -> PerformanceEngine {
        let dataset = AircraftDataset::from_json(
            r#"{
                "aircraft_id": "C152",
                "tables": [
                    {
                        "metric": "takeoff_distance",
                        "unit": "m",
                        "axes": [{"field": "weight", "samples": [600, 700, 800]}],
                        "values": [300, 360, 450]
                    },
                    {
                        "metric": "climb_rate",
                        "unit": "fpm",
                        "axes": [{"field": "pressure_altitude", "samples": [0, 4000, 8000]}],
                        "values": [700, 550, 400]
                    }
                ]
            }"#,
        )
        .unwrap();
        let store = Arc::new(TableStore::new());
        store.load(dataset).unwrap();
        PerformanceEngine::with_config(store, config)
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let conditions = FlightConditions::new(650.0, 2000.0, 15.0);
        let metrics = ["takeoff_distance", "climb_rate", "landing_distance"];

        let parallel =
            engine(EngineConfig::default()).compute_performance("C152", &metrics, &conditions);
        let sequential = engine(EngineConfig {
            parallel_metrics: false,
            ..EngineConfig::default()
        })
        .compute_performance("C152", &metrics, &conditions);

        assert_eq!(parallel.metrics, sequential.metrics);
        let names: Vec<&str> = parallel.metrics.iter().map(|s| s.metric.as_str()).collect();
        assert_eq!(names, metrics);
        assert!((parallel.metric("climb_rate").unwrap().value - 625.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_aircraft() {
        let result = engine(EngineConfig::default()).compute_performance(
            "B737",
            &["takeoff_distance"],
            &FlightConditions::new(650.0, 0.0, 15.0),
        );
        assert!(!result.valid);
        assert!(matches!(
            result.failure("takeoff_distance"),
            Some(MetricError::UnknownAircraft { .. })
        ));
    }

    #[test]
    fn test_mass_balance_without_data() {
        let err = engine(EngineConfig::default())
            .mass_balance("C152", &LoadSheet::default())
            .unwrap_err();
        assert_eq!(err, LoadingError::NoMassBalanceData);
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"parallel_metrics": false}"#).unwrap();
        assert!(!config.parallel_metrics);
        assert_eq!(config.exact_match_tolerance, DEFAULT_EXACT_TOLERANCE);
    }
}

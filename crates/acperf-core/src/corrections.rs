//! Ordered correction pipeline applied to interpolated table values.
//!
//! Corrections run strictly in declaration order, each receiving the
//! output of the previous one. Physical corrections (wind, slope, surface,
//! fixed offsets) must all precede policy margins; this is checked when the
//! pipeline is built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::DataIntegrityError;
use crate::models::{AppliedCorrection, OperatingPoint, SurfaceCondition};

/// "`percent` % per `per_knots` kt" as printed in flight manuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindFactor {
    pub percent: f64,
    pub per_knots: f64,
}

impl WindFactor {
    pub fn percent_per_knot(&self) -> f64 {
        self.percent / self.per_knots
    }

    fn validate(&self, id: &str, label: &str) -> Result<(), DataIntegrityError> {
        if !self.percent.is_finite() || self.percent < 0.0 {
            return Err(invalid(id, format!("{label} percent must be a non-negative number")));
        }
        if !self.per_knots.is_finite() || self.per_knots <= 0.0 {
            return Err(invalid(id, format!("{label} per_knots must be positive")));
        }
        Ok(())
    }
}

/// Multiplicative factors by surface condition.
///
/// The defaults are typical light-aircraft values; a condition absent from
/// the map is left uncorrected.
pub fn default_surface_factors() -> BTreeMap<SurfaceCondition, f64> {
    BTreeMap::from([
        (SurfaceCondition::PavedWet, 1.10),
        (SurfaceCondition::GrassDry, 1.15),
        // grass and wet compounded
        (SurfaceCondition::GrassWet, 1.265),
        (SurfaceCondition::Contaminated, 1.25),
    ])
}

/// The closed set of correction strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Headwind credit / tailwind penalty, asymmetric
    Wind {
        headwind: WindFactor,
        tailwind: WindFactor,
    },
    /// Signed percent change per percent of grade
    Slope {
        uphill_percent_per_percent: f64,
        downhill_percent_per_percent: f64,
    },
    Surface {
        #[serde(default = "default_surface_factors")]
        factors: BTreeMap<SurfaceCondition, f64>,
    },
    /// Absolute allowance in the metric's unit
    Offset { amount: f64 },
    /// Operator safety margin, applied after all physical corrections
    SafetyMargin { percent: f64 },
}

impl CorrectionKind {
    pub fn name(&self) -> &'static str {
        match self {
            CorrectionKind::Wind { .. } => "wind",
            CorrectionKind::Slope { .. } => "slope",
            CorrectionKind::Surface { .. } => "surface",
            CorrectionKind::Offset { .. } => "offset",
            CorrectionKind::SafetyMargin { .. } => "safety_margin",
        }
    }

    /// Policy corrections express operator rules rather than aircraft physics.
    pub fn is_policy(&self) -> bool {
        matches!(self, CorrectionKind::SafetyMargin { .. })
    }

    /// The effect at `point`, or `None` if the correction does not apply.
    fn effect(&self, point: &OperatingPoint) -> Option<Effect> {
        match self {
            CorrectionKind::Wind { headwind, tailwind } => {
                let wind = point.headwind_kt;
                if wind > 0.0 {
                    Some(Effect::Percent(-headwind.percent_per_knot() * wind))
                } else if wind < 0.0 {
                    Some(Effect::Percent(tailwind.percent_per_knot() * -wind))
                } else {
                    None
                }
            }
            CorrectionKind::Slope {
                uphill_percent_per_percent,
                downhill_percent_per_percent,
            } => {
                let slope = point.slope_percent;
                if slope > 0.0 {
                    Some(Effect::Percent(uphill_percent_per_percent * slope))
                } else if slope < 0.0 {
                    Some(Effect::Percent(downhill_percent_per_percent * -slope))
                } else {
                    None
                }
            }
            CorrectionKind::Surface { factors } => factors
                .get(&point.surface)
                .copied()
                .filter(|&f| f != 1.0)
                .map(Effect::Factor),
            CorrectionKind::Offset { amount } => {
                (*amount != 0.0).then_some(Effect::Offset(*amount))
            }
            CorrectionKind::SafetyMargin { percent } => {
                (*percent != 0.0).then_some(Effect::Percent(*percent))
            }
        }
    }

    fn validate(&self, id: &str) -> Result<(), DataIntegrityError> {
        match self {
            CorrectionKind::Wind { headwind, tailwind } => {
                headwind.validate(id, "headwind")?;
                tailwind.validate(id, "tailwind")
            }
            CorrectionKind::Slope {
                uphill_percent_per_percent,
                downhill_percent_per_percent,
            } => {
                let finite = uphill_percent_per_percent.is_finite()
                    && downhill_percent_per_percent.is_finite();
                if finite {
                    Ok(())
                } else {
                    Err(invalid(id, "slope rates must be finite".to_string()))
                }
            }
            CorrectionKind::Surface { factors } => match factors
                .iter()
                .find(|(_, f)| !f.is_finite() || **f <= 0.0)
            {
                Some((surface, f)) => Err(invalid(
                    id,
                    format!("factor {f} for {surface:?} must be positive"),
                )),
                None => Ok(()),
            },
            CorrectionKind::Offset { amount } => {
                if amount.is_finite() {
                    Ok(())
                } else {
                    Err(invalid(id, "offset must be finite".to_string()))
                }
            }
            CorrectionKind::SafetyMargin { percent } => {
                if percent.is_finite() && *percent >= 0.0 {
                    Ok(())
                } else {
                    Err(invalid(id, "margin must be a non-negative percentage".to_string()))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Effect {
    Percent(f64),
    Factor(f64),
    Offset(f64),
}

/// A named correction with its applicability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub id: String,
    /// Metrics this correction applies to; empty means all
    #[serde(default)]
    pub applies_to: Vec<String>,
    #[serde(flatten)]
    pub kind: CorrectionKind,
}

impl Correction {
    pub fn new(id: impl Into<String>, kind: CorrectionKind) -> Self {
        Self {
            id: id.into(),
            applies_to: Vec::new(),
            kind,
        }
    }

    pub fn for_metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.applies_to = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn applies_to_metric(&self, metric: &str) -> bool {
        self.applies_to.is_empty() || self.applies_to.iter().any(|m| m == metric)
    }
}

/// How physical corrections combine with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combination {
    /// Each correction acts on the previous correction's output
    #[default]
    Compound,
    /// Each physical delta is taken against the pipeline input and summed
    Additive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionSettings {
    #[serde(default)]
    pub combination: Combination,
}

/// Output of running the pipeline on one value.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub value: f64,
    pub applied: Vec<AppliedCorrection>,
}

/// An ordered list of corrections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrectionPipeline {
    corrections: Vec<Correction>,
    combination: Combination,
}

impl CorrectionPipeline {
    pub fn new(
        corrections: Vec<Correction>,
        combination: Combination,
    ) -> Result<Self, DataIntegrityError> {
        for (i, correction) in corrections.iter().enumerate() {
            if correction.id.trim().is_empty() {
                return Err(invalid("", "correction id is empty".to_string()));
            }
            if corrections[..i].iter().any(|c| c.id == correction.id) {
                return Err(invalid(&correction.id, "duplicate id".to_string()));
            }
            correction.kind.validate(&correction.id)?;
        }

        let first_policy = corrections.iter().position(|c| c.kind.is_policy());
        if let Some(start) = first_policy {
            if let Some(next) = corrections[start..].iter().find(|c| !c.kind.is_policy()) {
                return Err(DataIntegrityError::CorrectionOrder {
                    id: corrections[start].id.clone(),
                    next: next.id.clone(),
                });
            }
        }

        Ok(Self {
            corrections,
            combination,
        })
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    pub fn combination(&self) -> Combination {
        self.combination
    }

    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }

    /// Run every applicable correction, in order, on `base`.
    pub fn apply(&self, base: f64, metric: &str, point: &OperatingPoint) -> CorrectionOutcome {
        let mut value = base;
        let mut applied = Vec::new();

        for correction in &self.corrections {
            if !correction.applies_to_metric(metric) {
                continue;
            }
            let Some(effect) = correction.kind.effect(point) else {
                continue;
            };

            // Additive mode takes physical deltas against the pipeline input.
            let reference = match self.combination {
                Combination::Additive if !correction.kind.is_policy() => base,
                _ => value,
            };
            let delta = match effect {
                Effect::Percent(p) => reference * p / 100.0,
                Effect::Factor(f) => reference * (f - 1.0),
                Effect::Offset(a) => a,
            };
            // A non-negative figure is floored at zero; signed metrics pass through.
            let raw = value + delta;
            let output = if value >= 0.0 && raw < 0.0 { 0.0 } else { raw };

            debug!(
                metric,
                correction = %correction.id,
                kind = correction.kind.name(),
                input = value,
                output,
                "applied correction"
            );

            applied.push(AppliedCorrection {
                id: correction.id.clone(),
                kind: correction.kind.name().to_string(),
                input: value,
                output,
                delta: output - value,
                delta_percent: if value != 0.0 {
                    (output - value) / value * 100.0
                } else {
                    0.0
                },
            });
            value = output;
        }

        CorrectionOutcome { value, applied }
    }
}

/// Convenience wrapper matching the pipeline contract.
pub fn apply_corrections(
    pipeline: &CorrectionPipeline,
    base: f64,
    metric: &str,
    point: &OperatingPoint,
) -> CorrectionOutcome {
    pipeline.apply(base, metric, point)
}

fn invalid(id: &str, reason: String) -> DataIntegrityError {
    DataIntegrityError::InvalidCorrection {
        id: id.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FlightConditions, WindInput};

    fn point(headwind_kt: f64, slope: f64, surface: SurfaceCondition) -> OperatingPoint {
        let conditions = FlightConditions::new(1000.0, 0.0, 15.0)
            .with_wind(WindInput::Component { headwind_kt })
            .with_runway(slope, surface);
        OperatingPoint::from_conditions(&conditions)
    }

    fn wind() -> Correction {
        Correction::new(
            "wind",
            CorrectionKind::Wind {
                headwind: WindFactor {
                    percent: 10.0,
                    per_knots: 10.0,
                },
                tailwind: WindFactor {
                    percent: 10.0,
                    per_knots: 5.0,
                },
            },
        )
    }

    fn margin(percent: f64) -> Correction {
        Correction::new("margin", CorrectionKind::SafetyMargin { percent })
    }

    #[test]
    fn test_tailwind_then_margin() {
        let pipeline =
            CorrectionPipeline::new(vec![wind(), margin(15.0)], Combination::Compound).unwrap();
        let p = point(-10.0, 0.0, SurfaceCondition::PavedDry);
        let outcome = pipeline.apply(500.0, "landing_distance", &p);

        assert!((outcome.value - 690.0).abs() < 1e-9);
        assert_eq!(outcome.applied.len(), 2);
        assert_eq!(outcome.applied[0].id, "wind");
        assert!((outcome.applied[0].delta - 100.0).abs() < 1e-9);
        assert_eq!(outcome.applied[1].id, "margin");
        assert!((outcome.applied[1].delta - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_headwind_credit() {
        let pipeline = CorrectionPipeline::new(vec![wind()], Combination::Compound).unwrap();
        let p = point(10.0, 0.0, SurfaceCondition::PavedDry);
        let outcome = pipeline.apply(400.0, "takeoff_distance", &p);
        assert!((outcome.value - 360.0).abs() < 1e-9);
    }

    #[test]
    fn test_skips_inapplicable_corrections() {
        let slope = Correction::new(
            "slope",
            CorrectionKind::Slope {
                uphill_percent_per_percent: 10.0,
                downhill_percent_per_percent: -5.0,
            },
        )
        .for_metrics(["takeoff_distance"]);
        let surface = Correction::new(
            "surface",
            CorrectionKind::Surface {
                factors: default_surface_factors(),
            },
        );
        let pipeline =
            CorrectionPipeline::new(vec![slope, surface], Combination::Compound).unwrap();

        // Slope is takeoff-only; dry paved has no surface factor
        let paved = point(0.0, 2.0, SurfaceCondition::PavedDry);
        let outcome = pipeline.apply(500.0, "landing_distance", &paved);
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.value, 500.0);

        let grass = point(0.0, 2.0, SurfaceCondition::GrassDry);
        let outcome = pipeline.apply(500.0, "takeoff_distance", &grass);
        // 500 * 1.2 * 1.15
        assert!((outcome.value - 690.0).abs() < 1e-9);
        assert_eq!(outcome.applied.len(), 2);
    }

    #[test]
    fn test_order_matters_with_offset() {
        let offset = Correction::new("allowance", CorrectionKind::Offset { amount: 50.0 });
        let forward =
            CorrectionPipeline::new(vec![wind(), offset.clone()], Combination::Compound).unwrap();
        let reverse =
            CorrectionPipeline::new(vec![offset, wind()], Combination::Compound).unwrap();
        let p = point(-10.0, 0.0, SurfaceCondition::PavedDry);

        let a = forward.apply(500.0, "landing_distance", &p).value;
        let b = reverse.apply(500.0, "landing_distance", &p).value;
        assert!((a - 650.0).abs() < 1e-9);
        assert!((b - 660.0).abs() < 1e-9);
    }

    #[test]
    fn test_additive_combination() {
        let slope = Correction::new(
            "slope",
            CorrectionKind::Slope {
                uphill_percent_per_percent: 10.0,
                downhill_percent_per_percent: 0.0,
            },
        );
        let compound =
            CorrectionPipeline::new(vec![wind(), slope.clone()], Combination::Compound).unwrap();
        let additive =
            CorrectionPipeline::new(vec![wind(), slope], Combination::Additive).unwrap();
        let p = point(-10.0, 1.0, SurfaceCondition::PavedDry);

        // 500 * 1.2 * 1.1 vs 500 * (1 + 0.2 + 0.1)
        assert!((compound.apply(500.0, "m", &p).value - 660.0).abs() < 1e-9);
        assert!((additive.apply(500.0, "m", &p).value - 650.0).abs() < 1e-9);
    }

    #[test]
    fn test_additive_margin_applies_to_corrected_value() {
        let slope = Correction::new(
            "slope",
            CorrectionKind::Slope {
                uphill_percent_per_percent: 10.0,
                downhill_percent_per_percent: 0.0,
            },
        );
        let pipeline =
            CorrectionPipeline::new(vec![wind(), slope, margin(15.0)], Combination::Additive)
                .unwrap();
        let outcome = pipeline.apply(500.0, "m", &point(-10.0, 1.0, SurfaceCondition::PavedDry));

        // 500 * (1 + 0.2 + 0.1) = 650, then 650 * 1.15
        assert!((outcome.value - 747.5).abs() < 1e-9);
        let deltas: Vec<f64> = outcome.applied.iter().map(|a| a.delta).collect();
        assert!((deltas[0] - 100.0).abs() < 1e-9);
        assert!((deltas[1] - 50.0).abs() < 1e-9);
        assert!((deltas[2] - 97.5).abs() < 1e-9);
        assert!((outcome.applied[2].input - 650.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_base_not_floored() {
        let offset = Correction::new("allowance", CorrectionKind::Offset { amount: 20.0 });
        let pipeline = CorrectionPipeline::new(vec![offset], Combination::Compound).unwrap();
        let p = point(0.0, 0.0, SurfaceCondition::PavedDry);

        let outcome = pipeline.apply(-100.0, "climb_rate", &p);
        assert!((outcome.value + 80.0).abs() < 1e-9);
        assert!((outcome.applied[0].delta - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_credit_floors_positive_value_at_zero() {
        let offset = Correction::new("credit", CorrectionKind::Offset { amount: -150.0 });
        let pipeline = CorrectionPipeline::new(vec![offset], Combination::Compound).unwrap();
        let p = point(0.0, 0.0, SurfaceCondition::PavedDry);

        let outcome = pipeline.apply(100.0, "ground_roll", &p);
        assert_eq!(outcome.value, 0.0);
        assert!((outcome.applied[0].delta + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_grass_wet_compounds_grass_and_wet() {
        let factors = default_surface_factors();
        let grass_wet = factors[&SurfaceCondition::GrassDry] * factors[&SurfaceCondition::PavedWet];
        assert!((factors[&SurfaceCondition::GrassWet] - grass_wet).abs() < 1e-9);
    }

    #[test]
    fn test_margin_must_follow_physical_corrections() {
        let err = CorrectionPipeline::new(vec![margin(15.0), wind()], Combination::Compound)
            .unwrap_err();
        assert_eq!(
            err,
            DataIntegrityError::CorrectionOrder {
                id: "margin".into(),
                next: "wind".into()
            }
        );
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let bad_wind = Correction::new(
            "wind",
            CorrectionKind::Wind {
                headwind: WindFactor {
                    percent: 10.0,
                    per_knots: 0.0,
                },
                tailwind: WindFactor {
                    percent: 10.0,
                    per_knots: 5.0,
                },
            },
        );
        assert!(CorrectionPipeline::new(vec![bad_wind], Combination::Compound).is_err());
        assert!(CorrectionPipeline::new(vec![margin(-5.0)], Combination::Compound).is_err());
        assert!(CorrectionPipeline::new(vec![wind(), wind()], Combination::Compound).is_err());
    }

    #[test]
    fn test_deserialize_flattened_kind() {
        let correction: Correction = serde_json::from_str(
            r#"{ "id": "surface", "type": "surface", "applies_to": ["takeoff_distance"] }"#,
        )
        .unwrap();
        assert_eq!(
            correction.kind,
            CorrectionKind::Surface {
                factors: default_surface_factors()
            }
        );
        assert!(correction.applies_to_metric("takeoff_distance"));
        assert!(!correction.applies_to_metric("landing_distance"));
    }
}

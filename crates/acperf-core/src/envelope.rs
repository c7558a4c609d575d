//! Certified envelope checks for an operating point.
//!
//! Limits are a closed set of shapes: a scalar range over one field, or a
//! polygon over two fields (typically CG × weight). Boundaries are
//! inclusive.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DataIntegrityError;
use crate::models::{Field, OperatingPoint, Severity, Violation};

/// Relative tolerance used for on-edge tests.
const EDGE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum LimitShape {
    Range {
        field: Field,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Polygon {
        x: Field,
        y: Field,
        /// Vertices as `[x, y]`; closing vertex optional
        vertices: Vec<[f64; 2]>,
    },
}

/// One constraint over the operating point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeLimit {
    pub id: String,
    pub severity: Severity,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub shape: LimitShape,
}

impl EnvelopeLimit {
    pub fn range(
        id: impl Into<String>,
        severity: Severity,
        field: Field,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            description: String::new(),
            shape: LimitShape::Range { field, min, max },
        }
    }

    pub fn polygon(
        id: impl Into<String>,
        severity: Severity,
        x: Field,
        y: Field,
        vertices: Vec<[f64; 2]>,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            description: String::new(),
            shape: LimitShape::Polygon { x, y, vertices },
        }
    }

    pub fn fields(&self) -> Vec<Field> {
        match &self.shape {
            LimitShape::Range { field, .. } => vec![field.clone()],
            LimitShape::Polygon { x, y, .. } => vec![x.clone(), y.clone()],
        }
    }

    /// Check structure; called once when the dataset is loaded.
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        let invalid = |reason: &str| DataIntegrityError::InvalidLimit {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.trim().is_empty() {
            return Err(invalid("limit id is empty"));
        }

        match &self.shape {
            LimitShape::Range { min, max, .. } => {
                if min.is_none() && max.is_none() {
                    return Err(invalid("range needs a min or a max"));
                }
                if min.iter().chain(max).any(|v| !v.is_finite()) {
                    return Err(invalid("range bounds must be finite"));
                }
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        return Err(invalid("range min exceeds max"));
                    }
                }
            }
            LimitShape::Polygon { x, y, vertices } => {
                if x == y {
                    return Err(invalid("polygon axes must differ"));
                }
                if vertices.iter().flatten().any(|v| !v.is_finite()) {
                    return Err(invalid("polygon vertices must be finite"));
                }
                let ring = open_ring(vertices);
                if ring.len() < 3 {
                    return Err(invalid("polygon needs at least 3 vertices"));
                }
                if signed_area(ring).abs() <= f64::EPSILON {
                    return Err(invalid("polygon is degenerate"));
                }
            }
        }
        Ok(())
    }

    /// Evaluate the limit; `None` when satisfied.
    pub fn check(&self, point: &OperatingPoint) -> Option<Violation> {
        let fields = self.fields();
        let measured: Option<Vec<f64>> = fields.iter().map(|f| point.value(f)).collect();
        let Some(measured) = measured else {
            return Some(Violation {
                limit_id: self.id.clone(),
                severity: Severity::Info,
                fields,
                measured: Vec::new(),
                bound: self.bound_description(),
                message: format!("limit '{}' not evaluated: input unavailable", self.id),
            });
        };

        let satisfied = match &self.shape {
            LimitShape::Range { min, max, .. } => {
                let v = measured[0];
                min.map_or(true, |lo| v >= lo) && max.map_or(true, |hi| v <= hi)
            }
            LimitShape::Polygon { vertices, .. } => {
                point_in_polygon(measured[0], measured[1], vertices)
            }
        };
        if satisfied {
            return None;
        }

        let message = match &self.shape {
            LimitShape::Range { field, .. } => format!(
                "{} {:.3} outside {}",
                field,
                measured[0],
                self.bound_description()
            ),
            LimitShape::Polygon { x, y, .. } => format!(
                "({} {:.3}, {} {:.3}) outside envelope '{}'",
                x, measured[0], y, measured[1], self.id
            ),
        };

        Some(Violation {
            limit_id: self.id.clone(),
            severity: self.severity,
            fields,
            measured,
            bound: self.bound_description(),
            message,
        })
    }

    fn bound_description(&self) -> String {
        match &self.shape {
            LimitShape::Range { min, max, .. } => match (min, max) {
                (Some(lo), Some(hi)) => format!("[{lo}, {hi}]"),
                (Some(lo), None) => format!(">= {lo}"),
                (None, Some(hi)) => format!("<= {hi}"),
                (None, None) => "unbounded".to_string(),
            },
            LimitShape::Polygon { vertices, .. } => {
                format!("polygon of {} vertices", open_ring(vertices).len())
            }
        }
    }
}

/// Check `point` against every limit, in declaration order.
pub fn validate(point: &OperatingPoint, limits: &[EnvelopeLimit]) -> Vec<Violation> {
    let violations: Vec<Violation> = limits.iter().filter_map(|l| l.check(point)).collect();
    for violation in violations.iter().filter(|v| v.severity == Severity::Hard) {
        warn!(limit = %violation.limit_id, "{}", violation.message);
    }
    violations
}

/// Inclusive point-in-polygon test.
///
/// Points on an edge or vertex are inside; otherwise ray casting decides.
pub fn point_in_polygon(x: f64, y: f64, vertices: &[[f64; 2]]) -> bool {
    let ring = open_ring(vertices);
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = ring[i];
        let [xj, yj] = ring[j];

        if on_segment(x, y, ring[j], ring[i]) {
            return true;
        }
        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn on_segment(x: f64, y: f64, a: [f64; 2], b: [f64; 2]) -> bool {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let length = dx.hypot(dy);
    let scale = length.max(1.0);
    let cross = dx * (y - a[1]) - dy * (x - a[0]);
    if cross.abs() > EDGE_EPSILON * scale * scale {
        return false;
    }
    let tol = EDGE_EPSILON * scale;
    x >= a[0].min(b[0]) - tol
        && x <= a[0].max(b[0]) + tol
        && y >= a[1].min(b[1]) - tol
        && y <= a[1].max(b[1]) + tol
}

/// Drop a repeated closing vertex.
fn open_ring(vertices: &[[f64; 2]]) -> &[[f64; 2]] {
    match vertices {
        [first, .., last] if vertices.len() > 3 && first == last => {
            &vertices[..vertices.len() - 1]
        }
        _ => vertices,
    }
}

fn signed_area(ring: &[[f64; 2]]) -> f64 {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let [x0, y0] = ring[i];
            let [x1, y1] = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum::<f64>()
        / 2.0
}

/// A forward-limit point of a CG envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CgPoint {
    pub weight_kg: f64,
    pub cg_m: f64,
}

fn default_weight_field() -> Field {
    Field::Weight
}

fn default_cg_field() -> Field {
    Field::Cg
}

fn default_hard() -> Severity {
    Severity::Hard
}

/// CG envelope described the way light-aircraft manuals print it: a
/// forward limit line through weight/CG points plus a vertical aft limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgEnvelopeDef {
    pub id: String,
    #[serde(default = "default_hard")]
    pub severity: Severity,
    pub forward_points: Vec<CgPoint>,
    pub aft_cg_m: f64,
    /// Top of the aft line; defaults to the heaviest forward point
    #[serde(default)]
    pub aft_max_weight_kg: Option<f64>,
    /// Bottom of the aft line; defaults to the lightest forward point
    #[serde(default)]
    pub aft_min_weight_kg: Option<f64>,
    #[serde(default = "default_weight_field")]
    pub weight_field: Field,
    #[serde(default = "default_cg_field")]
    pub cg_field: Field,
}

impl CgEnvelopeDef {
    /// Compile to a polygon limit with x = CG and y = weight.
    pub fn to_limit(&self) -> Result<EnvelopeLimit, DataIntegrityError> {
        let invalid = |reason: &str| DataIntegrityError::InvalidLimit {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.forward_points.len() < 2 {
            return Err(invalid("CG envelope needs at least 2 forward points"));
        }
        let mut forward = self.forward_points.clone();
        forward.sort_by(|a, b| a.weight_kg.total_cmp(&b.weight_kg));
        if forward.windows(2).any(|w| w[1].weight_kg <= w[0].weight_kg) {
            return Err(invalid("forward points must have distinct weights"));
        }
        if forward.iter().any(|p| p.cg_m >= self.aft_cg_m) {
            return Err(invalid("forward limit must lie ahead of the aft limit"));
        }

        let lightest = forward[0].weight_kg;
        let heaviest = forward[forward.len() - 1].weight_kg;
        let aft_max = self.aft_max_weight_kg.unwrap_or(heaviest).max(heaviest);
        let aft_min = self.aft_min_weight_kg.unwrap_or(lightest).min(lightest);

        let mut vertices: Vec<[f64; 2]> = forward.iter().map(|p| [p.cg_m, p.weight_kg]).collect();
        if aft_max > heaviest {
            vertices.push([forward[forward.len() - 1].cg_m, aft_max]);
        }
        vertices.push([self.aft_cg_m, aft_max]);
        vertices.push([self.aft_cg_m, aft_min]);
        if aft_min < lightest {
            vertices.push([forward[0].cg_m, aft_min]);
        }

        let limit = EnvelopeLimit {
            id: self.id.clone(),
            severity: self.severity,
            description: "weight and balance envelope".to_string(),
            shape: LimitShape::Polygon {
                x: self.cg_field.clone(),
                y: self.weight_field.clone(),
                vertices,
            },
        };
        limit.validate()?;
        Ok(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlightConditions;

    fn square() -> Vec<[f64; 2]> {
        vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]
    }

    fn point_at(weight_kg: f64, cg_m: f64) -> OperatingPoint {
        OperatingPoint::from_conditions(&FlightConditions::new(weight_kg, 0.0, 15.0).with_cg(cg_m))
    }

    #[test]
    fn test_point_in_polygon() {
        assert!(point_in_polygon(5.0, 5.0, &square()));
        assert!(!point_in_polygon(11.0, 5.0, &square()));
        assert!(!point_in_polygon(-0.1, 5.0, &square()));
    }

    #[test]
    fn test_boundary_is_inside() {
        assert!(point_in_polygon(10.0, 5.0, &square()));
        assert!(point_in_polygon(5.0, 0.0, &square()));
        assert!(point_in_polygon(0.0, 10.0, &square()));
        // Sloped edge
        let triangle = vec![[0.0, 0.0], [4.0, 0.0], [0.0, 3.0]];
        assert!(point_in_polygon(2.0, 1.5, &triangle));
        assert!(!point_in_polygon(2.1, 1.5, &triangle));
    }

    #[test]
    fn test_closed_ring_accepted() {
        let mut closed = square();
        closed.push([0.0, 0.0]);
        assert!(point_in_polygon(5.0, 5.0, &closed));
        let limit = EnvelopeLimit::polygon("sq", Severity::Hard, Field::Cg, Field::Weight, closed);
        assert!(limit.validate().is_ok());
    }

    #[test]
    fn test_range_limit_inclusive() {
        let limit =
            EnvelopeLimit::range("mlw", Severity::Hard, Field::Weight, None, Some(1400.0));
        assert!(limit.check(&point_at(1400.0, 2.2)).is_none());

        let violation = limit.check(&point_at(1450.0, 2.2)).unwrap();
        assert_eq!(violation.severity, Severity::Hard);
        assert_eq!(violation.measured, vec![1450.0]);
        assert_eq!(violation.bound, "<= 1400");
    }

    #[test]
    fn test_unavailable_field_is_informational() {
        let limit = EnvelopeLimit::range(
            "mlw",
            Severity::Hard,
            Field::LandingWeight,
            None,
            Some(1400.0),
        );
        let violation = limit.check(&point_at(1450.0, 2.2)).unwrap();
        assert_eq!(violation.severity, Severity::Info);
        assert!(violation.measured.is_empty());
    }

    #[test]
    fn test_rejects_bad_limits() {
        let empty = EnvelopeLimit::range("r", Severity::Soft, Field::Weight, None, None);
        assert!(empty.validate().is_err());
        let inverted =
            EnvelopeLimit::range("r", Severity::Soft, Field::Weight, Some(5.0), Some(1.0));
        assert!(inverted.validate().is_err());
        let line = EnvelopeLimit::polygon(
            "p",
            Severity::Hard,
            Field::Cg,
            Field::Weight,
            vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]],
        );
        assert!(line.validate().is_err());
    }

    #[test]
    fn test_cg_envelope_from_forward_and_aft() {
        let def = CgEnvelopeDef {
            id: "wb".into(),
            severity: Severity::Hard,
            forward_points: vec![
                CgPoint { weight_kg: 1100.0, cg_m: 2.10 },
                CgPoint { weight_kg: 800.0, cg_m: 2.00 },
            ],
            aft_cg_m: 2.45,
            aft_max_weight_kg: None,
            aft_min_weight_kg: None,
            weight_field: Field::Weight,
            cg_field: Field::Cg,
        };
        let limit = def.to_limit().unwrap();

        assert!(limit.check(&point_at(1000.0, 2.30)).is_none());
        // Forward limit at 950 kg is 2.05 m
        assert!(limit.check(&point_at(950.0, 2.05)).is_none());
        assert!(limit.check(&point_at(950.0, 2.04)).is_some());
        assert!(limit.check(&point_at(1000.0, 2.46)).is_some());
        assert!(limit.check(&point_at(1150.0, 2.30)).is_some());
    }

    #[test]
    fn test_limit_deserialize() {
        let limit: EnvelopeLimit = serde_json::from_str(
            r#"{ "id": "ldr", "severity": "soft", "shape": "range",
                 "field": "metric:landing_distance", "max": 800 }"#,
        )
        .unwrap();
        assert_eq!(
            limit.shape,
            LimitShape::Range {
                field: Field::Metric("landing_distance".into()),
                min: None,
                max: Some(800.0)
            }
        );
    }
}

pub mod atmosphere;
pub mod corrections;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod interpolation;
pub mod loading;
pub mod models;
pub mod table;
pub mod table_store;

pub use corrections::{
    apply_corrections, Combination, Correction, CorrectionKind, CorrectionOutcome,
    CorrectionPipeline, CorrectionSettings, WindFactor,
};
pub use engine::{EngineConfig, PerformanceEngine};
pub use envelope::{point_in_polygon, CgEnvelopeDef, CgPoint, EnvelopeLimit, LimitShape};
pub use error::{DataIntegrityError, LoadingError, MetricError};
pub use interpolation::{interpolate, Interpolation, Interpolator};
pub use loading::{
    FuelSystem, FuelType, LoadSheet, LoadingStation, LoadingSummary, MassBalance, MassBalanceData,
};
pub use models::{
    AppliedCorrection, Field, FlightConditions, MetricOutcome, MetricResult, MetricSlot,
    OperatingPoint, PerformanceResult, RunwayDescriptor, Severity, SurfaceCondition, Violation,
    Warning, WindInput,
};
pub use table::{Axis, BoundaryPolicy, GridValues, PerformanceTable, TableDef};
pub use table_store::{AircraftDataset, AircraftSnapshot, TableStore};

//! Versioned, immutable per-aircraft performance snapshots.
//!
//! A dataset is validated completely into an [`AircraftSnapshot`] before it
//! is published. Publishing replaces the whole snapshot in one map insert,
//! so readers see either the previous dataset or the new one, never a mix.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::corrections::{Correction, CorrectionPipeline, CorrectionSettings};
use crate::envelope::{CgEnvelopeDef, EnvelopeLimit};
use crate::error::{DataIntegrityError, MetricError};
use crate::loading::MassBalanceData;
use crate::table::{PerformanceTable, TableDef};

/// Parsed aircraft dataset as handed over by the loader.
#[derive(Debug, Clone, Deserialize)]
pub struct AircraftDataset {
    pub aircraft_id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub corrections: Vec<Correction>,
    #[serde(default)]
    pub correction_settings: CorrectionSettings,
    #[serde(default)]
    pub limits: Vec<EnvelopeLimit>,
    #[serde(default)]
    pub cg_envelopes: Vec<CgEnvelopeDef>,
    #[serde(default)]
    pub mass_balance: Option<MassBalanceData>,
}

impl AircraftDataset {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Everything the engine needs for one aircraft, validated and frozen.
#[derive(Debug)]
pub struct AircraftSnapshot {
    pub aircraft_id: String,
    pub version: Option<String>,
    pub effective_from: Option<NaiveDate>,
    pub loaded_at: DateTime<Utc>,
    tables: HashMap<String, Arc<PerformanceTable>>,
    pipeline: CorrectionPipeline,
    limits: Vec<EnvelopeLimit>,
    mass_balance: Option<MassBalanceData>,
}

impl AircraftSnapshot {
    /// Validate a dataset into a snapshot. Any error rejects the whole dataset.
    pub fn build(dataset: AircraftDataset) -> Result<Self, DataIntegrityError> {
        if dataset.aircraft_id.trim().is_empty() {
            return Err(DataIntegrityError::MissingAircraftId);
        }

        let mut tables = HashMap::with_capacity(dataset.tables.len());
        for def in dataset.tables {
            let table = PerformanceTable::from_def(def)?;
            let metric = table.metric().to_string();
            if tables.insert(metric.clone(), Arc::new(table)).is_some() {
                return Err(DataIntegrityError::DuplicateTable { metric });
            }
        }

        let pipeline = CorrectionPipeline::new(
            dataset.corrections,
            dataset.correction_settings.combination,
        )?;

        let mut limits = dataset.limits;
        for envelope in &dataset.cg_envelopes {
            limits.push(envelope.to_limit()?);
        }
        for (i, limit) in limits.iter().enumerate() {
            limit.validate()?;
            if limits[..i].iter().any(|l| l.id == limit.id) {
                return Err(DataIntegrityError::DuplicateLimit {
                    id: limit.id.clone(),
                });
            }
        }

        if let Some(mass_balance) = &dataset.mass_balance {
            mass_balance.validate()?;
        }

        Ok(Self {
            aircraft_id: dataset.aircraft_id,
            version: dataset.version,
            effective_from: dataset.effective_from,
            loaded_at: Utc::now(),
            tables,
            pipeline,
            limits,
            mass_balance: dataset.mass_balance,
        })
    }

    pub fn table(&self, metric: &str) -> Option<Arc<PerformanceTable>> {
        self.tables.get(metric).cloned()
    }

    /// Metric names with a table, sorted.
    pub fn metrics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn pipeline(&self) -> &CorrectionPipeline {
        &self.pipeline
    }

    pub fn limits(&self) -> &[EnvelopeLimit] {
        &self.limits
    }

    pub fn mass_balance(&self) -> Option<&MassBalanceData> {
        self.mass_balance.as_ref()
    }
}

/// Thread-safe store of the active snapshot per aircraft.
#[derive(Debug, Default)]
pub struct TableStore {
    snapshots: DashMap<String, Arc<AircraftSnapshot>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and publish a dataset, replacing any previous snapshot for
    /// the same aircraft. On error the previous snapshot stays active.
    pub fn load(
        &self,
        dataset: AircraftDataset,
    ) -> Result<Arc<AircraftSnapshot>, DataIntegrityError> {
        let snapshot = Arc::new(AircraftSnapshot::build(dataset)?);
        let replaced = self
            .snapshots
            .insert(snapshot.aircraft_id.clone(), Arc::clone(&snapshot));

        info!(
            aircraft = %snapshot.aircraft_id,
            version = snapshot.version.as_deref().unwrap_or("unversioned"),
            tables = snapshot.tables.len(),
            limits = snapshot.limits.len(),
            corrections = snapshot.pipeline.len(),
            replaced = replaced.is_some(),
            "activated aircraft dataset"
        );
        Ok(snapshot)
    }

    /// Current snapshot for an aircraft. Callers holding the returned `Arc`
    /// keep a consistent view even if a new dataset is loaded meanwhile.
    pub fn snapshot(&self, aircraft_id: &str) -> Option<Arc<AircraftSnapshot>> {
        self.snapshots.get(aircraft_id).map(|r| Arc::clone(r.value()))
    }

    pub fn get_table(
        &self,
        aircraft_id: &str,
        metric: &str,
    ) -> Result<Arc<PerformanceTable>, MetricError> {
        let snapshot = self
            .snapshot(aircraft_id)
            .ok_or_else(|| MetricError::UnknownAircraft {
                aircraft_id: aircraft_id.to_string(),
            })?;
        snapshot.table(metric).ok_or_else(|| MetricError::NotFound {
            aircraft_id: aircraft_id.to_string(),
            metric: metric.to_string(),
        })
    }

    pub fn aircraft_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshots.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn dataset(version: &str, top_value: f64) -> AircraftDataset {
        let json = format!(
            r#"{{
                "aircraft_id": "C172S",
                "version": "{version}",
                "effective_from": "2026-01-01",
                "tables": [
                    {{
                        "metric": "takeoff_distance",
                        "unit": "m",
                        "axes": [
                            {{"field": "weight", "unit": "kg", "samples": [1000, 1200, 1400]}}
                        ],
                        "values": [500, 560, {top_value}]
                    }}
                ],
                "limits": [
                    {{
                        "id": "mlw", "severity": "hard", "shape": "range",
                        "field": "landing_weight", "max": 1400
                    }}
                ]
            }}"#
        );
        AircraftDataset::from_json(&json).unwrap()
    }

    #[test]
    fn test_load_and_get_table() {
        let store = TableStore::new();
        let snapshot = store.load(dataset("v1", 650.0)).unwrap();

        assert_eq!(snapshot.version.as_deref(), Some("v1"));
        assert_eq!(snapshot.effective_from, NaiveDate::from_ymd_opt(2026, 1, 1));
        assert_eq!(snapshot.metrics(), vec!["takeoff_distance".to_string()]);
        assert_eq!(snapshot.limits().len(), 1);

        let table = store.get_table("C172S", "takeoff_distance").unwrap();
        assert_eq!(table.unit(), "m");
    }

    #[test]
    fn test_not_found_and_unknown_aircraft() {
        let store = TableStore::new();
        store.load(dataset("v1", 650.0)).unwrap();

        assert!(matches!(
            store.get_table("C172S", "climb_rate"),
            Err(MetricError::NotFound { .. })
        ));
        assert!(matches!(
            store.get_table("PA28", "takeoff_distance"),
            Err(MetricError::UnknownAircraft { .. })
        ));
    }

    #[test]
    fn test_rejects_non_monotonic_axis() {
        let mut ds = dataset("v1", 650.0);
        ds.tables[0].axes[0].samples = vec![1000.0, 1400.0, 1200.0];
        let store = TableStore::new();

        assert!(matches!(
            store.load(ds),
            Err(DataIntegrityError::AxisNotMonotonic { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let store = TableStore::new();
        store.load(dataset("v1", 650.0)).unwrap();

        let mut bad = dataset("v2", 650.0);
        bad.tables.push(bad.tables[0].clone());
        assert!(matches!(
            store.load(bad),
            Err(DataIntegrityError::DuplicateTable { .. })
        ));

        let snapshot = store.snapshot("C172S").unwrap();
        assert_eq!(snapshot.version.as_deref(), Some("v1"));
    }

    #[test]
    fn test_rejects_duplicate_limit() {
        let mut ds = dataset("v1", 650.0);
        ds.limits.push(ds.limits[0].clone());
        assert!(matches!(
            AircraftSnapshot::build(ds),
            Err(DataIntegrityError::DuplicateLimit { .. })
        ));
    }

    #[test]
    fn test_swap_is_atomic_for_readers() {
        let store = Arc::new(TableStore::new());
        store.load(dataset("v1", 650.0)).unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = store.snapshot("C172S").unwrap();
                        let table = snapshot.table("takeoff_distance").unwrap();
                        let top = table.cell(&[2]).unwrap();
                        // Version and contents always belong to the same dataset
                        match snapshot.version.as_deref() {
                            Some("v1") => assert_eq!(top, 650.0),
                            Some("v2") => assert_eq!(top, 700.0),
                            other => panic!("unexpected version {other:?}"),
                        }
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            store.load(dataset("v2", 700.0)).unwrap();
            store.load(dataset("v1", 650.0)).unwrap();
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.len(), 1);
    }
}

//! Reading dataset and request documents from disk.

use acperf_core::{AircraftDataset, TableStore};
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;

/// Resolve the dataset location from the flag and `ACPERF_DATASET_DIR`.
pub fn resolve_path(arg: Option<&Path>, config: &Config) -> Result<PathBuf> {
    match (arg, &config.dataset_dir) {
        (Some(path), Some(dir)) if path.is_relative() && !path.exists() => Ok(dir.join(path)),
        (Some(path), _) => Ok(path.to_path_buf()),
        (None, Some(dir)) => Ok(dir.clone()),
        (None, None) => bail!("no dataset given: pass --dataset or set ACPERF_DATASET_DIR"),
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Read one dataset file, or every `*.json` file in a directory.
pub fn read_datasets(path: &Path) -> Result<Vec<(PathBuf, AircraftDataset)>> {
    if !path.is_dir() {
        return Ok(vec![(path.to_path_buf(), read_json(path)?)]);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("failed to list {}", path.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    if files.is_empty() {
        bail!("no dataset files in {}", path.display());
    }
    files
        .into_iter()
        .map(|file| {
            let dataset = read_json(&file)?;
            Ok((file, dataset))
        })
        .collect()
}

/// Load every dataset at `path` into a fresh store. Any rejected dataset
/// fails the whole load.
pub fn load_store(path: &Path) -> Result<TableStore> {
    let store = TableStore::new();
    for (file, dataset) in read_datasets(path)? {
        let aircraft = dataset.aircraft_id.clone();
        store
            .load(dataset)
            .with_context(|| format!("dataset for '{aircraft}' in {} rejected", file.display()))?;
        debug!(aircraft = %aircraft, file = %file.display(), "dataset loaded");
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_json(aircraft: &str, samples: &str) -> String {
        format!(
            r#"{{
                "aircraft_id": "{aircraft}",
                "tables": [{{
                    "metric": "takeoff_distance",
                    "unit": "m",
                    "axes": [{{"field": "weight", "samples": {samples}}}],
                    "values": [300, 360, 450]
                }}]
            }}"#
        )
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pa28.json"), dataset_json("PA28", "[800, 900, 1000]")).unwrap();
        fs::write(dir.path().join("c152.json"), dataset_json("C152", "[600, 700, 800]")).unwrap();
        fs::write(dir.path().join("README.txt"), "not a dataset").unwrap();

        let store = load_store(dir.path()).unwrap();
        assert_eq!(store.aircraft_ids(), vec!["C152".to_string(), "PA28".to_string()]);
    }

    #[test]
    fn test_rejected_dataset_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.json");
        fs::write(&file, dataset_json("C152", "[600, 800, 700]")).unwrap();

        let err = load_store(&file).unwrap_err();
        assert!(format!("{err:#}").contains("not strictly increasing"));
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_datasets(dir.path()).is_err());
    }

    #[test]
    fn test_resolve_relative_to_dataset_dir() {
        let config = Config {
            dataset_dir: Some(PathBuf::from("/srv/perf")),
            log_directive: String::new(),
            parallel: true,
        };
        assert_eq!(
            resolve_path(Some(Path::new("c172s.json")), &config).unwrap(),
            PathBuf::from("/srv/perf/c172s.json")
        );
        assert_eq!(resolve_path(None, &config).unwrap(), PathBuf::from("/srv/perf"));

        let bare = Config {
            dataset_dir: None,
            ..config
        };
        assert!(resolve_path(None, &bare).is_err());
    }
}

//! Local tracking store in the MLflow file-store layout
//!
//! ```text
//! <root>/<experiment_id>/meta.yaml
//! <root>/<experiment_id>/<run_id>/meta.yaml
//! <root>/<experiment_id>/<run_id>/metrics/<key>     "<timestamp> <value> <step>" per line
//! <root>/<experiment_id>/<run_id>/params/<key>
//! <root>/<experiment_id>/<run_id>/tags/<key>
//! <root>/<experiment_id>/<run_id>/artifacts/<file>
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

use super::{now_millis, truncate_param, MetricPoint, RunHandle, RunStatus, Tracker};
use crate::errors::{PipelineError, Result};

const META_FILE: &str = "meta.yaml";
const DEFAULT_EXPERIMENT_ID: &str = "0";
const DEFAULT_EXPERIMENT_NAME: &str = "Default";
/// Source type `LOCAL`
const SOURCE_TYPE_LOCAL: i32 = 4;

/// Older stores omit the timestamps and the lifecycle stage and may write
/// numeric ids unquoted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExperimentMeta {
    #[serde(default)]
    artifact_location: String,
    #[serde(default)]
    creation_time: Option<i64>,
    #[serde(deserialize_with = "id_string")]
    experiment_id: String,
    #[serde(default)]
    last_update_time: Option<i64>,
    #[serde(default = "active_stage")]
    lifecycle_stage: String,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    artifact_uri: String,
    end_time: Option<i64>,
    entry_point_name: String,
    #[serde(deserialize_with = "id_string")]
    experiment_id: String,
    lifecycle_stage: String,
    run_id: String,
    #[serde(default)]
    run_name: String,
    run_uuid: String,
    source_name: String,
    source_type: i32,
    source_version: String,
    start_time: i64,
    status: i32,
    tags: Vec<String>,
    user_id: String,
}

/// Tracker writing to a local directory
#[derive(Debug, Clone)]
pub struct FileTracker {
    root: PathBuf,
}

impl FileTracker {
    /// Open (or create) a store rooted at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        let tracker = Self { root };

        if !tracker.root.join(DEFAULT_EXPERIMENT_ID).join(META_FILE).exists() {
            tracker.write_experiment(DEFAULT_EXPERIMENT_ID, DEFAULT_EXPERIMENT_NAME)?;
        }
        Ok(tracker)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Id of the active experiment called `name`, if any.
    pub fn experiment_id(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .experiments()?
            .into_iter()
            .find(|meta| meta.name == name && meta.lifecycle_stage == "active")
            .map(|meta| meta.experiment_id))
    }

    /// Directory of a run inside the named experiment
    pub fn run_dir(&self, experiment: &str, run_id: &str) -> Result<PathBuf> {
        let experiment_id = self.experiment_id(experiment)?.ok_or_else(|| {
            PipelineError::Tracking(format!("experiment {} does not exist", experiment))
        })?;
        Ok(self.root.join(experiment_id).join(run_id))
    }

    /// Current status of a run
    pub fn run_status(&self, experiment: &str, run_id: &str) -> Result<RunStatus> {
        let meta = read_run_meta(&self.run_dir(experiment, run_id)?)?;
        RunStatus::from_code(meta.status).ok_or_else(|| {
            PipelineError::Tracking(format!("run {} has unknown status {}", run_id, meta.status))
        })
    }

    fn experiments(&self) -> Result<Vec<ExperimentMeta>> {
        let mut experiments = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let meta_path = entry?.path().join(META_FILE);
            if meta_path.is_file() {
                let content = fs::read_to_string(&meta_path)?;
                experiments.push(serde_yaml::from_str(&content)?);
            }
        }
        Ok(experiments)
    }

    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        if let Some(id) = self.experiment_id(name)? {
            return Ok(id);
        }

        let next_id = self
            .experiments()?
            .iter()
            .filter_map(|meta| meta.experiment_id.parse::<u64>().ok())
            .max()
            .map_or(0, |max| max + 1);
        let id = next_id.to_string();
        self.write_experiment(&id, name)?;
        info!("Created experiment {} with id {}", name, id);
        Ok(id)
    }

    fn write_experiment(&self, id: &str, name: &str) -> Result<()> {
        let dir = self.root.join(id);
        fs::create_dir_all(&dir)?;
        let now = now_millis();
        let meta = ExperimentMeta {
            artifact_location: file_uri(&dir)?,
            creation_time: Some(now),
            experiment_id: id.to_string(),
            last_update_time: Some(now),
            lifecycle_stage: "active".to_string(),
            name: name.to_string(),
        };
        fs::write(dir.join(META_FILE), serde_yaml::to_string(&meta)?)?;
        Ok(())
    }

    fn handle_dir(&self, run: &RunHandle) -> PathBuf {
        self.root.join(&run.experiment_id).join(&run.run_id)
    }
}

impl Tracker for FileTracker {
    fn start_run(&self, experiment: &str, run_name: &str) -> Result<RunHandle> {
        let experiment_id = self.get_or_create_experiment(experiment)?;
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_dir = self.root.join(&experiment_id).join(&run_id);

        for sub in ["metrics", "params", "tags", "artifacts"] {
            fs::create_dir_all(run_dir.join(sub))?;
        }

        let artifact_uri = file_uri(&run_dir.join("artifacts"))?;
        let meta = RunMeta {
            artifact_uri: artifact_uri.clone(),
            end_time: None,
            entry_point_name: String::new(),
            experiment_id: experiment_id.clone(),
            lifecycle_stage: "active".to_string(),
            run_id: run_id.clone(),
            run_name: run_name.to_string(),
            run_uuid: run_id.clone(),
            source_name: String::new(),
            source_type: SOURCE_TYPE_LOCAL,
            source_version: String::new(),
            start_time: now_millis(),
            status: RunStatus::Running.code(),
            tags: Vec::new(),
            user_id: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        };
        write_run_meta(&run_dir, &meta)?;
        fs::write(run_dir.join("tags").join("mlflow.runName"), run_name)?;

        debug!("Started run {} in experiment {}", run_id, experiment);
        Ok(RunHandle {
            run_id,
            experiment_id,
            run_name: run_name.to_string(),
            artifact_uri,
        })
    }

    fn log_metrics(&self, run: &RunHandle, metrics: &[MetricPoint]) -> Result<()> {
        let dir = self.handle_dir(run).join("metrics");
        let mut grouped: BTreeMap<&str, Vec<&MetricPoint>> = BTreeMap::new();
        for point in metrics {
            grouped.entry(point.key.as_str()).or_default().push(point);
        }

        for (key, points) in grouped {
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(key))?;
            for point in points {
                writeln!(file, "{} {} {}", point.timestamp, point.value, point.step)?;
            }
        }
        Ok(())
    }

    fn log_params(&self, run: &RunHandle, params: &BTreeMap<String, String>) -> Result<()> {
        let dir = self.handle_dir(run).join("params");
        for (key, value) in params {
            fs::write(dir.join(key), truncate_param(key, value))?;
        }
        Ok(())
    }

    fn log_artifact(&self, run: &RunHandle, path: &Path) -> Result<()> {
        let file_name = path.file_name().ok_or_else(|| {
            PipelineError::Tracking(format!("artifact {} has no file name", path.display()))
        })?;
        fs::copy(path, self.handle_dir(run).join("artifacts").join(file_name))?;
        Ok(())
    }

    fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<()> {
        let dir = self.handle_dir(run);
        let mut meta = read_run_meta(&dir)?;
        meta.status = status.code();
        meta.end_time = Some(now_millis());
        write_run_meta(&dir, &meta)?;
        debug!("Run {} ended with status {}", run.run_id, status.as_str());
        Ok(())
    }
}

fn active_stage() -> String {
    "active".to_string()
}

/// Accept experiment ids written as strings or as bare integers.
fn id_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(id) => id,
        Id::Number(id) => id.to_string(),
    })
}

fn read_run_meta(run_dir: &Path) -> Result<RunMeta> {
    let content = fs::read_to_string(run_dir.join(META_FILE))?;
    Ok(serde_yaml::from_str(&content)?)
}

fn write_run_meta(run_dir: &Path, meta: &RunMeta) -> Result<()> {
    fs::write(run_dir.join(META_FILE), serde_yaml::to_string(meta)?)?;
    Ok(())
}

fn file_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| PipelineError::Tracking(format!("{} is not an absolute path", path.display())))
}

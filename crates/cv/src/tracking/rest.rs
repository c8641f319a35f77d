//! Tracker client for an MLflow tracking server (REST API 2.0)

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::{now_millis, truncate_param, MetricPoint, RunHandle, RunStatus, Tracker};
use crate::errors::{PipelineError, Result};

/// Per-request limits of `runs/log-batch`
pub const MAX_METRICS_PER_BATCH: usize = 1000;
pub const MAX_PARAMS_PER_BATCH: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const PROXIED_ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Debug, Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateRunResponse {
    run: RunData,
}

#[derive(Debug, Deserialize)]
struct RunData {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    artifact_uri: String,
}

/// Tracker talking to a remote server
#[derive(Debug, Clone)]
pub struct RestTracker {
    base: Url,
    client: Client,
}

impl RestTracker {
    pub fn new(uri: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(uri, client)
    }

    /// Use a preconfigured HTTP client, e.g. with custom proxy settings.
    pub fn with_client(uri: &str, client: Client) -> Result<Self> {
        let base = Url::parse(uri)?;
        info!("Tracking runs on {}", base);
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        api_url(&self.base, &format!("api/2.0/mlflow/{}", path))
    }

    fn post(&self, path: &str, body: &Value) -> Result<Response> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let response = self.client.post(url).json(body).send()?;
        check(path, response)
    }

    fn get_experiment_id(&self, name: &str) -> Result<Option<String>> {
        let url = Url::parse_with_params(
            self.endpoint("experiments/get-by-name")?.as_str(),
            &[("experiment_name", name)],
        )?;
        let response = self.client.get(url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: GetExperimentResponse = check("experiments/get-by-name", response)?.json()?;
        Ok(Some(found.experiment.experiment_id))
    }

    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        if let Some(id) = self.get_experiment_id(name)? {
            return Ok(id);
        }
        let created: CreateExperimentResponse = self
            .post("experiments/create", &json!({ "name": name }))?
            .json()?;
        info!("Created experiment {} with id {}", name, created.experiment_id);
        Ok(created.experiment_id)
    }
}

impl Tracker for RestTracker {
    fn start_run(&self, experiment: &str, run_name: &str) -> Result<RunHandle> {
        let experiment_id = self.get_or_create_experiment(experiment)?;
        let created: CreateRunResponse = self
            .post("runs/create", &create_run_body(&experiment_id, run_name, now_millis()))?
            .json()?;

        debug!("Started run {} in experiment {}", created.run.info.run_id, experiment);
        Ok(RunHandle {
            run_id: created.run.info.run_id,
            experiment_id: created.run.info.experiment_id,
            run_name: run_name.to_string(),
            artifact_uri: created.run.info.artifact_uri,
        })
    }

    fn log_metrics(&self, run: &RunHandle, metrics: &[MetricPoint]) -> Result<()> {
        for body in log_batch_bodies(&run.run_id, metrics, &BTreeMap::new()) {
            self.post("runs/log-batch", &body)?;
        }
        Ok(())
    }

    fn log_params(&self, run: &RunHandle, params: &BTreeMap<String, String>) -> Result<()> {
        for body in log_batch_bodies(&run.run_id, &[], params) {
            self.post("runs/log-batch", &body)?;
        }
        Ok(())
    }

    fn log_artifact(&self, run: &RunHandle, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                PipelineError::Tracking(format!("artifact {} has no file name", path.display()))
            })?;

        if let Some(url) = artifact_upload_url(&self.base, &run.artifact_uri, file_name)? {
            let content = std::fs::read(path)?;
            debug!("PUT {}", url);
            let response = self.client.put(url).body(content).send()?;
            check("mlflow-artifacts/artifacts", response)?;
            return Ok(());
        }

        // server-side local store, reachable when it shares our filesystem
        let dir = Url::parse(&run.artifact_uri)
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
            .unwrap_or_else(|| Path::new(&run.artifact_uri).to_path_buf());
        if !dir.is_absolute() {
            return Err(PipelineError::Tracking(format!(
                "unsupported artifact location {}",
                run.artifact_uri
            )));
        }
        std::fs::create_dir_all(&dir)?;
        std::fs::copy(path, dir.join(file_name))?;
        Ok(())
    }

    fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<()> {
        self.post(
            "runs/update",
            &json!({
                "run_id": run.run_id,
                "status": status.as_str(),
                "end_time": now_millis(),
            }),
        )?;
        debug!("Run {} ended with status {}", run.run_id, status.as_str());
        Ok(())
    }
}

fn check(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(PipelineError::Tracking(format!(
        "{} failed with {}: {}",
        path, status, body
    )))
}

/// Resolve `path` below the server base, keeping any base path prefix.
fn api_url(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path)?)
}

fn create_run_body(experiment_id: &str, run_name: &str, start_time: i64) -> Value {
    json!({
        "experiment_id": experiment_id,
        "run_name": run_name,
        "start_time": start_time,
        "tags": [{ "key": "mlflow.runName", "value": run_name }],
    })
}

/// Split metrics and params into `runs/log-batch` request bodies that stay
/// within the per-request limits.
fn log_batch_bodies(
    run_id: &str,
    metrics: &[MetricPoint],
    params: &BTreeMap<String, String>,
) -> Vec<Value> {
    let mut bodies = Vec::new();

    for chunk in metrics.chunks(MAX_METRICS_PER_BATCH) {
        bodies.push(json!({
            "run_id": run_id,
            "metrics": chunk,
            "params": [],
            "tags": [],
        }));
    }

    let params: Vec<Value> = params
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": truncate_param(key, value) }))
        .collect();
    for chunk in params.chunks(MAX_PARAMS_PER_BATCH) {
        bodies.push(json!({
            "run_id": run_id,
            "metrics": [],
            "params": chunk,
            "tags": [],
        }));
    }

    bodies
}

/// Upload URL for runs whose artifacts go through the server's artifact proxy.
fn artifact_upload_url(base: &Url, artifact_uri: &str, file_name: &str) -> Result<Option<Url>> {
    let Some(rest) = artifact_uri.strip_prefix(PROXIED_ARTIFACT_SCHEME) else {
        return Ok(None);
    };
    let rest = rest.trim_start_matches('/').trim_end_matches('/');
    let path = format!("api/2.0/mlflow-artifacts/artifacts/{}/{}", rest, file_name);
    api_url(base, &path).map(Some)
}

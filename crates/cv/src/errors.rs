use thiserror::Error;

/// Errors returned by the cross-validation pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("fold error: {0}")]
    Folds(String),

    #[error("aggregation error: {0}")]
    Aggregate(String),

    #[error("export error: {0}")]
    Export(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("tracking error: {0}")]
    Tracking(String),

    #[error("training error: {0}")]
    Training(#[from] shiptime_gbdt::GbdtError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

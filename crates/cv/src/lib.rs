//! Shiptime CV - cross-validated shipping-time model training
//!
//! Splits the training rows into shuffled folds, trains a booster per fold
//! with early stopping (optionally after a stepwise parameter search),
//! averages the fold models' test predictions and writes them out as a
//! submission file. Every fold and the aggregate are recorded with an
//! experiment tracker.
//!
//! Modules:
//! - `dataset`: combined train/test CSV loading
//! - `folds`: seeded k-fold splitting
//! - `aggregate`: fold-averaged predictions and scores
//! - `tracking`: file-store and REST experiment trackers
//! - `export`: submission writer
//! - `pipeline`: the full run

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod errors;
pub mod export;
pub mod folds;
pub mod pipeline;
pub mod tracking;

pub use aggregate::{PredictionAccumulator, ScoreAccumulator};
pub use config::RunConfig;
pub use dataset::{DatasetLoader, TrainTestSplit};
pub use errors::{PipelineError, Result};
pub use export::export_submission;
pub use folds::{Fold, KFold};
pub use pipeline::{FoldReport, RunSummary};
pub use tracking::{FileTracker, RestTracker, RunHandle, RunStatus, Tracker};

//! Shiptime GBDT - gradient boosted regression trees
//!
//! Leaf-wise histogram trees fitted on squared error, with RMSE-based early
//! stopping and a stepwise hyperparameter search. Training is seeded, so
//! equal inputs give identical models.
//!
//! Modules:
//! - `matrix`: dense feature matrix with labels
//! - `binning`: per-feature quantization for split search
//! - `grower`: leaf-wise tree construction
//! - `trainer`: boosting loop with early stopping
//! - `tuner`: stepwise hyperparameter search
//! - `booster`: trained model, prediction and persistence

pub mod binning;
pub mod booster;
pub mod early_stopping;
pub mod errors;
pub mod grower;
pub mod matrix;
pub mod metric;
pub mod params;
pub mod trainer;
pub mod tree;
pub mod tuner;

pub use booster::{Booster, ImportanceType};
pub use early_stopping::EarlyStopping;
pub use errors::{GbdtError, Result};
pub use matrix::DMatrix;
pub use metric::rmse;
pub use params::{BoosterParams, Metric, Objective};
pub use trainer::{EvalHistory, TrainOptions, TrainOutcome, Trainer};
pub use tree::{Node, Tree};
pub use tuner::{Stage, StepwiseTuner, TuneOutcome};

//! Combined train/test table loading
//!
//! The input is one CSV with a header row. A boolean flag column marks
//! training rows, the target column is filled for those rows only, and every
//! other column is a numeric feature. Empty cells and `NaN`/`NA` are missing.

use shiptime_gbdt::DMatrix;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::errors::{PipelineError, Result};

/// Feature matrices and target split out of the combined table
#[derive(Clone, Debug)]
pub struct TrainTestSplit {
    /// Feature column names in table order
    pub feature_names: Vec<String>,
    /// Training rows, labelled with the target
    pub train: DMatrix,
    /// Test rows, unlabelled
    pub test: DMatrix,
}

impl TrainTestSplit {
    pub fn n_train(&self) -> usize {
        self.train.n_rows()
    }

    pub fn n_test(&self) -> usize {
        self.test.n_rows()
    }
}

/// Reads the combined table
#[derive(Clone, Debug)]
pub struct DatasetLoader {
    train_flag_column: String,
    target_column: String,
}

impl DatasetLoader {
    pub fn new(train_flag_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            train_flag_column: train_flag_column.into(),
            target_column: target_column.into(),
        }
    }

    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<TrainTestSplit> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|err| {
            PipelineError::Dataset(format!("failed to open {}: {}", path.display(), err))
        })?;
        let split = self.read_from(file)?;
        info!(
            "Loaded {} train and {} test rows with {} features from {}",
            split.n_train(),
            split.n_test(),
            split.feature_names.len(),
            path.display()
        );
        Ok(split)
    }

    pub fn read_from<R: Read>(&self, reader: R) -> Result<TrainTestSplit> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let flag_idx = self.column_index(&headers, &self.train_flag_column)?;
        let target_idx = self.column_index(&headers, &self.target_column)?;

        let feature_idx: Vec<usize> = (0..headers.len())
            .filter(|&i| i != flag_idx && i != target_idx)
            .collect();
        if feature_idx.is_empty() {
            return Err(PipelineError::Dataset("no feature columns".to_string()));
        }
        let feature_names: Vec<String> = feature_idx.iter().map(|&i| headers[i].to_string()).collect();

        let mut train_values = Vec::new();
        let mut test_values = Vec::new();
        let mut targets = Vec::new();

        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let line = row_idx + 2;

            let is_train = parse_flag(&record[flag_idx]).ok_or_else(|| {
                PipelineError::Dataset(format!(
                    "line {}: invalid {} value `{}`",
                    line, self.train_flag_column, &record[flag_idx]
                ))
            })?;

            let values = if is_train {
                let target = parse_value(&record[target_idx], line, &self.target_column)?;
                if !target.is_finite() {
                    return Err(PipelineError::Dataset(format!(
                        "line {}: training row without {}",
                        line, self.target_column
                    )));
                }
                targets.push(target);
                &mut train_values
            } else {
                &mut test_values
            };

            for (&col, name) in feature_idx.iter().zip(&feature_names) {
                values.push(parse_value(&record[col], line, name)?);
            }
        }

        let n_cols = feature_names.len();
        let train = DMatrix::from_row_major(train_values, targets.len(), n_cols)?.with_labels(targets)?;
        let n_test = test_values.len() / n_cols;
        let test = DMatrix::from_row_major(test_values, n_test, n_cols)?;

        Ok(TrainTestSplit {
            feature_names,
            train,
            test,
        })
    }

    fn column_index(&self, headers: &csv::StringRecord, name: &str) -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::Dataset(format!("missing column `{}`", name)))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "t" | "yes" => Some(true),
        "false" | "0" | "f" | "no" => Some(false),
        _ => None,
    }
}

fn parse_value(raw: &str, line: usize, column: &str) -> Result<f64> {
    match raw {
        "" | "nan" | "NaN" | "NA" | "null" => Ok(f64::NAN),
        _ => raw.parse::<f64>().map_err(|_| {
            PipelineError::Dataset(format!(
                "line {}, column {}: invalid number `{}`",
                line, column, raw
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
id,distance,train,weight,shipping_time
1,10.5,True,2.0,3.5
2,20.0,True,,4.0
3,5.0,False,1.0,
4,7.5,1,3.0,2.25
5,8.0,0,NaN,
";

    fn loader() -> DatasetLoader {
        DatasetLoader::new("train", "shipping_time")
    }

    #[test]
    fn test_split_by_flag() {
        let split = loader().read_from(TABLE.as_bytes()).unwrap();

        assert_eq!(split.feature_names, vec!["id", "distance", "weight"]);
        assert_eq!(split.n_train(), 3);
        assert_eq!(split.n_test(), 2);
        assert_eq!(split.train.labels().unwrap(), &[3.5, 4.0, 2.25]);
        assert_eq!(split.train.row(0), &[1.0, 10.5, 2.0]);
        assert_eq!(split.test.row(0), &[3.0, 5.0, 1.0]);
        assert!(split.test.labels().is_none());
    }

    #[test]
    fn test_missing_cells_are_nan() {
        let split = loader().read_from(TABLE.as_bytes()).unwrap();
        assert!(split.train.get(1, 2).is_nan());
        assert!(split.test.get(1, 2).is_nan());
    }

    #[test]
    fn test_train_row_without_target_rejected() {
        let table = "x,train,shipping_time\n1,true,\n";
        let err = loader().read_from(table.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_missing_flag_column() {
        let table = "x,shipping_time\n1,2\n";
        assert!(loader().read_from(table.as_bytes()).is_err());
    }

    #[test]
    fn test_bad_number_names_column() {
        let table = "x,train,shipping_time\nabc,true,1\n";
        let err = loader().read_from(table.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("column x"));
    }

    #[test]
    fn test_bad_flag_rejected() {
        let table = "x,train,shipping_time\n1,maybe,1\n";
        assert!(loader().read_from(table.as_bytes()).is_err());
    }

    #[test]
    fn test_load_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("train_test.csv");
        std::fs::write(&path, TABLE)?;
        let split = loader().load(&path)?;
        assert_eq!(split.n_train() + split.n_test(), 5);
        Ok(())
    }
}

//! Submission file writer

use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{PipelineError, Result};

/// Count the data rows of the submission template (header excluded).
pub fn template_rows<P: AsRef<Path>>(template: P) -> Result<usize> {
    let template = template.as_ref();
    if !template.exists() {
        return Err(PipelineError::Export(format!(
            "submission template {} not found",
            template.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(template)?;
    let mut rows = 0;
    for record in reader.records() {
        record?;
        rows += 1;
    }
    Ok(rows)
}

/// Write `predictions` to `<out_dir>/<run_id>.csv`.
///
/// One value per line, no header, rounded to 4 decimal places. The template
/// only fixes the number of rows; a mismatch is an error.
pub fn export_submission<P: AsRef<Path>, Q: AsRef<Path>>(
    template: P,
    out_dir: Q,
    run_id: u32,
    predictions: &[f64],
) -> Result<PathBuf> {
    let expected = template_rows(&template)?;
    if expected != predictions.len() {
        return Err(PipelineError::Export(format!(
            "template has {} rows but {} predictions were made",
            expected,
            predictions.len()
        )));
    }

    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{}.csv", run_id));

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&path)?;
    for value in predictions {
        writer.write_record([format_value(*value)])?;
    }
    writer.flush()?;

    info!("Wrote {} predictions to {}", predictions.len(), path.display());
    Ok(path)
}

/// Round half to even at 4 decimals, then print exactly 4 decimals.
fn format_value(value: f64) -> String {
    let rounded = (value * 10_000.0).round_ties_even() / 10_000.0;
    // avoid "-0.0000"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{:.4}", rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_template(dir: &Path, rows: usize) -> PathBuf {
        let path = dir.join("submission.csv");
        let mut content = String::from("id,shipping_time\n");
        for i in 0..rows {
            content.push_str(&format!("{},0\n", i));
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_writes_one_line_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), 3);
        let out_dir = dir.path().join("outputs");

        let path = export_submission(&template, &out_dir, 4242, &[1.23456, 2.0, 3.99996]).unwrap();

        assert_eq!(path, out_dir.join("4242.csv"));
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["1.2346", "2.0000", "4.0000"]);
    }

    #[test]
    fn test_row_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let template = write_template(dir.path(), 2);
        let err = export_submission(&template, dir.path(), 1, &[1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::Export(_)));
    }

    #[test]
    fn test_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let result = export_submission(dir.path().join("absent.csv"), dir.path(), 1, &[]);
        assert!(matches!(result, Err(PipelineError::Export(_))));
    }

    #[test]
    fn test_negative_zero_formatting() {
        assert_eq!(format_value(-0.00001), "0.0000");
        assert_eq!(format_value(-1.5), "-1.5000");
    }

    #[test]
    fn test_ties_round_to_even() {
        assert_eq!(format_value(0.03125), "0.0312");
        assert_eq!(format_value(0.00025), "0.0002");
        assert_eq!(format_value(0.00035), "0.0004");
        assert_eq!(format_value(-0.03125), "-0.0312");
    }
}

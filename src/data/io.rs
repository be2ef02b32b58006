use std::path::Path;

use csv::ReaderBuilder;
use ndarray::{Array1, Array2};

use crate::error::{Error, Result};

/// Reads a headered CSV of numbers. Column `target_column` becomes the target,
/// every other column a feature. Returns the feature names alongside the data.
pub fn read_csv<P: AsRef<Path>>(
    path: P,
    target_column: usize,
) -> Result<(Array2<f64>, Array1<f64>, Vec<String>)> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let headers = rdr.headers()?.clone();
    if target_column >= headers.len() {
        return Err(Error::invalid(format!(
            "target column {target_column} out of range for {} columns",
            headers.len()
        )));
    }
    let names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != target_column)
        .map(|(_, name)| name.to_string())
        .collect();

    let mut x_data = Vec::new();
    let mut y_data = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        // header is line 1
        let line = row + 2;
        if record.len() != headers.len() {
            return Err(Error::parse(
                line,
                format!("expected {} fields, got {}", headers.len(), record.len()),
            ));
        }
        for (i, field) in record.iter().enumerate() {
            let val: f64 = field
                .trim()
                .parse()
                .map_err(|_| Error::parse(line, format!("'{field}' is not a number")))?;
            if i == target_column {
                y_data.push(val);
            } else {
                x_data.push(val);
            }
        }
    }

    let x = Array2::from_shape_vec((y_data.len(), names.len()), x_data)
        .map_err(|e| Error::invalid(e.to_string()))?;
    Ok((x, Array1::from(y_data), names))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_read_csv_splits_target() {
        let path = std::env::temp_dir().join("tabletree_read_csv_test.csv");
        fs::write(&path, "a,y,b\n1,10,2\n3,30,4\n").unwrap();
        let (x, y, names) = read_csv(&path, 1).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(y.to_vec(), vec![10.0, 30.0]);
        assert_eq!(x.row(1).to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_read_csv_reports_bad_number() {
        let path = std::env::temp_dir().join("tabletree_read_csv_bad.csv");
        fs::write(&path, "a,y\n1,2\nfoo,3\n").unwrap();
        let res = read_csv(&path, 1);
        fs::remove_file(&path).ok();
        assert!(matches!(res, Err(Error::Parse { line: 3, .. })));
    }
}

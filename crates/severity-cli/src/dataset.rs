//! CSV tables in and out of the batch job.
//!
//! The whole table is held as strings so that columns outside the feature
//! schema survive a read/score/write cycle untouched.

use std::fs::File;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::warn;

use severity_core::{FeatureRecord, FeatureSchema};

/// Column that names a record when present.
const ID_COLUMN: &str = "id";

/// A CSV table.
#[derive(Debug, Clone)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Read a CSV file with a header row.
    pub fn read(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("Failed to open CSV {}", path.display()))?;
        let mut rdr = csv::Reader::from_reader(f);

        let headers: Vec<String> = rdr
            .headers()
            .with_context(|| format!("Failed to read CSV headers from {}", path.display()))?
            .iter()
            .map(|s| s.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, result) in rdr.records().enumerate() {
            let record = result.with_context(|| format!("CSV row {} in {}", idx + 1, path.display()))?;
            rows.push(record.iter().map(|s| s.to_string()).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Identity of row `idx`: its `id` cell, or `row N` counting from 1.
    pub fn row_id(&self, idx: usize) -> String {
        self.column(ID_COLUMN)
            .and_then(|c| self.rows[idx].get(c))
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| format!("row {}", idx + 1))
    }

    /// One record per row, holding the schema's features.
    ///
    /// Cells that are empty or not numbers are left out of the record, so the
    /// core reports them as missing dimensions for that row alone.
    pub fn records(&self, schema: &FeatureSchema) -> Result<Vec<FeatureRecord>> {
        let columns = schema
            .features()
            .iter()
            .map(|f| match self.column(f) {
                Some(c) => Ok((f.as_str(), c)),
                None => bail!("CSV has no column for feature '{}'", f),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((0..self.rows.len())
            .map(|idx| {
                let id = self.row_id(idx);
                let mut record = FeatureRecord::new(id.clone());
                for &(name, c) in &columns {
                    let cell = self.rows[idx].get(c).map(|s| s.trim()).unwrap_or("");
                    match cell.parse::<f64>() {
                        Ok(v) => {
                            record.values.insert(name.to_string(), v);
                        }
                        Err(_) => warn!("Record '{}': unreadable value '{}' for '{}'", id, cell, name),
                    }
                }
                record
            })
            .collect())
    }

    /// Set column `name`, appending it when absent.
    pub fn set_column(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            bail!("column '{}' has {} values for {} rows", name, values.len(), self.rows.len());
        }
        let c = match self.column(name) {
            Some(c) => c,
            None => {
                self.headers.push(name.to_string());
                self.headers.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            if row.len() <= c {
                row.resize(c + 1, String::new());
            }
            row[c] = value;
        }
        Ok(())
    }

    /// Write the table, header first.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV {}", path.display()))?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
            .with_context(|| format!("Failed to write CSV {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tmp(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(["q1", "q2"], ["q1"]).unwrap()
    }

    #[test]
    fn test_records_use_id_column_or_row_number() {
        let (_dir, path) = write_tmp("id,q1,q2,note\np1,1.0,2.0,x\n,3.0,4.0,y\n");
        let ds = Dataset::read(&path).unwrap();
        let records = ds.records(&schema()).unwrap();

        assert_eq!(records[0].id, "p1");
        assert_eq!(records[1].id, "row 2");
        assert_eq!(records[1].values["q2"], 4.0);
        assert!(!records[0].values.contains_key("note"));
        println!("[PASS] test_records_use_id_column_or_row_number");
    }

    #[test]
    fn test_unreadable_cell_is_left_out() {
        let (_dir, path) = write_tmp("q1,q2\n1.0,abc\n2.0,\n");
        let records = Dataset::read(&path).unwrap().records(&schema()).unwrap();
        assert!(!records[0].values.contains_key("q2"));
        assert!(!records[1].values.contains_key("q2"));
    }

    #[test]
    fn test_missing_feature_column_is_error() {
        let (_dir, path) = write_tmp("q1,other\n1.0,2.0\n");
        let err = Dataset::read(&path).unwrap().records(&schema()).unwrap_err();
        assert!(err.to_string().contains("q2"));
    }

    #[test]
    fn test_set_column_appends_then_overwrites() {
        let (dir, path) = write_tmp("q1,q2\n1,2\n3,4\n");
        let mut ds = Dataset::read(&path).unwrap();
        ds.set_column("score", vec!["1.5".into(), String::new()]).unwrap();
        ds.set_column("score", vec!["2.5".into(), "3".into()]).unwrap();
        assert!(ds.set_column("score", vec![]).is_err());

        let out = dir.path().join("out.csv");
        ds.write(&out).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "q1,q2,score\n1,2,2.5\n3,4,3\n");
    }
}

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One processed image.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "Experiment")]
    pub experiment: String,
    #[serde(rename = "Experiment index")]
    pub experiment_index: usize,
    #[serde(rename = "File name")]
    pub file_name: String,
    #[serde(rename = "Number of nuclei")]
    pub nucleus_count: usize,
    #[serde(rename = "Number of spots")]
    pub spot_count: usize,
}

/// Append-only table of per-image counts in processing order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, row: ResultRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as CSV with a header row.
    ///
    /// An empty table still gets its header.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        if self.rows.is_empty() {
            wtr.write_record([
                "Experiment",
                "Experiment index",
                "File name",
                "Number of nuclei",
                "Number of spots",
            ])?;
        }
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Read a table previously written by [`ResultsTable::write_csv`].
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let rows = rdr
            .deserialize()
            .collect::<std::result::Result<Vec<ResultRow>, _>>()?;
        Ok(Self { rows })
    }
}

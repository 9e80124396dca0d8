// ============================================
// Input Loader
// ============================================
//
// Reads what the upstream collaborators leave on disk:
//
//   events      NDJSON, one RawEvent per line
//   catalog     NDJSON, one ItemMetadata per line, in matrix order
//   embeddings  JSON array of equal-length numeric arrays
//
// and writes the decayed dwell-time matrix back out for the trainer.

use crate::error::{Result, TrainingError};
use crate::models::{ItemMetadata, RawEvent};
use crate::services::preprocess::DwellTimeMatrix;
use ndarray::Array2;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// One `T` per non-blank line.
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line)
            .map_err(|e| TrainingError::decode(format!("{}:{}", path.display(), line_no + 1), e))?;
        rows.push(row);
    }

    Ok(rows)
}

pub fn load_events(path: &Path) -> Result<Vec<RawEvent>> {
    let events: Vec<RawEvent> = read_ndjson(path)?;
    info!(path = %path.display(), events = events.len(), "Events loaded");
    Ok(events)
}

pub fn load_catalog(path: &Path) -> Result<Vec<ItemMetadata>> {
    let items: Vec<ItemMetadata> = read_ndjson(path)?;
    info!(path = %path.display(), items = items.len(), "Item catalog loaded");
    Ok(items)
}

/// Ragged rows are a shape error, not something to pad.
pub fn load_embeddings(path: &Path) -> Result<Array2<f64>> {
    let rows: Vec<Vec<f64>> = serde_json::from_reader(BufReader::new(File::open(path)?))
        .map_err(|e| TrainingError::decode(path.display().to_string(), e))?;
    let embeddings = embeddings_from_rows(rows)?;
    info!(
        path = %path.display(),
        items = embeddings.nrows(),
        dimensions = embeddings.ncols(),
        "Embeddings loaded"
    );
    Ok(embeddings)
}

pub fn embeddings_from_rows(rows: Vec<Vec<f64>>) -> Result<Array2<f64>> {
    let n_rows = rows.len();
    let n_cols = match rows.first() {
        Some(first) => first.len(),
        None => {
            return Err(TrainingError::EmptyInput(
                "embedding matrix has no rows".to_string(),
            ))
        }
    };
    if let Some(ragged) = rows.iter().find(|row| row.len() != n_cols) {
        return Err(TrainingError::shape("embedding row width", n_cols, ragged.len()));
    }

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| TrainingError::InvalidParameter(format!("embedding matrix: {}", e)))
}

pub fn write_dwell_matrix(path: &Path, matrix: &DwellTimeMatrix) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &matrix.to_export())?;
    writer.flush()?;

    info!(
        path = %path.display(),
        rows = matrix.n_rows(),
        items = matrix.items().len(),
        "Dwell-time matrix exported"
    );
    Ok(())
}

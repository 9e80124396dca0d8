// ============================================
// Similarity Engine (decay-weighted KNN)
// ============================================
//
// For every item i and every candidate j:
//
//   distance   = 1 - cos(e_i, e_j)                 ∈ [0, 2]
//   similarity = (2 - distance) / 2                ∈ [0, 1]
//   score      = similarity * decay[j]
//
// The decay weight belongs to the candidate, not the query: a stale article
// is a worse recommendation for everyone. The self cell is forced to 1.0 and
// always ranks first, then dropped, so `n_recs` requests yield `n_recs - 1`
// neighbors.
//
// Rows are processed in chunks of `batch_size` to bound the size of the
// distance buffer. Each row is computed independently, so chunking never
// changes values or order.

use crate::error::{Result, TrainingError};
use crate::utils::{chunk_ranges, format_bytes};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use std::cmp::Ordering;
use tracing::info;

/// Ranked neighbors per item, self excluded.
///
/// `scores[[i, r]]` is the score of `indices[[i, r]]`, the r-th best
/// neighbor of item `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborLists {
    scores: Array2<f64>,
    indices: Array2<usize>,
}

impl NeighborLists {
    /// Wrap precomputed neighbor lists. Both arrays must have the same shape.
    pub fn from_parts(scores: Array2<f64>, indices: Array2<usize>) -> Result<Self> {
        if scores.nrows() != indices.nrows() {
            return Err(TrainingError::shape(
                "neighbor index rows",
                scores.nrows(),
                indices.nrows(),
            ));
        }
        if scores.ncols() != indices.ncols() {
            return Err(TrainingError::shape(
                "neighbor index columns",
                scores.ncols(),
                indices.ncols(),
            ));
        }
        Ok(Self { scores, indices })
    }

    pub fn n_items(&self) -> usize {
        self.scores.nrows()
    }

    /// Neighbors kept per item
    pub fn k(&self) -> usize {
        self.scores.ncols()
    }

    pub fn scores(&self) -> ArrayView2<'_, f64> {
        self.scores.view()
    }

    pub fn indices(&self) -> ArrayView2<'_, usize> {
        self.indices.view()
    }

    /// `(neighbor_index, score)` pairs for one item, best first.
    pub fn row(&self, item: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices
            .row(item)
            .into_iter()
            .copied()
            .zip(self.scores.row(item).into_iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchMode {
    Full,
    Rows(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarityEngine {
    mode: BatchMode,
}

impl SimilarityEngine {
    /// All rows in a single N×N pass.
    pub fn full() -> Self {
        Self {
            mode: BatchMode::Full,
        }
    }

    /// `batch_size` rows at a time; 1 is row-at-a-time.
    pub fn batched(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(TrainingError::InvalidParameter(
                "KNN batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            mode: BatchMode::Rows(batch_size),
        })
    }

    fn batch_size(&self, n_items: usize) -> usize {
        match self.mode {
            BatchMode::Full => n_items,
            BatchMode::Rows(size) => size.min(n_items),
        }
    }

    /// Top `n_recs - 1` decay-weighted cosine neighbors for every row of
    /// `embeddings`.
    ///
    /// `n_recs` larger than the number of items is truncated to it.
    pub fn nearest_neighbors(
        &self,
        embeddings: ArrayView2<'_, f64>,
        decay: ArrayView1<'_, f64>,
        n_recs: usize,
    ) -> Result<NeighborLists> {
        let n_items = embeddings.nrows();
        if n_items == 0 {
            return Err(TrainingError::EmptyInput(
                "embedding matrix has no rows".to_string(),
            ));
        }
        if decay.len() != n_items {
            return Err(TrainingError::shape("decay weights", n_items, decay.len()));
        }
        if n_recs == 0 {
            return Err(TrainingError::InvalidParameter(
                "n_recs must be at least 1 (the self match)".to_string(),
            ));
        }

        let keep = n_recs.min(n_items);
        let k = keep - 1;
        let batch_size = self.batch_size(n_items);
        let norms: Array1<f64> = embeddings
            .axis_iter(Axis(0))
            .map(|row| row.dot(&row).sqrt())
            .collect();

        let mut scores = Array2::<f64>::zeros((n_items, k));
        let mut indices = Array2::<usize>::zeros((n_items, k));
        let n_chunks = (n_items + batch_size - 1) / batch_size;

        for (chunk_no, range) in chunk_ranges(n_items, batch_size).enumerate() {
            let mut similarities = Array2::<f64>::zeros((range.len(), n_items));
            if chunk_no == 0 {
                info!(
                    n_items,
                    batch_size,
                    n_chunks,
                    buffer = %format_bytes(similarities.len() * std::mem::size_of::<f64>()),
                    "Distance buffer allocated"
                );
            }

            for (offset, item) in range.clone().enumerate() {
                let dots = embeddings.dot(&embeddings.row(item));
                let mut row = similarities.row_mut(offset);
                for j in 0..n_items {
                    let distance = 1.0 - dots[j] / (norms[item] * norms[j]);
                    let similarity = sanitize((2.0 - distance) / 2.0);
                    row[j] = clamp_unit(similarity * decay[j]);
                }
                row[item] = 1.0;

                let ranked = rank_row(row.view(), item, keep);
                for (r, neighbor) in ranked.into_iter().skip(1).enumerate() {
                    indices[[item, r]] = neighbor;
                    scores[[item, r]] = row[neighbor];
                }
            }

            info!(
                chunk = chunk_no + 1,
                n_chunks,
                rows_done = range.end,
                "KNN chunk processed"
            );
        }

        Ok(NeighborLists { scores, indices })
    }
}

/// NaN → 0, +∞ → 1, -∞ → 0
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value == f64::INFINITY {
        1.0
    } else if value == f64::NEG_INFINITY {
        0.0
    } else {
        value
    }
}

fn clamp_unit(value: f64) -> f64 {
    sanitize(value).clamp(0.0, 1.0)
}

/// Indices of the `keep` best candidates, self first, then score descending,
/// ties by ascending index.
fn rank_row(row: ArrayView1<'_, f64>, item: usize, keep: usize) -> Vec<usize> {
    let order = |a: &usize, b: &usize| -> Ordering {
        (*b == item)
            .cmp(&(*a == item))
            .then_with(|| row[*b].total_cmp(&row[*a]))
            .then_with(|| a.cmp(b))
    };

    let mut candidates: Vec<usize> = (0..row.len()).collect();
    if keep < candidates.len() {
        candidates.select_nth_unstable_by(keep - 1, order);
        candidates.truncate(keep);
    }
    candidates.sort_by(order);
    candidates
}

/// Scale every row to unit L2 norm. All-zero rows stay zero.
pub fn l2_normalize(embeddings: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut normalized = embeddings.to_owned();
    for mut row in normalized.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
    normalized
}
